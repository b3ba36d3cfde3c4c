use alloc::vec::Vec;

use crate::{
    codec::{EncodeError, SuiteCodec, MAX_PACKET_SIZE},
    packet::{FragmentHeader, FragmentPosition, Packet},
    suite::Suite,
};

/// How a face carves outgoing packets.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum FragmentationPolicy {
    #[default]
    None,
    /// Packets longer than `mtu` are split into begin/end tagged fragments.
    BeginEnd { mtu: usize },
}

impl FragmentationPolicy {
    /// Policy for a link with the given MTU, zero meaning unlimited.
    pub fn for_mtu(mtu: usize) -> Self {
        match mtu {
            0 => FragmentationPolicy::None,
            mtu => FragmentationPolicy::BeginEnd { mtu },
        }
    }
}

/// Outgoing side: numbers fragments across packets.
#[derive(Debug, Default)]
pub struct Fragmenter {
    policy: FragmentationPolicy,
    next_seqno: u16,
}

impl Fragmenter {
    pub fn new(policy: FragmentationPolicy) -> Self {
        Self {
            policy,
            next_seqno: 0,
        }
    }

    pub fn policy(&self) -> FragmentationPolicy {
        self.policy
    }

    /// Splits `bytes` into wire fragments, or returns None when the packet
    /// goes out whole: it fits, the face does not fragment, or the suite has
    /// no fragment format.
    pub fn fragment(
        &mut self,
        codec: &dyn SuiteCodec,
        bytes: &[u8],
    ) -> Result<Option<Vec<Vec<u8>>>, EncodeError> {
        let FragmentationPolicy::BeginEnd { mtu } = self.policy else {
            return Ok(None);
        };
        if bytes.len() <= mtu {
            return Ok(None);
        }
        let Some(overhead) = codec.fragment_overhead() else {
            return Ok(None);
        };
        let room = mtu.checked_sub(overhead).filter(|r| *r > 0);
        let room = room.ok_or(EncodeError::BufferTooShort)?;

        let chunks: Vec<&[u8]> = bytes.chunks(room).collect();
        let last = chunks.len() - 1;
        let mut fragments = Vec::with_capacity(chunks.len());
        for (i, chunk) in chunks.into_iter().enumerate() {
            let position = match i {
                _ if last == 0 => FragmentPosition::Single,
                0 => FragmentPosition::First,
                _ if i == last => FragmentPosition::Last,
                _ => FragmentPosition::Middle,
            };
            let header = FragmentHeader {
                position,
                seqno: self.next_seqno,
            };
            self.next_seqno = self.next_seqno.wrapping_add(1) & FragmentHeader::SEQ_MASK;
            fragments.push(codec.encode_fragment(header, chunk)?);
        }
        Ok(Some(fragments))
    }
}

/// Incoming side: collects the fragments of one packet at a time. Anything
/// out of sequence throws the partial packet away.
#[derive(Debug, Default)]
pub struct Reassembler {
    suite: Option<Suite>,
    expected: Option<u16>,
    buffer: Vec<u8>,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_idle(&self) -> bool {
        self.expected.is_none()
    }

    pub fn reset(&mut self) {
        self.suite = None;
        self.expected = None;
        self.buffer.clear();
    }

    /// Feeds one fragment; returns the packet bytes once the last fragment
    /// of a packet arrives.
    pub fn accept(&mut self, fragment: &Packet) -> Option<Vec<u8>> {
        let header = fragment.fragment()?;
        let data = fragment.content().unwrap_or_default();
        let next = header.seqno.wrapping_add(1) & FragmentHeader::SEQ_MASK;

        match header.position {
            FragmentPosition::Single => {
                self.reset();
                Some(data.to_vec())
            }
            FragmentPosition::First => {
                if !self.is_idle() {
                    log::debug!("Dropping incomplete packet, new one started");
                }
                self.reset();
                self.suite = Some(fragment.suite());
                self.expected = Some(next);
                self.buffer.extend_from_slice(data);
                None
            }
            FragmentPosition::Middle | FragmentPosition::Last => {
                if self.expected != Some(header.seqno) || self.suite != Some(fragment.suite()) {
                    log::debug!(
                        "Fragment {} out of sequence, expected {:?}",
                        header.seqno,
                        self.expected
                    );
                    self.reset();
                    return None;
                }
                if self.buffer.len() + data.len() > MAX_PACKET_SIZE {
                    log::debug!("Reassembled packet exceeds {} bytes, dropping", MAX_PACKET_SIZE);
                    self.reset();
                    return None;
                }
                self.buffer.extend_from_slice(data);
                if header.position == FragmentPosition::Last {
                    let packet = core::mem::take(&mut self.buffer);
                    self.reset();
                    Some(packet)
                } else {
                    self.expected = Some(next);
                    None
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{ccnb::CcnbCodec, ndntlv::NdnTlvCodec};

    fn decode(bytes: &[u8]) -> Packet {
        NdnTlvCodec.decode(bytes).unwrap().0
    }

    #[test]
    fn test_small_packets_go_whole() {
        let mut fragmenter = Fragmenter::new(FragmentationPolicy::for_mtu(100));
        assert_eq!(fragmenter.fragment(&NdnTlvCodec, &[0; 100]).unwrap(), None);
        let mut off = Fragmenter::new(FragmentationPolicy::for_mtu(0));
        assert_eq!(off.fragment(&NdnTlvCodec, &[0; 1000]).unwrap(), None);
        // CCNB has no fragment format
        let mut ccnb = Fragmenter::new(FragmentationPolicy::for_mtu(10));
        assert_eq!(ccnb.fragment(&CcnbCodec, &[0; 100]).unwrap(), None);
    }

    #[test]
    fn test_split_and_reassemble() {
        let packet: Vec<u8> = (0..250u32).map(|i| i as u8).collect();
        let mut fragmenter = Fragmenter::new(FragmentationPolicy::BeginEnd { mtu: 100 });
        let fragments = fragmenter.fragment(&NdnTlvCodec, &packet).unwrap().unwrap();
        assert_eq!(fragments.len(), 3);
        assert!(fragments.iter().all(|f| f.len() <= 100));

        let positions: Vec<FragmentPosition> = fragments
            .iter()
            .map(|f| decode(f).fragment().unwrap().position)
            .collect();
        assert_eq!(
            positions,
            [FragmentPosition::First, FragmentPosition::Middle, FragmentPosition::Last]
        );

        let mut reassembler = Reassembler::new();
        assert_eq!(reassembler.accept(&decode(&fragments[0])), None);
        assert_eq!(reassembler.accept(&decode(&fragments[1])), None);
        assert_eq!(reassembler.accept(&decode(&fragments[2])), Some(packet));
        assert!(reassembler.is_idle());
    }

    #[test]
    fn test_out_of_sequence_resets() {
        let packet = [7u8; 300];
        let mut fragmenter = Fragmenter::new(FragmentationPolicy::BeginEnd { mtu: 112 });
        let fragments = fragmenter.fragment(&NdnTlvCodec, &packet).unwrap().unwrap();
        assert_eq!(fragments.len(), 3);

        let mut reassembler = Reassembler::new();
        reassembler.accept(&decode(&fragments[0]));
        assert_eq!(reassembler.accept(&decode(&fragments[2])), None);
        assert!(reassembler.is_idle());
        // The orphaned middle fragment is dropped as well
        assert_eq!(reassembler.accept(&decode(&fragments[1])), None);
    }

    #[test]
    fn test_oversized_packet_is_dropped() {
        let packet = alloc::vec![3u8; 3 * MAX_PACKET_SIZE];
        let mut fragmenter = Fragmenter::new(FragmentationPolicy::BeginEnd { mtu: 1000 });
        let fragments = fragmenter.fragment(&NdnTlvCodec, &packet).unwrap().unwrap();

        let mut reassembler = Reassembler::new();
        for fragment in &fragments {
            assert_eq!(reassembler.accept(&decode(fragment)), None);
        }
        assert!(reassembler.is_idle());
    }

    #[test]
    fn test_mtu_below_overhead() {
        let mut fragmenter = Fragmenter::new(FragmentationPolicy::BeginEnd { mtu: 4 });
        assert_eq!(
            fragmenter.fragment(&NdnTlvCodec, &[0; 10]),
            Err(EncodeError::BufferTooShort)
        );
    }
}
