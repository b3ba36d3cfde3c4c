use core::{cell::OnceCell, ops::Range};

use alloc::{rc::Rc, vec::Vec};

use crate::{hash::Sha256Digest, prefix::Prefix, suite::Suite};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PacketKind {
    Interest,
    Content,
    Nack,
    Fragment,
}

/// Position of a fragment in its packet, the top two bits of the fragment word.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FragmentPosition {
    Middle = 0,
    First = 1,
    Last = 2,
    Single = 3,
}

impl FragmentPosition {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            1 => FragmentPosition::First,
            2 => FragmentPosition::Last,
            3 => FragmentPosition::Single,
            _ => FragmentPosition::Middle,
        }
    }

    pub fn bits(self) -> u8 {
        self as u8
    }

    pub fn is_first(self) -> bool {
        self.bits() & 0x01 != 0
    }

    pub fn is_last(self) -> bool {
        self.bits() & 0x02 != 0
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FragmentHeader {
    pub position: FragmentPosition,
    pub seqno: u16,
}

impl FragmentHeader {
    pub const SEQ_MASK: u16 = 0x3fff;

    pub fn from_word(word: u16) -> Self {
        Self {
            position: FragmentPosition::from_bits((word >> 14) as u8),
            seqno: word & Self::SEQ_MASK,
        }
    }

    pub fn to_word(self) -> u16 {
        (self.position.bits() as u16) << 14 | (self.seqno & Self::SEQ_MASK)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CcnbDetails {
    pub min_suffix: usize,
    pub max_suffix: usize,
    // None if the packet carried an invalid scope
    pub scope: Option<u8>,
    pub answer_origin_kind: u32,
    pub nonce: Option<Vec<u8>>,
    pub ppkd: Option<Vec<u8>>,
    pub final_block_id: Option<u32>,
}

impl Default for CcnbDetails {
    fn default() -> Self {
        Self {
            min_suffix: 0,
            max_suffix: crate::prefix::MAX_NAME_COMP,
            scope: Some(3),
            answer_origin_kind: 3,
            nonce: None,
            ppkd: None,
            final_block_id: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CcnTlvDetails {
    pub hop_limit: u8,
    pub end_chunk: Option<u32>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CisTlvDetails {
    pub hop_limit: u8,
    pub final_segment: Option<u32>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IotTlvDetails {
    pub ttl: Option<u8>,
    /// Where the TTL byte sits in the packet buffer.
    pub ttl_offset: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NdnTlvDetails {
    pub min_suffix: usize,
    pub max_suffix: usize,
    pub scope: u64,
    pub must_be_fresh: bool,
    pub nonce: Option<Vec<u8>>,
    pub ppkl: Option<Vec<u8>>,
    pub interest_lifetime: Option<u64>,
    pub content_type: Option<u64>,
    pub freshness_period: Option<u64>,
    pub final_block_id: Option<u32>,
}

impl Default for NdnTlvDetails {
    fn default() -> Self {
        Self {
            min_suffix: 0,
            max_suffix: crate::prefix::MAX_NAME_COMP,
            scope: 3,
            must_be_fresh: false,
            nonce: None,
            ppkl: None,
            interest_lifetime: None,
            content_type: None,
            freshness_period: None,
            final_block_id: None,
        }
    }
}

/// The fields only one suite knows about.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PacketDetails {
    Ccnb(CcnbDetails),
    CcnTlv(CcnTlvDetails),
    CisTlv(CisTlvDetails),
    IotTlv(IotTlvDetails),
    NdnTlv(NdnTlvDetails),
}

impl PacketDetails {
    pub fn suite(&self) -> Suite {
        match self {
            PacketDetails::Ccnb(_) => Suite::Ccnb,
            PacketDetails::CcnTlv(_) => Suite::CcnTlv,
            PacketDetails::CisTlv(_) => Suite::CisTlv,
            PacketDetails::IotTlv(_) => Suite::IotTlv,
            PacketDetails::NdnTlv(_) => Suite::NdnTlv,
        }
    }
}

/// A decoded packet. The wire bytes are shared and never modified; the name,
/// content range and suite fields all describe that buffer.
#[derive(Clone, Debug)]
pub struct Packet {
    kind: PacketKind,
    buffer: Rc<[u8]>,
    prefix: Option<Prefix>,
    content: Option<Range<usize>>,
    fragment: Option<FragmentHeader>,
    details: PacketDetails,
    digest: OnceCell<Sha256Digest>,
}

impl Packet {
    pub(crate) fn new(
        kind: PacketKind,
        buffer: Vec<u8>,
        prefix: Option<Prefix>,
        content: Option<Range<usize>>,
        details: PacketDetails,
    ) -> Self {
        Self {
            kind,
            buffer: buffer.into(),
            prefix,
            content,
            fragment: None,
            details,
            digest: OnceCell::new(),
        }
    }

    pub(crate) fn fragment_of(
        buffer: Vec<u8>,
        header: FragmentHeader,
        data: Range<usize>,
        details: PacketDetails,
    ) -> Self {
        let mut packet = Self::new(PacketKind::Fragment, buffer, None, Some(data), details);
        packet.fragment = Some(header);
        packet
    }

    pub fn suite(&self) -> Suite {
        self.details.suite()
    }

    pub fn kind(&self) -> PacketKind {
        self.kind
    }

    pub fn is_interest(&self) -> bool {
        self.kind == PacketKind::Interest
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn buffer(&self) -> Rc<[u8]> {
        self.buffer.clone()
    }

    pub fn prefix(&self) -> Option<&Prefix> {
        self.prefix.as_ref()
    }

    pub fn content(&self) -> Option<&[u8]> {
        self.content.as_ref().and_then(|r| self.buffer.get(r.clone()))
    }

    pub fn content_range(&self) -> Option<Range<usize>> {
        self.content.clone()
    }

    pub fn fragment(&self) -> Option<FragmentHeader> {
        self.fragment
    }

    pub fn details(&self) -> &PacketDetails {
        &self.details
    }

    pub fn nonce(&self) -> Option<&[u8]> {
        match &self.details {
            PacketDetails::Ccnb(d) => d.nonce.as_deref(),
            PacketDetails::NdnTlv(d) => d.nonce.as_deref(),
            _ => None,
        }
    }

    pub fn final_block_id(&self) -> Option<u32> {
        match &self.details {
            PacketDetails::Ccnb(d) => d.final_block_id,
            PacketDetails::CcnTlv(d) => d.end_chunk,
            PacketDetails::CisTlv(d) => d.final_segment,
            PacketDetails::NdnTlv(d) => d.final_block_id,
            PacketDetails::IotTlv(_) => None,
        }
    }

    pub fn must_be_fresh(&self) -> bool {
        matches!(&self.details, PacketDetails::NdnTlv(d) if d.must_be_fresh)
    }

    // Milliseconds the content stays fresh after arrival, where the suite says so
    pub fn freshness_period(&self) -> Option<u64> {
        match &self.details {
            PacketDetails::NdnTlv(d) => d.freshness_period,
            _ => None,
        }
    }

    pub fn same_bytes(&self, other: &Packet) -> bool {
        self.suite() == other.suite() && self.bytes() == other.bytes()
    }

    /// SHA-256 over the whole packet, computed with `hash` on first use.
    pub fn digest_with<F>(&self, hash: F) -> Option<&Sha256Digest>
    where
        F: FnOnce(&[u8]) -> Option<Sha256Digest>,
    {
        if self.digest.get().is_none() {
            let digest = hash(&self.buffer)?;
            let _ = self.digest.set(digest);
        }
        self.digest.get()
    }

    /// A copy of the packet with its hop limit lowered by one, for suites
    /// that carry one (CCNx hop limit, IOT TTL). None if the packet would
    /// leave with no hops left.
    pub fn with_decremented_hop_limit(&self) -> Option<Packet> {
        match &self.details {
            PacketDetails::CcnTlv(d) => {
                if d.hop_limit <= 1 {
                    return None;
                }
                // Fixed header: version, type, length (2), hop limit
                let mut packet = self.with_byte_replaced(4, d.hop_limit - 1)?;
                packet.details = PacketDetails::CcnTlv(CcnTlvDetails {
                    hop_limit: d.hop_limit - 1,
                    end_chunk: d.end_chunk,
                });
                Some(packet)
            }
            PacketDetails::IotTlv(IotTlvDetails {
                ttl: Some(ttl),
                ttl_offset,
            }) => {
                if *ttl <= 1 {
                    return None;
                }
                let mut packet = self.with_byte_replaced(*ttl_offset, ttl - 1)?;
                packet.details = PacketDetails::IotTlv(IotTlvDetails {
                    ttl: Some(ttl - 1),
                    ttl_offset: *ttl_offset,
                });
                Some(packet)
            }
            _ => Some(self.clone()),
        }
    }

    fn with_byte_replaced(&self, offset: usize, value: u8) -> Option<Packet> {
        let mut bytes = self.buffer.to_vec();
        *bytes.get_mut(offset)? = value;
        let mut packet = self.clone();
        packet.buffer = bytes.into();
        packet.digest = OnceCell::new();
        Some(packet)
    }
}

/// Fields an originated interest may carry; each suite uses what it knows.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InterestOptions {
    pub nonce: Option<[u8; 4]>,
    pub scope: Option<u8>,
    pub min_suffix: Option<usize>,
    pub max_suffix: Option<usize>,
    pub must_be_fresh: bool,
    pub interest_lifetime: Option<u64>,
    pub hop_limit: Option<u8>,
    pub ppkd: Option<Vec<u8>>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContentOptions {
    pub final_block_id: Option<u32>,
    pub freshness_period: Option<u64>,
    pub hop_limit: Option<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragment_word() {
        let header = FragmentHeader {
            position: FragmentPosition::Last,
            seqno: 0x4001,
        };
        assert_eq!(header.to_word(), 0x8001);
        let decoded = FragmentHeader::from_word(0xc005);
        assert_eq!(decoded.position, FragmentPosition::Single);
        assert_eq!(decoded.seqno, 5);
        assert!(decoded.position.is_first() && decoded.position.is_last());
        assert!(!FragmentPosition::Middle.is_first());
    }

    #[test]
    fn test_hop_limit() {
        let bytes = alloc::vec![1, 0, 0, 8, 2, 0, 0, 8];
        let packet = Packet::new(
            PacketKind::Interest,
            bytes,
            None,
            None,
            PacketDetails::CcnTlv(CcnTlvDetails {
                hop_limit: 2,
                end_chunk: None,
            }),
        );
        let once = packet.with_decremented_hop_limit().unwrap();
        assert_eq!(once.bytes()[4], 1);
        // One hop left would arrive upstream with none
        assert!(once.with_decremented_hop_limit().is_none());
        // The original buffer is untouched
        assert_eq!(packet.bytes()[4], 2);
    }

    #[test]
    fn test_iot_ttl() {
        let bytes = alloc::vec![0x87, 0x02, 0x01, 2, 0x43, 0x02, 0x41, b'a'];
        let packet = Packet::new(
            PacketKind::Interest,
            bytes,
            None,
            None,
            PacketDetails::IotTlv(IotTlvDetails {
                ttl: Some(2),
                ttl_offset: 3,
            }),
        );
        let once = packet.with_decremented_hop_limit().unwrap();
        assert_eq!(once.bytes()[3], 1);
        assert_eq!(
            once.details(),
            &PacketDetails::IotTlv(IotTlvDetails {
                ttl: Some(1),
                ttl_offset: 3,
            })
        );
        assert!(once.with_decremented_hop_limit().is_none());

        // No TTL option, nothing to lower
        let plain = Packet::new(
            PacketKind::Interest,
            alloc::vec![0x84, 0x43, 0x02, 0x41, b'a'],
            None,
            None,
            PacketDetails::IotTlv(IotTlvDetails::default()),
        );
        assert!(plain.with_decremented_hop_limit().unwrap().same_bytes(&plain));
    }

    #[test]
    fn test_digest_is_cached() {
        let packet = Packet::new(
            PacketKind::Content,
            alloc::vec![1, 2, 3],
            None,
            Some(1..3),
            PacketDetails::IotTlv(IotTlvDetails::default()),
        );
        assert_eq!(packet.content(), Some(&[2u8, 3][..]));
        let first = packet.digest_with(|_| Some(Sha256Digest([1; 32]))).copied();
        let second = packet.digest_with(|_| Some(Sha256Digest([2; 32]))).copied();
        assert_eq!(first, second);
        assert!(Packet::clone(&packet).same_bytes(&packet));
    }
}
