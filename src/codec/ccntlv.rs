//! CCNx 1.0 TLV: fixed 8-byte header, 16-bit types and lengths.

use alloc::vec::Vec;

use super::{be_uint_field, scratch_for, DecodeError, EncodeError, PrependBuffer, Reader, SuiteCodec};
use crate::{
    matching::{compare, content_admitted, MatchMode},
    packet::{
        CcnTlvDetails, ContentOptions, FragmentHeader, InterestOptions, Packet, PacketDetails,
        PacketKind,
    },
    prefix::Prefix,
    suite::Suite,
};

pub const VERSION: u8 = 1;
pub const FIXED_HEADER_LEN: usize = 8;

pub const PT_INTEREST: u8 = 0;
pub const PT_DATA: u8 = 1;
pub const PT_NACK: u8 = 2;
pub const PT_FRAGMENT: u8 = 3;

pub const TL_INTEREST: u16 = 0x0001;
pub const TL_OBJECT: u16 = 0x0002;
pub const TL_VALIDATION_ALG: u16 = 0x0003;
pub const TL_VALIDATION_PAYLOAD: u16 = 0x0004;
pub const TL_FRAGMENT: u16 = 0x0005;

pub const M_NAME: u16 = 0x0000;
pub const M_PAYLOAD: u16 = 0x0001;
pub const M_END_CHUNK: u16 = 0x0019;

pub const DEFAULT_INTEREST_HOP_LIMIT: u8 = 64;
pub const DEFAULT_CONTENT_HOP_LIMIT: u8 = 255;

const FRAGMENT_OVERHEAD: usize = FIXED_HEADER_LEN + 4;

/// Header length announced by a CCNx packet, None if `bytes` is not one.
pub fn header_length(bytes: &[u8]) -> Option<usize> {
    if bytes.len() < FIXED_HEADER_LEN || bytes[0] != VERSION {
        return None;
    }
    let hdrlen = bytes[7] as usize;
    if hdrlen < FIXED_HEADER_LEN || hdrlen > bytes.len() {
        return None;
    }
    Some(hdrlen)
}

pub struct CcnTlvCodec;

impl SuiteCodec for CcnTlvCodec {
    fn suite(&self) -> Suite {
        Suite::CcnTlv
    }

    fn decode(&self, bytes: &[u8]) -> Result<(Packet, usize), DecodeError> {
        let mut reader = Reader::new(bytes);
        if reader.read_u8()? != VERSION {
            return Err(DecodeError::Malformed("unsupported CCNx version"));
        }
        let packet_type = reader.read_u8()?;
        let packet_len = reader.read_u16()? as usize;
        let hop_limit = reader.read_u8()?;
        let fill = reader.read_u16()?;
        let header_len = reader.read_u8()? as usize;
        if header_len < FIXED_HEADER_LEN || packet_len < header_len {
            return Err(DecodeError::Malformed("bad CCNx header length"));
        }
        if packet_len > bytes.len() {
            return Err(DecodeError::LengthOverrun {
                declared: packet_len,
                available: bytes.len(),
            });
        }

        let bytes = &bytes[..packet_len];
        let mut body = Reader::new(bytes);
        // Optional hop-by-hop headers are skipped
        body.read_bytes(header_len)?;

        let typ = body.read_u16()?;
        let len = body.read_u16()? as usize;
        let mut message = body.sub(len)?;

        let mut details = CcnTlvDetails {
            hop_limit,
            end_chunk: None,
        };
        let buffer = bytes.to_vec();

        let packet = match (packet_type, typ) {
            (PT_FRAGMENT, TL_FRAGMENT) => Packet::fragment_of(
                buffer,
                FragmentHeader::from_word(fill),
                message.range(),
                PacketDetails::CcnTlv(details),
            ),
            (PT_INTEREST, TL_INTEREST) | (PT_NACK, TL_INTEREST) | (PT_DATA, TL_OBJECT) => {
                let kind = match packet_type {
                    PT_INTEREST => PacketKind::Interest,
                    PT_NACK => PacketKind::Nack,
                    _ => PacketKind::Content,
                };
                let mut prefix = None;
                let mut content = None;
                while !message.is_empty() {
                    let t = message.read_u16()?;
                    let l = message.read_u16()? as usize;
                    let mut value = message.sub(l)?;
                    match t {
                        M_NAME => prefix = Some(decode_name(bytes, &mut value)?),
                        M_PAYLOAD => content = Some(value.range()),
                        M_END_CHUNK => {
                            details.end_chunk =
                                u32::try_from(be_uint_field(value.read_bytes(l)?)?).ok()
                        }
                        _ => {}
                    }
                }
                let prefix = prefix.ok_or(DecodeError::MissingName)?;
                Packet::new(
                    kind,
                    buffer,
                    Some(prefix),
                    content,
                    PacketDetails::CcnTlv(details),
                )
            }
            (_, other) => return Err(DecodeError::UnexpectedType(other as u64)),
        };
        Ok((packet, packet_len))
    }

    fn encode_interest(
        &self,
        prefix: &Prefix,
        options: &InterestOptions,
    ) -> Result<Vec<u8>, EncodeError> {
        let mut buf = scratch_for(prefix, 0);
        prepend_name(&mut buf, prefix)?;
        let len = buf.len();
        buf.prepend_tl16(TL_INTEREST, len)?;
        prepend_fixed_header(
            &mut buf,
            PT_INTEREST,
            options.hop_limit.unwrap_or(DEFAULT_INTEREST_HOP_LIMIT),
            0,
        )?;
        Ok(buf.into_vec())
    }

    fn encode_content(
        &self,
        prefix: &Prefix,
        payload: &[u8],
        options: &ContentOptions,
    ) -> Result<Vec<u8>, EncodeError> {
        let mut buf = scratch_for(prefix, payload.len());
        let n = buf.prepend_slice(payload)?;
        buf.prepend_tl16(M_PAYLOAD, n)?;
        if let Some(last) = options.final_block_id {
            let n = buf.prepend_minimal_uint(last as u64)?;
            buf.prepend_tl16(M_END_CHUNK, n)?;
        }
        prepend_name(&mut buf, prefix)?;
        let len = buf.len();
        buf.prepend_tl16(TL_OBJECT, len)?;
        prepend_fixed_header(
            &mut buf,
            PT_DATA,
            options.hop_limit.unwrap_or(DEFAULT_CONTENT_HOP_LIMIT),
            0,
        )?;
        Ok(buf.into_vec())
    }

    fn fragment_overhead(&self) -> Option<usize> {
        Some(FRAGMENT_OVERHEAD)
    }

    fn encode_fragment(&self, header: FragmentHeader, data: &[u8]) -> Result<Vec<u8>, EncodeError> {
        let mut buf = PrependBuffer::new(data.len() + FRAGMENT_OVERHEAD);
        let n = buf.prepend_slice(data)?;
        buf.prepend_tl16(TL_FRAGMENT, n)?;
        prepend_fixed_header(&mut buf, PT_FRAGMENT, 0, header.to_word())?;
        Ok(buf.into_vec())
    }

    fn admits(&self, interest: &Packet, content: &Packet, digest: Option<&[u8]>) -> bool {
        match (interest.prefix(), content.prefix()) {
            // Either the exact name or the name plus the content digest
            (Some(wanted), Some(name)) => content_admitted(wanted, 0, 1, name, digest),
            _ => false,
        }
    }

    fn same_interest(&self, a: &Packet, b: &Packet) -> bool {
        match (a.prefix(), b.prefix()) {
            (Some(pa), Some(pb)) => compare(pa, None, pb, MatchMode::Exact).is_match(),
            _ => false,
        }
    }
}

fn decode_name(bytes: &[u8], reader: &mut Reader<'_>) -> Result<Prefix, DecodeError> {
    let mut prefix = Prefix::new(Suite::CcnTlv);
    while !reader.is_empty() {
        let start = reader.position();
        reader.read_u16()?;
        let len = reader.read_u16()? as usize;
        reader.read_bytes(len)?;
        // Components keep their TL
        prefix.push_wire(bytes[start..reader.position()].to_vec())?;
    }
    prefix.strip_nfn_markers();
    Ok(prefix)
}

fn prepend_name(buf: &mut PrependBuffer, prefix: &Prefix) -> Result<usize, EncodeError> {
    let end = buf.len();
    for component in prefix.encoded_components().iter().rev() {
        buf.prepend_slice(component)?;
    }
    let inner = buf.len() - end;
    Ok(inner + buf.prepend_tl16(M_NAME, inner)?)
}

fn prepend_fixed_header(
    buf: &mut PrependBuffer,
    packet_type: u8,
    hop_limit: u8,
    fill: u16,
) -> Result<usize, EncodeError> {
    let total = buf.len() + FIXED_HEADER_LEN;
    buf.prepend_u8(FIXED_HEADER_LEN as u8)?;
    buf.prepend_u16(fill)?;
    buf.prepend_u8(hop_limit)?;
    buf.prepend_u16_len(total)?;
    buf.prepend_u8(packet_type)?;
    buf.prepend_u8(VERSION)?;
    Ok(FIXED_HEADER_LEN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::FragmentPosition;

    fn name(uri: &str) -> Prefix {
        Prefix::from_uri(uri, Suite::CcnTlv).unwrap()
    }

    #[test]
    fn test_interest_layout() {
        let bytes = CcnTlvCodec
            .encode_interest(&name("/a"), &InterestOptions::default())
            .unwrap();
        assert_eq!(
            bytes,
            [1, 0, 0, 21, 64, 0, 0, 8, 0, 1, 0, 9, 0, 0, 0, 5, 0, 1, 0, 1, b'a']
        );
        assert_eq!(header_length(&bytes), Some(8));
        assert_eq!(crate::suite::sniff(&bytes), Some(Suite::CcnTlv));

        let (packet, consumed) = CcnTlvCodec.decode(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(packet.kind(), PacketKind::Interest);
        assert_eq!(packet.prefix().unwrap(), &name("/a"));
        assert_eq!(
            packet.details(),
            &PacketDetails::CcnTlv(CcnTlvDetails {
                hop_limit: 64,
                end_chunk: None
            })
        );
    }

    #[test]
    fn test_content_roundtrip() {
        let prefix = name("/a/b").with_chunk(2).unwrap();
        let options = ContentOptions {
            final_block_id: Some(4),
            ..Default::default()
        };
        let bytes = CcnTlvCodec.encode_content(&prefix, b"hello", &options).unwrap();
        assert_eq!(bytes[4], DEFAULT_CONTENT_HOP_LIMIT);

        let (packet, _) = CcnTlvCodec.decode(&bytes).unwrap();
        assert_eq!(packet.kind(), PacketKind::Content);
        assert_eq!(packet.content().unwrap(), b"hello");
        assert_eq!(packet.final_block_id(), Some(4));
        assert_eq!(packet.prefix().unwrap().chunknum(), Some(2));
        assert_eq!(packet.prefix().unwrap().to_uri(), "/a/b/chunk=2");
    }

    #[test]
    fn test_payload_limits() {
        let payload = alloc::vec![7u8; 65000];
        let bytes = CcnTlvCodec
            .encode_content(&name("/big"), &payload, &ContentOptions::default())
            .unwrap();
        let (packet, _) = CcnTlvCodec.decode(&bytes).unwrap();
        assert_eq!(packet.content().unwrap().len(), 65000);

        let payload = alloc::vec![7u8; 65536];
        assert_eq!(
            CcnTlvCodec.encode_content(&name("/big"), &payload, &ContentOptions::default()),
            Err(EncodeError::ValueTooLong)
        );
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(CcnTlvCodec.decode(&[1, 0, 0]).unwrap_err(), DecodeError::TooShort);
        let mut bytes = CcnTlvCodec
            .encode_interest(&name("/a"), &InterestOptions::default())
            .unwrap();
        bytes[3] += 1;
        assert!(matches!(
            CcnTlvCodec.decode(&bytes),
            Err(DecodeError::LengthOverrun { .. })
        ));
        bytes[3] -= 1;
        bytes[1] = PT_DATA;
        assert_eq!(
            CcnTlvCodec.decode(&bytes).unwrap_err(),
            DecodeError::UnexpectedType(TL_INTEREST as u64)
        );
    }

    #[test]
    fn test_nack_and_fragment() {
        let mut bytes = CcnTlvCodec
            .encode_interest(&name("/a"), &InterestOptions::default())
            .unwrap();
        bytes[1] = PT_NACK;
        assert_eq!(CcnTlvCodec.decode(&bytes).unwrap().0.kind(), PacketKind::Nack);

        let header = FragmentHeader {
            position: FragmentPosition::Last,
            seqno: 300,
        };
        let frag = CcnTlvCodec.encode_fragment(header, b"xyz").unwrap();
        assert_eq!(frag.len(), 3 + FRAGMENT_OVERHEAD);
        let (packet, _) = CcnTlvCodec.decode(&frag).unwrap();
        assert_eq!(packet.fragment(), Some(header));
        assert_eq!(packet.content().unwrap(), b"xyz");
    }

    #[test]
    fn test_admits_exact_name_only() {
        let decode = |bytes: Vec<u8>| CcnTlvCodec.decode(&bytes).unwrap().0;
        let interest = decode(
            CcnTlvCodec
                .encode_interest(&name("/a/b"), &InterestOptions::default())
                .unwrap(),
        );
        let exact = decode(
            CcnTlvCodec
                .encode_content(&name("/a/b"), b"", &ContentOptions::default())
                .unwrap(),
        );
        let longer = decode(
            CcnTlvCodec
                .encode_content(&name("/a/b/c"), b"", &ContentOptions::default())
                .unwrap(),
        );
        assert!(CcnTlvCodec.admits(&interest, &exact, None));
        assert!(!CcnTlvCodec.admits(&interest, &longer, None));
    }
}
