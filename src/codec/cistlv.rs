//! Cisco TLV: fixed 8-byte header, 16-bit types and lengths. Always framed
//! by the encoding switch, which is kept at the front of the stored buffer.

use core::ops::Range;

use alloc::vec::Vec;

use super::{be_uint_field, scratch_for, switch, DecodeError, EncodeError, PrependBuffer, Reader, SuiteCodec};
use crate::{
    matching::{compare, MatchMode},
    packet::{CisTlvDetails, ContentOptions, InterestOptions, Packet, PacketDetails, PacketKind},
    prefix::Prefix,
    suite::Suite,
};

pub const VERSION: u8 = 1;
pub const FIXED_HEADER_LEN: usize = 8;

pub const PT_INTEREST: u8 = 1;
pub const PT_CONTENT: u8 = 2;
pub const PT_NACK: u8 = 3;

pub const TLV_INTEREST: u16 = 1;
pub const TLV_CONTENT: u16 = 2;
pub const TLV_NAME: u16 = 1;
pub const TLV_NAME_COMPONENT: u16 = 1;
pub const TLV_NAME_SEGMENT: u16 = 2;
pub const TLV_CONTENT_DATA: u16 = 4;
pub const TLV_FINAL_SEGMENT_ID: u16 = 15;

pub const DEFAULT_HOP_LIMIT: u8 = 64;

pub struct CisTlvCodec;

impl SuiteCodec for CisTlvCodec {
    fn suite(&self) -> Suite {
        Suite::CisTlv
    }

    fn decode(&self, bytes: &[u8]) -> Result<(Packet, usize), DecodeError> {
        let mut reader = Reader::new(bytes);
        if reader.read_u8()? != VERSION {
            return Err(DecodeError::Malformed("unsupported Cisco TLV version"));
        }
        let packet_type = reader.read_u8()?;
        let packet_len = reader.read_u16()? as usize;
        let hop_limit = reader.read_u8()?;
        let _flags = reader.read_u8()?;
        let _reserved = reader.read_u8()?;
        let header_len = reader.read_u8()? as usize;
        if header_len < FIXED_HEADER_LEN || packet_len < header_len {
            return Err(DecodeError::Malformed("bad Cisco TLV header length"));
        }
        if packet_len > bytes.len() {
            return Err(DecodeError::LengthOverrun {
                declared: packet_len,
                available: bytes.len(),
            });
        }

        let bytes = &bytes[..packet_len];
        let mut body = Reader::new(bytes);
        body.read_bytes(header_len)?;

        let kind = match packet_type {
            PT_INTEREST => PacketKind::Interest,
            PT_CONTENT => PacketKind::Content,
            PT_NACK => PacketKind::Nack,
            other => return Err(DecodeError::UnexpectedType(other as u64)),
        };
        let typ = body.read_u16()?;
        if typ != TLV_INTEREST && typ != TLV_CONTENT {
            return Err(DecodeError::UnexpectedType(typ as u64));
        }
        let len = body.read_u16()? as usize;
        let mut message = body.sub(len)?;

        let mut details = CisTlvDetails {
            hop_limit,
            final_segment: None,
        };
        let mut prefix = None;
        let mut content: Option<Range<usize>> = None;
        while !message.is_empty() {
            let t = message.read_u16()?;
            let l = message.read_u16()? as usize;
            let mut value = message.sub(l)?;
            match t {
                TLV_NAME => prefix = Some(decode_name(bytes, &mut value)?),
                TLV_FINAL_SEGMENT_ID => {
                    details.final_segment = u32::try_from(be_uint_field(value.read_bytes(l)?)?).ok()
                }
                TLV_CONTENT_DATA => content = Some(value.range()),
                _ => {}
            }
        }
        let prefix = prefix.ok_or(DecodeError::MissingName)?;

        let header = switch::header(Suite::CisTlv);
        let mut buffer = Vec::with_capacity(header.len() + bytes.len());
        buffer.extend_from_slice(&header);
        buffer.extend_from_slice(bytes);
        let content = content.map(|r| r.start + header.len()..r.end + header.len());

        Ok((
            Packet::new(kind, buffer, Some(prefix), content, PacketDetails::CisTlv(details)),
            packet_len,
        ))
    }

    fn encode_interest(
        &self,
        prefix: &Prefix,
        options: &InterestOptions,
    ) -> Result<Vec<u8>, EncodeError> {
        let mut buf = scratch_for(prefix, 0);
        prepend_name(&mut buf, prefix)?;
        let len = buf.len();
        buf.prepend_tl16(TLV_INTEREST, len)?;
        prepend_fixed_header(
            &mut buf,
            PT_INTEREST,
            options.hop_limit.unwrap_or(DEFAULT_HOP_LIMIT),
        )?;
        switch::prepend(Suite::CisTlv, &mut buf)?;
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
        buf.prepend_tl16(TLV_CONTENT_DATA, n)?;
        if let Some(last) = options.final_block_id {
            let n = buf.prepend_u32(last)?;
            buf.prepend_tl16(TLV_FINAL_SEGMENT_ID, n)?;
        }
        prepend_name(&mut buf, prefix)?;
        let len = buf.len();
        buf.prepend_tl16(TLV_CONTENT, len)?;
        prepend_fixed_header(
            &mut buf,
            PT_CONTENT,
            options.hop_limit.unwrap_or(DEFAULT_HOP_LIMIT),
        )?;
        switch::prepend(Suite::CisTlv, &mut buf)?;
        Ok(buf.into_vec())
    }

    fn admits(&self, interest: &Packet, content: &Packet, _digest: Option<&[u8]>) -> bool {
        match (interest.prefix(), content.prefix()) {
            (Some(wanted), Some(name)) => compare(name, None, wanted, MatchMode::Exact).is_match(),
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
    let mut prefix = Prefix::new(Suite::CisTlv);
    while !reader.is_empty() {
        let start = reader.position();
        let typ = reader.read_u16()?;
        let len = reader.read_u16()? as usize;
        reader.read_bytes(len)?;
        if typ == TLV_NAME_COMPONENT || typ == TLV_NAME_SEGMENT {
            prefix.push_wire(bytes[start..reader.position()].to_vec())?;
        }
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
    Ok(inner + buf.prepend_tl16(TLV_NAME, inner)?)
}

fn prepend_fixed_header(
    buf: &mut PrependBuffer,
    packet_type: u8,
    hop_limit: u8,
) -> Result<usize, EncodeError> {
    let total = buf.len() + FIXED_HEADER_LEN;
    buf.prepend_u8(FIXED_HEADER_LEN as u8)?;
    buf.prepend_u8(0)?;
    buf.prepend_u8(0)?;
    buf.prepend_u8(hop_limit)?;
    buf.prepend_u16_len(total)?;
    buf.prepend_u8(packet_type)?;
    buf.prepend_u8(VERSION)?;
    Ok(FIXED_HEADER_LEN)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(uri: &str) -> Prefix {
        Prefix::from_uri(uri, Suite::CisTlv).unwrap()
    }

    #[test]
    fn test_interest_is_switch_framed() {
        let bytes = CisTlvCodec
            .encode_interest(&name("/a"), &InterestOptions::default())
            .unwrap();
        assert_eq!(
            bytes,
            [0x80, 5, 1, 1, 0, 21, 64, 0, 0, 8, 0, 1, 0, 9, 0, 1, 0, 5, 0, 1, 0, 1, b'a']
        );

        let (suite, skip) = switch::dehead(&bytes).unwrap().unwrap();
        assert_eq!(suite, Suite::CisTlv);
        let (packet, consumed) = CisTlvCodec.decode(&bytes[skip..]).unwrap();
        assert_eq!(consumed, bytes.len() - skip);
        assert_eq!(packet.bytes(), &bytes[..]);
        assert_eq!(packet.kind(), PacketKind::Interest);
        assert_eq!(packet.prefix().unwrap(), &name("/a"));
    }

    #[test]
    fn test_content_roundtrip() {
        let prefix = name("/x").with_chunk(1).unwrap();
        let options = ContentOptions {
            final_block_id: Some(1),
            ..Default::default()
        };
        let bytes = CisTlvCodec.encode_content(&prefix, b"data", &options).unwrap();
        let (packet, _) = CisTlvCodec.decode(&bytes[2..]).unwrap();
        assert_eq!(packet.content().unwrap(), b"data");
        assert_eq!(packet.final_block_id(), Some(1));
        assert_eq!(packet.prefix().unwrap().chunknum(), Some(1));
        assert_eq!(packet.bytes(), &bytes[..]);
    }

    #[test]
    fn test_admits_exact_only() {
        let decode = |bytes: Vec<u8>| CisTlvCodec.decode(&bytes[2..]).unwrap().0;
        let interest = decode(
            CisTlvCodec
                .encode_interest(&name("/a"), &InterestOptions::default())
                .unwrap(),
        );
        let exact = decode(
            CisTlvCodec
                .encode_content(&name("/a"), b"", &ContentOptions::default())
                .unwrap(),
        );
        let longer = decode(
            CisTlvCodec
                .encode_content(&name("/a/b"), b"", &ContentOptions::default())
                .unwrap(),
        );
        assert!(CisTlvCodec.admits(&interest, &exact, None));
        assert!(!CisTlvCodec.admits(&interest, &longer, None));
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(
            CisTlvCodec.decode(&[1, 9, 0, 8, 0, 0, 0, 8]).unwrap_err(),
            DecodeError::UnexpectedType(9)
        );
        assert_eq!(
            CisTlvCodec.decode(&[2, 1, 0, 8, 0, 0, 0, 8]).unwrap_err(),
            DecodeError::Malformed("unsupported Cisco TLV version")
        );
        assert!(matches!(
            CisTlvCodec.decode(&[1, 1, 0, 40, 0, 0, 0, 8]),
            Err(DecodeError::LengthOverrun { .. })
        ));
    }
}
