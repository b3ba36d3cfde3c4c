//! IOT TLV: one-byte type-length headers where they fit, otherwise a zero byte
//! followed by var-number type and length. Framed by the encoding switch.

use core::ops::Range;

use alloc::vec::Vec;

use super::{scratch_for, switch, DecodeError, EncodeError, PrependBuffer, Reader, SuiteCodec};
use crate::{
    matching::{compare, content_admitted, MatchMode},
    packet::{
        ContentOptions, FragmentHeader, InterestOptions, IotTlvDetails, Packet, PacketDetails,
        PacketKind,
    },
    prefix::Prefix,
    suite::Suite,
};

pub const TLV_FRAGMENT: u64 = 0x1;
pub const TLV_REQUEST: u64 = 0x2;
pub const TLV_REPLY: u64 = 0x3;

pub const TLV_F_FLAGS_AND_SEQ: u64 = 0x1;
pub const TLV_F_DATA: u64 = 0x2;

pub const TLV_R_OPT_HEADER: u64 = 0x0;
pub const TLV_R_NAME: u64 = 0x1;
pub const TLV_R_PAYLOAD: u64 = 0x2;
pub const TLV_R_VALIDATION: u64 = 0x3;

pub const TLV_H_HOP_LIMIT: u64 = 0x0;
pub const TLV_N_PATH_NAME: u64 = 0x0;
pub const TLV_PN_COMPONENT: u64 = 0x1;
pub const TLV_PL_DATA: u64 = 0x1;

pub const DEFAULT_TTL: u8 = 5;

// Outer and data headers in long form, flags/seq in short form, plus the switch
const FRAGMENT_OVERHEAD: usize = 13 + 2;

pub struct IotTlvCodec;

impl SuiteCodec for IotTlvCodec {
    fn suite(&self) -> Suite {
        Suite::IotTlv
    }

    fn decode(&self, bytes: &[u8]) -> Result<(Packet, usize), DecodeError> {
        let mut reader = Reader::new(bytes);
        let (typ, len) = read_tl(&mut reader)?;
        let mut body = reader.sub(len)?;
        let consumed = reader.position();

        let header = switch::header(Suite::IotTlv);
        let mut buffer = Vec::with_capacity(header.len() + consumed);
        buffer.extend_from_slice(&header);
        buffer.extend_from_slice(&bytes[..consumed]);
        let shift = |r: Range<usize>| r.start + header.len()..r.end + header.len();

        let packet = match typ {
            TLV_FRAGMENT => {
                let mut word = None;
                let mut data = None;
                while !body.is_empty() {
                    let (t, l) = read_tl(&mut body)?;
                    let mut value = body.sub(l)?;
                    match t {
                        TLV_F_FLAGS_AND_SEQ if l == 2 => word = Some(value.read_u16()?),
                        TLV_F_DATA => data = Some(value.range()),
                        _ => {}
                    }
                }
                match (word, data) {
                    (Some(word), Some(data)) => Packet::fragment_of(
                        buffer,
                        FragmentHeader::from_word(word),
                        shift(data),
                        PacketDetails::IotTlv(IotTlvDetails::default()),
                    ),
                    _ => return Err(DecodeError::Malformed("incomplete IOT fragment")),
                }
            }
            TLV_REQUEST | TLV_REPLY => {
                let mut details = IotTlvDetails::default();
                let mut prefix = None;
                let mut content = None;
                while !body.is_empty() {
                    let (t, l) = read_tl(&mut body)?;
                    let mut value = body.sub(l)?;
                    match t {
                        TLV_R_OPT_HEADER => {
                            while !value.is_empty() {
                                let (h, hl) = read_tl(&mut value)?;
                                let at = value.position();
                                let field = value.read_bytes(hl)?;
                                if h == TLV_H_HOP_LIMIT && hl == 1 {
                                    details.ttl = Some(field[0]);
                                    details.ttl_offset = at + header.len();
                                }
                            }
                        }
                        TLV_R_NAME => {
                            while !value.is_empty() {
                                let (n, nl) = read_tl(&mut value)?;
                                let mut path = value.sub(nl)?;
                                if n == TLV_N_PATH_NAME {
                                    prefix = Some(decode_path_name(&mut path)?);
                                }
                            }
                        }
                        TLV_R_PAYLOAD => {
                            if !value.is_empty() {
                                let (p, pl) = read_tl(&mut value)?;
                                let data = value.sub(pl)?;
                                if p == TLV_PL_DATA {
                                    content = Some(shift(data.range()));
                                }
                            }
                        }
                        _ => {}
                    }
                }
                let kind = if typ == TLV_REQUEST {
                    PacketKind::Interest
                } else {
                    PacketKind::Content
                };
                let prefix = prefix.ok_or(DecodeError::MissingName)?;
                Packet::new(kind, buffer, Some(prefix), content, PacketDetails::IotTlv(details))
            }
            other => return Err(DecodeError::UnexpectedType(other)),
        };
        Ok((packet, consumed))
    }

    fn encode_interest(
        &self,
        prefix: &Prefix,
        options: &InterestOptions,
    ) -> Result<Vec<u8>, EncodeError> {
        let mut buf = scratch_for(prefix, 0);
        prepend_name(&mut buf, prefix)?;

        let before = buf.len();
        buf.prepend_u8(options.hop_limit.unwrap_or(DEFAULT_TTL))?;
        prepend_tl(&mut buf, TLV_H_HOP_LIMIT, 1)?;
        let opt = buf.len() - before;
        prepend_tl(&mut buf, TLV_R_OPT_HEADER, opt)?;

        let total = buf.len();
        prepend_tl(&mut buf, TLV_REQUEST, total)?;
        switch::prepend(Suite::IotTlv, &mut buf)?;
        Ok(buf.into_vec())
    }

    fn encode_content(
        &self,
        prefix: &Prefix,
        payload: &[u8],
        _options: &ContentOptions,
    ) -> Result<Vec<u8>, EncodeError> {
        let mut buf = scratch_for(prefix, payload.len());
        let n = prepend_blob(&mut buf, TLV_PL_DATA, payload)?;
        prepend_tl(&mut buf, TLV_R_PAYLOAD, n)?;
        prepend_name(&mut buf, prefix)?;
        let total = buf.len();
        prepend_tl(&mut buf, TLV_REPLY, total)?;
        switch::prepend(Suite::IotTlv, &mut buf)?;
        Ok(buf.into_vec())
    }

    fn fragment_overhead(&self) -> Option<usize> {
        Some(FRAGMENT_OVERHEAD)
    }

    fn encode_fragment(&self, header: FragmentHeader, data: &[u8]) -> Result<Vec<u8>, EncodeError> {
        let mut buf = PrependBuffer::new(data.len() + FRAGMENT_OVERHEAD);
        prepend_blob(&mut buf, TLV_F_DATA, data)?;
        buf.prepend_u16(header.to_word())?;
        prepend_tl(&mut buf, TLV_F_FLAGS_AND_SEQ, 2)?;
        let total = buf.len();
        prepend_tl(&mut buf, TLV_FRAGMENT, total)?;
        switch::prepend(Suite::IotTlv, &mut buf)?;
        Ok(buf.into_vec())
    }

    fn may_forward(&self, interest: &Packet) -> bool {
        !matches!(interest.details(), PacketDetails::IotTlv(IotTlvDetails { ttl: Some(0), .. }))
    }

    fn admits(&self, interest: &Packet, content: &Packet, digest: Option<&[u8]>) -> bool {
        match (interest.prefix(), content.prefix()) {
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

fn read_tl(reader: &mut Reader<'_>) -> Result<(u64, usize), DecodeError> {
    let first = reader.read_u8()?;
    if first != 0 {
        return Ok(((first >> 6) as u64, (first & 0x3f) as usize));
    }
    let typ = reader.read_var_number()?;
    let len = reader.read_length()?;
    Ok((typ, len))
}

fn decode_path_name(reader: &mut Reader<'_>) -> Result<Prefix, DecodeError> {
    let mut prefix = Prefix::new(Suite::IotTlv);
    while !reader.is_empty() {
        let (typ, len) = read_tl(reader)?;
        let value = reader.read_bytes(len)?;
        if typ == TLV_PN_COMPONENT {
            prefix.push_wire(value.to_vec())?;
        }
    }
    prefix.strip_nfn_markers();
    Ok(prefix)
}

fn prepend_tl(buf: &mut PrependBuffer, typ: u64, len: usize) -> Result<usize, EncodeError> {
    if typ < 4 && len < 64 {
        let b = (typ as u8) << 6 | len as u8;
        // 0x80 would read as an encoding switch
        if b != 0 && b != switch::SWITCH_MAGIC {
            return buf.prepend_u8(b);
        }
    }
    let n = buf.prepend_var_number(len as u64)?;
    let t = buf.prepend_var_number(typ)?;
    Ok(n + t + buf.prepend_u8(0)?)
}

fn prepend_blob(buf: &mut PrependBuffer, typ: u64, value: &[u8]) -> Result<usize, EncodeError> {
    let n = buf.prepend_slice(value)?;
    Ok(n + prepend_tl(buf, typ, n)?)
}

fn prepend_name(buf: &mut PrependBuffer, prefix: &Prefix) -> Result<usize, EncodeError> {
    let end = buf.len();
    for component in prefix.encoded_components().iter().rev() {
        prepend_blob(buf, TLV_PN_COMPONENT, component)?;
    }
    let path = buf.len() - end;
    prepend_tl(buf, TLV_N_PATH_NAME, path)?;
    let name = buf.len() - end;
    prepend_tl(buf, TLV_R_NAME, name)?;
    Ok(buf.len() - end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::FragmentPosition;

    fn name(uri: &str) -> Prefix {
        Prefix::from_uri(uri, Suite::IotTlv).unwrap()
    }

    #[test]
    fn test_request_layout() {
        let bytes = IotTlvCodec
            .encode_interest(&name("/a"), &InterestOptions::default())
            .unwrap();
        // switch, Request, OptHeader{HopLim 5}, Name{PathName{Component "a"}}
        assert_eq!(
            bytes,
            [0x80, 3, 0x87, 0x02, 0x01, 5, 0x43, 0x02, 0x41, b'a']
        );
        let (packet, consumed) = IotTlvCodec.decode(&bytes[2..]).unwrap();
        assert_eq!(consumed, 8);
        assert_eq!(packet.bytes(), &bytes[..]);
        assert_eq!(packet.kind(), PacketKind::Interest);
        assert_eq!(packet.prefix().unwrap(), &name("/a"));
        assert!(IotTlvCodec.may_forward(&packet));
    }

    #[test]
    fn test_zero_ttl_is_not_forwarded() {
        let options = InterestOptions {
            hop_limit: Some(0),
            ..Default::default()
        };
        let bytes = IotTlvCodec.encode_interest(&name("/a"), &options).unwrap();
        let (packet, _) = IotTlvCodec.decode(&bytes[2..]).unwrap();
        assert!(!IotTlvCodec.may_forward(&packet));
    }

    #[test]
    fn test_forwarded_request_carries_lowered_ttl() {
        let options = InterestOptions {
            hop_limit: Some(3),
            ..Default::default()
        };
        let bytes = IotTlvCodec.encode_interest(&name("/a"), &options).unwrap();
        let (packet, _) = IotTlvCodec.decode(&bytes[2..]).unwrap();
        let lowered = packet.with_decremented_hop_limit().unwrap();

        let (again, _) = IotTlvCodec.decode(&lowered.bytes()[2..]).unwrap();
        assert!(matches!(
            again.details(),
            PacketDetails::IotTlv(IotTlvDetails { ttl: Some(2), .. })
        ));
        assert_eq!(again.prefix().unwrap(), &name("/a"));
    }

    #[test]
    fn test_reply_roundtrip() {
        let payload = alloc::vec![1u8; 300];
        let bytes = IotTlvCodec
            .encode_content(&name("/a/b"), &payload, &ContentOptions::default())
            .unwrap();
        let (packet, _) = IotTlvCodec.decode(&bytes[2..]).unwrap();
        assert_eq!(packet.kind(), PacketKind::Content);
        assert_eq!(packet.content().unwrap(), &payload[..]);
    }

    #[test]
    fn test_long_form_avoids_switch_byte() {
        let mut buf = PrependBuffer::new(8);
        prepend_tl(&mut buf, TLV_REQUEST, 0).unwrap();
        assert_eq!(buf.as_slice(), &[0, 2, 0]);
        let mut reader = Reader::new(buf.as_slice());
        assert_eq!(read_tl(&mut reader), Ok((TLV_REQUEST, 0)));
    }

    #[test]
    fn test_fragment() {
        let header = FragmentHeader {
            position: FragmentPosition::Middle,
            seqno: 2,
        };
        let bytes = IotTlvCodec.encode_fragment(header, &[9; 100]).unwrap();
        assert!(bytes.len() <= 100 + FRAGMENT_OVERHEAD);
        let (packet, _) = IotTlvCodec.decode(&bytes[2..]).unwrap();
        assert_eq!(packet.fragment(), Some(header));
        assert_eq!(packet.content().unwrap(), &[9; 100]);
    }
}
