//! CCNB, the binary XML encoding of CCNx 0.x.
//!
//! Every element starts with a header holding a number and a 3-bit token type.
//! Tagged elements nest until a zero byte closes them, BLOB and UDATA carry
//! `num` bytes of payload.

use core::ops::Range;

use alloc::{format, vec::Vec};

use super::{scratch_for, DecodeError, EncodeError, PrependBuffer, Reader, SuiteCodec};
use crate::{
    matching::{compare, content_admitted, MatchMode},
    packet::{CcnbDetails, ContentOptions, InterestOptions, Packet, PacketDetails, PacketKind},
    prefix::{chunk_component, chunk_of, Prefix},
    suite::Suite,
};

pub const TT_TAG: u8 = 1;
pub const TT_DTAG: u8 = 2;
pub const TT_ATTR: u8 = 3;
pub const TT_DATTR: u8 = 4;
pub const TT_BLOB: u8 = 5;
pub const TT_UDATA: u8 = 6;

pub const DTAG_NAME: usize = 14;
pub const DTAG_COMPONENT: usize = 15;
pub const DTAG_CONTENT: usize = 19;
pub const DTAG_SIGNED_INFO: usize = 20;
pub const DTAG_INTEREST: usize = 26;
pub const DTAG_NONCE: usize = 41;
pub const DTAG_SCOPE: usize = 42;
pub const DTAG_EXCLUDE: usize = 43;
pub const DTAG_ANSWER_ORIGIN_KIND: usize = 47;
pub const DTAG_FINAL_BLOCK_ID: usize = 59;
pub const DTAG_PUBLISHER_PUBKEY_DIGEST: usize = 60;
pub const DTAG_CONTENT_OBJECT: usize = 64;
pub const DTAG_MIN_SUFFIX_COMPONENTS: usize = 83;
pub const DTAG_MAX_SUFFIX_COMPONENTS: usize = 84;

const MAX_HEADER_BYTES: usize = 8;
const MAX_DEPTH: usize = 32;

enum Token {
    End,
    Element { num: usize, typ: u8 },
}

pub struct CcnbCodec;

impl SuiteCodec for CcnbCodec {
    fn suite(&self) -> Suite {
        Suite::Ccnb
    }

    fn decode(&self, bytes: &[u8]) -> Result<(Packet, usize), DecodeError> {
        let mut reader = Reader::new(bytes);
        let kind = match dehead(&mut reader)? {
            Token::Element {
                num: DTAG_INTEREST,
                typ: TT_DTAG,
            } => PacketKind::Interest,
            Token::Element {
                num: DTAG_CONTENT_OBJECT,
                typ: TT_DTAG,
            } => PacketKind::Content,
            Token::Element { num, .. } => return Err(DecodeError::UnexpectedType(num as u64)),
            Token::End => return Err(DecodeError::Malformed("empty CCNB element")),
        };

        let mut details = CcnbDetails::default();
        let mut prefix = None;
        let mut content = None;

        loop {
            let (num, typ) = match dehead(&mut reader)? {
                Token::End => break,
                Token::Element { num, typ } => (num, typ),
            };
            if typ != TT_DTAG {
                consume(&mut reader, typ, num, 1)?;
                continue;
            }
            match num {
                DTAG_NAME => prefix = Some(decode_name(bytes, &mut reader)?),
                DTAG_CONTENT => content = hunt_for_end(&mut reader, 1)?,
                DTAG_SIGNED_INFO => decode_signed_info(bytes, &mut reader, &mut details)?,
                DTAG_SCOPE
                | DTAG_ANSWER_ORIGIN_KIND
                | DTAG_MIN_SUFFIX_COMPONENTS
                | DTAG_MAX_SUFFIX_COMPONENTS
                | DTAG_NONCE
                | DTAG_PUBLISHER_PUBKEY_DIGEST => {
                    let value = value_of(bytes, hunt_for_end(&mut reader, 1)?);
                    match num {
                        DTAG_SCOPE if value.len() == 1 => {
                            // Only the local scopes survive, anything else is invalid
                            details.scope = match value[0] {
                                b @ b'0'..=b'2' => Some(b - b'0'),
                                _ => None,
                            };
                        }
                        DTAG_ANSWER_ORIGIN_KIND => {
                            details.answer_origin_kind = ascii_uint(value)? as u32
                        }
                        DTAG_MIN_SUFFIX_COMPONENTS => details.min_suffix = ascii_uint(value)?,
                        DTAG_MAX_SUFFIX_COMPONENTS => details.max_suffix = ascii_uint(value)?,
                        DTAG_NONCE => {
                            details.nonce.get_or_insert_with(|| value.to_vec());
                        }
                        DTAG_PUBLISHER_PUBKEY_DIGEST => {
                            details.ppkd.get_or_insert_with(|| value.to_vec());
                        }
                        _ => {}
                    }
                }
                _ => {
                    hunt_for_end(&mut reader, 1)?;
                }
            }
        }

        let consumed = reader.position();
        let prefix = prefix.ok_or(DecodeError::MissingName)?;
        let packet = Packet::new(
            kind,
            bytes[..consumed].to_vec(),
            Some(prefix),
            content,
            PacketDetails::Ccnb(details),
        );
        Ok((packet, consumed))
    }

    fn encode_interest(
        &self,
        prefix: &Prefix,
        options: &InterestOptions,
    ) -> Result<Vec<u8>, EncodeError> {
        let mut buf = scratch_for(prefix, 0);
        buf.prepend_u8(0)?;
        if let Some(nonce) = &options.nonce {
            prepend_field(&mut buf, DTAG_NONCE, TT_BLOB, nonce)?;
        }
        if let Some(scope) = options.scope {
            prepend_field(&mut buf, DTAG_SCOPE, TT_UDATA, format!("{}", scope).as_bytes())?;
        }
        if let Some(ppkd) = &options.ppkd {
            prepend_field(&mut buf, DTAG_PUBLISHER_PUBKEY_DIGEST, TT_BLOB, ppkd)?;
        }
        if let Some(max) = options.max_suffix {
            prepend_field(
                &mut buf,
                DTAG_MAX_SUFFIX_COMPONENTS,
                TT_UDATA,
                format!("{}", max).as_bytes(),
            )?;
        }
        if let Some(min) = options.min_suffix {
            prepend_field(
                &mut buf,
                DTAG_MIN_SUFFIX_COMPONENTS,
                TT_UDATA,
                format!("{}", min).as_bytes(),
            )?;
        }
        prepend_name(&mut buf, prefix)?;
        prepend_header(&mut buf, DTAG_INTEREST, TT_DTAG)?;
        Ok(buf.into_vec())
    }

    fn encode_content(
        &self,
        prefix: &Prefix,
        payload: &[u8],
        options: &ContentOptions,
    ) -> Result<Vec<u8>, EncodeError> {
        let mut buf = scratch_for(prefix, payload.len());
        buf.prepend_u8(0)?;
        prepend_field(&mut buf, DTAG_CONTENT, TT_BLOB, payload)?;
        if let Some(last) = options.final_block_id {
            let block = chunk_component(Suite::Ccnb, last)
                .map_err(|_| EncodeError::Unsupported(Suite::Ccnb))?;
            buf.prepend_u8(0)?;
            prepend_field(&mut buf, DTAG_FINAL_BLOCK_ID, TT_BLOB, &block)?;
            prepend_header(&mut buf, DTAG_SIGNED_INFO, TT_DTAG)?;
        }
        prepend_name(&mut buf, prefix)?;
        prepend_header(&mut buf, DTAG_CONTENT_OBJECT, TT_DTAG)?;
        Ok(buf.into_vec())
    }

    fn may_forward(&self, interest: &Packet) -> bool {
        matches!(interest.details(), PacketDetails::Ccnb(d) if matches!(d.scope, Some(s) if s > 2))
    }

    fn admits(&self, interest: &Packet, content: &Packet, digest: Option<&[u8]>) -> bool {
        let (PacketDetails::Ccnb(d), Some(wanted), Some(name)) =
            (interest.details(), interest.prefix(), content.prefix())
        else {
            return false;
        };
        if !content_admitted(wanted, d.min_suffix, d.max_suffix, name, digest) {
            return false;
        }
        match (&d.ppkd, content.details()) {
            (None, _) => true,
            (Some(wanted), PacketDetails::Ccnb(c)) => c.ppkd.as_ref() == Some(wanted),
            _ => false,
        }
    }

    fn same_interest(&self, a: &Packet, b: &Packet) -> bool {
        let (PacketDetails::Ccnb(da), PacketDetails::Ccnb(db), Some(pa), Some(pb)) =
            (a.details(), b.details(), a.prefix(), b.prefix())
        else {
            return false;
        };
        compare(pa, None, pb, MatchMode::Exact).is_match()
            && da.min_suffix == db.min_suffix
            && da.max_suffix == db.max_suffix
            && da.ppkd == db.ppkd
    }
}

fn dehead(reader: &mut Reader<'_>) -> Result<Token, DecodeError> {
    let mut c = reader.read_u8()?;
    if c == 0 {
        return Ok(Token::End);
    }
    let mut val: u64 = 0;
    for _ in 0..MAX_HEADER_BYTES {
        if c & 0x80 != 0 {
            let num = (val << 4) | ((c >> 3) & 0x0f) as u64;
            let num = usize::try_from(num)
                .map_err(|_| DecodeError::Malformed("CCNB header out of range"))?;
            return Ok(Token::Element { num, typ: c & 0x07 });
        }
        val = (val << 7) | c as u64;
        c = reader.read_u8()?;
    }
    Err(DecodeError::Malformed("CCNB header too long"))
}

// Skips one element, returning the range of the last BLOB or UDATA inside it
fn consume(
    reader: &mut Reader<'_>,
    typ: u8,
    num: usize,
    depth: usize,
) -> Result<Option<Range<usize>>, DecodeError> {
    match typ {
        TT_BLOB | TT_UDATA => {
            let start = reader.position();
            reader.read_bytes(num)?;
            Ok(Some(start..reader.position()))
        }
        TT_DTAG | TT_DATTR => hunt_for_end(reader, depth + 1),
        _ => Err(DecodeError::Malformed("unsupported CCNB token type")),
    }
}

fn hunt_for_end(reader: &mut Reader<'_>, depth: usize) -> Result<Option<Range<usize>>, DecodeError> {
    if depth > MAX_DEPTH {
        return Err(DecodeError::Malformed("CCNB nesting too deep"));
    }
    let mut last = None;
    loop {
        match dehead(reader)? {
            Token::End => return Ok(last),
            Token::Element { num, typ } => {
                if let Some(range) = consume(reader, typ, num, depth)? {
                    last = Some(range);
                }
            }
        }
    }
}

fn value_of(bytes: &[u8], range: Option<Range<usize>>) -> &[u8] {
    range.and_then(|r| bytes.get(r)).unwrap_or(&[])
}

fn decode_name(bytes: &[u8], reader: &mut Reader<'_>) -> Result<Prefix, DecodeError> {
    let mut prefix = Prefix::new(Suite::Ccnb);
    loop {
        match dehead(reader)? {
            Token::End => break,
            Token::Element {
                num: DTAG_COMPONENT,
                typ: TT_DTAG,
            } => {
                let value = value_of(bytes, hunt_for_end(reader, 2)?);
                prefix.push_wire(value.to_vec())?;
            }
            Token::Element { num, typ } => {
                consume(reader, typ, num, 2)?;
            }
        }
    }
    prefix.strip_nfn_markers();
    Ok(prefix)
}

fn decode_signed_info(
    bytes: &[u8],
    reader: &mut Reader<'_>,
    details: &mut CcnbDetails,
) -> Result<(), DecodeError> {
    loop {
        match dehead(reader)? {
            Token::End => return Ok(()),
            Token::Element {
                num: DTAG_FINAL_BLOCK_ID,
                typ: TT_DTAG,
            } => {
                let value = value_of(bytes, hunt_for_end(reader, 2)?);
                details.final_block_id = chunk_of(Suite::Ccnb, value);
            }
            Token::Element {
                num: DTAG_PUBLISHER_PUBKEY_DIGEST,
                typ: TT_DTAG,
            } => {
                let value = value_of(bytes, hunt_for_end(reader, 2)?);
                details.ppkd = Some(value.to_vec());
            }
            Token::Element { num, typ } => {
                consume(reader, typ, num, 2)?;
            }
        }
    }
}

fn ascii_uint(value: &[u8]) -> Result<usize, DecodeError> {
    if value.is_empty() || !value.iter().all(u8::is_ascii_digit) {
        return Err(DecodeError::Malformed("CCNB selector is not a decimal number"));
    }
    core::str::from_utf8(value)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(DecodeError::Malformed("CCNB selector out of range"))
}

fn prepend_header(buf: &mut PrependBuffer, num: usize, tt: u8) -> Result<usize, EncodeError> {
    let mut written = buf.prepend_u8(0x80 | ((num & 0x0f) as u8) << 3 | tt)?;
    let mut rest = num >> 4;
    while rest > 0 {
        written += buf.prepend_u8((rest & 0x7f) as u8)?;
        rest >>= 7;
    }
    Ok(written)
}

// DTAG element holding a single BLOB or UDATA
fn prepend_field(
    buf: &mut PrependBuffer,
    dtag: usize,
    tt: u8,
    value: &[u8],
) -> Result<usize, EncodeError> {
    let mut n = buf.prepend_u8(0)?;
    n += buf.prepend_slice(value)?;
    n += prepend_header(buf, value.len(), tt)?;
    Ok(n + prepend_header(buf, dtag, TT_DTAG)?)
}

fn prepend_name(buf: &mut PrependBuffer, prefix: &Prefix) -> Result<usize, EncodeError> {
    let end = buf.len();
    buf.prepend_u8(0)?;
    for component in prefix.encoded_components().iter().rev() {
        prepend_field(buf, DTAG_COMPONENT, TT_BLOB, component)?;
    }
    prepend_header(buf, DTAG_NAME, TT_DTAG)?;
    Ok(buf.len() - end)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(uri: &str) -> Prefix {
        Prefix::from_uri(uri, Suite::Ccnb).unwrap()
    }

    #[test]
    fn test_header_encoding() {
        let mut buf = PrependBuffer::new(8);
        prepend_header(&mut buf, DTAG_INTEREST, TT_DTAG).unwrap();
        assert_eq!(buf.as_slice(), &[0x01, 0xd2]);

        let mut buf = PrependBuffer::new(8);
        prepend_header(&mut buf, DTAG_CONTENT_OBJECT, TT_DTAG).unwrap();
        assert_eq!(buf.as_slice(), &[0x04, 0x82]);

        let mut buf = PrependBuffer::new(8);
        prepend_header(&mut buf, 3000, TT_BLOB).unwrap();
        let mut reader = Reader::new(buf.as_slice());
        assert!(matches!(
            dehead(&mut reader),
            Ok(Token::Element {
                num: 3000,
                typ: TT_BLOB
            })
        ));
    }

    #[test]
    fn test_interest_roundtrip() {
        let options = InterestOptions {
            nonce: Some([1, 2, 3, 4]),
            min_suffix: Some(1),
            max_suffix: Some(3),
            ..Default::default()
        };
        let bytes = CcnbCodec.encode_interest(&name("/a/b"), &options).unwrap();
        assert_eq!(&bytes[..2], &[0x01, 0xd2]);
        assert_eq!(crate::suite::sniff(&bytes), Some(Suite::Ccnb));

        let (packet, consumed) = CcnbCodec.decode(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(packet.kind(), PacketKind::Interest);
        assert_eq!(packet.prefix().unwrap(), &name("/a/b"));
        assert_eq!(packet.nonce(), Some(&[1u8, 2, 3, 4][..]));
        let PacketDetails::Ccnb(d) = packet.details() else {
            panic!("wrong suite");
        };
        assert_eq!(d.min_suffix, 1);
        assert_eq!(d.max_suffix, 3);
        assert_eq!(d.scope, Some(3));
        assert!(CcnbCodec.may_forward(&packet));
    }

    #[test]
    fn test_scope() {
        for (scope, expected, forwards) in [(2u8, Some(2), false), (7, None, false)] {
            let options = InterestOptions {
                scope: Some(scope),
                ..Default::default()
            };
            let bytes = CcnbCodec.encode_interest(&name("/a"), &options).unwrap();
            let (packet, _) = CcnbCodec.decode(&bytes).unwrap();
            let PacketDetails::Ccnb(d) = packet.details() else {
                panic!("wrong suite");
            };
            assert_eq!(d.scope, expected);
            assert_eq!(CcnbCodec.may_forward(&packet), forwards);
        }
    }

    #[test]
    fn test_content_roundtrip() {
        let prefix = name("/a").with_chunk(0).unwrap();
        let options = ContentOptions {
            final_block_id: Some(2),
            ..Default::default()
        };
        let payload = alloc::vec![0x5a; 5000];
        let bytes = CcnbCodec.encode_content(&prefix, &payload, &options).unwrap();
        assert_eq!(&bytes[..2], &[0x04, 0x82]);

        let (packet, consumed) = CcnbCodec.decode(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(packet.kind(), PacketKind::Content);
        assert_eq!(packet.content().unwrap(), &payload[..]);
        assert_eq!(packet.final_block_id(), Some(2));
        assert_eq!(packet.prefix().unwrap().chunknum(), Some(0));
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(CcnbCodec.decode(&[]).unwrap_err(), DecodeError::TooShort);
        // Interest without a closing byte
        assert_eq!(CcnbCodec.decode(&[0x01, 0xd2]).unwrap_err(), DecodeError::TooShort);
        assert_eq!(
            CcnbCodec.decode(&[0x01, 0xd2, 0x00]).unwrap_err(),
            DecodeError::MissingName
        );
        assert_eq!(
            CcnbCodec.decode(&[0xf2, 0x00]).unwrap_err(),
            DecodeError::UnexpectedType(14)
        );

        let mut nested = alloc::vec![0x01, 0xd2];
        for _ in 0..40 {
            nested.extend_from_slice(&[0x01, 0xd2]);
        }
        assert_eq!(
            CcnbCodec.decode(&nested).unwrap_err(),
            DecodeError::Malformed("CCNB nesting too deep")
        );
    }

    #[test]
    fn test_ppkd_restricts_admission() {
        let interest = InterestOptions {
            ppkd: Some(alloc::vec![7; 32]),
            ..Default::default()
        };
        let interest = CcnbCodec.encode_interest(&name("/a"), &interest).unwrap();
        let interest = CcnbCodec.decode(&interest).unwrap().0;
        let content = CcnbCodec
            .encode_content(&name("/a/b"), b"x", &ContentOptions::default())
            .unwrap();
        let content = CcnbCodec.decode(&content).unwrap().0;
        assert!(!CcnbCodec.admits(&interest, &content, None));

        let open = CcnbCodec
            .encode_interest(&name("/a"), &InterestOptions::default())
            .unwrap();
        let open = CcnbCodec.decode(&open).unwrap().0;
        assert!(CcnbCodec.admits(&open, &content, None));
        assert!(!CcnbCodec.same_interest(&open, &interest));
    }
}
