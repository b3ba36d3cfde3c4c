//! NDN TLV: variable-length types and lengths, NDNLPv1 begin/end fragments.

use alloc::vec::Vec;

use super::{
    be_uint_field, scratch_for, DecodeError, EncodeError, PrependBuffer, Reader, SuiteCodec,
};
use crate::{
    matching::{compare, content_admitted, MatchMode},
    packet::{
        ContentOptions, FragmentHeader, InterestOptions, NdnTlvDetails, Packet, PacketDetails,
        PacketKind,
    },
    prefix::Prefix,
    suite::Suite,
};

pub const TLV_INTEREST: u64 = 0x05;
pub const TLV_DATA: u64 = 0x06;
pub const TLV_NAME: u64 = 0x07;
pub const TLV_NAME_COMPONENT: u64 = 0x08;
pub const TLV_SELECTORS: u64 = 0x09;
pub const TLV_NONCE: u64 = 0x0a;
pub const TLV_SCOPE: u64 = 0x0b;
pub const TLV_INTEREST_LIFETIME: u64 = 0x0c;
pub const TLV_MIN_SUFFIX_COMPONENTS: u64 = 0x0d;
pub const TLV_MAX_SUFFIX_COMPONENTS: u64 = 0x0e;
pub const TLV_PUBLISHER_PUBLIC_KEY_LOCATOR: u64 = 0x0f;
pub const TLV_EXCLUDE: u64 = 0x10;
pub const TLV_CHILD_SELECTOR: u64 = 0x11;
pub const TLV_MUST_BE_FRESH: u64 = 0x12;
pub const TLV_META_INFO: u64 = 0x14;
pub const TLV_CONTENT: u64 = 0x15;
pub const TLV_SIGNATURE_INFO: u64 = 0x16;
pub const TLV_SIGNATURE_VALUE: u64 = 0x17;
pub const TLV_CONTENT_TYPE: u64 = 0x18;
pub const TLV_FRESHNESS_PERIOD: u64 = 0x19;
pub const TLV_FINAL_BLOCK_ID: u64 = 0x1a;
pub const TLV_SIGNATURE_TYPE: u64 = 0x1b;

pub const TLV_NDNLP: u64 = 0x64;
pub const TLV_NDNLP_FRAGMENT: u64 = 0x52;
pub const TLV_NDNLP_BEGIN_END_FIELDS: u64 = 0x5c;

// DigestSha256
const SIGNATURE_TYPE_DIGEST: u64 = 0;

// Outer TL, begin/end field and fragment TL at their widest
const FRAGMENT_OVERHEAD: usize = 12;

pub struct NdnTlvCodec;

impl SuiteCodec for NdnTlvCodec {
    fn suite(&self) -> Suite {
        Suite::NdnTlv
    }

    fn decode(&self, bytes: &[u8]) -> Result<(Packet, usize), DecodeError> {
        let mut reader = Reader::new(bytes);
        let typ = reader.read_var_number()?;
        let len = reader.read_length()?;
        let body = reader.sub(len)?;
        let consumed = reader.position();
        let buffer = bytes[..consumed].to_vec();

        let packet = match typ {
            TLV_INTEREST => decode_message(PacketKind::Interest, buffer, body)?,
            TLV_DATA => decode_message(PacketKind::Content, buffer, body)?,
            TLV_NDNLP => decode_fragment(buffer, body)?,
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

        // Scope 3 and above is the default and stays implicit
        if let Some(scope) = options.scope.filter(|s| *s <= 2) {
            prepend_non_neg(&mut buf, TLV_SCOPE, scope as u64)?;
        }
        if let Some(lifetime) = options.interest_lifetime {
            prepend_non_neg(&mut buf, TLV_INTEREST_LIFETIME, lifetime)?;
        }
        let nonce = options.nonce.unwrap_or_else(|| derived_nonce(prefix, options));
        prepend_blob(&mut buf, TLV_NONCE, &nonce)?;

        let selectors_end = buf.len();
        if options.must_be_fresh {
            prepend_tl(&mut buf, TLV_MUST_BE_FRESH, 0)?;
        }
        if let Some(max) = options.max_suffix {
            prepend_non_neg(&mut buf, TLV_MAX_SUFFIX_COMPONENTS, max as u64)?;
        }
        if let Some(min) = options.min_suffix {
            prepend_non_neg(&mut buf, TLV_MIN_SUFFIX_COMPONENTS, min as u64)?;
        }
        let selectors_len = buf.len() - selectors_end;
        if selectors_len > 0 {
            prepend_tl(&mut buf, TLV_SELECTORS, selectors_len)?;
        }

        prepend_name(&mut buf, prefix)?;
        let total = buf.len();
        prepend_tl(&mut buf, TLV_INTEREST, total)?;
        Ok(buf.into_vec())
    }

    fn encode_content(
        &self,
        prefix: &Prefix,
        payload: &[u8],
        options: &ContentOptions,
    ) -> Result<Vec<u8>, EncodeError> {
        let mut buf = scratch_for(prefix, payload.len());

        prepend_tl(&mut buf, TLV_SIGNATURE_VALUE, 0)?;
        let sig_info = prepend_non_neg(&mut buf, TLV_SIGNATURE_TYPE, SIGNATURE_TYPE_DIGEST)?;
        prepend_tl(&mut buf, TLV_SIGNATURE_INFO, sig_info)?;

        prepend_blob(&mut buf, TLV_CONTENT, payload)?;

        let meta_end = buf.len();
        if let Some(last) = options.final_block_id {
            let mut component = PrependBuffer::new(8);
            component.prepend_non_neg_int(last as u64)?;
            component.prepend_u8(0)?;
            let n = prepend_blob(&mut buf, TLV_NAME_COMPONENT, component.as_slice())?;
            prepend_tl(&mut buf, TLV_FINAL_BLOCK_ID, n)?;
        }
        if let Some(freshness) = options.freshness_period {
            prepend_non_neg(&mut buf, TLV_FRESHNESS_PERIOD, freshness)?;
        }
        let meta_len = buf.len() - meta_end;
        prepend_tl(&mut buf, TLV_META_INFO, meta_len)?;

        prepend_name(&mut buf, prefix)?;
        let total = buf.len();
        prepend_tl(&mut buf, TLV_DATA, total)?;
        Ok(buf.into_vec())
    }

    fn fragment_overhead(&self) -> Option<usize> {
        Some(FRAGMENT_OVERHEAD)
    }

    fn encode_fragment(&self, header: FragmentHeader, data: &[u8]) -> Result<Vec<u8>, EncodeError> {
        let mut buf = PrependBuffer::new(data.len() + FRAGMENT_OVERHEAD);
        prepend_blob(&mut buf, TLV_NDNLP_FRAGMENT, data)?;
        let n = buf.prepend_u16(header.to_word())?;
        prepend_tl(&mut buf, TLV_NDNLP_BEGIN_END_FIELDS, n)?;
        let total = buf.len();
        prepend_tl(&mut buf, TLV_NDNLP, total)?;
        Ok(buf.into_vec())
    }

    fn may_forward(&self, interest: &Packet) -> bool {
        match interest.details() {
            PacketDetails::NdnTlv(d) => d.scope > 2,
            _ => false,
        }
    }

    fn admits(&self, interest: &Packet, content: &Packet, digest: Option<&[u8]>) -> bool {
        let (PacketDetails::NdnTlv(d), Some(wanted), Some(name)) =
            (interest.details(), interest.prefix(), content.prefix())
        else {
            return false;
        };
        content_admitted(wanted, d.min_suffix, d.max_suffix, name, digest)
    }

    fn same_interest(&self, a: &Packet, b: &Packet) -> bool {
        let (PacketDetails::NdnTlv(da), PacketDetails::NdnTlv(db), Some(pa), Some(pb)) =
            (a.details(), b.details(), a.prefix(), b.prefix())
        else {
            return false;
        };
        compare(pa, None, pb, MatchMode::Exact).is_match()
            && da.min_suffix == db.min_suffix
            && da.max_suffix == db.max_suffix
            && da.ppkl == db.ppkl
    }
}

fn decode_message(
    kind: PacketKind,
    buffer: Vec<u8>,
    mut body: Reader<'_>,
) -> Result<Packet, DecodeError> {
    let mut details = NdnTlvDetails::default();
    let mut prefix = None;
    let mut content = None;

    while !body.is_empty() {
        let typ = body.read_var_number()?;
        let len = body.read_length()?;
        let mut value = body.sub(len)?;
        match typ {
            TLV_NAME => prefix = Some(decode_name(&mut value)?),
            TLV_SELECTORS => decode_selectors(&mut value, &mut details)?,
            TLV_NONCE => details.nonce = Some(value.read_bytes(len)?.to_vec()),
            TLV_SCOPE => details.scope = be_uint_field(value.read_bytes(len)?)?,
            TLV_INTEREST_LIFETIME => {
                details.interest_lifetime = Some(be_uint_field(value.read_bytes(len)?)?)
            }
            TLV_META_INFO => decode_meta_info(&mut value, &mut details)?,
            TLV_CONTENT => content = Some(value.range()),
            // Signature and anything unknown is carried along untouched
            _ => {}
        }
    }

    let prefix = prefix.ok_or(DecodeError::MissingName)?;
    Ok(Packet::new(
        kind,
        buffer,
        Some(prefix),
        content,
        PacketDetails::NdnTlv(details),
    ))
}

fn decode_name(reader: &mut Reader<'_>) -> Result<Prefix, DecodeError> {
    let mut prefix = Prefix::new(Suite::NdnTlv);
    while !reader.is_empty() {
        let typ = reader.read_var_number()?;
        let len = reader.read_length()?;
        let value = reader.read_bytes(len)?;
        if typ == TLV_NAME_COMPONENT {
            prefix.push_wire(value.to_vec())?;
        }
    }
    prefix.strip_nfn_markers();
    Ok(prefix)
}

fn decode_selectors(reader: &mut Reader<'_>, details: &mut NdnTlvDetails) -> Result<(), DecodeError> {
    while !reader.is_empty() {
        let typ = reader.read_var_number()?;
        let len = reader.read_length()?;
        let value = reader.read_bytes(len)?;
        match typ {
            TLV_MIN_SUFFIX_COMPONENTS => details.min_suffix = as_count(be_uint_field(value)?),
            TLV_MAX_SUFFIX_COMPONENTS => details.max_suffix = as_count(be_uint_field(value)?),
            TLV_MUST_BE_FRESH => details.must_be_fresh = true,
            TLV_PUBLISHER_PUBLIC_KEY_LOCATOR => details.ppkl = Some(value.to_vec()),
            TLV_EXCLUDE | TLV_CHILD_SELECTOR => {
                log::trace!("ignoring NDN selector {:#x}", typ);
            }
            _ => {}
        }
    }
    Ok(())
}

fn decode_meta_info(reader: &mut Reader<'_>, details: &mut NdnTlvDetails) -> Result<(), DecodeError> {
    while !reader.is_empty() {
        let typ = reader.read_var_number()?;
        let len = reader.read_length()?;
        let mut value = reader.sub(len)?;
        match typ {
            TLV_CONTENT_TYPE => details.content_type = Some(be_uint_field(value.read_bytes(len)?)?),
            TLV_FRESHNESS_PERIOD => {
                details.freshness_period = Some(be_uint_field(value.read_bytes(len)?)?)
            }
            TLV_FINAL_BLOCK_ID => {
                let inner_type = value.read_var_number()?;
                let inner_len = value.read_length()?;
                let component = value.read_bytes(inner_len)?;
                if inner_type == TLV_NAME_COMPONENT {
                    if let Some((&0, number)) = component.split_first() {
                        details.final_block_id = u32::try_from(be_uint_field(number)?).ok();
                    }
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn decode_fragment(buffer: Vec<u8>, mut body: Reader<'_>) -> Result<Packet, DecodeError> {
    let mut header = None;
    let mut data = None;
    while !body.is_empty() {
        let typ = body.read_var_number()?;
        let len = body.read_length()?;
        let mut value = body.sub(len)?;
        match typ {
            TLV_NDNLP_BEGIN_END_FIELDS if len == 2 => {
                header = Some(FragmentHeader::from_word(value.read_u16()?))
            }
            TLV_NDNLP_FRAGMENT => data = Some(value.range()),
            _ => {}
        }
    }
    match (header, data) {
        (Some(header), Some(data)) => Ok(Packet::fragment_of(
            buffer,
            header,
            data,
            PacketDetails::NdnTlv(NdnTlvDetails::default()),
        )),
        _ => Err(DecodeError::Malformed("incomplete NDNLP fragment")),
    }
}

fn as_count(value: u64) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}

fn prepend_tl(buf: &mut PrependBuffer, typ: u64, len: usize) -> Result<usize, EncodeError> {
    let n = buf.prepend_var_number(len as u64)?;
    Ok(n + buf.prepend_var_number(typ)?)
}

fn prepend_blob(buf: &mut PrependBuffer, typ: u64, value: &[u8]) -> Result<usize, EncodeError> {
    let n = buf.prepend_slice(value)?;
    Ok(n + prepend_tl(buf, typ, n)?)
}

fn prepend_non_neg(buf: &mut PrependBuffer, typ: u64, value: u64) -> Result<usize, EncodeError> {
    let n = buf.prepend_non_neg_int(value)?;
    Ok(n + prepend_tl(buf, typ, n)?)
}

fn prepend_name(buf: &mut PrependBuffer, prefix: &Prefix) -> Result<usize, EncodeError> {
    let end = buf.len();
    for component in prefix.encoded_components().iter().rev() {
        prepend_blob(buf, TLV_NAME_COMPONENT, component)?;
    }
    let inner = buf.len() - end;
    Ok(inner + prepend_tl(buf, TLV_NAME, inner)?)
}

// djb2 over the name and selectors, for interests built without a nonce
fn derived_nonce(prefix: &Prefix, options: &InterestOptions) -> [u8; 4] {
    let mut hash: u32 = 5381;
    let mut mix = |bytes: &[u8]| {
        for b in bytes {
            hash = hash.wrapping_mul(33) ^ *b as u32;
        }
    };
    for component in prefix.encoded_components() {
        mix(&(component.len() as u32).to_be_bytes());
        mix(&*component);
    }
    mix(&options.interest_lifetime.unwrap_or(0).to_be_bytes());
    mix(&[
        options.must_be_fresh as u8,
        options.scope.unwrap_or(u8::MAX),
        options.min_suffix.unwrap_or(0) as u8,
        options.max_suffix.unwrap_or(usize::MAX) as u8,
    ]);
    hash.to_be_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefix::NfnFlags;

    fn name(uri: &str) -> Prefix {
        Prefix::from_uri(uri, Suite::NdnTlv).unwrap()
    }

    #[test]
    fn test_interest_layout() {
        let options = InterestOptions {
            nonce: Some([1, 2, 3, 4]),
            ..Default::default()
        };
        let bytes = NdnTlvCodec.encode_interest(&name("/a"), &options).unwrap();
        assert_eq!(
            bytes,
            [0x05, 11, 0x07, 3, 0x08, 1, b'a', 0x0a, 4, 1, 2, 3, 4]
        );

        let (packet, consumed) = NdnTlvCodec.decode(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(packet.kind(), PacketKind::Interest);
        assert_eq!(packet.nonce(), Some(&[1u8, 2, 3, 4][..]));
        assert_eq!(packet.prefix().unwrap(), &name("/a"));
        assert!(NdnTlvCodec.may_forward(&packet));
    }

    #[test]
    fn test_interest_selectors_and_scope() {
        let options = InterestOptions {
            nonce: Some([9; 4]),
            scope: Some(1),
            min_suffix: Some(1),
            max_suffix: Some(2),
            must_be_fresh: true,
            interest_lifetime: Some(4000),
            ..Default::default()
        };
        let bytes = NdnTlvCodec
            .encode_interest(&name("/x/y").with_chunk(3).unwrap(), &options)
            .unwrap();
        let (packet, _) = NdnTlvCodec.decode(&bytes).unwrap();
        let PacketDetails::NdnTlv(d) = packet.details() else {
            panic!("wrong suite");
        };
        assert_eq!(d.scope, 1);
        assert_eq!(d.min_suffix, 1);
        assert_eq!(d.max_suffix, 2);
        assert!(d.must_be_fresh);
        assert_eq!(d.interest_lifetime, Some(4000));
        assert_eq!(packet.prefix().unwrap().chunknum(), Some(3));
        assert!(!NdnTlvCodec.may_forward(&packet));
    }

    #[test]
    fn test_data_roundtrip_at_length_boundaries() {
        for len in [0usize, 1, 252, 253, 254, 65535, 65536] {
            let payload: Vec<u8> = (0..len).map(|i| i as u8).collect();
            let options = ContentOptions {
                final_block_id: Some(9),
                freshness_period: Some(1000),
                ..Default::default()
            };
            let bytes = NdnTlvCodec
                .encode_content(&name("/a/b"), &payload, &options)
                .unwrap();
            let (packet, consumed) = NdnTlvCodec.decode(&bytes).unwrap();
            assert_eq!(consumed, bytes.len());
            assert_eq!(packet.kind(), PacketKind::Content);
            assert_eq!(packet.content().unwrap(), &payload[..]);
            assert_eq!(packet.final_block_id(), Some(9));
            assert_eq!(packet.freshness_period(), Some(1000));
        }
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(NdnTlvCodec.decode(&[]).unwrap_err(), DecodeError::TooShort);
        assert!(matches!(
            NdnTlvCodec.decode(&[0x05, 10, 0x07]),
            Err(DecodeError::LengthOverrun { .. })
        ));
        assert_eq!(
            NdnTlvCodec.decode(&[0x05, 2, 0x0a, 0]).unwrap_err(),
            DecodeError::MissingName
        );
        assert_eq!(
            NdnTlvCodec.decode(&[0x42, 0]).unwrap_err(),
            DecodeError::UnexpectedType(0x42)
        );

        let mut too_long = Prefix::new(Suite::NdnTlv);
        for _ in 0..64 {
            too_long.push(b"x").unwrap();
        }
        let mut bytes = NdnTlvCodec
            .encode_interest(&too_long, &InterestOptions::default())
            .unwrap();
        // Splice one more component into the name
        bytes[1] += 3;
        bytes[3] += 3;
        bytes.splice(4..4, [0x08, 1, b'x']);
        assert_eq!(
            NdnTlvCodec.decode(&bytes).unwrap_err(),
            DecodeError::TooManyComponents
        );
    }

    #[test]
    fn test_interests_without_nonce_differ() {
        let nonce_of = |uri: &str| {
            let bytes = NdnTlvCodec
                .encode_interest(&name(uri), &InterestOptions::default())
                .unwrap();
            NdnTlvCodec.decode(&bytes).unwrap().0.nonce().map(<[u8]>::to_vec)
        };
        let a = nonce_of("/a").unwrap();
        let b = nonce_of("/b").unwrap();
        assert_eq!(a.len(), 4);
        assert_ne!(a, [0; 4]);
        assert_ne!(a, b);
        assert_ne!(nonce_of("/a/b"), nonce_of("/ab"));
    }

    #[test]
    fn test_nfn_name() {
        let mut prefix = name("/f/x");
        prefix.set_nfn_flags(NfnFlags::NFN);
        let bytes = NdnTlvCodec.encode_interest(&prefix, &InterestOptions::default()).unwrap();
        let (packet, _) = NdnTlvCodec.decode(&bytes).unwrap();
        assert_eq!(packet.prefix().unwrap().component_count(), 2);
        assert_eq!(packet.prefix().unwrap().nfn_flags(), NfnFlags::NFN);
    }

    #[test]
    fn test_admits() {
        let interest = NdnTlvCodec
            .encode_interest(&name("/a"), &InterestOptions::default())
            .unwrap();
        let interest = NdnTlvCodec.decode(&interest).unwrap().0;
        let content = NdnTlvCodec
            .encode_content(&name("/a/b"), b"x", &ContentOptions::default())
            .unwrap();
        let content = NdnTlvCodec.decode(&content).unwrap().0;
        assert!(NdnTlvCodec.admits(&interest, &content, None));
        assert!(!NdnTlvCodec.admits(&content, &interest, None));

        let other = NdnTlvCodec
            .encode_interest(
                &name("/a"),
                &InterestOptions {
                    nonce: Some([7; 4]),
                    ..Default::default()
                },
            )
            .unwrap();
        let other = NdnTlvCodec.decode(&other).unwrap().0;
        assert!(NdnTlvCodec.same_interest(&interest, &other));
    }

    #[test]
    fn test_fragment() {
        let header = FragmentHeader {
            position: crate::packet::FragmentPosition::First,
            seqno: 5,
        };
        let bytes = NdnTlvCodec.encode_fragment(header, &[1, 2, 3]).unwrap();
        assert!(bytes.len() <= 3 + FRAGMENT_OVERHEAD);
        let (packet, _) = NdnTlvCodec.decode(&bytes).unwrap();
        assert_eq!(packet.kind(), PacketKind::Fragment);
        assert_eq!(packet.fragment(), Some(header));
        assert_eq!(packet.content().unwrap(), &[1, 2, 3]);
    }
}
