use core::fmt;

use alloc::{borrow::Cow, string::String, vec::Vec};

use bitflags::bitflags;

use crate::codec::be_uint;
use crate::suite::Suite;

pub const MAX_NAME_COMP: usize = 64;

// Name segment types of the suites whose components carry a TL header
const CCNX_NAME_SEGMENT: u16 = 0x0001;
const CCNX_CHUNK: u16 = 0x0010;
const CISCO_NAME_COMPONENT: u16 = 0x0001;
const CISCO_NAME_SEGMENT: u16 = 0x0002;

// First byte of a chunk component in CCNB and NDN names
const SEGMENT_MARKER: u8 = 0x00;

bitflags! {
    /// Markers of named-function requests. They travel as trailing
    /// "THUNK"/"NFN" components on the wire and are stripped on decode.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct NfnFlags: u8 {
        const NFN = 0x01;
        const THUNK = 0x02;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PrefixError {
    #[error("a name may have at most {} components", MAX_NAME_COMP)]
    TooManyComponents,
    #[error("{0} names cannot carry chunk numbers")]
    ChunksUnsupported(Suite),
    #[error("invalid percent escape in name")]
    InvalidEscape,
    #[error("name component is too long")]
    ComponentTooLong,
}

/// A hierarchical name in the encoding of one suite.
///
/// Components are kept in wire form: for CCNx and Cisco names each component
/// still carries its 4-byte type-length header, for the other suites it is the
/// bare value. A chunk component stays in the component list, `chunknum` only
/// mirrors its parsed value.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Prefix {
    suite: Suite,
    components: Vec<Vec<u8>>,
    chunknum: Option<u32>,
    nfn_flags: NfnFlags,
}

impl Prefix {
    pub fn new(suite: Suite) -> Self {
        Self {
            suite,
            components: Vec::new(),
            chunknum: None,
            nfn_flags: NfnFlags::empty(),
        }
    }

    pub fn from_components<I, C>(suite: Suite, values: I) -> Result<Self, PrefixError>
    where
        I: IntoIterator<Item = C>,
        C: AsRef<[u8]>,
    {
        let mut prefix = Self::new(suite);
        for value in values {
            prefix.push(value.as_ref())?;
        }
        Ok(prefix)
    }

    /// Parses `/a/b%2Fc` style names, percent-unescaping every component.
    pub fn from_uri(uri: &str, suite: Suite) -> Result<Self, PrefixError> {
        let mut prefix = Self::new(suite);
        for segment in uri.split('/').filter(|s| !s.is_empty()) {
            let value = unescape(segment)?;
            prefix.push(&value)?;
        }
        Ok(prefix)
    }

    pub fn suite(&self) -> Suite {
        self.suite
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn chunknum(&self) -> Option<u32> {
        self.chunknum
    }

    pub fn nfn_flags(&self) -> NfnFlags {
        self.nfn_flags
    }

    pub fn set_nfn_flags(&mut self, flags: NfnFlags) {
        self.nfn_flags = flags;
    }

    /// Wire form of every component.
    pub fn components(&self) -> impl Iterator<Item = &[u8]> + '_ {
        self.components.iter().map(Vec::as_slice)
    }

    pub fn component(&self, index: usize) -> Option<&[u8]> {
        self.components.get(index).map(Vec::as_slice)
    }

    /// Component values without any suite framing.
    pub fn values(&self) -> impl Iterator<Item = &[u8]> + '_ {
        let suite = self.suite;
        self.components.iter().map(move |c| component_value(suite, c))
    }

    /// Appends a regular name component holding `value`.
    pub fn push(&mut self, value: &[u8]) -> Result<(), PrefixError> {
        let wire = match self.suite {
            Suite::CcnTlv => framed(CCNX_NAME_SEGMENT, value)?,
            Suite::CisTlv => framed(CISCO_NAME_COMPONENT, value)?,
            _ => value.to_vec(),
        };
        self.push_wire(wire)
    }

    // Used by decoders, which hand over components in wire form
    pub(crate) fn push_wire(&mut self, wire: Vec<u8>) -> Result<(), PrefixError> {
        if self.components.len() >= MAX_NAME_COMP {
            return Err(PrefixError::TooManyComponents);
        }
        if let Some(chunk) = chunk_of(self.suite, &wire) {
            self.chunknum = Some(chunk);
        }
        self.components.push(wire);
        Ok(())
    }

    /// Returns a copy with the suite's chunk component for `chunk` appended.
    pub fn with_chunk(&self, chunk: u32) -> Result<Self, PrefixError> {
        let mut prefix = self.clone();
        let wire = chunk_component(self.suite, chunk)?;
        prefix.push_wire(wire)?;
        prefix.chunknum = Some(chunk);
        Ok(prefix)
    }

    // Decoders call this once all components are in
    pub(crate) fn strip_nfn_markers(&mut self) {
        if self.last_value_is(b"NFN") {
            self.nfn_flags |= NfnFlags::NFN;
            self.components.pop();
            if self.last_value_is(b"THUNK") {
                self.nfn_flags |= NfnFlags::THUNK;
                self.components.pop();
            }
        }
    }

    fn last_value_is(&self, word: &[u8]) -> bool {
        self.components
            .last()
            .map(|c| component_value(self.suite, c) == word)
            .unwrap_or(false)
    }

    /// The component sequence an encoder writes, markers included.
    pub(crate) fn encoded_components(&self) -> Vec<Cow<'_, [u8]>> {
        let mut out: Vec<Cow<'_, [u8]>> =
            self.components.iter().map(|c| Cow::Borrowed(c.as_slice())).collect();
        if self.nfn_flags.contains(NfnFlags::NFN) {
            if self.nfn_flags.contains(NfnFlags::THUNK) {
                out.push(Cow::Owned(marker_component(self.suite, b"THUNK")));
            }
            out.push(Cow::Owned(marker_component(self.suite, b"NFN")));
        }
        out
    }

    pub fn to_uri(&self) -> String {
        let mut uri = String::new();
        for wire in &self.components {
            uri.push('/');
            match (self.suite, chunk_of(self.suite, wire)) {
                (Suite::CcnTlv | Suite::CisTlv, Some(chunk)) => {
                    let _ = fmt::write(&mut uri, format_args!("chunk={}", chunk));
                }
                _ => escape_into(&mut uri, component_value(self.suite, wire)),
            }
        }
        if uri.is_empty() {
            uri.push('/');
        }
        uri
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_uri())
    }
}

fn framed(typ: u16, value: &[u8]) -> Result<Vec<u8>, PrefixError> {
    let len = u16::try_from(value.len()).map_err(|_| PrefixError::ComponentTooLong)?;
    let mut wire = Vec::with_capacity(value.len() + 4);
    wire.extend_from_slice(&typ.to_be_bytes());
    wire.extend_from_slice(&len.to_be_bytes());
    wire.extend_from_slice(value);
    Ok(wire)
}

fn marker_component(suite: Suite, word: &[u8]) -> Vec<u8> {
    match suite {
        Suite::CcnTlv | Suite::CisTlv => {
            let mut wire = Vec::with_capacity(word.len() + 4);
            wire.extend_from_slice(&1u16.to_be_bytes());
            wire.extend_from_slice(&(word.len() as u16).to_be_bytes());
            wire.extend_from_slice(word);
            wire
        }
        _ => word.to_vec(),
    }
}

pub(crate) fn component_value(suite: Suite, wire: &[u8]) -> &[u8] {
    if suite.components_carry_header() && wire.len() >= 4 {
        &wire[4..]
    } else {
        wire
    }
}

fn component_type(wire: &[u8]) -> Option<u16> {
    Some(u16::from_be_bytes([*wire.first()?, *wire.get(1)?]))
}

/// Parses the chunk number out of a wire component, if it is a chunk component.
pub(crate) fn chunk_of(suite: Suite, wire: &[u8]) -> Option<u32> {
    let value = match suite {
        Suite::Ccnb | Suite::NdnTlv => match wire.split_first() {
            Some((&SEGMENT_MARKER, rest)) => rest,
            _ => return None,
        },
        Suite::CcnTlv if component_type(wire)? == CCNX_CHUNK => wire.get(4..)?,
        Suite::CisTlv if component_type(wire)? == CISCO_NAME_SEGMENT => wire.get(4..)?,
        _ => return None,
    };
    u32::try_from(be_uint(value)?).ok()
}

pub(crate) fn chunk_component(suite: Suite, chunk: u32) -> Result<Vec<u8>, PrefixError> {
    let minimal = minimal_be(chunk);
    match suite {
        Suite::Ccnb => {
            let mut wire = Vec::with_capacity(minimal.len() + 1);
            wire.push(SEGMENT_MARKER);
            // A zero chunk is the bare marker
            if chunk != 0 {
                wire.extend_from_slice(&minimal);
            }
            Ok(wire)
        }
        Suite::NdnTlv => {
            let mut wire = Vec::with_capacity(5);
            wire.push(SEGMENT_MARKER);
            match chunk {
                0..=0xff => wire.push(chunk as u8),
                0x100..=0xffff => wire.extend_from_slice(&(chunk as u16).to_be_bytes()),
                _ => wire.extend_from_slice(&chunk.to_be_bytes()),
            }
            Ok(wire)
        }
        Suite::CcnTlv => framed(CCNX_CHUNK, &minimal),
        Suite::CisTlv => framed(CISCO_NAME_SEGMENT, &chunk.to_be_bytes()),
        Suite::IotTlv => Err(PrefixError::ChunksUnsupported(suite)),
    }
}

// Big-endian without leading zero bytes, zero is a single 0x00
fn minimal_be(value: u32) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take(3).take_while(|b| **b == 0).count();
    bytes[skip..].to_vec()
}

fn unescape(segment: &str) -> Result<Vec<u8>, PrefixError> {
    let bytes = segment.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes.get(i + 1..i + 3).ok_or(PrefixError::InvalidEscape)?;
            let hi = hex_value(hex[0]).ok_or(PrefixError::InvalidEscape)?;
            let lo = hex_value(hex[1]).ok_or(PrefixError::InvalidEscape)?;
            out.push(hi << 4 | lo);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    Ok(out)
}

fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

fn escape_into(out: &mut String, value: &[u8]) {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    for &b in value {
        if b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'~' | b'-') {
            out.push(b as char);
        } else {
            out.push('%');
            out.push(HEX[(b >> 4) as usize] as char);
            out.push(HEX[(b & 0x0f) as usize] as char);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uri_roundtrip() {
        for suite in Suite::ALL {
            let prefix = Prefix::from_uri("/hello/wo%2Frld/%00%ff", suite).unwrap();
            assert_eq!(prefix.component_count(), 3);
            assert_eq!(prefix.to_uri(), "/hello/wo%2Frld/%00%FF");
            let values: Vec<&[u8]> = prefix.values().collect();
            assert_eq!(values[0], b"hello");
            assert_eq!(values[1], b"wo/rld");
        }
        assert_eq!(Prefix::from_uri("/", Suite::NdnTlv).unwrap().to_uri(), "/");
        assert_eq!(
            Prefix::from_uri("/a%4", Suite::NdnTlv),
            Err(PrefixError::InvalidEscape)
        );
    }

    #[test]
    fn test_framing() {
        let prefix = Prefix::from_uri("/ab", Suite::CcnTlv).unwrap();
        assert_eq!(prefix.component(0).unwrap(), &[0, 1, 0, 2, b'a', b'b']);
        let prefix = Prefix::from_uri("/ab", Suite::NdnTlv).unwrap();
        assert_eq!(prefix.component(0).unwrap(), b"ab");
    }

    #[test]
    fn test_chunks() {
        let base = Prefix::from_uri("/a", Suite::NdnTlv).unwrap();
        let chunked = base.with_chunk(0x1234).unwrap();
        assert_eq!(chunked.chunknum(), Some(0x1234));
        assert_eq!(chunked.component(1).unwrap(), &[0, 0x12, 0x34]);

        let ccnx = Prefix::from_uri("/a", Suite::CcnTlv).unwrap().with_chunk(0).unwrap();
        assert_eq!(ccnx.component(1).unwrap(), &[0, 0x10, 0, 1, 0]);
        assert_eq!(ccnx.to_uri(), "/a/chunk=0");

        let cisco = Prefix::from_uri("/a", Suite::CisTlv).unwrap().with_chunk(7).unwrap();
        assert_eq!(cisco.component(1).unwrap(), &[0, 2, 0, 4, 0, 0, 0, 7]);

        let ccnb = Prefix::from_uri("/a", Suite::Ccnb).unwrap().with_chunk(0).unwrap();
        assert_eq!(ccnb.component(1).unwrap(), &[0]);
        assert_eq!(chunk_of(Suite::Ccnb, &[0]), Some(0));

        let iot = Prefix::from_uri("/a", Suite::IotTlv).unwrap();
        assert_eq!(
            iot.with_chunk(1),
            Err(PrefixError::ChunksUnsupported(Suite::IotTlv))
        );
    }

    #[test]
    fn test_component_limit() {
        let mut prefix = Prefix::new(Suite::IotTlv);
        for _ in 0..MAX_NAME_COMP {
            prefix.push(b"x").unwrap();
        }
        assert_eq!(prefix.push(b"x"), Err(PrefixError::TooManyComponents));
    }

    #[test]
    fn test_nfn_markers() {
        let mut prefix = Prefix::from_uri("/f/THUNK/NFN", Suite::CisTlv).unwrap();
        prefix.strip_nfn_markers();
        assert_eq!(prefix.component_count(), 1);
        assert_eq!(prefix.nfn_flags(), NfnFlags::NFN | NfnFlags::THUNK);
        let encoded = prefix.encoded_components();
        assert_eq!(encoded.len(), 3);
        assert_eq!(&encoded[2][..], &[0, 1, 0, 3, b'N', b'F', b'N']);
    }
}
