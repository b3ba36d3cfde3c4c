//! Wire codecs for the supported suites.
//!
//! Every suite is a [`SuiteCodec`]; the relay looks them up by [`Suite`] in a
//! [`Codecs`] registry. Decoding is a single bounded forward scan, encoding
//! writes backwards into a [`PrependBuffer`] so that enclosing lengths are
//! always known when they are written.

mod builder;
pub mod ccnb;
pub mod ccntlv;
pub mod cistlv;
pub mod iottlv;
pub mod ndntlv;
pub mod switch;

pub use builder::*;

use core::ops::Range;

use alloc::{boxed::Box, collections::BTreeMap, vec::Vec};

use crate::{
    packet::{ContentOptions, FragmentHeader, InterestOptions, Packet},
    prefix::{Prefix, PrefixError},
    suite::Suite,
};

pub const MAX_PACKET_SIZE: usize = 8096;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("buffer too short")]
    TooShort,
    #[error("declared length {declared} exceeds the {available} available bytes")]
    LengthOverrun { declared: usize, available: usize },
    #[error("could not identify the packet suite")]
    UnknownSuite,
    #[error("unexpected type {0:#x}")]
    UnexpectedType(u64),
    #[error("name has too many components")]
    TooManyComponents,
    #[error("packet carries no name")]
    MissingName,
    #[error("malformed packet: {0}")]
    Malformed(&'static str),
}

impl From<PrefixError> for DecodeError {
    fn from(err: PrefixError) -> Self {
        match err {
            PrefixError::TooManyComponents => DecodeError::TooManyComponents,
            PrefixError::ChunksUnsupported(_) => DecodeError::Malformed("chunk in unsupported suite"),
            PrefixError::InvalidEscape | PrefixError::ComponentTooLong => {
                DecodeError::Malformed("invalid name component")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    #[error("buffer too short")]
    BufferTooShort,
    #[error("value does not fit its length field")]
    ValueTooLong,
    #[error("{0} cannot encode this")]
    Unsupported(Suite),
}

/// One wire encoding.
pub trait SuiteCodec {
    fn suite(&self) -> Suite;

    /// Decodes the packet at the front of `bytes` (any encoding switch already
    /// removed) and returns it together with the number of bytes it occupied.
    fn decode(&self, bytes: &[u8]) -> Result<(Packet, usize), DecodeError>;

    fn encode_interest(&self, prefix: &Prefix, options: &InterestOptions)
        -> Result<Vec<u8>, EncodeError>;

    fn encode_content(
        &self,
        prefix: &Prefix,
        payload: &[u8],
        options: &ContentOptions,
    ) -> Result<Vec<u8>, EncodeError>;

    /// Bytes of framing one fragment adds around its data, None if the suite
    /// has no fragment format.
    fn fragment_overhead(&self) -> Option<usize> {
        None
    }

    fn encode_fragment(&self, _header: FragmentHeader, _data: &[u8]) -> Result<Vec<u8>, EncodeError> {
        Err(EncodeError::Unsupported(self.suite()))
    }

    /// Whether a fresh interest may be propagated beyond this node.
    fn may_forward(&self, _interest: &Packet) -> bool {
        true
    }

    /// Whether `content` answers `interest`. `digest` is the content packet's
    /// SHA-256 when the caller computed it.
    fn admits(&self, interest: &Packet, content: &Packet, digest: Option<&[u8]>) -> bool;

    /// Whether two interests are the same PIT entry.
    fn same_interest(&self, a: &Packet, b: &Packet) -> bool;
}

/// Suite to codec map, built once per relay.
pub struct Codecs {
    codecs: BTreeMap<Suite, Box<dyn SuiteCodec>>,
}

impl Codecs {
    pub fn empty() -> Self {
        Self {
            codecs: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, codec: Box<dyn SuiteCodec>) {
        self.codecs.insert(codec.suite(), codec);
    }

    pub fn get(&self, suite: Suite) -> Option<&dyn SuiteCodec> {
        self.codecs.get(&suite).map(|c| c.as_ref())
    }

    pub fn decode(&self, suite: Suite, bytes: &[u8]) -> Result<(Packet, usize), DecodeError> {
        self.get(suite)
            .ok_or(DecodeError::UnknownSuite)?
            .decode(bytes)
    }
}

impl Default for Codecs {
    fn default() -> Self {
        let mut codecs = Self::empty();
        codecs.register(Box::new(ccnb::CcnbCodec));
        codecs.register(Box::new(ccntlv::CcnTlvCodec));
        codecs.register(Box::new(cistlv::CisTlvCodec));
        codecs.register(Box::new(iottlv::IotTlvCodec));
        codecs.register(Box::new(ndntlv::NdnTlvCodec));
        codecs
    }
}

/// Bounded forward cursor. Positions are absolute offsets into the slice the
/// outermost reader was created with, so sub-readers can report content ranges.
#[derive(Clone)]
pub(crate) struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
    end: usize,
}

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            pos: 0,
            end: bytes.len(),
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.end - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.end
    }

    // The range this reader still covers
    pub fn range(&self) -> Range<usize> {
        self.pos..self.end
    }

    pub fn peek_u8(&self) -> Result<u8, DecodeError> {
        if self.is_empty() {
            return Err(DecodeError::TooShort);
        }
        Ok(self.bytes[self.pos])
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        let b = self.peek_u8()?;
        self.pos += 1;
        Ok(b)
    }

    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        if self.remaining() < 2 {
            return Err(DecodeError::TooShort);
        }
        let val = u16::from_be_bytes([self.bytes[self.pos], self.bytes[self.pos + 1]]);
        self.pos += 2;
        Ok(val)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        if len > self.remaining() {
            return Err(DecodeError::LengthOverrun {
                declared: len,
                available: self.remaining(),
            });
        }
        let start = self.pos;
        self.pos += len;
        Ok(&self.bytes[start..self.pos])
    }

    /// Splits off the next `len` bytes as a reader of their own.
    pub fn sub(&mut self, len: usize) -> Result<Reader<'a>, DecodeError> {
        if len > self.remaining() {
            return Err(DecodeError::LengthOverrun {
                declared: len,
                available: self.remaining(),
            });
        }
        let sub = Reader {
            bytes: self.bytes,
            pos: self.pos,
            end: self.pos + len,
        };
        self.pos += len;
        Ok(sub)
    }

    /// NDN-style variable-length number: below 253 the byte itself, otherwise
    /// 253/254/255 announce 2/4/8 big-endian bytes. Wider than needed
    /// encodings are accepted.
    pub fn read_var_number(&mut self) -> Result<u64, DecodeError> {
        let width = match self.read_u8()? {
            first @ 0..=252 => return Ok(first as u64),
            253 => 2,
            254 => 4,
            _ => 8,
        };
        let bytes = self.read_bytes(width).map_err(|_| DecodeError::TooShort)?;
        be_uint(bytes).ok_or(DecodeError::TooShort)
    }

    pub fn read_length(&mut self) -> Result<usize, DecodeError> {
        usize::try_from(self.read_var_number()?).map_err(|_| DecodeError::Malformed("length out of range"))
    }
}

// Room for a packet carrying `prefix` and `payload_len` bytes of payload
pub(crate) fn scratch_for(prefix: &Prefix, payload_len: usize) -> PrependBuffer {
    let name_len: usize = prefix.components().map(|c| c.len() + 10).sum();
    PrependBuffer::new(payload_len + name_len + 128)
}

/// Big-endian unsigned integer of at most 8 bytes, the empty slice is zero.
pub(crate) fn be_uint(bytes: &[u8]) -> Option<u64> {
    if bytes.len() > 8 {
        return None;
    }
    Some(bytes.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64))
}

pub(crate) fn be_uint_field(bytes: &[u8]) -> Result<u64, DecodeError> {
    be_uint(bytes).ok_or(DecodeError::Malformed("integer too long"))
}
