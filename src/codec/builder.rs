use alloc::{vec, vec::Vec};

use super::{EncodeError, MAX_PACKET_SIZE};

/// A scratch buffer filled from its end towards its start.
///
/// Every `prepend_*` call moves the write offset down and returns the number of
/// bytes it wrote. Nested lengths are then simply `len()` differences taken
/// before and after writing the inner part.
pub struct PrependBuffer {
    storage: Vec<u8>,
    offset: usize,
}

impl PrependBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            storage: vec![0; capacity],
            offset: capacity,
        }
    }

    pub fn for_packet() -> Self {
        Self::new(MAX_PACKET_SIZE)
    }

    // Bytes written so far
    pub fn len(&self) -> usize {
        self.storage.len() - self.offset
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Bytes that can still be prepended
    pub fn remaining(&self) -> usize {
        self.offset
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.storage[self.offset..]
    }

    pub fn into_vec(mut self) -> Vec<u8> {
        self.storage.drain(..self.offset);
        self.storage
    }

    pub fn prepend_slice(&mut self, bytes: &[u8]) -> Result<usize, EncodeError> {
        if bytes.len() > self.offset {
            return Err(EncodeError::BufferTooShort);
        }
        let start = self.offset - bytes.len();
        self.storage[start..self.offset].copy_from_slice(bytes);
        self.offset = start;
        Ok(bytes.len())
    }

    pub fn prepend_u8(&mut self, byte: u8) -> Result<usize, EncodeError> {
        self.prepend_slice(&[byte])
    }

    pub fn prepend_u16(&mut self, value: u16) -> Result<usize, EncodeError> {
        self.prepend_slice(&value.to_be_bytes())
    }

    /// Length-checked 16-bit big-endian field, as used by the fixed-width TLV suites.
    pub fn prepend_u16_len(&mut self, len: usize) -> Result<usize, EncodeError> {
        let len = u16::try_from(len).map_err(|_| EncodeError::ValueTooLong)?;
        self.prepend_u16(len)
    }

    /// Type and length of a fixed-width TLV, as used by CCNx and Cisco.
    pub fn prepend_tl16(&mut self, typ: u16, len: usize) -> Result<usize, EncodeError> {
        self.prepend_u16_len(len)?;
        self.prepend_u16(typ)?;
        Ok(4)
    }

    pub fn prepend_u32(&mut self, value: u32) -> Result<usize, EncodeError> {
        self.prepend_slice(&value.to_be_bytes())
    }

    /// NDN-style variable-length number with the 253/254/255 sentinels.
    pub fn prepend_var_number(&mut self, value: u64) -> Result<usize, EncodeError> {
        if value < 253 {
            self.prepend_u8(value as u8)
        } else if value <= 0xffff {
            self.prepend_u16(value as u16)?;
            self.prepend_u8(253)?;
            Ok(3)
        } else if value <= 0xffff_ffff {
            self.prepend_u32(value as u32)?;
            self.prepend_u8(254)?;
            Ok(5)
        } else {
            self.prepend_slice(&value.to_be_bytes())?;
            self.prepend_u8(255)?;
            Ok(9)
        }
    }

    /// Big-endian without leading zero bytes; zero is written as one 0x00.
    pub fn prepend_minimal_uint(&mut self, value: u64) -> Result<usize, EncodeError> {
        let bytes = value.to_be_bytes();
        let skip = bytes.iter().take(7).take_while(|b| **b == 0).count();
        self.prepend_slice(&bytes[skip..])
    }

    /// NDN NonNegativeInteger: 1, 2, 4 or 8 bytes.
    pub fn prepend_non_neg_int(&mut self, value: u64) -> Result<usize, EncodeError> {
        if value <= 0xff {
            self.prepend_u8(value as u8)
        } else if value <= 0xffff {
            self.prepend_u16(value as u16)
        } else if value <= 0xffff_ffff {
            self.prepend_u32(value as u32)
        } else {
            self.prepend_slice(&value.to_be_bytes())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepend_order() {
        let mut buf = PrependBuffer::new(16);
        assert_eq!(buf.prepend_slice(b"cd"), Ok(2));
        assert_eq!(buf.prepend_u8(b'b'), Ok(1));
        assert_eq!(buf.prepend_u16(0x0102), Ok(2));
        assert_eq!(buf.as_slice(), &[1, 2, b'b', b'c', b'd']);
        assert_eq!(buf.remaining(), 11);
        assert_eq!(buf.into_vec(), vec![1, 2, b'b', b'c', b'd']);
    }

    #[test]
    fn test_capacity() {
        let mut buf = PrependBuffer::new(3);
        assert_eq!(buf.prepend_slice(b"abcd"), Err(EncodeError::BufferTooShort));
        assert_eq!(buf.prepend_slice(b"abc"), Ok(3));
        assert_eq!(buf.prepend_u8(0), Err(EncodeError::BufferTooShort));
        assert_eq!(buf.as_slice(), b"abc");
    }

    #[test]
    fn test_var_number_sentinels() {
        let cases: [(u64, &[u8]); 5] = [
            (252, &[252]),
            (253, &[253, 0, 253]),
            (65535, &[253, 0xff, 0xff]),
            (65536, &[254, 0, 1, 0, 0]),
            (1 << 32, &[255, 0, 0, 0, 1, 0, 0, 0, 0]),
        ];
        for (value, expected) in cases {
            let mut buf = PrependBuffer::new(9);
            assert_eq!(buf.prepend_var_number(value), Ok(expected.len()));
            assert_eq!(buf.as_slice(), expected);
        }
    }

    #[test]
    fn test_integers() {
        let mut buf = PrependBuffer::new(16);
        buf.prepend_minimal_uint(0).unwrap();
        buf.prepend_minimal_uint(0x1234).unwrap();
        buf.prepend_non_neg_int(0x10000).unwrap();
        assert_eq!(buf.as_slice(), &[0, 1, 0, 0, 0x12, 0x34, 0]);
        assert_eq!(buf.prepend_u16_len(70000), Err(EncodeError::ValueTooLong));
    }
}
