//! The one-byte encoding switch that may precede a packet.

use super::{DecodeError, EncodeError, PrependBuffer, Reader};
use crate::suite::Suite;

pub const SWITCH_MAGIC: u8 = 0x80;

/// If `bytes` starts with an encoding switch, returns the announced suite and
/// the number of bytes the switch occupies.
pub fn dehead(bytes: &[u8]) -> Result<Option<(Suite, usize)>, DecodeError> {
    if bytes.first() != Some(&SWITCH_MAGIC) {
        return Ok(None);
    }
    let mut reader = Reader::new(bytes);
    reader.read_u8()?;
    let code = reader.read_var_number()?;
    let suite = Suite::from_encoding_code(code).ok_or(DecodeError::UnknownSuite)?;
    Ok(Some((suite, reader.position())))
}

pub fn prepend(suite: Suite, buf: &mut PrependBuffer) -> Result<usize, EncodeError> {
    let len = buf.prepend_var_number(suite.encoding_code())?;
    Ok(len + buf.prepend_u8(SWITCH_MAGIC)?)
}

/// The switch bytes announcing `suite`.
pub fn header(suite: Suite) -> [u8; 2] {
    // All assigned codes fit the single-byte form
    [SWITCH_MAGIC, suite.encoding_code() as u8]
}
