//! Compact length prefixes.
//!
//! The two low bits of the first byte select the width:
//! - `0b00`: 1 byte, values `< 2^6`
//! - `0b01`: 2 bytes LE, values `< 2^14`
//! - `0b10`: 4 bytes LE, values `< 2^30`
//!
//! The big-integer mode (`0b11`) is never produced for lengths.

use growstreams_types::EncodingError;

/// Exclusive upper bound for a compact length prefix.
pub const COMPACT_LEN_LIMIT: u64 = 1 << 30;

const SINGLE_BYTE_LIMIT: u64 = 1 << 6;
const TWO_BYTE_LIMIT: u64 = 1 << 14;

/// Encode `n` as a canonical compact length prefix.
pub fn encode_compact_len(n: u64) -> Result<Vec<u8>, EncodingError> {
    let mut buf = Vec::with_capacity(4);
    write_compact_len(&mut buf, n)?;
    Ok(buf)
}

/// Append the compact encoding of `n` to `buf`. On error `buf` is left untouched.
pub fn write_compact_len(buf: &mut Vec<u8>, n: u64) -> Result<(), EncodingError> {
    if n < SINGLE_BYTE_LIMIT {
        buf.push((n as u8) << 2);
    } else if n < TWO_BYTE_LIMIT {
        buf.extend_from_slice(&(((n as u16) << 2) | 0b01).to_le_bytes());
    } else if n < COMPACT_LEN_LIMIT {
        buf.extend_from_slice(&(((n as u32) << 2) | 0b10).to_le_bytes());
    } else {
        return Err(EncodingError::ValueTooLarge(n));
    }
    Ok(())
}

/// Width in bytes of the compact prefix for `n`.
pub fn compact_len_width(n: u64) -> Result<usize, EncodingError> {
    match n {
        _ if n < SINGLE_BYTE_LIMIT => Ok(1),
        _ if n < TWO_BYTE_LIMIT => Ok(2),
        _ if n < COMPACT_LEN_LIMIT => Ok(4),
        _ => Err(EncodingError::ValueTooLarge(n)),
    }
}
