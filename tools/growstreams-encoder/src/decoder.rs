//! Cursor-based readers for Sails replies.
//!
//! A reply echoes the service and method names before the return value, so callers usually
//! start with [`strip_reply_prefix`] and then read the value with the fixed-width readers.

use growstreams_types::{ActorId, DecodeError};

/// Read a canonical compact length prefix at `*i`.
pub fn decode_compact_len(bytes: &[u8], i: &mut usize) -> Result<u64, DecodeError> {
    let first = *bytes.get(*i).ok_or(DecodeError::Truncated)?;
    match first & 0b11 {
        0b00 => {
            *i += 1;
            Ok(u64::from(first >> 2))
        }
        0b01 => {
            let raw = u16::from_le_bytes(read_array(bytes, i)?);
            let value = u64::from(raw >> 2);
            if value < 1 << 6 {
                return Err(DecodeError::NonCanonical(value));
            }
            Ok(value)
        }
        0b10 => {
            let raw = u32::from_le_bytes(read_array(bytes, i)?);
            let value = u64::from(raw >> 2);
            if value < 1 << 14 {
                return Err(DecodeError::NonCanonical(value));
            }
            Ok(value)
        }
        _ => Err(DecodeError::BigIntegerMode),
    }
}

pub fn read_vec(bytes: &[u8], i: &mut usize) -> Result<Vec<u8>, DecodeError> {
    let len = decode_compact_len(bytes, i)? as usize;
    if bytes.len() < *i + len {
        return Err(DecodeError::Truncated);
    }
    let out = bytes[*i..*i + len].to_vec();
    *i += len;
    Ok(out)
}

pub fn read_string(bytes: &[u8], i: &mut usize) -> Result<String, DecodeError> {
    String::from_utf8(read_vec(bytes, i)?).map_err(|_| DecodeError::InvalidUtf8)
}

/// Skip `count` length-prefixed strings and return the remainder.
pub fn skip_strings(bytes: &[u8], count: usize) -> Result<&[u8], DecodeError> {
    let mut i = 0usize;
    for _ in 0..count {
        let len = decode_compact_len(bytes, &mut i)? as usize;
        if bytes.len() < i + len {
            return Err(DecodeError::Truncated);
        }
        i += len;
    }
    Ok(&bytes[i..])
}

/// Check that a reply starts with `service`/`method` and return the encoded value after it.
pub fn strip_reply_prefix<'a>(
    bytes: &'a [u8],
    service: &str,
    method: &str,
) -> Result<&'a [u8], DecodeError> {
    let mut i = 0usize;
    let found_service = read_string(bytes, &mut i)?;
    let found_method = read_string(bytes, &mut i)?;
    if found_service != service || found_method != method {
        return Err(DecodeError::RoutePrefixMismatch {
            expected: format!("{service}/{method}"),
            found: format!("{found_service}/{found_method}"),
        });
    }
    Ok(&bytes[i..])
}

pub fn read_u64_le(bytes: &[u8], i: &mut usize) -> Result<u64, DecodeError> {
    read_array(bytes, i).map(u64::from_le_bytes)
}

pub fn read_u128_le(bytes: &[u8], i: &mut usize) -> Result<u128, DecodeError> {
    let low = read_u64_le(bytes, i)?;
    let high = read_u64_le(bytes, i)?;
    Ok((u128::from(high) << 64) | u128::from(low))
}

pub fn read_actor_id(bytes: &[u8], i: &mut usize) -> Result<ActorId, DecodeError> {
    read_array(bytes, i).map(ActorId::new)
}

pub fn read_bool(bytes: &[u8], i: &mut usize) -> Result<bool, DecodeError> {
    let [b] = read_array::<1>(bytes, i)?;
    match b {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(DecodeError::InvalidBool(other)),
    }
}

fn read_array<const N: usize>(bytes: &[u8], i: &mut usize) -> Result<[u8; N], DecodeError> {
    if bytes.len() < *i + N {
        return Err(DecodeError::Truncated);
    }
    let mut buf = [0u8; N];
    buf.copy_from_slice(&bytes[*i..*i + N]);
    *i += N;
    Ok(buf)
}
