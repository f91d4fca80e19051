use alloy_primitives::U256;
use growstreams_types::{ActorId, EncodingError, Payload};

use crate::compact::write_compact_len;

/// Encode a UTF-8 string as `compact(byte_len) ++ bytes`.
pub fn encode_string(s: &str) -> Result<Vec<u8>, EncodingError> {
    encode_bytes(s.as_bytes())
}

/// Encode a byte vector as `compact(len) ++ bytes`.
pub fn encode_bytes(bytes: &[u8]) -> Result<Vec<u8>, EncodingError> {
    let mut buf = Vec::with_capacity(bytes.len() + 4);
    write_compact_len(&mut buf, bytes.len() as u64)?;
    buf.extend_from_slice(bytes);
    Ok(buf)
}

/// Decode a (possibly short, optionally `0x`-prefixed) hex actor id into its 32 raw bytes.
pub fn encode_actor_id(hex: &str) -> Result<[u8; 32], EncodingError> {
    ActorId::from_hex_padded(hex).map(|id| *id.as_bytes())
}

/// Encode a u128 as two little-endian u64 halves, low half first.
pub fn encode_u128_le(value: u128) -> [u8; 16] {
    let low = value as u64;
    let high = (value >> 64) as u64;

    let mut out = [0u8; 16];
    out[..8].copy_from_slice(&low.to_le_bytes());
    out[8..].copy_from_slice(&high.to_le_bytes());
    out
}

/// Encode a decimal amount as u128 LE. Negative or `> 2^128 - 1` inputs are rejected.
pub fn encode_u128_le_dec(text: &str) -> Result<[u8; 16], EncodingError> {
    let trimmed = text.trim();
    if trimmed.starts_with('-') {
        return Err(EncodingError::Negative(text.to_string()));
    }
    let value = U256::from_str_radix(trimmed, 10)
        .map_err(|_| EncodingError::OutOfRange(text.to_string()))?;
    encode_u128_le_u256(value)
}

pub fn encode_u128_le_u256(value: U256) -> Result<[u8; 16], EncodingError> {
    let narrowed =
        u128::try_from(value).map_err(|_| EncodingError::OutOfRange(value.to_string()))?;
    Ok(encode_u128_le(narrowed))
}

pub fn encode_u64_le(value: u64) -> [u8; 8] {
    value.to_le_bytes()
}

pub fn encode_bool(value: bool) -> [u8; 1] {
    [value as u8]
}

/// Build a program constructor payload: `encode_string(name) ++ args`.
pub fn build_constructor_payload(
    constructor: &str,
    args: &[u8],
) -> Result<Payload, EncodingError> {
    let mut buf = encode_string(constructor)?;
    buf.extend_from_slice(args);
    Ok(Payload::Constructor {
        constructor: constructor.to_string(),
        bytes: buf.into(),
    })
}

/// Build a service call payload: `encode_string(service) ++ encode_string(method) ++ args...`.
///
/// Arguments must already be encoded, in declaration order.
pub fn build_service_call_payload<I>(
    service: &str,
    method: &str,
    args: I,
) -> Result<Payload, EncodingError>
where
    I: IntoIterator,
    I::Item: AsRef<[u8]>,
{
    let mut buf = encode_string(service)?;
    buf.extend_from_slice(&encode_string(method)?);
    for arg in args {
        buf.extend_from_slice(arg.as_ref());
    }
    Ok(Payload::ServiceCall {
        service: service.to_string(),
        method: method.to_string(),
        bytes: buf.into(),
    })
}
