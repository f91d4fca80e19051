//! Sails payload encoding for GrowStreams programs.
//!
//! Everything here is pure and deterministic: the output must match the runtime's
//! deserializer byte for byte.

pub mod compact;
pub mod decoder;
pub mod encoder;


pub use compact::{compact_len_width, encode_compact_len, write_compact_len, COMPACT_LEN_LIMIT};
pub use encoder::{
    build_constructor_payload, build_service_call_payload, encode_actor_id, encode_bool,
    encode_bytes, encode_string, encode_u128_le, encode_u128_le_dec, encode_u128_le_u256,
    encode_u64_le,
};
pub use growstreams_types::{ActorId, DecodeError, EncodingError, Payload};
