/// Errors raised while turning typed values into wire bytes.
///
/// These always indicate a caller bug (a value outside the representable range) and are
/// never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodingError {
    /// Compact length prefixes only cover `0..2^30`.
    #[error("value {0} does not fit a compact length prefix (must be < 2^30)")]
    ValueTooLarge(u64),
    #[error("invalid hex in `{0}`")]
    InvalidHex(String),
    #[error("actor id `{0}` is longer than 64 hex characters")]
    ActorIdTooLong(String),
    #[error("negative value `{0}` cannot be encoded as an unsigned integer")]
    Negative(String),
    #[error("value `{0}` is out of range for u128")]
    OutOfRange(String),
}

/// Errors during reply decoding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("input truncated")]
    Truncated,
    #[error("big-integer compact mode is not supported for lengths")]
    BigIntegerMode,
    #[error("non-canonical compact encoding of {0}")]
    NonCanonical(u64),
    #[error("string is not valid UTF-8")]
    InvalidUtf8,
    #[error("invalid bool byte {0:#04x}")]
    InvalidBool(u8),
    #[error("reply route `{found}` does not match `{expected}`")]
    RoutePrefixMismatch { expected: String, found: String },
}
