//! Fixed 32-byte identifiers.
//!
//! Hex inputs shorter than 64 nibbles are left-zero-padded: the padding preserves the numeric
//! meaning of the id, not its display form.

use std::{fmt, str::FromStr};

use alloy_primitives::FixedBytes;
use serde::{Deserialize, Serialize};

use crate::errors::EncodingError;

macro_rules! fixed_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub FixedBytes<32>);

        impl $name {
            pub const ZERO: Self = Self(FixedBytes::ZERO);

            pub const fn new(bytes: [u8; 32]) -> Self {
                Self(FixedBytes(bytes))
            }

            /// Parse a hex string, optionally `0x`-prefixed, left-padding it to 32 bytes.
            pub fn from_hex_padded(hex: &str) -> Result<Self, EncodingError> {
                parse_padded_hex32(hex).map(Self::new)
            }

            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0 .0
            }

            pub fn as_slice(&self) -> &[u8] {
                self.0.as_slice()
            }
        }

        impl From<[u8; 32]> for $name {
            fn from(bytes: [u8; 32]) -> Self {
                Self::new(bytes)
            }
        }

        impl FromStr for $name {
            type Err = EncodingError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_hex_padded(s)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", hex::encode(self.0))
            }
        }
    };
}

fixed_id!(
    /// Address of a program or user account.
    ActorId
);

fixed_id!(
    /// Hash identifying uploaded program code.
    CodeId
);

/// Strip an optional `0x` prefix, left-pad to 64 nibbles and decode.
pub fn parse_padded_hex32(input: &str) -> Result<[u8; 32], EncodingError> {
    let clean = input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
        .unwrap_or(input);
    if !clean.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(EncodingError::InvalidHex(input.to_string()));
    }
    if clean.len() > 64 {
        return Err(EncodingError::ActorIdTooLong(input.to_string()));
    }

    let padded = format!("{clean:0>64}");
    let mut out = [0u8; 32];
    hex::decode_to_slice(&padded, &mut out)
        .map_err(|_| EncodingError::InvalidHex(input.to_string()))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_hex_is_left_padded() {
        let id: ActorId = "0xabcd".parse().unwrap();
        let mut expected = [0u8; 32];
        expected[30] = 0xab;
        expected[31] = 0xcd;
        assert_eq!(id.as_bytes(), &expected);
    }

    #[test]
    fn odd_length_hex_pads_a_nibble() {
        let id = ActorId::from_hex_padded("abc").unwrap();
        assert_eq!(&id.as_bytes()[30..], &[0x0a, 0xbc]);
    }

    #[test]
    fn rejects_non_hex_and_overlong() {
        assert_eq!(
            ActorId::from_hex_padded("0xzz"),
            Err(EncodingError::InvalidHex("0xzz".into()))
        );
        let long = "1".repeat(65);
        assert!(matches!(
            ActorId::from_hex_padded(&long),
            Err(EncodingError::ActorIdTooLong(_))
        ));
    }

    #[test]
    fn displays_and_serialises_as_prefixed_hex() {
        let id = CodeId::new([0x11; 32]);
        let shown = id.to_string();
        assert_eq!(shown, format!("0x{}", "11".repeat(32)));

        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{shown}\""));
        let back: CodeId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
