use std::fmt;

use alloy_primitives::Bytes;

use crate::errors::EncodingError;

/// An encoded program input, produced once by the encoder and consumed once by a submission.
///
/// Layouts:
/// - `Constructor`: `[compact len][ctor name][ctor args]`
/// - `ServiceCall`: `[compact len][service][compact len][method][args...]`
/// - `Opaque`: bytes built elsewhere (eg a trusted server-side builder)
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Payload {
    Constructor {
        constructor: String,
        bytes: Bytes,
    },
    ServiceCall {
        service: String,
        method: String,
        bytes: Bytes,
    },
    Opaque(Bytes),
}

impl Payload {
    /// Wrap pre-encoded hex (optionally `0x`-prefixed).
    pub fn from_hex(hex_str: &str) -> Result<Self, EncodingError> {
        let clean = hex_str.strip_prefix("0x").unwrap_or(hex_str);
        let bytes =
            hex::decode(clean).map_err(|_| EncodingError::InvalidHex(hex_str.to_string()))?;
        Ok(Self::Opaque(bytes.into()))
    }

    pub fn bytes(&self) -> &Bytes {
        match self {
            Self::Constructor { bytes, .. } | Self::ServiceCall { bytes, .. } => bytes,
            Self::Opaque(bytes) => bytes,
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        self.bytes().as_ref()
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.as_slice()))
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constructor { constructor, .. } => write!(f, "ctor {constructor}"),
            Self::ServiceCall {
                service, method, ..
            } => write!(f, "{service}/{method}"),
            Self::Opaque(bytes) => write!(f, "opaque ({} bytes)", bytes.len()),
        }
    }
}
