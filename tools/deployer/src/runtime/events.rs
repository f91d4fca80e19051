//! Runtime events attached to status updates and the error types they carry.

use std::fmt;

use alloy_primitives::Bytes;
use growstreams_types::ActorId;
use serde::{Deserialize, Serialize};

/// Index of a pallet error in the runtime metadata.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModuleError {
    pub index: u8,
    pub error: [u8; 4],
}

/// Why a dispatched extrinsic failed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DispatchError {
    Module(ModuleError),
    BadOrigin,
    CannotLookup,
    Other(String),
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Module(ModuleError { index, error }) => write!(
                f,
                r#"{{"module":{{"index":{index},"error":"0x{}"}}}}"#,
                hex::encode(error)
            ),
            Self::BadOrigin => f.write_str("BadOrigin"),
            Self::CannotLookup => f.write_str("CannotLookup"),
            Self::Other(reason) => f.write_str(reason),
        }
    }
}

/// Metadata entry for a module error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetaError {
    pub section: String,
    pub name: String,
    pub docs: Vec<String>,
}

/// Human-readable form of a dispatch error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecodedError {
    Module {
        section: String,
        name: String,
        docs: String,
    },
    /// Not a module error, or one the metadata does not know.
    Raw(String),
}

impl DecodedError {
    pub fn decode(
        error: &DispatchError,
        lookup: &dyn Fn(&ModuleError) -> Option<MetaError>,
    ) -> Self {
        match error {
            DispatchError::Module(module) => match lookup(module) {
                Some(meta) => Self::Module {
                    section: meta.section,
                    name: meta.name,
                    docs: meta.docs.join(" "),
                },
                None => Self::Raw(error.to_string()),
            },
            other => Self::Raw(other.to_string()),
        }
    }

    /// `section.name` for module errors, the raw text otherwise.
    pub fn qualified_name(&self) -> String {
        match self {
            Self::Module { section, name, .. } => format!("{section}.{name}"),
            Self::Raw(raw) => raw.clone(),
        }
    }
}

impl fmt::Display for DecodedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Module { docs, .. } if !docs.is_empty() => {
                write!(f, "{}: {docs}", self.qualified_name())
            }
            _ => f.write_str(&self.qualified_name()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventRecord {
    ExtrinsicSuccess,
    ExtrinsicFailed(DispatchError),
    UserMessageSent {
        source: ActorId,
        destination: ActorId,
        payload: Bytes,
    },
    Other {
        section: String,
        method: String,
    },
}

impl EventRecord {
    pub fn section(&self) -> &str {
        match self {
            Self::ExtrinsicSuccess | Self::ExtrinsicFailed(_) => "system",
            Self::UserMessageSent { .. } => "gear",
            Self::Other { section, .. } => section,
        }
    }

    pub fn method(&self) -> &str {
        match self {
            Self::ExtrinsicSuccess => "ExtrinsicSuccess",
            Self::ExtrinsicFailed(_) => "ExtrinsicFailed",
            Self::UserMessageSent { .. } => "UserMessageSent",
            Self::Other { method, .. } => method,
        }
    }
}
