//! The GrowStreams programs, how they are constructed, and the calls that connect them.

use std::path::{Path, PathBuf};

use growstreams_encoder::{build_constructor_payload, build_service_call_payload, encode_u128_le};
use growstreams_types::{ActorId, EncodingError, Payload};

pub const CONSTRUCTOR: &str = "New";

pub const STREAM_CORE: &str = "stream-core";
pub const TOKEN_VAULT: &str = "token-vault";
pub const GROW_TOKEN: &str = "grow-token";

/// 10 000 GROW at 12 decimals.
pub const DEFAULT_MINT_AMOUNT: u128 = 10_000 * 1_000_000_000_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContractSpec {
    /// Logical name, also the key in the deployment state file.
    pub name: &'static str,
    /// File stem of the optimized wasm in the artifacts directory.
    pub artifact: &'static str,
}

pub static CONTRACTS: [ContractSpec; 3] = [
    ContractSpec {
        name: STREAM_CORE,
        artifact: "stream_core",
    },
    ContractSpec {
        name: TOKEN_VAULT,
        artifact: "token_vault",
    },
    ContractSpec {
        name: GROW_TOKEN,
        artifact: "grow_token",
    },
];

pub fn contract(name: &str) -> Option<&'static ContractSpec> {
    CONTRACTS.iter().find(|c| c.name == name)
}

impl ContractSpec {
    pub fn artifact_path(&self, artifacts_dir: &Path) -> PathBuf {
        artifacts_dir.join(format!("{}.opt.wasm", self.artifact))
    }

    /// Every program is constructed with a bare `New`.
    pub fn constructor_payload(&self) -> Result<Payload, EncodingError> {
        build_constructor_payload(CONSTRUCTOR, &[])
    }
}

/// A setter call on `target` that records the id of `argument`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WiringCall {
    pub target: &'static str,
    pub service: &'static str,
    pub method: &'static str,
    pub argument: &'static str,
}

impl WiringCall {
    pub fn label(&self) -> String {
        format!("{}.{}/{}", self.target, self.service, self.method)
    }

    pub fn payload(&self, argument_id: ActorId) -> Result<Payload, EncodingError> {
        build_service_call_payload(self.service, self.method, [argument_id.as_slice()])
    }
}

/// Executed in order, with a pause in between.
pub static WIRING: [WiringCall; 2] = [
    WiringCall {
        target: TOKEN_VAULT,
        service: "VaultService",
        method: "SetStreamCore",
        argument: STREAM_CORE,
    },
    WiringCall {
        target: STREAM_CORE,
        service: "StreamService",
        method: "SetTokenVault",
        argument: TOKEN_VAULT,
    },
];

pub fn mint_payload(to: ActorId, amount: u128) -> Result<Payload, EncodingError> {
    build_service_call_payload(
        "VftService",
        "Mint",
        [to.as_slice(), encode_u128_le(amount).as_slice()],
    )
}
