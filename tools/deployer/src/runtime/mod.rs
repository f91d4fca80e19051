//! The node-facing collaborator boundary.
//!
//! Everything the deployment tooling needs from a chain connection goes through [`Runtime`]:
//! gas simulation, building upload/send extrinsics, producing the bytes a signer signs,
//! submitting a signed extrinsic and following its status stream, and resolving module errors
//! through the runtime metadata.

use std::sync::Arc;

use alloy_primitives::{Bytes, B256};
use async_trait::async_trait;
use growstreams_types::{ActorId, CodeId, Payload};
use tokio::sync::mpsc;

use crate::{
    error::{RuntimeError, SubmissionError},
    hashing::{code_id_for, keccak256_concat, program_id_for},
    keyring::Signer,
};

pub mod dev;
pub mod events;
pub mod status;
pub mod vara;

pub use dev::DevRuntime;
pub use events::{DecodedError, DispatchError, EventRecord, MetaError, ModuleError};
pub use status::{StatusUpdate, TxStatus};
pub use vara::VaraRuntime;

/// Status notifications for one submitted extrinsic, in lifecycle order.
pub type StatusStream = mpsc::UnboundedReceiver<StatusUpdate>;

/// What a gas simulation runs against.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GasDestination {
    /// Initialise a program from code that is uploaded in the same extrinsic.
    Upload { code: Bytes },
    /// Handle a message on an existing program.
    Program(ActorId),
}

#[derive(Clone, Debug)]
pub struct GasQuery {
    /// Raw account bytes of the would-be sender.
    pub source: ActorId,
    pub destination: GasDestination,
    pub payload: Payload,
    pub value: u128,
    /// Keep the simulation result even if other messages in the run panic.
    pub keep_result: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GasInfo {
    pub min_limit: u64,
    pub reserved: u64,
    pub burned: u64,
    pub may_be_returned: u64,
    pub waited: bool,
}

#[derive(Clone, Debug)]
pub struct UploadArgs {
    pub code: Bytes,
    pub init_payload: Payload,
    pub gas_limit: u64,
    pub value: u128,
}

impl UploadArgs {
    /// Upload extrinsic for `salt`, with the ids the chain will assign.
    pub fn with_salt(self, salt: Bytes) -> ProgramUpload {
        let code_id = code_id_for(&self.code);
        let program_id = program_id_for(code_id, &salt);
        ProgramUpload {
            program_id,
            code_id,
            salt: salt.clone(),
            extrinsic: Extrinsic {
                call: Call::UploadProgram {
                    code: self.code,
                    salt,
                    init_payload: self.init_payload,
                    gas_limit: self.gas_limit,
                    value: self.value,
                },
            },
        }
    }
}

#[derive(Clone, Debug)]
pub struct MessageArgs {
    pub destination: ActorId,
    pub payload: Payload,
    pub gas_limit: u64,
    pub value: u128,
}

impl From<MessageArgs> for Extrinsic {
    fn from(args: MessageArgs) -> Self {
        Self {
            call: Call::SendMessage {
                destination: args.destination,
                payload: args.payload,
                gas_limit: args.gas_limit,
                value: args.value,
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    UploadProgram {
        code: Bytes,
        salt: Bytes,
        init_payload: Payload,
        gas_limit: u64,
        value: u128,
    },
    SendMessage {
        destination: ActorId,
        payload: Payload,
        gas_limit: u64,
        value: u128,
    },
}

impl Call {
    pub fn payload(&self) -> &Payload {
        match self {
            Self::UploadProgram { init_payload, .. } => init_payload,
            Self::SendMessage { payload, .. } => payload,
        }
    }

    pub fn gas_limit(&self) -> u64 {
        match self {
            Self::UploadProgram { gas_limit, .. } | Self::SendMessage { gas_limit, .. } => {
                *gas_limit
            }
        }
    }

    pub fn value(&self) -> u128 {
        match self {
            Self::UploadProgram { value, .. } | Self::SendMessage { value, .. } => *value,
        }
    }
}

/// An unsigned, submittable extrinsic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Extrinsic {
    pub call: Call,
}

impl Extrinsic {
    /// Ask `signer` for exactly one signature over this extrinsic, as `runtime` lays it out.
    pub async fn sign(
        self,
        runtime: &dyn Runtime,
        signer: &dyn Signer,
        nonce: u64,
    ) -> Result<SignedExtrinsic, SubmissionError> {
        let message = runtime.signing_payload(&self, nonce).await?;
        let signature = signer.sign(&message).await?;
        let hash = keccak256_concat(&[message.as_slice(), signature.as_ref()]);
        Ok(SignedExtrinsic {
            call: self.call,
            signer: signer.account(),
            public_key: signer.public_key(),
            nonce,
            signature,
            hash,
        })
    }
}

#[derive(Clone, Debug)]
pub struct SignedExtrinsic {
    pub call: Call,
    pub signer: ActorId,
    pub public_key: Bytes,
    pub nonce: u64,
    pub signature: Bytes,
    pub hash: B256,
}

/// Result of preparing a program upload: ids are known before submission.
#[derive(Clone, Debug)]
pub struct ProgramUpload {
    pub program_id: ActorId,
    pub code_id: CodeId,
    pub salt: Bytes,
    pub extrinsic: Extrinsic,
}

#[async_trait]
pub trait Runtime: Send + Sync {
    async fn chain_name(&self) -> Result<String, RuntimeError>;

    async fn free_balance(&self, account: ActorId) -> Result<u128, RuntimeError>;

    async fn account_nonce(&self, account: ActorId) -> Result<u64, RuntimeError>;

    /// Read-only simulation; never mutates chain state.
    async fn calculate_gas(&self, query: &GasQuery) -> Result<GasInfo, RuntimeError>;

    fn upload_program(&self, args: UploadArgs) -> Result<ProgramUpload, RuntimeError>;

    fn send_message(&self, args: MessageArgs) -> Result<Extrinsic, RuntimeError>;

    /// Bytes a signer must sign for `extrinsic` sent with `nonce`.
    async fn signing_payload(
        &self,
        extrinsic: &Extrinsic,
        nonce: u64,
    ) -> Result<Vec<u8>, RuntimeError>;

    async fn submit(&self, extrinsic: SignedExtrinsic) -> Result<StatusStream, RuntimeError>;

    fn find_meta_error(&self, error: &ModuleError) -> Option<MetaError>;
}

/// Open a runtime for `node`: `ws://` and `wss://` reach a Vara node, `dev://<name>` runs the
/// in-process development chain.
pub async fn connect(node: &str) -> Result<Arc<dyn Runtime>, RuntimeError> {
    if let Some(chain) = node.strip_prefix(dev::DEV_SCHEME) {
        let chain = if chain.is_empty() { "local" } else { chain };
        return Ok(Arc::new(DevRuntime::with_chain(format!("GrowStreams Dev ({chain})"))));
    }
    if node.starts_with("ws://") || node.starts_with("wss://") {
        return Ok(Arc::new(VaraRuntime::connect(node).await?));
    }
    Err(RuntimeError::UnsupportedEndpoint(node.to_string()))
}
