//! In-process development chain.
//!
//! Deterministic: code and program ids follow the gear pallet derivation with a counter-based
//! salt, and block hashes chain off the extrinsic hash. Failures, invalid submissions and
//! stalled finalization can be scripted for tests.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Mutex, MutexGuard, PoisonError},
};

use alloy_primitives::{Bytes, B256};
use async_trait::async_trait;
use growstreams_encoder::{
    decoder::read_string, encode_bytes, encode_string, encode_u128_le, encode_u64_le,
};
use growstreams_types::{ActorId, CodeId, EncodingError};
use tokio::sync::mpsc;

use super::{
    Call, DispatchError, EventRecord, Extrinsic, GasDestination, GasInfo, GasQuery, MessageArgs,
    MetaError, ModuleError, ProgramUpload, Runtime, SignedExtrinsic, StatusStream, StatusUpdate,
    TxStatus, UploadArgs,
};
use crate::{
    error::RuntimeError,
    hashing::{code_id_for, keccak256_concat, program_id_for},
    keyring::{account_id_for, verify_signature},
};

/// Node URL scheme served by [`DevRuntime`].
pub const DEV_SCHEME: &str = "dev://";

/// Free balance reported for every account (1 000 000 VARA).
pub const DEV_ENDOWMENT: u128 = 1_000_000 * 1_000_000_000_000;

pub const BLOCK_GAS_LIMIT: u64 = 750_000_000_000;

pub const GEAR_PALLET_INDEX: u8 = 104;

const GEAR_ERRORS: [(&str, &str); 10] = [
    ("MessageNotFound", "Message wasn't found in the mailbox."),
    ("InsufficientBalance", "Not enough balance to execute an action."),
    ("GasLimitTooHigh", "Gas limit too high."),
    ("ProgramAlreadyExists", "Program already exists."),
    ("InactiveProgram", "Program is terminated."),
    ("NoMessageTree", "Message gas tree is not found."),
    ("CodeAlreadyExists", "Code already exists."),
    ("CodeDoesntExist", "Code does not exist."),
    ("CodeTooLarge", "The code supplied to `upload_code` or `upload_program` exceeds the limit."),
    ("ProgramConstructionFailed", "Failed to create a program."),
];

/// Behaviour injected for the next submitted extrinsic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DevScript {
    /// Include and finalize, but report `system.ExtrinsicFailed`.
    Fail(DispatchError),
    /// Reject from the pool.
    Invalid,
    /// Execute, then stop after `Ready` until [`DevRuntime::finalize_stalled`].
    Stall,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GasBehaviour {
    #[default]
    Simulate,
    Fail,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentMessage {
    pub source: ActorId,
    pub destination: ActorId,
    pub payload: Bytes,
}

struct Stalled {
    sender: mpsc::UnboundedSender<StatusUpdate>,
    block_hash: B256,
    events: Vec<EventRecord>,
}

#[derive(Default)]
struct DevState {
    programs: HashMap<ActorId, CodeId>,
    nonces: HashMap<ActorId, u64>,
    uploads: usize,
    messages: Vec<SentMessage>,
    salt_counter: u64,
    block_number: u64,
    gas: GasBehaviour,
    script: VecDeque<DevScript>,
    stalled: Vec<Stalled>,
}

pub struct DevRuntime {
    chain: String,
    state: Mutex<DevState>,
}

impl Default for DevRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl DevRuntime {
    pub fn new() -> Self {
        Self::with_chain("GrowStreams Dev".to_string())
    }

    pub fn with_chain(chain: String) -> Self {
        Self {
            chain,
            state: Mutex::new(DevState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, DevState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push_script(&self, script: DevScript) {
        self.state().script.push_back(script);
    }

    pub fn set_gas_behaviour(&self, behaviour: GasBehaviour) {
        self.state().gas = behaviour;
    }

    /// Number of successfully executed program uploads.
    pub fn upload_count(&self) -> usize {
        self.state().uploads
    }

    pub fn sent_messages(&self) -> Vec<SentMessage> {
        self.state().messages.clone()
    }

    pub fn has_program(&self, program_id: ActorId) -> bool {
        self.state().programs.contains_key(&program_id)
    }

    /// Deliver `InBlock` + `Finalized` for every stalled extrinsic. Returns how many were
    /// released.
    pub fn finalize_stalled(&self) -> usize {
        let stalled = std::mem::take(&mut self.state().stalled);
        let released = stalled.len();
        for s in stalled {
            let _ = s.sender.send(StatusUpdate::new(TxStatus::InBlock(s.block_hash)));
            let _ = s
                .sender
                .send(StatusUpdate::with_events(TxStatus::Finalized(s.block_hash), s.events));
        }
        released
    }
}

pub fn gear_error(name: &str) -> Option<DispatchError> {
    let position = GEAR_ERRORS.iter().position(|(n, _)| *n == name)?;
    let index = u8::try_from(position).ok()?;
    Some(DispatchError::Module(ModuleError {
        index: GEAR_PALLET_INDEX,
        error: [index, 0, 0, 0],
    }))
}

fn module_failure(name: &str) -> EventRecord {
    EventRecord::ExtrinsicFailed(
        gear_error(name).unwrap_or_else(|| DispatchError::Other(name.to_string())),
    )
}

fn message_queued() -> EventRecord {
    EventRecord::Other {
        section: "gear".into(),
        method: "MessageQueued".into(),
    }
}

/// A Sails program answers with the `service`/`method` route of the request, followed by a
/// unit result.
fn echo_route(payload: &[u8]) -> Option<Bytes> {
    let mut i = 0usize;
    let service = read_string(payload, &mut i).ok()?;
    let method = read_string(payload, &mut i).ok()?;
    let mut reply = encode_string(&service).ok()?;
    reply.extend(encode_string(&method).ok()?);
    Some(reply.into())
}

impl DevState {
    fn execute(&mut self, signer: ActorId, call: &Call) -> Vec<EventRecord> {
        match call {
            Call::UploadProgram {
                code,
                salt,
                gas_limit,
                ..
            } => {
                if *gas_limit > BLOCK_GAS_LIMIT {
                    return vec![module_failure("GasLimitTooHigh")];
                }
                let code_id = code_id_for(code);
                let program_id = program_id_for(code_id, salt);
                if self.programs.contains_key(&program_id) {
                    return vec![module_failure("ProgramAlreadyExists")];
                }
                self.programs.insert(program_id, code_id);
                self.uploads += 1;
                vec![message_queued(), EventRecord::ExtrinsicSuccess]
            }
            Call::SendMessage {
                destination,
                payload,
                gas_limit,
                ..
            } => {
                if *gas_limit > BLOCK_GAS_LIMIT {
                    return vec![module_failure("GasLimitTooHigh")];
                }
                if !self.programs.contains_key(destination) {
                    return vec![module_failure("InactiveProgram")];
                }
                self.messages.push(SentMessage {
                    source: signer,
                    destination: *destination,
                    payload: payload.bytes().clone(),
                });
                let mut events = vec![message_queued()];
                if let Some(reply) = echo_route(payload.as_slice()) {
                    events.push(EventRecord::UserMessageSent {
                        source: *destination,
                        destination: signer,
                        payload: reply,
                    });
                }
                events.push(EventRecord::ExtrinsicSuccess);
                events
            }
        }
    }

    fn next_block_hash(&mut self, extrinsic_hash: B256) -> B256 {
        self.block_number += 1;
        keccak256_concat(&[
            extrinsic_hash.as_slice(),
            encode_u64_le(self.block_number).as_slice(),
        ])
    }
}

/// Bytes covered by a dev chain signature.
///
/// Layout: `u8 call tag | call fields | u64 LE nonce`, variable-length fields compact prefixed.
fn signing_payload(call: &Call, nonce: u64) -> Result<Vec<u8>, EncodingError> {
    let mut buf = Vec::new();
    match call {
        Call::UploadProgram {
            code,
            salt,
            init_payload,
            gas_limit,
            value,
        } => {
            buf.push(0x00);
            buf.extend(encode_bytes(code)?);
            buf.extend(encode_bytes(salt)?);
            buf.extend(encode_bytes(init_payload.as_slice())?);
            buf.extend_from_slice(&encode_u64_le(*gas_limit));
            buf.extend_from_slice(&encode_u128_le(*value));
        }
        Call::SendMessage {
            destination,
            payload,
            gas_limit,
            value,
        } => {
            buf.push(0x01);
            buf.extend_from_slice(destination.as_slice());
            buf.extend(encode_bytes(payload.as_slice())?);
            buf.extend_from_slice(&encode_u64_le(*gas_limit));
            buf.extend_from_slice(&encode_u128_le(*value));
        }
    }
    buf.extend_from_slice(&encode_u64_le(nonce));
    Ok(buf)
}

fn gas_for(query: &GasQuery) -> u64 {
    let payload = query.payload.len() as u64;
    match &query.destination {
        GasDestination::Upload { code } => {
            1_000_000_000 + (code.len() as u64) * 10_000 + payload * 1_000
        }
        GasDestination::Program(_) => 100_000_000 + payload * 1_000,
    }
}

#[async_trait]
impl Runtime for DevRuntime {
    async fn chain_name(&self) -> Result<String, RuntimeError> {
        Ok(self.chain.clone())
    }

    async fn free_balance(&self, _account: ActorId) -> Result<u128, RuntimeError> {
        Ok(DEV_ENDOWMENT)
    }

    async fn account_nonce(&self, account: ActorId) -> Result<u64, RuntimeError> {
        Ok(self.state().nonces.get(&account).copied().unwrap_or(0))
    }

    async fn calculate_gas(&self, query: &GasQuery) -> Result<GasInfo, RuntimeError> {
        let state = self.state();
        if state.gas == GasBehaviour::Fail {
            return Err(RuntimeError::Rejected("gas simulation unavailable".into()));
        }
        if let GasDestination::Program(id) = &query.destination {
            if !state.programs.contains_key(id) {
                return Err(RuntimeError::ProgramNotFound(*id));
            }
        }
        let min_limit = gas_for(query);
        Ok(GasInfo {
            min_limit,
            reserved: 0,
            burned: min_limit / 2,
            may_be_returned: min_limit - min_limit / 2,
            waited: false,
        })
    }

    fn upload_program(&self, args: UploadArgs) -> Result<ProgramUpload, RuntimeError> {
        let salt = {
            let mut state = self.state();
            state.salt_counter += 1;
            encode_u64_le(state.salt_counter).to_vec().into()
        };
        Ok(args.with_salt(salt))
    }

    fn send_message(&self, args: MessageArgs) -> Result<Extrinsic, RuntimeError> {
        Ok(args.into())
    }

    async fn signing_payload(
        &self,
        extrinsic: &Extrinsic,
        nonce: u64,
    ) -> Result<Vec<u8>, RuntimeError> {
        Ok(signing_payload(&extrinsic.call, nonce)?)
    }

    async fn submit(&self, extrinsic: SignedExtrinsic) -> Result<StatusStream, RuntimeError> {
        let message = signing_payload(&extrinsic.call, extrinsic.nonce)?;
        if account_id_for(&extrinsic.public_key) != Some(extrinsic.signer)
            || !verify_signature(&extrinsic.public_key, &message, &extrinsic.signature)
        {
            return Err(RuntimeError::BadSignature(extrinsic.signer));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state();

        let expected = state.nonces.get(&extrinsic.signer).copied().unwrap_or(0);
        if extrinsic.nonce != expected {
            tracing::debug!(
                account = %extrinsic.signer,
                nonce = extrinsic.nonce,
                expected,
                "stale nonce"
            );
            let _ = tx.send(StatusUpdate::new(TxStatus::Invalid));
            return Ok(rx);
        }

        let script = state.script.pop_front();
        if script == Some(DevScript::Invalid) {
            let _ = tx.send(StatusUpdate::new(TxStatus::Invalid));
            return Ok(rx);
        }

        state.nonces.insert(extrinsic.signer, expected + 1);
        let _ = tx.send(StatusUpdate::new(TxStatus::Ready));

        let events = match &script {
            Some(DevScript::Fail(err)) => vec![EventRecord::ExtrinsicFailed(err.clone())],
            _ => state.execute(extrinsic.signer, &extrinsic.call),
        };
        let block_hash = state.next_block_hash(extrinsic.hash);

        if script == Some(DevScript::Stall) {
            state.stalled.push(Stalled {
                sender: tx,
                block_hash,
                events,
            });
            return Ok(rx);
        }

        let _ = tx.send(StatusUpdate::new(TxStatus::InBlock(block_hash)));
        let _ = tx.send(StatusUpdate::with_events(
            TxStatus::Finalized(block_hash),
            events,
        ));
        Ok(rx)
    }

    fn find_meta_error(&self, error: &ModuleError) -> Option<MetaError> {
        if error.index != GEAR_PALLET_INDEX {
            return None;
        }
        let (name, docs) = GEAR_ERRORS.get(usize::from(error.error[0]))?;
        Some(MetaError {
            section: "gear".into(),
            name: (*name).to_string(),
            docs: vec![(*docs).to_string()],
        })
    }
}
