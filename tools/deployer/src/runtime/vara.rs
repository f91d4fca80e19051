//! A Vara node over JSON-RPC.
//!
//! Calls are built dynamically against the node's metadata (`Gear.upload_program`,
//! `Gear.send_message`), signed through the injected [`Signer`](crate::keyring::Signer) and
//! watched until finalization. Gas comes from the `gear_calculate*Gas` RPCs.

use std::sync::atomic::{AtomicU64, Ordering};

use alloy_primitives::{Bytes, B256};
use async_trait::async_trait;
use growstreams_types::ActorId;
use parity_scale_codec::Decode;
use serde::Deserialize;
use subxt::{
    backend::{
        legacy::LegacyRpcMethods,
        rpc::{rpc_params, RpcClient},
    },
    config::DefaultExtrinsicParamsBuilder,
    dynamic::{self, Value},
    ext::scale_value::At,
    tx::{DynamicPayload, PartialExtrinsic, TxInBlock, TxProgress, TxStatus as NodeStatus},
    utils::{AccountId32, MultiAddress, MultiSignature, H256},
    OnlineClient, PolkadotConfig,
};
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{
    Call, DispatchError, EventRecord, Extrinsic, GasDestination, GasInfo, GasQuery, MessageArgs,
    MetaError, ModuleError, ProgramUpload, Runtime, SignedExtrinsic, StatusStream, StatusUpdate,
    TxStatus, UploadArgs,
};
use crate::error::RuntimeError;

type Client = OnlineClient<PolkadotConfig>;

/// `sp_runtime::DispatchError` variants, by SCALE index.
const DISPATCH_ERRORS: [&str; 14] = [
    "Other",
    "CannotLookup",
    "BadOrigin",
    "Module",
    "ConsumerRemaining",
    "NoProviders",
    "TooManyConsumers",
    "Token",
    "Arithmetic",
    "Transactional",
    "Exhausted",
    "Corruption",
    "Unavailable",
    "RootNotAllowed",
];

pub struct VaraRuntime {
    api: Client,
    rpc: RpcClient,
    legacy: LegacyRpcMethods<PolkadotConfig>,
    uploads: AtomicU64,
}

impl VaraRuntime {
    /// `wss://` endpoints are required to be secure; `ws://` is accepted for local nodes.
    pub async fn connect(url: &str) -> Result<Self, RuntimeError> {
        let rpc = if url.starts_with("wss://") {
            RpcClient::from_url(url).await
        } else {
            RpcClient::from_insecure_url(url).await
        }
        .map_err(|err| RuntimeError::Connection(err.to_string()))?;
        let api = Client::from_rpc_client(rpc.clone())
            .await
            .map_err(|err| RuntimeError::Connection(err.to_string()))?;
        debug!(node = url, "node metadata loaded");

        Ok(Self {
            legacy: LegacyRpcMethods::new(rpc.clone()),
            api,
            rpc,
            uploads: AtomicU64::new(0),
        })
    }

    fn partial(
        &self,
        call: &Call,
        nonce: u64,
    ) -> Result<PartialExtrinsic<PolkadotConfig, Client>, RuntimeError> {
        let params = DefaultExtrinsicParamsBuilder::<PolkadotConfig>::new()
            .nonce(nonce)
            .build();
        self.api
            .tx()
            .create_partial_signed_offline(&dynamic_call(call), params)
            .map_err(rejected)
    }
}

fn rejected(err: subxt::Error) -> RuntimeError {
    RuntimeError::Rejected(err.to_string())
}

fn account(id: ActorId) -> AccountId32 {
    AccountId32(*id.as_bytes())
}

fn dynamic_call(call: &Call) -> DynamicPayload {
    match call {
        Call::UploadProgram {
            code,
            salt,
            init_payload,
            gas_limit,
            value,
        } => dynamic::tx(
            "Gear",
            "upload_program",
            vec![
                Value::from_bytes(code),
                Value::from_bytes(salt),
                Value::from_bytes(init_payload.as_slice()),
                Value::u128(u128::from(*gas_limit)),
                Value::u128(*value),
                Value::bool(false),
            ],
        ),
        Call::SendMessage {
            destination,
            payload,
            gas_limit,
            value,
        } => dynamic::tx(
            "Gear",
            "send_message",
            vec![
                Value::from_bytes(destination.as_slice()),
                Value::from_bytes(payload.as_slice()),
                Value::u128(u128::from(*gas_limit)),
                Value::u128(*value),
                Value::bool(false),
            ],
        ),
    }
}

/// Unique per process and per call, so repeated uploads of one code never collide.
fn upload_salt(sequence: u64) -> Bytes {
    let mut salt = OffsetDateTime::now_utc()
        .unix_timestamp_nanos()
        .to_le_bytes()
        .to_vec();
    salt.extend_from_slice(&sequence.to_le_bytes());
    salt.into()
}

/// `gear_calculate*Gas` result.
#[derive(Debug, Deserialize)]
struct RpcGasInfo {
    #[serde(alias = "minLimit")]
    min_limit: u64,
    reserved: u64,
    burned: u64,
    #[serde(alias = "mayBeReturned")]
    may_be_returned: u64,
    waited: bool,
}

impl From<RpcGasInfo> for GasInfo {
    fn from(info: RpcGasInfo) -> Self {
        Self {
            min_limit: info.min_limit,
            reserved: info.reserved,
            burned: info.burned,
            may_be_returned: info.may_be_returned,
            waited: info.waited,
        }
    }
}

/// Pallet names as the status JSON spells sections: `GearVoucher` -> `gearVoucher`.
fn section_name(pallet: &str) -> String {
    let mut chars = pallet.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn decode_dispatch_error(mut fields: &[u8]) -> DispatchError {
    let Ok(variant) = u8::decode(&mut fields) else {
        return DispatchError::Other("undecodable dispatch error".into());
    };
    match variant {
        1 => DispatchError::CannotLookup,
        2 => DispatchError::BadOrigin,
        3 => match <(u8, [u8; 4])>::decode(&mut fields) {
            Ok((index, error)) => DispatchError::Module(ModuleError { index, error }),
            Err(_) => DispatchError::Other("undecodable module error".into()),
        },
        other => DispatchError::Other(
            DISPATCH_ERRORS
                .get(usize::from(other))
                .map_or_else(|| format!("DispatchError({other})"), |name| (*name).to_string()),
        ),
    }
}

fn event_record(pallet: &str, variant: &str, mut fields: &[u8]) -> EventRecord {
    match (pallet, variant) {
        ("System", "ExtrinsicSuccess") => EventRecord::ExtrinsicSuccess,
        ("System", "ExtrinsicFailed") => {
            EventRecord::ExtrinsicFailed(decode_dispatch_error(fields))
        }
        // `UserMessage { id, source, destination, payload, .. }` leads the event fields.
        ("Gear", "UserMessageSent") => {
            match <([u8; 32], [u8; 32], [u8; 32], Vec<u8>)>::decode(&mut fields) {
                Ok((_id, source, destination, payload)) => EventRecord::UserMessageSent {
                    source: ActorId::new(source),
                    destination: ActorId::new(destination),
                    payload: payload.into(),
                },
                Err(err) => {
                    warn!(error = %err, "undecodable gear.UserMessageSent");
                    EventRecord::Other {
                        section: section_name(pallet),
                        method: variant.to_string(),
                    }
                }
            }
        }
        _ => EventRecord::Other {
            section: section_name(pallet),
            method: variant.to_string(),
        },
    }
}

async fn extrinsic_events(block: &TxInBlock<PolkadotConfig, Client>) -> Vec<EventRecord> {
    let events = match block.fetch_events().await {
        Ok(events) => events,
        Err(err) => {
            return vec![EventRecord::ExtrinsicFailed(DispatchError::Other(format!(
                "events unavailable: {err}"
            )))]
        }
    };
    events
        .iter()
        .filter_map(|event| match event {
            Ok(event) => Some(event_record(
                event.pallet_name(),
                event.variant_name(),
                event.field_bytes(),
            )),
            Err(err) => {
                warn!(error = %err, "undecodable event");
                None
            }
        })
        .collect()
}

async fn status_update(
    status: NodeStatus<PolkadotConfig, Client>,
    best_block: &mut B256,
) -> StatusUpdate {
    match status {
        NodeStatus::Validated => StatusUpdate::new(TxStatus::Ready),
        NodeStatus::Broadcasted { .. } => StatusUpdate::new(TxStatus::Broadcast(Vec::new())),
        NodeStatus::NoLongerInBestBlock => StatusUpdate::new(TxStatus::Retracted(*best_block)),
        NodeStatus::InBestBlock(block) => {
            *best_block = B256::from(block.block_hash().0);
            StatusUpdate::new(TxStatus::InBlock(*best_block))
        }
        NodeStatus::InFinalizedBlock(block) => {
            let hash = B256::from(block.block_hash().0);
            StatusUpdate::with_events(TxStatus::Finalized(hash), extrinsic_events(&block).await)
        }
        NodeStatus::Error { message } => {
            warn!(%message, "node reported a transaction error");
            StatusUpdate::new(TxStatus::Dropped)
        }
        NodeStatus::Invalid { message } => {
            warn!(%message, "node rejected the transaction");
            StatusUpdate::new(TxStatus::Invalid)
        }
        NodeStatus::Dropped { message } => {
            warn!(%message, "transaction dropped from the pool");
            StatusUpdate::new(TxStatus::Dropped)
        }
    }
}

/// Forward node statuses until a terminal one, the subscription ends, or nobody listens.
async fn forward_statuses(
    mut progress: TxProgress<PolkadotConfig, Client>,
    tx: mpsc::UnboundedSender<StatusUpdate>,
) {
    let mut best_block = B256::ZERO;
    while let Some(status) = progress.next().await {
        let update = match status {
            Ok(status) => status_update(status, &mut best_block).await,
            Err(err) => {
                warn!(error = %err, "status subscription failed");
                return;
            }
        };
        let terminal = update.status.is_terminal();
        if tx.send(update).is_err() || terminal {
            return;
        }
    }
}

#[async_trait]
impl Runtime for VaraRuntime {
    async fn chain_name(&self) -> Result<String, RuntimeError> {
        self.legacy.system_chain().await.map_err(rejected)
    }

    async fn free_balance(&self, account_id: ActorId) -> Result<u128, RuntimeError> {
        let address = dynamic::storage(
            "System",
            "Account",
            vec![Value::from_bytes(account_id.as_slice())],
        );
        let stored = self
            .api
            .storage()
            .at_latest()
            .await
            .map_err(rejected)?
            .fetch(&address)
            .await
            .map_err(rejected)?;
        let Some(stored) = stored else {
            return Ok(0);
        };
        let info = stored.to_value().map_err(|e| rejected(subxt::Error::from(e)))?;
        info.at("data")
            .at("free")
            .and_then(|free| free.as_u128())
            .ok_or_else(|| RuntimeError::Rejected("unexpected System.Account layout".into()))
    }

    async fn account_nonce(&self, account_id: ActorId) -> Result<u64, RuntimeError> {
        self.legacy
            .system_account_next_index(&account(account_id))
            .await
            .map_err(rejected)
    }

    async fn calculate_gas(&self, query: &GasQuery) -> Result<GasInfo, RuntimeError> {
        let source = query.source.to_string();
        let payload = query.payload.to_hex();
        let at: Option<H256> = None;
        let info: RpcGasInfo = match &query.destination {
            GasDestination::Upload { code } => {
                self.rpc
                    .request(
                        "gear_calculateInitUploadGas",
                        rpc_params![
                            source,
                            format!("0x{}", hex::encode(code)),
                            payload,
                            query.value,
                            query.keep_result,
                            at
                        ],
                    )
                    .await
            }
            GasDestination::Program(destination) => {
                self.rpc
                    .request(
                        "gear_calculateHandleGas",
                        rpc_params![
                            source,
                            destination.to_string(),
                            payload,
                            query.value,
                            query.keep_result,
                            at
                        ],
                    )
                    .await
            }
        }
        .map_err(rejected)?;
        Ok(info.into())
    }

    fn upload_program(&self, args: UploadArgs) -> Result<ProgramUpload, RuntimeError> {
        let sequence = self.uploads.fetch_add(1, Ordering::Relaxed);
        Ok(args.with_salt(upload_salt(sequence)))
    }

    fn send_message(&self, args: MessageArgs) -> Result<Extrinsic, RuntimeError> {
        Ok(args.into())
    }

    async fn signing_payload(
        &self,
        extrinsic: &Extrinsic,
        nonce: u64,
    ) -> Result<Vec<u8>, RuntimeError> {
        Ok(self.partial(&extrinsic.call, nonce)?.signer_payload())
    }

    async fn submit(&self, extrinsic: SignedExtrinsic) -> Result<StatusStream, RuntimeError> {
        let signature = <[u8; 64]>::try_from(extrinsic.signature.as_ref())
            .map_err(|_| RuntimeError::BadSignature(extrinsic.signer))?;
        let submittable = self
            .partial(&extrinsic.call, extrinsic.nonce)?
            .sign_with_address_and_signature(
                &MultiAddress::Id(account(extrinsic.signer)),
                &MultiSignature::Sr25519(signature),
            );
        let progress = submittable.submit_and_watch().await.map_err(rejected)?;
        debug!(
            account = %extrinsic.signer,
            nonce = extrinsic.nonce,
            extrinsic_hash = ?progress.extrinsic_hash(),
            "watching extrinsic"
        );

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(forward_statuses(progress, tx));
        Ok(rx)
    }

    fn find_meta_error(&self, error: &ModuleError) -> Option<MetaError> {
        let metadata = self.api.metadata();
        let pallet = metadata.pallet_by_index(error.index)?;
        let variant = pallet.error_variant_by_index(error.error[0])?;
        Some(MetaError {
            section: section_name(pallet.name()),
            name: variant.name.clone(),
            docs: variant.docs.clone(),
        })
    }
}
