//! Submission lifecycle of a signed extrinsic.
//!
//! `Submitted -> InBlock -> Finalized | Failed`, plus `Invalid` and `TimedOut`. Every
//! submission resolves exactly once: the first terminal status or the deadline takes the
//! resolution slot, anything after that is ignored.

use std::{sync::Arc, time::Duration};

use alloy_primitives::{Bytes, B256};
use growstreams_types::{ActorId, CodeId, Payload};
use tokio::{
    sync::oneshot,
    time::{sleep_until, Instant},
};
use tracing::{debug, info, warn};

use crate::{
    error::{SubmissionError, TxError},
    keyring::Signer,
    runtime::{
        DecodedError, EventRecord, Extrinsic, MetaError, ModuleError, Runtime, SignedExtrinsic,
        StatusStream, StatusUpdate, TxStatus,
    },
};

pub const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_MESSAGE_TIMEOUT: Duration = Duration::from_secs(60);
/// Longer timeouts are clamped to this.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(365 * 24 * 60 * 60);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timeouts {
    pub upload: Duration,
    pub message: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            upload: DEFAULT_UPLOAD_TIMEOUT,
            message: DEFAULT_MESSAGE_TIMEOUT,
        }
    }
}

impl Timeouts {
    pub fn for_target(&self, target: &TxTarget) -> Duration {
        match target {
            TxTarget::Upload { .. } => self.upload,
            TxTarget::Message { .. } => self.message,
        }
    }

    /// Deadline for a submission of `target` made at `now`.
    pub fn deadline(&self, target: &TxTarget, now: Instant) -> Instant {
        now + self.for_target(target).min(MAX_TIMEOUT)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxTarget {
    Upload { program_id: ActorId, code_id: CodeId },
    Message { destination: ActorId },
}

impl TxTarget {
    pub fn program_id(&self) -> ActorId {
        match self {
            Self::Upload { program_id, .. } => *program_id,
            Self::Message { destination } => *destination,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TxOutcome {
    Finalized {
        block_hash: B256,
        /// Payload of a `gear.UserMessageSent` addressed to the signer.
        reply: Option<Bytes>,
    },
    Failed(DecodedError),
    /// No terminal status before the deadline. The extrinsic may still land.
    TimedOut,
    Invalid,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Finalized {
    pub block_hash: B256,
    pub reply: Option<Bytes>,
}

impl TxOutcome {
    pub fn into_result(self) -> Result<Finalized, TxError> {
        match self {
            Self::Finalized { block_hash, reply } => Ok(Finalized { block_hash, reply }),
            Self::Failed(decoded) => Err(TxError::ChainFailure(decoded)),
            Self::TimedOut => Err(TxError::Timeout),
            Self::Invalid => Err(TxError::Invalid),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    Submitted,
    InBlock(B256),
    Finalized,
    Failed,
    Invalid,
    TimedOut,
}

type Resolution = Result<TxOutcome, SubmissionError>;

/// Tracking state for one in-flight extrinsic.
pub struct PendingSubmission {
    pub label: String,
    pub target: TxTarget,
    pub payload: Payload,
    pub gas_limit: u64,
    pub value: u128,
    pub signer: ActorId,
    pub deadline: Instant,
    state: LifecycleState,
    slot: Option<oneshot::Sender<Resolution>>,
}

impl PendingSubmission {
    pub fn new(
        label: impl Into<String>,
        target: TxTarget,
        extrinsic: &SignedExtrinsic,
        deadline: Instant,
    ) -> (Self, oneshot::Receiver<Resolution>) {
        let (tx, rx) = oneshot::channel();
        let pending = Self {
            label: label.into(),
            target,
            payload: extrinsic.call.payload().clone(),
            gas_limit: extrinsic.call.gas_limit(),
            value: extrinsic.call.value(),
            signer: extrinsic.signer,
            deadline,
            state: LifecycleState::Submitted,
            slot: Some(tx),
        };
        (pending, rx)
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn is_resolved(&self) -> bool {
        self.slot.is_none()
    }

    /// Feed one status update. Returns whether this update resolved the submission.
    pub fn on_status(
        &mut self,
        update: &StatusUpdate,
        lookup: &dyn Fn(&ModuleError) -> Option<MetaError>,
    ) -> bool {
        if self.is_resolved() {
            return false;
        }
        match &update.status {
            TxStatus::Future | TxStatus::Ready | TxStatus::Broadcast(_) => {
                debug!(label = %self.label, status = ?update.status, "pending");
                false
            }
            TxStatus::InBlock(hash) => {
                info!(label = %self.label, block_hash = %hash, "in block");
                self.state = LifecycleState::InBlock(*hash);
                false
            }
            TxStatus::Retracted(hash) => {
                warn!(label = %self.label, block_hash = %hash, "block retracted");
                false
            }
            TxStatus::Finalized(hash) => self.on_finalized(*hash, &update.events, lookup),
            TxStatus::FinalityTimeout(hash) => {
                warn!(label = %self.label, block_hash = %hash, "finality timeout");
                self.state = LifecycleState::TimedOut;
                self.resolve(Ok(TxOutcome::TimedOut))
            }
            TxStatus::Usurped(_) | TxStatus::Dropped | TxStatus::Invalid => {
                warn!(label = %self.label, status = ?update.status, "extrinsic invalid");
                self.state = LifecycleState::Invalid;
                self.resolve(Ok(TxOutcome::Invalid))
            }
        }
    }

    fn on_finalized(
        &mut self,
        block_hash: B256,
        events: &[EventRecord],
        lookup: &dyn Fn(&ModuleError) -> Option<MetaError>,
    ) -> bool {
        for event in events {
            debug!(label = %self.label, "{}.{}", event.section(), event.method());
        }
        let failure = events.iter().find_map(|event| match event {
            EventRecord::ExtrinsicFailed(err) => Some(err),
            _ => None,
        });
        if let Some(err) = failure {
            let decoded = DecodedError::decode(err, lookup);
            warn!(
                label = %self.label,
                block_hash = %block_hash,
                error = %decoded,
                "extrinsic failed"
            );
            self.state = LifecycleState::Failed;
            return self.resolve(Ok(TxOutcome::Failed(decoded)));
        }

        let reply = events.iter().find_map(|event| match event {
            EventRecord::UserMessageSent {
                destination,
                payload,
                ..
            } if *destination == self.signer => Some(payload.clone()),
            _ => None,
        });
        info!(label = %self.label, block_hash = %block_hash, "finalized");
        self.state = LifecycleState::Finalized;
        self.resolve(Ok(TxOutcome::Finalized { block_hash, reply }))
    }

    pub fn on_deadline(&mut self) -> bool {
        if self.is_resolved() {
            return false;
        }
        warn!(label = %self.label, program_id = %self.target.program_id(), "deadline elapsed");
        self.state = LifecycleState::TimedOut;
        self.resolve(Ok(TxOutcome::TimedOut))
    }

    /// Resolve with an error, eg when the status stream ends early.
    pub fn abandon(&mut self, err: SubmissionError) -> bool {
        self.resolve(Err(err))
    }

    /// Single-fire: only the first call delivers a result.
    pub fn resolve(&mut self, result: Resolution) -> bool {
        match self.slot.take() {
            Some(tx) => {
                // The receiver may have gone away; the submission still counts as resolved.
                let _ = tx.send(result);
                true
            }
            None => false,
        }
    }
}

async fn watch(
    mut pending: PendingSubmission,
    mut stream: StatusStream,
    runtime: Arc<dyn Runtime>,
) {
    let deadline = sleep_until(pending.deadline);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            update = stream.recv() => match update {
                Some(update) => {
                    pending.on_status(&update, &|err: &ModuleError| runtime.find_meta_error(err));
                    if pending.is_resolved() {
                        break;
                    }
                }
                None => {
                    pending.abandon(SubmissionError::StreamClosed);
                    break;
                }
            },
            () = &mut deadline => {
                pending.on_deadline();
                break;
            }
        }
    }
    debug!(label = %pending.label, state = ?pending.state(), "watcher detached");
}

pub struct LifecycleManager {
    runtime: Arc<dyn Runtime>,
    timeouts: Timeouts,
}

impl LifecycleManager {
    pub fn new(runtime: Arc<dyn Runtime>, timeouts: Timeouts) -> Self {
        Self { runtime, timeouts }
    }

    /// Sign `extrinsic` once, submit it and wait for its single outcome.
    pub async fn submit(
        &self,
        label: &str,
        target: TxTarget,
        extrinsic: Extrinsic,
        signer: &dyn Signer,
    ) -> Result<TxOutcome, SubmissionError> {
        let nonce = self.runtime.account_nonce(signer.account()).await?;
        let signed = extrinsic.sign(self.runtime.as_ref(), signer, nonce).await?;
        let tx_hash = signed.hash;

        let deadline = self.timeouts.deadline(&target, Instant::now());
        let (pending, rx) = PendingSubmission::new(label, target, &signed, deadline);
        let stream = self.runtime.submit(signed).await?;
        info!(
            label,
            tx_hash = %tx_hash,
            program_id = %target.program_id(),
            gas_limit = pending.gas_limit,
            "submitted"
        );

        tokio::spawn(watch(pending, stream, Arc::clone(&self.runtime)));
        rx.await.map_err(|_| SubmissionError::WatcherDropped)?
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::Bytes;
    use growstreams_encoder::build_service_call_payload;
    use tokio::sync::mpsc;

    use super::*;
    use crate::{
        keyring::Keyring,
        runtime::{
            dev::{gear_error, DevScript},
            DevRuntime, MessageArgs, UploadArgs,
        },
    };

    fn no_metadata(_: &ModuleError) -> Option<MetaError> {
        None
    }

    async fn signed_message(alice: &Keyring) -> SignedExtrinsic {
        let runtime = DevRuntime::new();
        runtime
            .send_message(MessageArgs {
                destination: ActorId::new([7; 32]),
                payload: Payload::Opaque(Bytes::from_static(b"\x01")),
                gas_limit: 10,
                value: 0,
            })
            .unwrap()
            .sign(&runtime, alice, 0)
            .await
            .unwrap()
    }

    fn target() -> TxTarget {
        TxTarget::Message {
            destination: ActorId::new([7; 32]),
        }
    }

    fn deadline() -> Instant {
        Instant::now() + DEFAULT_MESSAGE_TIMEOUT
    }

    #[tokio::test]
    async fn oversized_timeouts_are_clamped() {
        let timeouts = Timeouts {
            upload: Duration::from_secs(u64::MAX),
            message: Duration::from_secs(5),
        };
        let now = Instant::now();
        let upload = TxTarget::Upload {
            program_id: ActorId::ZERO,
            code_id: CodeId::ZERO,
        };
        assert_eq!(timeouts.deadline(&upload, now), now + MAX_TIMEOUT);
        assert_eq!(timeouts.deadline(&target(), now), now + Duration::from_secs(5));
    }

    #[tokio::test]
    async fn resolves_exactly_once() {
        let alice = Keyring::from_suri("//Alice").unwrap();
        let signed = signed_message(&alice).await;
        let (mut pending, rx) = PendingSubmission::new("msg", target(), &signed, deadline());

        let hash = B256::repeat_byte(1);
        assert!(!pending.on_status(&StatusUpdate::new(TxStatus::InBlock(hash)), &no_metadata));
        assert_eq!(pending.state(), LifecycleState::InBlock(hash));
        assert!(pending.on_status(&StatusUpdate::new(TxStatus::Finalized(hash)), &no_metadata));
        assert!(!pending.on_status(&StatusUpdate::new(TxStatus::Invalid), &no_metadata));
        assert!(!pending.on_deadline());
        assert_eq!(pending.state(), LifecycleState::Finalized);

        let outcome = rx.await.unwrap().unwrap();
        assert_eq!(
            outcome,
            TxOutcome::Finalized {
                block_hash: hash,
                reply: None,
            }
        );
    }

    #[tokio::test]
    async fn finalized_with_failure_event_is_decoded() {
        let alice = Keyring::from_suri("//Alice").unwrap();
        let signed = signed_message(&alice).await;
        let runtime = DevRuntime::new();
        let (mut pending, rx) = PendingSubmission::new("msg", target(), &signed, deadline());

        let update = StatusUpdate::with_events(
            TxStatus::Finalized(B256::ZERO),
            vec![EventRecord::ExtrinsicFailed(gear_error("InactiveProgram").unwrap())],
        );
        pending.on_status(&update, &|err: &ModuleError| runtime.find_meta_error(err));

        match rx.await.unwrap().unwrap() {
            TxOutcome::Failed(decoded) => {
                assert_eq!(decoded.qualified_name(), "gear.InactiveProgram")
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn closed_stream_without_terminal_status_is_an_error() {
        let alice = Keyring::from_suri("//Alice").unwrap();
        let signed = signed_message(&alice).await;
        let (pending, rx) = PendingSubmission::new("msg", target(), &signed, deadline());
        let (tx, stream) = mpsc::unbounded_channel();
        tx.send(StatusUpdate::new(TxStatus::Ready)).unwrap();
        drop(tx);

        watch(pending, stream, Arc::new(DevRuntime::new())).await;
        assert!(matches!(rx.await.unwrap(), Err(SubmissionError::StreamClosed)));
    }

    #[tokio::test]
    async fn manager_finalizes_and_returns_reply() {
        let runtime = Arc::new(DevRuntime::new());
        let alice = Keyring::from_suri("//Alice").unwrap();
        let manager = LifecycleManager::new(runtime.clone(), Timeouts::default());

        let upload = runtime
            .upload_program(UploadArgs {
                code: Bytes::from_static(b"\0asm"),
                init_payload: Payload::Opaque(Bytes::new()),
                gas_limit: 1_000_000,
                value: 0,
            })
            .unwrap();
        let target = TxTarget::Upload {
            program_id: upload.program_id,
            code_id: upload.code_id,
        };
        let outcome = manager
            .submit("upload", target, upload.extrinsic, &alice)
            .await
            .unwrap();
        assert!(matches!(outcome, TxOutcome::Finalized { reply: None, .. }));

        let payload =
            build_service_call_payload("StreamService", "Ping", std::iter::empty::<&[u8]>())
                .unwrap();
        let message = runtime
            .send_message(MessageArgs {
                destination: upload.program_id,
                payload,
                gas_limit: 1_000_000,
                value: 0,
            })
            .unwrap();
        let finalized = manager
            .submit("ping", TxTarget::Message { destination: upload.program_id }, message, &alice)
            .await
            .unwrap()
            .into_result()
            .unwrap();
        let reply = finalized.reply.unwrap();
        assert!(growstreams_encoder::decoder::strip_reply_prefix(&reply, "StreamService", "Ping")
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn invalid_submission_resolves_invalid() {
        let runtime = Arc::new(DevRuntime::new());
        runtime.push_script(DevScript::Invalid);
        let alice = Keyring::from_suri("//Alice").unwrap();
        let manager = LifecycleManager::new(runtime.clone(), Timeouts::default());
        let upload = runtime
            .upload_program(UploadArgs {
                code: Bytes::from_static(b"\0asm"),
                init_payload: Payload::Opaque(Bytes::new()),
                gas_limit: 1_000_000,
                value: 0,
            })
            .unwrap();
        let target = TxTarget::Upload {
            program_id: upload.program_id,
            code_id: upload.code_id,
        };
        let outcome = manager
            .submit("upload", target, upload.extrinsic, &alice)
            .await
            .unwrap();
        assert_eq!(outcome, TxOutcome::Invalid);
        assert!(matches!(outcome.into_result(), Err(TxError::Invalid)));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_wins_and_late_finalization_is_ignored() {
        let runtime = Arc::new(DevRuntime::new());
        runtime.push_script(DevScript::Stall);
        let alice = Keyring::from_suri("//Alice").unwrap();
        let timeouts = Timeouts {
            upload: Duration::from_secs(5),
            message: Duration::from_secs(5),
        };
        let manager = LifecycleManager::new(runtime.clone(), timeouts);
        let upload = runtime
            .upload_program(UploadArgs {
                code: Bytes::from_static(b"\0asm"),
                init_payload: Payload::Opaque(Bytes::new()),
                gas_limit: 1_000_000,
                value: 0,
            })
            .unwrap();
        let target = TxTarget::Upload {
            program_id: upload.program_id,
            code_id: upload.code_id,
        };

        let started = Instant::now();
        let outcome = manager
            .submit("upload", target, upload.extrinsic, &alice)
            .await
            .unwrap();
        assert_eq!(outcome, TxOutcome::TimedOut);
        assert!(started.elapsed() >= Duration::from_secs(5));

        // The chain still executed it; the late statuses go nowhere.
        assert_eq!(runtime.finalize_stalled(), 1);
        assert!(runtime.has_program(upload.program_id));
    }
}
