//! Send a pre-encoded payload on behalf of a wallet.
//!
//! The payload is built elsewhere (a trusted server-side builder) and arrives as hex; this side
//! only estimates gas, asks the wallet for one signature and tracks the extrinsic.

use std::sync::Arc;

use alloy_primitives::{Bytes, B256};
use growstreams_types::{ActorId, Payload};
use tracing::info;

use crate::{
    error::{SubmissionError, TxError},
    gas::GasEstimator,
    keyring::Signer,
    lifecycle::{LifecycleManager, Timeouts, TxTarget},
    runtime::{GasDestination, GasQuery, MessageArgs, Runtime},
};

pub const DEFAULT_GAS_BUMP_PERCENT: u64 = 20;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SendResult {
    pub block_hash: B256,
    pub reply: Option<Bytes>,
}

pub struct SigningAdapter {
    runtime: Arc<dyn Runtime>,
    gas: GasEstimator,
    lifecycle: LifecycleManager,
    bump_percent: u64,
}

impl SigningAdapter {
    pub fn new(runtime: Arc<dyn Runtime>, timeouts: Timeouts) -> Self {
        Self {
            gas: GasEstimator::new(Arc::clone(&runtime)),
            lifecycle: LifecycleManager::new(Arc::clone(&runtime), timeouts),
            runtime,
            bump_percent: DEFAULT_GAS_BUMP_PERCENT,
        }
    }

    /// No retries: every failure goes back to the caller as is.
    pub async fn sign_and_send(
        &self,
        wallet: &dyn Signer,
        destination: &str,
        payload_hex: &str,
        value: u128,
    ) -> Result<SendResult, TxError> {
        let destination =
            ActorId::from_hex_padded(destination).map_err(SubmissionError::from)?;
        let payload = Payload::from_hex(payload_hex).map_err(SubmissionError::from)?;

        let query = GasQuery {
            source: wallet.account(),
            destination: GasDestination::Program(destination),
            payload: payload.clone(),
            value,
            keep_result: true,
        };
        let gas_limit = self
            .gas
            .estimate_with_margin(&query, self.bump_percent)
            .await
            .map_err(SubmissionError::from)?;

        let extrinsic = self
            .runtime
            .send_message(MessageArgs {
                destination,
                payload,
                gas_limit,
                value,
            })
            .map_err(SubmissionError::from)?;
        info!(destination = %destination, gas_limit, value = %value, "requesting wallet signature");

        let finalized = self
            .lifecycle
            .submit("wallet message", TxTarget::Message { destination }, extrinsic, wallet)
            .await?
            .into_result()?;
        Ok(SendResult {
            block_hash: finalized.block_hash,
            reply: finalized.reply,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use growstreams_encoder::build_service_call_payload;

    use super::*;
    use crate::{
        error::SignerError,
        keyring::Keyring,
        lifecycle::TxOutcome,
        runtime::{DevRuntime, UploadArgs},
    };

    struct CountingWallet {
        inner: Keyring,
        prompts: AtomicUsize,
    }

    #[async_trait]
    impl Signer for CountingWallet {
        fn account(&self) -> ActorId {
            self.inner.account()
        }

        fn public_key(&self) -> Bytes {
            self.inner.public_key()
        }

        async fn sign(&self, message: &[u8]) -> Result<Bytes, SignerError> {
            self.prompts.fetch_add(1, Ordering::SeqCst);
            self.inner.sign(message).await
        }
    }

    struct RejectingWallet(Keyring);

    #[async_trait]
    impl Signer for RejectingWallet {
        fn account(&self) -> ActorId {
            self.0.account()
        }

        fn public_key(&self) -> Bytes {
            self.0.public_key()
        }

        async fn sign(&self, _message: &[u8]) -> Result<Bytes, SignerError> {
            Err(SignerError::Rejected("user cancelled".into()))
        }
    }

    fn wallet() -> CountingWallet {
        CountingWallet {
            inner: Keyring::from_suri("//Bob").unwrap(),
            prompts: AtomicUsize::new(0),
        }
    }

    async fn deploy_program(runtime: &Arc<DevRuntime>) -> ActorId {
        let alice = Keyring::from_suri("//Alice").unwrap();
        let upload = runtime
            .upload_program(UploadArgs {
                code: Bytes::from_static(b"\0asm stream-core"),
                init_payload: Payload::Opaque(Bytes::new()),
                gas_limit: 1_000_000_000,
                value: 0,
            })
            .unwrap();
        let manager = LifecycleManager::new(runtime.clone(), Timeouts::default());
        let target = TxTarget::Upload {
            program_id: upload.program_id,
            code_id: upload.code_id,
        };
        let outcome = manager
            .submit("upload", target, upload.extrinsic, &alice)
            .await
            .unwrap();
        assert!(matches!(outcome, TxOutcome::Finalized { .. }));
        upload.program_id
    }

    #[tokio::test]
    async fn prompts_once_and_returns_reply() {
        let runtime = Arc::new(DevRuntime::new());
        let program = deploy_program(&runtime).await;
        let adapter = SigningAdapter::new(runtime.clone(), Timeouts::default());
        let wallet = wallet();

        let payload =
            build_service_call_payload("StreamService", "Withdraw", [7u64.to_le_bytes()]).unwrap();
        let result = adapter
            .sign_and_send(&wallet, &program.to_string(), &payload.to_hex(), 0)
            .await
            .unwrap();

        assert_eq!(wallet.prompts.load(Ordering::SeqCst), 1);
        assert!(result.reply.is_some());
        let sent = runtime.sent_messages();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].payload, *payload.bytes());
        assert_eq!(sent[0].source, wallet.account());
    }

    #[tokio::test]
    async fn rejected_signature_is_surfaced() {
        let runtime = Arc::new(DevRuntime::new());
        let program = deploy_program(&runtime).await;
        let adapter = SigningAdapter::new(runtime.clone(), Timeouts::default());
        let wallet = RejectingWallet(Keyring::from_suri("//Bob").unwrap());

        let err = adapter
            .sign_and_send(&wallet, &program.to_string(), "0x00", 0)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TxError::Submission(SubmissionError::Signing(SignerError::Rejected(_)))
        ));
        assert!(runtime.sent_messages().is_empty());
    }

    #[tokio::test]
    async fn estimation_failure_never_prompts() {
        let runtime = Arc::new(DevRuntime::new());
        let adapter = SigningAdapter::new(runtime, Timeouts::default());
        let wallet = wallet();

        let err = adapter
            .sign_and_send(&wallet, "0x1234", "0x00", 0)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TxError::Submission(SubmissionError::Estimation(_))
        ));
        assert_eq!(wallet.prompts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn malformed_payload_hex_is_an_encoding_error() {
        let adapter = SigningAdapter::new(Arc::new(DevRuntime::new()), Timeouts::default());
        let err = adapter
            .sign_and_send(&wallet(), "0x01", "0xzz", 0)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TxError::Submission(SubmissionError::Encoding(_))
        ));
    }
}
