use std::path::PathBuf;

use growstreams_types::{ActorId, EncodingError};

use crate::runtime::DecodedError;

/// Failures reported by a [`Runtime`](crate::runtime::Runtime) collaborator.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("unsupported node endpoint `{0}` (expected ws://, wss:// or dev://)")]
    UnsupportedEndpoint(String),
    #[error("runtime rejected request: {0}")]
    Rejected(String),
    #[error("program {0} not found")]
    ProgramNotFound(ActorId),
    #[error("bad signature for account {0}")]
    BadSignature(ActorId),
    #[error("{0}")]
    Encoding(#[from] EncodingError),
}

/// Gas simulation failed. Recoverable: callers fall back to a configured ceiling.
#[derive(Debug, thiserror::Error)]
#[error("gas estimation failed: {0}")]
pub struct EstimationError(#[from] pub RuntimeError);

#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    #[error("signature request rejected: {0}")]
    Rejected(String),
    #[error("signing failed: {0}")]
    Failed(String),
}

/// Signing or initial dispatch of an extrinsic failed; nothing reached the chain.
#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error("{0}")]
    Signing(#[from] SignerError),
    #[error("dispatch failed: {0}")]
    Dispatch(#[from] RuntimeError),
    #[error("{0}")]
    Encoding(#[from] EncodingError),
    #[error("{0}")]
    Estimation(#[from] EstimationError),
    #[error("status stream closed before a terminal status")]
    StreamClosed,
    #[error("transaction watcher stopped before resolving")]
    WatcherDropped,
}

/// A submission that did not end in a successful finalization.
#[derive(Debug, thiserror::Error)]
pub enum TxError {
    #[error("{0}")]
    Submission(#[from] SubmissionError),
    #[error("extrinsic failed: {0}")]
    ChainFailure(DecodedError),
    #[error("no terminal status before the deadline; on-chain outcome unknown")]
    Timeout,
    #[error("extrinsic rejected as invalid")]
    Invalid,
}

#[derive(Debug, thiserror::Error)]
pub enum StateStoreError {
    #[error("failed reading {path}: {source}", path = .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed parsing JSON in {path}: {source}", path = .path.display())]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed writing {path}: {source}", path = .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed serialising state JSON: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Why a single orchestration step failed. The batch carries on past these.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("artifact {path} not found", path = .path.display())]
    MissingArtifact { path: PathBuf },
    #[error("failed reading artifact {path}: {source}", path = .path.display())]
    Artifact {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("missing {0} in deployment state")]
    MissingDeployment(&'static str),
    #[error("{0}")]
    Encoding(#[from] EncodingError),
    #[error("{0}")]
    Runtime(#[from] RuntimeError),
    #[error("{0}")]
    Submission(#[from] SubmissionError),
    #[error("{0}")]
    Tx(#[from] TxError),
}
