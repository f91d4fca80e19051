//! Deployment and transaction tooling for the GrowStreams programs on Vara.

pub mod catalog;
pub mod config;
pub mod error;
pub mod gas;
pub mod hashing;
pub mod keyring;
pub mod lifecycle;
pub mod logging;
pub mod orchestrator;
pub mod runtime;
pub mod signing;
pub mod state;

pub use error::{
    EstimationError, RuntimeError, SignerError, StateStoreError, StepError, SubmissionError,
    TxError,
};
