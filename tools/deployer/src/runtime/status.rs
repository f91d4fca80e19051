//! Extrinsic status updates, named after the node's `TransactionStatus` JSON.

use alloy_primitives::B256;
use serde::{Deserialize, Serialize};

use super::events::EventRecord;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TxStatus {
    Future,
    Ready,
    Broadcast(Vec<String>),
    InBlock(B256),
    Retracted(B256),
    FinalityTimeout(B256),
    Finalized(B256),
    Usurped(B256),
    Dropped,
    Invalid,
}

impl TxStatus {
    /// Whether the node will send nothing further for this extrinsic.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Finalized(_)
                | Self::FinalityTimeout(_)
                | Self::Usurped(_)
                | Self::Dropped
                | Self::Invalid
        )
    }
}

/// One status notification and the events known at that point.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusUpdate {
    pub status: TxStatus,
    pub events: Vec<EventRecord>,
}

impl StatusUpdate {
    pub fn new(status: TxStatus) -> Self {
        Self {
            status,
            events: Vec::new(),
        }
    }

    pub fn with_events(status: TxStatus, events: Vec<EventRecord>) -> Self {
        Self { status, events }
    }
}
