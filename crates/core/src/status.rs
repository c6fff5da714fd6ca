//! Runtime status of the sender, published to anyone holding a receiver.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SenderStage {
    Starting,
    /// aligning the local store with the agglayer
    Reconciling,
    /// the submission loop is running
    Sending,
    Stopped,
}

impl fmt::Display for SenderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            SenderStage::Starting => "starting",
            SenderStage::Reconciling => "reconciling",
            SenderStage::Sending => "sending",
            SenderStage::Stopped => "stopped",
        };
        f.write_str(stage)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggSenderStatus {
    pub stage: SenderStage,
    /// unix seconds
    pub started_at: u32,
    /// last failure of a tick or of reconciliation, cleared by the next certificate sent
    pub last_error: Option<String>,
}

impl AggSenderStatus {
    pub fn new(started_at: u32) -> Self {
        Self {
            stage: SenderStage::Starting,
            started_at,
            last_error: None,
        }
    }
}
