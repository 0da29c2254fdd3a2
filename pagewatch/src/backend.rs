//! Durable storage for workflow checkpoints.
//!
//! The engine persists a job's checkpoint after every fully processed page
//! so that a crashed or restarted process can resume exactly where it left
//! off. A stored checkpoint also doubles as the marker that a prior run for
//! that workflow identifier did not finish: the executor clears the entry on
//! normal completion, and the scheduler recovers instead of starting fresh
//! whenever an entry is present.

use async_trait::async_trait;
use thiserror::Error;

use crate::job::Checkpoint;
use crate::workflow::WorkflowId;

pub mod memory;

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Durably records the checkpoint for the given workflow, replacing any
    /// previous entry.
    async fn persist(
        &self,
        workflow_id: &WorkflowId,
        checkpoint: &Checkpoint,
    ) -> Result<(), BackendError>;

    /// Loads the stored checkpoint, if a prior run left one behind.
    async fn load(&self, workflow_id: &WorkflowId) -> Result<Option<Checkpoint>, BackendError>;

    /// Removes the stored checkpoint, marking the workflow as cleanly
    /// finished.
    async fn clear(&self, workflow_id: &WorkflowId) -> Result<(), BackendError>;
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("error encoding or decoding checkpoint data")]
    EncodeDecode(#[from] serde_json::Error),
    #[error("checkpoint storage unavailable: {0}")]
    Unavailable(String),
}
