//! Provides an in memory implementation of [`CheckpointStore`].
//!
//! Currently this is provided for testing purposes and not designed for use
//! in a production system: checkpoints stored here do not survive a process
//! restart, which defeats the point of checkpointing. It is a correct
//! implementation for use in a test setup.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use fxhash::FxHashMap;

use super::{BackendError, CheckpointStore};
use crate::job::Checkpoint;
use crate::workflow::WorkflowId;

/// An in memory implementation of [`CheckpointStore`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryCheckpointStore {
    checkpoints: Arc<RwLock<FxHashMap<String, Checkpoint>>>,
}

fn poisoned() -> BackendError {
    BackendError::Unavailable("checkpoint store lock poisoned".to_owned())
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of workflows with a stored checkpoint.
    pub fn len(&self) -> usize {
        self.checkpoints.read().map(|map| map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn persist(
        &self,
        workflow_id: &WorkflowId,
        checkpoint: &Checkpoint,
    ) -> Result<(), BackendError> {
        self.checkpoints
            .write()
            .map_err(|_| poisoned())?
            .insert(workflow_id.storage_key(), checkpoint.clone());
        Ok(())
    }

    async fn load(&self, workflow_id: &WorkflowId) -> Result<Option<Checkpoint>, BackendError> {
        Ok(self
            .checkpoints
            .read()
            .map_err(|_| poisoned())?
            .get(&workflow_id.storage_key())
            .cloned())
    }

    async fn clear(&self, workflow_id: &WorkflowId) -> Result<(), BackendError> {
        self.checkpoints
            .write()
            .map_err(|_| poisoned())?
            .remove(&workflow_id.storage_key());
        Ok(())
    }
}
