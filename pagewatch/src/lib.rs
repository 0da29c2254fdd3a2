//! A checkpointed batch workflow engine for page change monitoring: a cron
//! driven scheduler triggers workflow runs, and each run pages through its
//! tracked targets under bounded concurrency, pacing itself against the
//! upstream capture quota and persisting a resumable checkpoint after every
//! page.

use std::sync::Arc;

pub mod backend;
pub mod capture;
pub mod config;
pub mod diff;
pub mod executor;
pub mod job;
pub mod pacing;
pub mod prelude;
pub mod registry;
pub mod scheduler;
pub mod target;
pub mod testing;
pub mod workflow;

use backend::CheckpointStore;
use capture::Capture;
use diff::DiffAnalyzer;
use executor::{ExecutorError, WorkflowExecutor};
use job::{JobId, JobState, JobStatus};
use scheduler::{ScheduleError, ScheduleId, Scheduler};
use target::TargetLister;
use thiserror::Error;
use workflow::{InvalidWorkflowType, WorkflowDescriptor, WorkflowId, WorkflowType};

/// The assembled engine: a workflow executor and the scheduler driving it,
/// wired to one set of collaborators.
pub struct Pagewatch {
    executor: WorkflowExecutor,
    scheduler: Scheduler,
}

impl Pagewatch {
    pub fn new(
        lister: Arc<dyn TargetLister>,
        capture: Arc<dyn Capture>,
        diff: Arc<dyn DiffAnalyzer>,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> Self {
        let executor = WorkflowExecutor::new(lister, capture, diff, checkpoints);
        let scheduler = Scheduler::new(executor.clone());
        Self {
            executor,
            scheduler,
        }
    }

    /// Builds the engine around a preconfigured executor.
    pub fn with_executor(executor: WorkflowExecutor) -> Self {
        let scheduler = Scheduler::new(executor.clone());
        Self {
            executor,
            scheduler,
        }
    }

    pub fn executor(&self) -> &WorkflowExecutor {
        &self.executor
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn schedule(
        &self,
        spec: &str,
        descriptor: WorkflowDescriptor,
    ) -> Result<ScheduleId, PagewatchError> {
        Ok(self.scheduler.schedule(spec, descriptor)?)
    }

    pub fn unschedule(&self, id: ScheduleId) -> Result<(), PagewatchError> {
        Ok(self.scheduler.unschedule(id)?)
    }

    pub async fn start(&self, workflow_id: WorkflowId) -> Result<JobId, PagewatchError> {
        Ok(self.executor.start(workflow_id).await?)
    }

    pub fn stop(&self, workflow_id: &WorkflowId) -> Result<(), PagewatchError> {
        Ok(self.executor.stop(workflow_id)?)
    }

    pub fn get(&self, workflow_id: &WorkflowId) -> Result<JobState, PagewatchError> {
        Ok(self.executor.get(workflow_id)?)
    }

    pub fn list(
        &self,
        status: Option<JobStatus>,
        workflow_type: Option<WorkflowType>,
    ) -> Vec<JobState> {
        self.executor.list(status, workflow_type)
    }

    /// Cancels every trigger registration and live run, waiting for all of
    /// them to wind down.
    pub async fn graceful_shutdown(self) {
        tracing::debug!("shutting down pagewatch engine");
        self.scheduler.shutdown().await;
        self.executor.shutdown().await;
    }
}

#[derive(Debug, Error)]
pub enum PagewatchError {
    #[error("executor error: {0}")]
    Executor(#[from] ExecutorError),
    #[error("scheduler error: {0}")]
    Schedule(#[from] ScheduleError),
    #[error(transparent)]
    InvalidWorkflowType(#[from] InvalidWorkflowType),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::InMemoryCheckpointStore;
    use crate::testing::{targets, NoopDiff, SequenceLister, StaticCapture};

    #[tokio::test(start_paused = true)]
    async fn the_assembled_engine_runs_a_workflow_end_to_end() {
        let engine = Pagewatch::new(
            Arc::new(SequenceLister::new(vec![targets(0, 4), targets(1, 4)])),
            Arc::new(StaticCapture::new()),
            Arc::new(NoopDiff),
            Arc::new(InMemoryCheckpointStore::new()),
        );
        let workflow_id = WorkflowId::new(WorkflowType::Screenshot, 2026, 32, 0);

        engine.start(workflow_id.clone()).await.unwrap();
        let state = loop {
            if let Ok(state) = engine.get(&workflow_id) {
                if state.status.is_terminal() {
                    break state;
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        };

        assert_eq!(state.status, JobStatus::Completed);
        assert_eq!(state.completed, 8);

        engine.graceful_shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_aborts_live_runs() {
        let engine = Pagewatch::new(
            Arc::new(SequenceLister::new(vec![
                targets(0, 2),
                targets(1, 2),
                targets(2, 2),
            ])),
            Arc::new(StaticCapture::new()),
            Arc::new(NoopDiff),
            Arc::new(InMemoryCheckpointStore::new()),
        );
        let workflow_id = WorkflowId::new(WorkflowType::Report, 2026, 32, 0);

        engine.start(workflow_id.clone()).await.unwrap();
        let states = engine.list(Some(JobStatus::Running), None);
        assert_eq!(states.len(), 1);

        engine.graceful_shutdown().await;
    }
}
