//! The concurrency safe handle to a running job.
//!
//! Job state is owned by a single spawned task rather than shared behind a
//! lock. Workers and the executor loop report progress by sending messages to
//! that task, and every mutation publishes a fresh [`JobState`] snapshot on a
//! watch channel, so readers always observe a consistent status, checkpoint,
//! and counter set. Cancellation is a [`CancellationToken`] carried by the
//! context; the owning task watches it and moves a non-terminal job to
//! [`JobStatus::Aborted`] when it fires.

use async_stream::stream;
use futures::Stream;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use super::{Checkpoint, Job, JobError, JobId, JobState, JobStatus, JobUpdate};
use crate::workflow::WorkflowId;

#[derive(Debug)]
enum JobMessage {
    Progress(JobUpdate),
    Failure(JobError),
    Complete,
    Fail(String),
}

/// Cloneable handle to a job's single writer task.
#[derive(Debug, Clone)]
pub struct JobContext {
    id: JobId,
    workflow_id: WorkflowId,
    sender: mpsc::UnboundedSender<JobMessage>,
    state: watch::Receiver<JobState>,
    cancellation: CancellationToken,
}

impl JobContext {
    /// Spawns the owning task for a fresh job with an empty checkpoint.
    pub(crate) fn spawn(workflow_id: WorkflowId) -> Self {
        Self::spawn_with_checkpoint(workflow_id, Checkpoint::default())
    }

    /// Spawns the owning task for a job seeded with a previously persisted
    /// checkpoint, the recovery path.
    pub(crate) fn spawn_with_checkpoint(workflow_id: WorkflowId, checkpoint: Checkpoint) -> Self {
        let job = Job::new(workflow_id.clone(), checkpoint);
        let id = job.id;
        let (sender, receiver) = mpsc::unbounded_channel();
        let (state_sender, state) = watch::channel(job.snapshot());
        let cancellation = CancellationToken::new();

        tokio::spawn(run_job_task(
            job,
            receiver,
            state_sender,
            cancellation.clone(),
        ));

        Self {
            id,
            workflow_id,
            sender,
            state,
            cancellation,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn workflow_id(&self) -> &WorkflowId {
        &self.workflow_id
    }

    /// A consistent snapshot of the job. Never tears status against
    /// checkpoint or counters.
    pub fn state(&self) -> JobState {
        self.state.borrow().clone()
    }

    pub fn status(&self) -> JobStatus {
        self.state.borrow().status
    }

    pub fn checkpoint(&self) -> Checkpoint {
        self.state.borrow().checkpoint.clone()
    }

    /// The job's cancellation token. Per item contexts are derived from this
    /// via [`CancellationToken::child_token`].
    pub fn cancellation(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Reports progress: marks the job running, adds the deltas, and replaces
    /// the checkpoint.
    pub fn progress(&self, update: JobUpdate) {
        let _ = self.sender.send(JobMessage::Progress(update));
    }

    /// Records a non-fatal failure. See [`JobError`] for which failures move
    /// the failed counter.
    pub fn record_failure(&self, error: JobError) {
        let _ = self.sender.send(JobMessage::Failure(error));
    }

    /// Marks the job completed. Terminal.
    pub fn complete(&self) {
        let _ = self.sender.send(JobMessage::Complete);
    }

    /// Marks the job failed with a run level reason. Terminal.
    pub fn fail(&self, reason: impl Into<String>) {
        let _ = self.sender.send(JobMessage::Fail(reason.into()));
    }

    /// Requests cancellation. The signal propagates to all work derived from
    /// this job; the owning task transitions a non-terminal job to aborted
    /// once any already reported progress has been applied. A no-op on jobs
    /// that already reached a terminal status.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// A stream of state snapshots, starting from the current one. Yields
    /// whenever the state changes (rapid intermediate states may be
    /// conflated) and ends once the job is terminal.
    pub fn updates(&self) -> impl Stream<Item = JobState> {
        let mut state = self.state.clone();
        stream! {
            let current = state.borrow().clone();
            let mut terminal = current.status.is_terminal();
            yield current;
            while !terminal && state.changed().await.is_ok() {
                let current = state.borrow().clone();
                terminal = current.status.is_terminal();
                yield current;
            }
        }
    }

    /// Waits until the job reaches a terminal status and returns the final
    /// snapshot.
    pub async fn wait_terminal(&self) -> JobState {
        let mut state = self.state.clone();
        loop {
            let current = state.borrow().clone();
            if current.status.is_terminal() {
                return current;
            }
            if state.changed().await.is_err() {
                return state.borrow().clone();
            }
        }
    }
}

async fn run_job_task(
    mut job: Job,
    mut receiver: mpsc::UnboundedReceiver<JobMessage>,
    state: watch::Sender<JobState>,
    cancellation: CancellationToken,
) {
    loop {
        // Biased towards the inbox so progress reported before a cancellation
        // is applied before the job transitions to aborted.
        tokio::select! {
            biased;
            message = receiver.recv() => match message {
                Some(message) => {
                    match message {
                        JobMessage::Progress(update) => job.apply_update(update),
                        JobMessage::Failure(error) => job.record_error(error),
                        JobMessage::Complete => job.complete(),
                        JobMessage::Fail(reason) => job.fail(reason),
                    }
                    let _ = state.send(job.snapshot());
                    if job.status.is_terminal() {
                        break;
                    }
                }
                None => break,
            },
            _ = cancellation.cancelled() => {
                job.abort();
                let _ = state.send(job.snapshot());
                break;
            }
        }
    }
    tracing::debug!(job_id = %job.id, status = ?job.status, "job state task exiting");
}
