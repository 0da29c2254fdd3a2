use std::fmt::Display;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::target::TargetId;
use crate::workflow::WorkflowId;

pub mod context;

/// The number of errors retained on a job. Older errors are dropped so a long
/// run with many failing items cannot grow without bound.
const MAX_RECORDED_ERRORS: usize = 25;

static NEXT_JOB_ID: AtomicI64 = AtomicI64::new(1);

/// Identifier of a single execution instance of a workflow.
#[derive(Debug, Eq, PartialEq, Clone, Copy, Hash, Serialize, Deserialize)]
pub struct JobId(i64);

impl JobId {
    pub(crate) fn next() -> Self {
        Self(NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl From<i64> for JobId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<JobId> for i64 {
    fn from(value: JobId) -> Self {
        value.0
    }
}

impl Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JobId({})", self.0)
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
    Aborted,
    /// Projection for state that cannot be determined, e.g. a persisted
    /// checkpoint whose owning process died without recording an outcome.
    /// Never set by the engine during a healthy run.
    Unknown,
}

impl JobStatus {
    /// Whether this status is final. Terminal statuses are sticky: once a job
    /// reaches one, no further mutation is applied.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Aborted)
    }
}

/// Resumable progress through the target list.
///
/// The cursor is opaque to the engine; it is whatever the target lister last
/// returned. An absent cursor means "start from the beginning".
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub batch_cursor: Option<String>,
}

impl Checkpoint {
    pub fn at(cursor: impl Into<String>) -> Self {
        Self {
            batch_cursor: Some(cursor.into()),
        }
    }
}

/// A progress message applied after a page of targets has been fully
/// processed. Applying updates is the steady state path by which the
/// counters and checkpoint advance.
#[derive(Debug, Clone)]
pub struct JobUpdate {
    pub time: DateTime<Utc>,
    pub completed_delta: u64,
    pub failed_delta: u64,
    pub checkpoint: Checkpoint,
}

impl JobUpdate {
    /// An update carrying no progress, used to surface a run as live before
    /// its first page completes.
    pub fn running(checkpoint: Checkpoint) -> Self {
        Self::new(0, 0, checkpoint)
    }

    pub fn new(completed_delta: u64, failed_delta: u64, checkpoint: Checkpoint) -> Self {
        Self {
            time: Utc::now(),
            completed_delta,
            failed_delta,
            checkpoint,
        }
    }
}

/// A non-fatal failure recorded against a job.
///
/// Item failures carry the target they relate to and increment the job's
/// failed counter. Failures with no target (e.g. the target lister being
/// temporarily unavailable) are recorded for observability only and leave
/// the item counters untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobError {
    pub target: Option<TargetId>,
    pub message: String,
    pub time: DateTime<Utc>,
}

impl JobError {
    pub fn item(target: TargetId, message: impl Into<String>) -> Self {
        Self {
            target: Some(target),
            message: message.into(),
            time: Utc::now(),
        }
    }

    pub fn listing(message: impl Display) -> Self {
        Self {
            target: None,
            message: message.to_string(),
            time: Utc::now(),
        }
    }
}

/// The mutable job record. Owned exclusively by the job context task; every
/// other component observes it through [`JobState`] snapshots.
#[derive(Debug)]
pub(crate) struct Job {
    pub(crate) id: JobId,
    pub(crate) workflow_id: WorkflowId,
    pub(crate) status: JobStatus,
    pub(crate) checkpoint: Checkpoint,
    pub(crate) completed: u64,
    pub(crate) failed: u64,
    pub(crate) errors: Vec<JobError>,
    pub(crate) started_at: DateTime<Utc>,
    pub(crate) finished_at: Option<DateTime<Utc>>,
}

impl Job {
    pub(crate) fn new(workflow_id: WorkflowId, checkpoint: Checkpoint) -> Self {
        Self {
            id: JobId::next(),
            workflow_id,
            status: JobStatus::Running,
            checkpoint,
            completed: 0,
            failed: 0,
            errors: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub(crate) fn apply_update(&mut self, update: JobUpdate) {
        if self.status.is_terminal() {
            return;
        }
        self.status = JobStatus::Running;
        self.completed += update.completed_delta;
        self.failed += update.failed_delta;
        self.checkpoint = update.checkpoint;
    }

    pub(crate) fn record_error(&mut self, error: JobError) {
        if self.status.is_terminal() {
            return;
        }
        if error.target.is_some() {
            self.failed += 1;
        }
        if self.errors.len() == MAX_RECORDED_ERRORS {
            self.errors.remove(0);
        }
        self.errors.push(error);
    }

    pub(crate) fn complete(&mut self) {
        self.finish(JobStatus::Completed);
    }

    pub(crate) fn abort(&mut self) {
        self.finish(JobStatus::Aborted);
    }

    pub(crate) fn fail(&mut self, reason: String) {
        if self.status.is_terminal() {
            return;
        }
        self.errors.push(JobError::listing(&reason));
        self.finish(JobStatus::Failed);
    }

    fn finish(&mut self, status: JobStatus) {
        if self.status.is_terminal() {
            return;
        }
        self.status = status;
        self.finished_at = Some(Utc::now());
    }

    pub(crate) fn snapshot(&self) -> JobState {
        JobState {
            id: self.id,
            workflow_id: self.workflow_id.clone(),
            status: self.status,
            checkpoint: self.checkpoint.clone(),
            completed: self.completed,
            failed: self.failed,
            errors: self.errors.clone(),
            started_at: self.started_at,
            finished_at: self.finished_at,
        }
    }
}

/// An immutable snapshot of a job, as returned by `get` and `list`.
///
/// Snapshots are published atomically by the job context task, so the status,
/// checkpoint, and counters within one snapshot are always consistent with
/// each other.
#[derive(Debug, Clone, Serialize)]
pub struct JobState {
    pub id: JobId,
    pub workflow_id: WorkflowId,
    pub status: JobStatus,
    pub checkpoint: Checkpoint,
    pub completed: u64,
    pub failed: u64,
    pub errors: Vec<JobError>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}
