//! The registry of job contexts, keyed by workflow identifier.
//!
//! The registry is an explicit component injected into the executor rather
//! than process global state. A context is inserted when a run starts or is
//! recovered and stays in the registry after reaching a terminal status so
//! callers can still observe the outcome through `get` and `list`. Terminal
//! entries are dropped by an opportunistic sweep once they have been
//! observed, or once the retention window lapses unobserved.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use chrono::{TimeDelta, Utc};
use fxhash::FxHashMap;
use thiserror::Error;

use crate::job::context::JobContext;
use crate::job::{JobState, JobStatus};
use crate::workflow::{WorkflowId, WorkflowType};

/// How long an unobserved terminal job remains visible.
const DEFAULT_RETENTION: TimeDelta = TimeDelta::minutes(15);

#[derive(Debug, Error)]
#[error("a job for workflow {workflow_id} is already running")]
pub struct AlreadyRunning {
    pub workflow_id: WorkflowId,
}

#[derive(Debug)]
struct RegisteredJob {
    context: JobContext,
    observed: AtomicBool,
}

impl RegisteredJob {
    fn new(context: JobContext) -> Self {
        Self {
            context,
            observed: AtomicBool::new(false),
        }
    }

    /// Marks a terminal entry as observed and returns its context.
    fn observe(&self) -> JobContext {
        if self.context.status().is_terminal() {
            self.observed.store(true, Ordering::Relaxed);
        }
        self.context.clone()
    }

    fn expired(&self, retention: TimeDelta) -> bool {
        let state = self.context.state();
        if !state.status.is_terminal() {
            return false;
        }
        if self.observed.load(Ordering::Relaxed) {
            return true;
        }
        state
            .finished_at
            .map(|finished| finished + retention < Utc::now())
            .unwrap_or(false)
    }
}

#[derive(Debug)]
pub struct JobRegistry {
    jobs: RwLock<FxHashMap<WorkflowId, RegisteredJob>>,
    retention: TimeDelta,
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }

    pub fn with_retention(retention: TimeDelta) -> Self {
        Self {
            jobs: RwLock::new(FxHashMap::default()),
            retention,
        }
    }

    /// Registers a context for its workflow identifier.
    ///
    /// Fails if a non-terminal job is already registered for the same
    /// identifier; a terminal leftover is replaced.
    pub fn insert(&self, context: JobContext) -> Result<(), AlreadyRunning> {
        let workflow_id = context.workflow_id().clone();
        let mut jobs = match self.jobs.write() {
            Ok(jobs) => jobs,
            Err(poisoned) => poisoned.into_inner(),
        };
        jobs.retain(|_, job| !job.expired(self.retention));

        if let Some(existing) = jobs.get(&workflow_id) {
            if !existing.context.status().is_terminal() {
                return Err(AlreadyRunning { workflow_id });
            }
        }
        jobs.insert(workflow_id, RegisteredJob::new(context));
        Ok(())
    }

    /// The context for a workflow, if one is registered. Observing a
    /// terminal job marks it eligible for the next sweep.
    pub fn get(&self, workflow_id: &WorkflowId) -> Option<JobContext> {
        let jobs = match self.jobs.read() {
            Ok(jobs) => jobs,
            Err(poisoned) => poisoned.into_inner(),
        };
        jobs.get(workflow_id).map(RegisteredJob::observe)
    }

    /// Snapshots of all registered jobs matching the filters.
    pub fn list(
        &self,
        status: Option<JobStatus>,
        workflow_type: Option<WorkflowType>,
    ) -> Vec<JobState> {
        let jobs = match self.jobs.read() {
            Ok(jobs) => jobs,
            Err(poisoned) => poisoned.into_inner(),
        };
        jobs.values()
            .filter(|job| {
                workflow_type
                    .map(|t| job.context.workflow_id().workflow_type == t)
                    .unwrap_or(true)
            })
            .filter(|job| status.map(|s| job.context.status() == s).unwrap_or(true))
            .map(|job| job.observe().state())
            .collect()
    }

    /// The contexts of all non-terminal jobs.
    pub fn active(&self) -> Vec<JobContext> {
        let jobs = match self.jobs.read() {
            Ok(jobs) => jobs,
            Err(poisoned) => poisoned.into_inner(),
        };
        jobs.values()
            .filter(|job| !job.context.status().is_terminal())
            .map(|job| job.context.clone())
            .collect()
    }
}
