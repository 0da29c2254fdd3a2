//! The workflow executor: runs one checkpointed batch loop per job.
//!
//! A run pages through the target list, fans each page out to a bounded set
//! of capture and diff workers, records per item failures without aborting
//! anything, advances and persists the checkpoint once the page has fully
//! joined, and then waits out a jittered pacing interval before fetching the
//! next page. `start` and `recover` both return as soon as the loop has been
//! spawned; progress is observed by polling `get` or the job context's
//! update stream.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{oneshot, Semaphore};
use tracing::{instrument, Instrument};

use crate::backend::{BackendError, CheckpointStore};
use crate::capture::{Capture, CaptureError, CaptureOptions};
use crate::config::ExecutorConfig;
use crate::diff::{DiffAnalyzer, DiffError};
use crate::job::context::JobContext;
use crate::job::{Checkpoint, JobError, JobId, JobState, JobStatus, JobUpdate};
use crate::pacing::PacingInterval;
use crate::registry::{AlreadyRunning, JobRegistry};
use crate::target::{Target, TargetLister, TargetPage};
use crate::workflow::{WorkflowId, WorkflowType};

const DEFAULT_PAGE_SIZE: usize = 50;
const DEFAULT_ITEM_TIMEOUT: Duration = Duration::from_secs(90);

/// How many consecutive target listing failures a run tolerates.
///
/// The loop is resilient to transient listing errors and retries on the next
/// tick by default; a bounded policy turns an exhausted budget into the only
/// run level failure path. The counter resets after every successful page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ListRetryPolicy {
    #[default]
    Unlimited,
    Limited(u32),
}

impl ListRetryPolicy {
    fn exhausted(&self, consecutive_failures: u32) -> bool {
        match self {
            Self::Unlimited => false,
            Self::Limited(budget) => consecutive_failures > *budget,
        }
    }
}

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error(transparent)]
    AlreadyRunning(#[from] AlreadyRunning),
    #[error("no job found for workflow {0}")]
    NotFound(WorkflowId),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

#[derive(Debug, Error)]
enum ItemError {
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Diff(#[from] DiffError),
}

enum ItemOutcome {
    Completed,
    Failed,
    Cancelled,
}

#[derive(Clone)]
pub struct WorkflowExecutor {
    inner: Arc<Inner>,
    registry: Arc<JobRegistry>,
}

#[derive(Clone)]
struct Inner {
    lister: Arc<dyn TargetLister>,
    capture: Arc<dyn Capture>,
    diff: Arc<dyn DiffAnalyzer>,
    checkpoints: Arc<dyn CheckpointStore>,
    capture_options: CaptureOptions,
    page_size: usize,
    item_timeout: Duration,
    list_retry_policy: ListRetryPolicy,
}

impl WorkflowExecutor {
    pub fn new(
        lister: Arc<dyn TargetLister>,
        capture: Arc<dyn Capture>,
        diff: Arc<dyn DiffAnalyzer>,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                lister,
                capture,
                diff,
                checkpoints,
                capture_options: CaptureOptions::default(),
                page_size: DEFAULT_PAGE_SIZE,
                item_timeout: DEFAULT_ITEM_TIMEOUT,
                list_retry_policy: ListRetryPolicy::default(),
            }),
            registry: Arc::new(JobRegistry::new()),
        }
    }

    /// Replaces the default registry, e.g. to share one between executors or
    /// to tune its retention.
    pub fn with_registry(mut self, registry: Arc<JobRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_capture_options(self, capture_options: CaptureOptions) -> Self {
        self.map_inner(|inner| Inner {
            capture_options,
            ..inner
        })
    }

    pub fn with_page_size(self, page_size: usize) -> Self {
        self.map_inner(|inner| Inner { page_size, ..inner })
    }

    pub fn with_item_timeout(self, item_timeout: Duration) -> Self {
        self.map_inner(|inner| Inner {
            item_timeout,
            ..inner
        })
    }

    pub fn with_list_retry_policy(self, list_retry_policy: ListRetryPolicy) -> Self {
        self.map_inner(|inner| Inner {
            list_retry_policy,
            ..inner
        })
    }

    fn map_inner(self, f: impl FnOnce(Inner) -> Inner) -> Self {
        Self {
            inner: Arc::new(f((*self.inner).clone())),
            registry: self.registry,
        }
    }

    /// Starts a fresh run for the workflow, beginning at the start of the
    /// target list. Returns once the run is registered and its loop spawned.
    pub async fn start(&self, workflow_id: WorkflowId) -> Result<JobId, ExecutorError> {
        self.launch(JobContext::spawn(workflow_id))
    }

    /// Resumes a run from the workflow's persisted checkpoint, processing
    /// only pages after it. Behaves like [`WorkflowExecutor::start`] when no
    /// checkpoint is stored.
    pub async fn recover(&self, workflow_id: WorkflowId) -> Result<JobId, ExecutorError> {
        let checkpoint = self
            .inner
            .checkpoints
            .load(&workflow_id)
            .await?
            .unwrap_or_default();
        self.launch(JobContext::spawn_with_checkpoint(workflow_id, checkpoint))
    }

    /// Starts fresh or resumes, depending on whether a prior run left a
    /// persisted checkpoint behind.
    pub async fn start_or_recover(&self, workflow_id: WorkflowId) -> Result<JobId, ExecutorError> {
        match self.inner.checkpoints.load(&workflow_id).await? {
            Some(_) => self.recover(workflow_id).await,
            None => self.start(workflow_id).await,
        }
    }

    fn launch(&self, context: JobContext) -> Result<JobId, ExecutorError> {
        if let Err(already_running) = self.registry.insert(context.clone()) {
            // Reap the freshly spawned state task before reporting the clash.
            context.cancel();
            return Err(already_running.into());
        }
        let id = context.id();
        let config = context.workflow_id().workflow_type.executor_config();
        tracing::info!(
            job_id = %id,
            workflow_id = %context.workflow_id(),
            checkpoint = ?context.checkpoint().batch_cursor,
            "launching workflow run"
        );
        tokio::spawn(Arc::clone(&self.inner).run(context, config));
        Ok(id)
    }

    /// Signals cancellation to a running job. The loop observes the signal
    /// at its next suspension point and the job transitions to aborted with
    /// its checkpoint left at the last fully processed page. A no-op for
    /// jobs that already reached a terminal status.
    pub fn stop(&self, workflow_id: &WorkflowId) -> Result<(), ExecutorError> {
        let context = self
            .registry
            .get(workflow_id)
            .ok_or_else(|| ExecutorError::NotFound(workflow_id.clone()))?;
        context.cancel();
        Ok(())
    }

    /// Stops any live run for the workflow and resumes it from the persisted
    /// checkpoint, asynchronously. Failures are reported on the returned
    /// channel rather than to the caller.
    pub fn restart(
        &self,
        workflow_id: WorkflowId,
    ) -> oneshot::Receiver<Result<JobId, ExecutorError>> {
        let (sender, receiver) = oneshot::channel();
        let executor = self.clone();
        tokio::spawn(async move {
            let result = executor.restart_inner(workflow_id).await;
            if sender.send(result).is_err() {
                tracing::debug!("restart result dropped by caller");
            }
        });
        receiver
    }

    async fn restart_inner(&self, workflow_id: WorkflowId) -> Result<JobId, ExecutorError> {
        if let Some(context) = self.registry.get(&workflow_id) {
            if !context.status().is_terminal() {
                context.cancel();
                context.wait_terminal().await;
            }
        }
        self.start_or_recover(workflow_id).await
    }

    /// The current state of the workflow's job.
    pub fn get(&self, workflow_id: &WorkflowId) -> Result<JobState, ExecutorError> {
        self.registry
            .get(workflow_id)
            .map(|context| context.state())
            .ok_or_else(|| ExecutorError::NotFound(workflow_id.clone()))
    }

    /// States of all registered jobs matching the filters.
    pub fn list(
        &self,
        status: Option<JobStatus>,
        workflow_type: Option<WorkflowType>,
    ) -> Vec<JobState> {
        self.registry.list(status, workflow_type)
    }

    /// Cancels every live run and waits for all of them to reach a terminal
    /// status.
    pub async fn shutdown(&self) {
        let active = self.registry.active();
        tracing::debug!(jobs = active.len(), "shutting down workflow executor");
        for context in &active {
            context.cancel();
        }
        futures::future::join_all(active.iter().map(JobContext::wait_terminal)).await;
    }
}

impl Inner {
    #[instrument(skip_all, fields(job_id = %context.id(), workflow_id = %context.workflow_id()))]
    async fn run(self: Arc<Self>, context: JobContext, config: ExecutorConfig) {
        let workflow_id = context.workflow_id().clone();
        let pacing = PacingInterval::from(&config);
        let semaphore = Arc::new(Semaphore::new(config.parallelism));
        let mut checkpoint = context.checkpoint();
        let mut listing_failures: u32 = 0;

        // Surface the run as live before the first page completes.
        context.progress(JobUpdate::running(checkpoint.clone()));

        loop {
            if context.is_cancelled() {
                tracing::info!("workflow run cancelled");
                return;
            }

            let page = match self
                .lister
                .list_targets(self.page_size, checkpoint.batch_cursor.as_deref())
                .await
            {
                Ok(page) => {
                    listing_failures = 0;
                    page
                }
                Err(err) => {
                    listing_failures += 1;
                    tracing::warn!(
                        ?err,
                        listing_failures,
                        "failed to list targets: {err}"
                    );
                    context.record_failure(JobError::listing(&err));
                    if self.list_retry_policy.exhausted(listing_failures) {
                        context.fail(format!(
                            "target listing failed {listing_failures} consecutive times: {err}"
                        ));
                        return;
                    }
                    if self.pace(&context, &pacing).await {
                        return;
                    }
                    continue;
                }
            };

            let has_more = page.has_more;
            let page_cursor = page.cursor.clone();
            let completed = self.process_page(&context, &semaphore, page).await;

            if context.is_cancelled() {
                // The page did not fully join, so the checkpoint stays at the
                // last fully processed page for a clean resume.
                tracing::info!("workflow run cancelled mid page");
                return;
            }

            checkpoint = Checkpoint {
                batch_cursor: page_cursor,
            };
            if let Err(err) = self.checkpoints.persist(&workflow_id, &checkpoint).await {
                tracing::warn!(?err, "failed to persist checkpoint: {err}");
            }
            context.progress(JobUpdate::new(completed, 0, checkpoint.clone()));

            if !has_more {
                if let Err(err) = self.checkpoints.clear(&workflow_id).await {
                    tracing::warn!(?err, "failed to clear checkpoint on completion: {err}");
                }
                context.complete();
                tracing::info!("workflow run complete");
                return;
            }

            if self.pace(&context, &pacing).await {
                return;
            }
        }
    }

    /// Waits out one pacing interval. Returns `true` if the run was
    /// cancelled while waiting.
    // TODO: consider sharing a rate limiter across jobs hitting the same
    // capture quota; pacing only de-synchronises runs, it does not cap them.
    async fn pace(&self, context: &JobContext, pacing: &PacingInterval) -> bool {
        let delay = pacing.sample();
        tracing::debug!(?delay, "pacing before next page");
        let cancellation = context.cancellation();
        tokio::select! {
            _ = cancellation.cancelled() => {
                tracing::info!("workflow run cancelled while pacing");
                true
            }
            _ = tokio::time::sleep(delay) => false,
        }
    }

    /// Fans the page out to bounded workers and waits for all of them.
    /// Returns the number of successfully processed items; failures have
    /// already been recorded against the job by the workers.
    async fn process_page(
        self: &Arc<Self>,
        context: &JobContext,
        semaphore: &Arc<Semaphore>,
        page: TargetPage,
    ) -> u64 {
        let workers = page.targets.into_iter().map(|target| {
            let inner = Arc::clone(self);
            let semaphore = Arc::clone(semaphore);
            let context = context.clone();
            async move { inner.process_item(&context, &semaphore, target).await }
        });

        futures::future::join_all(workers)
            .await
            .into_iter()
            .filter(|outcome| matches!(outcome, ItemOutcome::Completed))
            .count() as u64
    }

    async fn process_item(
        &self,
        context: &JobContext,
        semaphore: &Arc<Semaphore>,
        target: Target,
    ) -> ItemOutcome {
        let Ok(_permit) = semaphore.acquire().await else {
            return ItemOutcome::Cancelled;
        };
        let item_token = context.cancellation().child_token();
        if item_token.is_cancelled() {
            return ItemOutcome::Cancelled;
        }

        let work = self
            .process_target(&target)
            .instrument(tracing::debug_span!("process_target", target_id = %target.id));
        let result = tokio::select! {
            _ = item_token.cancelled() => return ItemOutcome::Cancelled,
            result = tokio::time::timeout(self.item_timeout, work) => result,
        };

        match result {
            Ok(Ok(())) => ItemOutcome::Completed,
            Ok(Err(err)) => {
                tracing::warn!(?err, target_id = %target.id, "target failed: {err}");
                context.record_failure(JobError::item(target.id, err.to_string()));
                ItemOutcome::Failed
            }
            Err(_elapsed) => {
                tracing::warn!(target_id = %target.id, "target processing timed out");
                context.record_failure(JobError::item(
                    target.id,
                    format!("processing timed out after {:?}", self.item_timeout),
                ));
                ItemOutcome::Failed
            }
        }
    }

    /// Captures the target's current state and compares it with the
    /// previously stored content. A target without previous content only
    /// establishes a baseline.
    async fn process_target(&self, target: &Target) -> Result<(), ItemError> {
        let snapshot = self.capture.capture(target, &self.capture_options).await?;
        match &target.previous_content {
            Some(previous) => {
                let changes = self
                    .diff
                    .diff(previous, &snapshot.content, &target.profile)
                    .await?;
                if changes.has_changes() {
                    tracing::debug!(
                        target_id = %target.id,
                        changes = changes.len(),
                        "content changes detected"
                    );
                }
            }
            None => {
                tracing::debug!(target_id = %target.id, "no previous content, baseline captured");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert_matches::assert_matches;

    use super::*;
    use crate::backend::memory::InMemoryCheckpointStore;
    use crate::testing::{page_cursor, targets, NoopDiff, SequenceLister, StaticCapture};
    use crate::workflow::WorkflowType;

    struct Fixture {
        lister: Arc<SequenceLister>,
        capture: Arc<StaticCapture>,
        store: Arc<InMemoryCheckpointStore>,
        executor: WorkflowExecutor,
    }

    fn fixture(lister: SequenceLister, capture: StaticCapture) -> Fixture {
        let lister = Arc::new(lister);
        let capture = Arc::new(capture);
        let store = Arc::new(InMemoryCheckpointStore::new());
        let executor = WorkflowExecutor::new(
            Arc::clone(&lister) as Arc<dyn TargetLister>,
            Arc::clone(&capture) as Arc<dyn Capture>,
            Arc::new(NoopDiff),
            Arc::clone(&store) as Arc<dyn CheckpointStore>,
        );
        Fixture {
            lister,
            capture,
            store,
            executor,
        }
    }

    fn workflow_id() -> WorkflowId {
        WorkflowId::new(WorkflowType::Screenshot, 2026, 32, 0)
    }

    async fn await_terminal(executor: &WorkflowExecutor, workflow_id: &WorkflowId) -> JobState {
        loop {
            if let Ok(state) = executor.get(workflow_id) {
                if state.status.is_terminal() {
                    return state;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    async fn await_checkpoint(
        executor: &WorkflowExecutor,
        workflow_id: &WorkflowId,
        cursor: &str,
    ) -> JobState {
        loop {
            if let Ok(state) = executor.get(workflow_id) {
                if state.checkpoint.batch_cursor.as_deref() == Some(cursor) {
                    return state;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn a_run_with_one_failing_item_still_completes() {
        // Three pages of ten targets, with the fifth item of the second page
        // failing capture.
        let fixture = fixture(
            SequenceLister::new(vec![targets(0, 10), targets(1, 10), targets(2, 10)]),
            StaticCapture::new().failing_for(["t-1-4".into()]),
        );
        let workflow_id = workflow_id();

        fixture.executor.start(workflow_id.clone()).await.unwrap();
        let state = await_terminal(&fixture.executor, &workflow_id).await;

        assert_eq!(state.status, JobStatus::Completed);
        assert_eq!(state.completed, 29);
        assert_eq!(state.failed, 1);
        assert_eq!(state.checkpoint, Checkpoint::at(page_cursor(2)));
        assert_eq!(state.errors.len(), 1);
        assert_eq!(state.errors[0].target, Some("t-1-4".into()));

        // A cleanly finished workflow leaves no checkpoint behind.
        assert_eq!(fixture.store.load(&workflow_id).await.unwrap(), None);
        assert_eq!(fixture.capture.captures(), 30);
    }

    #[tokio::test(start_paused = true)]
    async fn stopping_during_pacing_keeps_the_last_full_pages_checkpoint() {
        let fixture = fixture(
            SequenceLister::new(vec![targets(0, 10), targets(1, 10), targets(2, 10)]),
            StaticCapture::new(),
        );
        let workflow_id = workflow_id();

        fixture.executor.start(workflow_id.clone()).await.unwrap();
        await_checkpoint(&fixture.executor, &workflow_id, &page_cursor(0)).await;
        fixture.executor.stop(&workflow_id).unwrap();

        let state = await_terminal(&fixture.executor, &workflow_id).await;
        assert_eq!(state.status, JobStatus::Aborted);
        assert_eq!(state.completed, 10);
        assert_eq!(state.failed, 0);
        assert_eq!(state.checkpoint, Checkpoint::at(page_cursor(0)));

        // Nothing from the later pages was touched, and the checkpoint is
        // still stored for a future recovery.
        assert_eq!(fixture.capture.captures(), 10);
        assert_eq!(
            fixture.store.load(&workflow_id).await.unwrap(),
            Some(Checkpoint::at(page_cursor(0)))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn recover_processes_only_pages_after_the_checkpoint() {
        let fixture = fixture(
            SequenceLister::new(vec![targets(0, 10), targets(1, 10), targets(2, 10)]),
            StaticCapture::new(),
        );
        let workflow_id = workflow_id();
        fixture
            .store
            .persist(&workflow_id, &Checkpoint::at(page_cursor(0)))
            .await
            .unwrap();

        fixture.executor.recover(workflow_id.clone()).await.unwrap();
        let state = await_terminal(&fixture.executor, &workflow_id).await;

        assert_eq!(state.status, JobStatus::Completed);
        assert_eq!(state.completed, 20);
        assert_eq!(state.checkpoint, Checkpoint::at(page_cursor(2)));
        // The first page was already reflected in the checkpoint and is
        // never reprocessed.
        assert_eq!(fixture.capture.captures(), 20);
        assert_eq!(fixture.store.load(&workflow_id).await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_items_never_exceed_the_configured_parallelism() {
        let fixture = fixture(
            SequenceLister::new(vec![targets(0, 25)]),
            StaticCapture::new().holding(Duration::from_secs(5)),
        );
        let workflow_id = workflow_id();

        fixture.executor.start(workflow_id.clone()).await.unwrap();
        let state = await_terminal(&fixture.executor, &workflow_id).await;

        assert_eq!(state.status, JobStatus::Completed);
        assert_eq!(state.completed, 25);
        // Screenshot workflows are tuned to ten concurrent items.
        assert_eq!(fixture.capture.high_water_mark(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_listing_failures_are_retried_without_failing_the_run() {
        let fixture = fixture(
            SequenceLister::new(vec![targets(0, 2)]).failing_first(3),
            StaticCapture::new(),
        );
        let workflow_id = workflow_id();

        fixture.executor.start(workflow_id.clone()).await.unwrap();
        let state = await_terminal(&fixture.executor, &workflow_id).await;

        assert_eq!(state.status, JobStatus::Completed);
        assert_eq!(state.completed, 2);
        // Listing failures are recorded but do not count as item failures.
        assert_eq!(state.failed, 0);
        assert_eq!(state.errors.len(), 3);
        assert!(state.errors.iter().all(|error| error.target.is_none()));
        assert_eq!(fixture.lister.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn an_exhausted_listing_retry_budget_fails_the_run() {
        let fixture = fixture(
            SequenceLister::new(vec![targets(0, 2)]).failing_first(5),
            StaticCapture::new(),
        );
        let executor = fixture
            .executor
            .clone()
            .with_list_retry_policy(ListRetryPolicy::Limited(2));
        let workflow_id = workflow_id();

        executor.start(workflow_id.clone()).await.unwrap();
        let state = await_terminal(&executor, &workflow_id).await;

        assert_eq!(state.status, JobStatus::Failed);
        assert_eq!(state.completed, 0);
        assert_eq!(state.checkpoint, Checkpoint::default());
        assert_eq!(fixture.capture.captures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent_once_terminal() {
        let fixture = fixture(
            SequenceLister::new(vec![targets(0, 3)]),
            StaticCapture::new(),
        );
        let workflow_id = workflow_id();

        fixture.executor.start(workflow_id.clone()).await.unwrap();
        let completed = await_terminal(&fixture.executor, &workflow_id).await;
        assert_eq!(completed.status, JobStatus::Completed);

        fixture.executor.stop(&workflow_id).unwrap();
        let state = fixture.executor.get(&workflow_id).unwrap();

        assert_eq!(state.status, JobStatus::Completed);
        assert_eq!(state.completed, completed.completed);
        assert_eq!(state.failed, completed.failed);
    }

    #[tokio::test(start_paused = true)]
    async fn stopping_an_unknown_workflow_is_not_found() {
        let fixture = fixture(SequenceLister::new(vec![]), StaticCapture::new());
        assert_matches!(
            fixture.executor.stop(&workflow_id()),
            Err(ExecutorError::NotFound(_))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn a_second_start_for_a_running_workflow_is_rejected() {
        let fixture = fixture(
            SequenceLister::new(vec![targets(0, 10), targets(1, 10)]),
            StaticCapture::new(),
        );
        let workflow_id = workflow_id();

        fixture.executor.start(workflow_id.clone()).await.unwrap();
        assert_matches!(
            fixture.executor.start(workflow_id.clone()).await,
            Err(ExecutorError::AlreadyRunning(_))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stopping_before_the_loop_runs_processes_nothing() {
        let fixture = fixture(
            SequenceLister::new(vec![targets(0, 10)]),
            StaticCapture::new(),
        );
        let workflow_id = workflow_id();

        fixture.executor.start(workflow_id.clone()).await.unwrap();
        fixture.executor.stop(&workflow_id).unwrap();

        let state = await_terminal(&fixture.executor, &workflow_id).await;
        assert_eq!(state.status, JobStatus::Aborted);
        assert_eq!(state.completed, 0);
        assert_eq!(fixture.capture.captures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_resumes_from_the_persisted_checkpoint() {
        let fixture = fixture(
            SequenceLister::new(vec![targets(0, 10), targets(1, 10), targets(2, 10)]),
            StaticCapture::new(),
        );
        let workflow_id = workflow_id();

        let first_job = fixture.executor.start(workflow_id.clone()).await.unwrap();
        await_checkpoint(&fixture.executor, &workflow_id, &page_cursor(0)).await;

        let second_job = fixture
            .executor
            .restart(workflow_id.clone())
            .await
            .expect("restart result should be reported")
            .expect("restart should succeed");
        assert_ne!(first_job, second_job);

        let state = await_terminal(&fixture.executor, &workflow_id).await;
        assert_eq!(state.id, second_job);
        assert_eq!(state.status, JobStatus::Completed);
        // The restarted run picks up after the first page.
        assert_eq!(state.completed, 20);
        assert_eq!(state.checkpoint, Checkpoint::at(page_cursor(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn an_empty_target_set_completes_immediately() {
        let fixture = fixture(SequenceLister::new(vec![]), StaticCapture::new());
        let workflow_id = workflow_id();

        fixture.executor.start(workflow_id.clone()).await.unwrap();
        let state = await_terminal(&fixture.executor, &workflow_id).await;

        assert_eq!(state.status, JobStatus::Completed);
        assert_eq!(state.completed, 0);
        assert_eq!(state.failed, 0);
        assert_eq!(state.checkpoint, Checkpoint::default());
    }

    #[tokio::test(start_paused = true)]
    async fn items_that_exceed_the_timeout_count_as_failures() {
        let fixture = fixture(
            SequenceLister::new(vec![targets(0, 2)]),
            StaticCapture::new().holding(Duration::from_secs(3600)),
        );
        let executor = fixture
            .executor
            .clone()
            .with_item_timeout(Duration::from_secs(30));
        let workflow_id = workflow_id();

        executor.start(workflow_id.clone()).await.unwrap();
        let state = await_terminal(&executor, &workflow_id).await;

        assert_eq!(state.status, JobStatus::Completed);
        assert_eq!(state.completed, 0);
        assert_eq!(state.failed, 2);
        assert!(state
            .errors
            .iter()
            .all(|error| error.message.contains("timed out")));
    }

    #[tokio::test(start_paused = true)]
    async fn list_projects_jobs_by_status_and_type() {
        let fixture = fixture(
            SequenceLister::new(vec![targets(0, 1)]),
            StaticCapture::new(),
        );
        let workflow_id = workflow_id();

        fixture.executor.start(workflow_id.clone()).await.unwrap();
        await_terminal(&fixture.executor, &workflow_id).await;

        let completed = fixture
            .executor
            .list(Some(JobStatus::Completed), Some(WorkflowType::Screenshot));
        assert_eq!(completed.len(), 1);
        assert!(fixture
            .executor
            .list(Some(JobStatus::Running), None)
            .is_empty());
        assert!(fixture
            .executor
            .list(None, Some(WorkflowType::Report))
            .is_empty());
    }
}
