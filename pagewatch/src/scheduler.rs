//! The scheduler: owns the recurring triggers that start workflow runs.
//!
//! Each scheduled function wraps one live trigger registration. On fire the
//! scheduler resolves the function's descriptor to a workflow identifier for
//! that instant and asks the executor to start it, recovering from a
//! persisted checkpoint when one exists. A function whose fire fails to even
//! start is moved to the delayed state with a backed off `delay_until`
//! instead of silently re-failing on every tick, and the failure is emitted
//! to error event subscribers.
//!
//! Firing decisions are single threaded (serialised through a gate), while
//! the runs they launch proceed concurrently with each other and with later
//! ticks.

use std::fmt::Display;
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, TimeDelta, Utc};
use cron::Schedule;
use fxhash::FxHashMap;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};

use crate::executor::WorkflowExecutor;
use crate::pacing::{BackoffStrategy, Exponential, Jitter};
use crate::workflow::{WorkflowDescriptor, WorkflowId, WorkflowType};

pub mod trigger;

use trigger::{CronTrigger, FireCallback, Trigger, TriggerHandle};

/// Backoff applied to `delay_until` on consecutive failed fires.
const DEFAULT_DELAY_BACKOFF: BackoffStrategy<Exponential> =
    BackoffStrategy::exponential(TimeDelta::seconds(30))
        .with_max(TimeDelta::hours(1))
        .with_jitter(Jitter::Relative(0.1));

/// Identifier of a scheduled function, stable across reschedules.
#[derive(Debug, Eq, PartialEq, Clone, Copy, Hash, Serialize)]
pub struct ScheduleId(i64);

impl Display for ScheduleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ScheduleId({})", self.0)
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleState {
    /// Eligible to fire at its next occurrence.
    Active,
    /// Fires are skipped until `delay_until` has passed.
    Delayed,
    /// Will not fire again; kept for observability until removed.
    Stale,
}

#[derive(Debug)]
struct ScheduledFunction {
    id: ScheduleId,
    spec: String,
    schedule: Schedule,
    descriptor: WorkflowDescriptor,
    state: ScheduleState,
    entry: Option<TriggerHandle>,
    last_run: Option<DateTime<Utc>>,
    next_run: Option<DateTime<Utc>>,
    delay_until: Option<DateTime<Utc>>,
    consecutive_failures: u32,
}

impl ScheduledFunction {
    fn snapshot(&self) -> ScheduledFunctionState {
        ScheduledFunctionState {
            id: self.id,
            spec: self.spec.clone(),
            descriptor: self.descriptor.clone(),
            state: self.state,
            last_run: self.last_run,
            next_run: self.next_run,
            delay_until: self.delay_until,
        }
    }
}

/// Observable snapshot of a scheduled function.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduledFunctionState {
    pub id: ScheduleId,
    pub spec: String,
    pub descriptor: WorkflowDescriptor,
    pub state: ScheduleState,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    pub delay_until: Option<DateTime<Utc>>,
}

/// Emitted to subscribers when a fire fails to start its workflow.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleErrorEvent {
    pub schedule_id: ScheduleId,
    pub workflow_id: WorkflowId,
    pub message: String,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("invalid cron spec {spec:?}: {source}")]
    InvalidSpec {
        spec: String,
        #[source]
        source: cron::error::Error,
    },
    #[error("no schedule found for {0}")]
    NotFound(ScheduleId),
    #[error("schedule {0} is stale")]
    Stale(ScheduleId),
}

pub struct Scheduler<T = CronTrigger> {
    executor: WorkflowExecutor,
    trigger: T,
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    functions: RwLock<FxHashMap<ScheduleId, ScheduledFunction>>,
    subscribers: RwLock<Vec<mpsc::UnboundedSender<ScheduleErrorEvent>>>,
    /// Serialises firing decisions.
    fire_gate: Mutex<()>,
    next_id: AtomicI64,
    delay_backoff: BackoffStrategy<Exponential>,
}

impl Scheduler<CronTrigger> {
    pub fn new(executor: WorkflowExecutor) -> Self {
        Self::with_trigger(executor, CronTrigger)
    }
}

impl<T> Scheduler<T>
where
    T: Trigger,
{
    pub fn with_trigger(executor: WorkflowExecutor, trigger: T) -> Self {
        Self {
            executor,
            trigger,
            inner: Arc::new(SchedulerInner {
                functions: RwLock::new(FxHashMap::default()),
                subscribers: RwLock::new(Vec::new()),
                fire_gate: Mutex::new(()),
                next_id: AtomicI64::new(1),
                delay_backoff: DEFAULT_DELAY_BACKOFF,
            }),
        }
    }

    /// Replaces the backoff used to compute `delay_until` after failed
    /// fires. Must be called before anything is scheduled.
    pub fn with_delay_backoff(mut self, delay_backoff: BackoffStrategy<Exponential>) -> Self {
        match Arc::get_mut(&mut self.inner) {
            Some(inner) => inner.delay_backoff = delay_backoff,
            None => tracing::warn!("delay backoff not replaced, scheduler is already in use"),
        }
        self
    }

    /// Registers a recurring trigger for the descriptor. The schedule starts
    /// active and fires at each occurrence of the cron spec.
    pub fn schedule(
        &self,
        spec: &str,
        descriptor: WorkflowDescriptor,
    ) -> Result<ScheduleId, ScheduleError> {
        let schedule = parse_spec(spec)?;
        let id = ScheduleId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let entry = self.trigger.register(&schedule, self.fire_callback(id));
        let function = ScheduledFunction {
            id,
            spec: spec.to_owned(),
            next_run: schedule.upcoming(Utc).next(),
            schedule,
            descriptor,
            state: ScheduleState::Active,
            entry: Some(entry),
            last_run: None,
            delay_until: None,
            consecutive_failures: 0,
        };
        self.inner.functions_mut().insert(id, function);
        tracing::info!(%id, spec, "registered schedule");
        Ok(id)
    }

    /// Atomically replaces the trigger registration for an existing
    /// schedule, preserving its run history. The function returns to the
    /// active state; any failure delay is cleared.
    pub fn reschedule(&self, id: ScheduleId, spec: &str) -> Result<(), ScheduleError> {
        let schedule = parse_spec(spec)?;
        let entry = self.trigger.register(&schedule, self.fire_callback(id));

        let mut functions = self.inner.functions_mut();
        let Some(function) = functions.get_mut(&id) else {
            entry.cancel();
            return Err(ScheduleError::NotFound(id));
        };
        if function.state == ScheduleState::Stale {
            entry.cancel();
            return Err(ScheduleError::Stale(id));
        }
        if let Some(previous) = function.entry.take() {
            previous.cancel();
        }
        function.spec = spec.to_owned();
        function.next_run = schedule.upcoming(Utc).next();
        function.schedule = schedule;
        function.entry = Some(entry);
        function.state = ScheduleState::Active;
        function.delay_until = None;
        function.consecutive_failures = 0;
        tracing::info!(%id, spec, "rescheduled");
        Ok(())
    }

    /// Cancels the trigger registration and marks the function stale. The
    /// record is kept for observability until [`Scheduler::remove`].
    pub fn unschedule(&self, id: ScheduleId) -> Result<(), ScheduleError> {
        let mut functions = self.inner.functions_mut();
        let function = functions.get_mut(&id).ok_or(ScheduleError::NotFound(id))?;
        if let Some(entry) = function.entry.take() {
            entry.cancel();
        }
        function.state = ScheduleState::Stale;
        function.next_run = None;
        function.delay_until = None;
        tracing::info!(%id, "unscheduled");
        Ok(())
    }

    /// Drops a scheduled function entirely, cancelling any live
    /// registration.
    pub fn remove(&self, id: ScheduleId) -> Result<(), ScheduleError> {
        let function = self
            .inner
            .functions_mut()
            .remove(&id)
            .ok_or(ScheduleError::NotFound(id))?;
        if let Some(entry) = function.entry {
            entry.cancel();
        }
        Ok(())
    }

    pub fn get(&self, id: ScheduleId) -> Result<ScheduledFunctionState, ScheduleError> {
        self.inner
            .functions()
            .get(&id)
            .map(ScheduledFunction::snapshot)
            .ok_or(ScheduleError::NotFound(id))
    }

    pub fn list(
        &self,
        state: Option<ScheduleState>,
        workflow_type: Option<WorkflowType>,
    ) -> Vec<ScheduledFunctionState> {
        self.inner
            .functions()
            .values()
            .filter(|function| state.map(|s| function.state == s).unwrap_or(true))
            .filter(|function| {
                workflow_type
                    .map(|t| function.descriptor.workflow_type == t)
                    .unwrap_or(true)
            })
            .map(ScheduledFunction::snapshot)
            .collect()
    }

    /// Subscribes to fire failures. Closed receivers are dropped on the next
    /// emit.
    pub fn subscribe_errors(&self) -> mpsc::UnboundedReceiver<ScheduleErrorEvent> {
        let (sender, receiver) = mpsc::unbounded_channel();
        match self.inner.subscribers.write() {
            Ok(mut subscribers) => subscribers.push(sender),
            Err(mut poisoned) => poisoned.get_mut().push(sender),
        }
        receiver
    }

    /// Cancels every live registration and waits for the backing trigger
    /// tasks to exit. All functions are left stale.
    pub async fn shutdown(&self) {
        let entries: Vec<TriggerHandle> = {
            let mut functions = self.inner.functions_mut();
            functions
                .values_mut()
                .filter_map(|function| {
                    function.state = ScheduleState::Stale;
                    function.next_run = None;
                    function.delay_until = None;
                    function.entry.take()
                })
                .collect()
        };
        tracing::debug!(schedules = entries.len(), "shutting down scheduler");
        for entry in entries {
            entry.shutdown().await;
        }
    }

    fn fire_callback(&self, id: ScheduleId) -> FireCallback {
        let inner = Arc::clone(&self.inner);
        let executor = self.executor.clone();
        Arc::new(move |fired_at| {
            let inner = Arc::clone(&inner);
            let executor = executor.clone();
            tokio::spawn(async move {
                inner.handle_fire(executor, id, fired_at).await;
            });
        })
    }
}

impl SchedulerInner {
    fn functions(&self) -> std::sync::RwLockReadGuard<'_, FxHashMap<ScheduleId, ScheduledFunction>> {
        match self.functions.read() {
            Ok(functions) => functions,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn functions_mut(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, FxHashMap<ScheduleId, ScheduledFunction>> {
        match self.functions.write() {
            Ok(functions) => functions,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    async fn handle_fire(
        self: Arc<Self>,
        executor: WorkflowExecutor,
        id: ScheduleId,
        fired_at: DateTime<Utc>,
    ) {
        let _gate = self.fire_gate.lock().await;

        let descriptor = {
            let functions = self.functions();
            let Some(function) = functions.get(&id) else {
                return;
            };
            match function.state {
                ScheduleState::Stale => return,
                ScheduleState::Delayed
                    if function
                        .delay_until
                        .map(|until| Utc::now() < until)
                        .unwrap_or(false) =>
                {
                    tracing::debug!(%id, "skipping fire while delayed");
                    return;
                }
                _ => {}
            }
            function.descriptor.clone()
        };

        let workflow_id = descriptor.workflow_id_at(fired_at);
        match executor.start_or_recover(workflow_id.clone()).await {
            Ok(job_id) => {
                tracing::info!(%id, %workflow_id, %job_id, "schedule fired");
                let mut functions = self.functions_mut();
                if let Some(function) = functions.get_mut(&id) {
                    if function.state != ScheduleState::Stale {
                        function.last_run = Some(fired_at);
                        function.next_run = function.schedule.after(&fired_at).next();
                        function.state = ScheduleState::Active;
                        function.delay_until = None;
                        function.consecutive_failures = 0;
                    }
                }
            }
            Err(err) => {
                tracing::error!(?err, %id, %workflow_id, "scheduled workflow failed to start: {err}");
                {
                    let mut functions = self.functions_mut();
                    if let Some(function) = functions.get_mut(&id) {
                        if function.state != ScheduleState::Stale {
                            function.consecutive_failures += 1;
                            let delay = self.delay_backoff.backoff(function.consecutive_failures);
                            function.state = ScheduleState::Delayed;
                            function.delay_until = Some(Utc::now() + delay);
                        }
                    }
                }
                self.emit(ScheduleErrorEvent {
                    schedule_id: id,
                    workflow_id,
                    message: err.to_string(),
                    time: Utc::now(),
                });
            }
        }
    }

    fn emit(&self, event: ScheduleErrorEvent) {
        let mut subscribers = match self.subscribers.write() {
            Ok(subscribers) => subscribers,
            Err(poisoned) => poisoned.into_inner(),
        };
        subscribers.retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }
}

fn parse_spec(spec: &str) -> Result<Schedule, ScheduleError> {
    Schedule::from_str(spec).map_err(|source| ScheduleError::InvalidSpec {
        spec: spec.to_owned(),
        source,
    })
}
