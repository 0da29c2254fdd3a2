//! The recurring trigger abstraction.
//!
//! The scheduler never talks to the cron engine directly; it registers
//! callbacks through [`Trigger`] so any cron or timer implementation can
//! back it. [`CronTrigger`] is the production implementation over
//! [`cron::Schedule`].

use std::ops::Sub;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use cron::Schedule;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Invoked at each occurrence of a registered schedule with the occurrence's
/// nominal fire time.
pub type FireCallback = Arc<dyn Fn(DateTime<Utc>) + Send + Sync>;

pub trait Trigger: Send + Sync {
    /// Registers a callback to fire at each occurrence of the schedule. The
    /// registration stays live until the returned handle is cancelled.
    fn register(&self, schedule: &Schedule, callback: FireCallback) -> TriggerHandle;
}

/// Handle to one live trigger registration.
#[derive(Debug)]
pub struct TriggerHandle {
    cancellation: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl TriggerHandle {
    pub fn new(cancellation: CancellationToken, task: Option<JoinHandle<()>>) -> Self {
        Self { cancellation, task }
    }

    /// Cancels the registration. No further fires occur once the backing
    /// task observes the signal.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Cancels the registration and waits for the backing task to exit.
    pub async fn shutdown(mut self) {
        self.cancellation.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

/// Fires on a cron schedule by sleeping until each upcoming occurrence.
#[derive(Debug, Clone, Copy, Default)]
pub struct CronTrigger;

impl Trigger for CronTrigger {
    fn register(&self, schedule: &Schedule, callback: FireCallback) -> TriggerHandle {
        let schedule = schedule.clone();
        let cancellation = CancellationToken::new();
        let task = tokio::spawn({
            let cancellation = cancellation.clone();
            async move {
                loop {
                    let Some(next) = schedule.upcoming(Utc).next() else {
                        tracing::warn!("cron schedule has no future occurrences, trigger exiting");
                        break;
                    };
                    // Wake slightly early so the fire lands on the occurrence
                    // rather than just after it.
                    let delay = next
                        .sub(Utc::now())
                        .sub(TimeDelta::milliseconds(10))
                        .to_std()
                        .unwrap_or(Duration::ZERO);
                    tokio::select! {
                        _ = cancellation.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {
                            callback(next);
                            // Sleep through the occurrence so the same one is
                            // not fired twice.
                            let remaining = next - Utc::now();
                            if remaining > TimeDelta::zero() {
                                tokio::time::sleep(remaining.to_std().unwrap_or(Duration::ZERO))
                                    .await;
                            }
                        }
                    }
                }
                tracing::debug!("cron trigger task exiting");
            }
        });
        TriggerHandle::new(cancellation, Some(task))
    }
}
