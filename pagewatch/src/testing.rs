//! Helpers for testing workflow runs without real collaborators.
//!
//! The fakes here are scripted, deterministic stand-ins for the engine's
//! capability interfaces: a lister serving a fixed sequence of pages, a
//! capture service with scripted failures and a concurrency high water mark,
//! a diff analyzer that never finds changes, and a trigger fired by hand.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cron::Schedule;
use tokio_util::sync::CancellationToken;

use crate::capture::{Capture, CaptureError, CaptureMetadata, CaptureOptions, Snapshot};
use crate::diff::{ChangeSet, DiffAnalyzer, DiffError, DiffProfile};
use crate::scheduler::trigger::{FireCallback, Trigger, TriggerHandle};
use crate::target::{ListError, Target, TargetId, TargetLister, TargetPage};

/// The cursor a [`SequenceLister`] returns for the given page index.
pub fn page_cursor(page_index: usize) -> String {
    format!("page-{page_index}")
}

/// A page of fixture targets with stable, readable identifiers.
pub fn targets(page_index: usize, count: usize) -> Vec<Target> {
    (0..count)
        .map(|item| Target {
            id: format!("t-{page_index}-{item}").into(),
            url: format!("https://example.com/{page_index}/{item}"),
            workspace: Some("workspace-1".to_owned()),
            profile: DiffProfile::default(),
            previous_content: Some(format!("previous content {page_index}/{item}")),
        })
        .collect()
}

/// Serves a fixed sequence of pages, resumable from any cursor it has
/// returned. Listing failures can be queued up to be served before any page.
pub struct SequenceLister {
    pages: Vec<Vec<Target>>,
    failures: Mutex<VecDeque<ListError>>,
    calls: AtomicUsize,
}

impl SequenceLister {
    pub fn new(pages: Vec<Vec<Target>>) -> Self {
        Self {
            pages,
            failures: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Queues `count` unavailability errors to be served before the first
    /// page.
    pub fn failing_first(self, count: usize) -> Self {
        {
            let mut failures = self.failures.lock().expect("lock poisoned");
            for attempt in 0..count {
                failures.push_back(ListError::Unavailable(format!(
                    "scripted outage {attempt}"
                )));
            }
        }
        self
    }

    /// How many times `list_targets` has been called, failures included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TargetLister for SequenceLister {
    async fn list_targets(
        &self,
        _page_size: usize,
        cursor: Option<&str>,
    ) -> Result<TargetPage, ListError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(failure) = self.failures.lock().expect("lock poisoned").pop_front() {
            return Err(failure);
        }

        let index = match cursor {
            None => 0,
            Some(cursor) => cursor
                .strip_prefix("page-")
                .and_then(|index| index.parse::<usize>().ok())
                .map(|index| index + 1)
                .ok_or_else(|| ListError::InvalidCursor(cursor.to_owned()))?,
        };

        if index >= self.pages.len() {
            return Ok(TargetPage {
                targets: Vec::new(),
                cursor: cursor.map(ToOwned::to_owned),
                has_more: false,
            });
        }
        Ok(TargetPage {
            targets: self.pages[index].clone(),
            cursor: Some(page_cursor(index)),
            has_more: index + 1 < self.pages.len(),
        })
    }
}

/// A capture service that returns fixed content, optionally failing scripted
/// targets or holding each capture open to exercise concurrency limits.
#[derive(Default)]
pub struct StaticCapture {
    hold: Duration,
    failing: HashSet<TargetId>,
    in_flight: AtomicUsize,
    high_water: AtomicUsize,
    captures: AtomicUsize,
}

impl StaticCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Holds every capture open for the given duration before returning.
    pub fn holding(mut self, hold: Duration) -> Self {
        self.hold = hold;
        self
    }

    /// Fails captures for the given targets.
    pub fn failing_for(mut self, failing: impl IntoIterator<Item = TargetId>) -> Self {
        self.failing = failing.into_iter().collect();
        self
    }

    /// The most captures that were ever in flight at once.
    pub fn high_water_mark(&self) -> usize {
        self.high_water.load(Ordering::SeqCst)
    }

    /// Total capture attempts, failures included.
    pub fn captures(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Capture for StaticCapture {
    async fn capture(
        &self,
        target: &Target,
        _options: &CaptureOptions,
    ) -> Result<Snapshot, CaptureError> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.high_water.fetch_max(in_flight, Ordering::SeqCst);

        if !self.hold.is_zero() {
            tokio::time::sleep(self.hold).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.contains(&target.id) {
            return Err(CaptureError::RequestFailed {
                url: target.url.clone(),
                reason: "scripted capture failure".to_owned(),
            });
        }
        Ok(Snapshot {
            image: Vec::new(),
            content: format!("current content for {}", target.id),
            metadata: CaptureMetadata {
                fetched_at: Utc::now(),
                status_code: Some(200),
                content_type: Some("text/html".to_owned()),
            },
        })
    }
}

/// A diff analyzer that never finds changes and never fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDiff;

#[async_trait]
impl DiffAnalyzer for NoopDiff {
    async fn diff(
        &self,
        _previous: &str,
        _current: &str,
        _profile: &DiffProfile,
    ) -> Result<ChangeSet, DiffError> {
        Ok(ChangeSet::default())
    }
}

struct ManualRegistration {
    callback: FireCallback,
    cancellation: CancellationToken,
}

/// A trigger fired by hand, for deterministic scheduler tests.
#[derive(Clone, Default)]
pub struct ManualTrigger {
    registrations: Arc<Mutex<Vec<ManualRegistration>>>,
}

impl ManualTrigger {
    /// Invokes every live registration's callback with the given fire time.
    pub fn fire_all(&self, fired_at: DateTime<Utc>) {
        let registrations = self.registrations.lock().expect("lock poisoned");
        for registration in registrations
            .iter()
            .filter(|registration| !registration.cancellation.is_cancelled())
        {
            (registration.callback)(fired_at);
        }
    }

    /// The number of registrations that have not been cancelled.
    pub fn live_registrations(&self) -> usize {
        self.registrations
            .lock()
            .expect("lock poisoned")
            .iter()
            .filter(|registration| !registration.cancellation.is_cancelled())
            .count()
    }
}

impl Trigger for ManualTrigger {
    fn register(&self, _schedule: &Schedule, callback: FireCallback) -> TriggerHandle {
        let cancellation = CancellationToken::new();
        self.registrations
            .lock()
            .expect("lock poisoned")
            .push(ManualRegistration {
                callback,
                cancellation: cancellation.clone(),
            });
        TriggerHandle::new(cancellation, None)
    }
}
