//! The purpose of this module is to alleviate the need to import many of the
//! `pagewatch` types.
//!
//! ```
//! # #![allow(unused_imports)]
//! use pagewatch::prelude::*;
//! ```
pub use crate::backend::{BackendError, CheckpointStore};
pub use crate::capture::{Capture, CaptureError, CaptureOptions, Snapshot};
pub use crate::config::{executor_config, ExecutorConfig};
pub use crate::diff::{ChangeSet, DiffAnalyzer, DiffError, DiffProfile};
pub use crate::executor::{ExecutorError, ListRetryPolicy, WorkflowExecutor};
pub use crate::job::context::JobContext;
pub use crate::job::{Checkpoint, JobError, JobId, JobState, JobStatus, JobUpdate};
pub use crate::pacing::{BackoffStrategy, Jitter, PacingInterval, Strategy};
pub use crate::registry::JobRegistry;
pub use crate::scheduler::trigger::{CronTrigger, Trigger, TriggerHandle};
pub use crate::scheduler::{
    ScheduleError, ScheduleErrorEvent, ScheduleId, ScheduleState, ScheduledFunctionState, Scheduler,
};
pub use crate::target::{ListError, Target, TargetId, TargetLister, TargetPage};
pub use crate::workflow::{WorkflowDescriptor, WorkflowId, WorkflowType};
pub use crate::{Pagewatch, PagewatchError};
