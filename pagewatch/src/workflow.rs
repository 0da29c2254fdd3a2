use std::fmt::Display;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The kinds of recurring work the engine knows how to run.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowType {
    /// Capture screenshots and content of tracked pages and diff them
    /// against the previously stored artifacts.
    Screenshot,
    /// Generate periodic change reports for workspaces.
    Report,
}

impl WorkflowType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Screenshot => "screenshot",
            Self::Report => "report",
        }
    }
}

impl Display for WorkflowType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowType {
    type Err = InvalidWorkflowType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "screenshot" => Ok(Self::Screenshot),
            "report" => Ok(Self::Report),
            other => Err(InvalidWorkflowType(other.to_owned())),
        }
    }
}

#[derive(Debug, Error, Eq, PartialEq)]
#[error("unrecognised workflow type: {0:?}")]
pub struct InvalidWorkflowType(pub String);

/// Identifies one recurrence instance of a workflow.
///
/// The year and ISO week pin the identifier to a period, and the bucket
/// partitions the target set so large deployments can run several instances
/// of the same workflow side by side. The identifier doubles as the key for
/// persisted checkpoints, so `Display` must remain stable.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct WorkflowId {
    pub workflow_type: WorkflowType,
    pub year: i32,
    pub week: u32,
    pub bucket: u32,
}

impl WorkflowId {
    pub fn new(workflow_type: WorkflowType, year: i32, week: u32, bucket: u32) -> Self {
        Self {
            workflow_type,
            year,
            week,
            bucket,
        }
    }

    /// The stable storage key for this identifier.
    pub fn storage_key(&self) -> String {
        self.to_string()
    }
}

impl Display for WorkflowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}-{:04}-w{:02}-{}",
            self.workflow_type, self.year, self.week, self.bucket
        )
    }
}

/// What a schedule runs when it fires.
///
/// A descriptor is resolved to a concrete [`WorkflowId`] at fire time using
/// the fire instant's ISO week, so each period gets its own identifier and
/// therefore its own checkpoint.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDescriptor {
    pub workflow_type: WorkflowType,
    pub bucket: u32,
}

impl WorkflowDescriptor {
    pub fn new(workflow_type: WorkflowType, bucket: u32) -> Self {
        Self {
            workflow_type,
            bucket,
        }
    }

    pub fn workflow_id_at(&self, when: DateTime<Utc>) -> WorkflowId {
        let week = when.iso_week();
        WorkflowId::new(self.workflow_type, week.year(), week.week(), self.bucket)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn workflow_type_round_trips_through_str() {
        assert_eq!("screenshot".parse(), Ok(WorkflowType::Screenshot));
        assert_eq!("report".parse(), Ok(WorkflowType::Report));
        assert_eq!(WorkflowType::Screenshot.as_str(), "screenshot");
    }

    #[test]
    fn unknown_workflow_type_is_rejected() {
        let result: Result<WorkflowType, _> = "invoice".parse();
        assert_matches!(result, Err(InvalidWorkflowType(name)) if name == "invoice");
    }

    #[test]
    fn storage_key_is_stable() {
        let id = WorkflowId::new(WorkflowType::Screenshot, 2026, 8, 3);
        assert_eq!(id.storage_key(), "screenshot-2026-w08-3");
    }

    #[test]
    fn descriptor_resolves_to_the_fire_instants_iso_week() {
        let descriptor = WorkflowDescriptor::new(WorkflowType::Report, 1);
        let fired_at = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();

        let id = descriptor.workflow_id_at(fired_at);

        // 2026-01-01 falls in ISO week 1 of 2026.
        assert_eq!(id.year, 2026);
        assert_eq!(id.week, 1);
        assert_eq!(id.bucket, 1);
        assert_eq!(id.workflow_type, WorkflowType::Report);
    }

    #[test]
    fn descriptors_resolve_consistently_within_a_week() {
        let descriptor = WorkflowDescriptor::new(WorkflowType::Screenshot, 0);
        let monday = Utc.with_ymd_and_hms(2026, 8, 3, 0, 0, 0).unwrap();
        let sunday = Utc.with_ymd_and_hms(2026, 8, 9, 23, 59, 59).unwrap();

        assert_eq!(
            descriptor.workflow_id_at(monday),
            descriptor.workflow_id_at(sunday)
        );
    }
}
