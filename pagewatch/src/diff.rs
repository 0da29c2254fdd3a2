//! The content diff collaborator.
//!
//! What counts as a change is entirely the analyzer's concern. The engine
//! hands it the previously stored content and the freshly captured one and
//! records whether the comparison succeeded.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How sensitive the analysis should be for a given target.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sensitivity {
    Low,
    #[default]
    Medium,
    High,
}

/// Per target analysis settings, configured by the tracking workspace.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiffProfile {
    pub sensitivity: Sensitivity,
    /// CSS selectors whose content should be ignored when comparing.
    pub ignore_selectors: Vec<String>,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ChangeKind {
    Text,
    Layout,
    Visual,
}

#[derive(Debug, Clone)]
pub struct Change {
    pub kind: ChangeKind,
    pub summary: String,
}

/// The analyzer's verdict on a pair of contents.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub changes: Vec<Change>,
}

impl ChangeSet {
    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

#[async_trait]
pub trait DiffAnalyzer: Send + Sync {
    async fn diff(
        &self,
        previous: &str,
        current: &str,
        profile: &DiffProfile,
    ) -> Result<ChangeSet, DiffError>;
}

#[derive(Debug, Error)]
pub enum DiffError {
    #[error("diff analysis failed: {0}")]
    AnalysisFailed(String),
}
