//! The tracked pages a workflow run operates on, and the lister interface
//! through which the engine pages through them.

use std::fmt::Display;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::diff::DiffProfile;

/// Opaque identifier of a tracked page, assigned by the target store.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct TargetId(String);

impl TargetId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TargetId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for TargetId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Display for TargetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One page to be captured and diffed in a run.
///
/// The lister supplies everything a worker needs, including the previously
/// stored content for the target; the first run for a new target carries no
/// previous content and only establishes a baseline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    pub id: TargetId,
    pub url: String,
    /// The workspace (tenant) tracking this page, for error attribution.
    pub workspace: Option<String>,
    pub profile: DiffProfile,
    pub previous_content: Option<String>,
}

/// A bounded slice of targets, fetched and processed together.
#[derive(Debug, Clone, Default)]
pub struct TargetPage {
    pub targets: Vec<Target>,
    /// Cursor identifying the last target of this page. Feeding it back into
    /// [`TargetLister::list_targets`] resumes immediately after this page.
    pub cursor: Option<String>,
    pub has_more: bool,
}

/// Streams the target set in pages rather than materialising it, since the
/// set can be large. Implementations must be resumable from any previously
/// returned cursor.
#[async_trait]
pub trait TargetLister: Send + Sync {
    async fn list_targets(
        &self,
        page_size: usize,
        cursor: Option<&str>,
    ) -> Result<TargetPage, ListError>;
}

#[derive(Debug, Error)]
pub enum ListError {
    #[error("target source unavailable: {0}")]
    Unavailable(String),
    #[error("cursor {0:?} is not resumable")]
    InvalidCursor(String),
}
