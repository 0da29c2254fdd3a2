//! The screenshot capture collaborator.
//!
//! Capturing is an external, rate limited network service; the engine only
//! consumes this interface and relies on bounded parallelism plus the inter
//! batch pacing interval to stay within the service's quota.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::target::Target;

/// Options applied to every capture in a run.
#[derive(Debug, Clone)]
pub struct CaptureOptions {
    pub full_page: bool,
    pub viewport_width: u32,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            full_page: true,
            viewport_width: 1280,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CaptureMetadata {
    pub fetched_at: DateTime<Utc>,
    pub status_code: Option<u16>,
    pub content_type: Option<String>,
}

/// The current image and content of a target.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub image: Vec<u8>,
    pub content: String,
    pub metadata: CaptureMetadata,
}

#[async_trait]
pub trait Capture: Send + Sync {
    async fn capture(
        &self,
        target: &Target,
        options: &CaptureOptions,
    ) -> Result<Snapshot, CaptureError>;
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture request failed for {url}: {reason}")]
    RequestFailed { url: String, reason: String },
    #[error("capture service rate limit exceeded")]
    RateLimited,
    #[error("capture timed out after {0:?}")]
    Timeout(Duration),
}
