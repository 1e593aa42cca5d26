//! Abstract work tracker.
//!
//! Projects may be seeded from an external issue and publish progress back
//! to it, but the engine never mirrors tracker state: work items are
//! referenced by id only. When no tracker is configured the features that
//! need one are disabled and core progression works without it.

pub mod github;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::SowConfig;

pub use github::GitHubTracker;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("network error: {0}")]
    Network(String),

    #[error("authentication rejected: {0}; check the tracker token")]
    Auth(String),

    #[error("tracker returned {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("work item {0} not found")]
    NotFound(String),

    #[error("no work tracker configured")]
    NotConfigured,
}

/// A work item referenced by the engine (issue, epic, milestone entry).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    pub state: String,
    #[serde(default)]
    pub url: String,
    /// Parent work item (epic), when the tracker models hierarchy.
    #[serde(default)]
    pub parent: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct WorkItemFilter {
    /// Tracker-side state filter, e.g. `open`.
    pub state: Option<String>,
    pub labels: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct WorkItemSpec {
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
}

#[async_trait]
pub trait WorkTracker: Send + Sync {
    async fn get_work_item(&self, id: &str) -> Result<WorkItem, TrackerError>;

    async fn list_work_items(&self, filter: &WorkItemFilter) -> Result<Vec<WorkItem>, TrackerError>;

    async fn create_work_item(&self, spec: &WorkItemSpec) -> Result<WorkItem, TrackerError>;

    /// Hierarchy queries are optional; trackers without epics return None.
    async fn get_epic(&self, _id: &str) -> Result<Option<WorkItem>, TrackerError> {
        Ok(None)
    }

    async fn get_milestone(&self, _id: &str) -> Result<Option<WorkItem>, TrackerError> {
        Ok(None)
    }
}

/// Build the configured tracker, or None when the config has no `[tracker]`
/// section (tracker-dependent features are disabled then).
pub fn from_config(config: &SowConfig) -> Option<Box<dyn WorkTracker>> {
    let settings = config.tracker.as_ref()?;
    match settings.provider.as_str() {
        "github" => Some(Box::new(GitHubTracker::new(
            &settings.repo,
            config.tracker_token(),
        ))),
        other => {
            tracing::warn!(provider = %other, "unknown tracker provider; tracker disabled");
            None
        }
    }
}
