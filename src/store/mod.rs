//! Abstract artifact store.
//!
//! The engine treats packaged reference content as an abstract store with
//! push/pull/list-TOC/selective-extract operations; the packaging protocol
//! behind it is not the engine's business. `DirStore` is the directory
//! backed implementation used for local work and tests.
//!
//! All implementations share the safety rules enforced here: entry paths
//! are relative and never traverse out of the extraction root, single files
//! are size-capped, and extracted permissions are sanitized.

pub mod local;

use std::collections::BTreeMap;
use std::path::{Component, Path};
use std::time::Duration;
use thiserror::Error;

pub use local::DirStore;

/// Largest single file a store will package or extract.
pub const MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Attempts made for transient network failures before giving up.
pub const RETRY_ATTEMPTS: u32 = 3;

const RETRY_BASE_DELAY: Duration = Duration::from_millis(200);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("network error: {0}")]
    Network(String),

    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("store returned an error: {0}")]
    Remote(String),

    #[error("unsafe entry path: {0}")]
    UnsafePath(String),

    #[error("{0}")]
    TooLarge(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Client operations over a store of packaged artifact directories.
///
/// References use the `name:tag` form; a missing tag means `latest`.
pub trait ArtifactStore {
    /// Package `dir` under `reference` with the given annotations.
    fn push(
        &self,
        dir: &Path,
        reference: &str,
        annotations: &BTreeMap<String, String>,
    ) -> Result<(), StoreError>;

    /// Extract everything under `reference` into `dst`. Returns the
    /// extracted paths.
    fn pull(&self, reference: &str, dst: &Path) -> Result<Vec<String>, StoreError>;

    /// The table of contents of `reference`, sorted.
    fn list_files(&self, reference: &str) -> Result<Vec<String>, StoreError>;

    /// Extract only the files matching any of the glob patterns
    /// (OR semantics). Returns the extracted paths.
    fn pull_selective(
        &self,
        reference: &str,
        patterns: &[String],
        dst: &Path,
    ) -> Result<Vec<String>, StoreError>;

    /// All `name:tag` references the store knows.
    fn resolve_tags(&self) -> Result<Vec<String>, StoreError>;
}

/// Reject absolute paths and `..` traversal in packaged entries.
pub fn check_entry_path(path: &Path) -> Result<(), StoreError> {
    if path.as_os_str().is_empty() {
        return Err(StoreError::UnsafePath("empty path".to_string()));
    }
    if path.is_absolute() {
        return Err(StoreError::UnsafePath(format!(
            "absolute path {}",
            path.display()
        )));
    }
    for component in path.components() {
        if matches!(component, Component::ParentDir) {
            return Err(StoreError::UnsafePath(format!(
                "path {} traverses outside the extraction root",
                path.display()
            )));
        }
    }
    Ok(())
}

/// Retry a store operation on transient network failures: 3 attempts with
/// exponential backoff. Other errors surface immediately.
pub fn with_retry<T, F>(operation: &str, mut f: F) -> Result<T, StoreError>
where
    F: FnMut() -> Result<T, StoreError>,
{
    let mut delay = RETRY_BASE_DELAY;
    let mut last = StoreError::Network("no attempts made".to_string());
    for attempt in 1..=RETRY_ATTEMPTS {
        match f() {
            Ok(value) => return Ok(value),
            Err(StoreError::Network(msg)) => {
                tracing::warn!(operation, attempt, error = %msg, "transient store failure");
                last = StoreError::Network(msg);
                if attempt < RETRY_ATTEMPTS {
                    std::thread::sleep(delay);
                    delay *= 2;
                }
            }
            Err(other) => return Err(other),
        }
    }
    Err(last)
}

/// Split a `name:tag` reference; the tag defaults to `latest`.
pub fn split_reference(reference: &str) -> Result<(&str, &str), StoreError> {
    let (name, tag) = match reference.split_once(':') {
        Some((name, tag)) => (name, tag),
        None => (reference, "latest"),
    };
    if name.is_empty() || tag.is_empty() {
        return Err(StoreError::Remote(format!("malformed reference {reference:?}")));
    }
    Ok((name, tag))
}
