//! # contract: the seams between the publishing engine and the outside world
//!
//! The engine never talks to a network or to user code directly. It depends on
//! three traits defined here:
//!
//! - [`ObjectStore`]: the remote key-addressed blob service (`put` + `get` existence check).
//! - [`PathMapper`]: an optional custom strategy deriving the remote path of a local file.
//! - [`VersionHook`]: an optional callback invoked once after a real (non-test) run.
//!
//! ## Mocking & Testing
//! - [`ObjectStore`] and [`VersionHook`] are annotated for `mockall`, exported behind
//!   the `test-export-mocks` feature so integration tests and dependent crates can use them.
//! - [`PathMapper`] is implemented for plain closures; tests pass one directly.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::error::StoreError;

/// Per-request options for a `put`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutOptions {
    /// Network timeout of a single attempt.
    pub timeout: Duration,
    /// Extra headers sent with the object.
    pub headers: BTreeMap<String, String>,
}

/// Returned by a successful `put`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutResponse {
    pub url: String,
}

/// Returned by a successful `get`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadResponse {
    pub status: u16,
}

/// Remote object store the assets are published to.
///
/// A missing object must be reported from [`ObjectStore::get`] as a
/// [`StoreError`] for which [`StoreError::is_not_found`] holds.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload the file at `local_path` under `key`.
    async fn put(
        &self,
        key: &str,
        local_path: &Path,
        options: &PutOptions,
    ) -> Result<PutResponse, StoreError>;

    /// Ask whether `key` is present.
    async fn get(&self, key: &str) -> Result<HeadResponse, StoreError>;
}

/// Custom mapping from a local absolute path to the remote path suffix.
///
/// Returning `None` falls back to the base-path rule.
pub trait PathMapper: Send + Sync {
    fn map(&self, absolute_path: &Path) -> Option<String>;
}

impl<F> PathMapper for F
where
    F: Fn(&Path) -> Option<String> + Send + Sync,
{
    fn map(&self, absolute_path: &Path) -> Option<String> {
        self(absolute_path)
    }
}

/// Callback run once after all files of a non-test run reached a terminal state.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait VersionHook: Send + Sync {
    async fn set_version(&self, version: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}
