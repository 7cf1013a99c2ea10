use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

use crate::existence::IndeterminatePolicy;
use crate::retry::BackoffConfig;

/// Options of a publishing run. Every field has the default of the bundler plugin,
/// so an empty document deserializes into a usable config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    /// Remote path prefix every key is placed under.
    pub dist: String,
    /// Fallback base path when the caller supplies no output root.
    #[serde(alias = "buildRoot")]
    pub build_root: PathBuf,
    /// Dry run: resolve and report, never write.
    pub test: bool,
    pub verbose: bool,
    #[serde(alias = "deleteOrigin")]
    pub delete_origin: bool,
    #[serde(alias = "deleteEmptyDir")]
    pub delete_empty_dir: bool,
    pub overwrite: bool,
    /// Per-attempt network timeout in milliseconds.
    #[serde(alias = "timeout")]
    pub timeout_ms: u64,
    pub version: Option<String>,
    /// Enables the upload ledger.
    #[serde(alias = "enableMemory")]
    pub enable_memory: bool,
    /// Directory holding the persisted ledger file.
    #[serde(alias = "memoryFilePath")]
    pub memory_file_path: PathBuf,
    /// Ignore ledger and existence results when deciding to skip.
    pub refresh: bool,
    #[serde(alias = "retryCount")]
    pub retry_count: i64,
    pub concurrency: usize,
    pub on_indeterminate: IndeterminatePolicy,
    pub backoff: BackoffConfig,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            dist: String::new(),
            build_root: PathBuf::from("."),
            test: false,
            verbose: true,
            delete_origin: false,
            delete_empty_dir: false,
            overwrite: false,
            timeout_ms: 60 * 1000,
            version: None,
            enable_memory: false,
            memory_file_path: PathBuf::from("."),
            refresh: false,
            retry_count: 3,
            concurrency: 1,
            on_indeterminate: IndeterminatePolicy::default(),
            backoff: BackoffConfig::default(),
        }
    }
}

impl PublishConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn trace_loaded(&self) {
        info!(
            dist = %self.dist,
            test = self.test,
            overwrite = self.overwrite,
            enable_memory = self.enable_memory,
            refresh = self.refresh,
            retry_count = self.retry_count,
            concurrency = self.concurrency,
            "Loaded PublishConfig"
        );
        debug!(?self, "PublishConfig loaded (full debug)");
    }
}
