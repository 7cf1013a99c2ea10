//! Upload ledger: the persisted set of remote keys known to exist remotely.
//!
//! The ledger is a cache in front of the existence check, never the source of
//! truth. It is loaded once per run, mutated in memory and written back once at
//! the end; the write replaces the whole file through a temporary sibling and a
//! rename, so an interrupted flush leaves the previous state in place.

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::LedgerError;

/// File name of the persisted ledger inside the configured directory.
pub const LEDGER_FILE_NAME: &str = ".oss-memory.json";

#[derive(Debug)]
pub struct UploadLedger {
    enabled: bool,
    path: PathBuf,
    keys: HashSet<String>,
}

impl UploadLedger {
    /// A ledger that never reports a hit and never persists.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            path: PathBuf::new(),
            keys: HashSet::new(),
        }
    }

    /// Load the ledger stored in `dir`.
    ///
    /// Missing or unreadable state yields an empty ledger; this never fails.
    pub fn load(enabled: bool, dir: &Path) -> Self {
        if !enabled {
            return Self::disabled();
        }
        let path = dir.join(LEDGER_FILE_NAME);

        let keys = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<Vec<String>>(&content) {
                Ok(list) => {
                    info!(path = %path.display(), entries = list.len(), "Loaded upload ledger");
                    list.into_iter().collect()
                }
                Err(e) => {
                    warn!(error = %e, path = %path.display(), "Upload ledger is malformed, starting empty");
                    HashSet::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No upload ledger found, starting empty");
                HashSet::new()
            }
            Err(e) => {
                warn!(error = %e, path = %path.display(), "Failed to read upload ledger, starting empty");
                HashSet::new()
            }
        };

        Self {
            enabled: true,
            path,
            keys,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn has(&self, key: &str) -> bool {
        self.enabled && self.keys.contains(key)
    }

    pub fn add(&mut self, key: impl Into<String>) {
        if self.enabled {
            self.keys.insert(key.into());
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Overwrite the persisted ledger with the in-memory set.
    pub fn flush(&self) -> Result<(), LedgerError> {
        if !self.enabled {
            return Ok(());
        }
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|source| LedgerError::Io {
            path: dir.clone(),
            source,
        })?;

        let mut sorted: Vec<&String> = self.keys.iter().collect();
        sorted.sort();

        let mut tmp = NamedTempFile::new_in(&dir).map_err(|source| LedgerError::Io {
            path: dir.clone(),
            source,
        })?;
        serde_json::to_writer(&mut tmp, &sorted)?;
        tmp.flush().map_err(|source| LedgerError::Io {
            path: tmp.path().to_path_buf(),
            source,
        })?;
        tmp.persist(&self.path)?;

        debug!(path = %self.path.display(), entries = sorted.len(), "Flushed upload ledger");
        Ok(())
    }
}
