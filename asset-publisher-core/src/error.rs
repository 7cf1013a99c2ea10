//! Error types shared by the store contract, the retrying uploader and the ledger.

use std::path::PathBuf;

use thiserror::Error;

/// Native error code the store uses for a missing object.
pub const NO_SUCH_KEY: &str = "NoSuchKey";

/// Error reported by an [`ObjectStore`](crate::contract::ObjectStore) call.
///
/// Carries the store's own identifiers so they can be surfaced verbatim in
/// per-file error lines.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{name}-{code}: {message}")]
pub struct StoreError {
    pub code: String,
    pub message: String,
    pub name: String,
    /// HTTP status (or equivalent) when the store produced one.
    pub status: Option<u16>,
}

impl StoreError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        let code = code.into();
        Self {
            name: format!("{code}Error"),
            code,
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// The "object does not exist" signal.
    pub fn not_found(key: &str) -> Self {
        Self::new(NO_SUCH_KEY, format!("The specified key does not exist: {key}")).with_status(404)
    }

    pub fn is_not_found(&self) -> bool {
        self.code == NO_SUCH_KEY || self.status == Some(404)
    }
}

/// Final error of an upload whose attempt budget ran out.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{name}-{code}: {message} (after {attempts} attempt(s))")]
pub struct UploadError {
    pub code: String,
    pub message: String,
    pub name: String,
    pub attempts: u32,
}

impl UploadError {
    pub fn exhausted(last: StoreError, attempts: u32) -> Self {
        Self {
            code: last.code,
            message: last.message,
            name: last.name,
            attempts,
        }
    }
}

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("ledger I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize ledger: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to replace ledger file: {0}")]
    Persist(#[from] tempfile::PersistError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_is_recognised_by_code_or_status() {
        assert!(StoreError::not_found("a.js").is_not_found());
        assert!(StoreError::new("Whatever", "gone").with_status(404).is_not_found());
        assert!(!StoreError::new("AccessDenied", "nope").with_status(403).is_not_found());
    }

    #[test]
    fn upload_error_keeps_native_identifiers() {
        let last = StoreError::new("FileAlreadyExists", "object exists").with_status(409);
        let err = UploadError::exhausted(last, 3);
        assert_eq!(err.code, "FileAlreadyExists");
        assert_eq!(err.name, "FileAlreadyExistsError");
        assert_eq!(err.attempts, 3);
        assert!(err.to_string().contains("after 3 attempt(s)"));
    }
}
