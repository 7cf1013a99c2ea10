//! Live presence check against the object store.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::contract::ObjectStore;
use crate::error::StoreError;
use crate::retry::Backoff;

/// Result of probing a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Presence {
    Present,
    Absent,
    /// The store answered with something other than "found" or "not found".
    Indeterminate(StoreError),
}

/// What the orchestrator does with an [`Presence::Indeterminate`] answer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndeterminatePolicy {
    /// Proceed as if the key were absent. Without overwrite, the forbid-overwrite
    /// header still makes the store reject a clobbering put.
    #[default]
    TreatAsAbsent,
    /// Ask again with the upload attempt budget, then fail the file.
    Recheck,
    /// Fail the file immediately.
    Fail,
}

/// Check `key` once.
pub async fn check<S>(store: &S, key: &str) -> Presence
where
    S: ObjectStore + ?Sized,
{
    match store.get(key).await {
        Ok(resp) if resp.status == 200 => Presence::Present,
        Ok(resp) => Presence::Indeterminate(
            StoreError::new("UnexpectedStatus", format!("existence check returned status {}", resp.status))
                .with_status(resp.status),
        ),
        Err(e) if e.is_not_found() => Presence::Absent,
        Err(e) => Presence::Indeterminate(e),
    }
}

/// Check `key` until the answer is determinate or `max_attempts` checks were made.
pub async fn check_with_recheck<S>(
    store: &S,
    key: &str,
    max_attempts: u32,
    backoff: &dyn Backoff,
) -> Presence
where
    S: ObjectStore + ?Sized,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match check(store, key).await {
            Presence::Indeterminate(e) if attempt < max_attempts => {
                let delay = backoff.delay(attempt);
                warn!(key, attempt, error = %e, "Existence check indeterminate, checking again");
                tokio::time::sleep(delay).await;
            }
            presence => {
                debug!(key, attempt, ?presence, "Existence check settled");
                return presence;
            }
        }
    }
}
