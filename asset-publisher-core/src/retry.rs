//! Bounded-retry upload with a pluggable delay strategy.
//!
//! The default strategy waits a constant second between attempts, which is
//! what the bundler plugin always did. Exponential and jittered strategies are
//! available through [`BackoffConfig`].

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::path::Path;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::contract::{ObjectStore, PutOptions};
use crate::error::UploadError;
use crate::remote_path::normalize_url;

/// Header the store honours to reject writes over an existing object.
pub const FORBID_OVERWRITE_HEADER: &str = "x-oss-forbid-overwrite";
pub const CACHE_CONTROL_HEADER: &str = "Cache-Control";
/// One year; published assets are content-addressed by the bundler.
pub const IMMUTABLE_CACHE_CONTROL: &str = "max-age=31536000";

/// Delay to wait after the `attempt`-th failed attempt (1-based).
pub trait Backoff: Send + Sync + Debug {
    fn delay(&self, attempt: u32) -> Duration;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstantBackoff {
    pub delay: Duration,
}

impl Default for ConstantBackoff {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(1),
        }
    }
}

impl Backoff for ConstantBackoff {
    fn delay(&self, _attempt: u32) -> Duration {
        self.delay
    }
}

/// `base * factor^(attempt - 1)`, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    pub base: Duration,
    pub factor: u32,
    pub max: Duration,
}

impl Backoff for ExponentialBackoff {
    fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let multiplier = self.factor.max(1).saturating_pow(exponent);
        self.base.saturating_mul(multiplier).min(self.max)
    }
}

/// Shortens the inner delay by a random fraction of up to `ratio`.
#[derive(Debug)]
pub struct JitteredBackoff {
    pub inner: Box<dyn Backoff>,
    pub ratio: f64,
}

impl Backoff for JitteredBackoff {
    fn delay(&self, attempt: u32) -> Duration {
        let base = self.inner.delay(attempt);
        if self.ratio.is_nan() || self.ratio <= 0.0 {
            return base;
        }
        let ratio = self.ratio.min(1.0);
        let cut: f64 = rand::thread_rng().gen_range(0.0..=ratio);
        base.mul_f64(1.0 - cut)
    }
}

/// Serializable description of a [`Backoff`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackoffConfig {
    Constant {
        delay_ms: u64,
    },
    Exponential {
        base_ms: u64,
        factor: u32,
        max_ms: u64,
    },
    Jittered {
        base_ms: u64,
        factor: u32,
        max_ms: u64,
        ratio: f64,
    },
}

impl Default for BackoffConfig {
    fn default() -> Self {
        BackoffConfig::Constant { delay_ms: 1000 }
    }
}

impl BackoffConfig {
    pub fn build(&self) -> Box<dyn Backoff> {
        match *self {
            BackoffConfig::Constant { delay_ms } => Box::new(ConstantBackoff {
                delay: Duration::from_millis(delay_ms),
            }),
            BackoffConfig::Exponential {
                base_ms,
                factor,
                max_ms,
            } => Box::new(ExponentialBackoff {
                base: Duration::from_millis(base_ms),
                factor,
                max: Duration::from_millis(max_ms),
            }),
            BackoffConfig::Jittered {
                base_ms,
                factor,
                max_ms,
                ratio,
            } => Box::new(JitteredBackoff {
                inner: Box::new(ExponentialBackoff {
                    base: Duration::from_millis(base_ms),
                    factor,
                    max: Duration::from_millis(max_ms),
                }),
                ratio,
            }),
        }
    }
}

/// Total attempts for a configured retry count: one plus the (non-negative) retries.
pub fn max_attempts(retry_count: i64) -> u32 {
    let retries = u32::try_from(retry_count.max(0)).unwrap_or(u32::MAX - 1);
    retries.saturating_add(1)
}

/// Put options for a run. Without overwrite the object is marked immutable and
/// the store is told to reject a write over an existing key.
pub fn put_options(overwrite: bool, timeout: Duration) -> PutOptions {
    let mut headers = BTreeMap::new();
    if !overwrite {
        headers.insert(
            CACHE_CONTROL_HEADER.to_string(),
            IMMUTABLE_CACHE_CONTROL.to_string(),
        );
        headers.insert(FORBID_OVERWRITE_HEADER.to_string(), "true".to_string());
    }
    PutOptions { timeout, headers }
}

/// Upload `local_path` under `key`, retrying up to `max_attempts` attempts in total.
///
/// Returns the normalized object URL, or the last attempt's error.
pub async fn upload_with_retry<S>(
    store: &S,
    local_path: &Path,
    key: &str,
    options: &PutOptions,
    max_attempts: u32,
    backoff: &dyn Backoff,
) -> Result<String, UploadError>
where
    S: ObjectStore + ?Sized,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match store.put(key, local_path, options).await {
            Ok(resp) => {
                debug!(key, attempt, "Put succeeded");
                return Ok(normalize_url(&resp.url));
            }
            Err(e) if attempt < max_attempts => {
                let delay = backoff.delay(attempt);
                warn!(
                    key,
                    attempt,
                    max_attempts,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "Put failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(UploadError::exhausted(e, attempt)),
        }
    }
}
