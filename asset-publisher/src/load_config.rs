/// `load_config` module: loads the static YAML run configuration and injects the
/// store secrets from the environment.
///
/// This module is the only place where untrusted YAML is parsed and mapped into
/// the core's [`PublishConfig`] and the CLI-side [`StoreConfig`].
///
/// # Responsibilities
/// - Parse the YAML file into type-safe structs, accepting the plugin's camelCase option names
/// - Fill `access_key_id` / `access_key_secret` from `OSS_ACCESS_KEY_ID` / `OSS_ACCESS_KEY_SECRET`
///   when the file leaves them out
/// - Fail with a clear message when the file is unreadable, malformed or missing credentials
///
/// # Errors
/// All errors use `anyhow::Error` and are surfaced at the CLI boundary.
use anyhow::{bail, Result};
use asset_publisher_core::config::PublishConfig;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use crate::mapping::PathMapping;

pub const ACCESS_KEY_ID_ENV: &str = "OSS_ACCESS_KEY_ID";
pub const ACCESS_KEY_SECRET_ENV: &str = "OSS_ACCESS_KEY_SECRET";

#[derive(Debug, Clone, Deserialize)]
pub struct CliConfig {
    /// Glob patterns selecting the files to publish, relative to the working directory.
    #[serde(default)]
    pub from: Vec<String>,
    /// Build output root the remote keys are made relative to.
    #[serde(default, alias = "outputRoot")]
    pub output_root: Option<PathBuf>,
    pub store: StoreConfig,
    #[serde(default)]
    pub publish: PublishConfig,
    #[serde(default, alias = "pathMapping")]
    pub path_mapping: Option<PathMapping>,
    /// Endpoint receiving `{"version": ...}` after a real run.
    #[serde(default, alias = "versionWebhook")]
    pub version_webhook: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub region: String,
    pub bucket: String,
    #[serde(default, alias = "accessKeyId")]
    pub access_key_id: String,
    #[serde(default, alias = "accessKeySecret")]
    pub access_key_secret: String,
    /// Overrides the `{bucket}.{region}.aliyuncs.com` host, e.g. a CDN domain.
    #[serde(default)]
    pub endpoint: Option<String>,
}

/// Loads a YAML config file and injects the store secrets from the environment.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            bail!("Failed to read config file {:?}: {}", path_ref, e);
        }
    };

    let mut config: CliConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            bail!("Failed to parse config YAML: {e}");
        }
    };

    inject_secret(&mut config.store.access_key_id, ACCESS_KEY_ID_ENV)?;
    inject_secret(&mut config.store.access_key_secret, ACCESS_KEY_SECRET_ENV)?;

    config.publish.trace_loaded();
    Ok(config)
}

fn inject_secret(field: &mut String, var: &str) -> Result<()> {
    if !field.is_empty() {
        return Ok(());
    }
    match env::var(var) {
        Ok(value) if !value.is_empty() => {
            info!(env = var, "Injected store secret from environment");
            *field = value;
            Ok(())
        }
        _ => {
            error!(env = var, "Store secret missing from config and environment");
            bail!("Missing store credential: set it in the config file or in {var}")
        }
    }
}
