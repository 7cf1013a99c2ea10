//! # asset-publisher CLI Interface
//!
//! Command parsing, the production gate and the wiring of the concrete store
//! client, path mapping and version webhook into the core [`Publisher`].
//!
//! All decision logic (what to skip, what to upload, retries, ledger) lives in
//! `asset-publisher-core`; this module is glue.
//!
//! ## How To Use
//! - From a build pipeline: `asset-publisher publish --config publish.yaml` with
//!   `PUBLISH_ENV=production`, or `--force` to publish regardless.
//! - Programmatically: call [`run`] with a constructed [`Cli`].
use crate::discover::discover;
use crate::load_config::load_config;
use crate::oss::OssClient;
use crate::version_hook::WebhookVersionHook;
use anyhow::{Context, Result};
use asset_publisher_core::publish::{PublishReport, Publisher, UploadOutcome};
use clap::{Parser, Subcommand};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Environment variables consulted by the production gate, in order.
pub const ENVIRONMENT_VARS: [&str; 2] = ["PUBLISH_ENV", "NODE_ENV"];

/// CLI for asset-publisher: push bundler output to an object-storage bucket.
#[derive(Parser)]
#[clap(
    name = "asset-publisher",
    version,
    about = "Publish build output to an object-storage bucket, skipping what is already there"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Upload the files selected by the config to the bucket
    Publish {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Build output root; overrides `output_root` from the config
        #[clap(long)]
        output_root: Option<PathBuf>,
        /// Dry run: report what would be uploaded
        #[clap(long)]
        test: bool,
        /// Upload everything, ignoring the ledger and the remote state
        #[clap(long)]
        refresh: bool,
        /// Publish even outside a production build
        #[clap(long)]
        force: bool,
    },
}

/// True when the first set variable of [`ENVIRONMENT_VARS`] says `production`.
pub fn is_production() -> bool {
    ENVIRONMENT_VARS
        .iter()
        .find_map(|var| std::env::var(var).ok())
        .is_some_and(|v| v == "production")
}

/// Async CLI entrypoint shared by main() and integration tests.
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Publish {
            config,
            output_root,
            test,
            refresh,
            force,
        } => {
            if !force && !is_production() {
                tracing::info!(command = "publish", "Not a production build, nothing published");
                println!("Skipped: not a production build (set PUBLISH_ENV=production or pass --force)");
                return Ok(());
            }

            let mut config = load_config(config)?;
            config.publish.test |= test;
            config.publish.refresh |= refresh;
            let output_root = output_root.or_else(|| config.output_root.clone());

            let files = discover(&config.from, Path::new("."))?;
            if files.is_empty() {
                tracing::info!(command = "publish", patterns = ?config.from, "No files matched");
                println!("No files to publish");
                return Ok(());
            }

            let timeout = config.publish.timeout();
            let store = OssClient::new(&config.store, timeout)?;
            let mut publisher = Publisher::new(store, config.publish.clone());
            if let Some(mapping) = config.path_mapping.clone() {
                publisher = publisher.with_mapper(mapping);
            }
            if let Some(url) = &config.version_webhook {
                let hook = WebhookVersionHook::new(url.clone(), timeout)
                    .context("Failed to build version webhook client")?;
                publisher = publisher.with_version_hook(hook);
            }

            tracing::info!(command = "publish", files = files.len(), "Starting publish");
            let report = publisher.run(&files, output_root.as_deref()).await;
            print!("{}", render_report(&report));
            Ok(())
        }
    }
}

/// One line per file followed by a summary line.
pub fn render_report(report: &PublishReport) -> String {
    let mut out = String::new();
    for file in &report.files {
        let status = match &file.outcome {
            UploadOutcome::Uploaded { url } => format!("uploaded {url}"),
            UploadOutcome::SkippedRemoteExists => "skipped (exists)".to_string(),
            UploadOutcome::SkippedLedgerHit => "skipped (ledger)".to_string(),
            UploadOutcome::DryRun => "would upload".to_string(),
            UploadOutcome::Failed {
                name,
                code,
                message,
                ..
            } => format!("failed {name}-{code}: {message}"),
        };
        let _ = writeln!(out, "{} -> {}: {}", file.local_path, file.remote_key, status);
    }
    let s = &report.stats;
    let _ = writeln!(
        out,
        "uploaded={} skipped_remote={} skipped_ledger={} dry_run={} failed={} cleanup_failures={}",
        s.uploaded, s.skipped_remote, s.skipped_ledger, s.dry_run, s.failed, s.cleanup_failures
    );
    out
}
