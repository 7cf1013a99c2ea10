#![doc = "asset-publisher-core: upload decision-and-execution engine for asset-publisher."]

//! This crate holds everything that decides what gets published and how:
//! remote key derivation, the upload ledger, the existence check, the retrying
//! uploader and the orchestrating [`publish::Publisher`].
//! No network client lives here; the store is reached through [`contract::ObjectStore`].
//!
//! # Usage
//! Build a [`publish::Publisher`] from an `ObjectStore` implementation and a
//! [`config::PublishConfig`], then call `run` with the files to publish.

pub mod config;
pub mod contract;
pub mod error;
pub mod existence;
pub mod ledger;
pub mod publish;
pub mod remote_path;
pub mod retry;
