pub mod cli;
pub mod discover;
pub mod load_config;
pub mod mapping;
pub mod oss;
pub mod version_hook;

pub use cli::{run, Cli, Commands};
