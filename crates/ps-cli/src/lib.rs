//! pumpsync CLI library.
//!
//! This crate provides the CLI interface for pumpsync.

mod cli;
pub mod commands;
mod config;

pub use cli::{Cli, Commands, SyncArgs};
pub use config::Config;
