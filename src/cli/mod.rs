//! CLI module for gatesync.
//!
//! This module provides the command-line interface for validating,
//! diffing and syncing declarative gateway configuration.

mod commands;
mod output;

pub use commands::{Cli, Commands, OutputFormat};
pub use output::OutputFormatter;
