//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// gatesync - Declarative API gateway configuration sync.
#[derive(Parser, Debug)]
#[command(name = "gatesync")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Declarative configuration files (YAML or JSON).
    #[arg(
        short,
        long = "file",
        global = true,
        env = "GATESYNC_FILE",
        value_delimiter = ',',
        default_value = "gatesync.yaml"
    )]
    pub files: Vec<PathBuf>,

    /// Directory of the file backend.
    #[arg(long, global = true, env = "GATESYNC_BACKEND_DIR", default_value = crate::backend::DEFAULT_BACKEND_DIR)]
    pub backend_dir: PathBuf,

    /// Only manage resources carrying these labels (`key=value`).
    #[arg(long = "label-selector", global = true)]
    pub label_selector: Vec<String>,

    /// Only manage these resource types.
    #[arg(long = "include-resource-type", global = true)]
    pub include_resource_type: Vec<String>,

    /// Never manage these resource types.
    #[arg(long = "exclude-resource-type", global = true)]
    pub exclude_resource_type: Vec<String>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Log line format on stderr (text, json).
    #[arg(long, global = true, env = "GATESYNC_LOG_FORMAT", default_value = "text")]
    pub log_format: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate the declarative configuration.
    Validate {
        /// Show warnings as well as errors.
        #[arg(short, long)]
        warnings: bool,
    },

    /// Show the changes a sync would apply.
    Diff {
        /// Show the field-level changes of every update.
        #[arg(short, long)]
        detailed: bool,
    },

    /// Apply the declarative configuration to the backend.
    Sync {
        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,

        /// Keep applying events after one fails.
        #[arg(long)]
        continue_on_error: bool,
    },

    /// Print the configuration stored in the backend.
    Dump,

    /// Check for drift between the configuration and the backend.
    Drift,

    /// Show or replace the backend's default-value table.
    Defaults {
        /// Replace the table with the contents of this file.
        #[arg(long)]
        set: Option<PathBuf>,
    },
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}
