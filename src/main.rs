//! gatesync CLI entrypoint.
//!
//! This is the main entrypoint for the gatesync command-line tool.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use gatesync::backend::{Backend, FileBackend, SyncOptions};
use gatesync::cli::{Cli, Commands, OutputFormat, OutputFormatter};
use gatesync::config::{
    ConfigLoader, ConfigValidator, Configuration, DefaultValue, LabelSelector, fill_labels, filter_by_labels,
    filter_resource_types,
};
use gatesync::error::{ConfigError, ReconcileError, Result};
use gatesync::reconciler::Reconciler;

use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Environment variable enabling trace output of the diff engine.
const DIFFER_DEBUG_ENV: &str = "GATESYNC_DIFFER_DEBUG";

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose, cli.log_format);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            if e.is_retryable() {
                eprintln!("The backend is busy; retry once the other sync has finished.");
            }
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
///
/// `RUST_LOG` takes precedence over `--verbose`.
fn init_logging(verbose: bool, format: OutputFormat) {
    let level = if verbose { "debug" } else { "info" };
    let mut filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let differ_debug = std::env::var(DIFFER_DEBUG_ENV)
        .is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true"));
    if differ_debug && let Ok(directive) = "gatesync::planner=trace".parse() {
        filter = filter.add_directive(directive);
    }

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        OutputFormat::Json => builder.json().init(),
        OutputFormat::Text => builder.init(),
    }
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new(cli.output);
    let backend = FileBackend::new(&cli.backend_dir);
    debug!("Using {} backend at {}", backend.backend_type(), cli.backend_dir.display());

    match &cli.command {
        Commands::Validate { warnings } => cmd_validate(&cli, *warnings, &formatter),
        Commands::Diff { detailed } => cmd_diff(&cli, &backend, *detailed, &formatter).await,
        Commands::Sync { yes, continue_on_error } => {
            cmd_sync(&cli, &backend, *yes, *continue_on_error, &formatter).await
        }
        Commands::Dump => cmd_dump(&cli, &backend, &formatter).await,
        Commands::Drift => cmd_drift(&cli, &backend, &formatter).await,
        Commands::Defaults { set } => cmd_defaults(&backend, set.as_deref(), &formatter).await,
    }
}

/// Validate configuration.
fn cmd_validate(cli: &Cli, show_warnings: bool, formatter: &OutputFormatter) -> Result<()> {
    let config = load_desired(cli)?;
    let result = ConfigValidator::new().validate(&config)?;

    println!("{}", formatter.format_validation(&result, &config, show_warnings));
    Ok(())
}

/// Show pending changes.
async fn cmd_diff(cli: &Cli, backend: &FileBackend, detailed: bool, formatter: &OutputFormatter) -> Result<()> {
    let desired = load_validated(cli)?;
    let summary = scoped_reconciler(cli, backend)?.plan(&desired).await?;

    println!("{}", formatter.format_diff(&summary, detailed));
    Ok(())
}

/// Apply the configuration.
async fn cmd_sync(
    cli: &Cli,
    backend: &FileBackend,
    auto_approve: bool,
    continue_on_error: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let desired = load_validated(cli)?;
    let reconciler = scoped_reconciler(cli, backend)?;

    let summary = reconciler.plan(&desired).await?;
    if summary.is_empty() {
        println!("{}", formatter.format_diff(&summary, false));
        return Ok(());
    }

    // Confirm
    if !auto_approve {
        eprintln!("{}", formatter.format_diff(&summary, false));
        eprint!("Do you want to apply these changes? [y/N]: ");
        std::io::stderr().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            eprintln!("Sync cancelled.");
            return Ok(());
        }
    }

    let options = SyncOptions::default().with_exit_on_failure(!continue_on_error);
    let result = reconciler.sync(&desired, options).await?;
    println!("{}", formatter.format_sync(&result));

    if result.success {
        Ok(())
    } else {
        Err(ReconcileError::EventsFailed {
            failed: result.failed,
            total: summary.len(),
        }
        .into())
    }
}

/// Print the backend configuration.
async fn cmd_dump(cli: &Cli, backend: &FileBackend, formatter: &OutputFormatter) -> Result<()> {
    let mut observed = backend.dump().await?;
    filter_resource_types(
        &mut observed,
        cli.include_resource_type.as_slice(),
        cli.exclude_resource_type.as_slice(),
    )?;
    filter_by_labels(&mut observed, &LabelSelector::parse(cli.label_selector.as_slice())?);

    println!("{}", formatter.format_config(&observed)?);
    Ok(())
}

/// Check for drift.
async fn cmd_drift(cli: &Cli, backend: &FileBackend, formatter: &OutputFormatter) -> Result<()> {
    let desired = load_validated(cli)?;
    let report = scoped_reconciler(cli, backend)?.check_drift(&desired).await?;

    println!("{}", formatter.format_drift(&report));
    Ok(())
}

/// Show or replace the default-value table.
async fn cmd_defaults(backend: &FileBackend, set: Option<&Path>, formatter: &OutputFormatter) -> Result<()> {
    if let Some(path) = set {
        let defaults = read_defaults(path)?;
        backend.set_default_value(defaults).await?;
        info!("Default values replaced from {}", path.display());
    }

    let defaults = backend.default_value().await?;
    println!("{}", formatter.format_defaults(&defaults)?);
    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Loads the declarative files and narrows them to the selected scope.
fn load_desired(cli: &Cli) -> Result<Configuration> {
    let base_path = cli
        .files
        .first()
        .and_then(|f| f.parent())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

    let loader = ConfigLoader::new().with_base_path(base_path);
    loader.load_dotenv()?;

    let mut config = loader.load_files(cli.files.as_slice())?;
    filter_resource_types(
        &mut config,
        cli.include_resource_type.as_slice(),
        cli.exclude_resource_type.as_slice(),
    )?;
    fill_labels(&mut config, &LabelSelector::parse(cli.label_selector.as_slice())?);

    Ok(config)
}

/// Loads the declarative files and rejects invalid configurations.
fn load_validated(cli: &Cli) -> Result<Configuration> {
    let config = load_desired(cli)?;
    let result = ConfigValidator::new().validate(&config)?;
    for warning in &result.warnings {
        warn!("{warning}");
    }
    Ok(config)
}

/// Builds a reconciler scoped by the CLI selection flags.
fn scoped_reconciler<'a>(cli: &Cli, backend: &'a FileBackend) -> Result<Reconciler<'a, FileBackend>> {
    Ok(Reconciler::new(backend)
        .with_label_selector(LabelSelector::parse(cli.label_selector.as_slice())?)
        .with_resource_types(cli.include_resource_type.clone(), cli.exclude_resource_type.clone()))
}

/// Reads a default-value table from a YAML or JSON file.
fn read_defaults(path: &Path) -> Result<DefaultValue> {
    let location = Some(path.display().to_string());
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::parse(format!("Failed to read file: {e}"), location.clone()))?;

    // JSON documents are valid YAML
    let defaults = serde_yaml::from_str(&content)
        .map_err(|e| ConfigError::parse(format!("Invalid default values: {e}"), location))?;
    Ok(defaults)
}
