//! Output formatting for CLI commands.
//!
//! This module renders events, reports and configurations either as
//! colored text for terminals or as JSON for scripting.

use colored::Colorize;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::config::{ConfigHasher, Configuration, DefaultValue, ValidationResult};
use crate::error::{GatesyncError, Result};
use crate::planner::{ArrayItem, Change, DiffSummary, Event, EventType, KindCounts, ResourceKind};
use crate::reconciler::{DriftReport, ReconciliationResult};

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Event row for table display.
#[derive(Tabled)]
struct EventRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Parent")]
    parent: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a diff summary.
    ///
    /// With `detailed`, every update lists its field-level changes.
    #[must_use]
    pub fn format_diff(&self, summary: &DiffSummary, detailed: bool) -> String {
        match self.format {
            OutputFormat::Json => to_json(&DiffJson::from(summary)),
            OutputFormat::Text => Self::format_diff_text(summary, detailed),
        }
    }

    fn format_diff_text(summary: &DiffSummary, detailed: bool) -> String {
        if summary.is_empty() {
            return format!("{} No changes required\n", "✓".green());
        }

        let mut output = String::new();
        let _ = write!(
            output,
            "\nConfig hash: {}\n\n",
            ConfigHasher::new().short_hash(&summary.config_hash)
        );

        let rows: Vec<EventRow> = summary
            .events
            .iter()
            .enumerate()
            .map(|(i, event)| EventRow {
                index: i + 1,
                action: Self::format_event_type(event.event_type()),
                kind: event.resource_type.to_string(),
                name: truncate(&event.resource_name, 40),
                id: short(&event.resource_id),
                parent: event.parent_id.as_deref().map_or_else(|| String::from("-"), short),
            })
            .collect();

        output.push_str(&Table::new(rows).to_string());
        output.push('\n');

        if detailed {
            for event in summary.events.iter().filter(|e| !e.diff().is_empty()) {
                let _ = write!(output, "\n{event}\n");
                for change in event.diff() {
                    let _ = writeln!(output, "  {}", Self::format_change(change));
                }
            }
        }

        let _ = write!(output, "\n{}\n", summary.summary_line());
        output
    }

    /// Formats one structural change with the usual `+`, `-`, `~` markers.
    #[must_use]
    pub fn format_change(change: &Change) -> String {
        let path = change.dotted_path();
        match change {
            Change::Added { rhs, .. } => format!("+ {path}: {}", compact(rhs)).green().to_string(),
            Change::Removed { lhs, .. } => format!("- {path}: {}", compact(lhs)).red().to_string(),
            Change::Edited { lhs, rhs, .. } => {
                format!("~ {path}: {} -> {}", compact(lhs), compact(rhs))
                    .yellow()
                    .to_string()
            }
            Change::Array { item, .. } => match item {
                ArrayItem::Added { rhs } => format!("+ {path}: {}", compact(rhs)).green().to_string(),
                ArrayItem::Removed { lhs } => format!("- {path}: {}", compact(lhs)).red().to_string(),
            },
        }
    }

    /// Formats a validation result.
    #[must_use]
    pub fn format_validation(&self, result: &ValidationResult, config: &Configuration, show_warnings: bool) -> String {
        match self.format {
            OutputFormat::Json => to_json(&ValidationJson {
                valid: result.errors.is_empty(),
                resources: config.resource_count(),
                warnings: &result.warnings,
            }),
            OutputFormat::Text => {
                let mut output = format!("{} Configuration is valid\n", "✓".green());
                let _ = writeln!(output, "   Resources: {}", config.resource_count());

                if show_warnings && !result.warnings.is_empty() {
                    let _ = write!(output, "\n{} Warnings:\n", "⚠".yellow());
                    for warning in &result.warnings {
                        let _ = writeln!(output, "   - {warning}");
                    }
                }
                output
            }
        }
    }

    /// Formats a drift report.
    #[must_use]
    pub fn format_drift(&self, report: &DriftReport) -> String {
        match self.format {
            OutputFormat::Json => to_json(report),
            OutputFormat::Text => {
                if report.is_converged() {
                    format!("{} No drift detected - backend is converged\n", "✓".green())
                } else {
                    let mut output = format!("{} Drift detected:\n\n", "⚠".yellow());
                    for resource in &report.drifted_resources {
                        let _ = writeln!(output, "   - {resource}");
                    }
                    let _ = write!(
                        output,
                        "\n{} pending change(s); {} desired, {} observed resources\n",
                        report.drifted_resources.len(),
                        report.desired_count,
                        report.observed_count
                    );
                    output
                }
            }
        }
    }

    /// Formats a sync result.
    #[must_use]
    pub fn format_sync(&self, result: &ReconciliationResult) -> String {
        match self.format {
            OutputFormat::Json => to_json(result),
            OutputFormat::Text => {
                let status = if result.success {
                    format!("{} Sync successful", "✓".green())
                } else {
                    format!("{} Sync failed", "✗".red())
                };

                let mut output = format!("{status}\n\n");
                let _ = writeln!(output, "   Created: {}", result.created.to_string().green());
                let _ = writeln!(output, "   Updated: {}", result.updated.to_string().yellow());
                let _ = writeln!(output, "   Deleted: {}", result.deleted.to_string().red());
                let _ = writeln!(output, "   Failed: {}", result.failed);

                if !result.errors.is_empty() {
                    let _ = write!(output, "\n{} Errors:\n", "⚠".yellow());
                    for error in &result.errors {
                        let _ = writeln!(output, "   - {error}");
                    }
                }
                output
            }
        }
    }

    /// Formats a configuration, as YAML for text output.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be serialized.
    pub fn format_config(&self, config: &Configuration) -> Result<String> {
        self.format_document(config)
    }

    /// Formats a default-value table, as YAML for text output.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be serialized.
    pub fn format_defaults(&self, defaults: &DefaultValue) -> Result<String> {
        self.format_document(defaults)
    }

    fn format_document<T: Serialize>(&self, document: &T) -> Result<String> {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(document)
                .map_err(|e| GatesyncError::internal(format!("Failed to render JSON: {e}"))),
            OutputFormat::Text => serde_yaml::to_string(document)
                .map_err(|e| GatesyncError::internal(format!("Failed to render YAML: {e}"))),
        }
    }

    /// Formats an event type with color.
    fn format_event_type(event_type: EventType) -> String {
        match event_type {
            EventType::Create => "+create".green().to_string(),
            EventType::Update => "~update".yellow().to_string(),
            EventType::Delete => "-delete".red().to_string(),
        }
    }
}

/// Renders a value on one line.
fn compact(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

/// Shortens an identifier for table display.
fn short(id: &str) -> String {
    id.chars().take(8).collect()
}

/// Truncates a string to a maximum number of characters.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{head}...")
    }
}

// JSON serialization helpers

#[derive(Serialize)]
struct DiffJson<'a> {
    config_hash: &'a str,
    created: usize,
    updated: usize,
    deleted: usize,
    by_kind: BTreeMap<ResourceKind, KindCounts>,
    events: &'a [Event],
}

impl<'a> From<&'a DiffSummary> for DiffJson<'a> {
    fn from(summary: &'a DiffSummary) -> Self {
        Self {
            config_hash: &summary.config_hash,
            created: summary.create_count(),
            updated: summary.update_count(),
            deleted: summary.delete_count(),
            by_kind: summary.by_kind(),
            events: &summary.events,
        }
    }
}

#[derive(Serialize)]
struct ValidationJson<'a> {
    valid: bool,
    resources: usize,
    warnings: &'a [String],
}
