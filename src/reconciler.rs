//! Reconciler for converging a gateway onto a desired configuration.
//!
//! This module ties the pieces together: it dumps the observed
//! configuration from a backend, narrows it to the selected scope, runs the
//! diff engine, and hands the resulting events back to the backend.

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::backend::{Backend, SyncOptions, SyncResult};
use crate::config::{ConfigHasher, Configuration, LabelSelector, filter_by_labels, filter_resource_types};
use crate::error::Result;
use crate::planner::{DiffEngine, DiffSummary, EventType};

/// Reconciler for a single backend.
pub struct Reconciler<'a, B: Backend> {
    /// Backend holding the observed configuration.
    backend: &'a B,
    /// Label selector applied to the observed configuration.
    selector: LabelSelector,
    /// Resource kinds to keep (all when empty).
    include: Vec<String>,
    /// Resource kinds to drop.
    exclude: Vec<String>,
    /// Lock holder name; generated when empty.
    holder: String,
    /// Configuration hasher.
    hasher: ConfigHasher,
}

/// Result of a reconciliation run.
#[derive(Debug, Default, Serialize)]
pub struct ReconciliationResult {
    /// Whether every event was applied.
    pub success: bool,
    /// Number of resources created.
    pub created: usize,
    /// Number of resources updated.
    pub updated: usize,
    /// Number of resources deleted.
    pub deleted: usize,
    /// Number of events that failed.
    pub failed: usize,
    /// Errors encountered.
    pub errors: Vec<String>,
}

/// Report of drift detection.
#[derive(Debug, Serialize)]
pub struct DriftReport {
    /// Whether drift was detected.
    pub has_drift: bool,
    /// Pending changes, one line per event.
    pub drifted_resources: Vec<String>,
    /// Number of resources in the desired configuration.
    pub desired_count: usize,
    /// Number of resources observed on the backend.
    pub observed_count: usize,
}

impl<'a, B: Backend> Reconciler<'a, B> {
    /// Creates a new reconciler.
    #[must_use]
    pub fn new(backend: &'a B) -> Self {
        Self {
            backend,
            selector: LabelSelector::default(),
            include: Vec::new(),
            exclude: Vec::new(),
            holder: String::new(),
            hasher: ConfigHasher::new(),
        }
    }

    /// Restricts the observed configuration to resources matching `selector`.
    #[must_use]
    pub fn with_label_selector(mut self, selector: LabelSelector) -> Self {
        self.selector = selector;
        self
    }

    /// Restricts the observed configuration to the selected resource kinds.
    #[must_use]
    pub fn with_resource_types(mut self, include: Vec<String>, exclude: Vec<String>) -> Self {
        self.include = include;
        self.exclude = exclude;
        self
    }

    /// Sets the name recorded in the backend lock.
    #[must_use]
    pub fn with_holder(mut self, holder: impl Into<String>) -> Self {
        self.holder = holder.into();
        self
    }

    /// Computes the events that would converge the backend on `desired`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read or a resource type
    /// filter names an unknown kind.
    pub async fn plan(&self, desired: &Configuration) -> Result<DiffSummary> {
        let (summary, _) = self.compute(desired).await?;
        Ok(summary)
    }

    /// Applies the events that converge the backend on `desired`.
    ///
    /// The backend is locked for the whole run; the lock is released even
    /// when planning or applying fails.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be locked, read or written.
    /// Events that fail to apply are reported in the result instead.
    pub async fn sync(&self, desired: &Configuration, options: SyncOptions) -> Result<ReconciliationResult> {
        info!("Starting sync against {} backend", self.backend.backend_type());

        let lock = self.backend.lock(&self.holder).await?;
        let outcome = self.sync_locked(desired, options).await;

        if let Err(e) = self.backend.unlock(&lock.lock_id).await {
            warn!("Failed to release backend lock {}: {e}", lock.lock_id);
        }

        outcome
    }

    async fn sync_locked(&self, desired: &Configuration, options: SyncOptions) -> Result<ReconciliationResult> {
        let summary = self.plan(desired).await?;

        if summary.is_empty() {
            info!("No changes required - backend is converged");
            return Ok(ReconciliationResult {
                success: true,
                ..ReconciliationResult::default()
            });
        }

        info!("{}", summary.summary_line());
        let results = self.backend.sync(&summary.events, options).await?;
        let result = ReconciliationResult::from_results(&results);

        if result.success {
            info!("Sync completed");
        } else {
            error!("Sync finished with {} failed event(s)", result.failed);
        }
        Ok(result)
    }

    /// Checks for drift without applying changes.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    pub async fn check_drift(&self, desired: &Configuration) -> Result<DriftReport> {
        info!("Checking for drift against {} backend", self.backend.backend_type());

        let (summary, observed) = self.compute(desired).await?;

        Ok(DriftReport {
            has_drift: !summary.is_empty(),
            drifted_resources: summary.events.iter().map(ToString::to_string).collect(),
            desired_count: desired.resource_count(),
            observed_count: observed.resource_count(),
        })
    }

    /// Dumps and narrows the observed configuration, then diffs it.
    async fn compute(&self, desired: &Configuration) -> Result<(DiffSummary, Configuration)> {
        let mut observed = self.backend.dump().await?;
        filter_resource_types(&mut observed, self.include.as_slice(), self.exclude.as_slice())?;
        filter_by_labels(&mut observed, &self.selector);
        debug!("Observed {} resource(s)", observed.resource_count());

        let defaults = self.backend.default_value().await?;
        let events = DiffEngine::new(&defaults).diff(desired, &observed);
        let summary = DiffSummary::new(self.hasher.fingerprint(desired), events);

        Ok((summary, observed))
    }
}

impl ReconciliationResult {
    /// Tallies the per-event outcomes of a sync.
    #[must_use]
    pub fn from_results(results: &[SyncResult]) -> Self {
        let mut tally = Self::default();

        for result in results {
            if !result.success {
                tally.failed += 1;
                if let Some(error) = &result.error {
                    tally.errors.push(format!("{}: {error}", result.event));
                }
                continue;
            }
            match result.event.event_type() {
                EventType::Create => tally.created += 1,
                EventType::Update => tally.updated += 1,
                EventType::Delete => tally.deleted += 1,
            }
        }

        tally.success = tally.failed == 0;
        tally
    }
}

impl DriftReport {
    /// Returns true if the backend matches the desired configuration.
    #[must_use]
    pub const fn is_converged(&self) -> bool {
        !self.has_drift
    }
}

impl std::fmt::Display for DriftReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.has_drift {
            writeln!(f, "Drift detected:")?;
            for resource in &self.drifted_resources {
                writeln!(f, "  - {resource}")?;
            }
        } else {
            writeln!(f, "No drift detected - backend is converged")?;
        }
        write!(
            f,
            "Desired resources: {}, observed resources: {}",
            self.desired_count, self.observed_count
        )
    }
}

impl std::fmt::Display for ReconciliationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = if self.success { "successful" } else { "failed" };
        writeln!(f, "Sync {status}:")?;
        writeln!(f, "  Created: {}", self.created)?;
        writeln!(f, "  Updated: {}", self.updated)?;
        writeln!(f, "  Deleted: {}", self.deleted)?;
        write!(f, "  Failed: {}", self.failed)?;

        if !self.errors.is_empty() {
            writeln!(f)?;
            write!(f, "  Errors:")?;
            for error in &self.errors {
                write!(f, "\n    - {error}")?;
            }
        }

        Ok(())
    }
}
