//! Diff summaries.
//!
//! A [`DiffSummary`] wraps the ordered event list of one diff run with the
//! fingerprint of the desired configuration it was computed from.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::event::{Event, EventType};
use super::resource::ResourceKind;

/// The outcome of one diff run.
#[derive(Debug, Clone, Serialize)]
pub struct DiffSummary {
    /// When the diff was computed.
    pub created_at: DateTime<Utc>,
    /// Fingerprint of the desired configuration.
    pub config_hash: String,
    /// Ordered events.
    pub events: Vec<Event>,
}

/// Event counts for one resource kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KindCounts {
    /// Resources to create.
    pub create: usize,
    /// Resources to update.
    pub update: usize,
    /// Resources to delete.
    pub delete: usize,
}

impl DiffSummary {
    /// Creates a summary from an ordered event list.
    #[must_use]
    pub fn new(config_hash: impl Into<String>, events: Vec<Event>) -> Self {
        Self {
            created_at: Utc::now(),
            config_hash: config_hash.into(),
            events,
        }
    }

    /// Returns true if nothing needs to change.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Returns the number of events.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns the number of create events.
    #[must_use]
    pub fn create_count(&self) -> usize {
        self.count(EventType::Create)
    }

    /// Returns the number of update events.
    #[must_use]
    pub fn update_count(&self) -> usize {
        self.count(EventType::Update)
    }

    /// Returns the number of delete events.
    #[must_use]
    pub fn delete_count(&self) -> usize {
        self.count(EventType::Delete)
    }

    fn count(&self, event_type: EventType) -> usize {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .count()
    }

    /// Returns event counts grouped by resource kind.
    #[must_use]
    pub fn by_kind(&self) -> BTreeMap<ResourceKind, KindCounts> {
        let mut counts: BTreeMap<ResourceKind, KindCounts> = BTreeMap::new();
        for event in &self.events {
            let entry = counts.entry(event.resource_type).or_default();
            match event.event_type() {
                EventType::Create => entry.create += 1,
                EventType::Update => entry.update += 1,
                EventType::Delete => entry.delete += 1,
            }
        }
        counts
    }

    /// Returns the one-line count summary.
    #[must_use]
    pub fn summary_line(&self) -> String {
        format!(
            "Summary: {} will be created, {} will be updated, {} will be deleted",
            self.create_count(),
            self.update_count(),
            self.delete_count()
        )
    }
}

impl std::fmt::Display for DiffSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.events.is_empty() {
            return write!(f, "No changes required");
        }

        for event in &self.events {
            writeln!(f, "{event}")?;
        }
        write!(f, "{}", self.summary_line())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::EventChange;
    use serde_json::json;

    fn event(kind: ResourceKind, name: &str, change: EventChange) -> Event {
        Event {
            resource_type: kind,
            resource_id: name.to_string(),
            resource_name: name.to_string(),
            parent_id: None,
            change,
        }
    }

    fn sample() -> DiffSummary {
        DiffSummary::new(
            "abc",
            vec![
                event(ResourceKind::Route, "old", EventChange::Delete { old_value: json!({}) }),
                event(
                    ResourceKind::Service,
                    "svc",
                    EventChange::Update {
                        old_value: json!({}),
                        new_value: json!({}),
                        diff: vec![],
                    },
                ),
                event(ResourceKind::Route, "new", EventChange::Create { new_value: json!({}) }),
            ],
        )
    }

    #[test]
    fn test_counts() {
        let summary = sample();
        assert_eq!(summary.len(), 3);
        assert_eq!(summary.create_count(), 1);
        assert_eq!(summary.update_count(), 1);
        assert_eq!(summary.delete_count(), 1);

        let by_kind = summary.by_kind();
        assert_eq!(
            by_kind[&ResourceKind::Route],
            KindCounts { create: 1, update: 0, delete: 1 }
        );
        assert_eq!(by_kind[&ResourceKind::Service].update, 1);
    }

    #[test]
    fn test_display() {
        let text = sample().to_string();
        assert!(text.starts_with("delete route: \"old\"\n"));
        assert!(text.ends_with("Summary: 1 will be created, 1 will be updated, 1 will be deleted"));

        assert_eq!(DiffSummary::new("abc", vec![]).to_string(), "No changes required");
    }
}
