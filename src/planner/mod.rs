//! Reconciliation engine.
//!
//! This module compares a desired configuration with an observed one and
//! produces the ordered change events that make the observed side match.

mod defaults;
mod diff;
mod event;
mod plan;
mod plugins;
mod resource;
mod structural;

pub use defaults::{default_bucket, merge_defaults, merge_into_resource};
pub use diff::{DiffEngine, diff};
pub use event::{EVENT_ORDER, Event, EventChange, EventType, rank, sort_events};
pub use plan::{DiffSummary, KindCounts};
pub use plugins::diff_plugins;
pub use resource::{ChildCollection, KindDescriptor, Naming, ResourceKind};
pub use structural::{ArrayItem, Change, PathSegment, diff_values};
