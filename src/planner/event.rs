//! Change events and their application order.
//!
//! The engine emits one [`Event`] per resource that must be created,
//! updated or deleted. Children are flattened next to their parents and
//! linked through `parent_id`, then the whole list is stably sorted by
//! [`EVENT_ORDER`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::resource::ResourceKind;
use super::structural::Change;

/// Type of a change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// The resource must be created.
    Create,
    /// The resource must be updated in place.
    Update,
    /// The resource must be deleted.
    Delete,
}

/// One computed change to a gateway resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Kind of the changed resource.
    pub resource_type: ResourceKind,
    /// Operative identifier of the resource.
    pub resource_id: String,
    /// Human name of the resource.
    pub resource_name: String,
    /// Identifier of the resource that nests this one, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Variant-specific payload.
    #[serde(flatten)]
    pub change: EventChange,
}

/// Payload of an event; which values exist depends on the event type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventChange {
    /// Creation of a resource.
    Create {
        /// The desired resource.
        new_value: Value,
    },
    /// In-place update of a resource.
    Update {
        /// The observed resource, without nested children.
        old_value: Value,
        /// The desired resource, without nested children.
        new_value: Value,
        /// Structural changes from old to new.
        diff: Vec<Change>,
    },
    /// Deletion of a resource.
    Delete {
        /// The observed resource.
        old_value: Value,
    },
}

/// Application order of events, keyed by `(kind, event type)`.
///
/// Deletes run leaves first so nothing is removed while still referenced,
/// updates follow, and creates run referenced-before-referencing. Global
/// rules, plugin metadata and credentials come last.
pub const EVENT_ORDER: [(ResourceKind, EventType); 33] = [
    (ResourceKind::Route, EventType::Delete),
    (ResourceKind::StreamRoute, EventType::Delete),
    (ResourceKind::Service, EventType::Delete),
    (ResourceKind::Upstream, EventType::Delete),
    (ResourceKind::PluginConfig, EventType::Delete),
    (ResourceKind::Consumer, EventType::Delete),
    (ResourceKind::ConsumerGroup, EventType::Delete),
    (ResourceKind::Ssl, EventType::Delete),
    (ResourceKind::Route, EventType::Update),
    (ResourceKind::StreamRoute, EventType::Update),
    (ResourceKind::Service, EventType::Update),
    (ResourceKind::Upstream, EventType::Update),
    (ResourceKind::PluginConfig, EventType::Update),
    (ResourceKind::ConsumerGroup, EventType::Update),
    (ResourceKind::Consumer, EventType::Update),
    (ResourceKind::Ssl, EventType::Update),
    // SSL may be referenced by upstream mTLS
    (ResourceKind::Ssl, EventType::Create),
    (ResourceKind::Service, EventType::Create),
    (ResourceKind::PluginConfig, EventType::Create),
    (ResourceKind::Route, EventType::Create),
    (ResourceKind::StreamRoute, EventType::Create),
    (ResourceKind::ConsumerGroup, EventType::Create),
    (ResourceKind::Consumer, EventType::Create),
    (ResourceKind::Upstream, EventType::Create),
    (ResourceKind::GlobalRule, EventType::Delete),
    (ResourceKind::GlobalRule, EventType::Create),
    (ResourceKind::GlobalRule, EventType::Update),
    (ResourceKind::PluginMetadata, EventType::Delete),
    (ResourceKind::PluginMetadata, EventType::Create),
    (ResourceKind::PluginMetadata, EventType::Update),
    (ResourceKind::ConsumerCredential, EventType::Delete),
    (ResourceKind::ConsumerCredential, EventType::Create),
    (ResourceKind::ConsumerCredential, EventType::Update),
];

/// Returns the position of `(kind, event_type)` in [`EVENT_ORDER`].
///
/// Pairs missing from the table sort last.
#[must_use]
pub fn rank(kind: ResourceKind, event_type: EventType) -> usize {
    EVENT_ORDER
        .iter()
        .position(|entry| *entry == (kind, event_type))
        .unwrap_or(usize::MAX)
}

/// Stably sorts events into application order.
pub fn sort_events(events: &mut [Event]) {
    events.sort_by_key(|event| rank(event.resource_type, event.event_type()));
}

impl Event {
    /// Returns the type of this event.
    #[must_use]
    pub const fn event_type(&self) -> EventType {
        match self.change {
            EventChange::Create { .. } => EventType::Create,
            EventChange::Update { .. } => EventType::Update,
            EventChange::Delete { .. } => EventType::Delete,
        }
    }

    /// Returns the desired value, if the event carries one.
    #[must_use]
    pub const fn new_value(&self) -> Option<&Value> {
        match &self.change {
            EventChange::Create { new_value } | EventChange::Update { new_value, .. } => {
                Some(new_value)
            }
            EventChange::Delete { .. } => None,
        }
    }

    /// Returns the observed value, if the event carries one.
    #[must_use]
    pub const fn old_value(&self) -> Option<&Value> {
        match &self.change {
            EventChange::Update { old_value, .. } | EventChange::Delete { old_value } => {
                Some(old_value)
            }
            EventChange::Create { .. } => None,
        }
    }

    /// Returns the structural diff of an update, empty otherwise.
    #[must_use]
    pub fn diff(&self) -> &[Change] {
        match &self.change {
            EventChange::Update { diff, .. } => diff,
            _ => &[],
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}: \"{}\"",
            self.event_type(),
            self.resource_type,
            self.resource_name
        )
    }
}

/// Result of matching one resource before flattening.
///
/// `OnlySubEvents` marks a resource that is itself unchanged while some of
/// its children changed; only the children survive flattening.
#[derive(Debug)]
pub(crate) enum EventNode {
    /// The resource itself changed.
    Resource {
        /// Event for the resource.
        event: Event,
        /// Events of its nested children.
        sub_events: Vec<Event>,
    },
    /// Only nested children changed.
    OnlySubEvents {
        /// Events of its nested children.
        sub_events: Vec<Event>,
    },
}

/// Flattens nodes into one list where children follow their parent.
pub(crate) fn flatten(nodes: Vec<EventNode>) -> Vec<Event> {
    let mut events = Vec::with_capacity(nodes.len());
    for node in nodes {
        match node {
            EventNode::Resource { event, sub_events } => {
                events.push(event);
                events.extend(sub_events);
            }
            EventNode::OnlySubEvents { sub_events } => events.extend(sub_events),
        }
    }
    events
}
