//! Declarative configuration model.
//!
//! A [`Configuration`] is the full tree of gateway resources, either as
//! declared by an operator (desired) or as dumped from a backend (observed).
//! Resources are kept as JSON objects so that every gateway flavor's fields
//! survive a round trip; the kind-specific rules live in the planner.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::planner::ResourceKind;

/// A single gateway resource (service, route, consumer, ...).
pub type Resource = Map<String, Value>;

/// Name of the internal default-value bucket used by stream services.
pub const STREAM_SERVICE_BUCKET: &str = "stream_service";

/// The full declarative or observed tree of all resource kinds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Configuration {
    /// Services, optionally carrying nested routes, stream routes and upstreams.
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<Resource>,

    /// TLS certificates, identified by their SNI list.
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub ssls: Vec<Resource>,

    /// Consumers, optionally carrying nested credentials.
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub consumers: Vec<Resource>,

    /// Consumer groups, optionally carrying nested consumers.
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub consumer_groups: Vec<Resource>,

    /// Reusable plugin configurations.
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub plugin_configs: Vec<Resource>,

    /// Routes (top level only when diffing a service's children).
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<Resource>,

    /// Stream routes (top level only when diffing a service's children).
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub stream_routes: Vec<Resource>,

    /// Upstreams (top level only when diffing a service's children).
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub upstreams: Vec<Resource>,

    /// Consumer credentials (top level only when diffing a consumer's children).
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub consumer_credentials: Vec<Resource>,

    /// Global plugin rules keyed by plugin name.
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "BTreeMap::is_empty")]
    pub global_rules: BTreeMap<String, Resource>,

    /// Plugin metadata keyed by plugin name.
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "BTreeMap::is_empty")]
    pub plugin_metadata: BTreeMap<String, Resource>,
}

/// Backend-supplied table of values a gateway silently injects.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DefaultValue {
    /// Partial resources keyed by resource kind (plus `stream_service`).
    #[serde(default, deserialize_with = "null_as_default")]
    pub core: BTreeMap<String, Value>,

    /// Partial plugin configurations keyed by plugin name.
    #[serde(default, deserialize_with = "null_as_default")]
    pub plugins: BTreeMap<String, Value>,
}

/// Treats an explicit `null` (e.g. `services:` with no items) as empty.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

impl Configuration {
    /// Creates an empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the list collection for a kind, or `None` for keyed kinds.
    #[must_use]
    pub const fn list(&self, kind: ResourceKind) -> Option<&Vec<Resource>> {
        match kind {
            ResourceKind::Service => Some(&self.services),
            ResourceKind::Ssl => Some(&self.ssls),
            ResourceKind::Consumer => Some(&self.consumers),
            ResourceKind::ConsumerGroup => Some(&self.consumer_groups),
            ResourceKind::PluginConfig => Some(&self.plugin_configs),
            ResourceKind::Route => Some(&self.routes),
            ResourceKind::StreamRoute => Some(&self.stream_routes),
            ResourceKind::Upstream => Some(&self.upstreams),
            ResourceKind::ConsumerCredential => Some(&self.consumer_credentials),
            ResourceKind::GlobalRule | ResourceKind::PluginMetadata => None,
        }
    }

    /// Returns the mutable list collection for a kind, or `None` for keyed kinds.
    pub const fn list_mut(&mut self, kind: ResourceKind) -> Option<&mut Vec<Resource>> {
        match kind {
            ResourceKind::Service => Some(&mut self.services),
            ResourceKind::Ssl => Some(&mut self.ssls),
            ResourceKind::Consumer => Some(&mut self.consumers),
            ResourceKind::ConsumerGroup => Some(&mut self.consumer_groups),
            ResourceKind::PluginConfig => Some(&mut self.plugin_configs),
            ResourceKind::Route => Some(&mut self.routes),
            ResourceKind::StreamRoute => Some(&mut self.stream_routes),
            ResourceKind::Upstream => Some(&mut self.upstreams),
            ResourceKind::ConsumerCredential => Some(&mut self.consumer_credentials),
            ResourceKind::GlobalRule | ResourceKind::PluginMetadata => None,
        }
    }

    /// Returns the keyed collection for a kind, or `None` for list kinds.
    #[must_use]
    pub const fn keyed(&self, kind: ResourceKind) -> Option<&BTreeMap<String, Resource>> {
        match kind {
            ResourceKind::GlobalRule => Some(&self.global_rules),
            ResourceKind::PluginMetadata => Some(&self.plugin_metadata),
            _ => None,
        }
    }

    /// Returns the mutable keyed collection for a kind, or `None` for list kinds.
    pub const fn keyed_mut(&mut self, kind: ResourceKind) -> Option<&mut BTreeMap<String, Resource>> {
        match kind {
            ResourceKind::GlobalRule => Some(&mut self.global_rules),
            ResourceKind::PluginMetadata => Some(&mut self.plugin_metadata),
            _ => None,
        }
    }

    /// Returns true if no resource of any kind is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        ResourceKind::ALL.iter().all(|kind| match self.list(*kind) {
            Some(list) => list.is_empty(),
            None => self.keyed(*kind).is_none_or(BTreeMap::is_empty),
        })
    }

    /// Counts every resource, including children nested inside their parents.
    #[must_use]
    pub fn resource_count(&self) -> usize {
        ResourceKind::ALL
            .iter()
            .map(|kind| match self.list(*kind) {
                Some(list) => list.iter().map(|r| count_with_children(*kind, r)).sum(),
                None => self.keyed(*kind).map_or(0, BTreeMap::len),
            })
            .sum()
    }
}

/// Counts a resource plus its nested children, recursively.
fn count_with_children(kind: ResourceKind, resource: &Resource) -> usize {
    1 + kind
        .descriptor()
        .children
        .iter()
        .map(|child| {
            resource
                .get(child.field)
                .and_then(Value::as_array)
                .map_or(0, |items| {
                    items
                        .iter()
                        .filter_map(Value::as_object)
                        .map(|item| count_with_children(child.kind, item))
                        .sum()
                })
        })
        .sum::<usize>()
}

impl DefaultValue {
    /// Creates an empty default-value table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the core defaults for a bucket (a kind name or `stream_service`).
    #[must_use]
    pub fn core_for(&self, bucket: &str) -> Option<&Value> {
        self.core.get(bucket)
    }

    /// Returns the defaults for a plugin.
    #[must_use]
    pub fn plugin(&self, name: &str) -> Option<&Value> {
        self.plugins.get(name)
    }

    /// Returns true if the table carries no defaults.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.core.is_empty() && self.plugins.is_empty()
    }
}
