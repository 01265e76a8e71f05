//! Resource kinds, their descriptors, and identity resolution.
//!
//! Every kind the engine understands is described by one [`KindDescriptor`]
//! entry: how its name is derived, which child collections it nests, and
//! whether it carries a plugin map. The matcher dispatches on this table
//! instead of on per-kind code paths.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

use crate::config::{Resource, generate_id};
use crate::error::DiffError;

/// One of the fixed set of supported gateway resource kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// HTTP route.
    Route,
    /// L4 stream route.
    StreamRoute,
    /// Service (HTTP or stream).
    Service,
    /// Upstream.
    Upstream,
    /// TLS certificate.
    Ssl,
    /// Global plugin rule.
    GlobalRule,
    /// Reusable plugin configuration.
    PluginConfig,
    /// Plugin metadata.
    PluginMetadata,
    /// Consumer.
    Consumer,
    /// Consumer group.
    ConsumerGroup,
    /// Consumer credential.
    ConsumerCredential,
}

/// How a resource's human name is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Naming {
    /// The `name` field.
    Name,
    /// The `username` field, which is also the identifier.
    Username,
    /// The `snis` list joined with `,`.
    Snis,
    /// The key of a keyed collection, which is also the identifier.
    MapKey,
}

/// A child collection nested inside a parent resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildCollection {
    /// Field on the parent holding the children.
    pub field: &'static str,
    /// Kind of the children.
    pub kind: ResourceKind,
}

/// Static description of a resource kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindDescriptor {
    /// The kind described.
    pub kind: ResourceKind,
    /// Name derivation rule.
    pub naming: Naming,
    /// Nested child collections.
    pub children: &'static [ChildCollection],
    /// Whether the kind carries a `plugins` map compared with plugin defaults.
    pub carries_plugins: bool,
    /// Whether deleting the resource also deletes its children.
    pub cascades_on_delete: bool,
    /// Whether child identifiers are qualified with this resource's name.
    pub qualifies_children: bool,
}

const SERVICE_CHILDREN: &[ChildCollection] = &[
    ChildCollection { field: "routes", kind: ResourceKind::Route },
    ChildCollection { field: "stream_routes", kind: ResourceKind::StreamRoute },
    ChildCollection { field: "upstreams", kind: ResourceKind::Upstream },
];

const CONSUMER_CHILDREN: &[ChildCollection] = &[ChildCollection {
    field: "credentials",
    kind: ResourceKind::ConsumerCredential,
}];

const CONSUMER_GROUP_CHILDREN: &[ChildCollection] = &[ChildCollection {
    field: "consumers",
    kind: ResourceKind::Consumer,
}];

const fn leaf(kind: ResourceKind, naming: Naming, carries_plugins: bool) -> KindDescriptor {
    KindDescriptor {
        kind,
        naming,
        children: &[],
        carries_plugins,
        cascades_on_delete: false,
        qualifies_children: false,
    }
}

const SERVICE: KindDescriptor = KindDescriptor {
    kind: ResourceKind::Service,
    naming: Naming::Name,
    children: SERVICE_CHILDREN,
    carries_plugins: true,
    cascades_on_delete: true,
    qualifies_children: true,
};

const CONSUMER: KindDescriptor = KindDescriptor {
    kind: ResourceKind::Consumer,
    naming: Naming::Username,
    children: CONSUMER_CHILDREN,
    carries_plugins: true,
    cascades_on_delete: false,
    qualifies_children: true,
};

const CONSUMER_GROUP: KindDescriptor = KindDescriptor {
    kind: ResourceKind::ConsumerGroup,
    naming: Naming::Name,
    children: CONSUMER_GROUP_CHILDREN,
    carries_plugins: true,
    cascades_on_delete: false,
    qualifies_children: false,
};

const ROUTE: KindDescriptor = leaf(ResourceKind::Route, Naming::Name, true);
const STREAM_ROUTE: KindDescriptor = leaf(ResourceKind::StreamRoute, Naming::Name, true);
const UPSTREAM: KindDescriptor = leaf(ResourceKind::Upstream, Naming::Name, false);
const SSL: KindDescriptor = leaf(ResourceKind::Ssl, Naming::Snis, false);
const GLOBAL_RULE: KindDescriptor = leaf(ResourceKind::GlobalRule, Naming::MapKey, false);
const PLUGIN_CONFIG: KindDescriptor = leaf(ResourceKind::PluginConfig, Naming::Name, true);
const PLUGIN_METADATA: KindDescriptor = leaf(ResourceKind::PluginMetadata, Naming::MapKey, false);
const CONSUMER_CREDENTIAL: KindDescriptor =
    leaf(ResourceKind::ConsumerCredential, Naming::Name, false);

impl ResourceKind {
    /// Every kind, in the order the matcher visits them.
    pub const ALL: [Self; 11] = [
        Self::Service,
        Self::Ssl,
        Self::Consumer,
        Self::GlobalRule,
        Self::PluginMetadata,
        Self::Route,
        Self::StreamRoute,
        Self::ConsumerCredential,
        Self::Upstream,
        Self::ConsumerGroup,
        Self::PluginConfig,
    ];

    /// Returns the canonical snake_case name of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Route => "route",
            Self::StreamRoute => "stream_route",
            Self::Service => "service",
            Self::Upstream => "upstream",
            Self::Ssl => "ssl",
            Self::GlobalRule => "global_rule",
            Self::PluginConfig => "plugin_config",
            Self::PluginMetadata => "plugin_metadata",
            Self::Consumer => "consumer",
            Self::ConsumerGroup => "consumer_group",
            Self::ConsumerCredential => "consumer_credential",
        }
    }

    /// Returns the top-level configuration key holding this kind.
    #[must_use]
    pub const fn collection_key(self) -> &'static str {
        match self {
            Self::Route => "routes",
            Self::StreamRoute => "stream_routes",
            Self::Service => "services",
            Self::Upstream => "upstreams",
            Self::Ssl => "ssls",
            Self::GlobalRule => "global_rules",
            Self::PluginConfig => "plugin_configs",
            Self::PluginMetadata => "plugin_metadata",
            Self::Consumer => "consumers",
            Self::ConsumerGroup => "consumer_groups",
            Self::ConsumerCredential => "consumer_credentials",
        }
    }

    /// Returns the descriptor for this kind.
    #[must_use]
    pub const fn descriptor(self) -> &'static KindDescriptor {
        match self {
            Self::Route => &ROUTE,
            Self::StreamRoute => &STREAM_ROUTE,
            Self::Service => &SERVICE,
            Self::Upstream => &UPSTREAM,
            Self::Ssl => &SSL,
            Self::GlobalRule => &GLOBAL_RULE,
            Self::PluginConfig => &PLUGIN_CONFIG,
            Self::PluginMetadata => &PLUGIN_METADATA,
            Self::Consumer => &CONSUMER,
            Self::ConsumerGroup => &CONSUMER_GROUP,
            Self::ConsumerCredential => &CONSUMER_CREDENTIAL,
        }
    }

    /// Looks up a kind by its configuration key (`services`, `ssls`, ...).
    #[must_use]
    pub fn from_collection_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.collection_key() == key)
    }
}

impl FromStr for ResourceKind {
    type Err = DiffError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| DiffError::UnsupportedResourceType { name: s.to_string() })
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl KindDescriptor {
    /// Derives the human name of a list resource.
    ///
    /// Missing names resolve to the empty string; the linter rejects such
    /// resources before they reach the engine.
    #[must_use]
    pub fn resource_name(&self, resource: &Resource) -> String {
        let field = |key: &str| {
            resource
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        match self.naming {
            Naming::Name | Naming::MapKey => field("name"),
            Naming::Username => field("username"),
            Naming::Snis => resource
                .get("snis")
                .and_then(Value::as_array)
                .map(|snis| {
                    snis.iter()
                        .filter_map(Value::as_str)
                        .collect::<Vec<_>>()
                        .join(",")
                })
                .unwrap_or_default(),
        }
    }

    /// Resolves the operative identifier of a list resource.
    ///
    /// Order: explicit `id`, then a server-assigned `metadata.id`, then the
    /// hash of the name qualified by `parent_name` when one is given.
    /// Consumers are always identified by their username.
    #[must_use]
    pub fn resolve_id(&self, resource: &Resource, name: &str, parent_name: Option<&str>) -> String {
        if matches!(self.naming, Naming::Username | Naming::MapKey) {
            return name.to_string();
        }

        explicit_id(resource.get("id"))
            .or_else(|| explicit_id(resource.get("metadata").and_then(|m| m.get("id"))))
            .unwrap_or_else(|| {
                parent_name.map_or_else(
                    || generate_id(name),
                    |parent| generate_id(&format!("{parent}.{name}")),
                )
            })
    }
}

/// Reads an identifier that may be stored as a string or a number.
fn explicit_id(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}
