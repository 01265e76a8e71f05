//! The reconciliation matcher.
//!
//! [`DiffEngine`] pairs desired and observed resources kind by kind,
//! recurses into nested children and produces one flat, ordered event list.
//! The engine is a pure function of its inputs: it performs no I/O and
//! never fails.

use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value};
use tracing::{debug, debug_span, trace};
use uuid::Uuid;

use crate::config::{Configuration, DefaultValue, Resource, generate_id};

use super::defaults::{default_bucket, merge_into_resource};
use super::event::{Event, EventChange, EventNode, flatten, sort_events};
use super::plugins::diff_plugins;
use super::resource::{KindDescriptor, ResourceKind};
use super::structural::diff_values;

/// Fields that never take part in a comparison or an event payload.
const IDENTITY_FIELDS: &[&str] = &["id", "metadata"];

/// Fields removed from resources nested inside a deleted parent.
const AUDIT_FIELDS: &[&str] = &["metadata"];

/// Computes the ordered events that turn `observed` into `desired`.
///
/// This is the one-shot form of [`DiffEngine::diff`] with a fresh
/// transaction id.
#[must_use]
pub fn diff(desired: &Configuration, observed: &Configuration, defaults: &DefaultValue) -> Vec<Event> {
    DiffEngine::new(defaults).diff(desired, observed)
}

/// Matches desired resources against observed ones.
#[derive(Debug, Clone)]
pub struct DiffEngine<'a> {
    defaults: &'a DefaultValue,
    transaction_id: Uuid,
}

/// One resource prepared for matching.
struct Item<'c> {
    name: String,
    id: String,
    value: &'c Resource,
}

impl<'a> DiffEngine<'a> {
    /// Creates an engine reconciling against the given default-value table.
    #[must_use]
    pub fn new(defaults: &'a DefaultValue) -> Self {
        Self {
            defaults,
            transaction_id: Uuid::new_v4(),
        }
    }

    /// Sets the transaction id recorded in log entries.
    #[must_use]
    pub const fn with_transaction_id(mut self, transaction_id: Uuid) -> Self {
        self.transaction_id = transaction_id;
        self
    }

    /// Returns the transaction id recorded in log entries.
    #[must_use]
    pub const fn transaction_id(&self) -> Uuid {
        self.transaction_id
    }

    /// Computes the ordered events that turn `observed` into `desired`.
    ///
    /// Events of nested resources are flattened next to their parents and
    /// linked through `parent_id`; the list is sorted by the event order
    /// table.
    #[must_use]
    pub fn diff(&self, desired: &Configuration, observed: &Configuration) -> Vec<Event> {
        let span = debug_span!("differ", transaction_id = %self.transaction_id);
        let _enter = span.enter();

        debug!(
            "Enter differ: {} desired, {} observed resources",
            desired.resource_count(),
            observed.resource_count()
        );
        trace!(
            "Differ input: desired={}, observed={}, defaults={}",
            to_json(desired),
            to_json(observed),
            to_json(self.defaults)
        );

        let events = self.diff_scoped(desired, observed, None);

        debug!("Diff result: {} events", events.len());
        trace!("Diff result: {}", to_json(&events));

        events
    }

    /// Diffs every kind of one configuration level.
    ///
    /// `parent_name` qualifies derived identifiers of nested resources.
    fn diff_scoped(
        &self,
        desired: &Configuration,
        observed: &Configuration,
        parent_name: Option<&str>,
    ) -> Vec<Event> {
        let nodes: Vec<EventNode> = ResourceKind::ALL
            .into_iter()
            .flat_map(|kind| {
                let local = collect_items(desired, kind, parent_name);
                let remote = collect_items(observed, kind, parent_name);
                self.diff_kind(kind, &local, &remote)
            })
            .collect();

        let mut events = flatten(nodes);
        sort_events(&mut events);
        events
    }

    fn diff_kind(&self, kind: ResourceKind, desired: &[Item<'_>], observed: &[Item<'_>]) -> Vec<EventNode> {
        if desired.is_empty() && observed.is_empty() {
            return Vec::new();
        }

        let desired_by_id: HashMap<&str, &Item<'_>> =
            desired.iter().map(|item| (item.id.as_str(), item)).collect();
        let mut matched: HashSet<&str> = HashSet::new();
        let mut nodes = Vec::new();

        for remote in observed {
            match desired_by_id.get(remote.id.as_str()) {
                None => nodes.push(self.delete_node(kind, remote)),
                Some(local) => {
                    matched.insert(remote.id.as_str());
                    if let Some(node) = self.compare(kind, local, remote) {
                        nodes.push(node);
                    }
                }
            }
        }

        for local in desired {
            if !matched.contains(local.id.as_str()) {
                nodes.push(self.create_node(kind, local));
            }
        }

        nodes
    }

    fn delete_node(&self, kind: ResourceKind, remote: &Item<'_>) -> EventNode {
        let desc = kind.descriptor();

        let sub_events = if desc.cascades_on_delete {
            let children = children_of(desc, remote.value);
            let parent_name = desc.qualifies_children.then_some(remote.name.as_str());
            let events = self.diff_scoped(&Configuration::new(), &children, parent_name);
            adopt_sub_events(events, &remote.name, &remote.id)
        } else {
            Vec::new()
        };

        EventNode::Resource {
            event: Event {
                resource_type: kind,
                resource_id: remote.id.clone(),
                resource_name: remote.name.clone(),
                parent_id: None,
                change: EventChange::Delete {
                    old_value: Value::Object(strip_nested(kind, remote.value, IDENTITY_FIELDS, AUDIT_FIELDS)),
                },
            },
            sub_events,
        }
    }

    fn create_node(&self, kind: ResourceKind, local: &Item<'_>) -> EventNode {
        let desc = kind.descriptor();

        let sub_events = if desc.children.is_empty() {
            Vec::new()
        } else {
            let children = children_of(desc, local.value);
            let parent_name = desc.qualifies_children.then_some(local.name.as_str());
            let events = self.diff_scoped(&children, &Configuration::new(), parent_name);
            adopt_sub_events(events, &local.name, &local.id)
        };

        EventNode::Resource {
            event: Event {
                resource_type: kind,
                resource_id: local.id.clone(),
                resource_name: local.name.clone(),
                parent_id: None,
                change: EventChange::Create {
                    new_value: Value::Object(strip_nested(kind, local.value, IDENTITY_FIELDS, IDENTITY_FIELDS)),
                },
            },
            sub_events,
        }
    }

    /// Compares a matched pair; `None` means nothing changed at all.
    fn compare(&self, kind: ResourceKind, local: &Item<'_>, remote: &Item<'_>) -> Option<EventNode> {
        let desc = kind.descriptor();

        let authored = without(local.value, IDENTITY_FIELDS);
        let mut desired = authored.clone();
        let mut observed = without(remote.value, IDENTITY_FIELDS);

        // Private keys are never echoed back by a gateway
        if kind == ResourceKind::Ssl {
            strip_certificate_keys(&mut desired);
            strip_certificate_keys(&mut observed);
        }

        let bucket = default_bucket(kind, &desired);
        let mut merged = match self.defaults.core_for(bucket) {
            Some(defaults) => merge_into_resource(&desired, defaults),
            None => desired,
        };

        let mut sub_events = Vec::new();
        if !desc.children.is_empty() {
            let parent_name = desc.qualifies_children.then_some(remote.name.as_str());
            let events = self.diff_scoped(
                &children_of(desc, local.value),
                &children_of(desc, remote.value),
                parent_name,
            );
            sub_events = adopt_sub_events(events, &remote.name, &remote.id);
            debug!(
                "Diff sub-resources of {kind} \"{}\": {} events",
                remote.name,
                sub_events.len()
            );

            for child in desc.children {
                merged.remove(child.field);
                observed.remove(child.field);
            }
        }

        let mut plugins_changed = false;
        let (new_value, old_value) = if desc.carries_plugins {
            let (changed, merged_plugins) =
                diff_plugins(&plugin_map(&merged), &plugin_map(&observed), self.defaults);
            plugins_changed = changed;
            if !merged_plugins.is_empty() {
                merged.insert(String::from("plugins"), Value::Object(merged_plugins));
            }

            let outputs = (Value::Object(merged.clone()), Value::Object(observed.clone()));
            if !changed {
                merged.remove("plugins");
                observed.remove("plugins");
            }
            outputs
        } else {
            (Value::Object(authored), Value::Object(observed.clone()))
        };

        let changes = diff_values(&Value::Object(observed), &Value::Object(merged));
        debug!(
            "Diff main resource {kind} \"{}\": {} changes, plugins changed: {plugins_changed}",
            remote.name,
            changes.len()
        );

        if !plugins_changed && changes.is_empty() {
            return (!sub_events.is_empty()).then_some(EventNode::OnlySubEvents { sub_events });
        }

        Some(EventNode::Resource {
            event: Event {
                resource_type: kind,
                resource_id: remote.id.clone(),
                resource_name: remote.name.clone(),
                parent_id: None,
                change: EventChange::Update {
                    old_value,
                    new_value,
                    diff: changes,
                },
            },
            sub_events,
        })
    }
}

/// Lists the resources of one kind with their resolved names and ids.
fn collect_items<'c>(config: &'c Configuration, kind: ResourceKind, parent_name: Option<&str>) -> Vec<Item<'c>> {
    if let Some(keyed) = config.keyed(kind) {
        return keyed
            .iter()
            .map(|(key, value)| Item {
                name: key.clone(),
                id: key.clone(),
                value,
            })
            .collect();
    }

    let desc = kind.descriptor();
    config
        .list(kind)
        .map(|list| {
            list.iter()
                .map(|value| {
                    let name = desc.resource_name(value);
                    let id = desc.resolve_id(value, &name, parent_name);
                    Item { name, id, value }
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Builds a configuration holding only the nested children of `resource`.
fn children_of(desc: &KindDescriptor, resource: &Resource) -> Configuration {
    let mut children = Configuration::new();
    for child in desc.children {
        let Some(items) = resource.get(child.field).and_then(Value::as_array) else {
            continue;
        };
        if let Some(list) = children.list_mut(child.kind) {
            list.extend(items.iter().filter_map(Value::as_object).cloned());
        }
    }
    children
}

/// Links sub-events to their parent.
///
/// A child id derived from its bare name is re-derived from the qualified
/// `parent.child` name; any other id is assumed to be server-assigned and
/// kept. Events already linked to a nearer parent are left alone.
fn adopt_sub_events(events: Vec<Event>, parent_name: &str, parent_id: &str) -> Vec<Event> {
    events
        .into_iter()
        .map(|mut event| {
            if event.parent_id.is_none() {
                if generate_id(&event.resource_name) == event.resource_id {
                    event.resource_id = generate_id(&format!("{parent_name}.{}", event.resource_name));
                }
                event.parent_id = Some(parent_id.to_string());
            }
            event
        })
        .collect()
}

/// Returns a copy of `resource` without the given top-level fields.
fn without(resource: &Resource, fields: &[&str]) -> Resource {
    resource
        .iter()
        .filter(|(key, _)| !fields.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Returns a copy of `resource` without `fields`, removing `child_fields`
/// from every nested child, recursively.
fn strip_nested(kind: ResourceKind, resource: &Resource, fields: &[&str], child_fields: &[&str]) -> Resource {
    let mut out = without(resource, fields);
    for child in kind.descriptor().children {
        if let Some(Value::Array(items)) = out.get_mut(child.field) {
            for item in items.iter_mut() {
                if let Value::Object(object) = item {
                    *object = strip_nested(child.kind, object, child_fields, child_fields);
                }
            }
        }
    }
    out
}

fn strip_certificate_keys(ssl: &mut Resource) {
    if let Some(Value::Array(certificates)) = ssl.get_mut("certificates") {
        for certificate in certificates.iter_mut().filter_map(Value::as_object_mut) {
            certificate.remove("key");
        }
    }
}

fn plugin_map(resource: &Resource) -> Map<String, Value> {
    resource
        .get("plugins")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use crate::planner::EventType;

    fn config(value: Value) -> Configuration {
        serde_json::from_value(value).unwrap()
    }

    fn defaults(value: Value) -> DefaultValue {
        serde_json::from_value(value).unwrap()
    }

    fn run(desired: Value, observed: Value, default_value: Value) -> Value {
        let events = diff(&config(desired), &config(observed), &defaults(default_value));
        serde_json::to_value(events).unwrap()
    }

    fn id(name: &str) -> String {
        generate_id(name)
    }

    #[test]
    fn test_empty_inputs() {
        assert_eq!(run(json!({}), json!({}), json!({})), json!([]));
    }

    #[test]
    fn test_create_consumer() {
        assert_eq!(
            run(json!({"consumers": [{"username": "alice", "plugins": {}}]}), json!({}), json!({})),
            json!([{
                "resource_type": "consumer",
                "type": "create",
                "resource_id": "alice",
                "resource_name": "alice",
                "new_value": {"username": "alice", "plugins": {}}
            }])
        );
    }

    #[test]
    fn test_update_consumer_with_added_plugin() {
        assert_eq!(
            run(
                json!({"consumers": [{"username": "alice", "plugins": {"key-auth": {"key": "alice-key"}}}]}),
                json!({"consumers": [{"username": "alice", "plugins": {}}]}),
                json!({}),
            ),
            json!([{
                "resource_type": "consumer",
                "type": "update",
                "resource_id": "alice",
                "resource_name": "alice",
                "old_value": {"username": "alice", "plugins": {}},
                "new_value": {"username": "alice", "plugins": {"key-auth": {"key": "alice-key"}}},
                "diff": [{"kind": "N", "path": ["plugins", "key-auth"], "rhs": {"key": "alice-key"}}]
            }])
        );
    }

    #[test]
    fn test_delete_consumer() {
        assert_eq!(
            run(json!({}), json!({"consumers": [{"username": "alice", "plugins": {}}]}), json!({})),
            json!([{
                "resource_type": "consumer",
                "type": "delete",
                "resource_id": "alice",
                "resource_name": "alice",
                "old_value": {"username": "alice", "plugins": {}}
            }])
        );
    }

    #[test]
    fn test_sorted_delete_update_create() {
        let events = diff(
            &config(json!({"consumers": [
                {"username": "createConsumer", "plugins": {}},
                {"username": "updatedConsumer", "plugins": {"key-auth": {}}}
            ]})),
            &config(json!({"consumers": [
                {"username": "updatedConsumer", "plugins": {}},
                {"username": "deletedConsumer", "plugins": {}}
            ]})),
            &DefaultValue::new(),
        );

        let summary: Vec<_> = events
            .iter()
            .map(|e| (e.event_type(), e.resource_name.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (EventType::Delete, "deletedConsumer"),
                (EventType::Update, "updatedConsumer"),
                (EventType::Create, "createConsumer"),
            ]
        );
        assert_eq!(
            serde_json::to_value(events[1].diff()).unwrap(),
            json!([{"kind": "N", "path": ["plugins", "key-auth"], "rhs": {}}])
        );
    }

    #[test]
    fn test_core_defaults_are_transparent() {
        assert_eq!(
            run(
                json!({"consumers": [{"username": "alice", "plugins": {}}]}),
                json!({"consumers": [{"username": "alice", "description": "", "plugins": {}}]}),
                json!({"core": {"consumer": {"description": ""}}}),
            ),
            json!([])
        );
    }

    #[test]
    fn test_plugin_defaults_are_transparent() {
        assert_eq!(
            run(
                json!({"consumers": [{"username": "alice", "plugins": {"key-auth": {"key": "key"}}}]}),
                json!({"consumers": [{"username": "alice", "plugins": {"key-auth": {"key": "key", "added": "added"}}}]}),
                json!({"plugins": {"key-auth": {"added": "added"}}}),
            ),
            json!([])
        );
    }

    #[test]
    fn test_plugin_edit_reported_under_plugin_path() {
        assert_eq!(
            run(
                json!({"consumers": [{"username": "alice", "plugins": {"key-auth": {"key": "new-key"}}}]}),
                json!({"consumers": [{"username": "alice", "plugins": {"key-auth": {"key": "old-key", "added": "added"}}}]}),
                json!({"plugins": {"key-auth": {"added": "added"}}}),
            ),
            json!([{
                "resource_type": "consumer",
                "type": "update",
                "resource_id": "alice",
                "resource_name": "alice",
                "old_value": {"username": "alice", "plugins": {"key-auth": {"key": "old-key", "added": "added"}}},
                "new_value": {"username": "alice", "plugins": {"key-auth": {"key": "new-key", "added": "added"}}},
                "diff": [{"kind": "E", "path": ["plugins", "key-auth", "key"], "lhs": "old-key", "rhs": "new-key"}]
            }])
        );
    }

    #[test]
    fn test_ssl_id_hashes_joined_snis() {
        let ssl = json!({
            "snis": ["demo-sni1", "demo-sni2"],
            "certificates": [{"certificate": "cert", "key": "key"}]
        });

        let created = run(json!({"ssls": [ssl.clone()]}), json!({}), json!({}));
        assert_eq!(
            created,
            json!([{
                "resource_type": "ssl",
                "type": "create",
                "resource_id": id("demo-sni1,demo-sni2"),
                "resource_name": "demo-sni1,demo-sni2",
                "new_value": ssl.clone()
            }])
        );

        let deleted = run(json!({}), json!({"ssls": [ssl]}), json!({}));
        assert_eq!(deleted[0]["resource_id"], json!(id("demo-sni1,demo-sni2")));
    }

    #[test]
    fn test_ssl_private_key_not_compared() {
        let events = run(
            json!({"ssls": [{"snis": ["a"], "certificates": [{"certificate": "cert", "key": "secret"}]}]}),
            json!({"ssls": [{"snis": ["a"], "certificates": [{"certificate": "cert"}]}]}),
            json!({}),
        );
        assert_eq!(events, json!([]));

        let events = run(
            json!({"ssls": [{"snis": ["a"], "certificates": [{"certificate": "new", "key": "secret"}]}]}),
            json!({"ssls": [{"snis": ["a"], "certificates": [{"certificate": "old"}]}]}),
            json!({}),
        );
        assert_eq!(
            events[0]["new_value"],
            json!({"snis": ["a"], "certificates": [{"certificate": "new", "key": "secret"}]})
        );
        assert_eq!(events[0]["old_value"], json!({"snis": ["a"], "certificates": [{"certificate": "old"}]}));
    }

    #[test]
    fn test_nested_route_update_only() {
        let old_route = json!({"name": "Test Route", "uris": ["/test"], "plugins": {"test": {"testKey": "oldValue"}}});
        let new_route = json!({"name": "Test Route", "uris": ["/test"], "plugins": {"test": {"testKey": "newValue"}}});

        assert_eq!(
            run(
                json!({"services": [{"name": "Test Service", "routes": [new_route.clone()]}]}),
                json!({"services": [{"name": "Test Service", "routes": [old_route.clone()]}]}),
                json!({}),
            ),
            json!([{
                "resource_type": "route",
                "type": "update",
                "resource_id": id("Test Service.Test Route"),
                "resource_name": "Test Route",
                "parent_id": id("Test Service"),
                "old_value": old_route,
                "new_value": new_route,
                "diff": [{"kind": "E", "path": ["plugins", "test", "testKey"], "lhs": "oldValue", "rhs": "newValue"}]
            }])
        );
    }

    #[test]
    fn test_service_and_route_updated_separately() {
        let old_route = json!({"name": "Test Route", "uris": ["/test"], "plugins": {"test": {"testKey": "oldValue"}}});
        let new_route = json!({"name": "Test Route", "uris": ["/test"], "plugins": {"test": {"testKey": "newValue"}}});

        assert_eq!(
            run(
                json!({"services": [{
                    "name": "Test Service",
                    "path_prefix": "/test",
                    "plugins": {"test": {"testKey": "serviceNewValue"}},
                    "routes": [new_route.clone()]
                }]}),
                json!({"services": [{
                    "name": "Test Service",
                    "plugins": {"test": {"testKey": "serviceOldValue"}},
                    "routes": [old_route.clone()]
                }]}),
                json!({}),
            ),
            json!([
                {
                    "resource_type": "route",
                    "type": "update",
                    "resource_id": id("Test Service.Test Route"),
                    "resource_name": "Test Route",
                    "parent_id": id("Test Service"),
                    "old_value": old_route,
                    "new_value": new_route,
                    "diff": [{"kind": "E", "path": ["plugins", "test", "testKey"], "lhs": "oldValue", "rhs": "newValue"}]
                },
                {
                    "resource_type": "service",
                    "type": "update",
                    "resource_id": id("Test Service"),
                    "resource_name": "Test Service",
                    "old_value": {"name": "Test Service", "plugins": {"test": {"testKey": "serviceOldValue"}}},
                    "new_value": {
                        "name": "Test Service",
                        "path_prefix": "/test",
                        "plugins": {"test": {"testKey": "serviceNewValue"}}
                    },
                    "diff": [
                        {"kind": "E", "path": ["plugins", "test", "testKey"], "lhs": "serviceOldValue", "rhs": "serviceNewValue"},
                        {"kind": "N", "path": ["path_prefix"], "rhs": "/test"}
                    ]
                }
            ])
        );
    }

    #[test]
    fn test_unchanged_plugins_kept_in_values_but_not_diff() {
        let old_service = json!({"name": "Test Service", "plugins": {"test": {"testKey": "testValue", "added": "added"}}});

        assert_eq!(
            run(
                json!({"services": [{"name": "Test Service", "path_prefix": "/test", "plugins": {"test": {"testKey": "testValue"}}}]}),
                json!({"services": [old_service.clone()]}),
                json!({"plugins": {"test": {"added": "added"}}}),
            ),
            json!([{
                "resource_type": "service",
                "type": "update",
                "resource_id": id("Test Service"),
                "resource_name": "Test Service",
                "old_value": old_service,
                "new_value": {
                    "name": "Test Service",
                    "path_prefix": "/test",
                    "plugins": {"test": {"testKey": "testValue", "added": "added"}}
                },
                "diff": [{"kind": "N", "path": ["path_prefix"], "rhs": "/test"}]
            }])
        );
    }

    #[test]
    fn test_object_defaults_merged_selectively() {
        assert_eq!(
            run(
                json!({"services": [{"name": "Test Service", "test1": {}}]}),
                json!({"services": [{"name": "Test Service", "test": "test", "test1": {"test2": "test2"}}]}),
                json!({"core": {"service": {
                    "test": "test",
                    "test1": {"test2": "test2", "test3": {"test4": "test4"}}
                }}}),
            ),
            json!([])
        );
    }

    #[test]
    fn test_server_assigned_metadata_id_on_delete() {
        assert_eq!(
            run(
                json!({}),
                json!({"services": [{
                    "name": "Test Service",
                    "routes": [
                        {"name": "Test Route 1", "uris": ["/test1"]},
                        {"name": "Test Route 2", "uris": ["/test2"], "metadata": {"id": "not_hashed_route_name"}}
                    ],
                    "metadata": {"id": "not_hashed_service_name"}
                }]}),
                json!({}),
            ),
            json!([
                {
                    "resource_type": "route",
                    "type": "delete",
                    "resource_id": id("Test Service.Test Route 1"),
                    "resource_name": "Test Route 1",
                    "parent_id": "not_hashed_service_name",
                    "old_value": {"name": "Test Route 1", "uris": ["/test1"]}
                },
                {
                    "resource_type": "route",
                    "type": "delete",
                    "resource_id": "not_hashed_route_name",
                    "resource_name": "Test Route 2",
                    "parent_id": "not_hashed_service_name",
                    "old_value": {"name": "Test Route 2", "uris": ["/test2"]}
                },
                {
                    "resource_type": "service",
                    "type": "delete",
                    "resource_id": "not_hashed_service_name",
                    "resource_name": "Test Service",
                    "old_value": {
                        "name": "Test Service",
                        "routes": [
                            {"name": "Test Route 1", "uris": ["/test1"]},
                            {"name": "Test Route 2", "uris": ["/test2"]}
                        ]
                    }
                }
            ])
        );
    }

    #[test]
    fn test_server_assigned_metadata_id_replaced_on_update() {
        let events = diff(
            &config(json!({"services": [{
                "name": "Test Service",
                "path_prefix": "/test",
                "routes": [{"name": "Test Route 1", "uris": ["/test1u"]}]
            }]})),
            &config(json!({"services": [{
                "name": "Test Service",
                "routes": [{"name": "Test Route 1", "uris": ["/test1"]}],
                "metadata": {"id": "not_hashed_service_name"}
            }]})),
            &DefaultValue::new(),
        );

        let summary: Vec<_> = events
            .iter()
            .map(|e| {
                (
                    e.event_type(),
                    e.resource_type,
                    e.resource_id.clone(),
                    e.parent_id.clone(),
                )
            })
            .collect();
        assert_eq!(
            summary,
            vec![
                (
                    EventType::Delete,
                    ResourceKind::Route,
                    id("Test Service.Test Route 1"),
                    Some(String::from("not_hashed_service_name")),
                ),
                (
                    EventType::Delete,
                    ResourceKind::Service,
                    String::from("not_hashed_service_name"),
                    None,
                ),
                (EventType::Create, ResourceKind::Service, id("Test Service"), None),
                (
                    EventType::Create,
                    ResourceKind::Route,
                    id("Test Service.Test Route 1"),
                    Some(id("Test Service")),
                ),
            ]
        );
        assert_eq!(
            events[2].new_value(),
            Some(&json!({
                "name": "Test Service",
                "path_prefix": "/test",
                "routes": [{"name": "Test Route 1", "uris": ["/test1u"]}]
            }))
        );
    }

    #[test]
    fn test_array_item_defaults() {
        assert_eq!(
            run(
                json!({"services": [{"name": "svc", "upstream": {"nodes": [{"host": "0.0.0.0", "port": 443, "weight": 1}]}}]}),
                json!({"services": [{"name": "svc", "upstream": {"nodes": [{"host": "0.0.0.0", "port": 443, "weight": 1, "priority": 0}]}}]}),
                json!({"core": {"service": {"upstream": {"nodes": [{"priority": 0}]}}}}),
            ),
            json!([])
        );
    }

    #[test]
    fn test_http_and_stream_services_are_stable() {
        let services = json!({"services": [
            {"name": "HTTP", "routes": [{"name": "HTTP 1", "uris": ["/1"]}]},
            {"name": "Stream", "stream_routes": [{"name": "Stream 1", "server_port": 5432}]}
        ]});
        assert_eq!(run(services.clone(), services, json!({})), json!([]));
    }

    #[test]
    fn test_stream_service_uses_its_own_defaults() {
        assert_eq!(
            run(
                json!({"services": [{"name": "Stream", "stream_routes": []}]}),
                json!({"services": [{"name": "Stream", "stream_routes": [], "scheme": "tcp"}]}),
                json!({"core": {"service": {"scheme": "http"}, "stream_service": {"scheme": "tcp"}}}),
            ),
            json!([])
        );
    }

    #[test]
    fn test_explicit_boolean_beats_default() {
        let service = json!({"name": "HTTP", "path_prefix": "/test", "strip_path_prefix": false});
        let old_service = json!({"name": "HTTP", "path_prefix": "/test", "strip_path_prefix": true});

        assert_eq!(
            run(
                json!({"services": [service.clone()]}),
                json!({"services": [old_service.clone()]}),
                json!({"core": {"service": {"strip_path_prefix": true}}}),
            ),
            json!([{
                "resource_type": "service",
                "type": "update",
                "resource_id": id("HTTP"),
                "resource_name": "HTTP",
                "old_value": old_service,
                "new_value": service,
                "diff": [{"kind": "E", "path": ["strip_path_prefix"], "lhs": true, "rhs": false}]
            }])
        );
    }

    #[test]
    fn test_renamed_service_cascades_routes() {
        let events = diff(
            &config(json!({"services": [{
                "name": "HTTPBIN Service1",
                "routes": [
                    {"name": "Anything", "methods": ["GET"], "uris": ["/anything"]},
                    {"name": "Generate UUID", "methods": ["GET"], "uris": ["/uuid"]}
                ]
            }]})),
            &config(json!({"services": [{
                "id": id("HTTPBIN Service"),
                "name": "HTTPBIN Service",
                "description": "",
                "routes": [
                    {"id": id("HTTPBIN Service.Anything"), "name": "Anything", "methods": ["GET"], "uris": ["/anything"]},
                    {"id": id("HTTPBIN Service.Generate UUID"), "name": "Generate UUID", "methods": ["GET"], "uris": ["/uuid"]}
                ]
            }]})),
            &DefaultValue::new(),
        );

        let summary: Vec<_> = events
            .iter()
            .map(|e| (e.event_type(), e.resource_id.clone(), e.parent_id.clone()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (EventType::Delete, id("HTTPBIN Service.Anything"), Some(id("HTTPBIN Service"))),
                (EventType::Delete, id("HTTPBIN Service.Generate UUID"), Some(id("HTTPBIN Service"))),
                (EventType::Delete, id("HTTPBIN Service"), None),
                (EventType::Create, id("HTTPBIN Service1"), None),
                (EventType::Create, id("HTTPBIN Service1.Anything"), Some(id("HTTPBIN Service1"))),
                (EventType::Create, id("HTTPBIN Service1.Generate UUID"), Some(id("HTTPBIN Service1"))),
            ]
        );

        // Children inside a deleted parent keep their ids
        assert_eq!(
            events[2].old_value().unwrap()["routes"][0]["id"],
            json!(id("HTTPBIN Service.Anything"))
        );
        assert_eq!(
            events[0].old_value(),
            Some(&json!({"name": "Anything", "methods": ["GET"], "uris": ["/anything"]}))
        );
    }

    #[test]
    fn test_custom_id_change_is_delete_and_create() {
        assert_eq!(
            run(
                json!({"services": [
                    {"id": "custom-id-1", "name": "Test Service 1"},
                    {"name": "Test Service 2"}
                ]}),
                json!({"services": [
                    {"id": id("Test Service 1"), "name": "Test Service 1"},
                    {"id": "custom-id-2", "name": "Test Service 2"}
                ]}),
                json!({}),
            ),
            json!([
                {
                    "resource_type": "service", "type": "delete",
                    "resource_id": id("Test Service 1"), "resource_name": "Test Service 1",
                    "old_value": {"name": "Test Service 1"}
                },
                {
                    "resource_type": "service", "type": "delete",
                    "resource_id": "custom-id-2", "resource_name": "Test Service 2",
                    "old_value": {"name": "Test Service 2"}
                },
                {
                    "resource_type": "service", "type": "create",
                    "resource_id": "custom-id-1", "resource_name": "Test Service 1",
                    "new_value": {"name": "Test Service 1"}
                },
                {
                    "resource_type": "service", "type": "create",
                    "resource_id": id("Test Service 2"), "resource_name": "Test Service 2",
                    "new_value": {"name": "Test Service 2"}
                }
            ])
        );
    }

    #[test]
    fn test_consumer_credentials_lifecycle() {
        assert_eq!(
            run(
                json!({"consumers": [{
                    "username": "jack",
                    "credentials": [
                        {"name": "create", "type": "key-auth", "config": {"key": "jack"}},
                        {"name": "update", "type": "basic-auth", "config": {"username": "jack", "password": "changeme.new"}}
                    ]
                }]}),
                json!({"consumers": [{
                    "username": "jack",
                    "credentials": [
                        {"name": "update", "type": "basic-auth", "config": {"username": "jack", "password": "changeme"}},
                        {"name": "delete", "type": "jwt-auth", "config": {"key": "jack", "secret": "changeme"}}
                    ]
                }]}),
                json!({}),
            ),
            json!([
                {
                    "resource_type": "consumer_credential", "type": "delete",
                    "resource_id": id("jack.delete"), "resource_name": "delete", "parent_id": "jack",
                    "old_value": {"name": "delete", "type": "jwt-auth", "config": {"key": "jack", "secret": "changeme"}}
                },
                {
                    "resource_type": "consumer_credential", "type": "create",
                    "resource_id": id("jack.create"), "resource_name": "create", "parent_id": "jack",
                    "new_value": {"name": "create", "type": "key-auth", "config": {"key": "jack"}}
                },
                {
                    "resource_type": "consumer_credential", "type": "update",
                    "resource_id": id("jack.update"), "resource_name": "update", "parent_id": "jack",
                    "old_value": {"name": "update", "type": "basic-auth", "config": {"username": "jack", "password": "changeme"}},
                    "new_value": {"name": "update", "type": "basic-auth", "config": {"username": "jack", "password": "changeme.new"}},
                    "diff": [{"kind": "E", "path": ["config", "password"], "lhs": "changeme", "rhs": "changeme.new"}]
                }
            ])
        );
    }

    #[test]
    fn test_deleted_consumer_does_not_cascade_credentials() {
        let events = diff(
            &Configuration::new(),
            &config(json!({"consumers": [{"username": "jack", "credentials": [{"name": "key", "type": "key-auth"}]}]})),
            &DefaultValue::new(),
        );
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].resource_type, ResourceKind::Consumer);
    }

    #[test]
    fn test_consumer_group_creates_members_and_their_credentials() {
        let events = diff(
            &config(json!({"consumer_groups": [{
                "name": "gold",
                "consumers": [{"username": "jack", "credentials": [{"name": "key", "type": "key-auth"}]}]
            }]})),
            &Configuration::new(),
            &DefaultValue::new(),
        );

        let summary: Vec<_> = events
            .iter()
            .map(|e| (e.resource_type, e.resource_id.clone(), e.parent_id.clone()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (ResourceKind::ConsumerGroup, id("gold"), None),
                (ResourceKind::Consumer, String::from("jack"), Some(id("gold"))),
                (ResourceKind::ConsumerCredential, id("jack.key"), Some(String::from("jack"))),
            ]
        );
    }

    #[test]
    fn test_service_upstream_field_removed() {
        let events = run(
            json!({"services": [{"id": "service1", "name": "service1", "upstream": {"nodes": [{"host": "upstream1", "port": 80, "weight": 1}]}}]}),
            json!({"services": [{"id": "service1", "name": "service1", "upstream": {"name": "upstream1", "nodes": [{"host": "upstream1", "port": 80, "weight": 1}]}}]}),
            json!({}),
        );
        assert_eq!(events[0]["type"], json!("update"));
        assert_eq!(events[0]["resource_id"], json!("service1"));
        assert_eq!(
            events[0]["diff"],
            json!([{"kind": "D", "path": ["upstream", "name"], "lhs": "upstream1"}])
        );
    }

    #[test]
    fn test_service_with_upstreams_unchanged() {
        let services = json!({"services": [{
            "id": "service1",
            "name": "service1",
            "upstream": {"nodes": [{"host": "upstream1", "port": 80, "weight": 1}]},
            "upstreams": [{"id": "non-default", "name": "non-default"}]
        }]});
        assert_eq!(run(services.clone(), services, json!({})), json!([]));
    }

    #[test]
    fn test_create_service_with_upstreams() {
        assert_eq!(
            run(
                json!({"services": [{
                    "id": "service1",
                    "name": "service1",
                    "upstream": {"nodes": [{"host": "upstream1", "port": 80, "weight": 1}]},
                    "upstreams": [{"id": "upstream2", "name": "upstream2"}]
                }]}),
                json!({}),
                json!({}),
            ),
            json!([
                {
                    "resource_type": "service", "type": "create",
                    "resource_id": "service1", "resource_name": "service1",
                    "new_value": {
                        "name": "service1",
                        "upstream": {"nodes": [{"host": "upstream1", "port": 80, "weight": 1}]},
                        "upstreams": [{"name": "upstream2"}]
                    }
                },
                {
                    "resource_type": "upstream", "type": "create",
                    "resource_id": "upstream2", "resource_name": "upstream2", "parent_id": "service1",
                    "new_value": {"name": "upstream2"}
                }
            ])
        );
    }

    #[test]
    fn test_add_upstreams_to_existing_service() {
        assert_eq!(
            run(
                json!({"services": [{"id": "service1", "name": "service1", "upstreams": [{"name": "upstream1"}]}]}),
                json!({"services": [{"id": "service1", "name": "service1"}]}),
                json!({}),
            ),
            json!([{
                "resource_type": "upstream", "type": "create",
                "resource_id": id("service1.upstream1"), "resource_name": "upstream1", "parent_id": "service1",
                "new_value": {"name": "upstream1"}
            }])
        );
    }

    #[test]
    fn test_replace_upstreams() {
        assert_eq!(
            run(
                json!({"services": [{"id": "service1", "name": "service1", "upstreams": [{"name": "upstream1"}]}]}),
                json!({"services": [{"id": "service1", "name": "service1", "upstreams": [{"id": "upstream2", "name": "upstream2"}]}]}),
                json!({}),
            ),
            json!([
                {
                    "resource_type": "upstream", "type": "delete",
                    "resource_id": "upstream2", "resource_name": "upstream2", "parent_id": "service1",
                    "old_value": {"name": "upstream2"}
                },
                {
                    "resource_type": "upstream", "type": "create",
                    "resource_id": id("service1.upstream1"), "resource_name": "upstream1", "parent_id": "service1",
                    "new_value": {"name": "upstream1"}
                }
            ])
        );
    }

    #[test]
    fn test_update_and_delete_upstreams() {
        let local_upstream = json!({"name": "upstream1", "nodes": [{"host": "upstream1", "port": 80, "weight": 1}]});
        let events = run(
            json!({"services": [{"id": "service1", "name": "service1", "upstreams": [local_upstream.clone()]}]}),
            json!({"services": [{"id": "service1", "name": "service1", "upstreams": [{
                "id": id("service1.upstream1"),
                "name": "upstream1",
                "nodes": [{"host": "1.1.1.1", "port": 80, "weight": 1}]
            }]}]}),
            json!({}),
        );
        assert_eq!(
            events,
            json!([{
                "resource_type": "upstream", "type": "update",
                "resource_id": id("service1.upstream1"), "resource_name": "upstream1", "parent_id": "service1",
                "old_value": {"name": "upstream1", "nodes": [{"host": "1.1.1.1", "port": 80, "weight": 1}]},
                "new_value": local_upstream,
                "diff": [{"kind": "E", "path": ["nodes", 0, "host"], "lhs": "1.1.1.1", "rhs": "upstream1"}]
            }])
        );

        let events = run(
            json!({"services": [{"id": "service1", "name": "service1"}]}),
            json!({"services": [{"id": "service1", "name": "service1", "upstreams": [{"id": id("service1.upstream1"), "name": "upstream1"}]}]}),
            json!({}),
        );
        assert_eq!(
            events,
            json!([{
                "resource_type": "upstream", "type": "delete",
                "resource_id": id("service1.upstream1"), "resource_name": "upstream1", "parent_id": "service1",
                "old_value": {"name": "upstream1"}
            }])
        );
    }

    #[test]
    fn test_keyed_kinds_use_map_key() {
        let events = diff(
            &config(json!({
                "global_rules": {"prometheus": {"prefer_name": true}},
                "plugin_metadata": {"http-logger": {"log_format": {"host": "$host"}}}
            })),
            &config(json!({"global_rules": {"prometheus": {"prefer_name": false}, "cors": {}}})),
            &DefaultValue::new(),
        );

        let summary: Vec<_> = events
            .iter()
            .map(|e| (e.event_type(), e.resource_type, e.resource_id.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (EventType::Delete, ResourceKind::GlobalRule, "cors"),
                (EventType::Update, ResourceKind::GlobalRule, "prometheus"),
                (EventType::Create, ResourceKind::PluginMetadata, "http-logger"),
            ]
        );
    }

    #[test]
    fn test_full_create_and_delete_are_exhaustive() {
        let local = config(json!({
            "services": [{
                "name": "svc",
                "routes": [{"name": "r1", "uris": ["/1"]}, {"name": "r2", "uris": ["/2"]}],
                "upstreams": [{"name": "u1"}]
            }],
            "ssls": [{"snis": ["a.example.com"], "certificates": [{"certificate": "c", "key": "k"}]}],
            "consumers": [{"username": "jack", "credentials": [{"name": "key", "type": "key-auth"}]}],
            "global_rules": {"prometheus": {}}
        }));

        let created = diff(&local, &Configuration::new(), &DefaultValue::new());
        assert_eq!(created.len(), local.resource_count());
        assert!(created.iter().all(|e| e.event_type() == EventType::Create));

        let deleted = diff(&Configuration::new(), &local, &DefaultValue::new());
        assert!(deleted.iter().all(|e| e.event_type() == EventType::Delete));
        // Credentials of a deleted consumer are not cascaded
        assert_eq!(deleted.len(), local.resource_count() - 1);

        assert!(diff(&local, &local, &DefaultValue::new()).is_empty());
    }

    #[test]
    fn test_transaction_id_does_not_change_result() {
        let local = config(json!({"consumers": [{"username": "alice"}]}));
        let defaults = DefaultValue::new();
        let fixed = Uuid::nil();

        let engine = DiffEngine::new(&defaults).with_transaction_id(fixed);
        assert_eq!(engine.transaction_id(), fixed);
        assert_eq!(
            engine.diff(&local, &Configuration::new()),
            DiffEngine::new(&defaults).diff(&local, &Configuration::new())
        );
    }
}
