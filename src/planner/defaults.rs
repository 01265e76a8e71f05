//! Default-value reconciliation.
//!
//! Gateways fill schema defaults into every stored resource. Merging the
//! backend's default table into the desired side before comparing keeps
//! those injected fields from showing up as changes.

use serde_json::Value;

use crate::config::{Resource, STREAM_SERVICE_BUCKET};

use super::resource::ResourceKind;

/// Merges a default-value tree into a resource, returning a new value.
///
/// Rules, key by key over `defaults`:
/// - a key the resource lacks (or holds as `null`) receives the default,
///   unless the default is an object;
/// - two objects merge recursively;
/// - an array default applies its first element to every item of the
///   resource's array;
/// - anything else keeps the resource's explicit value.
#[must_use]
pub fn merge_defaults(resource: &Value, defaults: &Value) -> Value {
    match (resource, defaults) {
        (Value::Object(resource), Value::Object(_)) => {
            Value::Object(merge_into_resource(resource, defaults))
        }
        _ => resource.clone(),
    }
}

/// Object form of [`merge_defaults`].
#[must_use]
pub fn merge_into_resource(resource: &Resource, defaults: &Value) -> Resource {
    let mut merged = resource.clone();
    let Some(defaults) = defaults.as_object() else {
        return merged;
    };

    for (key, default) in defaults {
        match merged.get_mut(key) {
            None | Some(Value::Null) => {
                if is_injectable(default) {
                    merged.insert(key.clone(), default.clone());
                }
            }
            Some(current @ Value::Object(_)) if default.is_object() => {
                *current = merge_defaults(current, default);
            }
            Some(Value::Array(items)) => {
                if let Some(template) = item_template(default) {
                    for item in items.iter_mut() {
                        *item = merge_defaults(item, template);
                    }
                }
            }
            Some(_) => {}
        }
    }

    merged
}

/// Returns true if a default may be copied into a resource that omits it.
///
/// Arrays are copied whole, template items included.
fn is_injectable(default: &Value) -> bool {
    !default.is_object()
}

/// Returns the per-item default of an array default, if it has a usable one.
fn item_template(default: &Value) -> Option<&Value> {
    default
        .as_array()
        .and_then(|items| items.first())
        .filter(|first| is_truthy(first))
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Resolves the default-value bucket for a desired resource.
///
/// Services carrying `stream_routes` use the stream service bucket; every
/// other resource uses its own kind name.
#[must_use]
pub fn default_bucket(kind: ResourceKind, desired: &Resource) -> &'static str {
    if kind == ResourceKind::Service && desired.contains_key("stream_routes") {
        STREAM_SERVICE_BUCKET
    } else {
        kind.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_scalar_is_filled() {
        let merged = merge_defaults(&json!({"name": "a"}), &json!({"description": "", "enabled": true}));
        assert_eq!(merged, json!({"name": "a", "description": "", "enabled": true}));
    }

    #[test]
    fn test_null_counts_as_missing() {
        let merged = merge_defaults(&json!({"timeout": null}), &json!({"timeout": 60}));
        assert_eq!(merged, json!({"timeout": 60}));
    }

    #[test]
    fn test_object_default_not_injected_wholesale() {
        let merged = merge_defaults(&json!({"name": "a"}), &json!({"checks": {"active": {"timeout": 1}}}));
        assert_eq!(merged, json!({"name": "a"}));
    }

    #[test]
    fn test_nested_objects_merge_leaves() {
        let merged = merge_defaults(
            &json!({"upstream": {"nodes": []}}),
            &json!({"upstream": {"scheme": "http", "keepalive_pool": {"size": 320}}}),
        );
        assert_eq!(merged, json!({"upstream": {"nodes": [], "scheme": "http"}}));
    }

    #[test]
    fn test_array_template_applies_per_item() {
        let merged = merge_defaults(
            &json!({"nodes": [{"host": "a", "port": 80}, {"host": "b", "priority": 5}]}),
            &json!({"nodes": [{"priority": 0}]}),
        );
        assert_eq!(
            merged,
            json!({"nodes": [{"host": "a", "port": 80, "priority": 0}, {"host": "b", "priority": 5}]})
        );
    }

    #[test]
    fn test_object_array_injected_when_missing() {
        let merged = merge_defaults(&json!({"name": "u"}), &json!({"nodes": [{"priority": 0}]}));
        assert_eq!(merged, json!({"name": "u", "nodes": [{"priority": 0}]}));
    }

    #[test]
    fn test_scalar_array_injected_when_missing() {
        let merged = merge_defaults(&json!({}), &json!({"methods": ["GET"]}));
        assert_eq!(merged, json!({"methods": ["GET"]}));
    }

    #[test]
    fn test_explicit_value_never_overwritten() {
        let merged = merge_defaults(&json!({"strip_path_prefix": false}), &json!({"strip_path_prefix": true}));
        assert_eq!(merged, json!({"strip_path_prefix": false}));
    }

    #[test]
    fn test_inputs_untouched() {
        let resource = json!({"a": {"b": 1}});
        let defaults = json!({"a": {"c": 2}});
        let _ = merge_defaults(&resource, &defaults);
        assert_eq!(resource, json!({"a": {"b": 1}}));
        assert_eq!(defaults, json!({"a": {"c": 2}}));
    }

    #[test]
    fn test_stream_service_bucket() {
        let http = json!({"name": "http", "routes": []});
        let stream = json!({"name": "tcp", "stream_routes": []});

        assert_eq!(default_bucket(ResourceKind::Service, http.as_object().unwrap()), "service");
        assert_eq!(default_bucket(ResourceKind::Service, stream.as_object().unwrap()), "stream_service");
        assert_eq!(default_bucket(ResourceKind::Route, stream.as_object().unwrap()), "route");
    }
}
