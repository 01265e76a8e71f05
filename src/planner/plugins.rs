//! Plugin map comparison.
//!
//! Plugins are compared apart from the rest of a resource so that each one
//! can be reconciled against its own default table. The outcome only
//! decides whether the owning resource's diff keeps the `plugins` field.

use serde_json::{Map, Value};
use tracing::debug;

use crate::config::DefaultValue;

use super::defaults::merge_defaults;
use super::structural::diff_values;

/// Compares desired and observed plugin maps.
///
/// Returns whether the plugin set changed, together with the desired plugins
/// after each one was merged with its defaults.
#[must_use]
pub fn diff_plugins(
    desired: &Map<String, Value>,
    observed: &Map<String, Value>,
    defaults: &DefaultValue,
) -> (bool, Map<String, Value>) {
    if desired.is_empty() && observed.is_empty() {
        return (false, desired.clone());
    }

    let merged: Map<String, Value> = desired
        .iter()
        .map(|(name, config)| {
            let config = defaults
                .plugin(name)
                .map_or_else(|| config.clone(), |d| merge_defaults(config, d));
            (name.clone(), config)
        })
        .collect();

    let changed = any_plugin_differs(&merged, observed) || any_plugin_differs(observed, &merged);
    debug!(
        "Diff plugins: {} desired, {} observed, changed={changed}",
        merged.len(),
        observed.len()
    );

    (changed, merged)
}

/// Checks every plugin of `left` against `right`; a plugin missing on one
/// side counts as a change.
fn any_plugin_differs(left: &Map<String, Value>, right: &Map<String, Value>) -> bool {
    left.iter().any(|(name, config)| {
        right
            .get(name)
            .is_none_or(|other| !diff_values(config, other).is_empty())
    })
}
