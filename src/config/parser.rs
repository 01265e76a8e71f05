//! Loading declarative configuration files.
//!
//! This module reads YAML or JSON documents, substitutes environment
//! variables, merges several files into one [`Configuration`] and applies
//! label and resource-type filters.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::{ConfigError, GatesyncError, Result};
use crate::planner::ResourceKind;

use super::model::{Configuration, Resource};

/// Matches `${NAME}` and its escaped form `\${NAME}`.
static ENV_VAR_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(\\)?\$\{([A-Za-z_][A-Za-z0-9_]*)\}").ok());

/// Format of a declarative file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    /// YAML document.
    Yaml,
    /// JSON document.
    Json,
}

impl FileFormat {
    /// Picks the format from a file extension; anything but `.json` is YAML.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Yaml,
        }
    }
}

/// Loader for declarative configuration files.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    /// Base path for resolving the `.env` file.
    base_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Creates a new configuration loader.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the directory the `.env` file is looked up in.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads and merges several declarative files, in order.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be read or parsed, or if a resource
    /// is declared more than once across the files.
    pub fn load_files<P: AsRef<Path>>(&self, paths: &[P]) -> Result<Configuration> {
        let mut merged = Configuration::new();
        for path in paths {
            let path = path.as_ref();
            let config = self.load_file(path)?;
            merge_into(&mut merged, config, &path.display().to_string())?;
        }

        info!(
            "Loaded {} resources from {} file(s)",
            merged.resource_count(),
            paths.len()
        );
        Ok(merged)
    }

    /// Loads a single declarative file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<Configuration> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }
            .into());
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::parse(
                format!("Failed to read file: {e}"),
                Some(path.display().to_string()),
            )
        })?;

        self.parse_str(&content, FileFormat::from_path(path), Some(path))
    }

    /// Parses a configuration document after environment substitution.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is invalid or holds an unknown
    /// top-level key.
    pub fn parse_str(
        &self,
        content: &str,
        format: FileFormat,
        source: Option<&Path>,
    ) -> Result<Configuration> {
        debug!("Parsing {format:?} configuration");
        let content = substitute_env(content);
        let location = || source.map(|p| p.display().to_string());

        // An empty YAML document is an empty configuration
        if format == FileFormat::Yaml && content.trim().is_empty() {
            return Ok(Configuration::new());
        }

        let config = match format {
            FileFormat::Yaml => serde_yaml::from_str(&content)
                .map_err(|e| ConfigError::parse(format!("YAML parse error: {e}"), location()))?,
            FileFormat::Json => serde_json::from_str(&content)
                .map_err(|e| ConfigError::parse(format!("JSON parse error: {e}"), location()))?,
        };

        Ok(config)
    }

    /// Loads the `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the `.env` file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                ConfigError::parse(
                    format!("Failed to load .env file: {e}"),
                    Some(env_path.display().to_string()),
                )
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }
}

/// Replaces `${NAME}` with the value of environment variable `NAME`.
///
/// Unset variables become the empty string. `\${NAME}` is left as the
/// literal `${NAME}`.
#[must_use]
pub fn substitute_env(content: &str) -> String {
    let Some(pattern) = ENV_VAR_PATTERN.as_ref() else {
        return content.to_string();
    };
    pattern
        .replace_all(content, |caps: &Captures<'_>| {
            let name = &caps[2];
            if caps.get(1).is_some() {
                format!("${{{name}}}")
            } else {
                std::env::var(name).unwrap_or_default()
            }
        })
        .into_owned()
}

/// Appends `source` to `target`, rejecting resources declared twice.
///
/// # Errors
///
/// Returns [`ConfigError::DuplicateResource`] naming `file` when a name is
/// already present in the same collection.
pub fn merge_into(target: &mut Configuration, mut source: Configuration, file: &str) -> Result<()> {
    for kind in ResourceKind::ALL {
        let desc = kind.descriptor();

        if let Some(incoming) = source.keyed_mut(kind) {
            let incoming = std::mem::take(incoming);
            let Some(existing) = target.keyed_mut(kind) else {
                continue;
            };
            for (key, value) in incoming {
                if existing.contains_key(&key) {
                    return Err(duplicate(kind, &key, file));
                }
                existing.insert(key, value);
            }
            continue;
        }

        let Some(incoming) = source.list_mut(kind).map(std::mem::take) else {
            continue;
        };
        let Some(existing) = target.list_mut(kind) else {
            continue;
        };

        let mut seen: HashSet<String> = existing.iter().map(|r| desc.resource_name(r)).collect();
        for resource in incoming {
            let name = desc.resource_name(&resource);
            if !seen.insert(name.clone()) {
                return Err(duplicate(kind, &name, file));
            }
            existing.push(resource);
        }
    }

    Ok(())
}

fn duplicate(kind: ResourceKind, name: &str, file: &str) -> GatesyncError {
    ConfigError::DuplicateResource {
        resource_type: kind.to_string(),
        name: name.to_string(),
        file: file.to_string(),
    }
    .into()
}

/// A set of `key=value` label requirements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    labels: BTreeMap<String, String>,
}

impl LabelSelector {
    /// Parses `key=value` entries.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidLabelSelector`] for an entry without
    /// `=` or with an empty key.
    pub fn parse<S: AsRef<str>>(entries: &[S]) -> Result<Self> {
        let mut labels = BTreeMap::new();
        for entry in entries {
            let entry = entry.as_ref();
            match entry.split_once('=') {
                Some((key, value)) if !key.trim().is_empty() => {
                    labels.insert(key.trim().to_string(), value.trim().to_string());
                }
                _ => {
                    return Err(ConfigError::InvalidLabelSelector {
                        selector: entry.to_string(),
                    }
                    .into());
                }
            }
        }
        Ok(Self { labels })
    }

    /// Returns true if the selector has no requirements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Returns true if the resource carries every selector label.
    #[must_use]
    pub fn matches(&self, resource: &Resource) -> bool {
        let labels = resource.get("labels").and_then(Value::as_object);
        self.labels.iter().all(|(key, value)| {
            labels
                .and_then(|l| l.get(key))
                .and_then(Value::as_str)
                .is_some_and(|v| v == value)
        })
    }
}

impl std::fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let pairs: Vec<String> = self.labels.iter().map(|(k, v)| format!("{k}={v}")).collect();
        write!(f, "{}", pairs.join(","))
    }
}

/// Adds the selector's labels to every list resource, nested ones included.
///
/// Global rules and plugin metadata carry no labels and are left alone.
pub fn fill_labels(config: &mut Configuration, selector: &LabelSelector) {
    if selector.is_empty() {
        return;
    }

    for kind in ResourceKind::ALL {
        if let Some(list) = config.list_mut(kind) {
            for resource in list.iter_mut() {
                fill_resource_labels(kind, resource, selector);
            }
        }
    }
}

fn fill_resource_labels(kind: ResourceKind, resource: &mut Resource, selector: &LabelSelector) {
    let labels = resource
        .entry("labels")
        .or_insert_with(|| Value::Object(Map::new()));
    if !labels.is_object() {
        *labels = Value::Object(Map::new());
    }
    if let Value::Object(labels) = labels {
        for (key, value) in &selector.labels {
            labels.insert(key.clone(), Value::String(value.clone()));
        }
    }

    for child in kind.descriptor().children {
        if let Some(Value::Array(items)) = resource.get_mut(child.field) {
            for item in items.iter_mut().filter_map(Value::as_object_mut) {
                fill_resource_labels(child.kind, item, selector);
            }
        }
    }
}

/// Keeps only the list resources whose labels match the selector.
///
/// Nested children are filtered the same way. Global rules and plugin
/// metadata are left alone.
pub fn filter_by_labels(config: &mut Configuration, selector: &LabelSelector) {
    if selector.is_empty() {
        return;
    }

    for kind in ResourceKind::ALL {
        if let Some(list) = config.list_mut(kind) {
            list.retain(|resource| selector.matches(resource));
            for resource in list.iter_mut() {
                filter_children_by_labels(kind, resource, selector);
            }
        }
    }
}

fn filter_children_by_labels(kind: ResourceKind, resource: &mut Resource, selector: &LabelSelector) {
    for child in kind.descriptor().children {
        if let Some(Value::Array(items)) = resource.get_mut(child.field) {
            items.retain(|item| item.as_object().is_some_and(|r| selector.matches(r)));
            for item in items.iter_mut().filter_map(Value::as_object_mut) {
                filter_children_by_labels(child.kind, item, selector);
            }
        }
    }
}

/// Clears the collections whose kind is not selected.
///
/// A kind is selected when `include` is empty or names it, and `exclude`
/// does not name it. Nested children of unselected kinds are removed from
/// their parents as well.
///
/// # Errors
///
/// Returns [`ConfigError::UnknownResourceType`] for an unknown kind name.
pub fn filter_resource_types<S: AsRef<str>>(
    config: &mut Configuration,
    include: &[S],
    exclude: &[S],
) -> Result<()> {
    let include = parse_kinds(include)?;
    let exclude = parse_kinds(exclude)?;
    if include.is_empty() && exclude.is_empty() {
        return Ok(());
    }

    let selected =
        |kind: ResourceKind| (include.is_empty() || include.contains(&kind)) && !exclude.contains(&kind);

    for kind in ResourceKind::ALL {
        if !selected(kind) {
            debug!("Filtering out resource type: {kind}");
            if let Some(list) = config.list_mut(kind) {
                list.clear();
            }
            if let Some(keyed) = config.keyed_mut(kind) {
                keyed.clear();
            }
            continue;
        }

        if let Some(list) = config.list_mut(kind) {
            for resource in list.iter_mut() {
                remove_unselected_children(kind, resource, &selected);
            }
        }
    }

    Ok(())
}

fn remove_unselected_children(
    kind: ResourceKind,
    resource: &mut Resource,
    selected: &impl Fn(ResourceKind) -> bool,
) {
    for child in kind.descriptor().children {
        if !selected(child.kind) {
            resource.remove(child.field);
            continue;
        }
        if let Some(Value::Array(items)) = resource.get_mut(child.field) {
            for item in items.iter_mut().filter_map(Value::as_object_mut) {
                remove_unselected_children(child.kind, item, selected);
            }
        }
    }
}

fn parse_kinds<S: AsRef<str>>(names: &[S]) -> Result<Vec<ResourceKind>> {
    names
        .iter()
        .map(|name| {
            ResourceKind::from_str(name.as_ref()).map_err(|_| {
                ConfigError::UnknownResourceType {
                    name: name.as_ref().to_string(),
                }
                .into()
            })
        })
        .collect()
}
