//! File-based backend.
//!
//! This backend keeps the gateway configuration in a local JSON file and
//! applies events to it the way a gateway admin API would. It is meant for
//! offline planning, demos and tests.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

use crate::config::{Configuration, DefaultValue, Resource};
use crate::error::{BackendError, Result};
use crate::planner::{Event, EventChange, Naming, ResourceKind, default_bucket, merge_defaults, merge_into_resource};

use super::lock::{LockInfo, generate_holder_id};
use super::store::Backend;
use super::types::{STATE_VERSION, StoredState, SyncOptions, SyncResult};

/// Default backend directory name.
pub const DEFAULT_BACKEND_DIR: &str = ".gatesync";

/// State file name.
const STATE_FILE: &str = "state.json";

/// Lock file name.
const LOCK_FILE: &str = "state.lock";

/// Backend storing the gateway configuration in a JSON file.
#[derive(Debug)]
pub struct FileBackend {
    /// Base directory for backend files.
    base_dir: PathBuf,
    /// Path to the state file.
    state_path: PathBuf,
    /// Path to the lock file.
    lock_path: PathBuf,
}

impl FileBackend {
    /// Creates a backend rooted at `base_dir`.
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        let state_path = base_dir.join(STATE_FILE);
        let lock_path = base_dir.join(LOCK_FILE);

        Self {
            base_dir,
            state_path,
            lock_path,
        }
    }

    /// Returns the path of the state file.
    #[must_use]
    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    /// Loads the stored state, or an empty one if none was written yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the state file is unreadable, malformed, or was
    /// written by an incompatible version.
    pub async fn load_state(&self) -> Result<StoredState> {
        if !self.state_path.exists() {
            debug!("State file does not exist: {}", self.state_path.display());
            return Ok(StoredState::new());
        }

        let content = fs::read_to_string(&self.state_path)
            .await
            .map_err(|e| BackendError::corrupted(format!("Failed to read state file: {e}")))?;

        let state: StoredState = serde_json::from_str(&content)
            .map_err(|e| BackendError::corrupted(format!("Failed to parse state file: {e}")))?;

        if state.version != STATE_VERSION {
            return Err(BackendError::VersionMismatch {
                expected: STATE_VERSION.to_string(),
                found: state.version,
            }
            .into());
        }

        Ok(state)
    }

    /// Persists the state.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be serialized or written.
    pub async fn save_state(&self, state: &StoredState) -> Result<()> {
        let content = serde_json::to_string_pretty(state)
            .map_err(|e| BackendError::serialization(format!("Failed to serialize state: {e}")))?;

        self.write_atomic(&self.state_path, &content).await?;
        debug!("State saved to {}", self.state_path.display());
        Ok(())
    }

    /// Ensures the backend directory exists.
    async fn ensure_dir(&self) -> Result<()> {
        if !self.base_dir.exists() {
            debug!("Creating backend directory: {}", self.base_dir.display());
            fs::create_dir_all(&self.base_dir)
                .await
                .map_err(|e| BackendError::write(format!("Failed to create backend directory: {e}")))?;
        }
        Ok(())
    }

    /// Writes a file through a temporary sibling and an atomic rename.
    async fn write_atomic(&self, path: &Path, content: &str) -> Result<()> {
        self.ensure_dir().await?;

        let temp_path = path.with_extension("tmp");

        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| BackendError::write(format!("Failed to create {}: {e}", temp_path.display())))?;

        file.write_all(content.as_bytes())
            .await
            .map_err(|e| BackendError::write(format!("Failed to write {}: {e}", temp_path.display())))?;

        file.sync_all()
            .await
            .map_err(|e| BackendError::write(format!("Failed to sync {}: {e}", temp_path.display())))?;

        fs::rename(&temp_path, path)
            .await
            .map_err(|e| BackendError::write(format!("Failed to rename {}: {e}", temp_path.display())))?;

        Ok(())
    }

    /// Reads the lock file if it exists.
    async fn read_lock_file(&self) -> Result<Option<LockInfo>> {
        if !self.lock_path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.lock_path)
            .await
            .map_err(|e| BackendError::corrupted(format!("Failed to read lock file: {e}")))?;

        let lock_info = serde_json::from_str(&content)
            .map_err(|e| BackendError::corrupted(format!("Failed to parse lock file: {e}")))?;

        Ok(Some(lock_info))
    }

    /// Deletes the lock file.
    async fn delete_lock_file(&self) -> Result<()> {
        if self.lock_path.exists() {
            fs::remove_file(&self.lock_path).await.map_err(|e| BackendError::LockFailed {
                message: format!("Failed to delete lock file: {e}"),
            })?;
        }
        Ok(())
    }
}

#[async_trait]
impl Backend for FileBackend {
    async fn dump(&self) -> Result<Configuration> {
        info!("Dumping configuration from {}", self.state_path.display());
        Ok(self.load_state().await?.configuration)
    }

    async fn default_value(&self) -> Result<DefaultValue> {
        Ok(self.load_state().await?.default_value)
    }

    async fn set_default_value(&self, defaults: DefaultValue) -> Result<()> {
        let mut state = self.load_state().await?;
        state.default_value = defaults;
        state.touch();
        self.save_state(&state).await
    }

    async fn sync(&self, events: &[Event], options: SyncOptions) -> Result<Vec<SyncResult>> {
        let mut state = self.load_state().await?;
        let mut results = Vec::with_capacity(events.len());

        for event in events {
            match apply_event(&mut state.configuration, &state.default_value, event) {
                Ok(()) => {
                    debug!("Applied {event}");
                    results.push(SyncResult::applied(event.clone()));
                }
                Err(reason) => {
                    error!("Failed to apply {event}: {reason}");
                    results.push(SyncResult::failed(event.clone(), reason));
                    if options.exit_on_failure {
                        warn!("Stopping sync after the first failure");
                        break;
                    }
                }
            }
        }

        // Applied events are real even when a later one failed
        state.touch();
        self.save_state(&state).await?;

        let failed = results.iter().filter(|r| !r.success).count();
        info!("Synced {} event(s), {failed} failed", results.len());
        Ok(results)
    }

    async fn lock(&self, holder: &str) -> Result<LockInfo> {
        if let Some(existing) = self.read_lock_file().await? {
            if !existing.is_expired() {
                return Err(BackendError::LockedByOther {
                    holder: existing.holder,
                    since: existing.acquired_at.to_rfc3339(),
                }
                .into());
            }
            debug!("Expired lock held by {} found, taking over", existing.holder);
        }

        let holder_id = if holder.is_empty() {
            generate_holder_id()
        } else {
            holder.to_string()
        };

        let lock_info = LockInfo::new(&holder_id);
        let content = serde_json::to_string_pretty(&lock_info)
            .map_err(|e| BackendError::serialization(format!("Failed to serialize lock: {e}")))?;
        self.write_atomic(&self.lock_path, &content).await?;

        info!(
            "Acquired backend lock: {} (expires in {}s)",
            lock_info.lock_id,
            lock_info.remaining_secs()
        );
        Ok(lock_info)
    }

    async fn unlock(&self, lock_id: &str) -> Result<()> {
        if let Some(existing) = self.read_lock_file().await? {
            if existing.lock_id == lock_id {
                self.delete_lock_file().await?;
                info!("Released backend lock: {lock_id}");
            } else {
                debug!(
                    "Lock ID mismatch: expected {lock_id}, found {}",
                    existing.lock_id
                );
            }
        }
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "file"
    }
}

/// Applies one event to a stored configuration.
///
/// Returns the reason when the event's target or parent is missing.
fn apply_event(config: &mut Configuration, defaults: &DefaultValue, event: &Event) -> std::result::Result<(), String> {
    let kind = event.resource_type;

    if let Some(parent_id) = &event.parent_id {
        return apply_child(config, defaults, event, parent_id);
    }

    if let Some(map) = config.keyed_mut(kind) {
        return apply_keyed(map, event);
    }

    let list = config
        .list_mut(kind)
        .ok_or_else(|| format!("{kind} has no collection"))?;
    apply_to_list(list, defaults, event, None)
}

/// Applies an event to a resource nested inside its parent.
fn apply_child(
    config: &mut Configuration,
    defaults: &DefaultValue,
    event: &Event,
    parent_id: &str,
) -> std::result::Result<(), String> {
    let kind = event.resource_type;
    let parent_kind = parent_kind_of(kind).ok_or_else(|| format!("{kind} cannot have a parent"))?;
    let parent_desc = parent_kind.descriptor();
    let field = parent_desc
        .children
        .iter()
        .find(|child| child.kind == kind)
        .map(|child| child.field)
        .ok_or_else(|| format!("{parent_kind} does not nest {kind}"))?;

    let parent = find_parent(config, parent_kind, parent_id)
        .ok_or_else(|| format!("parent {parent_kind} with id {parent_id} was not found"))?;

    let parent_name = parent_desc.resource_name(parent);
    let qualifier = parent_desc.qualifies_children.then_some(parent_name.as_str());

    let mut children: Vec<Resource> = match parent.remove(field) {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    };

    let outcome = apply_to_list(&mut children, defaults, event, qualifier);

    if !children.is_empty() {
        parent.insert(
            field.to_string(),
            Value::Array(children.into_iter().map(Value::Object).collect()),
        );
    }
    outcome
}

/// Finds a parent resource by id.
///
/// The top-level collection is searched first, then the same kind nested
/// one level down, such as consumers inside consumer groups.
fn find_parent<'c>(
    config: &'c mut Configuration,
    parent_kind: ResourceKind,
    parent_id: &str,
) -> Option<&'c mut Resource> {
    let desc = parent_kind.descriptor();
    let is_parent = |p: &Resource| desc.resolve_id(p, &desc.resource_name(p), None) == parent_id;

    if let Some(index) = config.list(parent_kind).and_then(|list| list.iter().position(&is_parent)) {
        return config.list_mut(parent_kind).map(|list| &mut list[index]);
    }

    let outer = parent_kind_of(parent_kind)?;
    let field = outer
        .descriptor()
        .children
        .iter()
        .find(|child| child.kind == parent_kind)?
        .field;

    config
        .list_mut(outer)?
        .iter_mut()
        .filter_map(|group| group.get_mut(field).and_then(Value::as_array_mut))
        .flatten()
        .filter_map(Value::as_object_mut)
        .find(|p| is_parent(p))
}

/// Applies an event to a keyed collection.
fn apply_keyed(map: &mut BTreeMap<String, Resource>, event: &Event) -> std::result::Result<(), String> {
    let key = &event.resource_id;
    match &event.change {
        EventChange::Create { new_value } => {
            if map.contains_key(key) {
                return Err(already_exists(event));
            }
            map.insert(key.clone(), as_resource(new_value)?);
        }
        EventChange::Update { new_value, .. } => {
            let slot = map.get_mut(key).ok_or_else(|| not_found(event))?;
            *slot = as_resource(new_value)?;
        }
        EventChange::Delete { .. } => {
            map.remove(key).ok_or_else(|| not_found(event))?;
        }
    }
    Ok(())
}

/// Applies an event to a list collection.
fn apply_to_list(
    list: &mut Vec<Resource>,
    defaults: &DefaultValue,
    event: &Event,
    parent_name: Option<&str>,
) -> std::result::Result<(), String> {
    let kind = event.resource_type;
    let desc = kind.descriptor();
    let position = list
        .iter()
        .position(|r| desc.resolve_id(r, &desc.resource_name(r), parent_name) == event.resource_id);

    match &event.change {
        EventChange::Create { new_value } => {
            if position.is_some() {
                return Err(already_exists(event));
            }
            list.push(stored_resource(kind, new_value, &event.resource_id, defaults)?);
        }
        EventChange::Update { new_value, .. } => {
            let index = position.ok_or_else(|| not_found(event))?;
            let mut updated = stored_resource(kind, new_value, &event.resource_id, defaults)?;
            for child in desc.children {
                if let Some(existing) = list[index].remove(child.field) {
                    updated.insert(child.field.to_string(), existing);
                }
            }
            list[index] = updated;
        }
        EventChange::Delete { .. } => {
            let index = position.ok_or_else(|| not_found(event))?;
            list.remove(index);
        }
    }
    Ok(())
}

/// Builds the stored form of a resource the way a gateway would keep it.
///
/// Children are dropped since they arrive as their own events, the
/// identifier is recorded, and the gateway's defaults are filled in.
fn stored_resource(
    kind: ResourceKind,
    value: &Value,
    id: &str,
    defaults: &DefaultValue,
) -> std::result::Result<Resource, String> {
    let desc = kind.descriptor();
    let mut resource = as_resource(value)?;

    // Stream services are only recognizable by their children
    let bucket = default_bucket(kind, &resource);

    for child in desc.children {
        resource.remove(child.field);
    }

    if !matches!(desc.naming, Naming::Username | Naming::MapKey) {
        resource.insert(String::from("id"), Value::String(id.to_string()));
    }

    if let Some(core) = defaults.core_for(bucket) {
        resource = merge_into_resource(&resource, core);
    }

    if let Some(Value::Object(plugins)) = resource.get_mut("plugins") {
        for (name, config) in plugins.iter_mut() {
            if let Some(plugin_defaults) = defaults.plugin(name) {
                *config = merge_defaults(config, plugin_defaults);
            }
        }
    }

    Ok(resource)
}

/// Returns the kind that nests `kind`, if any.
const fn parent_kind_of(kind: ResourceKind) -> Option<ResourceKind> {
    match kind {
        ResourceKind::Route | ResourceKind::StreamRoute | ResourceKind::Upstream => Some(ResourceKind::Service),
        ResourceKind::ConsumerCredential => Some(ResourceKind::Consumer),
        ResourceKind::Consumer => Some(ResourceKind::ConsumerGroup),
        _ => None,
    }
}

fn as_resource(value: &Value) -> std::result::Result<Resource, String> {
    value
        .as_object()
        .cloned()
        .ok_or_else(|| String::from("event value is not an object"))
}

fn not_found(event: &Event) -> String {
    format!(
        "{} \"{}\" with id {} was not found",
        event.resource_type, event.resource_name, event.resource_id
    )
}

fn already_exists(event: &Event) -> String {
    format!(
        "{} \"{}\" with id {} already exists",
        event.resource_type, event.resource_name, event.resource_id
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatesyncError;
    use crate::planner::diff;
    use serde_json::json;
    use tempfile::TempDir;

    fn create_test_backend() -> (FileBackend, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let backend = FileBackend::new(temp_dir.path());
        (backend, temp_dir)
    }

    fn config(value: Value) -> Configuration {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_fresh_backend_is_empty() {
        let (backend, _temp) = create_test_backend();

        assert!(backend.dump().await.unwrap().is_empty());
        assert!(backend.default_value().await.unwrap().is_empty());
        assert!(!backend.state_path().exists());
    }

    #[tokio::test]
    async fn test_sync_then_diff_converges() {
        let (backend, _temp) = create_test_backend();
        let defaults: DefaultValue = serde_json::from_value(json!({
            "core": {
                "route": {"priority": 0, "status": 1},
                "service": {"scheme": "http"},
                "stream_service": {"scheme": "tcp"}
            },
            "plugins": {"key-auth": {"hide_credentials": false}}
        }))
        .unwrap();
        backend.set_default_value(defaults.clone()).await.unwrap();

        let desired = config(json!({
            "services": [{
                "name": "httpbin",
                "upstream": {"nodes": [{"host": "httpbin.org", "port": 80, "weight": 1}]},
                "routes": [{"name": "anything", "uris": ["/anything"], "plugins": {"key-auth": {}}}]
            }, {
                "name": "pg",
                "stream_routes": [{"name": "s1", "server_port": 5432}]
            }],
            "consumers": [{"username": "jack", "credentials": [{"name": "key", "type": "key-auth", "config": {"key": "k"}}]}],
            "global_rules": {"prometheus": {"plugins": {"prometheus": {}}}}
        }));

        let events = diff(&desired, &backend.dump().await.unwrap(), &defaults);
        assert_eq!(events.len(), 7);

        let results = backend.sync(&events, SyncOptions::default()).await.unwrap();
        assert!(results.iter().all(|r| r.success));

        let observed = backend.dump().await.unwrap();
        let service = |name: &str| observed.services.iter().find(|s| s["name"] == json!(name)).unwrap();
        assert_eq!(observed.services.len(), 2);
        assert_eq!(service("httpbin")["routes"][0]["priority"], json!(0));
        assert_eq!(service("httpbin")["scheme"], json!("http"));
        assert_eq!(service("pg")["scheme"], json!("tcp"));
        assert!(diff(&desired, &observed, &defaults).is_empty());
    }

    #[tokio::test]
    async fn test_group_member_credentials_are_applied() {
        let (backend, _temp) = create_test_backend();
        let defaults = DefaultValue::new();

        let desired = config(json!({
            "consumer_groups": [{
                "name": "gold",
                "consumers": [{"username": "jack", "credentials": [{"name": "key", "type": "key-auth", "config": {"key": "k"}}]}]
            }]
        }));

        let events = diff(&desired, &backend.dump().await.unwrap(), &defaults);
        assert_eq!(events.len(), 3);

        let results = backend.sync(&events, SyncOptions::default()).await.unwrap();
        assert!(results.iter().all(|r| r.success), "{results:?}");

        let observed = backend.dump().await.unwrap();
        let member = &observed.consumer_groups[0]["consumers"][0];
        assert_eq!(member["username"], json!("jack"));
        assert_eq!(member["credentials"][0]["name"], json!("key"));
        assert!(diff(&desired, &observed, &defaults).is_empty());
    }

    #[tokio::test]
    async fn test_update_keeps_children_and_delete_removes() {
        let (backend, _temp) = create_test_backend();
        let defaults = DefaultValue::new();

        let first = config(json!({"services": [{"name": "svc", "desc": "a", "routes": [{"name": "r", "uris": ["/"]}]}]}));
        let events = diff(&first, &Configuration::new(), &defaults);
        backend.sync(&events, SyncOptions::default()).await.unwrap();

        let second = config(json!({"services": [{"name": "svc", "desc": "b", "routes": [{"name": "r", "uris": ["/"]}]}]}));
        let events = diff(&second, &backend.dump().await.unwrap(), &defaults);
        assert_eq!(events.len(), 1);
        backend.sync(&events, SyncOptions::default()).await.unwrap();

        let observed = backend.dump().await.unwrap();
        assert_eq!(observed.services[0]["desc"], json!("b"));
        assert_eq!(observed.services[0]["routes"].as_array().map(Vec::len), Some(1));

        let events = diff(&Configuration::new(), &observed, &defaults);
        backend.sync(&events, SyncOptions::default()).await.unwrap();
        assert!(backend.dump().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_target_fails_and_stops() {
        let (backend, _temp) = create_test_backend();
        let orphan = |name: &str| Event {
            resource_type: ResourceKind::Route,
            resource_id: name.to_string(),
            resource_name: name.to_string(),
            parent_id: Some(String::from("missing")),
            change: EventChange::Create { new_value: json!({"name": name}) },
        };
        let upstream = Event {
            resource_type: ResourceKind::Upstream,
            resource_id: String::from("u"),
            resource_name: String::from("u"),
            parent_id: None,
            change: EventChange::Delete { old_value: json!({"name": "u"}) },
        };
        let events = vec![orphan("a"), orphan("b")];

        let results = backend.sync(&events, SyncOptions::default()).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(!results[0].success);
        assert!(results[0].error.as_deref().unwrap_or_default().contains("parent service"));

        let events = vec![upstream, orphan("b")];
        let options = SyncOptions::default().with_exit_on_failure(false);
        let results = backend.sync(&events, options).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| !r.success));
    }

    #[tokio::test]
    async fn test_lock_acquire_release() {
        let (backend, _temp) = create_test_backend();

        let lock = backend.lock("test-holder").await.expect("Failed to acquire lock");
        let err = backend.lock("other").await.unwrap_err();
        assert!(matches!(err, GatesyncError::Backend(BackendError::LockedByOther { ref holder, .. }) if holder == "test-holder"));

        backend.unlock("not-mine").await.unwrap();
        assert!(backend.lock("other").await.is_err());

        backend.unlock(&lock.lock_id).await.unwrap();
        assert!(backend.lock("").await.is_ok());
    }

    #[tokio::test]
    async fn test_version_mismatch() {
        let (backend, temp) = create_test_backend();
        std::fs::write(
            temp.path().join(STATE_FILE),
            r#"{"version": "0", "updated_at": "2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();

        let err = backend.dump().await.unwrap_err();
        assert!(matches!(err, GatesyncError::Backend(BackendError::VersionMismatch { .. })));
    }
}
