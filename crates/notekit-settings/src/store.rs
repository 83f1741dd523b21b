//! Settings store
//!
//! Single owner of a plugin's settings. Reads are synchronous snapshots;
//! every write (load, save, update) goes through one FIFO async gate so a
//! read-merge-persist sequence is never interleaved with another writer.
//!
//! ```text
//! UI ── settings()/get() ──────────────► Arc<Settings> snapshot
//! UI ── update(patch) ─► gate ─► merge ─► snapshot ─► backend.save()
//!                                  ▲                       │
//!                                  └──── rollback on error ┘
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{broadcast, Mutex};

use crate::backend::SettingsBackend;
use crate::error::{BackendError, SettingsError, SettingsResult, ValidationIssue};
use crate::events::{ChangeSource, SettingsChanged};
use crate::schema::{LoadOutcome, Schema};
use crate::settings::{Settings, SettingsPatch};

/// Store behaviour knobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    rollback_on_failure: bool,
    persist_on_load: bool,
    event_capacity: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            rollback_on_failure: true,
            persist_on_load: true,
            event_capacity: 16,
        }
    }
}

impl StoreOptions {
    /// Create default options
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Revert in-memory state when a backend write fails (default: true)
    ///
    /// When disabled the optimistic value is kept and the store stays dirty
    /// until a later write succeeds.
    #[inline]
    #[must_use]
    pub fn rollback_on_failure(mut self, enabled: bool) -> Self {
        self.rollback_on_failure = enabled;
        self
    }

    /// Write normalized settings back after a load that filled missing keys
    /// or dropped unknown ones (default: true)
    #[inline]
    #[must_use]
    pub fn persist_on_load(mut self, enabled: bool) -> Self {
        self.persist_on_load = enabled;
        self
    }

    /// Buffered change events per subscriber (default: 16, minimum 1)
    #[inline]
    #[must_use]
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Whether failed writes are rolled back
    #[inline]
    #[must_use]
    pub fn rolls_back(&self) -> bool {
        self.rollback_on_failure
    }

    /// Whether loads write normalized settings back
    #[inline]
    #[must_use]
    pub fn persists_on_load(&self) -> bool {
        self.persist_on_load
    }
}

/// Whether user data has been applied yet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// Defaults only; no successful load yet
    Unloaded,
    /// At least one load completed
    Loaded,
}

/// Owner of a plugin's settings
pub struct SettingsStore {
    schema: Arc<Schema>,
    backend: Arc<dyn SettingsBackend>,
    options: StoreOptions,
    current: RwLock<Arc<Settings>>,
    state: RwLock<LoadState>,
    dirty: AtomicBool,
    gate: Mutex<()>,
    events: broadcast::Sender<SettingsChanged>,
}

impl fmt::Debug for SettingsStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettingsStore")
            .field("keys", &self.schema.keys().collect::<Vec<_>>())
            .field("state", &*self.state.read())
            .field("dirty", &self.is_dirty())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl SettingsStore {
    /// Create store with default options
    ///
    /// Holds the schema defaults until [`load`](Self::load) runs.
    #[must_use]
    pub fn new(schema: Schema, backend: Arc<dyn SettingsBackend>) -> Self {
        Self::with_options(schema, backend, StoreOptions::default())
    }

    /// Create store with explicit options
    #[must_use]
    pub fn with_options(
        schema: Schema,
        backend: Arc<dyn SettingsBackend>,
        options: StoreOptions,
    ) -> Self {
        let (events, _) = broadcast::channel(options.event_capacity.max(1));
        let defaults = Arc::new(schema.defaults());
        Self {
            schema: Arc::new(schema),
            backend,
            options,
            current: RwLock::new(defaults),
            state: RwLock::new(LoadState::Unloaded),
            dirty: AtomicBool::new(false),
            gate: Mutex::new(()),
            events,
        }
    }

    /// Schema this store enforces
    #[inline]
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Options in effect
    #[inline]
    #[must_use]
    pub fn options(&self) -> StoreOptions {
        self.options
    }

    /// Current settings snapshot
    #[inline]
    #[must_use]
    pub fn settings(&self) -> Arc<Settings> {
        Arc::clone(&*self.current.read())
    }

    /// Current value of one setting
    ///
    /// # Errors
    /// Returns `SettingsError::UnknownKey` if `key` is not in the schema
    pub fn get(&self, key: &str) -> SettingsResult<Value> {
        if !self.schema.contains(key) {
            return Err(SettingsError::UnknownKey(key.to_string()));
        }
        self.current
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| SettingsError::UnknownKey(key.to_string()))
    }

    /// Current value of one setting converted to `T`
    ///
    /// # Errors
    /// - `SettingsError::UnknownKey` if `key` is not in the schema
    /// - `SettingsError::InvalidValue` if the value does not convert
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> SettingsResult<T> {
        if !self.schema.contains(key) {
            return Err(SettingsError::UnknownKey(key.to_string()));
        }
        self.settings().get_as(key)
    }

    /// Load state
    #[inline]
    #[must_use]
    pub fn load_state(&self) -> LoadState {
        *self.state.read()
    }

    /// Check if a load has completed
    #[inline]
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.load_state() == LoadState::Loaded
    }

    /// Check if in-memory settings may differ from the persisted blob
    #[inline]
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Subscribe to change events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SettingsChanged> {
        self.events.subscribe()
    }

    /// Read settings from the backend and merge them over the defaults
    ///
    /// Missing data yields the defaults. Malformed or undecodable data also
    /// yields the defaults, with a warning; the bad blob is left in place and
    /// the store is marked dirty until the next save or update.
    ///
    /// # Errors
    /// Returns `SettingsError::Backend` if the backend cannot be reached;
    /// in-memory settings are left unchanged
    pub async fn load(&self) -> SettingsResult<Arc<Settings>> {
        let _guard = self.gate.lock().await;

        let (settings, outcome) = match self.backend.load().await {
            Ok(blob) => self.schema.resolve(blob.as_ref()),
            Err(BackendError::Corrupt(reason)) => (
                self.schema.defaults(),
                LoadOutcome::Rejected(vec![ValidationIssue::Undecodable(reason)]),
            ),
            Err(err) => {
                tracing::error!("Failed to load settings: {}", err);
                return Err(err.into());
            }
        };
        log_outcome(&outcome);

        let settings = Arc::new(settings);
        let previous = self.replace(Arc::clone(&settings));
        *self.state.write() = LoadState::Loaded;
        // a rejected blob is left on disk; memory now differs from it
        self.dirty.store(outcome.is_rejected(), Ordering::SeqCst);

        if self.options.persist_on_load && outcome.needs_write_back() {
            if let Err(err) = self.backend.save(&settings.to_value()).await {
                self.dirty.store(true, Ordering::SeqCst);
                tracing::warn!("Could not persist normalized settings: {}", err);
            }
        }

        self.publish(ChangeSource::Load, previous, Arc::clone(&settings));
        tracing::info!("Settings loaded ({} keys)", settings.len());
        Ok(settings)
    }

    /// Replace settings wholesale and persist them verbatim
    ///
    /// # Errors
    /// - `SettingsError::Validation` if `settings` is incomplete, mistyped or
    ///   carries unknown keys; nothing changes
    /// - `SettingsError::Backend` if the write fails
    pub async fn save(&self, settings: Settings) -> SettingsResult<()> {
        self.schema.check_complete(&settings)?;

        let _guard = self.gate.lock().await;
        self.commit(settings, ChangeSource::Save).await?;
        tracing::debug!("Settings saved");
        Ok(())
    }

    /// Merge a partial update into the current settings and persist the result
    ///
    /// The merge reads the settings current when this call gets the write
    /// gate, so concurrent updates never overwrite each other.
    ///
    /// # Errors
    /// - `SettingsError::Validation` if the patch has unknown or mistyped keys;
    ///   nothing changes
    /// - `SettingsError::Backend` if the write fails
    pub async fn update(&self, patch: SettingsPatch) -> SettingsResult<()> {
        self.schema.check_patch(&patch)?;

        let _guard = self.gate.lock().await;
        let next = self.settings().merged(&patch);
        self.commit(next, ChangeSource::Update).await?;
        tracing::debug!(
            keys = ?patch.iter().map(|(key, _)| key).collect::<Vec<_>>(),
            "Settings updated"
        );
        Ok(())
    }

    /// Persist the schema defaults
    ///
    /// # Errors
    /// Returns `SettingsError::Backend` if the write fails
    pub async fn reset(&self) -> SettingsResult<()> {
        self.save(self.schema.defaults()).await
    }

    /// Wait until every write queued before this call has finished
    pub async fn wait_for_writes(&self) {
        drop(self.gate.lock().await);
    }

    /// Apply `next` optimistically, then persist it. Caller holds the gate.
    async fn commit(&self, next: Settings, source: ChangeSource) -> SettingsResult<Arc<Settings>> {
        let next = Arc::new(next);
        let previous = self.replace(Arc::clone(&next));
        let was_dirty = self.dirty.swap(true, Ordering::SeqCst);

        match self.backend.save(&next.to_value()).await {
            Ok(()) => {
                self.dirty.store(false, Ordering::SeqCst);
                self.publish(source, previous, Arc::clone(&next));
                Ok(next)
            }
            Err(err) => {
                if self.options.rollback_on_failure {
                    self.replace(previous);
                    self.dirty.store(was_dirty, Ordering::SeqCst);
                    tracing::warn!("Settings write failed ({:?}), rolled back: {}", source, err);
                } else {
                    tracing::warn!("Settings write failed ({:?}), keeping unsaved changes: {}", source, err);
                }
                Err(err.into())
            }
        }
    }

    fn replace(&self, next: Arc<Settings>) -> Arc<Settings> {
        std::mem::replace(&mut *self.current.write(), next)
    }

    fn publish(&self, source: ChangeSource, old: Arc<Settings>, new: Arc<Settings>) {
        // no subscribers is fine
        let _ = self.events.send(SettingsChanged { source, old, new });
    }
}

fn log_outcome(outcome: &LoadOutcome) {
    match outcome {
        LoadOutcome::FirstRun => tracing::debug!("No persisted settings, using defaults"),
        LoadOutcome::Merged { filled, dropped } => {
            if !dropped.is_empty() {
                tracing::warn!("Ignoring unknown setting keys: {:?}", dropped);
            }
            if !filled.is_empty() {
                tracing::debug!("Filled missing settings from defaults: {:?}", filled);
            }
        }
        LoadOutcome::Rejected(issues) => {
            let reasons: Vec<String> = issues.iter().map(ToString::to_string).collect();
            tracing::warn!("Invalid settings data, using defaults until next save: {}", reasons.join("; "));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::schema::SettingKind;
    use async_trait::async_trait;
    use serde_json::json;

    struct BrokenBackend;

    #[async_trait]
    impl SettingsBackend for BrokenBackend {
        async fn load(&self) -> Result<Option<Value>, BackendError> {
            Err(BackendError::Other("offline".to_string()))
        }

        async fn save(&self, _blob: &Value) -> Result<(), BackendError> {
            Err(BackendError::Other("offline".to_string()))
        }
    }

    fn schema() -> Schema {
        Schema::builder()
            .setting("exampleSetting", SettingKind::String, "default value")
            .setting("count", SettingKind::Integer, 0)
            .build()
            .unwrap()
    }

    #[test]
    fn starts_unloaded_with_defaults() {
        let store = SettingsStore::new(schema(), Arc::new(MemoryBackend::new()));
        assert_eq!(store.load_state(), LoadState::Unloaded);
        assert_eq!(*store.settings(), store.schema().defaults());
        assert!(!store.is_dirty());
    }

    #[test]
    fn get_unknown_key_fails() {
        let store = SettingsStore::new(schema(), Arc::new(MemoryBackend::new()));
        assert!(matches!(store.get("nope"), Err(SettingsError::UnknownKey(k)) if k == "nope"));
        assert_eq!(store.get("count").unwrap(), json!(0));
        assert_eq!(store.get_as::<String>("exampleSetting").unwrap(), "default value");
    }

    #[test]
    fn snapshots_are_detached() {
        let store = SettingsStore::new(schema(), Arc::new(MemoryBackend::new()));
        let mut copy = (*store.settings()).clone();
        copy = copy.merged(&SettingsPatch::new().set("count", 9));
        assert_eq!(copy.get("count"), Some(&json!(9)));
        assert_eq!(store.get("count").unwrap(), json!(0));
    }

    #[tokio::test]
    async fn update_merges_and_persists() {
        let backend = Arc::new(MemoryBackend::new());
        let store = SettingsStore::new(schema(), backend.clone());
        store.update(SettingsPatch::new().set("count", 3)).await.unwrap();
        assert_eq!(store.get("count").unwrap(), json!(3));
        assert_eq!(
            backend.blob(),
            Some(json!({"exampleSetting": "default value", "count": 3}))
        );
    }

    #[tokio::test]
    async fn load_failure_keeps_state() {
        let store = SettingsStore::new(schema(), Arc::new(BrokenBackend));
        let err = store.load().await.unwrap_err();
        assert!(err.is_backend());
        assert!(!store.is_loaded());
        assert_eq!(*store.settings(), store.schema().defaults());
    }

    #[tokio::test]
    async fn failed_update_rolls_back() {
        let store = SettingsStore::new(schema(), Arc::new(BrokenBackend));
        let err = store
            .update(SettingsPatch::new().set("count", 5))
            .await
            .unwrap_err();
        assert!(err.is_backend());
        assert_eq!(store.get("count").unwrap(), json!(0));
        assert!(!store.is_dirty());
    }

    #[tokio::test]
    async fn failed_update_without_rollback_stays_dirty() {
        let options = StoreOptions::new().rollback_on_failure(false);
        let store = SettingsStore::with_options(schema(), Arc::new(BrokenBackend), options);
        assert!(store.update(SettingsPatch::new().set("count", 5)).await.is_err());
        assert_eq!(store.get("count").unwrap(), json!(5));
        assert!(store.is_dirty());
    }

    #[tokio::test]
    async fn invalid_patch_is_rejected_before_write() {
        let backend = Arc::new(MemoryBackend::new());
        let store = SettingsStore::new(schema(), backend.clone());
        let err = store
            .update(SettingsPatch::new().set("count", "many"))
            .await
            .unwrap_err();
        assert!(matches!(err, SettingsError::Validation(_)));
        assert_eq!(backend.save_count(), 0);
    }

    #[test]
    fn options_builder() {
        let options = StoreOptions::new()
            .rollback_on_failure(false)
            .persist_on_load(false)
            .event_capacity(0);
        assert!(!options.rolls_back());
        assert!(!options.persists_on_load());
        assert_eq!(options.event_capacity, 1);
    }
}
