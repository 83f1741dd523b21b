//! Plugin context
//!
//! One `PluginContext` per activation. It owns the plugin identity, the
//! `plugin` tracing span every lifecycle log runs in, and the settings store
//! handed to collaborators.
//!
//! ```text
//! activate ──► init(id, schema, backend) ──► load ──► Active
//!                                                       │
//! deactivate ──► teardown() ──► wait for writes ──► TornDown
//! ```
//!
//! `PluginEvent::Loaded` and `PluginEvent::Unloaded` are published on the
//! context's `PluginEvents` channel at each end.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use notekit_settings::{
    JsonFileBackend, Schema, SettingsBackend, SettingsError, SettingsStore, StoreOptions,
};
use tokio::sync::broadcast;
use tracing::Instrument;

use crate::error::{ActivationError, CoreResult};
use crate::events::{PluginEvent, PluginEvents};

/// Validated plugin identifier
///
/// Lowercase ASCII letters, digits, `-` and `_` only, so it is always safe
/// to use as a directory name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PluginId(String);

impl PluginId {
    /// Validate and wrap an id
    ///
    /// # Errors
    /// Returns `ActivationError::InvalidPluginId` if the id is empty or
    /// contains anything besides `[a-z0-9_-]`
    pub fn new(id: impl Into<String>) -> CoreResult<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(ActivationError::invalid_id(id, "must not be empty"));
        }
        if id.contains(['/', '\\']) {
            return Err(ActivationError::invalid_id(id, "contains a path separator"));
        }
        if !id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
        {
            return Err(ActivationError::invalid_id(
                id,
                "only lowercase letters, digits, '-' and '_' are allowed",
            ));
        }
        Ok(Self(id))
    }

    /// Id as a string slice
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PluginId {
    type Err = ActivationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for PluginId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Lifecycle state of a context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    /// Initialized and usable
    Active,
    /// Torn down; settings must no longer be used
    TornDown,
}

/// Per-activation plugin context
pub struct PluginContext {
    id: PluginId,
    store: Arc<SettingsStore>,
    span: tracing::Span,
    events: PluginEvents,
    torn_down: AtomicBool,
}

impl fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginContext")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl PluginContext {
    /// Create the settings store and run the first load
    ///
    /// # Errors
    /// Returns `ActivationError::Settings` if the backend cannot be read.
    /// Missing or malformed data is not an error; the store falls back to
    /// the schema defaults.
    pub async fn init(
        id: PluginId,
        schema: Schema,
        backend: Arc<dyn SettingsBackend>,
        options: StoreOptions,
    ) -> CoreResult<Self> {
        Self::init_with_events(id, schema, backend, options, PluginEvents::default()).await
    }

    /// Like [`init`](Self::init), publishing lifecycle events on `events`
    ///
    /// Subscribe to `events` before calling this to observe
    /// [`PluginEvent::Loaded`].
    ///
    /// # Errors
    /// Same as [`init`](Self::init)
    pub async fn init_with_events(
        id: PluginId,
        schema: Schema,
        backend: Arc<dyn SettingsBackend>,
        options: StoreOptions,
        events: PluginEvents,
    ) -> CoreResult<Self> {
        let span = tracing::info_span!("plugin", id = %id);
        let store = Arc::new(SettingsStore::with_options(schema, backend, options));

        if let Err(err) = store.load().instrument(span.clone()).await {
            span.in_scope(|| tracing::error!("Activation failed: {}", err));
            return Err(err.into());
        }
        span.in_scope(|| tracing::info!("Plugin activated"));
        events.publish(PluginEvent::Loaded {
            id: id.clone(),
            at: Utc::now(),
        });

        Ok(Self {
            id,
            store,
            span,
            events,
            torn_down: AtomicBool::new(false),
        })
    }

    /// Like [`init`](Self::init), persisting to `{plugins_dir}/{id}/data.json`
    ///
    /// # Errors
    /// Same as [`init`](Self::init)
    pub async fn init_in_dir(
        id: PluginId,
        schema: Schema,
        plugins_dir: impl AsRef<Path>,
        options: StoreOptions,
    ) -> CoreResult<Self> {
        let backend =
            JsonFileBackend::for_plugin(plugins_dir, id.as_str()).map_err(SettingsError::from)?;
        Self::init(id, schema, Arc::new(backend), options).await
    }

    /// Plugin id
    #[inline]
    #[must_use]
    pub fn id(&self) -> &PluginId {
        &self.id
    }

    /// Settings store, shared with collaborators
    #[inline]
    #[must_use]
    pub fn settings(&self) -> Arc<SettingsStore> {
        Arc::clone(&self.store)
    }

    /// Settings store, unless the context is torn down
    ///
    /// # Errors
    /// Returns `ActivationError::TornDown` after [`teardown`](Self::teardown)
    pub fn settings_checked(&self) -> CoreResult<Arc<SettingsStore>> {
        match self.state() {
            ContextState::Active => Ok(self.settings()),
            ContextState::TornDown => Err(ActivationError::TornDown),
        }
    }

    /// Lifecycle state
    #[inline]
    #[must_use]
    pub fn state(&self) -> ContextState {
        if self.torn_down.load(Ordering::SeqCst) {
            ContextState::TornDown
        } else {
            ContextState::Active
        }
    }

    /// Lifecycle event channel
    #[inline]
    #[must_use]
    pub fn events(&self) -> &PluginEvents {
        &self.events
    }

    /// Subscribe to lifecycle events published from now on
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PluginEvent> {
        self.events.subscribe()
    }

    /// Span carrying the plugin id
    #[inline]
    #[must_use]
    pub fn span(&self) -> &tracing::Span {
        &self.span
    }

    /// Wait for in-flight writes, then mark the context torn down and publish
    /// [`PluginEvent::Unloaded`]
    ///
    /// Calling it again is a no-op.
    pub async fn teardown(&self) {
        if self.state() == ContextState::TornDown {
            return;
        }
        self.store.wait_for_writes().instrument(self.span.clone()).await;

        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.span.in_scope(|| {
            if self.store.is_dirty() {
                tracing::warn!("Tearing down with unsaved settings changes");
            }
            tracing::info!("Plugin torn down");
        });
        self.events.publish(PluginEvent::Unloaded {
            id: self.id.clone(),
            at: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notekit_settings::MemoryBackend;
    use serde_json::json;

    #[test]
    fn plugin_id_accepts_plain_names() {
        for id in ["sample-plugin", "my_plugin", "p2"] {
            assert_eq!(PluginId::new(id).unwrap().as_str(), id);
        }
    }

    #[test]
    fn plugin_id_rejects_bad_names() {
        for id in ["", "..", "../evil", "a/b", "a\\b", "MyPlugin", "with space", "ümlaut"] {
            assert!(
                matches!(PluginId::new(id), Err(ActivationError::InvalidPluginId { .. })),
                "{id:?} should be rejected"
            );
        }
    }

    #[test]
    fn plugin_id_parses() {
        let id: PluginId = "sample-plugin".parse().unwrap();
        assert_eq!(id.to_string(), "sample-plugin");
        assert!("Nope".parse::<PluginId>().is_err());
    }

    #[tokio::test]
    async fn init_loads_settings() {
        let backend = Arc::new(MemoryBackend::with_blob(json!({"exampleSetting": "custom"})));
        let ctx = PluginContext::init(
            PluginId::new("sample").unwrap(),
            Schema::template(),
            backend,
            StoreOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(ctx.state(), ContextState::Active);
        assert!(ctx.settings().is_loaded());
        assert_eq!(
            ctx.settings().get_as::<String>("exampleSetting").unwrap(),
            "custom"
        );
    }

    #[tokio::test]
    async fn teardown_is_idempotent() {
        let ctx = PluginContext::init(
            PluginId::new("sample").unwrap(),
            Schema::template(),
            Arc::new(MemoryBackend::new()),
            StoreOptions::default(),
        )
        .await
        .unwrap();

        ctx.teardown().await;
        ctx.teardown().await;
        assert_eq!(ctx.state(), ContextState::TornDown);
        assert!(matches!(ctx.settings_checked(), Err(ActivationError::TornDown)));
    }
}
