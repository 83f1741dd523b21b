//! Testing utilities for NoteKit workspace
//!
//! Shared backends, schemas and helpers.

#![allow(missing_docs)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Once};

use async_trait::async_trait;
use notekit_settings::{
    BackendError, Schema, SettingKind, SettingsBackend, SettingsStore, StoreOptions,
};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{Notify, Semaphore};

pub fn template_schema() -> Schema {
    Schema::template()
}

/// Four settings covering the common kinds
pub fn sample_schema() -> Schema {
    Schema::builder()
        .setting("theme", SettingKind::String, "light")
        .setting("fontSize", SettingKind::Integer, 14)
        .setting("spellcheck", SettingKind::Bool, true)
        .setting("tags", SettingKind::StringList, Value::Array(vec![]))
        .build()
        .unwrap()
}

pub fn store_with<B: SettingsBackend + 'static>(schema: Schema, backend: Arc<B>) -> SettingsStore {
    SettingsStore::new(schema, backend)
}

pub fn store_with_options<B: SettingsBackend + 'static>(
    schema: Schema,
    backend: Arc<B>,
    options: StoreOptions,
) -> SettingsStore {
    SettingsStore::with_options(schema, backend, options)
}

/// Install a test-writer tracing subscriber once per process
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Backend whose loads and saves can be switched to fail
#[derive(Debug, Default)]
pub struct FailingBackend {
    blob: Mutex<Option<Value>>,
    fail_loads: AtomicBool,
    fail_saves: AtomicBool,
    corrupt: AtomicBool,
    save_attempts: AtomicUsize,
}

impl FailingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_blob(blob: Value) -> Self {
        let backend = Self::default();
        *backend.blob.lock() = Some(blob);
        backend
    }

    pub fn failing_saves() -> Self {
        let backend = Self::default();
        backend.fail_saves(true);
        backend
    }

    pub fn fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Make loads report a corrupt blob
    pub fn corrupt(&self, corrupt: bool) {
        self.corrupt.store(corrupt, Ordering::SeqCst);
    }

    pub fn blob(&self) -> Option<Value> {
        self.blob.lock().clone()
    }

    pub fn save_attempts(&self) -> usize {
        self.save_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SettingsBackend for FailingBackend {
    async fn load(&self) -> Result<Option<Value>, BackendError> {
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(BackendError::Other("load failed".to_string()));
        }
        if self.corrupt.load(Ordering::SeqCst) {
            return Err(BackendError::corrupt("unexpected end of input"));
        }
        Ok(self.blob.lock().clone())
    }

    async fn save(&self, blob: &Value) -> Result<(), BackendError> {
        self.save_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(BackendError::Other("save failed".to_string()));
        }
        *self.blob.lock() = Some(blob.clone());
        Ok(())
    }
}

/// Backend whose saves block until released, recording every blob written
///
/// Lets tests hold a write in flight while issuing more operations.
#[derive(Debug)]
pub struct GatedBackend {
    blob: Mutex<Option<Value>>,
    history: Mutex<Vec<Value>>,
    permits: Semaphore,
    started: AtomicUsize,
    started_notify: Notify,
}

impl Default for GatedBackend {
    fn default() -> Self {
        Self {
            blob: Mutex::new(None),
            history: Mutex::new(Vec::new()),
            permits: Semaphore::new(0),
            started: AtomicUsize::new(0),
            started_notify: Notify::new(),
        }
    }
}

impl GatedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Let `n` pending or future saves complete
    pub fn release(&self, n: usize) {
        self.permits.add_permits(n);
    }

    /// Wait until at least `n` saves have started
    pub async fn wait_started(&self, n: usize) {
        loop {
            let notified = self.started_notify.notified();
            if self.started.load(Ordering::SeqCst) >= n {
                return;
            }
            notified.await;
        }
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn blob(&self) -> Option<Value> {
        self.blob.lock().clone()
    }

    /// Every blob saved, in completion order
    pub fn history(&self) -> Vec<Value> {
        self.history.lock().clone()
    }
}

#[async_trait]
impl SettingsBackend for GatedBackend {
    async fn load(&self) -> Result<Option<Value>, BackendError> {
        Ok(self.blob.lock().clone())
    }

    async fn save(&self, blob: &Value) -> Result<(), BackendError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        self.started_notify.notify_waiters();

        let permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| BackendError::Other(e.to_string()))?;
        permit.forget();

        *self.blob.lock() = Some(blob.clone());
        self.history.lock().push(blob.clone());
        Ok(())
    }
}
