//! In-memory backend

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use super::SettingsBackend;
use crate::error::BackendError;

/// Backend holding the blob in process memory
#[derive(Debug, Default)]
pub struct MemoryBackend {
    blob: Mutex<Option<Value>>,
    saves: AtomicUsize,
}

impl MemoryBackend {
    /// Create empty backend (first run)
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create backend seeded with a blob
    #[inline]
    #[must_use]
    pub fn with_blob(blob: Value) -> Self {
        Self {
            blob: Mutex::new(Some(blob)),
            saves: AtomicUsize::new(0),
        }
    }

    /// Current blob
    #[must_use]
    pub fn blob(&self) -> Option<Value> {
        self.blob.lock().clone()
    }

    /// Replace blob without counting a save
    pub fn set_blob(&self, blob: Option<Value>) {
        *self.blob.lock() = blob;
    }

    /// Number of successful saves
    #[inline]
    #[must_use]
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SettingsBackend for MemoryBackend {
    async fn load(&self) -> Result<Option<Value>, BackendError> {
        Ok(self.blob.lock().clone())
    }

    async fn save(&self, blob: &Value) -> Result<(), BackendError> {
        *self.blob.lock() = Some(blob.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn empty_backend_loads_none() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.load().await.unwrap(), None);
        assert_eq!(backend.save_count(), 0);
    }

    #[tokio::test]
    async fn save_then_load() {
        let backend = MemoryBackend::new();
        backend.save(&json!({"a": 1})).await.unwrap();
        assert_eq!(backend.load().await.unwrap(), Some(json!({"a": 1})));
        assert_eq!(backend.save_count(), 1);
    }

    #[tokio::test]
    async fn seeded_backend() {
        let backend = MemoryBackend::with_blob(json!("junk"));
        assert_eq!(backend.load().await.unwrap(), Some(json!("junk")));
        backend.set_blob(None);
        assert_eq!(backend.blob(), None);
    }
}
