//! Persistence backends
//!
//! A backend stores one opaque JSON blob per plugin. The store never talks to
//! storage directly; it only calls [`SettingsBackend::load`] and
//! [`SettingsBackend::save`].

use async_trait::async_trait;
use serde_json::Value;

use crate::error::BackendError;

mod file;
mod memory;

pub use file::{JsonFileBackend, DATA_FILE_NAME};
pub use memory::MemoryBackend;

/// Load/save primitives for the settings blob
///
/// Implement this trait to persist settings somewhere new.
#[async_trait]
pub trait SettingsBackend: Send + Sync {
    /// Read the persisted blob
    ///
    /// Returns `Ok(None)` when nothing has been persisted yet.
    ///
    /// # Errors
    /// - `BackendError::Corrupt` if the blob exists but cannot be decoded
    /// - `BackendError::Io` / `BackendError::Other` if storage is unreachable
    async fn load(&self) -> Result<Option<Value>, BackendError>;

    /// Replace the persisted blob
    ///
    /// # Errors
    /// Returns an error if the blob could not be written
    async fn save(&self, blob: &Value) -> Result<(), BackendError>;
}
