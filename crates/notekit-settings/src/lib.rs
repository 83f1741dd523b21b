//! NoteKit Settings
//!
//! Schema-validated settings for note-taking app plugins, persisted to an
//! opaque JSON blob through a pluggable backend.
//!
//! # Core Operations
//!
//! - **Read**: `settings()` / `get()` return snapshots synchronously
//! - **Load**: merge the persisted blob over the schema defaults
//! - **Save**: replace settings wholesale and persist them
//! - **Update**: shallow-merge a patch and persist, serialized per store
//!
//! # Architecture
//!
//! ```text
//! Schema ──defaults──► SettingsStore ◄──load/save──► SettingsBackend (memory, JSON file)
//!                           │
//!                           └──► broadcast<SettingsChanged>
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use notekit_settings::prelude::*;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = Arc::new(JsonFileBackend::for_plugin("/vault/.plugins", "my-plugin")?);
//! let store = SettingsStore::new(Schema::template(), backend);
//!
//! store.load().await?;
//! store.update(SettingsPatch::new().set("exampleSetting", "custom")).await?;
//! assert_eq!(store.get_as::<String>("exampleSetting")?, "custom");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

// Core modules
pub mod backend;
pub mod error;
pub mod events;
pub mod schema;
pub mod settings;
pub mod store;

// Re-exports for convenience
pub use backend::{JsonFileBackend, MemoryBackend, SettingsBackend};
pub use error::{BackendError, SettingsError, SettingsResult, ValidationIssue};
pub use events::{ChangeSource, SettingsChanged};
pub use schema::{LoadOutcome, Schema, SchemaBuilder, SettingDef, SettingKind};
pub use settings::{Settings, SettingsPatch};
pub use store::{LoadState, SettingsStore, StoreOptions};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with plugin settings
    pub use crate::backend::{JsonFileBackend, MemoryBackend, SettingsBackend};
    pub use crate::error::{SettingsError, SettingsResult};
    pub use crate::schema::{Schema, SettingKind};
    pub use crate::settings::{Settings, SettingsPatch};
    pub use crate::store::{SettingsStore, StoreOptions};
}
