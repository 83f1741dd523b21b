//! NoteKit Core - plugin lifecycle
//!
//! Replaces a process-wide settings singleton with an explicit context:
//! - `PluginContext::init` validates the plugin id, builds the settings store
//!   and runs the first load inside a `plugin` tracing span
//! - collaborators receive the store from the context, never from a global
//! - `teardown` drains pending writes before the plugin goes away
//! - `Loaded`/`Unloaded` lifecycle events go out on a broadcast channel
//!
//! # Example
//!
//! ```rust,ignore
//! use notekit_core::prelude::*;
//! use notekit_settings::{Schema, StoreOptions};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let id = PluginId::new("sample-plugin")?;
//! let ctx = PluginContext::init_in_dir(id, Schema::template(), "/vault/.plugins", StoreOptions::default()).await?;
//!
//! let settings = ctx.settings();
//! println!("{}", settings.get("exampleSetting")?);
//!
//! ctx.teardown().await;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod context;
pub mod error;
pub mod events;

pub use context::{ContextState, PluginContext, PluginId};
pub use error::{ActivationError, CoreResult};
pub use events::{PluginEvent, PluginEvents};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for plugin lifecycle code
    pub use crate::{
        ActivationError, ContextState, CoreResult, PluginContext, PluginEvent, PluginEvents,
        PluginId,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
