//! Error types for plugin activation

use notekit_settings::SettingsError;

/// Plugin lifecycle error
#[derive(Debug, thiserror::Error)]
pub enum ActivationError {
    /// Plugin id rejected
    #[error("invalid plugin id {id:?}: {reason}")]
    InvalidPluginId {
        /// Offending id
        id: String,
        /// Why it was rejected
        reason: &'static str,
    },

    /// Settings could not be initialized
    #[error("settings error: {0}")]
    Settings(#[from] SettingsError),

    /// Context used after teardown
    #[error("plugin context has been torn down")]
    TornDown,
}

impl ActivationError {
    /// Create invalid id error
    pub fn invalid_id(id: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidPluginId {
            id: id.into(),
            reason,
        }
    }
}

/// Result type for lifecycle operations
pub type CoreResult<T> = Result<T, ActivationError>;
