//! Settings change notifications

use std::sync::Arc;

use crate::settings::Settings;

/// Operation that produced a change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeSource {
    /// Settings read from the backend
    Load,
    /// Complete settings replaced by the caller
    Save,
    /// Partial update merged into current settings
    Update,
}

/// Published after every successful load, save or update
#[derive(Debug, Clone)]
pub struct SettingsChanged {
    /// Operation that produced the change
    pub source: ChangeSource,
    /// Snapshot before the change
    pub old: Arc<Settings>,
    /// Snapshot after the change
    pub new: Arc<Settings>,
}

impl SettingsChanged {
    /// Keys whose values differ between `old` and `new`
    #[must_use]
    pub fn changed_keys(&self) -> Vec<String> {
        self.old.changed_keys(&self.new)
    }

    /// Check if the given key changed
    #[must_use]
    pub fn touches(&self, key: &str) -> bool {
        self.old.get(key) != self.new.get(key)
    }
}
