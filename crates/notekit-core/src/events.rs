//! Plugin lifecycle notifications

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::context::PluginId;

/// Lifecycle transition of a plugin
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginEvent {
    /// Activation finished and settings are loaded
    Loaded {
        /// Plugin that was activated
        id: PluginId,
        /// When activation finished
        at: DateTime<Utc>,
    },
    /// Teardown finished
    Unloaded {
        /// Plugin that was torn down
        id: PluginId,
        /// When teardown finished
        at: DateTime<Utc>,
    },
}

impl PluginEvent {
    /// Plugin the event is about
    #[must_use]
    pub fn id(&self) -> &PluginId {
        match self {
            Self::Loaded { id, .. } | Self::Unloaded { id, .. } => id,
        }
    }

    /// When the transition happened
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Loaded { at, .. } | Self::Unloaded { at, .. } => *at,
        }
    }
}

/// Broadcast channel for lifecycle events
///
/// Hosts that need the `Loaded` event create one up front, subscribe, and
/// pass it to [`PluginContext::init_with_events`](crate::PluginContext::init_with_events).
#[derive(Debug, Clone)]
pub struct PluginEvents {
    sender: broadcast::Sender<PluginEvent>,
}

impl Default for PluginEvents {
    fn default() -> Self {
        Self::new(16)
    }
}

impl PluginEvents {
    /// Create channel buffering `capacity` events per subscriber (minimum 1)
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to events published from now on
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PluginEvent> {
        self.sender.subscribe()
    }

    pub(crate) fn publish(&self, event: PluginEvent) {
        // no subscribers is fine
        let _ = self.sender.send(event);
    }
}
