//! Change-event fan-out to registered subscribers.
//!
//! The registry keeps the listener set safe to mutate while a notification is
//! in progress: `notify` iterates over a snapshot taken at call time, so
//! listeners can subscribe or unsubscribe from inside a callback. A failing
//! listener is logged and never prevents the others from being notified.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;
use tracing::error;

use crate::model::Configuration;

/// Event describing one detected configuration change.
#[derive(Debug, Clone)]
pub struct ConfigChangeEvent {
    /// Snapshot that was replaced; absent on the first accepted fetch.
    pub old: Option<Arc<Configuration>>,
    /// Snapshot that is now current.
    pub new: Arc<Configuration>,
}

/// Failure reported by a listener during notification.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ListenerError(String);

impl ListenerError {
    /// Wraps a failure message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Subscriber interested in configuration changes.
pub trait ConfigChangeListener: Send + Sync {
    /// Handles one change event. Errors are logged by the registry and never
    /// propagate to the refresh path.
    fn on_config_change(&self, event: &ConfigChangeEvent) -> Result<(), ListenerError>;
}

impl<F> ConfigChangeListener for F
where
    F: Fn(&ConfigChangeEvent) -> Result<(), ListenerError> + Send + Sync,
{
    fn on_config_change(&self, event: &ConfigChangeEvent) -> Result<(), ListenerError> {
        self(event)
    }
}

/// Handle identifying a subscription for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Holds subscribers and fans change events out to them.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: RwLock<Vec<(ListenerId, Arc<dyn ConfigChangeListener>)>>,
    next_id: AtomicU64,
}

impl ListenerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener and returns its removal handle.
    pub fn subscribe(&self, listener: Arc<dyn ConfigChangeListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        id
    }

    /// Removes a listener; returns whether it was still registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no listeners are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delivers `event` to every listener registered at call time.
    ///
    /// The listener set is snapshotted before the first invocation, so
    /// concurrent subscribe/unsubscribe calls do not affect the in-flight
    /// notification. Listener failures are logged and swallowed.
    pub fn notify(&self, event: &ConfigChangeEvent) {
        let snapshot: Vec<(ListenerId, Arc<dyn ConfigChangeListener>)> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for (id, listener) in snapshot {
            if let Err(err) = listener.on_config_change(event) {
                error!(listener = id.0, %err, "config change listener failed");
            }
        }
    }
}

impl fmt::Debug for ListenerRegistry {
    /// Emits the listener count rather than the (opaque) listeners.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listener_count", &self.len())
            .finish()
    }
}
