//! Health tracking for the client.
//!
//! Tracks the healthy flag, the timestamp of the last successful refresh, and
//! the last refresh error, and renders them as a JSON snapshot so embedders
//! can surface client health without scraping logs.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{Map, Value};

/// Tracks the health flag and the last refresh outcome.
///
/// Clients start healthy and stay healthy until a fetch exhausts its retries.
#[derive(Debug)]
pub struct ClientStatus {
    healthy: AtomicBool,
    last_refresh_ms: AtomicU64,
    last_error: RwLock<Option<String>>,
}

impl ClientStatus {
    /// Creates a status handle with the healthy flag set and no refresh recorded.
    pub fn new() -> Self {
        Self {
            healthy: AtomicBool::new(true),
            last_refresh_ms: AtomicU64::new(0),
            last_error: RwLock::new(None),
        }
    }

    /// Whether the last refresh outcome was a success (or none happened yet).
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    /// Timestamp of the last successful refresh, if any.
    pub fn last_refresh(&self) -> Option<SystemTime> {
        match self.last_refresh_ms.load(Ordering::Relaxed) {
            0 => None,
            millis => Some(UNIX_EPOCH + std::time::Duration::from_millis(millis)),
        }
    }

    /// Last refresh error recorded, if any.
    pub fn last_error(&self) -> Option<String> {
        self.last_error
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Records a successful refresh: healthy, timestamped, error cleared.
    pub fn record_success(&self, at: SystemTime) {
        let millis = at
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or(0);
        self.last_refresh_ms.store(millis, Ordering::Relaxed);
        self.healthy.store(true, Ordering::Relaxed);
        let mut guard = self
            .last_error
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *guard = None;
    }

    /// Records an exhausted-retry failure: unhealthy with the error retained.
    pub fn record_failure(&self, error: &str) {
        self.healthy.store(false, Ordering::Relaxed);
        let mut guard = self
            .last_error
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *guard = Some(error.to_owned());
    }

    /// Captures a point-in-time snapshot of the status fields.
    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            healthy: self.is_healthy(),
            last_refresh_ms: match self.last_refresh_ms.load(Ordering::Relaxed) {
                0 => None,
                millis => Some(millis),
            },
            last_error: self.last_error(),
        }
    }

    /// Renders the current status as a JSON object.
    pub fn to_json(&self) -> Value {
        self.snapshot().to_json()
    }
}

impl Default for ClientStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializable representation of [`ClientStatus`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSnapshot {
    /// Whether the client is currently healthy.
    pub healthy: bool,
    /// Epoch milliseconds of the last successful refresh.
    pub last_refresh_ms: Option<u64>,
    /// Last recorded refresh error.
    pub last_error: Option<String>,
}

impl StatusSnapshot {
    /// Renders the snapshot as a JSON map.
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("healthy".into(), Value::Bool(self.healthy));
        map.insert(
            "lastRefreshMs".into(),
            match self.last_refresh_ms {
                Some(millis) => Value::from(millis),
                None => Value::Null,
            },
        );
        map.insert(
            "lastError".into(),
            match &self.last_error {
                Some(err) => Value::String(err.clone()),
                None => Value::Null,
            },
        );
        map
    }

    /// Wraps [`StatusSnapshot::to_map`] into a [`serde_json::Value`].
    pub fn to_json(&self) -> Value {
        Value::Object(self.to_map())
    }
}
