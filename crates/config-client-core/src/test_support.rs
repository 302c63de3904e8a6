//! In-process fakes shared by the unit test modules.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use crate::client::ClientShared;
use crate::config::ClientConfig;
use crate::http::{ConfigTransport, TransportError};
use crate::listener::{ConfigChangeEvent, ConfigChangeListener, ListenerError};
use crate::store::InMemoryStore;

enum Mode {
    /// Responses served in order; the last one repeats.
    Sequence(Vec<Result<String, u16>>),
    /// Responses keyed by application name; unknown applications get a 404.
    Routed(HashMap<String, Result<String, u16>>),
}

/// Transport double with scripted responses and a call counter.
pub(crate) struct FakeTransport {
    mode: Mode,
    calls: AtomicUsize,
}

impl FakeTransport {
    /// Serves the same body forever.
    pub(crate) fn always(body: &str) -> Self {
        Self::with_responses(vec![Ok(body.to_owned())])
    }

    /// Fails every request with the given status.
    pub(crate) fn failing(status: u16) -> Self {
        Self::with_responses(vec![Err(status)])
    }

    /// Serves the given bodies in order, repeating the last.
    pub(crate) fn with_bodies(bodies: Vec<String>) -> Self {
        Self::with_responses(bodies.into_iter().map(Ok).collect())
    }

    /// Serves the given outcomes in order, repeating the last.
    pub(crate) fn with_responses(responses: Vec<Result<String, u16>>) -> Self {
        Self {
            mode: Mode::Sequence(responses),
            calls: AtomicUsize::new(0),
        }
    }

    /// Serves outcomes keyed by application name.
    pub(crate) fn routed(
        routes: impl IntoIterator<Item = (String, Result<String, u16>)>,
    ) -> Self {
        Self {
            mode: Mode::Routed(routes.into_iter().collect()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of requests observed so far.
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConfigTransport for FakeTransport {
    async fn fetch_complete(
        &self,
        application: &str,
        _profile: &str,
    ) -> Result<String, TransportError> {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        let outcome = match &self.mode {
            Mode::Sequence(responses) => responses.get(index).or_else(|| responses.last()),
            Mode::Routed(routes) => routes.get(application),
        };
        match outcome {
            Some(Ok(body)) => Ok(body.clone()),
            Some(Err(status)) => Err(TransportError::Status(*status)),
            None => Err(TransportError::Status(404)),
        }
    }
}

/// Builds client internals over a fake transport and a fresh in-memory store.
pub(crate) fn shared_with(
    transport: Arc<dyn ConfigTransport>,
    config: ClientConfig,
) -> Arc<ClientShared> {
    ClientShared::new(config, transport, Arc::new(InMemoryStore::new()))
}

/// Listener double that records every event it receives.
pub(crate) struct RecordingListener {
    events: Mutex<Vec<ConfigChangeEvent>>,
}

impl RecordingListener {
    pub(crate) fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    /// Copy of the events received so far.
    pub(crate) fn events(&self) -> Vec<ConfigChangeEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ConfigChangeListener for RecordingListener {
    fn on_config_change(&self, event: &ConfigChangeEvent) -> Result<(), ListenerError> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
        Ok(())
    }
}
