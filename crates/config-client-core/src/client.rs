//! Client facade composing fetcher, cache, diff, listeners, and stats.
//!
//! [`ConfigClient`] is the externally used object: it fetches snapshots,
//! answers typed lookups from the cached copy, fans out change events, and
//! controls the auto-refresh lifecycle. Internals live in [`ClientShared`],
//! an `Arc`-shared bundle the background workers hold alongside the facade.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, SystemTime};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{ClientConfig, ConfigError, Credentials};
use crate::diff::{self, ChangeResult};
use crate::fetcher::{FetchError, Fetcher};
use crate::http::{ConfigTransport, HttpTransport};
use crate::listener::{ConfigChangeEvent, ConfigChangeListener, ListenerId, ListenerRegistry};
use crate::model::{self, cache_key, Configuration, FromConfigValue};
use crate::scheduler::RefreshScheduler;
use crate::status::{ClientStatus, StatusSnapshot};
use crate::store::{ConfigStore, InMemoryStore};
use crate::telemetry::{ClientStatistics, StatsCollector};

/// Result of one accepted refresh: the new snapshot and what changed.
pub(crate) struct RefreshOutcome {
    pub(crate) configuration: Arc<Configuration>,
    pub(crate) change: ChangeResult,
}

/// Shared client internals used by the facade and background workers.
pub(crate) struct ClientShared {
    pub(crate) config: ClientConfig,
    pub(crate) store: Arc<dyn ConfigStore>,
    pub(crate) fetcher: Fetcher,
    pub(crate) listeners: ListenerRegistry,
    pub(crate) stats: StatsCollector,
    pub(crate) status: ClientStatus,
    pub(crate) cancel: CancellationToken,
    key: String,
    current: RwLock<Option<Arc<Configuration>>>,
    /// Serialises refresh cycles so two fetches never race to write the same
    /// cache key from one client.
    refresh_lock: tokio::sync::Mutex<()>,
}

impl ClientShared {
    /// Bundles the components behind one reference-counted handle.
    pub(crate) fn new(
        config: ClientConfig,
        transport: Arc<dyn ConfigTransport>,
        store: Arc<dyn ConfigStore>,
    ) -> Arc<Self> {
        let cancel = CancellationToken::new();
        let fetcher = Fetcher::new(
            transport,
            config.max_retries,
            config.retry_delay,
            cancel.clone(),
        );
        let key = cache_key(&config.application_name, &config.profile);
        Arc::new(Self {
            config,
            store,
            fetcher,
            listeners: ListenerRegistry::new(),
            stats: StatsCollector::new(),
            status: ClientStatus::new(),
            cancel,
            key,
            current: RwLock::new(None),
            refresh_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Cache key of this client's own application/profile pair.
    pub(crate) fn key(&self) -> &str {
        &self.key
    }

    /// Current in-memory snapshot, if one was accepted.
    pub(crate) fn current(&self) -> Option<Arc<Configuration>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Promotes a snapshot to be the current one.
    pub(crate) fn promote(&self, configuration: Arc<Configuration>) {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Some(configuration);
    }

    /// Drops the current snapshot (used by `close`).
    pub(crate) fn clear_current(&self) {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *guard = None;
    }

    /// Current snapshot, falling back to the cache. Never touches the network.
    pub(crate) fn current_or_cached(&self) -> Option<Arc<Configuration>> {
        self.current().or_else(|| self.store.get(&self.key))
    }

    /// Refreshes this client's own pair.
    pub(crate) async fn refresh_own(&self) -> Result<RefreshOutcome, FetchError> {
        let application = self.config.application_name.clone();
        let profile = self.config.profile.clone();
        self.refresh_target(&application, &profile).await
    }

    /// Performs one full refresh for a pair: fetch, diff against the cached
    /// entry, update the cache, notify listeners on change, record stats.
    pub(crate) async fn refresh_target(
        &self,
        application: &str,
        profile: &str,
    ) -> Result<RefreshOutcome, FetchError> {
        let _serialised = self.refresh_lock.lock().await;
        let started = Instant::now();
        self.stats.record_attempt();

        match self.fetcher.fetch(application, profile).await {
            Ok(configuration) => {
                let incoming = Arc::new(configuration);
                let key = cache_key(application, profile);
                let existing = self.store.get(&key);
                let change = diff::compare(existing.as_deref(), &incoming);
                self.store.put(&key, Arc::clone(&incoming));
                if key == self.key {
                    self.promote(Arc::clone(&incoming));
                }

                if change.has_changed() {
                    info!(
                        key = %key,
                        changes = change.description().unwrap_or_default(),
                        "configuration changed"
                    );
                    self.listeners.notify(&ConfigChangeEvent {
                        old: existing,
                        new: Arc::clone(&incoming),
                    });
                } else {
                    debug!(key = %key, "no configuration changes detected");
                }

                self.stats.record_success(started.elapsed());
                self.status.record_success(SystemTime::now());
                Ok(RefreshOutcome {
                    configuration: incoming,
                    change,
                })
            }
            Err(err) => {
                self.stats.record_failure();
                match &err {
                    FetchError::Cancelled => {
                        debug!(application, profile, "configuration refresh cancelled");
                    }
                    FetchError::RetriesExhausted { .. } => {
                        self.status.record_failure(&err.to_string());
                    }
                }
                Err(err)
            }
        }
    }
}

impl std::fmt::Debug for ClientShared {
    /// Keeps debug output concise by only printing the static configuration.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientShared")
            .field("config", &self.config)
            .finish()
    }
}

/// Configuration client for one application/profile pair.
///
/// Construct through [`ConfigClient::builder`]. Reads are answered from the
/// cached snapshot; only [`ConfigClient::configuration`] and the explicit
/// fetch/refresh operations touch the network.
#[derive(Debug)]
pub struct ConfigClient {
    shared: Arc<ClientShared>,
    scheduler: tokio::sync::Mutex<Option<Arc<RefreshScheduler>>>,
}

impl ConfigClient {
    /// Returns a builder with the documented defaults.
    pub fn builder() -> ConfigClientBuilder {
        ConfigClientBuilder::new()
    }

    pub(crate) fn from_shared(shared: Arc<ClientShared>) -> Self {
        Self {
            shared,
            scheduler: tokio::sync::Mutex::new(None),
        }
    }

    /// Static configuration this client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    /// Fetches the latest configuration synchronously.
    ///
    /// On success the cache is updated, listeners are notified when the
    /// snapshot changed, and the client is marked healthy. Exhausted retries
    /// mark it unhealthy and surface as [`FetchError`].
    pub async fn fetch_configuration(&self) -> Result<Arc<Configuration>, FetchError> {
        Ok(self.shared.refresh_own().await?.configuration)
    }

    /// Fetches the latest configuration on a background task.
    ///
    /// Same contract as [`ConfigClient::fetch_configuration`]; the caller
    /// observes completion or failure through the returned handle without
    /// blocking.
    pub fn fetch_configuration_background(
        &self,
    ) -> JoinHandle<Result<Arc<Configuration>, FetchError>> {
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move { Ok(shared.refresh_own().await?.configuration) })
    }

    /// Returns the current configuration snapshot.
    ///
    /// Serves the in-memory snapshot when present (cache hit), falls back to
    /// the cache, and only when both are absent performs a blocking fetch —
    /// the single read path allowed to do network I/O.
    pub async fn configuration(&self) -> Result<Arc<Configuration>, FetchError> {
        if let Some(current) = self.shared.current() {
            self.shared.stats.record_cache_hit();
            return Ok(current);
        }
        self.shared.stats.record_cache_miss();
        if let Some(cached) = self.shared.store.get(self.shared.key()) {
            self.shared.promote(Arc::clone(&cached));
            return Ok(cached);
        }
        Ok(self.shared.refresh_own().await?.configuration)
    }

    /// Looks up a configuration value and converts it to `T`.
    ///
    /// Reads the cached snapshot only; a missing key or failed conversion is
    /// `None`, never an error.
    pub fn config_value<T: FromConfigValue>(&self, key: &str) -> Option<T> {
        let snapshot = self.shared.current_or_cached()?;
        let value = snapshot.config().get(key)?;
        model::convert_value(key, value)
    }

    /// Looks up a configuration value as a string, falling back to `default`.
    pub fn config_value_or(&self, key: &str, default: impl Into<String>) -> String {
        self.config_value::<String>(key)
            .unwrap_or_else(|| default.into())
    }

    /// Looks up a configuration value and converts it structurally.
    ///
    /// For shapes beyond the scalar conversions of
    /// [`ConfigClient::config_value`] (lists, nested objects, custom types).
    pub fn config_struct<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let snapshot = self.shared.current_or_cached()?;
        let value = snapshot.config().get(key)?;
        match serde_json::from_value(value.clone()) {
            Ok(converted) => Some(converted),
            Err(err) => {
                debug!(key, %err, "configuration value did not convert structurally");
                None
            }
        }
    }

    /// Whether a feature flag is enabled; absent flags are disabled.
    pub fn is_feature_enabled(&self, name: &str) -> bool {
        self.shared
            .current_or_cached()
            .map(|snapshot| snapshot.features().get(name).copied().unwrap_or(false))
            .unwrap_or(false)
    }

    /// Looks up a secret value.
    pub fn secret(&self, key: &str) -> Option<String> {
        self.shared
            .current_or_cached()
            .and_then(|snapshot| snapshot.secrets().get(key).cloned())
    }

    /// Defensive copy of the current configuration settings.
    pub fn all_config(&self) -> BTreeMap<String, Value> {
        self.shared
            .current_or_cached()
            .map(|snapshot| snapshot.config().clone())
            .unwrap_or_default()
    }

    /// Defensive copy of the current feature flags.
    pub fn all_features(&self) -> BTreeMap<String, bool> {
        self.shared
            .current_or_cached()
            .map(|snapshot| snapshot.features().clone())
            .unwrap_or_default()
    }

    /// Defensive copy of the current secrets.
    pub fn all_secrets(&self) -> BTreeMap<String, String> {
        self.shared
            .current_or_cached()
            .map(|snapshot| snapshot.secrets().clone())
            .unwrap_or_default()
    }

    /// Manually triggers one refresh cycle, independent of auto-refresh.
    pub async fn refresh(&self) -> Result<(), FetchError> {
        self.shared.refresh_own().await.map(|_| ())
    }

    /// Manually triggers one refresh cycle on a background task.
    pub fn refresh_background(&self) -> JoinHandle<Result<(), FetchError>> {
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move { shared.refresh_own().await.map(|_| ()) })
    }

    /// Starts auto-refresh at the given cadence, replacing any running
    /// scheduler. The first refresh completes before this returns.
    pub async fn start_auto_refresh(&self, interval_minutes: u64) -> Result<(), ConfigError> {
        let minutes = if interval_minutes < 1 {
            warn!(
                interval_minutes,
                "auto refresh interval must be at least 1 minute; clamping"
            );
            1
        } else {
            interval_minutes
        };

        let mut slot = self.scheduler.lock().await;
        if let Some(previous) = slot.take() {
            debug!("replacing running auto-refresh scheduler");
            previous.stop().await;
        }

        let scheduler = Arc::new(RefreshScheduler::new(
            Arc::clone(&self.shared),
            vec![(
                self.shared.config.application_name.clone(),
                self.shared.config.profile.clone(),
            )],
        ));
        scheduler
            .start(
                Duration::from_secs(minutes * 60),
                self.shared.config.health_check_interval,
            )
            .await?;
        *slot = Some(scheduler);
        info!(interval_minutes = minutes, "started auto-refresh");
        Ok(())
    }

    /// Stops auto-refresh; a no-op when none is running.
    pub async fn stop_auto_refresh(&self) {
        let previous = self.scheduler.lock().await.take();
        if let Some(scheduler) = previous {
            scheduler.stop().await;
            info!("stopped auto-refresh");
        }
    }

    /// Whether an auto-refresh scheduler is currently running.
    pub async fn is_auto_refresh_running(&self) -> bool {
        self.scheduler
            .lock()
            .await
            .as_ref()
            .is_some_and(|scheduler| scheduler.is_running())
    }

    /// Registers a change listener and returns its removal handle.
    pub fn add_change_listener(&self, listener: Arc<dyn ConfigChangeListener>) -> ListenerId {
        self.shared.listeners.subscribe(listener)
    }

    /// Removes a change listener; returns whether it was still registered.
    pub fn remove_change_listener(&self, id: ListenerId) -> bool {
        self.shared.listeners.unsubscribe(id)
    }

    /// Whether the last refresh outcome was a success.
    pub fn is_healthy(&self) -> bool {
        self.shared.status.is_healthy()
    }

    /// Timestamp of the last successful refresh.
    pub fn last_refresh_time(&self) -> Option<SystemTime> {
        self.shared.status.last_refresh()
    }

    /// Point-in-time statistics snapshot.
    pub fn statistics(&self) -> ClientStatistics {
        self.shared.stats.snapshot()
    }

    /// Point-in-time health snapshot.
    pub fn status_snapshot(&self) -> StatusSnapshot {
        self.shared.status.snapshot()
    }

    /// Shuts the client down: cancels pending retry waits, stops
    /// auto-refresh (bounded by the scheduler grace period), and clears the
    /// cache. Safe to call more than once.
    pub async fn close(&self) {
        debug!("closing config client");
        self.shared.cancel.cancel();
        self.stop_auto_refresh().await;
        self.shared.store.clear();
        self.shared.clear_current();
    }
}

/// Builder assembling a [`ConfigClient`] from the recognised options.
pub struct ConfigClientBuilder {
    server_url: String,
    application_name: Option<String>,
    profile: String,
    credentials: Option<Credentials>,
    connect_timeout: Duration,
    read_timeout: Duration,
    max_retries: u32,
    retry_delay: Duration,
    auto_refresh: bool,
    auto_refresh_interval_minutes: u64,
    health_check_interval: Duration,
    store: Option<Arc<dyn ConfigStore>>,
    transport: Option<Arc<dyn ConfigTransport>>,
}

impl std::fmt::Debug for ConfigClientBuilder {
    /// Prints the wire-visible options; pluggable components are opaque.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigClientBuilder")
            .field("server_url", &self.server_url)
            .field("application_name", &self.application_name)
            .field("profile", &self.profile)
            .field("max_retries", &self.max_retries)
            .field("retry_delay", &self.retry_delay)
            .field("auto_refresh", &self.auto_refresh)
            .finish()
    }
}

impl ConfigClientBuilder {
    fn new() -> Self {
        let defaults = ClientConfig::new("");
        Self {
            server_url: defaults.server_url,
            application_name: None,
            profile: defaults.profile,
            credentials: None,
            connect_timeout: defaults.connect_timeout,
            read_timeout: defaults.read_timeout,
            max_retries: defaults.max_retries,
            retry_delay: defaults.retry_delay,
            auto_refresh: false,
            auto_refresh_interval_minutes: defaults.auto_refresh_interval_minutes,
            health_check_interval: defaults.health_check_interval,
            store: None,
            transport: None,
        }
    }

    /// Sets the config server base URL.
    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = url.into();
        self
    }

    /// Sets the application name (required).
    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }

    /// Sets the profile.
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = profile.into();
        self
    }

    /// Sets basic-auth credentials for the default transport.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(Credentials::new(username, password));
        self
    }

    /// Sets the connection-establishment timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the whole-request timeout.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Sets the total attempt budget per fetch.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Sets the base delay between fetch attempts.
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Enables auto-refresh at the given cadence.
    pub fn enable_auto_refresh(mut self, interval_minutes: u64) -> Self {
        self.auto_refresh = true;
        self.auto_refresh_interval_minutes = interval_minutes;
        self
    }

    /// Sets the health-check cadence used by auto-refresh.
    pub fn health_check_interval(mut self, interval: Duration) -> Self {
        self.health_check_interval = interval;
        self
    }

    /// Replaces the default in-memory store.
    pub fn with_store(mut self, store: Arc<dyn ConfigStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Replaces the default basic-auth HTTP transport.
    pub fn with_transport(mut self, transport: Arc<dyn ConfigTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Builds the client.
    ///
    /// Async because an `auto_refresh` configuration starts its scheduler —
    /// including the immediate first refresh — before the client is handed
    /// to the caller.
    pub async fn build(self) -> Result<ConfigClient, ConfigError> {
        let application_name = self
            .application_name
            .ok_or(ConfigError::MissingApplicationName)?;

        let config = ClientConfig {
            server_url: self.server_url,
            application_name,
            profile: self.profile,
            credentials: self.credentials,
            connect_timeout: self.connect_timeout,
            read_timeout: self.read_timeout,
            max_retries: self.max_retries,
            retry_delay: self.retry_delay,
            auto_refresh: self.auto_refresh,
            auto_refresh_interval_minutes: self.auto_refresh_interval_minutes,
            health_check_interval: self.health_check_interval,
        }
        .sanitise();

        let transport: Arc<dyn ConfigTransport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(
                &config.server_url,
                config.credentials.clone(),
                config.connect_timeout,
                config.read_timeout,
            )?),
        };
        let store: Arc<dyn ConfigStore> = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryStore::new()));

        let auto_refresh = config.auto_refresh;
        let interval_minutes = config.auto_refresh_interval_minutes;
        let shared = ClientShared::new(config, transport, store);
        let client = ConfigClient::from_shared(shared);
        if auto_refresh {
            client.start_auto_refresh(interval_minutes).await?;
        }
        Ok(client)
    }
}
