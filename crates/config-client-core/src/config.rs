//! Static configuration for the config client runtime.
//!
//! These settings describe how the client reaches the config server and how
//! its background workers behave. Out-of-range values are clamped with a
//! warning rather than rejected, so embedders inherit safe limits even when
//! they pass nonsense.

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::http::TransportError;

/// Default config server base URL.
pub const DEFAULT_SERVER_URL: &str = "http://localhost:8888";
/// Default profile when none is configured.
pub const DEFAULT_PROFILE: &str = "default";
/// Default connection-establishment timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Default whole-request timeout.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);
/// Default number of fetch attempts per logical fetch.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default base delay between fetch attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);
/// Default auto-refresh cadence in minutes.
pub const DEFAULT_AUTO_REFRESH_INTERVAL_MINUTES: u64 = 5;
/// Default cadence for the cache health check.
pub const DEFAULT_HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(600);

/// Errors raised while constructing a client.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The builder was finalised without an application name.
    #[error("application name is required")]
    MissingApplicationName,
    /// A stopped scheduler cannot be restarted; a new one must be created.
    #[error("scheduler is stopped and cannot be restarted")]
    SchedulerStopped,
    /// The HTTP transport could not be constructed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Basic-auth credentials forwarded to the config server.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Username presented to the server.
    pub username: String,
    /// Password presented to the server.
    pub password: String,
}

impl Credentials {
    /// Builds a credential pair.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    /// Redacts the password so credentials never leak through debug logging.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Configuration values that control the client runtime.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Config server base URL.
    pub server_url: String,
    /// Application name to fetch configuration for.
    pub application_name: String,
    /// Profile to fetch configuration for.
    pub profile: String,
    /// Optional basic-auth credentials.
    pub credentials: Option<Credentials>,
    /// Connection-establishment timeout per attempt.
    pub connect_timeout: Duration,
    /// Whole-request timeout per attempt.
    pub read_timeout: Duration,
    /// Total fetch attempts per logical fetch (at least 1).
    pub max_retries: u32,
    /// Base delay between attempts; attempt `n` waits `retry_delay * n`.
    pub retry_delay: Duration,
    /// Whether an auto-refresh scheduler starts with the client.
    pub auto_refresh: bool,
    /// Auto-refresh cadence in minutes (at least 1).
    pub auto_refresh_interval_minutes: u64,
    /// Cadence for the cache health check.
    pub health_check_interval: Duration,
}

impl ClientConfig {
    /// Returns the default configuration for the given application.
    pub fn new(application_name: impl Into<String>) -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_owned(),
            application_name: application_name.into(),
            profile: DEFAULT_PROFILE.to_owned(),
            credentials: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            auto_refresh: false,
            auto_refresh_interval_minutes: DEFAULT_AUTO_REFRESH_INTERVAL_MINUTES,
            health_check_interval: DEFAULT_HEALTH_CHECK_INTERVAL,
        }
    }

    /// Applies safety limits to the runtime settings.
    ///
    /// Clamps the retry and refresh knobs into their supported ranges and
    /// normalises the server URL, logging every adjustment.
    pub(crate) fn sanitise(mut self) -> Self {
        let trimmed = self.server_url.trim_end_matches('/');
        if trimmed.len() != self.server_url.len() {
            self.server_url = trimmed.to_owned();
        }

        if self.max_retries < 1 {
            warn!(
                max_retries = self.max_retries,
                "max retries must be at least 1; clamping"
            );
            self.max_retries = 1;
        }

        if self.auto_refresh_interval_minutes < 1 {
            warn!(
                interval_minutes = self.auto_refresh_interval_minutes,
                "auto refresh interval must be at least 1 minute; clamping"
            );
            self.auto_refresh_interval_minutes = 1;
        }

        if self.connect_timeout.is_zero() {
            warn!(
                "connect timeout must be > 0; using default {:?}",
                DEFAULT_CONNECT_TIMEOUT
            );
            self.connect_timeout = DEFAULT_CONNECT_TIMEOUT;
        }

        if self.read_timeout.is_zero() {
            warn!(
                "read timeout must be > 0; using default {:?}",
                DEFAULT_READ_TIMEOUT
            );
            self.read_timeout = DEFAULT_READ_TIMEOUT;
        }

        if self.health_check_interval.is_zero() {
            warn!(
                "health check interval must be > 0; using default {:?}",
                DEFAULT_HEALTH_CHECK_INTERVAL
            );
            self.health_check_interval = DEFAULT_HEALTH_CHECK_INTERVAL;
        }

        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Defaults mirror the documented recognised options.
    #[test]
    fn defaults_match_documented_values() {
        let config = ClientConfig::new("orders");
        assert_eq!(config.server_url, DEFAULT_SERVER_URL);
        assert_eq!(config.profile, DEFAULT_PROFILE);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay, Duration::from_millis(1000));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.read_timeout, Duration::from_secs(30));
        assert!(!config.auto_refresh);
        assert_eq!(config.auto_refresh_interval_minutes, 5);
    }

    /// Out-of-range knobs are clamped instead of rejected.
    #[test]
    fn sanitise_clamps_out_of_range_values() {
        let config = ClientConfig {
            server_url: "http://localhost:8888///".into(),
            max_retries: 0,
            auto_refresh_interval_minutes: 0,
            connect_timeout: Duration::ZERO,
            read_timeout: Duration::ZERO,
            health_check_interval: Duration::ZERO,
            ..ClientConfig::new("orders")
        }
        .sanitise();

        assert_eq!(config.server_url, "http://localhost:8888");
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.auto_refresh_interval_minutes, 1);
        assert_eq!(config.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
        assert_eq!(config.read_timeout, DEFAULT_READ_TIMEOUT);
        assert_eq!(config.health_check_interval, DEFAULT_HEALTH_CHECK_INTERVAL);
    }

    /// In-range values pass through sanitisation untouched.
    #[test]
    fn sanitise_preserves_valid_values() {
        let config = ClientConfig {
            max_retries: 7,
            retry_delay: Duration::ZERO,
            ..ClientConfig::new("orders")
        }
        .sanitise();
        assert_eq!(config.max_retries, 7);
        assert_eq!(config.retry_delay, Duration::ZERO);
    }

    /// Debug output never includes the password.
    #[test]
    fn credentials_debug_redacts_password() {
        let rendered = format!("{:?}", Credentials::new("svc", "hunter2"));
        assert!(rendered.contains("svc"));
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }
}
