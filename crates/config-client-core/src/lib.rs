//! Client-side configuration synchronization engine.
//!
//! The crate periodically pulls a configuration snapshot (key/value settings,
//! feature flags, secrets, metadata) from a remote config service, keeps a
//! concurrency-safe cached copy, detects semantic changes between snapshots,
//! fans change events out to subscribers, and exposes typed accessors with
//! health and statistics tracking.
//!
//! The entry point is [`ConfigClient::builder`]:
//!
//! ```no_run
//! use config_client_core::ConfigClient;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = ConfigClient::builder()
//!     .server_url("http://config.internal:8888")
//!     .application_name("orders")
//!     .profile("prod")
//!     .build()
//!     .await?;
//!
//! client.fetch_configuration().await?;
//! let pool_size: Option<i64> = client.config_value("pool.size");
//! # drop(pool_size);
//! client.close().await;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod diff;
pub mod fetcher;
pub mod http;
pub mod listener;
pub mod model;
mod scheduler;
pub mod status;
pub mod store;
pub mod telemetry;
#[cfg(test)]
pub(crate) mod test_support;

pub use client::{ConfigClient, ConfigClientBuilder};
pub use config::{ClientConfig, ConfigError, Credentials};
pub use diff::ChangeResult;
pub use fetcher::{AttemptError, FetchError, Fetcher};
pub use http::{ConfigTransport, HttpTransport, TransportError};
pub use listener::{
    ConfigChangeEvent, ConfigChangeListener, ListenerError, ListenerId, ListenerRegistry,
};
pub use model::{cache_key, Configuration, FromConfigValue};
pub use status::{ClientStatus, StatusSnapshot};
pub use store::{ConfigStore, InMemoryStore};
pub use telemetry::{ClientStatistics, StatsCollector};

#[cfg(test)]
mod tests {
    use super::*;

    /// Ensures the builder and its option types are reachable from the crate root.
    #[tokio::test]
    async fn builder_types_are_reexported() {
        let err = ConfigClient::builder()
            .profile("prod")
            .build()
            .await
            .expect_err("application name missing");
        assert!(matches!(err, ConfigError::MissingApplicationName));
    }

    /// Verifies the diff helpers exported at the crate root remain usable.
    #[test]
    fn diff_helpers_work_via_reexports() {
        let incoming = Configuration::empty("orders", "default");
        let result = diff::compare(None, &incoming);
        assert!(result.has_changed());
    }
}
