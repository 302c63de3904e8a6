//! HTTP transport for talking to the config server.
//!
//! The transport is the pluggable seam between the fetch logic and the wire:
//! it resolves `GET {base}/{application}/{profile}/complete` into a raw
//! response body and classifies everything else as an error. The production
//! implementation is a thin reqwest wrapper with optional basic-auth
//! credentials and bounded connect/read timeouts.

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::config::Credentials;
use std::time::Duration;

/// Path suffix of the full-configuration endpoint.
const COMPLETE_SUFFIX: &str = "complete";

/// Errors surfaced by a single transport request.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The server answered with a non-success status code.
    #[error("config server returned status {0}")]
    Status(u16),
    /// Transport-level issue (DNS, TLS, socket, timeout) or client build failure.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// One logical request against the remote config source.
///
/// Implementations must be safe to share across tasks; the fetch layer holds
/// the transport behind an `Arc` and calls it from background workers.
#[async_trait]
pub trait ConfigTransport: Send + Sync {
    /// Fetches the complete configuration document for an application/profile
    /// pair and returns the raw response body.
    async fn fetch_complete(
        &self,
        application: &str,
        profile: &str,
    ) -> Result<String, TransportError>;
}

/// Production transport: reqwest client with optional basic-auth credentials.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    credentials: Option<Credentials>,
}

impl HttpTransport {
    /// Builds a transport against the given base URL.
    ///
    /// `connect_timeout` bounds connection establishment and `read_timeout`
    /// bounds the whole request, so a single fetch attempt can never hang
    /// longer than the configured windows.
    pub fn new(
        base_url: &str,
        credentials: Option<Credentials>,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(read_timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            credentials,
        })
    }

    /// Base URL this transport targets.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ConfigTransport for HttpTransport {
    async fn fetch_complete(
        &self,
        application: &str,
        profile: &str,
    ) -> Result<String, TransportError> {
        let url = format!("{}/{application}/{profile}/{COMPLETE_SUFFIX}", self.base_url);
        debug!(%url, "config-client HTTP request");

        let mut request = self.client.get(&url);
        if let Some(credentials) = &self.credentials {
            request = request.basic_auth(&credentials.username, Some(&credentials.password));
        }

        let response = request.send().await?;
        let status = response.status();
        debug!(%url, status = status.as_u16(), "config-client HTTP response");
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }
        Ok(response.text().await?)
    }
}
