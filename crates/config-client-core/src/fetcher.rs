//! Bounded-retry fetch against the remote config source.
//!
//! One logical fetch performs up to `max_retries` attempts. Any transport
//! failure, non-success status, or body decode error counts as a failed
//! attempt; between attempts the fetcher backs off linearly
//! (`retry_delay * attempt_number`), and the backoff sleep races a
//! cancellation token so shutdown never waits out a retry schedule. The
//! fetcher never writes to the cache; applying an accepted snapshot is the
//! caller's job, which keeps this layer trivially testable with a fake
//! transport.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::http::{ConfigTransport, TransportError};
use crate::model::Configuration;

/// Failure of a single fetch attempt.
#[derive(Debug, Error)]
pub enum AttemptError {
    /// The transport call failed (network, timeout, or bad status).
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The response body could not be decoded as a configuration envelope.
    #[error("failed to decode configuration payload: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Failure of a logical fetch after all attempts were consumed.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Every attempt failed; wraps the last underlying cause.
    #[error("failed to fetch configuration after {attempts} attempts: {source}")]
    RetriesExhausted {
        /// Number of attempts performed.
        attempts: u32,
        /// Failure of the final attempt.
        #[source]
        source: AttemptError,
    },
    /// The fetch was cancelled while waiting to retry.
    #[error("configuration fetch cancelled during retry backoff")]
    Cancelled,
}

/// Performs one logical "get latest configuration" operation with retries.
pub struct Fetcher {
    transport: Arc<dyn ConfigTransport>,
    max_retries: u32,
    retry_delay: Duration,
    cancel: CancellationToken,
}

impl Fetcher {
    /// Builds a fetcher over the given transport.
    ///
    /// `max_retries` is the total attempt budget and is clamped to at least 1.
    /// The cancellation token aborts inter-attempt backoff waits; an in-flight
    /// transport call is always allowed to complete or time out naturally.
    pub fn new(
        transport: Arc<dyn ConfigTransport>,
        max_retries: u32,
        retry_delay: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            transport,
            max_retries: max_retries.max(1),
            retry_delay,
            cancel,
        }
    }

    /// Fetches and parses the latest configuration for a pair.
    pub async fn fetch(
        &self,
        application: &str,
        profile: &str,
    ) -> Result<Configuration, FetchError> {
        let mut attempt = 1u32;
        loop {
            debug!(
                application,
                profile, attempt, "config-client fetch attempt"
            );
            match self.attempt(application, profile).await {
                Ok(configuration) => {
                    debug!(application, profile, attempt, "config-client fetch succeeded");
                    return Ok(configuration);
                }
                Err(err) => {
                    if attempt >= self.max_retries {
                        return Err(FetchError::RetriesExhausted {
                            attempts: attempt,
                            source: err,
                        });
                    }
                    warn!(application, profile, attempt, %err, "config fetch attempt failed");
                    let backoff = self.retry_delay * attempt;
                    tokio::select! {
                        _ = self.cancel.cancelled() => {
                            debug!(application, profile, "config-client fetch cancelled during backoff");
                            return Err(FetchError::Cancelled);
                        }
                        _ = sleep(backoff) => {}
                    }
                    attempt += 1;
                }
            }
        }
    }

    async fn attempt(
        &self,
        application: &str,
        profile: &str,
    ) -> Result<Configuration, AttemptError> {
        let body = self.transport.fetch_complete(application, profile).await?;
        Ok(Configuration::parse(application, profile, &body)?)
    }
}

impl std::fmt::Debug for Fetcher {
    /// Keeps debug output concise by omitting the transport object.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher")
            .field("max_retries", &self.max_retries)
            .field("retry_delay", &self.retry_delay)
            .finish()
    }
}
