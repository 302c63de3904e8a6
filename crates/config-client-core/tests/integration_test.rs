//! End-to-end tests driving the client against a mock config server.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use httptest::matchers::request;
use httptest::responders::{json_encoded, status_code};
use httptest::{cycle, Expectation, Server};
use serde_json::json;

use config_client_core::{
    diff, ConfigChangeEvent, ConfigChangeListener, ConfigClient, FetchError, ListenerError,
};

/// Listener that records every event it receives.
struct RecordingListener {
    events: Mutex<Vec<ConfigChangeEvent>>,
}

impl RecordingListener {
    fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    fn events(&self) -> Vec<ConfigChangeEvent> {
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

async fn client_for(server: &Server, application: &str) -> ConfigClient {
    ConfigClient::builder()
        .server_url(server.url_str("").trim_end_matches('/'))
        .application_name(application)
        .max_retries(3)
        .retry_delay(Duration::from_millis(10))
        .build()
        .await
        .expect("client build")
}

/// A fetched value is retrievable through the typed accessor.
#[tokio::test]
async fn fetch_then_typed_lookup() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/app1/default/complete"))
            .respond_with(json_encoded(json!({"config": {"a": "1"}}))),
    );

    let client = client_for(&server, "app1").await;
    client.fetch_configuration().await.expect("fetch");
    assert_eq!(client.config_value::<String>("a").as_deref(), Some("1"));
    client.close().await;
}

/// A second fetch with an added key produces one change event carrying the
/// old and new snapshots, and the diff names the added key.
#[tokio::test]
async fn change_between_fetches_notifies_listener() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/app1/default/complete"))
            .times(2)
            .respond_with(cycle![
                json_encoded(json!({"config": {"a": "1"}})),
                json_encoded(json!({"config": {"a": "1", "b": "2"}})),
            ]),
    );

    let client = client_for(&server, "app1").await;
    client.fetch_configuration().await.expect("first fetch");

    let listener = Arc::new(RecordingListener::new());
    client.add_change_listener(listener.clone());
    client.fetch_configuration().await.expect("second fetch");

    let events = listener.events();
    assert_eq!(events.len(), 1);
    let event = &events[0];
    let old = event.old.as_ref().expect("old snapshot present");
    assert_eq!(old.config().get("a"), Some(&json!("1")));
    assert!(!old.config().contains_key("b"));
    assert_eq!(event.new.config().get("b"), Some(&json!("2")));

    let change = diff::compare(Some(old.as_ref()), event.new.as_ref());
    assert!(change.has_changed());
    assert_eq!(change.description(), Some("added: b"));
    client.close().await;
}

/// A source that fails every attempt exhausts the retry budget, marks the
/// client unhealthy, and counts exactly one failed refresh.
#[tokio::test]
async fn persistent_failure_marks_client_unhealthy() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/app1/default/complete"))
            .times(3)
            .respond_with(status_code(500)),
    );

    let client = client_for(&server, "app1").await;
    let err = client
        .fetch_configuration()
        .await
        .expect_err("retries exhausted");
    assert!(matches!(
        err,
        FetchError::RetriesExhausted { attempts: 3, .. }
    ));
    assert!(!client.is_healthy());

    let stats = client.statistics();
    assert_eq!(stats.failed_refreshes, 1);
    assert_eq!(stats.total_refreshes, 1);
    assert_eq!(stats.successful_refreshes, 0);
    client.close().await;
}

/// After a successful fetch, reads are served from the cache with no further
/// network traffic; the expectation server enforces the single request.
#[tokio::test]
async fn reads_after_fetch_stay_off_the_network() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/app1/default/complete"))
            .times(1)
            .respond_with(json_encoded(json!({
                "config": {"a": "1"},
                "features": {"beta": true},
                "secrets": {"token": "s3cr3t"}
            }))),
    );

    let client = client_for(&server, "app1").await;
    let fetched = client.fetch_configuration().await.expect("fetch");

    let read_back = client.configuration().await.expect("cached read");
    assert_eq!(*read_back, *fetched);
    assert!(client.is_feature_enabled("beta"));
    assert_eq!(client.secret("token").as_deref(), Some("s3cr3t"));
    assert_eq!(client.statistics().cache_hits, 1);
    client.close().await;
}

/// Profiles are addressed independently on the wire.
#[tokio::test]
async fn profile_selects_the_endpoint_path() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/app1/prod/complete"))
            .respond_with(json_encoded(json!({"config": {"env": "prod"}}))),
    );

    let client = ConfigClient::builder()
        .server_url(server.url_str("").trim_end_matches('/'))
        .application_name("app1")
        .profile("prod")
        .retry_delay(Duration::from_millis(10))
        .build()
        .await
        .expect("client build");
    let configuration = client.fetch_configuration().await.expect("fetch");
    assert_eq!(configuration.profile(), "prod");
    assert_eq!(configuration.cache_key(), "app1-prod");
    client.close().await;
}

/// A transient outage recovers on a later attempt within the same fetch and
/// restores health after a previous exhausted failure.
#[tokio::test]
async fn transient_outage_recovers_within_one_fetch() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/app1/default/complete"))
            .times(2)
            .respond_with(cycle![
                status_code(503),
                json_encoded(json!({"config": {"a": "1"}})),
            ]),
    );

    let client = client_for(&server, "app1").await;
    client.fetch_configuration().await.expect("fetch");
    assert!(client.is_healthy());
    assert!(client.last_refresh_time().is_some());

    let stats = client.statistics();
    assert_eq!(stats.successful_refreshes, 1);
    assert_eq!(stats.failed_refreshes, 0);
    client.close().await;
}
