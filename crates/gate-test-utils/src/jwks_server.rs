//! Mock key-set endpoint for integration tests.
//!
//! Wraps a `wiremock` server that serves `/.well-known/jwks.json` and can be
//! switched between healthy, failing, slow and garbage responses mid-test.

use crate::crypto_fixtures::{jwks_json, TestSigningKey};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Path the mock serves the key set on.
pub const JWKS_PATH: &str = "/.well-known/jwks.json";

/// Test key-set server backed by wiremock.
pub struct TestJwksServer {
    mock_server: MockServer,
}

impl TestJwksServer {
    /// Start a server publishing the given keys.
    pub async fn start(keys: &[&TestSigningKey]) -> Self {
        let server = Self {
            mock_server: MockServer::start().await,
        };
        server.serve_keys(keys).await;
        server
    }

    /// Full URL of the key-set document.
    pub fn jwks_url(&self) -> String {
        format!("{}{}", self.mock_server.uri(), JWKS_PATH)
    }

    /// Replace whatever is mounted with a 200 response listing `keys`.
    pub async fn serve_keys(&self, keys: &[&TestSigningKey]) {
        self.mount(ResponseTemplate::new(200).set_body_json(jwks_json(keys)))
            .await;
    }

    /// Respond to every request with `status` and an empty body.
    pub async fn serve_status(&self, status: u16) {
        self.mount(ResponseTemplate::new(status)).await;
    }

    /// Respond with `status` after `delay`, like an endpoint failing slowly.
    pub async fn serve_status_delayed(&self, status: u16, delay: Duration) {
        self.mount(ResponseTemplate::new(status).set_delay(delay))
            .await;
    }

    /// Respond with 200 and an arbitrary raw body.
    pub async fn serve_raw(&self, body: &str) {
        self.mount(ResponseTemplate::new(200).set_body_string(body))
            .await;
    }

    /// Respond with the keys, but only after `delay`.
    pub async fn serve_keys_delayed(&self, keys: &[&TestSigningKey], delay: Duration) {
        self.mount(
            ResponseTemplate::new(200)
                .set_body_json(jwks_json(keys))
                .set_delay(delay),
        )
        .await;
    }

    /// Number of requests received so far.
    pub async fn request_count(&self) -> usize {
        self.mock_server
            .received_requests()
            .await
            .map(|requests| requests.len())
            .unwrap_or(0)
    }

    async fn mount(&self, response: ResponseTemplate) {
        // reset() also clears the recorded requests
        self.mock_server.reset().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(response)
            .mount(&self.mock_server)
            .await;
    }
}
