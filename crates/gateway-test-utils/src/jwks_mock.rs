//! Mocked key-set endpoint.

use common::testing::{jwks_json, TestKeypair};
use std::collections::HashMap;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Path the mock serves the key set on.
pub const JWKS_PATH: &str = "/.well-known/jwks.json";

/// A running key-set endpoint publishing a fixed set of test keys.
pub struct MockJwks {
    server: MockServer,
}

impl MockJwks {
    /// Start a server publishing `keys`.
    pub async fn start(keys: &[&TestKeypair]) -> Self {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks_json(keys)))
            .mount(&server)
            .await;
        Self { server }
    }

    /// Start a server whose key-set endpoint always fails with `status`.
    pub async fn failing(status: u16) -> Self {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(status))
            .mount(&server)
            .await;
        Self { server }
    }

    /// Full URL of the key set.
    pub fn url(&self) -> String {
        format!("{}{}", self.server.uri(), JWKS_PATH)
    }

    /// Number of key-set fetches served so far.
    pub async fn fetch_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map_or(0, |requests| requests.len())
    }

    /// Gateway environment pointing verification at this key set.
    pub fn gateway_vars(&self) -> HashMap<String, String> {
        HashMap::from([("JWKS_URL".to_string(), self.url())])
    }
}
