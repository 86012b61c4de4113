//! HTTP client for the conversation and transaction services.
//!
//! # Security
//!
//! - The caller's identity is forwarded as `x-user-id: <verified sub>`; the
//!   inbound `Authorization` header is never forwarded
//! - Every call carries a fixed timeout; a timeout is reported the same way
//!   as an unreachable service
//! - Server-class failures are logged here with full detail and surface to
//!   clients only as a generic failure

use crate::observability::metrics::record_downstream_request;
use common::error::ApiError;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::Serialize;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, instrument, warn};

/// Header carrying the verified subject to downstream services.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Connection establishment timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Collaborator services behind the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Conversation,
    Transaction,
}

impl Service {
    pub fn name(self) -> &'static str {
        match self {
            Service::Conversation => "conversation",
            Service::Transaction => "transaction",
        }
    }
}

/// Failed outcome of one downstream call.
#[derive(Debug, Clone, Error)]
pub enum DownstreamError {
    /// The service rejected the request (4xx). Relayed to the client as is.
    #[error("{service} returned {status}")]
    Client {
        service: &'static str,
        status: StatusCode,
        body: String,
    },

    /// The service failed (5xx, unexpected status or unreadable body).
    #[error("{service} failed: {detail}")]
    Server {
        service: &'static str,
        detail: String,
    },

    #[error("{service} timed out")]
    Timeout { service: &'static str },

    #[error("{service} unreachable: {detail}")]
    Unreachable {
        service: &'static str,
        detail: String,
    },
}

impl DownstreamError {
    pub fn is_client_error(&self) -> bool {
        matches!(self, DownstreamError::Client { .. })
    }

    fn outcome(&self) -> &'static str {
        match self {
            DownstreamError::Client { .. } => "client_error",
            DownstreamError::Timeout { .. } => "timeout",
            DownstreamError::Server { .. } | DownstreamError::Unreachable { .. } => {
                "server_error"
            }
        }
    }
}

impl From<DownstreamError> for ApiError {
    fn from(err: DownstreamError) -> Self {
        match err {
            DownstreamError::Client { status, body, .. } => ApiError::DownstreamClientError {
                status,
                message: body,
            },
            other => ApiError::DownstreamServerError(other.to_string()),
        }
    }
}

/// Result of one downstream call.
pub type DownstreamResult = Result<serde_json::Value, DownstreamError>;

/// Client for the collaborator services.
#[derive(Clone)]
pub struct DownstreamClient {
    client: Client,
    conversation_url: String,
    transaction_url: String,
}

impl DownstreamClient {
    /// Create a client with the given per-call timeout.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Internal` if the HTTP client cannot be built.
    pub fn new(
        conversation_url: String,
        transaction_url: String,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT.min(timeout))
            .build()
            .map_err(|e| {
                error!(target: "gw.services.downstream", error = %e, "Failed to build HTTP client");
                ApiError::Internal
            })?;

        Ok(Self {
            client,
            conversation_url,
            transaction_url,
        })
    }

    /// `GET` a JSON document.
    ///
    /// # Errors
    ///
    /// Returns a [`DownstreamError`] describing how the call failed.
    #[instrument(skip(self, query, user_id), fields(service = service.name()))]
    pub async fn get_json(
        &self,
        service: Service,
        segments: &[&str],
        query: &[(&str, String)],
        user_id: &str,
    ) -> DownstreamResult {
        let url = self.endpoint(service, segments)?;
        let request = self
            .client
            .get(url.clone())
            .query(query)
            .header(USER_ID_HEADER, user_id);
        self.execute(service, &url, request).await
    }

    /// `POST` a JSON body and read a JSON document back.
    ///
    /// # Errors
    ///
    /// Returns a [`DownstreamError`] describing how the call failed.
    #[instrument(skip(self, body, user_id), fields(service = service.name()))]
    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        service: Service,
        segments: &[&str],
        body: &B,
        user_id: &str,
    ) -> DownstreamResult {
        let url = self.endpoint(service, segments)?;
        let request = self
            .client
            .post(url.clone())
            .json(body)
            .header(USER_ID_HEADER, user_id);
        self.execute(service, &url, request).await
    }

    /// Base URL of `service` with `segments` appended, each percent-encoded.
    fn endpoint(&self, service: Service, segments: &[&str]) -> Result<Url, DownstreamError> {
        let base = match service {
            Service::Conversation => &self.conversation_url,
            Service::Transaction => &self.transaction_url,
        };

        let invalid = |detail: String| {
            error!(target: "gw.services.downstream", service = service.name(), detail = %detail, "Invalid downstream base URL");
            DownstreamError::Server {
                service: service.name(),
                detail,
            }
        };

        let mut url = Url::parse(base).map_err(|e| invalid(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| invalid("base URL cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn execute(&self, service: Service, url: &Url, request: RequestBuilder) -> DownstreamResult {
        let start = Instant::now();
        let result = Self::send(service, url, request).await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.outcome(),
        };
        record_downstream_request(service.name(), outcome, start.elapsed());

        result
    }

    async fn send(service: Service, url: &Url, request: RequestBuilder) -> DownstreamResult {
        let name = service.name();
        let path = url.path();

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                warn!(
                    target: "gw.services.downstream",
                    service = name,
                    path = %path,
                    error = %e,
                    "Downstream request timed out"
                );
                DownstreamError::Timeout { service: name }
            } else {
                error!(
                    target: "gw.services.downstream",
                    service = name,
                    path = %path,
                    error = %e,
                    "Downstream request failed"
                );
                DownstreamError::Unreachable {
                    service: name,
                    detail: e.to_string(),
                }
            }
        })?;

        let status = response.status();

        if status.is_client_error() {
            // An unreadable rejection body is masked like a server failure
            let body = response.text().await.map_err(|e| {
                error!(
                    target: "gw.services.downstream",
                    service = name,
                    path = %path,
                    status = %status,
                    error = %e,
                    "Failed to read downstream rejection body"
                );
                if e.is_timeout() {
                    DownstreamError::Timeout { service: name }
                } else {
                    DownstreamError::Server {
                        service: name,
                        detail: format!("unreadable {status} body"),
                    }
                }
            })?;
            debug!(
                target: "gw.services.downstream",
                service = name,
                path = %path,
                status = %status,
                "Downstream rejected request"
            );
            return Err(DownstreamError::Client {
                service: name,
                status,
                body,
            });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(
                target: "gw.services.downstream",
                service = name,
                path = %path,
                status = %status,
                body = %body,
                "Downstream returned server error"
            );
            return Err(DownstreamError::Server {
                service: name,
                detail: format!("status {status}"),
            });
        }

        response.json().await.map_err(|e| {
            if e.is_timeout() {
                warn!(
                    target: "gw.services.downstream",
                    service = name,
                    path = %path,
                    error = %e,
                    "Downstream response body timed out"
                );
                return DownstreamError::Timeout { service: name };
            }
            error!(
                target: "gw.services.downstream",
                service = name,
                path = %path,
                error = %e,
                "Failed to parse downstream response"
            );
            DownstreamError::Server {
                service: name,
                detail: "unreadable response body".to_string(),
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn client_for(server: &MockServer, timeout: Duration) -> DownstreamClient {
        DownstreamClient::new(server.uri(), server.uri(), timeout).unwrap()
    }

    #[tokio::test]
    async fn test_get_forwards_identity_and_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/banking/users/alice/summary"))
            .and(query_param("window_days", "30"))
            .and(header(USER_ID_HEADER, "alice-sub"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, Duration::from_secs(5));
        let body = client
            .get_json(
                Service::Transaction,
                &["v1", "banking", "users", "alice", "summary"],
                &[("window_days", "30".to_string())],
                "alice-sub",
            )
            .await
            .unwrap();
        assert_eq!(body["ok"], true);
    }

    #[tokio::test]
    async fn test_authorization_header_is_never_sent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/message"))
            .and(body_json(serde_json::json!({"message": "hi"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"reply": "hello"})))
            .mount(&server)
            .await;

        let client = client_for(&server, Duration::from_secs(5));
        let body = client
            .post_json(
                Service::Conversation,
                &["v1", "chat", "message"],
                &serde_json::json!({"message": "hi"}),
                "alice",
            )
            .await
            .unwrap();
        assert_eq!(body["reply"], "hello");
    }

    #[tokio::test]
    async fn test_path_segments_are_encoded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(|req: &Request| {
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"path": req.url.path()}))
            })
            .mount(&server)
            .await;

        let client = client_for(&server, Duration::from_secs(5));
        let body = client
            .get_json(Service::Transaction, &["users", "a/b c"], &[], "u")
            .await
            .unwrap();
        assert_eq!(body["path"], "/users/a%2Fb%20c");
    }

    #[tokio::test]
    async fn test_client_error_keeps_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("user not found"))
            .mount(&server)
            .await;

        let client = client_for(&server, Duration::from_secs(5));
        let err = client
            .get_json(Service::Transaction, &["x"], &[], "u")
            .await
            .unwrap_err();

        assert!(err.is_client_error());
        match ApiError::from(err) {
            ApiError::DownstreamClientError { status, message } => {
                assert_eq!(status, StatusCode::NOT_FOUND);
                assert_eq!(message, "user not found");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_truncated_client_error_body_is_server_error() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        // Promise 64 bytes of body, send 5, then hang up
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            let _ = socket
                .write_all(b"HTTP/1.1 404 Not Found\r\ncontent-length: 64\r\n\r\nshort")
                .await;
        });

        let base = format!("http://{addr}");
        let client = DownstreamClient::new(base.clone(), base, Duration::from_secs(5)).unwrap();
        let err = client
            .get_json(Service::Transaction, &["x"], &[], "u")
            .await
            .unwrap_err();

        assert!(!err.is_client_error());
        assert!(matches!(ApiError::from(err), ApiError::DownstreamServerError(_)));
    }

    #[tokio::test]
    async fn test_server_error_is_masked() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("stack trace here"))
            .mount(&server)
            .await;

        let client = client_for(&server, Duration::from_secs(5));
        let err = client
            .get_json(Service::Transaction, &["x"], &[], "u")
            .await
            .unwrap_err();

        assert!(matches!(err, DownstreamError::Server { .. }));
        assert!(matches!(ApiError::from(err), ApiError::DownstreamServerError(_)));
    }

    #[tokio::test]
    async fn test_timeout_is_reported_as_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({}))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let client = client_for(&server, Duration::from_millis(200));
        let err = client
            .get_json(Service::Transaction, &["slow"], &[], "u")
            .await
            .unwrap_err();

        assert!(matches!(err, DownstreamError::Timeout { .. }));
        assert!(matches!(ApiError::from(err), ApiError::DownstreamServerError(_)));
    }

    #[tokio::test]
    async fn test_unreachable_service() {
        // Port 9 (discard) on loopback is not listening in test environments
        let client = DownstreamClient::new(
            "http://127.0.0.1:9".to_string(),
            "http://127.0.0.1:9".to_string(),
            Duration::from_secs(2),
        )
        .unwrap();

        let err = client
            .get_json(Service::Conversation, &["x"], &[], "u")
            .await
            .unwrap_err();
        assert!(!err.is_client_error());
        assert!(matches!(ApiError::from(err), ApiError::DownstreamServerError(_)));
    }

    #[tokio::test]
    async fn test_non_json_success_body_is_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let client = client_for(&server, Duration::from_secs(5));
        let err = client
            .get_json(Service::Transaction, &["x"], &[], "u")
            .await
            .unwrap_err();
        assert!(matches!(err, DownstreamError::Server { .. }));
    }
}
