//! Gateway aggregator.
//!
//! Composes downstream calls into client-facing responses with one failure
//! policy:
//!
//! - A client-class failure (4xx) from any required call is relayed with its
//!   status and body unchanged
//! - Any other failure becomes a single masked `502`; the detail stays in
//!   the logs and never names the call that failed
//!
//! Independent calls run concurrently. When several fail, a client-class
//! failure wins over a server-class one, and among failures of the same
//! class the call declared first wins, so the outcome never depends on
//! which call finished first.

use crate::models::{
    ChatFeedbackRequest, ChatMessageRequest, InsightsResponse, OverviewResponse,
    RecommendationsResponse, TransactionsQuery, OVERVIEW_TRANSACTION_LIMIT,
};
use crate::services::downstream::{DownstreamClient, DownstreamError, Service};
use crate::services::insights::{derive_insights, derive_recommendations, SpendSummary};
use common::error::ApiError;
use serde_json::Value;
use tracing::{error, instrument};

/// Combine two independent outcomes.
///
/// Both must succeed. Otherwise the failure is chosen by class first
/// (client before server), then by declaration order.
pub fn combine<A, B>(
    first: Result<A, DownstreamError>,
    second: Result<B, DownstreamError>,
) -> Result<(A, B), DownstreamError> {
    match (first, second) {
        (Ok(a), Ok(b)) => Ok((a, b)),
        (Err(e), Ok(_)) | (Ok(_), Err(e)) => Err(e),
        (Err(first), Err(second)) => {
            if !first.is_client_error() && second.is_client_error() {
                Err(second)
            } else {
                Err(first)
            }
        }
    }
}

/// Downstream fan-out for the gateway endpoints.
///
/// `subject` is always the verified subject of the caller; it is the only
/// identity that reaches downstream services.
#[derive(Clone)]
pub struct GatewayAggregator {
    client: DownstreamClient,
}

impl GatewayAggregator {
    pub fn new(client: DownstreamClient) -> Self {
        Self { client }
    }

    /// Relay a chat message to the conversation service.
    ///
    /// # Errors
    ///
    /// Returns the mapped downstream failure.
    #[instrument(skip_all, name = "gw.aggregator.chat_message")]
    pub async fn chat_message(
        &self,
        request: &ChatMessageRequest,
        subject: &str,
    ) -> Result<Value, ApiError> {
        Ok(self
            .client
            .post_json(Service::Conversation, &["v1", "chat", "message"], request, subject)
            .await?)
    }

    /// Relay message feedback to the conversation service.
    ///
    /// # Errors
    ///
    /// Returns the mapped downstream failure.
    #[instrument(skip_all, name = "gw.aggregator.chat_feedback")]
    pub async fn chat_feedback(
        &self,
        request: &ChatFeedbackRequest,
        subject: &str,
    ) -> Result<Value, ApiError> {
        Ok(self
            .client
            .post_json(Service::Conversation, &["v1", "chat", "feedback"], request, subject)
            .await?)
    }

    /// Transactions for `user_id`.
    ///
    /// # Errors
    ///
    /// Returns the mapped downstream failure.
    #[instrument(skip_all, name = "gw.aggregator.transactions")]
    pub async fn transactions(
        &self,
        user_id: &str,
        query: &TransactionsQuery,
        subject: &str,
    ) -> Result<Value, ApiError> {
        Ok(self.fetch_transactions(user_id, query, subject).await?)
    }

    /// Transaction summary for `user_id` over `window_days`.
    ///
    /// # Errors
    ///
    /// Returns the mapped downstream failure.
    #[instrument(skip_all, name = "gw.aggregator.summary")]
    pub async fn summary(
        &self,
        user_id: &str,
        window_days: u32,
        subject: &str,
    ) -> Result<Value, ApiError> {
        Ok(self.fetch_summary(user_id, window_days, subject).await?)
    }

    /// Insights derived from the summary.
    ///
    /// # Errors
    ///
    /// Returns the mapped downstream failure, or a masked failure if the
    /// summary has an unexpected shape.
    #[instrument(skip_all, name = "gw.aggregator.insights")]
    pub async fn insights(
        &self,
        user_id: &str,
        window_days: u32,
        subject: &str,
    ) -> Result<InsightsResponse, ApiError> {
        let raw = self.fetch_summary(user_id, window_days, subject).await?;
        let summary = parse_summary(&raw)?;
        Ok(InsightsResponse {
            user_id: user_id.to_string(),
            window_days,
            insights: derive_insights(&summary, window_days),
        })
    }

    /// Product recommendations derived from the summary.
    ///
    /// # Errors
    ///
    /// Returns the mapped downstream failure, or a masked failure if the
    /// summary has an unexpected shape.
    #[instrument(skip_all, name = "gw.aggregator.recommendations")]
    pub async fn recommendations(
        &self,
        user_id: &str,
        window_days: u32,
        subject: &str,
    ) -> Result<RecommendationsResponse, ApiError> {
        let raw = self.fetch_summary(user_id, window_days, subject).await?;
        let summary = parse_summary(&raw)?;
        Ok(RecommendationsResponse {
            user_id: user_id.to_string(),
            window_days,
            recommendations: derive_recommendations(&summary),
        })
    }

    /// Summary and recent transactions fetched concurrently, plus
    /// everything derived from the summary.
    ///
    /// # Errors
    ///
    /// Returns the failure chosen by [`combine`], mapped for the client.
    #[instrument(skip_all, name = "gw.aggregator.overview")]
    pub async fn overview(
        &self,
        user_id: &str,
        window_days: u32,
        subject: &str,
    ) -> Result<OverviewResponse, ApiError> {
        let recent = TransactionsQuery {
            start: None,
            end: None,
            limit: OVERVIEW_TRANSACTION_LIMIT,
        };

        let (summary, transactions) = tokio::join!(
            self.fetch_summary(user_id, window_days, subject),
            self.fetch_transactions(user_id, &recent, subject),
        );
        let (raw_summary, recent_transactions) = combine(summary, transactions)?;

        let summary = parse_summary(&raw_summary)?;
        Ok(OverviewResponse {
            user_id: user_id.to_string(),
            window_days,
            insights: derive_insights(&summary, window_days),
            recommendations: derive_recommendations(&summary),
            summary: raw_summary,
            recent_transactions,
        })
    }

    async fn fetch_summary(
        &self,
        user_id: &str,
        window_days: u32,
        subject: &str,
    ) -> Result<Value, DownstreamError> {
        self.client
            .get_json(
                Service::Transaction,
                &["v1", "banking", "users", user_id, "summary"],
                &[("window_days", window_days.to_string())],
                subject,
            )
            .await
    }

    async fn fetch_transactions(
        &self,
        user_id: &str,
        query: &TransactionsQuery,
        subject: &str,
    ) -> Result<Value, DownstreamError> {
        let mut params = Vec::with_capacity(3);
        if let Some(start) = query.start.as_deref().filter(|s| !s.is_empty()) {
            params.push(("start", start.to_string()));
        }
        if let Some(end) = query.end.as_deref().filter(|s| !s.is_empty()) {
            params.push(("end", end.to_string()));
        }
        params.push(("limit", query.limit.to_string()));

        self.client
            .get_json(
                Service::Transaction,
                &["v1", "banking", "users", user_id, "transactions"],
                &params,
                subject,
            )
            .await
    }
}

fn parse_summary(raw: &Value) -> Result<SpendSummary, ApiError> {
    SpendSummary::from_value(raw).map_err(|e| {
        error!(
            target: "gw.services.aggregator",
            error = %e,
            "Transaction summary has an unexpected shape"
        );
        ApiError::DownstreamServerError(format!("unexpected summary shape: {e}"))
    })
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_error(status: u16) -> DownstreamError {
        DownstreamError::Client {
            service: "transaction",
            status: StatusCode::from_u16(status).unwrap(),
            body: format!("status {status}"),
        }
    }

    fn timeout() -> DownstreamError {
        DownstreamError::Timeout {
            service: "transaction",
        }
    }

    fn server_error(detail: &str) -> DownstreamError {
        DownstreamError::Server {
            service: "transaction",
            detail: detail.to_string(),
        }
    }

    #[test]
    fn test_combine_success() {
        let combined = combine::<u8, &str>(Ok(1), Ok("two")).unwrap();
        assert_eq!(combined, (1, "two"));
    }

    #[test]
    fn test_combine_single_failure_either_side() {
        let err = combine::<u8, u8>(Err(client_error(404)), Ok(1)).unwrap_err();
        assert!(matches!(err, DownstreamError::Client { status, .. } if status == StatusCode::NOT_FOUND));

        let err = combine::<u8, u8>(Ok(1), Err(timeout())).unwrap_err();
        assert!(matches!(err, DownstreamError::Timeout { .. }));
    }

    #[test]
    fn test_combine_client_failure_wins_over_server_failure() {
        let err = combine::<u8, u8>(Err(timeout()), Err(client_error(403))).unwrap_err();
        assert!(matches!(err, DownstreamError::Client { status, .. } if status == StatusCode::FORBIDDEN));

        let err = combine::<u8, u8>(Err(client_error(404)), Err(server_error("boom"))).unwrap_err();
        assert!(matches!(err, DownstreamError::Client { status, .. } if status == StatusCode::NOT_FOUND));
    }

    #[test]
    fn test_combine_first_declared_wins_among_equals() {
        let err = combine::<u8, u8>(Err(client_error(404)), Err(client_error(409))).unwrap_err();
        assert!(matches!(err, DownstreamError::Client { status, .. } if status == StatusCode::NOT_FOUND));

        let err = combine::<u8, u8>(Err(server_error("first")), Err(timeout())).unwrap_err();
        assert!(matches!(err, DownstreamError::Server { ref detail, .. } if detail == "first"));
    }

    fn aggregator_for(server: &MockServer) -> GatewayAggregator {
        GatewayAggregator::new(
            DownstreamClient::new(server.uri(), server.uri(), Duration::from_millis(500)).unwrap(),
        )
    }

    fn summary_body() -> Value {
        json!({
            "user_id": "u1",
            "window_days": 90,
            "spend_total": 4200.0,
            "income_total": 5000.0,
            "tx_count": 42,
            "installment_ratio": 0.4,
            "top_categories": [{"category": "Travel", "amount": 2100.0}]
        })
    }

    #[tokio::test]
    async fn test_overview_combines_both_calls() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/banking/users/u1/summary"))
            .and(query_param("window_days", "90"))
            .respond_with(ResponseTemplate::new(200).set_body_json(summary_body()))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/banking/users/u1/transactions"))
            .and(query_param("limit", "20"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"amount": 12.5}])))
            .expect(1)
            .mount(&server)
            .await;

        let overview = aggregator_for(&server).overview("u1", 90, "sub-1").await.unwrap();

        assert_eq!(overview.user_id, "u1");
        assert_eq!(overview.summary["tx_count"], 42);
        assert_eq!(overview.recent_transactions[0]["amount"], 12.5);
        assert_eq!(overview.insights.len(), 2);
        assert_eq!(overview.recommendations.len(), 3);
    }

    #[tokio::test]
    async fn test_overview_relays_client_failure_over_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/banking/users/u1/summary"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(summary_body())
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/banking/users/u1/transactions"))
            .respond_with(ResponseTemplate::new(404).set_body_string("user not found"))
            .mount(&server)
            .await;

        let err = aggregator_for(&server).overview("u1", 90, "sub-1").await.unwrap_err();

        match err {
            ApiError::DownstreamClientError { status, message } => {
                assert_eq!(status, StatusCode::NOT_FOUND);
                assert_eq!(message, "user not found");
            }
            other => panic!("expected client error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_transactions_omits_empty_filters() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/banking/users/u1/transactions"))
            .and(query_param("start", "2024-01-01"))
            .and(query_param("limit", "200"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let query = TransactionsQuery {
            start: Some("2024-01-01".to_string()),
            end: Some(String::new()),
            limit: 200,
        };
        let body = aggregator_for(&server)
            .transactions("u1", &query, "sub-1")
            .await
            .unwrap();
        assert_eq!(body, json!([]));

        let requests = server.received_requests().await.unwrap();
        let url = &requests[0].url;
        assert!(url.query_pairs().all(|(k, _)| k != "end"));
    }

    #[tokio::test]
    async fn test_insights_mask_malformed_summary() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/banking/users/u1/summary"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(["not", "a", "summary"])))
            .mount(&server)
            .await;

        let err = aggregator_for(&server).insights("u1", 30, "sub-1").await.unwrap_err();
        assert!(matches!(err, ApiError::DownstreamServerError(_)));
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    }
}
