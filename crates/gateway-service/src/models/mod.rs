//! Request and response bodies for the gateway API.
//!
//! Downstream payloads the gateway only relays (transactions, summaries,
//! chat replies) stay as `serde_json::Value`; only what the gateway itself
//! validates or produces is typed here.

use serde::{Deserialize, Serialize};

/// Default transaction page size.
pub const DEFAULT_TRANSACTION_LIMIT: u32 = 200;

/// Transactions embedded in a dashboard overview.
pub const OVERVIEW_TRANSACTION_LIMIT: u32 = 20;

/// Default summary window in days.
pub const DEFAULT_WINDOW_DAYS: u32 = 90;

/// Liveness response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
}

/// Body of `POST /v1/chat/message`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessageRequest {
    pub user_id: String,
    pub conversation_id: String,
    pub message: String,
    #[serde(default)]
    pub history: Vec<serde_json::Value>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default = "default_modality")]
    pub modality: String,
}

fn default_modality() -> String {
    "text".to_string()
}

/// Body of `POST /v1/chat/feedback`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatFeedbackRequest {
    pub user_id: String,
    pub conversation_id: String,
    pub message_id: String,
    /// `like` or `dislike`.
    pub reaction: String,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Query for `GET /v1/dashboard/users/:user_id/transactions`.
#[derive(Debug, Clone, Deserialize)]
pub struct TransactionsQuery {
    pub start: Option<String>,
    pub end: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    DEFAULT_TRANSACTION_LIMIT
}

/// Query for the summary-derived dashboard endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct WindowQuery {
    #[serde(default = "default_window_days")]
    pub window_days: u32,
}

fn default_window_days() -> u32 {
    DEFAULT_WINDOW_DAYS
}

/// One derived spending insight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    /// `high`, `warning` or `stable`.
    pub level: String,
    pub title: String,
    pub description: String,
    pub impact: String,
    pub why: Vec<String>,
}

/// One derived product recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub product: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "match")]
    pub match_score: f64,
    pub why: Vec<String>,
    pub explanation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightsResponse {
    pub user_id: String,
    pub window_days: u32,
    pub insights: Vec<Insight>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationsResponse {
    pub user_id: String,
    pub window_days: u32,
    pub recommendations: Vec<Recommendation>,
}

/// Summary, recent transactions and everything derived from them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverviewResponse {
    pub user_id: String,
    pub window_days: u32,
    pub summary: serde_json::Value,
    pub recent_transactions: serde_json::Value,
    pub insights: Vec<Insight>,
    pub recommendations: Vec<Recommendation>,
}
