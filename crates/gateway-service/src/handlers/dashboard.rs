//! Dashboard handlers.
//!
//! The `user_id` path segment selects whose data is read; the verified
//! subject is what downstream services see as the caller.

use crate::models::{
    InsightsResponse, OverviewResponse, RecommendationsResponse, TransactionsQuery, WindowQuery,
};
use crate::routes::AppState;
use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use common::auth::IdentityClaims;
use common::error::ApiError;
use serde_json::Value;
use std::sync::Arc;
use tracing::instrument;

/// Handler for GET /v1/dashboard/users/:user_id/transactions
#[instrument(skip_all, name = "gw.handlers.dashboard_transactions")]
pub async fn dashboard_transactions(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<IdentityClaims>,
    Path(user_id): Path<String>,
    Query(query): Query<TransactionsQuery>,
) -> Result<Json<Value>, ApiError> {
    let body = state
        .aggregator
        .transactions(&user_id, &query, &claims.sub)
        .await?;
    Ok(Json(body))
}

/// Handler for GET /v1/dashboard/users/:user_id/summary
#[instrument(skip_all, name = "gw.handlers.dashboard_summary")]
pub async fn dashboard_summary(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<IdentityClaims>,
    Path(user_id): Path<String>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<Value>, ApiError> {
    let body = state
        .aggregator
        .summary(&user_id, query.window_days, &claims.sub)
        .await?;
    Ok(Json(body))
}

/// Handler for GET /v1/dashboard/users/:user_id/insights
#[instrument(skip_all, name = "gw.handlers.dashboard_insights")]
pub async fn dashboard_insights(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<IdentityClaims>,
    Path(user_id): Path<String>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<InsightsResponse>, ApiError> {
    let body = state
        .aggregator
        .insights(&user_id, query.window_days, &claims.sub)
        .await?;
    Ok(Json(body))
}

/// Handler for GET /v1/dashboard/users/:user_id/recommendations
#[instrument(skip_all, name = "gw.handlers.dashboard_recommendations")]
pub async fn dashboard_recommendations(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<IdentityClaims>,
    Path(user_id): Path<String>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<RecommendationsResponse>, ApiError> {
    let body = state
        .aggregator
        .recommendations(&user_id, query.window_days, &claims.sub)
        .await?;
    Ok(Json(body))
}

/// Handler for GET /v1/dashboard/users/:user_id/overview
///
/// Fetches the summary and the most recent transactions concurrently.
#[instrument(skip_all, name = "gw.handlers.dashboard_overview")]
pub async fn dashboard_overview(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<IdentityClaims>,
    Path(user_id): Path<String>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<OverviewResponse>, ApiError> {
    let body = state
        .aggregator
        .overview(&user_id, query.window_days, &claims.sub)
        .await?;
    Ok(Json(body))
}
