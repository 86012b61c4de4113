//! HTTP request handlers for the gateway.

pub mod chat;
pub mod dashboard;
pub mod health;
pub mod metrics;

pub use chat::{chat_feedback, chat_message};
pub use dashboard::{
    dashboard_insights, dashboard_overview, dashboard_recommendations, dashboard_summary,
    dashboard_transactions,
};
pub use health::health_check;
pub use metrics::metrics_handler;
