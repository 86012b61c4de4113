//! Service layer for the gateway.
//!
//! - `downstream` - HTTP client for the conversation and transaction services
//! - `aggregator` - fan-out and failure policy for client-facing operations
//! - `insights` - pure insight and recommendation heuristics

pub mod aggregator;
pub mod downstream;
pub mod insights;

pub use aggregator::GatewayAggregator;
pub use downstream::{DownstreamClient, DownstreamError, Service, USER_ID_HEADER};
