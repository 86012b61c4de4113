//! Banking assistant API gateway.
//!
//! The single client-facing entry point. Every `/v1/*` request is admitted
//! by the per-key rate limiter, then identified by the token verifier, and
//! only then reaches a handler, which relays to or aggregates from the
//! conversation and transaction services.
//!
//! # Architecture
//!
//! ```text
//! routes/mod.rs -> handlers/*.rs -> services/aggregator.rs -> services/downstream.rs
//! ```
//!
//! # Modules
//!
//! - `config` - Service configuration from environment
//! - `handlers` - HTTP request handlers
//! - `middleware` - HTTP metrics middleware
//! - `models` - Request and response bodies
//! - `observability` - Prometheus metrics
//! - `routes` - Axum router setup
//! - `services` - Downstream client, aggregation and heuristics
//! - `tasks` - Background maintenance tasks

pub mod config;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod routes;
pub mod services;
pub mod tasks;
