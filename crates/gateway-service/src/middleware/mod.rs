//! Gateway-specific middleware. Rate limiting and authentication live in
//! `common::middleware`.

pub mod http_metrics;
pub mod request_timeout;

pub use http_metrics::http_metrics_middleware;
pub use request_timeout::handle_request_timeout;
