//! HTTP metrics middleware.
//!
//! Applied as the outermost layer so every response is counted, including
//! rate-limit and authentication rejections, framework errors (404, 405,
//! 415, JSON parse failures) and request timeouts.

use crate::observability::metrics::record_http_request;
use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

pub async fn http_metrics_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;

    record_http_request(&method, &path, response.status().as_u16(), start.elapsed());

    response
}
