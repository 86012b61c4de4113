//! Background tasks for the gateway.
//!
//! # Tasks
//!
//! - `bucket_eviction` - Drops idle rate limiter buckets

pub mod bucket_eviction;

pub use bucket_eviction::{start_bucket_eviction, DEFAULT_EVICTION_INTERVAL_SECONDS};
