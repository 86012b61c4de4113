//! # Gateway Test Utilities
//!
//! Shared test utilities for the API gateway.
//!
//! This crate provides:
//! - Server test harness (`TestGatewayServer` for E2E tests)
//! - A mocked key-set endpoint (`MockJwks`)
//! - Deterministic Ed25519 keys and a token builder, re-exported from
//!   `common::testing`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gateway_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> anyhow::Result<()> {
//!     let key = TestKeypair::new(1, "key-1");
//!     let jwks = MockJwks::start(&[&key]).await;
//!     let server = TestGatewayServer::spawn(jwks.gateway_vars()).await?;
//!
//!     let response = reqwest::get(format!("{}/healthz", server.url())).await?;
//!     assert_eq!(response.status(), 200);
//!     Ok(())
//! }
//! ```

pub mod jwks_mock;
pub mod server_harness;

pub use common::testing::{jwks_json, TestKeypair, TestTokenBuilder};
pub use jwks_mock::*;
pub use server_harness::*;
