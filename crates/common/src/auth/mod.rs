//! Credential verification: key cache, token verifier and identity claims.

pub mod claims;
pub mod jwks;
pub mod verifier;

pub use claims::IdentityClaims;
pub use jwks::{Jwk, KeyCache, KeySet};
pub use verifier::TokenVerifier;
