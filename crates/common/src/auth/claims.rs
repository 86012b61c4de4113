//! Verified identity claims.
//!
//! Produced once per request by the token verifier and carried in request
//! extensions for the lifetime of that request only. The `sub` field is
//! redacted in Debug output to prevent exposure in logs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Subject of the fixed identity returned when verification is bypassed.
pub const BYPASS_SUBJECT: &str = "local-user";

/// Scope of the fixed identity returned when verification is bypassed.
pub const BYPASS_SCOPE: &str = "local";

/// The verified principal.
///
/// Registered claims the pipeline relies on are typed; everything else the
/// issuer put in the token is kept in `attributes` so handlers can read
/// forwarded attributes without the verifier knowing about them.
#[derive(Clone, Serialize, Deserialize)]
pub struct IdentityClaims {
    /// Subject identifier - redacted in Debug output.
    pub sub: String,

    /// Expiration timestamp (Unix epoch seconds).
    pub exp: i64,

    /// Not-before timestamp (Unix epoch seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,

    /// Space-separated scopes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// Any other claims carried by the token (`iss`, `aud`, `iat`, custom).
    #[serde(flatten)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl fmt::Debug for IdentityClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityClaims")
            .field("sub", &"[REDACTED]")
            .field("exp", &self.exp)
            .field("nbf", &self.nbf)
            .field("scope", &self.scope)
            .field("attributes", &self.attributes.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl IdentityClaims {
    /// The placeholder identity used when verification is explicitly bypassed.
    pub fn bypass() -> Self {
        Self {
            sub: BYPASS_SUBJECT.to_string(),
            exp: i64::MAX,
            nbf: None,
            scope: Some(BYPASS_SCOPE.to_string()),
            attributes: serde_json::Map::new(),
        }
    }

    /// Check if the identity has a specific scope.
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes().contains(&scope)
    }

    /// All scopes as a vector.
    pub fn scopes(&self) -> Vec<&str> {
        self.scope
            .as_deref()
            .map(|s| s.split_whitespace().collect())
            .unwrap_or_default()
    }

    /// Look up a forwarded attribute by claim name.
    pub fn attribute(&self, name: &str) -> Option<&serde_json::Value> {
        self.attributes.get(name)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn sample() -> IdentityClaims {
        serde_json::from_value(serde_json::json!({
            "sub": "secret-user-id",
            "exp": 1_234_567_890,
            "scope": "read write",
            "iss": "https://issuer.example",
            "aud": ["banking-app"],
            "tenant": "retail"
        }))
        .unwrap()
    }

    #[test]
    fn test_debug_redacts_sub() {
        let debug_str = format!("{:?}", sample());
        assert!(!debug_str.contains("secret-user-id"));
        assert!(debug_str.contains("[REDACTED]"));
    }

    #[test]
    fn test_unknown_claims_are_kept_as_attributes() {
        let claims = sample();
        assert_eq!(claims.attribute("tenant").unwrap(), "retail");
        assert_eq!(claims.attribute("iss").unwrap(), "https://issuer.example");
        assert!(claims.attribute("sub").is_none());
    }

    #[test]
    fn test_scopes() {
        let claims = sample();
        assert!(claims.has_scope("read"));
        assert!(claims.has_scope("write"));
        assert!(!claims.has_scope("rea"));
        assert_eq!(claims.scopes(), vec!["read", "write"]);
    }

    #[test]
    fn test_missing_scope_means_no_scopes() {
        let claims: IdentityClaims =
            serde_json::from_value(serde_json::json!({"sub": "u", "exp": 1})).unwrap();
        assert!(claims.scopes().is_empty());
        assert!(!claims.has_scope("read"));
    }

    #[test]
    fn test_bypass_identity_is_fixed() {
        let claims = IdentityClaims::bypass();
        assert_eq!(claims.sub, BYPASS_SUBJECT);
        assert_eq!(claims.scope.as_deref(), Some(BYPASS_SCOPE));
    }
}
