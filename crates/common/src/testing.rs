//! Deterministic signing fixtures for tests.
//!
//! Available to this crate's unit tests and, through the `test-utils`
//! feature, to integration tests in other crates.
//!
//! ```rust,ignore
//! let key = TestKeypair::new(1, "key-1");
//! let token = key.sign(&TestTokenBuilder::new().for_user("alice").build());
//! ```

#![allow(
    clippy::expect_used,
    clippy::missing_panics_doc,
    clippy::indexing_slicing
)]

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use ring::signature::{Ed25519KeyPair, KeyPair};
use serde_json::json;

/// Ed25519 keypair derived from a one-byte seed.
///
/// The same seed always produces the same keypair.
pub struct TestKeypair {
    kid: String,
    public_key_bytes: Vec<u8>,
    private_key_pkcs8: Vec<u8>,
}

impl TestKeypair {
    pub fn new(seed: u8, kid: &str) -> Self {
        let mut seed_bytes = [0u8; 32];
        seed_bytes[0] = seed;
        for (i, byte) in seed_bytes.iter_mut().enumerate().skip(1) {
            #[allow(clippy::cast_possible_truncation)]
            let i = i as u8;
            *byte = seed.wrapping_mul(i).wrapping_add(i);
        }

        let key_pair = Ed25519KeyPair::from_seed_unchecked(&seed_bytes)
            .expect("32-byte seed is always a valid Ed25519 seed");

        Self {
            kid: kid.to_string(),
            public_key_bytes: key_pair.public_key().as_ref().to_vec(),
            private_key_pkcs8: build_pkcs8_from_seed(&seed_bytes),
        }
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Sign claims with this key, setting `kid` in the header.
    pub fn sign(&self, claims: &serde_json::Value) -> String {
        let mut header = Header::new(Algorithm::EdDSA);
        header.typ = Some("JWT".to_string());
        header.kid = Some(self.kid.clone());
        self.sign_with_header(&header, claims)
    }

    /// Sign claims with a caller-supplied header.
    pub fn sign_with_header(&self, header: &Header, claims: &serde_json::Value) -> String {
        let encoding_key = EncodingKey::from_ed_der(&self.private_key_pkcs8);
        encode(header, claims, &encoding_key).expect("Failed to sign token")
    }

    /// Public JWK for this key, as served by a key-set endpoint.
    pub fn jwk_json(&self) -> serde_json::Value {
        json!({
            "kty": "OKP",
            "kid": self.kid,
            "crv": "Ed25519",
            "x": URL_SAFE_NO_PAD.encode(&self.public_key_bytes),
            "alg": "EdDSA",
            "use": "sig"
        })
    }
}

/// A JWKS document containing the given keys.
pub fn jwks_json(keys: &[&TestKeypair]) -> serde_json::Value {
    json!({ "keys": keys.iter().map(|k| k.jwk_json()).collect::<Vec<_>>() })
}

/// PKCS#8 v1 document wrapping a raw Ed25519 seed.
fn build_pkcs8_from_seed(seed: &[u8; 32]) -> Vec<u8> {
    let mut pkcs8 = Vec::with_capacity(48);

    // SEQUENCE, 46 bytes
    pkcs8.extend_from_slice(&[0x30, 0x2e]);
    // version INTEGER 0
    pkcs8.extend_from_slice(&[0x02, 0x01, 0x00]);
    // AlgorithmIdentifier SEQUENCE { OID 1.3.101.112 }
    pkcs8.extend_from_slice(&[0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70]);
    // privateKey OCTET STRING { OCTET STRING seed }
    pkcs8.extend_from_slice(&[0x04, 0x22, 0x04, 0x20]);
    pkcs8.extend_from_slice(seed);

    pkcs8
}

/// Builder for identity claims used in test tokens.
pub struct TestTokenBuilder {
    sub: Option<String>,
    scope: Option<String>,
    exp: Option<i64>,
    nbf: Option<i64>,
    iss: Option<String>,
    aud: Option<String>,
    extra: serde_json::Map<String, serde_json::Value>,
}

impl TestTokenBuilder {
    /// Subject `test-user`, expiring in one hour.
    pub fn new() -> Self {
        Self {
            sub: Some("test-user".to_string()),
            scope: None,
            exp: Some((Utc::now() + Duration::seconds(3600)).timestamp()),
            nbf: None,
            iss: None,
            aud: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn for_user(mut self, subject: &str) -> Self {
        self.sub = Some(subject.to_string());
        self
    }

    pub fn without_subject(mut self) -> Self {
        self.sub = None;
        self
    }

    pub fn with_scope(mut self, scope: &str) -> Self {
        self.scope = Some(scope.to_string());
        self
    }

    /// Expiry relative to now; negative values produce expired tokens.
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.exp = Some((Utc::now() + Duration::seconds(seconds)).timestamp());
        self
    }

    pub fn expires_at(mut self, timestamp: i64) -> Self {
        self.exp = Some(timestamp);
        self
    }

    pub fn without_expiry(mut self) -> Self {
        self.exp = None;
        self
    }

    pub fn not_before(mut self, timestamp: i64) -> Self {
        self.nbf = Some(timestamp);
        self
    }

    pub fn issued_by(mut self, issuer: &str) -> Self {
        self.iss = Some(issuer.to_string());
        self
    }

    pub fn for_audience(mut self, audience: &str) -> Self {
        self.aud = Some(audience.to_string());
        self
    }

    pub fn with_claim(mut self, name: &str, value: serde_json::Value) -> Self {
        self.extra.insert(name.to_string(), value);
        self
    }

    pub fn build(self) -> serde_json::Value {
        let mut claims = self.extra;
        let registered = [
            ("sub", self.sub.map(serde_json::Value::from)),
            ("scope", self.scope.map(serde_json::Value::from)),
            ("exp", self.exp.map(serde_json::Value::from)),
            ("nbf", self.nbf.map(serde_json::Value::from)),
            ("iss", self.iss.map(serde_json::Value::from)),
            ("aud", self.aud.map(serde_json::Value::from)),
        ];
        for (name, value) in registered {
            if let Some(value) = value {
                claims.insert(name.to_string(), value);
            }
        }
        serde_json::Value::Object(claims)
    }
}

impl Default for TestTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_keypair_is_deterministic() {
        let a = TestKeypair::new(1, "k");
        let b = TestKeypair::new(1, "k");
        let c = TestKeypair::new(2, "k");
        assert_eq!(a.jwk_json(), b.jwk_json());
        assert_ne!(a.jwk_json(), c.jwk_json());
    }

    #[test]
    fn test_builder_omits_unset_claims() {
        let claims = TestTokenBuilder::new().without_expiry().build();
        assert!(claims.get("exp").is_none());
        assert!(claims.get("iss").is_none());
        assert_eq!(claims["sub"], "test-user");
    }
}
