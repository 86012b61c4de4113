//! Bearer credential verification.
//!
//! Validates an incoming JWT against keys from the [`KeyCache`] and resolves
//! it to [`IdentityClaims`].
//!
//! # Security
//!
//! - Tokens are size-checked before any decoding
//! - Only EdDSA (Ed25519) is accepted; the header `alg` is checked before
//!   the key lookup so symmetric or `none` tokens never reach the cache
//! - `exp` and `nbf` are checked with a fixed 10 second leeway
//! - `iss` and `aud` are only enforced when an expected value is configured
//! - Client-facing messages are generic; the reason is logged at debug level

use crate::auth::claims::IdentityClaims;
use crate::auth::jwks::{Jwk, KeyCache};
use crate::config::{AdmissionConfig, ConfigError};
use crate::error::ApiError;
use crate::jwt::{
    decode_ed25519_public_key_jwk, parse_header, validate_time_window_at, JwtValidationError,
};
use crate::observability::metrics::record_token_validation;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

enum Mode {
    Verify(Arc<KeyCache>),
    Bypass,
}

/// Verifies bearer credentials and yields the caller's identity.
pub struct TokenVerifier {
    mode: Mode,
    issuer: Option<String>,
    audience: Option<String>,
}

impl TokenVerifier {
    /// Create a verifier backed by `key_cache`.
    ///
    /// `None` for `issuer` or `audience` disables that check.
    pub fn new(key_cache: Arc<KeyCache>, issuer: Option<String>, audience: Option<String>) -> Self {
        Self {
            mode: Mode::Verify(key_cache),
            issuer,
            audience,
        }
    }

    /// A verifier that skips all checks and returns the fixed local identity.
    ///
    /// Only constructed from an explicit configuration switch.
    pub fn bypass() -> Self {
        tracing::warn!(
            target: "common.auth.verifier",
            "Credential verification is DISABLED; every request runs as the local placeholder identity"
        );
        Self {
            mode: Mode::Bypass,
            issuer: None,
            audience: None,
        }
    }

    /// Build the verifier the configuration asks for.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if verification is enabled but no
    /// key-set URL is configured.
    pub fn from_config(config: &AdmissionConfig) -> Result<Self, ConfigError> {
        if config.disable_auth {
            return Ok(Self::bypass());
        }

        let jwks_url = config
            .jwks_url
            .clone()
            .ok_or_else(|| ConfigError::MissingEnvVar("JWKS_URL".to_string()))?;
        let key_cache = Arc::new(KeyCache::with_ttl(jwks_url, config.jwks_cache_ttl));

        Ok(Self::new(
            key_cache,
            config.issuer.clone(),
            config.audience.clone(),
        ))
    }

    pub fn is_bypass(&self) -> bool {
        matches!(self.mode, Mode::Bypass)
    }

    /// The key cache backing this verifier, if verification is enabled.
    pub fn key_cache(&self) -> Option<&Arc<KeyCache>> {
        match &self.mode {
            Mode::Verify(cache) => Some(cache),
            Mode::Bypass => None,
        }
    }

    /// Verify a credential against the wall clock.
    ///
    /// # Errors
    ///
    /// See [`TokenVerifier::verify_at`].
    pub async fn verify(&self, credential: &str) -> Result<IdentityClaims, ApiError> {
        self.verify_at(credential, chrono::Utc::now().timestamp())
            .await
    }

    /// Verify a credential against an explicit `now` (Unix seconds).
    ///
    /// # Errors
    ///
    /// - `MalformedCredential` if the token cannot be parsed, has no `kid`,
    ///   uses another algorithm, or lacks required claims
    /// - `UnknownKey` if the key cannot be resolved even after a refresh
    /// - `UpstreamUnavailable` if the key set cannot be fetched
    /// - `SignatureInvalid` if the signature does not verify
    /// - `Expired` if `now` is outside `[nbf - leeway, exp + leeway]`
    /// - `IssuerMismatch` / `AudienceMismatch` when configured and violated
    #[instrument(skip_all)]
    pub async fn verify_at(&self, credential: &str, now: i64) -> Result<IdentityClaims, ApiError> {
        let start = Instant::now();

        let key_cache = match &self.mode {
            Mode::Bypass => {
                record_token_validation("bypass", start.elapsed());
                return Ok(IdentityClaims::bypass());
            }
            Mode::Verify(cache) => cache,
        };

        let result = self.verify_with_cache(key_cache, credential, now).await;
        match &result {
            Ok(_) => record_token_validation("success", start.elapsed()),
            Err(e) => record_token_validation(e.code(), start.elapsed()),
        }
        result
    }

    async fn verify_with_cache(
        &self,
        key_cache: &KeyCache,
        credential: &str,
        now: i64,
    ) -> Result<IdentityClaims, ApiError> {
        let header = parse_header(credential).map_err(|e| {
            tracing::debug!(target: "common.auth.verifier", error = %e, "Token header rejected");
            ApiError::MalformedCredential
        })?;

        let jwk = key_cache.get_key(&header.kid).await?;

        let claims = self.verify_signature(credential, &jwk)?;

        validate_time_window_at(claims.exp, claims.nbf, now).map_err(|e| {
            tracing::debug!(target: "common.auth.verifier", error = %e, "Token outside validity window");
            match e {
                JwtValidationError::Expired | JwtValidationError::NotYetValid => ApiError::Expired,
                _ => ApiError::MalformedCredential,
            }
        })?;

        tracing::debug!(target: "common.auth.verifier", "Token validated successfully");
        Ok(claims)
    }

    /// Verify the signature and the configured `iss`/`aud`, then decode claims.
    fn verify_signature(&self, token: &str, jwk: &Jwk) -> Result<IdentityClaims, ApiError> {
        if jwk.kty != "OKP" {
            tracing::warn!(target: "common.auth.verifier", kty = %jwk.kty, "Unexpected JWK key type");
            return Err(ApiError::SignatureInvalid);
        }
        if let Some(alg) = &jwk.alg {
            if alg != "EdDSA" {
                tracing::warn!(target: "common.auth.verifier", alg = %alg, "Unexpected JWK algorithm");
                return Err(ApiError::SignatureInvalid);
            }
        }

        let public_key_b64 = jwk.x.as_ref().ok_or_else(|| {
            tracing::error!(target: "common.auth.verifier", kid = ?jwk.kid, "JWK missing x field");
            ApiError::SignatureInvalid
        })?;

        let public_key_bytes = decode_ed25519_public_key_jwk(public_key_b64).map_err(|e| {
            tracing::error!(target: "common.auth.verifier", error = %e, "Invalid public key encoding");
            ApiError::SignatureInvalid
        })?;

        let decoding_key = DecodingKey::from_ed_der(&public_key_bytes);

        let token_data = decode::<IdentityClaims>(token, &decoding_key, &self.validation())
            .map_err(|e| {
                tracing::debug!(target: "common.auth.verifier", error = %e, "Token verification failed");
                map_decode_error(e.kind())
            })?;

        Ok(token_data.claims)
    }

    /// Signature, issuer and audience checks. Time checks run afterwards
    /// against an explicit clock.
    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::EdDSA);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.leeway = 0;

        let mut required: HashSet<String> = ["exp", "sub"].iter().map(ToString::to_string).collect();

        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer]);
            required.insert("iss".to_string());
        }

        match &self.audience {
            Some(audience) => {
                validation.set_audience(&[audience]);
                required.insert("aud".to_string());
            }
            None => validation.validate_aud = false,
        }

        validation.required_spec_claims = required;
        validation
    }
}

fn map_decode_error(kind: &ErrorKind) -> ApiError {
    match kind {
        ErrorKind::InvalidSignature | ErrorKind::Crypto(_) => ApiError::SignatureInvalid,
        ErrorKind::InvalidIssuer => ApiError::IssuerMismatch,
        ErrorKind::InvalidAudience => ApiError::AudienceMismatch,
        ErrorKind::MissingRequiredClaim(claim) if claim == "iss" => ApiError::IssuerMismatch,
        ErrorKind::MissingRequiredClaim(claim) if claim == "aud" => ApiError::AudienceMismatch,
        ErrorKind::ExpiredSignature | ErrorKind::ImmatureSignature => ApiError::Expired,
        _ => ApiError::MalformedCredential,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::jwt::{LEEWAY_SECONDS, MAX_JWT_SIZE_BYTES};
    use crate::testing::{jwks_json, TestKeypair, TestTokenBuilder};
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use jsonwebtoken::Header;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ISSUER: &str = "https://issuer.example";
    const AUDIENCE: &str = "banking-app";

    struct Fixture {
        _server: MockServer,
        key: TestKeypair,
        cache: Arc<KeyCache>,
    }

    async fn fixture() -> Fixture {
        let server = MockServer::start().await;
        let key = TestKeypair::new(1, "key-1");
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks_json(&[&key])))
            .mount(&server)
            .await;
        let cache = Arc::new(KeyCache::new(format!("{}/jwks", server.uri())));
        Fixture {
            _server: server,
            key,
            cache,
        }
    }

    fn open_verifier(f: &Fixture) -> TokenVerifier {
        TokenVerifier::new(Arc::clone(&f.cache), None, None)
    }

    fn strict_verifier(f: &Fixture) -> TokenVerifier {
        TokenVerifier::new(
            Arc::clone(&f.cache),
            Some(ISSUER.to_string()),
            Some(AUDIENCE.to_string()),
        )
    }

    #[tokio::test]
    async fn test_valid_token_yields_claims() {
        let f = fixture().await;
        let token = f.key.sign(
            &TestTokenBuilder::new()
                .for_user("alice")
                .with_scope("read")
                .with_claim("tenant", serde_json::json!("retail"))
                .build(),
        );

        let claims = open_verifier(&f).verify(&token).await.unwrap();
        assert_eq!(claims.sub, "alice");
        assert!(claims.has_scope("read"));
        assert_eq!(claims.attribute("tenant").unwrap(), "retail");
    }

    #[tokio::test]
    async fn test_expiry_leeway_boundary() {
        let f = fixture().await;
        let verifier = open_verifier(&f);
        let now = 1_700_000_000;

        let at_edge = f.key.sign(&TestTokenBuilder::new().expires_at(now - LEEWAY_SECONDS).build());
        assert!(verifier.verify_at(&at_edge, now).await.is_ok());

        let past_edge = f
            .key
            .sign(&TestTokenBuilder::new().expires_at(now - LEEWAY_SECONDS - 1).build());
        assert!(matches!(
            verifier.verify_at(&past_edge, now).await,
            Err(ApiError::Expired)
        ));
    }

    #[tokio::test]
    async fn test_not_before_in_future_is_expired() {
        let f = fixture().await;
        let now = 1_700_000_000;
        let token = f.key.sign(
            &TestTokenBuilder::new()
                .expires_at(now + 3600)
                .not_before(now + LEEWAY_SECONDS + 60)
                .build(),
        );
        assert!(matches!(
            open_verifier(&f).verify_at(&token, now).await,
            Err(ApiError::Expired)
        ));
    }

    #[tokio::test]
    async fn test_issuer_and_audience_enforced_when_configured() {
        let f = fixture().await;
        let verifier = strict_verifier(&f);

        let good = f
            .key
            .sign(&TestTokenBuilder::new().issued_by(ISSUER).for_audience(AUDIENCE).build());
        assert!(verifier.verify(&good).await.is_ok());

        let wrong_iss = f
            .key
            .sign(&TestTokenBuilder::new().issued_by("https://evil.example").for_audience(AUDIENCE).build());
        assert!(matches!(
            verifier.verify(&wrong_iss).await,
            Err(ApiError::IssuerMismatch)
        ));

        let wrong_aud = f
            .key
            .sign(&TestTokenBuilder::new().issued_by(ISSUER).for_audience("other-app").build());
        assert!(matches!(
            verifier.verify(&wrong_aud).await,
            Err(ApiError::AudienceMismatch)
        ));

        let missing_aud = f.key.sign(&TestTokenBuilder::new().issued_by(ISSUER).build());
        assert!(matches!(
            verifier.verify(&missing_aud).await,
            Err(ApiError::AudienceMismatch)
        ));

        let missing_iss = f.key.sign(&TestTokenBuilder::new().for_audience(AUDIENCE).build());
        assert!(matches!(
            verifier.verify(&missing_iss).await,
            Err(ApiError::IssuerMismatch)
        ));
    }

    #[tokio::test]
    async fn test_issuer_and_audience_ignored_when_unconfigured() {
        let f = fixture().await;
        let token = f.key.sign(
            &TestTokenBuilder::new()
                .issued_by("https://anyone.example")
                .for_audience("anything")
                .build(),
        );
        assert!(open_verifier(&f).verify(&token).await.is_ok());
    }

    #[tokio::test]
    async fn test_signature_from_unpublished_key_rejected() {
        let f = fixture().await;
        // Same kid as the published key, different private key
        let impostor = TestKeypair::new(99, "key-1");
        let token = impostor.sign(&TestTokenBuilder::new().build());

        assert!(matches!(
            open_verifier(&f).verify(&token).await,
            Err(ApiError::SignatureInvalid)
        ));
    }

    #[tokio::test]
    async fn test_tampered_payload_rejected() {
        let f = fixture().await;
        let token = f.key.sign(&TestTokenBuilder::new().for_user("alice").build());
        let parts: Vec<&str> = token.split('.').collect();
        let forged_payload = URL_SAFE_NO_PAD.encode(
            serde_json::to_vec(&TestTokenBuilder::new().for_user("mallory").build()).unwrap(),
        );
        let forged = format!("{}.{}.{}", parts[0], forged_payload, parts[2]);

        assert!(matches!(
            open_verifier(&f).verify(&forged).await,
            Err(ApiError::SignatureInvalid)
        ));
    }

    #[tokio::test]
    async fn test_unknown_kid_rejected() {
        let f = fixture().await;
        let stranger = TestKeypair::new(2, "key-unpublished");
        let token = stranger.sign(&TestTokenBuilder::new().build());

        assert!(matches!(
            open_verifier(&f).verify(&token).await,
            Err(ApiError::UnknownKey)
        ));
    }

    #[tokio::test]
    async fn test_malformed_credentials_rejected() {
        let f = fixture().await;
        let verifier = open_verifier(&f);

        let oversized = "a".repeat(MAX_JWT_SIZE_BYTES + 1);
        let mut no_kid_header = Header::new(Algorithm::EdDSA);
        no_kid_header.kid = None;
        let no_kid = f
            .key
            .sign_with_header(&no_kid_header, &TestTokenBuilder::new().build());
        let no_exp = f.key.sign(&TestTokenBuilder::new().without_expiry().build());
        let no_sub = f.key.sign(&TestTokenBuilder::new().without_subject().build());

        for token in [
            "",
            "garbage",
            "a.b",
            oversized.as_str(),
            no_kid.as_str(),
            no_exp.as_str(),
            no_sub.as_str(),
        ] {
            assert!(
                matches!(verifier.verify(token).await, Err(ApiError::MalformedCredential)),
                "token {:.20}... should be malformed",
                token
            );
        }
    }

    #[tokio::test]
    async fn test_symmetric_algorithm_rejected_before_key_lookup() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"keys": []})))
            .expect(0)
            .mount(&server)
            .await;
        let verifier = TokenVerifier::new(
            Arc::new(KeyCache::new(format!("{}/jwks", server.uri()))),
            None,
            None,
        );

        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some("key-1".to_string());
        let token = jsonwebtoken::encode(
            &header,
            &TestTokenBuilder::new().build(),
            &jsonwebtoken::EncodingKey::from_secret(b"shared-secret"),
        )
        .unwrap();

        assert!(matches!(
            verifier.verify(&token).await,
            Err(ApiError::MalformedCredential)
        ));
    }

    #[tokio::test]
    async fn test_key_set_outage_is_upstream_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        let verifier = TokenVerifier::new(
            Arc::new(KeyCache::new(format!("{}/jwks", server.uri()))),
            None,
            None,
        );
        let token = TestKeypair::new(1, "key-1").sign(&TestTokenBuilder::new().build());

        assert!(matches!(
            verifier.verify(&token).await,
            Err(ApiError::UpstreamUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_bypass_returns_fixed_identity_for_any_input() {
        let verifier = TokenVerifier::bypass();
        assert!(verifier.is_bypass());
        assert!(verifier.key_cache().is_none());

        for credential in ["", "garbage", "a.b.c"] {
            let claims = verifier.verify(credential).await.unwrap();
            assert_eq!(claims.sub, "local-user");
            assert_eq!(claims.scope.as_deref(), Some("local"));
        }
    }

    #[test]
    fn test_from_config_requires_explicit_flag_for_bypass() {
        let mut config = AdmissionConfig {
            jwks_url: Some("http://localhost/jwks".to_string()),
            ..AdmissionConfig::default()
        };
        assert!(!TokenVerifier::from_config(&config).unwrap().is_bypass());

        config.disable_auth = true;
        assert!(TokenVerifier::from_config(&config).unwrap().is_bypass());

        config.disable_auth = false;
        config.jwks_url = None;
        assert!(TokenVerifier::from_config(&config).is_err());
    }
}
