//! JWT helpers used before and after signature verification.
//!
//! - Size limit checked before any decoding
//! - Header inspection (`kid`, `alg`) without verifying the signature
//! - `exp`/`nbf` validation against an explicit clock with a fixed leeway
//!
//! # Security
//!
//! The header is untrusted until the signature has been verified. The `kid`
//! is only used to select a key from the trusted key set, and the `alg` is
//! only used to reject anything other than EdDSA up front.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::Deserialize;
use thiserror::Error;

/// Maximum allowed JWT size in bytes (8KB).
///
/// Typical tokens are a few hundred bytes. Larger inputs are rejected before
/// base64 decoding or any cryptographic work.
pub const MAX_JWT_SIZE_BYTES: usize = 8192;

/// Leeway applied to `exp` and `nbf`, in seconds.
pub const LEEWAY_SECONDS: i64 = 10;

/// The only accepted signing algorithm.
pub const ACCEPTED_ALGORITHM: &str = "EdDSA";

/// Errors raised while inspecting a token before signature verification,
/// or while checking its validity window after.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    #[error("Token exceeds maximum size")]
    TokenTooLarge,

    #[error("Token is not a compact JWS")]
    MalformedToken,

    #[error("Token header has no key identifier")]
    MissingKid,

    #[error("Token uses an unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Token expired")]
    Expired,

    #[error("Token not yet valid")]
    NotYetValid,
}

/// The subset of the JOSE header needed to pick a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenHeader {
    pub kid: String,
    pub alg: String,
}

#[derive(Deserialize)]
struct RawHeader {
    #[serde(default)]
    alg: Option<String>,
    #[serde(default)]
    kid: Option<serde_json::Value>,
}

/// Parse the header of a compact JWT without verifying its signature.
///
/// # Errors
///
/// - `TokenTooLarge` if the token exceeds [`MAX_JWT_SIZE_BYTES`]
/// - `MalformedToken` if it is not three dot-separated parts with a
///   base64url JSON header carrying an `alg`
/// - `MissingKid` if `kid` is absent, empty or not a string
/// - `UnsupportedAlgorithm` if `alg` is not [`ACCEPTED_ALGORITHM`]
pub fn parse_header(token: &str) -> Result<TokenHeader, JwtValidationError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }

    let mut parts = token.split('.');
    let (Some(header_part), Some(payload_part), Some(signature_part), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        tracing::debug!(target: "common.jwt", "Token rejected: invalid JWT format");
        return Err(JwtValidationError::MalformedToken);
    };

    if header_part.is_empty() || payload_part.is_empty() || signature_part.is_empty() {
        tracing::debug!(target: "common.jwt", "Token rejected: empty JWT segment");
        return Err(JwtValidationError::MalformedToken);
    }

    let header_bytes = URL_SAFE_NO_PAD.decode(header_part).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to decode JWT header base64");
        JwtValidationError::MalformedToken
    })?;

    let raw: RawHeader = serde_json::from_slice(&header_bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to parse JWT header JSON");
        JwtValidationError::MalformedToken
    })?;

    let alg = raw.alg.ok_or(JwtValidationError::MalformedToken)?;

    let kid = raw
        .kid
        .as_ref()
        .and_then(serde_json::Value::as_str)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .ok_or(JwtValidationError::MissingKid)?;

    if alg != ACCEPTED_ALGORITHM {
        tracing::debug!(target: "common.jwt", alg = %alg, "Token rejected: unsupported algorithm");
        return Err(JwtValidationError::UnsupportedAlgorithm(alg));
    }

    Ok(TokenHeader { kid, alg })
}

/// Deterministic validity-window check against an explicit `now`.
///
/// A token is accepted while `now <= exp + leeway` and `now >= nbf - leeway`.
///
/// # Errors
///
/// - `Expired` if `now` is past `exp + LEEWAY_SECONDS`
/// - `NotYetValid` if `now` is before `nbf - LEEWAY_SECONDS`
pub fn validate_time_window_at(
    exp: i64,
    nbf: Option<i64>,
    now: i64,
) -> Result<(), JwtValidationError> {
    if now > exp.saturating_add(LEEWAY_SECONDS) {
        tracing::debug!(
            target: "common.jwt",
            exp = exp,
            now = now,
            leeway = LEEWAY_SECONDS,
            "Token rejected: expired"
        );
        return Err(JwtValidationError::Expired);
    }

    if let Some(nbf) = nbf {
        if now < nbf.saturating_sub(LEEWAY_SECONDS) {
            tracing::debug!(
                target: "common.jwt",
                nbf = nbf,
                now = now,
                leeway = LEEWAY_SECONDS,
                "Token rejected: not yet valid"
            );
            return Err(JwtValidationError::NotYetValid);
        }
    }

    Ok(())
}

/// Decode an Ed25519 public key from a JWK `x` field (base64url, no padding).
///
/// # Errors
///
/// Returns `base64::DecodeError` if the value is not valid base64url.
pub fn decode_ed25519_public_key_jwk(x_b64url: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(x_b64url)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn token_with_header(header: &str) -> String {
        format!("{}.cGF5bG9hZA.c2ln", URL_SAFE_NO_PAD.encode(header.as_bytes()))
    }

    #[test]
    fn test_parse_header_valid() {
        let token = token_with_header(r#"{"alg":"EdDSA","typ":"JWT","kid":"key-01"}"#);
        let header = parse_header(&token).unwrap();
        assert_eq!(header.kid, "key-01");
        assert_eq!(header.alg, "EdDSA");
    }

    #[test]
    fn test_parse_header_missing_kid() {
        let token = token_with_header(r#"{"alg":"EdDSA","typ":"JWT"}"#);
        assert_eq!(parse_header(&token), Err(JwtValidationError::MissingKid));
    }

    #[test]
    fn test_parse_header_non_string_or_empty_kid() {
        for header in [
            r#"{"alg":"EdDSA","kid":12345}"#,
            r#"{"alg":"EdDSA","kid":null}"#,
            r#"{"alg":"EdDSA","kid":""}"#,
        ] {
            let token = token_with_header(header);
            assert_eq!(
                parse_header(&token),
                Err(JwtValidationError::MissingKid),
                "header {header} should be rejected"
            );
        }
    }

    #[test]
    fn test_parse_header_rejects_symmetric_and_none_algorithms() {
        for alg in ["HS256", "none", "RS256"] {
            let token = token_with_header(&format!(r#"{{"alg":"{alg}","kid":"k"}}"#));
            assert_eq!(
                parse_header(&token),
                Err(JwtValidationError::UnsupportedAlgorithm(alg.to_string()))
            );
        }
    }

    #[test]
    fn test_parse_header_malformed() {
        assert_eq!(parse_header(""), Err(JwtValidationError::MalformedToken));
        assert_eq!(parse_header("single"), Err(JwtValidationError::MalformedToken));
        assert_eq!(parse_header("only.two"), Err(JwtValidationError::MalformedToken));
        assert_eq!(
            parse_header("not.a.valid.jwt"),
            Err(JwtValidationError::MalformedToken)
        );
        assert_eq!(
            parse_header(".payload.signature"),
            Err(JwtValidationError::MalformedToken)
        );
        assert_eq!(
            parse_header("!!!invalid!!!.payload.signature"),
            Err(JwtValidationError::MalformedToken)
        );
        let not_json = format!("{}.payload.signature", URL_SAFE_NO_PAD.encode("not json"));
        assert_eq!(parse_header(&not_json), Err(JwtValidationError::MalformedToken));
    }

    #[test]
    fn test_parse_header_rejects_oversized_token() {
        let token = "a".repeat(MAX_JWT_SIZE_BYTES + 1);
        assert_eq!(parse_header(&token), Err(JwtValidationError::TokenTooLarge));
    }

    #[test]
    fn test_expiry_boundary_with_leeway() {
        let now = 1_700_000_000;
        // Expired exactly `leeway` seconds ago: still inside the window
        assert!(validate_time_window_at(now - LEEWAY_SECONDS, None, now).is_ok());
        // One second further: rejected
        assert_eq!(
            validate_time_window_at(now - LEEWAY_SECONDS - 1, None, now),
            Err(JwtValidationError::Expired)
        );
        assert!(validate_time_window_at(now + 3600, None, now).is_ok());
    }

    #[test]
    fn test_not_before_boundary_with_leeway() {
        let now = 1_700_000_000;
        let exp = now + 3600;
        assert!(validate_time_window_at(exp, Some(now + LEEWAY_SECONDS), now).is_ok());
        assert_eq!(
            validate_time_window_at(exp, Some(now + LEEWAY_SECONDS + 1), now),
            Err(JwtValidationError::NotYetValid)
        );
        assert!(validate_time_window_at(exp, Some(now - 60), now).is_ok());
    }

    #[test]
    fn test_decode_public_key_jwk() {
        let encoded = URL_SAFE_NO_PAD.encode([7u8; 32]);
        assert_eq!(decode_ed25519_public_key_jwk(&encoded).unwrap(), vec![7u8; 32]);
        assert!(decode_ed25519_public_key_jwk("!!!").is_err());
    }
}
