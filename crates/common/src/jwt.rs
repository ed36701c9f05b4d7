//! Compact-token utilities shared across Token Gate services.
//!
//! This module provides the parts of token handling that happen *before* any
//! cryptographic verification:
//! - Size limits for DoS prevention
//! - Splitting the compact serialization into its three segments
//! - Decoding the (still untrusted) header to find `kid` and `alg`
//! - Decoding base64url JSON segments and JWK key material
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Nothing returned here has been authenticated. The header is only good
//!   for picking a key; the payload must not be decoded until the signature
//!   over [`TokenParts::signing_input`] has been verified.
//! - Error messages are generic; details go to debug logs
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::jwt::{split_token, decode_header};
//!
//! let parts = split_token(token)?;
//! let header = decode_header(parts.header)?;
//! // look up header.kid in the key set, verify parts.signing_input ...
//! ```

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed token size in bytes (8KB).
///
/// Tokens larger than this are rejected BEFORE any base64 decoding, JSON
/// parsing or signature work.
///
/// - Typical RS256 identity tokens are 800-1200 bytes
/// - 8KB leaves room for large custom claim sets
pub const MAX_JWT_SIZE_BYTES: usize = 8192; // 8KB

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while taking a token apart.
///
/// Note: Error messages are intentionally generic to prevent information leakage.
/// Detailed information is logged at debug level for troubleshooting.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token size exceeds maximum allowed.
    #[error("The access token is invalid or expired")]
    TokenTooLarge,

    /// Token format is invalid (segment count, base64url, JSON).
    #[error("The access token is invalid or expired")]
    MalformedToken,

    /// Token header is missing a usable `kid`.
    #[error("The access token is invalid or expired")]
    MissingKid,

    /// Token header is missing a usable `alg`.
    #[error("The access token is invalid or expired")]
    MissingAlgorithm,
}

// =============================================================================
// Token Types
// =============================================================================

/// The three segments of a compact token, borrowed from the original string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenParts<'a> {
    /// base64url header segment.
    pub header: &'a str,

    /// base64url payload segment. Untrusted until the signature verifies.
    pub payload: &'a str,

    /// base64url signature segment.
    pub signature: &'a str,

    /// `header.payload`, the exact bytes the signature covers.
    pub signing_input: &'a str,
}

/// Decoded token header. Untrusted: only used to select a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnverifiedHeader {
    /// Key identifier used as a lookup key into the issuer's key set.
    pub kid: String,

    /// Algorithm name exactly as written by the token producer.
    pub alg: String,

    /// Optional media type.
    pub typ: Option<String>,
}

#[derive(Deserialize)]
struct RawHeader {
    #[serde(default)]
    kid: Option<serde_json::Value>,
    #[serde(default)]
    alg: Option<serde_json::Value>,
    #[serde(default)]
    typ: Option<String>,
}

// =============================================================================
// Functions
// =============================================================================

/// Split a compact token into header, payload and signature segments.
///
/// # Security
///
/// Token size is checked BEFORE anything else. No decoding happens here.
///
/// # Errors
///
/// - `TokenTooLarge` - Token exceeds [`MAX_JWT_SIZE_BYTES`]
/// - `MalformedToken` - Not exactly three dot-separated, non-empty segments
pub fn split_token(token: &str) -> Result<TokenParts<'_>, JwtValidationError> {
    // Check token size first (DoS prevention)
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }

    let segments = token.split('.').count();
    if segments != 3 {
        tracing::debug!(
            target: "common.jwt",
            parts = segments,
            "Token rejected: invalid token format"
        );
        return Err(JwtValidationError::MalformedToken);
    }

    let (signing_input, signature) = token
        .rsplit_once('.')
        .ok_or(JwtValidationError::MalformedToken)?;
    let (header, payload) = signing_input
        .split_once('.')
        .ok_or(JwtValidationError::MalformedToken)?;

    if header.is_empty() || payload.is_empty() || signature.is_empty() {
        tracing::debug!(target: "common.jwt", "Token rejected: empty segment");
        return Err(JwtValidationError::MalformedToken);
    }

    Ok(TokenParts {
        header,
        payload,
        signature,
        signing_input,
    })
}

/// Decode the header segment without verifying anything.
///
/// # Errors
///
/// - `MalformedToken` - Segment is not base64url JSON object
/// - `MissingKid` - `kid` absent, empty or not a string
/// - `MissingAlgorithm` - `alg` absent, empty or not a string
pub fn decode_header(segment: &str) -> Result<UnverifiedHeader, JwtValidationError> {
    let raw: RawHeader = decode_segment_json(segment)?;

    // Extract as strings, rejecting empty values
    let kid = raw
        .kid
        .as_ref()
        .and_then(serde_json::Value::as_str)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .ok_or(JwtValidationError::MissingKid)?;

    let alg = raw
        .alg
        .as_ref()
        .and_then(serde_json::Value::as_str)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .ok_or(JwtValidationError::MissingAlgorithm)?;

    Ok(UnverifiedHeader {
        kid,
        alg,
        typ: raw.typ,
    })
}

/// Decode a base64url (no padding) segment and parse it as JSON.
///
/// # Errors
///
/// Returns `MalformedToken` if the segment is not base64url, is not a JSON
/// object, or does not deserialize into `T`. Arrays are refused even when `T`
/// would accept the sequence form.
pub fn decode_segment_json<T: DeserializeOwned>(segment: &str) -> Result<T, JwtValidationError> {
    let bytes = URL_SAFE_NO_PAD.decode(segment).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to decode token segment base64");
        JwtValidationError::MalformedToken
    })?;

    let value: serde_json::Value = serde_json::from_slice(&bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to parse token segment JSON");
        JwtValidationError::MalformedToken
    })?;

    if !value.is_object() {
        tracing::debug!(target: "common.jwt", "Token segment is not a JSON object");
        return Err(JwtValidationError::MalformedToken);
    }

    serde_json::from_value(value).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Token segment has unexpected shape");
        JwtValidationError::MalformedToken
    })
}

/// Decode an Ed25519 public key from JWK `x` field (base64url format).
///
/// # Errors
///
/// Returns `base64::DecodeError` if the base64url content cannot be decoded.
pub fn decode_ed25519_public_key_jwk(x_b64url: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(x_b64url)
}

// =============================================================================
// Tests
// =============================================================================
