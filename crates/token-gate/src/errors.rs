//! Token gate error types.
//!
//! Every stage of the verification pipeline fails with one distinguishable
//! `GateError` variant. The detail strings are for server-side logs only:
//! the HTTP mapping returns a uniform body so callers cannot tell which
//! check failed.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::jwt::JwtValidationError;
use serde::Serialize;
use thiserror::Error;

/// Token gate error type.
///
/// Maps to HTTP status codes for the host adapter:
/// - Token problems (MalformedToken, KeyNotFound, InvalidSignature,
///   TokenExpired, AudienceMismatch): 401 Unauthorized
/// - Key-set problems (KeySetUnavailable, KeySetTransportError,
///   MalformedKeySet): 503 Service Unavailable
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GateError {
    #[error("Key set unavailable: {0}")]
    KeySetUnavailable(String),

    #[error("Key set transport error: {0}")]
    KeySetTransportError(String),

    #[error("Malformed key set: {0}")]
    MalformedKeySet(String),

    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Token expired")]
    TokenExpired,

    #[error("Audience mismatch")]
    AudienceMismatch,

    #[error("Malformed token: {0}")]
    MalformedToken(String),
}

impl GateError {
    /// Stable label for logs and metrics. Bounded by the variant set.
    pub fn kind(&self) -> &'static str {
        match self {
            GateError::KeySetUnavailable(_) => "key_set_unavailable",
            GateError::KeySetTransportError(_) => "key_set_transport_error",
            GateError::MalformedKeySet(_) => "malformed_key_set",
            GateError::KeyNotFound(_) => "key_not_found",
            GateError::InvalidSignature(_) => "invalid_signature",
            GateError::TokenExpired => "token_expired",
            GateError::AudienceMismatch => "audience_mismatch",
            GateError::MalformedToken(_) => "malformed_token",
        }
    }

    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            GateError::KeySetUnavailable(_)
            | GateError::KeySetTransportError(_)
            | GateError::MalformedKeySet(_) => 503,
            GateError::KeyNotFound(_)
            | GateError::InvalidSignature(_)
            | GateError::TokenExpired
            | GateError::AudienceMismatch
            | GateError::MalformedToken(_) => 401,
        }
    }
}

impl From<JwtValidationError> for GateError {
    fn from(err: JwtValidationError) -> Self {
        let detail = match err {
            JwtValidationError::TokenTooLarge => "token exceeds size limit",
            JwtValidationError::MalformedToken => "token is not a compact JWS",
            JwtValidationError::MissingKid => "header has no usable kid",
            JwtValidationError::MissingAlgorithm => "header has no usable alg",
        };
        GateError::MalformedToken(detail.to_string())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    message: &'static str,
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        let (status, message) = if self.status_code() == 503 {
            // Log actual reason server-side
            tracing::warn!(target: "gate.availability", error = %self, "Key set unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "Service temporarily unavailable",
            )
        } else {
            (StatusCode::UNAUTHORIZED, "Unauthorized")
        };

        let mut response = (status, Json(ErrorResponse { message })).into_response();

        // Add WWW-Authenticate header for 401 responses
        if status == StatusCode::UNAUTHORIZED {
            if let Ok(header_value) = "Bearer error=\"invalid_token\"".parse() {
                response
                    .headers_mut()
                    .insert("WWW-Authenticate", header_value);
            }
        }

        response
    }
}
