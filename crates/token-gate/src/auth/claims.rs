//! Verified token claims and the temporal/audience checks run on them.
//!
//! Claims only exist after the signature verified. The `sub` field is
//! redacted in Debug output to prevent exposure in logs.

use crate::errors::GateError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Audience claim value. Issuers may emit a single string or an array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    Single(String),
    Multiple(Vec<String>),
}

/// Which claim the audience check reads.
///
/// Id tokens carry the app client in `aud`; access tokens carry it in
/// `client_id` and have no `aud`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudienceClaim {
    Aud,
    ClientId,
}

impl AudienceClaim {
    /// Parses the configured claim name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "aud" => Some(AudienceClaim::Aud),
            "client_id" => Some(AudienceClaim::ClientId),
            _ => None,
        }
    }

    /// Claim name as written in tokens and configuration.
    pub fn as_str(self) -> &'static str {
        match self {
            AudienceClaim::Aud => "aud",
            AudienceClaim::ClientId => "client_id",
        }
    }
}

/// Claims decoded from a verified token payload.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject identifier - redacted in Debug output.
    pub sub: String,

    /// Expiration as a NumericDate (Unix epoch seconds, possibly fractional).
    pub exp: f64,

    /// Intended audience (id tokens).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<Audience>,

    /// App client id (access tokens).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// Issued-at NumericDate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<f64>,

    /// Issuer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// "id" or "access".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_use: Option<String>,
}

/// Custom Debug implementation that redacts the `sub` field.
impl fmt::Debug for Claims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Claims")
            .field("sub", &"[REDACTED]")
            .field("exp", &self.exp)
            .field("aud", &self.aud)
            .field("client_id", &self.client_id)
            .field("iat", &self.iat)
            .field("iss", &self.iss)
            .field("token_use", &self.token_use)
            .finish()
    }
}

impl Claims {
    /// The audience value selected by `claim`, when it is a single string.
    fn audience(&self, claim: AudienceClaim) -> Option<&str> {
        match claim {
            AudienceClaim::Aud => match &self.aud {
                Some(Audience::Single(aud)) => Some(aud.as_str()),
                // An array never equals a single configured audience
                Some(Audience::Multiple(_)) | None => None,
            },
            AudienceClaim::ClientId => self.client_id.as_deref(),
        }
    }
}

/// Validate claims against the wall clock.
pub fn validate_claims(
    claims: Claims,
    expected_audience: &str,
    audience_claim: AudienceClaim,
) -> Result<Claims, GateError> {
    validate_claims_at(
        claims,
        expected_audience,
        audience_claim,
        chrono::Utc::now().timestamp(),
    )
}

/// Validate claims at a fixed `now` (Unix epoch seconds).
///
/// Expiration is checked first, then audience. A token whose `exp` equals
/// `now` is still valid, and a fractional `exp` compares numerically. The
/// audience must match exactly.
pub fn validate_claims_at(
    claims: Claims,
    expected_audience: &str,
    audience_claim: AudienceClaim,
    now: i64,
) -> Result<Claims, GateError> {
    if now as f64 > claims.exp {
        tracing::debug!(
            target: "gate.auth.claims",
            exp = claims.exp,
            now = now,
            "Token expired"
        );
        return Err(GateError::TokenExpired);
    }

    if claims.audience(audience_claim) != Some(expected_audience) {
        tracing::debug!(
            target: "gate.auth.claims",
            claim = audience_claim.as_str(),
            "Audience mismatch"
        );
        return Err(GateError::AudienceMismatch);
    }

    Ok(claims)
}
