//! Gate entry point.
//!
//! Runs one authorization through the fixed pipeline:
//!
//! ```text
//! Received -> HeaderParsed -> KeySetFetched -> KeyResolved
//!          -> SignatureVerified -> ClaimsValidated -> DecisionIssued
//! ```
//!
//! Any stage failure stops the pipeline and rejects. The whole run is
//! bounded by the configured deadline.

use crate::auth::claims::{validate_claims, AudienceClaim};
use crate::auth::decision::{generate_policy, AuthorizationDecision, Effect};
use crate::auth::jwks::{HttpKeySetFetcher, JwksClient, KeySetSnapshot};
use crate::auth::keys::Jwk;
use crate::auth::verify::verify_signature;
use crate::config::Config;
use crate::errors::GateError;
use crate::observability::metrics::record_authorization;
use common::jwt::{decode_header, split_token};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::instrument;

/// Pipeline states. `Rejected` is reachable from every other state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Received,
    HeaderParsed,
    KeySetFetched,
    KeyResolved,
    SignatureVerified,
    ClaimsValidated,
    DecisionIssued,
    Rejected,
}

/// One inbound authorization request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    /// Compact token exactly as presented (no scheme prefix).
    pub authorization_token: String,

    /// Resource the decision applies to.
    pub method_arn: String,
}

impl AuthorizationRequest {
    /// Request for `authorization_token` against `method_arn`.
    pub fn new(authorization_token: impl Into<String>, method_arn: impl Into<String>) -> Self {
        Self {
            authorization_token: authorization_token.into(),
            method_arn: method_arn.into(),
        }
    }
}

/// Terminal rejection. `last_state` is the last stage that succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("rejected after {last_state:?}: {error}")]
pub struct Rejection {
    pub error: GateError,
    pub last_state: GateState,
}

impl Rejection {
    /// Terminal state of a rejected run; always `GateState::Rejected`.
    pub fn state(&self) -> GateState {
        GateState::Rejected
    }
}

/// Token gate shared by all requests.
pub struct TokenGate {
    jwks: Arc<JwksClient>,
    expected_audience: String,
    audience_claim: AudienceClaim,
    deadline: Duration,
}

impl TokenGate {
    /// Gate over an existing key-set client.
    ///
    /// `deadline` bounds each `authorize` call end to end.
    pub fn new(
        jwks: Arc<JwksClient>,
        expected_audience: String,
        audience_claim: AudienceClaim,
        deadline: Duration,
    ) -> Self {
        Self {
            jwks,
            expected_audience,
            audience_claim,
            deadline,
        }
    }

    /// Build a gate that fetches keys over HTTP as configured.
    pub fn from_config(config: &Config) -> Self {
        let fetcher = HttpKeySetFetcher::new(config.jwks_url.clone(), config.jwks_fetch_timeout);
        let jwks = JwksClient::new(
            Arc::new(fetcher),
            config.jwks_cache_ttl,
            config.jwks_min_refresh_interval,
        );

        Self::new(
            Arc::new(jwks),
            config.expected_audience.clone(),
            config.audience_claim,
            config.verify_deadline,
        )
    }

    /// Authorize one request.
    ///
    /// # Errors
    ///
    /// Returns a `Rejection` carrying the first failing stage's error. A run
    /// that exceeds the deadline is rejected with `KeySetTransportError`.
    #[instrument(skip_all)]
    pub async fn authorize(
        &self,
        request: &AuthorizationRequest,
    ) -> Result<AuthorizationDecision, Rejection> {
        let start = Instant::now();
        let mut state = GateState::Received;

        let result = match tokio::time::timeout(self.deadline, self.run(request, &mut state)).await
        {
            Ok(result) => result,
            Err(_) => Err(GateError::KeySetTransportError(format!(
                "verification exceeded deadline of {}ms",
                self.deadline.as_millis()
            ))),
        };
        let duration = start.elapsed();

        match result {
            Ok(decision) => {
                tracing::info!(
                    target: "gate.pipeline",
                    duration_ms = duration.as_millis() as u64,
                    "Authorization allowed"
                );
                record_authorization("allow", None, duration);
                Ok(decision)
            }
            Err(error) => {
                tracing::info!(
                    target: "gate.pipeline",
                    error_kind = error.kind(),
                    error = %error,
                    last_state = ?state,
                    duration_ms = duration.as_millis() as u64,
                    "Authorization rejected"
                );
                record_authorization("reject", Some(error.kind()), duration);
                Err(Rejection {
                    error,
                    last_state: state,
                })
            }
        }
    }

    async fn run(
        &self,
        request: &AuthorizationRequest,
        state: &mut GateState,
    ) -> Result<AuthorizationDecision, GateError> {
        // Untrusted until the signature verifies
        let parts = split_token(&request.authorization_token)?;
        let header = decode_header(parts.header)?;
        *state = GateState::HeaderParsed;

        let snapshot = self.jwks.key_set().await?;
        *state = GateState::KeySetFetched;

        let jwk = self.resolve_key(snapshot, &header.kid).await?;
        *state = GateState::KeyResolved;

        let claims = verify_signature(&parts, &header, &jwk)?;
        *state = GateState::SignatureVerified;

        let claims = validate_claims(claims, &self.expected_audience, self.audience_claim)?;
        *state = GateState::ClaimsValidated;

        let decision = generate_policy(&claims.sub, Some(Effect::Allow), &request.method_arn);
        *state = GateState::DecisionIssued;

        Ok(decision)
    }

    /// Resolve `kid`, refreshing once when a cached snapshot misses.
    async fn resolve_key(&self, snapshot: KeySetSnapshot, kid: &str) -> Result<Jwk, GateError> {
        match snapshot.keys.resolve(kid) {
            Ok(jwk) => return Ok(jwk.clone()),
            Err(e) if snapshot.fresh => return Err(e),
            Err(_) => {}
        }

        match self.jwks.refresh_after_miss(&snapshot.keys).await? {
            Some(keys) => keys.resolve(kid).cloned(),
            None => Err(GateError::KeyNotFound(kid.to_string())),
        }
    }
}
