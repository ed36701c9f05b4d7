//! Builder patterns for test data construction
//!
//! Provides fluent APIs for creating the claims of identity and access tokens.

use chrono::{Duration, Utc};
use serde_json::json;

/// Audience used by tests unless overridden.
pub const TEST_AUDIENCE: &str = "test-app-client";

/// Builder for creating test token claims
///
/// Defaults describe a valid identity token: `sub = "test-subject"`,
/// `aud = TEST_AUDIENCE`, issued now and expiring in one hour.
///
/// # Example
/// ```rust,ignore
/// let claims = TestTokenBuilder::new()
///     .for_user("alice")
///     .expires_in(3600)
///     .build();
/// let token = key.sign(&claims);
/// ```
pub struct TestTokenBuilder {
    sub: Option<String>,
    aud: Option<serde_json::Value>,
    client_id: Option<String>,
    token_use: Option<String>,
    exp: Option<serde_json::Value>,
    iat: i64,
}

impl TestTokenBuilder {
    /// Create a new token builder with defaults
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            sub: Some("test-subject".to_string()),
            aud: Some(json!(TEST_AUDIENCE)),
            client_id: None,
            token_use: Some("id".to_string()),
            exp: Some(json!((now + Duration::seconds(3600)).timestamp())),
            iat: now.timestamp(),
        }
    }

    /// Set the subject (user identifier)
    pub fn for_user(mut self, subject: &str) -> Self {
        self.sub = Some(subject.to_string());
        self
    }

    /// Drop the `sub` claim entirely
    pub fn without_subject(mut self) -> Self {
        self.sub = None;
        self
    }

    /// Set the `aud` claim
    pub fn with_audience(mut self, audience: &str) -> Self {
        self.aud = Some(json!(audience));
        self
    }

    /// Set the `aud` claim to a JSON array
    pub fn with_audiences(mut self, audiences: &[&str]) -> Self {
        self.aud = Some(json!(audiences));
        self
    }

    /// Shape the claims like an access token: `client_id` instead of `aud`
    pub fn as_access_token(mut self, client_id: &str) -> Self {
        self.aud = None;
        self.client_id = Some(client_id.to_string());
        self.token_use = Some("access".to_string());
        self
    }

    /// Set expiration in seconds from now (negative for already expired)
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.exp = Some(json!((Utc::now() + Duration::seconds(seconds)).timestamp()));
        self
    }

    /// Set an absolute expiration timestamp
    pub fn expires_at(mut self, timestamp: i64) -> Self {
        self.exp = Some(json!(timestamp));
        self
    }

    /// Set a fractional expiration (NumericDate allows non-integer seconds)
    pub fn expires_at_fractional(mut self, timestamp: f64) -> Self {
        self.exp = Some(json!(timestamp));
        self
    }

    /// Drop the `exp` claim entirely
    pub fn without_expiration(mut self) -> Self {
        self.exp = None;
        self
    }

    /// Build the claims as a JSON value
    pub fn build(self) -> serde_json::Value {
        let mut claims = json!({ "iat": self.iat });
        if let Some(sub) = self.sub {
            claims["sub"] = json!(sub);
        }
        if let Some(aud) = self.aud {
            claims["aud"] = aud;
        }
        if let Some(client_id) = self.client_id {
            claims["client_id"] = json!(client_id);
        }
        if let Some(token_use) = self.token_use {
            claims["token_use"] = json!(token_use);
        }
        if let Some(exp) = self.exp {
            claims["exp"] = exp;
        }
        claims
    }
}

impl Default for TestTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}
