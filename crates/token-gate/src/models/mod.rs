//! Token gate wire models.

use crate::gate::AuthorizationRequest;
use serde::{Deserialize, Serialize};

/// Authorizer event sent by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizerRequest {
    /// Event type ("TOKEN"). Informational only.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub request_type: Option<String>,

    /// Raw token, optionally prefixed with "Bearer ".
    pub authorization_token: String,

    /// Resource being invoked.
    pub method_arn: String,
}

impl AuthorizerRequest {
    /// Convert into a gate request, dropping any bearer scheme.
    pub fn into_gate_request(self) -> AuthorizationRequest {
        let token = match self.authorization_token.strip_prefix("Bearer ") {
            Some(token) => token.trim().to_string(),
            None => self.authorization_token,
        };
        AuthorizationRequest::new(token, self.method_arn)
    }
}
