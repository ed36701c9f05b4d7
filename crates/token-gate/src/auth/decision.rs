//! Authorization decision artifacts returned to the gateway.

use serde::{Deserialize, Serialize};

/// Policy language version understood by the gateway.
pub const POLICY_VERSION: &str = "2012-10-17";

/// Action every statement grants or denies.
pub const INVOKE_ACTION: &str = "execute-api:Invoke";

/// Whether a statement grants or refuses the action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    Allow,
    Deny,
}

/// One policy clause: `effect` applied to `action` on `resource`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Statement {
    /// Always [`INVOKE_ACTION`].
    pub action: String,
    pub effect: Effect,
    /// Method ARN the clause covers.
    pub resource: String,
}

/// Policy attached to an allow decision. Field names are PascalCase on the
/// wire, as the gateway expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    pub version: String,
    pub statement: Vec<Statement>,
}

/// Decision for one call. An absent policy document means no explicit
/// grant was produced and must not be read as an allow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationDecision {
    pub principal_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_document: Option<PolicyDocument>,
}

impl AuthorizationDecision {
    /// Effect of the single statement, if a policy was produced.
    pub fn effect(&self) -> Option<Effect> {
        self.policy_document
            .as_ref()
            .and_then(|policy| policy.statement.first())
            .map(|statement| statement.effect)
    }
}

/// Build a decision for `principal_id`.
///
/// The policy clause is only attached when both an effect and a non-empty
/// resource are supplied.
pub fn generate_policy(
    principal_id: &str,
    effect: Option<Effect>,
    resource: &str,
) -> AuthorizationDecision {
    let policy_document = match effect {
        Some(effect) if !resource.is_empty() => Some(PolicyDocument {
            version: POLICY_VERSION.to_string(),
            statement: vec![Statement {
                action: INVOKE_ACTION.to_string(),
                effect,
                resource: resource.to_string(),
            }],
        }),
        _ => None,
    };

    AuthorizationDecision {
        principal_id: principal_id.to_string(),
        policy_document,
    }
}
