//! Authorization handler.

use crate::auth::decision::AuthorizationDecision;
use crate::errors::GateError;
use crate::models::AuthorizerRequest;
use crate::routes::AppState;
use axum::extract::State;
use axum::Json;
use std::sync::Arc;

/// Handler for POST /v1/authorize
///
/// Returns the decision with 200, or the rejection's error mapped to a
/// uniform 401/503 response.
#[tracing::instrument(skip_all, name = "gate.http.authorize")]
pub async fn authorize(
    State(state): State<Arc<AppState>>,
    Json(event): Json<AuthorizerRequest>,
) -> Result<Json<AuthorizationDecision>, GateError> {
    let request = event.into_gate_request();

    state
        .gate
        .authorize(&request)
        .await
        .map(Json)
        .map_err(|rejection| rejection.error)
}
