//! Liveness handler.

/// Returns "OK" while the process is serving. Does not check the key-set
/// endpoint; an outage there surfaces as 503s on `/v1/authorize`.
pub async fn health_check() -> &'static str {
    "OK"
}
