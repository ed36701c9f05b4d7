//! Metrics definitions for the token gate.
//!
//! All metrics follow Prometheus naming conventions:
//! - `gate_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `outcome`: 2 values (allow, reject)
//! - `error_kind`: bounded by `GateError` variants plus "none"
//! - `status`: "success" or a `GateError` kind
//! - `result`: 4 values (hit, miss, stale, refresh_skipped)
//! - `endpoint`: known routes, everything else is "/other"

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("gate_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.200, 0.500, 1.000, 2.000, 5.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        // Cache hits verify in well under a millisecond; misses include a fetch
        .set_buckets_for_metric(
            Matcher::Prefix("gate_authorization".to_string()),
            &[
                0.0005, 0.001, 0.002, 0.005, 0.010, 0.050, 0.100, 0.250, 0.500, 1.000, 5.000,
            ],
        )
        .map_err(|e| format!("Failed to set authorization buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("gate_jwks_fetch".to_string()),
            &[
                0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.000, 3.000, 5.000,
            ],
        )
        .map_err(|e| format!("Failed to set key-set fetch buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// Authorization Metrics
// ============================================================================

/// Record one completed authorization.
///
/// Metric: `gate_authorizations_total`, `gate_authorization_duration_seconds`
/// Labels: `outcome`, `error_kind`
pub fn record_authorization(outcome: &str, error_kind: Option<&str>, duration: Duration) {
    histogram!("gate_authorization_duration_seconds",
        "outcome" => outcome.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("gate_authorizations_total",
        "outcome" => outcome.to_string(),
        "error_kind" => error_kind.unwrap_or("none").to_string()
    )
    .increment(1);
}

// ============================================================================
// Key Set Metrics
// ============================================================================

/// Record a key-set fetch attempt.
///
/// Metric: `gate_jwks_fetch_total`, `gate_jwks_fetch_duration_seconds`
/// Labels: `status` ("success" or an error kind)
pub fn record_jwks_fetch(status: &str, duration: Duration) {
    histogram!("gate_jwks_fetch_duration_seconds").record(duration.as_secs_f64());

    counter!("gate_jwks_fetch_total",
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a key-set cache lookup.
///
/// Metric: `gate_jwks_cache_total`
/// Labels: `result` (hit, miss, stale, refresh_skipped)
pub fn record_jwks_cache(result: &str) {
    counter!("gate_jwks_cache_total",
        "result" => result.to_string()
    )
    .increment(1);
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion
///
/// Metric: `gate_http_requests_total`, `gate_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status_code`
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let normalized_endpoint = normalize_endpoint(endpoint);

    histogram!("gate_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status_code" => status_code.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("gate_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

/// Unknown paths normalized to "/other" to bound cardinality
fn normalize_endpoint(path: &str) -> &'static str {
    match path {
        "/v1/authorize" => "/v1/authorize",
        "/health" => "/health",
        "/metrics" => "/metrics",
        _ => "/other",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};

    fn counter_value(
        snapshot: &[(
            metrics_util::CompositeKey,
            Option<metrics::Unit>,
            Option<metrics::SharedString>,
            DebugValue,
        )],
        name: &str,
        label: (&str, &str),
    ) -> Option<u64> {
        snapshot.iter().find_map(|(key, _, _, value)| {
            let key = key.key();
            let labelled = key
                .labels()
                .any(|l| l.key() == label.0 && l.value() == label.1);
            match value {
                DebugValue::Counter(count) if key.name() == name && labelled => Some(*count),
                _ => None,
            }
        })
    }

    #[test]
    fn test_normalize_endpoint() {
        assert_eq!(normalize_endpoint("/v1/authorize"), "/v1/authorize");
        assert_eq!(normalize_endpoint("/health"), "/health");
        assert_eq!(normalize_endpoint("/metrics"), "/metrics");
        assert_eq!(normalize_endpoint("/v1/authorize/extra"), "/other");
        assert_eq!(normalize_endpoint("/random/abc123"), "/other");
    }

    #[test]
    fn test_record_authorization_labels() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            record_authorization("allow", None, Duration::from_millis(2));
            record_authorization("reject", Some("token_expired"), Duration::from_millis(1));
            record_authorization("reject", Some("token_expired"), Duration::from_millis(1));
        });

        let snapshot = snapshotter.snapshot().into_vec();
        assert_eq!(
            counter_value(
                &snapshot,
                "gate_authorizations_total",
                ("error_kind", "token_expired")
            ),
            Some(2)
        );
        assert_eq!(
            counter_value(&snapshot, "gate_authorizations_total", ("error_kind", "none")),
            Some(1)
        );
    }

    #[test]
    fn test_record_jwks_metrics() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            record_jwks_fetch("success", Duration::from_millis(30));
            record_jwks_cache("hit");
            record_jwks_cache("hit");
            record_jwks_cache("refresh_skipped");
        });

        let snapshot = snapshotter.snapshot().into_vec();
        assert_eq!(
            counter_value(&snapshot, "gate_jwks_fetch_total", ("status", "success")),
            Some(1)
        );
        assert_eq!(
            counter_value(&snapshot, "gate_jwks_cache_total", ("result", "hit")),
            Some(2)
        );
        assert_eq!(
            counter_value(
                &snapshot,
                "gate_jwks_cache_total",
                ("result", "refresh_skipped")
            ),
            Some(1)
        );
    }

    #[test]
    fn test_record_http_request_normalizes_endpoint() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            record_http_request("GET", "/does-not-exist", 404, Duration::from_millis(1));
        });

        let snapshot = snapshotter.snapshot().into_vec();
        assert_eq!(
            counter_value(&snapshot, "gate_http_requests_total", ("endpoint", "/other")),
            Some(1)
        );

        let histogram_labels: Vec<String> = snapshot
            .iter()
            .filter(|(key, _, _, value)| {
                key.key().name() == "gate_http_request_duration_seconds"
                    && matches!(value, DebugValue::Histogram(_))
            })
            .flat_map(|(key, _, _, _)| {
                key.key()
                    .labels()
                    .map(|l| format!("{}={}", l.key(), l.value()))
                    .collect::<Vec<_>>()
            })
            .collect();
        assert!(histogram_labels.contains(&"status_code=404".to_string()));
        assert!(histogram_labels.contains(&"endpoint=/other".to_string()));
    }
}
