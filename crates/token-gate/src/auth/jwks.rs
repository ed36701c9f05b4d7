//! Key-set fetching and caching.
//!
//! `HttpKeySetFetcher` retrieves the raw key-set document from the issuer's
//! well-known endpoint. `JwksClient` layers a time-bounded cache on top:
//!
//! - Readers share one `Arc<KeySet>` snapshot behind an `RwLock`
//! - Refresh is single-flight: one task fetches, the others reuse its result,
//!   including its error when the fetch failed
//! - A TTL of zero bypasses the cache so every verification fetches
//! - A kid miss against a cached snapshot may force one refresh, rate
//!   limited by `min_refresh_interval`
//! - A failed fetch never replaces the previous snapshot

use crate::auth::keys::KeySet;
use crate::errors::GateError;
use crate::observability::metrics::{record_jwks_cache, record_jwks_fetch};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::instrument;

/// Largest key-set document accepted from the endpoint.
pub const MAX_KEY_SET_BYTES: usize = 1024 * 1024;

/// Source of raw key-set documents.
#[async_trait]
pub trait KeySetFetcher: Send + Sync {
    /// Retrieve the current key-set document.
    ///
    /// # Errors
    ///
    /// - `GateError::KeySetUnavailable` on a non-success status or a refused connection
    /// - `GateError::KeySetTransportError` on timeouts and other transport failures
    /// - `GateError::MalformedKeySet` when the body exceeds `MAX_KEY_SET_BYTES`
    async fn fetch(&self) -> Result<Bytes, GateError>;
}

/// Fetches the key set over HTTP(S) with a per-request timeout.
pub struct HttpKeySetFetcher {
    jwks_url: String,
    http_client: reqwest::Client,
    timeout: Duration,
}

impl HttpKeySetFetcher {
    /// Create a fetcher for `jwks_url`.
    ///
    /// `timeout` bounds the whole request, including reading the body.
    pub fn new(jwks_url: String, timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(target: "gate.auth.jwks", error = %e, "Failed to build HTTP client with custom config, using defaults");
                reqwest::Client::new()
            });

        Self {
            jwks_url,
            http_client,
            timeout,
        }
    }
}

fn map_transport_error(e: &reqwest::Error) -> GateError {
    if e.is_timeout() {
        GateError::KeySetTransportError(format!("request timed out: {}", e))
    } else if e.is_connect() {
        GateError::KeySetUnavailable(format!("connection failed: {}", e))
    } else {
        GateError::KeySetTransportError(e.to_string())
    }
}

#[async_trait]
impl KeySetFetcher for HttpKeySetFetcher {
    #[instrument(skip_all)]
    async fn fetch(&self) -> Result<Bytes, GateError> {
        tracing::debug!(target: "gate.auth.jwks", url = %self.jwks_url, "Fetching key set");

        // Per-request timeout in case the client fell back to defaults
        let mut response = self
            .http_client
            .get(&self.jwks_url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(target: "gate.auth.jwks", error = %e, "Failed to fetch key set");
                map_transport_error(&e)
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!(
                target: "gate.auth.jwks",
                status = %status,
                "Key-set endpoint returned error"
            );
            return Err(GateError::KeySetUnavailable(format!(
                "endpoint returned status {}",
                status.as_u16()
            )));
        }

        if response
            .content_length()
            .is_some_and(|len| len > MAX_KEY_SET_BYTES as u64)
        {
            return Err(GateError::MalformedKeySet(
                "document exceeds size limit".to_string(),
            ));
        }

        let mut body = BytesMut::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| {
            tracing::error!(target: "gate.auth.jwks", error = %e, "Failed to read key set body");
            map_transport_error(&e)
        })? {
            if body.len() + chunk.len() > MAX_KEY_SET_BYTES {
                return Err(GateError::MalformedKeySet(
                    "document exceeds size limit".to_string(),
                ));
            }
            body.extend_from_slice(&chunk);
        }

        Ok(body.freeze())
    }
}

/// Key set handed to the resolver for one verification.
#[derive(Debug, Clone)]
pub struct KeySetSnapshot {
    pub keys: Arc<KeySet>,

    /// True when this snapshot was fetched for the current request. A kid
    /// miss against a fresh snapshot is final.
    pub fresh: bool,
}

struct CachedKeySet {
    keys: Arc<KeySet>,
    fetched_at: Instant,
}

/// Bookkeeping guarded by the refresh lock.
#[derive(Default)]
struct RefreshState {
    /// When the last forced refresh after a kid miss started.
    last_forced: Option<Instant>,

    /// The latest failed fetch and when it finished. Tasks that queued for
    /// the lock before that instant share the error instead of refetching.
    last_failure: Option<(Instant, GateError)>,
}

impl RefreshState {
    fn failure_since(&self, queued_at: Instant) -> Option<GateError> {
        self.last_failure
            .as_ref()
            .filter(|(failed_at, _)| *failed_at > queued_at)
            .map(|(_, error)| error.clone())
    }
}

/// Caching key-set client shared by all verifications.
pub struct JwksClient {
    fetcher: Arc<dyn KeySetFetcher>,

    cache: RwLock<Option<CachedKeySet>>,

    /// Serializes refreshes.
    refresh_lock: Mutex<RefreshState>,

    cache_ttl: Duration,

    min_refresh_interval: Duration,
}

impl JwksClient {
    /// Create a client.
    ///
    /// # Arguments
    ///
    /// * `fetcher` - Source of key-set documents
    /// * `cache_ttl` - Staleness bound; zero disables caching
    /// * `min_refresh_interval` - Minimum spacing between forced refreshes
    pub fn new(
        fetcher: Arc<dyn KeySetFetcher>,
        cache_ttl: Duration,
        min_refresh_interval: Duration,
    ) -> Self {
        Self {
            fetcher,
            cache: RwLock::new(None),
            refresh_lock: Mutex::new(RefreshState::default()),
            cache_ttl,
            min_refresh_interval,
        }
    }

    /// False when the TTL is zero and every verification fetches.
    pub fn caching_enabled(&self) -> bool {
        !self.cache_ttl.is_zero()
    }

    /// Current key set, fetching when the cache is empty or stale.
    ///
    /// # Errors
    ///
    /// Propagates fetch and parse errors. A stale snapshot is never served.
    pub async fn key_set(&self) -> Result<KeySetSnapshot, GateError> {
        if !self.caching_enabled() {
            let keys = self.fetch_and_store().await?;
            return Ok(KeySetSnapshot { keys, fresh: true });
        }

        if let Some(keys) = self.cached().await {
            record_jwks_cache("hit");
            return Ok(KeySetSnapshot { keys, fresh: false });
        }

        let queued_at = Instant::now();
        let mut refresh = self.refresh_lock.lock().await;

        // Another task may have refreshed while we waited for the lock
        if let Some(keys) = self.cached().await {
            record_jwks_cache("hit");
            return Ok(KeySetSnapshot { keys, fresh: false });
        }

        // Or tried and failed; its outcome stands for everyone queued behind it
        if let Some(error) = refresh.failure_since(queued_at) {
            return Err(error);
        }

        let had_snapshot = self.cache.read().await.is_some();
        record_jwks_cache(if had_snapshot { "stale" } else { "miss" });

        let keys = self.refresh_locked(&mut refresh).await?;
        Ok(KeySetSnapshot { keys, fresh: true })
    }

    /// Refresh after a kid was not found in `seen`.
    ///
    /// Returns `Ok(None)` when no newer key set can be obtained (caching
    /// disabled or rate limited); the caller then fails closed.
    ///
    /// # Errors
    ///
    /// Propagates fetch and parse errors from the forced refresh.
    #[instrument(skip_all)]
    pub async fn refresh_after_miss(
        &self,
        seen: &Arc<KeySet>,
    ) -> Result<Option<Arc<KeySet>>, GateError> {
        if !self.caching_enabled() {
            return Ok(None);
        }

        let queued_at = Instant::now();
        let mut refresh = self.refresh_lock.lock().await;

        // A concurrent refresh already replaced the snapshot we resolved against
        if let Some(keys) = self.cached().await {
            if !Arc::ptr_eq(&keys, seen) {
                return Ok(Some(keys));
            }
        }

        if let Some(error) = refresh.failure_since(queued_at) {
            return Err(error);
        }

        if let Some(last) = refresh.last_forced {
            if last.elapsed() < self.min_refresh_interval {
                tracing::warn!(
                    target: "gate.auth.jwks",
                    "Unknown kid but forced refresh is rate limited"
                );
                record_jwks_cache("refresh_skipped");
                return Ok(None);
            }
        }

        refresh.last_forced = Some(Instant::now());
        tracing::info!(target: "gate.auth.jwks", "Unknown kid, forcing key set refresh");
        self.refresh_locked(&mut refresh).await.map(Some)
    }

    /// Fetch while holding the refresh lock, remembering a failure for the
    /// tasks queued behind this one.
    async fn refresh_locked(&self, refresh: &mut RefreshState) -> Result<Arc<KeySet>, GateError> {
        let result = self.fetch_and_store().await;
        refresh.last_failure = match &result {
            Ok(_) => None,
            Err(e) => Some((Instant::now(), e.clone())),
        };
        result
    }

    async fn cached(&self) -> Option<Arc<KeySet>> {
        let cache = self.cache.read().await;
        cache
            .as_ref()
            .filter(|cached| cached.fetched_at.elapsed() < self.cache_ttl)
            .map(|cached| Arc::clone(&cached.keys))
    }

    async fn fetch_and_store(&self) -> Result<Arc<KeySet>, GateError> {
        let start = Instant::now();
        let result = match self.fetcher.fetch().await {
            Ok(document) => KeySet::from_document(&document),
            Err(e) => Err(e),
        };
        let duration = start.elapsed();

        let keys = match result {
            Ok(keys) => {
                record_jwks_fetch("success", duration);
                Arc::new(keys)
            }
            Err(e) => {
                tracing::warn!(
                    target: "gate.auth.jwks",
                    error_kind = e.kind(),
                    error = %e,
                    "Key set fetch failed"
                );
                record_jwks_fetch(e.kind(), duration);
                return Err(e);
            }
        };

        tracing::info!(
            target: "gate.auth.jwks",
            key_count = keys.len(),
            duration_ms = duration.as_millis() as u64,
            "Key set fetched"
        );

        if self.caching_enabled() {
            let mut cache = self.cache.write().await;
            *cache = Some(CachedKeySet {
                keys: Arc::clone(&keys),
                fetched_at: Instant::now(),
            });
        }

        Ok(keys)
    }

    /// Drop the cached snapshot.
    #[cfg(test)]
    pub async fn clear_cache(&self) {
        let mut cache = self.cache.write().await;
        *cache = None;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DOC_A: &str = r#"{"keys":[{"kty":"OKP","kid":"key-a","crv":"Ed25519","x":"AA"}]}"#;
    const DOC_B: &str = r#"{"keys":[{"kty":"OKP","kid":"key-b","crv":"Ed25519","x":"AA"}]}"#;

    /// Fetcher returning a swappable document and counting calls.
    struct MockFetcher {
        response: std::sync::Mutex<Result<Bytes, GateError>>,
        calls: AtomicUsize,
        delay: Duration,
    }

    impl MockFetcher {
        fn new(document: &str) -> Arc<Self> {
            Self::with_delay(document, Duration::ZERO)
        }

        fn with_delay(document: &str, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                response: std::sync::Mutex::new(Ok(Bytes::from(document.to_string()))),
                calls: AtomicUsize::new(0),
                delay,
            })
        }

        fn set(&self, response: Result<Bytes, GateError>) {
            *self.response.lock().unwrap() = response;
        }

        fn set_document(&self, document: &str) {
            self.set(Ok(Bytes::from(document.to_string())));
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl KeySetFetcher for MockFetcher {
        async fn fetch(&self) -> Result<Bytes, GateError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.response.lock().unwrap().clone()
        }
    }

    fn client(fetcher: &Arc<MockFetcher>, ttl: Duration, min_refresh: Duration) -> JwksClient {
        JwksClient::new(fetcher.clone(), ttl, min_refresh)
    }

    #[tokio::test]
    async fn test_cache_hit_after_first_fetch() {
        let fetcher = MockFetcher::new(DOC_A);
        let client = client(&fetcher, Duration::from_secs(300), Duration::ZERO);

        let first = client.key_set().await.unwrap();
        assert!(first.fresh);

        let second = client.key_set().await.unwrap();
        assert!(!second.fresh);
        assert!(Arc::ptr_eq(&first.keys, &second.keys));
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_zero_ttl_fetches_every_time() {
        let fetcher = MockFetcher::new(DOC_A);
        let client = client(&fetcher, Duration::ZERO, Duration::ZERO);

        for _ in 0..3 {
            let snapshot = client.key_set().await.unwrap();
            assert!(snapshot.fresh);
        }
        assert_eq!(fetcher.calls(), 3);

        // No cache means nothing to refresh
        let snapshot = client.key_set().await.unwrap();
        assert!(client.refresh_after_miss(&snapshot.keys).await.unwrap().is_none());
        assert_eq!(fetcher.calls(), 4);
    }

    #[tokio::test]
    async fn test_stale_cache_is_refetched() {
        let fetcher = MockFetcher::new(DOC_A);
        let client = client(&fetcher, Duration::from_millis(50), Duration::ZERO);

        client.key_set().await.unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;
        fetcher.set_document(DOC_B);

        let snapshot = client.key_set().await.unwrap();
        assert!(snapshot.fresh);
        assert!(snapshot.keys.resolve("key-b").is_ok());
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_stale_snapshot_not_served_when_fetch_fails() {
        let fetcher = MockFetcher::new(DOC_A);
        let client = client(&fetcher, Duration::from_millis(50), Duration::ZERO);

        client.key_set().await.unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;
        fetcher.set(Err(GateError::KeySetUnavailable("status 500".to_string())));

        let result = client.key_set().await;
        assert!(matches!(result, Err(GateError::KeySetUnavailable(_))));

        // Recovery once the endpoint is back
        fetcher.set_document(DOC_A);
        assert!(client.key_set().await.is_ok());
    }

    #[tokio::test]
    async fn test_malformed_document_is_not_cached() {
        let fetcher = MockFetcher::new("not json");
        let client = client(&fetcher, Duration::from_secs(300), Duration::ZERO);

        let result = client.key_set().await;
        assert!(matches!(result, Err(GateError::MalformedKeySet(_))));

        fetcher.set_document(DOC_A);
        let snapshot = client.key_set().await.unwrap();
        assert!(snapshot.fresh);
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_refresh_is_single_flight() {
        let fetcher = MockFetcher::with_delay(DOC_A, Duration::from_millis(50));
        let client = client(&fetcher, Duration::from_secs(300), Duration::ZERO);

        let results = futures::future::join_all((0..10).map(|_| client.key_set())).await;

        assert!(results.iter().all(Result::is_ok));
        assert_eq!(fetcher.calls(), 1, "only one task should fetch");
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_a_failed_fetch() {
        let fetcher = MockFetcher::with_delay(DOC_A, Duration::from_millis(50));
        fetcher.set(Err(GateError::KeySetUnavailable("status 500".to_string())));
        let client = client(&fetcher, Duration::from_secs(300), Duration::ZERO);

        let results = futures::future::join_all((0..10).map(|_| client.key_set())).await;

        assert!(results
            .iter()
            .all(|r| matches!(r, Err(GateError::KeySetUnavailable(_)))));
        assert_eq!(fetcher.calls(), 1, "queued callers must not refetch");

        // A caller arriving after the failure tries again
        fetcher.set_document(DOC_A);
        assert!(client.key_set().await.unwrap().fresh);
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_refresh_after_miss_fetches_rotated_keys() {
        let fetcher = MockFetcher::new(DOC_A);
        let client = client(&fetcher, Duration::from_secs(300), Duration::ZERO);

        let snapshot = client.key_set().await.unwrap();
        assert!(snapshot.keys.resolve("key-b").is_err());

        fetcher.set_document(DOC_B);
        let refreshed = client
            .refresh_after_miss(&snapshot.keys)
            .await
            .unwrap()
            .expect("refresh should run");
        assert!(refreshed.resolve("key-b").is_ok());

        // The refreshed snapshot is now what readers see
        let next = client.key_set().await.unwrap();
        assert!(Arc::ptr_eq(&next.keys, &refreshed));
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_refresh_after_miss_is_rate_limited() {
        let fetcher = MockFetcher::new(DOC_A);
        let client = client(&fetcher, Duration::from_secs(300), Duration::from_secs(60));

        let snapshot = client.key_set().await.unwrap();
        let refreshed = client.refresh_after_miss(&snapshot.keys).await.unwrap();
        let refreshed = refreshed.expect("first forced refresh is allowed");
        assert_eq!(fetcher.calls(), 2);

        let skipped = client.refresh_after_miss(&refreshed).await.unwrap();
        assert!(skipped.is_none());
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_refresh_after_miss_reuses_newer_snapshot() {
        let fetcher = MockFetcher::new(DOC_A);
        let client = client(&fetcher, Duration::from_secs(300), Duration::ZERO);

        let old = client.key_set().await.unwrap();
        fetcher.set_document(DOC_B);
        let newer = client.refresh_after_miss(&old.keys).await.unwrap().unwrap();
        assert_eq!(fetcher.calls(), 2);

        // A second caller still holding the old snapshot gets the newer one
        let reused = client.refresh_after_miss(&old.keys).await.unwrap().unwrap();
        assert!(Arc::ptr_eq(&reused, &newer));
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_clear_cache_forces_fetch() {
        let fetcher = MockFetcher::new(DOC_A);
        let client = client(&fetcher, Duration::from_secs(300), Duration::ZERO);

        client.key_set().await.unwrap();
        client.clear_cache().await;
        assert!(client.key_set().await.unwrap().fresh);
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_http_fetcher_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/jwks.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(DOC_A))
            .mount(&server)
            .await;

        let fetcher = HttpKeySetFetcher::new(
            format!("{}/.well-known/jwks.json", server.uri()),
            Duration::from_secs(2),
        );
        let body = fetcher.fetch().await.unwrap();
        assert_eq!(body, Bytes::from(DOC_A));
    }

    #[tokio::test]
    async fn test_http_fetcher_error_status_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let fetcher = HttpKeySetFetcher::new(server.uri(), Duration::from_secs(2));
        let result = fetcher.fetch().await;
        assert!(matches!(result, Err(GateError::KeySetUnavailable(_))));
    }

    #[tokio::test]
    async fn test_http_fetcher_connection_refused_is_unavailable() {
        // Bind then drop a listener to get a port nothing listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let fetcher = HttpKeySetFetcher::new(format!("http://{}/jwks", addr), Duration::from_secs(2));
        let result = fetcher.fetch().await;
        assert!(
            matches!(result, Err(GateError::KeySetUnavailable(_))),
            "got {:?}",
            result
        );
    }

    #[tokio::test]
    async fn test_http_fetcher_timeout_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(DOC_A)
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let fetcher = HttpKeySetFetcher::new(server.uri(), Duration::from_millis(100));
        let result = fetcher.fetch().await;
        assert!(
            matches!(result, Err(GateError::KeySetTransportError(_))),
            "got {:?}",
            result
        );
    }

    #[tokio::test]
    async fn test_http_fetcher_rejects_oversized_document() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(MAX_KEY_SET_BYTES + 1)))
            .mount(&server)
            .await;

        let fetcher = HttpKeySetFetcher::new(server.uri(), Duration::from_secs(2));
        let result = fetcher.fetch().await;
        assert!(matches!(result, Err(GateError::MalformedKeySet(_))));
    }
}
