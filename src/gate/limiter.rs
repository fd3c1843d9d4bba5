//! Core rate limiting gate implementation.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace};

use super::key::CounterKey;
use super::request::{ClientRequest, GateResponse};
use crate::error::{GateError, Result};
use crate::store::CounterStore;

/// Default key prefix when none is configured.
const DEFAULT_KEY_PREFIX: &str = "rate-limit";

/// The outcome of a rate limit check.
///
/// Ephemeral: computed per request, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The request is within the limit and should be forwarded.
    Allow,
    /// The request exceeds the limit. `retry_after` is the remaining window
    /// in seconds, read from the store at decision time.
    Deny {
        /// Seconds until the client's counter entry expires
        retry_after: u64,
    },
}

/// The rate limiting gate.
///
/// Configured once with a counter store handle, a maximum request count, a
/// time window, a key prefix, and the set of protected routes. The gate owns
/// no mutable state of its own; all counting lives in the store, so a single
/// instance can be shared freely across workers.
///
/// Counting is fixed-window: the first request from a client opens a window
/// by creating its counter entry with the configured expiry, and subsequent
/// requests increment the counter without touching the expiry. Once the entry
/// lapses, the next request opens a fresh window.
pub struct RateGate {
    store: Arc<dyn CounterStore>,
    max_requests: u64,
    window: Duration,
    key_prefix: String,
    protected_routes: HashSet<String>,
}

impl RateGate {
    /// Start building a gate.
    pub fn builder() -> RateGateBuilder {
        RateGateBuilder::new()
    }

    /// The maximum number of requests allowed per window.
    pub fn max_requests(&self) -> u64 {
        self.max_requests
    }

    /// The window duration.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// The configured key prefix.
    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    /// Whether the given path is subject to rate limiting.
    pub fn is_protected(&self, path: &str) -> bool {
        self.protected_routes.contains(path)
    }

    /// Decide whether a request may proceed.
    ///
    /// Requests to unprotected routes are allowed without any store access.
    /// For protected routes this runs the counting protocol: a client's first
    /// request in a window creates its entry at 1 with the window expiry,
    /// requests under the limit increment the entry (expiry untouched), and
    /// requests at or over the limit are denied with the entry's remaining
    /// time-to-live as the retry hint.
    ///
    /// Store failures propagate; the gate neither retries nor guesses a
    /// default decision.
    pub async fn check(&self, request: &ClientRequest) -> Result<Decision> {
        if !self.is_protected(request.path()) {
            trace!(path = %request.path(), "Route not protected, passing through");
            return Ok(Decision::Allow);
        }

        let key = CounterKey::new(&self.key_prefix, request).to_store_key();

        trace!(key = %key, path = %request.path(), "Checking rate limit");

        match self.store.get(&key).await? {
            Some(count) if count >= self.max_requests => {
                // Read the ttl fresh at denial time so the hint reflects the
                // true remaining window, not the state at the earlier get.
                let retry_after = self.store.ttl(&key).await?;
                debug!(
                    key = %key,
                    count = count,
                    retry_after = retry_after,
                    "Rate limit exceeded"
                );
                Ok(Decision::Deny { retry_after })
            }
            Some(_) => {
                // Only the first request of a window sets expiry; increments
                // leave it untouched (fixed-window semantics).
                self.store.increment(&key).await?;
                Ok(Decision::Allow)
            }
            None => {
                debug!(key = %key, window = ?self.window, "Opening new rate limit window");
                self.store.set(&key, 1).await?;
                self.store.expire(&key, self.window).await?;
                Ok(Decision::Allow)
            }
        }
    }

    /// Run a request through the gate.
    ///
    /// On allow, invokes `next` with the original request and returns its
    /// response unmodified. On deny, returns the canonical 429 response
    /// without invoking `next`.
    pub async fn handle<F, Fut>(&self, request: ClientRequest, next: F) -> Result<GateResponse>
    where
        F: FnOnce(ClientRequest) -> Fut,
        Fut: Future<Output = GateResponse>,
    {
        match self.check(&request).await? {
            Decision::Allow => Ok(next(request).await),
            Decision::Deny { retry_after } => Ok(GateResponse::too_many_requests(retry_after)),
        }
    }
}

/// Builder for [`RateGate`].
///
/// The counter store, max request count, and time window are required;
/// [`build`](RateGateBuilder::build) fails with a distinct configuration
/// error for each one that is missing or invalid. The key prefix defaults to
/// `"rate-limit"` and the protected route set defaults to empty (nothing
/// limited).
#[derive(Default)]
pub struct RateGateBuilder {
    store: Option<Arc<dyn CounterStore>>,
    max_requests: Option<u64>,
    window: Option<Duration>,
    key_prefix: Option<String>,
    protected_routes: HashSet<String>,
}

impl RateGateBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the counter store handle. Required.
    pub fn store(mut self, store: Arc<dyn CounterStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the maximum number of requests allowed per window. Required,
    /// must be positive.
    pub fn max_requests(mut self, max: u64) -> Self {
        self.max_requests = Some(max);
        self
    }

    /// Set the window duration. Required, must be positive.
    pub fn window(mut self, window: Duration) -> Self {
        self.window = Some(window);
        self
    }

    /// Set the counter key prefix. Defaults to `"rate-limit"`.
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    /// Add a single protected route path.
    pub fn protect_route(mut self, path: impl Into<String>) -> Self {
        self.protected_routes.insert(path.into());
        self
    }

    /// Add a collection of protected route paths.
    pub fn protected_routes<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.protected_routes
            .extend(paths.into_iter().map(Into::into));
        self
    }

    /// Validate the configuration and build the gate.
    pub fn build(self) -> Result<RateGate> {
        let store = self.store.ok_or_else(|| {
            GateError::Config("counter store must be set before start".to_string())
        })?;

        let max_requests = match self.max_requests {
            Some(max) if max > 0 => max,
            _ => {
                return Err(GateError::Config(
                    "max request count must be a positive number".to_string(),
                ))
            }
        };

        let window = match self.window {
            Some(window) if !window.is_zero() => window,
            _ => {
                return Err(GateError::Config(
                    "time window must be a positive duration".to_string(),
                ))
            }
        };

        Ok(RateGate {
            store,
            max_requests,
            window,
            key_prefix: self
                .key_prefix
                .unwrap_or_else(|| DEFAULT_KEY_PREFIX.to_string()),
            protected_routes: self.protected_routes,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::net::IpAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::store::MemoryStore;

    const MAX: u64 = 5;
    const WINDOW: Duration = Duration::from_secs(30);
    const PREFIX: &str = "rate-limit-test";
    const PROTECTED: &str = "/home/index";

    /// Store wrapper that counts every operation, used to assert the
    /// unprotected-route fast path never touches the store.
    struct RecordingStore {
        inner: MemoryStore,
        operations: AtomicUsize,
    }

    impl RecordingStore {
        fn new() -> Self {
            Self {
                inner: MemoryStore::new(),
                operations: AtomicUsize::new(0),
            }
        }

        fn operation_count(&self) -> usize {
            self.operations.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CounterStore for RecordingStore {
        async fn get(&self, key: &str) -> Result<Option<u64>> {
            self.operations.fetch_add(1, Ordering::SeqCst);
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: u64) -> Result<()> {
            self.operations.fetch_add(1, Ordering::SeqCst);
            self.inner.set(key, value).await
        }

        async fn increment(&self, key: &str) -> Result<u64> {
            self.operations.fetch_add(1, Ordering::SeqCst);
            self.inner.increment(key).await
        }

        async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
            self.operations.fetch_add(1, Ordering::SeqCst);
            self.inner.expire(key, ttl).await
        }

        async fn ttl(&self, key: &str) -> Result<u64> {
            self.operations.fetch_add(1, Ordering::SeqCst);
            self.inner.ttl(key).await
        }
    }

    /// Store whose every operation fails, for error propagation tests.
    struct BrokenStore;

    #[async_trait]
    impl CounterStore for BrokenStore {
        async fn get(&self, _key: &str) -> Result<Option<u64>> {
            Err(GateError::StoreUnavailable("connection refused".to_string()))
        }

        async fn set(&self, _key: &str, _value: u64) -> Result<()> {
            Err(GateError::StoreUnavailable("connection refused".to_string()))
        }

        async fn increment(&self, _key: &str) -> Result<u64> {
            Err(GateError::StoreUnavailable("connection refused".to_string()))
        }

        async fn expire(&self, _key: &str, _ttl: Duration) -> Result<()> {
            Err(GateError::StoreUnavailable("connection refused".to_string()))
        }

        async fn ttl(&self, _key: &str) -> Result<u64> {
            Err(GateError::StoreUnavailable("connection refused".to_string()))
        }
    }

    fn test_gate(store: Arc<dyn CounterStore>) -> RateGate {
        RateGate::builder()
            .store(store)
            .max_requests(MAX)
            .window(WINDOW)
            .key_prefix(PREFIX)
            .protect_route(PROTECTED)
            .build()
            .unwrap()
    }

    fn request_from(path: &str, addr: &str) -> ClientRequest {
        ClientRequest::new(path, Some(addr.parse::<IpAddr>().unwrap()))
    }

    async fn ok_handler(_request: ClientRequest) -> GateResponse {
        GateResponse::new(200, "ok")
    }

    #[test]
    fn test_build_without_store_fails() {
        let result = RateGate::builder()
            .max_requests(MAX)
            .window(WINDOW)
            .build();

        match result {
            Err(GateError::Config(msg)) => assert!(msg.contains("counter store")),
            other => panic!("expected Config error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_build_without_max_fails() {
        let result = RateGate::builder()
            .store(Arc::new(MemoryStore::new()))
            .window(WINDOW)
            .build();

        match result {
            Err(GateError::Config(msg)) => assert!(msg.contains("max request count")),
            other => panic!("expected Config error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_build_without_window_fails() {
        let result = RateGate::builder()
            .store(Arc::new(MemoryStore::new()))
            .max_requests(MAX)
            .build();

        match result {
            Err(GateError::Config(msg)) => assert!(msg.contains("time window")),
            other => panic!("expected Config error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_build_rejects_zero_values() {
        let zero_max = RateGate::builder()
            .store(Arc::new(MemoryStore::new()))
            .max_requests(0)
            .window(WINDOW)
            .build();
        assert!(zero_max.is_err());

        let zero_window = RateGate::builder()
            .store(Arc::new(MemoryStore::new()))
            .max_requests(MAX)
            .window(Duration::ZERO)
            .build();
        assert!(zero_window.is_err());
    }

    #[test]
    fn test_build_with_required_fields_only() {
        let gate = RateGate::builder()
            .store(Arc::new(MemoryStore::new()))
            .max_requests(MAX)
            .window(WINDOW)
            .build()
            .unwrap();

        assert_eq!(gate.key_prefix(), "rate-limit");
        assert!(!gate.is_protected(PROTECTED));
    }

    #[tokio::test]
    async fn test_unprotected_route_never_touches_store() {
        let store = Arc::new(RecordingStore::new());
        let gate = test_gate(store.clone());

        for _ in 0..MAX + 3 {
            let response = gate
                .handle(request_from("/static_page", "::1"), ok_handler)
                .await
                .unwrap();
            assert_eq!(response.status, 200);
            assert_eq!(response.body, "ok");
        }

        assert_eq!(store.operation_count(), 0);
    }

    #[tokio::test]
    async fn test_admission_up_to_limit() {
        let gate = test_gate(Arc::new(MemoryStore::new()));

        for i in 0..MAX {
            let response = gate
                .handle(request_from(PROTECTED, "::1"), ok_handler)
                .await
                .unwrap();
            assert_eq!(response.status, 200, "request {} should be allowed", i + 1);
            assert_eq!(response.body, "ok");
        }
    }

    #[tokio::test]
    async fn test_denial_beyond_limit() {
        let store = Arc::new(MemoryStore::new());
        let gate = test_gate(store.clone());

        for _ in 0..MAX {
            gate.handle(request_from(PROTECTED, "::1"), ok_handler)
                .await
                .unwrap();
        }

        let response = gate
            .handle(request_from(PROTECTED, "::1"), ok_handler)
            .await
            .unwrap();

        assert_eq!(response.status, 429);
        assert_eq!(
            response.headers.get("Content-Type").map(String::as_str),
            Some("text/plain; charset=utf-8")
        );

        let ttl = store.ttl(&format!("{}::{}", PREFIX, "::1")).await.unwrap();
        assert_eq!(
            response.body,
            format!("Rate limit exceeded. Try again in {} seconds.", ttl)
        );
    }

    #[tokio::test]
    async fn test_denied_request_never_reaches_next() {
        let gate = test_gate(Arc::new(MemoryStore::new()));

        for _ in 0..MAX {
            gate.check(&request_from(PROTECTED, "::1")).await.unwrap();
        }

        let response = gate
            .handle(request_from(PROTECTED, "::1"), |_| async {
                panic!("next handler invoked for a denied request")
            })
            .await
            .unwrap();
        assert_eq!(response.status, 429);
    }

    #[tokio::test]
    async fn test_count_at_max_is_denied() {
        let store = Arc::new(MemoryStore::new());
        let gate = test_gate(store.clone());

        // An entry already at the cap denies without incrementing further.
        let key = format!("{}::{}", PREFIX, "::1");
        store.set(&key, MAX).await.unwrap();
        store.expire(&key, WINDOW).await.unwrap();

        let decision = gate.check(&request_from(PROTECTED, "::1")).await.unwrap();
        assert!(matches!(decision, Decision::Deny { .. }));
        assert_eq!(store.get(&key).await.unwrap(), Some(MAX));
    }

    #[tokio::test]
    async fn test_window_reset_allows_again() {
        let store = Arc::new(MemoryStore::new());
        let gate = test_gate(store.clone());

        for _ in 0..MAX {
            gate.check(&request_from(PROTECTED, "::1")).await.unwrap();
        }
        assert!(matches!(
            gate.check(&request_from(PROTECTED, "::1")).await.unwrap(),
            Decision::Deny { .. }
        ));

        store
            .expire(&format!("{}::{}", PREFIX, "::1"), Duration::ZERO)
            .await
            .unwrap();

        let response = gate
            .handle(request_from(PROTECTED, "::1"), ok_handler)
            .await
            .unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, "ok");

        // The fresh window starts counting from 1 again.
        let key = format!("{}::{}", PREFIX, "::1");
        assert_eq!(store.get(&key).await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_per_client_isolation() {
        let gate = test_gate(Arc::new(MemoryStore::new()));

        for _ in 0..MAX {
            let decision = gate.check(&request_from(PROTECTED, "10.0.0.1")).await.unwrap();
            assert_eq!(decision, Decision::Allow);
        }
        assert!(matches!(
            gate.check(&request_from(PROTECTED, "10.0.0.1")).await.unwrap(),
            Decision::Deny { .. }
        ));

        // A different client still has its full budget.
        for _ in 0..MAX {
            let decision = gate.check(&request_from(PROTECTED, "10.0.0.2")).await.unwrap();
            assert_eq!(decision, Decision::Allow);
        }
    }

    #[tokio::test]
    async fn test_address_less_requests_share_unknown_bucket() {
        let gate = test_gate(Arc::new(MemoryStore::new()));

        for _ in 0..MAX {
            let decision = gate
                .check(&ClientRequest::new(PROTECTED, None))
                .await
                .unwrap();
            assert_eq!(decision, Decision::Allow);
        }

        let decision = gate
            .check(&ClientRequest::new(PROTECTED, None))
            .await
            .unwrap();
        assert!(matches!(decision, Decision::Deny { .. }));
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let gate = test_gate(Arc::new(BrokenStore));

        let result = gate.check(&request_from(PROTECTED, "::1")).await;
        assert!(matches!(result, Err(GateError::StoreUnavailable(_))));

        // Unprotected traffic is unaffected by a broken store.
        let response = gate
            .handle(request_from("/static_page", "::1"), ok_handler)
            .await
            .unwrap();
        assert_eq!(response.status, 200);
    }

    #[tokio::test]
    async fn test_six_requests_scenario() {
        let store = Arc::new(MemoryStore::new());
        let gate = test_gate(store.clone());

        for _ in 0..5 {
            let response = gate
                .handle(request_from("/home/index", "::1"), ok_handler)
                .await
                .unwrap();
            assert_eq!(response.status, 200);
            assert_eq!(response.body, "ok");
        }

        let response = gate
            .handle(request_from("/home/index", "::1"), ok_handler)
            .await
            .unwrap();
        assert_eq!(response.status, 429);
        assert!(response.body.starts_with("Rate limit exceeded. Try again in"));

        store
            .expire(&format!("{}::{}", PREFIX, "::1"), Duration::ZERO)
            .await
            .unwrap();

        let response = gate
            .handle(request_from("/home/index", "::1"), ok_handler)
            .await
            .unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, "ok");
    }
}
