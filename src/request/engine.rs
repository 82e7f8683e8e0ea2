//! Execute-classify-retry loop
//!
//! Every attempt attaches a proxy (when the pool has any), performs one
//! transport call, relays the response into the task's sink and decides
//! whether to go again:
//!
//! - transport failure: retry with default options if auto-retry is on,
//!   otherwise give up silently
//! - empty body: retry with a forced-new proxy unless empty bodies are accepted
//! - anything else: done

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, instrument, warn};

use super::client::HttpTransport;
use super::config::{PreparedRequest, RequestConfig};
use super::retry::RetryPolicy;
use super::sink::ResponseSink;
use crate::error::Result;
use crate::models::{HttpResponse, ProxyEndpoint, ProxyProtocol, RunSettings, RunStatistics, StatKind};
use crate::proxy::ProxySource;
use crate::template::{ValueReplacer, Verbatim};

/// Per-call execution flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecuteOptions {
    /// Ask the pool for a different proxy than the current one
    pub is_retry: bool,
    /// Accept an empty body as a final response
    pub can_be_null: bool,
    /// Retry after transport failures instead of returning
    pub auto_retry: bool,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            is_retry: false,
            can_be_null: false,
            auto_retry: true,
        }
    }
}

impl ExecuteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_retry(mut self, is_retry: bool) -> Self {
        self.is_retry = is_retry;
        self
    }

    pub fn can_be_null(mut self, can_be_null: bool) -> Self {
        self.can_be_null = can_be_null;
        self
    }

    pub fn auto_retry(mut self, auto_retry: bool) -> Self {
        self.auto_retry = auto_retry;
        self
    }
}

/// How an execution ended. The response itself is only in the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecuteOutcome {
    /// A response was accepted
    Completed { attempts: u32, status: u16 },
    /// A transport failure with auto-retry disabled
    Swallowed { attempts: u32, error: String },
    /// The retry policy stopped the loop
    Exhausted { attempts: u32 },
    /// The request could not be prepared; nothing was sent
    Rejected { reason: String },
}

impl ExecuteOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, ExecuteOutcome::Completed { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            ExecuteOutcome::Completed { attempts, .. }
            | ExecuteOutcome::Swallowed { attempts, .. }
            | ExecuteOutcome::Exhausted { attempts } => *attempts,
            ExecuteOutcome::Rejected { .. } => 0,
        }
    }
}

/// Stateless executor shared by every task of a run
pub struct Engine {
    proxies: Arc<dyn ProxySource>,
    settings: Arc<RunSettings>,
    stats: Arc<RunStatistics>,
    transport: Arc<dyn HttpTransport>,
    template: Arc<dyn ValueReplacer>,
    retry: RetryPolicy,
}

impl Engine {
    pub fn new(
        proxies: Arc<dyn ProxySource>,
        settings: Arc<RunSettings>,
        stats: Arc<RunStatistics>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            proxies,
            settings,
            stats,
            transport,
            template: Arc::new(Verbatim),
            retry: RetryPolicy::unbounded(),
        }
    }

    pub fn with_template(mut self, template: Arc<dyn ValueReplacer>) -> Self {
        self.template = template;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn template(&self) -> &Arc<dyn ValueReplacer> {
        &self.template
    }

    pub fn stats(&self) -> &Arc<RunStatistics> {
        &self.stats
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Prepare `config` and run it until the retry loop settles
    pub async fn execute(
        &self,
        config: &RequestConfig,
        options: ExecuteOptions,
        sink: &mut ResponseSink,
    ) -> ExecuteOutcome {
        match config.prepare() {
            Ok(request) => self.execute_prepared(&request, options, sink).await,
            Err(e) => {
                warn!(url = config.url(), error = %e, "Request rejected");
                ExecuteOutcome::Rejected {
                    reason: e.to_string(),
                }
            }
        }
    }

    #[instrument(
        skip_all,
        fields(method = %request.method, url = %request.target.as_str())
    )]
    pub async fn execute_prepared(
        &self,
        request: &PreparedRequest,
        options: ExecuteOptions,
        sink: &mut ResponseSink,
    ) -> ExecuteOutcome {
        let started = Instant::now();
        let mut options = options;
        let mut attempts = 0u32;

        loop {
            attempts = next_attempt(attempts);

            match self.attempt(request, options.is_retry).await {
                Ok(response) => {
                    let status = response.status.as_u16();
                    let empty = response.is_empty();
                    sink.set(response);

                    if options.can_be_null || !empty {
                        debug!(attempts, status, "Request completed");
                        return ExecuteOutcome::Completed { attempts, status };
                    }

                    self.stats.increment(StatKind::Retry);
                    debug!(attempt = attempts, status, "Empty response, retrying on a new proxy");
                    options = ExecuteOptions::default().is_retry(true);
                }
                Err(e) => {
                    if !options.auto_retry {
                        debug!(attempt = attempts, error = %e, "Transport failure, auto-retry disabled");
                        return ExecuteOutcome::Swallowed {
                            attempts,
                            error: e.to_string(),
                        };
                    }

                    self.stats.increment(StatKind::Retry);
                    if e.is_transport_failure() {
                        debug!(attempt = attempts, error = %e, "Transport failure, retrying");
                    } else {
                        warn!(attempt = attempts, error = %e, "Attempt failed, retrying");
                    }
                    options = ExecuteOptions::default();
                }
            }

            if !self.retry.allows_another(attempts, started) {
                warn!(
                    attempts,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Retry limit reached"
                );
                return ExecuteOutcome::Exhausted { attempts };
            }

            // No backoff between attempts, but let other tasks run
            tokio::task::yield_now().await;
        }
    }

    /// One transport attempt, proxy attachment included
    async fn attempt(&self, request: &PreparedRequest, is_retry: bool) -> Result<HttpResponse> {
        let proxy = self.attach_proxy(is_retry).await?;
        self.transport.send(request, proxy.as_ref()).await
    }

    async fn attach_proxy(&self, is_retry: bool) -> Result<Option<ProxyEndpoint>> {
        if self.proxies.count() == 0 {
            return Ok(None);
        }

        let tag = self.settings.proxy_protocol_tag();
        let raw = self.proxies.get_proxy(is_retry).await?;

        let Some(protocol) = tag.as_deref().and_then(ProxyProtocol::from_tag) else {
            warn!(
                protocol = tag.as_deref().unwrap_or("<unset>"),
                "Unrecognized proxy protocol, sending without proxy"
            );
            return Ok(None);
        };

        let endpoint = ProxyEndpoint::parse(protocol, &raw)?;
        debug!(proxy = %endpoint, is_retry, "Attached proxy");
        Ok(Some(endpoint))
    }
}

/// Attempt counter for an unbounded loop; pins at `u32::MAX` instead of wrapping
fn next_attempt(attempts: u32) -> u32 {
    attempts.saturating_add(1)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::CheckrError;
    use crate::models::PROXY_PROTOCOL_KEY;
    use crate::request::config::{HttpMethod, DEFAULT_CONNECT_TIMEOUT_MS};
    use async_trait::async_trait;
    use bytes::Bytes;
    use http::{HeaderMap, StatusCode};
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// What the stub transport saw on one call
    #[derive(Debug, Clone)]
    pub(crate) struct SentRequest {
        pub method: HttpMethod,
        pub body: Bytes,
        pub proxy: Option<ProxyEndpoint>,
    }

    /// Transport replaying scripted results; `ok` once the script runs out
    #[derive(Default)]
    pub(crate) struct ScriptedTransport {
        script: Mutex<VecDeque<Result<HttpResponse>>>,
        fallback_error: bool,
        pub sent: Mutex<Vec<SentRequest>>,
    }

    impl ScriptedTransport {
        pub fn new(script: Vec<Result<HttpResponse>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                ..Default::default()
            }
        }

        pub fn always_failing() -> Self {
            Self {
                fallback_error: true,
                ..Default::default()
            }
        }

        pub fn calls(&self) -> usize {
            self.sent.lock().len()
        }
    }

    #[async_trait]
    impl HttpTransport for ScriptedTransport {
        async fn send(
            &self,
            request: &PreparedRequest,
            proxy: Option<&ProxyEndpoint>,
        ) -> Result<HttpResponse> {
            self.sent.lock().push(SentRequest {
                method: request.method,
                body: request.body.clone(),
                proxy: proxy.cloned(),
            });

            let next = self.script.lock().pop_front();
            match next {
                Some(result) => result,
                None if self.fallback_error => {
                    Err(CheckrError::ProxyConnectionFailed("refused".to_string()))
                }
                None => Ok(body(200, "ok")),
            }
        }
    }

    /// Pool handing out fixed addresses and recording `force_new` flags
    pub(crate) struct RecordingPool {
        addresses: Vec<String>,
        pub requests: Mutex<Vec<bool>>,
    }

    impl RecordingPool {
        pub fn new(addresses: &[&str]) -> Self {
            Self {
                addresses: addresses.iter().map(|s| s.to_string()).collect(),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn force_flags(&self) -> Vec<bool> {
            self.requests.lock().clone()
        }
    }

    #[async_trait]
    impl ProxySource for RecordingPool {
        fn count(&self) -> usize {
            self.addresses.len()
        }

        async fn get_proxy(&self, force_new: bool) -> Result<String> {
            let mut requests = self.requests.lock();
            requests.push(force_new);
            let idx = (requests.len() - 1) % self.addresses.len().max(1);
            self.addresses
                .get(idx)
                .cloned()
                .ok_or(CheckrError::NoProxiesAvailable)
        }
    }

    pub(crate) fn body(status: u16, text: &'static str) -> HttpResponse {
        HttpResponse::new(
            StatusCode::from_u16(status).unwrap(),
            HeaderMap::new(),
            Bytes::from_static(text.as_bytes()),
        )
    }

    fn transport_error() -> Result<HttpResponse> {
        Err(CheckrError::ConnectTimeout(DEFAULT_CONNECT_TIMEOUT_MS))
    }

    struct Harness {
        engine: Engine,
        transport: Arc<ScriptedTransport>,
        pool: Arc<RecordingPool>,
        stats: Arc<RunStatistics>,
        settings: Arc<RunSettings>,
    }

    fn harness(transport: ScriptedTransport, pool: RecordingPool) -> Harness {
        let transport = Arc::new(transport);
        let pool = Arc::new(pool);
        let stats = Arc::new(RunStatistics::new());
        let settings = Arc::new(RunSettings::new());
        settings.set_proxy_protocol(ProxyProtocol::Http);

        let engine = Engine::new(
            pool.clone(),
            settings.clone(),
            stats.clone(),
            transport.clone(),
        );

        Harness {
            engine,
            transport,
            pool,
            stats,
            settings,
        }
    }

    fn config(method: Option<&str>) -> RequestConfig {
        let mut config = RequestConfig::new();
        config.reset("http://target.example/check", DEFAULT_CONNECT_TIMEOUT_MS);
        if let Some(method) = method {
            config.set_method(method);
        }
        config
    }

    #[tokio::test]
    async fn test_empty_body_retries_with_forced_new_proxy() {
        let h = harness(
            ScriptedTransport::new(vec![Ok(body(200, "")), Ok(body(200, "welcome"))]),
            RecordingPool::new(&["10.0.0.1:8080", "10.0.0.2:8080"]),
        );
        let mut sink = ResponseSink::new();

        let outcome = h
            .engine
            .execute(&config(Some("GET")), ExecuteOptions::default(), &mut sink)
            .await;

        assert_eq!(
            outcome,
            ExecuteOutcome::Completed {
                attempts: 2,
                status: 200
            }
        );
        assert_eq!(h.transport.calls(), 2);
        assert_eq!(h.pool.force_flags(), vec![false, true]);
        assert_eq!(h.stats.get(StatKind::Retry), 1);
        assert_eq!(sink.data(), Some("welcome"));

        let sent = h.transport.sent.lock();
        assert_eq!(sent[0].proxy.as_ref().unwrap().host, "10.0.0.1");
        assert_eq!(sent[1].proxy.as_ref().unwrap().host, "10.0.0.2");
    }

    #[tokio::test]
    async fn test_empty_body_accepted_when_can_be_null() {
        let h = harness(
            ScriptedTransport::new(vec![Ok(body(204, ""))]),
            RecordingPool::new(&["10.0.0.1:8080"]),
        );
        let mut sink = ResponseSink::new();

        let outcome = h
            .engine
            .execute(
                &config(Some("GET")),
                ExecuteOptions::new().can_be_null(true),
                &mut sink,
            )
            .await;

        assert_eq!(
            outcome,
            ExecuteOutcome::Completed {
                attempts: 1,
                status: 204
            }
        );
        assert_eq!(h.transport.calls(), 1);
        assert_eq!(h.stats.get(StatKind::Retry), 0);
        assert_eq!(sink.data(), Some(""));
        assert_eq!(sink.status(), Some("204"));
    }

    #[tokio::test]
    async fn test_failure_swallowed_without_auto_retry() {
        let h = harness(
            ScriptedTransport::always_failing(),
            RecordingPool::new(&["10.0.0.1:8080"]),
        );
        let mut sink = ResponseSink::new();

        let outcome = h
            .engine
            .execute(
                &config(Some("POST")),
                ExecuteOptions::new().auto_retry(false),
                &mut sink,
            )
            .await;

        assert!(matches!(outcome, ExecuteOutcome::Swallowed { attempts: 1, .. }));
        assert_eq!(h.transport.calls(), 1);
        assert_eq!(h.stats.get(StatKind::Retry), 0);
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_unset_method_falls_back_to_post() {
        let h = harness(ScriptedTransport::new(vec![]), RecordingPool::new(&[]));
        let mut sink = ResponseSink::new();

        let outcome = h
            .engine
            .execute(&config(None), ExecuteOptions::default(), &mut sink)
            .await;

        assert!(outcome.is_completed());
        let sent = h.transport.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].method, HttpMethod::Post);
        assert!(sent[0].body.is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_retries_with_defaults() {
        let h = harness(
            ScriptedTransport::new(vec![transport_error(), Ok(body(200, "ok"))]),
            RecordingPool::new(&["10.0.0.1:8080"]),
        );
        let mut sink = ResponseSink::new();

        // Even a caller-requested fresh proxy is not carried into the retry
        let outcome = h
            .engine
            .execute(
                &config(Some("GET")),
                ExecuteOptions::new().is_retry(true),
                &mut sink,
            )
            .await;

        assert_eq!(outcome.attempts(), 2);
        assert_eq!(h.pool.force_flags(), vec![true, false]);
        assert_eq!(h.stats.get(StatKind::Retry), 1);
    }

    #[tokio::test]
    async fn test_retry_resets_can_be_null() {
        let h = harness(
            ScriptedTransport::new(vec![
                transport_error(),
                Ok(body(200, "")),
                Ok(body(200, "done")),
            ]),
            RecordingPool::new(&["10.0.0.1:8080", "10.0.0.2:8080"]),
        );
        let mut sink = ResponseSink::new();

        let outcome = h
            .engine
            .execute(
                &config(Some("GET")),
                ExecuteOptions::new().can_be_null(true),
                &mut sink,
            )
            .await;

        // The retried attempt no longer accepts an empty body
        assert_eq!(
            outcome,
            ExecuteOutcome::Completed {
                attempts: 3,
                status: 200
            }
        );
        assert_eq!(h.pool.force_flags(), vec![false, false, true]);
        assert_eq!(h.stats.get(StatKind::Retry), 2);
        assert_eq!(sink.data(), Some("done"));
    }

    #[tokio::test]
    async fn test_retry_policy_bounds_the_loop() {
        let h = harness(
            ScriptedTransport::always_failing(),
            RecordingPool::new(&["10.0.0.1:8080"]),
        );
        let engine = h.engine.with_retry_policy(RetryPolicy::max_attempts(3));
        let mut sink = ResponseSink::new();

        let outcome = engine
            .execute(&config(Some("GET")), ExecuteOptions::default(), &mut sink)
            .await;

        assert_eq!(outcome, ExecuteOutcome::Exhausted { attempts: 3 });
        assert_eq!(h.transport.calls(), 3);
        assert_eq!(h.stats.get(StatKind::Retry), 3);
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_unbounded_loop_can_be_cancelled() {
        let h = harness(
            ScriptedTransport::always_failing(),
            RecordingPool::new(&["10.0.0.1:8080"]),
        );
        let mut sink = ResponseSink::new();
        let request = config(Some("GET"));

        let result = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            h.engine
                .execute(&request, ExecuteOptions::default(), &mut sink),
        )
        .await;

        assert!(result.is_err());
        assert!(h.transport.calls() > 1);
    }

    #[test]
    fn test_attempt_counter_saturates() {
        assert_eq!(next_attempt(0), 1);
        assert_eq!(next_attempt(u32::MAX - 1), u32::MAX);
        assert_eq!(next_attempt(u32::MAX), u32::MAX);
    }

    #[tokio::test]
    async fn test_empty_pool_sends_without_proxy() {
        let h = harness(ScriptedTransport::new(vec![]), RecordingPool::new(&[]));
        let mut sink = ResponseSink::new();

        h.engine
            .execute(&config(Some("GET")), ExecuteOptions::default(), &mut sink)
            .await;

        assert!(h.pool.force_flags().is_empty());
        assert!(h.transport.sent.lock()[0].proxy.is_none());
    }

    #[tokio::test]
    async fn test_unknown_protocol_skips_proxy() {
        let h = harness(
            ScriptedTransport::new(vec![]),
            RecordingPool::new(&["10.0.0.1:8080"]),
        );
        h.settings.set(PROXY_PROTOCOL_KEY, "QUIC");
        let mut sink = ResponseSink::new();

        let outcome = h
            .engine
            .execute(&config(Some("GET")), ExecuteOptions::default(), &mut sink)
            .await;

        assert!(outcome.is_completed());
        assert_eq!(h.pool.force_flags(), vec![false]);
        assert!(h.transport.sent.lock()[0].proxy.is_none());
    }

    #[tokio::test]
    async fn test_malformed_proxy_counts_as_transport_failure() {
        let h = harness(
            ScriptedTransport::new(vec![]),
            RecordingPool::new(&["not-a-proxy", "10.0.0.2:8080:user:pass"]),
        );
        h.settings.set_proxy_protocol(ProxyProtocol::Socks5);
        let mut sink = ResponseSink::new();

        let outcome = h
            .engine
            .execute(&config(Some("GET")), ExecuteOptions::default(), &mut sink)
            .await;

        assert_eq!(outcome.attempts(), 2);
        assert_eq!(h.transport.calls(), 1);
        assert_eq!(h.stats.get(StatKind::Retry), 1);

        let sent = h.transport.sent.lock();
        let proxy = sent[0].proxy.as_ref().unwrap();
        assert_eq!(proxy.protocol, ProxyProtocol::Socks5);
        assert_eq!(proxy.username.as_deref(), Some("user"));
    }

    #[tokio::test]
    async fn test_invalid_url_is_rejected_without_sending() {
        let h = harness(ScriptedTransport::new(vec![]), RecordingPool::new(&[]));
        let mut sink = ResponseSink::new();
        let mut request = RequestConfig::new();
        request.reset("", DEFAULT_CONNECT_TIMEOUT_MS);

        let outcome = h
            .engine
            .execute(&request, ExecuteOptions::default(), &mut sink)
            .await;

        assert!(matches!(outcome, ExecuteOutcome::Rejected { .. }));
        assert_eq!(outcome.attempts(), 0);
        assert_eq!(h.transport.calls(), 0);
        assert_eq!(h.stats.get(StatKind::Retry), 0);
    }
}
