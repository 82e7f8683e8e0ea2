//! Per-task request handle driven by script blocks

use std::sync::Arc;

use super::config::{ConfigOutcome, ContentType, RequestConfig, DEFAULT_CONNECT_TIMEOUT_MS};
use super::engine::{Engine, ExecuteOptions, ExecuteOutcome};
use super::sink::ResponseSink;

/// One task's request: staged configuration plus the latest response.
///
/// A handle is never shared between tasks; `&mut self` on every mutating
/// call keeps a single request in flight per handle.
pub struct Request {
    engine: Arc<Engine>,
    config: RequestConfig,
    source: ResponseSink,
}

impl Request {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            config: RequestConfig::new(),
            source: ResponseSink::new(),
        }
    }

    /// Start a new logical request with the default connect timeout
    pub fn build(&mut self, url: &str) -> &mut Self {
        self.build_with_timeout(url, DEFAULT_CONNECT_TIMEOUT_MS)
    }

    /// Start a new logical request. Staged headers, body, method and the
    /// previous response are all discarded.
    pub fn build_with_timeout(&mut self, url: &str, connect_timeout_ms: u64) -> &mut Self {
        self.config.reset(url, connect_timeout_ms);
        self.source.reset();
        self
    }

    pub fn method(&mut self, name: &str) -> ConfigOutcome {
        self.config.set_method(name)
    }

    /// Stage a body after variable substitution
    pub fn add_body(&mut self, text: &str, content_type: ContentType) -> &mut Self {
        let body = self.engine.template().replace_values(text);
        self.config.set_body(body, content_type);
        self
    }

    pub fn add_header(&mut self, key: &str, value: &str) -> ConfigOutcome {
        self.config.set_header(key, value)
    }

    pub fn add_cookies<I, K, V>(&mut self, cookies: I) -> ConfigOutcome
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.config.set_cookies(cookies)
    }

    /// Execute with default options: fresh proxy not forced, empty body
    /// retried, transport failures retried
    pub async fn execute(&mut self) -> ExecuteOutcome {
        self.execute_with(ExecuteOptions::default()).await
    }

    pub async fn execute_with(&mut self, options: ExecuteOptions) -> ExecuteOutcome {
        self.engine
            .execute(&self.config, options, &mut self.source)
            .await
    }

    pub fn config(&self) -> &RequestConfig {
        &self.config
    }

    /// Latest response of this task
    pub fn source(&self) -> &ResponseSink {
        &self.source
    }
}
