//! Request configuration staged by a block before execution

use std::time::Duration;

use bytes::Bytes;
use tracing::warn;
use url::Url;

use crate::error::{CheckrError, Result};

/// Connect timeout applied when `build` is given none
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

/// HTTP methods a block may select
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }

    /// Case-insensitive parse; only GET and POST are accepted
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "GET" => Some(HttpMethod::Get),
            "POST" => Some(HttpMethod::Post),
            _ => None,
        }
    }

    pub fn to_http(self) -> http::Method {
        match self {
            HttpMethod::Get => http::Method::GET,
            HttpMethod::Post => http::Method::POST,
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Body content types and the `Content-Type` header each one sets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Plain,
    Json,
    Form,
}

impl ContentType {
    pub fn header_value(&self) -> &'static str {
        match self {
            ContentType::Plain => "text/plain",
            ContentType::Json => "application/json",
            ContentType::Form => "application/x-www-form-urlencoded",
        }
    }
}

/// Result of a configuration call that fails soft
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOutcome {
    Applied,
    /// The call was a no-op; the configuration is unchanged
    Ignored { reason: String },
}

impl ConfigOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, ConfigOutcome::Applied)
    }

    fn ignored(reason: String) -> Self {
        warn!("{}", reason);
        ConfigOutcome::Ignored { reason }
    }
}

/// Mutable request state owned by one task
#[derive(Debug, Clone)]
pub struct RequestConfig {
    url: String,
    method: Option<HttpMethod>,
    body: Bytes,
    headers: Vec<(String, String)>,
    connect_timeout: Duration,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            method: None,
            body: Bytes::new(),
            headers: Vec::new(),
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
        }
    }
}

impl RequestConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a fresh logical request, discarding all staged state
    pub fn reset(&mut self, url: impl Into<String>, connect_timeout_ms: u64) {
        *self = Self {
            url: url.into(),
            connect_timeout: Duration::from_millis(connect_timeout_ms),
            ..Self::default()
        };
    }

    pub fn set_method(&mut self, name: &str) -> ConfigOutcome {
        match HttpMethod::from_str(name) {
            Some(method) => {
                self.method = Some(method);
                ConfigOutcome::Applied
            }
            None => ConfigOutcome::ignored(format!(
                "Method is not available: {}",
                name.trim().to_uppercase()
            )),
        }
    }

    /// Replace the payload and set the matching `Content-Type`, dropping any
    /// differently-cased `Content-Type` staged before
    pub fn set_body(&mut self, body: String, content_type: ContentType) {
        self.body = Bytes::from(body);
        self.headers
            .retain(|(k, _)| k == "Content-Type" || !k.eq_ignore_ascii_case("Content-Type"));
        self.set_header("Content-Type", content_type.header_value());
    }

    /// Upsert a header; the last write for a given key wins.
    ///
    /// Keys are stored exactly as provided.
    pub fn set_header(&mut self, key: &str, value: &str) -> ConfigOutcome {
        if http::HeaderName::from_bytes(key.as_bytes()).is_err() {
            return ConfigOutcome::ignored(format!("Invalid header name: {:?}", key));
        }
        if http::HeaderValue::from_str(value).is_err() {
            return ConfigOutcome::ignored(format!("Invalid value for header {}", key));
        }

        match self.headers.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.headers.push((key.to_string(), value.to_string())),
        }
        ConfigOutcome::Applied
    }

    /// Serialize cookies as `k=v&k=v` into the `Cookie` header, overwriting any
    /// previous value. Iteration order is the order of `cookies`.
    pub fn set_cookies<I, K, V>(&mut self, cookies: I) -> ConfigOutcome
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let header = serialize_cookies(cookies);
        self.set_header("Cookie", &header)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn method(&self) -> Option<HttpMethod> {
        self.method
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Snapshot the configuration into an immutable descriptor.
    ///
    /// An unset method falls back to POST with whatever body is staged.
    pub fn prepare(&self) -> Result<PreparedRequest> {
        let target = Target::parse(&self.url)?;
        Ok(PreparedRequest {
            target,
            method: self.method.unwrap_or(HttpMethod::Post),
            body: self.body.clone(),
            headers: self.headers.clone(),
            connect_timeout: self.connect_timeout,
        })
    }
}

pub(crate) fn serialize_cookies<I, K, V>(cookies: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut header = String::new();
    for (key, value) in cookies {
        header.push_str(key.as_ref());
        header.push('=');
        header.push_str(value.as_ref());
        header.push('&');
    }
    header.trim_matches('&').to_string()
}

/// Parsed request target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    url: Url,
    host: String,
    port: u16,
}

impl Target {
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Err(CheckrError::InvalidUrl("no URL configured".to_string()));
        }

        let url = Url::parse(raw.trim())?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(CheckrError::InvalidUrl(format!(
                "unsupported scheme '{}'",
                url.scheme()
            )));
        }

        let host = url
            .host_str()
            .ok_or_else(|| CheckrError::InvalidUrl(format!("missing host in '{}'", raw)))?;
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host)
            .to_string();
        let port = url
            .port_or_known_default()
            .ok_or_else(|| CheckrError::InvalidUrl(format!("missing port in '{}'", raw)))?;

        Ok(Self { url, host, port })
    }

    pub fn is_https(&self) -> bool {
        self.url.scheme() == "https"
    }

    /// Host name or IP, without IPv6 brackets
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Value for the `Host` header
    pub fn authority(&self) -> String {
        let host = self.url.host_str().unwrap_or(&self.host);
        match self.url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        }
    }

    /// Origin-form request target (`/path?query`)
    pub fn origin_form(&self) -> String {
        match self.url.query() {
            Some(query) => format!("{}?{}", self.url.path(), query),
            None => self.url.path().to_string(),
        }
    }

    /// Absolute-form request target, used when talking to an HTTP proxy
    pub fn absolute_form(&self) -> String {
        let mut url = self.url.clone();
        url.set_fragment(None);
        url.to_string()
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }
}

/// Immutable per-attempt request descriptor
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub target: Target,
    pub method: HttpMethod,
    pub body: Bytes,
    pub headers: Vec<(String, String)>,
    pub connect_timeout: Duration,
}
