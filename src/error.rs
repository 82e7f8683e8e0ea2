use thiserror::Error;

/// Unified error type for the checker core
#[derive(Error, Debug)]
pub enum CheckrError {
    // Proxy errors
    #[error("No proxies available")]
    NoProxiesAvailable,

    #[error("Proxy connection failed: {0}")]
    ProxyConnectionFailed(String),

    #[error("Invalid proxy address: {0}")]
    InvalidProxyAddress(String),

    // Transport errors
    #[error("Connection failed: {0}")]
    ConnectFailed(String),

    #[error("TLS handshake failed: {0}")]
    Tls(String),

    #[error("Connect timed out after {0}ms")]
    ConnectTimeout(u64),

    #[error("Request timeout")]
    RequestTimeout,

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Request errors
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for checker operations
pub type Result<T> = std::result::Result<T, CheckrError>;

impl CheckrError {
    /// Whether this error belongs to a single transport attempt.
    ///
    /// These are the failures the engine recovers from by retrying through
    /// another attempt; everything else is a configuration problem.
    pub fn is_transport_failure(&self) -> bool {
        matches!(
            self,
            CheckrError::NoProxiesAvailable
                | CheckrError::ProxyConnectionFailed(_)
                | CheckrError::InvalidProxyAddress(_)
                | CheckrError::ConnectFailed(_)
                | CheckrError::Tls(_)
                | CheckrError::ConnectTimeout(_)
                | CheckrError::RequestTimeout
                | CheckrError::Http(_)
                | CheckrError::Io(_)
        )
    }
}

// Convert from hyper errors
impl From<hyper::Error> for CheckrError {
    fn from(err: hyper::Error) -> Self {
        CheckrError::Http(err.to_string())
    }
}

// Convert from URL parse errors
impl From<url::ParseError> for CheckrError {
    fn from(err: url::ParseError) -> Self {
        CheckrError::InvalidUrl(err.to_string())
    }
}
