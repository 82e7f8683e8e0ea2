//! TLS upgrade for `https` targets

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{self, ClientConfig, RootCertStore};
use tracing::debug;

use crate::error::{CheckrError, Result};

/// Client-side TLS connector using the webpki root store
#[derive(Clone)]
pub struct TlsConnector {
    inner: tokio_rustls::TlsConnector,
}

impl TlsConnector {
    pub fn new() -> Result<Self> {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let mut config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| CheckrError::Tls(format!("Invalid TLS configuration: {}", e)))?
            .with_root_certificates(roots)
            .with_no_client_auth();
        // The client speaks HTTP/1.1 only
        config.alpn_protocols = vec![b"http/1.1".to_vec()];

        Ok(Self {
            inner: tokio_rustls::TlsConnector::from(Arc::new(config)),
        })
    }

    /// Run the TLS handshake for `host` over an established stream
    pub async fn connect<S>(&self, host: &str, stream: S) -> Result<TlsStream<S>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|e| CheckrError::Tls(format!("Invalid server name '{}': {}", host, e)))?;

        let tls = self
            .inner
            .connect(server_name, stream)
            .await
            .map_err(|e| CheckrError::Tls(format!("Handshake with {} failed: {}", host, e)))?;

        debug!("TLS session established with {}", host);
        Ok(tls)
    }
}
