//! HTTP/1.1 transport over direct or proxied connections

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, CONTENT_LENGTH, HOST, PROXY_AUTHORIZATION};
use http_body_util::{BodyExt, Full};
use hyper::Request;
use hyper_util::rt::TokioIo;
use tracing::{debug, instrument};

use super::config::{HttpMethod, PreparedRequest, Target};
use crate::error::{CheckrError, Result};
use crate::models::{HttpResponse, ProxyEndpoint};
use crate::proxy::{Connection, ProxyTransport, TlsConnector};

/// Default bound on sending a request and reading its body
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Performs one transport attempt
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send `request`, through `proxy` when given.
    ///
    /// Any status code is a response; only connection, protocol and timeout
    /// problems are errors.
    async fn send(
        &self,
        request: &PreparedRequest,
        proxy: Option<&ProxyEndpoint>,
    ) -> Result<HttpResponse>;
}

/// hyper-based transport
pub struct HyperTransport {
    tls: TlsConnector,
    request_timeout: Duration,
}

impl HyperTransport {
    pub fn new(request_timeout: Duration) -> Result<Self> {
        Ok(Self {
            tls: TlsConnector::new()?,
            request_timeout,
        })
    }

    /// Open a connection to the target.
    ///
    /// Returns the stream and whether requests must use absolute-form (plain
    /// HTTP through an HTTP proxy).
    async fn open(
        &self,
        target: &Target,
        proxy: Option<&ProxyEndpoint>,
    ) -> Result<(Box<dyn Connection>, bool)> {
        let tcp = match proxy {
            None => ProxyTransport::connect_direct(target.host(), target.port()).await?,
            Some(p) if p.protocol.is_http() && !target.is_https() => {
                let stream = ProxyTransport::connect_proxy(p).await?;
                return Ok((Box::new(stream), true));
            }
            Some(p) => ProxyTransport::connect(p, target.host(), target.port()).await?,
        };

        if target.is_https() {
            let tls = self.tls.connect(target.host(), tcp).await?;
            Ok((Box::new(tls), false))
        } else {
            Ok((Box::new(tcp), false))
        }
    }

    fn build_request(
        request: &PreparedRequest,
        proxy: Option<&ProxyEndpoint>,
        absolute_form: bool,
    ) -> Result<Request<Full<Bytes>>> {
        let target = &request.target;
        let uri = if absolute_form {
            target.absolute_form()
        } else {
            target.origin_form()
        };

        let mut http_request = Request::builder()
            .method(request.method.to_http())
            .uri(uri)
            .body(Full::new(request.body.clone()))
            .map_err(|e| CheckrError::InvalidRequest(format!("Failed to build request: {}", e)))?;

        // Names that differ only in case collapse; the last write wins
        let headers = http_request.headers_mut();
        for (name, value) in &request.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| CheckrError::InvalidRequest(format!("Invalid header name: {}", e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| CheckrError::InvalidRequest(format!("Invalid header value: {}", e)))?;
            headers.insert(name, value);
        }

        if !headers.contains_key(HOST) {
            let host = HeaderValue::from_str(&target.authority())
                .map_err(|e| CheckrError::InvalidRequest(format!("Invalid host: {}", e)))?;
            headers.insert(HOST, host);
        }
        if request.method == HttpMethod::Post && !headers.contains_key(CONTENT_LENGTH) {
            headers.insert(CONTENT_LENGTH, HeaderValue::from(request.body.len()));
        }

        if absolute_form {
            if let Some(auth) = proxy.and_then(ProxyTransport::proxy_authorization) {
                let auth = HeaderValue::from_str(&auth).map_err(|e| {
                    CheckrError::InvalidRequest(format!("Invalid proxy credentials: {}", e))
                })?;
                headers.insert(PROXY_AUTHORIZATION, auth);
            }
        }

        Ok(http_request)
    }
}

#[async_trait]
impl HttpTransport for HyperTransport {
    #[instrument(
        skip(self, request, proxy),
        fields(method = %request.method, url = %request.target.as_str())
    )]
    async fn send(
        &self,
        request: &PreparedRequest,
        proxy: Option<&ProxyEndpoint>,
    ) -> Result<HttpResponse> {
        let connect_timeout = request.connect_timeout;
        let (stream, absolute_form) =
            tokio::time::timeout(connect_timeout, self.open(&request.target, proxy))
                .await
                .map_err(|_| CheckrError::ConnectTimeout(connect_timeout.as_millis() as u64))??;

        let http_request = Self::build_request(request, proxy, absolute_form)?;

        let io = TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| CheckrError::Http(format!("Handshake failed: {}", e)))?;

        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!("Connection ended: {}", e);
            }
        });

        let exchange = async {
            let response = sender.send_request(http_request).await?;
            let (parts, body) = response.into_parts();
            let body = body
                .collect()
                .await
                .map_err(|e| CheckrError::Http(format!("Failed to read response: {}", e)))?
                .to_bytes();
            Ok::<_, CheckrError>(HttpResponse::new(parts.status, parts.headers, body))
        };

        let response = tokio::time::timeout(self.request_timeout, exchange)
            .await
            .map_err(|_| CheckrError::RequestTimeout)??;

        debug!(
            status = response.status.as_u16(),
            bytes = response.body.len(),
            "Response received"
        );
        Ok(response)
    }
}
