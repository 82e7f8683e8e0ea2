//! Proxy transport layer for HTTP and SOCKS protocols
//!
//! Handles establishing TCP connections to a target, either directly or
//! through an upstream proxy.

use anyhow::Context;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_socks::tcp::{Socks4Stream, Socks5Stream};
use tracing::{debug, instrument};

use crate::error::{CheckrError, Result};
use crate::models::{ProxyEndpoint, ProxyProtocol};

/// A byte stream the HTTP client can run over
pub trait Connection: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> Connection for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

/// Proxy transport handler
///
/// Opens connections through the proxy protocols a run can be configured with
pub struct ProxyTransport;

impl ProxyTransport {
    /// Open a tunnel to the target through the specified proxy
    #[instrument(skip(proxy), fields(proxy = %proxy, target = %target_host))]
    pub async fn connect(
        proxy: &ProxyEndpoint,
        target_host: &str,
        target_port: u16,
    ) -> Result<TcpStream> {
        match proxy.protocol {
            ProxyProtocol::Http => Self::connect_http(proxy, target_host, target_port).await,
            ProxyProtocol::Socks4 => Self::connect_socks4(proxy, target_host, target_port).await,
            ProxyProtocol::Socks4a => Self::connect_socks4a(proxy, target_host, target_port).await,
            ProxyProtocol::Socks5 => Self::connect_socks5(proxy, target_host, target_port).await,
        }
    }

    /// Connect straight to the target
    #[instrument]
    pub async fn connect_direct(target_host: &str, target_port: u16) -> Result<TcpStream> {
        let addr = format_tcp_addr(target_host, target_port);
        debug!("Connecting directly to {}", addr);

        TcpStream::connect(&addr)
            .await
            .map_err(|e| CheckrError::ConnectFailed(format!("TCP connect to {} failed: {}", addr, e)))
    }

    /// Connect to the proxy itself, for absolute-form HTTP forwarding
    pub async fn connect_proxy(proxy: &ProxyEndpoint) -> Result<TcpStream> {
        let addr = proxy.address();
        debug!("Connecting to {} proxy at {}", proxy.protocol, addr);

        TcpStream::connect(&addr).await.map_err(|e| {
            CheckrError::ProxyConnectionFailed(format!("TCP connect to {} failed: {}", addr, e))
        })
    }

    /// `Proxy-Authorization` value for proxies carrying credentials
    pub fn proxy_authorization(proxy: &ProxyEndpoint) -> Option<String> {
        let username = proxy.username.as_ref()?;
        let password = proxy.password.as_deref().unwrap_or("");
        let credentials = format!("{}:{}", username, password);
        Some(format!("Basic {}", BASE64.encode(credentials.as_bytes())))
    }

    /// Connect through HTTP CONNECT method
    async fn connect_http(
        proxy: &ProxyEndpoint,
        target_host: &str,
        target_port: u16,
    ) -> Result<TcpStream> {
        let mut stream = Self::connect_proxy(proxy).await?;

        let connect_request = Self::build_connect_request(proxy, target_host, target_port);
        connect_handshake(&mut stream, &connect_request)
            .await
            .map_err(|e| CheckrError::ProxyConnectionFailed(format!("{:#}", e)))?;

        debug!("HTTP CONNECT tunnel established");
        Ok(stream)
    }

    /// Build HTTP CONNECT request
    fn build_connect_request(proxy: &ProxyEndpoint, target_host: &str, target_port: u16) -> String {
        let authority = format_tcp_addr(target_host, target_port);
        let mut request = format!("CONNECT {} HTTP/1.1\r\nHost: {}\r\n", authority, authority);

        if let Some(auth) = Self::proxy_authorization(proxy) {
            request.push_str(&format!("Proxy-Authorization: {}\r\n", auth));
        }

        request.push_str("\r\n");
        request
    }

    /// Connect through SOCKS4 proxy
    ///
    /// SOCKS4 carries an IPv4 address only, so the target is resolved locally.
    async fn connect_socks4(
        proxy: &ProxyEndpoint,
        target_host: &str,
        target_port: u16,
    ) -> Result<TcpStream> {
        let target_addr = tokio::net::lookup_host((target_host, target_port))
            .await
            .map_err(|e| {
                CheckrError::ProxyConnectionFailed(format!(
                    "Failed to resolve {} for SOCKS4: {}",
                    target_host, e
                ))
            })?
            .find(|addr| addr.is_ipv4())
            .ok_or_else(|| {
                CheckrError::ProxyConnectionFailed(format!(
                    "SOCKS4 requires an IPv4 target, {} has none. Use SOCKS4A or SOCKS5",
                    target_host
                ))
            })?;

        let proxy_addr = proxy.address();
        let stream = match &proxy.username {
            Some(user_id) => {
                Socks4Stream::connect_with_userid(proxy_addr.as_str(), target_addr, user_id).await
            }
            None => Socks4Stream::connect(proxy_addr.as_str(), target_addr).await,
        }
        .map_err(|e| CheckrError::ProxyConnectionFailed(format!("SOCKS4 connect failed: {}", e)))?;

        debug!("SOCKS4 connection established");
        Ok(stream.into_inner())
    }

    /// Connect through SOCKS4a proxy (proxy resolves the hostname)
    async fn connect_socks4a(
        proxy: &ProxyEndpoint,
        target_host: &str,
        target_port: u16,
    ) -> Result<TcpStream> {
        let proxy_addr = proxy.address();
        let target = (target_host, target_port);
        let stream = match &proxy.username {
            Some(user_id) => {
                Socks4Stream::connect_with_userid(proxy_addr.as_str(), target, user_id).await
            }
            None => Socks4Stream::connect(proxy_addr.as_str(), target).await,
        }
        .map_err(|e| {
            CheckrError::ProxyConnectionFailed(format!("SOCKS4a connect failed: {}", e))
        })?;

        debug!("SOCKS4a connection established");
        Ok(stream.into_inner())
    }

    /// Connect through SOCKS5 proxy
    async fn connect_socks5(
        proxy: &ProxyEndpoint,
        target_host: &str,
        target_port: u16,
    ) -> Result<TcpStream> {
        let proxy_addr = proxy.address();
        let target = (target_host, target_port);
        let stream = match (&proxy.username, &proxy.password) {
            (Some(username), Some(password)) => {
                Socks5Stream::connect_with_password(proxy_addr.as_str(), target, username, password)
                    .await
            }
            _ => Socks5Stream::connect(proxy_addr.as_str(), target).await,
        }
        .map_err(|e| CheckrError::ProxyConnectionFailed(format!("SOCKS5 connect failed: {}", e)))?;

        debug!("SOCKS5 connection established");
        Ok(stream.into_inner())
    }
}

/// Send a CONNECT request and wait for a 200 reply
async fn connect_handshake(stream: &mut TcpStream, request: &str) -> anyhow::Result<()> {
    stream
        .write_all(request.as_bytes())
        .await
        .context("Failed to send CONNECT")?;

    let mut response = vec![0u8; 1024];
    let n = stream
        .read(&mut response)
        .await
        .context("Failed to read CONNECT response")?;
    if n == 0 {
        anyhow::bail!("empty CONNECT response");
    }

    let response_str = String::from_utf8_lossy(&response[..n]);
    if !response_str.starts_with("HTTP/1.1 200") && !response_str.starts_with("HTTP/1.0 200") {
        anyhow::bail!(
            "CONNECT failed: {}",
            response_str.lines().next().unwrap_or("Unknown error")
        );
    }
    Ok(())
}

fn format_tcp_addr(host: &str, port: u16) -> String {
    if host.contains(':') && !(host.starts_with('[') && host.ends_with(']')) {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}
