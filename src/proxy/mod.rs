//! Proxy plumbing
//!
//! This module provides:
//! - The shared proxy pool with rotation strategies
//! - Upstream dialing through HTTP CONNECT, SOCKS4, SOCKS4a and SOCKS5
//! - TLS upgrade for https targets

pub mod pool;
pub mod rotation;
pub mod tls;
pub mod transport;

pub use pool::{ProxyPool, ProxySource};
pub use rotation::{create_selector, ProxySelector, RotationStrategy};
pub use tls::TlsConnector;
pub use transport::{Connection, ProxyTransport};
