use serde::{Deserialize, Serialize};

use crate::error::{CheckrError, Result};

/// Proxy protocol configured once per run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProxyProtocol {
    Http,
    Socks4,
    Socks4a,
    Socks5,
}

impl ProxyProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyProtocol::Http => "HTTP",
            ProxyProtocol::Socks4 => "SOCKS4",
            ProxyProtocol::Socks4a => "SOCKS4A",
            ProxyProtocol::Socks5 => "SOCKS5",
        }
    }

    /// Parse a run-settings protocol tag
    pub fn from_tag(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "HTTP" | "HTTPS" => Some(ProxyProtocol::Http),
            "SOCKS4" => Some(ProxyProtocol::Socks4),
            "SOCKS4A" => Some(ProxyProtocol::Socks4a),
            "SOCKS5" => Some(ProxyProtocol::Socks5),
            _ => None,
        }
    }

    pub fn is_socks(&self) -> bool {
        matches!(
            self,
            ProxyProtocol::Socks4 | ProxyProtocol::Socks4a | ProxyProtocol::Socks5
        )
    }

    pub fn is_http(&self) -> bool {
        matches!(self, ProxyProtocol::Http)
    }
}

impl std::fmt::Display for ProxyProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A proxy address resolved for one attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyEndpoint {
    pub protocol: ProxyProtocol,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ProxyEndpoint {
    /// Parse `host:port` or `host:port:user:pass`.
    ///
    /// IPv6 hosts must be bracketed (`[::1]:8080`).
    pub fn parse(protocol: ProxyProtocol, raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(CheckrError::InvalidProxyAddress(
                "empty proxy address".to_string(),
            ));
        }

        let (host, rest) = if let Some(stripped) = raw.strip_prefix('[') {
            let (host, rest) = stripped.split_once(']').ok_or_else(|| {
                CheckrError::InvalidProxyAddress(format!("Unclosed IPv6 bracket in '{}'", raw))
            })?;
            let rest = rest.strip_prefix(':').ok_or_else(|| {
                CheckrError::InvalidProxyAddress(format!("Missing port in '{}'", raw))
            })?;
            (host.to_string(), rest)
        } else {
            let (host, rest) = raw.split_once(':').ok_or_else(|| {
                CheckrError::InvalidProxyAddress(format!("Missing port in '{}'", raw))
            })?;
            (host.to_string(), rest)
        };

        if host.is_empty() {
            return Err(CheckrError::InvalidProxyAddress(format!(
                "Missing host in '{}'",
                raw
            )));
        }

        let mut parts = rest.splitn(3, ':');
        let port = parts
            .next()
            .unwrap_or_default()
            .parse::<u16>()
            .map_err(|_| CheckrError::InvalidProxyAddress(format!("Invalid port in '{}'", raw)))?;

        let (username, password) = match (parts.next(), parts.next()) {
            (None, _) => (None, None),
            (Some(user), Some(pass)) if !user.is_empty() => {
                (Some(user.to_string()), Some(pass.to_string()))
            }
            _ => {
                return Err(CheckrError::InvalidProxyAddress(format!(
                    "Expected host:port:user:pass in '{}'",
                    raw
                )))
            }
        };

        Ok(Self {
            protocol,
            host,
            port,
            username,
            password,
        })
    }

    /// `host:port` suitable for dialing, with IPv6 hosts bracketed
    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub fn has_credentials(&self) -> bool {
        self.username.is_some()
    }
}

impl std::fmt::Display for ProxyEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}://{}",
            self.protocol.as_str().to_lowercase(),
            self.address()
        )
    }
}
