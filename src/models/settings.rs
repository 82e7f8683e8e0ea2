use dashmap::DashMap;

use super::ProxyProtocol;

/// Key under which the run's proxy protocol tag is stored
pub const PROXY_PROTOCOL_KEY: &str = "ProxyProtocol";

/// Run-wide string settings shared by every worker
#[derive(Debug, Default)]
pub struct RunSettings {
    values: DashMap<String, String>,
}

impl RunSettings {
    pub fn new() -> Self {
        Self {
            values: DashMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).map(|v| v.value().clone())
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn remove(&self, key: &str) -> Option<String> {
        self.values.remove(key).map(|(_, v)| v)
    }

    /// Raw protocol tag, if one was configured
    pub fn proxy_protocol_tag(&self) -> Option<String> {
        self.get(PROXY_PROTOCOL_KEY)
    }

    /// Parsed protocol; `None` when absent or unrecognized
    pub fn proxy_protocol(&self) -> Option<ProxyProtocol> {
        self.proxy_protocol_tag()
            .and_then(|tag| ProxyProtocol::from_tag(&tag))
    }

    pub fn set_proxy_protocol(&self, protocol: ProxyProtocol) {
        self.set(PROXY_PROTOCOL_KEY, protocol.as_str());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_set_remove() {
        let settings = RunSettings::new();
        assert!(settings.get("session_id").is_none());

        settings.set("session_id", "abc");
        settings.set("session_id", "def");
        assert_eq!(settings.get("session_id").as_deref(), Some("def"));

        assert_eq!(settings.remove("session_id").as_deref(), Some("def"));
        assert!(settings.get("session_id").is_none());
    }

    #[test]
    fn test_proxy_protocol_helpers() {
        let settings = RunSettings::new();
        assert!(settings.proxy_protocol().is_none());

        settings.set_proxy_protocol(ProxyProtocol::Socks4a);
        assert_eq!(settings.proxy_protocol_tag().as_deref(), Some("SOCKS4A"));
        assert_eq!(settings.proxy_protocol(), Some(ProxyProtocol::Socks4a));

        settings.set(PROXY_PROTOCOL_KEY, "GOPHER");
        assert!(settings.proxy_protocol().is_none());
    }
}
