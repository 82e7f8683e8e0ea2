use crate::error::{CheckrError, Result};
use crate::models::ProxyProtocol;
use crate::proxy::RotationStrategy;
use crate::request::RetryPolicy;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Proxy pool configuration
    pub proxy: ProxyConfig,
    /// Request execution configuration
    pub request: RequestSettings,
    /// Runner configuration
    pub runner: RunnerConfig,
    /// Logging configuration
    pub log: LogConfig,
}

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Proxy list file, one address per line
    pub file: Option<PathBuf>,
    /// Raw protocol tag (HTTP, SOCKS4, SOCKS4A, SOCKS5)
    pub protocol: Option<String>,
    /// Rotation strategy (round_robin, random)
    pub rotation: RotationStrategy,
}

#[derive(Debug, Clone)]
pub struct RequestSettings {
    /// Connect timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Send and body read timeout in milliseconds
    pub request_timeout_ms: u64,
    /// Maximum attempts per execution, 0 for unbounded
    pub max_attempts: u32,
    /// Maximum seconds spent retrying, 0 for unbounded
    pub max_retry_secs: u64,
}

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Requests in flight at once
    pub workers: usize,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level (debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let protocol = get_env_opt("CHECKR_PROXY_PROTOCOL");
        if let Some(tag) = &protocol {
            if ProxyProtocol::from_tag(tag).is_none() {
                return Err(CheckrError::InvalidConfig(format!(
                    "CHECKR_PROXY_PROTOCOL has unsupported value: {}",
                    tag
                )));
            }
        }

        let workers: usize = parse_env("CHECKR_WORKERS", "4")?;
        if workers == 0 {
            return Err(CheckrError::InvalidConfig(
                "CHECKR_WORKERS must be at least 1".into(),
            ));
        }

        Ok(Config {
            proxy: ProxyConfig {
                file: get_env_opt("CHECKR_PROXY_FILE").map(PathBuf::from),
                protocol,
                rotation: RotationStrategy::from_str(&get_env_or("CHECKR_ROTATION", "round_robin")),
            },
            request: RequestSettings {
                connect_timeout_ms: parse_env("CHECKR_CONNECT_TIMEOUT_MS", "10000")?,
                request_timeout_ms: parse_env("CHECKR_REQUEST_TIMEOUT_MS", "30000")?,
                max_attempts: parse_env("CHECKR_MAX_ATTEMPTS", "0")?,
                max_retry_secs: parse_env("CHECKR_MAX_RETRY_SECS", "0")?,
            },
            runner: RunnerConfig { workers },
            log: LogConfig {
                level: get_env_or("LOG_LEVEL", "info"),
                format: get_env_or("LOG_FORMAT", "pretty"),
            },
        })
    }

    /// Retry bounds for the execution engine
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from_limits(self.request.max_attempts, self.request.max_retry_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request.request_timeout_ms)
    }
}

/// Get environment variable with a default value
fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get a non-blank environment variable
fn get_env_opt(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_env<T: FromStr>(key: &str, default: &str) -> Result<T> {
    get_env_or(key, default)
        .trim()
        .parse()
        .map_err(|_| CheckrError::InvalidConfig(format!("{} must be a valid number", key)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const CONFIG_ENV_KEYS: &[&str] = &[
        "CHECKR_PROXY_FILE",
        "CHECKR_PROXY_PROTOCOL",
        "CHECKR_ROTATION",
        "CHECKR_CONNECT_TIMEOUT_MS",
        "CHECKR_REQUEST_TIMEOUT_MS",
        "CHECKR_MAX_ATTEMPTS",
        "CHECKR_MAX_RETRY_SECS",
        "CHECKR_WORKERS",
        "LOG_LEVEL",
        "LOG_FORMAT",
    ];

    struct EnvGuard {
        saved: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new(keys: &[&str]) -> Self {
            let saved = keys
                .iter()
                .map(|&key| {
                    let old = env::var(key).ok();
                    env::remove_var(key);
                    (key.to_string(), old)
                })
                .collect();

            Self { saved }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.saved.drain(..) {
                match value {
                    Some(v) => env::set_var(key, v),
                    None => env::remove_var(key),
                }
            }
        }
    }

    #[test]
    fn test_config_from_env_defaults() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        let config = Config::from_env().unwrap();

        assert!(config.proxy.file.is_none());
        assert!(config.proxy.protocol.is_none());
        assert_eq!(config.proxy.rotation, RotationStrategy::RoundRobin);

        assert_eq!(config.request.connect_timeout_ms, 10_000);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert!(config.retry_policy().is_unbounded());

        assert_eq!(config.runner.workers, 4);
        assert_eq!(config.log.level, "info");
        assert_eq!(config.log.format, "pretty");
    }

    #[test]
    fn test_config_from_env_overrides() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("CHECKR_PROXY_FILE", "/tmp/proxies.txt");
        env::set_var("CHECKR_PROXY_PROTOCOL", "socks5");
        env::set_var("CHECKR_ROTATION", "random");
        env::set_var("CHECKR_CONNECT_TIMEOUT_MS", "2500");
        env::set_var("CHECKR_MAX_ATTEMPTS", "7");
        env::set_var("CHECKR_MAX_RETRY_SECS", "60");
        env::set_var("CHECKR_WORKERS", "16");
        env::set_var("LOG_FORMAT", "json");

        let config = Config::from_env().unwrap();

        assert_eq!(config.proxy.file, Some(PathBuf::from("/tmp/proxies.txt")));
        assert_eq!(config.proxy.protocol.as_deref(), Some("socks5"));
        assert_eq!(config.proxy.rotation, RotationStrategy::Random);
        assert_eq!(config.request.connect_timeout_ms, 2500);
        assert_eq!(config.retry_policy().attempt_limit(), Some(7));
        assert_eq!(
            config.retry_policy().elapsed_limit(),
            Some(Duration::from_secs(60))
        );
        assert_eq!(config.runner.workers, 16);
        assert_eq!(config.log.format, "json");
    }

    #[test]
    fn test_invalid_numbers_rejected() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("CHECKR_CONNECT_TIMEOUT_MS", "soon");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, CheckrError::InvalidConfig(_)));

        env::remove_var("CHECKR_CONNECT_TIMEOUT_MS");
        env::set_var("CHECKR_WORKERS", "0");
        assert!(matches!(
            Config::from_env(),
            Err(CheckrError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_unsupported_protocol_rejected() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("CHECKR_PROXY_PROTOCOL", "QUIC");
        assert!(matches!(
            Config::from_env(),
            Err(CheckrError::InvalidConfig(_))
        ));

        env::set_var("CHECKR_PROXY_PROTOCOL", "   ");
        assert!(Config::from_env().unwrap().proxy.protocol.is_none());
    }
}
