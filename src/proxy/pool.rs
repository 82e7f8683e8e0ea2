//! Shared proxy pool handed to every worker
//!
//! The pool owns the address list and a single "current" selection. Workers
//! ask for the current address on a first attempt and force a rotation when
//! retrying.

use std::path::Path;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use tracing::{debug, info};

use super::rotation::{create_selector, ProxySelector, RotationStrategy};
use crate::error::{CheckrError, Result};

/// Source of proxy addresses for the execution engine
#[async_trait]
pub trait ProxySource: Send + Sync {
    /// Number of addresses currently in the pool
    fn count(&self) -> usize;

    /// Hand out an address in its raw `host:port[:user:pass]` form.
    ///
    /// `force_new` asks for a different address than the current one.
    async fn get_proxy(&self, force_new: bool) -> Result<String>;
}

/// Proxy pool backed by a rotation strategy
pub struct ProxyPool {
    selector: Box<dyn ProxySelector>,
    current: ArcSwapOption<String>,
}

impl ProxyPool {
    pub fn new(strategy: RotationStrategy) -> Self {
        Self {
            selector: create_selector(strategy),
            current: ArcSwapOption::empty(),
        }
    }

    /// Build a pool already holding `addresses`
    pub async fn with_addresses(strategy: RotationStrategy, addresses: Vec<String>) -> Result<Self> {
        let pool = Self::new(strategy);
        pool.refresh(addresses).await?;
        Ok(pool)
    }

    /// Replace the address list and drop the current selection
    pub async fn refresh(&self, addresses: Vec<String>) -> Result<()> {
        self.selector.refresh(addresses).await?;
        self.current.store(None);
        Ok(())
    }

    /// Load a proxy list file, one address per line.
    ///
    /// Blank lines and lines starting with `#` are skipped. Returns the
    /// number of addresses loaded.
    pub async fn load_file(&self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
            CheckrError::InvalidConfig(format!(
                "Failed to read proxy file {}: {}",
                path.display(),
                e
            ))
        })?;

        let addresses = parse_proxy_list(&contents);
        let count = addresses.len();
        self.refresh(addresses).await?;

        info!(
            path = %path.display(),
            count,
            strategy = self.selector.strategy_name(),
            "Loaded proxy list"
        );
        Ok(count)
    }

    pub fn strategy_name(&self) -> &'static str {
        self.selector.strategy_name()
    }

    /// The address most recently handed out, if any
    pub fn current(&self) -> Option<String> {
        self.current.load_full().map(|a| a.as_ref().clone())
    }
}

#[async_trait]
impl ProxySource for ProxyPool {
    fn count(&self) -> usize {
        self.selector.available_count()
    }

    async fn get_proxy(&self, force_new: bool) -> Result<String> {
        let previous = self.current.load_full();

        if !force_new {
            if let Some(current) = previous {
                return Ok(current.as_ref().clone());
            }
        }

        let exclude = previous.as_ref().map(|p| p.as_str());
        let selected = self.selector.select(exclude).await?.to_string();
        debug!(proxy = %selected, force_new, "Rotated proxy");
        self.current.store(Some(Arc::new(selected.clone())));
        Ok(selected)
    }
}

fn parse_proxy_list(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}
