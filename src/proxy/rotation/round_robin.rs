//! Round-robin proxy selection strategy

use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::ProxySelector;
use crate::error::{CheckrError, Result};

/// Selects addresses in round-robin order
///
/// Uses atomic operations for lock-free index tracking.
pub struct RoundRobinSelector {
    addresses: RwLock<Vec<Arc<str>>>,
    index: AtomicUsize,
}

impl RoundRobinSelector {
    pub fn new() -> Self {
        Self {
            addresses: RwLock::new(Vec::new()),
            index: AtomicUsize::new(0),
        }
    }
}

impl Default for RoundRobinSelector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProxySelector for RoundRobinSelector {
    async fn select(&self, exclude: Option<&str>) -> Result<Arc<str>> {
        let addresses = self.addresses.read();

        if addresses.is_empty() {
            return Err(CheckrError::NoProxiesAvailable);
        }

        let len = addresses.len();
        let start = self.index.fetch_add(1, Ordering::Relaxed) % len;

        // First non-excluded address from our slot on; the excluded one only
        // when nothing else is listed
        let selected = (0..len)
            .map(|offset| &addresses[(start + offset) % len])
            .find(|addr| exclude.map_or(true, |ex| &***addr != ex))
            .unwrap_or(&addresses[start]);

        Ok(selected.clone())
    }

    async fn refresh(&self, addresses: Vec<String>) -> Result<()> {
        let mut guard = self.addresses.write();
        *guard = addresses.into_iter().map(Arc::from).collect();
        // List size may have changed
        self.index.store(0, Ordering::Relaxed);
        Ok(())
    }

    fn available_count(&self) -> usize {
        self.addresses.read().len()
    }

    fn strategy_name(&self) -> &'static str {
        "round_robin"
    }
}
