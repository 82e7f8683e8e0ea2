//! Random proxy selection strategy

use async_trait::async_trait;
use parking_lot::RwLock;
use rand::seq::SliceRandom;
use std::sync::Arc;

use super::ProxySelector;
use crate::error::{CheckrError, Result};

/// Selects a random address from the available pool
pub struct RandomSelector {
    addresses: RwLock<Vec<Arc<str>>>,
}

impl RandomSelector {
    pub fn new() -> Self {
        Self {
            addresses: RwLock::new(Vec::new()),
        }
    }
}

impl Default for RandomSelector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProxySelector for RandomSelector {
    async fn select(&self, exclude: Option<&str>) -> Result<Arc<str>> {
        let addresses = self.addresses.read();

        if addresses.is_empty() {
            return Err(CheckrError::NoProxiesAvailable);
        }

        let mut rng = rand::thread_rng();
        match exclude {
            Some(ex) if addresses.len() > 1 => {
                let candidates: Vec<&Arc<str>> =
                    addresses.iter().filter(|a| &***a != ex).collect();
                candidates
                    .choose(&mut rng)
                    .map(|a| Arc::clone(a))
                    .or_else(|| addresses.choose(&mut rng).cloned())
                    .ok_or(CheckrError::NoProxiesAvailable)
            }
            _ => addresses
                .choose(&mut rng)
                .cloned()
                .ok_or(CheckrError::NoProxiesAvailable),
        }
    }

    async fn refresh(&self, addresses: Vec<String>) -> Result<()> {
        let mut guard = self.addresses.write();
        *guard = addresses.into_iter().map(Arc::from).collect();
        Ok(())
    }

    fn available_count(&self) -> usize {
        self.addresses.read().len()
    }

    fn strategy_name(&self) -> &'static str {
        "random"
    }
}
