//! Proxy rotation strategies
//!
//! This module provides the strategies used to pick the next proxy address
//! from the pool.

mod random;
mod round_robin;

pub use random::RandomSelector;
pub use round_robin::RoundRobinSelector;

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;

/// Strategy types for proxy rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RotationStrategy {
    #[default]
    RoundRobin,
    Random,
}

impl RotationStrategy {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "random" | "rand" => Self::Random,
            _ => Self::RoundRobin,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RoundRobin => "round_robin",
            Self::Random => "random",
        }
    }
}

/// Trait for proxy selection strategies
#[async_trait]
pub trait ProxySelector: Send + Sync {
    /// Select an address from the available pool
    ///
    /// When `exclude` is set and the pool holds more than one address, the
    /// excluded address is never returned. Returns an error if the pool is
    /// empty.
    async fn select(&self, exclude: Option<&str>) -> Result<Arc<str>>;

    /// Replace the internal address list
    async fn refresh(&self, addresses: Vec<String>) -> Result<()>;

    /// Get the number of available addresses
    fn available_count(&self) -> usize;

    /// Get the strategy name
    fn strategy_name(&self) -> &'static str;
}

/// Create a proxy selector based on the strategy type
pub fn create_selector(strategy: RotationStrategy) -> Box<dyn ProxySelector> {
    match strategy {
        RotationStrategy::RoundRobin => Box::new(RoundRobinSelector::new()),
        RotationStrategy::Random => Box::new(RandomSelector::new()),
    }
}
