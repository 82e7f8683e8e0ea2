//! Bounds on the execute-retry loop

use std::time::{Duration, Instant};

/// Limits applied to the retry loop.
///
/// The default is unbounded: the engine keeps retrying until it gets a usable
/// response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryPolicy {
    max_attempts: Option<u32>,
    max_elapsed: Option<Duration>,
}

impl RetryPolicy {
    pub const fn unbounded() -> Self {
        Self {
            max_attempts: None,
            max_elapsed: None,
        }
    }

    /// Stop after `attempts` transport attempts in total
    pub const fn max_attempts(attempts: u32) -> Self {
        Self {
            max_attempts: Some(attempts),
            max_elapsed: None,
        }
    }

    pub const fn with_max_elapsed(mut self, max_elapsed: Duration) -> Self {
        self.max_elapsed = Some(max_elapsed);
        self
    }

    /// Build from config values where `0` means "no bound"
    pub fn from_limits(max_attempts: u32, max_elapsed_secs: u64) -> Self {
        Self {
            max_attempts: (max_attempts > 0).then_some(max_attempts),
            max_elapsed: (max_elapsed_secs > 0).then(|| Duration::from_secs(max_elapsed_secs)),
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.max_attempts.is_none() && self.max_elapsed.is_none()
    }

    pub fn attempt_limit(&self) -> Option<u32> {
        self.max_attempts
    }

    pub fn elapsed_limit(&self) -> Option<Duration> {
        self.max_elapsed
    }

    /// Whether another attempt may start after `attempts` have run since `started`
    pub fn allows_another(&self, attempts: u32, started: Instant) -> bool {
        if self.max_attempts.is_some_and(|max| attempts >= max) {
            return false;
        }
        if self.max_elapsed.is_some_and(|max| started.elapsed() >= max) {
            return false;
        }
        true
    }
}
