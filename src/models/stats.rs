use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome categories tracked for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatKind {
    Hit,
    Free,
    Custom,
    Expired,
    Fail,
    Banned,
    Retry,
}

impl StatKind {
    pub const ALL: [StatKind; 7] = [
        StatKind::Hit,
        StatKind::Free,
        StatKind::Custom,
        StatKind::Expired,
        StatKind::Fail,
        StatKind::Banned,
        StatKind::Retry,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StatKind::Hit => "hit",
            StatKind::Free => "free",
            StatKind::Custom => "custom",
            StatKind::Expired => "expired",
            StatKind::Fail => "fail",
            StatKind::Banned => "banned",
            StatKind::Retry => "retry",
        }
    }

    /// Terminal kinds count as a checked entry; retries do not.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StatKind::Retry)
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

impl std::fmt::Display for StatKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Process-wide outcome counters, shared by every worker
#[derive(Debug)]
pub struct RunStatistics {
    counters: [AtomicU64; 7],
    started_at: DateTime<Utc>,
}

impl RunStatistics {
    pub fn new() -> Self {
        Self {
            counters: Default::default(),
            started_at: Utc::now(),
        }
    }

    pub fn increment(&self, kind: StatKind) {
        self.counters[kind.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self, kind: StatKind) -> u64 {
        self.counters[kind.index()].load(Ordering::Relaxed)
    }

    /// Number of entries that reached a terminal outcome
    pub fn checked(&self) -> u64 {
        StatKind::ALL
            .iter()
            .filter(|kind| kind.is_terminal())
            .map(|kind| self.get(*kind))
            .sum()
    }

    /// Checked entries per minute since the run started
    pub fn cpm(&self) -> u64 {
        self.cpm_at(Utc::now())
    }

    fn cpm_at(&self, now: DateTime<Utc>) -> u64 {
        let elapsed_ms = (now - self.started_at).num_milliseconds().max(1) as u64;
        self.checked().saturating_mul(60_000) / elapsed_ms
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            hits: self.get(StatKind::Hit),
            free: self.get(StatKind::Free),
            custom: self.get(StatKind::Custom),
            expired: self.get(StatKind::Expired),
            fail: self.get(StatKind::Fail),
            banned: self.get(StatKind::Banned),
            retry: self.get(StatKind::Retry),
            checked: self.checked(),
            cpm: self.cpm(),
            started_at: self.started_at,
        }
    }
}

impl Default for RunStatistics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the run counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub hits: u64,
    pub free: u64,
    pub custom: u64,
    pub expired: u64,
    pub fail: u64,
    pub banned: u64,
    pub retry: u64,
    pub checked: u64,
    pub cpm: u64,
    pub started_at: DateTime<Utc>,
}
