//! `%name%` variable substitution for request payloads

use std::sync::Arc;

use dashmap::DashMap;

use crate::models::{RunStatistics, StatKind};

/// Substitutes caller variables into text before it is sent
pub trait ValueReplacer: Send + Sync {
    fn replace_values(&self, text: &str) -> String;
}

/// Leaves text untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct Verbatim;

impl ValueReplacer for Verbatim {
    fn replace_values(&self, text: &str) -> String {
        text.to_string()
    }
}

/// Variable table shared by every worker of a run
///
/// Placeholders are `%key%`. Keys that resolve to nothing are left as-is.
#[derive(Debug, Default)]
pub struct Variables {
    values: DashMap<String, String>,
    stats: Option<Arc<RunStatistics>>,
}

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also resolve run counters (`%hits%`, `%retry%`, `%cpm%`, ...)
    pub fn with_stats(stats: Arc<RunStatistics>) -> Self {
        Self {
            values: DashMap::new(),
            stats: Some(stats),
        }
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.values
            .get(key)
            .map(|v| v.value().clone())
            .or_else(|| self.stat_value(key))
    }

    fn stat_value(&self, key: &str) -> Option<String> {
        let stats = self.stats.as_ref()?;
        let value = match key {
            "hits" => stats.get(StatKind::Hit),
            "free" => stats.get(StatKind::Free),
            "custom" => stats.get(StatKind::Custom),
            "expired" => stats.get(StatKind::Expired),
            "fail" => stats.get(StatKind::Fail),
            "banned" => stats.get(StatKind::Banned),
            "retry" => stats.get(StatKind::Retry),
            "checked" => stats.checked(),
            "cpm" => stats.cpm(),
            _ => return None,
        };
        Some(value.to_string())
    }
}

impl ValueReplacer for Variables {
    fn replace_values(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;

        while let Some(start) = rest.find('%') {
            out.push_str(&rest[..start]);
            let after = &rest[start + 1..];

            let resolved = after.find('%').and_then(|end| {
                let key = &after[..end];
                if key.is_empty() || key.chars().any(char::is_whitespace) {
                    return None;
                }
                self.get(key).map(|value| (value, end))
            });

            match resolved {
                Some((value, end)) => {
                    out.push_str(&value);
                    rest = &after[end + 1..];
                }
                None => {
                    out.push('%');
                    rest = after;
                }
            }
        }

        out.push_str(rest);
        out
    }
}
