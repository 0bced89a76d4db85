//! Engine configuration: detour budgets and recheck delays.

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Tunable limits for the assessment engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Remediation batches issued per (learner, rule) before escalation.
    #[serde(default = "default_max_regenerations")]
    pub max_regenerations: u32,
    /// Maximum exercises per remediation batch.
    #[serde(default = "default_batch_max")]
    pub batch_max: usize,
    /// Days until the short-delay recheck is due.
    #[serde(default = "default_short_delay_days")]
    pub short_delay_days: i64,
    /// Days until the week-check is due.
    #[serde(default = "default_week_delay_days")]
    pub week_delay_days: i64,
    /// Upper bound on one explanation-collaborator call, in seconds.
    #[serde(default = "default_explain_timeout_secs")]
    pub explain_timeout_secs: u64,
}

fn default_max_regenerations() -> u32 {
    2
}
fn default_batch_max() -> usize {
    4
}
fn default_short_delay_days() -> i64 {
    2
}
fn default_week_delay_days() -> i64 {
    7
}
fn default_explain_timeout_secs() -> u64 {
    12
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_regenerations: default_max_regenerations(),
            batch_max: default_batch_max(),
            short_delay_days: default_short_delay_days(),
            week_delay_days: default_week_delay_days(),
            explain_timeout_secs: default_explain_timeout_secs(),
        }
    }
}

impl EngineConfig {
    pub fn short_delay(&self) -> Duration {
        Duration::days(self.short_delay_days)
    }

    pub fn week_delay(&self) -> Duration {
        Duration::days(self.week_delay_days)
    }

    pub fn explain_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.explain_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_regenerations, 2);
        assert_eq!(config.batch_max, 4);
        assert_eq!(config.short_delay(), Duration::days(2));
        assert_eq!(config.week_delay(), Duration::days(7));
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"max_regenerations": 3}"#).unwrap();
        assert_eq!(config.max_regenerations, 3);
        assert_eq!(config.batch_max, 4);
    }
}
