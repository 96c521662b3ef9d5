//! Session policy: status and expiry thresholds.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Waiting,
    Generating,
    Completed,
    Error,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Waiting => "waiting",
            SessionStatus::Generating => "generating",
            SessionStatus::Completed => "completed",
            SessionStatus::Error => "error",
        }
    }
}

/// Thresholds applied by the background sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepPolicy {
    /// How often the sweep runs
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
    /// A `generating` session silent this long is failed with a timeout
    #[serde(default = "default_stuck_timeout_ms")]
    pub stuck_timeout_ms: u64,
    /// Any session silent this long is removed
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
}

fn default_sweep_interval_ms() -> u64 {
    30 * 1000
}

fn default_stuck_timeout_ms() -> u64 {
    3 * 60 * 1000
}

fn default_idle_timeout_ms() -> u64 {
    30 * 60 * 1000
}

impl Default for SweepPolicy {
    fn default() -> Self {
        Self {
            sweep_interval_ms: default_sweep_interval_ms(),
            stuck_timeout_ms: default_stuck_timeout_ms(),
            idle_timeout_ms: default_idle_timeout_ms(),
        }
    }
}

impl SweepPolicy {
    pub fn validate(&self) -> Result<(), String> {
        if self.sweep_interval_ms == 0 {
            return Err("sweep_interval_ms must be positive".to_string());
        }
        if self.stuck_timeout_ms == 0 || self.idle_timeout_ms == 0 {
            return Err("session timeouts must be positive".to_string());
        }
        if self.stuck_timeout_ms > self.idle_timeout_ms {
            return Err("stuck_timeout_ms must not exceed idle_timeout_ms".to_string());
        }
        Ok(())
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}
