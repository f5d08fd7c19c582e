//! Connection monitor configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Largest accepted backoff exponent; 2^20 intervals is already days
pub const MAX_EXP_COUNTER_LIMIT: u32 = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Probe interval while live, and the base of the reconnect backoff
    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    /// Cap on the backoff exponent
    pub max_exp_counter: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_exp_counter: 8,
        }
    }
}
