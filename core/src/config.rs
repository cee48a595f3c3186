//! Engine configuration — loaded once at startup, immutable per run.

use crate::types::{Points, UserId};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// The bootstrap admin. Accounts created for this id are privileged
    /// even before any admin flag exists in the directory.
    pub root_admin: UserId,

    /// Channel handle shown in membership prompts. The actual gate
    /// check is an external capability.
    pub channel: String,

    /// Width of the referral code suffix derived from the user id.
    pub referral_code_width: usize,

    /// Points credited to a referrer per unique successful recruit.
    pub points_per_referral: Points,

    /// Delivery attempts per recipient before counting a failure.
    pub max_send_attempts: u32,

    /// Pause one unit after this many cumulative broadcast successes.
    pub rate_limit_every: u64,

    /// Default inactivity window for the cleanup sweep, in days.
    pub sweep_window_days: i64,

    /// Rows returned by the leaderboard.
    pub leaderboard_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            root_admin: 0,
            channel: "rewards".to_string(),
            referral_code_width: 6,
            points_per_referral: 1,
            max_send_attempts: 3,
            rate_limit_every: 20,
            sweep_window_days: 30,
            leaderboard_limit: 10,
        }
    }
}

impl EngineConfig {
    /// Load config from a JSON file. Missing fields fall back to defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)?;
        let config = serde_json::from_str(&raw)?;
        Ok(config)
    }
}
