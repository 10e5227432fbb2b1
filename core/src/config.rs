//! Engine tuning knobs.
//!
//! Everything here has a production default matching the product rules;
//! the host platform may override via its own config file (the struct is
//! serde-loadable) or accept `EngineConfig::default()`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Hard cap on opportunities returned by one discovery call.
    pub max_results: usize,

    /// Claim codes stay redeemable this long after acceptance.
    pub claim_ttl_hours: i64,

    /// Cooldown applied when an opportunity does not set its own.
    pub default_cooldown_hours: i64,

    /// Walking-distance ceiling for users without a preference row.
    pub default_max_walk_meters: f64,

    /// How many recent accepted/completed interactions feed the
    /// historical-affinity term.
    pub affinity_lookback: usize,

    /// Claim-code regeneration attempts before giving up on a
    /// uniqueness collision.
    pub code_attempt_budget: u32,

    /// Credential that resolves to the admin actor, if the deployment
    /// exposes admin operations through this engine at all.
    pub admin_credential: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_results: 3,
            claim_ttl_hours: 24,
            default_cooldown_hours: 24,
            default_max_walk_meters: 500.0,
            affinity_lookback: 50,
            code_attempt_budget: 5,
            admin_credential: None,
        }
    }
}
