//! The interaction ledger — append-only record of every engine-visible
//! engagement.
//!
//! There is deliberately no state-machine enforcement here: any kind may
//! be appended for any tuple at any time, and business meaning comes from
//! last-write and aggregate queries. (The valet subsystem elsewhere in the
//! platform does strict transition checking; this ledger does not.)

use crate::catalog::{OpportunityCategory, ValueDetails};
use crate::context::UserContext;
use crate::types::{InteractionId, OpportunityId, PartnerId, SessionId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Reserved context-snapshot key carrying the claim code on accepted rows.
pub const CLAIM_CODE_KEY: &str = "claim_code";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    Impressed,
    Viewed,
    Accepted,
    Dismissed,
    Completed,
    Expired,
}

impl InteractionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Impressed => "impressed",
            Self::Viewed => "viewed",
            Self::Accepted => "accepted",
            Self::Dismissed => "dismissed",
            Self::Completed => "completed",
            Self::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "impressed" => Some(Self::Impressed),
            "viewed" => Some(Self::Viewed),
            "accepted" => Some(Self::Accepted),
            "dismissed" => Some(Self::Dismissed),
            "completed" => Some(Self::Completed),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub interaction_id: InteractionId,
    pub user_id: Option<UserId>,
    pub opportunity_id: OpportunityId,
    pub session_id: Option<SessionId>,
    pub kind: InteractionKind,
    pub occurred_at: DateTime<Utc>,
    /// Context snapshot at the moment of the event: minutes of parking
    /// remaining, time of day, distance, claim code on accepted rows.
    pub context: Map<String, Value>,
    /// Full value-details snapshot captured at acceptance.
    pub claimed_value: Option<ValueDetails>,
    pub partner_revenue: Option<f64>,
    pub platform_commission: Option<f64>,
}

impl Interaction {
    pub fn claim_code(&self) -> Option<&str> {
        self.context.get(CLAIM_CODE_KEY).and_then(Value::as_str)
    }
}

/// Snapshot of the user context attached to every ledger row.
pub fn context_snapshot(ctx: &UserContext, distance_m: Option<f64>) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert(
        "minutes_remaining".into(),
        Value::from(ctx.minutes_remaining),
    );
    map.insert(
        "time_of_day".into(),
        Value::from(ctx.now.format("%H:%M").to_string()),
    );
    if let Some(d) = distance_m {
        map.insert("distance_m".into(), Value::from(d.round()));
    }
    map
}

/// Category/partner sample from a user's most recent accepted and
/// completed interactions, feeding the historical-affinity score term.
#[derive(Debug, Clone, Default)]
pub struct AffinityProfile {
    entries: Vec<(OpportunityCategory, PartnerId)>,
}

impl AffinityProfile {
    pub fn new(entries: Vec<(OpportunityCategory, PartnerId)>) -> Self {
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn category_fraction(&self, category: OpportunityCategory) -> f64 {
        if self.entries.is_empty() {
            return 0.0;
        }
        let matching = self.entries.iter().filter(|(c, _)| *c == category).count();
        matching as f64 / self.entries.len() as f64
    }

    pub fn partner_fraction(&self, partner_id: &str) -> f64 {
        if self.entries.is_empty() {
            return 0.0;
        }
        let matching = self.entries.iter().filter(|(_, p)| p == partner_id).count();
        matching as f64 / self.entries.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn affinity_fractions() {
        let profile = AffinityProfile::new(vec![
            (OpportunityCategory::Experience, "p-1".into()),
            (OpportunityCategory::Experience, "p-2".into()),
            (OpportunityCategory::Service, "p-1".into()),
            (OpportunityCategory::Convenience, "p-3".into()),
        ]);
        assert!((profile.category_fraction(OpportunityCategory::Experience) - 0.5).abs() < 1e-9);
        assert!((profile.partner_fraction("p-1") - 0.5).abs() < 1e-9);
        assert!((profile.partner_fraction("p-9") - 0.0).abs() < 1e-9);
    }
}
