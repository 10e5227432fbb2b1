//! Relevance scorer — five independently capped terms summing to a score
//! in [0, 100].
//!
//! Term allotments: temporal fit 30, spatial proximity 25, value
//! alignment 20, capacity urgency 15, historical affinity 10. Each term is
//! computed and kept separately so ranked results can explain themselves.

use crate::catalog::{Opportunity, TriggerRules, ValueDetails};
use crate::context::UserContext;
use crate::ledger::AffinityProfile;
use chrono::Datelike;
use serde::Serialize;

const TEMPORAL_MAX: f64 = 30.0;
const SPATIAL_MAX: f64 = 25.0;
const VALUE_MAX: f64 = 20.0;
const URGENCY_MAX: f64 = 15.0;
const AFFINITY_MAX: f64 = 10.0;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ScoreBreakdown {
    pub temporal: f64,
    pub spatial: f64,
    pub value: f64,
    pub urgency: f64,
    pub affinity: f64,
    /// Precise walking distance when both sides have coordinates.
    pub distance_m: Option<f64>,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f64 {
        self.temporal + self.spatial + self.value + self.urgency + self.affinity
    }
}

/// Score one candidate. `affinity` is None for anonymous callers; an empty
/// profile (new user) is treated the same, neutral, way.
pub(crate) fn score(
    ctx: &UserContext,
    opp: &Opportunity,
    affinity: Option<&AffinityProfile>,
) -> ScoreBreakdown {
    let (spatial, distance_m) = spatial_proximity(ctx, opp);
    ScoreBreakdown {
        temporal: temporal_fit(ctx, &opp.trigger_rules),
        spatial,
        value: value_alignment(ctx, &opp.value_details),
        urgency: capacity_urgency(opp),
        affinity: historical_affinity(opp, affinity),
        distance_m,
    }
}

/// Start at full credit; each violated trigger rule compounds a
/// multiplicative penalty.
fn temporal_fit(ctx: &UserContext, rules: &TriggerRules) -> f64 {
    let mut credit = TEMPORAL_MAX;

    let below_min = rules
        .min_minutes_remaining()
        .is_some_and(|min| ctx.minutes_remaining < min);
    let above_max = rules
        .max_minutes_remaining()
        .is_some_and(|max| ctx.minutes_remaining > max);
    if below_min || above_max {
        credit *= 0.5;
    }

    if let Some(days) = rules.days_of_week() {
        if !days.contains(&ctx.now.weekday()) {
            credit *= 0.7;
        }
    }

    if let Some((start, end)) = rules.time_window() {
        let tod = ctx.now.time();
        let inside = if start <= end {
            start <= tod && tod <= end
        } else {
            tod >= start || tod <= end
        };
        if !inside {
            credit *= 0.7;
        }
    }

    credit
}

/// Linear decay from full credit at zero distance to nothing at the
/// user's walking-distance ceiling. Half credit when either side has no
/// coordinates — the candidate stays in play rather than being excluded.
fn spatial_proximity(ctx: &UserContext, opp: &Opportunity) -> (f64, Option<f64>) {
    match (ctx.location, opp.location) {
        (Some(user), Some(venue)) => {
            let d = user.distance_m(&venue);
            let max = ctx.preferences.max_walk_meters;
            let score = if max <= 0.0 || d >= max {
                0.0
            } else {
                SPATIAL_MAX * (1.0 - d / max)
            };
            (score, Some(d))
        }
        _ => (SPATIAL_MAX / 2.0, None),
    }
}

/// Additive fractional sub-scores, capped at 1.0 and scaled to the term
/// allotment.
fn value_alignment(ctx: &UserContext, details: &ValueDetails) -> f64 {
    let mut fraction: f64 = 0.0;

    if let Some(pct) = details.discount_percentage() {
        fraction += if pct >= 50.0 {
            0.5
        } else if pct >= 25.0 {
            0.35
        } else if pct >= 10.0 {
            0.2
        } else {
            0.0
        };
    }

    if let Some(amount) = details.discount_amount() {
        fraction += if amount >= 20.0 {
            0.3
        } else if amount >= 10.0 {
            0.2
        } else if amount >= 5.0 {
            0.1
        } else {
            0.0
        };
    }

    if let Some(minutes) = details.parking_extension_minutes() {
        // Worth of the extension at this session's hourly rate.
        let worth = minutes as f64 / 60.0 * ctx.hourly_cost;
        fraction += if worth >= 10.0 {
            0.3
        } else if worth >= 5.0 {
            0.2
        } else {
            0.1
        };
    }

    let perk_count = details.perks().len();
    if perk_count >= 3 {
        fraction += 0.2;
    } else if perk_count >= 1 {
        fraction += 0.1;
    }

    fraction.min(1.0) * VALUE_MAX
}

fn capacity_urgency(opp: &Opportunity) -> f64 {
    match opp.total_capacity {
        Some(total) if total > 0 => {
            let remaining = (total - opp.used_capacity).max(0) as f64;
            let total = total as f64;
            if remaining < total * 0.2 {
                URGENCY_MAX
            } else if remaining < total * 0.5 {
                10.0
            } else {
                0.0
            }
        }
        Some(_) => 0.0,
        None => 5.0,
    }
}

/// Weighted category (0.7) and partner (0.3) match fractions over the
/// user's recent accepted/completed history; neutral 0.5 for anonymous
/// callers and users with no qualifying history.
fn historical_affinity(opp: &Opportunity, affinity: Option<&AffinityProfile>) -> f64 {
    let fraction = match affinity {
        Some(profile) if !profile.is_empty() => {
            0.7 * profile.category_fraction(opp.category)
                + 0.3 * profile.partner_fraction(&opp.partner_id)
        }
        _ => 0.5,
    };
    fraction * AFFINITY_MAX
}
