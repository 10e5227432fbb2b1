//! Partner and opportunity catalog records.
//!
//! Trigger rules and value details stay open key-value maps so partners
//! can carry forward-compatible data, but nothing in the engine reads the
//! raw maps: the `TriggerRules` and `ValueDetails` wrappers are the only
//! accessors, each with an explicit default when a key is absent or
//! malformed.

use crate::error::{EngineError, EngineResult};
use crate::types::{weekday_from_code, GeoPoint, OpportunityId, PartnerId};
use chrono::{DateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Closed category set. Everything else is rejected at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpportunityCategory {
    Experience,
    Convenience,
    Discovery,
    Service,
    Bundle,
}

impl OpportunityCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Experience => "experience",
            Self::Convenience => "convenience",
            Self::Discovery => "discovery",
            Self::Service => "service",
            Self::Bundle => "bundle",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "experience" => Some(Self::Experience),
            "convenience" => Some(Self::Convenience),
            "discovery" => Some(Self::Discovery),
            "service" => Some(Self::Service),
            "bundle" => Some(Self::Bundle),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Partner {
    pub partner_id: PartnerId,
    pub name: String,
    pub contact_email: String,
    pub location: Option<GeoPoint>,
    /// Opaque secret presented on partner-side calls.
    pub credential: String,
    /// Platform share of a completed redemption, 0–1.
    pub commission_rate: f64,
    pub auto_approve: bool,
    pub max_active_opportunities: i64,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Opportunity {
    pub opportunity_id: OpportunityId,
    pub partner_id: PartnerId,
    pub title: String,
    pub description: String,
    pub category: OpportunityCategory,
    pub trigger_rules: TriggerRules,
    pub value_details: ValueDetails,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub total_capacity: Option<i64>,
    pub used_capacity: i64,
    pub location: Option<GeoPoint>,
    pub max_impressions_per_user: i64,
    pub cooldown_hours: i64,
    pub priority: i64,
    pub active: bool,
    pub approved: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Opportunity {
    pub fn remaining_capacity(&self) -> Option<i64> {
        self.total_capacity.map(|t| (t - self.used_capacity).max(0))
    }

    pub fn capacity_available(&self) -> bool {
        match self.total_capacity {
            Some(total) => self.used_capacity < total,
            None => true,
        }
    }

    pub fn within_validity(&self, now: DateTime<Utc>) -> bool {
        self.valid_from <= now && now <= self.valid_until
    }

    /// The authoritative availability predicate re-checked at acceptance.
    pub fn available(&self, now: DateTime<Utc>) -> bool {
        self.active && self.approved && self.within_validity(now) && self.capacity_available()
    }

    /// Human-readable reason the opportunity is not available, for Gone
    /// errors. Only meaningful when `available()` is false.
    pub fn unavailable_reason(&self, now: DateTime<Utc>) -> &'static str {
        if !self.active {
            "opportunity deactivated"
        } else if !self.approved {
            "opportunity not approved"
        } else if now < self.valid_from {
            "opportunity not yet valid"
        } else if now > self.valid_until {
            "opportunity validity window has ended"
        } else {
            "opportunity capacity exhausted"
        }
    }
}

/// Fields a partner supplies when creating an opportunity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpportunityDraft {
    pub title: String,
    pub description: String,
    pub category: OpportunityCategory,
    #[serde(default)]
    pub trigger_rules: TriggerRules,
    #[serde(default)]
    pub value_details: ValueDetails,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub total_capacity: Option<i64>,
    pub location: Option<GeoPoint>,
    pub max_impressions_per_user: Option<i64>,
    pub cooldown_hours: Option<i64>,
    pub priority: Option<i64>,
}

/// Partial update applied to a partner's own opportunity. Absent fields
/// keep their current value; the merged record is re-validated as a whole.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpportunityUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<OpportunityCategory>,
    pub trigger_rules: Option<TriggerRules>,
    pub value_details: Option<ValueDetails>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub total_capacity: Option<Option<i64>>,
    pub location: Option<Option<GeoPoint>>,
    pub max_impressions_per_user: Option<i64>,
    pub cooldown_hours: Option<i64>,
    pub priority: Option<i64>,
}

// ── Trigger rules ──────────────────────────────────────────────────

/// Open key-value trigger conditions. Known keys:
/// `min_minutes_remaining`, `max_minutes_remaining` (numbers),
/// `days_of_week` (array of "mon".."sun"),
/// `start_time`, `end_time` ("HH:MM").
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TriggerRules(Map<String, Value>);

impl TriggerRules {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn min_minutes_remaining(&self) -> Option<i64> {
        self.0.get("min_minutes_remaining").and_then(Value::as_i64)
    }

    pub fn max_minutes_remaining(&self) -> Option<i64> {
        self.0.get("max_minutes_remaining").and_then(Value::as_i64)
    }

    /// Allowed days, or None when the rule is absent (all days allowed).
    /// Unrecognized day codes are ignored rather than failing the rule.
    pub fn days_of_week(&self) -> Option<Vec<Weekday>> {
        let days = self.0.get("days_of_week")?.as_array()?;
        Some(
            days.iter()
                .filter_map(|d| d.as_str().and_then(weekday_from_code))
                .collect(),
        )
    }

    /// Allowed time-of-day window, when both endpoints parse.
    pub fn time_window(&self) -> Option<(NaiveTime, NaiveTime)> {
        let start = self.time_key("start_time")?;
        let end = self.time_key("end_time")?;
        Some((start, end))
    }

    fn time_key(&self, key: &str) -> Option<NaiveTime> {
        self.0
            .get(key)?
            .as_str()
            .and_then(|s| NaiveTime::parse_from_str(s, "%H:%M").ok())
    }

    // Builder-style setters, used by the demo seeder and tests.

    pub fn with_minutes_remaining(mut self, min: Option<i64>, max: Option<i64>) -> Self {
        if let Some(v) = min {
            self.0
                .insert("min_minutes_remaining".into(), Value::from(v));
        }
        if let Some(v) = max {
            self.0
                .insert("max_minutes_remaining".into(), Value::from(v));
        }
        self
    }

    pub fn with_days(mut self, days: &[&str]) -> Self {
        self.0.insert(
            "days_of_week".into(),
            Value::Array(days.iter().map(|d| Value::from(*d)).collect()),
        );
        self
    }

    pub fn with_time_window(mut self, start: &str, end: &str) -> Self {
        self.0.insert("start_time".into(), Value::from(start));
        self.0.insert("end_time".into(), Value::from(end));
        self
    }
}

// ── Value details ──────────────────────────────────────────────────

/// Open key-value description of the concrete benefit. Known keys:
/// `discount_percentage`, `discount_amount` (numbers),
/// `parking_extension_minutes` (number), `perks` (array of strings).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValueDetails(Map<String, Value>);

impl ValueDetails {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn discount_percentage(&self) -> Option<f64> {
        self.0.get("discount_percentage").and_then(Value::as_f64)
    }

    pub fn discount_amount(&self) -> Option<f64> {
        self.0.get("discount_amount").and_then(Value::as_f64)
    }

    pub fn parking_extension_minutes(&self) -> Option<i64> {
        self.0
            .get("parking_extension_minutes")
            .and_then(Value::as_i64)
            .filter(|m| *m > 0)
    }

    pub fn perks(&self) -> Vec<String> {
        self.0
            .get("perks")
            .and_then(Value::as_array)
            .map(|a| {
                a.iter()
                    .filter_map(|p| p.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Minimum-value rule: an opportunity must be worth presenting.
    /// At least a 10% or 5-currency-unit discount, OR 15+ minutes of
    /// parking extension, OR at least one perk.
    pub fn meets_minimum_value(&self) -> bool {
        self.discount_percentage().unwrap_or(0.0) >= 10.0
            || self.discount_amount().unwrap_or(0.0) >= 5.0
            || self.parking_extension_minutes().unwrap_or(0) >= 15
            || !self.perks().is_empty()
    }

    /// One-line benefit summary for redemption instructions.
    pub fn summary(&self) -> String {
        if let Some(pct) = self.discount_percentage() {
            format!("{pct:.0}% off")
        } else if let Some(amount) = self.discount_amount() {
            format!("{amount:.2} off")
        } else if let Some(minutes) = self.parking_extension_minutes() {
            format!("{minutes} minutes of extra parking")
        } else if let Some(perk) = self.perks().first() {
            perk.clone()
        } else {
            "partner benefit".to_string()
        }
    }

    // Builder-style setters, used by the demo seeder and tests.

    pub fn with_discount_percentage(mut self, pct: f64) -> Self {
        self.0
            .insert("discount_percentage".into(), Value::from(pct));
        self
    }

    pub fn with_discount_amount(mut self, amount: f64) -> Self {
        self.0.insert("discount_amount".into(), Value::from(amount));
        self
    }

    pub fn with_parking_extension(mut self, minutes: i64) -> Self {
        self.0
            .insert("parking_extension_minutes".into(), Value::from(minutes));
        self
    }

    pub fn with_perks(mut self, perks: &[&str]) -> Self {
        self.0.insert(
            "perks".into(),
            Value::Array(perks.iter().map(|p| Value::from(*p)).collect()),
        );
        self
    }
}

/// All-or-nothing draft validation. A failure here prevents any persistence.
pub fn validate_draft(
    title: &str,
    valid_from: DateTime<Utc>,
    valid_until: DateTime<Utc>,
    value_details: &ValueDetails,
) -> EngineResult<()> {
    if title.trim().is_empty() {
        return Err(EngineError::validation("title must not be empty"));
    }
    if valid_from >= valid_until {
        return Err(EngineError::validation(
            "valid_from must precede valid_until",
        ));
    }
    if !value_details.meets_minimum_value() {
        return Err(EngineError::validation(
            "value details below minimum: need a 10% or 5-unit discount, \
             15 minutes of parking extension, or at least one perk",
        ));
    }
    Ok(())
}
