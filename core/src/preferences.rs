//! Per-user preference records.
//!
//! A row is created lazily with defaults the first time an authenticated
//! user touches the engine. Anonymous callers get the same defaults as an
//! in-memory value that is never persisted.

use crate::catalog::OpportunityCategory;
use crate::config::EngineConfig;
use crate::types::{PartnerId, UserId};
use chrono::{NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use serde_json::Map;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrequencyTier {
    All,
    Occasional,
    Minimal,
}

impl FrequencyTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Occasional => "occasional",
            Self::Minimal => "minimal",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "all" => Some(Self::All),
            "occasional" => Some(Self::Occasional),
            "minimal" => Some(Self::Minimal),
            _ => None,
        }
    }

    /// How many opportunities this tier tolerates per session.
    pub fn session_cap(&self) -> usize {
        match self {
            Self::All => 3,
            Self::Occasional => 2,
            Self::Minimal => 1,
        }
    }
}

/// A daily do-not-disturb window. `end < start` wraps past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuietWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl QuietWindow {
    pub fn contains(&self, t: NaiveTime) -> bool {
        if self.start <= self.end {
            self.start <= t && t <= self.end
        } else {
            t >= self.start || t <= self.end
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preferences {
    pub user_id: UserId,
    /// Master switch; false short-circuits discovery entirely.
    pub enabled: bool,
    pub frequency: FrequencyTier,
    pub max_per_session: usize,
    pub quiet_hours: Vec<QuietWindow>,
    #[serde(with = "weekday_list")]
    pub excluded_days: Vec<Weekday>,
    pub preferred_categories: Vec<OpportunityCategory>,
    pub blocked_categories: Vec<OpportunityCategory>,
    pub blocked_partners: Vec<PartnerId>,
    pub max_walk_meters: f64,
    /// Opaque learned-affinity data; written by the host's modeling jobs,
    /// carried through untouched.
    pub affinity: Map<String, serde_json::Value>,
}

impl Preferences {
    pub fn defaults_for(user_id: impl Into<UserId>, config: &EngineConfig) -> Self {
        Self {
            user_id: user_id.into(),
            enabled: true,
            frequency: FrequencyTier::All,
            max_per_session: config.max_results,
            quiet_hours: Vec::new(),
            excluded_days: Vec::new(),
            preferred_categories: Vec::new(),
            blocked_categories: Vec::new(),
            blocked_partners: Vec::new(),
            max_walk_meters: config.default_max_walk_meters,
            affinity: Map::new(),
        }
    }

    /// In-memory defaults for anonymous callers; never persisted.
    pub fn anonymous(config: &EngineConfig) -> Self {
        Self::defaults_for(String::new(), config)
    }

    pub fn is_quiet_at(&self, t: NaiveTime) -> bool {
        self.quiet_hours.iter().any(|w| w.contains(t))
    }

    pub fn allows_day(&self, day: Weekday) -> bool {
        !self.excluded_days.contains(&day)
    }

    pub fn blocks_partner(&self, partner_id: &str) -> bool {
        self.blocked_partners.iter().any(|p| p == partner_id)
    }

    pub fn blocks_category(&self, category: OpportunityCategory) -> bool {
        self.blocked_categories.contains(&category)
    }

    /// Result-count ceiling for one discovery call.
    pub fn session_result_cap(&self, engine_max: usize) -> usize {
        engine_max
            .min(self.frequency.session_cap())
            .min(self.max_per_session)
    }
}

/// Serialize weekday lists as ["mon", ...] codes so preference JSON stays
/// aligned with trigger-rule day codes.
mod weekday_list {
    use crate::types::{weekday_code, weekday_from_code};
    use chrono::Weekday;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(days: &[Weekday], ser: S) -> Result<S::Ok, S::Error> {
        days.iter()
            .map(|d| weekday_code(*d))
            .collect::<Vec<_>>()
            .serialize(ser)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<Weekday>, D::Error> {
        let codes = Vec::<String>::deserialize(de)?;
        Ok(codes
            .iter()
            .filter_map(|c| weekday_from_code(c))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefs() -> Preferences {
        Preferences::defaults_for("u-1", &EngineConfig::default())
    }

    #[test]
    fn quiet_window_wraps_midnight() {
        let w = QuietWindow {
            start: NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(7, 0, 0).unwrap(),
        };
        assert!(w.contains(NaiveTime::from_hms_opt(23, 30, 0).unwrap()));
        assert!(w.contains(NaiveTime::from_hms_opt(3, 0, 0).unwrap()));
        assert!(!w.contains(NaiveTime::from_hms_opt(12, 0, 0).unwrap()));
    }

    #[test]
    fn session_cap_takes_strictest_limit() {
        let mut p = prefs();
        assert_eq!(p.session_result_cap(3), 3);

        p.frequency = FrequencyTier::Occasional;
        assert_eq!(p.session_result_cap(3), 2);

        p.max_per_session = 1;
        assert_eq!(p.session_result_cap(3), 1);
    }

    #[test]
    fn weekday_list_round_trips_through_json() {
        let mut p = prefs();
        p.excluded_days = vec![Weekday::Sat, Weekday::Sun];
        let json = serde_json::to_string(&p).unwrap();
        assert!(json.contains("\"sat\""), "codes should be lowercase: {json}");
        let back: Preferences = serde_json::from_str(&json).unwrap();
        assert_eq!(back.excluded_days, p.excluded_days);
    }
}
