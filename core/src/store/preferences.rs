use super::PerkStore;
use crate::catalog::OpportunityCategory;
use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::preferences::{FrequencyTier, Preferences, QuietWindow};
use crate::types::{weekday_code, weekday_from_code};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde_json::Map;

/// Raw row; JSON columns are parsed outside the rusqlite mapper so parse
/// failures surface as engine serialization errors.
struct PreferencesRow {
    user_id: String,
    enabled: bool,
    frequency: String,
    max_per_session: i64,
    quiet_hours: String,
    excluded_days: String,
    preferred_categories: String,
    blocked_categories: String,
    blocked_partners: String,
    max_walk_meters: f64,
    affinity_json: String,
}

fn parse_row(row: PreferencesRow) -> EngineResult<Preferences> {
    let excluded_codes: Vec<String> = serde_json::from_str(&row.excluded_days)?;
    Ok(Preferences {
        user_id: row.user_id,
        enabled: row.enabled,
        frequency: FrequencyTier::parse(&row.frequency).unwrap_or(FrequencyTier::All),
        max_per_session: row.max_per_session.max(0) as usize,
        quiet_hours: serde_json::from_str::<Vec<QuietWindow>>(&row.quiet_hours)?,
        excluded_days: excluded_codes
            .iter()
            .filter_map(|c| weekday_from_code(c))
            .collect(),
        preferred_categories: serde_json::from_str::<Vec<OpportunityCategory>>(
            &row.preferred_categories,
        )?,
        blocked_categories: serde_json::from_str::<Vec<OpportunityCategory>>(
            &row.blocked_categories,
        )?,
        blocked_partners: serde_json::from_str(&row.blocked_partners)?,
        max_walk_meters: row.max_walk_meters,
        affinity: serde_json::from_str::<Map<String, serde_json::Value>>(&row.affinity_json)?,
    })
}

impl PerkStore {
    pub fn preferences(&self, user_id: &str) -> EngineResult<Option<Preferences>> {
        let raw = self
            .conn
            .query_row(
                "SELECT user_id, enabled, frequency, max_per_session, quiet_hours,
                        excluded_days, preferred_categories, blocked_categories,
                        blocked_partners, max_walk_meters, affinity_json
                 FROM preferences WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok(PreferencesRow {
                        user_id: row.get(0)?,
                        enabled: row.get::<_, i64>(1)? != 0,
                        frequency: row.get(2)?,
                        max_per_session: row.get(3)?,
                        quiet_hours: row.get(4)?,
                        excluded_days: row.get(5)?,
                        preferred_categories: row.get(6)?,
                        blocked_categories: row.get(7)?,
                        blocked_partners: row.get(8)?,
                        max_walk_meters: row.get(9)?,
                        affinity_json: row.get(10)?,
                    })
                },
            )
            .optional()?;
        raw.map(parse_row).transpose()
    }

    /// Replace (or create) a user's preference row.
    pub fn upsert_preferences(&self, p: &Preferences, now: DateTime<Utc>) -> EngineResult<()> {
        let excluded: Vec<&str> = p.excluded_days.iter().map(|d| weekday_code(*d)).collect();
        self.conn.execute(
            "INSERT OR REPLACE INTO preferences (
                user_id, enabled, frequency, max_per_session, quiet_hours,
                excluded_days, preferred_categories, blocked_categories,
                blocked_partners, max_walk_meters, affinity_json, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                p.user_id,
                p.enabled as i64,
                p.frequency.as_str(),
                p.max_per_session as i64,
                serde_json::to_string(&p.quiet_hours)?,
                serde_json::to_string(&excluded)?,
                serde_json::to_string(&p.preferred_categories)?,
                serde_json::to_string(&p.blocked_categories)?,
                serde_json::to_string(&p.blocked_partners)?,
                p.max_walk_meters,
                serde_json::to_string(&p.affinity)?,
                now.timestamp(),
            ],
        )?;
        Ok(())
    }

    /// Read a user's preferences, creating the row with defaults on first
    /// access.
    pub fn get_or_create_preferences(
        &self,
        user_id: &str,
        config: &EngineConfig,
        now: DateTime<Utc>,
    ) -> EngineResult<Preferences> {
        if let Some(existing) = self.preferences(user_id)? {
            return Ok(existing);
        }
        let defaults = Preferences::defaults_for(user_id, config);
        self.upsert_preferences(&defaults, now)?;
        Ok(defaults)
    }
}
