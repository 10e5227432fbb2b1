use super::{column_json_err, ts, PerkStore};
use crate::catalog::{Opportunity, OpportunityCategory, TriggerRules, ValueDetails};
use crate::error::EngineResult;
use crate::types::GeoPoint;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

const OPPORTUNITY_COLUMNS: &str = "opportunity_id, partner_id, title, description, category, \
     trigger_rules, value_details, valid_from, valid_until, total_capacity, used_capacity, \
     lat, lon, max_impressions_per_user, cooldown_hours, priority, active, approved, \
     created_at, updated_at";

fn opportunity_from_row(row: &Row<'_>) -> rusqlite::Result<Opportunity> {
    let category_raw: String = row.get(4)?;
    let category = OpportunityCategory::parse(&category_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Text,
            format!("unknown category: {category_raw}").into(),
        )
    })?;

    let rules_raw: String = row.get(5)?;
    let trigger_rules: TriggerRules =
        serde_json::from_str(&rules_raw).map_err(|e| column_json_err(5, e))?;

    let details_raw: String = row.get(6)?;
    let value_details: ValueDetails =
        serde_json::from_str(&details_raw).map_err(|e| column_json_err(6, e))?;

    let lat: Option<f64> = row.get(11)?;
    let lon: Option<f64> = row.get(12)?;

    Ok(Opportunity {
        opportunity_id: row.get(0)?,
        partner_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        category,
        trigger_rules,
        value_details,
        valid_from: ts(row.get(7)?),
        valid_until: ts(row.get(8)?),
        total_capacity: row.get(9)?,
        used_capacity: row.get(10)?,
        location: match (lat, lon) {
            (Some(lat), Some(lon)) => Some(GeoPoint::new(lat, lon)),
            _ => None,
        },
        max_impressions_per_user: row.get(13)?,
        cooldown_hours: row.get(14)?,
        priority: row.get(15)?,
        active: row.get::<_, i64>(16)? != 0,
        approved: row.get::<_, i64>(17)? != 0,
        created_at: ts(row.get(18)?),
        updated_at: ts(row.get(19)?),
    })
}

impl PerkStore {
    pub fn insert_opportunity(&self, o: &Opportunity) -> EngineResult<()> {
        self.conn.execute(
            "INSERT INTO opportunity (
                opportunity_id, partner_id, title, description, category,
                trigger_rules, value_details, valid_from, valid_until,
                total_capacity, used_capacity, lat, lon,
                max_impressions_per_user, cooldown_hours, priority,
                active, approved, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                       ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)",
            params![
                o.opportunity_id,
                o.partner_id,
                o.title,
                o.description,
                o.category.as_str(),
                serde_json::to_string(&o.trigger_rules)?,
                serde_json::to_string(&o.value_details)?,
                o.valid_from.timestamp(),
                o.valid_until.timestamp(),
                o.total_capacity,
                o.used_capacity,
                o.location.map(|l| l.lat),
                o.location.map(|l| l.lon),
                o.max_impressions_per_user,
                o.cooldown_hours,
                o.priority,
                o.active as i64,
                o.approved as i64,
                o.created_at.timestamp(),
                o.updated_at.timestamp(),
            ],
        )?;
        Ok(())
    }

    pub fn opportunity(&self, opportunity_id: &str) -> EngineResult<Option<Opportunity>> {
        let sql =
            format!("SELECT {OPPORTUNITY_COLUMNS} FROM opportunity WHERE opportunity_id = ?1");
        self.conn
            .query_row(&sql, params![opportunity_id], opportunity_from_row)
            .optional()
            .map_err(Into::into)
    }

    /// Persist the partner-mutable fields of an existing opportunity.
    /// Capacity consumption never goes through here — see `claim_capacity`.
    pub fn update_opportunity(&self, o: &Opportunity) -> EngineResult<()> {
        self.conn.execute(
            "UPDATE opportunity SET
                title = ?1, description = ?2, category = ?3,
                trigger_rules = ?4, value_details = ?5,
                valid_from = ?6, valid_until = ?7, total_capacity = ?8,
                lat = ?9, lon = ?10, max_impressions_per_user = ?11,
                cooldown_hours = ?12, priority = ?13, approved = ?14,
                updated_at = ?15
             WHERE opportunity_id = ?16",
            params![
                o.title,
                o.description,
                o.category.as_str(),
                serde_json::to_string(&o.trigger_rules)?,
                serde_json::to_string(&o.value_details)?,
                o.valid_from.timestamp(),
                o.valid_until.timestamp(),
                o.total_capacity,
                o.location.map(|l| l.lat),
                o.location.map(|l| l.lon),
                o.max_impressions_per_user,
                o.cooldown_hours,
                o.priority,
                o.approved as i64,
                o.updated_at.timestamp(),
                o.opportunity_id,
            ],
        )?;
        Ok(())
    }

    /// Catalog rows that are live right now: active, approved, inside
    /// their validity window, with capacity left.
    pub fn live_opportunities(&self, now: DateTime<Utc>) -> EngineResult<Vec<Opportunity>> {
        let sql = format!(
            "SELECT {OPPORTUNITY_COLUMNS} FROM opportunity
             WHERE active = 1 AND approved = 1
               AND valid_from <= ?1 AND valid_until >= ?1
               AND (total_capacity IS NULL OR used_capacity < total_capacity)
             ORDER BY priority DESC, created_at ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![now.timestamp()], opportunity_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn opportunities_for_partner(&self, partner_id: &str) -> EngineResult<Vec<Opportunity>> {
        let sql = format!(
            "SELECT {OPPORTUNITY_COLUMNS} FROM opportunity
             WHERE partner_id = ?1
             ORDER BY created_at ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![partner_id], opportunity_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn active_opportunity_count(&self, partner_id: &str) -> EngineResult<i64> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM opportunity WHERE partner_id = ?1 AND active = 1",
                params![partner_id],
                |row| row.get(0),
            )
            .map_err(Into::into)
    }

    /// The authoritative availability check at acceptance time: one
    /// conditional UPDATE, so concurrent accepts can never oversell a
    /// finite capacity. Unlimited-capacity rows pass the availability
    /// predicate without consuming anything. Returns false when the row
    /// is missing or no longer available.
    pub fn claim_capacity(&self, opportunity_id: &str, now: DateTime<Utc>) -> EngineResult<bool> {
        let changed = self.conn.execute(
            "UPDATE opportunity SET
                used_capacity = CASE WHEN total_capacity IS NULL
                                     THEN used_capacity
                                     ELSE used_capacity + 1 END,
                updated_at = ?2
             WHERE opportunity_id = ?1
               AND active = 1 AND approved = 1
               AND valid_from <= ?2 AND valid_until >= ?2
               AND (total_capacity IS NULL OR used_capacity < total_capacity)",
            params![opportunity_id, now.timestamp()],
        )?;
        Ok(changed > 0)
    }

    /// Returns false when no such opportunity exists.
    pub fn set_opportunity_approved(
        &self,
        opportunity_id: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<bool> {
        let changed = self.conn.execute(
            "UPDATE opportunity SET approved = 1, updated_at = ?1 WHERE opportunity_id = ?2",
            params![now.timestamp(), opportunity_id],
        )?;
        Ok(changed > 0)
    }

    /// Soft-delete scoped to the owning partner. Returns false when the
    /// partner owns no such opportunity.
    pub fn set_opportunity_active(
        &self,
        opportunity_id: &str,
        partner_id: &str,
        active: bool,
        now: DateTime<Utc>,
    ) -> EngineResult<bool> {
        let changed = self.conn.execute(
            "UPDATE opportunity SET active = ?1, updated_at = ?2
             WHERE opportunity_id = ?3 AND partner_id = ?4",
            params![active as i64, now.timestamp(), opportunity_id, partner_id],
        )?;
        Ok(changed > 0)
    }
}
