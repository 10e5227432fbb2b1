use super::{column_json_err, ts, PerkStore};
use crate::analytics::PartnerAnalytics;
use crate::catalog::{OpportunityCategory, ValueDetails};
use crate::error::EngineResult;
use crate::ledger::{Interaction, InteractionKind, CLAIM_CODE_KEY};
use crate::types::{InteractionId, PartnerId};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde_json::{Map, Value};

const INTERACTION_COLUMNS: &str = "interaction_id, user_id, opportunity_id, session_id, kind, \
     occurred_at, context_json, claimed_value_json, partner_revenue, platform_commission";

fn interaction_from_row(row: &Row<'_>) -> rusqlite::Result<Interaction> {
    let kind_raw: String = row.get(4)?;
    let kind = InteractionKind::parse(&kind_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Text,
            format!("unknown interaction kind: {kind_raw}").into(),
        )
    })?;

    let context_raw: String = row.get(6)?;
    let context: Map<String, Value> =
        serde_json::from_str(&context_raw).map_err(|e| column_json_err(6, e))?;

    let claimed_raw: Option<String> = row.get(7)?;
    let claimed_value: Option<ValueDetails> = match claimed_raw {
        Some(raw) => Some(serde_json::from_str(&raw).map_err(|e| column_json_err(7, e))?),
        None => None,
    };

    Ok(Interaction {
        interaction_id: row.get(0)?,
        user_id: row.get(1)?,
        opportunity_id: row.get(2)?,
        session_id: row.get(3)?,
        kind,
        occurred_at: ts(row.get(5)?),
        context,
        claimed_value,
        partner_revenue: row.get(8)?,
        platform_commission: row.get(9)?,
    })
}

impl PerkStore {
    pub fn insert_interaction(&self, i: &Interaction) -> EngineResult<()> {
        self.conn.execute(
            "INSERT INTO interaction (
                interaction_id, user_id, opportunity_id, session_id, kind,
                occurred_at, context_json, claimed_value_json,
                partner_revenue, platform_commission
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                i.interaction_id,
                i.user_id,
                i.opportunity_id,
                i.session_id,
                i.kind.as_str(),
                i.occurred_at.timestamp(),
                serde_json::to_string(&i.context)?,
                i.claimed_value
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
                i.partner_revenue,
                i.platform_commission,
            ],
        )?;
        Ok(())
    }

    /// One batch of impression rows, written after scoring.
    pub fn record_impressions(&self, rows: &[Interaction]) -> EngineResult<()> {
        for row in rows {
            self.insert_interaction(row)?;
        }
        Ok(())
    }

    pub fn interaction(&self, interaction_id: &str) -> EngineResult<Option<Interaction>> {
        let sql =
            format!("SELECT {INTERACTION_COLUMNS} FROM interaction WHERE interaction_id = ?1");
        self.conn
            .query_row(&sql, params![interaction_id], interaction_from_row)
            .optional()
            .map_err(Into::into)
    }

    /// Upgrade the latest impressed/viewed row for this (user, opportunity,
    /// session) tuple to `accepted`, or insert a fresh row when none
    /// exists. Returns the id of the row that now carries the acceptance.
    pub fn upgrade_or_insert_accepted(&self, i: &Interaction) -> EngineResult<InteractionId> {
        let existing: Option<InteractionId> = self
            .conn
            .query_row(
                "SELECT interaction_id FROM interaction
                 WHERE user_id = ?1 AND opportunity_id = ?2 AND session_id = ?3
                   AND kind IN ('impressed', 'viewed')
                 ORDER BY occurred_at DESC, kind DESC LIMIT 1",
                params![i.user_id, i.opportunity_id, i.session_id],
                |row| row.get(0),
            )
            .optional()?;

        match existing {
            Some(id) => {
                self.conn.execute(
                    "UPDATE interaction SET kind = 'accepted', occurred_at = ?1,
                        context_json = ?2, claimed_value_json = ?3
                     WHERE interaction_id = ?4",
                    params![
                        i.occurred_at.timestamp(),
                        serde_json::to_string(&i.context)?,
                        i.claimed_value
                            .as_ref()
                            .map(serde_json::to_string)
                            .transpose()?,
                        id,
                    ],
                )?;
                Ok(id)
            }
            None => {
                self.insert_interaction(i)?;
                Ok(i.interaction_id.clone())
            }
        }
    }

    /// Write the issued claim code into the row's context snapshot under
    /// the reserved key.
    pub fn set_interaction_claim_code(
        &self,
        interaction_id: &str,
        code: &str,
    ) -> EngineResult<()> {
        let raw: String = self.conn.query_row(
            "SELECT context_json FROM interaction WHERE interaction_id = ?1",
            params![interaction_id],
            |row| row.get(0),
        )?;
        let mut context: Map<String, Value> = serde_json::from_str(&raw)?;
        context.insert(CLAIM_CODE_KEY.into(), Value::from(code));
        self.conn.execute(
            "UPDATE interaction SET context_json = ?1 WHERE interaction_id = ?2",
            params![serde_json::to_string(&context)?, interaction_id],
        )?;
        Ok(())
    }

    /// Upgrade an accepted row to completed, recording revenue splits.
    pub fn mark_interaction_completed(
        &self,
        interaction_id: &str,
        now: DateTime<Utc>,
        partner_revenue: Option<f64>,
        platform_commission: Option<f64>,
    ) -> EngineResult<()> {
        self.conn.execute(
            "UPDATE interaction SET kind = 'completed', occurred_at = ?1,
                partner_revenue = ?2, platform_commission = ?3
             WHERE interaction_id = ?4",
            params![
                now.timestamp(),
                partner_revenue,
                platform_commission,
                interaction_id,
            ],
        )?;
        Ok(())
    }

    /// Did this user dismiss or accept the opportunity since `since`?
    /// Source of the discovery cooldown.
    pub fn has_blocking_interaction(
        &self,
        user_id: &str,
        opportunity_id: &str,
        since: DateTime<Utc>,
    ) -> EngineResult<bool> {
        self.conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM interaction
                 WHERE user_id = ?1 AND opportunity_id = ?2
                   AND kind IN ('dismissed', 'accepted', 'completed')
                   AND occurred_at > ?3",
                params![user_id, opportunity_id, since.timestamp()],
                |row| row.get::<_, i64>(0).map(|c| c > 0),
            )
            .map_err(Into::into)
    }

    pub fn impression_count(&self, user_id: &str, opportunity_id: &str) -> EngineResult<i64> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM interaction
                 WHERE user_id = ?1 AND opportunity_id = ?2 AND kind = 'impressed'",
                params![user_id, opportunity_id],
                |row| row.get(0),
            )
            .map_err(Into::into)
    }

    /// Category/partner pairs from the user's most recent accepted and
    /// completed interactions, newest first, feeding the affinity term.
    pub fn affinity_sample(
        &self,
        user_id: &str,
        limit: usize,
    ) -> EngineResult<Vec<(OpportunityCategory, PartnerId)>> {
        let mut stmt = self.conn.prepare(
            "SELECT o.category, o.partner_id
             FROM interaction i
             JOIN opportunity o ON o.opportunity_id = i.opportunity_id
             WHERE i.user_id = ?1 AND i.kind IN ('accepted', 'completed')
             ORDER BY i.occurred_at DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![user_id, limit as i64], |row| {
            let category: String = row.get(0)?;
            let partner_id: String = row.get(1)?;
            Ok((category, partner_id))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (category_raw, partner_id) = row?;
            if let Some(category) = OpportunityCategory::parse(&category_raw) {
                out.push((category, partner_id));
            }
        }
        Ok(out)
    }

    /// Paginated interaction history for one user, newest first.
    pub fn history(
        &self,
        user_id: &str,
        kind: Option<InteractionKind>,
        limit: usize,
        offset: usize,
    ) -> EngineResult<Vec<Interaction>> {
        let sql = format!(
            "SELECT {INTERACTION_COLUMNS} FROM interaction
             WHERE user_id = ?1 AND (?2 IS NULL OR kind = ?2)
             ORDER BY occurred_at DESC, interaction_id ASC
             LIMIT ?3 OFFSET ?4"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![
                user_id,
                kind.map(|k| k.as_str()),
                limit as i64,
                offset as i64
            ],
            interaction_from_row,
        )?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Engagement counts and value totals for one partner's catalog over
    /// a date range. An accepted row later upgraded to completed counts
    /// as both a claim and a redemption.
    pub fn compute_partner_analytics(
        &self,
        partner_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> EngineResult<PartnerAnalytics> {
        let (unique_users, impressions, views, claims, redemptions, gross, fee, avg_txn): (
            i64,
            i64,
            i64,
            i64,
            i64,
            f64,
            f64,
            f64,
        ) = self.conn.query_row(
            "SELECT
                COUNT(DISTINCT i.user_id),
                COALESCE(SUM(CASE WHEN i.kind = 'impressed' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN i.kind = 'viewed' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN i.kind IN ('accepted', 'completed') THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN i.kind = 'completed' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(i.partner_revenue), 0.0),
                COALESCE(SUM(i.platform_commission), 0.0),
                COALESCE(AVG(CASE WHEN i.partner_revenue IS NOT NULL
                                  THEN i.partner_revenue END), 0.0)
             FROM interaction i
             JOIN opportunity o ON o.opportunity_id = i.opportunity_id
             WHERE o.partner_id = ?1
               AND i.occurred_at >= ?2 AND i.occurred_at <= ?3",
            params![partner_id, from.timestamp(), to.timestamp()],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                ))
            },
        )?;

        let redemption_rate = if claims > 0 {
            redemptions as f64 / claims as f64
        } else {
            0.0
        };

        Ok(PartnerAnalytics {
            unique_users,
            impressions,
            views,
            claims,
            redemptions,
            redemption_rate,
            avg_transaction: avg_txn,
            gross_revenue: gross,
            platform_fee: fee,
            net_revenue: gross - fee,
        })
    }
}
