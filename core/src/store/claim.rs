use super::{ts, PerkStore};
use crate::claim::Claim;
use crate::error::EngineResult;
use chrono::{DateTime, Utc};
use rusqlite::{params, ErrorCode, OptionalExtension, Row};

fn claim_from_row(row: &Row<'_>) -> rusqlite::Result<Claim> {
    Ok(Claim {
        code: row.get(0)?,
        partner_id: row.get(1)?,
        opportunity_id: row.get(2)?,
        interaction_id: row.get(3)?,
        user_id: row.get(4)?,
        accepted_at: ts(row.get(5)?),
        expires_at: ts(row.get(6)?),
        completed_at: row.get::<_, Option<i64>>(7)?.map(ts),
        transaction_amount: row.get(8)?,
    })
}

impl PerkStore {
    /// Insert a fresh claim. Returns false when the code collides within
    /// the partner's namespace, so the caller can regenerate.
    pub fn try_insert_claim(&self, c: &Claim) -> EngineResult<bool> {
        let result = self.conn.execute(
            "INSERT INTO claim (
                code, partner_id, opportunity_id, interaction_id, user_id,
                accepted_at, expires_at, completed_at, transaction_amount
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                c.code,
                c.partner_id,
                c.opportunity_id,
                c.interaction_id,
                c.user_id,
                c.accepted_at.timestamp(),
                c.expires_at.timestamp(),
                c.completed_at.map(|t| t.timestamp()),
                c.transaction_amount,
            ],
        );
        match result {
            Ok(_) => Ok(true),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == ErrorCode::ConstraintViolation =>
            {
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Look up a claim inside one partner's namespace.
    pub fn claim(&self, partner_id: &str, code: &str) -> EngineResult<Option<Claim>> {
        self.conn
            .query_row(
                "SELECT code, partner_id, opportunity_id, interaction_id, user_id,
                        accepted_at, expires_at, completed_at, transaction_amount
                 FROM claim WHERE partner_id = ?1 AND code = ?2",
                params![partner_id, code],
                claim_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    /// First-writer-wins completion: only the call that flips
    /// completed_at from NULL succeeds, so commission can never be
    /// double-counted under concurrent completion.
    pub fn complete_claim(
        &self,
        partner_id: &str,
        code: &str,
        now: DateTime<Utc>,
        transaction_amount: Option<f64>,
    ) -> EngineResult<bool> {
        let changed = self.conn.execute(
            "UPDATE claim SET completed_at = ?1, transaction_amount = ?2
             WHERE partner_id = ?3 AND code = ?4 AND completed_at IS NULL",
            params![now.timestamp(), transaction_amount, partner_id, code],
        )?;
        Ok(changed > 0)
    }
}
