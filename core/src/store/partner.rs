use super::{ts, PerkStore};
use crate::catalog::Partner;
use crate::error::EngineResult;
use crate::types::GeoPoint;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

const PARTNER_COLUMNS: &str = "partner_id, name, contact_email, lat, lon, credential, \
     commission_rate, auto_approve, max_active_opportunities, active, created_at, updated_at";

fn partner_from_row(row: &Row<'_>) -> rusqlite::Result<Partner> {
    let lat: Option<f64> = row.get(3)?;
    let lon: Option<f64> = row.get(4)?;
    Ok(Partner {
        partner_id: row.get(0)?,
        name: row.get(1)?,
        contact_email: row.get(2)?,
        location: match (lat, lon) {
            (Some(lat), Some(lon)) => Some(GeoPoint::new(lat, lon)),
            _ => None,
        },
        credential: row.get(5)?,
        commission_rate: row.get(6)?,
        auto_approve: row.get::<_, i64>(7)? != 0,
        max_active_opportunities: row.get(8)?,
        active: row.get::<_, i64>(9)? != 0,
        created_at: ts(row.get(10)?),
        updated_at: ts(row.get(11)?),
    })
}

impl PerkStore {
    pub fn insert_partner(&self, p: &Partner) -> EngineResult<()> {
        self.conn.execute(
            "INSERT INTO partner (
                partner_id, name, contact_email, lat, lon, credential,
                commission_rate, auto_approve, max_active_opportunities,
                active, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                p.partner_id,
                p.name,
                p.contact_email,
                p.location.map(|l| l.lat),
                p.location.map(|l| l.lon),
                p.credential,
                p.commission_rate,
                p.auto_approve as i64,
                p.max_active_opportunities,
                p.active as i64,
                p.created_at.timestamp(),
                p.updated_at.timestamp(),
            ],
        )?;
        Ok(())
    }

    pub fn partner(&self, partner_id: &str) -> EngineResult<Option<Partner>> {
        let sql = format!("SELECT {PARTNER_COLUMNS} FROM partner WHERE partner_id = ?1");
        self.conn
            .query_row(&sql, params![partner_id], partner_from_row)
            .optional()
            .map_err(Into::into)
    }

    pub fn partner_by_credential(&self, credential: &str) -> EngineResult<Option<Partner>> {
        let sql = format!("SELECT {PARTNER_COLUMNS} FROM partner WHERE credential = ?1");
        self.conn
            .query_row(&sql, params![credential], partner_from_row)
            .optional()
            .map_err(Into::into)
    }

    /// Returns false when no such partner exists.
    pub fn set_partner_active(
        &self,
        partner_id: &str,
        active: bool,
        now: DateTime<Utc>,
    ) -> EngineResult<bool> {
        let changed = self.conn.execute(
            "UPDATE partner SET active = ?1, updated_at = ?2 WHERE partner_id = ?3",
            params![active as i64, now.timestamp(), partner_id],
        )?;
        Ok(changed > 0)
    }
}
