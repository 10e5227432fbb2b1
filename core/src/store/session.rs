use super::{ts, PerkStore};
use crate::error::EngineResult;
use crate::types::{GeoPoint, SessionId, UserId};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

/// A row of the host platform's parking-session table. The engine reads
/// these and mutates only the expiry, via `extend_session`.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub session_id: SessionId,
    pub user_id: Option<UserId>,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub total_price: f64,
    pub location: Option<GeoPoint>,
}

impl PerkStore {
    /// Seed a session row. In production the host platform owns this
    /// table; the engine itself only ever reads and extends.
    pub fn insert_session(&self, s: &SessionRecord) -> EngineResult<()> {
        self.conn.execute(
            "INSERT INTO parking_session (
                session_id, user_id, started_at, expires_at, total_price, lat, lon
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                s.session_id,
                s.user_id,
                s.started_at.timestamp(),
                s.expires_at.timestamp(),
                s.total_price,
                s.location.map(|l| l.lat),
                s.location.map(|l| l.lon),
            ],
        )?;
        Ok(())
    }

    pub fn session(&self, session_id: &str) -> EngineResult<Option<SessionRecord>> {
        self.conn
            .query_row(
                "SELECT session_id, user_id, started_at, expires_at, total_price, lat, lon
                 FROM parking_session WHERE session_id = ?1",
                params![session_id],
                |row| {
                    let lat: Option<f64> = row.get(5)?;
                    let lon: Option<f64> = row.get(6)?;
                    Ok(SessionRecord {
                        session_id: row.get(0)?,
                        user_id: row.get(1)?,
                        started_at: ts(row.get(2)?),
                        expires_at: ts(row.get(3)?),
                        total_price: row.get(4)?,
                        location: match (lat, lon) {
                            (Some(lat), Some(lon)) => Some(GeoPoint::new(lat, lon)),
                            _ => None,
                        },
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    /// Push the session expiry out by `minutes` (parking-extension
    /// benefit redemption).
    pub fn extend_session(&self, session_id: &str, minutes: i64) -> EngineResult<()> {
        self.conn.execute(
            "UPDATE parking_session SET expires_at = expires_at + ?1 WHERE session_id = ?2",
            params![minutes * 60, session_id],
        )?;
        Ok(())
    }
}
