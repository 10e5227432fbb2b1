//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! Engine code calls store methods — it never executes SQL directly.

use crate::error::EngineResult;
use chrono::{DateTime, Utc};
use rusqlite::Connection;

mod claim;
mod interaction;
mod opportunity;
mod partner;
mod preferences;
mod session;

pub use session::SessionRecord;

pub struct PerkStore {
    conn: Connection,
}

impl PerkStore {
    pub fn open(path: &str) -> EngineResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only matters for real files (:memory: ignores it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests and the demo runner).
    pub fn in_memory() -> EngineResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> EngineResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_partners.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_opportunities.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/003_interactions.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/004_preferences.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/005_parking_sessions.sql"))?;
        Ok(())
    }
}

/// Unix seconds → UTC timestamp. Malformed values clamp to the epoch
/// rather than failing a whole row read.
pub(crate) fn ts(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or(DateTime::UNIX_EPOCH)
}

/// Map a JSON-parse failure inside a row mapper onto rusqlite's
/// conversion-failure error so query_map keeps its native error type.
pub(crate) fn column_json_err(
    idx: usize,
    err: serde_json::Error,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        Box::new(err),
    )
}
