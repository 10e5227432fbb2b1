//! Context builder — derives the per-request `UserContext` from a parking
//! session handle and an optional authenticated identity.

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::preferences::Preferences;
use crate::store::PerkStore;
use crate::types::{GeoPoint, SessionId, UserId};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct UserContext {
    pub session_id: SessionId,
    pub user_id: Option<UserId>,
    /// Minutes until the session expires, floored at zero.
    pub minutes_remaining: i64,
    /// Session price divided by its booked duration.
    pub hourly_cost: f64,
    pub location: Option<GeoPoint>,
    pub preferences: Preferences,
    pub now: DateTime<Utc>,
}

pub(crate) fn build_context(
    store: &PerkStore,
    clock: &Clock,
    config: &EngineConfig,
    session_id: &str,
    user_id: Option<&str>,
) -> EngineResult<UserContext> {
    let session = store
        .session(session_id)?
        .ok_or_else(|| EngineError::not_found("session", session_id))?;

    // Only an authenticated mismatch is rejected; anonymous lookups of an
    // owned session are allowed (kiosk browsing).
    if let (Some(caller), Some(owner)) = (user_id, session.user_id.as_deref()) {
        if caller != owner {
            return Err(EngineError::forbidden("session belongs to another user"));
        }
    }

    let now = clock.now();
    let minutes_remaining = (session.expires_at - now).num_minutes().max(0);

    let duration_hours = (session.expires_at - session.started_at).num_seconds() as f64 / 3600.0;
    let hourly_cost = if duration_hours > 0.0 {
        session.total_price / duration_hours
    } else {
        0.0
    };

    let preferences = match user_id {
        Some(user) => store.get_or_create_preferences(user, config, now)?,
        None => Preferences::anonymous(config),
    };

    Ok(UserContext {
        session_id: session_id.to_string(),
        user_id: user_id.map(str::to_string),
        minutes_remaining,
        hourly_cost,
        location: session.location,
        preferences,
        now,
    })
}
