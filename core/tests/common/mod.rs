//! Shared fixtures: an in-memory engine pinned to a Friday evening, with
//! helpers to seed partners, opportunities and parking sessions.

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use parkperk_core::catalog::{
    OpportunityCategory, OpportunityDraft, Partner, TriggerRules, ValueDetails,
};
use parkperk_core::portal::{Actor, PartnerDraft};
use parkperk_core::store::SessionRecord;
use parkperk_core::types::GeoPoint;
use parkperk_core::OffersEngine;

pub const USER: &str = "user-1";
pub const SESSION: &str = "session-1";

/// Friday 2024-06-07, 18:00 UTC.
pub fn friday_evening() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 7, 18, 0, 0).unwrap()
}

pub fn user_location() -> GeoPoint {
    GeoPoint::new(47.6062, -122.3321)
}

/// Roughly 400m north of the user.
pub fn venue_location() -> GeoPoint {
    GeoPoint::new(47.6062 + 400.0 / 111_320.0, -122.3321)
}

pub fn make_engine() -> OffersEngine {
    let _ = env_logger::builder().is_test(true).try_init();
    OffersEngine::build_test(friday_evening()).unwrap()
}

pub fn seed_partner(engine: &OffersEngine, name: &str, auto_approve: bool) -> Partner {
    engine
        .onboard_partner(
            &Actor::Admin,
            PartnerDraft {
                name: name.to_string(),
                contact_email: format!("{name}@example.com"),
                location: Some(venue_location()),
                commission_rate: 0.10,
                auto_approve,
                max_active_opportunities: 10,
            },
        )
        .unwrap()
}

/// The canonical scenario offer: 20% off dinner, Friday 17:00-22:00, at
/// least 30 minutes of parking left, valid for two weeks around the
/// fixture clock.
pub fn dinner_draft() -> OpportunityDraft {
    OpportunityDraft {
        title: "20% off dinner".to_string(),
        description: "Dinner discount for parked guests".to_string(),
        category: OpportunityCategory::Experience,
        trigger_rules: TriggerRules::new()
            .with_minutes_remaining(Some(30), None)
            .with_days(&["fri"])
            .with_time_window("17:00", "22:00"),
        value_details: ValueDetails::new().with_discount_percentage(20.0),
        valid_from: friday_evening() - Duration::days(7),
        valid_until: friday_evening() + Duration::days(7),
        total_capacity: None,
        location: Some(venue_location()),
        max_impressions_per_user: None,
        cooldown_hours: None,
        priority: None,
    }
}

/// Seed a session with `minutes_remaining` left on the clock, priced at
/// $6/hour so extension-worth math is easy to reason about.
pub fn seed_session(
    engine: &OffersEngine,
    session_id: &str,
    user_id: Option<&str>,
    minutes_remaining: i64,
) {
    let now = engine.clock().now();
    let started_at = now - Duration::minutes(30);
    let expires_at = now + Duration::minutes(minutes_remaining);
    let hours = (30 + minutes_remaining) as f64 / 60.0;
    engine
        .store()
        .insert_session(&SessionRecord {
            session_id: session_id.to_string(),
            user_id: user_id.map(str::to_string),
            started_at,
            expires_at,
            total_price: hours * 6.0,
            location: Some(user_location()),
        })
        .unwrap();
}

/// Partner + approved dinner offer + 45-minute session for USER.
pub fn seed_standard_scenario(engine: &OffersEngine) -> (Partner, String) {
    let partner = seed_partner(engine, "bistro", true);
    let opp = engine
        .create_opportunity(&Actor::Partner(partner.clone()), dinner_draft())
        .unwrap();
    seed_session(engine, SESSION, Some(USER), 45);
    (partner, opp.opportunity_id)
}
