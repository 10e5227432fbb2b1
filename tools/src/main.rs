//! perk-runner: headless demo driver for the ParkPerk offers engine.
//!
//! Seeds a deterministic demo venue (partners + opportunities) from a
//! seed, opens a parking session, then walks the full flow: discovery →
//! accept → partner validate → complete, and prints partner analytics.
//!
//! Usage:
//!   perk-runner --seed 42 --partners 4 --db perks.db

use anyhow::Result;
use chrono::{Duration, Utc};
use parkperk_core::catalog::{OpportunityCategory, OpportunityDraft, TriggerRules, ValueDetails};
use parkperk_core::clock::Clock;
use parkperk_core::config::EngineConfig;
use parkperk_core::portal::{Actor, PartnerDraft};
use parkperk_core::store::{PerkStore, SessionRecord};
use parkperk_core::types::GeoPoint;
use parkperk_core::OffersEngine;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;
use std::env;

const DEMO_USER: &str = "demo-user";
const DEMO_SESSION: &str = "demo-session";

/// The demo parking lot, downtown Seattle.
const LOT: GeoPoint = GeoPoint {
    lat: 47.6062,
    lon: -122.3321,
};

const PARTNER_NAMES: &[&str] = &[
    "Corner Bistro",
    "Pike Coffee",
    "Union Books",
    "Harbor Spa",
    "Cascade Cleaners",
    "Metro Deli",
];

const CATEGORIES: &[OpportunityCategory] = &[
    OpportunityCategory::Experience,
    OpportunityCategory::Convenience,
    OpportunityCategory::Discovery,
    OpportunityCategory::Service,
    OpportunityCategory::Bundle,
];

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let partner_count = parse_arg(&args, "--partners", 4u64) as usize;
    let db = args
        .windows(2)
        .find(|w| w[0] == "--db")
        .map(|w| w[1].as_str())
        .unwrap_or(":memory:");

    println!("ParkPerk — perk-runner");
    println!("  seed:     {seed}");
    println!("  partners: {partner_count}");
    println!("  db:       {db}");
    println!();

    let store = if db == ":memory:" {
        PerkStore::in_memory()?
    } else {
        PerkStore::open(db)?
    };
    store.migrate()?;
    let engine = OffersEngine::new(store, Clock::system(), EngineConfig::default());

    let mut rng = Pcg64Mcg::seed_from_u64(seed);
    let credentials = seed_demo_catalog(&engine, &mut rng, partner_count)?;

    // A 45-minute session for the demo user, priced at $6/hour.
    let now = engine.clock().now();
    engine.store().insert_session(&SessionRecord {
        session_id: DEMO_SESSION.to_string(),
        user_id: Some(DEMO_USER.to_string()),
        started_at: now - Duration::minutes(30),
        expires_at: now + Duration::minutes(45),
        total_price: 7.50,
        location: Some(LOT),
    })?;

    // ── Discovery ──────────────────────────────────────────────
    let ranked = engine.discover(DEMO_SESSION, Some(DEMO_USER))?;
    println!("Discovery for {DEMO_USER} (45 min remaining):");
    if ranked.is_empty() {
        println!("  no opportunities matched this context");
        return Ok(());
    }
    for (i, r) in ranked.iter().enumerate() {
        let distance = r
            .distance_m()
            .map(|d| format!("{d:.0}m away"))
            .unwrap_or_else(|| "distance unknown".to_string());
        println!(
            "  {}. [{:5.1}] {} — {} ({distance})",
            i + 1,
            r.score(),
            r.opportunity.title,
            r.opportunity.value_details.summary(),
        );
        println!(
            "       temporal {:.1}  spatial {:.1}  value {:.1}  urgency {:.1}  affinity {:.1}",
            r.breakdown.temporal,
            r.breakdown.spatial,
            r.breakdown.value,
            r.breakdown.urgency,
            r.breakdown.affinity,
        );
    }

    // ── Accept the top result ──────────────────────────────────
    let top = &ranked[0].opportunity;
    let acceptance = engine.accept(&top.opportunity_id, DEMO_SESSION, DEMO_USER)?;
    println!();
    println!("Accepted \"{}\"", top.title);
    println!("  {}", acceptance.instructions);
    if acceptance.parking_extended_by > 0 {
        println!(
            "  parking extended by {} minutes",
            acceptance.parking_extended_by
        );
    }

    // ── Partner side: validate, then complete ──────────────────
    let credential = credentials
        .iter()
        .find(|(partner_id, _)| *partner_id == top.partner_id)
        .map(|(_, cred)| cred.as_str())
        .expect("accepted offer belongs to a seeded partner");
    let partner_actor = engine.authenticate(credential)?;

    let check = engine.validate_claim(&partner_actor, &acceptance.claim_code)?;
    println!();
    println!(
        "Partner validated code {} for {} ({})",
        check.code,
        check.user_id,
        check.value.summary()
    );

    let amount = 20.0 + rng.gen_range(0..800) as f64 / 10.0;
    let completion = engine.complete_claim(&partner_actor, &acceptance.claim_code, Some(amount))?;
    println!(
        "Partner completed {} — revenue {:.2}, platform fee {:.2}",
        completion.code,
        completion.partner_revenue.unwrap_or(0.0),
        completion.platform_commission.unwrap_or(0.0),
    );

    // ── Analytics ──────────────────────────────────────────────
    let analytics = engine.partner_analytics(
        &partner_actor,
        Utc::now() - Duration::days(1),
        Utc::now() + Duration::days(1),
    )?;
    println!();
    println!("Partner analytics (last day):");
    println!("  unique users:    {}", analytics.unique_users);
    println!("  impressions:     {}", analytics.impressions);
    println!("  claims:          {}", analytics.claims);
    println!("  redemptions:     {}", analytics.redemptions);
    println!("  redemption rate: {:.0}%", analytics.redemption_rate * 100.0);
    println!("  gross revenue:   {:.2}", analytics.gross_revenue);
    println!("  platform fee:    {:.2}", analytics.platform_fee);
    println!("  net revenue:     {:.2}", analytics.net_revenue);

    Ok(())
}

/// Seed partners and one or two offers each, deterministically from the
/// run seed. Returns (partner_id, credential) pairs for the partner-side
/// half of the demo.
fn seed_demo_catalog(
    engine: &OffersEngine,
    rng: &mut Pcg64Mcg,
    partner_count: usize,
) -> Result<Vec<(String, String)>> {
    let now = engine.clock().now();
    let mut credentials = Vec::new();

    for i in 0..partner_count.min(PARTNER_NAMES.len()) {
        // Scatter venues within ~400m of the lot.
        let offset_lat = (rng.gen_range(0..800) as f64 - 400.0) / 111_320.0;
        let offset_lon = (rng.gen_range(0..800) as f64 - 400.0) / 111_320.0;
        let location = GeoPoint::new(LOT.lat + offset_lat, LOT.lon + offset_lon);

        let partner = engine.onboard_partner(
            &Actor::Admin,
            PartnerDraft {
                name: PARTNER_NAMES[i].to_string(),
                contact_email: format!("owner{i}@example.com"),
                location: Some(location),
                commission_rate: 0.08 + rng.gen_range(0..5) as f64 / 100.0,
                auto_approve: true,
                max_active_opportunities: 5,
            },
        )?;
        log::info!(
            "seeded partner {} commission={:.2}",
            partner.name,
            partner.commission_rate
        );

        let actor = Actor::Partner(partner.clone());
        for _ in 0..rng.gen_range(1..3u32) {
            let category = CATEGORIES[rng.gen_range(0..CATEGORIES.len())];
            let value = match rng.gen_range(0..4u32) {
                0 => ValueDetails::new()
                    .with_discount_percentage(rng.gen_range(1..6) as f64 * 10.0),
                1 => ValueDetails::new().with_discount_amount(rng.gen_range(1..5) as f64 * 5.0),
                2 => ValueDetails::new().with_parking_extension(rng.gen_range(1..5) as i64 * 15),
                _ => ValueDetails::new().with_perks(&["free drink", "priority seating"]),
            };
            let capacity = if rng.gen_range(0..3u32) == 0 {
                Some(rng.gen_range(2..20i64))
            } else {
                None
            };
            engine.create_opportunity(
                &actor,
                OpportunityDraft {
                    title: format!("{} special", partner.name),
                    description: format!("{} for parked guests", value.summary()),
                    category,
                    trigger_rules: TriggerRules::new()
                        .with_minutes_remaining(Some(rng.gen_range(10..30)), None),
                    value_details: value,
                    valid_from: now - Duration::days(1),
                    valid_until: now + Duration::days(rng.gen_range(7..30)),
                    total_capacity: capacity,
                    location: Some(location),
                    max_impressions_per_user: None,
                    cooldown_hours: None,
                    priority: Some(rng.gen_range(0..10)),
                },
            )?;
        }

        credentials.push((partner.partner_id, partner.credential));
    }

    Ok(credentials)
}

fn parse_arg<T: std::str::FromStr>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
