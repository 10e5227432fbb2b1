mod common;

use common::*;
use parkperk_core::catalog::{OpportunityUpdate, ValueDetails};
use parkperk_core::portal::Actor;
use parkperk_core::EngineError;

// ── Authentication ──────────────────────────────────────────────────────────

/// Credentials resolve once at the boundary: a partner credential yields
/// the partner actor, unknown and deactivated credentials are Forbidden.
#[test]
fn credential_resolution() {
    let engine = make_engine();
    let partner = seed_partner(&engine, "bistro", true);

    let actor = engine.authenticate(&partner.credential).unwrap();
    assert!(matches!(actor, Actor::Partner(ref p) if p.partner_id == partner.partner_id));

    let err = engine
        .authenticate("no-such-credential")
        .expect_err("unknown credential");
    assert!(matches!(err, EngineError::Forbidden { .. }));

    engine
        .deactivate_partner(&Actor::Admin, &partner.partner_id)
        .unwrap();
    let err = engine
        .authenticate(&partner.credential)
        .expect_err("deactivated partner credential");
    assert!(matches!(err, EngineError::Forbidden { .. }));
}

/// Admin-only operations reject partner actors.
#[test]
fn admin_operations_reject_partners() {
    let engine = make_engine();
    let partner = seed_partner(&engine, "bistro", false);
    let actor = Actor::Partner(partner.clone());
    let opp = {
        let mut draft = dinner_draft();
        draft.value_details = ValueDetails::new().with_discount_percentage(20.0);
        engine.create_opportunity(&actor, draft).unwrap()
    };

    let err = engine
        .approve_opportunity(&actor, &opp.opportunity_id)
        .expect_err("partners cannot approve");
    assert!(matches!(err, EngineError::Forbidden { .. }));
}

// ── Opportunity lifecycle ───────────────────────────────────────────────────

/// A 5% discount with no other value fields fails creation with a
/// validation error, and nothing persists.
#[test]
fn creation_enforces_minimum_value() {
    let engine = make_engine();
    let partner = seed_partner(&engine, "bistro", true);
    let actor = Actor::Partner(partner);

    let mut draft = dinner_draft();
    draft.value_details = ValueDetails::new().with_discount_percentage(5.0);
    let err = engine
        .create_opportunity(&actor, draft)
        .expect_err("5% alone is below minimum value");
    assert!(matches!(err, EngineError::Validation { .. }), "got {err:?}");

    assert!(
        engine.partner_opportunities(&actor).unwrap().is_empty(),
        "failed creation must persist nothing"
    );
}

/// Creation is pending approval unless the partner is auto-approved, and
/// unapproved offers never reach discovery.
#[test]
fn approval_gates_discovery() {
    let engine = make_engine();
    let partner = seed_partner(&engine, "bistro", false);
    let actor = Actor::Partner(partner);

    let opp = engine.create_opportunity(&actor, dinner_draft()).unwrap();
    assert!(!opp.approved);
    seed_session(&engine, SESSION, Some(USER), 45);
    assert!(engine.discover(SESSION, Some(USER)).unwrap().is_empty());

    engine
        .approve_opportunity(&Actor::Admin, &opp.opportunity_id)
        .unwrap();
    assert_eq!(engine.discover(SESSION, Some(USER)).unwrap().len(), 1);
}

/// The active-opportunity quota bounds a partner's live catalog.
#[test]
fn quota_limits_active_opportunities() {
    let engine = make_engine();
    let partner = engine
        .onboard_partner(
            &Actor::Admin,
            parkperk_core::portal::PartnerDraft {
                name: "tiny".to_string(),
                contact_email: "tiny@example.com".to_string(),
                location: Some(venue_location()),
                commission_rate: 0.10,
                auto_approve: true,
                max_active_opportunities: 2,
            },
        )
        .unwrap();
    let actor = Actor::Partner(partner);

    engine.create_opportunity(&actor, dinner_draft()).unwrap();
    engine.create_opportunity(&actor, dinner_draft()).unwrap();
    let err = engine
        .create_opportunity(&actor, dinner_draft())
        .expect_err("third active offer exceeds the quota");
    assert!(matches!(err, EngineError::Validation { .. }));
}

/// Updates re-validate the merged record and send a non-auto-approved
/// partner's offer back through moderation.
#[test]
fn update_revalidates_and_resets_approval() {
    let engine = make_engine();
    let partner = seed_partner(&engine, "bistro", false);
    let actor = Actor::Partner(partner);
    let opp = engine.create_opportunity(&actor, dinner_draft()).unwrap();
    engine
        .approve_opportunity(&Actor::Admin, &opp.opportunity_id)
        .unwrap();

    // Dropping the value below minimum is rejected wholesale.
    let err = engine
        .update_opportunity(
            &actor,
            &opp.opportunity_id,
            OpportunityUpdate {
                value_details: Some(ValueDetails::new().with_discount_percentage(5.0)),
                ..OpportunityUpdate::default()
            },
        )
        .expect_err("update below minimum value");
    assert!(matches!(err, EngineError::Validation { .. }));
    let unchanged = engine
        .partner_opportunity(&actor, &opp.opportunity_id)
        .unwrap();
    assert!(
        unchanged.approved,
        "failed update must not touch the stored record"
    );

    // A legal edit lands but clears approval for moderated partners.
    let updated = engine
        .update_opportunity(
            &actor,
            &opp.opportunity_id,
            OpportunityUpdate {
                title: Some("25% off dinner".to_string()),
                value_details: Some(ValueDetails::new().with_discount_percentage(25.0)),
                ..OpportunityUpdate::default()
            },
        )
        .unwrap();
    assert_eq!(updated.title, "25% off dinner");
    assert!(!updated.approved, "edit must reset approval");
}

/// Partner access is scoped to the partner's own records: another
/// partner's opportunity id behaves as absent.
#[test]
fn partner_scope_hides_foreign_records() {
    let engine = make_engine();
    let owner = seed_partner(&engine, "bistro", true);
    let rival = seed_partner(&engine, "rival", true);
    let opp = engine
        .create_opportunity(&Actor::Partner(owner), dinner_draft())
        .unwrap();

    let err = engine
        .partner_opportunity(&Actor::Partner(rival.clone()), &opp.opportunity_id)
        .expect_err("foreign record must look absent");
    assert!(matches!(err, EngineError::NotFound { .. }));

    let err = engine
        .deactivate_opportunity(&Actor::Partner(rival), &opp.opportunity_id)
        .expect_err("foreign soft-delete must fail");
    assert!(matches!(err, EngineError::NotFound { .. }));
}

/// Soft-deleting removes the offer from discovery but keeps the record
/// and its history.
#[test]
fn deactivation_is_soft() {
    let engine = make_engine();
    let (partner, opp_id) = seed_standard_scenario(&engine);
    let actor = Actor::Partner(partner);

    assert_eq!(engine.discover(SESSION, Some(USER)).unwrap().len(), 1);
    engine.deactivate_opportunity(&actor, &opp_id).unwrap();

    seed_session(&engine, "session-2", Some("user-2"), 45);
    assert!(engine.discover("session-2", Some("user-2")).unwrap().is_empty());

    let record = engine.partner_opportunity(&actor, &opp_id).unwrap();
    assert!(!record.active, "record survives soft-delete");
}
