mod common;

use chrono::Duration;
use common::*;
use parkperk_core::catalog::ValueDetails;
use parkperk_core::claim::{ClaimFault, CODE_ALPHABET, CODE_LEN};
use parkperk_core::ledger::InteractionKind;
use parkperk_core::portal::Actor;
use parkperk_core::EngineError;

// ── Acceptance ──────────────────────────────────────────────────────────────

/// Accepting returns a well-formed claim code with a 24-hour validity
/// horizon from acceptance time.
#[test]
fn acceptance_issues_well_formed_claim_code() {
    let engine = make_engine();
    let (_, opp_id) = seed_standard_scenario(&engine);

    let acceptance = engine.accept(&opp_id, SESSION, USER).unwrap();

    assert_eq!(acceptance.claim_code.len(), CODE_LEN);
    assert!(
        acceptance
            .claim_code
            .bytes()
            .all(|b| CODE_ALPHABET.contains(&b)),
        "code {} strays outside the alphabet",
        acceptance.claim_code
    );
    assert_eq!(
        acceptance.valid_until,
        friday_evening() + Duration::hours(24)
    );
    assert!(
        acceptance.instructions.contains(&acceptance.claim_code),
        "instructions should quote the code"
    );
    assert_eq!(acceptance.parking_extended_by, 0);
}

/// Accepting an exhausted opportunity fails with Gone, and capacity is
/// never oversold: the last unit goes to exactly one of the accepts.
#[test]
fn acceptance_cannot_oversell_capacity() {
    let engine = make_engine();
    let partner = seed_partner(&engine, "bistro", true);
    let actor = Actor::Partner(partner);
    let mut draft = dinner_draft();
    draft.total_capacity = Some(2);
    let opp = engine.create_opportunity(&actor, draft).unwrap();

    for (session, user) in [("s-1", "u-1"), ("s-2", "u-2"), ("s-3", "u-3")] {
        seed_session(&engine, session, Some(user), 45);
    }

    engine.accept(&opp.opportunity_id, "s-1", "u-1").unwrap();
    engine.accept(&opp.opportunity_id, "s-2", "u-2").unwrap();
    let err = engine
        .accept(&opp.opportunity_id, "s-3", "u-3")
        .expect_err("third accept must fail");
    assert!(matches!(err, EngineError::Gone { .. }), "got {err:?}");

    let fresh = engine
        .store()
        .opportunity(&opp.opportunity_id)
        .unwrap()
        .unwrap();
    assert_eq!(fresh.used_capacity, 2, "capacity must not be oversold");
}

/// Accepting a deactivated opportunity fails with Gone even though
/// discovery might have shown it moments earlier.
#[test]
fn acceptance_rechecks_availability() {
    let engine = make_engine();
    let (partner, opp_id) = seed_standard_scenario(&engine);
    let actor = Actor::Partner(partner);

    assert_eq!(engine.discover(SESSION, Some(USER)).unwrap().len(), 1);
    engine.deactivate_opportunity(&actor, &opp_id).unwrap();

    let err = engine
        .accept(&opp_id, SESSION, USER)
        .expect_err("accept after deactivation must fail");
    assert!(matches!(err, EngineError::Gone { .. }), "got {err:?}");
}

/// A parking-extension benefit pushes the session expiry by exactly the
/// advertised minutes and reports it in the acceptance.
#[test]
fn acceptance_extends_parking_session() {
    let engine = make_engine();
    let partner = seed_partner(&engine, "carwash", true);
    let actor = Actor::Partner(partner);
    let mut draft = dinner_draft();
    draft.title = "Free 30 extra minutes".to_string();
    draft.value_details = ValueDetails::new().with_parking_extension(30);
    let opp = engine.create_opportunity(&actor, draft).unwrap();
    seed_session(&engine, SESSION, Some(USER), 45);

    let before = engine.store().session(SESSION).unwrap().unwrap().expires_at;
    let acceptance = engine.accept(&opp.opportunity_id, SESSION, USER).unwrap();
    let after = engine.store().session(SESSION).unwrap().unwrap().expires_at;

    assert_eq!(acceptance.parking_extended_by, 30);
    assert_eq!(after - before, Duration::minutes(30));
}

/// Accepting after discovery upgrades the impressed row in place instead
/// of stacking a second ledger row, and the row carries the claim code.
#[test]
fn acceptance_upgrades_impressed_row() {
    let engine = make_engine();
    let (_, opp_id) = seed_standard_scenario(&engine);

    engine.discover(SESSION, Some(USER)).unwrap();
    let acceptance = engine.accept(&opp_id, SESSION, USER).unwrap();

    let all = engine.history(USER, None, 1, 50).unwrap();
    assert_eq!(all.len(), 1, "impressed row should upgrade, not duplicate");
    assert_eq!(all[0].kind, InteractionKind::Accepted);
    assert_eq!(
        all[0].claim_code(),
        Some(acceptance.claim_code.as_str()),
        "accepted row must carry the claim code in its snapshot"
    );
    assert!(
        all[0].claimed_value.is_some(),
        "accepted row must snapshot the value details"
    );
}

/// Session ownership is enforced: accepting against someone else's
/// session fails with Forbidden.
#[test]
fn acceptance_rejects_foreign_session() {
    let engine = make_engine();
    let (_, opp_id) = seed_standard_scenario(&engine);

    let err = engine
        .accept(&opp_id, SESSION, "intruder")
        .expect_err("foreign session must be rejected");
    assert!(matches!(err, EngineError::Forbidden { .. }), "got {err:?}");
}

// ── Partner-side validation ─────────────────────────────────────────────────

/// Validation is read-only: checking a code twice without an intervening
/// completion answers "valid" both times.
#[test]
fn validation_is_idempotent() {
    let engine = make_engine();
    let (partner, opp_id) = seed_standard_scenario(&engine);
    let actor = Actor::Partner(partner);

    let acceptance = engine.accept(&opp_id, SESSION, USER).unwrap();

    for _ in 0..2 {
        let check = engine
            .validate_claim(&actor, &acceptance.claim_code)
            .unwrap();
        assert_eq!(check.user_id, USER);
        assert_eq!(check.opportunity_id, opp_id);
        assert!(
            (check.value.discount_percentage().unwrap() - 20.0).abs() < 1e-9,
            "value snapshot should carry the 20% discount"
        );
    }
}

/// Unknown codes, foreign-partner codes and expired codes each produce
/// their own claim fault.
#[test]
fn validation_faults() {
    let engine = make_engine();
    let (partner, opp_id) = seed_standard_scenario(&engine);
    let other = seed_partner(&engine, "rival", true);
    let actor = Actor::Partner(partner);
    let rival = Actor::Partner(other);

    let acceptance = engine.accept(&opp_id, SESSION, USER).unwrap();

    let err = engine
        .validate_claim(&actor, "ZZZZZZZZ")
        .expect_err("unknown code");
    assert!(matches!(err, EngineError::Claim(ClaimFault::Unknown)));

    // Codes live in a single partner's namespace.
    let err = engine
        .validate_claim(&rival, &acceptance.claim_code)
        .expect_err("foreign partner must not see the code");
    assert!(matches!(err, EngineError::Claim(ClaimFault::Unknown)));

    engine.clock().advance(Duration::hours(25));
    let err = engine
        .validate_claim(&actor, &acceptance.claim_code)
        .expect_err("code is past its 24-hour window");
    assert!(matches!(err, EngineError::Claim(ClaimFault::Expired)));
}

// ── Completion ──────────────────────────────────────────────────────────────

/// Completion records revenue and commission from the transaction amount
/// and the partner's commission rate.
#[test]
fn completion_books_commission() {
    let engine = make_engine();
    let (partner, opp_id) = seed_standard_scenario(&engine);
    let actor = Actor::Partner(partner);

    let acceptance = engine.accept(&opp_id, SESSION, USER).unwrap();
    let completion = engine
        .complete_claim(&actor, &acceptance.claim_code, Some(60.0))
        .unwrap();

    assert_eq!(completion.partner_revenue, Some(60.0));
    // 10% commission rate from the fixture partner.
    assert!((completion.platform_commission.unwrap() - 6.0).abs() < 1e-9);

    let all = engine.history(USER, None, 1, 50).unwrap();
    assert_eq!(all[0].kind, InteractionKind::Completed);
    assert_eq!(all[0].partner_revenue, Some(60.0));
}

/// Completing twice fails the second time and never double-counts
/// commission.
#[test]
fn completion_is_guarded_against_double_redemption() {
    let engine = make_engine();
    let (partner, opp_id) = seed_standard_scenario(&engine);
    let actor = Actor::Partner(partner);

    let acceptance = engine.accept(&opp_id, SESSION, USER).unwrap();
    engine
        .complete_claim(&actor, &acceptance.claim_code, Some(60.0))
        .unwrap();

    let err = engine
        .complete_claim(&actor, &acceptance.claim_code, Some(60.0))
        .expect_err("second completion must fail");
    assert!(matches!(err, EngineError::Claim(ClaimFault::AlreadyRedeemed)));

    let err = engine
        .validate_claim(&actor, &acceptance.claim_code)
        .expect_err("validation after completion reports already redeemed");
    assert!(matches!(err, EngineError::Claim(ClaimFault::AlreadyRedeemed)));

    let from = friday_evening() - Duration::days(1);
    let to = friday_evening() + Duration::days(1);
    let analytics = engine.partner_analytics(&actor, from, to).unwrap();
    assert!(
        (analytics.platform_fee - 6.0).abs() < 1e-9,
        "commission must be counted exactly once; got {}",
        analytics.platform_fee
    );
}

/// A completion without a transaction amount marks the ledger but books
/// no revenue.
#[test]
fn completion_without_amount_books_nothing() {
    let engine = make_engine();
    let (partner, opp_id) = seed_standard_scenario(&engine);
    let actor = Actor::Partner(partner);

    let acceptance = engine.accept(&opp_id, SESSION, USER).unwrap();
    let completion = engine
        .complete_claim(&actor, &acceptance.claim_code, None)
        .unwrap();

    assert_eq!(completion.partner_revenue, None);
    assert_eq!(completion.platform_commission, None);
}
