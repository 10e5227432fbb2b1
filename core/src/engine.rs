//! The offers engine — the client-facing surface of the subsystem.
//!
//! PIPELINE (fixed order, documented here, never reordered):
//!   1. Context Builder   — session + identity → UserContext
//!   2. Preference gates  — master flag, quiet hours, excluded days
//!   3. Candidate Filter  — live catalog → per-user candidate set
//!   4. Relevance Scorer  — five-term score per candidate
//!   5. Top-N selection   — capped by engine max and preference tier
//!   6. Ledger            — impression batch (authenticated users only)
//!
//! Every handler is a stateless unit of work over the store; nothing is
//! cached between calls.

use crate::catalog::Opportunity;
use crate::claim::{self, Claim};
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::context::{self, UserContext};
use crate::error::{EngineError, EngineResult};
use crate::filter;
use crate::ledger::{context_snapshot, AffinityProfile, Interaction, InteractionKind};
use crate::preferences::Preferences;
use crate::scoring::{self, ScoreBreakdown};
use crate::store::PerkStore;
use anyhow::anyhow;
use chrono::{DateTime, Datelike, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

pub struct OffersEngine {
    store: PerkStore,
    clock: Clock,
    config: EngineConfig,
}

/// One discovery result: the opportunity plus the score that ranked it.
#[derive(Debug, Clone, Serialize)]
pub struct RankedOpportunity {
    pub opportunity: Opportunity,
    pub breakdown: ScoreBreakdown,
}

impl RankedOpportunity {
    pub fn score(&self) -> f64 {
        self.breakdown.total()
    }

    pub fn distance_m(&self) -> Option<f64> {
        self.breakdown.distance_m
    }
}

/// What the user walks away with after accepting.
#[derive(Debug, Clone, Serialize)]
pub struct Acceptance {
    pub claim_code: String,
    pub instructions: String,
    pub valid_until: DateTime<Utc>,
    /// Minutes added to the parking session, 0 when the offer carries no
    /// time benefit.
    pub parking_extended_by: i64,
}

impl OffersEngine {
    pub fn new(store: PerkStore, clock: Clock, config: EngineConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    /// In-memory engine on a fixed clock, migrated and ready. Used by the
    /// integration tests and the demo runner.
    pub fn build_test(now: DateTime<Utc>) -> EngineResult<Self> {
        let store = PerkStore::in_memory()?;
        store.migrate()?;
        Ok(Self::new(store, Clock::fixed(now), EngineConfig::default()))
    }

    pub fn store(&self) -> &PerkStore {
        &self.store
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ── Discovery ──────────────────────────────────────────────

    /// Rank the catalog for one parking context. At most 3 results,
    /// strictly ordered by descending score.
    pub fn discover(
        &self,
        session_id: &str,
        user_id: Option<&str>,
    ) -> EngineResult<Vec<RankedOpportunity>> {
        let ctx = self.context(session_id, user_id)?;

        if !ctx.preferences.enabled {
            return Ok(Vec::new());
        }
        if ctx.preferences.is_quiet_at(ctx.now.time())
            || !ctx.preferences.allows_day(ctx.now.weekday())
        {
            log::debug!("session={session_id} discovery suppressed by quiet-hours/day prefs");
            return Ok(Vec::new());
        }

        let candidates = filter::candidates(&self.store, &self.config, &ctx)?;

        let affinity = match ctx.user_id.as_deref() {
            Some(user) => Some(AffinityProfile::new(
                self.store
                    .affinity_sample(user, self.config.affinity_lookback)?,
            )),
            None => None,
        };

        let mut ranked: Vec<RankedOpportunity> = candidates
            .into_iter()
            .map(|opp| {
                let breakdown = scoring::score(&ctx, &opp, affinity.as_ref());
                RankedOpportunity {
                    opportunity: opp,
                    breakdown,
                }
            })
            .collect();

        // Descending score; priority then id keep the order deterministic.
        ranked.sort_by(|a, b| {
            b.score()
                .total_cmp(&a.score())
                .then_with(|| b.opportunity.priority.cmp(&a.opportunity.priority))
                .then_with(|| a.opportunity.opportunity_id.cmp(&b.opportunity.opportunity_id))
        });
        ranked.truncate(ctx.preferences.session_result_cap(self.config.max_results));

        // Anonymous browsing records nothing.
        if let Some(user) = ctx.user_id.as_deref() {
            let impressions: Vec<Interaction> = ranked
                .iter()
                .map(|r| Interaction {
                    interaction_id: Uuid::new_v4().to_string(),
                    user_id: Some(user.to_string()),
                    opportunity_id: r.opportunity.opportunity_id.clone(),
                    session_id: Some(ctx.session_id.clone()),
                    kind: InteractionKind::Impressed,
                    occurred_at: ctx.now,
                    context: context_snapshot(&ctx, r.breakdown.distance_m),
                    claimed_value: None,
                    partner_revenue: None,
                    platform_commission: None,
                })
                .collect();
            self.store.record_impressions(&impressions)?;
        }

        log::debug!(
            "session={session_id} discovery returned {} of catalog",
            ranked.len()
        );
        Ok(ranked)
    }

    /// Full opportunity details; records a viewed event for
    /// authenticated callers.
    pub fn opportunity_detail(
        &self,
        opportunity_id: &str,
        user_id: Option<&str>,
        session_id: Option<&str>,
    ) -> EngineResult<Opportunity> {
        let opp = self
            .store
            .opportunity(opportunity_id)?
            .ok_or_else(|| EngineError::not_found("opportunity", opportunity_id))?;

        if let Some(user) = user_id {
            let now = self.clock.now();
            let mut context = serde_json::Map::new();
            context.insert(
                "time_of_day".into(),
                serde_json::Value::from(now.format("%H:%M").to_string()),
            );
            self.store.insert_interaction(&Interaction {
                interaction_id: Uuid::new_v4().to_string(),
                user_id: Some(user.to_string()),
                opportunity_id: opportunity_id.to_string(),
                session_id: session_id.map(str::to_string),
                kind: InteractionKind::Viewed,
                occurred_at: now,
                context,
                claimed_value: None,
                partner_revenue: None,
                platform_commission: None,
            })?;
        }

        Ok(opp)
    }

    // ── Acceptance ─────────────────────────────────────────────

    /// Accept an opportunity: authoritative availability re-check,
    /// capacity consumption, claim-code issue, parking extension, ledger
    /// upgrade.
    pub fn accept(
        &self,
        opportunity_id: &str,
        session_id: &str,
        user_id: &str,
    ) -> EngineResult<Acceptance> {
        let ctx = self.context(session_id, Some(user_id))?;
        let now = ctx.now;

        let opp = self
            .store
            .opportunity(opportunity_id)?
            .ok_or_else(|| EngineError::not_found("opportunity", opportunity_id))?;

        // Second authoritative check, independent of discovery: time has
        // passed since the candidate was shown. The conditional update
        // consumes one unit of finite capacity or fails without writing.
        if !self.store.claim_capacity(opportunity_id, now)? {
            let fresh = self
                .store
                .opportunity(opportunity_id)?
                .ok_or_else(|| EngineError::not_found("opportunity", opportunity_id))?;
            return Err(EngineError::gone(fresh.unavailable_reason(now)));
        }

        let partner = self
            .store
            .partner(&opp.partner_id)?
            .ok_or_else(|| EngineError::not_found("partner", opp.partner_id.clone()))?;

        let distance_m = match (ctx.location, opp.location) {
            (Some(user), Some(venue)) => Some(user.distance_m(&venue)),
            _ => None,
        };

        let interaction = Interaction {
            interaction_id: Uuid::new_v4().to_string(),
            user_id: Some(user_id.to_string()),
            opportunity_id: opportunity_id.to_string(),
            session_id: Some(session_id.to_string()),
            kind: InteractionKind::Accepted,
            occurred_at: now,
            context: context_snapshot(&ctx, distance_m),
            claimed_value: Some(opp.value_details.clone()),
            partner_revenue: None,
            platform_commission: None,
        };
        let interaction_id = self.store.upgrade_or_insert_accepted(&interaction)?;

        let expires_at = now + Duration::hours(self.config.claim_ttl_hours);
        let mut code = claim::generate_code();
        let mut attempts = 1u32;
        loop {
            let row = Claim {
                code: code.clone(),
                partner_id: opp.partner_id.clone(),
                opportunity_id: opportunity_id.to_string(),
                interaction_id: interaction_id.clone(),
                user_id: user_id.to_string(),
                accepted_at: now,
                expires_at,
                completed_at: None,
                transaction_amount: None,
            };
            if self.store.try_insert_claim(&row)? {
                break;
            }
            if attempts >= self.config.code_attempt_budget {
                return Err(anyhow!(
                    "claim-code collision persisted through {attempts} attempts"
                )
                .into());
            }
            attempts += 1;
            code = claim::generate_code();
        }
        self.store
            .set_interaction_claim_code(&interaction_id, &code)?;

        let parking_extended_by = opp.value_details.parking_extension_minutes().unwrap_or(0);
        if parking_extended_by > 0 {
            self.store.extend_session(session_id, parking_extended_by)?;
        }

        log::info!(
            "user={user_id} accepted opportunity={opportunity_id} code={code} \
             extension={parking_extended_by}m"
        );

        Ok(Acceptance {
            instructions: format!(
                "Show code {code} at {} to redeem {}. Valid for {} hours.",
                partner.name,
                opp.value_details.summary(),
                self.config.claim_ttl_hours,
            ),
            claim_code: code,
            valid_until: expires_at,
            parking_extended_by,
        })
    }

    /// Record a dismissal; the reason code and optional feedback land in
    /// the context snapshot. Starts the opportunity's cooldown for this
    /// user.
    pub fn dismiss(
        &self,
        opportunity_id: &str,
        session_id: &str,
        user_id: &str,
        reason: &str,
        feedback: Option<&str>,
    ) -> EngineResult<()> {
        let ctx = self.context(session_id, Some(user_id))?;

        if self.store.opportunity(opportunity_id)?.is_none() {
            return Err(EngineError::not_found("opportunity", opportunity_id));
        }

        let mut context = context_snapshot(&ctx, None);
        context.insert("reason".into(), serde_json::Value::from(reason));
        if let Some(text) = feedback {
            context.insert("feedback".into(), serde_json::Value::from(text));
        }

        self.store.insert_interaction(&Interaction {
            interaction_id: Uuid::new_v4().to_string(),
            user_id: Some(user_id.to_string()),
            opportunity_id: opportunity_id.to_string(),
            session_id: Some(session_id.to_string()),
            kind: InteractionKind::Dismissed,
            occurred_at: ctx.now,
            context,
            claimed_value: None,
            partner_revenue: None,
            platform_commission: None,
        })?;

        log::debug!("user={user_id} dismissed opportunity={opportunity_id} reason={reason}");
        Ok(())
    }

    // ── Preferences & history ──────────────────────────────────

    pub fn preferences(&self, user_id: &str) -> EngineResult<Preferences> {
        self.store
            .get_or_create_preferences(user_id, &self.config, self.clock.now())
    }

    pub fn update_preferences(&self, prefs: &Preferences) -> EngineResult<()> {
        self.store.upsert_preferences(prefs, self.clock.now())
    }

    /// Paginated, optionally kind-filtered interaction history. Pages are
    /// 1-based.
    pub fn history(
        &self,
        user_id: &str,
        kind: Option<InteractionKind>,
        page: usize,
        per_page: usize,
    ) -> EngineResult<Vec<Interaction>> {
        let offset = page.saturating_sub(1) * per_page;
        self.store.history(user_id, kind, per_page, offset)
    }

    pub(crate) fn context(
        &self,
        session_id: &str,
        user_id: Option<&str>,
    ) -> EngineResult<UserContext> {
        context::build_context(&self.store, &self.clock, &self.config, session_id, user_id)
    }
}
