//! Partner and admin surface.
//!
//! Callers authenticate with an opaque credential that resolves, once, at
//! this boundary into a typed `Actor`. Every operation takes the resolved
//! actor; partner operations are scoped to the actor's own records.

use crate::analytics::PartnerAnalytics;
use crate::catalog::{
    self, Opportunity, OpportunityDraft, OpportunityUpdate, Partner, ValueDetails,
};
use crate::claim::ClaimFault;
use crate::engine::OffersEngine;
use crate::error::{EngineError, EngineResult};
use crate::types::{GeoPoint, OpportunityId, UserId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// The two kinds of authenticated caller on this surface. Each variant
/// carries only what its branch needs.
#[derive(Debug, Clone)]
pub enum Actor {
    Partner(Partner),
    Admin,
}

impl Actor {
    fn partner(&self) -> EngineResult<&Partner> {
        match self {
            Self::Partner(p) => Ok(p),
            Self::Admin => Err(EngineError::forbidden(
                "operation requires a partner credential",
            )),
        }
    }

    fn require_admin(&self) -> EngineResult<()> {
        match self {
            Self::Admin => Ok(()),
            Self::Partner(_) => Err(EngineError::forbidden("operation requires admin")),
        }
    }
}

/// Onboarding input for a new partner.
#[derive(Debug, Clone)]
pub struct PartnerDraft {
    pub name: String,
    pub contact_email: String,
    pub location: Option<GeoPoint>,
    pub commission_rate: f64,
    pub auto_approve: bool,
    pub max_active_opportunities: i64,
}

/// Result of a partner-side claim validation, enough for in-person
/// verification at the counter.
#[derive(Debug, Clone, Serialize)]
pub struct ClaimCheck {
    pub code: String,
    pub opportunity_id: OpportunityId,
    pub opportunity_title: String,
    pub user_id: UserId,
    pub accepted_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub value: ValueDetails,
}

/// Outcome of a completed redemption.
#[derive(Debug, Clone, Serialize)]
pub struct Completion {
    pub code: String,
    pub completed_at: DateTime<Utc>,
    pub partner_revenue: Option<f64>,
    pub platform_commission: Option<f64>,
}

impl OffersEngine {
    /// Resolve a credential into a typed actor. Unknown and deactivated
    /// credentials are both rejected as Forbidden.
    pub fn authenticate(&self, credential: &str) -> EngineResult<Actor> {
        if self.config().admin_credential.as_deref() == Some(credential) {
            return Ok(Actor::Admin);
        }
        match self.store().partner_by_credential(credential)? {
            Some(p) if p.active => Ok(Actor::Partner(p)),
            Some(_) => Err(EngineError::forbidden("partner deactivated")),
            None => Err(EngineError::forbidden("unknown credential")),
        }
    }

    // ── Admin operations ───────────────────────────────────────

    /// Onboard a new partner; generates the credential returned to them.
    pub fn onboard_partner(&self, actor: &Actor, draft: PartnerDraft) -> EngineResult<Partner> {
        actor.require_admin()?;
        if !(0.0..=1.0).contains(&draft.commission_rate) {
            return Err(EngineError::validation(
                "commission_rate must be within 0..=1",
            ));
        }
        let now = self.clock().now();
        let partner = Partner {
            partner_id: Uuid::new_v4().to_string(),
            name: draft.name,
            contact_email: draft.contact_email,
            location: draft.location,
            credential: Uuid::new_v4().to_string(),
            commission_rate: draft.commission_rate,
            auto_approve: draft.auto_approve,
            max_active_opportunities: draft.max_active_opportunities,
            active: true,
            created_at: now,
            updated_at: now,
        };
        self.store().insert_partner(&partner)?;
        log::info!("onboarded partner={} name={}", partner.partner_id, partner.name);
        Ok(partner)
    }

    pub fn approve_opportunity(&self, actor: &Actor, opportunity_id: &str) -> EngineResult<()> {
        actor.require_admin()?;
        if !self
            .store()
            .set_opportunity_approved(opportunity_id, self.clock().now())?
        {
            return Err(EngineError::not_found("opportunity", opportunity_id));
        }
        log::info!("approved opportunity={opportunity_id}");
        Ok(())
    }

    /// Soft-deactivate a partner; their catalog stops being discoverable
    /// through the live filters on their own flags.
    pub fn deactivate_partner(&self, actor: &Actor, partner_id: &str) -> EngineResult<()> {
        actor.require_admin()?;
        if !self
            .store()
            .set_partner_active(partner_id, false, self.clock().now())?
        {
            return Err(EngineError::not_found("partner", partner_id));
        }
        log::info!("deactivated partner={partner_id}");
        Ok(())
    }

    // ── Partner catalog management ─────────────────────────────

    /// Create an opportunity. Pending approval unless the partner is
    /// auto-approved; all-or-nothing against the minimum-value rule and
    /// the partner's active-opportunity quota.
    pub fn create_opportunity(
        &self,
        actor: &Actor,
        draft: OpportunityDraft,
    ) -> EngineResult<Opportunity> {
        let partner = actor.partner()?;

        let active_count = self.store().active_opportunity_count(&partner.partner_id)?;
        if active_count >= partner.max_active_opportunities {
            return Err(EngineError::validation(format!(
                "active-opportunity quota reached ({active_count})"
            )));
        }

        catalog::validate_draft(
            &draft.title,
            draft.valid_from,
            draft.valid_until,
            &draft.value_details,
        )?;

        let now = self.clock().now();
        let opportunity = Opportunity {
            opportunity_id: Uuid::new_v4().to_string(),
            partner_id: partner.partner_id.clone(),
            title: draft.title,
            description: draft.description,
            category: draft.category,
            trigger_rules: draft.trigger_rules,
            value_details: draft.value_details,
            valid_from: draft.valid_from,
            valid_until: draft.valid_until,
            total_capacity: draft.total_capacity,
            used_capacity: 0,
            location: draft.location.or(partner.location),
            max_impressions_per_user: draft.max_impressions_per_user.unwrap_or(3),
            cooldown_hours: draft
                .cooldown_hours
                .unwrap_or(self.config().default_cooldown_hours),
            priority: draft.priority.unwrap_or(0),
            active: true,
            approved: partner.auto_approve,
            created_at: now,
            updated_at: now,
        };
        self.store().insert_opportunity(&opportunity)?;

        log::info!(
            "partner={} created opportunity={} approved={}",
            partner.partner_id,
            opportunity.opportunity_id,
            opportunity.approved
        );
        Ok(opportunity)
    }

    /// Apply a partial update to the partner's own opportunity; the
    /// merged record is re-validated as a whole before anything persists.
    pub fn update_opportunity(
        &self,
        actor: &Actor,
        opportunity_id: &str,
        update: OpportunityUpdate,
    ) -> EngineResult<Opportunity> {
        let partner = actor.partner()?;
        let mut opp = self.owned_opportunity(partner, opportunity_id)?;

        if let Some(v) = update.title {
            opp.title = v;
        }
        if let Some(v) = update.description {
            opp.description = v;
        }
        if let Some(v) = update.category {
            opp.category = v;
        }
        if let Some(v) = update.trigger_rules {
            opp.trigger_rules = v;
        }
        if let Some(v) = update.value_details {
            opp.value_details = v;
        }
        if let Some(v) = update.valid_from {
            opp.valid_from = v;
        }
        if let Some(v) = update.valid_until {
            opp.valid_until = v;
        }
        if let Some(v) = update.total_capacity {
            opp.total_capacity = v;
        }
        if let Some(v) = update.location {
            opp.location = v;
        }
        if let Some(v) = update.max_impressions_per_user {
            opp.max_impressions_per_user = v;
        }
        if let Some(v) = update.cooldown_hours {
            opp.cooldown_hours = v;
        }
        if let Some(v) = update.priority {
            opp.priority = v;
        }

        catalog::validate_draft(
            &opp.title,
            opp.valid_from,
            opp.valid_until,
            &opp.value_details,
        )?;

        // Edits to a non-auto-approved partner's offer go back through
        // moderation.
        if !partner.auto_approve {
            opp.approved = false;
        }
        opp.updated_at = self.clock().now();
        self.store().update_opportunity(&opp)?;
        Ok(opp)
    }

    pub fn partner_opportunities(&self, actor: &Actor) -> EngineResult<Vec<Opportunity>> {
        let partner = actor.partner()?;
        self.store().opportunities_for_partner(&partner.partner_id)
    }

    pub fn partner_opportunity(
        &self,
        actor: &Actor,
        opportunity_id: &str,
    ) -> EngineResult<Opportunity> {
        let partner = actor.partner()?;
        self.owned_opportunity(partner, opportunity_id)
    }

    /// Soft-delete: the catalog row and its interaction history survive.
    pub fn deactivate_opportunity(
        &self,
        actor: &Actor,
        opportunity_id: &str,
    ) -> EngineResult<()> {
        let partner = actor.partner()?;
        if !self.store().set_opportunity_active(
            opportunity_id,
            &partner.partner_id,
            false,
            self.clock().now(),
        )? {
            return Err(EngineError::not_found("opportunity", opportunity_id));
        }
        log::info!(
            "partner={} deactivated opportunity={opportunity_id}",
            partner.partner_id
        );
        Ok(())
    }

    // ── Claim redemption ───────────────────────────────────────

    /// Check a presented claim code without consuming it. Validating
    /// twice without an intervening completion answers the same both
    /// times.
    pub fn validate_claim(&self, actor: &Actor, code: &str) -> EngineResult<ClaimCheck> {
        let partner = actor.partner()?;
        let now = self.clock().now();

        let claim = self
            .store()
            .claim(&partner.partner_id, code)?
            .ok_or(EngineError::Claim(ClaimFault::Unknown))?;
        if claim.is_completed() {
            return Err(EngineError::Claim(ClaimFault::AlreadyRedeemed));
        }
        if claim.is_expired(now) {
            return Err(EngineError::Claim(ClaimFault::Expired));
        }

        let opp = self
            .store()
            .opportunity(&claim.opportunity_id)?
            .ok_or_else(|| EngineError::not_found("opportunity", claim.opportunity_id.clone()))?;

        // Prefer the value snapshot frozen at acceptance; the catalog row
        // may have been edited since.
        let value = self
            .store()
            .interaction(&claim.interaction_id)?
            .and_then(|i| i.claimed_value)
            .unwrap_or_else(|| opp.value_details.clone());

        Ok(ClaimCheck {
            code: claim.code,
            opportunity_id: claim.opportunity_id,
            opportunity_title: opp.title,
            user_id: claim.user_id,
            accepted_at: claim.accepted_at,
            expires_at: claim.expires_at,
            value,
        })
    }

    /// Complete a redemption. First writer wins: a second completion for
    /// the same code fails with AlreadyRedeemed and never double-counts
    /// commission.
    pub fn complete_claim(
        &self,
        actor: &Actor,
        code: &str,
        transaction_amount: Option<f64>,
    ) -> EngineResult<Completion> {
        let partner = actor.partner()?;
        let now = self.clock().now();

        let claim = self
            .store()
            .claim(&partner.partner_id, code)?
            .ok_or(EngineError::Claim(ClaimFault::Unknown))?;
        if claim.is_completed() {
            return Err(EngineError::Claim(ClaimFault::AlreadyRedeemed));
        }
        if claim.is_expired(now) {
            return Err(EngineError::Claim(ClaimFault::Expired));
        }

        if !self
            .store()
            .complete_claim(&partner.partner_id, code, now, transaction_amount)?
        {
            // Lost the race to a concurrent completion.
            return Err(EngineError::Claim(ClaimFault::AlreadyRedeemed));
        }

        let partner_revenue = transaction_amount;
        let platform_commission = transaction_amount.map(|a| a * partner.commission_rate);
        self.store().mark_interaction_completed(
            &claim.interaction_id,
            now,
            partner_revenue,
            platform_commission,
        )?;

        log::info!(
            "partner={} completed code={code} amount={:?}",
            partner.partner_id,
            transaction_amount
        );

        Ok(Completion {
            code: code.to_string(),
            completed_at: now,
            partner_revenue,
            platform_commission,
        })
    }

    // ── Analytics ──────────────────────────────────────────────

    pub fn partner_analytics(
        &self,
        actor: &Actor,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> EngineResult<PartnerAnalytics> {
        let partner = actor.partner()?;
        self.store()
            .compute_partner_analytics(&partner.partner_id, from, to)
    }

    /// Fetch an opportunity scoped to its owner; another partner's id is
    /// indistinguishable from an absent one.
    fn owned_opportunity(
        &self,
        partner: &Partner,
        opportunity_id: &str,
    ) -> EngineResult<Opportunity> {
        match self.store().opportunity(opportunity_id)? {
            Some(opp) if opp.partner_id == partner.partner_id => Ok(opp),
            _ => Err(EngineError::not_found("opportunity", opportunity_id)),
        }
    }
}
