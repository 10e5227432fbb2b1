//! Candidate filter — narrows the live catalog to opportunities worth
//! scoring for one context.
//!
//! The store query already excludes inactive, unapproved, out-of-window
//! and capacity-exhausted rows; this pass applies the per-user conditions:
//! geography, blocked partners/categories, cooldown, impression cap.

use crate::catalog::Opportunity;
use crate::config::EngineConfig;
use crate::context::UserContext;
use crate::error::EngineResult;
use crate::store::PerkStore;
use chrono::Duration;

pub(crate) fn candidates(
    store: &PerkStore,
    config: &EngineConfig,
    ctx: &UserContext,
) -> EngineResult<Vec<Opportunity>> {
    let live = store.live_opportunities(ctx.now)?;
    let bbox = ctx
        .location
        .map(|loc| loc.bounding_box(ctx.preferences.max_walk_meters));

    let mut out = Vec::new();
    for opp in live {
        // Coarse geographic pre-filter; the scorer computes the precise
        // distance. Opportunities without coordinates pass through.
        if let (Some(bbox), Some(loc)) = (bbox.as_ref(), opp.location.as_ref()) {
            if !bbox.contains(loc) {
                continue;
            }
        }

        if ctx.preferences.blocks_partner(&opp.partner_id) {
            continue;
        }
        if ctx.preferences.blocks_category(opp.category) {
            continue;
        }

        // Cooldown and impression bookkeeping only exist for known users.
        if let Some(user) = ctx.user_id.as_deref() {
            let cooldown_hours = if opp.cooldown_hours > 0 {
                opp.cooldown_hours
            } else {
                config.default_cooldown_hours
            };
            let since = ctx.now - Duration::hours(cooldown_hours);
            if store.has_blocking_interaction(user, &opp.opportunity_id, since)? {
                continue;
            }

            if opp.max_impressions_per_user > 0
                && store.impression_count(user, &opp.opportunity_id)?
                    >= opp.max_impressions_per_user
            {
                continue;
            }
        }

        out.push(opp);
    }

    Ok(out)
}
