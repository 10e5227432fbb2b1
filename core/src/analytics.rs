//! Partner-facing engagement and revenue aggregates.

use serde::Serialize;

/// Rollup of a partner's ledger activity over a date range. Counts follow
/// ledger semantics: an accepted row upgraded to completed counts as both
/// a claim and a redemption.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PartnerAnalytics {
    pub unique_users: i64,
    pub impressions: i64,
    pub views: i64,
    pub claims: i64,
    pub redemptions: i64,
    /// redemptions / claims; 0 when there were no claims.
    pub redemption_rate: f64,
    /// Mean transaction amount over completions that reported one.
    pub avg_transaction: f64,
    pub gross_revenue: f64,
    pub platform_fee: f64,
    pub net_revenue: f64,
}
