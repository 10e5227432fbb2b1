//! Claim codes — short, human-presentable proof of acceptance.
//!
//! Codes come from a cryptographically secure source (OsRng); nothing
//! about a user's session or history leaks into them. Uniqueness is only
//! required within a partner's namespace and is enforced by the store's
//! unique index, with bounded regeneration on collision.

use crate::types::{InteractionId, OpportunityId, PartnerId, UserId};
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 32 symbols; visually ambiguous O, I, 0, 1 excluded.
pub const CODE_ALPHABET: &[u8; 32] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

pub const CODE_LEN: usize = 8;

/// Draw a fresh 8-character claim code.
pub fn generate_code() -> String {
    let mut rng = OsRng;
    (0..CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// First-class claim row: code → interaction reference with an explicit
/// expiry, so partner-side lookups never scan context blobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
    pub code: String,
    pub partner_id: PartnerId,
    pub opportunity_id: OpportunityId,
    pub interaction_id: InteractionId,
    pub user_id: UserId,
    pub accepted_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub transaction_amount: Option<f64>,
}

impl Claim {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }
}

/// Why a partner-side claim operation was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimFault {
    /// No such code in this partner's namespace.
    Unknown,
    AlreadyRedeemed,
    Expired,
}

impl fmt::Display for ClaimFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "invalid claim code"),
            Self::AlreadyRedeemed => write!(f, "claim already redeemed"),
            Self::Expired => write!(f, "claim expired"),
        }
    }
}
