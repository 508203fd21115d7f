use serde::{Deserialize, Serialize};

use crate::db::DbPool;
use crate::models::kv::{self, Kv};

/// The persisted credit record. One per browser profile; read, mutated and
/// rewritten as a whole JSON blob. Missing fields default to zero so blobs
/// written by older engine versions keep loading.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitlementState {
    /// Free generations consumed. Never negative: banked bonus credit lives
    /// in `bonus_granted`, not below zero here.
    #[serde(default)]
    pub free_used: i64,
    /// The single complimentary retry has been spent.
    #[serde(default)]
    pub free_retry_used: bool,
    /// Single-image purchases; each widens the free allowance by two.
    #[serde(default)]
    pub purchases: i64,
    #[serde(default)]
    pub pack_purchases: i64,
    /// Watermarked-generation credits remaining from bundle purchases.
    #[serde(default)]
    pub pack_credits: i64,
    /// Cumulative credits issued by the hidden click mechanism, bounded by
    /// the configured lifetime cap.
    #[serde(default)]
    pub bonus_granted: i64,
}

impl EntitlementState {
    /// Tolerant read: a malformed or missing record is replaced with
    /// defaults. This is a recovery, not an error.
    pub fn load(pool: &DbPool) -> Self {
        match Kv::get(pool, kv::ENTITLEMENT) {
            Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                log::warn!("[ledger] discarding malformed entitlement record: {}", e);
                Self::default()
            }),
            None => Self::default(),
        }
    }

    pub fn save(&self, pool: &DbPool) -> Result<(), String> {
        let raw = serde_json::to_string(self).map_err(|e| e.to_string())?;
        Kv::set(pool, kv::ENTITLEMENT, &raw)
    }

    pub fn allowance(&self, free_tier: i64, purchase_bonus: i64) -> i64 {
        free_tier + purchase_bonus * self.purchases + self.bonus_granted
    }

    pub fn free_remaining(&self, free_tier: i64, purchase_bonus: i64) -> i64 {
        (self.allowance(free_tier, purchase_bonus) - self.free_used).max(0)
    }
}
