use crate::db::DbPool;
use crate::models::entitlement::EntitlementState;
use crate::models::settings::Setting;

/// Outcome of the entitlement gate check that precedes every generation.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub allowed: bool,
    pub reason: Option<String>,
    pub has_pack_credits: bool,
}

fn free_tier(pool: &DbPool) -> i64 {
    Setting::get_i64_or(pool, "ledger_free_tier", 3)
}

fn purchase_bonus(pool: &DbPool) -> i64 {
    Setting::get_i64_or(pool, "ledger_purchase_bonus", 2)
}

/// Pack credits bypass the free-tier ceiling entirely; otherwise the visitor
/// is allowed while consumption stays under the (purchase- and
/// bonus-widened) allowance.
pub fn can_generate(pool: &DbPool) -> Verdict {
    let state = EntitlementState::load(pool);

    if state.pack_credits > 0 {
        return Verdict {
            allowed: true,
            reason: None,
            has_pack_credits: true,
        };
    }

    let allowance = state.allowance(free_tier(pool), purchase_bonus(pool));
    if state.free_used < allowance {
        Verdict {
            allowed: true,
            reason: None,
            has_pack_credits: false,
        }
    } else {
        Verdict {
            allowed: false,
            reason: Some(format!(
                "You've used all {} of your free portraits. Purchase one to unlock {} more.",
                allowance,
                purchase_bonus(pool)
            )),
            has_pack_credits: false,
        }
    }
}

pub fn increment_generation(pool: &DbPool, is_retry: bool) -> Result<(), String> {
    let mut state = EntitlementState::load(pool);
    state.free_used += 1;
    if is_retry {
        state.free_retry_used = true;
    }
    state.save(pool)
}

/// A completed single-image purchase widens the free allowance by two,
/// retroactively for all future checks.
pub fn add_purchase(pool: &DbPool) -> Result<(), String> {
    let mut state = EntitlementState::load(pool);
    state.purchases += 1;
    state.save(pool)?;
    log::info!("[ledger] purchase recorded, total {}", state.purchases);
    Ok(())
}

/// Map a catalog identifier to its credit count. Unknown identifiers grant a
/// single credit rather than failing the purchase flow.
pub fn add_pack_purchase(pool: &DbPool, pack_type: &str) -> Result<i64, String> {
    let credits = match pack_type {
        "1-pack" => 1,
        "2-pack" => 2, // legacy catalog entry
        "5-pack" => 5,
        "10-pack" => 10,
        other => {
            log::warn!("[ledger] unknown pack type '{}', granting 1 credit", other);
            1
        }
    };
    let mut state = EntitlementState::load(pool);
    state.pack_purchases += 1;
    state.pack_credits += credits;
    state.save(pool)?;
    Ok(credits)
}

pub fn use_pack_credit(pool: &DbPool) -> Result<(), String> {
    let mut state = EntitlementState::load(pool);
    if state.pack_credits > 0 {
        state.pack_credits -= 1;
        state.save(pool)?;
    }
    Ok(())
}

/// Issue hidden-gesture bonus credit into the additive bonus bucket, up to
/// the lifetime cap. Returns the amount actually granted (zero at cap).
pub fn grant_secret_bonus(pool: &DbPool) -> Result<i64, String> {
    let cap = Setting::get_i64_or(pool, "ledger_bonus_cap", 12);
    let increment = Setting::get_i64_or(pool, "ledger_bonus_increment", 3);

    let mut state = EntitlementState::load(pool);
    let granted = (cap - state.bonus_granted).min(increment).max(0);
    if granted == 0 {
        return Ok(0);
    }
    state.bonus_granted += granted;
    state.save(pool)?;
    log::info!(
        "[ledger] bonus granted: +{} ({}/{} lifetime)",
        granted,
        state.bonus_granted,
        cap
    );
    Ok(granted)
}

/// Whether the next free spend is covered by the bonus bucket rather than
/// the paid-for allowance; the generation service is told apart.
pub fn draws_on_bonus(pool: &DbPool) -> bool {
    let state = EntitlementState::load(pool);
    let paid_allowance = free_tier(pool) + purchase_bonus(pool) * state.purchases;
    state.bonus_granted > 0 && state.free_used >= paid_allowance
}

/// "Free portraits left" as shown to the visitor: the bonus bucket simply
/// enlarges the visible remainder.
pub fn free_remaining(pool: &DbPool) -> i64 {
    let state = EntitlementState::load(pool);
    state.free_remaining(free_tier(pool), purchase_bonus(pool))
}

/// Tracks the hidden unlock gesture: a run of clicks on the logo with no
/// intervening photo selection. The counter lives with the open flow, not in
/// the persisted record.
#[derive(Debug, Default)]
pub struct PromoClickTracker {
    clicks: i64,
}

impl PromoClickTracker {
    /// Called whenever a new photo is selected.
    pub fn reset(&mut self) {
        self.clicks = 0;
    }

    /// Register one click; on the configured run length, grant the bonus and
    /// restart the count. Returns the credits granted (usually zero).
    pub fn register_click(&mut self, pool: &DbPool) -> Result<i64, String> {
        if !Setting::get_bool(pool, "ledger_bonus_clicks_enabled") {
            return Ok(0);
        }
        self.clicks += 1;
        let threshold = Setting::get_i64_or(pool, "ledger_bonus_click_threshold", 6);
        if self.clicks < threshold {
            return Ok(0);
        }
        self.clicks = 0;
        grant_secret_bonus(pool)
    }
}
