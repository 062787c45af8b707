//! Accrual, claim and upgrade reducers
//!
//! Each function takes a snapshot and returns a new value; callers persist
//! the result (or discard it on error - a failed transition leaves no
//! partial state). Invariants:
//!
//! - `buffer_fill` never decreases except through a claim, and never
//!   exceeds the capacity for the current buffer level
//! - levels never decrease
//! - given the same inputs the output is identical

use crate::params::EconomyParams;
use chrono::{DateTime, Duration, Utc};
use lode_core::{Amount, EconomyError, Result, UserEconomy};

/// Result of a successful claim
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClaimOutcome {
    /// Snapshot after the claim
    pub economy: UserEconomy,
    /// Pre-fee amount moved out of the buffer
    pub claimed: Amount,
    /// Fee charged against the balance
    pub fee: Amount,
}

/// Result of a successful upgrade
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpgradeOutcome {
    /// Snapshot after the upgrade
    pub economy: UserEconomy,
    /// Balance debited
    pub cost: Amount,
    /// Level reached
    pub new_level: u8,
}

fn ceil_div(n: Amount, d: Amount) -> Amount {
    if d == 0 {
        0
    } else {
        n.div_ceil(d)
    }
}

/// Instant at which a buffer filling from `fill` reaches `cap`, measured
/// from `from`. `None` when the rate is zero.
fn projected_full_at(
    fill: Amount,
    cap: Amount,
    rate_per_hour: Amount,
    from: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    if rate_per_hour == 0 {
        return None;
    }
    let remaining = cap.saturating_sub(fill);
    let secs = ceil_div(remaining * 3600, rate_per_hour);
    from.checked_add_signed(Duration::seconds(secs.min(i64::MAX as Amount) as i64))
}

/// Accrue elapsed time into the buffer
///
/// `fill += rate_per_hour * elapsed_secs / 3600`, capped at capacity. The
/// projection `buffer_full_at` is left untouched while the buffer is
/// already full (it records when the buffer filled, until the next claim).
/// A `now` earlier than `last_sync` accrues nothing.
pub fn advance(snapshot: &UserEconomy, params: &EconomyParams, now: DateTime<Utc>) -> UserEconomy {
    let cap = params.capacity_for(snapshot.buffer_level);
    let rate = params.effective_rate_per_hour(snapshot);
    let elapsed = (now - snapshot.last_sync).num_seconds().max(0) as Amount;

    let accrued = rate * elapsed / 3600;
    let was_full = snapshot.buffer_fill >= cap;
    let fill = cap.min(snapshot.buffer_fill.saturating_add(accrued));

    let mut next = snapshot.clone();
    next.buffer_fill = fill;
    next.last_sync = now;
    if !was_full {
        next.buffer_full_at = projected_full_at(snapshot.buffer_fill, cap, rate, snapshot.last_sync);
    }
    next
}

/// Move the accrued buffer into the spendable balance for a fee
///
/// Fails with `InsufficientBuffer` on an empty buffer and with
/// `InsufficientBalance` when the balance cannot cover the clamped fee.
/// On success the balance gains `claimed - fee`, the buffer resets to zero
/// and the full-projection restarts from `now`.
pub fn claim(
    snapshot: &UserEconomy,
    params: &EconomyParams,
    now: DateTime<Utc>,
) -> Result<ClaimOutcome> {
    if snapshot.buffer_fill == 0 {
        return Err(EconomyError::InsufficientBuffer);
    }
    let claimed = snapshot.buffer_fill;
    let fee = params.claim_fee(claimed);
    if snapshot.total_balance < fee {
        return Err(EconomyError::InsufficientBalance {
            need: fee,
            have: snapshot.total_balance,
        });
    }

    let cap = params.capacity_for(snapshot.buffer_level);
    let rate = params.effective_rate_per_hour(snapshot);

    let mut next = snapshot.clone();
    // fee <= balance, so balance + claimed - fee cannot underflow
    next.total_balance = snapshot.total_balance + claimed - fee;
    next.buffer_fill = 0;
    next.last_sync = now;
    next.buffer_full_at = projected_full_at(0, cap, rate, now);

    Ok(ClaimOutcome {
        economy: next,
        claimed,
        fee,
    })
}

/// Raise the accrual rate level by one
pub fn upgrade_rate(snapshot: &UserEconomy, params: &EconomyParams) -> Result<UpgradeOutcome> {
    if snapshot.rate_level >= params.max_level {
        return Err(EconomyError::MaxLevelReached {
            max: params.max_level,
        });
    }
    let new_level = snapshot.rate_level + 1;
    let cost = params.rate_cost_to(new_level);
    if snapshot.total_balance < cost {
        return Err(EconomyError::InsufficientBalance {
            need: cost,
            have: snapshot.total_balance,
        });
    }

    let mut next = snapshot.clone();
    next.total_balance -= cost;
    next.rate_level = new_level;
    refresh_projection(&mut next, params);

    Ok(UpgradeOutcome {
        economy: next,
        cost,
        new_level,
    })
}

/// Raise the buffer capacity level by one
pub fn upgrade_capacity(snapshot: &UserEconomy, params: &EconomyParams) -> Result<UpgradeOutcome> {
    if snapshot.buffer_level >= params.max_level {
        return Err(EconomyError::MaxLevelReached {
            max: params.max_level,
        });
    }
    let new_level = snapshot.buffer_level + 1;
    let cost = params.capacity_cost_to(new_level);
    if snapshot.total_balance < cost {
        return Err(EconomyError::InsufficientBalance {
            need: cost,
            have: snapshot.total_balance,
        });
    }

    let mut next = snapshot.clone();
    next.total_balance -= cost;
    next.buffer_level = new_level;
    refresh_projection(&mut next, params);

    Ok(UpgradeOutcome {
        economy: next,
        cost,
        new_level,
    })
}

/// Recompute the full-projection after a derived value changed (level
/// upgrade or referral rate boost). Callers advance first, so `last_sync`
/// is the present.
pub fn refresh_projection(econ: &mut UserEconomy, params: &EconomyParams) {
    let cap = params.capacity_for(econ.buffer_level);
    let rate = params.effective_rate_per_hour(econ);
    if econ.buffer_fill < cap {
        econ.buffer_full_at = projected_full_at(econ.buffer_fill, cap, rate, econ.last_sync);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use lode_core::UserId;
    use proptest::prelude::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    fn fresh() -> UserEconomy {
        UserEconomy::new(UserId::from("u1"), t0())
    }

    fn params() -> EconomyParams {
        EconomyParams::default()
    }

    #[test]
    fn test_advance_caps_at_capacity_and_records_full_instant() {
        // cap 0.000054 at 0.000027/hour fills in exactly two hours
        let econ = fresh();
        let now = t0() + Duration::hours(2);
        let advanced = advance(&econ, &params(), now);

        assert_eq!(advanced.buffer_fill, 54_000_000);
        assert_eq!(advanced.last_sync, now);
        assert_eq!(advanced.buffer_full_at, Some(now));
    }

    #[test]
    fn test_advance_partial_projects_full_instant() {
        let econ = fresh();
        let advanced = advance(&econ, &params(), t0() + Duration::hours(1));

        assert_eq!(advanced.buffer_fill, 27_000_000);
        assert_eq!(advanced.buffer_full_at, Some(t0() + Duration::hours(2)));
    }

    #[test]
    fn test_advance_beyond_capacity_freezes_projection() {
        let econ = fresh();
        let full = advance(&econ, &params(), t0() + Duration::hours(2));
        let later = advance(&full, &params(), t0() + Duration::hours(10));

        assert_eq!(later.buffer_fill, 54_000_000);
        // frozen at the instant the buffer filled
        assert_eq!(later.buffer_full_at, Some(t0() + Duration::hours(2)));
    }

    #[test]
    fn test_advance_backwards_clock_accrues_nothing() {
        let mut econ = fresh();
        econ.buffer_fill = 10_000_000;
        let advanced = advance(&econ, &params(), t0() - Duration::hours(1));
        assert_eq!(advanced.buffer_fill, 10_000_000);
    }

    #[test]
    fn test_referral_boost_raises_effective_rate() {
        let mut econ = fresh();
        econ.rate_bonus_per_hour = 27_000_000; // doubles the level-1 rate
        let advanced = advance(&econ, &params(), t0() + Duration::hours(1));
        assert_eq!(advanced.buffer_fill, 54_000_000);
    }

    #[test]
    fn test_claim_empty_buffer_fails_unchanged() {
        let econ = fresh();
        let err = claim(&econ, &params(), t0()).unwrap_err();
        assert_eq!(err, EconomyError::InsufficientBuffer);
    }

    #[test]
    fn test_claim_fee_clamped_up_and_balance_updated() {
        // Reference scenario: balance 0.00001, fill 0.000054, raw fee
        // 0.00000027 clamps up to 0.000001, result 0.000063
        let mut econ = fresh();
        econ.total_balance = 10_000_000;
        econ.buffer_fill = 54_000_000;

        let outcome = claim(&econ, &params(), t0() + Duration::hours(2)).unwrap();
        assert_eq!(outcome.claimed, 54_000_000);
        assert_eq!(outcome.fee, 1_000_000);
        assert_eq!(outcome.economy.total_balance, 63_000_000);
        assert_eq!(outcome.economy.buffer_fill, 0);
    }

    #[test]
    fn test_claim_insufficient_balance_for_fee() {
        let mut econ = fresh();
        econ.buffer_fill = 54_000_000;
        // zero balance cannot cover the 0.000001 minimum fee
        let err = claim(&econ, &params(), t0()).unwrap_err();
        assert!(matches!(err, EconomyError::InsufficientBalance { .. }));
    }

    #[test]
    fn test_claim_then_advance_same_instant_stays_empty() {
        let mut econ = fresh();
        econ.total_balance = 10_000_000;
        econ.buffer_fill = 54_000_000;
        let now = t0() + Duration::hours(2);

        let outcome = claim(&econ, &params(), now).unwrap();
        let advanced = advance(&outcome.economy, &params(), now);
        assert_eq!(advanced.buffer_fill, 0);
    }

    #[test]
    fn test_claim_restarts_projection() {
        let mut econ = fresh();
        econ.total_balance = 10_000_000;
        econ.buffer_fill = 54_000_000;
        let now = t0() + Duration::hours(5);

        let outcome = claim(&econ, &params(), now).unwrap();
        assert_eq!(
            outcome.economy.buffer_full_at,
            Some(now + Duration::hours(2))
        );
    }

    #[test]
    fn test_upgrade_rate_debits_table_cost() {
        let mut econ = fresh();
        econ.total_balance = 60_000_000;

        let outcome = upgrade_rate(&econ, &params()).unwrap();
        assert_eq!(outcome.new_level, 2);
        assert_eq!(outcome.cost, 50_000_000);
        assert_eq!(outcome.economy.total_balance, 10_000_000);
        assert_eq!(
            params().effective_rate_per_hour(&outcome.economy),
            54_000_000
        );
    }

    #[test]
    fn test_upgrade_capacity_raises_cap() {
        let mut econ = fresh();
        econ.total_balance = 40_000_000;

        let outcome = upgrade_capacity(&econ, &params()).unwrap();
        assert_eq!(outcome.new_level, 2);
        assert_eq!(outcome.economy.total_balance, 0);
        assert_eq!(params().capacity_for(outcome.economy.buffer_level), 108_000_000);
    }

    #[test]
    fn test_upgrade_at_max_level_fails_without_change() {
        let mut econ = fresh();
        econ.rate_level = 3;
        econ.total_balance = 1_000_000_000;

        let err = upgrade_rate(&econ, &params()).unwrap_err();
        assert_eq!(err, EconomyError::MaxLevelReached { max: 3 });
    }

    #[test]
    fn test_upgrade_insufficient_balance() {
        let econ = fresh();
        let err = upgrade_capacity(&econ, &params()).unwrap_err();
        assert!(matches!(err, EconomyError::InsufficientBalance { .. }));
    }

    proptest! {
        #[test]
        fn prop_advance_never_exceeds_capacity_or_decreases(
            fill in 0u128..=54_000_000,
            first_secs in 0i64..1_000_000,
            second_secs in 0i64..1_000_000,
        ) {
            let p = params();
            let mut econ = fresh();
            econ.buffer_fill = fill;

            let a = advance(&econ, &p, t0() + Duration::seconds(first_secs));
            let b = advance(&a, &p, t0() + Duration::seconds(first_secs + second_secs));

            prop_assert!(a.buffer_fill >= fill);
            prop_assert!(b.buffer_fill >= a.buffer_fill);
            prop_assert!(b.buffer_fill <= p.capacity_for(econ.buffer_level));
        }

        #[test]
        fn prop_claim_fee_within_clamp(fill in 1u128..10_000_000_000_000) {
            let p = params();
            let mut econ = fresh();
            econ.buffer_fill = fill;
            econ.total_balance = p.claim_fee_max;

            let outcome = claim(&econ, &p, t0()).unwrap();
            prop_assert!(outcome.fee >= p.claim_fee_min);
            prop_assert!(outcome.fee <= p.claim_fee_max);
            let raw = fill * p.claim_fee_bps as u128 / 10_000;
            prop_assert_eq!(outcome.fee, raw.clamp(p.claim_fee_min, p.claim_fee_max));
        }

        #[test]
        fn prop_advance_deterministic(fill in 0u128..=54_000_000, secs in 0i64..1_000_000) {
            let p = params();
            let mut econ = fresh();
            econ.buffer_fill = fill;
            let now = t0() + Duration::seconds(secs);
            prop_assert_eq!(advance(&econ, &p, now), advance(&econ, &p, now));
        }
    }
}
