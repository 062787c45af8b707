//! Tunable economy parameters
//!
//! Every table and rate the engine consults lives here so deployments can
//! retune the economy without a code change. Fields deserialize with
//! defaults, so a config file only needs to name what it overrides.

use crate::constants;
use lode_core::{Amount, UserEconomy};
use serde::{Deserialize, Serialize};

/// Lookup tables and policy knobs for the economy engine
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EconomyParams {
    /// Highest buffer / rate level
    #[serde(default = "default_max_level")]
    pub max_level: u8,

    /// Buffer capacity per level, index = level - 1
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: Vec<Amount>,

    /// Accrual rate per level in pico-coins per hour, index = level - 1
    #[serde(default = "default_accrual_rate")]
    pub accrual_rate_per_hour: Vec<Amount>,

    /// Balance cost to reach each rate level, index = level - 1
    #[serde(default = "default_rate_cost")]
    pub rate_upgrade_cost: Vec<Amount>,

    /// Balance cost to reach each buffer level, index = level - 1
    #[serde(default = "default_capacity_cost")]
    pub capacity_upgrade_cost: Vec<Amount>,

    /// Claim fee in basis points of the claimed amount
    #[serde(default = "default_claim_fee_bps")]
    pub claim_fee_bps: u32,

    /// Lower clamp on the claim fee
    #[serde(default = "default_claim_fee_min")]
    pub claim_fee_min: Amount,

    /// Upper clamp on the claim fee
    #[serde(default = "default_claim_fee_max")]
    pub claim_fee_max: Amount,

    /// One-time signup bonus for the referrer
    #[serde(default = "default_referral_direct_bonus")]
    pub referral_direct_bonus: Amount,

    /// One-time signup bonus for the referred user
    #[serde(default = "default_referral_friend_bonus")]
    pub referral_friend_bonus: Amount,

    /// Permanent accrual boost per referral, pico-coins per hour
    #[serde(default = "default_referral_rate_boost")]
    pub referral_rate_boost_per_hour: Amount,

    /// Referrer's share of a referred user's task rewards, basis points
    #[serde(default = "default_referral_share_bps")]
    pub referral_share_bps: u32,
}

fn default_max_level() -> u8 {
    constants::MAX_LEVEL
}

fn default_buffer_capacity() -> Vec<Amount> {
    constants::BUFFER_CAPACITY.to_vec()
}

fn default_accrual_rate() -> Vec<Amount> {
    constants::ACCRUAL_RATE_PER_HOUR.to_vec()
}

fn default_rate_cost() -> Vec<Amount> {
    constants::RATE_UPGRADE_COST.to_vec()
}

fn default_capacity_cost() -> Vec<Amount> {
    constants::CAPACITY_UPGRADE_COST.to_vec()
}

fn default_claim_fee_bps() -> u32 {
    constants::CLAIM_FEE_BPS
}

fn default_claim_fee_min() -> Amount {
    constants::CLAIM_FEE_MIN
}

fn default_claim_fee_max() -> Amount {
    constants::CLAIM_FEE_MAX
}

fn default_referral_direct_bonus() -> Amount {
    constants::REFERRAL_DIRECT_BONUS
}

fn default_referral_friend_bonus() -> Amount {
    constants::REFERRAL_FRIEND_BONUS
}

fn default_referral_rate_boost() -> Amount {
    constants::REFERRAL_RATE_BOOST_PER_HOUR
}

fn default_referral_share_bps() -> u32 {
    constants::REFERRAL_SHARE_BPS
}

impl Default for EconomyParams {
    fn default() -> Self {
        Self {
            max_level: default_max_level(),
            buffer_capacity: default_buffer_capacity(),
            accrual_rate_per_hour: default_accrual_rate(),
            rate_upgrade_cost: default_rate_cost(),
            capacity_upgrade_cost: default_capacity_cost(),
            claim_fee_bps: default_claim_fee_bps(),
            claim_fee_min: default_claim_fee_min(),
            claim_fee_max: default_claim_fee_max(),
            referral_direct_bonus: default_referral_direct_bonus(),
            referral_friend_bonus: default_referral_friend_bonus(),
            referral_rate_boost_per_hour: default_referral_rate_boost(),
            referral_share_bps: default_referral_share_bps(),
        }
    }
}

/// Parameter validation failures
#[derive(Clone, Debug, thiserror::Error)]
pub enum ParamsError {
    #[error("Table {table} must have exactly {expected} entries, has {actual}")]
    TableLength {
        table: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Cost table {table} must be non-decreasing per level")]
    NonMonotonicCosts { table: &'static str },

    #[error("Claim fee clamp inverted: min {min} > max {max}")]
    FeeClampInverted { min: Amount, max: Amount },

    #[error("max_level must be at least 1")]
    ZeroMaxLevel,
}

impl EconomyParams {
    /// Check the invariants every table must hold
    pub fn validate(&self) -> Result<(), ParamsError> {
        if self.max_level == 0 {
            return Err(ParamsError::ZeroMaxLevel);
        }
        let expected = self.max_level as usize;
        for (table, len) in [
            ("buffer_capacity", self.buffer_capacity.len()),
            ("accrual_rate_per_hour", self.accrual_rate_per_hour.len()),
            ("rate_upgrade_cost", self.rate_upgrade_cost.len()),
            ("capacity_upgrade_cost", self.capacity_upgrade_cost.len()),
        ] {
            if len != expected {
                return Err(ParamsError::TableLength {
                    table,
                    expected,
                    actual: len,
                });
            }
        }
        for (table, costs) in [
            ("rate_upgrade_cost", &self.rate_upgrade_cost),
            ("capacity_upgrade_cost", &self.capacity_upgrade_cost),
        ] {
            if costs.windows(2).any(|w| w[1] < w[0]) {
                return Err(ParamsError::NonMonotonicCosts { table });
            }
        }
        if self.claim_fee_min > self.claim_fee_max {
            return Err(ParamsError::FeeClampInverted {
                min: self.claim_fee_min,
                max: self.claim_fee_max,
            });
        }
        Ok(())
    }

    fn table_at(table: &[Amount], level: u8) -> Amount {
        let idx = (level.max(1) as usize - 1).min(table.len().saturating_sub(1));
        table[idx]
    }

    /// Buffer capacity at a level
    pub fn capacity_for(&self, level: u8) -> Amount {
        Self::table_at(&self.buffer_capacity, level)
    }

    /// Table accrual rate at a level, per hour
    pub fn rate_for(&self, level: u8) -> Amount {
        Self::table_at(&self.accrual_rate_per_hour, level)
    }

    /// Cost to reach a rate level
    pub fn rate_cost_to(&self, level: u8) -> Amount {
        Self::table_at(&self.rate_upgrade_cost, level)
    }

    /// Cost to reach a buffer level
    pub fn capacity_cost_to(&self, level: u8) -> Amount {
        Self::table_at(&self.capacity_upgrade_cost, level)
    }

    /// Effective accrual rate for a user: table rate plus referral boost
    pub fn effective_rate_per_hour(&self, econ: &UserEconomy) -> Amount {
        self.rate_for(econ.rate_level) + econ.rate_bonus_per_hour
    }

    /// Claim fee for an amount: percentage clamped to [min, max]
    pub fn claim_fee(&self, claimed: Amount) -> Amount {
        let raw = claimed * self.claim_fee_bps as Amount / 10_000;
        raw.clamp(self.claim_fee_min, self.claim_fee_max)
    }

    /// Referrer's share of a task reward
    pub fn referral_share(&self, reward: Amount) -> Amount {
        reward * self.referral_share_bps as Amount / 10_000
    }
}
