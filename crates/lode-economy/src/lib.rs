//! # Lode Economy
//!
//! The economy engine: pure, time-parameterized state transitions over a
//! [`lode_core::UserEconomy`] snapshot.
//!
//! ## Model
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        USER ECONOMY                          │
//! │                                                              │
//! │   buffer (capacity-limited)          balance (spendable)     │
//! │   ┌────────────────────┐   claim     ┌─────────────────┐     │
//! │   │ fill ▲ at rate/hr  │ ──(fee)──►  │ total_balance   │     │
//! │   └────────────────────┘             └─────────────────┘     │
//! │            ▲                                  │              │
//! │            └───── upgrades (rate, capacity) ◄─┘              │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **advance** accrues `rate_per_hour * elapsed / 3600` into the buffer,
//!   capped at capacity
//! - **claim** moves the buffer into the balance for a clamped percentage fee
//! - **upgrade** spends balance to raise the rate or capacity level
//!
//! All arithmetic is integer pico-coins; given the same inputs every
//! transition is deterministic. No I/O happens in this crate.

pub mod engine;
pub mod params;

pub use engine::{
    advance, claim, refresh_projection, upgrade_capacity, upgrade_rate, ClaimOutcome,
    UpgradeOutcome,
};
pub use params::EconomyParams;

/// Economy engine defaults, tunable through [`EconomyParams`]
pub mod constants {
    use lode_core::Amount;

    /// Highest buffer / rate level
    pub const MAX_LEVEL: u8 = 3;

    /// Buffer capacity per level (pico-coins)
    pub const BUFFER_CAPACITY: [Amount; 3] = [54_000_000, 108_000_000, 216_000_000];

    /// Accrual rate per level (pico-coins per hour)
    pub const ACCRUAL_RATE_PER_HOUR: [Amount; 3] = [27_000_000, 54_000_000, 108_000_000];

    /// Cost to reach each rate level; index 0 (level 1) is free
    pub const RATE_UPGRADE_COST: [Amount; 3] = [0, 50_000_000, 150_000_000];

    /// Cost to reach each buffer level; index 0 (level 1) is free
    pub const CAPACITY_UPGRADE_COST: [Amount; 3] = [0, 40_000_000, 120_000_000];

    /// Claim fee in basis points of the claimed amount (0.5%)
    pub const CLAIM_FEE_BPS: u32 = 50;

    /// Claim fee lower clamp
    pub const CLAIM_FEE_MIN: Amount = 1_000_000;

    /// Claim fee upper clamp
    pub const CLAIM_FEE_MAX: Amount = 10_000_000;

    /// One-time bonus credited to the referrer per signup
    pub const REFERRAL_DIRECT_BONUS: Amount = 25_000_000;

    /// One-time bonus credited to the referred user
    pub const REFERRAL_FRIEND_BONUS: Amount = 12_500_000;

    /// Permanent accrual boost per referral (pico-coins per hour)
    pub const REFERRAL_RATE_BOOST_PER_HOUR: Amount = 2_700_000;

    /// Referrer's share of a referred user's task reward (10%)
    pub const REFERRAL_SHARE_BPS: u32 = 1_000;
}

pub use constants::*;
