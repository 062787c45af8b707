//! Monetary amounts
//!
//! All balances, rewards and fees are unsigned integers denominated in
//! pico-coins (10^-12 of one coin). The reference magnitudes accrued by the
//! buffer are sub-micro-coin amounts added every second, so integer
//! pico-coin arithmetic keeps every increment exact. Audit records carry
//! signed deltas.

/// Unsigned monetary quantity in pico-coins
pub type Amount = u128;

/// Signed monetary delta in pico-coins (audit records)
pub type SignedAmount = i128;

/// Decimal places of one coin
pub const DECIMALS: u8 = 12;

/// One coin in pico-coins
pub const ONE_COIN: Amount = 1_000_000_000_000;

/// Format an amount as a decimal coin string, trailing zeros trimmed
pub fn format_coins(amount: Amount) -> String {
    let whole = amount / ONE_COIN;
    let frac = amount % ONE_COIN;
    if frac == 0 {
        return whole.to_string();
    }
    let frac = format!("{:012}", frac);
    format!("{}.{}", whole, frac.trim_end_matches('0'))
}

/// Format a signed delta as a decimal coin string with explicit sign
pub fn format_signed(amount: SignedAmount) -> String {
    if amount < 0 {
        format!("-{}", format_coins(amount.unsigned_abs()))
    } else {
        format!("+{}", format_coins(amount as Amount))
    }
}
