//! Product bounds and fixed-point denominators.
//!
//! Ratios and rates are integers over a fixed denominator so that every
//! policy computes the same amounts on every platform.

// ---------------------------------------------------------------------------
// Fixed-point
// ---------------------------------------------------------------------------

/// Collateral ratios are expressed over this denominator (10_000 = 100%).
pub const COLLATERAL_RATIO_DENOMINATOR: u128 = 10_000;

/// Daily interest rates are expressed over this denominator
/// (1_000_000 = 100% per day).
pub const INTEREST_RATE_DENOMINATOR: u128 = 1_000_000;

// ---------------------------------------------------------------------------
// Lending / Borrowing
// ---------------------------------------------------------------------------

/// Days a lending or borrowing offer stays open before `engagement_due`.
pub const ENGAGEMENT_WINDOW_DAYS: i64 = 14;

pub const MIN_TENOR_DAYS: u32 = 2;
pub const MAX_TENOR_DAYS: u32 = 90;

/// 50%.
pub const MIN_COLLATERAL_RATIO: u32 = 5_000;
/// 200%.
pub const MAX_COLLATERAL_RATIO: u32 = 20_000;

/// 0.001% per day.
pub const MIN_INTEREST_RATE: u32 = 10;
/// 5% per day.
pub const MAX_INTEREST_RATE: u32 = 50_000;

// ---------------------------------------------------------------------------
// Spot Swap
// ---------------------------------------------------------------------------

pub const MIN_SWAP_DURATION_DAYS: u32 = 1;
pub const MAX_SWAP_DURATION_DAYS: u32 = 90;

// ---------------------------------------------------------------------------
// Saving
// ---------------------------------------------------------------------------

pub const MIN_SAVING_TENOR_DAYS: u32 = 2;
pub const MAX_SAVING_TENOR_DAYS: u32 = 365;

// ---------------------------------------------------------------------------
// Custom data tags
// ---------------------------------------------------------------------------

pub const LENDING_PROPERTIES_TAG: &str = "lending_properties";
pub const BORROWING_PROPERTIES_TAG: &str = "borrowing_properties";
pub const SPOT_SWAP_PROPERTIES_TAG: &str = "spot_swap_properties";
pub const SAVING_PROPERTIES_TAG: &str = "saving_properties";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_are_ordered() {
        assert!(MIN_TENOR_DAYS < MAX_TENOR_DAYS);
        assert!(MIN_COLLATERAL_RATIO < MAX_COLLATERAL_RATIO);
        assert!(MIN_INTEREST_RATE < MAX_INTEREST_RATE);
        assert!(MIN_SWAP_DURATION_DAYS <= MAX_SWAP_DURATION_DAYS);
        assert!(MIN_SAVING_TENOR_DAYS < MAX_SAVING_TENOR_DAYS);
        assert!((MAX_INTEREST_RATE as u128) < INTEREST_RATE_DENOMINATOR);
    }
}
