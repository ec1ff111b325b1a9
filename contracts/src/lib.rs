//! # FSP Product Policies
//!
//! Settlement logic for the four products an FSP can activate on the
//! issuance engine. Each product is an independent [`InstrumentPolicy`]
//! implementation:
//!
//! - **Lending**: the maker lends, the taker borrows against collateral.
//! - **Borrowing**: the maker borrows against collateral posted up front.
//! - **Spot Swap**: an instantly settled two-leg exchange.
//! - **Saving**: the maker deposits savings that the FSP takes custody of.
//!
//! ## Design Principles
//!
//! 1. Policies never mutate a ledger. They read views and return plans.
//! 2. All amounts use checked fixed-point arithmetic over the denominators
//!    in [`config`].
//! 3. Parameter and property structs are serde types carried as bincode
//!    blobs, so the engine stays product-agnostic.

use std::sync::Arc;

use fsp_protocol::instrument::{InstrumentKind, InstrumentPolicy};

pub mod borrowing;
mod common;
pub mod config;
pub mod lending;
pub mod saving;
pub mod spot_swap;

pub use borrowing::{BorrowingMakerParams, BorrowingPolicy, BorrowingProperties};
pub use lending::{LendingMakerParams, LendingPolicy, LendingProperties};
pub use saving::{SavingMakerParams, SavingPolicy, SavingProperties};
pub use spot_swap::{SpotSwapMakerParams, SpotSwapPolicy};

/// Returns the policy implementing `kind`.
pub fn policy_for(kind: InstrumentKind) -> Arc<dyn InstrumentPolicy> {
    match kind {
        InstrumentKind::Lending => Arc::new(LendingPolicy),
        InstrumentKind::Borrowing => Arc::new(BorrowingPolicy),
        InstrumentKind::SpotSwap => Arc::new(SpotSwapPolicy),
        InstrumentKind::Saving => Arc::new(SavingPolicy),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_returns_matching_kind() {
        for kind in [
            InstrumentKind::Lending,
            InstrumentKind::Borrowing,
            InstrumentKind::SpotSwap,
            InstrumentKind::Saving,
        ] {
            assert_eq!(policy_for(kind).kind(), kind);
        }
    }
}
