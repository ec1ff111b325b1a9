//! # Instrument Policies
//!
//! Each product (lending, borrowing, spot swap, saving) plugs into the same
//! manager through the [`InstrumentPolicy`] trait. A policy validates
//! parameters, sizes collateral, computes due dates and decides which
//! callers may do what, and answers with a [`MutationPlan`]. It sees the
//! world only through read-only views.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::issuance::Issuance;
use super::plan::MutationPlan;
use crate::error::IssuanceError;
use crate::ledger::escrow::EscrowLedger;
use crate::ledger::line_item::LineItemLedger;
use crate::oracle::PriceOracle;
use crate::types::{Address, TokenId};

/// Product family implemented by a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentKind {
    Lending,
    Borrowing,
    SpotSwap,
    Saving,
}

impl std::fmt::Display for InstrumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstrumentKind::Lending => write!(f, "lending"),
            InstrumentKind::Borrowing => write!(f, "borrowing"),
            InstrumentKind::SpotSwap => write!(f, "spot_swap"),
            InstrumentKind::Saving => write!(f, "saving"),
        }
    }
}

/// Everything a policy may consult besides the issuance itself.
pub struct PolicyContext<'a> {
    pub caller: Address,
    pub now: DateTime<Utc>,
    /// The instrument's operator.
    pub fsp: Address,
    /// `true` once the instrument's override timestamp has passed.
    pub override_active: bool,
    pub oracle: &'a dyn PriceOracle,
    pub instrument_escrow: &'a EscrowLedger,
}

impl PolicyContext<'_> {
    /// `true` if the caller is `party`, or is the FSP acting under override.
    pub fn acts_for(&self, party: &Address) -> bool {
        self.caller == *party || (self.override_active && self.caller == self.fsp)
    }

    /// Instrument-escrow balance of `holder` in `token`.
    pub fn balance_of(&self, holder: &Address, token: &TokenId) -> u128 {
        self.instrument_escrow.get_token_balance(holder, token)
    }
}

/// Read-only view of one issuance and its ledgers.
#[derive(Clone, Copy)]
pub struct IssuanceView<'a> {
    pub issuance: &'a Issuance,
    pub escrow: &'a EscrowLedger,
    pub line_items: &'a LineItemLedger,
}

/// Non-engagement events routed to [`InstrumentPolicy::handle_event`].
#[derive(Debug, Clone, Copy)]
pub enum IssuanceEvent<'a> {
    /// `deposit_to_issuance`: usually a repayment.
    Deposit { token: TokenId, amount: u128 },
    /// `withdraw_from_issuance`.
    Withdraw { token: TokenId, amount: u128 },
    /// `notify_custom_event`.
    Custom { tag: &'a str, payload: &'a [u8] },
}

/// Product-specific settlement logic.
///
/// Implementations must be deterministic: the same context, view and input
/// always produce the same plan.
pub trait InstrumentPolicy: Send + Sync {
    fn kind(&self) -> InstrumentKind;

    /// Validates maker parameters for a fresh issuance and returns the
    /// initial plan. `issuance` is the not-yet-committed header with empty
    /// ledgers.
    fn validate_create(
        &self,
        ctx: &PolicyContext<'_>,
        issuance: IssuanceView<'_>,
        maker_params: &[u8],
    ) -> Result<MutationPlan, IssuanceError>;

    /// Computes the plan for the caller engaging `issuance` as taker.
    fn compute_engage(
        &self,
        ctx: &PolicyContext<'_>,
        issuance: IssuanceView<'_>,
        taker_params: &[u8],
    ) -> Result<MutationPlan, IssuanceError>;

    /// Decides legality of deposits, withdrawals and custom events.
    fn handle_event(
        &self,
        ctx: &PolicyContext<'_>,
        issuance: IssuanceView<'_>,
        event: IssuanceEvent<'_>,
    ) -> Result<MutationPlan, IssuanceError>;

    /// Answers product-specific `custom_data` tags.
    fn read_custom_data(
        &self,
        _issuance: IssuanceView<'_>,
        tag: &str,
    ) -> Result<Vec<u8>, IssuanceError> {
        Err(IssuanceError::validation(format!(
            "Unknown custom data tag: {tag}"
        )))
    }
}
