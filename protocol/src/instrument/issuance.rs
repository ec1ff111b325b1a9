//! # Issuances
//!
//! An issuance is one bilateral deal on an instrument: a maker's offer, the
//! taker who engages it, and everything held in custody in between.
//!
//! ## State Machine
//!
//! ```text
//!                 ┌────────────┐
//!                 │ Engageable │
//!                 └─┬──┬──┬──┬─┘
//!        engage     │  │  │  └──────────────► Cancelled
//!   ┌───────────────┘  │  └─────────────────► CompleteNotEngaged
//!   │                  └────────────────────► CompleteEngaged (instant settlement)
//! ┌─▼───────┐
//! │ Engaged │──────► CompleteRepaid
//! └────┬────┘
//!      └───────────► Delinquent
//! ```
//!
//! Everything except `Engageable` and `Engaged` is terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Address;

/// Lifecycle state of an issuance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IssuanceState {
    /// Offer is open and waiting for a taker.
    Engageable,
    /// A taker has engaged; obligations are outstanding.
    Engaged,
    /// Settled at engagement time (spot products).
    CompleteEngaged,
    /// The engagement window lapsed with no taker.
    CompleteNotEngaged,
    /// All obligations repaid.
    CompleteRepaid,
    /// Withdrawn by the maker before engagement.
    Cancelled,
    /// An obligation was not met by its due timestamp.
    Delinquent,
}

impl IssuanceState {
    /// Returns `true` if no further mutation is accepted.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, IssuanceState::Engageable | IssuanceState::Engaged)
    }

    /// Returns `true` if moving from `self` to `next` follows the state
    /// machine. Staying in the same non-terminal state is allowed; plans
    /// for partial withdrawals and similar adjustments don't transition.
    pub fn can_transition_to(&self, next: IssuanceState) -> bool {
        use IssuanceState::*;
        match (self, next) {
            (a, b) if *a == b => !a.is_terminal(),
            (Engageable, Engaged)
            | (Engageable, CompleteEngaged)
            | (Engageable, CompleteNotEngaged)
            | (Engageable, Cancelled) => true,
            (Engaged, CompleteRepaid) | (Engaged, Delinquent) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for IssuanceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IssuanceState::Engageable => write!(f, "Engageable"),
            IssuanceState::Engaged => write!(f, "Engaged"),
            IssuanceState::CompleteEngaged => write!(f, "CompleteEngaged"),
            IssuanceState::CompleteNotEngaged => write!(f, "CompleteNotEngaged"),
            IssuanceState::CompleteRepaid => write!(f, "CompleteRepaid"),
            IssuanceState::Cancelled => write!(f, "Cancelled"),
            IssuanceState::Delinquent => write!(f, "Delinquent"),
        }
    }
}

/// Issuance header: parties, state, timestamps and the product properties
/// blob. Balances and obligations live in the issuance's own ledgers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issuance {
    /// Monotonic id within the instrument, starting at 1.
    pub id: u64,
    pub maker: Address,
    /// Unset until a taker engages.
    pub taker: Address,
    pub state: IssuanceState,
    /// Address of the issuance-level escrow. Also the custodian holder
    /// inside that escrow.
    pub escrow_address: Address,
    pub created_at: DateTime<Utc>,
    pub engaged_at: Option<DateTime<Utc>>,
    /// Deadline for a taker to engage.
    pub engagement_due: Option<DateTime<Utc>>,
    /// Deadline for the engaged obligations.
    pub issuance_due: Option<DateTime<Utc>>,
    /// Product-specific properties, encoded by the owning policy.
    pub properties: Vec<u8>,
}

impl Issuance {
    /// The custody identity for this issuance.
    pub fn custodian(&self) -> Address {
        self.escrow_address
    }

    pub fn is_terminated(&self) -> bool {
        self.state.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use IssuanceState::*;

    #[test]
    fn terminal_states() {
        assert!(!Engageable.is_terminal());
        assert!(!Engaged.is_terminal());
        for s in [CompleteEngaged, CompleteNotEngaged, CompleteRepaid, Cancelled, Delinquent] {
            assert!(s.is_terminal(), "{s} should be terminal");
        }
    }

    #[test]
    fn transitions_are_one_directional() {
        assert!(Engageable.can_transition_to(Engaged));
        assert!(Engageable.can_transition_to(Cancelled));
        assert!(Engaged.can_transition_to(CompleteRepaid));
        assert!(Engaged.can_transition_to(Delinquent));
        assert!(Engaged.can_transition_to(Engaged));

        assert!(!Engaged.can_transition_to(Engageable));
        assert!(!Engaged.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Cancelled));
        assert!(!CompleteRepaid.can_transition_to(Engaged));
    }

    #[test]
    fn engageable_cannot_skip_engagement() {
        assert!(Engageable.can_transition_to(CompleteEngaged));
        assert!(Engageable.can_transition_to(CompleteNotEngaged));
        assert!(!Engageable.can_transition_to(CompleteRepaid));
        assert!(!Engageable.can_transition_to(Delinquent));
        assert!(!Engaged.can_transition_to(CompleteEngaged));
        assert!(!Engaged.can_transition_to(CompleteNotEngaged));
    }
}
