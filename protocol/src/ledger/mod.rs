//! # Ledger Module: Custody and Obligations
//!
//! The two books every issuance keeps:
//!
//! ```text
//! escrow.rs     - custodial (holder, token) balance store
//! line_item.rs  - append-only obligation history with reinitiation chains
//! ```
//!
//! Neither ledger knows about issuances, policies or state machines. They
//! enforce their own local invariants (non-negative balances, conservation,
//! frozen reinitiated items) and leave orchestration to the instrument
//! manager.

pub mod escrow;
pub mod line_item;

pub use escrow::{EscrowError, EscrowLedger};
pub use line_item::{
    LineItemError, LineItemKind, LineItemLedger, LineItemState, NewLineItem, SupplementalLineItem,
};
