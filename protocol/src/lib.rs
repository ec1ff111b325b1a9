// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # FSP Protocol: Core Library
//!
//! The issuance lifecycle engine for financial service providers (FSPs).
//! An FSP activates an *instrument* (a lending, borrowing, spot-swap or
//! saving product); makers post *issuances* on it, takers engage them, and
//! the engine keeps custody, obligations and state consistent from creation
//! to settlement.
//!
//! ## Architecture
//!
//! - **ledger**: Custodial escrow balances and line-item obligations.
//! - **instrument**: Issuance state machine, the policy trait, the
//!   per-instrument manager and the registry.
//! - **oracle**: Exchange rates consumed by policies.
//! - **codec**: Versioned serialization of issuance snapshots.
//! - **clock**: Injectable time source.
//! - **types**: Addresses and token ids.
//! - **config**: Protocol constants and event tags.
//! - **error**: The error taxonomy every operation reports through.
//!
//! ## Ground Rules
//!
//! 1. Every mutating operation is all-or-nothing.
//! 2. Amounts are `u128` and never go negative.
//! 3. Policies decide; only managers write.

pub mod clock;
pub mod codec;
pub mod config;
pub mod error;
pub mod instrument;
pub mod ledger;
pub mod oracle;
pub mod types;

pub use error::{ErrorKind, IssuanceError};
pub use types::{Address, TokenId, NATIVE_TOKEN};
