//! # Engine Error Taxonomy
//!
//! Every rejected operation surfaces as an [`IssuanceError`] in one of four
//! categories, each carrying a human-readable reason:
//!
//! - **Validation**: a missing or out-of-range parameter.
//! - **Authorization**: the caller is not the FSP, not whitelisted, or not
//!   the maker/taker the operation requires.
//! - **State**: the issuance is missing, terminated, or in the wrong state.
//! - **InsufficientFunds**: a balance check failed.
//!
//! Lower layers ([`EscrowError`], [`LineItemError`], [`CodecError`]) keep
//! their own structured variants and are folded into this taxonomy by the
//! `From` impls below. All errors are raised before the manager commits, so
//! a rejected operation never leaves partial state behind.

use std::fmt;

use thiserror::Error;

use crate::codec::CodecError;
use crate::ledger::escrow::EscrowError;
use crate::ledger::line_item::LineItemError;

/// The category of an [`IssuanceError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Authorization,
    State,
    InsufficientFunds,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::Authorization => write!(f, "authorization"),
            ErrorKind::State => write!(f, "state"),
            ErrorKind::InsufficientFunds => write!(f, "insufficient_funds"),
        }
    }
}

/// Errors returned by instrument managers and policies.
#[derive(Debug, Error)]
pub enum IssuanceError {
    /// A parameter is missing or outside its allowed range.
    #[error("validation error: {0}")]
    Validation(String),

    /// The caller lacks the role the operation requires.
    #[error("authorization error: {0}")]
    Authorization(String),

    /// The issuance is missing, terminated or in the wrong state.
    #[error("state error: {0}")]
    State(String),

    /// A balance check failed.
    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    /// A custom-data blob could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

impl IssuanceError {
    pub fn validation(reason: impl Into<String>) -> Self {
        IssuanceError::Validation(reason.into())
    }

    pub fn authorization(reason: impl Into<String>) -> Self {
        IssuanceError::Authorization(reason.into())
    }

    pub fn state(reason: impl Into<String>) -> Self {
        IssuanceError::State(reason.into())
    }

    pub fn insufficient(reason: impl Into<String>) -> Self {
        IssuanceError::InsufficientFunds(reason.into())
    }

    /// Returns the taxonomy category. Codec failures count as validation
    /// errors: the caller handed in bytes that don't parse.
    pub fn kind(&self) -> ErrorKind {
        match self {
            IssuanceError::Validation(_) | IssuanceError::Codec(_) => ErrorKind::Validation,
            IssuanceError::Authorization(_) => ErrorKind::Authorization,
            IssuanceError::State(_) => ErrorKind::State,
            IssuanceError::InsufficientFunds(_) => ErrorKind::InsufficientFunds,
        }
    }

    /// Returns the bare reason string without the category prefix.
    pub fn reason(&self) -> String {
        match self {
            IssuanceError::Validation(r)
            | IssuanceError::Authorization(r)
            | IssuanceError::State(r)
            | IssuanceError::InsufficientFunds(r) => r.clone(),
            IssuanceError::Codec(e) => e.to_string(),
        }
    }
}

impl From<EscrowError> for IssuanceError {
    fn from(err: EscrowError) -> Self {
        match err {
            EscrowError::UnsetAddress(_) | EscrowError::ZeroAmount | EscrowError::Overflow { .. } => {
                IssuanceError::Validation(err.to_string())
            }
            EscrowError::Unauthorized { .. } => IssuanceError::Authorization(err.to_string()),
            EscrowError::InsufficientBalance { .. } => {
                IssuanceError::InsufficientFunds(err.to_string())
            }
        }
    }
}

impl From<LineItemError> for IssuanceError {
    fn from(err: LineItemError) -> Self {
        match err {
            LineItemError::InvalidItem(_) => IssuanceError::Validation(err.to_string()),
            LineItemError::NotFound(_) | LineItemError::Frozen(_) | LineItemError::AlreadyPaid(_) => {
                IssuanceError::State(err.to_string())
            }
        }
    }
}
