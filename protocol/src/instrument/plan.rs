//! # Mutation Plans
//!
//! Policies never touch a ledger. They describe what should happen as a
//! [`MutationPlan`]: an ordered list of line-item and transfer steps plus
//! the resulting state, due timestamps and properties. The manager applies
//! the steps in order to staged copies of the ledgers and commits only if
//! every step succeeds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::issuance::IssuanceState;
use crate::ledger::line_item::NewLineItem;
use crate::types::{Address, TokenId};

/// Which ledgers a transfer crosses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferKind {
    /// Instrument escrow `from` → issuance escrow `to`.
    IntoIssuance,
    /// Issuance escrow `from` → instrument escrow `to`.
    OutOfIssuance,
    /// Between two holders of the issuance escrow.
    WithinIssuance,
    /// Between two holders of the instrument escrow.
    WithinInstrument,
}

/// A single balance movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferInstruction {
    pub kind: TransferKind,
    pub from: Address,
    pub to: Address,
    pub token: TokenId,
    pub amount: u128,
}

impl TransferInstruction {
    pub fn into_issuance(from: Address, to: Address, token: TokenId, amount: u128) -> Self {
        Self {
            kind: TransferKind::IntoIssuance,
            from,
            to,
            token,
            amount,
        }
    }

    pub fn out_of_issuance(from: Address, to: Address, token: TokenId, amount: u128) -> Self {
        Self {
            kind: TransferKind::OutOfIssuance,
            from,
            to,
            token,
            amount,
        }
    }

    pub fn within_issuance(from: Address, to: Address, token: TokenId, amount: u128) -> Self {
        Self {
            kind: TransferKind::WithinIssuance,
            from,
            to,
            token,
            amount,
        }
    }

    pub fn within_instrument(from: Address, to: Address, token: TokenId, amount: u128) -> Self {
        Self {
            kind: TransferKind::WithinInstrument,
            from,
            to,
            token,
            amount,
        }
    }
}

/// One step of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanStep {
    CreateLineItem(NewLineItem),
    ReinitiateLineItem { id: u64, successor: NewLineItem },
    MarkPaid(u64),
    Transfer(TransferInstruction),
}

/// An ordered, deterministic description of an issuance mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationPlan {
    pub steps: Vec<PlanStep>,
    /// State after the plan commits; `None` keeps the current state.
    pub next_state: Option<IssuanceState>,
    pub engagement_due: Option<DateTime<Utc>>,
    pub issuance_due: Option<DateTime<Utc>>,
    /// Replacement properties blob.
    pub properties: Option<Vec<u8>>,
}

impl MutationPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_item(mut self, item: NewLineItem) -> Self {
        self.steps.push(PlanStep::CreateLineItem(item));
        self
    }

    pub fn reinitiate_item(mut self, id: u64, successor: NewLineItem) -> Self {
        self.steps.push(PlanStep::ReinitiateLineItem { id, successor });
        self
    }

    pub fn mark_paid(mut self, id: u64) -> Self {
        self.steps.push(PlanStep::MarkPaid(id));
        self
    }

    pub fn transfer(mut self, transfer: TransferInstruction) -> Self {
        self.steps.push(PlanStep::Transfer(transfer));
        self
    }

    pub fn transition(mut self, state: IssuanceState) -> Self {
        self.next_state = Some(state);
        self
    }

    pub fn engagement_due(mut self, at: DateTime<Utc>) -> Self {
        self.engagement_due = Some(at);
        self
    }

    pub fn issuance_due(mut self, at: DateTime<Utc>) -> Self {
        self.issuance_due = Some(at);
        self
    }

    pub fn properties(mut self, properties: Vec<u8>) -> Self {
        self.properties = Some(properties);
        self
    }

    /// Transfer steps in plan order.
    pub fn transfers(&self) -> impl Iterator<Item = &TransferInstruction> {
        self.steps.iter().filter_map(|s| match s {
            PlanStep::Transfer(t) => Some(t),
            _ => None,
        })
    }
}
