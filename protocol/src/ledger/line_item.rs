//! # Supplemental Line Items
//!
//! A line item is a tracked monetary obligation from an *obligor* to a
//! *claimor*. Each issuance keeps its obligations in a [`LineItemLedger`]:
//! an append-only, 1-indexed sequence in which nothing is ever deleted.
//!
//! ## State Machine
//!
//! ```text
//!    ┌──────────┐   mark_paid    ┌──────────┐
//!    │  Unpaid  │───────────────►│   Paid   │
//!    └────┬─────┘                └──────────┘
//!         │ reinitiate
//!    ┌────▼────────┐
//!    │ Reinitiated │ ── reinitiated_to = id of the successor item
//!    └─────────────┘
//! ```
//!
//! Reinitiation replaces an obligation with a successor while keeping the
//! original on record. The forward link is an id, not a pointer; it is set
//! exactly once, and a reinitiated item is frozen from then on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Address, TokenId};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during line item operations.
#[derive(Debug, Error)]
pub enum LineItemError {
    /// No line item with this id exists in the issuance.
    #[error("line item {0} not found")]
    NotFound(u64),

    /// The item was reinitiated and can no longer change.
    #[error("line item {0} is reinitiated and frozen")]
    Frozen(u64),

    /// The item is already settled.
    #[error("line item {0} is already paid")]
    AlreadyPaid(u64),

    /// A field of a new item is invalid (unset party or token, zero amount).
    #[error("invalid line item: {0} not set")]
    InvalidItem(String),
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// What an obligation represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LineItemKind {
    Principal,
    Interest,
    Collateral,
    SwapInput,
    SwapOutput,
}

/// Settlement status of a line item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LineItemState {
    Unpaid,
    Paid,
    Reinitiated,
}

impl std::fmt::Display for LineItemState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LineItemState::Unpaid => write!(f, "Unpaid"),
            LineItemState::Paid => write!(f, "Paid"),
            LineItemState::Reinitiated => write!(f, "Reinitiated"),
        }
    }
}

/// The fields a policy supplies when proposing a new obligation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLineItem {
    pub kind: LineItemKind,
    pub obligor: Address,
    pub claimor: Address,
    pub token: TokenId,
    pub amount: u128,
    pub due: DateTime<Utc>,
}

/// A recorded obligation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplementalLineItem {
    /// 1-based position in the issuance's ledger.
    pub id: u64,
    pub kind: LineItemKind,
    pub state: LineItemState,
    pub obligor: Address,
    pub claimor: Address,
    pub token: TokenId,
    pub amount: u128,
    pub due: DateTime<Utc>,
    /// Id of the successor item, or 0 if this item was never reinitiated.
    pub reinitiated_to: u64,
}

impl SupplementalLineItem {
    /// Returns `true` for items still awaiting settlement.
    pub fn is_unpaid(&self) -> bool {
        self.state == LineItemState::Unpaid
    }
}

// ---------------------------------------------------------------------------
// LineItemLedger
// ---------------------------------------------------------------------------

/// Append-only obligation history for one issuance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LineItemLedger {
    items: Vec<SupplementalLineItem>,
}

impl LineItemLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// The id the next created item will receive.
    pub fn next_id(&self) -> u64 {
        self.items.len() as u64 + 1
    }

    /// Number of items, including reinitiated ones.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if no item has been recorded.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Looks up an item by id.
    pub fn get(&self, id: u64) -> Option<&SupplementalLineItem> {
        if id == 0 {
            return None;
        }
        self.items.get((id - 1) as usize)
    }

    /// All items in creation order.
    pub fn items(&self) -> &[SupplementalLineItem] {
        &self.items
    }

    /// Unpaid items only.
    pub fn unpaid(&self) -> impl Iterator<Item = &SupplementalLineItem> {
        self.items.iter().filter(|i| i.is_unpaid())
    }

    /// Appends a new `Unpaid` item and returns its id.
    ///
    /// # Errors
    ///
    /// [`LineItemError::InvalidItem`] if a party or the token is unset or the
    /// amount is zero.
    pub fn create(&mut self, item: NewLineItem) -> Result<u64, LineItemError> {
        validate(&item)?;
        let id = self.next_id();
        self.items.push(SupplementalLineItem {
            id,
            kind: item.kind,
            state: LineItemState::Unpaid,
            obligor: item.obligor,
            claimor: item.claimor,
            token: item.token,
            amount: item.amount,
            due: item.due,
            reinitiated_to: 0,
        });
        Ok(id)
    }

    /// Marks an `Unpaid` item as `Paid`.
    pub fn mark_paid(&mut self, id: u64) -> Result<(), LineItemError> {
        let item = self.unpaid_mut(id)?;
        item.state = LineItemState::Paid;
        Ok(())
    }

    /// Replaces an `Unpaid` item with `successor`, returning the new id.
    ///
    /// The old item becomes `Reinitiated` and points forward to the new one.
    pub fn reinitiate(&mut self, id: u64, successor: NewLineItem) -> Result<u64, LineItemError> {
        validate(&successor)?;
        self.unpaid_mut(id)?;
        let new_id = self.create(successor)?;
        let old = self.unpaid_mut(id)?;
        old.state = LineItemState::Reinitiated;
        old.reinitiated_to = new_id;
        Ok(new_id)
    }

    /// Follows the reinitiation chain from `id` to its current head.
    pub fn resolve(&self, id: u64) -> Option<&SupplementalLineItem> {
        let mut current = self.get(id)?;
        while current.reinitiated_to != 0 {
            current = self.get(current.reinitiated_to)?;
        }
        Some(current)
    }

    fn unpaid_mut(&mut self, id: u64) -> Result<&mut SupplementalLineItem, LineItemError> {
        if id == 0 {
            return Err(LineItemError::NotFound(id));
        }
        let item = self
            .items
            .get_mut((id - 1) as usize)
            .ok_or(LineItemError::NotFound(id))?;
        match item.state {
            LineItemState::Unpaid => Ok(item),
            LineItemState::Paid => Err(LineItemError::AlreadyPaid(id)),
            LineItemState::Reinitiated => Err(LineItemError::Frozen(id)),
        }
    }
}

fn validate(item: &NewLineItem) -> Result<(), LineItemError> {
    if item.obligor.is_unset() {
        return Err(LineItemError::InvalidItem("obligor".into()));
    }
    if item.claimor.is_unset() {
        return Err(LineItemError::InvalidItem("claimor".into()));
    }
    if item.token.is_unset() {
        return Err(LineItemError::InvalidItem("token".into()));
    }
    if item.amount == 0 {
        return Err(LineItemError::InvalidItem("amount".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(amount: u128) -> NewLineItem {
        NewLineItem {
            kind: LineItemKind::Principal,
            obligor: Address::from_label("custodian"),
            claimor: Address::from_label("maker"),
            token: Address::from_label("L"),
            amount,
            due: Utc::now(),
        }
    }

    #[test]
    fn ids_start_at_one_and_increase() {
        let mut ledger = LineItemLedger::new();
        assert_eq!(ledger.create(item(10)).unwrap(), 1);
        assert_eq!(ledger.create(item(20)).unwrap(), 2);
        assert_eq!(ledger.next_id(), 3);
        assert!(ledger.get(0).is_none());
        assert_eq!(ledger.get(2).unwrap().amount, 20);
    }

    #[test]
    fn invalid_items_rejected() {
        let mut ledger = LineItemLedger::new();
        assert!(matches!(
            ledger.create(item(0)),
            Err(LineItemError::InvalidItem(_))
        ));
        let mut unset = item(5);
        unset.claimor = Address::ZERO;
        assert!(ledger.create(unset).is_err());
        assert!(ledger.is_empty());
    }

    #[test]
    fn reinitiate_links_forward_and_freezes() {
        let mut ledger = LineItemLedger::new();
        let first = ledger.create(item(10)).unwrap();
        let second = ledger.reinitiate(first, item(12)).unwrap();

        let old = ledger.get(first).unwrap();
        assert_eq!(old.state, LineItemState::Reinitiated);
        assert_eq!(old.reinitiated_to, second);
        assert_eq!(old.amount, 10);

        assert!(matches!(ledger.mark_paid(first), Err(LineItemError::Frozen(1))));
        assert!(matches!(
            ledger.reinitiate(first, item(1)),
            Err(LineItemError::Frozen(1))
        ));
        // The failed reinitiation did not append anything.
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.get(first).unwrap().reinitiated_to, second);
    }

    #[test]
    fn resolve_follows_chain() {
        let mut ledger = LineItemLedger::new();
        let a = ledger.create(item(1)).unwrap();
        let b = ledger.reinitiate(a, item(2)).unwrap();
        let c = ledger.reinitiate(b, item(3)).unwrap();
        assert_eq!(ledger.resolve(a).unwrap().id, c);
        assert_eq!(ledger.resolve(c).unwrap().amount, 3);
    }

    #[test]
    fn paid_items_cannot_be_paid_twice() {
        let mut ledger = LineItemLedger::new();
        let id = ledger.create(item(10)).unwrap();
        ledger.mark_paid(id).unwrap();
        assert!(matches!(ledger.mark_paid(id), Err(LineItemError::AlreadyPaid(1))));
        assert_eq!(ledger.unpaid().count(), 0);
    }

    #[test]
    fn reinitiate_with_invalid_successor_is_side_effect_free() {
        let mut ledger = LineItemLedger::new();
        let id = ledger.create(item(10)).unwrap();
        assert!(ledger.reinitiate(id, item(0)).is_err());
        assert_eq!(ledger.get(id).unwrap().state, LineItemState::Unpaid);
        assert_eq!(ledger.len(), 1);
    }
}
