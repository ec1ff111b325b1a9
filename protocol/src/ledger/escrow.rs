//! # Custodial Escrow Ledger
//!
//! An [`EscrowLedger`] is a balance store keyed by `(holder, token)`. Each
//! instrument owns one instrument-level ledger (where makers and takers park
//! funds before and after issuances) and each issuance owns a dedicated
//! issuance-level ledger (where funds sit in custody while the issuance is
//! live).
//!
//! ## Operation Families
//!
//! - **Self-service** (`deposit*` / `withdraw*`): a holder moves value in or
//!   out of the ledger for themselves.
//! - **Privileged** (`*_by_admin`, `transfer*`): only the ledger's admin, the
//!   owning instrument manager, may call these. They move funds between the
//!   instrument-level and issuance-level ledgers and between holders.
//!
//! Every mutating method validates all of its inputs before touching a
//! balance, so it either applies completely or leaves the ledger untouched.
//!
//! ## Conservation
//!
//! The ledger counts everything that entered (`deposited`) and left
//! (`withdrawn`) per token. Internal transfers move value between holders
//! without changing either counter, so at every point in time the sum of
//! balances for a token equals `deposited - withdrawn`. [`EscrowLedger::audit`]
//! checks exactly that.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Address, TokenId, NATIVE_TOKEN};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during escrow operations.
#[derive(Debug, Error)]
pub enum EscrowError {
    /// A holder or token address was left unset.
    #[error("{0} not set")]
    UnsetAddress(&'static str),

    /// Zero-amount operations are rejected; they almost always indicate a
    /// bug in the caller.
    #[error("amount not set")]
    ZeroAmount,

    /// A privileged operation was attempted by someone other than the admin.
    #[error("caller {caller} is not the escrow admin")]
    Unauthorized {
        /// The address that attempted the operation.
        caller: Address,
    },

    /// Attempted to debit more than the available balance.
    #[error("insufficient balance for {holder}: available {available}, requested {requested} (token {token})")]
    InsufficientBalance {
        /// The holder being debited.
        holder: Address,
        /// The token being debited.
        token: TokenId,
        /// The current balance.
        available: u128,
        /// The amount that was requested.
        requested: u128,
    },

    /// A credit would overflow the balance or the ledger totals.
    #[error("balance overflow crediting {amount} of token {token}")]
    Overflow {
        /// The token being credited.
        token: TokenId,
        /// The amount that caused the overflow.
        amount: u128,
    },
}

// ---------------------------------------------------------------------------
// Holdings
// ---------------------------------------------------------------------------

/// One holder's balances plus the tokens they hold, in first-credit order.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct Holdings {
    balances: HashMap<TokenId, u128>,
    /// Tokens with a non-zero balance. A token is appended on the credit
    /// that takes it from zero and removed on the debit that returns it to
    /// zero.
    tokens: Vec<TokenId>,
}

impl Holdings {
    fn balance(&self, token: &TokenId) -> u128 {
        self.balances.get(token).copied().unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// EscrowLedger
// ---------------------------------------------------------------------------

/// A custodial balance store keyed by `(holder, token)`.
///
/// `EscrowLedger` is plain data: it is `Clone` so that the instrument
/// manager can stage a copy, apply a whole mutation plan to it and swap it
/// in on success. Thread safety is handled by the manager's lock.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EscrowLedger {
    /// The ledger's own identity. For issuance ledgers this doubles as the
    /// custodian holder.
    address: Address,

    /// The only caller allowed to use privileged operations.
    admin: Address,

    accounts: HashMap<Address, Holdings>,

    /// Everything ever credited from outside the ledger, per token.
    deposited: HashMap<TokenId, u128>,

    /// Everything ever debited to outside the ledger, per token.
    withdrawn: HashMap<TokenId, u128>,
}

impl EscrowLedger {
    /// Creates an empty ledger at `address`, administered by `admin`.
    pub fn new(address: Address, admin: Address) -> Self {
        Self {
            address,
            admin,
            accounts: HashMap::new(),
            deposited: HashMap::new(),
            withdrawn: HashMap::new(),
        }
    }

    /// Returns the ledger's address.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Returns the admin address.
    pub fn admin(&self) -> Address {
        self.admin
    }

    // -----------------------------------------------------------------------
    // Self-service
    // -----------------------------------------------------------------------

    /// Credits native asset to `holder`. Returns the new balance.
    pub fn deposit(&mut self, holder: Address, amount: u128) -> Result<u128, EscrowError> {
        self.deposit_token(holder, NATIVE_TOKEN, amount)
    }

    /// Credits `token` to `holder`. Returns the new balance.
    ///
    /// # Errors
    ///
    /// [`EscrowError::UnsetAddress`] if holder or token is unset,
    /// [`EscrowError::ZeroAmount`] if `amount` is zero,
    /// [`EscrowError::Overflow`] if the balance or totals would overflow.
    pub fn deposit_token(
        &mut self,
        holder: Address,
        token: TokenId,
        amount: u128,
    ) -> Result<u128, EscrowError> {
        check_args(&holder, &token, amount)?;
        let total = self
            .deposited
            .get(&token)
            .copied()
            .unwrap_or(0)
            .checked_add(amount)
            .ok_or(EscrowError::Overflow { token, amount })?;
        let new_balance = self.credit(holder, token, amount)?;
        self.deposited.insert(token, total);
        Ok(new_balance)
    }

    /// Debits native asset from `holder`. Returns the remaining balance.
    pub fn withdraw(&mut self, holder: Address, amount: u128) -> Result<u128, EscrowError> {
        self.withdraw_token(holder, NATIVE_TOKEN, amount)
    }

    /// Debits `token` from `holder`. Returns the remaining balance.
    ///
    /// # Errors
    ///
    /// [`EscrowError::InsufficientBalance`] if the balance is below `amount`,
    /// plus the argument errors of [`deposit_token`](Self::deposit_token).
    pub fn withdraw_token(
        &mut self,
        holder: Address,
        token: TokenId,
        amount: u128,
    ) -> Result<u128, EscrowError> {
        check_args(&holder, &token, amount)?;
        let remaining = self.debit(holder, token, amount)?;
        // withdrawn <= deposited always holds, so this cannot overflow once
        // the debit above has succeeded.
        *self.withdrawn.entry(token).or_insert(0) += amount;
        Ok(remaining)
    }

    // -----------------------------------------------------------------------
    // Privileged
    // -----------------------------------------------------------------------

    /// Admin-only native credit.
    pub fn deposit_by_admin(
        &mut self,
        caller: &Address,
        holder: Address,
        amount: u128,
    ) -> Result<u128, EscrowError> {
        self.deposit_token_by_admin(caller, holder, NATIVE_TOKEN, amount)
    }

    /// Admin-only native debit.
    pub fn withdraw_by_admin(
        &mut self,
        caller: &Address,
        holder: Address,
        amount: u128,
    ) -> Result<u128, EscrowError> {
        self.withdraw_token_by_admin(caller, holder, NATIVE_TOKEN, amount)
    }

    /// Admin-only token credit. Used when funds leave another ledger owned
    /// by the same manager.
    pub fn deposit_token_by_admin(
        &mut self,
        caller: &Address,
        holder: Address,
        token: TokenId,
        amount: u128,
    ) -> Result<u128, EscrowError> {
        self.check_admin(caller)?;
        self.deposit_token(holder, token, amount)
    }

    /// Admin-only token debit.
    pub fn withdraw_token_by_admin(
        &mut self,
        caller: &Address,
        holder: Address,
        token: TokenId,
        amount: u128,
    ) -> Result<u128, EscrowError> {
        self.check_admin(caller)?;
        self.withdraw_token(holder, token, amount)
    }

    /// Admin-only native move between two holders of this ledger.
    pub fn transfer(
        &mut self,
        caller: &Address,
        from: Address,
        to: Address,
        amount: u128,
    ) -> Result<(), EscrowError> {
        self.transfer_token(caller, from, to, NATIVE_TOKEN, amount)
    }

    /// Admin-only token move between two holders of this ledger.
    ///
    /// Ledger totals are unchanged: value only changes hands.
    pub fn transfer_token(
        &mut self,
        caller: &Address,
        from: Address,
        to: Address,
        token: TokenId,
        amount: u128,
    ) -> Result<(), EscrowError> {
        self.check_admin(caller)?;
        check_args(&from, &token, amount)?;
        if to.is_unset() {
            return Err(EscrowError::UnsetAddress("recipient"));
        }

        let available = self.get_token_balance(&from, &token);
        if available < amount {
            return Err(EscrowError::InsufficientBalance {
                holder: from,
                token,
                available,
                requested: amount,
            });
        }
        if from != to {
            let to_balance = self.get_token_balance(&to, &token);
            if to_balance.checked_add(amount).is_none() {
                return Err(EscrowError::Overflow { token, amount });
            }
        }

        // Both checks passed; neither call below can fail.
        self.debit(from, token, amount)?;
        self.credit(to, token, amount)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Native balance of `holder`.
    pub fn get_balance(&self, holder: &Address) -> u128 {
        self.get_token_balance(holder, &NATIVE_TOKEN)
    }

    /// Token balance of `holder`. Unknown holders and tokens read as zero.
    pub fn get_token_balance(&self, holder: &Address, token: &TokenId) -> u128 {
        self.accounts
            .get(holder)
            .map(|h| h.balance(token))
            .unwrap_or(0)
    }

    /// Tokens `holder` currently has a non-zero balance in, in the order
    /// they were first credited.
    pub fn get_token_list(&self, holder: &Address) -> Vec<TokenId> {
        self.accounts
            .get(holder)
            .map(|h| h.tokens.clone())
            .unwrap_or_default()
    }

    /// Sum of every holder's balance in `token`.
    pub fn total_supply(&self, token: &TokenId) -> u128 {
        self.accounts.values().map(|h| h.balance(token)).sum()
    }

    /// Returns `true` if, for every token ever credited, the sum of balances
    /// equals everything deposited minus everything withdrawn.
    pub fn audit(&self) -> bool {
        self.deposited.iter().all(|(token, deposited)| {
            let withdrawn = self.withdrawn.get(token).copied().unwrap_or(0);
            deposited.checked_sub(withdrawn) == Some(self.total_supply(token))
        })
    }

    // -----------------------------------------------------------------------
    // Internal Helpers
    // -----------------------------------------------------------------------

    fn check_admin(&self, caller: &Address) -> Result<(), EscrowError> {
        if *caller != self.admin {
            return Err(EscrowError::Unauthorized { caller: *caller });
        }
        Ok(())
    }

    fn credit(&mut self, holder: Address, token: TokenId, amount: u128) -> Result<u128, EscrowError> {
        let holdings = self.accounts.entry(holder).or_default();
        let current = holdings.balance(&token);
        let new_balance = current
            .checked_add(amount)
            .ok_or(EscrowError::Overflow { token, amount })?;
        if current == 0 {
            holdings.tokens.push(token);
        }
        holdings.balances.insert(token, new_balance);
        Ok(new_balance)
    }

    fn debit(&mut self, holder: Address, token: TokenId, amount: u128) -> Result<u128, EscrowError> {
        let available = self.get_token_balance(&holder, &token);
        if available < amount {
            return Err(EscrowError::InsufficientBalance {
                holder,
                token,
                available,
                requested: amount,
            });
        }

        let remaining = available - amount;
        let emptied = match self.accounts.get_mut(&holder) {
            Some(holdings) => {
                if remaining == 0 {
                    holdings.balances.remove(&token);
                    holdings.tokens.retain(|t| *t != token);
                } else {
                    holdings.balances.insert(token, remaining);
                }
                holdings.tokens.is_empty()
            }
            None => false,
        };
        if emptied {
            self.accounts.remove(&holder);
        }
        Ok(remaining)
    }
}

fn check_args(holder: &Address, token: &TokenId, amount: u128) -> Result<(), EscrowError> {
    if holder.is_unset() {
        return Err(EscrowError::UnsetAddress("holder"));
    }
    if token.is_unset() {
        return Err(EscrowError::UnsetAddress("token"));
    }
    if amount == 0 {
        return Err(EscrowError::ZeroAmount);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> (EscrowLedger, Address) {
        let admin = Address::from_label("manager");
        (EscrowLedger::new(Address::from_label("escrow"), admin), admin)
    }

    fn alice() -> Address {
        Address::from_label("alice")
    }

    fn bob() -> Address {
        Address::from_label("bob")
    }

    fn usd() -> TokenId {
        Address::from_label("USD")
    }

    #[test]
    fn deposit_credits_balance() {
        let (mut l, _) = ledger();
        assert_eq!(l.deposit(alice(), 500).unwrap(), 500);
        assert_eq!(l.deposit(alice(), 300).unwrap(), 800);
        assert_eq!(l.get_balance(&alice()), 800);
        assert_eq!(l.get_token_list(&alice()), vec![NATIVE_TOKEN]);
    }

    #[test]
    fn deposit_rejects_unset_and_zero() {
        let (mut l, _) = ledger();
        assert!(matches!(
            l.deposit(Address::ZERO, 10),
            Err(EscrowError::UnsetAddress("holder"))
        ));
        assert!(matches!(
            l.deposit_token(alice(), Address::ZERO, 10),
            Err(EscrowError::UnsetAddress("token"))
        ));
        assert!(matches!(l.deposit(alice(), 0), Err(EscrowError::ZeroAmount)));
        assert!(l.get_token_list(&alice()).is_empty());
    }

    #[test]
    fn withdraw_insufficient_leaves_balance() {
        let (mut l, _) = ledger();
        l.deposit_token(alice(), usd(), 100).unwrap();
        let err = l.withdraw_token(alice(), usd(), 200).unwrap_err();
        assert!(matches!(
            err,
            EscrowError::InsufficientBalance {
                available: 100,
                requested: 200,
                ..
            }
        ));
        assert_eq!(l.get_token_balance(&alice(), &usd()), 100);
        assert!(l.audit());
    }

    #[test]
    fn token_list_tracks_insertion_and_removal() {
        let (mut l, _) = ledger();
        l.deposit_token(alice(), usd(), 10).unwrap();
        l.deposit(alice(), 5).unwrap();
        assert_eq!(l.get_token_list(&alice()), vec![usd(), NATIVE_TOKEN]);

        l.withdraw_token(alice(), usd(), 10).unwrap();
        assert_eq!(l.get_token_list(&alice()), vec![NATIVE_TOKEN]);

        // Re-crediting appends at the end again.
        l.deposit_token(alice(), usd(), 1).unwrap();
        assert_eq!(l.get_token_list(&alice()), vec![NATIVE_TOKEN, usd()]);
    }

    #[test]
    fn privileged_ops_require_admin() {
        let (mut l, admin) = ledger();
        let mallory = Address::from_label("mallory");
        assert!(matches!(
            l.deposit_token_by_admin(&mallory, alice(), usd(), 10),
            Err(EscrowError::Unauthorized { .. })
        ));
        l.deposit_token_by_admin(&admin, alice(), usd(), 10).unwrap();
        assert!(matches!(
            l.transfer_token(&mallory, alice(), bob(), usd(), 5),
            Err(EscrowError::Unauthorized { .. })
        ));
        assert!(matches!(
            l.withdraw_by_admin(&mallory, alice(), 1),
            Err(EscrowError::Unauthorized { .. })
        ));
        assert_eq!(l.get_token_balance(&alice(), &usd()), 10);
    }

    #[test]
    fn transfer_moves_value_and_conserves_totals() {
        let (mut l, admin) = ledger();
        l.deposit_token(alice(), usd(), 1_000).unwrap();
        l.transfer_token(&admin, alice(), bob(), usd(), 400).unwrap();

        assert_eq!(l.get_token_balance(&alice(), &usd()), 600);
        assert_eq!(l.get_token_balance(&bob(), &usd()), 400);
        assert_eq!(l.total_supply(&usd()), 1_000);
        assert!(l.audit());
    }

    #[test]
    fn transfer_failures_are_side_effect_free() {
        let (mut l, admin) = ledger();
        l.deposit_token(alice(), usd(), 100).unwrap();

        assert!(l.transfer_token(&admin, alice(), bob(), usd(), 101).is_err());
        assert!(matches!(
            l.transfer_token(&admin, alice(), Address::ZERO, usd(), 1),
            Err(EscrowError::UnsetAddress("recipient"))
        ));
        assert_eq!(l.get_token_balance(&alice(), &usd()), 100);
        assert_eq!(l.get_token_balance(&bob(), &usd()), 0);
        assert!(l.get_token_list(&bob()).is_empty());
    }

    #[test]
    fn overflow_rejected() {
        let (mut l, _) = ledger();
        l.deposit(alice(), u128::MAX).unwrap();
        assert!(matches!(l.deposit(alice(), 1), Err(EscrowError::Overflow { .. })));
        // The totals overflow too, even for a fresh holder.
        assert!(matches!(l.deposit(bob(), 1), Err(EscrowError::Overflow { .. })));
        assert_eq!(l.get_balance(&bob()), 0);
        assert!(l.audit());
    }

    #[test]
    fn audit_holds_across_mixed_operations() {
        let (mut l, admin) = ledger();
        l.deposit_token(alice(), usd(), 5_000).unwrap();
        l.deposit_token_by_admin(&admin, bob(), usd(), 2_000).unwrap();
        l.transfer_token(&admin, bob(), alice(), usd(), 1_500).unwrap();
        l.withdraw_token_by_admin(&admin, alice(), usd(), 6_000).unwrap();
        l.withdraw_token(bob(), usd(), 500).unwrap();

        assert_eq!(l.total_supply(&usd()), 500);
        assert!(l.audit());
    }

    #[test]
    fn ledger_serialization_roundtrip() {
        let (mut l, _) = ledger();
        l.deposit_token(alice(), usd(), 42).unwrap();

        let json = serde_json::to_string(&l).expect("serialize");
        let recovered: EscrowLedger = serde_json::from_str(&json).expect("deserialize");

        assert_eq!(recovered.get_token_balance(&alice(), &usd()), 42);
        assert!(recovered.audit());
    }
}
