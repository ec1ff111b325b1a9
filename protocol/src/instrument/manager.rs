//! # Instrument Manager
//!
//! One manager per activated instrument. It owns the instrument-level
//! escrow, every issuance (header, issuance-level escrow, line items) and
//! the instrument's administrative state, and it is the only component that
//! mutates any of them.
//!
//! ## Atomicity
//!
//! A single `parking_lot::Mutex` guards the whole manager state, so every
//! public operation is one critical section. Inside it the manager:
//!
//! 1. checks engine-level preconditions (existence, terminal state, roles),
//! 2. asks the policy for a [`MutationPlan`] against read-only views,
//! 3. applies the plan to *staged clones* of the instrument escrow and the
//!    issuance record,
//! 4. swaps the clones in only if every step succeeded.
//!
//! A failure anywhere before step 4 drops the clones, so a rejected
//! operation leaves no trace.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::issuance::{Issuance, IssuanceState};
use super::plan::{MutationPlan, PlanStep, TransferInstruction, TransferKind};
use super::policy::{InstrumentKind, InstrumentPolicy, IssuanceEvent, IssuanceView, PolicyContext};
use crate::clock::Clock;
use crate::codec::{IssuanceCodec, IssuanceSnapshot};
use crate::config::{ISSUANCE_STATE_TAG, REASON_TERMINATED};
use crate::error::IssuanceError;
use crate::ledger::escrow::EscrowLedger;
use crate::ledger::line_item::{LineItemLedger, SupplementalLineItem};
use crate::oracle::PriceOracle;
use crate::types::{Address, TokenId};

/// Unique identifier of an activated instrument.
pub type InstrumentId = Uuid;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Fee charged to a maker on their first issuance on an instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreationFee {
    pub token: TokenId,
    pub amount: u128,
}

/// Activation parameters for an instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentConfig {
    /// The operator (FSP).
    pub fsp: Address,
    /// No new issuances after this instant.
    #[serde(default)]
    pub terminates_at: Option<DateTime<Utc>>,
    /// After this instant the FSP may act for makers and takers in custom
    /// events.
    #[serde(default)]
    pub override_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub maker_whitelist_enabled: bool,
    #[serde(default)]
    pub taker_whitelist_enabled: bool,
    #[serde(default)]
    pub creation_fee: Option<CreationFee>,
}

impl InstrumentConfig {
    /// An open instrument: no whitelists, no deadlines, no fee.
    pub fn new(fsp: Address) -> Self {
        Self {
            fsp,
            terminates_at: None,
            override_at: None,
            maker_whitelist_enabled: false,
            taker_whitelist_enabled: false,
            creation_fee: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Receipts
// ---------------------------------------------------------------------------

/// Outcome of a committed issuance operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuanceReceipt {
    pub instrument_id: InstrumentId,
    pub issuance_id: u64,
    pub escrow_address: Address,
    pub state: IssuanceState,
    /// Transfers applied, in order.
    pub transfers: Vec<TransferInstruction>,
    /// Ids of line items created by this operation.
    pub created_line_items: Vec<u64>,
}

// ---------------------------------------------------------------------------
// Internal State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct IssuanceRecord {
    issuance: Issuance,
    escrow: EscrowLedger,
    line_items: LineItemLedger,
}

impl IssuanceRecord {
    fn view(&self) -> IssuanceView<'_> {
        IssuanceView {
            issuance: &self.issuance,
            escrow: &self.escrow,
            line_items: &self.line_items,
        }
    }
}

struct ManagerState {
    config: InstrumentConfig,
    deactivated: bool,
    maker_whitelist: HashSet<Address>,
    taker_whitelist: HashSet<Address>,
    /// Makers who already paid the creation fee.
    fee_payers: HashSet<Address>,
    escrow: EscrowLedger,
    issuances: BTreeMap<u64, IssuanceRecord>,
    last_issuance_id: u64,
}

/// Which public entry point is driving a mutation.
enum Operation<'a> {
    Engage(&'a [u8]),
    Event(IssuanceEvent<'a>),
}

impl Operation<'_> {
    fn name(&self) -> &'static str {
        match self {
            Operation::Engage(_) => "engage_issuance",
            Operation::Event(IssuanceEvent::Deposit { .. }) => "deposit_to_issuance",
            Operation::Event(IssuanceEvent::Withdraw { .. }) => "withdraw_from_issuance",
            Operation::Event(IssuanceEvent::Custom { .. }) => "notify_custom_event",
        }
    }
}

// ---------------------------------------------------------------------------
// InstrumentManager
// ---------------------------------------------------------------------------

/// Orchestrates policy, escrow ledgers and line items for one instrument.
pub struct InstrumentManager {
    id: InstrumentId,
    /// Admin identity on every escrow this manager owns.
    address: Address,
    policy: Arc<dyn InstrumentPolicy>,
    oracle: Arc<dyn PriceOracle>,
    clock: Arc<dyn Clock>,
    codec: Arc<dyn IssuanceCodec>,
    state: Mutex<ManagerState>,
}

impl fmt::Debug for InstrumentManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstrumentManager")
            .field("id", &self.id)
            .field("kind", &self.policy.kind())
            .field("issuances", &self.issuance_count())
            .finish()
    }
}

impl InstrumentManager {
    /// Creates a manager. Normally called through the registry.
    pub fn new(
        id: InstrumentId,
        policy: Arc<dyn InstrumentPolicy>,
        config: InstrumentConfig,
        oracle: Arc<dyn PriceOracle>,
        clock: Arc<dyn Clock>,
        codec: Arc<dyn IssuanceCodec>,
    ) -> Self {
        let address = Address::derive(&[b"instrument-manager".as_slice(), id.as_bytes().as_slice()]);
        let escrow_address = Address::derive(&[b"instrument-escrow".as_slice(), id.as_bytes().as_slice()]);
        Self {
            id,
            address,
            policy,
            oracle,
            clock,
            codec,
            state: Mutex::new(ManagerState {
                config,
                deactivated: false,
                maker_whitelist: HashSet::new(),
                taker_whitelist: HashSet::new(),
                fee_payers: HashSet::new(),
                escrow: EscrowLedger::new(escrow_address, address),
                issuances: BTreeMap::new(),
                last_issuance_id: 0,
            }),
        }
    }

    pub fn id(&self) -> InstrumentId {
        self.id
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn kind(&self) -> InstrumentKind {
        self.policy.kind()
    }

    pub fn fsp(&self) -> Address {
        self.state.lock().config.fsp
    }

    // -----------------------------------------------------------------------
    // Issuance Lifecycle
    // -----------------------------------------------------------------------

    /// Creates a new issuance from the caller's maker parameters.
    ///
    /// # Errors
    ///
    /// - [`IssuanceError::State`] if the instrument is deactivated or past
    ///   its termination timestamp.
    /// - [`IssuanceError::Authorization`] if the maker whitelist is enabled
    ///   and the caller is neither the FSP nor whitelisted.
    /// - Any error the policy or the plan application raises.
    pub fn create_issuance(
        &self,
        caller: &Address,
        maker_params: &[u8],
    ) -> Result<IssuanceReceipt, IssuanceError> {
        let now = self.clock.now();
        let mut state = self.state.lock();

        let result = self.create_locked(&mut state, caller, maker_params, now);
        match &result {
            Ok(receipt) => tracing::info!(
                instrument = %self.id,
                issuance_id = receipt.issuance_id,
                maker = %caller,
                state = %receipt.state,
                "issuance created"
            ),
            Err(err) => tracing::warn!(
                instrument = %self.id,
                maker = %caller,
                error = %err,
                "create_issuance rejected"
            ),
        }
        result
    }

    /// Engages an `Engageable` issuance as taker.
    pub fn engage_issuance(
        &self,
        caller: &Address,
        issuance_id: u64,
        taker_params: &[u8],
    ) -> Result<IssuanceReceipt, IssuanceError> {
        self.mutate(caller, issuance_id, Operation::Engage(taker_params))
    }

    /// Deposits into an issuance: repayments and similar adjustments.
    pub fn deposit_to_issuance(
        &self,
        caller: &Address,
        issuance_id: u64,
        token: TokenId,
        amount: u128,
    ) -> Result<IssuanceReceipt, IssuanceError> {
        if amount == 0 {
            return Err(IssuanceError::validation("Amount not set"));
        }
        self.mutate(
            caller,
            issuance_id,
            Operation::Event(IssuanceEvent::Deposit { token, amount }),
        )
    }

    /// Withdraws from an issuance.
    pub fn withdraw_from_issuance(
        &self,
        caller: &Address,
        issuance_id: u64,
        token: TokenId,
        amount: u128,
    ) -> Result<IssuanceReceipt, IssuanceError> {
        if amount == 0 {
            return Err(IssuanceError::validation("Amount not set"));
        }
        self.mutate(
            caller,
            issuance_id,
            Operation::Event(IssuanceEvent::Withdraw { token, amount }),
        )
    }

    /// Routes an externally triggered event (cancellation, due dates).
    pub fn notify_custom_event(
        &self,
        caller: &Address,
        issuance_id: u64,
        event_tag: &str,
        payload: &[u8],
    ) -> Result<IssuanceReceipt, IssuanceError> {
        self.mutate(
            caller,
            issuance_id,
            Operation::Event(IssuanceEvent::Custom {
                tag: event_tag,
                payload,
            }),
        )
    }

    // -----------------------------------------------------------------------
    // Administration
    // -----------------------------------------------------------------------

    /// Adds or removes `maker` from the maker whitelist.
    pub fn set_maker_whitelist(
        &self,
        caller: &Address,
        maker: Address,
        allowed: bool,
    ) -> Result<(), IssuanceError> {
        let mut state = self.state.lock();
        check_operator(&state, caller)?;
        if maker.is_unset() {
            return Err(IssuanceError::validation("Maker not set"));
        }
        if allowed {
            state.maker_whitelist.insert(maker);
        } else {
            state.maker_whitelist.remove(&maker);
        }
        tracing::info!(instrument = %self.id, %maker, allowed, "maker whitelist updated");
        Ok(())
    }

    /// Adds or removes `taker` from the taker whitelist.
    pub fn set_taker_whitelist(
        &self,
        caller: &Address,
        taker: Address,
        allowed: bool,
    ) -> Result<(), IssuanceError> {
        let mut state = self.state.lock();
        check_operator(&state, caller)?;
        if taker.is_unset() {
            return Err(IssuanceError::validation("Taker not set"));
        }
        if allowed {
            state.taker_whitelist.insert(taker);
        } else {
            state.taker_whitelist.remove(&taker);
        }
        tracing::info!(instrument = %self.id, %taker, allowed, "taker whitelist updated");
        Ok(())
    }

    /// Turns maker whitelist enforcement on or off.
    pub fn set_maker_whitelist_enabled(
        &self,
        caller: &Address,
        enabled: bool,
    ) -> Result<(), IssuanceError> {
        let mut state = self.state.lock();
        check_operator(&state, caller)?;
        state.config.maker_whitelist_enabled = enabled;
        Ok(())
    }

    /// Turns taker whitelist enforcement on or off.
    pub fn set_taker_whitelist_enabled(
        &self,
        caller: &Address,
        enabled: bool,
    ) -> Result<(), IssuanceError> {
        let mut state = self.state.lock();
        check_operator(&state, caller)?;
        state.config.taker_whitelist_enabled = enabled;
        Ok(())
    }

    /// Permanently stops new issuance creation. Existing issuances keep
    /// running their lifecycle.
    pub fn deactivate(&self, caller: &Address) -> Result<(), IssuanceError> {
        let mut state = self.state.lock();
        check_operator(&state, caller)?;
        if state.deactivated {
            return Err(IssuanceError::state("Instrument deactivated"));
        }
        state.deactivated = true;
        tracing::info!(instrument = %self.id, "instrument deactivated");
        Ok(())
    }

    pub fn is_deactivated(&self) -> bool {
        self.state.lock().deactivated
    }

    // -----------------------------------------------------------------------
    // Instrument Escrow (self-service)
    // -----------------------------------------------------------------------

    /// Credits the caller's instrument-escrow balance.
    pub fn deposit_to_escrow(
        &self,
        caller: &Address,
        token: TokenId,
        amount: u128,
    ) -> Result<u128, IssuanceError> {
        let mut state = self.state.lock();
        let balance = state.escrow.deposit_token(*caller, token, amount)?;
        tracing::debug!(instrument = %self.id, holder = %caller, %token, amount, "escrow deposit");
        Ok(balance)
    }

    /// Debits the caller's instrument-escrow balance.
    pub fn withdraw_from_escrow(
        &self,
        caller: &Address,
        token: TokenId,
        amount: u128,
    ) -> Result<u128, IssuanceError> {
        let mut state = self.state.lock();
        let balance = state.escrow.withdraw_token(*caller, token, amount)?;
        tracing::debug!(instrument = %self.id, holder = %caller, %token, amount, "escrow withdrawal");
        Ok(balance)
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn instrument_escrow_address(&self) -> Address {
        self.state.lock().escrow.address()
    }

    pub fn escrow_balance(&self, holder: &Address, token: &TokenId) -> u128 {
        self.state.lock().escrow.get_token_balance(holder, token)
    }

    pub fn escrow_token_list(&self, holder: &Address) -> Vec<TokenId> {
        self.state.lock().escrow.get_token_list(holder)
    }

    pub fn issuance_count(&self) -> u64 {
        self.state.lock().last_issuance_id
    }

    pub fn issuance(&self, issuance_id: u64) -> Result<Issuance, IssuanceError> {
        let state = self.state.lock();
        Ok(find(&state, issuance_id)?.issuance.clone())
    }

    pub fn line_items(&self, issuance_id: u64) -> Result<Vec<SupplementalLineItem>, IssuanceError> {
        let state = self.state.lock();
        Ok(find(&state, issuance_id)?.line_items.items().to_vec())
    }

    /// Balance of `holder` inside an issuance's escrow.
    pub fn issuance_escrow_balance(
        &self,
        issuance_id: u64,
        holder: &Address,
        token: &TokenId,
    ) -> Result<u128, IssuanceError> {
        let state = self.state.lock();
        Ok(find(&state, issuance_id)?.escrow.get_token_balance(holder, token))
    }

    /// Returns custom data for an issuance.
    ///
    /// [`ISSUANCE_STATE_TAG`] yields the codec-encoded snapshot; any other
    /// tag is answered by the policy.
    pub fn custom_data(&self, issuance_id: u64, tag: &str) -> Result<Vec<u8>, IssuanceError> {
        let state = self.state.lock();
        let record = find(&state, issuance_id)?;
        if tag == ISSUANCE_STATE_TAG {
            let snapshot = IssuanceSnapshot {
                issuance: record.issuance.clone(),
                line_items: record.line_items.items().to_vec(),
            };
            return Ok(self.codec.encode(&snapshot)?);
        }
        self.policy.read_custom_data(record.view(), tag)
    }

    /// Decodes a blob produced by `custom_data(_, ISSUANCE_STATE_TAG)`.
    pub fn decode_snapshot(&self, bytes: &[u8]) -> Result<IssuanceSnapshot, IssuanceError> {
        Ok(self.codec.decode(bytes)?)
    }

    /// Conservation check over the instrument escrow and every issuance
    /// escrow.
    pub fn audit(&self) -> bool {
        let state = self.state.lock();
        state.escrow.audit() && state.issuances.values().all(|r| r.escrow.audit())
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn context<'a>(
        &'a self,
        state: &'a ManagerState,
        caller: &Address,
        now: DateTime<Utc>,
    ) -> PolicyContext<'a> {
        PolicyContext {
            caller: *caller,
            now,
            fsp: state.config.fsp,
            override_active: state.config.override_at.is_some_and(|at| now >= at),
            oracle: self.oracle.as_ref(),
            instrument_escrow: &state.escrow,
        }
    }

    fn create_locked(
        &self,
        state: &mut ManagerState,
        caller: &Address,
        maker_params: &[u8],
        now: DateTime<Utc>,
    ) -> Result<IssuanceReceipt, IssuanceError> {
        if state.deactivated {
            return Err(IssuanceError::state("Instrument deactivated"));
        }
        if state.config.terminates_at.is_some_and(|at| now >= at) {
            return Err(IssuanceError::state("Instrument terminated"));
        }
        if state.config.maker_whitelist_enabled
            && *caller != state.config.fsp
            && !state.maker_whitelist.contains(caller)
        {
            return Err(IssuanceError::authorization("Maker not allowed"));
        }

        let issuance_id = state.last_issuance_id + 1;
        let escrow_address = Address::derive(&[
            b"issuance-escrow".as_slice(),
            self.id.as_bytes().as_slice(),
            issuance_id.to_be_bytes().as_slice(),
        ]);
        let mut record = IssuanceRecord {
            issuance: Issuance {
                id: issuance_id,
                maker: *caller,
                taker: Address::ZERO,
                state: IssuanceState::Engageable,
                escrow_address,
                created_at: now,
                engaged_at: None,
                engagement_due: None,
                issuance_due: None,
                properties: Vec::new(),
            },
            escrow: EscrowLedger::new(escrow_address, self.address),
            line_items: LineItemLedger::new(),
        };

        let mut plan = {
            let ctx = self.context(state, caller, now);
            self.policy.validate_create(&ctx, record.view(), maker_params)?
        };

        let charge_fee = match &state.config.creation_fee {
            Some(fee) if !state.fee_payers.contains(caller) => {
                plan = plan.transfer(TransferInstruction::within_instrument(
                    *caller,
                    state.config.fsp,
                    fee.token,
                    fee.amount,
                ));
                true
            }
            _ => false,
        };

        let mut staged_escrow = state.escrow.clone();
        let created = self.apply(&mut staged_escrow, &mut record, &plan)?;

        // Commit.
        state.escrow = staged_escrow;
        state.last_issuance_id = issuance_id;
        if charge_fee {
            state.fee_payers.insert(*caller);
        }
        let receipt = self.receipt(&record, &plan, created);
        state.issuances.insert(issuance_id, record);
        Ok(receipt)
    }

    fn mutate(
        &self,
        caller: &Address,
        issuance_id: u64,
        op: Operation<'_>,
    ) -> Result<IssuanceReceipt, IssuanceError> {
        let now = self.clock.now();
        let mut state = self.state.lock();

        let result = self.mutate_locked(&mut state, caller, issuance_id, &op, now);
        match &result {
            Ok(receipt) => tracing::info!(
                instrument = %self.id,
                issuance_id,
                caller = %caller,
                operation = op.name(),
                state = %receipt.state,
                "issuance updated"
            ),
            Err(err) => tracing::warn!(
                instrument = %self.id,
                issuance_id,
                caller = %caller,
                operation = op.name(),
                error = %err,
                "operation rejected"
            ),
        }
        result
    }

    fn mutate_locked(
        &self,
        state: &mut ManagerState,
        caller: &Address,
        issuance_id: u64,
        op: &Operation<'_>,
        now: DateTime<Utc>,
    ) -> Result<IssuanceReceipt, IssuanceError> {
        let record = find(state, issuance_id)?;
        if record.issuance.is_terminated() {
            return Err(IssuanceError::state(REASON_TERMINATED));
        }

        let plan = {
            let ctx = self.context(state, caller, now);
            match op {
                Operation::Engage(params) => {
                    if record.issuance.state != IssuanceState::Engageable {
                        return Err(IssuanceError::state("Issuance not engageable"));
                    }
                    if state.config.taker_whitelist_enabled
                        && *caller != state.config.fsp
                        && !state.taker_whitelist.contains(caller)
                    {
                        return Err(IssuanceError::authorization("Taker not allowed"));
                    }
                    self.policy.compute_engage(&ctx, record.view(), params)?
                }
                Operation::Event(event) => self.policy.handle_event(&ctx, record.view(), *event)?,
            }
        };

        let mut staged_escrow = state.escrow.clone();
        let mut staged = record.clone();
        if let Operation::Engage(_) = op {
            staged.issuance.taker = *caller;
            staged.issuance.engaged_at = Some(now);
        }
        let created = self.apply(&mut staged_escrow, &mut staged, &plan)?;

        // Commit.
        state.escrow = staged_escrow;
        let receipt = self.receipt(&staged, &plan, created);
        state.issuances.insert(issuance_id, staged);
        Ok(receipt)
    }

    /// Applies `plan` to staged copies. Returns the ids of created items.
    fn apply(
        &self,
        instrument_escrow: &mut EscrowLedger,
        record: &mut IssuanceRecord,
        plan: &MutationPlan,
    ) -> Result<Vec<u64>, IssuanceError> {
        let mut created = Vec::new();
        for step in &plan.steps {
            tracing::debug!(
                instrument = %self.id,
                issuance_id = record.issuance.id,
                ?step,
                "applying plan step"
            );
            match step {
                PlanStep::CreateLineItem(item) => {
                    created.push(record.line_items.create(item.clone())?);
                }
                PlanStep::ReinitiateLineItem { id, successor } => {
                    created.push(record.line_items.reinitiate(*id, successor.clone())?);
                }
                PlanStep::MarkPaid(id) => record.line_items.mark_paid(*id)?,
                PlanStep::Transfer(t) => self.apply_transfer(instrument_escrow, &mut record.escrow, t)?,
            }
        }

        if let Some(next) = plan.next_state {
            if !record.issuance.state.can_transition_to(next) {
                return Err(IssuanceError::state(format!(
                    "Invalid transition from {} to {}",
                    record.issuance.state, next
                )));
            }
            record.issuance.state = next;
        }
        if let Some(at) = plan.engagement_due {
            record.issuance.engagement_due = Some(at);
        }
        if let Some(at) = plan.issuance_due {
            record.issuance.issuance_due = Some(at);
        }
        if let Some(props) = &plan.properties {
            record.issuance.properties = props.clone();
        }
        Ok(created)
    }

    fn apply_transfer(
        &self,
        instrument_escrow: &mut EscrowLedger,
        issuance_escrow: &mut EscrowLedger,
        t: &TransferInstruction,
    ) -> Result<(), IssuanceError> {
        let admin = &self.address;
        match t.kind {
            TransferKind::IntoIssuance => {
                instrument_escrow.withdraw_token_by_admin(admin, t.from, t.token, t.amount)?;
                issuance_escrow.deposit_token_by_admin(admin, t.to, t.token, t.amount)?;
            }
            TransferKind::OutOfIssuance => {
                issuance_escrow.withdraw_token_by_admin(admin, t.from, t.token, t.amount)?;
                instrument_escrow.deposit_token_by_admin(admin, t.to, t.token, t.amount)?;
            }
            TransferKind::WithinIssuance => {
                issuance_escrow.transfer_token(admin, t.from, t.to, t.token, t.amount)?;
            }
            TransferKind::WithinInstrument => {
                instrument_escrow.transfer_token(admin, t.from, t.to, t.token, t.amount)?;
            }
        }
        Ok(())
    }

    fn receipt(&self, record: &IssuanceRecord, plan: &MutationPlan, created: Vec<u64>) -> IssuanceReceipt {
        IssuanceReceipt {
            instrument_id: self.id,
            issuance_id: record.issuance.id,
            escrow_address: record.issuance.escrow_address,
            state: record.issuance.state,
            transfers: plan.transfers().cloned().collect(),
            created_line_items: created,
        }
    }
}

fn check_operator(state: &ManagerState, caller: &Address) -> Result<(), IssuanceError> {
    if *caller != state.config.fsp {
        return Err(IssuanceError::authorization("Only FSP can perform this operation"));
    }
    Ok(())
}

fn find(state: &ManagerState, issuance_id: u64) -> Result<&IssuanceRecord, IssuanceError> {
    state
        .issuances
        .get(&issuance_id)
        .ok_or_else(|| IssuanceError::state("Issuance not found"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
