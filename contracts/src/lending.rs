//! # Lending Policy
//!
//! The maker lends a principal; the taker borrows it against collateral.
//!
//! ## Lifecycle
//!
//! 1. **Create**: the principal moves from the maker's instrument-escrow
//!    balance into custody. Item 1 (Principal, custodian → maker) records
//!    what custody owes the maker. The offer stays open for
//!    [`ENGAGEMENT_WINDOW_DAYS`].
//! 2. **Engage**: the oracle sizes the collateral, the taker posts it and
//!    receives the principal. Item 2 (Collateral, custodian → taker) and
//!    item 3 (Interest, taker → maker) are created, and item 1 is
//!    reinitiated to item 4 (Principal, taker → maker).
//! 3. **Repay**: the taker deposits principal plus interest in one go;
//!    the maker is paid and the collateral is released.
//! 4. **Default**: once the issuance is due, anyone may send
//!    `issuance_due`; the collateral goes to the maker and the issuance is
//!    `Delinquent`.
//!
//! ## Line Items After Engagement
//!
//! ```text
//! #1 Principal   custodian → maker   Reinitiated → #4
//! #2 Collateral  custodian → taker   Unpaid
//! #3 Interest    taker → maker       Unpaid
//! #4 Principal   taker → maker       Unpaid
//! ```
//!
//! Interest rounds down, so a small principal over a short tenor can owe
//! none. No Interest item is created then: item 3 is the new Principal and
//! the ledger holds three items. Repayment is the principal alone.
//!
//! Engagement takes no fee from the taker. The only fee an instrument
//! charges is its creation fee, collected from a maker on their first
//! issuance.

use serde::{Deserialize, Serialize};

use fsp_protocol::codec::encode_params;
use fsp_protocol::config::EVENT_ISSUANCE_DUE;
use fsp_protocol::instrument::{
    InstrumentKind, InstrumentPolicy, IssuanceEvent, IssuanceState, IssuanceView, MutationPlan,
    PolicyContext, TransferInstruction,
};
use fsp_protocol::ledger::LineItemKind;
use fsp_protocol::{IssuanceError, TokenId};

use crate::common::{self, after_days};
use crate::config::{
    ENGAGEMENT_WINDOW_DAYS, LENDING_PROPERTIES_TAG, MAX_COLLATERAL_RATIO, MAX_INTEREST_RATE,
    MAX_TENOR_DAYS, MIN_COLLATERAL_RATIO, MIN_INTEREST_RATE, MIN_TENOR_DAYS,
};

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Terms a lending maker posts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LendingMakerParams {
    pub collateral_token: TokenId,
    pub lending_token: TokenId,
    pub lending_amount: u128,
    pub tenor_days: u32,
    /// Daily rate over 1e6.
    pub interest_rate: u32,
    /// Collateral ratio over 1e4.
    pub collateral_ratio: u32,
}

impl LendingMakerParams {
    pub fn to_bytes(&self) -> Result<Vec<u8>, IssuanceError> {
        Ok(encode_params(self)?)
    }

    fn validate(&self) -> Result<(), IssuanceError> {
        common::check_token(&self.collateral_token, "Collateral token not set")?;
        common::check_token(&self.lending_token, "Lending token not set")?;
        common::check_amount(self.lending_amount, "Lending amount not set")?;
        common::check_range(self.tenor_days, MIN_TENOR_DAYS, MAX_TENOR_DAYS, "Invalid tenor days")?;
        common::check_range(
            self.collateral_ratio,
            MIN_COLLATERAL_RATIO,
            MAX_COLLATERAL_RATIO,
            "Invalid collateral ratio",
        )?;
        common::check_range(
            self.interest_rate,
            MIN_INTEREST_RATE,
            MAX_INTEREST_RATE,
            "Invalid interest rate",
        )
    }
}

/// Properties stored on a lending issuance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LendingProperties {
    pub terms: LendingMakerParams,
    /// Set at engagement.
    pub collateral_amount: u128,
    /// Set at engagement.
    pub interest_amount: u128,
}

impl LendingProperties {
    fn repayment(&self) -> u128 {
        self.terms.lending_amount.saturating_add(self.interest_amount)
    }
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Collateralized loan policy. Engagement creates no Interest item when
/// interest rounds to zero and charges no engagement fee.
#[derive(Debug, Default, Clone, Copy)]
pub struct LendingPolicy;

impl LendingPolicy {
    fn repay(
        &self,
        ctx: &PolicyContext<'_>,
        view: IssuanceView<'_>,
        token: TokenId,
        amount: u128,
    ) -> Result<MutationPlan, IssuanceError> {
        common::require_engaged(view)?;
        let issuance = view.issuance;
        if ctx.caller != issuance.taker {
            return Err(IssuanceError::authorization("Only taker can repay"));
        }
        let props: LendingProperties = common::decode_properties(view)?;
        let terms = &props.terms;
        if token != terms.lending_token {
            return Err(IssuanceError::validation("Must repay with lending token"));
        }
        if amount != props.repayment() {
            return Err(IssuanceError::validation("Must repay in full"));
        }
        common::check_balance(ctx, &issuance.taker, &token, amount, "Insufficient repayment balance")?;

        let custodian = issuance.custodian();
        let plan = MutationPlan::new()
            .transfer(TransferInstruction::into_issuance(issuance.taker, custodian, token, amount))
            .transfer(TransferInstruction::out_of_issuance(custodian, issuance.maker, token, amount))
            .transfer(TransferInstruction::out_of_issuance(
                custodian,
                issuance.taker,
                terms.collateral_token,
                props.collateral_amount,
            ));
        Ok(common::settle_all(view, plan).transition(IssuanceState::CompleteRepaid))
    }

    fn default_on_due(
        &self,
        ctx: &PolicyContext<'_>,
        view: IssuanceView<'_>,
    ) -> Result<MutationPlan, IssuanceError> {
        common::require_engaged(view)?;
        let issuance = view.issuance;
        common::require_due(ctx.now, issuance.issuance_due, "Issuance not due")?;

        let props: LendingProperties = common::decode_properties(view)?;
        let custodian = issuance.custodian();
        let collateral = common::unpaid_of_kind(view, LineItemKind::Collateral)?;
        let seized = common::line_item(
            LineItemKind::Collateral,
            custodian,
            issuance.maker,
            props.terms.collateral_token,
            props.collateral_amount,
            ctx.now,
        );
        Ok(MutationPlan::new()
            .reinitiate_item(collateral.id, seized)
            .mark_paid(view.line_items.next_id())
            .transfer(TransferInstruction::out_of_issuance(
                custodian,
                issuance.maker,
                props.terms.collateral_token,
                props.collateral_amount,
            ))
            .transition(IssuanceState::Delinquent))
    }
}

impl InstrumentPolicy for LendingPolicy {
    fn kind(&self) -> InstrumentKind {
        InstrumentKind::Lending
    }

    fn validate_create(
        &self,
        ctx: &PolicyContext<'_>,
        view: IssuanceView<'_>,
        maker_params: &[u8],
    ) -> Result<MutationPlan, IssuanceError> {
        let terms: LendingMakerParams = fsp_protocol::codec::decode_params(maker_params)?;
        terms.validate()?;
        common::check_balance(
            ctx,
            &ctx.caller,
            &terms.lending_token,
            terms.lending_amount,
            "Insufficient principal balance",
        )?;

        let custodian = view.issuance.custodian();
        let engagement_due = ctx.now + chrono::Duration::days(ENGAGEMENT_WINDOW_DAYS);
        let principal = common::line_item(
            LineItemKind::Principal,
            custodian,
            ctx.caller,
            terms.lending_token,
            terms.lending_amount,
            engagement_due,
        );
        let transfer = TransferInstruction::into_issuance(
            ctx.caller,
            custodian,
            terms.lending_token,
            terms.lending_amount,
        );
        let props = LendingProperties {
            terms,
            collateral_amount: 0,
            interest_amount: 0,
        };

        Ok(MutationPlan::new()
            .transfer(transfer)
            .create_item(principal)
            .engagement_due(engagement_due)
            .properties(encode_params(&props)?))
    }

    fn compute_engage(
        &self,
        ctx: &PolicyContext<'_>,
        view: IssuanceView<'_>,
        _taker_params: &[u8],
    ) -> Result<MutationPlan, IssuanceError> {
        let issuance = view.issuance;
        let mut props: LendingProperties = common::decode_properties(view)?;
        let terms = props.terms.clone();
        let taker = ctx.caller;

        let rate = ctx.oracle.get_rate(&terms.lending_token, &terms.collateral_token)?;
        let collateral = common::collateral(terms.lending_amount, rate, terms.collateral_ratio)?;
        common::check_balance(
            ctx,
            &taker,
            &terms.collateral_token,
            collateral,
            "Insufficient collateral balance",
        )?;
        let interest = common::interest(terms.lending_amount, terms.tenor_days, terms.interest_rate)?;
        let due = after_days(ctx.now, terms.tenor_days);
        let custodian = issuance.custodian();

        let mut plan = MutationPlan::new()
            .transfer(TransferInstruction::into_issuance(
                taker,
                custodian,
                terms.collateral_token,
                collateral,
            ))
            .transfer(TransferInstruction::out_of_issuance(
                custodian,
                taker,
                terms.lending_token,
                terms.lending_amount,
            ))
            .create_item(common::line_item(
                LineItemKind::Collateral,
                custodian,
                taker,
                terms.collateral_token,
                collateral,
                due,
            ));
        if interest > 0 {
            plan = plan.create_item(common::line_item(
                LineItemKind::Interest,
                taker,
                issuance.maker,
                terms.lending_token,
                interest,
                due,
            ));
        }
        let plan = plan.reinitiate_item(
            1,
            common::line_item(
                LineItemKind::Principal,
                taker,
                issuance.maker,
                terms.lending_token,
                terms.lending_amount,
                due,
            ),
        );

        props.collateral_amount = collateral;
        props.interest_amount = interest;
        tracing::debug!(
            issuance_id = issuance.id,
            collateral,
            interest,
            rate_numerator = rate.numerator,
            rate_denominator = rate.denominator,
            "lending engagement sized"
        );

        Ok(plan
            .transition(IssuanceState::Engaged)
            .issuance_due(due)
            .properties(encode_params(&props)?))
    }

    fn handle_event(
        &self,
        ctx: &PolicyContext<'_>,
        view: IssuanceView<'_>,
        event: IssuanceEvent<'_>,
    ) -> Result<MutationPlan, IssuanceError> {
        match event {
            IssuanceEvent::Deposit { token, amount } => self.repay(ctx, view, token, amount),
            IssuanceEvent::Withdraw { .. } => {
                Err(IssuanceError::validation("Withdrawal not supported"))
            }
            IssuanceEvent::Custom { tag, .. } if common::is_offer_event(tag) => {
                common::close_offer(ctx, view, tag)
            }
            IssuanceEvent::Custom { tag, .. } if tag == EVENT_ISSUANCE_DUE => {
                self.default_on_due(ctx, view)
            }
            IssuanceEvent::Custom { tag, .. } => Err(common::unknown_event(tag)),
        }
    }

    fn read_custom_data(&self, view: IssuanceView<'_>, tag: &str) -> Result<Vec<u8>, IssuanceError> {
        common::read_properties(view, tag, LENDING_PROPERTIES_TAG)
    }
}
