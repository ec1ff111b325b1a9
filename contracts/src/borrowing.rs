//! # Borrowing Policy
//!
//! The mirror image of lending: the maker wants to borrow and posts
//! collateral when the offer is created; the taker funds the loan.
//!
//! Collateral is sized at creation from the oracle rate
//! (borrowing → collateral) and the maker's collateral ratio. Item 1
//! (Collateral, custodian → maker) tracks it for the whole life of the
//! issuance. On engagement the principal passes through custody from taker
//! to maker and two obligations are opened: item 2 (Principal,
//! maker → taker) and item 3 (Interest, maker → taker).
//!
//! On default the collateral item is reinitiated toward the taker and paid
//! out to them.

use serde::{Deserialize, Serialize};

use fsp_protocol::codec::{decode_params, encode_params};
use fsp_protocol::config::EVENT_ISSUANCE_DUE;
use fsp_protocol::instrument::{
    InstrumentKind, InstrumentPolicy, IssuanceEvent, IssuanceState, IssuanceView, MutationPlan,
    PolicyContext, TransferInstruction,
};
use fsp_protocol::ledger::LineItemKind;
use fsp_protocol::{IssuanceError, TokenId};

use crate::common::{self, after_days};
use crate::config::{
    BORROWING_PROPERTIES_TAG, ENGAGEMENT_WINDOW_DAYS, MAX_COLLATERAL_RATIO, MAX_INTEREST_RATE,
    MAX_TENOR_DAYS, MIN_COLLATERAL_RATIO, MIN_INTEREST_RATE, MIN_TENOR_DAYS,
};

/// Terms a borrowing maker posts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowingMakerParams {
    pub collateral_token: TokenId,
    pub borrowing_token: TokenId,
    pub borrowing_amount: u128,
    pub tenor_days: u32,
    pub interest_rate: u32,
    pub collateral_ratio: u32,
}

impl BorrowingMakerParams {
    pub fn to_bytes(&self) -> Result<Vec<u8>, IssuanceError> {
        Ok(encode_params(self)?)
    }

    fn validate(&self) -> Result<(), IssuanceError> {
        common::check_token(&self.collateral_token, "Collateral token not set")?;
        common::check_token(&self.borrowing_token, "Borrowing token not set")?;
        common::check_amount(self.borrowing_amount, "Borrowing amount not set")?;
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

/// Properties stored on a borrowing issuance. Both amounts are fixed at
/// creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowingProperties {
    pub terms: BorrowingMakerParams,
    pub collateral_amount: u128,
    pub interest_amount: u128,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct BorrowingPolicy;

impl BorrowingPolicy {
    fn repay(
        &self,
        ctx: &PolicyContext<'_>,
        view: IssuanceView<'_>,
        token: TokenId,
        amount: u128,
    ) -> Result<MutationPlan, IssuanceError> {
        common::require_engaged(view)?;
        let issuance = view.issuance;
        if ctx.caller != issuance.maker {
            return Err(IssuanceError::authorization("Only maker can repay"));
        }
        let props: BorrowingProperties = common::decode_properties(view)?;
        if token != props.terms.borrowing_token {
            return Err(IssuanceError::validation("Must repay with borrowing token"));
        }
        let owed = props
            .terms
            .borrowing_amount
            .saturating_add(props.interest_amount);
        if amount != owed {
            return Err(IssuanceError::validation("Must repay in full"));
        }
        common::check_balance(ctx, &issuance.maker, &token, amount, "Insufficient repayment balance")?;

        let custodian = issuance.custodian();
        let plan = MutationPlan::new()
            .transfer(TransferInstruction::into_issuance(issuance.maker, custodian, token, amount))
            .transfer(TransferInstruction::out_of_issuance(custodian, issuance.taker, token, amount))
            .transfer(TransferInstruction::out_of_issuance(
                custodian,
                issuance.maker,
                props.terms.collateral_token,
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

        let props: BorrowingProperties = common::decode_properties(view)?;
        let custodian = issuance.custodian();
        let collateral = common::head_of(view, 1)?;
        let seized = common::line_item(
            LineItemKind::Collateral,
            custodian,
            issuance.taker,
            props.terms.collateral_token,
            props.collateral_amount,
            ctx.now,
        );
        Ok(MutationPlan::new()
            .reinitiate_item(collateral.id, seized)
            .mark_paid(view.line_items.next_id())
            .transfer(TransferInstruction::out_of_issuance(
                custodian,
                issuance.taker,
                props.terms.collateral_token,
                props.collateral_amount,
            ))
            .transition(IssuanceState::Delinquent))
    }
}

impl InstrumentPolicy for BorrowingPolicy {
    fn kind(&self) -> InstrumentKind {
        InstrumentKind::Borrowing
    }

    fn validate_create(
        &self,
        ctx: &PolicyContext<'_>,
        view: IssuanceView<'_>,
        maker_params: &[u8],
    ) -> Result<MutationPlan, IssuanceError> {
        let terms: BorrowingMakerParams = decode_params(maker_params)?;
        terms.validate()?;

        let rate = ctx.oracle.get_rate(&terms.borrowing_token, &terms.collateral_token)?;
        let collateral = common::collateral(terms.borrowing_amount, rate, terms.collateral_ratio)?;
        common::check_balance(
            ctx,
            &ctx.caller,
            &terms.collateral_token,
            collateral,
            "Insufficient collateral balance",
        )?;
        let interest = common::interest(terms.borrowing_amount, terms.tenor_days, terms.interest_rate)?;

        let custodian = view.issuance.custodian();
        let engagement_due = ctx.now + chrono::Duration::days(ENGAGEMENT_WINDOW_DAYS);
        let plan = MutationPlan::new()
            .transfer(TransferInstruction::into_issuance(
                ctx.caller,
                custodian,
                terms.collateral_token,
                collateral,
            ))
            .create_item(common::line_item(
                LineItemKind::Collateral,
                custodian,
                ctx.caller,
                terms.collateral_token,
                collateral,
                engagement_due,
            ))
            .engagement_due(engagement_due);

        let props = BorrowingProperties {
            terms,
            collateral_amount: collateral,
            interest_amount: interest,
        };
        Ok(plan.properties(encode_params(&props)?))
    }

    fn compute_engage(
        &self,
        ctx: &PolicyContext<'_>,
        view: IssuanceView<'_>,
        _taker_params: &[u8],
    ) -> Result<MutationPlan, IssuanceError> {
        let issuance = view.issuance;
        let props: BorrowingProperties = common::decode_properties(view)?;
        let terms = &props.terms;
        let taker = ctx.caller;
        common::check_balance(
            ctx,
            &taker,
            &terms.borrowing_token,
            terms.borrowing_amount,
            "Insufficient principal balance",
        )?;

        let custodian = issuance.custodian();
        let due = after_days(ctx.now, terms.tenor_days);
        let mut plan = MutationPlan::new()
            .transfer(TransferInstruction::into_issuance(
                taker,
                custodian,
                terms.borrowing_token,
                terms.borrowing_amount,
            ))
            .transfer(TransferInstruction::out_of_issuance(
                custodian,
                issuance.maker,
                terms.borrowing_token,
                terms.borrowing_amount,
            ))
            .create_item(common::line_item(
                LineItemKind::Principal,
                issuance.maker,
                taker,
                terms.borrowing_token,
                terms.borrowing_amount,
                due,
            ));
        if props.interest_amount > 0 {
            plan = plan.create_item(common::line_item(
                LineItemKind::Interest,
                issuance.maker,
                taker,
                terms.borrowing_token,
                props.interest_amount,
                due,
            ));
        }
        Ok(plan.transition(IssuanceState::Engaged).issuance_due(due))
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
        common::read_properties(view, tag, BORROWING_PROPERTIES_TAG)
    }
}
