//! # Saving Policy
//!
//! A maker deposits savings for a fixed tenor and the FSP, the only
//! eligible taker, takes custody and owes principal plus interest back.
//!
//! While the offer is open the maker may withdraw part of it; each partial
//! withdrawal reinitiates the current principal item with the reduced
//! amount, and withdrawing everything cancels the issuance. A default
//! (`issuance_due` on an unpaid saving) only flags the issuance
//! `Delinquent`: there is no collateral to seize, so the obligations stay
//! unpaid on the record.

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
    ENGAGEMENT_WINDOW_DAYS, MAX_INTEREST_RATE, MAX_SAVING_TENOR_DAYS, MIN_INTEREST_RATE,
    MIN_SAVING_TENOR_DAYS, SAVING_PROPERTIES_TAG,
};

/// Terms a saver posts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavingMakerParams {
    pub token: TokenId,
    pub amount: u128,
    pub tenor_days: u32,
    pub interest_rate: u32,
}

impl SavingMakerParams {
    pub fn to_bytes(&self) -> Result<Vec<u8>, IssuanceError> {
        Ok(encode_params(self)?)
    }

    fn validate(&self) -> Result<(), IssuanceError> {
        common::check_token(&self.token, "Saving token not set")?;
        common::check_amount(self.amount, "Saving amount not set")?;
        common::check_range(
            self.tenor_days,
            MIN_SAVING_TENOR_DAYS,
            MAX_SAVING_TENOR_DAYS,
            "Invalid tenor days",
        )?;
        common::check_range(
            self.interest_rate,
            MIN_INTEREST_RATE,
            MAX_INTEREST_RATE,
            "Invalid interest rate",
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavingProperties {
    pub terms: SavingMakerParams,
    /// Principal currently in custody, after partial withdrawals.
    pub principal: u128,
    /// Set at engagement.
    pub interest_amount: u128,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SavingPolicy;

impl SavingPolicy {
    fn withdraw(
        &self,
        ctx: &PolicyContext<'_>,
        view: IssuanceView<'_>,
        token: TokenId,
        amount: u128,
    ) -> Result<MutationPlan, IssuanceError> {
        common::require_engageable(view)?;
        let issuance = view.issuance;
        if ctx.caller != issuance.maker {
            return Err(IssuanceError::authorization("Only maker can withdraw"));
        }
        let mut props: SavingProperties = common::decode_properties(view)?;
        if token != props.terms.token {
            return Err(IssuanceError::validation("Must withdraw saving token"));
        }
        if amount > props.principal {
            return Err(IssuanceError::insufficient("Insufficient principal balance"));
        }

        let custodian = issuance.custodian();
        let head = common::head_of(view, 1)?;
        let refund = TransferInstruction::out_of_issuance(custodian, issuance.maker, token, amount);
        let remaining = props.principal - amount;
        if remaining == 0 {
            return Ok(MutationPlan::new()
                .transfer(refund)
                .mark_paid(head.id)
                .transition(IssuanceState::Cancelled));
        }

        let reduced = common::line_item(
            LineItemKind::Principal,
            custodian,
            issuance.maker,
            token,
            remaining,
            head.due,
        );
        props.principal = remaining;
        Ok(MutationPlan::new()
            .transfer(refund)
            .reinitiate_item(head.id, reduced)
            .properties(encode_params(&props)?))
    }

    fn repay(
        &self,
        ctx: &PolicyContext<'_>,
        view: IssuanceView<'_>,
        token: TokenId,
        amount: u128,
    ) -> Result<MutationPlan, IssuanceError> {
        common::require_engaged(view)?;
        if ctx.caller != ctx.fsp {
            return Err(IssuanceError::authorization("Only FSP can repay"));
        }
        let props: SavingProperties = common::decode_properties(view)?;
        if token != props.terms.token {
            return Err(IssuanceError::validation("Must repay with saving token"));
        }
        if amount != props.principal.saturating_add(props.interest_amount) {
            return Err(IssuanceError::validation("Must repay in full"));
        }
        common::check_balance(ctx, &ctx.fsp, &token, amount, "Insufficient repayment balance")?;

        let issuance = view.issuance;
        let custodian = issuance.custodian();
        let plan = MutationPlan::new()
            .transfer(TransferInstruction::into_issuance(ctx.fsp, custodian, token, amount))
            .transfer(TransferInstruction::out_of_issuance(custodian, issuance.maker, token, amount));
        Ok(common::settle_all(view, plan).transition(IssuanceState::CompleteRepaid))
    }
}

impl InstrumentPolicy for SavingPolicy {
    fn kind(&self) -> InstrumentKind {
        InstrumentKind::Saving
    }

    fn validate_create(
        &self,
        ctx: &PolicyContext<'_>,
        view: IssuanceView<'_>,
        maker_params: &[u8],
    ) -> Result<MutationPlan, IssuanceError> {
        let terms: SavingMakerParams = decode_params(maker_params)?;
        terms.validate()?;
        common::check_balance(ctx, &ctx.caller, &terms.token, terms.amount, "Insufficient principal balance")?;

        let custodian = view.issuance.custodian();
        let engagement_due = ctx.now + chrono::Duration::days(ENGAGEMENT_WINDOW_DAYS);
        let plan = MutationPlan::new()
            .transfer(TransferInstruction::into_issuance(ctx.caller, custodian, terms.token, terms.amount))
            .create_item(common::line_item(
                LineItemKind::Principal,
                custodian,
                ctx.caller,
                terms.token,
                terms.amount,
                engagement_due,
            ))
            .engagement_due(engagement_due);

        let props = SavingProperties {
            principal: terms.amount,
            terms,
            interest_amount: 0,
        };
        Ok(plan.properties(encode_params(&props)?))
    }

    fn compute_engage(
        &self,
        ctx: &PolicyContext<'_>,
        view: IssuanceView<'_>,
        _taker_params: &[u8],
    ) -> Result<MutationPlan, IssuanceError> {
        if ctx.caller != ctx.fsp {
            return Err(IssuanceError::authorization("Only FSP can engage saving"));
        }
        let issuance = view.issuance;
        let mut props: SavingProperties = common::decode_properties(view)?;
        let token = props.terms.token;
        let interest = common::interest(props.principal, props.terms.tenor_days, props.terms.interest_rate)?;
        let due = after_days(ctx.now, props.terms.tenor_days);
        let custodian = issuance.custodian();
        let head = common::head_of(view, 1)?;

        let mut plan = MutationPlan::new()
            .transfer(TransferInstruction::out_of_issuance(custodian, ctx.fsp, token, props.principal))
            .reinitiate_item(
                head.id,
                common::line_item(LineItemKind::Principal, ctx.fsp, issuance.maker, token, props.principal, due),
            );
        if interest > 0 {
            plan = plan.create_item(common::line_item(
                LineItemKind::Interest,
                ctx.fsp,
                issuance.maker,
                token,
                interest,
                due,
            ));
        }

        props.interest_amount = interest;
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
            IssuanceEvent::Withdraw { token, amount } => self.withdraw(ctx, view, token, amount),
            IssuanceEvent::Custom { tag, .. } if common::is_offer_event(tag) => {
                common::close_offer(ctx, view, tag)
            }
            IssuanceEvent::Custom { tag, .. } if tag == EVENT_ISSUANCE_DUE => {
                common::require_engaged(view)?;
                common::require_due(ctx.now, view.issuance.issuance_due, "Issuance not due")?;
                Ok(MutationPlan::new().transition(IssuanceState::Delinquent))
            }
            IssuanceEvent::Custom { tag, .. } => Err(common::unknown_event(tag)),
        }
    }

    fn read_custom_data(&self, view: IssuanceView<'_>, tag: &str) -> Result<Vec<u8>, IssuanceError> {
        common::read_properties(view, tag, SAVING_PROPERTIES_TAG)
    }
}
