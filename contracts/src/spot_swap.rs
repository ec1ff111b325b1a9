//! # Spot Swap Policy
//!
//! An instantly settled exchange: the maker escrows `input_amount` of one
//! token and asks for `output_amount` of another. Engagement settles both
//! legs in a single commit and ends in `CompleteEngaged`; there is no
//! repayment phase.

use serde::{Deserialize, Serialize};

use fsp_protocol::codec::{decode_params, encode_params};
use fsp_protocol::instrument::{
    InstrumentKind, InstrumentPolicy, IssuanceEvent, IssuanceState, IssuanceView, MutationPlan,
    PolicyContext, TransferInstruction,
};
use fsp_protocol::ledger::LineItemKind;
use fsp_protocol::{IssuanceError, TokenId};

use crate::common::{self, after_days};
use crate::config::{MAX_SWAP_DURATION_DAYS, MIN_SWAP_DURATION_DAYS, SPOT_SWAP_PROPERTIES_TAG};

/// Terms a swap maker posts. These are also the stored properties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpotSwapMakerParams {
    pub input_token: TokenId,
    pub input_amount: u128,
    pub output_token: TokenId,
    pub output_amount: u128,
    /// How long the offer stays open.
    pub duration_days: u32,
}

impl SpotSwapMakerParams {
    pub fn to_bytes(&self) -> Result<Vec<u8>, IssuanceError> {
        Ok(encode_params(self)?)
    }

    fn validate(&self) -> Result<(), IssuanceError> {
        common::check_token(&self.input_token, "Input token not set")?;
        common::check_amount(self.input_amount, "Input amount not set")?;
        common::check_token(&self.output_token, "Output token not set")?;
        common::check_amount(self.output_amount, "Output amount not set")?;
        common::check_range(
            self.duration_days,
            MIN_SWAP_DURATION_DAYS,
            MAX_SWAP_DURATION_DAYS,
            "Invalid duration days",
        )
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SpotSwapPolicy;

impl InstrumentPolicy for SpotSwapPolicy {
    fn kind(&self) -> InstrumentKind {
        InstrumentKind::SpotSwap
    }

    fn validate_create(
        &self,
        ctx: &PolicyContext<'_>,
        view: IssuanceView<'_>,
        maker_params: &[u8],
    ) -> Result<MutationPlan, IssuanceError> {
        let terms: SpotSwapMakerParams = decode_params(maker_params)?;
        terms.validate()?;
        common::check_balance(
            ctx,
            &ctx.caller,
            &terms.input_token,
            terms.input_amount,
            "Insufficient input balance",
        )?;

        let custodian = view.issuance.custodian();
        let engagement_due = after_days(ctx.now, terms.duration_days);
        Ok(MutationPlan::new()
            .transfer(TransferInstruction::into_issuance(
                ctx.caller,
                custodian,
                terms.input_token,
                terms.input_amount,
            ))
            .create_item(common::line_item(
                LineItemKind::SwapInput,
                custodian,
                ctx.caller,
                terms.input_token,
                terms.input_amount,
                engagement_due,
            ))
            .engagement_due(engagement_due)
            .properties(terms.to_bytes()?))
    }

    fn compute_engage(
        &self,
        ctx: &PolicyContext<'_>,
        view: IssuanceView<'_>,
        _taker_params: &[u8],
    ) -> Result<MutationPlan, IssuanceError> {
        let issuance = view.issuance;
        let terms: SpotSwapMakerParams = common::decode_properties(view)?;
        let taker = ctx.caller;
        common::check_balance(
            ctx,
            &taker,
            &terms.output_token,
            terms.output_amount,
            "Insufficient output balance",
        )?;

        let custodian = issuance.custodian();
        // Reinitiation takes the next id; the output leg follows it.
        let input_id = view.line_items.next_id();
        let output_id = input_id + 1;
        Ok(MutationPlan::new()
            .transfer(TransferInstruction::within_instrument(
                taker,
                issuance.maker,
                terms.output_token,
                terms.output_amount,
            ))
            .transfer(TransferInstruction::out_of_issuance(
                custodian,
                taker,
                terms.input_token,
                terms.input_amount,
            ))
            .reinitiate_item(
                1,
                common::line_item(
                    LineItemKind::SwapInput,
                    custodian,
                    taker,
                    terms.input_token,
                    terms.input_amount,
                    ctx.now,
                ),
            )
            .mark_paid(input_id)
            .create_item(common::line_item(
                LineItemKind::SwapOutput,
                taker,
                issuance.maker,
                terms.output_token,
                terms.output_amount,
                ctx.now,
            ))
            .mark_paid(output_id)
            .transition(IssuanceState::CompleteEngaged))
    }

    fn handle_event(
        &self,
        ctx: &PolicyContext<'_>,
        view: IssuanceView<'_>,
        event: IssuanceEvent<'_>,
    ) -> Result<MutationPlan, IssuanceError> {
        match event {
            IssuanceEvent::Deposit { .. } => Err(IssuanceError::validation("Deposit not supported")),
            IssuanceEvent::Withdraw { .. } => {
                Err(IssuanceError::validation("Withdrawal not supported"))
            }
            IssuanceEvent::Custom { tag, .. } if common::is_offer_event(tag) => {
                common::close_offer(ctx, view, tag)
            }
            IssuanceEvent::Custom { tag, .. } => Err(common::unknown_event(tag)),
        }
    }

    fn read_custom_data(&self, view: IssuanceView<'_>, tag: &str) -> Result<Vec<u8>, IssuanceError> {
        common::read_properties(view, tag, SPOT_SWAP_PROPERTIES_TAG)
    }
}
