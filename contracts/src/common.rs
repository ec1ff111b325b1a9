//! Helpers shared by the product policies: fixed-point math, state guards,
//! and the offer-closing plan every product uses for cancellation and
//! engagement expiry.

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;

use fsp_protocol::codec::decode_params;
use fsp_protocol::config::{EVENT_CANCEL_ISSUANCE, EVENT_ENGAGEMENT_DUE};
use fsp_protocol::instrument::{IssuanceState, IssuanceView, MutationPlan, PolicyContext, TransferInstruction};
use fsp_protocol::ledger::{LineItemKind, NewLineItem, SupplementalLineItem};
use fsp_protocol::oracle::Rate;
use fsp_protocol::{Address, IssuanceError, TokenId};

use crate::config::{COLLATERAL_RATIO_DENOMINATOR, INTEREST_RATE_DENOMINATOR};

pub(crate) fn after_days(at: DateTime<Utc>, days: u32) -> DateTime<Utc> {
    at + Duration::days(i64::from(days))
}

pub(crate) fn check_range(value: u32, min: u32, max: u32, reason: &str) -> Result<(), IssuanceError> {
    if !(min..=max).contains(&value) {
        return Err(IssuanceError::validation(reason));
    }
    Ok(())
}

pub(crate) fn check_token(token: &TokenId, reason: &str) -> Result<(), IssuanceError> {
    if token.is_unset() {
        return Err(IssuanceError::validation(reason));
    }
    Ok(())
}

pub(crate) fn check_amount(amount: u128, reason: &str) -> Result<(), IssuanceError> {
    if amount == 0 {
        return Err(IssuanceError::validation(reason));
    }
    Ok(())
}

/// `holder` must hold at least `amount` of `token` in the instrument escrow.
pub(crate) fn check_balance(
    ctx: &PolicyContext<'_>,
    holder: &Address,
    token: &TokenId,
    amount: u128,
    reason: &str,
) -> Result<(), IssuanceError> {
    if ctx.balance_of(holder, token) < amount {
        return Err(IssuanceError::insufficient(reason));
    }
    Ok(())
}

/// Simple interest over the tenor: `amount × days × rate / 1e6`.
pub(crate) fn interest(amount: u128, tenor_days: u32, rate: u32) -> Result<u128, IssuanceError> {
    amount
        .checked_mul(u128::from(tenor_days))
        .and_then(|v| v.checked_mul(u128::from(rate)))
        .map(|v| v / INTEREST_RATE_DENOMINATOR)
        .ok_or_else(|| IssuanceError::validation("Interest amount overflow"))
}

/// Collateral for `amount` at `rate`, scaled by `ratio / 1e4`. Rounds down
/// once: `amount × num × ratio / (den × 1e4)`.
pub(crate) fn collateral(amount: u128, rate: Rate, ratio: u32) -> Result<u128, IssuanceError> {
    let numerator = amount
        .checked_mul(rate.numerator)
        .and_then(|v| v.checked_mul(u128::from(ratio)));
    let denominator = rate.denominator.checked_mul(COLLATERAL_RATIO_DENOMINATOR);
    let collateral = numerator
        .zip(denominator)
        .and_then(|(n, d)| n.checked_div(d))
        .ok_or_else(|| IssuanceError::validation("Collateral amount overflow"))?;
    if collateral == 0 {
        return Err(IssuanceError::validation("Collateral amount too small"));
    }
    Ok(collateral)
}

pub(crate) fn decode_properties<T: DeserializeOwned>(view: IssuanceView<'_>) -> Result<T, IssuanceError> {
    Ok(decode_params(&view.issuance.properties)?)
}

pub(crate) fn require_engageable(view: IssuanceView<'_>) -> Result<(), IssuanceError> {
    if view.issuance.state != IssuanceState::Engageable {
        return Err(IssuanceError::state("Issuance not engageable"));
    }
    Ok(())
}

pub(crate) fn require_engaged(view: IssuanceView<'_>) -> Result<(), IssuanceError> {
    if view.issuance.state != IssuanceState::Engaged {
        return Err(IssuanceError::state("Issuance not engaged"));
    }
    Ok(())
}

/// Fails unless `due` is set and `now` has reached it.
pub(crate) fn require_due(
    now: DateTime<Utc>,
    due: Option<DateTime<Utc>>,
    reason: &str,
) -> Result<(), IssuanceError> {
    match due {
        Some(at) if now >= at => Ok(()),
        _ => Err(IssuanceError::validation(reason)),
    }
}

/// Current head of the chain that started at `id`.
pub(crate) fn head_of(view: IssuanceView<'_>, id: u64) -> Result<&SupplementalLineItem, IssuanceError> {
    view.line_items
        .resolve(id)
        .ok_or_else(|| IssuanceError::state("Line item not found"))
}

/// First unpaid item of `kind`.
pub(crate) fn unpaid_of_kind(
    view: IssuanceView<'_>,
    kind: LineItemKind,
) -> Result<&SupplementalLineItem, IssuanceError> {
    view.line_items
        .unpaid()
        .find(|item| item.kind == kind)
        .ok_or_else(|| IssuanceError::state("Line item not found"))
}

pub(crate) fn line_item(
    kind: LineItemKind,
    obligor: Address,
    claimor: Address,
    token: TokenId,
    amount: u128,
    due: DateTime<Utc>,
) -> NewLineItem {
    NewLineItem {
        kind,
        obligor,
        claimor,
        token,
        amount,
        due,
    }
}

/// Marks every unpaid item paid.
pub(crate) fn settle_all(view: IssuanceView<'_>, plan: MutationPlan) -> MutationPlan {
    view.line_items
        .unpaid()
        .fold(plan, |plan, item| plan.mark_paid(item.id))
}

/// Returns `true` for the two events that close an open offer.
pub(crate) fn is_offer_event(tag: &str) -> bool {
    tag == EVENT_CANCEL_ISSUANCE || tag == EVENT_ENGAGEMENT_DUE
}

/// Closes an `Engageable` offer: the custody item (chain head of item 1) is
/// paid back to the maker.
///
/// `cancel_issuance` is restricted to the maker (or the FSP under override)
/// and ends in `Cancelled`. `engagement_due` may be sent by anyone once the
/// engagement window has lapsed and ends in `CompleteNotEngaged`.
pub(crate) fn close_offer(
    ctx: &PolicyContext<'_>,
    view: IssuanceView<'_>,
    tag: &str,
) -> Result<MutationPlan, IssuanceError> {
    require_engageable(view)?;
    let issuance = view.issuance;
    let next = if tag == EVENT_CANCEL_ISSUANCE {
        if !ctx.acts_for(&issuance.maker) {
            return Err(IssuanceError::authorization("Only maker can cancel issuance"));
        }
        IssuanceState::Cancelled
    } else {
        require_due(ctx.now, issuance.engagement_due, "Engagement not due")?;
        IssuanceState::CompleteNotEngaged
    };

    let head = head_of(view, 1)?;
    Ok(MutationPlan::new()
        .mark_paid(head.id)
        .transfer(TransferInstruction::out_of_issuance(
            issuance.custodian(),
            issuance.maker,
            head.token,
            head.amount,
        ))
        .transition(next))
}

pub(crate) fn unknown_event(tag: &str) -> IssuanceError {
    IssuanceError::validation(format!("Unknown event: {tag}"))
}

pub(crate) fn read_properties(
    view: IssuanceView<'_>,
    tag: &str,
    expected: &str,
) -> Result<Vec<u8>, IssuanceError> {
    if tag != expected {
        return Err(IssuanceError::validation(format!("Unknown custom data tag: {tag}")));
    }
    Ok(view.issuance.properties.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interest_is_simple_daily() {
        // 20_000 at 1% per day for 20 days.
        assert_eq!(interest(20_000, 20, 10_000).unwrap(), 4_000);
        // Rounds down.
        assert_eq!(interest(1, 2, 10).unwrap(), 0);
        assert!(interest(u128::MAX, 2, 10).is_err());
    }

    #[test]
    fn collateral_scales_by_rate_and_ratio() {
        assert_eq!(collateral(20_000, Rate::new(100, 1), 15_000).unwrap(), 3_000_000);
        assert_eq!(collateral(20_000, Rate::new(1, 2), 5_000).unwrap(), 5_000);
        assert!(collateral(1, Rate::new(1, 1_000), 5_000).is_err());
    }

    #[test]
    fn collateral_rounds_once_at_fractional_rates() {
        // 1 × 1/2 × 2.0 = 1 exactly.
        assert_eq!(collateral(1, Rate::new(1, 2), 20_000).unwrap(), 1);
        // 3 × 1/2 × 1.5 = 2.25.
        assert_eq!(collateral(3, Rate::new(1, 2), 15_000).unwrap(), 2);
        assert!(collateral(u128::MAX, Rate::new(2, 1), 10_000).is_err());
    }

    #[test]
    fn range_checks_are_inclusive() {
        assert!(check_range(2, 2, 90, "x").is_ok());
        assert!(check_range(90, 2, 90, "x").is_ok());
        assert_eq!(check_range(1, 2, 90, "Invalid tenor days").unwrap_err().reason(), "Invalid tenor days");
    }
}
