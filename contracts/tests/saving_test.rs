//! Integration tests for the saving policy.

mod common;

use std::sync::Arc;

use common::{addr, Harness};
use fsp_contracts::{SavingMakerParams, SavingProperties};
use fsp_protocol::codec::decode_params;
use fsp_protocol::config::EVENT_ISSUANCE_DUE;
use fsp_protocol::instrument::{InstrumentKind, InstrumentManager, IssuanceState};
use fsp_protocol::ledger::{LineItemKind, LineItemState};
use fsp_protocol::{Address, ErrorKind};

struct Fixture {
    h: Harness,
    m: Arc<InstrumentManager>,
    maker: Address,
    token: Address,
}

fn fixture() -> Fixture {
    let h = Harness::new();
    let m = h.activate(InstrumentKind::Saving);
    Fixture {
        h,
        m,
        maker: addr("saver"),
        token: addr("S"),
    }
}

impl Fixture {
    /// 1_000 S for 30 days at 0.01% per day.
    fn create(&self) -> Address {
        let params = SavingMakerParams {
            token: self.token,
            amount: 1_000,
            tenor_days: 30,
            interest_rate: 100,
        };
        self.m.deposit_to_escrow(&self.maker, self.token, 1_000).unwrap();
        self.m
            .create_issuance(&self.maker, &params.to_bytes().unwrap())
            .unwrap()
            .escrow_address
    }
}

#[test]
fn partial_withdrawal_reinitiates_principal() {
    let f = fixture();
    let custodian = f.create();

    f.m.withdraw_from_issuance(&f.maker, 1, f.token, 400).unwrap();

    assert_eq!(f.m.escrow_balance(&f.maker, &f.token), 400);
    assert_eq!(f.m.issuance_escrow_balance(1, &custodian, &f.token).unwrap(), 600);
    let items = f.m.line_items(1).unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].state, LineItemState::Reinitiated);
    assert_eq!(items[0].reinitiated_to, 2);
    assert_eq!(items[1].amount, 600);
    assert_eq!(items[1].due, items[0].due);
    assert_eq!(f.m.issuance(1).unwrap().state, IssuanceState::Engageable);

    let props: SavingProperties =
        decode_params(&f.m.custom_data(1, "saving_properties").unwrap()).unwrap();
    assert_eq!(props.principal, 600);
    assert!(f.m.audit());
}

#[test]
fn withdrawal_rules() {
    let f = fixture();
    f.create();

    let err = f.m.withdraw_from_issuance(&addr("other"), 1, f.token, 1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);
    let err = f.m.withdraw_from_issuance(&f.maker, 1, f.token, 1_001).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
    let err = f.m.withdraw_from_issuance(&f.maker, 1, addr("T"), 1).unwrap_err();
    assert_eq!(err.reason(), "Must withdraw saving token");
    assert_eq!(f.m.line_items(1).unwrap().len(), 1);
}

#[test]
fn withdrawing_everything_cancels() {
    let f = fixture();
    f.create();
    f.m.withdraw_from_issuance(&f.maker, 1, f.token, 300).unwrap();

    let receipt = f.m.withdraw_from_issuance(&f.maker, 1, f.token, 700).unwrap();
    assert_eq!(receipt.state, IssuanceState::Cancelled);
    assert_eq!(f.m.escrow_balance(&f.maker, &f.token), 1_000);
    let items = f.m.line_items(1).unwrap();
    assert_eq!(items[1].state, LineItemState::Paid);
}

#[test]
fn only_fsp_engages() {
    let f = fixture();
    f.create();
    let err = f.m.engage_issuance(&addr("taker"), 1, &[]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);
    assert_eq!(err.reason(), "Only FSP can engage saving");
}

#[test]
fn fsp_engages_and_repays() {
    let f = fixture();
    f.create();
    f.m.withdraw_from_issuance(&f.maker, 1, f.token, 400).unwrap();

    let fsp = f.h.fsp;
    let receipt = f.m.engage_issuance(&fsp, 1, &[]).unwrap();
    assert_eq!(receipt.state, IssuanceState::Engaged);
    assert_eq!(f.m.escrow_balance(&fsp, &f.token), 600);

    let items = f.m.line_items(1).unwrap();
    assert_eq!(items.len(), 4);
    assert_eq!(items[1].reinitiated_to, 3);
    assert_eq!((items[2].obligor, items[2].claimor), (fsp, f.maker));
    assert_eq!(items[2].amount, 600);
    assert_eq!(items[3].kind, LineItemKind::Interest);
    // 600 × 30 × 100 / 1e6, rounded down.
    assert_eq!(items[3].amount, 1);

    // Still engaged, so further withdrawals are refused.
    let err = f.m.withdraw_from_issuance(&f.maker, 1, f.token, 1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::State);

    f.m.deposit_to_escrow(&fsp, f.token, 1).unwrap();
    let err = f.m.deposit_to_issuance(&f.maker, 1, f.token, 601).unwrap_err();
    assert_eq!(err.reason(), "Only FSP can repay");
    let receipt = f.m.deposit_to_issuance(&fsp, 1, f.token, 601).unwrap();
    assert_eq!(receipt.state, IssuanceState::CompleteRepaid);
    assert_eq!(f.m.escrow_balance(&f.maker, &f.token), 1_001);
    assert!(f.m.audit());
}

#[test]
fn overdue_saving_is_flagged_delinquent() {
    let f = fixture();
    f.create();
    f.m.engage_issuance(&f.h.fsp, 1, &[]).unwrap();

    f.h.clock.advance_days(30);
    let receipt = f
        .m
        .notify_custom_event(&f.maker, 1, EVENT_ISSUANCE_DUE, &[])
        .unwrap();
    assert_eq!(receipt.state, IssuanceState::Delinquent);
    let items = f.m.line_items(1).unwrap();
    assert!(items[1..].iter().all(|item| item.state == LineItemState::Unpaid));
}
