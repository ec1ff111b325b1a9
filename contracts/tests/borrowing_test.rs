//! Integration tests for the borrowing policy.

mod common;

use std::sync::Arc;

use common::{addr, Harness};
use fsp_contracts::{BorrowingMakerParams, BorrowingProperties};
use fsp_protocol::codec::decode_params;
use fsp_protocol::config::{EVENT_CANCEL_ISSUANCE, EVENT_ISSUANCE_DUE};
use fsp_protocol::instrument::{InstrumentKind, InstrumentManager, IssuanceState};
use fsp_protocol::ledger::{LineItemKind, LineItemState};
use fsp_protocol::{Address, ErrorKind};

struct Fixture {
    h: Harness,
    m: Arc<InstrumentManager>,
    maker: Address,
    taker: Address,
    borrowing: Address,
    collateral: Address,
}

fn fixture() -> Fixture {
    let h = Harness::new();
    let m = h.activate(InstrumentKind::Borrowing);
    let f = Fixture {
        h,
        m,
        maker: addr("maker"),
        taker: addr("taker"),
        borrowing: addr("B"),
        collateral: addr("C"),
    };
    // One B is worth two C.
    f.h.set_rate(f.borrowing, f.collateral, 2, 1);
    f
}

impl Fixture {
    fn params(&self) -> BorrowingMakerParams {
        BorrowingMakerParams {
            collateral_token: self.collateral,
            borrowing_token: self.borrowing,
            borrowing_amount: 10_000,
            tenor_days: 10,
            interest_rate: 1_000,
            collateral_ratio: 15_000,
        }
    }

    /// Collateral: 10_000 × 2 × 150% = 30_000 C. Interest: 1% over 10 days.
    fn create(&self) -> Address {
        self.m.deposit_to_escrow(&self.maker, self.collateral, 30_000).unwrap();
        self.m
            .create_issuance(&self.maker, &self.params().to_bytes().unwrap())
            .unwrap()
            .escrow_address
    }

    fn engage(&self) {
        self.m.deposit_to_escrow(&self.taker, self.borrowing, 10_000).unwrap();
        self.m.engage_issuance(&self.taker, 1, &[]).unwrap();
    }
}

#[test]
fn create_locks_collateral() {
    let f = fixture();
    let custodian = f.create();

    let items = f.m.line_items(1).unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].kind, LineItemKind::Collateral);
    assert_eq!((items[0].obligor, items[0].claimor), (custodian, f.maker));
    assert_eq!(items[0].amount, 30_000);

    assert_eq!(f.m.escrow_balance(&f.maker, &f.collateral), 0);
    assert_eq!(f.m.issuance_escrow_balance(1, &custodian, &f.collateral).unwrap(), 30_000);

    let props: BorrowingProperties =
        decode_params(&f.m.custom_data(1, "borrowing_properties").unwrap()).unwrap();
    assert_eq!(props.collateral_amount, 30_000);
    assert_eq!(props.interest_amount, 100);
}

#[test]
fn create_with_short_collateral_rejected() {
    let f = fixture();
    f.m.deposit_to_escrow(&f.maker, f.collateral, 29_999).unwrap();

    let err = f
        .m
        .create_issuance(&f.maker, &f.params().to_bytes().unwrap())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
    assert_eq!(err.reason(), "Insufficient collateral balance");
    assert_eq!(f.m.issuance_count(), 0);
    assert_eq!(f.m.escrow_balance(&f.maker, &f.collateral), 29_999);
}

#[test]
fn create_validates_tokens() {
    let f = fixture();
    let mut params = f.params();
    params.borrowing_token = Address::ZERO;
    let err = f.m.create_issuance(&f.maker, &params.to_bytes().unwrap()).unwrap_err();
    assert_eq!(err.reason(), "Borrowing token not set");
}

#[test]
fn engage_funds_the_maker() {
    let f = fixture();
    f.create();
    f.engage();

    assert_eq!(f.m.escrow_balance(&f.maker, &f.borrowing), 10_000);
    assert_eq!(f.m.escrow_balance(&f.taker, &f.borrowing), 0);

    let items = f.m.line_items(1).unwrap();
    assert_eq!(items.len(), 3);
    assert_eq!(items[0].state, LineItemState::Unpaid);
    assert_eq!(items[1].kind, LineItemKind::Principal);
    assert_eq!((items[1].obligor, items[1].claimor), (f.maker, f.taker));
    assert_eq!(items[2].kind, LineItemKind::Interest);
    assert_eq!(items[2].amount, 100);
    assert_eq!(f.m.issuance(1).unwrap().state, IssuanceState::Engaged);
    assert!(f.m.audit());
}

#[test]
fn engage_requires_principal() {
    let f = fixture();
    f.create();
    f.m.deposit_to_escrow(&f.taker, f.borrowing, 5_000).unwrap();

    let err = f.m.engage_issuance(&f.taker, 1, &[]).unwrap_err();
    assert_eq!(err.reason(), "Insufficient principal balance");
    assert_eq!(f.m.escrow_balance(&f.taker, &f.borrowing), 5_000);
    assert_eq!(f.m.line_items(1).unwrap().len(), 1);
}

#[test]
fn repayment_returns_collateral() {
    let f = fixture();
    f.create();
    f.engage();
    f.m.deposit_to_escrow(&f.maker, f.borrowing, 100).unwrap();

    let err = f.m.deposit_to_issuance(&f.taker, 1, f.borrowing, 10_100).unwrap_err();
    assert_eq!(err.reason(), "Only maker can repay");
    let err = f.m.deposit_to_issuance(&f.maker, 1, f.collateral, 10_100).unwrap_err();
    assert_eq!(err.reason(), "Must repay with borrowing token");
    let err = f.m.deposit_to_issuance(&f.maker, 1, f.borrowing, 10_000).unwrap_err();
    assert_eq!(err.reason(), "Must repay in full");

    let receipt = f.m.deposit_to_issuance(&f.maker, 1, f.borrowing, 10_100).unwrap();
    assert_eq!(receipt.state, IssuanceState::CompleteRepaid);
    assert_eq!(f.m.escrow_balance(&f.taker, &f.borrowing), 10_100);
    assert_eq!(f.m.escrow_balance(&f.maker, &f.collateral), 30_000);
    assert!(f
        .m
        .line_items(1)
        .unwrap()
        .iter()
        .all(|item| item.state == LineItemState::Paid));
    assert!(f.m.audit());
}

#[test]
fn default_hands_collateral_to_taker() {
    let f = fixture();
    f.create();
    f.engage();
    f.h.clock.advance_days(10);

    let receipt = f
        .m
        .notify_custom_event(&f.taker, 1, EVENT_ISSUANCE_DUE, &[])
        .unwrap();
    assert_eq!(receipt.state, IssuanceState::Delinquent);

    let items = f.m.line_items(1).unwrap();
    assert_eq!(items[0].state, LineItemState::Reinitiated);
    assert_eq!(items[0].reinitiated_to, 4);
    assert_eq!(items[3].claimor, f.taker);
    assert_eq!(items[3].state, LineItemState::Paid);
    assert_eq!(f.m.escrow_balance(&f.taker, &f.collateral), 30_000);
    assert!(f.m.audit());
}

#[test]
fn cancel_returns_collateral() {
    let f = fixture();
    f.create();
    let receipt = f
        .m
        .notify_custom_event(&f.maker, 1, EVENT_CANCEL_ISSUANCE, &[])
        .unwrap();
    assert_eq!(receipt.state, IssuanceState::Cancelled);
    assert_eq!(f.m.escrow_balance(&f.maker, &f.collateral), 30_000);
    assert_eq!(f.m.line_items(1).unwrap()[0].state, LineItemState::Paid);
}
