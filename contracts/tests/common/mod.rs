//! Shared fixture for the product integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use fsp_contracts::policy_for;
use fsp_protocol::clock::ManualClock;
use fsp_protocol::instrument::{InstrumentConfig, InstrumentKind, InstrumentManager, InstrumentRegistry};
use fsp_protocol::oracle::StaticPriceOracle;
use fsp_protocol::Address;

/// A registry on a manual clock with an oracle operated by the FSP.
pub struct Harness {
    pub registry: InstrumentRegistry,
    pub oracle: Arc<StaticPriceOracle>,
    pub clock: Arc<ManualClock>,
    pub fsp: Address,
}

impl Harness {
    pub fn new() -> Self {
        let fsp = addr("fsp");
        let oracle = Arc::new(StaticPriceOracle::new(fsp));
        let clock = Arc::new(ManualClock::starting_now());
        let registry = InstrumentRegistry::new(oracle.clone(), clock.clone());
        Self {
            registry,
            oracle,
            clock,
            fsp,
        }
    }

    pub fn activate(&self, kind: InstrumentKind) -> Arc<InstrumentManager> {
        self.registry
            .activate_instrument(policy_for(kind), InstrumentConfig::new(self.fsp))
            .unwrap()
    }

    pub fn set_rate(&self, base: Address, quote: Address, numerator: u128, denominator: u128) {
        self.oracle
            .set_rate(&self.fsp, base, quote, numerator, denominator)
            .unwrap();
    }
}

pub fn addr(label: &str) -> Address {
    Address::from_label(label)
}
