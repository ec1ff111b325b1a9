//! Instrument registry.
//!
//! Activation creates a manager, binds it to a policy and hands back the
//! instrument id. Lookups go through a `DashMap` so callers on different
//! instruments never contend on a shared lock; all serialization happens
//! inside each manager.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use uuid::Uuid;

use super::manager::{InstrumentConfig, InstrumentId, InstrumentManager};
use super::policy::InstrumentPolicy;
use crate::clock::{Clock, SystemClock};
use crate::codec::{BincodeCodec, IssuanceCodec};
use crate::error::IssuanceError;
use crate::oracle::PriceOracle;

/// Activated instruments, keyed by id.
pub struct InstrumentRegistry {
    managers: DashMap<InstrumentId, Arc<InstrumentManager>>,
    oracle: Arc<dyn PriceOracle>,
    clock: Arc<dyn Clock>,
    codec: Arc<dyn IssuanceCodec>,
}

impl fmt::Debug for InstrumentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstrumentRegistry")
            .field("instruments", &self.managers.len())
            .finish()
    }
}

impl InstrumentRegistry {
    /// Creates a registry whose managers share `oracle` and `clock` and use
    /// the bincode snapshot codec.
    pub fn new(oracle: Arc<dyn PriceOracle>, clock: Arc<dyn Clock>) -> Self {
        Self::with_codec(oracle, clock, Arc::new(BincodeCodec))
    }

    /// A registry on wall-clock time.
    pub fn with_system_clock(oracle: Arc<dyn PriceOracle>) -> Self {
        Self::new(oracle, Arc::new(SystemClock))
    }

    pub fn with_codec(
        oracle: Arc<dyn PriceOracle>,
        clock: Arc<dyn Clock>,
        codec: Arc<dyn IssuanceCodec>,
    ) -> Self {
        Self {
            managers: DashMap::new(),
            oracle,
            clock,
            codec,
        }
    }

    /// Activates a new instrument and returns its manager.
    ///
    /// # Errors
    ///
    /// [`IssuanceError::Validation`] if the config has no FSP.
    pub fn activate_instrument(
        &self,
        policy: Arc<dyn InstrumentPolicy>,
        config: InstrumentConfig,
    ) -> Result<Arc<InstrumentManager>, IssuanceError> {
        if config.fsp.is_unset() {
            return Err(IssuanceError::validation("FSP not set"));
        }
        let id = Uuid::new_v4();
        let kind = policy.kind();
        let fsp = config.fsp;
        let manager = Arc::new(InstrumentManager::new(
            id,
            policy,
            config,
            Arc::clone(&self.oracle),
            Arc::clone(&self.clock),
            Arc::clone(&self.codec),
        ));
        self.managers.insert(id, Arc::clone(&manager));
        tracing::info!(instrument = %id, %kind, %fsp, "instrument activated");
        Ok(manager)
    }

    /// Returns the manager for `id`.
    pub fn lookup(&self, id: &InstrumentId) -> Result<Arc<InstrumentManager>, IssuanceError> {
        self.managers
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| IssuanceError::state("Instrument not found"))
    }

    /// Ids of all activated instruments.
    pub fn instruments(&self) -> Vec<InstrumentId> {
        self.managers.iter().map(|entry| *entry.key()).collect()
    }

    pub fn len(&self) -> usize {
        self.managers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.managers.is_empty()
    }

    pub fn oracle(&self) -> Arc<dyn PriceOracle> {
        Arc::clone(&self.oracle)
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::ErrorKind;
    use crate::instrument::plan::MutationPlan;
    use crate::instrument::policy::{InstrumentKind, IssuanceEvent, IssuanceView, PolicyContext};
    use crate::oracle::StaticPriceOracle;
    use crate::types::Address;

    struct NoopPolicy;

    impl InstrumentPolicy for NoopPolicy {
        fn kind(&self) -> InstrumentKind {
            InstrumentKind::Saving
        }

        fn validate_create(
            &self,
            _ctx: &PolicyContext<'_>,
            _view: IssuanceView<'_>,
            _params: &[u8],
        ) -> Result<MutationPlan, IssuanceError> {
            Ok(MutationPlan::new())
        }

        fn compute_engage(
            &self,
            _ctx: &PolicyContext<'_>,
            _view: IssuanceView<'_>,
            _params: &[u8],
        ) -> Result<MutationPlan, IssuanceError> {
            Ok(MutationPlan::new())
        }

        fn handle_event(
            &self,
            _ctx: &PolicyContext<'_>,
            _view: IssuanceView<'_>,
            _event: IssuanceEvent<'_>,
        ) -> Result<MutationPlan, IssuanceError> {
            Ok(MutationPlan::new())
        }
    }

    fn registry() -> InstrumentRegistry {
        let fsp = Address::from_label("fsp");
        InstrumentRegistry::new(
            Arc::new(StaticPriceOracle::new(fsp)),
            Arc::new(ManualClock::starting_now()),
        )
    }

    #[test]
    fn activation_and_lookup() {
        let reg = registry();
        assert!(reg.is_empty());
        let fsp = Address::from_label("fsp");

        let a = reg
            .activate_instrument(Arc::new(NoopPolicy), InstrumentConfig::new(fsp))
            .unwrap();
        let b = reg
            .activate_instrument(Arc::new(NoopPolicy), InstrumentConfig::new(fsp))
            .unwrap();

        assert_ne!(a.id(), b.id());
        assert_ne!(a.instrument_escrow_address(), b.instrument_escrow_address());
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.lookup(&a.id()).unwrap().id(), a.id());
        assert_eq!(a.kind(), InstrumentKind::Saving);

        let mut ids = reg.instruments();
        ids.sort();
        let mut expected = vec![a.id(), b.id()];
        expected.sort();
        assert_eq!(ids, expected);
    }

    #[test]
    fn activation_requires_fsp() {
        let reg = registry();
        let err = reg
            .activate_instrument(Arc::new(NoopPolicy), InstrumentConfig::new(Address::ZERO))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(reg.is_empty());
    }

    #[test]
    fn unknown_instrument() {
        let reg = registry();
        let err = reg.lookup(&Uuid::new_v4()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::State);
    }
}
