//! # Instrument Module: Issuance Lifecycle
//!
//! ```text
//! issuance.rs  - issuance header and state machine
//! plan.rs      - mutation plans returned by policies
//! policy.rs    - the InstrumentPolicy trait and its read-only views
//! manager.rs   - per-instrument orchestration and atomic commit
//! registry.rs  - instrument activation and lookup
//! ```

pub mod issuance;
pub mod manager;
pub mod plan;
pub mod policy;
pub mod registry;

pub use issuance::{Issuance, IssuanceState};
pub use manager::{CreationFee, InstrumentConfig, InstrumentId, InstrumentManager, IssuanceReceipt};
pub use plan::{MutationPlan, PlanStep, TransferInstruction, TransferKind};
pub use policy::{InstrumentKind, InstrumentPolicy, IssuanceEvent, IssuanceView, PolicyContext};
pub use registry::InstrumentRegistry;
