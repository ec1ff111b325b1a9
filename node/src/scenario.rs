//! # Scenario Replay
//!
//! A scenario is a JSON document that declares instruments and an ordered
//! list of steps to run against them. Parties and tokens are named by label
//! and mapped onto addresses with [`Address::from_label`]; a `0x`-prefixed
//! 40-digit hex string is used verbatim.
//!
//! The replay runs on a [`ManualClock`], so `advance_days` steps make
//! engagement and due dates reachable without waiting.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use fsp_contracts::{
    policy_for, BorrowingMakerParams, LendingMakerParams, SavingMakerParams, SpotSwapMakerParams,
};
use fsp_protocol::clock::{Clock, ManualClock};
use fsp_protocol::instrument::{
    CreationFee, InstrumentConfig, InstrumentKind, InstrumentManager, InstrumentRegistry,
    IssuanceReceipt, IssuanceState,
};
use fsp_protocol::oracle::StaticPriceOracle;
use fsp_protocol::{Address, IssuanceError, NATIVE_TOKEN};

// ---------------------------------------------------------------------------
// Document Model
// ---------------------------------------------------------------------------

fn default_operator() -> String {
    "fsp".to_string()
}

fn default_true() -> bool {
    true
}

/// A complete replay document.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    /// Starting instant of the manual clock. Defaults to the current time.
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    /// Label of the party allowed to set oracle rates.
    #[serde(default = "default_operator")]
    pub oracle_operator: String,
    pub instruments: Vec<InstrumentSpec>,
    pub steps: Vec<StepSpec>,
}

/// An instrument to activate before the first step.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstrumentSpec {
    pub name: String,
    pub kind: InstrumentKind,
    #[serde(default = "default_operator")]
    pub fsp: String,
    /// Days after `start` at which new issuances stop.
    #[serde(default)]
    pub terminates_after_days: Option<i64>,
    /// Days after `start` at which the FSP may act for makers and takers.
    #[serde(default)]
    pub override_after_days: Option<i64>,
    #[serde(default)]
    pub maker_whitelist: bool,
    #[serde(default)]
    pub taker_whitelist: bool,
    #[serde(default)]
    pub creation_fee: Option<FeeSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeeSpec {
    pub token: String,
    pub amount: u64,
}

/// Largest day offset a scenario may use, and the cap on the total of its
/// `advance_days` steps.
pub const MAX_SCENARIO_DAYS: i64 = 36_500;

fn offset_days(start: DateTime<Utc>, days: i64) -> anyhow::Result<DateTime<Utc>> {
    Duration::try_days(days)
        .and_then(|delta| start.checked_add_signed(delta))
        .with_context(|| format!("day offset {days} is out of range"))
}

fn check_days(days: i64, what: &str) -> anyhow::Result<()> {
    if !(-MAX_SCENARIO_DAYS..=MAX_SCENARIO_DAYS).contains(&days) {
        bail!("{what} must be within {MAX_SCENARIO_DAYS} days, got {days}");
    }
    Ok(())
}

impl InstrumentSpec {
    fn to_config(&self, start: DateTime<Utc>) -> anyhow::Result<InstrumentConfig> {
        let mut config = InstrumentConfig::new(resolve(&self.fsp));
        config.terminates_at = self
            .terminates_after_days
            .map(|d| offset_days(start, d))
            .transpose()?;
        config.override_at = self
            .override_after_days
            .map(|d| offset_days(start, d))
            .transpose()?;
        config.maker_whitelist_enabled = self.maker_whitelist;
        config.taker_whitelist_enabled = self.taker_whitelist;
        config.creation_fee = self.creation_fee.as_ref().map(|fee| CreationFee {
            token: resolve(&fee.token),
            amount: u128::from(fee.amount),
        });
        Ok(config)
    }
}

/// One step plus an optional expected rejection reason.
#[derive(Debug, Clone, Deserialize)]
pub struct StepSpec {
    #[serde(flatten)]
    pub step: Step,
    /// When set, the step must fail with exactly this reason.
    #[serde(default)]
    pub expect_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Maker,
    Taker,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    SetRate {
        caller: String,
        base: String,
        quote: String,
        numerator: u64,
        denominator: u64,
    },
    Deposit {
        instrument: String,
        caller: String,
        token: String,
        amount: u64,
    },
    Withdraw {
        instrument: String,
        caller: String,
        token: String,
        amount: u64,
    },
    Create {
        instrument: String,
        caller: String,
        params: ProductParams,
    },
    Engage {
        instrument: String,
        caller: String,
        issuance: u64,
    },
    Repay {
        instrument: String,
        caller: String,
        issuance: u64,
        token: String,
        amount: u64,
    },
    WithdrawIssuance {
        instrument: String,
        caller: String,
        issuance: u64,
        token: String,
        amount: u64,
    },
    Notify {
        instrument: String,
        caller: String,
        issuance: u64,
        event: String,
    },
    Whitelist {
        instrument: String,
        caller: String,
        role: Role,
        party: String,
        #[serde(default = "default_true")]
        allowed: bool,
    },
    EnableWhitelist {
        instrument: String,
        caller: String,
        role: Role,
        enabled: bool,
    },
    Deactivate {
        instrument: String,
        caller: String,
    },
    AdvanceDays {
        days: i64,
    },
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::SetRate { .. } => "set_rate",
            Step::Deposit { .. } => "deposit",
            Step::Withdraw { .. } => "withdraw",
            Step::Create { .. } => "create",
            Step::Engage { .. } => "engage",
            Step::Repay { .. } => "repay",
            Step::WithdrawIssuance { .. } => "withdraw_issuance",
            Step::Notify { .. } => "notify",
            Step::Whitelist { .. } => "whitelist",
            Step::EnableWhitelist { .. } => "enable_whitelist",
            Step::Deactivate { .. } => "deactivate",
            Step::AdvanceDays { .. } => "advance_days",
        }
    }

    fn instrument(&self) -> Option<&str> {
        match self {
            Step::SetRate { .. } | Step::AdvanceDays { .. } => None,
            Step::Deposit { instrument, .. }
            | Step::Withdraw { instrument, .. }
            | Step::Create { instrument, .. }
            | Step::Engage { instrument, .. }
            | Step::Repay { instrument, .. }
            | Step::WithdrawIssuance { instrument, .. }
            | Step::Notify { instrument, .. }
            | Step::Whitelist { instrument, .. }
            | Step::EnableWhitelist { instrument, .. }
            | Step::Deactivate { instrument, .. } => Some(instrument),
        }
    }
}

/// Maker terms for a `create` step, keyed by product.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductParams {
    Lending {
        collateral_token: String,
        lending_token: String,
        lending_amount: u64,
        tenor_days: u32,
        interest_rate: u32,
        collateral_ratio: u32,
    },
    Borrowing {
        collateral_token: String,
        borrowing_token: String,
        borrowing_amount: u64,
        tenor_days: u32,
        interest_rate: u32,
        collateral_ratio: u32,
    },
    SpotSwap {
        input_token: String,
        input_amount: u64,
        output_token: String,
        output_amount: u64,
        duration_days: u32,
    },
    Saving {
        token: String,
        amount: u64,
        tenor_days: u32,
        interest_rate: u32,
    },
}

impl ProductParams {
    pub fn kind(&self) -> InstrumentKind {
        match self {
            ProductParams::Lending { .. } => InstrumentKind::Lending,
            ProductParams::Borrowing { .. } => InstrumentKind::Borrowing,
            ProductParams::SpotSwap { .. } => InstrumentKind::SpotSwap,
            ProductParams::Saving { .. } => InstrumentKind::Saving,
        }
    }

    fn encode(&self) -> Result<Vec<u8>, IssuanceError> {
        match self {
            ProductParams::Lending {
                collateral_token,
                lending_token,
                lending_amount,
                tenor_days,
                interest_rate,
                collateral_ratio,
            } => LendingMakerParams {
                collateral_token: resolve(collateral_token),
                lending_token: resolve(lending_token),
                lending_amount: u128::from(*lending_amount),
                tenor_days: *tenor_days,
                interest_rate: *interest_rate,
                collateral_ratio: *collateral_ratio,
            }
            .to_bytes(),
            ProductParams::Borrowing {
                collateral_token,
                borrowing_token,
                borrowing_amount,
                tenor_days,
                interest_rate,
                collateral_ratio,
            } => BorrowingMakerParams {
                collateral_token: resolve(collateral_token),
                borrowing_token: resolve(borrowing_token),
                borrowing_amount: u128::from(*borrowing_amount),
                tenor_days: *tenor_days,
                interest_rate: *interest_rate,
                collateral_ratio: *collateral_ratio,
            }
            .to_bytes(),
            ProductParams::SpotSwap {
                input_token,
                input_amount,
                output_token,
                output_amount,
                duration_days,
            } => SpotSwapMakerParams {
                input_token: resolve(input_token),
                input_amount: u128::from(*input_amount),
                output_token: resolve(output_token),
                output_amount: u128::from(*output_amount),
                duration_days: *duration_days,
            }
            .to_bytes(),
            ProductParams::Saving {
                token,
                amount,
                tenor_days,
                interest_rate,
            } => SavingMakerParams {
                token: resolve(token),
                amount: u128::from(*amount),
                tenor_days: *tenor_days,
                interest_rate: *interest_rate,
            }
            .to_bytes(),
        }
    }
}

/// Maps a label onto an address. `native` names the native token.
pub fn resolve(label: &str) -> Address {
    if label == "native" {
        return NATIVE_TOKEN;
    }
    if label.starts_with("0x") {
        if let Ok(address) = Address::from_hex(label) {
            return address;
        }
    }
    Address::from_label(label)
}

impl Scenario {
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("failed to parse scenario {}", path.display()))
    }

    /// Structural checks that don't need a running registry.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.instruments.is_empty() {
            bail!("scenario declares no instruments");
        }

        let mut kinds = HashMap::new();
        for spec in &self.instruments {
            if kinds.insert(spec.name.as_str(), spec.kind).is_some() {
                bail!("duplicate instrument name: {}", spec.name);
            }
            if let Some(days) = spec.terminates_after_days {
                check_days(days, &format!("{}: terminates_after_days", spec.name))?;
            }
            if let Some(days) = spec.override_after_days {
                check_days(days, &format!("{}: override_after_days", spec.name))?;
            }
        }

        let mut advanced = 0i64;
        for (index, spec) in self.steps.iter().enumerate() {
            if let Some(name) = spec.step.instrument() {
                let Some(kind) = kinds.get(name) else {
                    bail!("step {index}: unknown instrument {name}");
                };
                if let Step::Create { params, .. } = &spec.step {
                    if params.kind() != *kind {
                        bail!(
                            "step {index}: {} params on {kind} instrument {name}",
                            params.kind()
                        );
                    }
                }
            }
            if let Step::AdvanceDays { days } = spec.step {
                if days < 0 {
                    bail!("step {index}: advance_days must not be negative");
                }
                advanced = advanced.saturating_add(days);
                if advanced > MAX_SCENARIO_DAYS {
                    bail!("step {index}: scenario advances more than {MAX_SCENARIO_DAYS} days");
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// JSON line printed for each executed step.
#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub step: usize,
    pub op: &'static str,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuance_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<IssuanceState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfers: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<u128>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// `false` when the step disagreed with its `expect_error`, or failed
    /// without one.
    pub as_expected: bool,
}

enum Effect {
    Receipt(IssuanceReceipt),
    Balance(u128),
    Done,
}

/// Owns the registry a scenario runs against.
pub struct ScenarioRunner {
    registry: InstrumentRegistry,
    oracle: Arc<StaticPriceOracle>,
    clock: Arc<ManualClock>,
    instruments: HashMap<String, Arc<InstrumentManager>>,
}

impl ScenarioRunner {
    /// Activates every declared instrument.
    pub fn new(scenario: &Scenario) -> anyhow::Result<Self> {
        let oracle = Arc::new(StaticPriceOracle::new(resolve(&scenario.oracle_operator)));
        let clock = Arc::new(ManualClock::new(scenario.start.unwrap_or_else(Utc::now)));
        let registry = InstrumentRegistry::new(oracle.clone(), clock.clone());
        let start = clock.now();

        let mut instruments = HashMap::new();
        for spec in &scenario.instruments {
            let manager =
                registry.activate_instrument(policy_for(spec.kind), spec.to_config(start)?)?;
            info!(name = %spec.name, id = %manager.id(), kind = %spec.kind, "instrument activated");
            instruments.insert(spec.name.clone(), manager);
        }

        Ok(Self {
            registry,
            oracle,
            clock,
            instruments,
        })
    }

    pub fn instrument_count(&self) -> usize {
        self.registry.len()
    }

    pub fn manager(&self, name: &str) -> Option<&Arc<InstrumentManager>> {
        self.instruments.get(name)
    }

    /// Runs the conservation audit on every instrument. Returns the names
    /// of the instruments that fail it.
    pub fn audit(&self) -> Vec<String> {
        let mut failed: Vec<String> = self
            .instruments
            .iter()
            .filter(|(_, manager)| !manager.audit())
            .map(|(name, _)| name.clone())
            .collect();
        failed.sort();
        failed
    }

    pub fn run_step(&self, index: usize, spec: &StepSpec) -> StepOutcome {
        let op = spec.step.name();
        let mut outcome = StepOutcome {
            step: index,
            op,
            ok: false,
            issuance_id: None,
            state: None,
            transfers: None,
            balance: None,
            error_kind: None,
            error: None,
            as_expected: false,
        };

        match self.execute(&spec.step) {
            Ok(effect) => {
                outcome.ok = true;
                match effect {
                    Effect::Receipt(receipt) => {
                        outcome.issuance_id = Some(receipt.issuance_id);
                        outcome.state = Some(receipt.state);
                        outcome.transfers = Some(receipt.transfers.len());
                    }
                    Effect::Balance(balance) => outcome.balance = Some(balance),
                    Effect::Done => {}
                }
                outcome.as_expected = spec.expect_error.is_none();
                debug!(step = index, op, "step committed");
            }
            Err(err) => {
                let reason = err.reason();
                outcome.as_expected = spec.expect_error.as_deref() == Some(reason.as_str());
                if !outcome.as_expected {
                    warn!(step = index, op, kind = %err.kind(), %reason, "step rejected");
                }
                outcome.error_kind = Some(err.kind().to_string());
                outcome.error = Some(reason);
            }
        }
        outcome
    }

    fn lookup(&self, name: &str) -> Result<&Arc<InstrumentManager>, IssuanceError> {
        self.instruments
            .get(name)
            .ok_or_else(|| IssuanceError::state(format!("Instrument not found: {name}")))
    }

    fn execute(&self, step: &Step) -> Result<Effect, IssuanceError> {
        match step {
            Step::SetRate {
                caller,
                base,
                quote,
                numerator,
                denominator,
            } => {
                self.oracle.set_rate(
                    &resolve(caller),
                    resolve(base),
                    resolve(quote),
                    u128::from(*numerator),
                    u128::from(*denominator),
                )?;
                Ok(Effect::Done)
            }
            Step::Deposit {
                instrument,
                caller,
                token,
                amount,
            } => {
                let balance = self.lookup(instrument)?.deposit_to_escrow(
                    &resolve(caller),
                    resolve(token),
                    u128::from(*amount),
                )?;
                Ok(Effect::Balance(balance))
            }
            Step::Withdraw {
                instrument,
                caller,
                token,
                amount,
            } => {
                let balance = self.lookup(instrument)?.withdraw_from_escrow(
                    &resolve(caller),
                    resolve(token),
                    u128::from(*amount),
                )?;
                Ok(Effect::Balance(balance))
            }
            Step::Create {
                instrument,
                caller,
                params,
            } => {
                let bytes = params.encode()?;
                let receipt = self
                    .lookup(instrument)?
                    .create_issuance(&resolve(caller), &bytes)?;
                Ok(Effect::Receipt(receipt))
            }
            Step::Engage {
                instrument,
                caller,
                issuance,
            } => {
                let receipt = self
                    .lookup(instrument)?
                    .engage_issuance(&resolve(caller), *issuance, &[])?;
                Ok(Effect::Receipt(receipt))
            }
            Step::Repay {
                instrument,
                caller,
                issuance,
                token,
                amount,
            } => {
                let receipt = self.lookup(instrument)?.deposit_to_issuance(
                    &resolve(caller),
                    *issuance,
                    resolve(token),
                    u128::from(*amount),
                )?;
                Ok(Effect::Receipt(receipt))
            }
            Step::WithdrawIssuance {
                instrument,
                caller,
                issuance,
                token,
                amount,
            } => {
                let receipt = self.lookup(instrument)?.withdraw_from_issuance(
                    &resolve(caller),
                    *issuance,
                    resolve(token),
                    u128::from(*amount),
                )?;
                Ok(Effect::Receipt(receipt))
            }
            Step::Notify {
                instrument,
                caller,
                issuance,
                event,
            } => {
                let receipt = self.lookup(instrument)?.notify_custom_event(
                    &resolve(caller),
                    *issuance,
                    event,
                    &[],
                )?;
                Ok(Effect::Receipt(receipt))
            }
            Step::Whitelist {
                instrument,
                caller,
                role,
                party,
                allowed,
            } => {
                let manager = self.lookup(instrument)?;
                let caller = resolve(caller);
                match role {
                    Role::Maker => manager.set_maker_whitelist(&caller, resolve(party), *allowed)?,
                    Role::Taker => manager.set_taker_whitelist(&caller, resolve(party), *allowed)?,
                }
                Ok(Effect::Done)
            }
            Step::EnableWhitelist {
                instrument,
                caller,
                role,
                enabled,
            } => {
                let manager = self.lookup(instrument)?;
                let caller = resolve(caller);
                match role {
                    Role::Maker => manager.set_maker_whitelist_enabled(&caller, *enabled)?,
                    Role::Taker => manager.set_taker_whitelist_enabled(&caller, *enabled)?,
                }
                Ok(Effect::Done)
            }
            Step::Deactivate { instrument, caller } => {
                self.lookup(instrument)?.deactivate(&resolve(caller))?;
                Ok(Effect::Done)
            }
            Step::AdvanceDays { days } => {
                self.clock.advance_days(*days);
                Ok(Effect::Done)
            }
        }
    }
}

/// Names of the instruments referenced by at least one step.
pub fn referenced_instruments(scenario: &Scenario) -> HashSet<&str> {
    scenario
        .steps
        .iter()
        .filter_map(|spec| spec.step.instrument())
        .collect()
}
