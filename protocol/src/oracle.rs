//! # Price Oracle
//!
//! Collateral sizing needs an exchange rate between two tokens. The engine
//! only depends on the read side, [`PriceOracle::get_rate`]; the reference
//! [`StaticPriceOracle`] keeps operator-set rates in memory and stores every
//! rate in both directions so that `(a, b)` and `(b, a)` always agree.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::IssuanceError;
use crate::types::{Address, TokenId};

/// An exchange rate expressed as a fraction: one unit of the base token is
/// worth `numerator / denominator` units of the quote token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rate {
    pub numerator: u128,
    pub denominator: u128,
}

impl Rate {
    pub fn new(numerator: u128, denominator: u128) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// The reverse-direction rate.
    pub fn inverse(&self) -> Self {
        Self {
            numerator: self.denominator,
            denominator: self.numerator,
        }
    }

    /// Converts `amount` of the base token into the quote token, rounding
    /// down. Returns `None` on overflow or a zero denominator.
    pub fn convert(&self, amount: u128) -> Option<u128> {
        amount
            .checked_mul(self.numerator)?
            .checked_div(self.denominator)
    }
}

/// Read contract consumed by instrument policies.
///
/// Reads are synchronous and side-effect free, so policies may call them
/// while the manager holds its lock.
pub trait PriceOracle: Send + Sync {
    /// Returns the rate from `base` to `quote`.
    ///
    /// # Errors
    ///
    /// [`IssuanceError::Validation`] ("Price not set") if no rate is known.
    fn get_rate(&self, base: &TokenId, quote: &TokenId) -> Result<Rate, IssuanceError>;
}

/// In-memory oracle whose rates are set by a single operator.
pub struct StaticPriceOracle {
    operator: Address,
    rates: RwLock<HashMap<(TokenId, TokenId), Rate>>,
}

impl StaticPriceOracle {
    pub fn new(operator: Address) -> Self {
        Self {
            operator,
            rates: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the operator allowed to set rates.
    pub fn operator(&self) -> Address {
        self.operator
    }

    /// Sets the rate from `base` to `quote` and its inverse.
    ///
    /// # Errors
    ///
    /// [`IssuanceError::Authorization`] if `caller` is not the operator,
    /// [`IssuanceError::Validation`] for unset tokens or a zero term.
    pub fn set_rate(
        &self,
        caller: &Address,
        base: TokenId,
        quote: TokenId,
        numerator: u128,
        denominator: u128,
    ) -> Result<(), IssuanceError> {
        if *caller != self.operator {
            return Err(IssuanceError::authorization("Only operator can set rates"));
        }
        if base.is_unset() || quote.is_unset() {
            return Err(IssuanceError::validation("Token not set"));
        }
        if numerator == 0 || denominator == 0 {
            return Err(IssuanceError::validation("Rate not set"));
        }

        let rate = Rate::new(numerator, denominator);
        let mut rates = self.rates.write();
        rates.insert((base, quote), rate);
        rates.insert((quote, base), rate.inverse());
        tracing::debug!(%base, %quote, numerator, denominator, "oracle rate set");
        Ok(())
    }
}

impl PriceOracle for StaticPriceOracle {
    fn get_rate(&self, base: &TokenId, quote: &TokenId) -> Result<Rate, IssuanceError> {
        if base == quote {
            return Ok(Rate::new(1, 1));
        }
        self.rates
            .read()
            .get(&(*base, *quote))
            .copied()
            .ok_or_else(|| IssuanceError::validation("Price not set"))
    }
}
