//! Capital guard parameters

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Reserve and sizing limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CapitalGuardConfig {
    /// Fraction of equity never committed as margin
    pub reserve_ratio: Decimal,
    /// Fraction of usable capital put at risk per trade (stop distance sizing)
    pub max_risk_per_trade: Decimal,
    /// Below this much usable capital no entry is attempted
    pub min_usable_capital: Decimal,
    /// Never size above this fraction of visible resting liquidity
    pub liquidity_fraction: Decimal,
    /// Book levels counted as visible liquidity
    pub liquidity_levels: usize,
}

impl Default for CapitalGuardConfig {
    fn default() -> Self {
        Self {
            reserve_ratio: dec!(0.30),      // 30% of equity held back
            max_risk_per_trade: dec!(0.02), // 2% of usable per stop-out
            min_usable_capital: dec!(10),   // $10 floor
            liquidity_fraction: dec!(0.10), // 10% of top-of-book size
            liquidity_levels: 5,
        }
    }
}

impl CapitalGuardConfig {
    /// Builder: set reserve ratio
    pub fn with_reserve_ratio(mut self, ratio: Decimal) -> Self {
        self.reserve_ratio = ratio;
        self
    }

    /// Builder: set the usable-capital floor
    pub fn with_min_usable(mut self, floor: Decimal) -> Self {
        self.min_usable_capital = floor;
        self
    }

    /// Reserve ratio clamped into [0, 1)
    pub fn effective_reserve_ratio(&self) -> Decimal {
        self.reserve_ratio.max(Decimal::ZERO).min(dec!(0.99))
    }
}
