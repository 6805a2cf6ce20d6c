use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::values::{Price, Quantity, Symbol};

/// A linear perpetual contract plus its current best bid/ask
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    /// Contract symbol (e.g., "BTC_USDC_PERP")
    pub symbol: Symbol,
    /// Minimum price increment
    pub tick_size: Price,
    /// Minimum quantity increment
    pub step_size: Quantity,
    pub best_bid: Option<Price>,
    pub best_ask: Option<Price>,
}

impl Instrument {
    pub fn new(symbol: impl Into<Symbol>, tick_size: Price, step_size: Quantity) -> Self {
        Self {
            symbol: symbol.into(),
            tick_size,
            step_size,
            best_bid: None,
            best_ask: None,
        }
    }

    /// Builder: attach the current touch
    pub fn with_touch(mut self, best_bid: Option<Price>, best_ask: Option<Price>) -> Self {
        self.best_bid = best_bid;
        self.best_ask = best_ask;
        self
    }

    /// Round a price down to the nearest valid tick
    pub fn round_price_down(&self, price: Price) -> Price {
        if self.tick_size.is_zero() {
            return price;
        }
        ((price / self.tick_size).floor() * self.tick_size).normalize()
    }

    /// Round a price up to the nearest valid tick
    pub fn round_price_up(&self, price: Price) -> Price {
        if self.tick_size.is_zero() {
            return price;
        }
        ((price / self.tick_size).ceil() * self.tick_size).normalize()
    }

    /// Round a price to the nearest tick
    pub fn round_price(&self, price: Price) -> Price {
        if self.tick_size.is_zero() {
            return price;
        }
        ((price / self.tick_size).round() * self.tick_size).normalize()
    }

    /// Round a quantity down to the nearest valid step
    pub fn round_quantity_down(&self, quantity: Quantity) -> Quantity {
        if self.step_size.is_zero() {
            return quantity;
        }
        ((quantity / self.step_size).floor() * self.step_size).normalize()
    }

    /// Round a quantity to the nearest step
    pub fn round_quantity(&self, quantity: Quantity) -> Quantity {
        if self.step_size.is_zero() {
            return quantity;
        }
        ((quantity / self.step_size).round() * self.step_size).normalize()
    }

    /// Tick expressed as a fraction of `price`
    pub fn tick_fraction(&self, price: Price) -> Decimal {
        if price.is_zero() {
            return Decimal::ZERO;
        }
        self.tick_size / price
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sol() -> Instrument {
        Instrument::new("SOL_USDC_PERP", dec!(0.01), dec!(0.1))
    }

    #[test]
    fn test_price_rounding() {
        let inst = sol();
        assert_eq!(inst.round_price_down(dec!(150.019)), dec!(150.01));
        assert_eq!(inst.round_price_up(dec!(150.011)), dec!(150.02));
        assert_eq!(inst.round_price(dec!(150.016)), dec!(150.02));
    }

    #[test]
    fn test_quantity_rounding() {
        let inst = sol();
        assert_eq!(inst.round_quantity_down(dec!(34.59)), dec!(34.5));
        assert_eq!(inst.round_quantity(dec!(34.56)), dec!(34.6));
    }

    #[test]
    fn test_zero_increments_pass_through() {
        let inst = Instrument::new("X", Decimal::ZERO, Decimal::ZERO);
        assert_eq!(inst.round_price_down(dec!(1.2345)), dec!(1.2345));
        assert_eq!(inst.round_quantity_down(dec!(0.333)), dec!(0.333));
    }
}
