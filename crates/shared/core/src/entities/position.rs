use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::PositionSide;
use crate::values::{Price, Quantity, Symbol};

/// Venue-reported position mirror (read-only to the engine)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: Symbol,
    /// Signed quantity: positive long, negative short, zero flat
    pub net_quantity: Quantity,
    /// Average entry price
    pub entry_price: Price,
    /// Current mark price
    pub mark_price: Price,
}

impl Position {
    pub fn new(
        symbol: impl Into<Symbol>,
        net_quantity: Quantity,
        entry_price: Price,
        mark_price: Price,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            net_quantity,
            entry_price,
            mark_price,
        }
    }

    pub fn side(&self) -> Option<PositionSide> {
        PositionSide::from_net_quantity(self.net_quantity)
    }

    /// Absolute size
    pub fn quantity(&self) -> Quantity {
        self.net_quantity.abs()
    }

    pub fn is_flat(&self) -> bool {
        self.net_quantity.is_zero()
    }

    /// Return since entry as a fraction, signed in favour of the position
    pub fn return_fraction(&self, price: Price) -> Decimal {
        if self.entry_price.is_zero() {
            return Decimal::ZERO;
        }
        let raw = (price - self.entry_price) / self.entry_price;
        match self.side() {
            Some(side) => raw * side.sign(),
            None => Decimal::ZERO,
        }
    }

    /// Unrealized P&L at the mark price
    pub fn unrealized_pnl(&self) -> Decimal {
        self.net_quantity * (self.mark_price - self.entry_price)
    }

    /// Notional at entry
    pub fn notional(&self) -> Decimal {
        self.quantity() * self.entry_price
    }
}
