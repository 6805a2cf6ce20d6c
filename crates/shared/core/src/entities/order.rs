use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Side;
use crate::values::{Price, Quantity, Symbol};

/// Venue-assigned order identifier
pub type OrderId = String;

/// Order types the engine sends and reconciles against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderKind {
    /// Rests on the book at a limit price
    Limit,
    /// Executes immediately against resting liquidity
    Market,
    /// Market order released when the trigger price trades
    StopMarket,
}

/// A resting order as reported by the venue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenOrder {
    pub id: OrderId,
    pub symbol: Symbol,
    pub side: Side,
    pub kind: OrderKind,
    /// Limit price; absent for stops
    pub price: Option<Price>,
    /// Trigger price; present for stops only
    pub trigger_price: Option<Price>,
    /// Remaining (unfilled) quantity
    pub quantity: Quantity,
}

impl OpenOrder {
    pub fn is_stop(&self) -> bool {
        self.kind == OrderKind::StopMarket || self.trigger_price.is_some()
    }

    /// Resting limit order (candidate entry or take-profit)
    pub fn is_resting_limit(&self) -> bool {
        self.kind == OrderKind::Limit && !self.is_stop()
    }
}

/// Everything needed to submit one order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderInstruction {
    pub symbol: Symbol,
    pub side: Side,
    pub kind: OrderKind,
    pub quantity: Quantity,
    pub price: Option<Price>,
    pub trigger_price: Option<Price>,
    /// Reject rather than take liquidity
    pub post_only: bool,
    /// May only shrink an existing position
    pub reduce_only: bool,
}

impl OrderInstruction {
    /// Maker order that is rejected if it would cross
    pub fn post_only_limit(
        symbol: impl Into<Symbol>,
        side: Side,
        quantity: Quantity,
        price: Price,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            kind: OrderKind::Limit,
            quantity,
            price: Some(price),
            trigger_price: None,
            post_only: true,
            reduce_only: false,
        }
    }

    pub fn market(symbol: impl Into<Symbol>, side: Side, quantity: Quantity) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            kind: OrderKind::Market,
            quantity,
            price: None,
            trigger_price: None,
            post_only: false,
            reduce_only: false,
        }
    }

    /// Protective stop, always reduce-only
    pub fn stop_market(
        symbol: impl Into<Symbol>,
        side: Side,
        quantity: Quantity,
        trigger_price: Price,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            kind: OrderKind::StopMarket,
            quantity,
            price: None,
            trigger_price: Some(trigger_price),
            post_only: false,
            reduce_only: true,
        }
    }

    /// Builder: mark as reduce-only
    pub fn reduce_only(mut self) -> Self {
        self.reduce_only = true;
        self
    }

    /// Notional at the limit (or trigger) price, zero for market orders
    pub fn notional(&self) -> Decimal {
        self.price
            .or(self.trigger_price)
            .map(|p| p * self.quantity)
            .unwrap_or(Decimal::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_post_only_limit() {
        let order = OrderInstruction::post_only_limit("SOL_USDC_PERP", Side::Buy, dec!(2), dec!(150));
        assert_eq!(order.kind, OrderKind::Limit);
        assert!(order.post_only);
        assert!(!order.reduce_only);
        assert_eq!(order.notional(), dec!(300));
    }

    #[test]
    fn test_stop_market_is_reduce_only() {
        let order = OrderInstruction::stop_market("SOL_USDC_PERP", Side::Sell, dec!(2), dec!(140));
        assert!(order.reduce_only);
        assert_eq!(order.trigger_price, Some(dec!(140)));
        assert_eq!(order.price, None);
    }

    #[test]
    fn test_open_order_classification() {
        let stop = OpenOrder {
            id: "1".into(),
            symbol: "SOL_USDC_PERP".into(),
            side: Side::Sell,
            kind: OrderKind::StopMarket,
            price: None,
            trigger_price: Some(dec!(140)),
            quantity: dec!(2),
        };
        assert!(stop.is_stop());
        assert!(!stop.is_resting_limit());

        let limit = OpenOrder {
            kind: OrderKind::Limit,
            price: Some(dec!(151)),
            trigger_price: None,
            ..stop
        };
        assert!(limit.is_resting_limit());
    }
}
