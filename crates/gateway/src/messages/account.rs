//! Account payloads: positions, open orders and collateral

use meridian_core::{AccountBalance, OpenOrder, OrderKind, Position, Side};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::WireError;

/// Position payload; the venue has used both `netQuantity` and `quantity`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionWire {
    pub symbol: String,
    #[serde(rename = "netQuantity", alias = "quantity", alias = "net_quantity")]
    pub net_quantity: Decimal,
    #[serde(rename = "entryPrice", alias = "entry_price", default)]
    pub entry_price: Decimal,
    #[serde(rename = "markPrice", alias = "mark_price", default)]
    pub mark_price: Decimal,
}

impl From<PositionWire> for Position {
    fn from(wire: PositionWire) -> Self {
        Position::new(
            wire.symbol,
            wire.net_quantity,
            wire.entry_price,
            wire.mark_price,
        )
    }
}

/// Normalize a position list, dropping flat rows
pub fn positions_from_wire(wires: Vec<PositionWire>) -> Vec<Position> {
    wires
        .into_iter()
        .map(Position::from)
        .filter(|p| !p.is_flat())
        .collect()
}

/// Open-order payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenOrderWire {
    pub id: String,
    pub symbol: String,
    pub side: String,
    #[serde(rename = "orderType", alias = "type", alias = "order_type")]
    pub order_type: String,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(rename = "triggerPrice", alias = "trigger_price", default)]
    pub trigger_price: Option<Decimal>,
    pub quantity: Decimal,
    #[serde(rename = "executedQuantity", default)]
    pub executed_quantity: Option<Decimal>,
}

pub fn parse_side(raw: &str) -> Result<Side, WireError> {
    match raw {
        "Bid" | "Buy" | "BUY" | "bid" | "buy" => Ok(Side::Buy),
        "Ask" | "Sell" | "SELL" | "ask" | "sell" => Ok(Side::Sell),
        other => Err(WireError::UnknownSide(other.to_string())),
    }
}

/// Venues report stops either as a stop type or as a Market with a trigger
fn parse_kind(raw: &str, trigger: Option<Decimal>) -> Result<OrderKind, WireError> {
    let triggered = trigger.is_some_and(|t| t > Decimal::ZERO);
    if raw.contains("Stop") || (raw == "Market" && triggered) {
        return Ok(OrderKind::StopMarket);
    }
    match raw {
        "Limit" | "LIMIT" => Ok(OrderKind::Limit),
        "Market" | "MARKET" => Ok(OrderKind::Market),
        other => Err(WireError::UnknownOrderType(other.to_string())),
    }
}

impl TryFrom<OpenOrderWire> for OpenOrder {
    type Error = WireError;

    fn try_from(wire: OpenOrderWire) -> Result<Self, Self::Error> {
        let side = parse_side(&wire.side)?;
        let trigger_price = wire.trigger_price.filter(|t| *t > Decimal::ZERO);
        let kind = parse_kind(&wire.order_type, trigger_price)?;
        let remaining = wire.quantity - wire.executed_quantity.unwrap_or(Decimal::ZERO);
        Ok(OpenOrder {
            id: wire.id,
            symbol: wire.symbol,
            side,
            kind,
            price: wire.price.filter(|p| *p > Decimal::ZERO),
            trigger_price,
            quantity: remaining.max(Decimal::ZERO),
        })
    }
}

/// Collateral payload: `netEquity`/`equity` and `netEquityAvailable`/`availableToTrade`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollateralWire {
    #[serde(rename = "netEquity", alias = "equity")]
    pub equity: Option<Decimal>,
    #[serde(rename = "netEquityAvailable", alias = "availableToTrade", alias = "available")]
    pub available: Option<Decimal>,
}

impl TryFrom<CollateralWire> for AccountBalance {
    type Error = WireError;

    fn try_from(wire: CollateralWire) -> Result<Self, Self::Error> {
        let equity = wire.equity.ok_or(WireError::MissingField("netEquity"))?;
        let available = wire
            .available
            .ok_or(WireError::MissingField("netEquityAvailable"))?;
        Ok(AccountBalance::new(equity, available))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::decode;
    use rust_decimal_macros::dec;

    #[test]
    fn test_position_field_variants_normalize() {
        let a: PositionWire = decode(
            r#"{"symbol":"SOL_USDC_PERP","netQuantity":"-2.5","entryPrice":"150","markPrice":"149"}"#,
        )
        .unwrap();
        let b: PositionWire = decode(
            r#"{"symbol":"SOL_USDC_PERP","quantity":-2.5,"entry_price":150,"mark_price":149}"#,
        )
        .unwrap();
        assert_eq!(Position::from(a), Position::from(b));
    }

    #[test]
    fn test_flat_positions_dropped() {
        let wires: Vec<PositionWire> = decode(
            r#"[{"symbol":"A","netQuantity":"0","entryPrice":"1","markPrice":"1"},
                {"symbol":"B","netQuantity":"1","entryPrice":"1","markPrice":"1"}]"#,
        )
        .unwrap();
        let positions = positions_from_wire(wires);
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].symbol, "B");
    }

    #[test]
    fn test_market_with_trigger_is_a_stop() {
        let wire: OpenOrderWire = decode(
            r#"{"id":"42","symbol":"SOL_USDC_PERP","side":"Ask","orderType":"Market","triggerPrice":"140","quantity":"2"}"#,
        )
        .unwrap();
        let order = OpenOrder::try_from(wire).unwrap();
        assert_eq!(order.kind, OrderKind::StopMarket);
        assert_eq!(order.side, Side::Sell);
        assert!(order.is_stop());
    }

    #[test]
    fn test_remaining_quantity_after_partial_fill() {
        let wire: OpenOrderWire = decode(
            r#"{"id":"7","symbol":"SOL_USDC_PERP","side":"Bid","orderType":"Limit","price":"150","quantity":"10","executedQuantity":"4"}"#,
        )
        .unwrap();
        let order = OpenOrder::try_from(wire).unwrap();
        assert_eq!(order.quantity, dec!(6));
        assert!(order.is_resting_limit());
    }

    #[test]
    fn test_unknown_side_rejected() {
        let wire: OpenOrderWire = decode(
            r#"{"id":"1","symbol":"X","side":"Up","orderType":"Limit","price":"1","quantity":"1"}"#,
        )
        .unwrap();
        assert!(matches!(
            OpenOrder::try_from(wire),
            Err(WireError::UnknownSide(_))
        ));
    }

    #[test]
    fn test_collateral_variants() {
        let a: CollateralWire = decode(r#"{"netEquity":"1000","netEquityAvailable":"990"}"#).unwrap();
        let b: CollateralWire = decode(r#"{"equity":1000,"availableToTrade":990}"#).unwrap();
        assert_eq!(
            AccountBalance::try_from(a).unwrap(),
            AccountBalance::try_from(b).unwrap()
        );

        let missing: CollateralWire = decode(r#"{"equity":1000}"#).unwrap();
        assert!(AccountBalance::try_from(missing).is_err());
    }
}
