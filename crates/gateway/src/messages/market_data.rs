//! Market data payloads: depth, candles and market metadata

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use meridian_core::{BookLevel, Candle, Instrument, MarketSnapshot, Price, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::WireError;

/// Depth payload: `{"bids": [["price", "qty"], ...], "asks": [...]}`
///
/// Ladders may arrive in either sort order; [`MarketSnapshot`] re-sorts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DepthWire {
    #[serde(default)]
    pub bids: Vec<(Decimal, Decimal)>,
    #[serde(default)]
    pub asks: Vec<(Decimal, Decimal)>,
    #[serde(default, alias = "lastUpdateId")]
    pub timestamp: Option<WireTime>,
}

impl DepthWire {
    pub fn into_snapshot(self, symbol: &str, received_at: Timestamp) -> MarketSnapshot {
        let timestamp = self
            .timestamp
            .and_then(|t| t.to_timestamp().ok())
            .unwrap_or(received_at);
        MarketSnapshot::new(
            symbol,
            timestamp,
            self.bids.into_iter().map(|(p, q)| BookLevel::new(p, q)),
            self.asks.into_iter().map(|(p, q)| BookLevel::new(p, q)),
        )
    }
}

/// Timestamps arrive as epoch milliseconds or as "YYYY-MM-DD HH:MM:SS"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireTime {
    Millis(i64),
    Text(String),
}

impl WireTime {
    pub fn to_timestamp(&self) -> Result<Timestamp, WireError> {
        match self {
            WireTime::Millis(ms) => Utc
                .timestamp_millis_opt(*ms)
                .single()
                .ok_or_else(|| WireError::Timestamp(ms.to_string())),
            WireTime::Text(text) => {
                if let Ok(ms) = text.parse::<i64>() {
                    return WireTime::Millis(ms).to_timestamp();
                }
                if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
                    return Ok(parsed.with_timezone(&Utc));
                }
                NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S")
                    .map(|naive| naive.and_utc())
                    .map_err(|_| WireError::Timestamp(text.clone()))
            }
        }
    }
}

/// Kline payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandleWire {
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    #[serde(alias = "start", alias = "openTime")]
    pub timestamp: WireTime,
}

impl TryFrom<CandleWire> for Candle {
    type Error = WireError;

    fn try_from(wire: CandleWire) -> Result<Self, Self::Error> {
        Ok(Candle::new(
            wire.open,
            wire.high,
            wire.low,
            wire.close,
            wire.timestamp.to_timestamp()?,
        ))
    }
}

/// Normalize a kline list to oldest-first candles
pub fn candles_from_wire(wires: Vec<CandleWire>) -> Result<Vec<Candle>, WireError> {
    let mut candles = wires
        .into_iter()
        .map(Candle::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    candles.sort_by_key(|c| c.timestamp);
    Ok(candles)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriceFilterWire {
    #[serde(default, rename = "tickSize")]
    pub tick_size: Option<Decimal>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuantityFilterWire {
    #[serde(default, rename = "stepSize")]
    pub step_size: Option<Decimal>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FiltersWire {
    #[serde(default)]
    pub price: PriceFilterWire,
    #[serde(default)]
    pub quantity: QuantityFilterWire,
}

/// Market metadata: tick and step live under `filters`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketWire {
    pub symbol: String,
    #[serde(default)]
    pub filters: FiltersWire,
    #[serde(default, rename = "bestBid")]
    pub best_bid: Option<Price>,
    #[serde(default, rename = "bestAsk")]
    pub best_ask: Option<Price>,
}

impl From<MarketWire> for Instrument {
    fn from(wire: MarketWire) -> Self {
        // Conservative defaults when the venue omits a filter
        let tick = wire.filters.price.tick_size.unwrap_or(Decimal::new(1, 2));
        let step = wire.filters.quantity.step_size.unwrap_or(Decimal::ONE);
        Instrument::new(wire.symbol, tick, step).with_touch(wire.best_bid, wire.best_ask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::decode;
    use rust_decimal_macros::dec;

    #[test]
    fn test_depth_accepts_string_levels_in_any_order() {
        let body = r#"{"bids": [["99.5", "3"], ["100.0", "1"]], "asks": [["100.5", "2"]]}"#;
        let wire: DepthWire = decode(body).unwrap();
        let snapshot = wire.into_snapshot("SOL_USDC_PERP", Utc::now());
        assert_eq!(snapshot.best_bid().unwrap().price, dec!(100.0));
        assert_eq!(snapshot.best_ask().unwrap().price, dec!(100.5));
    }

    #[test]
    fn test_candle_timestamp_variants() {
        let text: CandleWire = decode(
            r#"{"open":"1","high":"2","low":"0.5","close":"1.5","start":"2024-05-01 12:00:00"}"#,
        )
        .unwrap();
        let millis: CandleWire =
            decode(r#"{"open":1,"high":2,"low":0.5,"close":1.5,"timestamp":1714564800000}"#).unwrap();

        let a = Candle::try_from(text).unwrap();
        let b = Candle::try_from(millis).unwrap();
        assert_eq!(a.timestamp, b.timestamp);
        assert_eq!(a.close, dec!(1.5));
    }

    #[test]
    fn test_candles_sorted_oldest_first() {
        let wires: Vec<CandleWire> = decode(
            r#"[{"open":1,"high":1,"low":1,"close":2,"timestamp":2000},
                {"open":1,"high":1,"low":1,"close":1,"timestamp":1000}]"#,
        )
        .unwrap();
        let candles = candles_from_wire(wires).unwrap();
        assert_eq!(candles[0].close, dec!(1));
        assert_eq!(candles[1].close, dec!(2));
    }

    #[test]
    fn test_market_filters() {
        let wire: MarketWire = decode(
            r#"{"symbol":"BTC_USDC_PERP","filters":{"price":{"tickSize":"0.1"},"quantity":{"stepSize":"0.0001"}}}"#,
        )
        .unwrap();
        let inst = Instrument::from(wire);
        assert_eq!(inst.tick_size, dec!(0.1));
        assert_eq!(inst.step_size, dec!(0.0001));
    }

    #[test]
    fn test_bad_timestamp_is_an_error() {
        let wire = WireTime::Text("yesterday".into());
        assert!(matches!(wire.to_timestamp(), Err(WireError::Timestamp(_))));
    }
}
