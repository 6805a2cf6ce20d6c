use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::entities::Side;
use crate::values::{Price, Quantity, Symbol, Timestamp};

/// One aggregated price level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: Price,
    pub quantity: Quantity,
}

impl BookLevel {
    pub fn new(price: Price, quantity: Quantity) -> Self {
        Self { price, quantity }
    }
}

/// Immutable depth snapshot for one instrument
///
/// Uses BTreeMap for price levels so ladders are sorted regardless of the
/// order the venue delivered them in. Duplicate prices are merged and
/// non-positive levels dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketSnapshot {
    symbol: Symbol,
    timestamp: Timestamp,
    /// Bid levels: price -> quantity (best is the last key)
    bids: BTreeMap<Price, Quantity>,
    /// Ask levels: price -> quantity (best is the first key)
    asks: BTreeMap<Price, Quantity>,
}

impl MarketSnapshot {
    pub fn new(
        symbol: impl Into<Symbol>,
        timestamp: Timestamp,
        bids: impl IntoIterator<Item = BookLevel>,
        asks: impl IntoIterator<Item = BookLevel>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            timestamp,
            bids: collect_levels(bids),
            asks: collect_levels(asks),
        }
    }

    /// A snapshot with no levels on either side
    pub fn empty(symbol: impl Into<Symbol>, timestamp: Timestamp) -> Self {
        Self::new(symbol, timestamp, Vec::new(), Vec::new())
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    // === Price Queries ===

    pub fn best_bid(&self) -> Option<BookLevel> {
        self.bids
            .iter()
            .next_back()
            .map(|(p, q)| BookLevel::new(*p, *q))
    }

    pub fn best_ask(&self) -> Option<BookLevel> {
        self.asks.iter().next().map(|(p, q)| BookLevel::new(*p, *q))
    }

    /// Best price of the side where orders of `side` rest
    pub fn best_price(&self, side: Side) -> Option<Price> {
        match side {
            Side::Buy => self.best_bid().map(|l| l.price),
            Side::Sell => self.best_ask().map(|l| l.price),
        }
    }

    /// Average of best bid and ask
    pub fn mid_price(&self) -> Option<Price> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid.price + ask.price) / Decimal::TWO),
            _ => None,
        }
    }

    /// Absolute spread (ask - bid)
    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask.price - bid.price),
            _ => None,
        }
    }

    // === Level Queries ===

    /// Top N bid levels (highest prices first)
    pub fn top_bids(&self, n: usize) -> Vec<BookLevel> {
        self.bids
            .iter()
            .rev()
            .take(n)
            .map(|(p, q)| BookLevel::new(*p, *q))
            .collect()
    }

    /// Top N ask levels (lowest prices first)
    pub fn top_asks(&self, n: usize) -> Vec<BookLevel> {
        self.asks
            .iter()
            .take(n)
            .map(|(p, q)| BookLevel::new(*p, *q))
            .collect()
    }

    /// Top N levels of the side where orders of `side` rest (bids for Buy)
    pub fn top_levels(&self, side: Side, n: usize) -> Vec<BookLevel> {
        match side {
            Side::Buy => self.top_bids(n),
            Side::Sell => self.top_asks(n),
        }
    }

    pub fn total_bid_qty(&self, levels: usize) -> Quantity {
        self.bids.values().rev().take(levels).sum()
    }

    pub fn total_ask_qty(&self, levels: usize) -> Quantity {
        self.asks.values().take(levels).sum()
    }

    /// Resting size an aggressive order of `side` would consume (asks for Buy)
    pub fn consumable_qty(&self, side: Side, levels: usize) -> Quantity {
        match side {
            Side::Buy => self.total_ask_qty(levels),
            Side::Sell => self.total_bid_qty(levels),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// Both sides present (can quote)
    pub fn is_two_sided(&self) -> bool {
        !self.bids.is_empty() && !self.asks.is_empty()
    }
}

fn collect_levels(levels: impl IntoIterator<Item = BookLevel>) -> BTreeMap<Price, Quantity> {
    let mut book = BTreeMap::new();
    for level in levels {
        if level.price <= Decimal::ZERO || level.quantity <= Decimal::ZERO {
            continue;
        }
        *book.entry(level.price).or_insert(Decimal::ZERO) += level.quantity;
    }
    book
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn sample() -> MarketSnapshot {
        // Deliberately delivered worst-to-best on the bid side
        MarketSnapshot::new(
            "BTC_USDC_PERP",
            Utc::now(),
            vec![
                BookLevel::new(dec!(49800), dec!(3.0)),
                BookLevel::new(dec!(49900), dec!(2.0)),
                BookLevel::new(dec!(50000), dec!(1.0)),
            ],
            vec![
                BookLevel::new(dec!(50100), dec!(1.5)),
                BookLevel::new(dec!(50200), dec!(2.5)),
                BookLevel::new(dec!(50300), dec!(3.5)),
            ],
        )
    }

    #[test]
    fn test_best_prices_regardless_of_input_order() {
        let book = sample();
        assert_eq!(book.best_bid(), Some(BookLevel::new(dec!(50000), dec!(1.0))));
        assert_eq!(book.best_ask(), Some(BookLevel::new(dec!(50100), dec!(1.5))));
        assert_eq!(book.mid_price(), Some(dec!(50050)));
        assert_eq!(book.spread(), Some(dec!(100)));
    }

    #[test]
    fn test_top_levels() {
        let book = sample();
        let bids = book.top_bids(2);
        assert_eq!(bids[0].price, dec!(50000));
        assert_eq!(bids[1].price, dec!(49900));
        assert_eq!(book.top_levels(Side::Sell, 1)[0].price, dec!(50100));
    }

    #[test]
    fn test_consumable_quantity() {
        let book = sample();
        assert_eq!(book.consumable_qty(Side::Buy, 2), dec!(4.0));
        assert_eq!(book.consumable_qty(Side::Sell, 5), dec!(6.0));
    }

    #[test]
    fn test_duplicates_merged_and_empty_levels_dropped() {
        let book = MarketSnapshot::new(
            "X",
            Utc::now(),
            vec![
                BookLevel::new(dec!(10), dec!(1)),
                BookLevel::new(dec!(10), dec!(2)),
                BookLevel::new(dec!(9), dec!(0)),
            ],
            vec![BookLevel::new(dec!(11), dec!(-1))],
        );
        assert_eq!(book.top_bids(5), vec![BookLevel::new(dec!(10), dec!(3))]);
        assert!(book.best_ask().is_none());
        assert!(!book.is_two_sided());
        assert_eq!(book.mid_price(), None);
    }
}
