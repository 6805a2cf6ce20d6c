//! Caching decorator over any [`ExchangeGateway`]

use async_trait::async_trait;
use chrono::Duration;
use log::debug;
use meridian_core::{
    AccountBalance, Candle, Instrument, MarketSnapshot, OpenOrder, OrderId, OrderInstruction,
    Position, Symbol, Timeframe,
};
use meridian_ports::{Clock, ExchangeGateway, GatewayResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::cache::TtlCache;

/// Per-kind cache lifetimes in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheTtls {
    pub depth_ms: u64,
    pub positions_ms: u64,
    pub open_orders_ms: u64,
    pub balance_ms: u64,
    /// Candle-derived values (ATR, trend) change slowly
    pub candles_ms: u64,
    pub instrument_ms: u64,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            depth_ms: 400,
            positions_ms: 400,
            open_orders_ms: 400,
            balance_ms: 400,
            candles_ms: 60_000,
            instrument_ms: 300_000,
        }
    }
}

fn millis(ms: u64) -> Duration {
    Duration::milliseconds(i64::try_from(ms).unwrap_or(i64::MAX))
}

type CandleKey = (Symbol, Timeframe, usize);

/// Read-through cache in front of a gateway
///
/// Reads are served from kind-specific TTL caches. Any place or cancel
/// for a symbol drops that symbol's depth and open orders together with
/// the account-wide positions and balance, whether or not the call
/// succeeded, since a timed-out request may still have reached the venue.
pub struct CachedGateway<G> {
    inner: G,
    ttls: CacheTtls,
    depth: TtlCache<Symbol, MarketSnapshot>,
    positions: TtlCache<(), Vec<Position>>,
    open_orders: TtlCache<Option<Symbol>, Vec<OpenOrder>>,
    candles: TtlCache<CandleKey, Vec<Candle>>,
    instruments: TtlCache<Symbol, Instrument>,
    balance: TtlCache<(), AccountBalance>,
}

impl<G: ExchangeGateway> CachedGateway<G> {
    pub fn new(inner: G, ttls: CacheTtls, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner,
            ttls,
            depth: TtlCache::new(clock.clone()),
            positions: TtlCache::new(clock.clone()),
            open_orders: TtlCache::new(clock.clone()),
            candles: TtlCache::new(clock.clone()),
            instruments: TtlCache::new(clock.clone()),
            balance: TtlCache::new(clock),
        }
    }

    pub fn inner(&self) -> &G {
        &self.inner
    }

    pub fn ttls(&self) -> CacheTtls {
        self.ttls
    }

    /// Force the next read of anything the symbol's orders can change
    pub fn invalidate_symbol(&self, symbol: &str) {
        debug!("[{}] cache invalidated", symbol);
        self.depth.invalidate(&symbol.to_string());
        self.open_orders.invalidate(&Some(symbol.to_string()));
        self.open_orders.invalidate(&None);
        self.positions.invalidate(&());
        self.balance.invalidate(&());
    }

    pub fn invalidate_all(&self) {
        self.depth.clear();
        self.positions.clear();
        self.open_orders.clear();
        self.candles.clear();
        self.instruments.clear();
        self.balance.clear();
    }
}

#[async_trait]
impl<G: ExchangeGateway> ExchangeGateway for CachedGateway<G> {
    async fn get_depth(&self, symbol: &str) -> GatewayResult<MarketSnapshot> {
        self.depth
            .get_or_fetch(symbol.to_string(), millis(self.ttls.depth_ms), || {
                self.inner.get_depth(symbol)
            })
            .await
    }

    async fn get_positions(&self) -> GatewayResult<Vec<Position>> {
        self.positions
            .get_or_fetch((), millis(self.ttls.positions_ms), || {
                self.inner.get_positions()
            })
            .await
    }

    async fn get_open_orders(&self, symbol: Option<&str>) -> GatewayResult<Vec<OpenOrder>> {
        self.open_orders
            .get_or_fetch(
                symbol.map(str::to_string),
                millis(self.ttls.open_orders_ms),
                || self.inner.get_open_orders(symbol),
            )
            .await
    }

    async fn get_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> GatewayResult<Vec<Candle>> {
        self.candles
            .get_or_fetch(
                (symbol.to_string(), timeframe, limit),
                millis(self.ttls.candles_ms),
                || self.inner.get_candles(symbol, timeframe, limit),
            )
            .await
    }

    async fn get_instrument(&self, symbol: &str) -> GatewayResult<Instrument> {
        self.instruments
            .get_or_fetch(symbol.to_string(), millis(self.ttls.instrument_ms), || {
                self.inner.get_instrument(symbol)
            })
            .await
    }

    async fn place_order(&self, order: &OrderInstruction) -> GatewayResult<OrderId> {
        let result = self.inner.place_order(order).await;
        self.invalidate_symbol(&order.symbol);
        result
    }

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> GatewayResult<()> {
        let result = self.inner.cancel_order(symbol, order_id).await;
        self.invalidate_symbol(symbol);
        result
    }

    async fn get_account_balance(&self) -> GatewayResult<AccountBalance> {
        self.balance
            .get_or_fetch((), millis(self.ttls.balance_ms), || {
                self.inner.get_account_balance()
            })
            .await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
