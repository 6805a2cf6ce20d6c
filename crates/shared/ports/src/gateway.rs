use async_trait::async_trait;
use meridian_core::{
    AccountBalance, Candle, Instrument, MarketSnapshot, OpenOrder, OrderId, OrderInstruction,
    Position, Timeframe,
};

use std::sync::Arc;

use crate::error::GatewayResult;

/// Port to the perpetual-futures venue
///
/// Implementations normalize venue payloads into core types, so the engine
/// never sees field-name variants. Every call is fallible; rate limiting
/// belongs to the implementation.
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// Depth ladder, best-to-worst on both sides
    async fn get_depth(&self, symbol: &str) -> GatewayResult<MarketSnapshot>;

    /// All non-flat positions of the account
    async fn get_positions(&self) -> GatewayResult<Vec<Position>>;

    /// Resting orders, optionally restricted to one symbol
    async fn get_open_orders(&self, symbol: Option<&str>) -> GatewayResult<Vec<OpenOrder>>;

    /// Most recent `limit` candles, oldest first
    async fn get_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> GatewayResult<Vec<Candle>>;

    /// Contract metadata (tick, step) plus the current touch
    async fn get_instrument(&self, symbol: &str) -> GatewayResult<Instrument>;

    async fn place_order(&self, order: &OrderInstruction) -> GatewayResult<OrderId>;

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> GatewayResult<()>;

    async fn get_account_balance(&self) -> GatewayResult<AccountBalance>;

    /// Gateway name for logging
    fn name(&self) -> &str {
        "ExchangeGateway"
    }
}

/// Shared handles forward to the gateway they point at
#[async_trait]
impl<T: ExchangeGateway + ?Sized> ExchangeGateway for Arc<T> {
    async fn get_depth(&self, symbol: &str) -> GatewayResult<MarketSnapshot> {
        (**self).get_depth(symbol).await
    }

    async fn get_positions(&self) -> GatewayResult<Vec<Position>> {
        (**self).get_positions().await
    }

    async fn get_open_orders(&self, symbol: Option<&str>) -> GatewayResult<Vec<OpenOrder>> {
        (**self).get_open_orders(symbol).await
    }

    async fn get_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> GatewayResult<Vec<Candle>> {
        (**self).get_candles(symbol, timeframe, limit).await
    }

    async fn get_instrument(&self, symbol: &str) -> GatewayResult<Instrument> {
        (**self).get_instrument(symbol).await
    }

    async fn place_order(&self, order: &OrderInstruction) -> GatewayResult<OrderId> {
        (**self).place_order(order).await
    }

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> GatewayResult<()> {
        (**self).cancel_order(symbol, order_id).await
    }

    async fn get_account_balance(&self) -> GatewayResult<AccountBalance> {
        (**self).get_account_balance().await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
