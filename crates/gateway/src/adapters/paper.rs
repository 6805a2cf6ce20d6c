//! In-memory paper venue
//!
//! Holds books, resting orders, positions and collateral for any number of
//! symbols. Post-only limits rest (and are rejected if they would cross),
//! market orders fill at the touch, stop-market orders rest until
//! [`PaperGateway::match_resting`] sees the trigger trade. Failures can be
//! injected per call kind.

use async_trait::async_trait;
use log::{debug, info, warn};
use meridian_core::{
    AccountBalance, BookLevel, Candle, FeeSchedule, Instrument, MarketSnapshot, OpenOrder,
    OrderId, OrderInstruction, OrderKind, Position, PositionSide, Price, Quantity, Side, Symbol,
    Timeframe,
};
use meridian_ports::{Clock, ExchangeGateway, GatewayError, GatewayResult};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Gateway call kinds, for failure injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaperCall {
    Depth,
    Positions,
    OpenOrders,
    Candles,
    Instrument,
    Place,
    Cancel,
    Balance,
}

#[derive(Debug, Default)]
struct PaperState {
    books: HashMap<Symbol, (Vec<BookLevel>, Vec<BookLevel>)>,
    instruments: HashMap<Symbol, Instrument>,
    candles: HashMap<(Symbol, Timeframe), Vec<Candle>>,
    orders: Vec<OpenOrder>,
    positions: HashMap<Symbol, Position>,
    /// Realized collateral (deposits + realized PnL - fees)
    cash: Decimal,
    failures: HashMap<PaperCall, u32>,
    placed: Vec<OrderInstruction>,
    cancelled: Vec<OrderId>,
    next_id: u64,
}

impl PaperState {
    fn take_failure(&mut self, call: PaperCall) -> GatewayResult<()> {
        if let Some(remaining) = self.failures.get_mut(&call)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(GatewayError::Transport(format!("injected {:?} failure", call)));
        }
        Ok(())
    }

    fn snapshot(&self, symbol: &str, clock: &dyn Clock) -> Option<MarketSnapshot> {
        self.books.get(symbol).map(|(bids, asks)| {
            MarketSnapshot::new(symbol, clock.now(), bids.clone(), asks.clone())
        })
    }

    fn mark_price(&self, symbol: &str, clock: &dyn Clock) -> Option<Price> {
        self.snapshot(symbol, clock).and_then(|s| s.mid_price())
    }

    fn next_order_id(&mut self) -> OrderId {
        self.next_id += 1;
        format!("paper-{}", self.next_id)
    }

    fn position_qty(&self, symbol: &str) -> Decimal {
        self.positions
            .get(symbol)
            .map(|p| p.net_quantity)
            .unwrap_or(Decimal::ZERO)
    }

    /// Apply a fill to the position and collateral
    fn apply_fill(
        &mut self,
        symbol: &str,
        side: Side,
        quantity: Quantity,
        price: Price,
        fee_rate: Decimal,
    ) {
        let signed = match side {
            Side::Buy => quantity,
            Side::Sell => -quantity,
        };
        let position = self
            .positions
            .entry(symbol.to_string())
            .or_insert_with(|| Position::new(symbol, Decimal::ZERO, price, price));
        let old = position.net_quantity;
        let new = old + signed;

        if old.is_zero() || old.is_sign_positive() == signed.is_sign_positive() {
            // Opening or adding: weighted average entry
            let total = old.abs() + quantity;
            position.entry_price = (position.entry_price * old.abs() + price * quantity) / total;
        } else {
            // Reducing: realize PnL on the closed part
            let closed = quantity.min(old.abs());
            let direction = if old > Decimal::ZERO {
                Decimal::ONE
            } else {
                Decimal::NEGATIVE_ONE
            };
            self.cash += closed * (price - position.entry_price) * direction;
            if quantity > old.abs() {
                // Flipped through zero: remainder opens at the fill price
                position.entry_price = price;
            }
        }
        position.net_quantity = new;
        position.mark_price = price;
        self.cash -= quantity * price * fee_rate;

        if new.is_zero() {
            self.positions.remove(symbol);
        }
    }
}

/// In-memory venue implementing [`ExchangeGateway`]
pub struct PaperGateway {
    state: Mutex<PaperState>,
    clock: Arc<dyn Clock>,
    fees: FeeSchedule,
    leverage: Decimal,
}

impl PaperGateway {
    pub fn new(clock: Arc<dyn Clock>, fees: FeeSchedule, leverage: Decimal) -> Self {
        Self {
            state: Mutex::new(PaperState::default()),
            clock,
            fees,
            leverage: leverage.max(Decimal::ONE),
        }
    }

    // === Venue setup (drivers and tests) ===

    pub async fn add_instrument(&self, instrument: Instrument) {
        let mut state = self.state.lock().await;
        state
            .instruments
            .insert(instrument.symbol.clone(), instrument);
    }

    /// Replace a symbol's book with `(price, quantity)` levels
    pub async fn set_book(
        &self,
        symbol: &str,
        bids: Vec<(Decimal, Decimal)>,
        asks: Vec<(Decimal, Decimal)>,
    ) {
        let mut state = self.state.lock().await;
        let to_levels = |levels: Vec<(Decimal, Decimal)>| {
            levels
                .into_iter()
                .map(|(p, q)| BookLevel::new(p, q))
                .collect::<Vec<_>>()
        };
        state
            .books
            .insert(symbol.to_string(), (to_levels(bids), to_levels(asks)));
    }

    pub async fn set_candles(&self, symbol: &str, timeframe: Timeframe, candles: Vec<Candle>) {
        let mut state = self.state.lock().await;
        state.candles.insert((symbol.to_string(), timeframe), candles);
    }

    /// Append one candle, keeping at most `keep` per series
    pub async fn push_candle(&self, symbol: &str, timeframe: Timeframe, candle: Candle, keep: usize) {
        let mut state = self.state.lock().await;
        let series = state
            .candles
            .entry((symbol.to_string(), timeframe))
            .or_default();
        series.push(candle);
        if series.len() > keep {
            let excess = series.len() - keep;
            series.drain(..excess);
        }
    }

    /// Set realized collateral
    pub async fn set_cash(&self, cash: Decimal) {
        self.state.lock().await.cash = cash;
    }

    pub async fn set_position(&self, position: Position) {
        let mut state = self.state.lock().await;
        if position.is_flat() {
            state.positions.remove(&position.symbol);
        } else {
            state.positions.insert(position.symbol.clone(), position);
        }
    }

    /// Make the next `count` calls of `call` fail with a transport error
    pub async fn fail_next(&self, call: PaperCall, count: u32) {
        self.state.lock().await.failures.insert(call, count);
    }

    // === Inspection ===

    /// Every instruction accepted or rejected so far, in order
    pub async fn placed_orders(&self) -> Vec<OrderInstruction> {
        self.state.lock().await.placed.clone()
    }

    pub async fn cancelled_orders(&self) -> Vec<OrderId> {
        self.state.lock().await.cancelled.clone()
    }

    pub async fn resting_orders(&self, symbol: &str) -> Vec<OpenOrder> {
        let state = self.state.lock().await;
        state
            .orders
            .iter()
            .filter(|o| o.symbol == symbol)
            .cloned()
            .collect()
    }

    pub async fn position(&self, symbol: &str) -> Option<Position> {
        self.state.lock().await.positions.get(symbol).cloned()
    }

    // === Matching ===

    /// Fill `quantity` of a resting limit order at its limit price (maker)
    pub async fn fill_order(&self, order_id: &str, quantity: Quantity) -> GatewayResult<()> {
        let mut state = self.state.lock().await;
        let index = state
            .orders
            .iter()
            .position(|o| o.id == order_id)
            .ok_or_else(|| GatewayError::NotFound(order_id.to_string()))?;
        let order = state.orders[index].clone();
        let price = order
            .price
            .or(order.trigger_price)
            .ok_or_else(|| GatewayError::Rejected("order has no price".into()))?;
        let fill_qty = quantity.min(order.quantity);

        state.apply_fill(&order.symbol, order.side, fill_qty, price, self.fees.maker_fee);
        let remaining = order.quantity - fill_qty;
        if remaining.is_zero() {
            state.orders.remove(index);
        } else {
            state.orders[index].quantity = remaining;
        }
        info!(
            "[PAPER] filled {} {} {} @ {}",
            order.symbol,
            order.side.as_str(),
            fill_qty,
            price
        );
        Ok(())
    }

    /// Cross resting limits against the current touch and fire triggered stops
    ///
    /// Returns the number of orders that executed.
    pub async fn match_resting(&self, symbol: &str) -> usize {
        let mut state = self.state.lock().await;
        let Some(book) = state.snapshot(symbol, self.clock.as_ref()) else {
            return 0;
        };
        let (Some(bid), Some(ask)) = (book.best_bid(), book.best_ask()) else {
            return 0;
        };

        let mut executed = Vec::new();
        for order in state.orders.iter().filter(|o| o.symbol == symbol) {
            match order.kind {
                OrderKind::Limit => {
                    let crossed = match (order.side, order.price) {
                        (Side::Buy, Some(p)) => ask.price <= p,
                        (Side::Sell, Some(p)) => bid.price >= p,
                        _ => false,
                    };
                    if crossed {
                        executed.push((order.clone(), order.price, true));
                    }
                }
                OrderKind::StopMarket => {
                    let triggered = match (order.side, order.trigger_price) {
                        (Side::Sell, Some(t)) => bid.price <= t,
                        (Side::Buy, Some(t)) => ask.price >= t,
                        _ => false,
                    };
                    if triggered {
                        let fill = match order.side {
                            Side::Buy => ask.price,
                            Side::Sell => bid.price,
                        };
                        executed.push((order.clone(), Some(fill), false));
                    }
                }
                OrderKind::Market => {}
            }
        }

        for (order, price, is_maker) in &executed {
            let Some(price) = price else { continue };
            let fee = if *is_maker {
                self.fees.maker_fee
            } else {
                self.fees.taker_fee
            };
            let mut quantity = order.quantity;
            if order.kind == OrderKind::StopMarket {
                // Reduce-only: never flip through a stop
                quantity = quantity.min(state.position_qty(symbol).abs());
            }
            if quantity > Decimal::ZERO {
                state.apply_fill(symbol, order.side, quantity, *price, fee);
            }
            state.orders.retain(|o| o.id != order.id);
            debug!("[PAPER] {} {:?} executed @ {}", order.id, order.kind, price);
        }
        executed.len()
    }

    fn balance_of(&self, state: &PaperState) -> AccountBalance {
        let mut unrealized = Decimal::ZERO;
        let mut committed = Decimal::ZERO;
        for position in state.positions.values() {
            let mark = state
                .mark_price(&position.symbol, self.clock.as_ref())
                .unwrap_or(position.mark_price);
            unrealized += position.net_quantity * (mark - position.entry_price);
            committed += position.quantity() * position.entry_price / self.leverage;
        }
        let equity = state.cash + unrealized;
        AccountBalance::new(equity, (equity - committed).max(Decimal::ZERO))
    }
}

#[async_trait]
impl ExchangeGateway for PaperGateway {
    async fn get_depth(&self, symbol: &str) -> GatewayResult<MarketSnapshot> {
        let mut state = self.state.lock().await;
        state.take_failure(PaperCall::Depth)?;
        // Unknown symbols read as an empty book, like a freshly listed market
        Ok(state
            .snapshot(symbol, self.clock.as_ref())
            .unwrap_or_else(|| MarketSnapshot::empty(symbol, self.clock.now())))
    }

    async fn get_positions(&self) -> GatewayResult<Vec<Position>> {
        let mut state = self.state.lock().await;
        state.take_failure(PaperCall::Positions)?;
        let mut positions: Vec<Position> = state.positions.values().cloned().collect();
        for position in positions.iter_mut() {
            if let Some(mark) = state.mark_price(&position.symbol, self.clock.as_ref()) {
                position.mark_price = mark;
            }
        }
        positions.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        Ok(positions)
    }

    async fn get_open_orders(&self, symbol: Option<&str>) -> GatewayResult<Vec<OpenOrder>> {
        let mut state = self.state.lock().await;
        state.take_failure(PaperCall::OpenOrders)?;
        Ok(state
            .orders
            .iter()
            .filter(|o| symbol.is_none_or(|s| o.symbol == s))
            .cloned()
            .collect())
    }

    async fn get_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> GatewayResult<Vec<Candle>> {
        let mut state = self.state.lock().await;
        state.take_failure(PaperCall::Candles)?;
        let series = state
            .candles
            .get(&(symbol.to_string(), timeframe))
            .cloned()
            .unwrap_or_default();
        let skip = series.len().saturating_sub(limit);
        Ok(series.into_iter().skip(skip).collect())
    }

    async fn get_instrument(&self, symbol: &str) -> GatewayResult<Instrument> {
        let mut state = self.state.lock().await;
        state.take_failure(PaperCall::Instrument)?;
        let instrument = state
            .instruments
            .get(symbol)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(symbol.to_string()))?;
        let touch = state.snapshot(symbol, self.clock.as_ref());
        let best_bid = touch.as_ref().and_then(|b| b.best_bid()).map(|l| l.price);
        let best_ask = touch.as_ref().and_then(|b| b.best_ask()).map(|l| l.price);
        Ok(instrument.with_touch(best_bid, best_ask))
    }

    async fn place_order(&self, order: &OrderInstruction) -> GatewayResult<OrderId> {
        let mut state = self.state.lock().await;
        state.placed.push(order.clone());
        state.take_failure(PaperCall::Place)?;

        if order.quantity <= Decimal::ZERO {
            return Err(GatewayError::Rejected("quantity must be positive".into()));
        }
        let book = state
            .snapshot(&order.symbol, self.clock.as_ref())
            .ok_or_else(|| GatewayError::NotFound(order.symbol.clone()))?;
        let best_bid = book.best_bid().map(|l| l.price);
        let best_ask = book.best_ask().map(|l| l.price);

        let held = state.position_qty(&order.symbol);
        let reduces = PositionSide::from_net_quantity(held)
            .is_some_and(|side| side.exit_side() == order.side);
        if order.reduce_only && !reduces {
            return Err(GatewayError::Rejected("reduce-only order would increase position".into()));
        }
        if !reduces {
            let reference = order.price.or(order.trigger_price).or(match order.side {
                Side::Buy => best_ask,
                Side::Sell => best_bid,
            });
            if let Some(price) = reference {
                let required = order.quantity * price / self.leverage;
                let available = self.balance_of(&state).available_margin;
                if required > available {
                    warn!(
                        "[PAPER] {} rejected: margin {} > available {}",
                        order.symbol, required, available
                    );
                    return Err(GatewayError::Rejected("insufficient margin".into()));
                }
            }
        }

        let id = state.next_order_id();
        match order.kind {
            OrderKind::Market => {
                let price = match order.side {
                    Side::Buy => best_ask,
                    Side::Sell => best_bid,
                }
                .ok_or_else(|| GatewayError::Rejected("no liquidity".into()))?;
                let mut quantity = order.quantity;
                if order.reduce_only {
                    quantity = quantity.min(held.abs());
                }
                state.apply_fill(&order.symbol, order.side, quantity, price, self.fees.taker_fee);
                info!(
                    "[PAPER] market {} {} {} @ {}",
                    order.symbol,
                    order.side.as_str(),
                    quantity,
                    price
                );
            }
            OrderKind::Limit => {
                let price = order
                    .price
                    .ok_or_else(|| GatewayError::Rejected("limit order without price".into()))?;
                let crosses = match order.side {
                    Side::Buy => best_ask.is_some_and(|ask| price >= ask),
                    Side::Sell => best_bid.is_some_and(|bid| price <= bid),
                };
                if crosses && order.post_only {
                    return Err(GatewayError::Rejected("post-only order would cross".into()));
                }
                if crosses {
                    state.apply_fill(&order.symbol, order.side, order.quantity, price, self.fees.taker_fee);
                } else {
                    state.orders.push(OpenOrder {
                        id: id.clone(),
                        symbol: order.symbol.clone(),
                        side: order.side,
                        kind: OrderKind::Limit,
                        price: Some(price),
                        trigger_price: None,
                        quantity: order.quantity,
                    });
                }
            }
            OrderKind::StopMarket => {
                let trigger = order
                    .trigger_price
                    .ok_or_else(|| GatewayError::Rejected("stop without trigger".into()))?;
                state.orders.push(OpenOrder {
                    id: id.clone(),
                    symbol: order.symbol.clone(),
                    side: order.side,
                    kind: OrderKind::StopMarket,
                    price: None,
                    trigger_price: Some(trigger),
                    quantity: order.quantity,
                });
            }
        }
        Ok(id)
    }

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> GatewayResult<()> {
        let mut state = self.state.lock().await;
        state.take_failure(PaperCall::Cancel)?;
        let before = state.orders.len();
        state
            .orders
            .retain(|o| !(o.id == order_id && o.symbol == symbol));
        if state.orders.len() == before {
            return Err(GatewayError::NotFound(order_id.to_string()));
        }
        state.cancelled.push(order_id.to_string());
        Ok(())
    }

    async fn get_account_balance(&self) -> GatewayResult<AccountBalance> {
        let mut state = self.state.lock().await;
        state.take_failure(PaperCall::Balance)?;
        Ok(self.balance_of(&state))
    }

    fn name(&self) -> &str {
        "PaperGateway"
    }
}
