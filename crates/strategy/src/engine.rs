//! Quoting Engine
//!
//! One `tick` advances one symbol's [`PositionIntent`] through
//! FLAT → PROBING → CONFIRMING → FULL → FLAT. Within a tick the guard runs
//! first, then either position management (confirm, then exit) or the flat
//! path (exit detection, then entry). The engine holds no per-symbol state
//! of its own, so ticks for different symbols may run concurrently.

use chrono::Duration;
use log::{debug, error, info, warn};
use meridian_core::{
    MarketSnapshot, OpenOrder, OrderId, OrderInstruction, Position, PositionSide, Price, Quantity,
    Symbol, Timestamp,
};
use meridian_ports::{
    AuditEvent, AuditRecord, AuditSink, Clock, ExchangeGateway, GatewayError, TradeOutcome,
};
use meridian_risk_manager::CapitalGuard;
use rust_decimal::Decimal;
use std::sync::Arc;
use thiserror::Error;

use crate::config::{EngineConfig, QuotingMode};
use crate::intent::{EntryStage, PositionIntent, StopStage};
use crate::learning::LearnedThresholds;
use crate::signal::SignalCalculator;
use crate::trend::{TrendBias, TrendReader};
use crate::volatility::VolatilityEstimator;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("No order book for {0}")]
    MissingBook(Symbol),
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Something the engine did (or declined to do) during a tick
#[derive(Debug, Clone, PartialEq)]
pub enum TickAction {
    /// Resting entry cancelled because flow turned against it
    GuardCancel { order_id: OrderId },
    /// Unfilled leg on the far side of a fresh position cancelled
    StaleLegCancel { order_id: OrderId },
    /// Any other cancellation (superseded, orphaned, not selected)
    Cancel { order_id: OrderId },
    Probe {
        order_id: OrderId,
        side: PositionSide,
        price: Price,
        quantity: Quantity,
    },
    Confirmation {
        order_id: OrderId,
        price: Price,
        quantity: Quantity,
    },
    Full,
    StopArmed {
        order_id: OrderId,
        trigger: Price,
        stage: StopStage,
    },
    StopFailed { attempt: u32 },
    TargetPlaced { order_id: OrderId, price: Price },
    MarketClose { reason: String },
    ExitDetected { outcome: TradeOutcome },
    /// Nothing placed, and why
    Idle(&'static str),
}

#[derive(Debug, Clone)]
pub struct TickReport {
    pub symbol: Symbol,
    pub mode: QuotingMode,
    pub stage: EntryStage,
    pub obi: Decimal,
    pub actions: Vec<TickAction>,
}

impl TickReport {
    fn new(symbol: &str, mode: QuotingMode, obi: Decimal) -> Self {
        Self {
            symbol: symbol.to_string(),
            mode,
            stage: EntryStage::Flat,
            obi,
            actions: Vec::new(),
        }
    }

    pub fn push(&mut self, action: TickAction) {
        self.actions.push(action);
    }

    pub fn idle(&mut self, reason: &'static str) {
        self.actions.push(TickAction::Idle(reason));
    }

    /// Ids cancelled this tick, for any reason
    pub fn cancelled(&self) -> Vec<&OrderId> {
        self.actions
            .iter()
            .filter_map(|a| match a {
                TickAction::GuardCancel { order_id }
                | TickAction::StaleLegCancel { order_id }
                | TickAction::Cancel { order_id } => Some(order_id),
                _ => None,
            })
            .collect()
    }

    pub fn closed_at_market(&self) -> bool {
        self.actions
            .iter()
            .any(|a| matches!(a, TickAction::MarketClose { .. }))
    }

    pub fn probes(&self) -> impl Iterator<Item = &TickAction> {
        self.actions
            .iter()
            .filter(|a| matches!(a, TickAction::Probe { .. }))
    }
}

/// Market view shared by every step of one tick
pub(crate) struct Tick {
    pub symbol: Symbol,
    pub now: Timestamp,
    pub book: MarketSnapshot,
    pub obi: Decimal,
    pub pulse: TrendBias,
}

impl Tick {
    /// OBI signed in favour of `side`
    pub fn obi_for(&self, side: PositionSide) -> Decimal {
        self.obi * side.sign()
    }

    /// Touch an exit of `side` would trade against
    pub fn exit_touch(&self, side: PositionSide) -> Option<Price> {
        match side {
            PositionSide::Long => self.book.best_bid().map(|l| l.price),
            PositionSide::Short => self.book.best_ask().map(|l| l.price),
        }
    }
}

pub struct QuotingEngine {
    pub(crate) config: EngineConfig,
    pub(crate) gateway: Arc<dyn ExchangeGateway>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) audit: Arc<dyn AuditSink>,
    pub(crate) signals: SignalCalculator,
    pub(crate) volatility: VolatilityEstimator,
    pub(crate) trend: TrendReader,
    pub(crate) capital: CapitalGuard,
    pub(crate) base: LearnedThresholds,
}

impl QuotingEngine {
    /// `gateway` is normally a `CachedGateway`; the engine never caches raw reads itself
    pub fn new(
        config: EngineConfig,
        gateway: Arc<dyn ExchangeGateway>,
        clock: Arc<dyn Clock>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let volatility_ttl =
            Duration::milliseconds(i64::try_from(config.cache.candles_ms).unwrap_or(i64::MAX));
        let pulse_symbol = config.pulse_symbol().map(str::to_string);
        Self {
            signals: SignalCalculator::new(config.signal.clone()),
            volatility: VolatilityEstimator::new(gateway.clone(), clock.clone(), volatility_ttl),
            trend: TrendReader::new(gateway.clone(), config.trend.clone(), pulse_symbol),
            capital: CapitalGuard::new(config.capital.clone()),
            base: LearnedThresholds::base(&config),
            config,
            gateway,
            clock,
            audit,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn signals(&self) -> &SignalCalculator {
        &self.signals
    }

    /// Fresh state for a symbol seen for the first time
    pub fn new_intent(&self, symbol: &str) -> PositionIntent {
        PositionIntent::new(symbol, self.base)
    }

    /// Cancel every open order of the configured symbols; returns the count cancelled
    pub async fn reset_orders(&self) -> usize {
        let mut cancelled = 0;
        for symbol in &self.config.symbols {
            let orders = match self.gateway.get_open_orders(Some(symbol)).await {
                Ok(orders) => orders,
                Err(e) => {
                    warn!("[{}] startup reset: cannot read orders: {}", symbol, e);
                    continue;
                }
            };
            for order in orders {
                match self.gateway.cancel_order(symbol, &order.id).await {
                    Ok(()) => cancelled += 1,
                    Err(e) => warn!("[{}] startup reset: cancel {} failed: {}", symbol, order.id, e),
                }
            }
        }
        info!("Startup reset cancelled {} orders", cancelled);
        cancelled
    }

    fn resolve_mode(&self, pulse: TrendBias) -> QuotingMode {
        match self.config.mode {
            QuotingMode::Compound => QuotingMode::Compound,
            _ if self.config.direction.forced().is_some() => QuotingMode::Surf,
            QuotingMode::Surf => QuotingMode::Surf,
            QuotingMode::Straddle if pulse.is_directional() => QuotingMode::Surf,
            QuotingMode::Straddle => QuotingMode::Straddle,
        }
    }

    /// Advance one symbol by one step
    ///
    /// Read failures abort the tick with an error (the caller skips the
    /// symbol until the next tick); placement failures are handled in place.
    pub async fn tick(&self, intent: &mut PositionIntent) -> EngineResult<TickReport> {
        let symbol = intent.symbol.clone();
        let now = self.clock.now();

        let (book, positions, orders) = tokio::try_join!(
            self.gateway.get_depth(&symbol),
            self.gateway.get_positions(),
            self.gateway.get_open_orders(Some(&symbol)),
        )?;
        if book.is_empty() {
            return Err(EngineError::MissingBook(symbol));
        }
        if let Some(mid) = book.mid_price() {
            intent.prices.record(now, mid);
        }

        let pulse = self.trend.pulse().await;
        intent.mode = self.resolve_mode(pulse);
        let obi = self.signals.calculate_obi(&book);
        let tick = Tick {
            symbol: symbol.clone(),
            now,
            book,
            obi,
            pulse,
        };
        let mut report = TickReport::new(&symbol, intent.mode, obi);
        debug!(
            "[{}] {} {} obi {} spread {} pulse {}",
            symbol,
            intent.mode,
            intent.stage,
            obi.round_dp(3),
            self.signals.spread_fraction(&tick.book).round_dp(5),
            pulse
        );

        let position = positions
            .iter()
            .find(|p| p.symbol == symbol && !p.is_flat())
            .cloned();
        if let Some(position) = &position {
            self.reconcile(intent, position, &tick);
        }

        let orders = self
            .guard(intent, position.as_ref(), orders, &tick, &mut report)
            .await;

        if !report.closed_at_market() {
            match &position {
                Some(position) => {
                    self.manage_position(intent, position, orders, &tick, &mut report)
                        .await?
                }
                None => {
                    self.manage_flat(intent, &positions, orders, &tick, &mut report)
                        .await?
                }
            }
        }

        report.stage = intent.stage;
        Ok(report)
    }

    /// Track the venue's side and average entry
    fn reconcile(&self, intent: &mut PositionIntent, position: &Position, tick: &Tick) {
        let Some(side) = position.side() else {
            return;
        };
        intent.last_price = tick.book.mid_price().or(Some(position.mark_price));
        if intent.side == Some(side) && intent.entry_price == Some(position.entry_price) {
            return;
        }
        let first = intent.side.is_none();
        intent.reconcile_fill(side, position.entry_price, tick.now);
        info!(
            "[{}] {} {} {} @ {}",
            tick.symbol,
            if first { "filled" } else { "fill updated" },
            side,
            position.quantity(),
            position.entry_price
        );
    }

    // === Order plumbing shared by every step ===

    /// Cancel one order; a missing order counts as cancelled
    pub(crate) async fn cancel(&self, symbol: &str, order_id: &str) -> bool {
        match self.gateway.cancel_order(symbol, order_id).await {
            Ok(()) => true,
            Err(GatewayError::NotFound(_)) => {
                debug!("[{}] {} already gone", symbol, order_id);
                true
            }
            Err(e) => {
                warn!("[{}] cancel {} failed: {}", symbol, order_id, e);
                false
            }
        }
    }

    /// Cancel every listed order, recording each success
    pub(crate) async fn cancel_orders(
        &self,
        intent: &mut PositionIntent,
        orders: &[OpenOrder],
        report: &mut TickReport,
    ) {
        for order in orders {
            if self.cancel(&intent.symbol, &order.id).await {
                intent.forget_order(&order.id);
                report.push(TickAction::Cancel {
                    order_id: order.id.clone(),
                });
            }
        }
    }

    /// Re-read and cancel everything resting on the symbol
    pub(crate) async fn cancel_all(&self, intent: &mut PositionIntent, report: &mut TickReport) {
        match self.gateway.get_open_orders(Some(&intent.symbol)).await {
            Ok(orders) => self.cancel_orders(intent, &orders, report).await,
            Err(e) => warn!("[{}] cannot list orders to cancel: {}", intent.symbol, e),
        }
    }

    /// Market-close the whole position, then clear the symbol's orders
    ///
    /// Protective orders are only cancelled once the close was accepted.
    pub(crate) async fn close_position(
        &self,
        intent: &mut PositionIntent,
        position: &Position,
        tick: &Tick,
        reason: &str,
        report: &mut TickReport,
    ) -> bool {
        let Some(side) = position.side() else {
            return false;
        };
        let order =
            OrderInstruction::market(&tick.symbol, side.exit_side(), position.quantity()).reduce_only();
        if let Err(e) = self.gateway.place_order(&order).await {
            error!("[{}] market close ({}) failed: {}", tick.symbol, reason, e);
            return false;
        }
        warn!(
            "[{}] closed {} {} at market: {}",
            tick.symbol,
            side,
            position.quantity(),
            reason
        );
        intent.exit_reason = Some(reason.to_string());
        intent.exit_price = tick.exit_touch(side).or(tick.book.mid_price());
        report.push(TickAction::MarketClose {
            reason: reason.to_string(),
        });
        self.cancel_all(intent, report).await;
        true
    }

    pub(crate) fn record_audit(&self, symbol: &str, side: PositionSide, event: AuditEvent) {
        self.audit.record(AuditRecord {
            timestamp: self.clock.now(),
            symbol: symbol.to_string(),
            side,
            event,
        });
    }
}
