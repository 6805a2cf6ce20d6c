//! Paper market driver
//!
//! Moves the books of a [`PaperGateway`] with a seeded random walk:
//! - Mid price walks by at most `step_volatility` per step
//! - A slowly drifting tilt skews resting size toward one side, so the
//!   order-book imbalance actually moves
//! - Walk prices roll up into 1m/5m/15m candles
//! - Resting orders are crossed against the new touch after every step

use chrono::{DateTime, Duration};
use meridian_core::{Candle, Instrument, Price, Quantity, Symbol, Timeframe, Timestamp};
use meridian_gateway::PaperGateway;
use meridian_ports::Clock;
use rand::Rng;
use rand::rngs::StdRng;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

/// Candles kept per series
const CANDLE_HISTORY: usize = 500;
const TIMEFRAMES: [Timeframe; 3] = [Timeframe::M1, Timeframe::M5, Timeframe::M15];

/// One simulated contract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperSymbol {
    pub symbol: Symbol,
    pub mid: Price,
    pub tick_size: Price,
    pub step_size: Quantity,
}

impl PaperSymbol {
    pub fn new(symbol: impl Into<Symbol>, mid: Price, tick_size: Price, step_size: Quantity) -> Self {
        Self {
            symbol: symbol.into(),
            mid,
            tick_size,
            step_size,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaperMarketConfig {
    /// Contracts to simulate; empty means one default contract per engine symbol
    pub markets: Vec<PaperSymbol>,
    /// Largest relative mid move per step (e.g. 0.0005 = 0.05%)
    pub step_volatility: Decimal,
    /// Levels per book side
    pub depth_levels: usize,
    /// Resting size per level is 1..=this many quantity steps, before tilt
    pub max_level_steps: u32,
    /// Largest change of the book tilt per step
    pub tilt_step: Decimal,
    pub starting_cash: Decimal,
    /// Leverage the paper venue commits margin at
    pub leverage: Decimal,
    /// One-minute bars generated before the first step
    pub history_bars: usize,
    pub step_interval_ms: u64,
    /// Fixed seed for reproducible runs
    pub seed: Option<u64>,
}

impl Default for PaperMarketConfig {
    fn default() -> Self {
        Self {
            markets: Vec::new(),
            step_volatility: dec!(0.0005),
            depth_levels: 10,
            max_level_steps: 200,
            tilt_step: dec!(0.1),
            starting_cash: dec!(10000),
            leverage: dec!(10),
            history_bars: 360,
            step_interval_ms: 250,
            seed: None,
        }
    }
}

impl PaperMarketConfig {
    /// Fill in a default contract for every symbol without one
    pub fn with_symbols(mut self, symbols: &[Symbol]) -> Self {
        for symbol in symbols {
            if !self.markets.iter().any(|m| &m.symbol == symbol) {
                self.markets
                    .push(PaperSymbol::new(symbol.clone(), dec!(100), dec!(0.01), dec!(0.1)));
            }
        }
        self
    }
}

/// Rolls walk prices into one candle series
#[derive(Debug, Clone)]
struct CandleBuilder {
    timeframe: Timeframe,
    current: Option<Candle>,
}

impl CandleBuilder {
    fn new(timeframe: Timeframe) -> Self {
        Self {
            timeframe,
            current: None,
        }
    }

    fn bucket_start(&self, now: Timestamp) -> Timestamp {
        let span = self.timeframe.duration().num_seconds().max(1);
        let secs = now.timestamp();
        DateTime::from_timestamp(secs - secs.rem_euclid(span), 0).unwrap_or(now)
    }

    /// Add a price; returns the bar it completed, if any
    fn update(&mut self, now: Timestamp, price: Price) -> Option<Candle> {
        let start = self.bucket_start(now);
        match self.current.as_mut() {
            Some(bar) if bar.timestamp == start => {
                bar.high = bar.high.max(price);
                bar.low = bar.low.min(price);
                bar.close = price;
                None
            }
            _ => self
                .current
                .replace(Candle::new(price, price, price, price, start)),
        }
    }
}

#[derive(Debug, Clone)]
struct WalkState {
    market: PaperSymbol,
    mid: Price,
    /// Book skew in [-0.8, 0.8]; positive rests more size on the bid
    tilt: Decimal,
    builders: Vec<CandleBuilder>,
}

impl WalkState {
    fn new(market: PaperSymbol) -> Self {
        Self {
            mid: market.mid,
            market,
            tilt: Decimal::ZERO,
            builders: TIMEFRAMES.iter().map(|tf| CandleBuilder::new(*tf)).collect(),
        }
    }

    fn instrument(&self) -> Instrument {
        Instrument::new(
            self.market.symbol.clone(),
            self.market.tick_size,
            self.market.step_size,
        )
    }
}

/// Seeded random-walk driver for a [`PaperGateway`]
pub struct PaperMarket {
    config: PaperMarketConfig,
    walks: Vec<WalkState>,
    rng: StdRng,
}

impl PaperMarket {
    pub fn new(config: PaperMarketConfig) -> Self {
        let rng: StdRng = match config.seed {
            Some(seed) => rand::SeedableRng::seed_from_u64(seed),
            None => rand::SeedableRng::from_entropy(),
        };
        let walks = config.markets.iter().cloned().map(WalkState::new).collect();
        Self { config, walks, rng }
    }

    /// Create with a specific seed for reproducible runs
    pub fn with_seed(mut config: PaperMarketConfig, seed: u64) -> Self {
        config.seed = Some(seed);
        Self::new(config)
    }

    pub fn mid(&self, symbol: &str) -> Option<Price> {
        self.walks
            .iter()
            .find(|w| w.market.symbol == symbol)
            .map(|w| w.mid)
    }

    pub fn symbols(&self) -> Vec<Symbol> {
        self.walks.iter().map(|w| w.market.symbol.clone()).collect()
    }

    /// Uniform draw in [-scale, scale] with millesimal resolution
    fn draw(rng: &mut StdRng, scale: Decimal) -> Decimal {
        Decimal::new(rng.gen_range(-1000i64..=1000), 3) * scale
    }

    fn walk(rng: &mut StdRng, walk: &mut WalkState, volatility: Decimal, tilt_step: Decimal) {
        let change = Self::draw(rng, volatility);
        let floor = walk.market.tick_size * dec!(10);
        walk.mid = (walk.mid * (Decimal::ONE + change)).round_dp(8).max(floor);
        walk.tilt = (walk.tilt + Self::draw(rng, tilt_step)).clamp(dec!(-0.8), dec!(0.8));
    }

    fn ladders(
        rng: &mut StdRng,
        walk: &WalkState,
        levels: usize,
        max_steps: u32,
    ) -> (Vec<(Price, Quantity)>, Vec<(Price, Quantity)>) {
        let instrument = walk.instrument();
        let tick = walk.market.tick_size;
        let best_bid = instrument.round_price_down(walk.mid - tick / dec!(2));
        let best_ask = instrument.round_price_up(walk.mid + tick / dec!(2)).max(best_bid + tick);

        let mut size = |weight: Decimal| {
            let steps = Decimal::from(rng.gen_range(1..=max_steps.max(1)));
            let qty = instrument.round_quantity_down(steps * walk.market.step_size * weight);
            qty.max(walk.market.step_size)
        };
        let mut bids = Vec::with_capacity(levels);
        let mut asks = Vec::with_capacity(levels);
        for level in 0..levels {
            let offset = tick * Decimal::from(level);
            bids.push((best_bid - offset, size(Decimal::ONE + walk.tilt)));
            asks.push((best_ask + offset, size(Decimal::ONE - walk.tilt)));
        }
        bids.retain(|(price, _)| *price > Decimal::ZERO);
        (bids, asks)
    }

    async fn record_candles(gateway: &PaperGateway, walk: &mut WalkState, now: Timestamp) {
        let symbol = walk.market.symbol.clone();
        let mid = walk.mid;
        for builder in walk.builders.iter_mut() {
            if let Some(done) = builder.update(now, mid) {
                gateway
                    .push_candle(&symbol, builder.timeframe, done, CANDLE_HISTORY)
                    .await;
            }
        }
    }

    /// Register instruments and cash, then walk `history_bars` minutes of candles up to `now`
    pub async fn seed(&mut self, gateway: &PaperGateway, now: Timestamp) {
        gateway.set_cash(self.config.starting_cash).await;
        let samples_per_bar = 6;
        let sample = Duration::seconds(60 / samples_per_bar);
        let start = now - Duration::minutes(self.config.history_bars as i64);

        for walk in self.walks.iter_mut() {
            gateway.add_instrument(walk.instrument()).await;
            let mut at = start;
            while at < now {
                Self::walk(
                    &mut self.rng,
                    walk,
                    self.config.step_volatility,
                    self.config.tilt_step,
                );
                Self::record_candles(gateway, walk, at).await;
                at += sample;
            }
            let (bids, asks) = Self::ladders(
                &mut self.rng,
                walk,
                self.config.depth_levels,
                self.config.max_level_steps,
            );
            gateway.set_book(&walk.market.symbol, bids, asks).await;
        }
        log::info!(
            "[PAPER] seeded {} markets with {} bars of history",
            self.walks.len(),
            self.config.history_bars
        );
    }

    /// Move every book one step and cross resting orders; returns the orders executed
    pub async fn step(&mut self, gateway: &PaperGateway, now: Timestamp) -> usize {
        let mut executed = 0;
        for walk in self.walks.iter_mut() {
            Self::walk(
                &mut self.rng,
                walk,
                self.config.step_volatility,
                self.config.tilt_step,
            );
            let (bids, asks) = Self::ladders(
                &mut self.rng,
                walk,
                self.config.depth_levels,
                self.config.max_level_steps,
            );
            gateway.set_book(&walk.market.symbol, bids, asks).await;
            Self::record_candles(gateway, walk, now).await;
            executed += gateway.match_resting(&walk.market.symbol).await;
        }
        executed
    }

    /// Step on `step_interval_ms` until shutdown
    pub async fn run(
        mut self,
        gateway: Arc<PaperGateway>,
        clock: Arc<dyn Clock>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let period = std::time::Duration::from_millis(self.config.step_interval_ms.max(1));
        let mut interval = tokio::time::interval(period);
        log::info!("Paper market started ({}ms steps)", period.as_millis());

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let executed = self.step(&gateway, clock.now()).await;
                    if executed > 0 {
                        log::debug!("[PAPER] {} orders executed", executed);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        log::info!("Paper market stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_clock::ManualClock;
    use meridian_core::{FeeSchedule, OrderInstruction, Side};
    use meridian_ports::ExchangeGateway;

    fn config() -> PaperMarketConfig {
        PaperMarketConfig {
            history_bars: 30,
            ..Default::default()
        }
        .with_symbols(&["SOL_USDC_PERP".to_string()])
    }

    #[test]
    fn test_default_markets_follow_symbols() {
        let config = PaperMarketConfig::default()
            .with_symbols(&["SOL_USDC_PERP".to_string(), "ETH_USDC_PERP".to_string()]);
        assert_eq!(config.markets.len(), 2);
        assert_eq!(config.markets[0].mid, dec!(100));

        // Existing entries are kept as configured
        let again = config.clone().with_symbols(&["SOL_USDC_PERP".to_string()]);
        assert_eq!(again.markets.len(), 2);
    }

    #[test]
    fn test_same_seed_same_walk() {
        let mut a = PaperMarket::with_seed(config(), 7);
        let mut b = PaperMarket::with_seed(config(), 7);
        for _ in 0..50 {
            for (wa, wb) in a.walks.iter_mut().zip(b.walks.iter_mut()) {
                PaperMarket::walk(&mut a.rng, wa, dec!(0.0005), dec!(0.1));
                PaperMarket::walk(&mut b.rng, wb, dec!(0.0005), dec!(0.1));
            }
        }
        assert_eq!(a.mid("SOL_USDC_PERP"), b.mid("SOL_USDC_PERP"));
    }

    #[test]
    fn test_walk_stays_bounded() {
        let mut market = PaperMarket::with_seed(config(), 42);
        for _ in 0..200 {
            let walk = &mut market.walks[0];
            PaperMarket::walk(&mut market.rng, walk, dec!(0.0005), dec!(0.1));
            assert!(walk.tilt >= dec!(-0.8) && walk.tilt <= dec!(0.8));
        }
        // 200 steps of at most 0.05% cannot move price by more than ~10%
        let mid = market.mid("SOL_USDC_PERP").unwrap();
        assert!(mid > dec!(90) && mid < dec!(111));
    }

    #[test]
    fn test_ladders_are_two_sided_and_stepped() {
        let mut market = PaperMarket::with_seed(config(), 3);
        let walk = market.walks[0].clone();
        let (bids, asks) = PaperMarket::ladders(&mut market.rng, &walk, 10, 200);
        assert_eq!(bids.len(), 10);
        assert_eq!(asks.len(), 10);
        assert!(bids[0].0 < asks[0].0);
        assert!(bids.windows(2).all(|w| w[0].0 > w[1].0));
        assert!(asks.windows(2).all(|w| w[0].0 < w[1].0));
        assert!(bids.iter().chain(asks.iter()).all(|(_, q)| *q >= dec!(0.1)));
    }

    #[test]
    fn test_candle_builder_rolls_over() {
        let mut builder = CandleBuilder::new(Timeframe::M1);
        let start = DateTime::from_timestamp(1_700_000_040, 0).unwrap();
        assert!(builder.update(start, dec!(100)).is_none());
        assert!(builder.update(start + Duration::seconds(10), dec!(102)).is_none());
        assert!(builder.update(start + Duration::seconds(15), dec!(99)).is_none());

        let done = builder
            .update(start + Duration::seconds(25), dec!(101))
            .unwrap();
        assert_eq!(done.open, dec!(100));
        assert_eq!(done.high, dec!(102));
        assert_eq!(done.low, dec!(99));
        assert_eq!(done.close, dec!(99));
        assert_eq!(done.timestamp, DateTime::from_timestamp(1_700_000_040, 0).unwrap());
    }

    #[tokio::test]
    async fn test_seed_and_step_drive_gateway() {
        let _ = env_logger::try_init();
        let clock = ManualClock::starting_now();
        let gateway = PaperGateway::new(clock.clone(), FeeSchedule::default(), dec!(10));
        let mut market = PaperMarket::with_seed(config(), 11);

        market.seed(&gateway, clock.now()).await;
        let book = gateway.get_depth("SOL_USDC_PERP").await.unwrap();
        assert!(book.is_two_sided());
        let candles = gateway
            .get_candles("SOL_USDC_PERP", Timeframe::M1, 100)
            .await
            .unwrap();
        assert!(candles.len() >= 28);
        assert!(gateway.get_instrument("SOL_USDC_PERP").await.is_ok());
        let balance = gateway.get_account_balance().await.unwrap();
        assert_eq!(balance.equity, dec!(10000));

        // A bid far above the market crosses on the next step
        let ask = book.best_ask().unwrap().price;
        gateway
            .place_order(&OrderInstruction::market("SOL_USDC_PERP", Side::Buy, dec!(1)))
            .await
            .unwrap();
        let held = gateway.position("SOL_USDC_PERP").await.unwrap();
        assert_eq!(held.entry_price, ask);

        let trigger = held.entry_price * dec!(2);
        gateway
            .place_order(&OrderInstruction::stop_market(
                "SOL_USDC_PERP",
                Side::Sell,
                dec!(1),
                trigger,
            ))
            .await
            .unwrap();
        clock.advance(Duration::seconds(1));
        let executed = market.step(&gateway, clock.now()).await;
        assert_eq!(executed, 1);
        assert!(gateway.position("SOL_USDC_PERP").await.is_none());
    }
}
