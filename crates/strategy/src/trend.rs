//! Trend and regime readers
//!
//! Close-versus-EMA bias per timeframe, the market pulse (bias of a
//! reference symbol), multi-timeframe alignment and the compound regime
//! check. Unreadable or short candle history reads as neutral.

use log::debug;
use meridian_core::{Candle, PositionSide, Symbol, Timeframe};
use meridian_ports::ExchangeGateway;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;

use crate::config::TrendConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TrendBias {
    Bullish,
    Bearish,
    Neutral,
}

impl TrendBias {
    pub fn side(&self) -> Option<PositionSide> {
        match self {
            TrendBias::Bullish => Some(PositionSide::Long),
            TrendBias::Bearish => Some(PositionSide::Short),
            TrendBias::Neutral => None,
        }
    }

    pub fn supports(&self, side: PositionSide) -> bool {
        self.side() == Some(side)
    }

    pub fn opposes(&self, side: PositionSide) -> bool {
        self.side() == Some(side.opposite())
    }

    pub fn is_directional(&self) -> bool {
        !matches!(self, TrendBias::Neutral)
    }
}

impl std::fmt::Display for TrendBias {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrendBias::Bullish => write!(f, "BULLISH"),
            TrendBias::Bearish => write!(f, "BEARISH"),
            TrendBias::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

/// Exponential moving average seeded with the first value (alpha = 2 / (period + 1))
pub fn ema(values: &[Decimal], period: usize) -> Option<Decimal> {
    let (first, rest) = values.split_first()?;
    if period == 0 {
        return None;
    }
    let alpha = Decimal::TWO / Decimal::from(period + 1);
    let mut average = *first;
    for value in rest {
        average += alpha * (*value - average);
    }
    Some(average)
}

/// Last close against its EMA; neutral with fewer than `period` candles
pub fn trend_bias(candles: &[Candle], period: usize) -> TrendBias {
    if period == 0 || candles.len() < period {
        return TrendBias::Neutral;
    }
    let closes: Vec<Decimal> = candles.iter().map(|c| c.close).collect();
    let (Some(average), Some(last)) = (ema(&closes, period), closes.last()) else {
        return TrendBias::Neutral;
    };
    if *last > average {
        TrendBias::Bullish
    } else if *last < average {
        TrendBias::Bearish
    } else {
        TrendBias::Neutral
    }
}

/// Share of the last `lookback` candles that closed in `side`'s favour
pub fn regime_win_rate(candles: &[Candle], side: PositionSide, lookback: usize) -> Option<Decimal> {
    if lookback == 0 || candles.len() < lookback {
        return None;
    }
    let recent = &candles[candles.len() - lookback..];
    let wins = recent
        .iter()
        .filter(|c| match side {
            PositionSide::Long => c.is_bullish(),
            PositionSide::Short => c.is_bearish(),
        })
        .count();
    Some(Decimal::from(wins) / Decimal::from(lookback))
}

/// Candle-backed trend reads through the gateway (and its candle cache)
pub struct TrendReader {
    gateway: Arc<dyn ExchangeGateway>,
    config: TrendConfig,
    pulse_symbol: Option<Symbol>,
}

impl TrendReader {
    pub fn new(
        gateway: Arc<dyn ExchangeGateway>,
        config: TrendConfig,
        pulse_symbol: Option<Symbol>,
    ) -> Self {
        Self {
            gateway,
            config,
            pulse_symbol,
        }
    }

    pub fn config(&self) -> &TrendConfig {
        &self.config
    }

    async fn candles(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> Vec<Candle> {
        match self.gateway.get_candles(symbol, timeframe, limit).await {
            Ok(candles) => candles,
            Err(e) => {
                debug!("[{}] {} candles unavailable: {}", symbol, timeframe, e);
                Vec::new()
            }
        }
    }

    pub async fn bias(&self, symbol: &str, timeframe: Timeframe, period: usize) -> TrendBias {
        let candles = self.candles(symbol, timeframe, period + 10).await;
        trend_bias(&candles, period)
    }

    /// The symbol's own short-term trend
    pub async fn local_bias(&self, symbol: &str) -> TrendBias {
        self.bias(symbol, self.config.timeframe, self.config.ema_period)
            .await
    }

    /// Market-wide direction, read from the reference symbol
    pub async fn pulse(&self) -> TrendBias {
        let Some(symbol) = self.pulse_symbol.as_deref() else {
            return TrendBias::Neutral;
        };
        let candles = self
            .candles(symbol, self.config.pulse_timeframe, self.config.pulse_ema_period)
            .await;
        trend_bias(&candles, self.config.pulse_ema_period)
    }

    /// Number of 1m/5m/15m biases supporting `side`
    pub async fn alignment(&self, symbol: &str, side: PositionSide) -> usize {
        let mut aligned = 0;
        for timeframe in [Timeframe::M1, Timeframe::M5, Timeframe::M15] {
            if self
                .bias(symbol, timeframe, self.config.ema_period)
                .await
                .supports(side)
            {
                aligned += 1;
            }
        }
        aligned
    }

    /// Recent candles favoured `side` often enough; short history passes
    pub async fn regime_ok(&self, symbol: &str, side: PositionSide) -> bool {
        let lookback = self.config.regime_candles;
        let candles = self.candles(symbol, Timeframe::M1, lookback).await;
        match regime_win_rate(&candles, side, lookback) {
            Some(rate) => rate >= self.config.regime_min_win_rate,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn closes(values: &[Decimal]) -> Vec<Candle> {
        values
            .iter()
            .map(|&c| Candle::new(c, c, c, c, Utc::now()))
            .collect()
    }

    #[test]
    fn test_ema_seeded_with_first_value() {
        // alpha = 0.5
        assert_eq!(ema(&[dec!(10), dec!(20), dec!(20)], 3), Some(dec!(17.5)));
        assert_eq!(ema(&[], 3), None);
    }

    #[test]
    fn test_trend_bias() {
        let rising = closes(&[dec!(1), dec!(2), dec!(3), dec!(4)]);
        assert_eq!(trend_bias(&rising, 3), TrendBias::Bullish);

        let falling = closes(&[dec!(4), dec!(3), dec!(2), dec!(1)]);
        assert_eq!(trend_bias(&falling, 3), TrendBias::Bearish);

        assert_eq!(trend_bias(&rising, 5), TrendBias::Neutral);
        assert_eq!(trend_bias(&closes(&[dec!(2); 4]), 3), TrendBias::Neutral);
    }

    #[test]
    fn test_bias_against_side() {
        assert!(TrendBias::Bearish.opposes(PositionSide::Long));
        assert!(!TrendBias::Neutral.opposes(PositionSide::Long));
        assert!(TrendBias::Bullish.supports(PositionSide::Long));
        assert!(!TrendBias::Neutral.is_directional());
    }

    #[test]
    fn test_regime_win_rate() {
        let now = Utc::now();
        let up = Candle::new(dec!(1), dec!(2), dec!(1), dec!(2), now);
        let down = Candle::new(dec!(2), dec!(2), dec!(1), dec!(1), now);
        let candles = vec![down, up, up, down, up];

        assert_eq!(regime_win_rate(&candles, PositionSide::Long, 4), Some(dec!(0.75)));
        assert_eq!(regime_win_rate(&candles, PositionSide::Short, 5), Some(dec!(0.4)));
        assert_eq!(regime_win_rate(&candles, PositionSide::Long, 6), None);
    }
}
