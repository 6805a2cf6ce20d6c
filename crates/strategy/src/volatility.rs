//! Volatility estimator
//!
//! Mean true range over recent candles, as a fraction of price. Results are
//! cached per (symbol, timeframe, period) with a long TTL; a failed candle
//! read is not cached and reads as "unknown" (`None`).

use chrono::Duration;
use log::debug;
use meridian_core::{Candle, Symbol, Timeframe};
use meridian_gateway::TtlCache;
use meridian_ports::{Clock, ExchangeGateway, GatewayError};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Mean of the last `period` true ranges, each divided by its candle's close
///
/// `candles` must be oldest first. Needs `period + 1` candles since the first
/// one only provides a previous close.
pub fn true_range_fraction(candles: &[Candle], period: usize) -> Option<Decimal> {
    if period == 0 || candles.len() < period + 1 {
        return None;
    }
    let start = candles.len() - period;
    let mut sum = Decimal::ZERO;
    for i in start..candles.len() {
        let candle = &candles[i];
        let prev_close = candles[i - 1].close;
        if candle.close <= Decimal::ZERO {
            return None;
        }
        let true_range = (candle.high - candle.low)
            .max((candle.high - prev_close).abs())
            .max((candle.low - prev_close).abs());
        sum += true_range / candle.close;
    }
    Some(sum / Decimal::from(period))
}

type AtrKey = (Symbol, Timeframe, usize);

pub struct VolatilityEstimator {
    gateway: Arc<dyn ExchangeGateway>,
    cache: TtlCache<AtrKey, Option<Decimal>>,
    ttl: Duration,
}

impl VolatilityEstimator {
    pub fn new(gateway: Arc<dyn ExchangeGateway>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            gateway,
            cache: TtlCache::new(clock),
            ttl,
        }
    }

    /// ATR fraction, or `None` when history is short or unreadable
    pub async fn atr_fraction(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        period: usize,
    ) -> Option<Decimal> {
        let key = (symbol.to_string(), timeframe, period);
        let gateway = self.gateway.clone();
        let result = self
            .cache
            .get_or_fetch(key, self.ttl, || async move {
                let candles = gateway.get_candles(symbol, timeframe, period + 1).await?;
                Ok::<_, GatewayError>(true_range_fraction(&candles, period))
            })
            .await;
        match result {
            Ok(atr) => atr,
            Err(e) => {
                debug!("[{}] ATR {} unavailable: {}", symbol, timeframe, e);
                None
            }
        }
    }

    pub fn invalidate(&self, symbol: &str) {
        self.cache.invalidate_where(|(s, _, _)| s == symbol);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use meridian_clock::ManualClock;
    use meridian_core::{FeeSchedule, Instrument};
    use meridian_gateway::{PaperCall, PaperGateway};
    use rust_decimal_macros::dec;

    fn candle(open: Decimal, high: Decimal, low: Decimal, close: Decimal) -> Candle {
        Candle::new(open, high, low, close, Utc::now())
    }

    #[test]
    fn test_true_range_uses_previous_close() {
        let candles = vec![
            candle(dec!(100), dec!(101), dec!(99), dec!(100)),
            // plain range 2
            candle(dec!(100), dec!(101), dec!(99), dec!(100)),
            // gap up: |high - prev close| = 4
            candle(dec!(103), dec!(104), dec!(103), dec!(100)),
        ];
        assert_eq!(true_range_fraction(&candles, 2), Some(dec!(0.03)));
        assert_eq!(true_range_fraction(&candles, 3), None);
        assert_eq!(true_range_fraction(&candles, 0), None);
    }

    #[tokio::test]
    async fn test_estimator_caches_and_skips_failures() {
        let clock = ManualClock::starting_now();
        let paper = Arc::new(PaperGateway::new(clock.clone(), FeeSchedule::default(), dec!(10)));
        paper
            .add_instrument(Instrument::new("SOL_USDC_PERP", dec!(0.01), dec!(0.1)))
            .await;
        let series: Vec<Candle> = (0..4)
            .map(|_| candle(dec!(100), dec!(101), dec!(99), dec!(100)))
            .collect();
        paper
            .set_candles("SOL_USDC_PERP", Timeframe::M5, series)
            .await;

        let estimator = VolatilityEstimator::new(paper.clone(), clock.clone(), Duration::seconds(60));

        paper.fail_next(PaperCall::Candles, 1).await;
        assert_eq!(estimator.atr_fraction("SOL_USDC_PERP", Timeframe::M5, 3).await, None);

        assert_eq!(
            estimator.atr_fraction("SOL_USDC_PERP", Timeframe::M5, 3).await,
            Some(dec!(0.02))
        );

        // Changed candles are not seen until the TTL lapses
        paper.set_candles("SOL_USDC_PERP", Timeframe::M5, Vec::new()).await;
        assert_eq!(
            estimator.atr_fraction("SOL_USDC_PERP", Timeframe::M5, 3).await,
            Some(dec!(0.02))
        );
        clock.advance(Duration::seconds(61));
        assert_eq!(estimator.atr_fraction("SOL_USDC_PERP", Timeframe::M5, 3).await, None);
    }
}
