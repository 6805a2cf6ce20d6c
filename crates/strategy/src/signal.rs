//! Order-book signals
//!
//! Pure functions over a [`MarketSnapshot`]. None of them fail: an empty or
//! one-sided book reads as neutral (zero) everywhere, which in turn makes
//! every entry check fail.

use meridian_core::{MarketSnapshot, PositionSide};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    /// Book levels per side read by every signal
    pub depth_levels: usize,
    /// A level holding more than this share of its side is treated as a possible spoof...
    pub spoof_share: Decimal,
    /// ...and counted at this weight
    pub spoof_weight: Decimal,
    /// Spreads of slippage allowed for in the safe-stop zone
    pub spread_multiple: Decimal,
    /// Structural floor of the safe-stop zone, in ATR
    pub structural_atr_multiple: Decimal,
    pub min_safe_stop: Decimal,
    /// Absorption must sit at least this many spreads from the touch...
    pub absorption_spread_multiple: Decimal,
    /// ...and never closer than this
    pub min_absorption: Decimal,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            depth_levels: 10,
            spoof_share: dec!(0.5),
            spoof_weight: dec!(0.5),
            spread_multiple: dec!(3),
            structural_atr_multiple: dec!(0.8),
            min_safe_stop: dec!(0.001),
            absorption_spread_multiple: dec!(1.5),
            min_absorption: dec!(0.0004),
        }
    }
}

/// Derived, never persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SignalReading {
    /// Order-book imbalance in [-1, 1]
    pub obi: Decimal,
    /// (ask - bid) / mid
    pub spread: Decimal,
    /// Distance from the touch to the largest resting level, as a fraction
    pub absorption: Decimal,
    /// Stop distance the book can absorb, as a fraction
    pub safe_stop: Decimal,
}

impl SignalReading {
    /// OBI signed in favour of `side`
    pub fn obi_for(&self, side: PositionSide) -> Decimal {
        self.obi * side.sign()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SignalCalculator {
    config: SignalConfig,
}

impl SignalCalculator {
    pub fn new(config: SignalConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SignalConfig {
        &self.config
    }

    /// Every reading for one side at once
    pub fn read(
        &self,
        snapshot: &MarketSnapshot,
        side: PositionSide,
        recent_range: Decimal,
        atr: Option<Decimal>,
    ) -> SignalReading {
        SignalReading {
            obi: self.calculate_obi(snapshot),
            spread: self.spread_fraction(snapshot),
            absorption: self.absorption_range(snapshot, side),
            safe_stop: self.safe_stop_zone(snapshot, side, recent_range, atr),
        }
    }

    /// Volume-weighted imbalance of the top levels, with oversized levels damped
    pub fn calculate_obi(&self, snapshot: &MarketSnapshot) -> Decimal {
        if !snapshot.is_two_sided() {
            return Decimal::ZERO;
        }
        let levels = self.config.depth_levels;
        let bids: Vec<Decimal> = snapshot.top_bids(levels).iter().map(|l| l.quantity).collect();
        let asks: Vec<Decimal> = snapshot.top_asks(levels).iter().map(|l| l.quantity).collect();

        let bid_volume = self.damped_volume(&bids);
        let ask_volume = self.damped_volume(&asks);
        let total = bid_volume + ask_volume;
        if total <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        ((bid_volume - ask_volume) / total).clamp(Decimal::NEGATIVE_ONE, Decimal::ONE)
    }

    fn damped_volume(&self, sizes: &[Decimal]) -> Decimal {
        let raw: Decimal = sizes.iter().copied().sum();
        if raw <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        sizes
            .iter()
            .map(|&size| {
                if size / raw > self.config.spoof_share {
                    size * self.config.spoof_weight
                } else {
                    size
                }
            })
            .sum()
    }

    /// (best_ask - best_bid) / mid; zero unless the book is two-sided
    pub fn spread_fraction(&self, snapshot: &MarketSnapshot) -> Decimal {
        match (snapshot.spread(), snapshot.mid_price()) {
            (Some(spread), Some(mid)) if mid > Decimal::ZERO && snapshot.is_two_sided() => {
                spread / mid
            }
            _ => Decimal::ZERO,
        }
    }

    /// Distance from the touch to the largest level on the side that supports `side`
    ///
    /// Longs lean on bids, shorts on asks. Ties go to the level nearest the touch.
    pub fn absorption_range(&self, snapshot: &MarketSnapshot, side: PositionSide) -> Decimal {
        let levels = match side {
            PositionSide::Long => snapshot.top_bids(self.config.depth_levels),
            PositionSide::Short => snapshot.top_asks(self.config.depth_levels),
        };
        let Some(best) = levels.first().map(|l| l.price) else {
            return Decimal::ZERO;
        };
        if best <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let mut wall = &levels[0];
        for level in &levels[1..] {
            if level.quantity > wall.quantity {
                wall = level;
            }
        }
        if wall.quantity <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        (best - wall.price).abs() / best
    }

    /// Stop distance the book can absorb
    ///
    /// `spread_multiple × spread + recent_range + absorption`, floored by
    /// `structural_atr_multiple × atr` and by `min_safe_stop`. Zero when the
    /// book is not two-sided.
    pub fn safe_stop_zone(
        &self,
        snapshot: &MarketSnapshot,
        side: PositionSide,
        recent_range: Decimal,
        atr: Option<Decimal>,
    ) -> Decimal {
        if !snapshot.is_two_sided() {
            return Decimal::ZERO;
        }
        let spread = self.spread_fraction(snapshot);
        let mut zone = spread * self.config.spread_multiple
            + recent_range.max(Decimal::ZERO)
            + self.absorption_range(snapshot, side);
        if let Some(atr) = atr {
            zone = zone.max(atr * self.config.structural_atr_multiple);
        }
        zone.max(self.config.min_safe_stop)
    }

    /// The supporting wall sits far enough from the touch to be real
    pub fn absorption_confirmed(&self, reading: &SignalReading) -> bool {
        reading.absorption > Decimal::ZERO
            && reading.absorption
                >= (reading.spread * self.config.absorption_spread_multiple)
                    .max(self.config.min_absorption)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use meridian_core::BookLevel;

    fn book(bids: &[(Decimal, Decimal)], asks: &[(Decimal, Decimal)]) -> MarketSnapshot {
        MarketSnapshot::new(
            "SOL_USDC_PERP",
            Utc::now(),
            bids.iter().map(|&(p, q)| BookLevel::new(p, q)),
            asks.iter().map(|&(p, q)| BookLevel::new(p, q)),
        )
    }

    #[test]
    fn test_obi_balanced_and_skewed() {
        let calc = SignalCalculator::default();
        let balanced = book(
            &[(dec!(99.9), dec!(5)), (dec!(99.8), dec!(5))],
            &[(dec!(100.1), dec!(5)), (dec!(100.2), dec!(5))],
        );
        assert_eq!(calc.calculate_obi(&balanced), Decimal::ZERO);

        // 30 bid vs 10 ask, no level above half its side
        let bid_heavy = book(
            &[(dec!(99.9), dec!(10)), (dec!(99.8), dec!(10)), (dec!(99.7), dec!(10))],
            &[(dec!(100.1), dec!(5)), (dec!(100.2), dec!(5))],
        );
        assert_eq!(calc.calculate_obi(&bid_heavy), dec!(0.5));
    }

    #[test]
    fn test_obi_damps_spoof_walls() {
        let calc = SignalCalculator::default();
        // 80-lot wall is > 50% of bids: counted as 40, bids = 40 + 10 + 10 = 60
        let spoofed = book(
            &[(dec!(99.9), dec!(10)), (dec!(99.8), dec!(10)), (dec!(99.7), dec!(80))],
            &[(dec!(100.1), dec!(20)), (dec!(100.2), dec!(20))],
        );
        assert_eq!(calc.calculate_obi(&spoofed), dec!(0.2));
    }

    #[test]
    fn test_empty_and_one_sided_books_are_neutral() {
        let calc = SignalCalculator::default();
        let empty = MarketSnapshot::empty("SOL_USDC_PERP", Utc::now());
        let reading = calc.read(&empty, PositionSide::Long, dec!(0.01), Some(dec!(0.01)));
        assert_eq!(reading, SignalReading::default());
        assert!(!calc.absorption_confirmed(&reading));

        let bids_only = book(&[(dec!(99.9), dec!(10)), (dec!(99.0), dec!(50))], &[]);
        assert_eq!(calc.calculate_obi(&bids_only), Decimal::ZERO);
        assert_eq!(calc.spread_fraction(&bids_only), Decimal::ZERO);
        assert_eq!(
            calc.safe_stop_zone(&bids_only, PositionSide::Long, dec!(0.01), None),
            Decimal::ZERO
        );
    }

    #[test]
    fn test_spread_fraction() {
        let calc = SignalCalculator::default();
        let snapshot = book(&[(dec!(99), dec!(1))], &[(dec!(101), dec!(1))]);
        assert_eq!(calc.spread_fraction(&snapshot), dec!(0.02));
    }

    #[test]
    fn test_absorption_uses_supporting_side() {
        let calc = SignalCalculator::default();
        let snapshot = book(
            &[(dec!(100), dec!(1)), (dec!(99.5), dec!(2)), (dec!(99), dec!(9))],
            &[(dec!(100.1), dec!(7)), (dec!(100.5), dec!(3))],
        );
        assert_eq!(calc.absorption_range(&snapshot, PositionSide::Long), dec!(0.01));
        // Largest ask is the touch itself
        assert_eq!(calc.absorption_range(&snapshot, PositionSide::Short), Decimal::ZERO);
    }

    #[test]
    fn test_safe_stop_zone_components_and_floors() {
        let calc = SignalCalculator::default();
        // spread 0.001, wall 1% below the touch
        let snapshot = book(
            &[(dec!(99.95), dec!(1)), (dec!(98.9505), dec!(9))],
            &[(dec!(100.05), dec!(1))],
        );
        let absorption = calc.absorption_range(&snapshot, PositionSide::Long);
        let zone = calc.safe_stop_zone(&snapshot, PositionSide::Long, dec!(0.002), None);
        assert_eq!(zone, dec!(0.003) + dec!(0.002) + absorption);

        // ATR floor dominates
        let zone = calc.safe_stop_zone(&snapshot, PositionSide::Long, dec!(0.002), Some(dec!(0.05)));
        assert_eq!(zone, dec!(0.04));

        // Absolute floor
        let tight = book(&[(dec!(100), dec!(5))], &[(dec!(100.001), dec!(5))]);
        let zone = calc.safe_stop_zone(&tight, PositionSide::Long, Decimal::ZERO, None);
        assert_eq!(zone, dec!(0.001));
    }

    #[test]
    fn test_absorption_confirmation_threshold() {
        let calc = SignalCalculator::default();
        let reading = SignalReading {
            obi: dec!(0.5),
            spread: dec!(0.001),
            absorption: dec!(0.0015),
            safe_stop: dec!(0.01),
        };
        assert!(calc.absorption_confirmed(&reading));
        let shallow = SignalReading {
            absorption: dec!(0.0014),
            ..reading
        };
        assert!(!calc.absorption_confirmed(&shallow));
        assert_eq!(reading.obi_for(PositionSide::Short), dec!(-0.5));
    }
}
