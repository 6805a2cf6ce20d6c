use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Maker/taker fee rates as fractions of notional
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeeSchedule {
    /// Fee for resting orders (adds liquidity); negative for rebates
    pub maker_fee: Decimal,

    /// Fee for orders that execute immediately (removes liquidity)
    pub taker_fee: Decimal,
}

impl FeeSchedule {
    /// Create a new fee schedule
    pub fn new(maker_fee: Decimal, taker_fee: Decimal) -> Self {
        Self {
            maker_fee,
            taker_fee,
        }
    }

    /// Maker entry plus taker exit, the round trip of a stopped-out trade
    pub fn round_trip(&self) -> Decimal {
        self.maker_fee + self.taker_fee
    }

    /// Fee charged on `notional`
    pub fn calculate_fee(&self, notional: Decimal, is_maker: bool) -> Decimal {
        let rate = if is_maker {
            self.maker_fee
        } else {
            self.taker_fee
        };
        notional * rate
    }
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            maker_fee: Decimal::new(2, 4), // 0.02% maker
            taker_fee: Decimal::new(5, 4), // 0.05% taker
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_round_trip() {
        let fees = FeeSchedule::new(dec!(0.0003), dec!(0.0008));
        assert_eq!(fees.round_trip(), dec!(0.0011));
    }

    #[test]
    fn test_calculate_fee() {
        let fees = FeeSchedule::new(dec!(-0.0001), dec!(0.0005));
        assert_eq!(fees.calculate_fee(dec!(10000), true), dec!(-1));
        assert_eq!(fees.calculate_fee(dec!(10000), false), dec!(5));
    }
}
