use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Order side (Buy or Sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Returns the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

/// Direction of exposure - long (bought) or short (sold)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PositionSide {
    /// Profits when price rises
    Long,
    /// Profits when price falls
    Short,
}

impl PositionSide {
    /// Returns the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            PositionSide::Long => PositionSide::Short,
            PositionSide::Short => PositionSide::Long,
        }
    }

    /// Order side that opens (or adds to) this exposure
    pub fn entry_side(&self) -> Side {
        match self {
            PositionSide::Long => Side::Buy,
            PositionSide::Short => Side::Sell,
        }
    }

    /// Order side that reduces this exposure
    pub fn exit_side(&self) -> Side {
        self.entry_side().opposite()
    }

    /// +1 for long, -1 for short
    pub fn sign(&self) -> Decimal {
        match self {
            PositionSide::Long => Decimal::ONE,
            PositionSide::Short => Decimal::NEGATIVE_ONE,
        }
    }

    /// Side of a signed net quantity; `None` when flat
    pub fn from_net_quantity(net: Decimal) -> Option<Self> {
        if net > Decimal::ZERO {
            Some(PositionSide::Long)
        } else if net < Decimal::ZERO {
            Some(PositionSide::Short)
        } else {
            None
        }
    }

    /// Exposure opened by an order of the given side
    pub fn from_entry_side(side: Side) -> Self {
        match side {
            Side::Buy => PositionSide::Long,
            Side::Sell => PositionSide::Short,
        }
    }
}

impl std::fmt::Display for PositionSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PositionSide::Long => write!(f, "LONG"),
            PositionSide::Short => write!(f, "SHORT"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_entry_and_exit_sides() {
        assert_eq!(PositionSide::Long.entry_side(), Side::Buy);
        assert_eq!(PositionSide::Long.exit_side(), Side::Sell);
        assert_eq!(PositionSide::Short.entry_side(), Side::Sell);
        assert_eq!(PositionSide::Short.exit_side(), Side::Buy);
    }

    #[test]
    fn test_from_net_quantity() {
        assert_eq!(
            PositionSide::from_net_quantity(dec!(0.5)),
            Some(PositionSide::Long)
        );
        assert_eq!(
            PositionSide::from_net_quantity(dec!(-2)),
            Some(PositionSide::Short)
        );
        assert_eq!(PositionSide::from_net_quantity(Decimal::ZERO), None);
    }
}
