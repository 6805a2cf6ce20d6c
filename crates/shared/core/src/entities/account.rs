use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Account-level margin snapshot as reported by the venue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBalance {
    /// Total account equity (collateral + unrealized PnL)
    pub equity: Decimal,
    /// Margin not yet committed to positions or resting orders
    pub available_margin: Decimal,
}

impl AccountBalance {
    pub fn new(equity: Decimal, available_margin: Decimal) -> Self {
        Self {
            equity,
            available_margin,
        }
    }

    /// Margin currently tied up (equity - available), never negative
    pub fn committed_margin(&self) -> Decimal {
        (self.equity - self.available_margin).max(Decimal::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_committed_margin() {
        let balance = AccountBalance::new(dec!(1000), dec!(990));
        assert_eq!(balance.committed_margin(), dec!(10));

        // Venues occasionally report available > equity during PnL swings
        let odd = AccountBalance::new(dec!(1000), dec!(1005));
        assert_eq!(odd.committed_margin(), Decimal::ZERO);
    }
}
