//! Capital Guard
//!
//! Reserve enforcement and position sizing. Everything except
//! [`CapitalGuard::check_capital_safety`] is pure arithmetic over a balance
//! snapshot, so it is usable from tests and from sync code.

use log::{debug, warn};
use meridian_core::{AccountBalance, MarketSnapshot, Price, Quantity, Side};
use meridian_ports::ExchangeGateway;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::parameters::CapitalGuardConfig;

/// Derived view of the account; never persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CapitalLedger {
    pub equity: Decimal,
    pub available: Decimal,
    /// Margin already tied up (equity - available)
    pub committed: Decimal,
    /// equity × reserve_ratio
    pub reserve: Decimal,
    /// min(available, equity × (1 - reserve_ratio) - committed), floored at zero
    pub usable: Decimal,
}

/// Outcome of a capital check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapitalCheck {
    pub safe: bool,
    /// Never negative; zero whenever `safe` is false because of a read failure
    pub usable: Decimal,
    pub ledger: Option<CapitalLedger>,
    pub reason: Option<String>,
}

impl CapitalCheck {
    /// Fail-closed result for an unreadable account
    pub fn closed(reason: impl Into<String>) -> Self {
        Self {
            safe: false,
            usable: Decimal::ZERO,
            ledger: None,
            reason: Some(reason.into()),
        }
    }
}

/// Reserve enforcement and sizing
#[derive(Debug, Clone, Default)]
pub struct CapitalGuard {
    config: CapitalGuardConfig,
}

impl CapitalGuard {
    pub fn new(config: CapitalGuardConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CapitalGuardConfig {
        &self.config
    }

    /// Build the ledger for a balance snapshot
    pub fn ledger(&self, balance: &AccountBalance) -> CapitalLedger {
        let ratio = self.config.effective_reserve_ratio();
        let equity = balance.equity.max(Decimal::ZERO);
        let available = balance.available_margin.max(Decimal::ZERO);
        let committed = balance.committed_margin();
        let reserve = equity * ratio;
        let budget = equity * (Decimal::ONE - ratio) - committed;
        let usable = budget.min(available).max(Decimal::ZERO);
        CapitalLedger {
            equity,
            available,
            committed,
            reserve,
            usable,
        }
    }

    /// Judge a balance snapshot
    pub fn evaluate(&self, balance: &AccountBalance) -> CapitalCheck {
        let ledger = self.ledger(balance);

        let reason = if ledger.equity <= Decimal::ZERO {
            Some("no equity".to_string())
        } else if ledger.committed > ledger.equity - ledger.reserve {
            Some(format!(
                "reserve breached: committed {} > {}",
                ledger.committed.round_dp(2),
                (ledger.equity - ledger.reserve).round_dp(2)
            ))
        } else if ledger.usable < self.config.min_usable_capital {
            Some(format!(
                "usable {} below floor {}",
                ledger.usable.round_dp(2),
                self.config.min_usable_capital
            ))
        } else {
            None
        };

        CapitalCheck {
            safe: reason.is_none(),
            usable: ledger.usable,
            ledger: Some(ledger),
            reason,
        }
    }

    /// Read the account and judge it; any read failure fails closed
    pub async fn check_capital_safety(&self, gateway: &dyn ExchangeGateway) -> CapitalCheck {
        match gateway.get_account_balance().await {
            Ok(balance) => {
                let check = self.evaluate(&balance);
                match &check.reason {
                    Some(reason) => warn!("[CAPITAL] unsafe: {}", reason),
                    None => debug!(
                        "[CAPITAL] equity {} usable {}",
                        balance.equity.round_dp(2),
                        check.usable.round_dp(2)
                    ),
                }
                check
            }
            Err(e) => {
                warn!("[CAPITAL] balance read failed, refusing entries: {}", e);
                CapitalCheck::closed(e.to_string())
            }
        }
    }

    /// Leverage-based size: usable × leverage / price
    ///
    /// With `depth`, the result is capped at `liquidity_fraction` of the
    /// resting size an order of `side` would consume across the top
    /// `liquidity_levels` levels. An empty consumed side leaves the size
    /// uncapped. Not rounded to the quantity step.
    pub fn size_position(
        &self,
        usable: Decimal,
        leverage: Decimal,
        price: Price,
        depth: Option<(&MarketSnapshot, Side)>,
    ) -> Quantity {
        if usable <= Decimal::ZERO || leverage <= Decimal::ZERO || price <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let notional = usable * leverage;
        let mut quantity = notional / price;

        if let Some((book, side)) = depth {
            let liquidity = book.consumable_qty(side, self.config.liquidity_levels);
            if liquidity > Decimal::ZERO {
                let cap = liquidity * self.config.liquidity_fraction;
                if quantity > cap {
                    debug!(
                        "[CAPITAL] {} size {} capped by liquidity to {}",
                        book.symbol(),
                        quantity.round_dp(4),
                        cap.round_dp(4)
                    );
                    quantity = cap;
                }
            }
        }
        quantity
    }

    /// Fixed-fractional size so that |entry - stop| × qty ≤ usable × max_risk
    pub fn size_by_risk(
        &self,
        entry: Price,
        stop: Price,
        usable: Decimal,
        max_risk_fraction: Decimal,
    ) -> Quantity {
        let distance = (entry - stop).abs();
        if distance.is_zero() || usable <= Decimal::ZERO || max_risk_fraction <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        usable * max_risk_fraction / distance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use meridian_core::BookLevel;
    use rust_decimal_macros::dec;

    fn guard() -> CapitalGuard {
        CapitalGuard::new(CapitalGuardConfig::default().with_reserve_ratio(dec!(0.3)))
    }

    #[test]
    fn test_sizing_scenario() {
        // equity 1000 with 10 committed, 30% reserve, 5x at $100
        let guard = guard();
        let check = guard.evaluate(&AccountBalance::new(dec!(1000), dec!(990)));
        assert!(check.safe);
        assert_eq!(check.usable, dec!(690));

        let qty = guard.size_position(check.usable, dec!(5), dec!(100), None);
        assert_eq!(qty * dec!(100), dec!(3450));
        assert_eq!(qty, dec!(34.5));
    }

    #[test]
    fn test_usable_limited_by_available() {
        let guard = guard();
        // Venue reports less available than the reserve budget allows
        let ledger = guard.ledger(&AccountBalance::new(dec!(1000), dec!(200)));
        assert_eq!(ledger.committed, dec!(800));
        assert_eq!(ledger.usable, Decimal::ZERO);
    }

    #[test]
    fn test_reserve_breach_is_unsafe() {
        let guard = guard();
        let check = guard.evaluate(&AccountBalance::new(dec!(1000), dec!(250)));
        assert!(!check.safe);
        assert!(check.reason.unwrap().contains("reserve"));
    }

    #[test]
    fn test_floor_is_unsafe() {
        let guard = guard();
        let check = guard.evaluate(&AccountBalance::new(dec!(12), dec!(12)));
        // usable = 12 × 0.7 = 8.4 < 10
        assert!(!check.safe);
        assert_eq!(check.usable, dec!(8.4));
    }

    #[test]
    fn test_liquidity_cap_uses_consumed_side() {
        let guard = guard();
        let book = MarketSnapshot::new(
            "SOL",
            Utc::now(),
            vec![BookLevel::new(dec!(99), dec!(1000))],
            vec![
                BookLevel::new(dec!(101), dec!(50)),
                BookLevel::new(dec!(102), dec!(50)),
            ],
        );
        // Buying consumes asks: 100 × 10% = 10
        let buy = guard.size_position(dec!(690), dec!(5), dec!(100), Some((&book, Side::Buy)));
        assert_eq!(buy, dec!(10));
        // Selling consumes bids: 1000 × 10% = 100, uncapped at 34.5
        let sell = guard.size_position(dec!(690), dec!(5), dec!(100), Some((&book, Side::Sell)));
        assert_eq!(sell, dec!(34.5));
    }

    #[test]
    fn test_size_by_risk() {
        let guard = guard();
        let qty = guard.size_by_risk(dec!(100), dec!(98), dec!(500), dec!(0.02));
        assert_eq!(qty, dec!(5));
        assert_eq!(guard.size_by_risk(dec!(100), dec!(100), dec!(500), dec!(0.02)), Decimal::ZERO);
    }

    #[test]
    fn test_degenerate_inputs_size_zero() {
        let guard = guard();
        assert_eq!(guard.size_position(dec!(-5), dec!(5), dec!(100), None), Decimal::ZERO);
        assert_eq!(guard.size_position(dec!(100), dec!(5), Decimal::ZERO, None), Decimal::ZERO);
    }
}
