//! Integration tests: capital guard against the paper venue, plus
//! property tests for the capital bound.

use meridian_clock::ManualClock;
use meridian_core::{AccountBalance, FeeSchedule, Instrument, Position};
use meridian_gateway::{PaperCall, PaperGateway};
use meridian_risk_manager::{CapitalGuard, CapitalGuardConfig};
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

async fn venue(cash: Decimal) -> PaperGateway {
    let gw = PaperGateway::new(
        ManualClock::starting_now(),
        FeeSchedule::new(Decimal::ZERO, Decimal::ZERO),
        dec!(10),
    );
    gw.add_instrument(Instrument::new("BTC_USDC_PERP", dec!(0.1), dec!(0.0001)))
        .await;
    gw.set_book(
        "BTC_USDC_PERP",
        vec![(dec!(60000.0), dec!(2))],
        vec![(dec!(60000.2), dec!(2))],
    )
    .await;
    gw.set_cash(cash).await;
    gw
}

#[tokio::test]
async fn test_read_failure_fails_closed() {
    let _ = env_logger::try_init();
    let gw = venue(dec!(1000)).await;
    let guard = CapitalGuard::default();

    gw.fail_next(PaperCall::Balance, 1).await;
    let check = guard.check_capital_safety(&gw).await;
    assert!(!check.safe);
    assert_eq!(check.usable, Decimal::ZERO);
    assert!(check.ledger.is_none());

    // Next read succeeds
    let check = guard.check_capital_safety(&gw).await;
    assert!(check.safe);
}

#[tokio::test]
async fn test_committed_margin_shrinks_usable() {
    let _ = env_logger::try_init();
    let gw = venue(dec!(1000)).await;
    let guard = CapitalGuard::new(CapitalGuardConfig::default().with_reserve_ratio(dec!(0.3)));

    let idle = guard.check_capital_safety(&gw).await;
    assert_eq!(idle.usable, dec!(700));

    // 0.05 BTC at 60000.1 on 10x commits 300.0 of margin (entry at mid, no PnL)
    gw.set_position(Position::new(
        "BTC_USDC_PERP",
        dec!(0.05),
        dec!(60000.1),
        dec!(60000.1),
    ))
    .await;
    let busy = guard.check_capital_safety(&gw).await;
    let ledger = busy.ledger.unwrap();
    assert_eq!(ledger.committed, dec!(300.005));
    assert_eq!(busy.usable, dec!(399.995));
    assert!(busy.safe);
}

#[tokio::test]
async fn test_every_symbol_sees_the_same_pool() {
    let _ = env_logger::try_init();
    let gw = venue(dec!(14)).await;
    let guard = CapitalGuard::default();

    // 14 × 0.7 = 9.8 < $10 floor: no symbol may enter
    let check = guard.check_capital_safety(&gw).await;
    assert!(!check.safe);
    assert_eq!(check.usable, dec!(9.8));
}

// Strategies for generating test data
fn equity_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..10_000_000i64).prop_map(|x| Decimal::new(x, 2)) // $0.01 to $100,000
}

fn ratio_strategy() -> impl Strategy<Value = Decimal> {
    (0i64..95i64).prop_map(|x| Decimal::new(x, 2)) // 0% to 94%
}

fn leverage_strategy() -> impl Strategy<Value = Decimal> {
    (1u32..=50u32).prop_map(Decimal::from)
}

fn price_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..10_000_000i64).prop_map(|x| Decimal::new(x, 2))
}

proptest! {
    /// Sized notional never exceeds usable × leverage, and usable never
    /// exceeds the reserve budget or the available margin
    #[test]
    fn capital_bound_holds(
        equity in equity_strategy(),
        committed_pct in 0i64..=100i64,
        ratio in ratio_strategy(),
        leverage in leverage_strategy(),
        price in price_strategy(),
    ) {
        let committed = equity * Decimal::new(committed_pct, 2);
        let balance = AccountBalance::new(equity, equity - committed);
        let guard = CapitalGuard::new(CapitalGuardConfig::default().with_reserve_ratio(ratio));

        let check = guard.evaluate(&balance);
        prop_assert!(check.usable >= Decimal::ZERO);
        prop_assert!(check.usable <= balance.available_margin);
        prop_assert!(check.usable <= (equity * (Decimal::ONE - ratio) - committed).max(Decimal::ZERO));

        let qty = guard.size_position(check.usable, leverage, price, None);
        let tolerance = Decimal::new(1, 12);
        prop_assert!(qty * price <= check.usable * leverage + tolerance);
    }

    /// Risk-based size never risks more than the allowed fraction
    #[test]
    fn risk_bound_holds(
        usable in equity_strategy(),
        entry in price_strategy(),
        stop_offset in 1i64..100_000i64,
        risk_bps in 1i64..500i64,
    ) {
        let stop = entry - Decimal::new(stop_offset, 2);
        let risk = Decimal::new(risk_bps, 4);
        let guard = CapitalGuard::default();

        let qty = guard.size_by_risk(entry, stop, usable, risk);
        let tolerance = Decimal::new(1, 12);
        prop_assert!((entry - stop).abs() * qty <= usable * risk + tolerance);
    }
}
