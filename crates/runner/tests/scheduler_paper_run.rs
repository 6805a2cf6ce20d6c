//! Integration test: Scheduler over the paper venue
//!
//! Tests:
//! 1. One round ticks every symbol and isolates a failing one
//! 2. The run loop resets orders, keeps ticking and stops on shutdown
//! 3. A seeded paper market driven through many rounds

use chrono::Duration;
use meridian_clock::ManualClock;
use meridian_core::{Instrument, OrderInstruction, PositionSide, Side};
use meridian_gateway::{CacheTtls, CachedGateway, PaperGateway};
use meridian_ports::{AuditEvent, Clock, ExchangeGateway};
use meridian_runner::{MemoryAuditSink, PaperMarket, PaperMarketConfig, Scheduler};
use meridian_strategy::{EngineConfig, QuotingEngine, QuotingMode, TickAction};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tokio::sync::watch;

const SOL: &str = "SOL_USDC_PERP";
const ETH: &str = "ETH_USDC_PERP";

struct Setup {
    clock: Arc<ManualClock>,
    gateway: Arc<PaperGateway>,
    audit: Arc<MemoryAuditSink>,
    scheduler: Scheduler,
}

async fn setup(configure: impl FnOnce(&mut EngineConfig)) -> Setup {
    let _ = env_logger::try_init();

    let mut config = EngineConfig {
        symbols: vec![SOL.to_string(), ETH.to_string()],
        mode: QuotingMode::Surf,
        ..Default::default()
    };
    configure(&mut config);

    let clock = ManualClock::starting_now();
    let gateway = Arc::new(PaperGateway::new(clock.clone(), config.fees, dec!(10)));
    gateway
        .add_instrument(Instrument::new(SOL, dec!(0.01), dec!(0.1)))
        .await;
    gateway.set_cash(dec!(10000)).await;

    let audit = Arc::new(MemoryAuditSink::new());
    let engine = Arc::new(QuotingEngine::new(
        config,
        gateway.clone(),
        clock.clone(),
        audit.clone(),
    ));
    Setup {
        clock,
        gateway,
        audit,
        scheduler: Scheduler::new(engine),
    }
}

/// 1000 bid vs 100 ask on SOL: OBI ~0.818
async fn buying_book(gateway: &PaperGateway) {
    let level = |best: Decimal, step: Decimal, size: Decimal| {
        (0..10)
            .map(|i| (best + step * Decimal::from(i), size))
            .collect::<Vec<_>>()
    };
    gateway
        .set_book(
            SOL,
            level(dec!(100.00), dec!(-0.01), dec!(100)),
            level(dec!(100.01), dec!(0.01), dec!(10)),
        )
        .await;
}

#[tokio::test]
async fn test_round_ticks_all_symbols_and_isolates_failures() {
    let mut s = setup(|_| {}).await;
    buying_book(&s.gateway).await;

    // ETH has no book: its tick fails, SOL's still runs
    let summary = s.scheduler.run_once().await;
    assert_eq!(summary.skipped, vec![ETH.to_string()]);
    assert!(summary.panicked.is_empty());
    assert_eq!(summary.reports.len(), 1);

    let report = summary.report(SOL).unwrap();
    assert_eq!(report.probes().count(), 1);
    assert!(report.probes().all(|p| matches!(
        p,
        TickAction::Probe {
            side: PositionSide::Long,
            ..
        }
    )));

    // Both intents survive the round
    let sol = s.scheduler.intent(SOL).unwrap();
    assert_eq!(sol.entry_order_ids.len(), 1);
    assert!(s.scheduler.intent(ETH).is_some());
    assert_eq!(s.scheduler.rounds(), 1);

    let records = s.audit.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].symbol, SOL);
    assert!(matches!(records[0].event, AuditEvent::Entry { .. }));

    // Next round: the probe is still working
    s.clock.advance(Duration::seconds(1));
    let summary = s.scheduler.run_once().await;
    let report = summary.report(SOL).unwrap();
    assert!(report.actions.contains(&TickAction::Idle("entry working")));
    assert_eq!(s.gateway.placed_orders().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_run_resets_orders_and_stops_on_shutdown() {
    let s = setup(|c| {
        c.reset_orders_on_start = true;
        c.tick_interval_ms = 1_000;
    })
    .await;
    buying_book(&s.gateway).await;
    let stray = s
        .gateway
        .place_order(&OrderInstruction::post_only_limit(SOL, Side::Buy, dec!(1), dec!(99)))
        .await
        .unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(s.scheduler.run(shutdown_rx));

    tokio::time::sleep(std::time::Duration::from_millis(3_500)).await;
    shutdown_tx.send(true).unwrap();
    let scheduler = handle.await.unwrap();

    assert!(scheduler.rounds() >= 3);
    assert!(s.gateway.cancelled_orders().await.contains(&stray));
    // The stray order is gone and the engine's probe is the only one resting
    let resting = s.gateway.resting_orders(SOL).await;
    assert_eq!(resting.len(), 1);
    assert_ne!(resting[0].id, stray);
}

#[tokio::test]
async fn test_seeded_paper_market_rounds() {
    let _ = env_logger::try_init();
    let config = EngineConfig {
        symbols: vec![SOL.to_string(), ETH.to_string()],
        ..Default::default()
    };
    let paper_config = PaperMarketConfig {
        history_bars: 90,
        ..Default::default()
    }
    .with_symbols(&config.symbols);

    let clock = ManualClock::starting_now();
    let paper = Arc::new(PaperGateway::new(clock.clone(), config.fees, dec!(10)));
    let mut market = PaperMarket::with_seed(paper_config, 2024);
    market.seed(&paper, clock.now()).await;

    let gateway = Arc::new(CachedGateway::new(
        paper.clone(),
        CacheTtls::default(),
        clock.clone(),
    ));
    let audit = Arc::new(MemoryAuditSink::new());
    let engine = Arc::new(QuotingEngine::new(config, gateway, clock.clone(), audit));
    let mut scheduler = Scheduler::new(engine);

    for _ in 0..40 {
        clock.advance(Duration::seconds(1));
        market.step(&paper, clock.now()).await;
        let summary = scheduler.run_once().await;
        assert!(summary.panicked.is_empty());
        assert_eq!(summary.reports.len() + summary.skipped.len(), 2);

        let balance = paper.get_account_balance().await.unwrap();
        assert!(balance.available_margin >= Decimal::ZERO);
    }
    assert_eq!(scheduler.rounds(), 40);

    // Whatever the engine placed was maker-only or protective
    for order in paper.placed_orders().await {
        assert!(order.post_only || order.reduce_only, "unexpected order {:?}", order);
    }
}
