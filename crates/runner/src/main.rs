//! Paper-trading binary
//!
//! `meridian-paper [config.json]` runs the quoting engine against the
//! in-memory venue until Ctrl-C. `RUST_LOG` controls verbosity.

use meridian_clock::SystemClock;
use meridian_gateway::{CachedGateway, PaperGateway};
use meridian_ports::{AuditSink, Clock, ExchangeGateway};
use meridian_runner::{JsonlAuditLog, PaperMarket, RunnerResult, RunnerSettings, Scheduler};
use meridian_strategy::QuotingEngine;
use std::sync::Arc;
use tokio::sync::watch;

#[tokio::main(flavor = "current_thread")]
async fn main() -> RunnerResult<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let (config, settings) = match std::env::args().nth(1) {
        Some(path) => {
            log::info!("Loading config from {}", path);
            RunnerSettings::from_file(path)?
        }
        None => {
            log::info!("No config given, using defaults");
            RunnerSettings::defaults()
        }
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let paper = Arc::new(PaperGateway::new(
        clock.clone(),
        config.fees,
        settings.paper.leverage,
    ));
    let mut market = PaperMarket::new(settings.paper.clone());
    market.seed(&paper, clock.now()).await;

    let gateway: Arc<dyn ExchangeGateway> =
        Arc::new(CachedGateway::new(paper.clone(), config.cache, clock.clone()));
    let audit: Arc<dyn AuditSink> = Arc::new(JsonlAuditLog::open(settings.audit_path())?);
    log::info!(
        "Audit log: {}, mode: {}, symbols: {:?}",
        settings.audit_path().display(),
        config.mode,
        config.symbols
    );

    let engine = Arc::new(QuotingEngine::new(config, gateway, clock.clone(), audit));
    let scheduler = Scheduler::new(engine);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let market_handle = tokio::spawn(market.run(paper.clone(), clock, shutdown_rx.clone()));
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
        log::info!("Ctrl-C received, shutting down");
        let _ = shutdown_tx.send(true);
    });

    let scheduler = scheduler.run(shutdown_rx).await;
    if let Err(e) = market_handle.await {
        log::error!("Paper market task failed: {}", e);
    }

    for symbol in &scheduler.engine().config().symbols {
        match paper.position(symbol).await {
            Some(position) => log::info!(
                "[{}] open at exit: {} @ {}",
                symbol,
                position.net_quantity,
                position.entry_price
            ),
            None => log::info!("[{}] flat at exit", symbol),
        }
    }
    Ok(())
}
