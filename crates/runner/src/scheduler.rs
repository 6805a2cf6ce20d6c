//! Per-symbol cooperative scheduler
//!
//! Every tick spawns one task per configured symbol on a `JoinSet`. Each
//! task takes ownership of its symbol's [`PositionIntent`], runs one engine
//! tick and hands the intent back, so no intent is ever shared between
//! tasks. A failed tick skips that symbol until the next round; a panicked
//! tick loses the intent, which is recreated fresh.

use meridian_core::Symbol;
use meridian_strategy::{PositionIntent, QuotingEngine, TickReport};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;

/// What one scheduling round did
#[derive(Debug, Default)]
pub struct RoundSummary {
    pub reports: Vec<TickReport>,
    /// Symbols whose tick returned an error
    pub skipped: Vec<Symbol>,
    /// Symbols whose tick panicked and were reset
    pub panicked: Vec<Symbol>,
}

impl RoundSummary {
    pub fn report(&self, symbol: &str) -> Option<&TickReport> {
        self.reports.iter().find(|r| r.symbol == symbol)
    }
}

pub struct Scheduler {
    engine: Arc<QuotingEngine>,
    intents: HashMap<Symbol, PositionIntent>,
    rounds: u64,
}

impl Scheduler {
    /// One fresh intent per configured symbol
    pub fn new(engine: Arc<QuotingEngine>) -> Self {
        let intents = engine
            .config()
            .symbols
            .iter()
            .map(|symbol| (symbol.clone(), engine.new_intent(symbol)))
            .collect();
        Self {
            engine,
            intents,
            rounds: 0,
        }
    }

    pub fn engine(&self) -> &Arc<QuotingEngine> {
        &self.engine
    }

    pub fn intent(&self, symbol: &str) -> Option<&PositionIntent> {
        self.intents.get(symbol)
    }

    pub fn rounds(&self) -> u64 {
        self.rounds
    }

    /// Tick every symbol once, concurrently, and wait for all of them
    pub async fn run_once(&mut self) -> RoundSummary {
        let mut tasks = JoinSet::new();
        let mut owners = HashMap::new();

        for (symbol, mut intent) in self.intents.drain() {
            let engine = self.engine.clone();
            let handle = tasks.spawn(async move {
                let result = engine.tick(&mut intent).await;
                (intent, result)
            });
            owners.insert(handle.id(), symbol);
        }

        let mut summary = RoundSummary::default();
        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((_, (intent, result))) => {
                    match result {
                        Ok(report) => {
                            log::debug!(
                                "[{}] {} {} obi={:.3} actions={}",
                                report.symbol,
                                report.mode,
                                report.stage,
                                report.obi,
                                report.actions.len()
                            );
                            summary.reports.push(report);
                        }
                        Err(e) => {
                            log::warn!("[{}] tick skipped: {}", intent.symbol, e);
                            summary.skipped.push(intent.symbol.clone());
                        }
                    }
                    self.intents.insert(intent.symbol.clone(), intent);
                }
                Err(e) => {
                    let Some(symbol) = owners.remove(&e.id()) else {
                        log::error!("[SCHED] unknown task failed: {}", e);
                        continue;
                    };
                    if e.is_panic() {
                        log::error!("[{}] tick panicked, state reset: {}", symbol, e);
                    } else {
                        log::error!("[{}] tick cancelled, state reset: {}", symbol, e);
                    }
                    self.intents
                        .insert(symbol.clone(), self.engine.new_intent(&symbol));
                    summary.panicked.push(symbol);
                }
            }
        }

        self.rounds += 1;
        summary
    }

    /// Tick on the configured interval until `shutdown` turns true
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Self {
        let config = self.engine.config();
        let period = std::time::Duration::from_millis(config.tick_interval_ms.max(1));
        if config.reset_orders_on_start {
            self.engine.reset_orders().await;
        }

        log::info!(
            "[SCHED] started: {} symbols every {}ms",
            self.intents.len(),
            period.as_millis()
        );
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let summary = self.run_once().await;
                    if !summary.skipped.is_empty() || !summary.panicked.is_empty() {
                        log::warn!(
                            "[SCHED] round {}: {} skipped, {} reset",
                            self.rounds,
                            summary.skipped.len(),
                            summary.panicked.len()
                        );
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        log::info!("[SCHED] stopped after {} rounds", self.rounds);
        self
    }
}
