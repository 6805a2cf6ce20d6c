//! Adaptive threshold learning
//!
//! A bounded win/loss history per symbol. Every few closed trades (or after
//! a quiet period) the win rate nudges the entry threshold, the dollar
//! target, the dollar risk and the minimum entry interval. Nudges compound
//! from the current values and stay inside the configured bounds.

use chrono::Duration;
use log::info;
use meridian_core::Timestamp;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use std::collections::VecDeque;

use crate::config::{EngineConfig, LearningConfig};

/// The values learning is allowed to move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LearnedThresholds {
    pub min_obi: Decimal,
    pub profit_usd: Decimal,
    pub risk_usd: Decimal,
    pub min_entry_interval_secs: Decimal,
}

impl LearnedThresholds {
    /// Configured starting point, clamped into the learning bounds
    pub fn base(config: &EngineConfig) -> Self {
        let bounds = &config.learning;
        Self {
            min_obi: config.thresholds.obi,
            profit_usd: config
                .exit
                .profit_usd
                .clamp(bounds.min_profit_usd, bounds.max_profit_usd),
            risk_usd: config
                .exit
                .risk_usd
                .clamp(bounds.min_risk_usd, bounds.max_risk_usd),
            min_entry_interval_secs: Decimal::from(config.entry.min_entry_interval_secs),
        }
    }

    pub fn min_entry_interval(&self) -> Duration {
        let millis = (self.min_entry_interval_secs * Decimal::ONE_THOUSAND)
            .to_i64()
            .unwrap_or(i64::MAX);
        Duration::milliseconds(millis)
    }
}

#[derive(Debug, Clone)]
pub struct AdaptiveThresholds {
    results: VecDeque<bool>,
    trades_since_learn: u32,
    last_learn: Option<Timestamp>,
    current: LearnedThresholds,
}

impl AdaptiveThresholds {
    pub fn new(base: LearnedThresholds) -> Self {
        Self {
            results: VecDeque::new(),
            trades_since_learn: 0,
            last_learn: None,
            current: base,
        }
    }

    pub fn current(&self) -> &LearnedThresholds {
        &self.current
    }

    pub fn results(&self) -> impl Iterator<Item = bool> + '_ {
        self.results.iter().copied()
    }

    pub fn win_rate(&self) -> Option<Decimal> {
        if self.results.is_empty() {
            return None;
        }
        let wins = self.results.iter().filter(|w| **w).count();
        Some(Decimal::from(wins) / Decimal::from(self.results.len()))
    }

    /// Append a closed trade; recompute when a batch is due
    ///
    /// Returns true when the thresholds were recomputed.
    pub fn record(
        &mut self,
        symbol: &str,
        win: bool,
        now: Timestamp,
        config: &LearningConfig,
        base: &LearnedThresholds,
    ) -> bool {
        self.results.push_back(win);
        while self.results.len() > config.window.max(1) {
            self.results.pop_front();
        }
        if !config.enabled {
            return false;
        }
        self.trades_since_learn += 1;
        let batch_due = self.trades_since_learn >= config.batch_trades;
        let quiet_due = self.last_learn.is_none_or(|at| {
            now - at >= Duration::seconds(i64::try_from(config.batch_secs).unwrap_or(i64::MAX))
        });
        if !(batch_due || quiet_due) {
            return false;
        }
        self.recompute(config, base);
        self.trades_since_learn = 0;
        self.last_learn = Some(now);
        info!(
            "[{}] learned: obi {} profit ${} risk ${} interval {}s ({} results)",
            symbol,
            self.current.min_obi,
            self.current.profit_usd,
            self.current.risk_usd,
            self.current.min_entry_interval_secs.round_dp(1),
            self.results.len()
        );
        true
    }

    /// Nudge the current values from the win rate of the history
    pub fn recompute(&mut self, config: &LearningConfig, base: &LearnedThresholds) {
        let Some(win_rate) = self
            .win_rate()
            .filter(|_| self.results.len() >= config.min_results)
        else {
            self.current = *base;
            return;
        };

        let min_interval = Decimal::from(config.min_interval_secs);
        let max_interval = Decimal::from(config.max_interval_secs);
        let next = &mut self.current;

        if win_rate < config.low_win_rate {
            next.min_obi = (next.min_obi + config.obi_raise).min(config.max_obi);
            next.profit_usd = (next.profit_usd + config.profit_step_usd)
                .clamp(config.min_profit_usd, config.max_profit_usd);
            next.risk_usd = (next.risk_usd * config.risk_shrink)
                .clamp(config.min_risk_usd, config.max_risk_usd);
            next.min_entry_interval_secs =
                (next.min_entry_interval_secs * config.interval_grow).clamp(min_interval, max_interval);
        } else if win_rate > config.high_win_rate {
            next.min_obi = (next.min_obi - config.obi_relax).max(config.min_obi);
            next.risk_usd = base.risk_usd;
            next.min_entry_interval_secs = (next.min_entry_interval_secs * config.interval_shrink)
                .clamp(min_interval, max_interval);
        }
    }
}
