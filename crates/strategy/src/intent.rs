//! Per-symbol engine state
//!
//! The engine owns one [`PositionIntent`] per symbol. It is created on the
//! first tick for the symbol, mutated by every tick and partially reset
//! whenever the venue reports the symbol flat after an exit. Learning
//! history, the loss streak and the micro-range window survive resets.

use chrono::Duration;
use meridian_core::{OrderId, PositionSide, Price, Quantity, Symbol, Timestamp};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::config::{EngineConfig, QuotingMode, SymbolProfile, seconds};
use crate::learning::{AdaptiveThresholds, LearnedThresholds};
use crate::micro::PriceWindow;

/// Mid-price samples kept per symbol
const PRICE_RETENTION_SECS: u64 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EntryStage {
    /// No exposure and no working entry
    Flat,
    /// Probe order(s) working, or a partial fill awaiting confirmation
    Probing,
    /// Confirmation order sent for the remainder
    Confirming,
    /// Filled to target (or no confirmation possible); managing the exit
    Full,
    /// Flat after an exit, waiting out the post-exit cooldown
    Cooldown,
}

impl std::fmt::Display for EntryStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EntryStage::Flat => "FLAT",
            EntryStage::Probing => "PROBING",
            EntryStage::Confirming => "CONFIRMING",
            EntryStage::Full => "FULL",
            EntryStage::Cooldown => "COOLDOWN",
        };
        f.write_str(name)
    }
}

/// How far the protective stop has been tightened
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum StopStage {
    Initial,
    Breakeven,
    Locked,
}

#[derive(Debug, Clone)]
pub struct PositionIntent {
    pub symbol: Symbol,
    pub stage: EntryStage,
    /// Mode resolved on the latest tick
    pub mode: QuotingMode,

    // Entry plan
    pub target_qty: Quantity,
    pub probe_qty: Quantity,
    pub confirm_qty: Quantity,
    pub confirmation_sent: bool,
    pub full_entry: bool,
    /// Spread fraction when the probe went out
    pub probe_spread: Decimal,
    /// Ids of every entry order this intent placed since the last reset
    pub entry_order_ids: Vec<OrderId>,
    /// Entry orders the last plan put out (one or two)
    pub entry_legs: usize,
    pub last_entry_at: Option<Timestamp>,

    // Held position, as last reconciled
    pub side: Option<PositionSide>,
    pub entry_price: Option<Price>,
    pub entry_fill_time: Option<Timestamp>,
    pub last_price: Option<Price>,

    // Protection
    pub stop_price: Option<Price>,
    pub stop_stage: StopStage,
    pub stop_attempts: u32,
    pub stop_retry_at: Option<Timestamp>,
    pub target_order_id: Option<OrderId>,

    // Exit bookkeeping
    /// Why the engine closed the position itself, if it did
    pub exit_reason: Option<String>,
    /// Price the engine closed at, if it did
    pub exit_price: Option<Price>,
    pub last_exit_at: Option<Timestamp>,
    pub consecutive_losses: u32,
    pub zero_loss_until: Option<Timestamp>,

    pub prices: PriceWindow,
    pub learning: AdaptiveThresholds,
}

impl PositionIntent {
    pub fn new(symbol: impl Into<Symbol>, base: LearnedThresholds) -> Self {
        Self {
            symbol: symbol.into(),
            stage: EntryStage::Flat,
            mode: QuotingMode::default(),
            target_qty: Decimal::ZERO,
            probe_qty: Decimal::ZERO,
            confirm_qty: Decimal::ZERO,
            confirmation_sent: false,
            full_entry: false,
            probe_spread: Decimal::ZERO,
            entry_order_ids: Vec::new(),
            entry_legs: 0,
            last_entry_at: None,
            side: None,
            entry_price: None,
            entry_fill_time: None,
            last_price: None,
            stop_price: None,
            stop_stage: StopStage::Initial,
            stop_attempts: 0,
            stop_retry_at: None,
            target_order_id: None,
            exit_reason: None,
            exit_price: None,
            last_exit_at: None,
            consecutive_losses: 0,
            zero_loss_until: None,
            prices: PriceWindow::new(seconds(PRICE_RETENTION_SECS)),
            learning: AdaptiveThresholds::new(base),
        }
    }

    pub fn thresholds(&self) -> &LearnedThresholds {
        self.learning.current()
    }

    /// Learned OBI threshold, floored by the profile and bumped by the loss streak
    pub fn entry_threshold(&self, config: &EngineConfig, profile: &SymbolProfile) -> Decimal {
        let mut threshold = self.thresholds().min_obi;
        if let Some(floor) = profile.min_obi {
            threshold = threshold.max(floor);
        }
        let bump = (Decimal::from(self.consecutive_losses) * config.thresholds.loss_streak_step)
            .min(config.thresholds.loss_streak_cap);
        threshold + bump
    }

    pub fn is_entry_order(&self, order_id: &str) -> bool {
        self.entry_order_ids.iter().any(|id| id == order_id)
    }

    pub fn forget_order(&mut self, order_id: &str) {
        self.entry_order_ids.retain(|id| id != order_id);
        if self.target_order_id.as_deref() == Some(order_id) {
            self.target_order_id = None;
        }
    }

    /// Plan a new entry: target, probe and the remainder left to confirm
    pub fn plan_entry(&mut self, target: Quantity, probe: Quantity, spread: Decimal, now: Timestamp) {
        self.target_qty = target;
        self.probe_qty = probe;
        self.confirm_qty = (target - probe).max(Decimal::ZERO);
        self.confirmation_sent = false;
        self.full_entry = false;
        self.probe_spread = spread;
        self.last_entry_at = Some(now);
        self.stage = EntryStage::Probing;
    }

    pub fn in_cooldown(&self, now: Timestamp, cooldown: Duration) -> bool {
        self.last_exit_at.is_some_and(|at| now - at < cooldown)
    }

    pub fn in_zero_loss_pause(&self, now: Timestamp) -> bool {
        self.zero_loss_until.is_some_and(|until| now < until)
    }

    /// Had a position since the last reset
    pub fn was_holding(&self) -> bool {
        self.side.is_some() && self.entry_price.is_some()
    }

    /// Update the loss streak after a closed trade
    pub fn record_streak(&mut self, win: bool, now: Timestamp, config: &EngineConfig) {
        if win {
            self.consecutive_losses = 0;
            return;
        }
        self.consecutive_losses += 1;
        if self.consecutive_losses >= config.cooldown.zero_loss_streak {
            self.zero_loss_until = Some(now + seconds(config.cooldown.zero_loss_pause_secs));
        }
    }

    /// Forget the closed trade; keep learning, streak and price history
    pub fn reset_after_exit(&mut self, now: Timestamp) {
        self.stage = EntryStage::Cooldown;
        self.target_qty = Decimal::ZERO;
        self.probe_qty = Decimal::ZERO;
        self.confirm_qty = Decimal::ZERO;
        self.confirmation_sent = false;
        self.full_entry = false;
        self.probe_spread = Decimal::ZERO;
        self.entry_order_ids.clear();
        self.entry_legs = 0;
        self.side = None;
        self.entry_price = None;
        self.entry_fill_time = None;
        self.stop_price = None;
        self.stop_stage = StopStage::Initial;
        self.stop_attempts = 0;
        self.stop_retry_at = None;
        self.target_order_id = None;
        self.exit_reason = None;
        self.exit_price = None;
        self.last_exit_at = Some(now);
    }

    /// A new fill changed the held side or average entry
    ///
    /// The fill time is the first fill of the side; adding to the position
    /// does not restart the stop dwell.
    pub fn reconcile_fill(&mut self, side: PositionSide, entry_price: Price, now: Timestamp) {
        if self.side != Some(side) {
            self.stop_price = None;
            self.stop_stage = StopStage::Initial;
            self.stop_attempts = 0;
            self.stop_retry_at = None;
            self.target_order_id = None;
            self.entry_fill_time = None;
        }
        self.side = Some(side);
        self.entry_price = Some(entry_price);
        if self.entry_fill_time.is_none() {
            self.entry_fill_time = Some(now);
        }
        if self.stage == EntryStage::Flat || self.stage == EntryStage::Cooldown {
            self.stage = EntryStage::Probing;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn intent() -> PositionIntent {
        PositionIntent::new("SOL_USDC_PERP", LearnedThresholds::base(&EngineConfig::default()))
    }

    #[test]
    fn test_plan_entry_splits_probe_and_confirm() {
        let mut intent = intent();
        intent.plan_entry(dec!(10), dec!(3.5), dec!(0.001), Utc::now());
        assert_eq!(intent.confirm_qty, dec!(6.5));
        assert_eq!(intent.stage, EntryStage::Probing);
        assert!(!intent.confirmation_sent);
    }

    #[test]
    fn test_added_fill_keeps_first_fill_time() {
        let mut intent = intent();
        let first = Utc::now();
        intent.reconcile_fill(PositionSide::Long, dec!(100), first);
        assert_eq!(intent.entry_fill_time, Some(first));
        assert_eq!(intent.stage, EntryStage::Probing);

        // Confirmation fill moves the average entry only
        let later = first + Duration::seconds(20);
        intent.reconcile_fill(PositionSide::Long, dec!(100.4), later);
        assert_eq!(intent.entry_price, Some(dec!(100.4)));
        assert_eq!(intent.entry_fill_time, Some(first));

        // A flip is a new position
        intent.stop_price = Some(dec!(98));
        intent.reconcile_fill(PositionSide::Short, dec!(101), later);
        assert_eq!(intent.entry_fill_time, Some(later));
        assert_eq!(intent.stop_price, None);
    }

    #[test]
    fn test_threshold_bumped_by_loss_streak() {
        let config = EngineConfig::default();
        let mut intent = intent();
        let profile = SymbolProfile::default();
        assert_eq!(intent.entry_threshold(&config, &profile), dec!(0.25));

        intent.consecutive_losses = 2;
        assert_eq!(intent.entry_threshold(&config, &profile), dec!(0.35));
        intent.consecutive_losses = 10;
        assert_eq!(intent.entry_threshold(&config, &profile), dec!(0.45));

        let strict = SymbolProfile {
            min_obi: Some(dec!(0.5)),
            ..Default::default()
        };
        intent.consecutive_losses = 0;
        assert_eq!(intent.entry_threshold(&config, &strict), dec!(0.5));
    }

    #[test]
    fn test_two_losses_pause_entries() {
        let config = EngineConfig::default();
        let mut intent = intent();
        let now = Utc::now();
        intent.record_streak(false, now, &config);
        assert!(!intent.in_zero_loss_pause(now));
        intent.record_streak(false, now, &config);
        assert!(intent.in_zero_loss_pause(now + Duration::seconds(4)));
        assert!(!intent.in_zero_loss_pause(now + Duration::seconds(5)));

        intent.record_streak(true, now, &config);
        assert_eq!(intent.consecutive_losses, 0);
    }

    #[test]
    fn test_reset_keeps_streak_and_learning() {
        let mut intent = intent();
        let now = Utc::now();
        intent.reconcile_fill(PositionSide::Long, dec!(100), now);
        intent.stop_price = Some(dec!(99));
        intent.entry_order_ids.push("paper-1".into());
        intent.consecutive_losses = 1;

        intent.reset_after_exit(now);
        assert_eq!(intent.stage, EntryStage::Cooldown);
        assert!(!intent.was_holding());
        assert!(intent.stop_price.is_none());
        assert!(intent.entry_order_ids.is_empty());
        assert_eq!(intent.consecutive_losses, 1);
        assert!(intent.in_cooldown(now + Duration::seconds(10), Duration::seconds(300)));
    }
}
