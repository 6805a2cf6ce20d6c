//! Exit management
//!
//! While a position is held: cancel stale straddle legs, confirm the entry,
//! then protect and exit it. Protection is a venue-side stop-market order
//! that only ever tightens (initial → breakeven-plus-fees → locked gain); the
//! profit target is a resting reduce-only maker order; a return past the
//! smart-exit threshold closes at market without waiting for the target.
//!
//! When the venue reports the symbol flat again, the outcome is inferred,
//! audited and fed to learning, and the intent is reset into cooldown.

use chrono::Duration;
use log::{error, info, warn};
use meridian_core::{
    FeeSchedule, Instrument, OpenOrder, OrderInstruction, Position, PositionSide, Price,
};
use meridian_ports::{AuditEvent, TradeOutcome};
use rust_decimal::Decimal;

use crate::config::{ExitConfig, QuotingMode, StopPolicy};
use crate::engine::{EngineResult, QuotingEngine, Tick, TickAction, TickReport};
use crate::intent::{PositionIntent, StopStage};
use crate::pricing::{round_stop, target_price};

/// Round-trip fees plus a noise buffer; no target may sit below this
pub fn fee_floor(exit: &ExitConfig, fees: &FeeSchedule, atr: Option<Decimal>) -> Decimal {
    let buffer = atr
        .map(|a| a * exit.fee_buffer_atr_multiple)
        .unwrap_or(Decimal::ZERO)
        .max(exit.fee_buffer_floor);
    fees.round_trip() + buffer
}

/// Profit target as a fraction of entry
///
/// The larger of the dollar target, the fee floor and `target_atr_multiple`
/// ATRs. A loss streak shrinks it, never below the fee floor.
pub fn target_fraction(
    exit: &ExitConfig,
    fees: &FeeSchedule,
    atr: Option<Decimal>,
    profit_usd: Decimal,
    notional: Decimal,
    consecutive_losses: u32,
) -> Decimal {
    let floor = fee_floor(exit, fees, atr);
    let mut target = exit.min_target;
    if notional > Decimal::ZERO {
        target = target.max(profit_usd / notional);
    }
    if let Some(atr) = atr {
        target = target.max(atr * exit.target_atr_multiple);
    }
    target = target.max(floor);
    if consecutive_losses > 0 {
        target = (target * exit.loss_streak_target_shrink).max(floor);
    }
    target
}

/// Initial stop distance as a fraction of entry
///
/// `obi_for_side` is the imbalance signed in the position's favour.
pub fn stop_distance(
    exit: &ExitConfig,
    mode: QuotingMode,
    obi_for_side: Decimal,
    atr: Option<Decimal>,
    risk_usd: Decimal,
    notional: Decimal,
    safe_stop: Decimal,
) -> Decimal {
    if mode == QuotingMode::Compound {
        return match atr {
            Some(atr) => (atr * exit.compound_stop_atr_multiple).max(exit.compound_stop_floor),
            None => exit.compound_stop_without_atr,
        };
    }

    let volatility_stop = match atr {
        Some(atr) => (atr * exit.stop_atr_multiple)
            .max(exit.stop_floor)
            .min(exit.stop_cap),
        None => exit.stop_without_atr,
    };
    let mut distance = if notional > Decimal::ZERO && risk_usd > Decimal::ZERO {
        (risk_usd / notional).min(volatility_stop)
    } else {
        volatility_stop
    };

    if obi_for_side > exit.strong_flow_obi {
        distance = (distance * exit.strong_flow_tighten).max(exit.strong_flow_stop_floor);
        if safe_stop > distance && safe_stop < exit.safe_stop_widen_cap {
            distance = safe_stop;
        }
    }
    distance
}

/// Return that must be cleared before the stop moves off its initial level
pub fn first_wave_zone(exit: &ExitConfig, atr: Option<Decimal>) -> Decimal {
    match atr {
        Some(atr) => (atr * exit.first_wave_atr_multiple).max(exit.first_wave_floor),
        None => exit.first_wave_without_atr,
    }
}

/// The more protective of two stop prices
pub fn tighter(side: PositionSide, a: Price, b: Price) -> Price {
    match side {
        PositionSide::Long => a.max(b),
        PositionSide::Short => a.min(b),
    }
}

/// `proposed` if it tightens `current`, else `None`
pub fn tighten(side: PositionSide, current: Option<Price>, proposed: Price) -> Option<Price> {
    match current {
        None => Some(proposed),
        Some(current) => {
            let better = match side {
                PositionSide::Long => proposed > current,
                PositionSide::Short => proposed < current,
            };
            better.then_some(proposed)
        }
    }
}

/// Where the ladder wants the stop for the current return
pub fn stop_ladder(
    exit: &ExitConfig,
    fees: &FeeSchedule,
    side: PositionSide,
    entry: Price,
    current_return: Decimal,
    distance: Decimal,
    atr: Option<Decimal>,
) -> (StopStage, Price) {
    let sign = side.sign();
    let breakeven = entry * (Decimal::ONE + sign * fees.round_trip());
    if current_return >= exit.lock_trigger {
        let lock = entry * (Decimal::ONE + sign * current_return * exit.lock_fraction);
        (StopStage::Locked, tighter(side, lock, breakeven))
    } else if current_return >= first_wave_zone(exit, atr) {
        (StopStage::Breakeven, breakeven)
    } else {
        (StopStage::Initial, entry * (Decimal::ONE - sign * distance))
    }
}

/// Return at which the position is closed at market
pub fn smart_exit_threshold(exit: &ExitConfig, fees: &FeeSchedule, mode: QuotingMode) -> Decimal {
    let target = match mode {
        QuotingMode::Surf => exit.smart_exit_surf,
        QuotingMode::Straddle | QuotingMode::Compound => exit.smart_exit_scalp,
    };
    (target + exit.smart_exit_buffer).max(fees.taker_fee * Decimal::TWO + exit.smart_exit_fee_margin)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitInference {
    pub outcome: TradeOutcome,
    pub exit_price: Price,
    /// Price went through the last known stop
    pub stopped: bool,
}

/// Judge a position that disappeared between ticks
///
/// Through the stop, the stop price is taken as the exit; otherwise the
/// current price is. Breaking even counts as a win.
pub fn infer_outcome(
    side: PositionSide,
    entry: Price,
    stop: Option<Price>,
    price: Price,
) -> ExitInference {
    let stopped = stop.is_some_and(|stop| match side {
        PositionSide::Long => price <= stop,
        PositionSide::Short => price >= stop,
    });
    let exit_price = match stop {
        Some(stop) if stopped => stop,
        _ => price,
    };
    let outcome = if (exit_price - entry) * side.sign() >= Decimal::ZERO {
        TradeOutcome::Win
    } else {
        TradeOutcome::Loss
    };
    ExitInference {
        outcome,
        exit_price,
        stopped,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopOutcome {
    Armed,
    Waiting,
    Failed,
    Closed,
}

impl QuotingEngine {
    pub(crate) async fn manage_position(
        &self,
        intent: &mut PositionIntent,
        position: &Position,
        orders: Vec<OpenOrder>,
        tick: &Tick,
        report: &mut TickReport,
    ) -> EngineResult<()> {
        let Some(side) = position.side() else {
            return Ok(());
        };
        let instrument = self.gateway.get_instrument(&tick.symbol).await?;

        // Unfilled legs on the far side of a fresh straddle fill
        let mut live = Vec::with_capacity(orders.len());
        for order in orders {
            if order.is_resting_limit()
                && order.side == side.exit_side()
                && intent.is_entry_order(&order.id)
            {
                info!("[{}] cancelling unfilled {} leg {}", tick.symbol, order.side.as_str(), order.id);
                if self.cancel(&tick.symbol, &order.id).await {
                    intent.forget_order(&order.id);
                    report.push(TickAction::StaleLegCancel { order_id: order.id });
                    continue;
                }
            }
            live.push(order);
        }

        self.maybe_confirm(intent, position, &instrument, &live, tick, report)
            .await;

        let atr = self
            .volatility
            .atr_fraction(
                &tick.symbol,
                self.config.volatility.timeframe,
                self.config.volatility.period,
            )
            .await;
        self.manage_exit(intent, position, &instrument, &live, atr, tick, report)
            .await;
        Ok(())
    }

    /// A stop may be armed once the dwell passed or the flow turned
    fn stop_unlocked(&self, intent: &PositionIntent, side: PositionSide, tick: &Tick) -> bool {
        let dwell = self.config.stop_dwell(&tick.symbol);
        intent.entry_fill_time.is_none_or(|at| tick.now - at >= dwell)
            || tick.obi_for(side) < -self.config.stop.unlock_obi
            || tick.pulse.opposes(side)
    }

    #[allow(clippy::too_many_arguments)]
    async fn manage_exit(
        &self,
        intent: &mut PositionIntent,
        position: &Position,
        instrument: &Instrument,
        orders: &[OpenOrder],
        atr: Option<Decimal>,
        tick: &Tick,
        report: &mut TickReport,
    ) {
        let Some(side) = position.side() else {
            return;
        };
        let exit = &self.config.exit;
        let fees = &self.config.fees;
        let entry = position.entry_price;
        let price = tick.book.mid_price().unwrap_or(position.mark_price);
        let current_return = position.return_fraction(price);

        let smart = smart_exit_threshold(exit, fees, intent.mode);
        if current_return >= smart {
            info!(
                "[{}] smart exit: return {} >= {}",
                tick.symbol,
                current_return.round_dp(5),
                smart.round_dp(5)
            );
            self.close_position(intent, position, tick, "smart exit", report)
                .await;
            return;
        }

        // Protective stop
        let learned = *intent.thresholds();
        let notional = position.quantity() * entry;
        let range = intent
            .prices
            .range(tick.now, crate::config::seconds(self.config.entry.micro_range_secs));
        let safe_stop = self.signals.safe_stop_zone(&tick.book, side, range, atr);
        let distance = stop_distance(
            exit,
            intent.mode,
            tick.obi_for(side),
            atr,
            learned.risk_usd,
            notional,
            safe_stop,
        );
        let (stage, desired) = stop_ladder(exit, fees, side, entry, current_return, distance, atr);
        let desired = round_stop(instrument, side, desired);
        let flow_exhausted = tick.obi_for(side) < exit.flow_exhausted_obi;
        let unlocked = self.stop_unlocked(intent, side, tick) || flow_exhausted || stage > StopStage::Initial;

        let stops: Vec<&OpenOrder> = orders
            .iter()
            .filter(|o| o.is_stop() && o.side == side.exit_side())
            .collect();
        let outcome = if stops.is_empty() {
            if self.config.stop.policy == StopPolicy::Mandatory || unlocked {
                // A vanished stop is re-armed no looser than before
                let trigger = match intent.stop_price {
                    Some(previous) => tighter(side, previous, desired),
                    None => desired,
                };
                let stage = stage.max(intent.stop_stage);
                self.arm_stop(intent, position, trigger, stage, true, tick, report)
                    .await
            } else {
                StopOutcome::Waiting
            }
        } else {
            let current = intent.stop_price.or_else(|| {
                stops
                    .iter()
                    .filter_map(|o| o.trigger_price)
                    .reduce(|a, b| tighter(side, a, b))
            });
            let covered: Decimal = stops.iter().map(|o| o.quantity).sum();
            let proposed = if stage > StopStage::Initial && unlocked {
                tighten(side, current, desired)
            } else {
                None
            };
            let undersized = covered < position.quantity();
            match (proposed, current) {
                (Some(trigger), _) => {
                    self.replace_stop(
                        intent, position, &stops, trigger, stage, undersized, tick, report,
                    )
                    .await
                }
                (None, Some(trigger)) if undersized => {
                    let stage = intent.stop_stage;
                    self.replace_stop(intent, position, &stops, trigger, stage, true, tick, report)
                        .await
                }
                _ => StopOutcome::Armed,
            }
        };

        match outcome {
            StopOutcome::Closed => {}
            StopOutcome::Failed => {
                warn!("[{}] stop not in place, holding off the target", tick.symbol);
            }
            StopOutcome::Armed | StopOutcome::Waiting => {
                self.ensure_target(intent, position, instrument, orders, atr, tick, report)
                    .await;
            }
        }
    }

    /// Place the new stop first, then cancel the ones it supersedes
    ///
    /// `undersized` old stops leave part of the position unprotected, so the
    /// new one is armed as if none were resting.
    #[allow(clippy::too_many_arguments)]
    async fn replace_stop(
        &self,
        intent: &mut PositionIntent,
        position: &Position,
        old: &[&OpenOrder],
        trigger: Price,
        stage: StopStage,
        undersized: bool,
        tick: &Tick,
        report: &mut TickReport,
    ) -> StopOutcome {
        let outcome = self
            .arm_stop(intent, position, trigger, stage, undersized, tick, report)
            .await;
        if outcome == StopOutcome::Armed {
            for order in old {
                if self.cancel(&tick.symbol, &order.id).await {
                    report.push(TickAction::Cancel {
                        order_id: order.id.clone(),
                    });
                }
            }
        }
        // A full-size old stop still protects the position if the new one failed
        match outcome {
            StopOutcome::Failed if !undersized => StopOutcome::Armed,
            other => other,
        }
    }

    /// One placement attempt per tick, with backoff between attempts
    ///
    /// `fresh` is set when no resting stop covers the whole position: a
    /// trigger already through the touch then closes at market, and
    /// exhausting the attempts under the mandatory policy force-closes the
    /// position.
    #[allow(clippy::too_many_arguments)]
    async fn arm_stop(
        &self,
        intent: &mut PositionIntent,
        position: &Position,
        trigger: Price,
        stage: StopStage,
        fresh: bool,
        tick: &Tick,
        report: &mut TickReport,
    ) -> StopOutcome {
        let Some(side) = position.side() else {
            return StopOutcome::Waiting;
        };
        let stop = &self.config.stop;

        let breached = tick.exit_touch(side).is_some_and(|touch| match side {
            PositionSide::Long => touch <= trigger,
            PositionSide::Short => touch >= trigger,
        });
        if breached {
            if !fresh {
                return StopOutcome::Waiting;
            }
            warn!("[{}] stop {} already breached", tick.symbol, trigger);
            return if self
                .close_position(intent, position, tick, "stop breached", report)
                .await
            {
                StopOutcome::Closed
            } else {
                StopOutcome::Failed
            };
        }

        if intent.stop_retry_at.is_some_and(|at| tick.now < at) {
            // Still backing off after a failed placement
            return StopOutcome::Failed;
        }
        let max_attempts = stop.max_attempts.max(1);
        if intent.stop_attempts >= max_attempts {
            // Exhausted backoff has elapsed: a new round of attempts
            intent.stop_attempts = 0;
        }

        let order = OrderInstruction::stop_market(
            &tick.symbol,
            side.exit_side(),
            position.quantity(),
            trigger,
        );
        match self.gateway.place_order(&order).await {
            Ok(order_id) => {
                info!(
                    "[{}] stop armed {} @ {} ({:?})",
                    tick.symbol,
                    position.quantity(),
                    trigger,
                    stage
                );
                intent.stop_attempts = 0;
                intent.stop_retry_at = None;
                intent.stop_price = Some(trigger);
                intent.stop_stage = stage;
                report.push(TickAction::StopArmed {
                    order_id,
                    trigger,
                    stage,
                });
                StopOutcome::Armed
            }
            Err(e) => {
                intent.stop_attempts += 1;
                let attempt = intent.stop_attempts;
                report.push(TickAction::StopFailed { attempt });
                let backoff = Duration::milliseconds(
                    i64::try_from(stop.backoff_ms).unwrap_or(i64::MAX),
                );
                if attempt < max_attempts {
                    warn!(
                        "[{}] stop placement failed ({}/{}): {}",
                        tick.symbol, attempt, max_attempts, e
                    );
                    intent.stop_retry_at = Some(tick.now + backoff);
                    return StopOutcome::Failed;
                }
                intent.stop_retry_at =
                    Some(tick.now + backoff * i32::try_from(stop.exhausted_backoff_multiple).unwrap_or(i32::MAX));
                if fresh && stop.policy == StopPolicy::Mandatory {
                    error!(
                        "[{}] stop placement failed {} times, forcing close: {}",
                        tick.symbol, attempt, e
                    );
                    if self
                        .close_position(intent, position, tick, "stop placement failed", report)
                        .await
                    {
                        return StopOutcome::Closed;
                    }
                } else {
                    error!(
                        "[{}] running without an updated stop after {} attempts: {}",
                        tick.symbol, attempt, e
                    );
                }
                StopOutcome::Failed
            }
        }
    }

    /// Keep one reduce-only maker target covering the whole position
    #[allow(clippy::too_many_arguments)]
    async fn ensure_target(
        &self,
        intent: &mut PositionIntent,
        position: &Position,
        instrument: &Instrument,
        orders: &[OpenOrder],
        atr: Option<Decimal>,
        tick: &Tick,
        report: &mut TickReport,
    ) {
        let Some(side) = position.side() else {
            return;
        };
        let targets: Vec<&OpenOrder> = orders
            .iter()
            .filter(|o| {
                o.is_resting_limit() && o.side == side.exit_side() && !intent.is_entry_order(&o.id)
            })
            .collect();
        let covered: Decimal = targets.iter().map(|o| o.quantity).sum();
        if !targets.is_empty() && covered >= position.quantity() {
            return;
        }

        let notional = position.quantity() * position.entry_price;
        let fraction = target_fraction(
            &self.config.exit,
            &self.config.fees,
            atr,
            intent.thresholds().profit_usd,
            notional,
            intent.consecutive_losses,
        );
        let Some(price) = target_price(&tick.book, instrument, side, position.entry_price, fraction)
        else {
            return;
        };
        let order = OrderInstruction::post_only_limit(
            &tick.symbol,
            side.exit_side(),
            position.quantity(),
            price,
        )
        .reduce_only();
        match self.gateway.place_order(&order).await {
            Ok(order_id) => {
                info!(
                    "[{}] target {} @ {} ({}%)",
                    tick.symbol,
                    position.quantity(),
                    price,
                    (fraction * Decimal::ONE_HUNDRED).round_dp(3)
                );
                intent.target_order_id = Some(order_id.clone());
                report.push(TickAction::TargetPlaced { order_id, price });
                for order in targets {
                    if self.cancel(&tick.symbol, &order.id).await {
                        report.push(TickAction::Cancel {
                            order_id: order.id.clone(),
                        });
                    }
                }
            }
            Err(e) => warn!("[{}] target rejected: {}", tick.symbol, e),
        }
    }

    /// The venue reports the symbol flat after we held it
    pub(crate) async fn finish_exit(
        &self,
        intent: &mut PositionIntent,
        orders: &[OpenOrder],
        tick: &Tick,
        report: &mut TickReport,
    ) {
        let (Some(side), Some(entry)) = (intent.side, intent.entry_price) else {
            return;
        };
        let engine_closed = intent.exit_price.is_some();
        let price = intent
            .exit_price
            .or_else(|| tick.book.mid_price())
            .or(intent.last_price)
            .unwrap_or(entry);
        let stop = if engine_closed { None } else { intent.stop_price };
        let inference = infer_outcome(side, entry, stop, price);
        let reason = intent.exit_reason.clone().unwrap_or_else(|| {
            if inference.stopped { "stop" } else { "target" }.to_string()
        });
        let win = inference.outcome.is_win();

        info!(
            "[{}] exit detected: {} {} entry {} exit {} ({})",
            tick.symbol,
            side,
            if win { "WIN" } else { "LOSS" },
            entry,
            inference.exit_price,
            reason
        );
        self.record_audit(
            &tick.symbol,
            side,
            AuditEvent::Exit {
                outcome: inference.outcome,
                reason,
                entry_price: entry,
                exit_price: inference.exit_price,
            },
        );

        intent.record_streak(win, tick.now, &self.config);
        intent
            .learning
            .record(&tick.symbol, win, tick.now, &self.config.learning, &self.base);

        // Leftover stop and target of the closed position
        self.cancel_orders(intent, orders, report).await;
        intent.reset_after_exit(tick.now);
        report.push(TickAction::ExitDetected {
            outcome: inference.outcome,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn fees() -> FeeSchedule {
        FeeSchedule::new(dec!(0.0002), dec!(0.0005))
    }

    #[test]
    fn test_target_clears_fees_and_buffer() {
        let exit = ExitConfig::default();
        let fees = FeeSchedule::new(dec!(0.0003), dec!(0.0008));
        // Dollar target negligible on a large notional
        let target = target_fraction(&exit, &fees, None, dec!(5), dec!(1000000), 0);
        assert!(target > dec!(0.0011));
        assert_eq!(target, dec!(0.0016));

        let target = target_fraction(&exit, &fees, Some(dec!(0.004)), dec!(5), dec!(1000000), 0);
        assert_eq!(target, dec!(0.0048));
    }

    #[test]
    fn test_loss_streak_shrinks_target_to_floor() {
        let exit = ExitConfig::default();
        let fees = fees();
        let normal = target_fraction(&exit, &fees, None, dec!(5), dec!(1000), 0);
        assert_eq!(normal, dec!(0.005));
        let shrunk = target_fraction(&exit, &fees, None, dec!(5), dec!(1000), 2);
        assert_eq!(shrunk, dec!(0.00475));

        let floor = fee_floor(&exit, &fees, None);
        let at_floor = target_fraction(&exit, &fees, None, dec!(0.01), dec!(1000), 3);
        assert_eq!(at_floor, floor);
    }

    #[test]
    fn test_stop_distance() {
        let exit = ExitConfig::default();
        // $2 on $1000 is tighter than any volatility stop
        let d = stop_distance(&exit, QuotingMode::Straddle, dec!(0.3), Some(dec!(0.002)), dec!(2), dec!(1000), dec!(0.003));
        assert_eq!(d, dec!(0.002));
        // Without a risk budget the volatility stop applies
        let d = stop_distance(&exit, QuotingMode::Straddle, dec!(0.3), Some(dec!(0.002)), Decimal::ZERO, dec!(1000), dec!(0.003));
        assert_eq!(d, dec!(0.015));
        let d = stop_distance(&exit, QuotingMode::Straddle, dec!(0.3), Some(dec!(0.05)), dec!(1000), dec!(1000), dec!(0.003));
        assert_eq!(d, dec!(0.06));
        let d = stop_distance(&exit, QuotingMode::Straddle, dec!(0.3), None, dec!(1000), dec!(1000), dec!(0.003));
        assert_eq!(d, dec!(0.04));
    }

    #[test]
    fn test_strong_flow_and_compound_stops() {
        let exit = ExitConfig::default();
        let d = stop_distance(&exit, QuotingMode::Surf, dec!(0.6), None, dec!(1000), dec!(1000), dec!(0.003));
        assert_eq!(d, dec!(0.032));
        // Safe-stop zone wider than the tightened stop but under the cap
        let d = stop_distance(&exit, QuotingMode::Surf, dec!(0.6), None, dec!(1000), dec!(1000), dec!(0.045));
        assert_eq!(d, dec!(0.045));

        let d = stop_distance(&exit, QuotingMode::Compound, dec!(0.9), Some(dec!(0.001)), dec!(2), dec!(1000), dec!(0.003));
        assert_eq!(d, dec!(0.02));
        let d = stop_distance(&exit, QuotingMode::Compound, dec!(0.9), None, dec!(2), dec!(1000), dec!(0.003));
        assert_eq!(d, dec!(0.025));
    }

    #[test]
    fn test_stop_ladder_stages() {
        let exit = ExitConfig::default();
        let fees = fees();
        let long = PositionSide::Long;

        let (stage, stop) = stop_ladder(&exit, &fees, long, dec!(100), dec!(0.001), dec!(0.01), None);
        assert_eq!((stage, stop), (StopStage::Initial, dec!(99)));

        let (stage, stop) = stop_ladder(&exit, &fees, long, dec!(100), dec!(0.005), dec!(0.01), None);
        assert_eq!((stage, stop), (StopStage::Breakeven, dec!(100.07)));

        let (stage, stop) = stop_ladder(&exit, &fees, long, dec!(100), dec!(0.02), dec!(0.01), None);
        assert_eq!((stage, stop), (StopStage::Locked, dec!(101)));

        let (stage, stop) =
            stop_ladder(&exit, &fees, PositionSide::Short, dec!(100), dec!(0.005), dec!(0.01), None);
        assert_eq!((stage, stop), (StopStage::Breakeven, dec!(99.93)));
    }

    #[test]
    fn test_tighten_never_loosens() {
        assert_eq!(tighten(PositionSide::Long, Some(dec!(99)), dec!(98)), None);
        assert_eq!(tighten(PositionSide::Long, Some(dec!(99)), dec!(99.5)), Some(dec!(99.5)));
        assert_eq!(tighten(PositionSide::Short, Some(dec!(101)), dec!(102)), None);
        assert_eq!(tighten(PositionSide::Short, None, dec!(102)), Some(dec!(102)));
    }

    #[test]
    fn test_smart_exit_threshold() {
        let exit = ExitConfig::default();
        let fees = fees();
        assert_eq!(smart_exit_threshold(&exit, &fees, QuotingMode::Surf), dec!(0.009));
        assert_eq!(smart_exit_threshold(&exit, &fees, QuotingMode::Straddle), dec!(0.0025));

        let expensive = FeeSchedule::new(dec!(0.001), dec!(0.002));
        assert_eq!(smart_exit_threshold(&exit, &expensive, QuotingMode::Compound), dec!(0.0045));
    }

    #[test]
    fn test_infer_outcome() {
        let long = PositionSide::Long;
        let stopped = infer_outcome(long, dec!(100), Some(dec!(99)), dec!(98.5));
        assert_eq!(stopped.outcome, TradeOutcome::Loss);
        assert_eq!(stopped.exit_price, dec!(99));
        assert!(stopped.stopped);

        // Breakeven-plus stop hit is still a win
        let locked = infer_outcome(long, dec!(100), Some(dec!(100.07)), dec!(100.05));
        assert_eq!(locked.outcome, TradeOutcome::Win);

        let target = infer_outcome(PositionSide::Short, dec!(100), Some(dec!(102)), dec!(99.5));
        assert_eq!(target.outcome, TradeOutcome::Win);
        assert!(!target.stopped);

        let drift = infer_outcome(long, dec!(100), None, dec!(99.9));
        assert_eq!(drift.outcome, TradeOutcome::Loss);
    }
}
