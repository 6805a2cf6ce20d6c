//! Entry path
//!
//! Flat symbols detect a finished exit, wait out cooldowns and pauses, then
//! evaluate the mode's entry rules and post a probe. Held symbols that have
//! not reached their target get exactly one confirmation order for the
//! remainder.

use log::{debug, info, warn};
use meridian_core::{
    Instrument, OpenOrder, OrderInstruction, Position, PositionSide, Quantity, Symbol, Timeframe,
};
use meridian_ports::AuditEvent;
use rust_decimal::Decimal;

use crate::config::{QuotingMode, seconds};
use crate::engine::{EngineResult, QuotingEngine, Tick, TickAction, TickReport};
use crate::exit::stop_distance;
use crate::guard::reversed_against;
use crate::intent::{EntryStage, PositionIntent};
use crate::pricing::{Placement, entry_price, maker_clamp};

/// How the checklist reads the imbalance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowCheck {
    /// OBI must favour the side by the threshold
    Directional,
    /// Two-sided quoting: |OBI| must clear the threshold, either sign
    Symmetric,
    /// Overwhelming flow: OBI and a sane spread are enough
    Sniper,
}

/// Remainder to confirm, bounded so probe + confirm never exceeds target
///
/// `resting` is the unfilled quantity of our own entry orders on the same
/// side; the result is rounded down to the quantity step.
pub fn confirmation_qty(
    instrument: &Instrument,
    target: Quantity,
    planned: Quantity,
    held: Quantity,
    resting: Quantity,
) -> Quantity {
    let room = (target - held - resting).max(Decimal::ZERO);
    instrument.round_quantity_down(planned.min(room).max(Decimal::ZERO))
}

impl QuotingEngine {
    pub(crate) async fn manage_flat(
        &self,
        intent: &mut PositionIntent,
        positions: &[Position],
        orders: Vec<OpenOrder>,
        tick: &Tick,
        report: &mut TickReport,
    ) -> EngineResult<()> {
        if intent.was_holding() {
            self.finish_exit(intent, &orders, tick, report).await;
            return Ok(());
        }

        // A stop with nothing to protect
        let (orphans, orders): (Vec<OpenOrder>, Vec<OpenOrder>) =
            orders.into_iter().partition(|o| o.is_stop());
        if !orphans.is_empty() {
            warn!("[{}] cancelling {} orphaned stops", tick.symbol, orphans.len());
            self.cancel_orders(intent, &orphans, report).await;
        }

        if intent.in_cooldown(tick.now, self.config.post_exit_cooldown()) {
            intent.stage = EntryStage::Cooldown;
            report.idle("cooldown");
            return Ok(());
        }
        if intent.stage == EntryStage::Cooldown {
            info!("[{}] cooldown over", tick.symbol);
        }
        intent.stage = EntryStage::Flat;

        if !self.config.profile(&tick.symbol).enabled {
            report.idle("disabled");
            return Ok(());
        }

        let mut forced = self.config.direction.forced();
        if intent.mode == QuotingMode::Compound {
            if positions.iter().any(|p| !p.is_flat()) {
                self.cancel_orders(intent, &orders, report).await;
                report.idle("global lock");
                return Ok(());
            }
            let Some((chosen, side)) = self.select_compound_asset().await else {
                self.cancel_orders(intent, &orders, report).await;
                report.idle("no compound candidate");
                return Ok(());
            };
            if chosen != tick.symbol {
                self.cancel_orders(intent, &orders, report).await;
                report.idle("not selected");
                return Ok(());
            }
            if !self.trend.regime_ok(&tick.symbol, side).await {
                info!("[{}] regime check failed for {}", tick.symbol, side);
                report.idle("regime");
                return Ok(());
            }
            forced = Some(side);
        }

        if intent.in_zero_loss_pause(tick.now) {
            report.idle("zero-loss pause");
            return Ok(());
        }
        if self.config.entry.eco_mode
            && intent
                .last_entry_at
                .is_some_and(|at| tick.now - at < intent.thresholds().min_entry_interval())
        {
            report.idle("entry interval");
            return Ok(());
        }

        let working: Vec<OpenOrder> = orders.into_iter().filter(|o| o.is_resting_limit()).collect();
        if !working.is_empty() {
            if working.len() >= intent.entry_legs.max(1) {
                intent.stage = EntryStage::Probing;
                report.idle("entry working");
                return Ok(());
            }
            // A leg went missing; requote from scratch
            self.cancel_orders(intent, &working, report).await;
        }
        intent.entry_order_ids.clear();
        intent.entry_legs = 0;

        self.place_entry(intent, forced, tick, report).await
    }

    /// Highest-scoring symbol for compound mode, with its side
    async fn select_compound_asset(&self) -> Option<(Symbol, PositionSide)> {
        let mut best: Option<(Symbol, PositionSide, Decimal)> = None;
        for symbol in &self.config.symbols {
            if !self.config.profile(symbol).enabled {
                continue;
            }
            let book = match self.gateway.get_depth(symbol).await {
                Ok(book) => book,
                Err(e) => {
                    debug!("[{}] compound scan skipped: {}", symbol, e);
                    continue;
                }
            };
            let obi = self.signals.calculate_obi(&book);
            if obi.abs() < self.config.thresholds.obi {
                continue;
            }
            let side = if obi > Decimal::ZERO {
                PositionSide::Long
            } else {
                PositionSide::Short
            };
            let mut score = obi.abs();
            score *= if self.trend.local_bias(symbol).await.supports(side) {
                Decimal::new(15, 1)
            } else {
                Decimal::new(5, 1)
            };
            if self.atr(symbol).await.is_some() {
                score *= Decimal::new(11, 1);
            }
            debug!("[{}] compound score {}", symbol, score.round_dp(3));
            if best.as_ref().is_none_or(|(_, _, top)| score > *top) {
                best = Some((symbol.clone(), side, score));
            }
        }
        best.map(|(symbol, side, _)| (symbol, side))
    }

    async fn atr(&self, symbol: &str) -> Option<Decimal> {
        self.volatility
            .atr_fraction(
                symbol,
                self.config.volatility.timeframe,
                self.config.volatility.period,
            )
            .await
    }

    /// Trend alignment, aligned flow, enough movement and sane volatility
    async fn compound_consensus(
        &self,
        intent: &PositionIntent,
        side: PositionSide,
        atr: Option<Decimal>,
        tick: &Tick,
    ) -> bool {
        let trend = &self.config.trend;
        let aligned = self.trend.alignment(&tick.symbol, side).await;
        let flow = tick.obi_for(side);
        let range = intent
            .prices
            .range(tick.now, seconds(self.config.entry.micro_range_secs));
        let calm = atr.is_none_or(|atr| atr <= trend.consensus_max_atr);

        let agreed = aligned >= trend.consensus_min_aligned
            && flow > trend.consensus_obi
            && range >= trend.consensus_min_range
            && calm;
        if !agreed {
            info!(
                "[{}] no consensus for {}: aligned {}/3 obi {} range {} atr {:?}",
                tick.symbol,
                side,
                aligned,
                flow.round_dp(3),
                range.round_dp(5),
                atr.map(|a| a.round_dp(5))
            );
        }
        agreed
    }

    /// The entry checklist for one side
    fn checklist(
        &self,
        intent: &PositionIntent,
        side: PositionSide,
        threshold: Decimal,
        atr: Option<Decimal>,
        flow: FlowCheck,
        tick: &Tick,
    ) -> bool {
        if !tick.book.is_two_sided() {
            return false;
        }
        let entry = &self.config.entry;
        let range = intent.prices.range(tick.now, seconds(entry.micro_range_secs));
        let reading = self.signals.read(&tick.book, side, range, atr);

        let obi_ok = match flow {
            FlowCheck::Directional | FlowCheck::Sniper => reading.obi_for(side) >= threshold,
            FlowCheck::Symmetric => reading.obi.abs() >= threshold,
        };
        let pulse_ok = !tick.pulse.opposes(side);
        if flow == FlowCheck::Sniper {
            let spread_ok = reading.spread <= entry.sniper_max_spread;
            if !spread_ok {
                info!(
                    "[{}] sniper aborted: spread {} > {}",
                    tick.symbol,
                    reading.spread.round_dp(5),
                    entry.sniper_max_spread
                );
            }
            return obi_ok && pulse_ok && spread_ok;
        }

        let absorption_ok = self.signals.absorption_confirmed(&reading);
        let stop_ok = reading.safe_stop >= reading.spread * entry.min_stop_spreads;
        let reversion_ok = range >= reading.safe_stop * entry.reversion_ratio;
        let pace = intent.prices.range(tick.now, seconds(entry.short_range_secs));
        let pace_ok = pace >= reading.safe_stop * entry.short_reversion_ratio;

        let passed = obi_ok && absorption_ok && stop_ok && reversion_ok && pace_ok && pulse_ok;
        if !passed {
            info!(
                "[{}] checklist failed ({}): obi {} absorption {} stop {} reversion {} pace {} pulse {}",
                tick.symbol, side, obi_ok, absorption_ok, stop_ok, reversion_ok, pace_ok, pulse_ok
            );
        }
        passed
    }

    /// Margin one leg may commit
    fn margin_budget(&self, symbol: &str, mode: QuotingMode, usable: Decimal, legs: usize) -> Decimal {
        let budget = if mode == QuotingMode::Compound || self.config.sizing.use_all_available {
            usable * self.config.sizing.all_in_fraction
        } else {
            self.config.margin_for(symbol).min(usable)
        };
        if legs > 1 {
            budget.min(usable / Decimal::from(legs))
        } else {
            budget
        }
    }

    /// Largest size whose initial stop loses at most `max_risk_per_trade` of usable
    ///
    /// Sized against the volatility stop, before any dollar-risk tightening,
    /// so the real stop is never further away than the one assumed here.
    fn risk_capped(
        &self,
        intent: &PositionIntent,
        side: PositionSide,
        mid: Decimal,
        usable: Decimal,
        atr: Option<Decimal>,
        tick: &Tick,
    ) -> Quantity {
        let range = intent
            .prices
            .range(tick.now, seconds(self.config.entry.micro_range_secs));
        let safe_stop = self.signals.safe_stop_zone(&tick.book, side, range, atr);
        let distance = stop_distance(
            &self.config.exit,
            intent.mode,
            tick.obi_for(side),
            atr,
            Decimal::ZERO,
            Decimal::ZERO,
            safe_stop,
        );
        let stop = mid * (Decimal::ONE - side.sign() * distance);
        self.capital
            .size_by_risk(mid, stop, usable, self.config.capital.max_risk_per_trade)
    }

    async fn last_close(&self, symbol: &str) -> Option<Decimal> {
        match self.gateway.get_candles(symbol, Timeframe::M1, 1).await {
            Ok(candles) => candles.last().map(|c| c.close),
            Err(e) => {
                debug!("[{}] last close unavailable: {}", symbol, e);
                None
            }
        }
    }

    async fn place_entry(
        &self,
        intent: &mut PositionIntent,
        forced: Option<PositionSide>,
        tick: &Tick,
        report: &mut TickReport,
    ) -> EngineResult<()> {
        if !tick.book.is_two_sided() {
            report.idle("one-sided book");
            return Ok(());
        }
        let profile = self.config.profile(&tick.symbol);
        let threshold = intent.entry_threshold(&self.config, &profile);
        if tick.obi.abs() < threshold {
            report.idle("flow below threshold");
            return Ok(());
        }
        let flow_side = if tick.obi > Decimal::ZERO {
            PositionSide::Long
        } else {
            PositionSide::Short
        };
        let allowed = |side: PositionSide| {
            !tick.pulse.opposes(side) && forced.is_none_or(|f| f == side)
        };

        let capital = self.capital.check_capital_safety(self.gateway.as_ref()).await;
        if !capital.safe {
            report.idle("capital");
            return Ok(());
        }
        let instrument = self.gateway.get_instrument(&tick.symbol).await?;
        let atr = self.atr(&tick.symbol).await;
        let spread = self.signals.spread_fraction(&tick.book);
        let entry = &self.config.entry;
        let gap = spread > entry.gap_fill_spread;

        // (side, placement, skew, probe fraction)
        let mut legs: Vec<(PositionSide, Placement, Decimal, Decimal)> = Vec::new();
        match intent.mode {
            QuotingMode::Compound => {
                let side = flow_side;
                if !allowed(side) || tick.obi_for(side) < -self.config.thresholds.compound_flip_abort {
                    report.idle("direction blocked");
                    return Ok(());
                }
                if !self.compound_consensus(intent, side, atr, tick).await {
                    report.idle("no consensus");
                    return Ok(());
                }
                let placement = if gap { Placement::GapFill } else { Placement::Lead };
                legs.push((side, placement, Decimal::ZERO, entry.compound_probe_fraction));
            }
            QuotingMode::Surf => {
                let side = flow_side;
                if !allowed(side) {
                    report.idle("direction blocked");
                    return Ok(());
                }
                let sniper = tick.obi_for(side) >= self.config.thresholds.sniper;
                if !(tick.pulse.supports(side) || sniper) {
                    info!("[{}] waiting for trend to agree with {}", tick.symbol, side);
                    report.idle("waiting for trend");
                    return Ok(());
                }
                let check = if sniper { FlowCheck::Sniper } else { FlowCheck::Directional };
                if !self.checklist(intent, side, threshold, atr, check, tick) {
                    report.idle("checklist");
                    return Ok(());
                }
                let placement = if gap {
                    Placement::GapFill
                } else if sniper {
                    Placement::Lead
                } else {
                    Placement::Join
                };
                legs.push((side, placement, Decimal::ZERO, entry.probe_fraction));
            }
            QuotingMode::Straddle => {
                let strong = (threshold * Decimal::TWO).max(self.config.thresholds.strong_flow_floor);
                let skew_width = tick.book.spread().unwrap_or(Decimal::ZERO) * entry.straddle_skew_spreads;
                let placement = if gap { Placement::GapFill } else { Placement::Join };
                let (candidates, check) = if tick.obi.abs() >= strong {
                    (vec![flow_side], FlowCheck::Directional)
                } else {
                    (vec![PositionSide::Long, PositionSide::Short], FlowCheck::Symmetric)
                };
                for side in candidates {
                    // Skip legs the guard would cancel on the next tick
                    if !allowed(side)
                        || reversed_against(side.entry_side(), tick.obi, tick.pulse, &self.config.thresholds)
                        || !self.checklist(intent, side, threshold, atr, check, tick)
                    {
                        continue;
                    }
                    let skew = if tick.obi.abs() > entry.skew_obi && side != flow_side {
                        skew_width
                    } else {
                        Decimal::ZERO
                    };
                    legs.push((side, placement, skew, entry.probe_fraction));
                }
                if legs.is_empty() {
                    report.idle("checklist");
                    return Ok(());
                }
            }
        }

        let Some(mid) = tick.book.mid_price() else {
            report.idle("one-sided book");
            return Ok(());
        };
        let budget = self.margin_budget(&tick.symbol, intent.mode, capital.usable, legs.len());
        let leverage = self.config.leverage_for(&tick.symbol);
        // Both straddle legs plan the same target, sized for the thinner side
        let target = legs
            .iter()
            .map(|(side, ..)| {
                let raw = self.capital.size_position(
                    budget,
                    leverage,
                    mid,
                    Some((&tick.book, side.entry_side())),
                );
                let risked = self.risk_capped(intent, *side, mid, capital.usable, atr, tick);
                instrument.round_quantity_down(raw.min(risked))
            })
            .min()
            .unwrap_or(Decimal::ZERO);
        if target <= Decimal::ZERO {
            report.idle("size below step");
            return Ok(());
        }

        let last_close = if gap { self.last_close(&tick.symbol).await } else { None };
        let leg_count = legs.len();
        let mut placed = 0;
        for (side, placement, skew, fraction) in legs {
            let plan = ProbePlan {
                side,
                placement,
                skew,
                fraction,
                target,
                last_close,
                atr,
            };
            if self.place_probe(intent, &instrument, plan, tick, report).await {
                placed += 1;
            }
        }
        if placed > 0 {
            intent.entry_legs = leg_count;
        }
        Ok(())
    }

    async fn place_probe(
        &self,
        intent: &mut PositionIntent,
        instrument: &Instrument,
        plan: ProbePlan,
        tick: &Tick,
        report: &mut TickReport,
    ) -> bool {
        let side = plan.side;
        let target = plan.target;
        let probe = instrument
            .round_quantity_down(target * plan.fraction)
            .max(instrument.step_size)
            .min(target);
        let Some(price) = entry_price(
            &tick.book,
            instrument,
            side,
            plan.placement,
            plan.last_close,
            plan.skew,
        ) else {
            return false;
        };

        let order = OrderInstruction::post_only_limit(&tick.symbol, side.entry_side(), probe, price);
        match self.gateway.place_order(&order).await {
            Ok(order_id) => {
                let range = intent
                    .prices
                    .range(tick.now, seconds(self.config.entry.micro_range_secs));
                let reading = self.signals.read(&tick.book, side, range, plan.atr);
                info!(
                    "[{}] {} probe {} {} @ {} (target {}, obi {})",
                    tick.symbol,
                    intent.mode,
                    side,
                    probe,
                    price,
                    target,
                    tick.obi.round_dp(3)
                );
                intent.plan_entry(target, probe, reading.spread, tick.now);
                intent.entry_order_ids.push(order_id.clone());
                self.record_audit(
                    &tick.symbol,
                    side,
                    AuditEvent::Entry {
                        mode: intent.mode.to_string(),
                        price,
                        quantity: probe,
                        obi: reading.obi,
                        spread: reading.spread,
                        absorption: reading.absorption,
                        safe_stop: reading.safe_stop,
                    },
                );
                report.push(TickAction::Probe {
                    order_id,
                    side,
                    price,
                    quantity: probe,
                });
                true
            }
            Err(e) => {
                warn!("[{}] probe rejected: {}", tick.symbol, e);
                false
            }
        }
    }

    /// PROBING → CONFIRMING → FULL
    pub(crate) async fn maybe_confirm(
        &self,
        intent: &mut PositionIntent,
        position: &Position,
        instrument: &Instrument,
        orders: &[OpenOrder],
        tick: &Tick,
        report: &mut TickReport,
    ) {
        if intent.full_entry {
            return;
        }
        let Some(side) = position.side() else {
            return;
        };
        let held = position.quantity();
        if intent.target_qty <= Decimal::ZERO
            || held >= intent.target_qty * self.config.entry.full_fill_ratio
        {
            intent.full_entry = true;
            intent.stage = EntryStage::Full;
            info!("[{}] full entry {} {}", tick.symbol, side, held);
            report.push(TickAction::Full);
            return;
        }
        if intent.confirmation_sent {
            intent.stage = EntryStage::Confirming;
            return;
        }
        intent.stage = EntryStage::Probing;

        let profile = self.config.profile(&tick.symbol);
        let threshold = intent.entry_threshold(&self.config, &profile);
        let reading = self.signals.read(&tick.book, side, Decimal::ZERO, None);
        let spread_ok = intent.probe_spread <= Decimal::ZERO
            || reading.spread <= intent.probe_spread * self.config.entry.spread_widening_tolerance;
        if reading.obi_for(side) < threshold
            || tick.pulse.opposes(side)
            || !self.signals.absorption_confirmed(&reading)
            || !spread_ok
        {
            debug!("[{}] confirmation held back", tick.symbol);
            return;
        }

        let resting: Decimal = orders
            .iter()
            .filter(|o| {
                o.is_resting_limit() && o.side == side.entry_side() && intent.is_entry_order(&o.id)
            })
            .map(|o| o.quantity)
            .sum();
        let planned = confirmation_qty(instrument, intent.target_qty, intent.confirm_qty, held, resting);
        let Some(mid) = tick.book.mid_price() else {
            return;
        };
        // Capital may have gone elsewhere since the probe was sized
        let capital = self.capital.check_capital_safety(self.gateway.as_ref()).await;
        if !capital.safe {
            info!(
                "[{}] confirmation deferred: {}",
                tick.symbol,
                capital.reason.as_deref().unwrap_or("capital unsafe")
            );
            return;
        }
        let affordable = instrument.round_quantity_down(self.capital.size_position(
            capital.usable,
            self.config.leverage_for(&tick.symbol),
            mid,
            Some((&tick.book, side.entry_side())),
        ));
        let quantity = planned.min(affordable);
        // One attempt per probe, whatever happens next
        intent.confirmation_sent = true;
        if quantity <= Decimal::ZERO {
            return;
        }
        let Some(touch) = tick.book.best_price(side.entry_side()) else {
            return;
        };
        let price = maker_clamp(&tick.book, instrument, side.entry_side(), touch);
        let order = OrderInstruction::post_only_limit(&tick.symbol, side.entry_side(), quantity, price);
        match self.gateway.place_order(&order).await {
            Ok(order_id) => {
                info!(
                    "[{}] confirmation {} {} @ {} (held {}, target {})",
                    tick.symbol, side, quantity, price, held, intent.target_qty
                );
                intent.entry_order_ids.push(order_id.clone());
                intent.stage = EntryStage::Confirming;
                report.push(TickAction::Confirmation {
                    order_id,
                    price,
                    quantity,
                });
            }
            Err(e) => warn!("[{}] confirmation rejected: {}", tick.symbol, e),
        }
    }
}

/// One leg of an entry
struct ProbePlan {
    side: PositionSide,
    placement: Placement,
    skew: Decimal,
    fraction: Decimal,
    target: Quantity,
    last_close: Option<Decimal>,
    atr: Option<Decimal>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn sol() -> Instrument {
        Instrument::new("SOL_USDC_PERP", dec!(0.01), dec!(0.1))
    }

    #[test]
    fn test_confirmation_fills_the_remainder() {
        let qty = confirmation_qty(&sol(), dec!(10), dec!(6.5), dec!(3.5), Decimal::ZERO);
        assert_eq!(qty, dec!(6.5));
    }

    #[test]
    fn test_confirmation_subtracts_resting_probe() {
        // Probe partly filled, rest of it still resting
        let qty = confirmation_qty(&sol(), dec!(10), dec!(6.5), dec!(1), dec!(2.5));
        assert_eq!(qty, dec!(6.5));
        let qty = confirmation_qty(&sol(), dec!(10), dec!(6.5), dec!(4.27), dec!(0));
        assert_eq!(qty, dec!(5.7));
    }

    #[test]
    fn test_confirmation_never_negative() {
        let qty = confirmation_qty(&sol(), dec!(10), dec!(6.5), dec!(9), dec!(3));
        assert_eq!(qty, Decimal::ZERO);
    }

    proptest! {
        /// Probe plus confirmation never plans past the target
        #[test]
        fn probe_and_confirm_stay_within_target(
            target_steps in 1i64..5_000,
            fraction_pct in 1i64..=100,
            held_pct in 0i64..=100,
            resting_pct in 0i64..=100,
        ) {
            let inst = sol();
            let target = Decimal::new(target_steps, 1);
            let probe = inst
                .round_quantity_down(target * Decimal::new(fraction_pct, 2))
                .max(inst.step_size)
                .min(target);
            let held = inst.round_quantity_down(probe * Decimal::new(held_pct, 2));
            let resting = inst.round_quantity_down((probe - held) * Decimal::new(resting_pct, 2));

            let confirm = confirmation_qty(&inst, target, target - probe, held, resting);
            prop_assert!(confirm >= Decimal::ZERO);
            prop_assert!(held + resting + confirm <= target);
            prop_assert!(probe + confirm <= target);
        }
    }
}
