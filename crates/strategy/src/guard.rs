//! Reversal guard
//!
//! Runs first on every tick. Resting entry orders whose flow has turned
//! against them are cancelled; a held position deep against the flow is
//! closed at market unless the configuration reserves closing for the
//! protective stop.

use log::warn;
use meridian_core::{OpenOrder, Position, PositionSide, Side};
use rust_decimal::Decimal;

use crate::config::ThresholdConfig;
use crate::engine::{QuotingEngine, Tick, TickAction, TickReport};
use crate::intent::PositionIntent;
use crate::trend::TrendBias;

/// An entry order on `side` no longer has the flow (or the pulse) behind it
pub fn reversed_against(side: Side, obi: Decimal, pulse: TrendBias, thresholds: &ThresholdConfig) -> bool {
    let exposure = PositionSide::from_entry_side(side);
    obi * exposure.sign() < -thresholds.reversal_cancel || pulse.opposes(exposure)
}

/// Resting limits that build exposure: any limit while flat, same-side limits while holding
fn is_entry_order(order: &OpenOrder, held: Option<PositionSide>) -> bool {
    order.is_resting_limit() && held.is_none_or(|side| order.side == side.entry_side())
}

impl QuotingEngine {
    /// Returns the orders still resting after the guard
    pub(crate) async fn guard(
        &self,
        intent: &mut PositionIntent,
        position: Option<&Position>,
        orders: Vec<OpenOrder>,
        tick: &Tick,
        report: &mut TickReport,
    ) -> Vec<OpenOrder> {
        let held = position.and_then(|p| p.side());
        let thresholds = &self.config.thresholds;
        let mut remaining = Vec::with_capacity(orders.len());

        for order in orders {
            if is_entry_order(&order, held)
                && reversed_against(order.side, tick.obi, tick.pulse, thresholds)
            {
                warn!(
                    "[{}] guard: cancelling {} entry {} (obi {}, pulse {})",
                    tick.symbol,
                    order.side.as_str(),
                    order.id,
                    tick.obi.round_dp(3),
                    tick.pulse
                );
                if self.cancel(&tick.symbol, &order.id).await {
                    intent.forget_order(&order.id);
                    report.push(TickAction::GuardCancel { order_id: order.id });
                    continue;
                }
            }
            remaining.push(order);
        }

        if let (Some(position), Some(side)) = (position, held)
            && self.config.closes_on_reversal()
            && tick.obi_for(side) < -thresholds.panic_close
        {
            warn!(
                "[{}] guard: flow {} against {}, closing",
                tick.symbol,
                tick.obi.round_dp(3),
                side
            );
            if self
                .close_position(intent, position, tick, "reversal guard", report)
                .await
            {
                return Vec::new();
            }
        }
        remaining
    }
}
