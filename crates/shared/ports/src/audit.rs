use meridian_core::{PositionSide, Price, Quantity, Symbol, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Result of a closed trade as inferred from prices at exit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeOutcome {
    Win,
    Loss,
}

impl TradeOutcome {
    pub fn is_win(&self) -> bool {
        matches!(self, TradeOutcome::Win)
    }
}

/// What happened
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    /// Probe posted, with the signal that justified it
    Entry {
        mode: String,
        price: Price,
        quantity: Quantity,
        obi: Decimal,
        spread: Decimal,
        absorption: Decimal,
        safe_stop: Decimal,
    },
    /// Position observed flat
    Exit {
        outcome: TradeOutcome,
        reason: String,
        entry_price: Price,
        exit_price: Price,
    },
}

/// One append-only audit line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: Timestamp,
    pub symbol: Symbol,
    pub side: PositionSide,
    #[serde(flatten)]
    pub event: AuditEvent,
}

/// Port for the post-hoc audit trail; written, never read back
pub trait AuditSink: Send + Sync {
    /// Best-effort append; implementations log their own failures
    fn record(&self, record: AuditRecord);
}

/// Discards every record
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAuditSink;

impl AuditSink for NullAuditSink {
    fn record(&self, _record: AuditRecord) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    #[test]
    fn test_record_serializes_flat() {
        let record = AuditRecord {
            timestamp: Utc::now(),
            symbol: "ETH_USDC_PERP".into(),
            side: PositionSide::Short,
            event: AuditEvent::Exit {
                outcome: TradeOutcome::Loss,
                reason: "stop".into(),
                entry_price: dec!(3000),
                exit_price: dec!(3030),
            },
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["event"], "exit");
        assert_eq!(json["outcome"], "Loss");
        assert_eq!(json["symbol"], "ETH_USDC_PERP");
    }
}
