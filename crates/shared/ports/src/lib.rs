//! Meridian Ports
//!
//! Port definitions (traits) for the Meridian quoting engine.
//! These define the boundaries between the decision core and the venue,
//! the wall clock and the audit trail.

mod audit;
mod clock;
mod error;
mod gateway;

pub use audit::{AuditEvent, AuditRecord, AuditSink, NullAuditSink, TradeOutcome};
pub use clock::Clock;
pub use error::{GatewayError, GatewayResult};
pub use gateway::ExchangeGateway;
