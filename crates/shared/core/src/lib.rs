//! Meridian Core Domain
//!
//! Pure domain types for the Meridian quoting engine.
//! This crate contains no async, no I/O, and is 100% unit testable.

pub mod entities;
pub mod instruments;
pub mod market;
pub mod values;

// Re-export commonly used types at crate root
pub use entities::{
    // Account
    AccountBalance,
    // Fees
    FeeSchedule,
    // Orders
    OpenOrder,
    OrderId,
    OrderInstruction,
    OrderKind,
    // Positions
    Position,
    PositionSide,
    Side,
};
pub use instruments::Instrument;
pub use market::{BookLevel, Candle, MarketSnapshot, Timeframe};
pub use values::{Price, Quantity, Symbol, Timestamp};
