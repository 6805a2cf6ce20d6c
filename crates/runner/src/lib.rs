//! Meridian Runner - Scheduling and Paper Trading
//!
//! Runs the quoting engine over every configured symbol:
//!
//! - **Scheduler**: one task per symbol per tick, intents owned per symbol
//! - **Audit**: JSON-lines file sink and an in-memory sink
//! - **Paper market**: seeded random walk driving the paper venue
//! - **Settings**: the runner's keys in the shared config document
//!
//! ## Architecture
//!
//! ```text
//!   ┌──────────────┐  set_book / push_candle  ┌──────────────┐
//!   │ PaperMarket  │─────────────────────────►│ PaperGateway │
//!   │ (random walk)│  match_resting           └──────▲───────┘
//!   └──────────────┘                                 │
//!                                             ┌──────┴───────┐
//!                                             │ CachedGateway│
//!                                             └──────▲───────┘
//!   ┌──────────────┐   JoinSet, one task      ┌──────┴───────┐
//!   │  Scheduler   │─────────────────────────►│QuotingEngine │──► AuditSink
//!   │ (intents)    │   per symbol per tick    └──────────────┘
//!   └──────────────┘
//! ```

pub mod audit;
pub mod paper;
pub mod scheduler;
pub mod settings;

// Re-export main types
pub use audit::{AuditError, JsonlAuditLog, MemoryAuditSink};
pub use paper::{PaperMarket, PaperMarketConfig, PaperSymbol};
pub use scheduler::{RoundSummary, Scheduler};
pub use settings::{RunnerError, RunnerResult, RunnerSettings};
