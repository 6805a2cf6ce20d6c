//! Meridian Quoting Engine
//!
//! Decides, once per tick and per symbol, which maker orders to rest on a
//! perpetual-futures venue:
//! - Order-book signals (imbalance, spread, absorption, safe-stop zone)
//! - ATR volatility with a TTL cache
//! - Multi-timeframe trend bias and the market pulse
//! - The per-symbol entry/exit state machine with adaptive thresholds
//!
//! ## Architecture
//!
//! ```text
//!                     ┌───────────────┐
//!   CachedGateway ───►│ QuotingEngine │◄─── EngineConfig
//!   (ExchangeGateway) └──────┬────────┘
//!                            │ tick(&mut PositionIntent)
//!          ┌─────────────────┼──────────────────┐
//!          ▼                 ▼                  ▼
//!     guard (cancel     manage_position     manage_flat
//!     / panic close)    (confirm, stop,     (exit detection,
//!                        target, smart)      cooldowns, entry)
//!                            │
//!                            ▼
//!                       AuditSink / TickReport
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use meridian_strategy::{EngineConfig, QuotingEngine};
//!
//! let engine = QuotingEngine::new(config, gateway, clock, audit);
//! let mut intent = engine.new_intent("SOL_USDC_PERP");
//! let report = engine.tick(&mut intent).await?;
//! ```

pub mod config;
pub mod engine;
pub mod entry;
pub mod exit;
pub mod guard;
pub mod intent;
pub mod learning;
pub mod micro;
pub mod pricing;
pub mod signal;
pub mod trend;
pub mod volatility;

// Re-export main types
pub use config::{ConfigError, Direction, EngineConfig, QuotingMode, StopPolicy, SymbolProfile};
pub use engine::{EngineError, EngineResult, QuotingEngine, TickAction, TickReport};
pub use intent::{EntryStage, PositionIntent, StopStage};
pub use learning::{AdaptiveThresholds, LearnedThresholds};
pub use signal::{SignalCalculator, SignalConfig, SignalReading};
pub use trend::TrendBias;
pub use volatility::VolatilityEstimator;
