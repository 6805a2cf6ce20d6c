//! Market data snapshots consumed by the signal layer

mod book;
mod candle;

pub use book::{BookLevel, MarketSnapshot};
pub use candle::{Candle, Timeframe};
