//! Tradeable contract metadata
//!
//! Only linear perpetuals are traded; the engine needs the symbol, price
//! tick, quantity step and the current touch to round and clamp orders.

mod instrument;

pub use instrument::Instrument;
