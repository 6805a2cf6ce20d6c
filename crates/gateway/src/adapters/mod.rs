//! Exchange adapters
//!
//! Adapters implement the [`meridian_ports::ExchangeGateway`] port. The
//! paper adapter is an in-memory venue used for dry runs and tests.

pub mod paper;

pub use paper::{PaperCall, PaperGateway};
