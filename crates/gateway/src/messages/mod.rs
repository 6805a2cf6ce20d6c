//! Venue wire payloads
//!
//! Each payload type accepts every field-name variant the venue has been
//! seen to use and normalizes into exactly one core type, so the engine
//! never branches on payload shape.

pub mod account;
pub mod market_data;

pub use account::{CollateralWire, OpenOrderWire, PositionWire};
pub use market_data::{CandleWire, DepthWire, MarketWire};

use crate::error::WireError;
use serde::de::DeserializeOwned;

/// Decode a JSON body into a wire payload
pub fn decode<T: DeserializeOwned>(body: &str) -> Result<T, WireError> {
    Ok(serde_json::from_str(body)?)
}
