//! Error types for the gateway crate

use meridian_ports::GatewayError;
use thiserror::Error;

/// Failures while normalizing a venue payload
#[derive(Error, Debug)]
pub enum WireError {
    #[error("Malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown order side: {0}")]
    UnknownSide(String),

    #[error("Unknown order type: {0}")]
    UnknownOrderType(String),

    #[error("Unparseable timestamp: {0}")]
    Timestamp(String),

    #[error("Missing field: {0}")]
    MissingField(&'static str),
}

impl From<WireError> for GatewayError {
    fn from(e: WireError) -> Self {
        GatewayError::Decode(e.to_string())
    }
}
