use thiserror::Error;

/// Failures surfaced by an exchange gateway
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Timeout, connection reset, 5xx
    #[error("Transport failure: {0}")]
    Transport(String),

    /// The venue refused the request (post-only cross, insufficient margin...)
    #[error("Order rejected: {0}")]
    Rejected(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limited or in maintenance
    #[error("Venue unavailable: {0}")]
    Unavailable(String),

    /// Payload could not be normalized
    #[error("Decode error: {0}")]
    Decode(String),
}

impl GatewayError {
    /// Worth retrying on a later tick
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Transport(_) | GatewayError::Unavailable(_))
    }
}

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;
