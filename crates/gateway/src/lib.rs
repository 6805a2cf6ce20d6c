//! Meridian Gateway
//!
//! Everything between the quoting engine and a venue:
//! - Wire payload types that normalize venue field-name variants
//! - A generic TTL cache and a caching decorator for any gateway
//! - An in-memory paper venue for dry runs and tests
//!
//! ## Architecture
//!
//! ```text
//! Venue (REST) / PaperGateway
//!         │ ExchangeGateway
//!    ┌────▼─────────┐
//!    │ CachedGateway│  per-kind TTLs, invalidation after place/cancel
//!    └────┬─────────┘
//!         │ ExchangeGateway
//!    ┌────▼────┐
//!    │ Engine  │
//!    └─────────┘
//! ```

pub mod adapters;
pub mod cache;
pub mod cached;
pub mod error;
pub mod messages;

// Re-export commonly used types
pub use adapters::{PaperCall, PaperGateway};
pub use cache::TtlCache;
pub use cached::{CacheTtls, CachedGateway};
pub use error::WireError;
