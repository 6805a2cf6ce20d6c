//! Meridian Capital Guard
//!
//! Account margin is the one resource every symbol competes for. The guard
//! is consulted before every entry and answers two questions:
//!
//! - **Is it safe to add exposure?** A fixed fraction of equity is held in
//!   reserve; committed margin may never eat into it, and what remains must
//!   clear an absolute floor.
//! - **How much?** Leverage-based sizing capped by visible liquidity, or
//!   fixed-fractional sizing from the stop distance.
//!
//! ```text
//!   get_account_balance ──► CapitalLedger ──► CapitalCheck { safe, usable }
//!                                                   │
//!                          size_position / size_by_risk ◄─┘
//! ```
//!
//! Any failure reading the account fails closed: `safe = false`,
//! `usable = 0`. Checks are optimistic (no locking across symbols); the
//! sizing is conservative enough that a concurrent check-then-use cannot
//! overcommit in practice.

pub mod guard;
pub mod parameters;

// Re-export main types
pub use guard::{CapitalCheck, CapitalGuard, CapitalLedger};
pub use parameters::CapitalGuardConfig;
