//! Meridian Clock Infrastructure
//!
//! Two time sources behind the [`Clock`] port:
//!
//! - [`SystemClock`]: wall time, for live and paper trading
//! - [`ManualClock`]: frozen time that only moves when told to, for
//!   deterministic engine and cache tests
//!
//! ```ignore
//! use meridian_clock::ManualClock;
//! use chrono::Duration;
//!
//! let clock = ManualClock::starting_now();
//! clock.advance(Duration::seconds(15)); // let a stop dwell elapse
//! ```

mod manual;
mod system;

pub use manual::ManualClock;
pub use system::SystemClock;

// Re-export the Clock trait for convenience
pub use meridian_ports::Clock;
