use meridian_core::Timestamp;

/// Port for the engine's notion of "now"
///
/// Cooldowns, stop dwell times, cache TTLs and learning windows all read
/// this clock, never `Utc::now()` directly, so tests can freeze and step
/// time.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;

    /// Name for log lines
    fn name(&self) -> &str {
        "Clock"
    }
}
