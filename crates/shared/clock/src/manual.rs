use chrono::{DateTime, Duration, Utc};
use meridian_core::Timestamp;
use meridian_ports::Clock;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

/// Fixed clock that only advances when explicitly moved
///
/// Time is held as nanoseconds since the epoch in an atomic, so the clock
/// can be shared across tasks without locking and read from sync code.
pub struct ManualClock {
    nanos: AtomicI64,
}

impl ManualClock {
    pub fn new(initial_time: Timestamp) -> Arc<Self> {
        Arc::new(Self {
            nanos: AtomicI64::new(to_nanos(initial_time)),
        })
    }

    /// Frozen at the current wall time
    pub fn starting_now() -> Arc<Self> {
        Self::new(Utc::now())
    }

    /// Move time forward by `duration`
    pub fn advance(&self, duration: Duration) {
        let delta = duration.num_nanoseconds().unwrap_or(i64::MAX);
        self.nanos.fetch_add(delta, Ordering::SeqCst);
    }

    /// Jump to an explicit time
    pub fn set(&self, time: Timestamp) {
        self.nanos.store(to_nanos(time), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        DateTime::from_timestamp_nanos(self.nanos.load(Ordering::SeqCst))
    }

    fn name(&self) -> &str {
        "ManualClock"
    }
}

fn to_nanos(time: Timestamp) -> i64 {
    time.timestamp_nanos_opt().unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_until_advanced() {
        let clock = ManualClock::starting_now();
        let time1 = clock.now();
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert_eq!(clock.now(), time1);

        clock.advance(Duration::seconds(5));
        assert_eq!(clock.now() - time1, Duration::seconds(5));
    }

    #[test]
    fn test_set_time() {
        let start = Utc::now();
        let clock = ManualClock::new(start);
        let later = start + Duration::minutes(10);
        clock.set(later);
        assert_eq!(clock.now(), later);
    }
}
