use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Wall clock source for currency decisions.
///
/// Injected so tests can pin time; consensus never reads the system clock
/// directly.
pub trait Clock: Send + Sync {
    /// The current wall clock time.
    fn now(&self) -> SystemTime;

    /// The current time as unix seconds, saturating at zero.
    fn unix_now(&self) -> u64 {
        self.now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
    }
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// A fixed clock advanced by hand.
#[derive(Debug)]
pub struct ManualClock(parking_lot::Mutex<SystemTime>);

impl ManualClock {
    /// Creates a clock pinned at the given unix time.
    pub fn at_unix(seconds: u64) -> Self {
        Self(parking_lot::Mutex::new(UNIX_EPOCH + Duration::from_secs(seconds)))
    }

    /// Advances the clock.
    pub fn advance(&self, by: Duration) {
        *self.0.lock() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        *self.0.lock()
    }
}
