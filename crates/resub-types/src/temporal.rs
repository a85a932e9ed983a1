use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Logical time: a caller-controlled monotonic counter standing in for
/// wall-clock time.
pub type Pulse = u64;

/// Source of logical time.
///
/// Implementations must be monotonic (never return a value smaller than a
/// previous one) and must not consult the wall clock: every timestamp the
/// substrate records flows through this trait so replay stays deterministic.
pub trait Clock: Send + Sync {
    /// Current logical time.
    fn now(&self) -> Pulse;
}

/// Clock advanced explicitly by its owner.
///
/// Clones share the same counter, so a test or driver can keep one handle
/// and advance time while the kernel and fabric read through another.
#[derive(Clone, Default)]
pub struct ManualClock {
    pulse: Arc<AtomicU64>,
}

impl ManualClock {
    /// Create a clock starting at `start`.
    pub fn new(start: Pulse) -> Self {
        Self {
            pulse: Arc::new(AtomicU64::new(start)),
        }
    }

    /// Advance by `delta` pulses and return the new time.
    pub fn advance(&self, delta: Pulse) -> Pulse {
        self.pulse.fetch_add(delta, Ordering::SeqCst) + delta
    }

    /// Move the clock forward to `target`. Earlier targets are ignored so
    /// the clock never runs backwards. Returns the resulting time.
    pub fn advance_to(&self, target: Pulse) -> Pulse {
        self.pulse.fetch_max(target, Ordering::SeqCst).max(target)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Pulse {
        self.pulse.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for ManualClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ManualClock({})", self.now())
    }
}

/// Clock that advances by one pulse on every read.
///
/// The first read returns the start value. Useful for drivers that want
/// every emitted event and transaction to carry a distinct timestamp.
#[derive(Clone, Default)]
pub struct TickingClock {
    next: Arc<AtomicU64>,
}

impl TickingClock {
    /// Create a clock whose first reading is `start`.
    pub fn new(start: Pulse) -> Self {
        Self {
            next: Arc::new(AtomicU64::new(start)),
        }
    }

    /// The value the next call to [`Clock::now`] will return.
    pub fn peek(&self) -> Pulse {
        self.next.load(Ordering::SeqCst)
    }
}

impl Clock for TickingClock {
    fn now(&self) -> Pulse {
        self.next.fetch_add(1, Ordering::SeqCst)
    }
}

impl fmt::Debug for TickingClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TickingClock(next={})", self.peek())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_starts_where_told() {
        let clock = ManualClock::new(5);
        assert_eq!(clock.now(), 5);
        assert_eq!(clock.now(), 5);
    }

    #[test]
    fn manual_clock_advance() {
        let clock = ManualClock::new(0);
        assert_eq!(clock.advance(3), 3);
        assert_eq!(clock.now(), 3);
    }

    #[test]
    fn manual_clock_never_runs_backwards() {
        let clock = ManualClock::new(10);
        assert_eq!(clock.advance_to(4), 10);
        assert_eq!(clock.advance_to(12), 12);
        assert_eq!(clock.now(), 12);
    }

    #[test]
    fn manual_clock_clones_share_time() {
        let driver = ManualClock::new(0);
        let reader = driver.clone();
        driver.advance(7);
        assert_eq!(reader.now(), 7);
    }

    #[test]
    fn ticking_clock_advances_per_read() {
        let clock = TickingClock::new(100);
        assert_eq!(clock.now(), 100);
        assert_eq!(clock.now(), 101);
        assert_eq!(clock.peek(), 102);
    }

    #[test]
    fn clock_usable_as_trait_object() {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(1));
        assert_eq!(clock.now(), 1);
    }
}
