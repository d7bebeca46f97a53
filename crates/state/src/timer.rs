use std::cell::Cell;
use std::time::{Duration, Instant};

/// Monotonic time source, measured from an arbitrary origin.
pub trait Clock {
    fn now(&self) -> Duration;
}

/// Wall clock measured from construction.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Clock that only moves when told to. Used by headless hosts and tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }

    pub fn set(&self, to: Duration) {
        self.now.set(to);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.now.get()
    }
}

/// Trailing-edge debounce. Scheduling again pushes the deadline out, so a
/// burst of schedules fires once, `delay` after the last one.
#[derive(Debug, Clone)]
pub struct Debouncer {
    delay: Duration,
    deadline: Option<Duration>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// (Re)arm the timer, cancelling any pending deadline.
    pub fn schedule(&mut self, now: Duration) {
        self.deadline = Some(now + self.delay);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    /// Returns `true` exactly once when the deadline has passed.
    pub fn fire_due(&mut self, now: Duration) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: Duration = Duration::from_millis(1);

    #[test]
    fn fires_once_after_delay() {
        let mut d = Debouncer::new(250 * MS);
        d.schedule(Duration::ZERO);
        assert!(!d.fire_due(249 * MS));
        assert!(d.fire_due(250 * MS));
        assert!(!d.fire_due(300 * MS));
        assert!(!d.is_pending());
    }

    #[test]
    fn rescheduling_pushes_deadline() {
        let mut d = Debouncer::new(250 * MS);
        d.schedule(Duration::ZERO);
        d.schedule(200 * MS);
        assert!(!d.fire_due(300 * MS));
        assert!(d.fire_due(450 * MS));
    }

    #[test]
    fn cancel_clears_pending() {
        let mut d = Debouncer::new(250 * MS);
        d.schedule(Duration::ZERO);
        d.cancel();
        assert!(!d.fire_due(Duration::from_secs(10)));
    }

    #[test]
    fn manual_clock_moves_on_demand() {
        let clock = ManualClock::new();
        assert_eq!(clock.now(), Duration::ZERO);
        clock.advance(16 * MS);
        clock.advance(MS);
        assert_eq!(clock.now(), 17 * MS);
        clock.set(MS);
        assert_eq!(clock.now(), MS);
    }
}
