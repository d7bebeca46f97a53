use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Elapsed time past which the backlog is dropped instead of caught up.
pub const BACKLOG_LIMIT: Duration = Duration::from_millis(1000);

/// Default frame budget, 60 updates per second.
pub const DEFAULT_FPS: f64 = 60.0;

/// Result of a render step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Continue,
    /// Stop the loop for good.
    Stop,
}

/// The two halves of a frame.
pub trait FrameHandler {
    /// One fixed simulation step of `step` length.
    fn update(&mut self, step: Duration);
    fn render(&mut self) -> FrameOutcome;
}

/// What one callback did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameReport {
    pub updates: u32,
    /// Whether the loop is still running after this callback.
    pub running: bool,
}

/// Fixed-timestep driver: zero or more updates, then exactly one render.
#[derive(Debug)]
pub struct FrameLoop {
    budget: Duration,
    accumulator: Duration,
    last: Option<Instant>,
    stopped: bool,
    timer: FrameTimer,
}

impl FrameLoop {
    /// The accumulator starts empty rather than holding one budget, so the
    /// first callback runs an update only once a full budget has elapsed.
    pub fn new(budget: Duration) -> Self {
        Self {
            budget: budget.max(Duration::from_micros(100)),
            accumulator: Duration::ZERO,
            last: None,
            stopped: false,
            timer: FrameTimer::new(120),
        }
    }

    pub fn with_fps(fps: f64) -> Self {
        let fps = if fps.is_finite() && fps > 0.0 {
            fps
        } else {
            DEFAULT_FPS
        };
        Self::new(Duration::from_secs_f64(1.0 / fps))
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn is_running(&self) -> bool {
        !self.stopped
    }

    pub fn timer(&self) -> &FrameTimer {
        &self.timer
    }

    /// Run one callback at wall time `now`. The first callback counts as
    /// zero elapsed time.
    pub fn frame(&mut self, now: Instant, handler: &mut impl FrameHandler) -> FrameReport {
        let elapsed = self
            .last
            .replace(now)
            .map_or(Duration::ZERO, |last| now.saturating_duration_since(last));
        self.advance(elapsed, handler)
    }

    /// Run one callback after `elapsed` wall time.
    pub fn advance(&mut self, elapsed: Duration, handler: &mut impl FrameHandler) -> FrameReport {
        if self.stopped {
            return FrameReport {
                updates: 0,
                running: false,
            };
        }
        let _span = tracing::trace_span!("frame").entered();
        self.timer.record(elapsed);

        if elapsed > BACKLOG_LIMIT {
            debug!(elapsed_ms = elapsed.as_millis() as u64, "frame backlog dropped");
            self.accumulator = Duration::ZERO;
        } else {
            self.accumulator += elapsed;
        }

        let mut updates = 0;
        while self.accumulator >= self.budget {
            self.accumulator -= self.budget;
            handler.update(self.budget);
            updates += 1;
        }

        let outcome = handler.render();
        trace!(updates, ?outcome, "frame");
        if outcome == FrameOutcome::Stop {
            debug!("frame loop stopped");
            self.stopped = true;
        }
        FrameReport {
            updates,
            running: !self.stopped,
        }
    }
}

impl Default for FrameLoop {
    fn default() -> Self {
        Self::with_fps(DEFAULT_FPS)
    }
}

/// Rolling window of recent frame times.
#[derive(Debug)]
pub struct FrameTimer {
    history: Vec<Duration>,
    index: usize,
    filled: bool,
}

impl FrameTimer {
    pub fn new(capacity: usize) -> Self {
        Self {
            history: vec![Duration::ZERO; capacity.max(1)],
            index: 0,
            filled: false,
        }
    }

    pub fn record(&mut self, dt: Duration) {
        self.history[self.index] = dt;
        self.index = (self.index + 1) % self.history.len();
        if self.index == 0 {
            self.filled = true;
        }
    }

    pub fn count(&self) -> usize {
        if self.filled {
            self.history.len()
        } else {
            self.index
        }
    }

    pub fn average(&self) -> Duration {
        let count = self.count();
        if count == 0 {
            return Duration::ZERO;
        }
        self.history[..count].iter().sum::<Duration>() / count as u32
    }

    pub fn max(&self) -> Duration {
        self.history[..self.count()]
            .iter()
            .copied()
            .max()
            .unwrap_or(Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counter {
        updates: u32,
        renders: u32,
        stop_after: Option<u32>,
    }

    impl FrameHandler for Counter {
        fn update(&mut self, _step: Duration) {
            self.updates += 1;
        }

        fn render(&mut self) -> FrameOutcome {
            self.renders += 1;
            match self.stop_after {
                Some(limit) if self.renders >= limit => FrameOutcome::Stop,
                _ => FrameOutcome::Continue,
            }
        }
    }

    fn budget() -> Duration {
        Duration::from_micros(16_666)
    }

    fn run(samples: &[u64]) -> Vec<u32> {
        let mut frames = FrameLoop::new(budget());
        let mut counter = Counter::default();
        samples
            .iter()
            .map(|ms| frames.advance(Duration::from_millis(*ms), &mut counter).updates)
            .collect()
    }

    #[test]
    fn updates_follow_the_accumulator() {
        // 10, 20 (one step, 3.3 left), 13.3, 23.3 (one step).
        assert_eq!(run(&[10, 10, 10]), [0, 1, 0]);
        assert_eq!(run(&[10, 10, 10, 10]), [0, 1, 0, 1]);
        assert_eq!(run(&[50]), [3]);
    }

    #[test]
    fn backlog_is_dropped() {
        assert_eq!(run(&[10, 1500, 10]), [0, 0, 0]);
        assert_eq!(run(&[1000]), [60]);
    }

    #[test]
    fn exactly_one_render_per_callback() {
        let mut frames = FrameLoop::new(budget());
        let mut counter = Counter::default();
        for ms in [0, 5, 40, 2000] {
            frames.advance(Duration::from_millis(ms), &mut counter);
        }
        assert_eq!(counter.renders, 4);
    }

    #[test]
    fn stop_is_final() {
        let mut frames = FrameLoop::new(budget());
        let mut counter = Counter {
            stop_after: Some(2),
            ..Counter::default()
        };
        assert!(frames.advance(Duration::from_millis(20), &mut counter).running);
        assert!(!frames.advance(Duration::from_millis(20), &mut counter).running);
        let report = frames.advance(Duration::from_millis(100), &mut counter);
        assert_eq!(report.updates, 0);
        assert_eq!(counter.renders, 2);
        assert!(!frames.is_running());
    }

    #[test]
    fn first_frame_counts_as_zero() {
        let mut frames = FrameLoop::with_fps(60.0);
        let mut counter = Counter::default();
        let start = Instant::now();
        assert_eq!(frames.frame(start, &mut counter).updates, 0);
        let report = frames.frame(start + Duration::from_millis(34), &mut counter);
        assert_eq!(report.updates, 2);
    }

    #[test]
    fn timer_window() {
        let mut timer = FrameTimer::new(3);
        for ms in [10, 20, 30, 40] {
            timer.record(Duration::from_millis(ms));
        }
        assert_eq!(timer.count(), 3);
        assert_eq!(timer.average(), Duration::from_millis(30));
        assert_eq!(timer.max(), Duration::from_millis(40));
    }
}
