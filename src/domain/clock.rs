// Race timing: timestamp source and frame-rate independent step scaling.

use std::sync::Arc;

/// Frame length the physics constants were tuned against (~60 Hz).
pub const FRAME_MS: f64 = 16.6667;
/// Smallest step multiplier ever handed to the physics.
pub const MIN_STEP: f64 = 0.001;

// Port for retrieving a monotonic timestamp in milliseconds.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> f64;
}

/// Milliseconds elapsed since construction, read from the tokio clock.
///
/// Using tokio's `Instant` lets paused-time tests drive race timing.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: tokio::time::Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// Converts an elapsed wall-clock delta into a step multiplier.
///
/// Zero, negative and NaN deltas all floor to [`MIN_STEP`].
pub fn step_multiplier(elapsed_ms: f64) -> f64 {
    (elapsed_ms / FRAME_MS).max(MIN_STEP)
}

/// Supplies lap/race timestamps and the per-tick step multiplier.
pub struct RaceClock {
    source: Arc<dyn Clock>,
    last_frame_ms: Option<f64>,
}

impl RaceClock {
    pub fn new(source: Arc<dyn Clock>) -> Self {
        Self {
            source,
            last_frame_ms: None,
        }
    }

    pub fn now_ms(&self) -> f64 {
        self.source.now_ms()
    }

    /// Returns `(now, dt)` for the next simulation tick.
    ///
    /// The first tick after a restart has no previous frame and gets the minimum step.
    pub fn next_frame(&mut self) -> (f64, f64) {
        let now = self.now_ms();
        let elapsed = self.last_frame_ms.map_or(0.0, |last| now - last);
        self.last_frame_ms = Some(now);
        (now, step_multiplier(elapsed))
    }

    /// Forgets the previous frame so the next tick starts from a fresh baseline.
    pub fn restart(&mut self) {
        self.last_frame_ms = None;
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::Clock;
    use std::sync::atomic::{AtomicU64, Ordering};

    // Hand-driven time source for deterministic timing tests.
    #[derive(Default)]
    pub(crate) struct ManualClock {
        bits: AtomicU64,
    }

    impl ManualClock {
        pub(crate) fn at(ms: f64) -> Self {
            let clock = Self::default();
            clock.set(ms);
            clock
        }

        pub(crate) fn set(&self, ms: f64) {
            self.bits.store(ms.to_bits(), Ordering::SeqCst);
        }

        pub(crate) fn advance(&self, ms: f64) {
            self.set(self.now_ms() + ms);
        }
    }

    impl Clock for ManualClock {
        fn now_ms(&self) -> f64 {
            f64::from_bits(self.bits.load(Ordering::SeqCst))
        }
    }
}
