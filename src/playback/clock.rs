use std::sync::LazyLock;
use std::thread::sleep;
use std::time::{Duration, Instant};

static START: LazyLock<Instant> = LazyLock::new(Instant::now);

/// Source of wall-clock time for the scheduler.
pub trait Clock {
    /// Monotonic seconds since an arbitrary origin.
    fn now(&mut self) -> f64;
    fn sleep(&mut self, seconds: f64);
}

/// Process-wide monotonic clock backed by `Instant`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&mut self) -> f64 {
        get_time_seconds()
    }

    fn sleep(&mut self, seconds: f64) {
        delay_execution(seconds);
    }
}

/// Seconds elapsed since the clock was first read.
pub fn get_time_seconds() -> f64 {
    START.elapsed().as_secs_f64()
}

/// Block the thread; non-positive or non-finite delays return immediately.
pub fn delay_execution(seconds: f64) {
    if !seconds.is_finite() || seconds <= 0.0 {
        return;
    }
    sleep(Duration::from_secs_f64(seconds));
}
