use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::playback::clock::Clock;
use crate::playback::player::{Player, TickOutcome};
use crate::playback::sinks::{AudioSink, ScoreSink, VisualSink};

/// Requests shared with whoever controls a running playback: stop, and the
/// speed multiplier. Both are read before every reschedule.
#[derive(Debug)]
pub struct PlaybackControl {
    stop: AtomicBool,
    speed: AtomicU64,
}

impl PlaybackControl {
    pub fn new(speed: f64) -> Result<Self> {
        let control = PlaybackControl {
            stop: AtomicBool::new(false),
            speed: AtomicU64::new(1.0f64.to_bits()),
        };
        control.set_speed(speed)?;
        Ok(control)
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    pub fn set_speed(&self, speed: f64) -> Result<()> {
        if !(speed.is_finite() && speed >= 0.0) {
            return Err(Error::Configuration(format!(
                "playback speed must be a non-negative number, got {speed}"
            )));
        }
        self.speed.store(speed.to_bits(), Ordering::Relaxed);
        Ok(())
    }

    pub fn speed(&self) -> f64 {
        f64::from_bits(self.speed.load(Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The song played to its end.
    Finished,
    /// A stop was requested.
    Stopped,
}

/// Drives a [`Player`] at a fixed period until the song ends or a stop is
/// requested. A stop takes effect at the next period boundary; a speed the
/// player refuses stops playback and is returned as the error.
pub struct Scheduler<C> {
    clock: C,
    period: Duration,
}

impl<C: Clock> Scheduler<C> {
    pub fn new(clock: C, period: Duration) -> Self {
        Scheduler { clock, period }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn run<A, V, S>(
        &mut self,
        player: &mut Player<A, V, S>,
        control: &PlaybackControl,
    ) -> Result<RunOutcome>
    where
        A: AudioSink,
        V: VisualSink,
        S: ScoreSink,
    {
        player.start();
        let mut last = self.clock.now();

        loop {
            if control.is_stop_requested() {
                player.stop();
                return Ok(RunOutcome::Stopped);
            }
            if let Err(err) = player.set_playback_speed(control.speed()) {
                player.stop();
                return Err(err);
            }

            let now = self.clock.now();
            let delta = now - last;
            last = now;

            if player.tick(delta) == TickOutcome::Finished {
                return Ok(RunOutcome::Finished);
            }

            self.clock.sleep(self.period.as_secs_f64());
        }
    }
}
