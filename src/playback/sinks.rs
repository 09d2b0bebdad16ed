//! Capabilities the playback loop drives. Implementations live outside the
//! core: a synth for audio, a renderer for visuals, a UI for the score.

pub trait AudioSink {
    fn note_on(&mut self, number: u8, velocity: u8);
    fn note_off(&mut self, number: u8);
    fn set_sustain_pedal(&mut self, down: bool);
    /// Click at the given pitch in Hz.
    fn metronome_tick(&mut self, frequency: f64);
}

pub trait VisualSink {
    fn preview_upcoming_note(&mut self, number: u8, time_until_onset: f64, duration: f64);
    fn trigger_hit_flash(&mut self, number: u8);
    /// Velocity 0 turns the key off.
    fn set_key_intensity(&mut self, number: u8, velocity: u8);
}

pub trait ScoreSink {
    fn report_score(&mut self, hit_count: usize, total_count: usize);
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl AudioSink for NullSink {
    fn note_on(&mut self, _number: u8, _velocity: u8) {}
    fn note_off(&mut self, _number: u8) {}
    fn set_sustain_pedal(&mut self, _down: bool) {}
    fn metronome_tick(&mut self, _frequency: f64) {}
}

impl VisualSink for NullSink {
    fn preview_upcoming_note(&mut self, _number: u8, _time_until_onset: f64, _duration: f64) {}
    fn trigger_hit_flash(&mut self, _number: u8) {}
    fn set_key_intensity(&mut self, _number: u8, _velocity: u8) {}
}

impl ScoreSink for NullSink {
    fn report_score(&mut self, _hit_count: usize, _total_count: usize) {}
}

/// Sink that writes through the `log` facade. Previews are traced, the rest
/// is logged at debug level, scores at info.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl AudioSink for LogSink {
    fn note_on(&mut self, number: u8, velocity: u8) {
        log::debug!("note on {number} vel {velocity}");
    }

    fn note_off(&mut self, number: u8) {
        log::debug!("note off {number}");
    }

    fn set_sustain_pedal(&mut self, down: bool) {
        log::debug!("sustain {}", if down { "down" } else { "up" });
    }

    fn metronome_tick(&mut self, frequency: f64) {
        log::debug!("tick {frequency:.0} Hz");
    }
}

impl VisualSink for LogSink {
    fn preview_upcoming_note(&mut self, number: u8, time_until_onset: f64, duration: f64) {
        log::trace!("upcoming {number} in {time_until_onset:.3}s for {duration:.3}s");
    }

    fn trigger_hit_flash(&mut self, number: u8) {
        log::debug!("hit {number}");
    }

    fn set_key_intensity(&mut self, number: u8, velocity: u8) {
        log::trace!("key {number} intensity {velocity}");
    }
}

impl ScoreSink for LogSink {
    fn report_score(&mut self, hit_count: usize, total_count: usize) {
        log::info!("score {hit_count}/{total_count}");
    }
}
