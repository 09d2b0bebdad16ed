//! Realtime playback of a processed song against a speed-scaled clock.
//!
//! Every event of the song is indexed on a [`Timeline`] of quantized
//! seconds. Each tick looks only at the events inside a window around the
//! playback time; the window's left edge is found by a cursor that only
//! ever moves forward, so a whole playback walks the timeline once.

use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::midi::processor::ProcessedMidiFile;
use crate::playback::input::{InputQueue, InputSender, PlayerInput};
use crate::playback::sinks::{AudioSink, ScoreSink, VisualSink};
use crate::quantizer::TimeQuantizer;
use crate::timeline::Timeline;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackConfig {
    /// Half-width of the event window, in seconds.
    pub window: f64,
    /// Count-in before the song's time zero, in seconds.
    pub lead_in: f64,
    /// Timeline steps per second.
    pub resolution: i64,
    /// How far from a note's onset a key press still counts, in seconds.
    pub hit_tolerance: f64,
    pub metronome: bool,
    pub downbeat_frequency: f64,
    pub beat_frequency: f64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        PlaybackConfig {
            window: 2.0,
            lead_in: 3.0,
            resolution: 1000,
            hit_tolerance: 0.1,
            metronome: true,
            downbeat_frequency: 1500.0,
            beat_frequency: 1000.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    /// Started; the next tick resets and begins playing.
    Starting,
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Not playing; nothing was done.
    Idle,
    Playing,
    /// The song ran out; playback is now stopped.
    Finished,
}

/// What happens at one timeline position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    NoteOn(usize),
    NoteOff(usize),
    Sustain(usize),
    Segment(usize),
}

pub struct Player<A, V, S> {
    song: ProcessedMidiFile,
    config: PlaybackConfig,
    quantizer: TimeQuantizer,
    timeline: Timeline,
    slots: Vec<Vec<Slot>>,

    audio: A,
    visual: V,
    score: S,
    input: InputQueue,

    state: PlaybackState,
    speed: f64,
    playback_time: f64,
    start_index: usize,
    active: HashSet<usize>,
    credited: HashSet<(u8, u64)>,
    hits: usize,
    started_notes: usize,
    reported: Option<(usize, usize)>,
    sustain_down: Option<bool>,
    segment: usize,
    last_beat: Option<i64>,
    player_sustain: bool,

    window: Vec<Slot>,
    window_notes: Vec<usize>,
    pressed: Vec<u8>,
}

impl<A, V, S> Player<A, V, S>
where
    A: AudioSink,
    V: VisualSink,
    S: ScoreSink,
{
    pub fn new(
        song: ProcessedMidiFile,
        config: PlaybackConfig,
        audio: A,
        visual: V,
        score: S,
    ) -> Result<Self> {
        if !(config.window.is_finite() && config.window > 0.0) {
            return Err(Error::Configuration(format!(
                "playback window must be positive, got {}",
                config.window
            )));
        }
        if !(config.lead_in.is_finite() && config.lead_in >= 0.0) {
            return Err(Error::Configuration(format!(
                "lead-in must not be negative, got {}",
                config.lead_in
            )));
        }
        if song.metronome.is_empty() {
            return Err(Error::Domain("song has no metronome segment".into()));
        }
        let quantizer = TimeQuantizer::with_resolution(config.resolution)?;

        let mut keyed = Vec::new();
        for (i, note) in song.notes.iter().enumerate() {
            keyed.push((quantizer.quantize(note.note_on_timepoint), Slot::NoteOn(i)));
            keyed.push((quantizer.quantize(note.note_off_timepoint), Slot::NoteOff(i)));
        }
        for (i, sustain) in song.sustain.iter().enumerate() {
            keyed.push((quantizer.quantize(sustain.timepoint), Slot::Sustain(i)));
        }
        for (i, segment) in song.metronome.iter().enumerate() {
            keyed.push((quantizer.quantize(segment.timepoint), Slot::Segment(i)));
        }

        let timeline: Timeline = keyed.iter().map(|(key, _)| *key).collect();
        let mut slots = vec![Vec::new(); timeline.len()];
        for (key, slot) in keyed {
            if let Some(index) = timeline.position(key) {
                slots[index].push(slot);
            }
        }

        Ok(Player {
            song,
            config,
            quantizer,
            timeline,
            slots,
            audio,
            visual,
            score,
            input: InputQueue::new(),
            state: PlaybackState::Stopped,
            speed: 1.0,
            playback_time: -config.lead_in,
            start_index: 0,
            active: HashSet::new(),
            credited: HashSet::new(),
            hits: 0,
            started_notes: 0,
            reported: None,
            sustain_down: None,
            segment: 0,
            last_beat: None,
            player_sustain: false,
            window: Vec::new(),
            window_notes: Vec::new(),
            pressed: Vec::new(),
        })
    }

    pub fn song(&self) -> &ProcessedMidiFile {
        &self.song
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn playback_time(&self) -> f64 {
        self.playback_time
    }

    pub fn playback_speed(&self) -> f64 {
        self.speed
    }

    /// Takes effect from the next tick. Zero pauses the clock.
    pub fn set_playback_speed(&mut self, speed: f64) -> Result<()> {
        if !(speed.is_finite() && speed >= 0.0) {
            return Err(Error::Configuration(format!(
                "playback speed must be a non-negative number, got {speed}"
            )));
        }
        self.speed = speed;
        Ok(())
    }

    pub fn input_sender(&self) -> InputSender {
        self.input.sender()
    }

    pub fn hits(&self) -> usize {
        self.hits
    }

    pub fn sounding_notes(&self) -> usize {
        self.active.len()
    }

    pub fn player_sustain_down(&self) -> bool {
        self.player_sustain
    }

    pub fn audio(&self) -> &A {
        &self.audio
    }

    pub fn visual(&self) -> &V {
        &self.visual
    }

    pub fn score(&self) -> &S {
        &self.score
    }

    /// Begin (or restart) playback from the count-in.
    pub fn start(&mut self) {
        if self.state == PlaybackState::Running {
            self.release();
        }
        log::info!(
            "Starting playback: {} notes, speed {:.2}",
            self.song.notes.len(),
            self.speed
        );
        self.state = PlaybackState::Starting;
    }

    /// Halt playback and silence anything still sounding. Stopping twice is
    /// harmless.
    pub fn stop(&mut self) {
        if self.state == PlaybackState::Stopped {
            return;
        }
        self.release();
        self.state = PlaybackState::Stopped;
        log::info!("Playback stopped at {:.3}s", self.playback_time);
    }

    fn release(&mut self) {
        for i in self.active.drain() {
            let number = self.song.notes[i].number;
            self.audio.note_off(number);
            self.visual.set_key_intensity(number, 0);
        }
        if self.sustain_down == Some(true) {
            self.audio.set_sustain_pedal(false);
        }
        self.sustain_down = None;
    }

    fn reset(&mut self) {
        self.playback_time = -self.config.lead_in;
        self.start_index = 0;
        self.active.clear();
        self.credited.clear();
        self.hits = 0;
        self.started_notes = 0;
        self.reported = None;
        self.sustain_down = None;
        self.segment = 0;
        self.last_beat = None;
        self.player_sustain = false;
        // Presses made before the start do not count.
        self.input.drain();
    }

    fn slot_time(&self, slot: Slot) -> f64 {
        match slot {
            Slot::NoteOn(i) => self.song.notes[i].note_on_timepoint,
            Slot::NoteOff(i) => self.song.notes[i].note_off_timepoint,
            Slot::Sustain(i) => self.song.sustain[i].timepoint,
            Slot::Segment(i) => self.song.metronome[i].timepoint,
        }
    }

    /// Advance the playback clock by `wall_delta` real seconds (scaled by
    /// the playback speed) and emit everything that became due.
    ///
    /// The first tick after [`start`](Self::start) resets state and plays
    /// from the beginning of the count-in without advancing the clock.
    pub fn tick(&mut self, wall_delta: f64) -> TickOutcome {
        match self.state {
            PlaybackState::Stopped => return TickOutcome::Idle,
            PlaybackState::Starting => {
                self.reset();
                self.state = PlaybackState::Running;
            }
            PlaybackState::Running => {
                if wall_delta.is_finite() && wall_delta > 0.0 {
                    self.playback_time += wall_delta * self.speed;
                }
            }
        }

        let now = self.playback_time;
        let window_start = now - self.config.window;
        let window_end = now + self.config.window;
        let first_key = self.quantizer.quantize(window_start);
        let last_key = self.quantizer.quantize(window_end);

        let mut cursor = self.timeline.cursor(self.start_index);
        while let Some(c) = cursor {
            if c.timestamp() >= first_key {
                break;
            }
            cursor = c.next();
        }
        let Some(first) = cursor else {
            self.start_index = self.timeline.len();
            self.finish();
            return TickOutcome::Finished;
        };
        self.start_index = first.index();

        let mut window = std::mem::take(&mut self.window);
        window.clear();
        let mut cursor = Some(first);
        while let Some(c) = cursor {
            if c.timestamp() > last_key {
                break;
            }
            window.extend(self.slots[c.index()].iter().copied().filter(|&slot| {
                let t = self.slot_time(slot);
                t >= window_start && t <= window_end
            }));
            cursor = c.next();
        }

        self.drain_input();
        self.end_notes(now);
        self.play_notes(now, &window);
        self.update_sustain(now, &window);
        self.update_metronome(now, &window);
        self.score_hits(now);
        self.report_score();

        self.window = window;
        TickOutcome::Playing
    }

    fn finish(&mut self) {
        self.release();
        self.report_score();
        self.state = PlaybackState::Stopped;
        log::info!(
            "Playback finished: {}/{} notes hit",
            self.hits,
            self.started_notes
        );
    }

    fn drain_input(&mut self) {
        self.pressed.clear();
        for input in self.input.drain() {
            match input {
                PlayerInput::Note {
                    number,
                    is_on: true,
                    ..
                } => self.pressed.push(number),
                PlayerInput::Note { .. } => {}
                PlayerInput::Pedal { level } => self.player_sustain = level > 0,
            }
        }
    }

    fn end_notes(&mut self, now: f64) {
        let ended: Vec<usize> = self
            .active
            .iter()
            .copied()
            .filter(|&i| now > self.song.notes[i].note_off_timepoint)
            .collect();

        for i in ended {
            self.active.remove(&i);
            let number = self.song.notes[i].number;
            // A retriggered key keeps sounding for its newer note.
            if self.active.iter().any(|&j| self.song.notes[j].number == number) {
                continue;
            }
            self.audio.note_off(number);
            self.visual.set_key_intensity(number, 0);
        }
    }

    fn play_notes(&mut self, now: f64, window: &[Slot]) {
        self.window_notes.clear();
        self.window_notes.extend(window.iter().filter_map(|slot| match *slot {
            Slot::NoteOn(i) | Slot::NoteOff(i) => Some(i),
            _ => None,
        }));
        self.window_notes.sort_unstable();
        self.window_notes.dedup();

        for &i in &self.window_notes {
            let note = self.song.notes[i];
            if note.note_on_timepoint <= now && now <= note.note_off_timepoint {
                if self.active.insert(i) {
                    self.audio.note_on(note.number, note.note_on_velocity);
                    self.visual.set_key_intensity(note.number, note.note_on_velocity);
                    self.started_notes += 1;
                }
            } else if now < note.note_on_timepoint {
                self.visual.preview_upcoming_note(
                    note.number,
                    note.note_on_timepoint - now,
                    note.duration(),
                );
            }
        }
    }

    fn update_sustain(&mut self, now: f64, window: &[Slot]) {
        let latest = window
            .iter()
            .filter_map(|slot| match *slot {
                Slot::Sustain(i) => Some(i),
                _ => None,
            })
            .filter(|&i| self.song.sustain[i].timepoint <= now)
            .max();

        if let Some(i) = latest {
            let down = self.song.sustain[i].is_down();
            if self.sustain_down != Some(down) {
                self.audio.set_sustain_pedal(down);
                self.sustain_down = Some(down);
            }
        }
    }

    fn update_metronome(&mut self, now: f64, window: &[Slot]) {
        let latest = window
            .iter()
            .filter_map(|slot| match *slot {
                Slot::Segment(i) => Some(i),
                _ => None,
            })
            .filter(|&i| self.song.metronome[i].timepoint <= now)
            .max();

        if let Some(i) = latest {
            if i > self.segment && self.song.metronome[i] != self.song.metronome[self.segment] {
                let settings = self.song.metronome[i].settings;
                log::debug!(
                    "metronome segment {} at {:.3}s: {:.1} bpm, {}/{}",
                    i,
                    self.song.metronome[i].timepoint,
                    settings.bpm(),
                    settings.numerator,
                    settings.denominator_value()
                );
                self.segment = i;
                self.last_beat = None;
            }
        }

        if !self.config.metronome {
            return;
        }

        let segment = self.song.metronome[self.segment];
        let interval = segment.settings.beat_interval();
        if !(interval.is_finite() && interval > 0.0) {
            return;
        }

        // Negative beats are the count-in before the segment starts.
        let beat = ((now - segment.timepoint) / interval).floor() as i64;
        if self.last_beat.is_none_or(|last| beat > last) {
            let beats_per_bar = i64::from(segment.settings.numerator.max(1));
            let frequency = if beat.rem_euclid(beats_per_bar) == 0 {
                self.config.downbeat_frequency
            } else {
                self.config.beat_frequency
            };
            self.audio.metronome_tick(frequency);
            self.last_beat = Some(beat);
        }
    }

    fn score_hits(&mut self, now: f64) {
        if self.pressed.is_empty() {
            return;
        }

        for &i in &self.window_notes {
            let note = self.song.notes[i];
            let key = (note.number, note.note_on_ticks);
            if self.credited.contains(&key) || !self.pressed.contains(&note.number) {
                continue;
            }
            if (note.note_on_timepoint - now).abs() <= self.config.hit_tolerance {
                self.credited.insert(key);
                self.hits += 1;
                self.visual.trigger_hit_flash(note.number);
                log::debug!("hit note {} at {:.3}s", note.number, now);
            }
        }

        self.pressed.clear();
    }

    fn report_score(&mut self) {
        let current = (self.hits, self.started_notes);
        if self.reported != Some(current) {
            self.score.report_score(current.0, current.1);
            self.reported = Some(current);
        }
    }
}
