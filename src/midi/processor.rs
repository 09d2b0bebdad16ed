//! Turns the tick-based events of a parsed file into absolute-time notes,
//! sustain changes and metronome segments.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::midi::events::{ChannelEvent, ChannelEventKind, MetaEvent, MidiFile};
use crate::timeline::Timeline;

pub const DEFAULT_TEMPO: u32 = 500_000;
const SUSTAIN_CONTROLLER: u8 = 64;

/// Tempo and time signature in effect from some tick onward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetronomeSettings {
    pub ticks_per_quarter_note: u16,
    /// Microseconds per quarter note.
    pub tempo: u32,
    pub numerator: u8,
    /// Power-of-two exponent as stored in the file (2 = quarter note).
    pub denominator: u8,
    pub clocks_per_click: u8,
    pub thirty_seconds_per_quarter: u8,
}

impl MetronomeSettings {
    pub fn new(ticks_per_quarter_note: u16) -> Self {
        MetronomeSettings {
            ticks_per_quarter_note,
            tempo: DEFAULT_TEMPO,
            numerator: 4,
            denominator: 2,
            clocks_per_click: 24,
            thirty_seconds_per_quarter: 8,
        }
    }

    pub fn bpm(&self) -> f64 {
        60_000_000.0 / self.tempo as f64
    }

    pub fn denominator_value(&self) -> u32 {
        1u32.checked_shl(u32::from(self.denominator)).unwrap_or(0)
    }

    pub fn seconds_per_tick(&self) -> f64 {
        self.tempo as f64 / 1_000_000.0 / self.ticks_per_quarter_note as f64
    }

    /// Seconds between metronome clicks. There are 24 MIDI clocks in a
    /// quarter note.
    pub fn beat_interval(&self) -> f64 {
        self.clocks_per_click as f64 / 24.0 * self.tempo as f64 / 1_000_000.0
    }
}

/// A note-on paired with the note-off that ended it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteEvent {
    pub number: u8,
    pub note_on_velocity: u8,
    pub note_off_velocity: u8,
    pub note_on_ticks: u64,
    pub note_off_ticks: u64,
    pub note_on_timepoint: f64,
    pub note_off_timepoint: f64,
}

impl NoteEvent {
    pub fn duration(&self) -> f64 {
        self.note_off_timepoint - self.note_on_timepoint
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SustainEvent {
    pub ticks: u64,
    pub timepoint: f64,
    /// 0..=127; anything above zero means the pedal is down.
    pub level: u8,
}

impl SustainEvent {
    pub fn is_down(&self) -> bool {
        self.level > 0
    }
}

/// Start of a metronome segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SetMetronomeSettingsEvent {
    pub ticks: u64,
    pub timepoint: f64,
    pub settings: MetronomeSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedMidiFile {
    pub notes: Vec<NoteEvent>,
    pub sustain: Vec<SustainEvent>,
    /// Sorted by tick, never empty, first segment at tick 0.
    pub metronome: Vec<SetMetronomeSettingsEvent>,
    /// Absolute seconds of every distinct event tick, ascending.
    pub timepoints: Vec<f64>,
}

impl ProcessedMidiFile {
    pub fn note_count(&self) -> usize {
        self.notes.len()
    }

    /// Time of the last note release, or zero without notes.
    pub fn duration(&self) -> f64 {
        self.notes
            .iter()
            .map(|n| n.note_off_timepoint)
            .fold(0.0, f64::max)
    }
}

enum TickEvent<'a> {
    Meta(&'a MetaEvent),
    Channel(&'a ChannelEvent),
}

struct ActiveNote {
    velocity: u8,
    ticks: u64,
    timepoint: f64,
}

/// Replay every track on one merged tick timeline and derive the note,
/// sustain and metronome streams.
///
/// Note-offs are matched by note number only, ignoring the channel; a
/// note-off with nothing to close is dropped, and notes still sounding when
/// the events run out are never emitted.
pub fn process_midi_file(file: &MidiFile) -> Result<ProcessedMidiFile> {
    if file.format > 1 {
        return Err(Error::Format(format!(
            "MIDI format {} is not supported for playback",
            file.format
        )));
    }
    if file.ticks_per_quarter_note == 0 {
        return Err(Error::Format("time division of 0 ticks per quarter note".into()));
    }

    // Events of every track share one tick axis. Within a tick, tracks keep
    // file order and meta events precede channel events of the same track.
    let mut tagged: Vec<(i64, TickEvent<'_>)> = Vec::new();
    for track in &file.tracks {
        for e in &track.meta_events {
            tagged.push((e.ticks as i64, TickEvent::Meta(&e.event)));
        }
        for e in &track.midi_events {
            tagged.push((e.ticks as i64, TickEvent::Channel(&e.event)));
        }
    }

    let timeline: Timeline = tagged.iter().map(|(ticks, _)| *ticks).collect();
    let mut buckets: Vec<Vec<TickEvent<'_>>> = Vec::new();
    buckets.resize_with(timeline.len(), Vec::new);
    for (ticks, event) in tagged {
        if let Some(index) = timeline.position(ticks) {
            buckets[index].push(event);
        }
    }

    let mut settings = MetronomeSettings::new(file.ticks_per_quarter_note);
    // Defaults hold until the first change; a change at tick 0 replaces them.
    let mut metronome = vec![SetMetronomeSettingsEvent {
        ticks: 0,
        timepoint: 0.0,
        settings,
    }];
    let mut notes = Vec::new();
    let mut sustain = Vec::new();
    let mut timepoints = Vec::with_capacity(timeline.len());
    let mut active: HashMap<u8, ActiveNote> = HashMap::new();

    let mut previous_ticks = 0i64;
    let mut time = 0.0f64;
    let mut cursor = timeline.start();

    while let Some(current) = cursor {
        let ticks = current.timestamp();
        // The interval up to this tick runs at the tempo set before it.
        time += (ticks - previous_ticks) as f64 * settings.seconds_per_tick();
        previous_ticks = ticks;
        timepoints.push(time);

        for event in &buckets[current.index()] {
            match event {
                TickEvent::Meta(meta) => {
                    let changed = match **meta {
                        MetaEvent::SetTempo(tempo) => {
                            settings.tempo = tempo;
                            true
                        }
                        MetaEvent::TimeSignature {
                            numerator,
                            denominator,
                            clocks_per_click,
                            thirty_seconds_per_quarter,
                        } => {
                            settings.numerator = numerator;
                            settings.denominator = denominator;
                            settings.clocks_per_click = clocks_per_click;
                            settings.thirty_seconds_per_quarter = thirty_seconds_per_quarter;
                            true
                        }
                        _ => false,
                    };
                    if changed {
                        let segment = SetMetronomeSettingsEvent {
                            ticks: ticks as u64,
                            timepoint: time,
                            settings,
                        };
                        match metronome.last_mut() {
                            Some(last) if last.ticks == segment.ticks => *last = segment,
                            _ => metronome.push(segment),
                        }
                    }
                }
                TickEvent::Channel(channel) => match channel.kind {
                    ChannelEventKind::NoteOn { note, velocity } if velocity > 0 => {
                        active.insert(
                            note,
                            ActiveNote {
                                velocity,
                                ticks: ticks as u64,
                                timepoint: time,
                            },
                        );
                    }
                    ChannelEventKind::NoteOn { note, velocity }
                    | ChannelEventKind::NoteOff { note, velocity } => {
                        match active.remove(&note) {
                            Some(on) => notes.push(NoteEvent {
                                number: note,
                                note_on_velocity: on.velocity,
                                note_off_velocity: velocity,
                                note_on_ticks: on.ticks,
                                note_off_ticks: ticks as u64,
                                note_on_timepoint: on.timepoint,
                                note_off_timepoint: time,
                            }),
                            None => log::trace!("dropping unmatched note-off {note} at tick {ticks}"),
                        }
                    }
                    ChannelEventKind::ControlChange {
                        controller: SUSTAIN_CONTROLLER,
                        value,
                    } => sustain.push(SustainEvent {
                        ticks: ticks as u64,
                        timepoint: time,
                        level: value,
                    }),
                    _ => {}
                },
            }
        }

        cursor = current.next();
    }

    if !active.is_empty() {
        log::debug!("{} notes never released, dropping them", active.len());
    }

    log::debug!(
        "processed {} notes, {} sustain changes, {} metronome segments over {} ticks",
        notes.len(),
        sustain.len(),
        metronome.len(),
        timeline.len()
    );

    Ok(ProcessedMidiFile {
        notes,
        sustain,
        metronome,
        timepoints,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::events::{Track, TrackEvent};
    use approx::assert_abs_diff_eq;

    fn meta(ticks: u64, event: MetaEvent) -> TrackEvent<MetaEvent> {
        TrackEvent {
            delta_ticks: 0,
            ticks,
            event,
        }
    }

    fn channel(ticks: u64, channel: u8, kind: ChannelEventKind) -> TrackEvent<ChannelEvent> {
        TrackEvent {
            delta_ticks: 0,
            ticks,
            event: ChannelEvent { channel, kind },
        }
    }

    fn on(note: u8, velocity: u8) -> ChannelEventKind {
        ChannelEventKind::NoteOn { note, velocity }
    }

    fn off(note: u8) -> ChannelEventKind {
        ChannelEventKind::NoteOff { note, velocity: 0 }
    }

    fn file(format: u16, tracks: Vec<Track>) -> MidiFile {
        MidiFile {
            format,
            ticks_per_quarter_note: 480,
            tracks,
        }
    }

    #[test]
    fn single_note_at_default_tempo() {
        let track = Track {
            midi_events: vec![channel(0, 0, on(60, 64)), channel(480, 0, off(60))],
            ..Track::default()
        };
        let processed = process_midi_file(&file(0, vec![track])).unwrap();

        assert_eq!(processed.notes.len(), 1);
        let note = processed.notes[0];
        assert_eq!(note.number, 60);
        assert_eq!(note.note_on_velocity, 64);
        assert_abs_diff_eq!(note.note_on_timepoint, 0.0);
        assert_abs_diff_eq!(note.note_off_timepoint, 0.5);
        assert_eq!(processed.timepoints.len(), 2);

        assert_eq!(processed.metronome.len(), 1);
        assert_eq!(processed.metronome[0].ticks, 0);
        assert_eq!(processed.metronome[0].settings, MetronomeSettings::new(480));
    }

    #[test]
    fn tempo_applies_from_its_tick_onward() {
        let conductor = Track {
            meta_events: vec![meta(480, MetaEvent::SetTempo(250_000))],
            ..Track::default()
        };
        let piano = Track {
            midi_events: vec![channel(0, 0, on(60, 100)), channel(960, 0, off(60))],
            ..Track::default()
        };
        let processed = process_midi_file(&file(1, vec![conductor, piano])).unwrap();

        // 480 ticks at 0.5 s/quarter, then 480 ticks at 0.25 s/quarter
        assert_abs_diff_eq!(processed.notes[0].note_off_timepoint, 0.75, epsilon = 1e-9);
        assert_eq!(processed.metronome.len(), 2);
        assert_eq!(processed.metronome[0].ticks, 0);
        assert_eq!(processed.metronome[0].settings, MetronomeSettings::new(480));
        assert_eq!(processed.metronome[1].ticks, 480);
        assert_abs_diff_eq!(processed.metronome[1].timepoint, 0.5, epsilon = 1e-9);
        assert_abs_diff_eq!(processed.metronome[1].settings.bpm(), 240.0, epsilon = 1e-9);
    }

    #[test]
    fn same_tick_changes_collapse_into_one_segment() {
        let conductor = Track {
            meta_events: vec![
                meta(0, MetaEvent::SetTempo(600_000)),
                meta(
                    0,
                    MetaEvent::TimeSignature {
                        numerator: 3,
                        denominator: 2,
                        clocks_per_click: 24,
                        thirty_seconds_per_quarter: 8,
                    },
                ),
                meta(960, MetaEvent::SetTempo(500_000)),
            ],
            ..Track::default()
        };
        let processed = process_midi_file(&file(1, vec![conductor])).unwrap();

        assert_eq!(processed.metronome.len(), 2);
        let first = processed.metronome[0].settings;
        assert_eq!((first.tempo, first.numerator), (600_000, 3));
        assert_eq!(processed.metronome[1].ticks, 960);
        assert_eq!(processed.metronome[1].settings.numerator, 3);
        assert_abs_diff_eq!(processed.metronome[1].timepoint, 1.2, epsilon = 1e-9);
    }

    #[test]
    fn velocity_zero_closes_note_on_any_channel() {
        let track = Track {
            midi_events: vec![
                channel(0, 0, on(64, 90)),
                channel(240, 5, on(64, 0)),
                channel(300, 0, off(64)),
            ],
            ..Track::default()
        };
        let processed = process_midi_file(&file(0, vec![track])).unwrap();

        assert_eq!(processed.notes.len(), 1);
        assert_eq!(processed.notes[0].note_off_ticks, 240);
        assert_eq!(processed.notes[0].note_on_velocity, 90);
    }

    #[test]
    fn retriggered_note_replaces_open_slot() {
        let track = Track {
            midi_events: vec![
                channel(0, 0, on(60, 50)),
                channel(100, 0, on(60, 70)),
                channel(200, 0, off(60)),
            ],
            ..Track::default()
        };
        let processed = process_midi_file(&file(0, vec![track])).unwrap();

        assert_eq!(processed.notes.len(), 1);
        assert_eq!(processed.notes[0].note_on_ticks, 100);
        assert_eq!(processed.notes[0].note_on_velocity, 70);
    }

    #[test]
    fn unterminated_notes_are_dropped() {
        let track = Track {
            midi_events: vec![channel(0, 0, on(60, 50)), channel(10, 0, on(61, 50)), channel(20, 0, off(61))],
            ..Track::default()
        };
        let processed = process_midi_file(&file(0, vec![track])).unwrap();
        assert_eq!(processed.notes.len(), 1);
        assert_eq!(processed.notes[0].number, 61);
    }

    #[test]
    fn sustain_levels_are_raw_controller_values() {
        let cc = |value| ChannelEventKind::ControlChange {
            controller: 64,
            value,
        };
        let track = Track {
            midi_events: vec![
                channel(0, 0, cc(127)),
                channel(480, 0, cc(0)),
                channel(480, 0, ChannelEventKind::ControlChange {
                    controller: 7,
                    value: 100,
                }),
            ],
            ..Track::default()
        };
        let processed = process_midi_file(&file(0, vec![track])).unwrap();

        assert_eq!(processed.sustain.len(), 2);
        assert_eq!(processed.sustain[0].level, 127);
        assert!(processed.sustain[0].is_down());
        assert_eq!(processed.sustain[1].level, 0);
        assert_abs_diff_eq!(processed.sustain[1].timepoint, 0.5);
    }

    #[test]
    fn format_two_is_rejected() {
        assert!(matches!(
            process_midi_file(&file(2, vec![Track::default()])),
            Err(Error::Format(_))
        ));
    }

    #[test]
    fn zero_time_division_is_rejected() {
        let track = Track {
            midi_events: vec![channel(0, 0, on(60, 64)), channel(480, 0, off(60))],
            ..Track::default()
        };
        let mut midi = file(0, vec![track]);
        midi.ticks_per_quarter_note = 0;
        assert!(matches!(process_midi_file(&midi), Err(Error::Format(_))));
    }

    #[test]
    fn settings_helpers() {
        let mut settings = MetronomeSettings::new(96);
        assert_abs_diff_eq!(settings.bpm(), 120.0);
        assert_abs_diff_eq!(settings.beat_interval(), 0.5);
        assert_eq!(settings.denominator_value(), 4);

        settings.clocks_per_click = 36;
        settings.denominator = 3;
        assert_abs_diff_eq!(settings.beat_interval(), 0.75);
        assert_eq!(settings.denominator_value(), 8);
    }
}
