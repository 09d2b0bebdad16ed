//! In-memory representation of a parsed standard MIDI file.

/// Stable `(code, name)` descriptor for an event variant.
///
/// For meta events the code is the meta type byte; for channel events it is
/// the status high nibble (0x8..=0xE).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventType {
    pub code: u8,
    pub name: &'static str,
}

/// Header fields plus every track, in file order.
#[derive(Debug, Clone, PartialEq)]
pub struct MidiFile {
    pub format: u16,
    pub ticks_per_quarter_note: u16,
    pub tracks: Vec<Track>,
}

impl MidiFile {
    /// Track names in track order; unnamed tracks yield `None`.
    pub fn track_names(&self) -> Vec<Option<&str>> {
        self.tracks.iter().map(Track::name).collect()
    }

    pub fn total_ticks(&self) -> u64 {
        self.tracks.iter().map(Track::total_ticks).max().unwrap_or(0)
    }
}

/// An event with its position in the track.
///
/// `ticks` is absolute from the start of the track, `delta_ticks` is the
/// delta-time read before it.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackEvent<T> {
    pub delta_ticks: u32,
    pub ticks: u64,
    pub event: T,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Track {
    pub meta_events: Vec<TrackEvent<MetaEvent>>,
    pub midi_events: Vec<TrackEvent<ChannelEvent>>,
    pub sysex_events: Vec<TrackEvent<SysexEvent>>,
}

impl Track {
    /// First track-name meta event, if any.
    pub fn name(&self) -> Option<&str> {
        self.meta_events.iter().find_map(|e| match &e.event {
            MetaEvent::Text {
                kind: TextKind::TrackName,
                text,
            } => Some(text.as_str()),
            _ => None,
        })
    }

    pub fn total_ticks(&self) -> u64 {
        let last_meta = self.meta_events.last().map_or(0, |e| e.ticks);
        let last_midi = self.midi_events.last().map_or(0, |e| e.ticks);
        let last_sysex = self.sysex_events.last().map_or(0, |e| e.ticks);
        last_meta.max(last_midi).max(last_sysex)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextKind {
    Text,
    Copyright,
    TrackName,
    InstrumentName,
    Lyric,
    Marker,
    CuePoint,
    ProgramName,
    DeviceName,
}

impl TextKind {
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0x01 => TextKind::Text,
            0x02 => TextKind::Copyright,
            0x03 => TextKind::TrackName,
            0x04 => TextKind::InstrumentName,
            0x05 => TextKind::Lyric,
            0x06 => TextKind::Marker,
            0x07 => TextKind::CuePoint,
            0x08 => TextKind::ProgramName,
            0x09 => TextKind::DeviceName,
            _ => return None,
        })
    }

    pub fn code(self) -> u8 {
        match self {
            TextKind::Text => 0x01,
            TextKind::Copyright => 0x02,
            TextKind::TrackName => 0x03,
            TextKind::InstrumentName => 0x04,
            TextKind::Lyric => 0x05,
            TextKind::Marker => 0x06,
            TextKind::CuePoint => 0x07,
            TextKind::ProgramName => 0x08,
            TextKind::DeviceName => 0x09,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TextKind::Text => "text",
            TextKind::Copyright => "copyright",
            TextKind::TrackName => "track-name",
            TextKind::InstrumentName => "instrument-name",
            TextKind::Lyric => "lyric",
            TextKind::Marker => "marker",
            TextKind::CuePoint => "cue-point",
            TextKind::ProgramName => "program-name",
            TextKind::DeviceName => "device-name",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetaEvent {
    /// `None` when the event carries no payload (number implied by track index).
    SequenceNumber(Option<u16>),
    Text { kind: TextKind, text: String },
    ChannelPrefix(u8),
    Port(u8),
    EndOfTrack,
    /// Microseconds per quarter note.
    SetTempo(u32),
    SmpteOffset {
        hours: u8,
        minutes: u8,
        seconds: u8,
        frames: u8,
        subframes: u8,
    },
    TimeSignature {
        numerator: u8,
        /// Negative power of two: 2 means a quarter note, 3 an eighth.
        denominator: u8,
        clocks_per_click: u8,
        thirty_seconds_per_quarter: u8,
    },
    KeySignature {
        /// Negative for flats, positive for sharps.
        sharps_flats: i8,
        minor: bool,
    },
    SequencerSpecific(Vec<u8>),
    Unknown { code: u8, data: Vec<u8> },
}

impl MetaEvent {
    pub fn event_type(&self) -> EventType {
        let (code, name) = match self {
            MetaEvent::SequenceNumber(_) => (0x00, "sequence-number"),
            MetaEvent::Text { kind, .. } => (kind.code(), kind.name()),
            MetaEvent::ChannelPrefix(_) => (0x20, "channel-prefix"),
            MetaEvent::Port(_) => (0x21, "port"),
            MetaEvent::EndOfTrack => (0x2F, "end-of-track"),
            MetaEvent::SetTempo(_) => (0x51, "set-tempo"),
            MetaEvent::SmpteOffset { .. } => (0x54, "smpte-offset"),
            MetaEvent::TimeSignature { .. } => (0x58, "time-signature"),
            MetaEvent::KeySignature { .. } => (0x59, "key-signature"),
            MetaEvent::SequencerSpecific(_) => (0x7F, "sequencer-specific"),
            MetaEvent::Unknown { code, .. } => (*code, "unknown"),
        };
        EventType { code, name }
    }
}

/// A channel voice message. `channel` is 0..=15.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelEvent {
    pub channel: u8,
    pub kind: ChannelEventKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelEventKind {
    NoteOff { note: u8, velocity: u8 },
    NoteOn { note: u8, velocity: u8 },
    PolyKeyPressure { note: u8, pressure: u8 },
    ControlChange { controller: u8, value: u8 },
    ProgramChange { program: u8 },
    ChannelPressure { pressure: u8 },
    /// 14-bit value, 0x2000 is centre.
    PitchBend { value: u16 },
}

impl ChannelEventKind {
    /// Data bytes following the status byte for a status high nibble.
    pub fn data_len(status_nibble: u8) -> Option<usize> {
        match status_nibble {
            0x8 | 0x9 | 0xA | 0xB | 0xE => Some(2),
            0xC | 0xD => Some(1),
            _ => None,
        }
    }
}

impl ChannelEvent {
    pub fn event_type(&self) -> EventType {
        let (code, name) = match self.kind {
            ChannelEventKind::NoteOff { .. } => (0x8, "note-off"),
            ChannelEventKind::NoteOn { .. } => (0x9, "note-on"),
            ChannelEventKind::PolyKeyPressure { .. } => (0xA, "poly-key-pressure"),
            ChannelEventKind::ControlChange { .. } => (0xB, "control-change"),
            ChannelEventKind::ProgramChange { .. } => (0xC, "program-change"),
            ChannelEventKind::ChannelPressure { .. } => (0xD, "channel-pressure"),
            ChannelEventKind::PitchBend { .. } => (0xE, "pitch-bend"),
        };
        EventType { code, name }
    }
}

/// System-exclusive payload; `status` is the byte that introduced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SysexEvent {
    pub status: u8,
    pub data: Vec<u8>,
}
