//! Standard MIDI file reading and realtime practice playback.
//!
//! Bytes go through [`read_midi_file`] into a [`MidiFile`], then
//! [`process_midi_file`] turns ticks into seconds and pairs notes. A
//! [`Player`] replays the result against a speed-scaled clock, driving
//! whatever audio, visual and scoring sinks it is given.

pub mod error;
pub mod kdmapi;
pub mod midi;
pub mod playback;
pub mod quantizer;
pub mod timeline;

pub use error::{Error, Result};
pub use midi::events::{MidiFile, Track};
pub use midi::loader::load_midi_file;
pub use midi::processor::{ProcessedMidiFile, process_midi_file};
pub use midi::reader::read_midi_file;
pub use playback::Player;
pub use quantizer::{QuantizerOptions, RoundingMode, TimeQuantizer};
pub use timeline::{Cursor, Seek, Timeline};
