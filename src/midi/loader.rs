use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::error::Result;
use crate::midi::events::MidiFile;
use crate::midi::reader::read_midi_file;

/// Read the whole file into memory.
pub fn load_midi_bytes<P: AsRef<Path>>(filename: P) -> Result<Vec<u8>> {
    let file = File::open(&filename)?;
    let mut reader = BufReader::new(file);

    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    Ok(bytes)
}

/// Load and parse a MIDI file.
pub fn load_midi_file<P: AsRef<Path>>(filename: P) -> Result<MidiFile> {
    let bytes = load_midi_bytes(&filename)?;
    let file = read_midi_file(&bytes)?;

    log::info!(
        "Loaded {}: format {}, {} tracks, {} ticks per quarter note",
        filename.as_ref().display(),
        file.format,
        file.tracks.len(),
        file.ticks_per_quarter_note
    );

    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn missing_file_is_an_io_error() {
        let err = load_midi_file("/nonexistent/definitely/missing.mid").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn loads_file_from_disk() {
        let mut bytes = b"MThd".to_vec();
        bytes.extend_from_slice(&[0, 0, 0, 6, 0, 0, 0, 1, 0x01, 0xE0]);
        bytes.extend_from_slice(b"MTrk");
        bytes.extend_from_slice(&[0, 0, 0, 4, 0x00, 0xFF, 0x2F, 0x00]);

        let path = std::env::temp_dir().join(format!("keytrainer-loader-{}.mid", std::process::id()));
        std::fs::write(&path, &bytes).unwrap();
        let file = load_midi_file(&path);
        std::fs::remove_file(&path).unwrap();

        let file = file.unwrap();
        assert_eq!(file.ticks_per_quarter_note, 480);
        assert_eq!(file.tracks.len(), 1);
    }
}
