use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::midi::events::MidiFile;
use crate::midi::track_data::TrackData;

const HEADER_TAG: &[u8; 4] = b"MThd";
const TRACK_TAG: &[u8; 4] = b"MTrk";

/// Big-endian reader over the chunk structure of the file.
struct Chunks<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Chunks<'a> {
    fn take(&mut self, len: usize, what: &str) -> Result<&'a [u8]> {
        let end = self.offset + len;
        if end > self.data.len() {
            return Err(Error::Format(format!(
                "file ends while reading {} at byte {}",
                what, self.offset
            )));
        }
        let data = self.data;
        let bytes = &data[self.offset..end];
        self.offset = end;
        Ok(bytes)
    }

    fn read_u16(&mut self, what: &str) -> Result<u16> {
        let bytes = self.take(2, what)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn read_u32(&mut self, what: &str) -> Result<u32> {
        let bytes = self.take(4, what)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

/// Parse a complete standard MIDI file from memory.
///
/// Only metrical (ticks per quarter note) time division is accepted.
/// Track chunks are split off sequentially and then decoded in parallel.
pub fn read_midi_file(bytes: &[u8]) -> Result<MidiFile> {
    let mut chunks = Chunks {
        data: bytes,
        offset: 0,
    };

    // Read and verify the header
    if chunks.take(4, "header tag")? != HEADER_TAG.as_slice() {
        return Err(Error::Format("not a MIDI file: missing MThd header".into()));
    }

    let header_len = chunks.read_u32("header length")?;
    if header_len != 6 {
        return Err(Error::Format(format!(
            "invalid header length {header_len}, expected 6"
        )));
    }

    let format = chunks.read_u16("format")?;
    if format > 2 {
        return Err(Error::Format(format!("unsupported MIDI format {format}")));
    }

    let num_tracks = chunks.read_u16("track count")? as usize;

    let time_div = chunks.read_u16("time division")?;
    if (time_div & 0x8000) != 0 {
        return Err(Error::Format("SMPTE timing is not supported".into()));
    }
    if time_div == 0 {
        return Err(Error::Format("time division of 0 ticks per quarter note".into()));
    }

    let mut bodies = Vec::with_capacity(num_tracks);
    for index in 0..num_tracks {
        if chunks.take(4, "track tag")? != TRACK_TAG.as_slice() {
            return Err(Error::Format(format!(
                "track {index} does not start with MTrk"
            )));
        }
        let length = chunks.read_u32("track length")? as usize;
        bodies.push(chunks.take(length, "track data")?);
    }

    let tracks = bodies
        .par_iter()
        .map(|body| TrackData::new(body).read_track())
        .collect::<Result<Vec<_>>>()?;

    for (index, track) in tracks.iter().enumerate() {
        log::debug!(
            "track {}: {} meta, {} channel, {} sysex events, name {:?}",
            index,
            track.meta_events.len(),
            track.midi_events.len(),
            track.sysex_events.len(),
            track.name()
        );
    }

    Ok(MidiFile {
        format,
        ticks_per_quarter_note: time_div,
        tracks,
    })
}
