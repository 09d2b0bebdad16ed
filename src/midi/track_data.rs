use crate::error::{Error, Result};
use crate::midi::events::{
    ChannelEvent, ChannelEventKind, MetaEvent, SysexEvent, TextKind, Track, TrackEvent,
};

/// One decoded event, before it is filed into the track's event lists.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedEvent {
    Meta(MetaEvent),
    Channel(ChannelEvent),
    Sysex(SysexEvent),
}

/// Sequential reader over the body of one `MTrk` chunk.
pub struct TrackData<'a> {
    data: &'a [u8],
    offset: usize,
    ticks: u64,
    last_status: Option<u8>,
}

impl<'a> TrackData<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        TrackData {
            data,
            offset: 0,
            ticks: 0,
            last_status: None,
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn is_finished(&self) -> bool {
        self.offset >= self.data.len()
    }

    fn read_u8(&mut self) -> Result<u8> {
        let byte = *self.data.get(self.offset).ok_or_else(|| {
            Error::Format(format!("track data ends unexpectedly at byte {}", self.offset))
        })?;
        self.offset += 1;
        Ok(byte)
    }

    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.offset.checked_add(len).filter(|&end| end <= self.data.len());
        let end = end.ok_or_else(|| {
            Error::Format(format!(
                "event at byte {} needs {} bytes but the track has {} left",
                self.offset,
                len,
                self.data.len() - self.offset
            ))
        })?;
        let data = self.data;
        let bytes = &data[self.offset..end];
        self.offset = end;
        Ok(bytes)
    }

    /// Decode a variable-length quantity: 7 bits per byte, high bit set on
    /// every byte but the last. At most four bytes.
    pub fn decode_variable_length(&mut self) -> Result<u32> {
        let mut result = 0u32;
        for _ in 0..4 {
            let byte = self.read_u8()?;
            result = (result << 7) | u32::from(byte & 0x7F);
            if (byte & 0x80) == 0 {
                return Ok(result);
            }
        }
        Err(Error::Format(format!(
            "variable-length quantity longer than 4 bytes before byte {}",
            self.offset
        )))
    }

    /// Read the next delta-time and event. Returns `None` once the track
    /// body is exhausted.
    pub fn next_event(&mut self) -> Result<Option<TrackEvent<DecodedEvent>>> {
        if self.is_finished() {
            return Ok(None);
        }

        let delta_ticks = self.decode_variable_length()?;
        self.ticks += u64::from(delta_ticks);

        let status = self.read_u8()?;
        let event = match status {
            0xFF => DecodedEvent::Meta(self.read_meta()?),
            0xF0..=0xFE => {
                let len = self.decode_variable_length()? as usize;
                DecodedEvent::Sysex(SysexEvent {
                    status,
                    data: self.read_bytes(len)?.to_vec(),
                })
            }
            0x80..=0xEF => {
                self.last_status = Some(status);
                DecodedEvent::Channel(self.read_channel(status)?)
            }
            _ => {
                // Running status: the byte just read is data, give it back.
                let cached = self.last_status.ok_or_else(|| {
                    Error::Format(format!(
                        "data byte {:#04x} at byte {} without a running status",
                        status,
                        self.offset - 1
                    ))
                })?;
                self.offset -= 1;
                DecodedEvent::Channel(self.read_channel(cached)?)
            }
        };

        Ok(Some(TrackEvent {
            delta_ticks,
            ticks: self.ticks,
            event,
        }))
    }

    fn read_channel(&mut self, status: u8) -> Result<ChannelEvent> {
        let nibble = status >> 4;
        let channel = status & 0x0F;
        let len = ChannelEventKind::data_len(nibble).ok_or_else(|| {
            Error::Format(format!("unknown channel event status {status:#04x}"))
        })?;
        let data = self.read_bytes(len)?;

        let kind = match nibble {
            0x8 => ChannelEventKind::NoteOff {
                note: data[0],
                velocity: data[1],
            },
            0x9 => ChannelEventKind::NoteOn {
                note: data[0],
                velocity: data[1],
            },
            0xA => ChannelEventKind::PolyKeyPressure {
                note: data[0],
                pressure: data[1],
            },
            0xB => ChannelEventKind::ControlChange {
                controller: data[0],
                value: data[1],
            },
            0xC => ChannelEventKind::ProgramChange { program: data[0] },
            0xD => ChannelEventKind::ChannelPressure { pressure: data[0] },
            0xE => ChannelEventKind::PitchBend {
                value: (u16::from(data[1] & 0x7F) << 7) | u16::from(data[0] & 0x7F),
            },
            _ => {
                return Err(Error::Format(format!(
                    "unknown channel event status {status:#04x}"
                )));
            }
        };

        Ok(ChannelEvent { channel, kind })
    }

    fn read_meta(&mut self) -> Result<MetaEvent> {
        let code = self.read_u8()?;
        let len = self.decode_variable_length()? as usize;
        let payload = self.read_bytes(len)?;
        decode_meta(code, payload)
    }

    /// Decode the remaining events of the track into their three lists.
    /// Reading stops at the end-of-track meta event.
    pub fn read_track(mut self) -> Result<Track> {
        let mut track = Track::default();

        while let Some(TrackEvent {
            delta_ticks,
            ticks,
            event,
        }) = self.next_event()?
        {
            match event {
                DecodedEvent::Meta(event) => {
                    let end = event == MetaEvent::EndOfTrack;
                    track.meta_events.push(TrackEvent {
                        delta_ticks,
                        ticks,
                        event,
                    });
                    if end {
                        break;
                    }
                }
                DecodedEvent::Channel(event) => track.midi_events.push(TrackEvent {
                    delta_ticks,
                    ticks,
                    event,
                }),
                DecodedEvent::Sysex(event) => track.sysex_events.push(TrackEvent {
                    delta_ticks,
                    ticks,
                    event,
                }),
            }
        }

        Ok(track)
    }
}

fn expect_len(code: u8, payload: &[u8], len: usize) -> Result<()> {
    if payload.len() < len {
        return Err(Error::Format(format!(
            "meta event {:#04x} needs {} bytes, got {}",
            code,
            len,
            payload.len()
        )));
    }
    Ok(())
}

fn decode_meta(code: u8, payload: &[u8]) -> Result<MetaEvent> {
    if let Some(kind) = TextKind::from_code(code) {
        return Ok(MetaEvent::Text {
            kind,
            text: String::from_utf8_lossy(payload).into_owned(),
        });
    }

    let event = match code {
        0x00 => {
            if payload.is_empty() {
                MetaEvent::SequenceNumber(None)
            } else {
                expect_len(code, payload, 2)?;
                MetaEvent::SequenceNumber(Some(u16::from_be_bytes([payload[0], payload[1]])))
            }
        }
        0x20 => {
            expect_len(code, payload, 1)?;
            MetaEvent::ChannelPrefix(payload[0])
        }
        0x21 => {
            expect_len(code, payload, 1)?;
            MetaEvent::Port(payload[0])
        }
        0x2F => MetaEvent::EndOfTrack,
        0x51 => {
            expect_len(code, payload, 3)?;
            // 24-bit big-endian microseconds per quarter note
            MetaEvent::SetTempo(
                (u32::from(payload[0]) << 16) | (u32::from(payload[1]) << 8) | u32::from(payload[2]),
            )
        }
        0x54 => {
            expect_len(code, payload, 5)?;
            MetaEvent::SmpteOffset {
                hours: payload[0],
                minutes: payload[1],
                seconds: payload[2],
                frames: payload[3],
                subframes: payload[4],
            }
        }
        0x58 => {
            expect_len(code, payload, 4)?;
            MetaEvent::TimeSignature {
                numerator: payload[0],
                denominator: payload[1],
                clocks_per_click: payload[2],
                thirty_seconds_per_quarter: payload[3],
            }
        }
        0x59 => {
            expect_len(code, payload, 2)?;
            MetaEvent::KeySignature {
                sharps_flats: payload[0] as i8,
                minor: payload[1] != 0,
            }
        }
        0x7F => MetaEvent::SequencerSpecific(payload.to_vec()),
        _ => MetaEvent::Unknown {
            code,
            data: payload.to_vec(),
        },
    };

    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_variable_length_quantities() {
        let cases: [(&[u8], u32); 6] = [
            (&[0x00], 0),
            (&[0x40], 0x40),
            (&[0x7F], 0x7F),
            (&[0x81, 0x00], 0x80),
            (&[0x83, 0x60], 480),
            (&[0xFF, 0xFF, 0xFF, 0x7F], 0x0FFF_FFFF),
        ];
        for (bytes, expected) in cases {
            let mut track = TrackData::new(bytes);
            assert_eq!(track.decode_variable_length().unwrap(), expected);
            assert!(track.is_finished());
        }
    }

    #[test]
    fn rejects_overlong_quantity() {
        let mut track = TrackData::new(&[0x81, 0x81, 0x81, 0x81, 0x00]);
        assert!(matches!(
            track.decode_variable_length(),
            Err(Error::Format(_))
        ));
    }

    #[test]
    fn running_status_reuses_cached_status() {
        // note-on ch 2, then two more note-ons without a status byte
        let bytes = [
            0x00, 0x92, 60, 100, //
            0x10, 62, 90, //
            0x10, 60, 0,
        ];
        let track = TrackData::new(&bytes).read_track().unwrap();
        assert_eq!(track.midi_events.len(), 3);

        let second = &track.midi_events[1];
        assert_eq!(second.delta_ticks, 0x10);
        assert_eq!(second.ticks, 0x10);
        assert_eq!(
            second.event,
            ChannelEvent {
                channel: 2,
                kind: ChannelEventKind::NoteOn {
                    note: 62,
                    velocity: 90
                }
            }
        );
        assert_eq!(track.midi_events[2].ticks, 0x20);
    }

    #[test]
    fn data_byte_without_status_fails() {
        let bytes = [0x00, 0x3C, 0x40];
        let mut track = TrackData::new(&bytes);
        assert!(matches!(track.next_event(), Err(Error::Format(_))));
    }

    #[test]
    fn one_byte_channel_events() {
        let bytes = [0x00, 0xC1, 5, 0x00, 0xD1, 77, 0x00, 0xE1, 0x00, 0x40];
        let track = TrackData::new(&bytes).read_track().unwrap();
        let kinds: Vec<_> = track.midi_events.iter().map(|e| e.event.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ChannelEventKind::ProgramChange { program: 5 },
                ChannelEventKind::ChannelPressure { pressure: 77 },
                ChannelEventKind::PitchBend { value: 0x2000 },
            ]
        );
    }

    #[test]
    fn decodes_meta_payloads() {
        let bytes = [
            0x00, 0xFF, 0x51, 0x03, 0x07, 0xA1, 0x20, // tempo 500000
            0x00, 0xFF, 0x58, 0x04, 0x06, 0x03, 0x18, 0x08, // 6/8
            0x00, 0xFF, 0x59, 0x02, 0xFD, 0x01, // 3 flats, minor
            0x00, 0xFF, 0x03, 0x05, b'P', b'i', b'a', b'n', b'o', //
            0x00, 0xFF, 0x54, 0x05, 1, 2, 3, 4, 5, //
            0x00, 0xFF, 0x60, 0x01, 0xAA, //
            0x00, 0xFF, 0x2F, 0x00,
        ];
        let track = TrackData::new(&bytes).read_track().unwrap();
        let events: Vec<_> = track.meta_events.iter().map(|e| e.event.clone()).collect();
        assert_eq!(events[0], MetaEvent::SetTempo(500_000));
        assert_eq!(
            events[1],
            MetaEvent::TimeSignature {
                numerator: 6,
                denominator: 3,
                clocks_per_click: 24,
                thirty_seconds_per_quarter: 8
            }
        );
        assert_eq!(
            events[2],
            MetaEvent::KeySignature {
                sharps_flats: -3,
                minor: true
            }
        );
        assert_eq!(track.name(), Some("Piano"));
        assert_eq!(events[4].event_type().name, "smpte-offset");
        assert_eq!(
            events[5],
            MetaEvent::Unknown {
                code: 0x60,
                data: vec![0xAA]
            }
        );
        assert_eq!(events[6], MetaEvent::EndOfTrack);
    }

    #[test]
    fn sysex_is_kept_raw() {
        let bytes = [0x00, 0xF0, 0x03, 0x7E, 0x7F, 0xF7];
        let track = TrackData::new(&bytes).read_track().unwrap();
        assert_eq!(
            track.sysex_events[0].event,
            SysexEvent {
                status: 0xF0,
                data: vec![0x7E, 0x7F, 0xF7]
            }
        );
    }

    #[test]
    fn truncated_event_fails() {
        let bytes = [0x00, 0x90, 60];
        assert!(matches!(
            TrackData::new(&bytes).read_track(),
            Err(Error::Format(_))
        ));
    }

    #[test]
    fn short_tempo_payload_fails() {
        let bytes = [0x00, 0xFF, 0x51, 0x02, 0x07, 0xA1];
        assert!(matches!(
            TrackData::new(&bytes).read_track(),
            Err(Error::Format(_))
        ));
    }
}
