// KDMAPI (OmniMIDI) binding used as the audio sink.
// Missing symbols degrade to no-ops instead of failing the load.

use lazy_static::lazy_static;
use libloading::{Error, Library, Symbol};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::playback::sinks::AudioSink;

const NOTE_OFF: u8 = 0x80;
const NOTE_ON: u8 = 0x90;
const CONTROL_CHANGE: u8 = 0xB0;
const SUSTAIN_CONTROLLER: u8 = 64;
const PIANO_CHANNEL: u8 = 0;
const PERCUSSION_CHANNEL: u8 = 9;
const HI_WOOD_BLOCK: u8 = 76;
const LOW_WOOD_BLOCK: u8 = 77;
/// Clicks at or above this pitch use the high wood block.
const ACCENT_FREQUENCY: f64 = 1200.0;

/// Pack a channel message the way `SendDirectData` expects it:
/// status in the low byte, then the two data bytes.
pub fn short_message(status: u8, channel: u8, data1: u8, data2: u8) -> u32 {
    u32::from(status | (channel & 0x0F))
        | (u32::from(data1 & 0x7F) << 8)
        | (u32::from(data2 & 0x7F) << 16)
}

/// The dynamic bindings for KDMAPI
pub struct KDMAPIBinds {
    is_kdmapi_available: Option<Symbol<'static, unsafe extern "C" fn() -> bool>>,
    initialize_kdmapi_stream: Option<Symbol<'static, unsafe extern "C" fn() -> i32>>,
    terminate_kdmapi_stream: Option<Symbol<'static, unsafe extern "C" fn() -> i32>>,
    send_direct_data: Option<Symbol<'static, unsafe extern "C" fn(u32) -> u32>>,

    is_stream_open: AtomicBool,
}

impl KDMAPIBinds {
    /// Calls `IsKDMAPIAvailable`
    pub fn is_kdmapi_available(&self) -> bool {
        unsafe { self.is_kdmapi_available.as_ref().is_some_and(|f| f()) }
    }

    /// Calls `InitializeKDMAPIStream`. The stream is terminated when the
    /// returned handle is dropped; only one may be open at a time.
    pub fn open_stream(&'static self) -> Result<KDMAPIStream, String> {
        if self.is_stream_open.swap(true, Ordering::AcqRel) {
            return Err("KDMAPI stream is already open".into());
        }
        let result = unsafe { self.initialize_kdmapi_stream.as_ref().map_or(0, |f| f()) };
        if result == 0 {
            self.is_stream_open.store(false, Ordering::Release);
            Err("Failed to initialize KDMAPI stream or function not found".into())
        } else {
            Ok(KDMAPIStream { binds: self })
        }
    }
}

fn load_kdmapi_lib() -> Result<Library, Error> {
    unsafe {
        #[cfg(target_os = "windows")]
        {
            let lib = Library::new("OmniMIDI\\OmniMIDI");
            if lib.is_ok() {
                return lib;
            }
            return Library::new("OmniMIDI");
        }
        #[cfg(target_os = "linux")]
        return Library::new("libOmniMIDI.so");
        #[cfg(target_os = "macos")]
        return Library::new("libOmniMIDI.dylib");
    }
}

fn load_kdmapi_binds(lib: &'static Result<Library, Error>) -> Result<KDMAPIBinds, &'static Error> {
    let lib = lib.as_ref()?;
    unsafe {
        Ok(KDMAPIBinds {
            is_kdmapi_available: lib.get(b"IsKDMAPIAvailable").ok(),
            initialize_kdmapi_stream: lib.get(b"InitializeKDMAPIStream").ok(),
            terminate_kdmapi_stream: lib.get(b"TerminateKDMAPIStream").ok(),
            send_direct_data: lib.get(b"SendDirectData").ok(),
            is_stream_open: AtomicBool::new(false),
        })
    }
}

/// An open KDMAPI stream. Calls `TerminateKDMAPIStream` when dropped.
pub struct KDMAPIStream {
    binds: &'static KDMAPIBinds,
}

impl KDMAPIStream {
    /// Calls `SendDirectData`
    pub fn send_direct_data(&self, data: u32) -> u32 {
        unsafe { self.binds.send_direct_data.as_ref().map_or(0, |f| f(data)) }
    }
}

impl AudioSink for KDMAPIStream {
    fn note_on(&mut self, number: u8, velocity: u8) {
        self.send_direct_data(short_message(NOTE_ON, PIANO_CHANNEL, number, velocity));
    }

    fn note_off(&mut self, number: u8) {
        self.send_direct_data(short_message(NOTE_OFF, PIANO_CHANNEL, number, 0));
    }

    fn set_sustain_pedal(&mut self, down: bool) {
        let value = if down { 127 } else { 0 };
        self.send_direct_data(short_message(
            CONTROL_CHANGE,
            PIANO_CHANNEL,
            SUSTAIN_CONTROLLER,
            value,
        ));
    }

    fn metronome_tick(&mut self, frequency: f64) {
        let key = if frequency >= ACCENT_FREQUENCY {
            HI_WOOD_BLOCK
        } else {
            LOW_WOOD_BLOCK
        };
        self.send_direct_data(short_message(NOTE_ON, PERCUSSION_CHANNEL, key, 100));
        self.send_direct_data(short_message(NOTE_OFF, PERCUSSION_CHANNEL, key, 0));
    }
}

impl Drop for KDMAPIStream {
    fn drop(&mut self) {
        unsafe {
            if let Some(f) = self.binds.terminate_kdmapi_stream.as_ref() {
                f();
            }
        }
        self.binds.is_stream_open.store(false, Ordering::Release);
    }
}

lazy_static! {
    static ref KDMAPI_LIB: Result<Library, Error> = load_kdmapi_lib();

    /// The dynamic library for KDMAPI. Is loaded when this field is accessed.
    pub static ref KDMAPI: Result<KDMAPIBinds, &'static Error> = load_kdmapi_binds(&KDMAPI_LIB);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_short_messages() {
        assert_eq!(short_message(NOTE_ON, 0, 60, 100), 0x0064_3C90);
        assert_eq!(short_message(NOTE_OFF, 9, 76, 0), 0x0000_4C89);
        assert_eq!(short_message(CONTROL_CHANGE, 0, 64, 127), 0x007F_40B0);
    }

    #[test]
    fn data_bytes_are_masked() {
        assert_eq!(short_message(NOTE_ON, 0x1F, 0xFF, 0x80), 0x0000_7F9F);
    }
}
