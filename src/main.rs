use std::io::BufRead;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use thousands::Separable;

use keytrainer_rs::kdmapi::KDMAPI;
use keytrainer_rs::playback::clock::SystemClock;
use keytrainer_rs::playback::{
    AudioSink, LogSink, PlaybackConfig, PlaybackControl, Player, RunOutcome, Scheduler,
};
use keytrainer_rs::{ProcessedMidiFile, load_midi_file, process_midi_file};

#[derive(Parser, Debug)]
#[command(name = "keytrainer", about = "Play a MIDI file with a metronome and practice scoring")]
struct Args {
    /// MIDI file to play
    file: PathBuf,

    /// Playback speed multiplier
    #[arg(long, default_value_t = 1.0)]
    speed: f64,

    /// Milliseconds between playback ticks
    #[arg(long, default_value_t = 5)]
    period_ms: u64,

    /// Count-in before the first beat, in seconds
    #[arg(long, default_value_t = 3.0)]
    lead_in: f64,

    /// Do not click the metronome
    #[arg(long)]
    no_metronome: bool,

    /// Only parse and print the summary
    #[arg(long)]
    dry_run: bool,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err}");
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> keytrainer_rs::Result<()> {
    let start = Instant::now();
    let file = load_midi_file(&args.file)?;
    let processed = process_midi_file(&file)?;

    let total_ms = (processed.duration() * 1000.0) as u64;
    let minutes = total_ms / 60_000;
    let seconds = (total_ms % 60_000) / 1_000;
    let millis = total_ms % 1_000;
    let event_count: usize = file
        .tracks
        .iter()
        .map(|t| t.meta_events.len() + t.midi_events.len() + t.sysex_events.len())
        .sum();

    println!(
        "Parsed MIDI Summary:\n\
     - Tracks: {}\n\
     - Events: {}\n\
     - Note Count: {}\n\
     - Sustain Changes: {}\n\
     - Tempo Segments: {}\n\
     - Total Ticks: {}\n\
     - Total Duration: {:02}:{:02}.{:03}\n\
     - Parse Time: {:.2?}",
        file.tracks.len(),
        event_count.separate_with_commas(),
        processed.note_count().separate_with_commas(),
        processed.sustain.len().separate_with_commas(),
        processed.metronome.len(),
        file.total_ticks().separate_with_commas(),
        minutes,
        seconds,
        millis,
        start.elapsed()
    );
    for (index, name) in file.track_names().iter().enumerate() {
        if let Some(name) = name {
            println!("   Track {index}: {name}");
        }
    }

    if args.dry_run {
        return Ok(());
    }

    let config = PlaybackConfig {
        lead_in: args.lead_in,
        metronome: !args.no_metronome,
        ..PlaybackConfig::default()
    };
    let control = Arc::new(PlaybackControl::new(args.speed)?);
    let period = Duration::from_millis(args.period_ms.max(1));

    // Enter on stdin stops playback.
    let stopper = Arc::clone(&control);
    std::thread::spawn(move || {
        let mut line = String::new();
        let _ = std::io::stdin().lock().read_line(&mut line);
        stopper.request_stop();
    });

    let outcome = match KDMAPI.as_ref() {
        Ok(binds) if binds.is_kdmapi_available() => match binds.open_stream() {
            Ok(stream) => play(processed, config, stream, &control, period)?,
            Err(err) => {
                log::warn!("{err}; playing without audio");
                play(processed, config, LogSink, &control, period)?
            }
        },
        _ => {
            log::warn!("KDMAPI is not available; playing without audio");
            play(processed, config, LogSink, &control, period)?
        }
    };

    match outcome {
        RunOutcome::Finished => println!("Finished."),
        RunOutcome::Stopped => println!("Stopped."),
    }
    Ok(())
}

fn play<A: AudioSink>(
    song: ProcessedMidiFile,
    config: PlaybackConfig,
    audio: A,
    control: &PlaybackControl,
    period: Duration,
) -> keytrainer_rs::Result<RunOutcome> {
    let mut player = Player::new(song, config, audio, LogSink, LogSink)?;
    let mut scheduler = Scheduler::new(SystemClock, period);
    println!("Playing (press Enter to stop)...");
    scheduler.run(&mut player, control)
}
