pub mod clock;
pub mod input;
pub mod player;
pub mod scheduler;
pub mod sinks;

pub use input::{InputSender, PlayerInput};
pub use player::{PlaybackConfig, PlaybackState, Player, TickOutcome};
pub use scheduler::{PlaybackControl, RunOutcome, Scheduler};
pub use sinks::{AudioSink, LogSink, NullSink, ScoreSink, VisualSink};
