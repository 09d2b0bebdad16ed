//! Error types shared by the reader, processor, timeline and quantizer.
//!
//! Every error is raised synchronously where the violation is detected and
//! aborts the operation as a whole; nothing here is retried.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or unsupported MIDI data.
    ///
    /// ```
    /// # use keytrainer_rs::Error;
    /// let err = Error::Format("expected MThd header".to_string());
    /// assert_eq!(err.to_string(), "Invalid MIDI data: expected MThd header");
    /// ```
    #[error("Invalid MIDI data: {0}")]
    Format(String),

    /// A component was constructed with options it cannot work with.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// A value outside the domain an operation accepts.
    #[error("Domain error: {0}")]
    Domain(String),

    /// The file source failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
