//! Error types for the playback engine.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// A page, section or unit outside the document. Callers are expected to
    /// clamp navigation so this never reaches a user.
    #[error("{what} {value} is out of range (1..={max})")]
    OutOfRange {
        what: &'static str,
        value: u32,
        max: u32,
    },

    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("playback failed: {0}")]
    Playback(String),

    /// The request was superseded by a newer one. Swallowed by the
    /// controller, never shown.
    #[error("request superseded")]
    Cancelled,

    #[error("unknown narrator '{0}'")]
    UnknownNarrator(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Fetch(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
