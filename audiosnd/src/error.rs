//! Error types for audiosnd
//!
//! One variant per failure kind the engine surfaces to callers. Loader
//! dispatch moves on to the next handler only for `UnsupportedCodec`,
//! `UnsupportedSource` and `NoLoader` on sources that can be reopened;
//! container and truncation errors end the dispatch.

use crate::track::metadata::MetadataError;
use thiserror::Error;

/// Main error type for the audiosnd library
#[derive(Error, Debug)]
pub enum Error {
    /// Engine operation issued before `init` or after `close`
    #[error("Audio engine is not initialized")]
    NotInited,

    /// `init` called on an already initialized engine
    #[error("Audio engine is already initialized")]
    AlreadyInited,

    /// No file matched the input under any path locator
    #[error("Source not found: {0}")]
    SourceNotFound(String),

    /// Source kind or URI scheme cannot be handled
    #[error("Unsupported source: {0}")]
    UnsupportedSource(String),

    /// No registered handler accepts the source
    #[error("No loader accepts source: {0}")]
    NoLoader(String),

    /// RIFF/WAVE framing or mandatory chunk checks failed
    #[error("Container format error: {0}")]
    ContainerFormat(String),

    /// Chunk body shorter than its advertised size
    #[error("Truncated input: {0}")]
    Truncated(String),

    /// Non-PCM payload or unknown sample width
    #[error("Unsupported codec: {0}")]
    UnsupportedCodec(String),

    /// Quantizer asked for a width outside {8, 16, 24, 32}
    #[error("Unsupported bit depth: {0}")]
    UnsupportedBitDepth(u16),

    /// Empty source set or incompatible formats
    #[error("Mixing error: {0}")]
    Mixing(String),

    /// Backend failure while opening a device
    #[error("Failed to open audio device: {0}")]
    OpenDevice(String),

    /// Backend failure while closing a device
    #[error("Failed to close audio device: {0}")]
    CloseDevice(String),

    /// Device is not in an operable status
    #[error("Audio device not ready: {0}")]
    DeviceNotReady(String),

    /// Player used before `init_player` or after `close`
    #[error("Track player is not ready")]
    PlayerNotReady,

    /// Waveform generation rejected its parameters
    #[error("Generation error: {0}")]
    Generation(String),

    /// Numeric or named setting rejected
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration store could not be read or written
    #[error("Configuration error: {0}")]
    Config(String),

    /// Writing a track to its sink failed
    #[error("Track export error: {0}")]
    TrackExport(String),

    /// No output device is available
    #[error("No audio output device available")]
    NoDevice,

    /// Track parts do not satisfy the buffer/format invariants
    #[error("Invalid track: {0}")]
    InvalidTrack(String),

    /// Remote source could not be fetched
    #[error("HTTP error: {0}")]
    Http(String),

    /// Metadata value did not match the key's declared type
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<snd_common::Error> for Error {
    fn from(err: snd_common::Error) -> Self {
        match err {
            snd_common::Error::InvalidConfig(msg) => Error::InvalidConfig(msg),
            snd_common::Error::Io(e) => Error::Io(e),
            other => Error::Config(other.to_string()),
        }
    }
}

/// Convenience Result type using the audiosnd Error
pub type Result<T> = std::result::Result<T, Error>;
