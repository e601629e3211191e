//! Application-level error type.
//!
//! `DaqError` consolidates every failure the session controller and the
//! binary can surface:
//!
//! - **`Config`**: `figment` could not parse or extract the configuration.
//! - **`Configuration`**: the configuration parsed but holds invalid values.
//! - **`Io`**: reading the header or the packet stream failed.
//! - **`Header`**: the run header is not valid JSON for the header model.
//! - **`Framing`**: the packet stream is corrupt (zero or over-long length).
//! - **`Schema`**, **`Decode`**, **`Buffer`**, **`Setup`**: fatal errors from
//!   the decoding crates. Recoverable decode errors never reach this type; the dispatch
//!   loop counts them instead.
//! - **`Sink`**: the downstream consumer rejected a flush.
//!
//! By using `#[from]`, the `?` operator converts the underlying errors.

use orca_core::{BufferError, DecodeError, SchemaError, SetupError};
use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

#[derive(Error, Debug)]
pub enum DaqError {
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Run header error: {0}")]
    Header(#[from] serde_json::Error),

    /// The stream cannot be re-synchronised after a bad length word.
    #[error("Stream framing error at packet {packet_id}: {reason}")]
    Framing { packet_id: u32, reason: String },

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Buffer(#[from] BufferError),

    #[error("Buffer allocation failed: {0}")]
    Setup(#[from] SetupError),

    #[error("Buffer sink error: {0}")]
    Sink(String),
}

impl From<figment::Error> for DaqError {
    fn from(err: figment::Error) -> Self {
        DaqError::Config(Box::new(err))
    }
}
