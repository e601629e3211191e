//! Error taxonomy for schema construction, packet decoding and buffer access.
//!
//! Errors are split by the stage at which they surface:
//!
//! - **[`SchemaError`]**: raised while building or querying a decoder's schema
//!   map. All variants are configuration-time failures and abort decoder setup.
//! - **[`BufferError`]**: raised by the buffer library when a row is written
//!   against a field that does not exist, with the wrong shape, or into a full
//!   buffer.
//! - **[`SetupError`]**: raised while allocating the buffers of a run's
//!   decoders; wraps the schema or buffer failure.
//! - **[`DecodeError`]**: raised by `decode_packet`. Use
//!   [`DecodeError::is_recoverable`] to decide whether the dispatch loop may
//!   skip the packet and continue.
//!
//! Channels that appear in a packet but are not registered for the run are not
//! errors at all: decoders skip them and count them in their
//! `skipped_channels()` map.

use crate::ccc::ChannelKey;
use thiserror::Error;

/// Convenience alias for decoder results.
pub type DecodeResult<T> = std::result::Result<T, DecodeError>;

// =============================================================================
// Schema Errors
// =============================================================================

/// Errors raised while building or querying a decoder's channel schemas.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    /// A schema or key-list query arrived before the header-driven build step.
    ///
    /// **Error Type**: Permanent for the decoder instance - indicates the
    /// controller skipped `build_schema`.
    ///
    /// **Recovery Strategy**: Build the schema from the run header first.
    #[error("Schema for decoder '{decoder}' has not been built from a run header")]
    SchemaNotBuilt { decoder: &'static str },

    /// An explicit schema lookup asked for a key this decoder does not produce.
    #[error("Decoder '{decoder}' has no schema for channel {key}")]
    UnknownChannelKey {
        decoder: &'static str,
        key: ChannelKey,
    },

    /// A header-derived sizing parameter is out of range.
    ///
    /// Occurs when, for example, a digitizer's configured trace length is zero,
    /// negative, or larger than the hardware buffer.
    ///
    /// **Error Type**: Permanent - the run header is inconsistent.
    ///
    /// **Recovery Strategy**: Abort decoder setup and report the card.
    #[error("Invalid header parameter '{parameter}' = {value} on {class_name} card {card}: {reason}")]
    InvalidHeaderParameter {
        class_name: String,
        card: u8,
        parameter: &'static str,
        value: i64,
        reason: String,
    },

    /// A card lacks a parameter its schema cannot be sized without.
    ///
    /// **Error Type**: Permanent - the run header is incomplete.
    ///
    /// **Recovery Strategy**: Abort decoder setup and report the card.
    #[error("Missing header parameter '{parameter}' on {class_name} card {card}")]
    MissingHeaderParameter {
        class_name: String,
        card: u8,
        parameter: &'static str,
    },
}

// =============================================================================
// Buffer Errors
// =============================================================================

/// Errors raised by channel buffers while a row is being written.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    /// A row was requested from a buffer whose cursor already equals its capacity.
    ///
    /// The dispatch loop must flush a buffer as soon as it reports full, so
    /// reaching this is a protocol breach, not a data error.
    #[error("Buffer for channel {key} is full ({capacity} rows) and was not flushed")]
    Overflow { key: ChannelKey, capacity: usize },

    /// The field is not part of the buffer's schema.
    #[error("Field '{field}' is not part of the schema")]
    UnknownField { field: String },

    /// A scalar was written to an array field or vice versa.
    #[error("Field '{field}' is {expected}, cannot write {actual}")]
    ShapeMismatch {
        field: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// No buffer has been allocated for this key.
    #[error("No buffer allocated for channel {key}")]
    NotAllocated { key: ChannelKey },

    /// Two decoders registered the same key.
    #[error("Channel {key} is already allocated by another decoder")]
    DuplicateChannelKey { key: ChannelKey },
}

// =============================================================================
// Setup Errors
// =============================================================================

/// Errors raised while allocating buffers for a run's decoders.
///
/// **Error Type**: Permanent - the run cannot start.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SetupError {
    /// A decoder had no schema to allocate from (never built).
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Allocation was rejected, e.g. two decoders claim the same key.
    #[error(transparent)]
    Buffer(#[from] BufferError),
}

// =============================================================================
// Decode Errors
// =============================================================================

/// Errors raised while decoding one packet.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// The packet is shorter than the bit layout requires.
    ///
    /// **Error Type**: Recoverable - the dispatch loop skips the packet.
    #[error("Truncated {decoder} packet: need {expected} words, got {actual}")]
    Truncated {
        decoder: &'static str,
        expected: usize,
        actual: usize,
    },

    /// The packet parses but its contents contradict the layout
    /// (e.g. a length field that disagrees with the slice handed in).
    ///
    /// **Error Type**: Recoverable - the dispatch loop skips the packet.
    #[error("Malformed {decoder} packet: {reason}")]
    Malformed {
        decoder: &'static str,
        reason: String,
    },

    /// Schema was queried or missing during decode.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Buffer access failed.
    #[error(transparent)]
    Buffer(#[from] BufferError),
}

impl DecodeError {
    /// Whether the dispatch loop may skip the packet and keep going.
    ///
    /// Truncated and malformed packets are data errors. Schema and buffer
    /// errors mean the controller violated the decode protocol.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Truncated { .. } | Self::Malformed { .. })
    }

    /// Shorthand used by decoders to guard word indexing.
    pub fn truncated(decoder: &'static str, expected: usize, actual: usize) -> Self {
        Self::Truncated {
            decoder,
            expected,
            actual,
        }
    }
}
