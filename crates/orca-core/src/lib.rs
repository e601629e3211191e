//! `orca-core`
//!
//! Core types shared by every stage of ORCA event-stream decoding.
//!
//! ## Key Types
//!
//! - [`ChannelKey`] / [`get_ccc`]: the single (crate, card, channel) identifier
//! - [`RunHeader`]: read-only view of the run's installed hardware
//! - [`ChannelSchema`]: immutable per-channel field layout
//! - [`decode_ieee754`]: manual reconstruction of raw float words
//! - [`SchemaError`], [`DecodeError`], [`BufferError`], [`SetupError`]: the error taxonomy
//!
//! ## Example
//!
//! ```rust
//! use orca_core::{get_ccc, decode_ieee754};
//!
//! let key = get_ccc(0, 5, 3);
//! assert_eq!(key.card(), 5);
//! assert_eq!(decode_ieee754(0x3F80_0000), 1.0);
//! ```

pub mod ccc;
pub mod error;
pub mod float;
pub mod header;
pub mod limits;
pub mod schema;

pub use ccc::{get_ccc, ChannelKey};
pub use error::{BufferError, DecodeError, DecodeResult, SchemaError, SetupError};
pub use float::decode_ieee754;
pub use header::{CardInfo, CardRef, DataIdEntry, RunHeader};
pub use schema::{ChannelSchema, DType, FieldSpec, SchemaMap, SchemaView};
