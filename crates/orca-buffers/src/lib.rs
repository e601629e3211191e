//! Fixed-capacity per-channel record buffers.
//!
//! Every registered channel gets one [`ChannelBuffer`]: one typed column per
//! schema field, sized for a fixed number of rows, plus a write cursor.
//! [`BufferLibrary`] owns them all, keyed by [`orca_core::ChannelKey`].
//!
//! Capacity is the backpressure signal. When a write fills a buffer the
//! library records the key; the dispatch loop drains those keys, hands the
//! rows downstream and rewinds the cursor before decoding anything else.

pub mod buffer;
pub mod column;
pub mod library;

pub use buffer::{ChannelBuffer, RowWriter};
pub use column::{Column, ColumnData, Scalar};
pub use library::BufferLibrary;
