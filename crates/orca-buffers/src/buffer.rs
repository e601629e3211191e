//! Fixed-capacity columnar buffer for one channel.
//!
//! # Row Protocol
//!
//! ```text
//! 1. begin_row()          fails with Overflow when cursor == capacity
//! 2. RowWriter::set(..)   any number of field writes into the slot at cursor
//! 3. RowWriter::commit()  advances the cursor, returns is_full()
//! ```
//!
//! A `RowWriter` dropped without `commit()` leaves the cursor where it was, so
//! a decoder that bails out half-way through a row (truncated packet) never
//! publishes a partial record. The slot contents it already wrote are simply
//! overwritten by the next row.

use crate::column::{Column, Scalar};
use orca_core::{BufferError, ChannelKey, ChannelSchema};
use std::sync::Arc;

/// Columnar storage plus write cursor for one channel key.
#[derive(Debug, Clone)]
pub struct ChannelBuffer {
    key: ChannelKey,
    schema: Arc<ChannelSchema>,
    columns: Vec<Column>,
    capacity: usize,
    cursor: usize,
}

impl ChannelBuffer {
    /// Allocate zeroed storage for `capacity` rows of `schema`.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0; a zero-row buffer would report full before
    /// its first write.
    pub fn new(key: ChannelKey, schema: Arc<ChannelSchema>, capacity: usize) -> Self {
        assert!(capacity > 0, "ChannelBuffer capacity must be > 0");
        let columns = schema
            .fields()
            .map(|(name, spec)| Column::new(name, spec.clone(), capacity))
            .collect();
        Self {
            key,
            schema,
            columns,
            capacity,
            cursor: 0,
        }
    }

    pub fn key(&self) -> ChannelKey {
        self.key
    }

    pub fn schema(&self) -> &Arc<ChannelSchema> {
        &self.schema
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Index of the next slot to be written; equals the committed row count.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.cursor == 0
    }

    pub fn is_full(&self) -> bool {
        self.cursor == self.capacity
    }

    pub fn remaining(&self) -> usize {
        self.capacity - self.cursor
    }

    /// Open the slot at the cursor for writing.
    pub fn begin_row(&mut self) -> Result<RowWriter<'_>, BufferError> {
        if self.is_full() {
            return Err(BufferError::Overflow {
                key: self.key,
                capacity: self.capacity,
            });
        }
        Ok(RowWriter { buffer: self })
    }

    /// Rewind the cursor after the committed rows have been handed off.
    ///
    /// Storage is kept; stale rows are overwritten on the next pass.
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.schema.index_of(name).map(|idx| &self.columns[idx])
    }

    /// Committed scalar value of `field` at `row`.
    pub fn scalar(&self, field: &str, row: usize) -> Option<Scalar> {
        if row >= self.cursor {
            return None;
        }
        self.column(field)?.scalar(row)
    }

    /// Committed samples of array `field` at `row`.
    pub fn samples(&self, field: &str, row: usize) -> Option<&[u16]> {
        if row >= self.cursor {
            return None;
        }
        self.column(field)?.samples(row)
    }

    /// Bytes held by all columns at full capacity.
    pub fn memory_bytes(&self) -> usize {
        self.columns.iter().map(Column::memory_bytes).sum()
    }

    fn column_mut(&mut self, field: &str) -> Result<&mut Column, BufferError> {
        let idx = self
            .schema
            .index_of(field)
            .ok_or_else(|| BufferError::UnknownField {
                field: field.to_string(),
            })?;
        Ok(&mut self.columns[idx])
    }
}

/// Write access to the slot at a buffer's cursor.
#[derive(Debug)]
pub struct RowWriter<'a> {
    buffer: &'a mut ChannelBuffer,
}

impl RowWriter<'_> {
    /// Index of the slot being written.
    pub fn row(&self) -> usize {
        self.buffer.cursor
    }

    pub fn key(&self) -> ChannelKey {
        self.buffer.key
    }

    /// Write a scalar field of the current slot.
    pub fn set(&mut self, field: &str, value: impl Into<Scalar>) -> Result<(), BufferError> {
        let row = self.buffer.cursor;
        self.buffer.column_mut(field)?.set_scalar(row, value.into())
    }

    /// Write an array field of the current slot.
    pub fn set_samples(&mut self, field: &str, samples: &[u16]) -> Result<(), BufferError> {
        let row = self.buffer.cursor;
        self.buffer.column_mut(field)?.set_samples(row, samples)
    }

    /// Publish the row and advance the cursor. Returns whether the buffer is
    /// now full.
    pub fn commit(self) -> bool {
        self.buffer.cursor += 1;
        self.buffer.is_full()
    }
}
