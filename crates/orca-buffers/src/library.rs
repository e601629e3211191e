//! Keyed collection of channel buffers.
//!
//! The library is pre-sized once per run, after every decoder has built its
//! schema, and is never resized while packets are being decoded. Decoders
//! borrow it `&mut` for the duration of one packet and only move cursors and
//! slot contents.
//!
//! Buffers that reach capacity during a packet are recorded so the dispatch
//! loop can flush exactly those (see [`BufferLibrary::take_full`]) before the
//! next packet is decoded.

use crate::buffer::{ChannelBuffer, RowWriter};
use orca_core::{BufferError, ChannelKey, ChannelSchema};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// ChannelKey -> ChannelBuffer, owned by the session controller.
#[derive(Debug, Default)]
pub struct BufferLibrary {
    buffers: BTreeMap<ChannelKey, ChannelBuffer>,
    became_full: Vec<ChannelKey>,
}

impl BufferLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a zeroed buffer for `key`.
    ///
    /// A key may be allocated only once per run.
    pub fn allocate(
        &mut self,
        key: ChannelKey,
        schema: Arc<ChannelSchema>,
        capacity: usize,
    ) -> Result<(), BufferError> {
        if self.buffers.contains_key(&key) {
            return Err(BufferError::DuplicateChannelKey { key });
        }
        let buffer = ChannelBuffer::new(key, schema, capacity);
        debug!(
            key = key.get(),
            crate_id = key.crate_id(),
            card = key.card(),
            channel = key.channel(),
            capacity,
            bytes = buffer.memory_bytes(),
            "Allocated channel buffer"
        );
        self.buffers.insert(key, buffer);
        Ok(())
    }

    /// Allocate one buffer per schema entry at a common capacity.
    pub fn allocate_all<'a>(
        &mut self,
        schemas: impl IntoIterator<Item = (&'a ChannelKey, &'a Arc<ChannelSchema>)>,
        capacity: usize,
    ) -> Result<usize, BufferError> {
        let mut count = 0;
        for (key, schema) in schemas {
            self.allocate(*key, Arc::clone(schema), capacity)?;
            count += 1;
        }
        info!(
            buffers = count,
            capacity,
            total_buffers = self.buffers.len(),
            total_mb = self.memory_bytes() as f64 / (1024.0 * 1024.0),
            "Allocated buffer group"
        );
        Ok(count)
    }

    pub fn contains(&self, key: ChannelKey) -> bool {
        self.buffers.contains_key(&key)
    }

    pub fn get(&self, key: ChannelKey) -> Option<&ChannelBuffer> {
        self.buffers.get(&key)
    }

    pub fn get_mut(&mut self, key: ChannelKey) -> Option<&mut ChannelBuffer> {
        self.buffers.get_mut(&key)
    }

    /// Whether the buffer for `key` is at capacity. Unallocated keys are never
    /// full.
    pub fn is_full(&self, key: ChannelKey) -> bool {
        self.buffers.get(&key).is_some_and(ChannelBuffer::is_full)
    }

    /// Write one row into the buffer for `key`.
    ///
    /// `fill` receives the open slot. If it fails, the row is discarded and
    /// the cursor stays put. On success the cursor advances and the return
    /// value says whether the buffer is now full; a buffer that fills is
    /// queued for [`take_full`](Self::take_full).
    pub fn write_row<F>(&mut self, key: ChannelKey, fill: F) -> Result<bool, BufferError>
    where
        F: FnOnce(&mut RowWriter<'_>) -> Result<(), BufferError>,
    {
        let buffer = self
            .buffers
            .get_mut(&key)
            .ok_or(BufferError::NotAllocated { key })?;
        let mut row = buffer.begin_row()?;
        fill(&mut row)?;
        let full = row.commit();
        if full {
            self.became_full.push(key);
        }
        Ok(full)
    }

    /// Keys whose buffers filled since the last call, in the order they filled.
    pub fn take_full(&mut self) -> Vec<ChannelKey> {
        std::mem::take(&mut self.became_full)
    }

    /// Rewind the cursor of `key` after its rows were handed off.
    pub fn flush(&mut self, key: ChannelKey) -> Result<usize, BufferError> {
        let buffer = self
            .buffers
            .get_mut(&key)
            .ok_or(BufferError::NotAllocated { key })?;
        let rows = buffer.len();
        buffer.reset();
        Ok(rows)
    }

    /// Committed row count for `key`.
    pub fn rows(&self, key: ChannelKey) -> Option<usize> {
        self.buffers.get(&key).map(ChannelBuffer::len)
    }

    pub fn keys(&self) -> impl Iterator<Item = ChannelKey> + '_ {
        self.buffers.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ChannelKey, &ChannelBuffer)> {
        self.buffers.iter().map(|(key, buf)| (*key, buf))
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Committed rows across every buffer.
    pub fn total_rows(&self) -> usize {
        self.buffers.values().map(ChannelBuffer::len).sum()
    }

    pub fn memory_bytes(&self) -> usize {
        self.buffers.values().map(ChannelBuffer::memory_bytes).sum()
    }
}
