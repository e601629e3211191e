//! The dispatch loop: stream -> decoder -> buffers -> sink.
//!
//! # Protocol
//!
//! ```text
//! for each packet:
//!     data id = w0 >> 18
//!     no decoder for id        -> count, skip
//!     decode_packet(..)
//!         Ok                   -> flush every buffer that filled
//!         recoverable error    -> count, log, skip packet
//!         fatal error          -> abort the run
//! end of stream: finish() flushes whatever is left
//! ```
//!
//! A buffer that fills is handed to the [`BufferSink`] and rewound before the
//! next packet is decoded, so no decoder ever sees a full buffer.

use crate::error::{AppResult, DaqError};
use crate::stream::PacketReader;
use orca_buffers::{BufferLibrary, ChannelBuffer};
use orca_core::{ChannelKey, RunHeader};
use orca_decoders::layout::data_id;
use orca_decoders::{BufferCapacities, DecoderRegistry};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Read;
use tracing::{debug, info, trace, warn};

/// Downstream consumer of full (or final, partial) channel buffers.
///
/// The sink sees committed rows `0..buffer.len()` only and must copy what it
/// needs; the buffer is rewound as soon as `flush` returns.
pub trait BufferSink {
    fn flush(&mut self, key: ChannelKey, buffer: &ChannelBuffer) -> AppResult<()>;
}

/// Sink that drops every row.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardSink;

impl BufferSink for DiscardSink {
    fn flush(&mut self, _key: ChannelKey, _buffer: &ChannelBuffer) -> AppResult<()> {
        Ok(())
    }
}

/// Sink that tallies rows and flushes per channel.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct CountingSink {
    pub rows: BTreeMap<ChannelKey, u64>,
    pub flushes: BTreeMap<ChannelKey, u64>,
}

impl CountingSink {
    pub fn total_rows(&self) -> u64 {
        self.rows.values().sum()
    }
}

impl BufferSink for CountingSink {
    fn flush(&mut self, key: ChannelKey, buffer: &ChannelBuffer) -> AppResult<()> {
        *self.rows.entry(key).or_insert(0) += buffer.len() as u64;
        *self.flushes.entry(key).or_insert(0) += 1;
        Ok(())
    }
}

/// Counters for one run.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub packets_read: u64,
    pub packets_decoded: u64,
    /// Packets whose data id has no decoder
    pub packets_skipped: u64,
    /// Packets dropped after a recoverable decode error
    pub packets_failed: u64,
    pub rows_flushed: u64,
    pub flushes: u64,
    pub unknown_data_ids: BTreeMap<u32, u64>,
    pub truncated_tail: bool,
}

/// Owns the registry and buffer library for one run.
#[derive(Debug)]
pub struct DispatchLoop<S> {
    registry: DecoderRegistry,
    buffers: BufferLibrary,
    sink: S,
    stats: DispatchStats,
}

impl<S: BufferSink> DispatchLoop<S> {
    /// Build decoders from `header` and allocate their buffers.
    pub fn from_header(
        header: &RunHeader,
        capacities: BufferCapacities,
        sink: S,
    ) -> AppResult<Self> {
        let registry = DecoderRegistry::from_header(header)?;
        Self::with_registry(registry, capacities, sink)
    }

    /// Use an already-populated registry.
    pub fn with_registry(
        registry: DecoderRegistry,
        capacities: BufferCapacities,
        sink: S,
    ) -> AppResult<Self> {
        let mut buffers = BufferLibrary::new();
        let allocated = registry.allocate_buffers(&mut buffers, capacities)?;
        info!(
            buffers = allocated,
            total_mb = buffers.memory_bytes() as f64 / (1024.0 * 1024.0),
            "Channel buffers allocated"
        );
        Ok(Self {
            registry,
            buffers,
            sink,
            stats: DispatchStats::default(),
        })
    }

    /// Decode one packet and flush any buffer it filled.
    pub fn process_packet(&mut self, packet: &[u32], packet_id: u32) -> AppResult<()> {
        self.stats.packets_read += 1;
        let Some(&word0) = packet.first() else {
            return Err(DaqError::Framing {
                packet_id,
                reason: "empty packet".to_string(),
            });
        };

        match self.registry.decode(packet, packet_id, &mut self.buffers) {
            None => {
                let id = data_id(word0);
                let count = self.stats.unknown_data_ids.entry(id).or_insert(0);
                if *count == 0 {
                    debug!(data_id = id, packet_id, "No decoder for data id");
                }
                *count += 1;
                self.stats.packets_skipped += 1;
            }
            Some(Ok(_)) => self.stats.packets_decoded += 1,
            Some(Err(e)) if e.is_recoverable() => {
                self.stats.packets_failed += 1;
                warn!(packet_id, error = %e, "Skipping packet");
            }
            Some(Err(e)) => return Err(e.into()),
        }

        for key in self.buffers.take_full() {
            self.flush_key(key)?;
        }
        Ok(())
    }

    /// Run until the stream ends, then flush the remaining rows.
    pub fn run<R: Read>(&mut self, reader: &mut PacketReader<R>) -> AppResult<&DispatchStats> {
        let mut words = Vec::new();
        while reader.read_packet(&mut words)? {
            self.process_packet(&words, reader.last_packet_id())?;
        }
        self.stats.truncated_tail = reader.truncated_tail();
        self.finish()?;
        Ok(&self.stats)
    }

    /// Flush every buffer holding committed rows.
    pub fn finish(&mut self) -> AppResult<()> {
        let pending: Vec<ChannelKey> = self
            .buffers
            .iter()
            .filter(|(_, buf)| !buf.is_empty())
            .map(|(key, _)| key)
            .collect();
        for key in pending {
            self.flush_key(key)?;
        }
        info!(
            packets = self.stats.packets_read,
            decoded = self.stats.packets_decoded,
            skipped = self.stats.packets_skipped,
            failed = self.stats.packets_failed,
            rows = self.stats.rows_flushed,
            "Dispatch finished"
        );
        Ok(())
    }

    fn flush_key(&mut self, key: ChannelKey) -> AppResult<()> {
        let buffer = self
            .buffers
            .get(key)
            .ok_or(orca_core::BufferError::NotAllocated { key })?;
        self.sink.flush(key, buffer)?;
        let rows = self.buffers.flush(key)?;
        trace!(key = key.get(), rows, "Flushed channel buffer");
        self.stats.rows_flushed += rows as u64;
        self.stats.flushes += 1;
        Ok(())
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    pub fn registry(&self) -> &DecoderRegistry {
        &self.registry
    }

    pub fn buffers(&self) -> &BufferLibrary {
        &self.buffers
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}
