//! Data id -> decoder lookup built from the run header.
//!
//! The header's data description names the decoder ORCA used for every
//! record type and the data id it stamped into word 0. The registry creates
//! one [`Decoder`] per hardware family that appears there, builds its schema
//! from the same header and maps each data id to it. Unknown decoder names
//! (run records, other hardware) are ignored.

use crate::decoder::{Decode, Decoder, HardwareKind};
use crate::layout::data_id;
use orca_buffers::BufferLibrary;
use orca_core::limits::{GENERAL_BUFFER_CAPACITY, WAVEFORM_BUFFER_CAPACITY};
use orca_core::{ChannelKey, DecodeResult, RunHeader, SchemaError, SetupError};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

/// Rows per channel buffer, by family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferCapacities {
    pub general: usize,
    pub waveform: usize,
}

impl Default for BufferCapacities {
    fn default() -> Self {
        Self {
            general: GENERAL_BUFFER_CAPACITY,
            waveform: WAVEFORM_BUFFER_CAPACITY,
        }
    }
}

impl BufferCapacities {
    pub fn for_kind(&self, kind: HardwareKind) -> usize {
        if kind.is_waveform() {
            self.waveform
        } else {
            self.general
        }
    }
}

/// Decoders for one run, indexed by data id.
#[derive(Debug, Default)]
pub struct DecoderRegistry {
    decoders: Vec<Decoder>,
    by_data_id: HashMap<u32, usize>,
}

impl DecoderRegistry {
    /// Create and build a decoder for every known family in `header`.
    pub fn from_header(header: &RunHeader) -> Result<Self, SchemaError> {
        let mut registry = Self::default();
        let mut by_kind: BTreeMap<HardwareKind, usize> = BTreeMap::new();

        for entry in header.data_ids() {
            let Some(kind) = HardwareKind::from_decoder_name(entry.decoder) else {
                debug!(
                    decoder = entry.decoder,
                    model = entry.model,
                    data_id = entry.data_id,
                    "No decoder for data description entry"
                );
                continue;
            };
            let idx = match by_kind.get(&kind) {
                Some(&idx) => idx,
                None => {
                    let mut decoder = Decoder::new(kind);
                    let channels = decoder.build_schema(header)?;
                    info!(
                        hardware = %kind,
                        channels,
                        "Built decoder schema"
                    );
                    registry.decoders.push(decoder);
                    by_kind.insert(kind, registry.decoders.len() - 1);
                    registry.decoders.len() - 1
                }
            };
            registry.by_data_id.insert(entry.data_id, idx);
        }

        info!(
            decoders = registry.decoders.len(),
            data_ids = registry.by_data_id.len(),
            "Decoder registry ready"
        );
        Ok(registry)
    }

    /// Register an already-built decoder under `data_id`.
    pub fn insert(&mut self, data_id: u32, decoder: Decoder) {
        let kind = decoder.hardware();
        let idx = match self.decoders.iter().position(|d| d.hardware() == kind) {
            Some(idx) => {
                self.decoders[idx] = decoder;
                idx
            }
            None => {
                self.decoders.push(decoder);
                self.decoders.len() - 1
            }
        };
        self.by_data_id.insert(data_id, idx);
    }

    /// Allocate one buffer per schema of every decoder.
    ///
    /// Fails with `SchemaNotBuilt` for a decoder whose schema was never built,
    /// and with `DuplicateChannelKey` if two decoders claim the same key.
    pub fn allocate_buffers(
        &self,
        buffers: &mut BufferLibrary,
        capacities: BufferCapacities,
    ) -> Result<usize, SetupError> {
        let mut total = 0;
        for decoder in &self.decoders {
            if let Some(schemas) = decoder.schema(None)?.all() {
                total += buffers.allocate_all(schemas, capacities.for_kind(decoder.hardware()))?;
            }
        }
        Ok(total)
    }

    pub fn get(&self, data_id: u32) -> Option<&Decoder> {
        self.by_data_id.get(&data_id).map(|&idx| &self.decoders[idx])
    }

    pub fn get_mut(&mut self, data_id: u32) -> Option<&mut Decoder> {
        self.by_data_id
            .get(&data_id)
            .map(|&idx| &mut self.decoders[idx])
    }

    /// Decode `packet` with the decoder registered for its data id.
    ///
    /// Returns `None` when no decoder handles the data id.
    pub fn decode(
        &mut self,
        packet: &[u32],
        packet_id: u32,
        buffers: &mut BufferLibrary,
    ) -> Option<DecodeResult<bool>> {
        let id = data_id(*packet.first()?);
        let decoder = self.get_mut(id)?;
        Some(decoder.decode_packet(packet, packet_id, buffers))
    }

    pub fn decoders(&self) -> &[Decoder] {
        &self.decoders
    }

    /// Registered data ids in ascending order.
    pub fn data_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.by_data_id.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }

    /// Skipped-channel counters of every decoder, merged.
    pub fn skipped_channels(&self) -> BTreeMap<ChannelKey, u64> {
        let mut merged = BTreeMap::new();
        for decoder in &self.decoders {
            for (key, count) in decoder.skipped_channels() {
                *merged.entry(*key).or_insert(0) += count;
            }
        }
        merged
    }
}
