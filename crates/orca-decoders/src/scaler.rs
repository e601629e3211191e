//! SIS3820 32-channel scaler.
//!
//! ```text
//! w0  dataId << 18 | length
//! w1  crate 21..25, card 16..21, bit 0 set for SIS3820
//! w2  read time (unix s)
//! w3  previous read time (0 on first sample)
//! w4  count-enable mask
//! w5  overflow mask
//! w6  options
//! w7+i  counts for channel i, i in 0..32
//! ```
//!
//! Every channel shares the read time of w2.

use crate::decoder::{Decode, HardwareKind};
use crate::layout::{addressed_schema, require_words, vme_crate_card};
use crate::state::DecoderState;
use orca_buffers::BufferLibrary;
use orca_core::{
    get_ccc, ChannelKey, DType, DecodeResult, FieldSpec, RunHeader, SchemaError, SchemaMap,
    SchemaView,
};
use std::collections::BTreeMap;
use std::sync::Arc;

const NAME: &str = "ORSIS3820DecoderForCounts";
const CLASS_NAME: &str = "ORSIS3820Model";
const CHANNELS: usize = 32;
const FIRST_COUNT_WORD: usize = 7;
const PACKET_WORDS: usize = FIRST_COUNT_WORD + CHANNELS;

#[derive(Debug, Clone)]
pub struct ScalerDecoder {
    state: DecoderState,
}

impl ScalerDecoder {
    pub fn new() -> Self {
        Self {
            state: DecoderState::new(NAME),
        }
    }
}

impl Default for ScalerDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decode for ScalerDecoder {
    fn hardware(&self) -> HardwareKind {
        HardwareKind::Scaler
    }

    fn build_schema(&mut self, header: &RunHeader) -> Result<usize, SchemaError> {
        let template = Arc::new(
            addressed_schema()
                .field("timestamp", FieldSpec::scalar(DType::U64).with_unit("s"))
                .field("counts", FieldSpec::scalar(DType::U32))
                .build(),
        );
        let mut schemas = SchemaMap::new();
        for card in header.cards_of_class(CLASS_NAME) {
            for channel in 0..CHANNELS as u8 {
                schemas.insert(
                    get_ccc(card.crate_id, card.info.card, channel),
                    Arc::clone(&template),
                );
            }
        }
        Ok(self.state.install(schemas))
    }

    fn key_list(&self) -> Result<Vec<ChannelKey>, SchemaError> {
        self.state.key_list()
    }

    fn schema(&self, key: Option<ChannelKey>) -> Result<SchemaView<'_>, SchemaError> {
        self.state.schema(key)
    }

    fn decode_packet(
        &mut self,
        packet: &[u32],
        packet_id: u32,
        buffers: &mut BufferLibrary,
    ) -> DecodeResult<bool> {
        self.state.schemas()?;
        require_words(NAME, packet, PACKET_WORDS)?;

        let (crate_id, card) = vme_crate_card(packet[1]);
        let timestamp = packet[2];
        let counts = &packet[FIRST_COUNT_WORD..PACKET_WORDS];

        let mut last_full = false;
        for (i, &count) in counts.iter().enumerate() {
            let channel = i as u8;
            let key = get_ccc(crate_id, card, channel);
            if self.state.registered(key, buffers)?.is_none() {
                continue;
            }
            last_full = buffers.write_row(key, |row| {
                row.set("packet_id", packet_id)?;
                row.set("crate", crate_id)?;
                row.set("card", card)?;
                row.set("channel", channel)?;
                row.set("timestamp", timestamp)?;
                row.set("counts", count)
            })?;
        }
        Ok(last_full)
    }

    fn skipped_channels(&self) -> &BTreeMap<ChannelKey, u64> {
        self.state.skipped()
    }
}
