//! CAEN V792 / V792N charge-to-digital converter.
//!
//! ```text
//! w0  dataId << 18 | length
//! w1  crate 20..24, card 16..20, bit 0 = timestamp words present
//! [w2 seconds, w3 microseconds]              only when bit 0 is set
//! data words up to w[length-2]:  channel (w >> 17) & 0x3F, energy w & 0xFFF
//! w[length-1]  event counter
//! ```
//!
//! One packet holds one gate: every data word is a separate row for its
//! channel, all sharing the timestamps and event counter. Without timestamp
//! words both timestamps are recorded as -1.

use crate::decoder::{Decode, HardwareKind};
use crate::layout::{addressed_schema, packet_length, require_words};
use crate::state::DecoderState;
use orca_buffers::BufferLibrary;
use orca_core::{
    get_ccc, ChannelKey, DType, DecodeError, DecodeResult, FieldSpec, RunHeader, SchemaError,
    SchemaMap, SchemaView,
};
use std::collections::BTreeMap;
use std::sync::Arc;

const NAME: &str = "ORCAEN792NDecoderForQdc";
const CLASS_NAME: &str = "ORCaen792Model";
const DEFAULT_CHANNELS: u16 = 16;
/// The channel field of a data word is six bits wide.
const MAX_CHANNELS: u16 = 64;
/// The card field in word 1 is four bits wide.
const MAX_CARD: u8 = 15;
/// Timestamp value recorded when the packet carries none.
pub const NO_TIMESTAMP: i64 = -1;

#[derive(Debug, Clone)]
pub struct QdcDecoder {
    state: DecoderState,
}

impl QdcDecoder {
    pub fn new() -> Self {
        Self {
            state: DecoderState::new(NAME),
        }
    }
}

impl Default for QdcDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Decoded `(channel, energy)` of one data word.
#[inline]
fn data_word(word: u32) -> (u8, u16) {
    (((word >> 17) & 0x3F) as u8, (word & 0xFFF) as u16)
}

impl Decode for QdcDecoder {
    fn hardware(&self) -> HardwareKind {
        HardwareKind::Qdc
    }

    fn build_schema(&mut self, header: &RunHeader) -> Result<usize, SchemaError> {
        let template = Arc::new(
            addressed_schema()
                .field("timestamp", FieldSpec::scalar(DType::I64).with_unit("s"))
                .field("timestampMicro", FieldSpec::scalar(DType::I64).with_unit("us"))
                .field("energy", FieldSpec::scalar(DType::U16).with_unit("adc"))
                .field("eventCounter", FieldSpec::scalar(DType::U32))
                .build(),
        );
        let mut schemas = SchemaMap::new();
        for card in header.cards_of_class(CLASS_NAME) {
            if card.info.card > MAX_CARD {
                return Err(SchemaError::InvalidHeaderParameter {
                    class_name: CLASS_NAME.to_string(),
                    card: card.info.card,
                    parameter: "Card",
                    value: i64::from(card.info.card),
                    reason: format!("packets address at most card {MAX_CARD}"),
                });
            }
            let channels = card.info.channel_count.unwrap_or(DEFAULT_CHANNELS);
            if channels == 0 || channels > MAX_CHANNELS {
                return Err(SchemaError::InvalidHeaderParameter {
                    class_name: CLASS_NAME.to_string(),
                    card: card.info.card,
                    parameter: "channelCount",
                    value: i64::from(channels),
                    reason: format!("must be between 1 and {MAX_CHANNELS}"),
                });
            }
            for channel in 0..channels as u8 {
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
        require_words(NAME, packet, 2)?;

        let length = packet_length(packet[0]);
        require_words(NAME, packet, length)?;
        let crate_id = ((packet[1] >> 20) & 0xF) as u8;
        let card = ((packet[1] >> 16) & 0xF) as u8;
        let has_timestamp = packet[1] & 0x1 == 1;
        let data_start = if has_timestamp { 4 } else { 2 };
        if length < data_start + 1 {
            return Err(DecodeError::Malformed {
                decoder: NAME,
                reason: format!(
                    "length {length} leaves no room for the event counter after word {data_start}"
                ),
            });
        }
        let (timestamp, micro) = if has_timestamp {
            (i64::from(packet[2]), i64::from(packet[3]))
        } else {
            (NO_TIMESTAMP, NO_TIMESTAMP)
        };
        let event_counter = packet[length - 1];

        let mut last_full = false;
        for &word in &packet[data_start..length - 1] {
            let (channel, energy) = data_word(word);
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
                row.set("timestampMicro", micro)?;
                row.set("energy", energy)?;
                row.set("eventCounter", event_counter)
            })?;
        }
        Ok(last_full)
    }

    fn skipped_channels(&self) -> &BTreeMap<ChannelKey, u64> {
        self.state.skipped()
    }
}
