//! SIS3316 16-channel waveform digitizer.
//!
//! # Packet Layout
//!
//! The packet is read as a stream of 16-bit half-words, low half of each
//! 32-bit word first.
//!
//! ```text
//! half-words 0..54     event header (27 words)
//!     w1   crate 21..25, card 16..21, channel 8..16
//!     w10  timestamp high bits in the upper half
//!     w11  timestamp low 32 bits
//! half-words 54..      samples
//! ```
//!
//! # Doubled Packets
//!
//! ORCA occasionally ships two events in one packet. When the packet holds
//! more samples than the channel's trace length the first `trace_length`
//! samples form the first row, and a second event header starts right after
//! them at half-word `54 + trace_length`, followed by its own samples:
//!
//! ```text
//! | header 1 (54) | trace 1 (L) | header 2 (54) | trace 2 (L) |
//! ```
//!
//! The second event is written into a new row of the same buffer with the
//! crate, card, channel and timestamp read from its own header. It is dropped
//! (and counted) when the first row filled the buffer or when the packet is
//! too short to hold it.

use crate::decoder::{Decode, HardwareKind};
use crate::layout::{addressed_schema, require_words, vme_crate_card};
use crate::state::DecoderState;
use orca_buffers::BufferLibrary;
use orca_core::limits::{validate_trace_length, DEFAULT_TRACE_LENGTH};
use orca_core::{
    get_ccc, ChannelKey, DType, DecodeError, DecodeResult, FieldSpec, RunHeader, SchemaError,
    SchemaMap, SchemaView,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

const NAME: &str = "ORSIS3316WaveformDecoder";
const CLASS_NAME: &str = "ORSIS3316Model";
const CHANNELS: u8 = 16;
/// Event header length in 16-bit half-words.
pub const HEADER_HALF_WORDS: usize = 54;
const HEADER_WORDS: usize = HEADER_HALF_WORDS / 2;
/// Sample period of the 125 MHz ADC clock.
const SAMPLE_PERIOD_NS: f64 = 8.0;

/// Addressing fields of one event header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct EventHeader {
    crate_id: u8,
    card: u8,
    channel: u8,
    timestamp: u64,
}

impl EventHeader {
    /// Parse the header whose first half-word is `halves[base]`.
    ///
    /// `base` need not be word aligned; header words are reassembled from
    /// consecutive half-words. The caller guarantees 54 half-words are present.
    fn parse(halves: &[u16], base: usize) -> Self {
        let word = |n: usize| -> u32 {
            let lo = u32::from(halves[base + 2 * n]);
            let hi = u32::from(halves[base + 2 * n + 1]);
            lo | (hi << 16)
        };
        let w1 = word(1);
        let (crate_id, card) = vme_crate_card(w1);
        Self {
            crate_id,
            card,
            channel: ((w1 >> 8) & 0xFF) as u8,
            timestamp: timestamp(word(10), word(11)),
        }
    }
}

/// 48-bit timestamp: low 32 bits from w11, high 16 from the top of w10.
#[inline]
fn timestamp(w10: u32, w11: u32) -> u64 {
    u64::from(w11) + (u64::from(w10 & 0xFFFF_0000) << 16)
}

/// Split words into half-words, low half first.
fn half_words(packet: &[u32]) -> Vec<u16> {
    packet
        .iter()
        .flat_map(|w| [(w & 0xFFFF) as u16, (w >> 16) as u16])
        .collect()
}

#[derive(Debug, Clone)]
pub struct Sis3316Decoder {
    state: DecoderState,
    dropped_second_events: u64,
}

impl Sis3316Decoder {
    pub fn new() -> Self {
        Self {
            state: DecoderState::new(NAME),
            dropped_second_events: 0,
        }
    }

    /// Second events of doubled packets that could not be stored.
    pub fn dropped_second_events(&self) -> u64 {
        self.dropped_second_events
    }

    fn write_event(
        buffers: &mut BufferLibrary,
        key: ChannelKey,
        packet_id: u32,
        event: EventHeader,
        samples: &[u16],
    ) -> DecodeResult<bool> {
        Ok(buffers.write_row(key, |row| {
            row.set("packet_id", packet_id)?;
            row.set("crate", event.crate_id)?;
            row.set("card", event.card)?;
            row.set("channel", event.channel)?;
            row.set("timestamp", event.timestamp)?;
            row.set_samples("waveform", samples)
        })?)
    }
}

impl Default for Sis3316Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decode for Sis3316Decoder {
    fn hardware(&self) -> HardwareKind {
        HardwareKind::Sis3316
    }

    fn build_schema(&mut self, header: &RunHeader) -> Result<usize, SchemaError> {
        let template = addressed_schema()
            .field(
                "timestamp",
                FieldSpec::scalar(DType::U64).with_unit("clock_ticks"),
            )
            .field(
                "waveform",
                FieldSpec::waveform(DType::U16, DEFAULT_TRACE_LENGTH, SAMPLE_PERIOD_NS),
            )
            .build();

        let mut schemas = SchemaMap::new();
        for card in header.cards_of_class(CLASS_NAME) {
            let requested = card.info.raw_data_buffer_len.ok_or_else(|| {
                SchemaError::MissingHeaderParameter {
                    class_name: CLASS_NAME.to_string(),
                    card: card.info.card,
                    parameter: "rawDataBufferLen",
                }
            })?;
            let trace_length = validate_trace_length(requested).map_err(|reason| {
                SchemaError::InvalidHeaderParameter {
                    class_name: CLASS_NAME.to_string(),
                    card: card.info.card,
                    parameter: "rawDataBufferLen",
                    value: requested,
                    reason,
                }
            })?;
            let schema = Arc::new(template.with_array_length("waveform", trace_length));
            for channel in 0..CHANNELS {
                schemas.insert(
                    get_ccc(card.crate_id, card.info.card, channel),
                    Arc::clone(&schema),
                );
            }
        }
        self.dropped_second_events = 0;
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
        require_words(NAME, packet, HEADER_WORDS)?;

        let halves = half_words(packet);
        let first = EventHeader::parse(&halves, 0);
        let key = get_ccc(first.crate_id, first.card, first.channel);
        let Some(schema) = self.state.registered(key, buffers)? else {
            return Ok(false);
        };
        let trace_length = schema
            .field("waveform")
            .and_then(|spec| spec.length)
            .ok_or_else(|| DecodeError::Malformed {
                decoder: NAME,
                reason: format!("schema for channel {key} has no waveform length"),
            })?;

        let available = halves.len() - HEADER_HALF_WORDS;
        if available < trace_length {
            return Err(DecodeError::truncated(
                NAME,
                HEADER_WORDS + trace_length.div_ceil(2),
                packet.len(),
            ));
        }

        let first_start = HEADER_HALF_WORDS;
        let mut full = Self::write_event(
            buffers,
            key,
            packet_id,
            first,
            &halves[first_start..first_start + trace_length],
        )?;

        if available > trace_length {
            let second_base = HEADER_HALF_WORDS + trace_length;
            let second_start = second_base + HEADER_HALF_WORDS;
            if full {
                self.dropped_second_events += 1;
                debug!(
                    key = key.get(),
                    packet_id, "Buffer filled by first event of doubled packet, dropping second"
                );
            } else if halves.len() < second_start + trace_length {
                self.dropped_second_events += 1;
                warn!(
                    key = key.get(),
                    packet_id,
                    half_words = halves.len(),
                    needed = second_start + trace_length,
                    "Doubled packet too short for second event, dropping it"
                );
            } else {
                let second = EventHeader::parse(&halves, second_base);
                full = Self::write_event(
                    buffers,
                    key,
                    packet_id,
                    second,
                    &halves[second_start..second_start + trace_length],
                )?;
            }
        }
        Ok(full)
    }

    fn skipped_channels(&self) -> &BTreeMap<ChannelKey, u64> {
        self.state.skipped()
    }
}
