//! AMI 286 liquid-nitrogen level controller.
//!
//! The controller is not a VME card; it is addressed at a fixed crate 2,
//! card 0 and always reports four levels.
//!
//! ```text
//! w0  dataId << 18 | length
//! w1  3333 2222 1111 0000 .... dddd dddd dddd   fill state of level i at bits 16+4i, device id
//! w2+2i  level i (IEEE-754)
//! w3+2i  level i unix time (s)
//! ```

use crate::decoder::{Decode, HardwareKind};
use crate::layout::{addressed_schema, require_words};
use crate::state::DecoderState;
use orca_buffers::BufferLibrary;
use orca_core::{
    decode_ieee754, get_ccc, ChannelKey, DType, DecodeResult, FieldSpec, RunHeader, SchemaError,
    SchemaMap, SchemaView,
};
use std::collections::BTreeMap;
use std::sync::Arc;

const NAME: &str = "ORAmi286DecoderForLevel";
const MODEL: &str = "Ami286Model";
const CRATE: u8 = 2;
const CARD: u8 = 0;
const LEVELS: usize = 4;
const PACKET_WORDS: usize = 2 + 2 * LEVELS;

#[derive(Debug, Clone)]
pub struct LnDecoder {
    state: DecoderState,
}

impl LnDecoder {
    pub fn new() -> Self {
        Self {
            state: DecoderState::new(NAME),
        }
    }
}

impl Default for LnDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Fill state of `level` from word 1.
#[inline]
fn fill_state(word1: u32, level: usize) -> u8 {
    ((word1 >> (16 + 4 * level)) & 0xF) as u8
}

impl Decode for LnDecoder {
    fn hardware(&self) -> HardwareKind {
        HardwareKind::Ln
    }

    fn build_schema(&mut self, header: &RunHeader) -> Result<usize, SchemaError> {
        let mut schemas = SchemaMap::new();
        if header.has_model(MODEL) {
            let template = Arc::new(
                addressed_schema()
                    .field("timestamp", FieldSpec::scalar(DType::U64).with_unit("s"))
                    .field("fillState", FieldSpec::scalar(DType::U8))
                    .field("lnLevel", FieldSpec::scalar(DType::F64))
                    .build(),
            );
            for level in 0..LEVELS as u8 {
                schemas.insert(get_ccc(CRATE, CARD, level), Arc::clone(&template));
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

        let mut last_full = false;
        for level in 0..LEVELS {
            let channel = level as u8;
            let key = get_ccc(CRATE, CARD, channel);
            if self.state.registered(key, buffers)?.is_none() {
                continue;
            }
            let fill = fill_state(packet[1], level);
            let value = decode_ieee754(packet[2 + 2 * level]);
            let timestamp = packet[3 + 2 * level];
            last_full = buffers.write_row(key, |row| {
                row.set("packet_id", packet_id)?;
                row.set("crate", CRATE)?;
                row.set("card", CARD)?;
                row.set("channel", channel)?;
                row.set("timestamp", timestamp)?;
                row.set("fillState", fill)?;
                row.set("lnLevel", value)
            })?;
        }
        Ok(last_full)
    }

    fn skipped_channels(&self) -> &BTreeMap<ChannelKey, u64> {
        self.state.skipped()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orca_buffers::Scalar;

    fn header() -> RunHeader {
        RunHeader::builder()
            .data_id(MODEL, "Level", 9, NAME)
            .build()
    }

    #[test]
    fn test_fill_state_nibbles() {
        let w1 = 0x4321_0ABC;
        assert_eq!(
            (0..4).map(|i| fill_state(w1, i)).collect::<Vec<_>>(),
            vec![1, 2, 3, 4]
        );
    }

    #[test]
    fn test_schema_requires_model_in_data_description() {
        let mut decoder = LnDecoder::new();
        assert_eq!(decoder.build_schema(&RunHeader::default()).unwrap(), 0);
        assert_eq!(decoder.build_schema(&header()).unwrap(), 4);
        assert_eq!(decoder.key_list().unwrap()[3], get_ccc(2, 0, 3));
    }

    #[test]
    fn test_decodes_four_levels() {
        let mut decoder = LnDecoder::new();
        decoder.build_schema(&header()).unwrap();
        let mut buffers = BufferLibrary::new();
        buffers
            .allocate_all(decoder.schema(None).unwrap().all().unwrap(), 8)
            .unwrap();

        let mut pkt = vec![(9 << 18) | PACKET_WORDS as u32, 0x0001_0001];
        for level in 0..4u32 {
            pkt.push((10.0 * (level + 1) as f32).to_bits());
            pkt.push(1_000 + level);
        }

        assert!(!decoder.decode_packet(&pkt, 5, &mut buffers).unwrap());
        let level2 = buffers.get(get_ccc(2, 0, 2)).unwrap();
        assert_eq!(level2.scalar("lnLevel", 0), Some(Scalar::F(30.0)));
        assert_eq!(level2.scalar("timestamp", 0), Some(Scalar::U(1_002)));
        assert_eq!(level2.scalar("fillState", 0), Some(Scalar::U(0)));
        let level0 = buffers.get(get_ccc(2, 0, 0)).unwrap();
        assert_eq!(level0.scalar("fillState", 0), Some(Scalar::U(1)));
        assert_eq!(buffers.total_rows(), 4);
    }

    #[test]
    fn test_short_packet_is_truncated() {
        let mut decoder = LnDecoder::new();
        decoder.build_schema(&header()).unwrap();
        let mut buffers = BufferLibrary::new();
        let err = decoder
            .decode_packet(&[0; PACKET_WORDS - 1], 0, &mut buffers)
            .unwrap_err();
        assert!(err.is_recoverable());
    }
}
