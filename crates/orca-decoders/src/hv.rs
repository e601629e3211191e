//! iSeg EHS8260p high-voltage card readout.
//!
//! ```text
//! w0  dataId << 18 | length
//! w1  ........ .CCC Cccc cc.. .... NNNN ....   crate 21..25, card 16..21, channel count 4..8
//! w2  spare
//! w3  spare
//! w4  unix time (s)
//! w5+2i  channel i voltage (IEEE-754)
//! w6+2i  channel i current (IEEE-754)
//! ```

use crate::decoder::{Decode, HardwareKind};
use crate::layout::{addressed_schema, require_words, vme_crate_card};
use crate::state::DecoderState;
use orca_buffers::BufferLibrary;
use orca_core::{
    decode_ieee754, get_ccc, ChannelKey, ChannelSchema, DType, DecodeResult, FieldSpec, RunHeader,
    SchemaError, SchemaMap, SchemaView,
};
use std::collections::BTreeMap;
use std::sync::Arc;

const NAME: &str = "ORiSegHVCardDecoderForHV";
const CLASS_NAME: &str = "OREHS8260pModel";
const FIRST_CHANNEL_WORD: usize = 5;
/// Channels reported when the header lists neither targets nor a count.
const DEFAULT_CHANNELS: usize = 8;
/// The channel-count field in word 1 is four bits wide.
const MAX_CHANNELS: usize = 15;

#[derive(Debug, Clone)]
pub struct HvDecoder {
    state: DecoderState,
}

impl HvDecoder {
    pub fn new() -> Self {
        Self {
            state: DecoderState::new(NAME),
        }
    }

    fn template() -> Arc<ChannelSchema> {
        Arc::new(
            addressed_schema()
                .field("timestamp", FieldSpec::scalar(DType::U64).with_unit("s"))
                .field("voltage", FieldSpec::scalar(DType::F64).with_unit("V"))
                .field("current", FieldSpec::scalar(DType::F64))
                .build(),
        )
    }
}

impl Default for HvDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decode for HvDecoder {
    fn hardware(&self) -> HardwareKind {
        HardwareKind::Hv
    }

    fn build_schema(&mut self, header: &RunHeader) -> Result<usize, SchemaError> {
        let template = Self::template();
        let mut schemas = SchemaMap::new();
        for card in header.cards_of_class(CLASS_NAME) {
            let channels = match (&card.info.targets, card.info.channel_count) {
                (Some(targets), _) => targets.len(),
                (None, Some(count)) => usize::from(count),
                (None, None) => DEFAULT_CHANNELS,
            };
            if channels > MAX_CHANNELS {
                return Err(SchemaError::InvalidHeaderParameter {
                    class_name: CLASS_NAME.to_string(),
                    card: card.info.card,
                    parameter: "targets",
                    value: channels as i64,
                    reason: format!("at most {MAX_CHANNELS} channels per card"),
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
        require_words(NAME, packet, FIRST_CHANNEL_WORD)?;

        let (crate_id, card) = vme_crate_card(packet[1]);
        let channels = ((packet[1] >> 4) & 0xF) as usize;
        let timestamp = packet[4];
        require_words(NAME, packet, FIRST_CHANNEL_WORD + 2 * channels)?;

        let mut last_full = false;
        for i in 0..channels {
            let channel = i as u8;
            let key = get_ccc(crate_id, card, channel);
            if self.state.registered(key, buffers)?.is_none() {
                continue;
            }
            let voltage = decode_ieee754(packet[FIRST_CHANNEL_WORD + 2 * i]);
            let current = decode_ieee754(packet[FIRST_CHANNEL_WORD + 2 * i + 1]);
            last_full = buffers.write_row(key, |row| {
                row.set("packet_id", packet_id)?;
                row.set("crate", crate_id)?;
                row.set("card", card)?;
                row.set("channel", channel)?;
                row.set("timestamp", timestamp)?;
                row.set("voltage", voltage)?;
                row.set("current", current)
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
    use orca_core::CardInfo;

    fn header() -> RunHeader {
        RunHeader::builder()
            .card(1, CardInfo::new(CLASS_NAME, 3).with_targets(4))
            .card(1, CardInfo::new("ORSIS3316Model", 4))
            .build()
    }

    fn packet(crate_id: u32, card: u32, readings: &[(f32, f32)]) -> Vec<u32> {
        let mut words = vec![
            0,
            (crate_id << 21) | (card << 16) | ((readings.len() as u32) << 4),
            0,
            0,
            1_700_000_000,
        ];
        for (v, i) in readings {
            words.push(v.to_bits());
            words.push(i.to_bits());
        }
        words[0] = (3 << 18) | words.len() as u32;
        words
    }

    fn built() -> (HvDecoder, BufferLibrary) {
        let mut decoder = HvDecoder::new();
        decoder.build_schema(&header()).unwrap();
        let mut buffers = BufferLibrary::new();
        buffers
            .allocate_all(decoder.schema(None).unwrap().all().unwrap(), 4)
            .unwrap();
        (decoder, buffers)
    }

    #[test]
    fn test_schema_one_key_per_target() {
        let mut decoder = HvDecoder::new();
        assert_eq!(decoder.build_schema(&header()).unwrap(), 4);
        assert_eq!(
            decoder.key_list().unwrap(),
            (0..4).map(|ch| get_ccc(1, 3, ch)).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_more_channels_than_count_field_rejected() {
        let header = RunHeader::builder()
            .card(0, CardInfo::new(CLASS_NAME, 2).with_targets(15))
            .build();
        assert_eq!(HvDecoder::new().build_schema(&header).unwrap(), 15);

        let header = RunHeader::builder()
            .card(0, CardInfo::new(CLASS_NAME, 2).with_targets(16))
            .build();
        let err = HvDecoder::new().build_schema(&header).unwrap_err();
        assert!(matches!(
            err,
            SchemaError::InvalidHeaderParameter {
                parameter: "targets",
                value: 16,
                card: 2,
                ..
            }
        ));
    }

    #[test]
    fn test_channel_count_without_targets() {
        let header = RunHeader::builder()
            .card(0, CardInfo::new(CLASS_NAME, 2).with_channel_count(12))
            .card(0, CardInfo::new(CLASS_NAME, 3))
            .build();
        let mut decoder = HvDecoder::new();
        assert_eq!(decoder.build_schema(&header).unwrap(), 12 + DEFAULT_CHANNELS);

        let header = RunHeader::builder()
            .card(0, CardInfo::new(CLASS_NAME, 2).with_channel_count(20))
            .build();
        assert!(matches!(
            decoder.build_schema(&header),
            Err(SchemaError::InvalidHeaderParameter { value: 20, .. })
        ));
    }

    #[test]
    fn test_decodes_voltage_and_current() {
        let (mut decoder, mut buffers) = built();
        let pkt = packet(1, 3, &[(1500.0, 0.25), (-20.5, 1.0e-6)]);

        assert!(!decoder.decode_packet(&pkt, 12, &mut buffers).unwrap());

        let ch1 = buffers.get(get_ccc(1, 3, 1)).unwrap();
        assert_eq!(ch1.len(), 1);
        assert_eq!(ch1.scalar("voltage", 0), Some(Scalar::F(-20.5)));
        assert_eq!(ch1.scalar("current", 0), Some(Scalar::F(f64::from(1.0e-6f32))));
        assert_eq!(ch1.scalar("timestamp", 0), Some(Scalar::U(1_700_000_000)));
        assert_eq!(ch1.scalar("packet_id", 0), Some(Scalar::U(12)));
        assert_eq!(buffers.rows(get_ccc(1, 3, 2)), Some(0));
    }

    #[test]
    fn test_channels_beyond_targets_are_skipped() {
        let (mut decoder, mut buffers) = built();
        let readings = [(1.0, 1.0); 6];
        decoder
            .decode_packet(&packet(1, 3, &readings), 0, &mut buffers)
            .unwrap();

        assert_eq!(buffers.total_rows(), 4);
        assert_eq!(decoder.skipped_channels().len(), 2);
        assert_eq!(decoder.skipped_channels().get(&get_ccc(1, 3, 5)), Some(&1));
    }

    #[test]
    fn test_truncated_channel_block() {
        let (mut decoder, mut buffers) = built();
        let mut pkt = packet(1, 3, &[(1.0, 1.0), (2.0, 2.0)]);
        pkt.pop();

        let err = decoder.decode_packet(&pkt, 0, &mut buffers).unwrap_err();
        assert!(err.is_recoverable());
        assert_eq!(buffers.total_rows(), 0);
    }

    #[test]
    fn test_reports_full_on_last_write() {
        let (mut decoder, mut buffers) = built();
        let pkt = packet(1, 3, &[(1.0, 1.0)]);
        for _ in 0..3 {
            assert!(!decoder.decode_packet(&pkt, 0, &mut buffers).unwrap());
        }
        assert!(decoder.decode_packet(&pkt, 0, &mut buffers).unwrap());
        assert_eq!(buffers.take_full(), vec![get_ccc(1, 3, 0)]);
    }
}
