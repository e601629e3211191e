//! Read-only model of the run header.
//!
//! ORCA writes a header at the start of every run describing the installed
//! hardware. Only two parts matter for decoding:
//!
//! ```text
//! ObjectInfo.Crates[]            crate -> cards installed in it
//!     .Cards[]                   { "Class Name", "Card", card parameters... }
//! dataDescription                model -> record -> { dataId, decoder }
//! ```
//!
//! The header arrives as JSON (the plist converted upstream) and is parsed once
//! with `serde_json`. Nothing in the decode path mutates it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::Read;

/// Number of bits the data id is shifted by in word 0 of every packet.
pub const DATA_ID_SHIFT: u32 = 18;

/// Largest data id that fits in the 14 high bits of word 0.
pub const MAX_DATA_ID: u32 = (1 << (32 - DATA_ID_SHIFT)) - 1;

/// The whole run header.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunHeader {
    #[serde(rename = "ObjectInfo", default)]
    pub object_info: ObjectInfo,

    /// model name -> record name -> description
    #[serde(rename = "dataDescription", default)]
    pub data_description: BTreeMap<String, BTreeMap<String, DataDescription>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectInfo {
    #[serde(rename = "Crates", default)]
    pub crates: Vec<CrateInfo>,
}

/// One crate and the cards installed in it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrateInfo {
    /// Explicit crate number; falls back to the crate's position in the list
    #[serde(rename = "CrateNumber", default, skip_serializing_if = "Option::is_none")]
    pub crate_number: Option<u8>,

    #[serde(rename = "Cards", default)]
    pub cards: Vec<CardInfo>,
}

/// One card as described by the header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardInfo {
    /// Hardware class, e.g. `ORSIS3316Model`
    #[serde(rename = "Class Name")]
    pub class_name: String,

    /// Slot / card id
    #[serde(rename = "Card")]
    pub card: u8,

    /// Explicit number of channels, when the card reports one
    #[serde(rename = "channelCount", default, skip_serializing_if = "Option::is_none")]
    pub channel_count: Option<u16>,

    /// HV channel targets; one entry per installed channel
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub targets: Option<Vec<Value>>,

    /// Digitizer trace length in samples
    #[serde(rename = "rawDataBufferLen", default, skip_serializing_if = "Option::is_none")]
    pub raw_data_buffer_len: Option<i64>,

    /// Every other card parameter, untouched
    #[serde(flatten)]
    pub parameters: BTreeMap<String, Value>,
}

impl CardInfo {
    pub fn new(class_name: impl Into<String>, card: u8) -> Self {
        Self {
            class_name: class_name.into(),
            card,
            channel_count: None,
            targets: None,
            raw_data_buffer_len: None,
            parameters: BTreeMap::new(),
        }
    }

    pub fn with_channel_count(mut self, count: u16) -> Self {
        self.channel_count = Some(count);
        self
    }

    /// Give the card `count` HV targets (all 0 V).
    pub fn with_targets(mut self, count: usize) -> Self {
        self.targets = Some(vec![Value::from(0); count]);
        self
    }

    pub fn with_trace_length(mut self, samples: i64) -> Self {
        self.raw_data_buffer_len = Some(samples);
        self
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    pub fn parameter(&self, name: &str) -> Option<&Value> {
        self.parameters.get(name)
    }
}

/// Data record description; ties a decoder name to the data id it emits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataDescription {
    #[serde(rename = "dataId")]
    pub data_id: u32,

    pub decoder: String,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl DataDescription {
    /// Data id as found in the high bits of word 0.
    ///
    /// ORCA stores data ids already shifted into position; small values are
    /// taken as unshifted ids.
    pub fn packet_data_id(&self) -> u32 {
        if self.data_id > MAX_DATA_ID {
            self.data_id >> DATA_ID_SHIFT
        } else {
            self.data_id
        }
    }
}

/// A card together with the crate it sits in.
#[derive(Debug, Clone, Copy)]
pub struct CardRef<'a> {
    pub crate_id: u8,
    pub info: &'a CardInfo,
}

/// One row of the data-description table.
#[derive(Debug, Clone, Copy)]
pub struct DataIdEntry<'a> {
    pub model: &'a str,
    pub record: &'a str,
    pub data_id: u32,
    pub decoder: &'a str,
}

impl RunHeader {
    pub fn builder() -> RunHeaderBuilder {
        RunHeaderBuilder {
            header: RunHeader::default(),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, serde_json::Error> {
        serde_json::from_reader(reader)
    }

    /// Every card in every crate, with its resolved crate id.
    pub fn cards(&self) -> impl Iterator<Item = CardRef<'_>> {
        self.object_info
            .crates
            .iter()
            .enumerate()
            .flat_map(|(position, crate_info)| {
                let crate_id = crate_info.crate_number.unwrap_or(position as u8);
                crate_info
                    .cards
                    .iter()
                    .map(move |info| CardRef { crate_id, info })
            })
    }

    /// Cards whose hardware class name equals `class_name`.
    pub fn cards_of_class<'a>(
        &'a self,
        class_name: &'a str,
    ) -> impl Iterator<Item = CardRef<'a>> + 'a {
        self.cards()
            .filter(move |card| card.info.class_name == class_name)
    }

    /// Whether the data description lists `model`.
    pub fn has_model(&self, model: &str) -> bool {
        self.data_description.contains_key(model)
    }

    /// Flattened data-description table.
    pub fn data_ids(&self) -> impl Iterator<Item = DataIdEntry<'_>> {
        self.data_description.iter().flat_map(|(model, records)| {
            records.iter().map(move |(record, desc)| DataIdEntry {
                model,
                record,
                data_id: desc.packet_data_id(),
                decoder: desc.decoder.as_str(),
            })
        })
    }
}

/// Incremental construction of a header, mostly for tests and tooling.
#[derive(Debug)]
pub struct RunHeaderBuilder {
    header: RunHeader,
}

impl RunHeaderBuilder {
    /// Install `card` in crate `crate_id`, creating the crate if needed.
    pub fn card(mut self, crate_id: u8, card: CardInfo) -> Self {
        let crates = &mut self.header.object_info.crates;
        match crates
            .iter_mut()
            .find(|c| c.crate_number == Some(crate_id))
        {
            Some(existing) => existing.cards.push(card),
            None => crates.push(CrateInfo {
                crate_number: Some(crate_id),
                cards: vec![card],
            }),
        }
        self
    }

    pub fn data_id(
        mut self,
        model: impl Into<String>,
        record: impl Into<String>,
        data_id: u32,
        decoder: impl Into<String>,
    ) -> Self {
        self.header
            .data_description
            .entry(model.into())
            .or_default()
            .insert(
                record.into(),
                DataDescription {
                    data_id,
                    decoder: decoder.into(),
                    extra: BTreeMap::new(),
                },
            );
        self
    }

    pub fn build(self) -> RunHeader {
        self.header
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER_JSON: &str = r#"{
        "ObjectInfo": {
            "Crates": [
                { "Cards": [
                    { "Class Name": "ORSIS3316Model", "Card": 5, "rawDataBufferLen": 2000, "enabledMask": 65535 }
                ] },
                { "Cards": [
                    { "Class Name": "OREHS8260pModel", "Card": 3, "targets": [0, 0, 1500.0, 0] }
                ] }
            ]
        },
        "dataDescription": {
            "ORSIS3316Model": { "Waveform": { "dataId": 786432, "decoder": "ORSIS3316WaveformDecoder", "isLong": true } },
            "OREHS8260pModel": { "HV": { "dataId": 7, "decoder": "ORiSegHVCardDecoderForHV" } }
        }
    }"#;

    #[test]
    fn test_parse_header() {
        let header = RunHeader::from_json_str(HEADER_JSON).unwrap();
        let cards: Vec<_> = header.cards().collect();
        assert_eq!(cards.len(), 2);

        // Crate ids fall back to list position
        assert_eq!(cards[0].crate_id, 0);
        assert_eq!(cards[1].crate_id, 1);

        let sis = cards[0].info;
        assert_eq!(sis.raw_data_buffer_len, Some(2000));
        assert_eq!(sis.parameter("enabledMask"), Some(&Value::from(65535)));
        assert_eq!(cards[1].info.targets.as_ref().map(Vec::len), Some(4));
    }

    #[test]
    fn test_data_ids_are_unshifted() {
        let header = RunHeader::from_json_str(HEADER_JSON).unwrap();
        let mut ids: Vec<(u32, &str)> = header.data_ids().map(|e| (e.data_id, e.decoder)).collect();
        ids.sort();
        assert_eq!(
            ids,
            vec![(3, "ORSIS3316WaveformDecoder"), (7, "ORiSegHVCardDecoderForHV")]
        );
    }

    #[test]
    fn test_builder_groups_cards_by_crate() {
        let header = RunHeader::builder()
            .card(1, CardInfo::new("ORSIS3820Model", 2))
            .card(0, CardInfo::new("ORSIS3820Model", 4))
            .card(1, CardInfo::new("ORSIS3820Model", 6))
            .build();

        assert_eq!(header.object_info.crates.len(), 2);
        let addresses: Vec<(u8, u8)> = header
            .cards_of_class("ORSIS3820Model")
            .map(|c| (c.crate_id, c.info.card))
            .collect();
        assert_eq!(addresses, vec![(1, 2), (1, 6), (0, 4)]);
    }
}
