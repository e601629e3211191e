//! The decode contract and the closed set of hardware decoders.
//!
//! Every hardware family implements [`Decode`]. [`Decoder`] wraps the five
//! implementations in one enum so the registry can hold them in a single
//! table and dispatch statically via `enum_dispatch`.
//!
//! # Lifecycle
//!
//! ```text
//! Decoder::new(kind)
//!     -> build_schema(&RunHeader)        once per run, before anything else
//!     -> key_list() / schema(..)         used to allocate buffers
//!     -> decode_packet(..)               once per packet with this data id
//! ```
//!
//! Queries made before `build_schema` fail with
//! [`SchemaError::SchemaNotBuilt`](orca_core::SchemaError::SchemaNotBuilt).

use crate::hv::HvDecoder;
use crate::ln::LnDecoder;
use crate::qdc::QdcDecoder;
use crate::scaler::ScalerDecoder;
use crate::sis3316::Sis3316Decoder;
use enum_dispatch::enum_dispatch;
use orca_buffers::BufferLibrary;
use orca_core::{ChannelKey, DecodeResult, RunHeader, SchemaError, SchemaView};
use std::collections::BTreeMap;
use std::fmt;

/// Uniform contract for hardware-specific packet decoders.
#[enum_dispatch]
pub trait Decode {
    /// Hardware family this decoder handles.
    fn hardware(&self) -> HardwareKind;

    /// Build one schema per channel this run's hardware provides.
    ///
    /// Returns the number of schemas registered. Rebuilding replaces the
    /// previous map and clears the skip counters.
    fn build_schema(&mut self, header: &RunHeader) -> Result<usize, SchemaError>;

    /// Channel keys with a schema, in ascending order.
    fn key_list(&self) -> Result<Vec<ChannelKey>, SchemaError>;

    /// One channel's schema, or the whole map when `key` is `None`.
    fn schema(&self, key: Option<ChannelKey>) -> Result<SchemaView<'_>, SchemaError>;

    /// Decode one packet into `buffers`.
    ///
    /// Returns whether the last buffer written is now full. A packet that
    /// writes nothing returns `false`.
    fn decode_packet(
        &mut self,
        packet: &[u32],
        packet_id: u32,
        buffers: &mut BufferLibrary,
    ) -> DecodeResult<bool>;

    /// Channels seen in packets but not recorded this run, with hit counts.
    fn skipped_channels(&self) -> &BTreeMap<ChannelKey, u64>;
}

/// Hardware families with a decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HardwareKind {
    /// iSeg EHS8260p high-voltage card
    Hv,
    /// AMI 286 liquid-nitrogen level controller
    Ln,
    /// SIS3820 scaler
    Scaler,
    /// CAEN V792 charge-to-digital converter
    Qdc,
    /// SIS3316 waveform digitizer
    Sis3316,
}

impl HardwareKind {
    pub const ALL: [HardwareKind; 5] = [
        HardwareKind::Hv,
        HardwareKind::Ln,
        HardwareKind::Scaler,
        HardwareKind::Qdc,
        HardwareKind::Sis3316,
    ];

    /// Decoder names ORCA writes into the data description for this family.
    pub fn decoder_names(self) -> &'static [&'static str] {
        match self {
            HardwareKind::Hv => &["ORiSegHVCardDecoderForHV"],
            HardwareKind::Ln => &["ORAmi286DecoderForLevel"],
            HardwareKind::Scaler => &["ORSIS3820DecoderForCounts"],
            HardwareKind::Qdc => &["ORCAEN792NDecoderForQdc", "ORCAEN792DecoderForQdc"],
            HardwareKind::Sis3316 => &["ORSIS3316WaveformDecoder"],
        }
    }

    /// Resolve a data-description decoder name.
    pub fn from_decoder_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.decoder_names().contains(&name))
    }

    /// Whether channels of this family carry waveforms (and get the larger
    /// buffer capacity).
    pub fn is_waveform(self) -> bool {
        matches!(self, HardwareKind::Sis3316)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HardwareKind::Hv => "iseg_hv",
            HardwareKind::Ln => "ami286_ln",
            HardwareKind::Scaler => "sis3820_scaler",
            HardwareKind::Qdc => "caen792_qdc",
            HardwareKind::Sis3316 => "sis3316_waveform",
        }
    }
}

impl fmt::Display for HardwareKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One decoder per hardware family, dispatched statically.
#[enum_dispatch(Decode)]
#[derive(Debug, Clone)]
pub enum Decoder {
    Hv(HvDecoder),
    Ln(LnDecoder),
    Scaler(ScalerDecoder),
    Qdc(QdcDecoder),
    Sis3316(Sis3316Decoder),
}

impl Decoder {
    /// Fresh, unbuilt decoder for `kind`.
    pub fn new(kind: HardwareKind) -> Self {
        match kind {
            HardwareKind::Hv => HvDecoder::new().into(),
            HardwareKind::Ln => LnDecoder::new().into(),
            HardwareKind::Scaler => ScalerDecoder::new().into(),
            HardwareKind::Qdc => QdcDecoder::new().into(),
            HardwareKind::Sis3316 => Sis3316Decoder::new().into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoder_name_aliases() {
        assert_eq!(
            HardwareKind::from_decoder_name("ORCAEN792DecoderForQdc"),
            Some(HardwareKind::Qdc)
        );
        assert_eq!(
            HardwareKind::from_decoder_name("ORSIS3316WaveformDecoder"),
            Some(HardwareKind::Sis3316)
        );
        assert_eq!(HardwareKind::from_decoder_name("ORRunDecoderForRun"), None);
    }

    #[test]
    fn test_new_decoder_reports_kind() {
        for kind in HardwareKind::ALL {
            assert_eq!(Decoder::new(kind).hardware(), kind);
        }
    }

    #[test]
    fn test_unbuilt_decoder_rejects_queries() {
        for kind in HardwareKind::ALL {
            let decoder = Decoder::new(kind);
            assert!(matches!(
                decoder.key_list(),
                Err(SchemaError::SchemaNotBuilt { .. })
            ));
            assert!(decoder.schema(None).is_err());
        }
    }

    #[test]
    fn test_decode_before_build_is_fatal() {
        let mut decoder = Decoder::new(HardwareKind::Scaler);
        let mut buffers = BufferLibrary::new();
        let packet = vec![0u32; 39];
        let err = decoder.decode_packet(&packet, 0, &mut buffers).unwrap_err();
        assert!(!err.is_recoverable());
    }
}
