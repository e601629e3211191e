//! Hardware-specific decoders for ORCA event packets.
//!
//! Each supported hardware family implements [`Decode`]: it builds one
//! [`ChannelSchema`](orca_core::ChannelSchema) per installed channel from the
//! run header, then turns packets into rows of the matching channel buffers.
//!
//! | decoder | hardware | rows per packet |
//! |---|---|---|
//! | [`HvDecoder`] | iSeg EHS8260p HV card | one per reported channel |
//! | [`LnDecoder`] | AMI 286 LN level controller | four |
//! | [`ScalerDecoder`] | SIS3820 scaler | 32 |
//! | [`QdcDecoder`] | CAEN V792 QDC | one per data word |
//! | [`Sis3316Decoder`] | SIS3316 digitizer | one, or two for doubled packets |
//!
//! [`DecoderRegistry`] ties them to the data ids of a run.

pub mod decoder;
pub mod hv;
pub mod layout;
pub mod ln;
pub mod qdc;
pub mod registry;
pub mod scaler;
pub mod sis3316;
mod state;

pub use decoder::{Decode, Decoder, HardwareKind};
pub use hv::HvDecoder;
pub use ln::LnDecoder;
pub use qdc::QdcDecoder;
pub use registry::{BufferCapacities, DecoderRegistry};
pub use scaler::ScalerDecoder;
pub use sis3316::Sis3316Decoder;
