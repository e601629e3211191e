//! # orca-daq
//!
//! Decoding of ORCA data-acquisition streams into per-channel record buffers.
//!
//! A run starts with a header describing the installed crates and cards. From
//! it the [`DecoderRegistry`](orca_decoders::DecoderRegistry) builds one
//! schema per channel and the buffers are allocated. The [`DispatchLoop`]
//! then reads packets, routes each to its decoder by data id and hands every
//! buffer that fills to a [`BufferSink`] before decoding the next packet.
//!
//! ## Crate Organization
//!
//! - `orca-core`: channel keys, run header, schemas, IEEE-754 decode, errors
//! - `orca-buffers`: fixed-capacity channel buffers and the buffer library
//! - `orca-decoders`: the hardware decoders and the data-id registry
//! - this crate: configuration, tracing setup, stream framing, dispatch loop
//!
//! ## Example
//!
//! ```no_run
//! use orca_daq::config::DaqConfig;
//! use orca_daq::dispatch::{CountingSink, DispatchLoop};
//! use orca_daq::stream::PacketReader;
//! use orca_core::RunHeader;
//!
//! let config = DaqConfig::load()?;
//! let header = RunHeader::from_reader(std::fs::File::open("run.json")?)?;
//! let mut dispatch =
//!     DispatchLoop::from_header(&header, config.buffers.capacities(), CountingSink::default())?;
//! let mut reader = PacketReader::new(std::fs::File::open("run.orca")?, &config.stream);
//! let stats = dispatch.run(&mut reader)?;
//! println!("{} packets decoded", stats.packets_decoded);
//! # Ok::<(), orca_daq::DaqError>(())
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod stream;
pub mod tracing_config;

pub use dispatch::{BufferSink, CountingSink, DiscardSink, DispatchLoop, DispatchStats};
pub use error::{AppResult, DaqError};

pub use orca_buffers;
pub use orca_core;
pub use orca_decoders;
