//! CLI entry point for orca-daq
//!
//! # Usage
//!
//! Decode a stream and print run statistics:
//! ```bash
//! orca-daq decode --header run.json run.orca
//! ```
//!
//! Print the channel schemas a header produces:
//! ```bash
//! orca-daq schema --header run.json
//! ```
//!
//! Show the configuration after environment overrides:
//! ```bash
//! ORCA_DAQ_STREAM__BYTE_ORDER=big orca-daq config
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use orca_core::{RunHeader, SchemaMap};
use orca_daq::config::DaqConfig;
use orca_daq::dispatch::{CountingSink, DispatchLoop};
use orca_daq::stream::PacketReader;
use orca_daq::tracing_config::{self, OutputFormat, TracingConfig};
use orca_decoders::{Decode, DecoderRegistry};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser)]
#[command(name = "orca-daq")]
#[command(about = "Decode ORCA data streams into per-channel record buffers", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Compact)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Pretty,
    Compact,
    Json,
}

impl From<LogFormat> for OutputFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Pretty => OutputFormat::Pretty,
            LogFormat::Compact => OutputFormat::Compact,
            LogFormat::Json => OutputFormat::Json,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the dispatch loop over a stream file
    Decode {
        /// Run header (JSON)
        #[arg(long)]
        header: PathBuf,

        /// Packet stream file
        stream: PathBuf,
    },

    /// Print the schema of every channel the header describes
    Schema {
        /// Run header (JSON)
        #[arg(long)]
        header: PathBuf,
    },

    /// Print the effective configuration (file plus environment) as TOML
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => DaqConfig::load_from(path),
        None => DaqConfig::load(),
    }
    .context("Failed to load configuration")?;
    config.validate()?;

    let level = tracing_config::parse_log_level(&config.application.log_level)?;
    tracing_config::init(TracingConfig::new(level).with_format(cli.log_format.into()))?;

    match cli.command {
        Commands::Decode { header, stream } => decode(&config, &header, &stream),
        Commands::Schema { header } => print_schema(&header),
        Commands::Config => {
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

fn load_header(path: &Path) -> Result<RunHeader> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open run header {}", path.display()))?;
    RunHeader::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse run header {}", path.display()))
}

fn decode(config: &DaqConfig, header_path: &Path, stream_path: &Path) -> Result<()> {
    let header = load_header(header_path)?;
    let mut dispatch = DispatchLoop::from_header(
        &header,
        config.buffers.capacities(),
        CountingSink::default(),
    )?;

    let file = File::open(stream_path)
        .with_context(|| format!("Failed to open stream {}", stream_path.display()))?;
    let mut reader = PacketReader::new(BufReader::new(file), &config.stream);

    info!(stream = %stream_path.display(), "Decoding");
    let stats = dispatch.run(&mut reader)?.clone();
    let skipped = dispatch.registry().skipped_channels();
    info!(
        channels_skipped = skipped.len(),
        truncated_tail = stats.truncated_tail,
        "Run complete"
    );

    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

fn print_schema(header_path: &Path) -> Result<()> {
    let header = load_header(header_path)?;
    let registry = DecoderRegistry::from_header(&header)?;

    let mut schemas: BTreeMap<String, &SchemaMap> = BTreeMap::new();
    for decoder in registry.decoders() {
        if let Some(map) = decoder.schema(None)?.all() {
            schemas.insert(decoder.hardware().to_string(), map);
        }
    }
    println!("{}", serde_json::to_string_pretty(&schemas)?);
    Ok(())
}
