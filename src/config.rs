//! Configuration loading using Figment.
//!
//! Configuration is loaded from:
//! 1. a TOML file (base configuration; optional, missing files are ignored)
//! 2. environment variables prefixed with `ORCA_DAQ_`
//!
//! Nested keys are separated by a double underscore in environment variables,
//! e.g. `ORCA_DAQ_BUFFERS__GENERAL_CAPACITY=2048`.
//!
//! # Example
//! ```no_run
//! use orca_daq::config::DaqConfig;
//!
//! let config = DaqConfig::load()?;
//! config.validate()?;
//! println!("Application: {}", config.application.name);
//! # Ok::<(), orca_daq::DaqError>(())
//! ```

use crate::error::{AppResult, DaqError};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use orca_core::limits::{GENERAL_BUFFER_CAPACITY, MAX_PACKET_WORDS, WAVEFORM_BUFFER_CAPACITY};
use orca_decoders::BufferCapacities;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/orca-daq.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaqConfig {
    pub application: ApplicationConfig,
    pub buffers: BufferConfig,
    pub stream: StreamConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "orca-daq".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Channel buffer sizing, in rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Rows per buffer for scalar-only hardware
    pub general_capacity: usize,
    /// Rows per buffer for waveform digitizer channels
    pub waveform_capacity: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            general_capacity: GENERAL_BUFFER_CAPACITY,
            waveform_capacity: WAVEFORM_BUFFER_CAPACITY,
        }
    }
}

impl BufferConfig {
    pub fn capacities(&self) -> BufferCapacities {
        BufferCapacities {
            general: self.general_capacity,
            waveform: self.waveform_capacity,
        }
    }
}

/// Byte order of the 32-bit words in the packet stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    #[default]
    Little,
    Big,
}

/// Packet stream settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub byte_order: ByteOrder,
    /// Packets whose length word exceeds this are treated as corrupt
    pub max_packet_words: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            byte_order: ByteOrder::Little,
            max_packet_words: MAX_PACKET_WORDS,
        }
    }
}

impl DaqConfig {
    /// Load configuration from the default file and environment variables
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        Ok(Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("ORCA_DAQ_").split("__"))
            .extract()?)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(DaqError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.buffers.general_capacity == 0 || self.buffers.waveform_capacity == 0 {
            return Err(DaqError::Configuration(
                "Buffer capacities must be at least 1 row".to_string(),
            ));
        }

        if self.stream.max_packet_words == 0 || self.stream.max_packet_words > MAX_PACKET_WORDS {
            return Err(DaqError::Configuration(format!(
                "Invalid max_packet_words {}. Must be 1-{}",
                self.stream.max_packet_words, MAX_PACKET_WORDS
            )));
        }

        Ok(())
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml_string(&self) -> AppResult<String> {
        toml::to_string_pretty(self).map_err(|e| {
            DaqError::Configuration(format!("Failed to serialize configuration: {}", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = DaqConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.buffers.capacities(), BufferCapacities::default());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[application]
name = "Test"
log_level = "debug"

[buffers]
general_capacity = 16

[stream]
byte_order = "big"
"#
        )
        .unwrap();

        let config = DaqConfig::load_from(file.path()).unwrap();
        assert_eq!(config.application.name, "Test");
        assert_eq!(config.buffers.general_capacity, 16);
        assert_eq!(config.buffers.waveform_capacity, WAVEFORM_BUFFER_CAPACITY);
        assert_eq!(config.stream.byte_order, ByteOrder::Big);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_output_loads_back() {
        let mut config = DaqConfig::default();
        config.buffers.waveform_capacity = 512;
        config.stream.byte_order = ByteOrder::Big;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(config.to_toml_string().unwrap().as_bytes())
            .unwrap();

        assert_eq!(DaqConfig::load_from(file.path()).unwrap(), config);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = DaqConfig::load_from("does/not/exist.toml").unwrap();
        assert_eq!(config.stream.max_packet_words, MAX_PACKET_WORDS);
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = DaqConfig::default();
        config.application.log_level = "invalid".to_string();
        assert!(matches!(
            config.validate(),
            Err(DaqError::Configuration(_))
        ));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let mut config = DaqConfig::default();
        config.buffers.waveform_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_packet_limit_bounded_by_length_field() {
        let mut config = DaqConfig::default();
        config.stream.max_packet_words = MAX_PACKET_WORDS + 1;
        assert!(config.validate().is_err());
    }
}
