//! Hard limits shared by decoders, buffers and the stream reader.
//!
//! Centralised so the sizing checks done at schema-build time and the framing
//! checks done by the stream reader agree.

/// Largest trace length a SIS3316 channel can be configured with (samples).
pub const MAX_TRACE_LENGTH: i64 = 1 << 16;

/// Trace length of the waveform template; every card overrides it with its
/// `rawDataBufferLen`.
pub const DEFAULT_TRACE_LENGTH: usize = 65532;

/// Rows per waveform channel buffer.
pub const WAVEFORM_BUFFER_CAPACITY: usize = 8192;

/// Rows per buffer for every other hardware family.
pub const GENERAL_BUFFER_CAPACITY: usize = 1024;

/// Mask for the packet length (in 32-bit words) in word 0.
pub const PACKET_LENGTH_MASK: u32 = 0x3_FFFF;

/// Longest packet word 0 can describe.
pub const MAX_PACKET_WORDS: usize = PACKET_LENGTH_MASK as usize;

/// Validate a header-supplied trace length.
///
/// Returns the length as a sample count, or the reason it was rejected.
pub fn validate_trace_length(samples: i64) -> Result<usize, String> {
    if samples <= 0 {
        return Err("trace length must be > 0".to_string());
    }
    if samples > MAX_TRACE_LENGTH {
        return Err(format!(
            "trace length exceeds hardware maximum of {} samples",
            MAX_TRACE_LENGTH
        ));
    }
    Ok(samples as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_length_bounds() {
        assert!(validate_trace_length(0).is_err());
        assert!(validate_trace_length(-4).is_err());
        assert_eq!(validate_trace_length(1), Ok(1));
        assert_eq!(validate_trace_length(MAX_TRACE_LENGTH), Ok(65536));
        assert!(validate_trace_length(MAX_TRACE_LENGTH + 1).is_err());
    }
}
