//! Manual IEEE-754 single precision reconstruction.
//!
//! Slow-control cards (HV supplies, the LN level monitor) ship readings as raw
//! 32-bit words holding an IEEE-754 `binary32`. The value is rebuilt from its
//! fields instead of reinterpreting the bits, so the layout is spelled out in
//! one place and can be checked against [`f32::from_bits`].
//!
//! ```text
//!  xxxx xxxx xxxx xxxx xxxx xxxx xxxx xxxx
//!  ^--------------------------------------- sign
//!  -^^^ ^^^^ ^----------------------------- exponent (bias 127)
//!  ----------^^^ ^^^^ ^^^^ ^^^^ ^^^^ ^^^^- fraction, most significant bit first
//! ```

const EXPONENT_BIAS: i32 = 127;
const FRACTION_BITS: u32 = 23;

/// Exact power of two for exponents in the normal `f64` range.
#[inline]
fn pow2(exp: i32) -> f64 {
    debug_assert!((-1022..=1023).contains(&exp));
    f64::from_bits(((exp + 1023) as u64) << 52)
}

/// Sum of the fraction bits, each weighted `2^-(i+1)` for the `i`-th bit from
/// the top. The implicit leading one is not included.
pub fn fraction_value(fraction: u32) -> f64 {
    (0..FRACTION_BITS)
        .filter(|i| (fraction >> (FRACTION_BITS - 1 - i)) & 0x1 == 1)
        .map(|i| pow2(-(i as i32 + 1)))
        .sum()
}

/// Rebuild the value of a raw IEEE-754 single precision word.
///
/// Normal numbers decode as `(-1)^sign × 2^(exponent-127) × (1 + fraction)`.
/// Zero and subnormals (exponent 0), infinities and NaN (exponent 255) follow
/// the standard, so the result always equals `f32::from_bits(word) as f64`.
pub fn decode_ieee754(word: u32) -> f64 {
    let sign = (word >> 31) & 0x1;
    let exponent = ((word >> FRACTION_BITS) & 0xFF) as i32;
    let fraction = word & 0x7F_FFFF;

    let magnitude = match exponent {
        0 => pow2(1 - EXPONENT_BIAS) * fraction_value(fraction),
        0xFF if fraction == 0 => f64::INFINITY,
        0xFF => return f64::NAN,
        _ => pow2(exponent - EXPONENT_BIAS) * (1.0 + fraction_value(fraction)),
    };

    if sign == 1 {
        -magnitude
    } else {
        magnitude
    }
}
