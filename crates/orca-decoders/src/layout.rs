//! Bit-layout helpers shared by the decoders.
//!
//! Word 0 of every packet is `dataId << 18 | length`. Most VME cards put the
//! crate in bits 21..25 and the card in bits 16..21 of word 1.

use orca_core::header::DATA_ID_SHIFT;
use orca_core::limits::PACKET_LENGTH_MASK;
use orca_core::{ChannelSchema, DType, DecodeError, DecodeResult, FieldSpec};
use orca_core::schema::ChannelSchemaBuilder;

/// Data id from word 0.
#[inline]
pub const fn data_id(word0: u32) -> u32 {
    word0 >> DATA_ID_SHIFT
}

/// Packet length in words from word 0.
#[inline]
pub const fn packet_length(word0: u32) -> usize {
    (word0 & PACKET_LENGTH_MASK) as usize
}

/// `(crate, card)` from the standard VME layout of word 1.
#[inline]
pub const fn vme_crate_card(word1: u32) -> (u8, u8) {
    (((word1 >> 21) & 0xF) as u8, ((word1 >> 16) & 0x1F) as u8)
}

/// Fail with `Truncated` unless `packet` holds at least `needed` words.
#[inline]
pub fn require_words(decoder: &'static str, packet: &[u32], needed: usize) -> DecodeResult<()> {
    if packet.len() < needed {
        return Err(DecodeError::truncated(decoder, needed, packet.len()));
    }
    Ok(())
}

/// Fields every decoded row carries, in the order they appear in the schema.
pub fn addressed_schema() -> ChannelSchemaBuilder {
    ChannelSchema::builder()
        .field("packet_id", FieldSpec::scalar(DType::U32))
        .field("crate", FieldSpec::scalar(DType::U8))
        .field("card", FieldSpec::scalar(DType::U8))
        .field("channel", FieldSpec::scalar(DType::U8))
}
