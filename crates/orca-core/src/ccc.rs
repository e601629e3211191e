//! Crate/card/channel addressing.
//!
//! Every hardware family addresses a reading by a (crate, card, channel)
//! triple. [`get_ccc`] folds the triple into a single [`ChannelKey`] which is
//! the only channel identifier used by schemas, buffers and decoders.
//!
//! On the wire the crate field is at most 4 bits, the card field at most 5 bits
//! and the channel field at most 8 bits (SIS3316). Each component gets its own
//! byte in the key, so the mapping is injective over the whole `u8` cube and
//! not only over the ranges the hardware emits.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier for one (crate, card, channel) triple.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ChannelKey(u32);

impl ChannelKey {
    /// Raw integer form, as written into column metadata.
    #[inline]
    pub const fn get(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn crate_id(self) -> u8 {
        (self.0 >> 16) as u8
    }

    #[inline]
    pub const fn card(self) -> u8 {
        (self.0 >> 8) as u8
    }

    #[inline]
    pub const fn channel(self) -> u8 {
        self.0 as u8
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (crate {}, card {}, channel {})",
            self.0,
            self.crate_id(),
            self.card(),
            self.channel()
        )
    }
}

/// Fold a (crate, card, channel) triple into its channel key.
#[inline]
pub const fn get_ccc(crate_id: u8, card: u8, channel: u8) -> ChannelKey {
    ChannelKey(((crate_id as u32) << 16) | ((card as u32) << 8) | channel as u32)
}
