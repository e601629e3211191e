//! Packet framing over a raw ORCA data stream.
//!
//! The stream is a sequence of packets, each a run of 32-bit words whose
//! first word carries the packet length in its low 18 bits:
//!
//! ```text
//! [ w0 = dataId << 18 | n ][ w1 ] ... [ w(n-1) ]   [ next packet ... ]
//! ```
//!
//! A zero length or a length above the configured limit cannot be skipped
//! safely (the position of the next packet is unknown), so both are fatal. A
//! packet cut off by the end of the stream is counted and ends iteration.

use crate::config::{ByteOrder, StreamConfig};
use crate::error::{AppResult, DaqError};
use orca_core::limits::PACKET_LENGTH_MASK;
use std::io::{ErrorKind, Read};
use tracing::warn;

/// Reads whole packets from any byte source.
#[derive(Debug)]
pub struct PacketReader<R> {
    reader: R,
    byte_order: ByteOrder,
    max_packet_words: usize,
    packets_read: u64,
    last_packet_id: u32,
    truncated_tail: bool,
    bytes: Vec<u8>,
}

impl<R: Read> PacketReader<R> {
    pub fn new(reader: R, config: &StreamConfig) -> Self {
        Self {
            reader,
            byte_order: config.byte_order,
            max_packet_words: config.max_packet_words,
            packets_read: 0,
            last_packet_id: 0,
            truncated_tail: false,
            bytes: Vec::new(),
        }
    }

    /// Packets returned so far.
    pub fn packets_read(&self) -> u64 {
        self.packets_read
    }

    /// Id of the packet most recently returned by [`read_packet`](Self::read_packet).
    ///
    /// Ids count from 0 in stream order.
    pub fn last_packet_id(&self) -> u32 {
        self.last_packet_id
    }

    /// Whether the stream ended in the middle of a packet.
    pub fn truncated_tail(&self) -> bool {
        self.truncated_tail
    }

    /// Read the next packet into `words`, replacing its contents.
    ///
    /// Returns `Ok(false)` at a clean end of stream or when the final packet
    /// is incomplete.
    pub fn read_packet(&mut self, words: &mut Vec<u32>) -> AppResult<bool> {
        words.clear();
        let Some(first) = self.read_words(1)? else {
            return Ok(false);
        };
        let word0 = self.decode_word(&first);
        let length = (word0 & PACKET_LENGTH_MASK) as usize;

        let packet_id = u32::try_from(self.packets_read).map_err(|_| DaqError::Framing {
            packet_id: u32::MAX,
            reason: format!("stream holds more than {} packets", u64::from(u32::MAX) + 1),
        })?;

        if length == 0 {
            return Err(DaqError::Framing {
                packet_id,
                reason: "zero-length packet".to_string(),
            });
        }
        if length > self.max_packet_words {
            return Err(DaqError::Framing {
                packet_id,
                reason: format!(
                    "packet length {} exceeds limit of {} words",
                    length, self.max_packet_words
                ),
            });
        }

        words.reserve(length);
        words.push(word0);
        if length > 1 {
            match self.read_words(length - 1)? {
                Some(_) => {
                    let byte_order = self.byte_order;
                    words.extend(
                        self.bytes
                            .chunks_exact(4)
                            .map(|chunk| word_from(byte_order, chunk)),
                    );
                }
                None => {
                    self.truncated_tail = true;
                    warn!(packet_id, length, "Stream ended inside a packet");
                    words.clear();
                    return Ok(false);
                }
            }
        }
        self.last_packet_id = packet_id;
        self.packets_read += 1;
        Ok(true)
    }

    /// Fill the scratch buffer with `count` words.
    ///
    /// `None` means the stream ended first. Ending before the first byte of
    /// a packet is a clean end and is not flagged as truncated.
    fn read_words(&mut self, count: usize) -> AppResult<Option<[u8; 4]>> {
        self.bytes.resize(count * 4, 0);
        let mut filled = 0;
        while filled < self.bytes.len() {
            match self.reader.read(&mut self.bytes[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        if filled == self.bytes.len() {
            let mut head = [0u8; 4];
            head.copy_from_slice(&self.bytes[..4]);
            Ok(Some(head))
        } else {
            if filled > 0 && count == 1 {
                self.truncated_tail = true;
                warn!(
                    packet_id = self.packets_read,
                    bytes = filled,
                    "Stream ended inside a length word"
                );
            }
            Ok(None)
        }
    }

    fn decode_word(&self, bytes: &[u8; 4]) -> u32 {
        word_from(self.byte_order, bytes)
    }
}

fn word_from(byte_order: ByteOrder, bytes: &[u8]) -> u32 {
    let raw = [bytes[0], bytes[1], bytes[2], bytes[3]];
    match byte_order {
        ByteOrder::Little => u32::from_le_bytes(raw),
        ByteOrder::Big => u32::from_be_bytes(raw),
    }
}

/// Serialise packets back into a byte stream.
pub fn encode_packets<'a>(
    packets: impl IntoIterator<Item = &'a [u32]>,
    byte_order: ByteOrder,
) -> Vec<u8> {
    let mut out = Vec::new();
    for packet in packets {
        for &word in packet {
            match byte_order {
                ByteOrder::Little => out.extend_from_slice(&word.to_le_bytes()),
                ByteOrder::Big => out.extend_from_slice(&word.to_be_bytes()),
            }
        }
    }
    out
}
