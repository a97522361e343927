//! Packet layout and header handling
//!
//! The ring buffer's arena is split into packets. Every packet starts with a
//! fixed 28-byte header followed by a run of back-to-back events:
//!
//! | Offset | Size | Field                                    |
//! |--------|------|------------------------------------------|
//! | 0      | 4    | magic `0xC1FC1FC1`                       |
//! | 4      | 16   | format identifier                        |
//! | 20     | 4    | declared packet size in bits             |
//! | 24     | 2    | content size in bits, low 16 bits        |
//! | 26     | 2    | content size in bits, high 16 bits       |
//!
//! All fields are little-endian. The content size always covers the header
//! itself, so an empty packet declares `28 * 8` bits of content.
//!
//! A packet that was created or reset but never finalized carries that empty
//! content size, which is how a reader should treat packets left behind by a
//! session that never reached `stop`.

use crate::{Result, TraceError};

/// Magic constant at the start of every packet.
pub const PACKET_MAGIC: u32 = 0xC1FC_1FC1;

/// Identifier of this trace format and version.
pub const FORMAT_ID: [u8; 16] = [
    0x05, 0x88, 0x3b, 0x8d, 0x52, 0x1a, 0x48, 0x7b, 0xb3, 0x97, 0x45, 0x6a, 0xb1, 0x50, 0x68, 0x0c,
];

/// Size of the packet header in bytes.
pub const PACKET_HEADER_SIZE: usize = 28;

const MAGIC_OFFSET: usize = 0;
const FORMAT_ID_OFFSET: usize = 4;
const PACKET_SIZE_OFFSET: usize = 20;
const CONTENT_SIZE_LOW_OFFSET: usize = 24;
const CONTENT_SIZE_HIGH_OFFSET: usize = 26;

/// A fixed region of the ring buffer's arena.
///
/// Packets do not own any bytes; they record an offset range and are handed
/// the arena whenever they need to write their header.
#[derive(Debug, Clone)]
pub(crate) struct Packet {
    start: usize,
    end: usize,
    content_end: usize,
}

impl Packet {
    /// Carve out `[offset, offset + length)` and write its header.
    ///
    /// `length` must hold at least the header; configuration validation
    /// guarantees this.
    pub(crate) fn create(offset: usize, length: usize, buf: &mut [u8]) -> Self {
        debug_assert!(length > PACKET_HEADER_SIZE);
        let region = &mut buf[offset..offset + PACKET_HEADER_SIZE];
        region[MAGIC_OFFSET..FORMAT_ID_OFFSET].copy_from_slice(&PACKET_MAGIC.to_le_bytes());
        region[FORMAT_ID_OFFSET..PACKET_SIZE_OFFSET].copy_from_slice(&FORMAT_ID);
        let bits = (length as u32) * 8;
        region[PACKET_SIZE_OFFSET..CONTENT_SIZE_LOW_OFFSET].copy_from_slice(&bits.to_le_bytes());

        let mut packet = Self { start: offset, end: offset + length, content_end: offset };
        packet.reset(buf);
        packet
    }

    /// Discard the packet's content.
    ///
    /// Old event bytes stay in place; only the content size changes.
    pub(crate) fn reset(&mut self, buf: &mut [u8]) {
        let header_end = self.header_end();
        self.finalize(buf, header_end);
    }

    /// Record that `[start, content_end)` holds valid content.
    pub(crate) fn finalize(&mut self, buf: &mut [u8], content_end: usize) {
        debug_assert!(content_end > self.start && content_end <= self.end);
        self.content_end = content_end;
        let bits = ((content_end - self.start) * 8) as u32;
        let low = (bits & 0xFFFF) as u16;
        let high = (bits >> 16) as u16;
        let at = self.start + CONTENT_SIZE_LOW_OFFSET;
        buf[at..at + 2].copy_from_slice(&low.to_le_bytes());
        let at = self.start + CONTENT_SIZE_HIGH_OFFSET;
        buf[at..at + 2].copy_from_slice(&high.to_le_bytes());
    }

    pub(crate) fn start(&self) -> usize {
        self.start
    }

    pub(crate) fn end(&self) -> usize {
        self.end
    }

    pub(crate) fn header_end(&self) -> usize {
        self.start + PACKET_HEADER_SIZE
    }

    pub(crate) fn content_end(&self) -> usize {
        self.content_end
    }
}

/// A packet header read back from raw bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub magic: u32,
    pub format_id: [u8; 16],
    /// Declared packet size in bits
    pub packet_bits: u32,
    /// Valid content size in bits, header included
    pub content_bits: u32,
}

impl PacketHeader {
    /// Parse a header from the first bytes of `memory`.
    pub fn parse_from_memory(memory: &[u8]) -> Result<Self> {
        if memory.len() < PACKET_HEADER_SIZE {
            return Err(TraceError::parse_error(
                "packet header",
                format!("need {} bytes, found {}", PACKET_HEADER_SIZE, memory.len()),
            ));
        }

        let magic = read_u32_le(memory, MAGIC_OFFSET);
        let mut format_id = [0u8; 16];
        format_id.copy_from_slice(&memory[FORMAT_ID_OFFSET..PACKET_SIZE_OFFSET]);
        let packet_bits = read_u32_le(memory, PACKET_SIZE_OFFSET);
        let low = u16::from_le_bytes([
            memory[CONTENT_SIZE_LOW_OFFSET],
            memory[CONTENT_SIZE_LOW_OFFSET + 1],
        ]) as u32;
        let high = u16::from_le_bytes([
            memory[CONTENT_SIZE_HIGH_OFFSET],
            memory[CONTENT_SIZE_HIGH_OFFSET + 1],
        ]) as u32;

        Ok(Self { magic, format_id, packet_bits, content_bits: (high << 16) | low })
    }

    /// Check magic, format id and size consistency.
    pub fn validate(&self) -> Result<()> {
        if self.magic != PACKET_MAGIC {
            return Err(TraceError::parse_error(
                "packet header",
                format!("bad magic {:#010x}", self.magic),
            ));
        }
        if self.format_id != FORMAT_ID {
            return Err(TraceError::parse_error("packet header", "unknown format identifier"));
        }
        let header_bits = (PACKET_HEADER_SIZE * 8) as u32;
        if self.content_bits < header_bits || self.content_bits > self.packet_bits {
            return Err(TraceError::parse_error(
                "packet header",
                format!(
                    "content size {} bits outside [{}, {}]",
                    self.content_bits, header_bits, self.packet_bits
                ),
            ));
        }
        if self.content_bits % 8 != 0 || self.packet_bits % 8 != 0 {
            return Err(TraceError::parse_error("packet header", "sizes are not whole bytes"));
        }
        Ok(())
    }

    /// Declared packet length in bytes.
    pub fn packet_len(&self) -> usize {
        (self.packet_bits / 8) as usize
    }

    /// Valid content length in bytes, header included.
    pub fn content_len(&self) -> usize {
        (self.content_bits / 8) as usize
    }

    /// Whether the packet holds no events.
    pub fn is_empty(&self) -> bool {
        self.content_len() <= PACKET_HEADER_SIZE
    }
}

fn read_u32_le(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]])
}
