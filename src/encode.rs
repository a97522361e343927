//! Field writers for event payloads.
//!
//! Every writer takes the arena and an offset and returns the next free
//! offset, so payloads are written left to right:
//!
//! ```rust,ignore
//! let i = put_i64(buf, i, parent.raw());
//! let i = put_i64(buf, i, child.raw());
//! put_u8(buf, i, kind.code());
//! ```
//!
//! Nothing here allocates. Strings are NUL-terminated and cut at their first
//! interior NUL so a reader scanning for the terminator lands on the right
//! byte.

use std::fmt::{self, Display, Write};

/// Writes a single byte.
#[inline]
pub(crate) fn put_u8(buf: &mut [u8], offset: usize, byte: u8) -> usize {
    buf[offset] = byte;
    offset + 1
}

/// Writes an unsigned integer, always as 8 little-endian bytes.
#[inline]
pub(crate) fn put_u64(buf: &mut [u8], offset: usize, value: u64) -> usize {
    buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
    offset + 8
}

/// Writes a signed integer, always as 8 little-endian bytes (two's complement).
#[inline]
pub(crate) fn put_i64(buf: &mut [u8], offset: usize, value: i64) -> usize {
    put_u64(buf, offset, value as u64)
}

/// Bytes of `text` that get written, before the terminator.
#[inline]
fn text_bytes(text: &str) -> &[u8] {
    let bytes = text.as_bytes();
    match bytes.iter().position(|b| *b == 0) {
        Some(nul) => &bytes[..nul],
        None => bytes,
    }
}

/// Encoded length of `text` including its NUL terminator.
#[inline]
pub(crate) fn cstr_len(text: &str) -> usize {
    text_bytes(text).len() + 1
}

/// Writes `text` followed by a NUL terminator.
#[inline]
pub(crate) fn put_cstr(buf: &mut [u8], offset: usize, text: &str) -> usize {
    let bytes = text_bytes(text);
    let end = offset + bytes.len();
    buf[offset..end].copy_from_slice(bytes);
    put_u8(buf, end, 0)
}

/// Counts rendered bytes up to the first NUL.
struct LenCounter {
    len: usize,
    stopped: bool,
}

impl Write for LenCounter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if !self.stopped {
            let bytes = text_bytes(s);
            self.len += bytes.len();
            self.stopped = bytes.len() < s.len();
        }
        Ok(())
    }
}

/// Copies rendered bytes into a fixed window, dropping anything past it.
struct SliceWriter<'a> {
    out: &'a mut [u8],
    pos: usize,
    stopped: bool,
}

impl Write for SliceWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if self.stopped {
            return Ok(());
        }
        let bytes = text_bytes(s);
        let room = self.out.len() - self.pos;
        let n = bytes.len().min(room);
        self.out[self.pos..self.pos + n].copy_from_slice(&bytes[..n]);
        self.pos += n;
        self.stopped = bytes.len() < s.len();
        Ok(())
    }
}

/// Encoded length of a rendered value including its NUL terminator.
pub(crate) fn display_len(value: &dyn Display) -> usize {
    let mut counter = LenCounter { len: 0, stopped: false };
    // LenCounter never fails; an Err here comes from the value's own Display
    // impl and leaves whatever was counted so far.
    let _ = write!(counter, "{value}");
    counter.len + 1
}

/// Renders `value` into exactly `encoded_len - 1` bytes plus a terminator.
///
/// `encoded_len` comes from [`display_len`]. If the second rendering comes
/// out shorter, the gap is filled with spaces so the record keeps the length
/// that was reserved for it.
pub(crate) fn put_display(
    buf: &mut [u8],
    offset: usize,
    value: &dyn Display,
    encoded_len: usize,
) -> usize {
    let text_end = offset + encoded_len - 1;
    let mut writer = SliceWriter { out: &mut buf[offset..text_end], pos: 0, stopped: false };
    let _ = write!(writer, "{value}");
    let written = writer.pos;
    buf[offset + written..text_end].fill(b' ');
    put_u8(buf, text_end, 0)
}
