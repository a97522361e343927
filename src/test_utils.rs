//! Test utilities for inspecting trace buffers
//!
//! Provides a deterministic clock and a small event decoder used by the unit
//! tests and benches. Decoding walks packet headers, so it only works on
//! buffers that are not being written to.

use std::cell::Cell;
use std::rc::Rc;

use crate::clock::Clock;
use crate::packet::{PACKET_HEADER_SIZE, PacketHeader};
use crate::ring::RingBuffer;
use crate::types::{EVENT_HEADER_SIZE, Opcode, TaskId};
use crate::{Result, TraceError};

/// Clock whose timestamps are set by the test.
///
/// Clones share the same time, so a test can keep one handle and move the
/// other into a ring buffer.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<u64>>,
}

impl ManualClock {
    pub fn starting_at(ns: u64) -> Self {
        Self { now: Rc::new(Cell::new(ns)) }
    }

    pub fn set(&self, ns: u64) {
        self.now.set(ns);
    }

    pub fn advance(&self, ns: u64) {
        self.now.set(self.now.get() + ns);
    }
}

impl Clock for ManualClock {
    fn write_timestamp(&self, buf: &mut [u8], offset: usize) {
        buf[offset..offset + 8].copy_from_slice(&self.now.get().to_le_bytes());
    }
}

/// Decoded payload of one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Create { parent: TaskId, child: TaskId, kind: u8 },
    Read { observer: TaskId, observed: TaskId },
    Fulfill { current: TaskId, task: TaskId },
    Fail { current: TaskId, task: TaskId, message: String },
    Becomes { old: TaskId, new: TaskId },
    Label { task: TaskId, text: String },
    Increase { current: TaskId, amount: i64, counter: String },
    Switch { task: TaskId },
    Gc { duration_ns: u64 },
}

/// One decoded event and where it sat in the arena.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedEvent {
    pub offset: usize,
    pub len: usize,
    pub timestamp: u64,
    pub payload: Payload,
}

/// Header and events of one packet.
#[derive(Debug, Clone)]
pub struct DecodedPacket {
    pub start: usize,
    pub header: PacketHeader,
    pub events: Vec<DecodedEvent>,
}

/// Decode every packet in arena order, trusting each header's content size.
pub fn decode_packets(bytes: &[u8]) -> Result<Vec<DecodedPacket>> {
    let mut packets = Vec::new();
    let mut start = 0;
    while start < bytes.len() {
        let header = PacketHeader::parse_from_memory(&bytes[start..])?;
        header.validate()?;
        let end = start + header.packet_len();
        if end > bytes.len() {
            return Err(TraceError::parse_error(
                "packet",
                format!("packet at {start} runs past the buffer end"),
            ));
        }
        let events = decode_run(bytes, start + PACKET_HEADER_SIZE, start + header.content_len())?;
        packets.push(DecodedPacket { start, header, events });
        start = end;
    }
    Ok(packets)
}

/// Decode a stopped buffer's events, oldest packet first.
///
/// Packets are ordered by the timestamp of their first event, so this is
/// only reliable when the clock moved between packets or nothing wrapped.
pub fn decode_bytes(bytes: &[u8]) -> Result<Vec<Payload>> {
    let mut packets = decode_packets(bytes)?;
    packets.retain(|p| !p.events.is_empty());
    packets.sort_by_key(|p| p.events[0].timestamp);
    Ok(packets.into_iter().flat_map(|p| p.events).map(|e| e.payload).collect())
}

/// Decode a ring buffer's events in write order.
///
/// The active packet is read up to the write cursor whether or not it has
/// been finalized; the packet after it holds the oldest surviving events.
pub fn decode_ring(ring: &RingBuffer) -> Result<Vec<DecodedEvent>> {
    let bytes = ring.as_bytes();
    let n = ring.packet_count();
    let active = ring.active_packet();
    let mut events = Vec::new();
    for step in 1..=n {
        let index = (active + step) % n;
        let Some((start, _)) = ring.packet_range(index) else {
            continue;
        };
        let content_end = if index == active {
            ring.cursor()
        } else {
            let header = PacketHeader::parse_from_memory(&bytes[start..])?;
            header.validate()?;
            start + header.content_len()
        };
        events.extend(decode_run(bytes, start + PACKET_HEADER_SIZE, content_end)?);
    }
    Ok(events)
}

fn decode_run(bytes: &[u8], mut at: usize, end: usize) -> Result<Vec<DecodedEvent>> {
    let mut events = Vec::new();
    while at < end {
        let event = decode_event(bytes, at, end)?;
        at += event.len;
        events.push(event);
    }
    Ok(events)
}

fn decode_event(bytes: &[u8], offset: usize, end: usize) -> Result<DecodedEvent> {
    if offset + EVENT_HEADER_SIZE > end {
        return Err(TraceError::parse_error("event", format!("truncated event at {offset}")));
    }
    let timestamp = read_u64(bytes, offset);
    let opcode = Opcode::try_from(bytes[offset + 8])?;
    let mut at = offset + EVENT_HEADER_SIZE;
    if at + opcode.fixed_payload_len() > end {
        return Err(TraceError::parse_error("event", format!("truncated payload at {offset}")));
    }

    let id = |at: &mut usize| {
        let value = TaskId(read_u64(bytes, *at) as i64);
        *at += 8;
        value
    };
    let payload = match opcode {
        Opcode::Create => {
            let parent = id(&mut at);
            let child = id(&mut at);
            let kind = bytes[at];
            at += 1;
            Payload::Create { parent, child, kind }
        }
        Opcode::Read => Payload::Read { observer: id(&mut at), observed: id(&mut at) },
        Opcode::Fulfill => Payload::Fulfill { current: id(&mut at), task: id(&mut at) },
        Opcode::Fail => {
            let current = id(&mut at);
            let task = id(&mut at);
            Payload::Fail { current, task, message: read_cstr(bytes, &mut at, end)? }
        }
        Opcode::Becomes => Payload::Becomes { old: id(&mut at), new: id(&mut at) },
        Opcode::Label => {
            let task = id(&mut at);
            Payload::Label { task, text: read_cstr(bytes, &mut at, end)? }
        }
        Opcode::Increase => {
            let current = id(&mut at);
            let amount = id(&mut at).raw();
            Payload::Increase { current, amount, counter: read_cstr(bytes, &mut at, end)? }
        }
        Opcode::Switch => Payload::Switch { task: id(&mut at) },
        Opcode::Gc => Payload::Gc { duration_ns: id(&mut at).raw() as u64 },
    };

    Ok(DecodedEvent { offset, len: at - offset, timestamp, payload })
}

fn read_u64(bytes: &[u8], at: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(raw)
}

fn read_cstr(bytes: &[u8], at: &mut usize, end: usize) -> Result<String> {
    let window = &bytes[*at..end];
    let nul = window
        .iter()
        .position(|b| *b == 0)
        .ok_or_else(|| TraceError::parse_error("event", "unterminated string"))?;
    let text = String::from_utf8_lossy(&window[..nul]).into_owned();
    *at += nul + 1;
    Ok(text)
}
