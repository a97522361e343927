//! Packet-segmented circular event buffer
//!
//! The arena is allocated once and split into a fixed number of packets. A
//! single write cursor moves through the active packet; when the next event
//! would reach the packet end, the packet is finalized and the cursor jumps
//! to the next packet in the ring, discarding whatever it held.
//!
//! # Event layout
//!
//! Every event is `timestamp (8) | opcode (1) | payload`, written back to back
//! after the packet header. Payload integers are 64-bit little-endian, task
//! kinds a single byte, and text NUL-terminated.
//!
//! # Write path
//!
//! [`RingBuffer::emit`] reserves room for one event, rolling over to the next
//! packet when needed, writes the timestamp and opcode, and returns the offset
//! where the payload goes. The encoders in the [`TraceHooks`] impl then fill
//! the payload field by field. Nothing on this path allocates.

use std::fmt::{self, Display};
use std::time::Duration;
use tracing::{debug, trace};

use crate::clock::{Clock, MonotonicClock};
use crate::config::TraceConfig;
use crate::encode::{cstr_len, display_len, put_cstr, put_display, put_i64, put_u8, put_u64};
use crate::hooks::TraceHooks;
use crate::packet::Packet;
use crate::types::{EVENT_HEADER_SIZE, Opcode, TaskId, TaskKind};
use crate::Result;

/// Fixed-capacity ring of packets holding encoded events.
pub struct RingBuffer {
    buf: Box<[u8]>,
    packets: Vec<Packet>,
    active: usize,
    cursor: usize,
    packet_end: usize,
    clock: Box<dyn Clock>,
    /// Id carried by the last SWITCH event, `None` before the first one
    last_switch: Option<TaskId>,
    rollovers: u64,
}

impl fmt::Debug for RingBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingBuffer")
            .field("len", &self.buf.len())
            .field("packets", &self.packets.len())
            .field("active", &self.active)
            .field("cursor", &self.cursor)
            .field("last_switch", &self.last_switch)
            .field("rollovers", &self.rollovers)
            .finish()
    }
}

impl RingBuffer {
    /// Allocate a ring buffer timestamped by a [`MonotonicClock`].
    pub fn new(config: &TraceConfig) -> Result<Self> {
        Self::with_clock(config, Box::new(MonotonicClock::new()))
    }

    /// Allocate a ring buffer with a custom clock.
    pub fn with_clock(config: &TraceConfig, clock: Box<dyn Clock>) -> Result<Self> {
        config.validate()?;

        let mut buf = vec![0u8; config.buffer_size].into_boxed_slice();
        let packet_size = config.packet_size();
        let packets: Vec<Packet> = (0..config.packet_count)
            .map(|i| {
                let offset = i * packet_size;
                let length = if i + 1 == config.packet_count {
                    config.last_packet_size()
                } else {
                    packet_size
                };
                Packet::create(offset, length, &mut buf)
            })
            .collect();

        let cursor = packets[0].header_end();
        let packet_end = packets[0].end();

        debug!(
            buffer_size = config.buffer_size,
            packet_count = config.packet_count,
            packet_size,
            "Allocated trace ring buffer"
        );

        Ok(Self {
            buf,
            packets,
            active: 0,
            cursor,
            packet_end,
            clock,
            last_switch: None,
            rollovers: 0,
        })
    }

    /// Reserve room for one event and write its timestamp and opcode.
    ///
    /// Returns the offset where the `payload_len`-byte payload starts.
    ///
    /// # Panics
    ///
    /// Panics if the event cannot fit in an empty packet. This means the
    /// configured packet size is too small for the event (for example a
    /// label longer than a packet) and the trace cannot continue.
    pub(crate) fn emit(&mut self, opcode: Opcode, payload_len: usize) -> usize {
        loop {
            let i = self.cursor;
            let record_end = i + EVENT_HEADER_SIZE + payload_len;
            if record_end >= self.packet_end {
                self.rollover(i, payload_len);
                continue;
            }

            self.cursor = record_end;
            self.clock.write_timestamp(&mut self.buf, i);
            put_u8(&mut self.buf, i + 8, opcode as u8);
            return i + EVENT_HEADER_SIZE;
        }
    }

    fn rollover(&mut self, i: usize, payload_len: usize) {
        let packet = &mut self.packets[self.active];
        assert!(
            i > packet.header_end(),
            "trace event of {} bytes does not fit in a {}-byte packet",
            EVENT_HEADER_SIZE + payload_len,
            packet.end() - packet.start()
        );
        packet.finalize(&mut self.buf, i);

        self.active = (self.active + 1) % self.packets.len();
        let next = &mut self.packets[self.active];
        next.reset(&mut self.buf);
        self.cursor = next.header_end();
        self.packet_end = next.end();
        self.rollovers += 1;

        trace!(packet = self.active, rollovers = self.rollovers, "Trace packet rollover");
    }

    /// Forget the last recorded SWITCH so a new session opens with one.
    pub(crate) fn begin_session(&mut self) {
        self.last_switch = None;
    }

    /// Record the content end of the active packet at the write cursor.
    ///
    /// Leaves the buffer self-describing for a reader.
    pub(crate) fn finalize_active(&mut self) {
        let cursor = self.cursor;
        self.packets[self.active].finalize(&mut self.buf, cursor);
    }

    /// Raw arena bytes. Only meaningful while writing is paused.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Give up the ring buffer and keep its bytes.
    pub fn into_bytes(self) -> Box<[u8]> {
        self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn packet_count(&self) -> usize {
        self.packets.len()
    }

    /// Index of the packet currently being written.
    pub fn active_packet(&self) -> usize {
        self.active
    }

    /// Absolute offset of the next event.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Byte range `[start, end)` of packet `index`.
    pub fn packet_range(&self, index: usize) -> Option<(usize, usize)> {
        self.packets.get(index).map(|p| (p.start(), p.end()))
    }

    /// Offset one past the last valid byte of packet `index`.
    pub fn packet_content_end(&self, index: usize) -> Option<usize> {
        self.packets.get(index).map(Packet::content_end)
    }

    /// How many times the writer has moved on to the next packet.
    pub fn rollovers(&self) -> u64 {
        self.rollovers
    }

    /// Id carried by the most recent SWITCH event.
    pub fn last_switch(&self) -> Option<TaskId> {
        self.last_switch
    }

    fn write_pair(&mut self, opcode: Opcode, first: TaskId, second: TaskId) {
        let i = self.emit(opcode, 16);
        let i = put_i64(&mut self.buf, i, first.raw());
        put_i64(&mut self.buf, i, second.raw());
    }
}

impl TraceHooks for RingBuffer {
    fn note_created(&mut self, parent: TaskId, child: TaskId, kind: TaskKind) {
        let i = self.emit(Opcode::Create, 17);
        let i = put_i64(&mut self.buf, i, parent.raw());
        let i = put_i64(&mut self.buf, i, child.raw());
        put_u8(&mut self.buf, i, kind.code());
    }

    fn note_read(&mut self, observer: TaskId, observed: TaskId) {
        if observer != observed {
            self.write_pair(Opcode::Read, observer, observed);
        }
    }

    fn note_resolved(&mut self, current: TaskId, task: TaskId, failure: Option<&dyn Display>) {
        match failure {
            None => self.write_pair(Opcode::Fulfill, current, task),
            Some(failure) => {
                let text_len = display_len(failure);
                let i = self.emit(Opcode::Fail, 16 + text_len);
                let i = put_i64(&mut self.buf, i, current.raw());
                let i = put_i64(&mut self.buf, i, task.raw());
                put_display(&mut self.buf, i, failure, text_len);
            }
        }
    }

    fn note_becomes(&mut self, old: TaskId, new: TaskId) {
        if old != new {
            self.write_pair(Opcode::Becomes, old, new);
        }
    }

    fn note_label(&mut self, task: TaskId, label: &str) {
        let i = self.emit(Opcode::Label, 8 + cstr_len(label));
        let i = put_i64(&mut self.buf, i, task.raw());
        put_cstr(&mut self.buf, i, label);
    }

    fn note_switch(&mut self, task: TaskId) {
        if self.last_switch == Some(task) {
            return;
        }
        self.last_switch = Some(task);
        let i = self.emit(Opcode::Switch, 8);
        put_i64(&mut self.buf, i, task.raw());
    }

    fn note_increase(&mut self, current: TaskId, counter: &str, amount: i64) {
        let i = self.emit(Opcode::Increase, 16 + cstr_len(counter));
        let i = put_i64(&mut self.buf, i, current.raw());
        let i = put_i64(&mut self.buf, i, amount);
        put_cstr(&mut self.buf, i, counter);
    }

    #[inline]
    fn note_gc(&mut self, duration: Duration) {
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        let i = self.emit(Opcode::Gc, 8);
        put_u64(&mut self.buf, i, nanos);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{PACKET_HEADER_SIZE, PacketHeader};
    use crate::test_utils::{DecodedEvent, ManualClock, Payload, decode_ring};
    use proptest::prelude::*;

    fn ring(buffer_size: usize, packet_count: usize) -> RingBuffer {
        let config = TraceConfig::new(buffer_size, packet_count);
        RingBuffer::with_clock(&config, Box::new(ManualClock::starting_at(1_000))).unwrap()
    }

    fn payloads(ring: &RingBuffer) -> Vec<Payload> {
        decode_ring(ring).unwrap().into_iter().map(|e| e.payload).collect()
    }

    #[test]
    fn arena_is_partitioned_with_remainder_in_last_packet() {
        let ring = ring(4099, 4);
        assert_eq!(ring.packet_count(), 4);
        assert_eq!(ring.packet_range(0), Some((0, 1024)));
        assert_eq!(ring.packet_range(2), Some((2048, 3072)));
        assert_eq!(ring.packet_range(3), Some((3072, 4099)));
        assert_eq!(ring.cursor(), PACKET_HEADER_SIZE);

        let last = PacketHeader::parse_from_memory(&ring.as_bytes()[3072..]).unwrap();
        assert_eq!(last.packet_len(), 1027);
    }

    #[test]
    fn create_event_layout() {
        let mut ring = ring(4096, 4);
        let start = ring.cursor();
        ring.note_created(TaskId(1), TaskId(5), TaskKind::Task);
        assert_eq!(ring.cursor() - start, 26);

        let bytes = &ring.as_bytes()[start..start + 26];
        assert_eq!(&bytes[0..8], &1_000u64.to_le_bytes());
        assert_eq!(bytes[8], Opcode::Create as u8);
        assert_eq!(&bytes[9..17], &1i64.to_le_bytes());
        assert_eq!(&bytes[17..25], &5i64.to_le_bytes());
        assert_eq!(bytes[25], 1);
    }

    #[test]
    fn fail_event_carries_message_and_terminator() {
        let mut ring = ring(4096, 4);
        let start = ring.cursor();
        ring.note_resolved(TaskId(2), TaskId(3), Some(&"boom"));
        assert_eq!(ring.cursor() - start, 9 + 16 + 5);
        assert_eq!(&ring.as_bytes()[start + 25..start + 30], b"boom\0");
        assert_eq!(
            payloads(&ring),
            vec![Payload::Fail { current: TaskId(2), task: TaskId(3), message: "boom".into() }]
        );
    }

    #[test]
    fn duplicate_transitions_are_suppressed() {
        let mut ring = ring(4096, 4);
        ring.note_read(TaskId(4), TaskId(4));
        ring.note_becomes(TaskId(6), TaskId(6));
        ring.note_switch(TaskId(7));
        ring.note_switch(TaskId(7));
        ring.note_read(TaskId(4), TaskId(5));
        ring.note_switch(TaskId::NONE);
        ring.note_switch(TaskId::NONE);

        assert_eq!(
            payloads(&ring),
            vec![
                Payload::Switch { task: TaskId(7) },
                Payload::Read { observer: TaskId(4), observed: TaskId(5) },
                Payload::Switch { task: TaskId::NONE },
            ]
        );
    }

    #[test]
    fn no_task_sentinel_is_minus_one_on_the_wire() {
        let mut ring = ring(4096, 4);
        let start = ring.cursor();
        ring.note_suspend();
        assert_eq!(&ring.as_bytes()[start + 9..start + 17], &(-1i64).to_le_bytes());
    }

    #[test]
    fn every_event_kind_decodes_in_order() {
        let mut ring = ring(4096, 4);
        ring.note_switch(TaskId(1));
        ring.note_created(TaskId(1), TaskId(2), TaskKind::Bind);
        ring.note_label(TaskId(2), "fetch");
        ring.note_read(TaskId(1), TaskId(2));
        ring.note_becomes(TaskId(2), TaskId(3));
        ring.note_increase(TaskId(1), "bytes", -40);
        ring.note_resolved(TaskId(1), TaskId(3), None);
        ring.note_gc(Duration::from_micros(250));

        assert_eq!(
            payloads(&ring),
            vec![
                Payload::Switch { task: TaskId(1) },
                Payload::Create {
                    parent: TaskId(1),
                    child: TaskId(2),
                    kind: TaskKind::Bind.code()
                },
                Payload::Label { task: TaskId(2), text: "fetch".into() },
                Payload::Read { observer: TaskId(1), observed: TaskId(2) },
                Payload::Becomes { old: TaskId(2), new: TaskId(3) },
                Payload::Increase { current: TaskId(1), amount: -40, counter: "bytes".into() },
                Payload::Fulfill { current: TaskId(1), task: TaskId(3) },
                Payload::Gc { duration_ns: 250_000 },
            ]
        );
    }

    #[test]
    fn rollover_finalizes_previous_packet() {
        let mut ring = ring(1024, 4);
        let first_end = ring.packet_range(0).unwrap().1;
        while ring.active_packet() == 0 {
            ring.note_gc(Duration::from_nanos(1));
        }

        assert_eq!(ring.rollovers(), 1);
        let finalized = ring.packet_content_end(0).unwrap();
        assert!(finalized < first_end);
        // The rollover rule never lets an event touch the packet end
        assert!(first_end - finalized <= 17);

        let header = PacketHeader::parse_from_memory(ring.as_bytes()).unwrap();
        assert_eq!(header.content_len(), finalized);
        assert_eq!((finalized - PACKET_HEADER_SIZE) % 17, 0);
    }

    #[test]
    fn events_end_exactly_one_byte_short_are_kept() {
        // 28-byte header + 17-byte GC events: packet of 28 + 17 * 2 + 1 holds two
        let size = PACKET_HEADER_SIZE + 17 * 2 + 1;
        let mut ring = ring(size * 2, 2);
        ring.note_gc(Duration::ZERO);
        ring.note_gc(Duration::ZERO);
        assert_eq!(ring.active_packet(), 0);
        ring.note_gc(Duration::ZERO);
        assert_eq!(ring.active_packet(), 1);
    }

    #[test]
    fn wraparound_keeps_only_recent_packets() {
        let mut ring = ring(1024, 4);
        let mut amount = 0i64;
        while ring.rollovers() < 9 {
            amount += 1;
            ring.note_increase(TaskId(1), "n", amount);
        }
        ring.finalize_active();

        let events = decode_ring(&ring).unwrap();
        let amounts: Vec<i64> = events
            .iter()
            .map(|e| match &e.payload {
                Payload::Increase { amount, .. } => *amount,
                other => panic!("unexpected event {other:?}"),
            })
            .collect();

        // Oldest surviving events are gone, the newest is the last written
        assert_eq!(*amounts.last().unwrap(), amount);
        assert!(amounts[0] > 1);
        assert!(amounts.windows(2).all(|w| w[1] == w[0] + 1));
    }

    #[test]
    fn timestamps_come_from_the_clock() {
        let config = TraceConfig::new(4096, 4);
        let clock = ManualClock::starting_at(10);
        let handle = clock.clone();
        let mut ring = RingBuffer::with_clock(&config, Box::new(clock)).unwrap();
        ring.note_switch(TaskId(1));
        handle.set(99);
        ring.note_switch(TaskId(2));

        let stamps: Vec<u64> = decode_ring(&ring).unwrap().iter().map(|e| e.timestamp).collect();
        assert_eq!(stamps, vec![10, 99]);
    }

    #[test]
    #[should_panic(expected = "does not fit")]
    fn oversized_label_is_fatal() {
        let mut ring = ring(1024, 4);
        let label = "x".repeat(400);
        ring.note_label(TaskId(1), &label);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let result = RingBuffer::new(&TraceConfig::new(64, 4));
        assert!(result.is_err());
    }

    #[derive(Debug, Clone)]
    enum Call {
        Created(i64, i64, u8),
        Read(i64, i64),
        Fulfill(i64, i64),
        Fail(i64, i64, String),
        Becomes(i64, i64),
        Label(i64, String),
        Switch(i64),
        Increase(i64, String, i64),
        Gc(u64),
    }

    fn arb_call() -> impl Strategy<Value = Call> {
        let id = -1i64..6;
        let text = "[a-z ]{0,24}";
        prop_oneof![
            (id.clone(), id.clone(), 0u8..15).prop_map(|(a, b, k)| Call::Created(a, b, k)),
            (id.clone(), id.clone()).prop_map(|(a, b)| Call::Read(a, b)),
            (id.clone(), id.clone()).prop_map(|(a, b)| Call::Fulfill(a, b)),
            (id.clone(), id.clone(), text).prop_map(|(a, b, m)| Call::Fail(a, b, m)),
            (id.clone(), id.clone()).prop_map(|(a, b)| Call::Becomes(a, b)),
            (id.clone(), text).prop_map(|(a, t)| Call::Label(a, t)),
            id.clone().prop_map(Call::Switch),
            (id, text, any::<i64>()).prop_map(|(a, t, n)| Call::Increase(a, t, n)),
            any::<u64>().prop_map(Call::Gc),
        ]
    }

    fn apply(ring: &mut RingBuffer, call: &Call, expected: &mut Vec<Payload>) {
        match call.clone() {
            Call::Created(p, c, k) => {
                ring.note_created(TaskId(p), TaskId(c), TaskKind::from_code(k).unwrap());
                expected.push(Payload::Create { parent: TaskId(p), child: TaskId(c), kind: k });
            }
            Call::Read(a, b) => {
                ring.note_read(TaskId(a), TaskId(b));
                if a != b {
                    expected.push(Payload::Read { observer: TaskId(a), observed: TaskId(b) });
                }
            }
            Call::Fulfill(a, b) => {
                ring.note_resolved(TaskId(a), TaskId(b), None);
                expected.push(Payload::Fulfill { current: TaskId(a), task: TaskId(b) });
            }
            Call::Fail(a, b, m) => {
                ring.note_resolved(TaskId(a), TaskId(b), Some(&m));
                expected.push(Payload::Fail { current: TaskId(a), task: TaskId(b), message: m });
            }
            Call::Becomes(a, b) => {
                ring.note_becomes(TaskId(a), TaskId(b));
                if a != b {
                    expected.push(Payload::Becomes { old: TaskId(a), new: TaskId(b) });
                }
            }
            Call::Label(a, t) => {
                ring.note_label(TaskId(a), &t);
                expected.push(Payload::Label { task: TaskId(a), text: t });
            }
            Call::Switch(a) => {
                if ring.last_switch() != Some(TaskId(a)) {
                    expected.push(Payload::Switch { task: TaskId(a) });
                }
                ring.note_switch(TaskId(a));
            }
            Call::Increase(a, t, n) => {
                ring.note_increase(TaskId(a), &t, n);
                expected.push(Payload::Increase { current: TaskId(a), amount: n, counter: t });
            }
            Call::Gc(ns) => {
                ring.note_gc(Duration::from_nanos(ns));
                expected.push(Payload::Gc { duration_ns: ns });
            }
        }
    }

    proptest! {
        #[test]
        fn call_sequences_decode_to_matching_events(
            calls in prop::collection::vec(arb_call(), 0..200)
        ) {
            // Large enough that nothing is evicted
            let mut ring = ring(64 * 1024, 4);
            let mut expected = Vec::new();
            for call in &calls {
                apply(&mut ring, call, &mut expected);
            }
            ring.finalize_active();
            prop_assert_eq!(payloads(&ring), expected);
        }

        #[test]
        fn records_never_cross_their_packet(calls in prop::collection::vec(arb_call(), 0..400)) {
            let mut ring = ring(2048, 4);
            let mut expected = Vec::new();
            for call in &calls {
                apply(&mut ring, call, &mut expected);
                let (_, end) = ring.packet_range(ring.active_packet()).unwrap();
                prop_assert!(ring.cursor() < end);
            }
            ring.finalize_active();

            let events: Vec<DecodedEvent> = decode_ring(&ring).unwrap();
            // Whatever survived eviction is the tail of the call sequence
            let decoded: Vec<Payload> = events.into_iter().map(|e| e.payload).collect();
            prop_assert!(expected.ends_with(&decoded));
        }
    }
}
