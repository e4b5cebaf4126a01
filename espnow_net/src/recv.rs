//! The producing side of the receive queue.

use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use espnow_proto::{PeerAddr, frame};
use espnow_utils::{Uptime, ring};

use crate::stats::Counters;

/// Number of pending receive notifications that can be queued before new ones
/// are coalesced into them.
pub(crate) const NOTIFY_QUEUE_LEN: usize = 16;

/// Places inbound datagrams into the receive queue.
///
/// This runs in the radio stack's context: it never blocks, never allocates
/// and never calls application code. When the application asked to be
/// notified, it leaves the sender's address in a bounded queue instead, for
/// [`Endpoint::dispatch_notifications`](crate::Endpoint::dispatch_notifications)
/// to pick up.
#[derive(Debug)]
pub struct RecvHandler {
    writer: ring::FrameWriter,
    counters: Arc<Counters>,
    notify: rtrb::Producer<PeerAddr>,
    armed: Arc<AtomicBool>,
    uptime: Uptime,
}

impl RecvHandler {
    #[inline(always)]
    pub(crate) fn new(
        writer: ring::FrameWriter,
        counters: Arc<Counters>,
        notify: rtrb::Producer<PeerAddr>,
        armed: Arc<AtomicBool>,
        uptime: Uptime,
    ) -> Self {
        Self {
            writer,
            counters,
            notify,
            armed,
            uptime,
        }
    }

    /// Handles one datagram of `data` received from `peer` with a signal
    /// strength of `rssi` dBm.
    ///
    /// If the receive queue doesn't have room for the whole frame, the
    /// datagram is dropped, and frames already queued are left untouched.
    #[inline]
    pub fn on_recv(&mut self, peer: &PeerAddr, data: &[u8], rssi: i8) {
        let meta = frame::Metadata::new(self.uptime.millis(), rssi);

        // the radio stack never hands out oversized datagrams, count them as
        // dropped if it ever does
        let queued = frame::encode_frame(peer, data, meta)
            .is_ok_and(|frame| self.writer.try_write(&frame));

        if !queued {
            self.counters
                .dropped_rx_packets
                .fetch_add(1, Ordering::Relaxed);
            return;
        }

        self.counters.rx_packets.fetch_add(1, Ordering::Relaxed);

        if self.armed.load(Ordering::Acquire) {
            // a full queue means the application already has enough
            // notifications to catch up with
            let _ = self.notify.push(*peer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::{num, time::Duration};
    use espnow_proto::MAX_FRAME_LEN;

    type Harness = (
        RecvHandler,
        ring::FrameReader,
        rtrb::Consumer<PeerAddr>,
        Arc<AtomicBool>,
        Arc<Counters>,
    );

    fn handler(capacity: usize) -> Harness {
        let (writer, reader) = ring::frame_queue(num::NonZeroUsize::new(capacity).unwrap());
        let (notify, tokens) = rtrb::RingBuffer::new(NOTIFY_QUEUE_LEN);
        let armed = Arc::new(AtomicBool::new(false));
        let counters = Arc::new(Counters::default());

        let handler = RecvHandler::new(
            writer,
            Arc::clone(&counters),
            notify,
            Arc::clone(&armed),
            Uptime::new(),
        );

        (handler, reader, tokens, armed, counters)
    }

    #[test]
    fn queues_whole_frames() {
        let (mut handler, mut reader, ..) = handler(MAX_FRAME_LEN);
        let peer = PeerAddr([1, 2, 3, 4, 5, 6]);

        handler.on_recv(&peer, b"hello", -60);

        let mut bytes = [0; frame::frame_len(5)];
        reader.read_exact(&mut bytes, Duration::ZERO).unwrap();

        let frame = frame::decode_frame(&bytes).unwrap();
        assert_eq!(frame.peer, peer);
        assert_eq!(frame.msg, b"hello");
        #[cfg(feature = "rssi")]
        assert_eq!(frame.header.meta.rssi(), Some(-60));
    }

    #[test]
    fn drops_newest_when_full() {
        let (mut handler, reader, _, _, counters) = handler(frame::frame_len(10) + 4);
        let peer = PeerAddr([1, 2, 3, 4, 5, 6]);

        handler.on_recv(&peer, &[0xaa; 10], 0);
        handler.on_recv(&peer, &[0xbb; 10], 0);

        assert_eq!(reader.available(), frame::frame_len(10));
        assert_eq!(counters.rx_packets.load(Ordering::Relaxed), 1);
        assert_eq!(counters.dropped_rx_packets.load(Ordering::Relaxed), 1);

        // 4 bytes left, not even enough for an empty frame
        assert_eq!(reader.capacity() - reader.available(), 4);
        handler.on_recv(&peer, &[], 0);
        assert_eq!(counters.dropped_rx_packets.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn notifies_only_when_armed() {
        let (mut handler, _reader, mut tokens, armed, _) = handler(4 * MAX_FRAME_LEN);
        let peer = PeerAddr([1, 2, 3, 4, 5, 6]);

        handler.on_recv(&peer, b"a", 0);
        assert_eq!(tokens.slots(), 0);

        armed.store(true, Ordering::Release);
        handler.on_recv(&peer, b"b", 0);
        handler.on_recv(&peer, b"c", 0);
        assert_eq!(tokens.slots(), 2);
        assert_eq!(tokens.pop(), Ok(peer));
    }
}
