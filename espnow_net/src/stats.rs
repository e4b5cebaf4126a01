use core::sync::atomic::{AtomicUsize, Ordering};
use serde::Serialize;

/// Counters shared between the application and the radio stack's context.
///
/// Every counter has exactly one writer: `tx_packets` is only written by the
/// application, all the others only by the radio stack's callbacks. This is
/// what makes plain atomic increments sufficient, without any lock.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub rx_packets: AtomicUsize,
    pub dropped_rx_packets: AtomicUsize,
    pub tx_packets: AtomicUsize,
    pub tx_responses: AtomicUsize,
    pub tx_failures: AtomicUsize,
}

impl Counters {
    /// Must only be called while no callback is registered.
    #[inline(always)]
    pub fn reset(&self) {
        for counter in [
            &self.rx_packets,
            &self.dropped_rx_packets,
            &self.tx_packets,
            &self.tx_responses,
            &self.tx_failures,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    #[inline(always)]
    pub fn snapshot(&self) -> Stats {
        Stats {
            tx_packets: self.tx_packets.load(Ordering::Relaxed),
            tx_responses: self.tx_responses.load(Ordering::Acquire),
            tx_failures: self.tx_failures.load(Ordering::Acquire),
            rx_packets: self.rx_packets.load(Ordering::Relaxed),
            dropped_rx_packets: self.dropped_rx_packets.load(Ordering::Relaxed),
        }
    }
}

/// A snapshot of an endpoint's traffic counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct Stats {
    /// Datagrams handed to the radio stack, counting one per recipient.
    pub tx_packets: usize,
    /// Transmissions the radio stack reported as complete.
    pub tx_responses: usize,
    /// Completed transmissions that were not acknowledged.
    pub tx_failures: usize,
    /// Datagrams placed in the receive queue.
    pub rx_packets: usize,
    /// Datagrams dropped because the receive queue was full.
    pub dropped_rx_packets: usize,
}

impl Stats {
    /// Transmissions still waiting for a completion report.
    #[inline(always)]
    pub const fn pending(&self) -> usize {
        self.tx_packets.saturating_sub(self.tx_responses)
    }
}
