//! Send completion accounting, and the synchronous send barrier built on it.

use core::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};
use std::sync::Arc;

use espnow_proto::PeerAddr;

use crate::{
    driver::SendStatus,
    error::{Error, Result},
    stats::Counters,
};

/// Counts transmission outcomes reported by the radio stack.
///
/// Like [`RecvHandler`](crate::recv::RecvHandler), this runs in the radio
/// stack's context, and only ever increments two counters.
#[derive(Debug)]
pub struct CompletionHandler {
    counters: Arc<Counters>,
}

impl CompletionHandler {
    #[inline(always)]
    pub(crate) fn new(counters: Arc<Counters>) -> Self {
        Self { counters }
    }

    /// Handles the completion of one transmission to `peer`.
    #[inline]
    pub fn on_send(&mut self, _peer: &PeerAddr, status: SendStatus) {
        // failures first, so that a failure is always visible by the time its
        // response is
        if !status.is_success() {
            self.counters.tx_failures.fetch_add(1, Ordering::Release);
        }

        self.counters.tx_responses.fetch_add(1, Ordering::Release);
    }
}

/// Waits for the radio stack to report completion of every datagram handed to
/// it, so that failures can be attributed to a single synchronous send.
///
/// The wait is bounded by a number of polls, not by a caller supplied timeout.
/// Normal operation never reaches that bound: hitting it means the radio stack
/// lost track of some transmissions.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SendBarrier<'a> {
    counters: &'a Counters,
    poll_interval: Duration,
    max_polls: usize,
}

impl<'a> SendBarrier<'a> {
    #[inline(always)]
    pub fn new(counters: &'a Counters, poll_interval: Duration, max_polls: usize) -> Self {
        Self {
            counters,
            poll_interval,
            max_polls,
        }
    }

    #[inline(always)]
    fn load(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::Acquire)
    }

    /// Transmissions handed to the radio stack and not yet completed.
    #[inline(always)]
    pub fn pending(&self) -> usize {
        let responses = Self::load(&self.counters.tx_responses);
        Self::load(&self.counters.tx_packets).saturating_sub(responses)
    }

    #[inline(always)]
    pub fn failures(&self) -> usize {
        Self::load(&self.counters.tx_failures)
    }

    /// Accounts for `n` new transmissions.
    #[inline(always)]
    pub fn record_sent(&self, n: usize) {
        // only the application writes to this one
        self.counters.tx_packets.fetch_add(n, Ordering::Release);
    }

    /// Blocks until every recorded transmission has completed.
    #[inline]
    pub fn drain(&self) -> Result<()> {
        if espnow_utils::wait_polls(self.max_polls, self.poll_interval, || self.pending() == 0) {
            return Ok(());
        }

        let pending = self.pending();
        log::error!("send barrier exceeded, {pending} completions still pending");

        Err(Error::SendBarrierExceeded { pending })
    }

    /// Runs `send`, which must hand datagrams over to the radio stack and
    /// return how many completions to expect.
    ///
    /// If `sync`, waits for the completions, and returns `true` if none of
    /// them were failures. Otherwise, returns `true` immediately.
    #[inline]
    pub fn send(&self, sync: bool, send: impl FnOnce() -> Result<usize>) -> Result<bool> {
        if sync {
            // don't let completions of earlier sends count against this one
            self.drain()?;
        }

        let baseline = self.failures();

        self.record_sent(send()?);

        if !sync {
            return Ok(true);
        }

        self.drain()?;

        Ok(self.failures() == baseline)
    }
}
