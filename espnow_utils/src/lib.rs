//! Utilities for moving datagrams between a radio callback context and a
//! blocking application context.
//!
//! This crate provides:
//! - a bounded, single-producer/single-consumer byte queue that only ever
//!   exposes whole frames to its reader (see [`ring`]),
//! - a monotonic millisecond clock, for stamping received datagrams,
//! - polling helpers, for blocking on state that another context updates
//!   without any lock.

pub mod ring;

use core::time::Duration;

/// Default interval between two polls of state updated by another context.
///
/// It needs to be longer than a scheduler tick on small targets, or
/// sleeping does not actually yield to other tasks.
pub const BUSY_WAIT: Duration = Duration::from_millis(25);

/// A lightweight wrapper around [`std::time::Instant`] counting the time
/// elapsed since some origin, usually the activation of the radio.
///
/// ```ignore
/// let uptime = Uptime::new();
///
/// // in the receive callback
/// let time_ms = uptime.millis();
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Uptime(std::time::Instant);

impl Default for Uptime {
    fn default() -> Self {
        Self(std::time::Instant::now())
    }
}

impl Uptime {
    /// Creates a new clock starting at the current instant.
    #[inline(always)]
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves the origin of this clock to now.
    #[inline(always)]
    pub fn reset(&mut self) {
        *self = Self::new()
    }

    /// Returns the amount of time elapsed since the origin.
    #[inline(always)]
    pub fn elapsed(&self) -> Duration {
        self.0.elapsed()
    }

    /// Returns the number of milliseconds since the origin, wrapping around
    /// every `2^32` milliseconds (about 49.7 days).
    #[inline(always)]
    pub fn millis(&self) -> u32 {
        // truncation is the wrapping we want
        self.elapsed().as_millis() as u32
    }
}

/// Polls `ready` every `interval` until it returns `true`, or `timeout` elapses.
///
/// Returns whether `ready` returned `true`. `ready` is always called at least
/// once, and a `false` result is never returned before `timeout` has elapsed.
#[inline]
pub fn wait_until(timeout: Duration, interval: Duration, mut ready: impl FnMut() -> bool) -> bool {
    let start = std::time::Instant::now();

    loop {
        if ready() {
            return true;
        }

        let elapsed = start.elapsed();

        let Some(remaining) = timeout.checked_sub(elapsed).filter(|r| !r.is_zero()) else {
            return false;
        };

        std::thread::sleep(interval.min(remaining));
    }
}

/// Polls `ready` at most `max_polls` times, sleeping `interval` between each
/// poll.
///
/// Unlike [`wait_until`], the bound is expressed in polls, not in time. This
/// is meant for fallback bounds, that normal operation never reaches.
#[inline]
pub fn wait_polls(max_polls: usize, interval: Duration, mut ready: impl FnMut() -> bool) -> bool {
    for _ in 0..max_polls {
        if ready() {
            return true;
        }

        std::thread::sleep(interval);
    }

    ready()
}
