//! A bounded byte queue between exactly one writer and exactly one reader.
//!
//! This module wraps an [`rtrb`] ring buffer of bytes and adds the framing
//! discipline the receive path relies on:
//!
//! - writes are all-or-nothing: either every byte of a frame becomes visible
//!   to the reader at once, or the queue is left untouched,
//! - the reader can peek at the next bytes without consuming them, and block
//!   (with a timeout) until enough bytes are available.
//!
//! No lock is involved: the write cursor only advances once a whole frame is
//! in place, and the read cursor only advances once a whole read is done.

use core::{fmt, num, time::Duration};

pub use rtrb;

/// Error returned by the reading side of the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadError {
    /// Not enough bytes are available right now.
    WouldBlock,
    /// Not enough bytes became available before the timeout.
    TimedOut,
    /// More bytes were requested than the queue can ever hold.
    ExceedsCapacity,
}

impl fmt::Display for ReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::WouldBlock => "not enough bytes available",
            Self::TimedOut => "timed out waiting for bytes",
            Self::ExceedsCapacity => "read larger than the queue capacity",
        })
    }
}

impl std::error::Error for ReadError {}

/// Creates a new queue holding at most `capacity` bytes, and returns both its
/// ends.
#[inline(always)]
pub fn frame_queue(capacity: num::NonZeroUsize) -> (FrameWriter, FrameReader) {
    let (tx, rx) = rtrb::RingBuffer::new(capacity.get());

    (
        FrameWriter { tx },
        FrameReader {
            rx,
            poll_interval: crate::BUSY_WAIT,
        },
    )
}

/// The writing end of a frame queue.
#[derive(Debug)]
pub struct FrameWriter {
    tx: rtrb::Producer<u8>,
}

impl FrameWriter {
    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.tx.buffer().capacity()
    }

    /// Number of bytes that can currently be written.
    #[inline(always)]
    pub fn free(&self) -> usize {
        self.tx.slots()
    }

    /// Writes all of `bytes`, or nothing.
    ///
    /// Returns `false`, leaving the queue untouched, if fewer than
    /// `bytes.len()` bytes are free. On success, the reader observes the whole
    /// of `bytes` at once.
    #[inline]
    pub fn try_write(&mut self, bytes: &[u8]) -> bool {
        let Ok(chunk) = self.tx.write_chunk_uninit(bytes.len()) else {
            return false;
        };

        // the chunk is exactly bytes.len() long, the write cursor is only
        // advanced once, after every byte has been copied
        let written = chunk.fill_from_iter(bytes.iter().copied());
        debug_assert_eq!(written, bytes.len());

        true
    }
}

/// The reading end of a frame queue.
#[derive(Debug)]
pub struct FrameReader {
    rx: rtrb::Consumer<u8>,
    poll_interval: Duration,
}

impl FrameReader {
    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.rx.buffer().capacity()
    }

    /// Number of bytes currently available for reading.
    #[inline(always)]
    pub fn available(&self) -> usize {
        self.rx.slots()
    }

    /// How often blocking reads check for new data.
    #[inline(always)]
    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    #[inline(always)]
    pub const fn set_poll_interval(&mut self, interval: Duration) {
        self.poll_interval = interval;
    }

    /// Blocks until at least `len` bytes are available, or `timeout` elapses.
    #[inline]
    pub fn wait_available(&self, len: usize, timeout: Duration) -> Result<(), ReadError> {
        if len > self.capacity() {
            return Err(ReadError::ExceedsCapacity);
        }

        if crate::wait_until(timeout, self.poll_interval, || self.available() >= len) {
            Ok(())
        } else {
            Err(ReadError::TimedOut)
        }
    }

    /// Copies the next `dest.len()` bytes into `dest`, without consuming them.
    #[inline]
    pub fn peek(&mut self, dest: &mut [u8]) -> Result<(), ReadError> {
        if dest.len() > self.capacity() {
            return Err(ReadError::ExceedsCapacity);
        }

        let chunk = self
            .rx
            .read_chunk(dest.len())
            .map_err(|_| ReadError::WouldBlock)?;

        copy_from_chunk(&chunk, dest);

        // dropping the chunk without committing it leaves the bytes queued
        Ok(())
    }

    /// Blocks until `dest.len()` bytes are available, then consumes them into
    /// `dest`.
    ///
    /// On timeout, nothing is consumed.
    #[inline]
    pub fn read_exact(&mut self, dest: &mut [u8], timeout: Duration) -> Result<(), ReadError> {
        self.wait_available(dest.len(), timeout)?;

        // single consumer: what was available above is still available
        let chunk = self
            .rx
            .read_chunk(dest.len())
            .map_err(|_| ReadError::WouldBlock)?;

        copy_from_chunk(&chunk, dest);
        chunk.commit_all();

        Ok(())
    }

    /// Discards `len` bytes, if that many are available.
    #[inline]
    pub fn skip(&mut self, len: usize) -> Result<(), ReadError> {
        self.rx
            .read_chunk(len)
            .map(rtrb::chunks::ReadChunk::commit_all)
            .map_err(|_| ReadError::WouldBlock)
    }
}

/// Copies a (possibly wrapped around) read chunk into a contiguous slice of the
/// same length.
#[inline(always)]
fn copy_from_chunk(chunk: &rtrb::chunks::ReadChunk<'_, u8>, dest: &mut [u8]) {
    let (start, end) = chunk.as_slices();
    let (dest_start, dest_end) = dest.split_at_mut(start.len());

    dest_start.copy_from_slice(start);
    dest_end.copy_from_slice(end);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue(capacity: usize) -> (FrameWriter, FrameReader) {
        let (tx, mut rx) = frame_queue(num::NonZeroUsize::new(capacity).unwrap());
        rx.set_poll_interval(Duration::from_millis(1));
        (tx, rx)
    }

    #[test]
    fn write_is_all_or_nothing() {
        let (mut tx, mut rx) = queue(8);

        assert!(tx.try_write(b"abcde"));
        assert!(!tx.try_write(b"fghi"));

        // the rejected write left no trace
        assert_eq!(rx.available(), 5);
        assert_eq!(tx.free(), 3);

        let mut buf = [0; 5];
        rx.read_exact(&mut buf, Duration::ZERO).unwrap();
        assert_eq!(&buf, b"abcde");
        assert_eq!(rx.available(), 0);
    }

    #[test]
    fn available_plus_free_is_capacity() {
        let (mut tx, mut rx) = queue(16);

        assert!(tx.try_write(b"0123456789"));
        assert_eq!(rx.available() + tx.free(), 16);

        rx.skip(4).unwrap();
        assert_eq!(rx.available() + tx.free(), 16);
    }

    #[test]
    fn exact_fit_is_accepted() {
        let (mut tx, rx) = queue(4);

        assert!(tx.try_write(b"abcd"));
        assert_eq!(tx.free(), 0);
        assert_eq!(rx.available(), 4);
    }

    #[test]
    fn peek_does_not_consume() {
        let (mut tx, mut rx) = queue(8);
        assert!(tx.try_write(b"xyz"));

        let mut head = [0; 2];
        rx.peek(&mut head).unwrap();
        rx.peek(&mut head).unwrap();
        assert_eq!(&head, b"xy");
        assert_eq!(rx.available(), 3);
    }

    #[test]
    fn peek_on_short_queue_would_block() {
        let (mut tx, mut rx) = queue(8);
        assert!(tx.try_write(b"x"));

        let mut head = [0; 2];
        assert_eq!(rx.peek(&mut head), Err(ReadError::WouldBlock));
    }

    #[test]
    fn reads_across_the_wrap_around() {
        let (mut tx, mut rx) = queue(8);

        assert!(tx.try_write(b"123456"));
        rx.skip(6).unwrap();

        // this one straddles the end of the storage
        assert!(tx.try_write(b"abcdefg"));

        let mut peeked = [0; 7];
        rx.peek(&mut peeked).unwrap();
        assert_eq!(&peeked, b"abcdefg");

        let mut read = [0; 7];
        rx.read_exact(&mut read, Duration::ZERO).unwrap();
        assert_eq!(&read, b"abcdefg");
    }

    #[test]
    fn read_times_out_without_consuming() {
        let (mut tx, mut rx) = queue(8);
        assert!(tx.try_write(b"ab"));

        let mut buf = [0; 3];
        assert_eq!(
            rx.read_exact(&mut buf, Duration::from_millis(10)),
            Err(ReadError::TimedOut)
        );
        assert_eq!(rx.available(), 2);
    }

    #[test]
    fn oversized_read_is_refused() {
        let (_tx, mut rx) = queue(4);

        let mut buf = [0; 5];
        assert_eq!(
            rx.read_exact(&mut buf, Duration::from_secs(60)),
            Err(ReadError::ExceedsCapacity)
        );
    }

    #[test]
    fn blocking_read_sees_writes_from_another_thread() {
        let (mut tx, mut rx) = queue(64);

        let writer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            assert!(tx.try_write(b"late frame"));
            tx
        });

        let mut buf = [0; 10];
        rx.read_exact(&mut buf, Duration::from_secs(5)).unwrap();
        assert_eq!(&buf, b"late frame");

        writer.join().unwrap();
    }

    #[test]
    fn frames_come_out_in_order() {
        let (mut tx, mut rx) = queue(32);

        for frame in [&b"one"[..], b"two", b"three"] {
            assert!(tx.try_write(frame));
        }

        let mut buf = [0; 11];
        rx.read_exact(&mut buf, Duration::ZERO).unwrap();
        assert_eq!(&buf, b"onetwothree");
    }
}
