//! The receive-queue frame format.
//!
//! A frame is the unit the receive path places in the receive queue, and that
//! the application later takes out of it:
//!
//! ```text
//! offset 0   magic          1 byte, always MAGIC
//! offset 1   msg_len        1 byte, 0..=MAX_DATA_LEN
//! offset 2   time_ms        4 bytes, little endian    (rssi feature only)
//! offset 6   rssi           1 byte, signed dBm        (rssi feature only)
//! HEADER_LEN peer address   ETH_ALEN bytes
//! ..         payload        msg_len bytes
//! ```
//!
//! Frames are written whole, or not at all, so a reader can always peek at
//! [`HEADER_LEN`] bytes to learn how long the rest of the frame is.

use core::fmt;

use crate::{ETH_ALEN, MAX_DATA_LEN, PeerAddr};

/// Sentinel value found at the start of every frame.
///
/// Frames are only ever written whole, by a single producer, so reading
/// anything else at a frame boundary means the queue itself is broken.
pub const MAGIC: u8 = 0x99;

#[cfg(feature = "rssi")]
const METADATA_LEN: usize =
    // receive timestamp in milliseconds (little endian)
    size_of::<u32>()
    // signal strength in dBm
    + size_of::<i8>();

#[cfg(not(feature = "rssi"))]
const METADATA_LEN: usize = 0;

/// Length of a frame header, in bytes.
pub const HEADER_LEN: usize =
    // magic
    size_of::<u8>()
    // payload length
    + size_of::<u8>()
    + METADATA_LEN;

/// Length of the largest possible frame, in bytes.
pub const MAX_FRAME_LEN: usize = frame_len(MAX_DATA_LEN);

/// Returns the total length of a frame carrying `msg_len` payload bytes.
#[inline(always)]
pub const fn frame_len(msg_len: usize) -> usize {
    HEADER_LEN + ETH_ALEN + msg_len
}

/// Stack storage large enough for any frame.
pub type FrameBuf = arrayvec::ArrayVec<u8, MAX_FRAME_LEN>;

/// Reception metadata attached to a frame.
///
/// When the `rssi` feature is disabled this type is empty, and every accessor
/// returns `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Metadata {
    #[cfg(feature = "rssi")]
    time_ms: u32,
    #[cfg(feature = "rssi")]
    rssi: i8,
}

impl Metadata {
    /// Builds the metadata for a datagram received at `time_ms` (milliseconds
    /// since boot, wrapping) with a signal strength of `rssi` dBm.
    ///
    /// Both values are discarded if the `rssi` feature is disabled.
    #[allow(unused_variables)]
    #[inline(always)]
    pub const fn new(time_ms: u32, rssi: i8) -> Self {
        Self {
            #[cfg(feature = "rssi")]
            time_ms,
            #[cfg(feature = "rssi")]
            rssi,
        }
    }

    #[inline(always)]
    pub const fn time_ms(&self) -> Option<u32> {
        #[cfg(feature = "rssi")]
        return Some(self.time_ms);
        #[cfg(not(feature = "rssi"))]
        return None;
    }

    #[inline(always)]
    pub const fn rssi(&self) -> Option<i8> {
        #[cfg(feature = "rssi")]
        return Some(self.rssi);
        #[cfg(not(feature = "rssi"))]
        return None;
    }
}

/// Error returned when a frame cannot be built.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum EncodeError {
    /// The payload is longer than [`MAX_DATA_LEN`].
    PayloadTooLarge(usize),
}

impl fmt::Display for EncodeError {
    #[inline(always)]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PayloadTooLarge(len) => {
                write!(f, "payload of {len} bytes exceeds {MAX_DATA_LEN} bytes")
            }
        }
    }
}

impl core::error::Error for EncodeError {}

/// Error returned when bytes taken from the queue are not a valid frame.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum DecodeError {
    /// The first byte was not [`MAGIC`].
    BadMagic(u8),
    /// The length byte exceeds [`MAX_DATA_LEN`].
    BadLength(u8),
    /// The slice length does not match the length announced by the header.
    Truncated { expected: usize, actual: usize },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadMagic(b) => write!(f, "bad frame magic {b:#04x}, expected {MAGIC:#04x}"),
            Self::BadLength(len) => {
                write!(f, "frame length {len} exceeds {MAX_DATA_LEN} bytes")
            }
            Self::Truncated { expected, actual } => {
                write!(f, "frame is {actual} bytes, header announced {expected}")
            }
        }
    }
}

impl core::error::Error for DecodeError {}

/// A decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    msg_len: u8,
    pub meta: Metadata,
}

impl Header {
    /// Creates a header for a payload of `msg_len` bytes.
    #[inline(always)]
    pub fn new(msg_len: usize, meta: Metadata) -> Result<Self, EncodeError> {
        u8::try_from(msg_len)
            .ok()
            .filter(|&len| usize::from(len) <= MAX_DATA_LEN)
            .map(|msg_len| Self { msg_len, meta })
            .ok_or(EncodeError::PayloadTooLarge(msg_len))
    }

    /// Length of the payload that follows the peer address.
    #[inline(always)]
    pub const fn msg_len(&self) -> usize {
        self.msg_len as usize
    }

    /// Length of the whole frame this header starts, header included.
    #[inline(always)]
    pub const fn frame_len(&self) -> usize {
        frame_len(self.msg_len())
    }

    #[inline]
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];

        let ([magic, msg_len], _rem) = buf.split_first_chunk_mut::<2>().unwrap();
        *magic = MAGIC;
        *msg_len = self.msg_len;

        #[cfg(feature = "rssi")]
        {
            let (time_ms, rem) = _rem.split_first_chunk_mut().unwrap();
            *time_ms = self.meta.time_ms.to_le_bytes();

            let (rssi, _rem) = rem.split_first_chunk_mut().unwrap();
            *rssi = self.meta.rssi.to_le_bytes();
        }

        buf
    }

    /// Parses and validates a frame header.
    #[inline]
    pub fn decode(bytes: &[u8; HEADER_LEN]) -> Result<Self, DecodeError> {
        let (&[magic, msg_len], _rem) = bytes.split_first_chunk::<2>().unwrap();

        if magic != MAGIC {
            return Err(DecodeError::BadMagic(magic));
        }

        if usize::from(msg_len) > MAX_DATA_LEN {
            return Err(DecodeError::BadLength(msg_len));
        }

        #[cfg(feature = "rssi")]
        let meta = {
            let (&time_ms, rem) = _rem.split_first_chunk().unwrap();
            let (&rssi, _rem) = rem.split_first_chunk().unwrap();

            Metadata::new(u32::from_le_bytes(time_ms), i8::from_le_bytes(rssi))
        };

        #[cfg(not(feature = "rssi"))]
        let meta = Metadata::default();

        Ok(Self { msg_len, meta })
    }
}

/// Builds the frame for a datagram received from `peer`.
///
/// The result is exactly what should be handed to the queue in one write.
#[inline]
pub fn encode_frame(peer: &PeerAddr, msg: &[u8], meta: Metadata) -> Result<FrameBuf, EncodeError> {
    let header = Header::new(msg.len(), meta)?;

    let mut frame = FrameBuf::new_const();

    frame
        .try_extend_from_slice(&header.encode())
        .and_then(|()| frame.try_extend_from_slice(peer.as_bytes()))
        .and_then(|()| frame.try_extend_from_slice(msg))
        .map_err(|_| EncodeError::PayloadTooLarge(msg.len()))?;

    Ok(frame)
}

/// A frame decoded in place, borrowing its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRef<'a> {
    pub header: Header,
    pub peer: PeerAddr,
    pub msg: &'a [u8],
}

/// Decodes one whole frame.
///
/// `bytes` must contain exactly one frame, as announced by its header.
#[inline]
pub fn decode_frame(bytes: &[u8]) -> Result<FrameRef<'_>, DecodeError> {
    let truncated = || DecodeError::Truncated {
        expected: HEADER_LEN,
        actual: bytes.len(),
    };

    let (header, rem) = bytes.split_first_chunk().ok_or_else(truncated)?;
    let header = Header::decode(header)?;

    if bytes.len() != header.frame_len() {
        return Err(DecodeError::Truncated {
            expected: header.frame_len(),
            actual: bytes.len(),
        });
    }

    let (&peer, msg) = rem.split_first_chunk().ok_or_else(truncated)?;

    Ok(FrameRef {
        header,
        peer: PeerAddr(peer),
        msg,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PEER: PeerAddr = PeerAddr([0x24, 0x0a, 0xc4, 0x11, 0x22, 0x33]);

    #[test]
    fn layout_is_byte_exact() {
        let frame = encode_frame(&PEER, b"hi", Metadata::new(0x0403_0201, -42)).unwrap();

        assert_eq!(frame[0], MAGIC);
        assert_eq!(frame[1], 2);

        #[cfg(feature = "rssi")]
        {
            assert_eq!(&frame[2..6], &[0x01, 0x02, 0x03, 0x04]);
            assert_eq!(frame[6] as i8, -42);
        }

        assert_eq!(&frame[HEADER_LEN..HEADER_LEN + ETH_ALEN], PEER.as_bytes());
        assert_eq!(&frame[HEADER_LEN + ETH_ALEN..], b"hi");
        assert_eq!(frame.len(), frame_len(2));
    }

    #[test]
    fn max_size_frame_fits() {
        let msg = [0xab; MAX_DATA_LEN];
        let frame = encode_frame(&PEER, &msg, Metadata::default()).unwrap();
        assert_eq!(frame.len(), MAX_FRAME_LEN);

        let decoded = decode_frame(&frame).unwrap();
        assert_eq!(decoded.peer, PEER);
        assert_eq!(decoded.msg, &msg[..]);
    }

    #[test]
    fn empty_payload() {
        let frame = encode_frame(&PEER, &[], Metadata::default()).unwrap();
        let decoded = decode_frame(&frame).unwrap();

        assert_eq!(decoded.header.msg_len(), 0);
        assert!(decoded.msg.is_empty());
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let msg = [0u8; MAX_DATA_LEN + 1];
        assert_eq!(
            encode_frame(&PEER, &msg, Metadata::default()),
            Err(EncodeError::PayloadTooLarge(MAX_DATA_LEN + 1))
        );
    }

    #[test]
    fn metadata_survives_decoding() {
        let meta = Metadata::new(123_456, -70);
        let frame = encode_frame(&PEER, b"x", meta).unwrap();
        let decoded = decode_frame(&frame).unwrap();

        assert_eq!(decoded.header.meta, meta);
        #[cfg(feature = "rssi")]
        assert_eq!(decoded.header.meta.rssi(), Some(-70));
        #[cfg(not(feature = "rssi"))]
        assert_eq!(decoded.header.meta.rssi(), None);
    }

    #[test]
    fn bad_magic_is_detected() {
        let mut frame = encode_frame(&PEER, b"abc", Metadata::default()).unwrap();
        frame[0] = 0x42;

        assert_eq!(decode_frame(&frame), Err(DecodeError::BadMagic(0x42)));
    }

    #[test]
    fn bad_length_is_detected() {
        let mut header = [0u8; HEADER_LEN];
        header[0] = MAGIC;
        header[1] = 251;

        assert_eq!(Header::decode(&header), Err(DecodeError::BadLength(251)));
    }

    #[test]
    fn length_mismatch_is_detected() {
        let frame = encode_frame(&PEER, b"abcdef", Metadata::default()).unwrap();

        assert_eq!(
            decode_frame(&frame[..frame.len() - 1]),
            Err(DecodeError::Truncated {
                expected: frame.len(),
                actual: frame.len() - 1,
            })
        );
    }
}
