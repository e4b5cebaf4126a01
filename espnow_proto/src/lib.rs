#![no_std]
//! Wire-level definitions for an ESP-NOW style peer-to-peer datagram bridge.
//!
//! This crate defines the types and byte layouts shared by every layer of the
//! bridge, without prescribing how datagrams are actually moved around.
//!
//! ## Addresses and keys
//!
//! Peers are identified by their 6-byte hardware address ([`PeerAddr`]).
//! Encrypted links additionally use 16-byte keys ([`Key`]), either as the
//! device-wide primary key or as a per-peer local key.
//!
//! ## Frames
//!
//! Every received datagram is stored in the receive queue as a self-describing
//! [frame](frame): a small header carrying a sentinel byte and the payload
//! length, followed by the sender's address and the payload itself.
//!
//! With the `rssi` feature (enabled by default), the header also carries the
//! time at which the datagram was received and the signal strength it was
//! received with. See [`frame::Metadata`].
//!
//! ## Peer records
//!
//! The peer directory itself lives in the radio stack. The [`peer`] module only
//! defines the records exchanged with it.

pub mod frame;
pub mod peer;

use core::fmt;
use serde::{Deserialize, Serialize};

pub use frame::{
    DecodeError, EncodeError, FrameBuf, FrameRef, HEADER_LEN, Header, MAGIC, MAX_FRAME_LEN,
    Metadata,
};
pub use peer::{Interface, PeerInfo, PeerNum};

/// Maximum payload of a single datagram, in bytes.
pub const MAX_DATA_LEN: usize = 250;

/// Length of a hardware address, in bytes.
pub const ETH_ALEN: usize = 6;

/// Length of primary and local master keys, in bytes.
pub const KEY_LEN: usize = 16;

/// Maximum number of peers the radio stack can register.
pub const MAX_TOTAL_PEER_NUM: usize = 20;

/// Maximum number of peers with encryption enabled.
pub const MAX_ENCRYPT_PEER_NUM: usize = 6;

/// Error returned when a byte slice of the wrong length is converted into a
/// fixed-size value, such as a [`PeerAddr`] or a [`Key`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct LengthError {
    pub expected: usize,
    pub actual: usize,
}

impl fmt::Display for LengthError {
    #[inline(always)]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "wrong length: expected {} bytes, got {}",
            self.expected, self.actual
        )
    }
}

impl core::error::Error for LengthError {}

/// A 6-byte hardware (MAC) address identifying a peer.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct PeerAddr(pub [u8; ETH_ALEN]);

impl PeerAddr {
    /// The broadcast address, `ff:ff:ff:ff:ff:ff`.
    pub const BROADCAST: Self = Self([0xff; ETH_ALEN]);

    #[inline(always)]
    pub const fn new(bytes: [u8; ETH_ALEN]) -> Self {
        Self(bytes)
    }

    #[inline(always)]
    pub const fn as_bytes(&self) -> &[u8; ETH_ALEN] {
        &self.0
    }

    /// Returns whether this is a group address (broadcast included).
    ///
    /// Group addresses have the least significant bit of the first octet set.
    /// The radio stack never counts them as unicast peers.
    #[inline(always)]
    pub const fn is_multicast(&self) -> bool {
        self.0[0] & 1 != 0
    }

    #[inline(always)]
    pub const fn is_broadcast(&self) -> bool {
        let mut i = 0;
        while i < ETH_ALEN {
            if self.0[i] != 0xff {
                return false;
            }
            i += 1;
        }
        true
    }
}

impl From<[u8; ETH_ALEN]> for PeerAddr {
    #[inline(always)]
    fn from(bytes: [u8; ETH_ALEN]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for PeerAddr {
    type Error = LengthError;

    #[inline(always)]
    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        value.try_into().map(Self).map_err(|_| LengthError {
            expected: ETH_ALEN,
            actual: value.len(),
        })
    }
}

impl AsRef<[u8]> for PeerAddr {
    #[inline(always)]
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl fmt::Debug for PeerAddr {
    #[inline(always)]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerAddr({self})")
    }
}

/// A 16-byte encryption key (primary or local master key).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Key(pub [u8; KEY_LEN]);

impl Key {
    #[inline(always)]
    pub const fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl TryFrom<&[u8]> for Key {
    type Error = LengthError;

    #[inline(always)]
    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        value.try_into().map(Self).map_err(|_| LengthError {
            expected: KEY_LEN,
            actual: value.len(),
        })
    }
}

// never print key material
impl fmt::Debug for Key {
    #[inline(always)]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Key(..)")
    }
}

#[cfg(test)]
mod tests {
    extern crate alloc;

    use super::*;
    use alloc::string::ToString;

    #[test]
    fn addr_from_slice_checks_length() {
        let ok = PeerAddr::try_from(&[1u8, 2, 3, 4, 5, 6][..]).unwrap();
        assert_eq!(ok, PeerAddr([1, 2, 3, 4, 5, 6]));

        let err = PeerAddr::try_from(&[1u8, 2, 3][..]).unwrap_err();
        assert_eq!(
            err,
            LengthError {
                expected: ETH_ALEN,
                actual: 3
            }
        );
    }

    #[test]
    fn key_from_slice_checks_length() {
        assert!(Key::try_from(&b"Micropyth0nRules"[..]).is_ok());
        assert!(Key::try_from(&b"short"[..]).is_err());
    }

    #[test]
    fn group_addresses() {
        assert!(PeerAddr::BROADCAST.is_broadcast());
        assert!(PeerAddr::BROADCAST.is_multicast());
        assert!(PeerAddr([0x01, 0, 0x5e, 0, 0, 1]).is_multicast());
        assert!(!PeerAddr([0x24, 0x0a, 0xc4, 0, 0, 1]).is_multicast());
        assert!(!PeerAddr([0x24, 0x0a, 0xc4, 0, 0, 1]).is_broadcast());
    }

    #[test]
    fn addr_display() {
        let addr = PeerAddr([0x24, 0x0a, 0xc4, 0x00, 0x01, 0xff]);
        assert_eq!(addr.to_string(), "24:0a:c4:00:01:ff");
    }
}
