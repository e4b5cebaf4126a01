//! Records exchanged with the radio stack's peer directory.

use core::fmt;
use serde::{Deserialize, Serialize};

use crate::{Key, PeerAddr};

/// The local network interface a peer is reached through.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Interface {
    #[default]
    Station = 0,
    AccessPoint = 1,
}

/// Error returned when converting an out of range interface index.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct InterfaceError(pub u8);

impl fmt::Display for InterfaceError {
    #[inline(always)]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid interface index {}", self.0)
    }
}

impl core::error::Error for InterfaceError {}

impl TryFrom<u8> for Interface {
    type Error = InterfaceError;

    #[inline(always)]
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Station),
            1 => Ok(Self::AccessPoint),
            other => Err(InterfaceError(other)),
        }
    }
}

impl From<Interface> for u8 {
    #[inline(always)]
    fn from(value: Interface) -> Self {
        value as u8
    }
}

/// A registered peer, as stored by the radio stack.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default, Serialize, Deserialize)]
pub struct PeerInfo {
    pub peer_addr: PeerAddr,
    /// Local master key, only meaningful if [`encrypt`](Self::encrypt) is set.
    pub lmk: Key,
    /// Radio channel, `0` meaning "whatever channel we are currently on".
    pub channel: u8,
    pub ifidx: Interface,
    pub encrypt: bool,
}

impl PeerInfo {
    /// A record for `peer_addr` with every other field at its default.
    #[inline(always)]
    pub fn new(peer_addr: PeerAddr) -> Self {
        Self {
            peer_addr,
            ..Default::default()
        }
    }
}

/// Peer counts, as reported by the radio stack.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default, Serialize, Deserialize)]
pub struct PeerNum {
    pub total: usize,
    pub encrypted: usize,
}
