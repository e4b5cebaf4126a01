//! The boundary with the radio stack.
//!
//! The radio stack owns the peer directory, moves datagrams over the air and
//! reports on what it did through two callbacks, invoked from its own execution
//! context. [`Driver`] abstracts it, so that an [`Endpoint`](crate::Endpoint)
//! can run on top of real hardware bindings as well as the in-process
//! [software radio](crate::sim).

use core::fmt;

use espnow_proto::{Key, PeerAddr, PeerInfo, PeerNum};

use crate::{recv::RecvHandler, tracker::CompletionHandler};

/// A non-zero status code returned by the radio stack.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct DriverError {
    code: i32,
}

impl DriverError {
    // wifi error base, plus 100
    const BASE: i32 = 0x3000 + 100;

    /// Generic failure.
    pub const FAIL: Self = Self::new(-1);
    /// The radio stack is not initialized.
    pub const NOT_INIT: Self = Self::new(Self::BASE + 1);
    /// Invalid argument.
    pub const ARG: Self = Self::new(Self::BASE + 2);
    /// Out of memory.
    pub const NO_MEM: Self = Self::new(Self::BASE + 3);
    /// The peer directory is full.
    pub const FULL: Self = Self::new(Self::BASE + 4);
    /// The peer is not found.
    pub const NOT_FOUND: Self = Self::new(Self::BASE + 5);
    /// Internal error.
    pub const INTERNAL: Self = Self::new(Self::BASE + 6);
    /// The peer already exists.
    pub const EXIST: Self = Self::new(Self::BASE + 7);
    /// Interface error.
    pub const IF: Self = Self::new(Self::BASE + 8);

    #[inline(always)]
    pub const fn new(code: i32) -> Self {
        Self { code }
    }

    /// Converts a raw status code, `0` meaning success.
    #[inline(always)]
    pub const fn check(code: i32) -> Result<(), Self> {
        if code == 0 {
            Ok(())
        } else {
            Err(Self::new(code))
        }
    }

    #[inline(always)]
    pub const fn code(&self) -> i32 {
        self.code
    }

    fn name(&self) -> Option<&'static str> {
        Some(match *self {
            Self::FAIL => "ESP_FAIL",
            Self::NOT_INIT => "ESP_ERR_ESPNOW_NOT_INIT",
            Self::ARG => "ESP_ERR_ESPNOW_ARG",
            Self::NO_MEM => "ESP_ERR_ESPNOW_NO_MEM",
            Self::FULL => "ESP_ERR_ESPNOW_FULL",
            Self::NOT_FOUND => "ESP_ERR_ESPNOW_NOT_FOUND",
            Self::INTERNAL => "ESP_ERR_ESPNOW_INTERNAL",
            Self::EXIST => "ESP_ERR_ESPNOW_EXIST",
            Self::IF => "ESP_ERR_ESPNOW_IF",
            _ => return None,
        })
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "error code {:#x}", self.code),
        }
    }
}

impl fmt::Debug for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DriverError({self})")
    }
}

impl std::error::Error for DriverError {}

/// Outcome of a transmission, as reported by the radio stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SendStatus {
    /// The radio stack got an acknowledgement at the MAC layer.
    Success,
    Fail,
}

impl SendStatus {
    #[inline(always)]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

/// The handlers a [`Driver`] must invoke from its own execution context.
///
/// They are handed over on [`Driver::init`], and must be dropped on
/// [`Driver::deinit`]: once `deinit` has returned, neither of them may be
/// invoked again.
#[derive(Debug)]
pub struct Callbacks {
    /// Invoke once per inbound datagram.
    pub recv: RecvHandler,
    /// Invoke once per completed transmission (i.e. once per recipient).
    pub send: CompletionHandler,
}

/// A radio stack, as seen by an [`Endpoint`](crate::Endpoint).
///
/// Every method mirrors a call of the underlying stack, returning its status
/// code as a [`DriverError`] on failure.
pub trait Driver {
    /// Starts the radio stack and registers `callbacks`.
    fn init(&mut self, callbacks: Callbacks) -> Result<(), DriverError>;

    /// Stops the radio stack, drops the callbacks and forgets every peer.
    fn deinit(&mut self) -> Result<(), DriverError>;

    /// Transmits `data` to `peer`, or to every registered unicast peer if
    /// `peer` is `None`.
    ///
    /// Returning `Ok` only means the datagram was queued. The
    /// [`CompletionHandler`] is invoked later, once per recipient.
    fn send(&mut self, peer: Option<&PeerAddr>, data: &[u8]) -> Result<(), DriverError>;

    /// Sets the primary master key.
    fn set_pmk(&mut self, pmk: &Key) -> Result<(), DriverError>;

    /// Sets the transmit PHY rate, in the radio stack's own encoding.
    fn set_rate(&mut self, rate: u8) -> Result<(), DriverError>;

    fn add_peer(&mut self, peer: &PeerInfo) -> Result<(), DriverError>;

    fn mod_peer(&mut self, peer: &PeerInfo) -> Result<(), DriverError>;

    fn del_peer(&mut self, peer: &PeerAddr) -> Result<(), DriverError>;

    fn get_peer(&self, peer: &PeerAddr) -> Result<PeerInfo, DriverError>;

    /// Walks the peer directory, restarting from the first peer if
    /// `from_head` is set.
    ///
    /// Broadcast and multicast addresses are skipped. Returns
    /// [`DriverError::NOT_FOUND`] past the last peer.
    fn fetch_peer(&mut self, from_head: bool) -> Result<PeerInfo, DriverError>;

    fn peer_num(&self) -> Result<PeerNum, DriverError>;
}
