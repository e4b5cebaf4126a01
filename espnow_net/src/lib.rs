//! A blocking, bounded-memory datagram API on top of an ESP-NOW style radio
//! stack.
//!
//! The radio stack reports everything it does (received datagrams, completed
//! transmissions) through callbacks invoked from its own execution context.
//! An [`Endpoint`] turns that into calls an application can block on:
//!
//! - [`Endpoint::receive`] takes the next datagram out of a bounded receive
//!   queue, waiting up to a timeout for one to arrive. The queue is filled by
//!   the radio stack's context, without locks, and datagrams that don't fit
//!   are dropped and counted.
//! - [`Endpoint::send`] hands a datagram to the radio stack, and optionally
//!   waits until it reported whether every recipient acknowledged it.
//!
//! The radio stack itself is abstracted by the [`Driver`] trait. The [`sim`]
//! module (behind the default `sim` feature) provides an in-process
//! implementation of it.
//!
//! ```ignore
//! let medium = sim::Medium::new();
//! let mut endpoint = Endpoint::new(medium.radio(PeerAddr([2, 0, 0, 0, 0, 1])));
//!
//! endpoint.activate(true)?;
//! endpoint.add_peer(PeerAddr::BROADCAST, PeerOptions::default())?;
//! endpoint.send(Some(&PeerAddr::BROADCAST), b"hello", true)?;
//!
//! if let Some(packet) = endpoint.receive(Some(Duration::from_secs(1)))? {
//!     println!("{}: {:?}", packet.peer, packet.msg);
//! }
//! ```

pub mod config;
pub mod driver;
pub mod endpoint;
pub mod error;
pub mod peers;
pub mod recv;
#[cfg(feature = "sim")]
pub mod sim;
mod stats;
pub mod tracker;

pub use espnow_proto as proto;
pub use espnow_proto::{PeerAddr, PeerInfo, PeerNum};

pub use config::Config;
pub use driver::{Callbacks, Driver, DriverError, SendStatus};
pub use endpoint::{Endpoint, Incoming, Message, Packet, ReceiveCallback};
pub use error::{Error, Result};
pub use peers::{PeerOptions, PeerSignal, PeersTable};
pub use stats::Stats;

/// Interval between two checks of the receive queue or the completion
/// counters, while blocking.
pub use espnow_utils::BUSY_WAIT;

/// Maximum number of polls a synchronous send waits for completions, on each of
/// its two waits.
///
/// With [`BUSY_WAIT`], that's a bit over two seconds, far more than the radio
/// stack ever needs.
pub const SEND_BARRIER_POLLS: usize = 90;
