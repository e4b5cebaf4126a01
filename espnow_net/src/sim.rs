//! An in-process software radio.
//!
//! A [`Medium`] connects any number of [`SimRadio`]s, identified by their
//! hardware address. Like a real radio stack, each `SimRadio` keeps its own
//! peer directory, and invokes its callbacks from another thread: the medium's
//! delivery thread.
//!
//! A transmission to a station that is not active on the medium is reported as
//! failed, which is what a real radio stack does when it gets no
//! acknowledgement.

use core::sync::atomic::{AtomicI8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, mpsc};

use espnow_proto::{
    Key, MAX_DATA_LEN, MAX_ENCRYPT_PEER_NUM, MAX_TOTAL_PEER_NUM, PeerAddr, PeerInfo, PeerNum,
};

use crate::driver::{Callbacks, Driver, DriverError, SendStatus};

/// Signal strength reported for every datagram, unless changed with
/// [`Medium::set_signal`].
pub const DEFAULT_RSSI: i8 = -50;

#[derive(Debug)]
struct Transmission {
    src: PeerAddr,
    dests: arrayvec::ArrayVec<PeerAddr, MAX_TOTAL_PEER_NUM>,
    data: arrayvec::ArrayVec<u8, MAX_DATA_LEN>,
}

#[derive(Debug)]
struct Shared {
    stations: Mutex<rustc_hash::FxHashMap<PeerAddr, Callbacks>>,
    rssi: AtomicI8,
}

impl Shared {
    // a panicking callback can't leave the map itself inconsistent
    #[inline(always)]
    fn stations(&self) -> MutexGuard<'_, rustc_hash::FxHashMap<PeerAddr, Callbacks>> {
        self.stations.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn deliver(&self, transmission: Transmission) {
        let Transmission { src, dests, data } = transmission;
        let rssi = self.rssi.load(Ordering::Relaxed);

        let mut stations = self.stations();

        for dest in &dests {
            let status = if dest.is_multicast() {
                // nobody acknowledges group addressed frames
                stations
                    .iter_mut()
                    .filter(|&(addr, _)| *addr != src)
                    .for_each(|(_, station)| station.recv.on_recv(&src, &data, rssi));

                SendStatus::Success
            } else if let Some(station) = stations.get_mut(dest) {
                station.recv.on_recv(&src, &data, rssi);
                SendStatus::Success
            } else {
                SendStatus::Fail
            };

            if let Some(sender) = stations.get_mut(&src) {
                sender.send.on_send(dest, status);
            }
        }
    }
}

/// The shared air of a set of [`SimRadio`]s.
///
/// Transmissions are delivered in order, by a dedicated thread that exits once
/// the medium and all its radios are dropped.
#[derive(Debug, Clone)]
pub struct Medium {
    shared: Arc<Shared>,
    tx: mpsc::Sender<Transmission>,
}

impl Default for Medium {
    fn default() -> Self {
        Self::new()
    }
}

impl Medium {
    pub fn new() -> Self {
        let shared = Arc::new(Shared {
            stations: Mutex::default(),
            rssi: AtomicI8::new(DEFAULT_RSSI),
        });

        let (tx, rx) = mpsc::channel::<Transmission>();

        let delivery = Arc::clone(&shared);
        std::thread::spawn(move || {
            for transmission in rx {
                delivery.deliver(transmission);
            }
        });

        Self { shared, tx }
    }

    /// Creates a radio with the hardware address `addr`, attached to this medium.
    pub fn radio(&self, addr: PeerAddr) -> SimRadio {
        SimRadio {
            addr,
            shared: Arc::clone(&self.shared),
            tx: self.tx.clone(),
            active: false,
            peers: Vec::new(),
            cursor: 0,
            pmk: Key::default(),
            rate: None,
        }
    }

    /// Sets the signal strength, in dBm, reported for every future datagram.
    pub fn set_signal(&self, rssi: i8) {
        self.shared.rssi.store(rssi, Ordering::Relaxed);
    }

    /// Returns whether a radio with the address `addr` is active on this
    /// medium.
    pub fn is_active(&self, addr: &PeerAddr) -> bool {
        self.shared.stations().contains_key(addr)
    }
}

/// A software radio stack, see the [module level docs](self).
#[derive(Debug)]
pub struct SimRadio {
    addr: PeerAddr,
    shared: Arc<Shared>,
    tx: mpsc::Sender<Transmission>,
    active: bool,
    peers: Vec<PeerInfo>,
    cursor: usize,
    pmk: Key,
    rate: Option<u8>,
}

impl SimRadio {
    #[inline(always)]
    pub fn addr(&self) -> PeerAddr {
        self.addr
    }

    /// The last rate set with [`Driver::set_rate`].
    #[inline(always)]
    pub fn rate(&self) -> Option<u8> {
        self.rate
    }

    #[inline(always)]
    pub fn pmk(&self) -> &Key {
        &self.pmk
    }

    #[inline(always)]
    fn ensure_init(&self) -> Result<(), DriverError> {
        if self.active {
            Ok(())
        } else {
            Err(DriverError::NOT_INIT)
        }
    }

    #[inline(always)]
    fn position(&self, addr: &PeerAddr) -> Result<usize, DriverError> {
        self.peers
            .iter()
            .position(|p| p.peer_addr == *addr)
            .ok_or(DriverError::NOT_FOUND)
    }

    #[inline(always)]
    fn n_encrypted(&self) -> usize {
        self.peers.iter().filter(|p| p.encrypt).count()
    }

    #[inline(always)]
    fn unicast_peers(&self) -> impl Iterator<Item = &PeerInfo> {
        self.peers.iter().filter(|p| !p.peer_addr.is_multicast())
    }
}

impl Driver for SimRadio {
    fn init(&mut self, callbacks: Callbacks) -> Result<(), DriverError> {
        if self.active {
            return Ok(());
        }

        let mut stations = self.shared.stations();

        if stations.contains_key(&self.addr) {
            // another radio already uses this address
            return Err(DriverError::IF);
        }

        stations.insert(self.addr, callbacks);
        self.active = true;

        Ok(())
    }

    fn deinit(&mut self) -> Result<(), DriverError> {
        if !self.active {
            return Ok(());
        }

        // blocks until any delivery in progress is done, and drops the callbacks
        let callbacks = self.shared.stations().remove(&self.addr);
        drop(callbacks);

        self.active = false;
        self.peers.clear();
        self.cursor = 0;

        Ok(())
    }

    fn send(&mut self, peer: Option<&PeerAddr>, data: &[u8]) -> Result<(), DriverError> {
        self.ensure_init()?;

        let data: arrayvec::ArrayVec<u8, MAX_DATA_LEN> =
            data.try_into().map_err(|_| DriverError::ARG)?;

        let dests: arrayvec::ArrayVec<PeerAddr, MAX_TOTAL_PEER_NUM> = match peer {
            Some(addr) => {
                self.position(addr)?;
                core::iter::once(*addr).collect()
            }
            None => self.unicast_peers().map(|p| p.peer_addr).collect(),
        };

        self.tx
            .send(Transmission {
                src: self.addr,
                dests,
                data,
            })
            .map_err(|_| DriverError::INTERNAL)
    }

    fn set_pmk(&mut self, pmk: &Key) -> Result<(), DriverError> {
        self.ensure_init()?;
        self.pmk = *pmk;
        Ok(())
    }

    fn set_rate(&mut self, rate: u8) -> Result<(), DriverError> {
        self.rate = Some(rate);
        Ok(())
    }

    fn add_peer(&mut self, peer: &PeerInfo) -> Result<(), DriverError> {
        self.ensure_init()?;

        if self.position(&peer.peer_addr).is_ok() {
            return Err(DriverError::EXIST);
        }

        if self.peers.len() >= MAX_TOTAL_PEER_NUM
            || (peer.encrypt && self.n_encrypted() >= MAX_ENCRYPT_PEER_NUM)
        {
            return Err(DriverError::FULL);
        }

        self.peers.push(*peer);
        Ok(())
    }

    fn mod_peer(&mut self, peer: &PeerInfo) -> Result<(), DriverError> {
        self.ensure_init()?;

        let i = self.position(&peer.peer_addr)?;

        if peer.encrypt && !self.peers[i].encrypt && self.n_encrypted() >= MAX_ENCRYPT_PEER_NUM {
            return Err(DriverError::FULL);
        }

        self.peers[i] = *peer;
        Ok(())
    }

    fn del_peer(&mut self, peer: &PeerAddr) -> Result<(), DriverError> {
        self.ensure_init()?;

        let i = self.position(peer)?;
        self.peers.remove(i);

        Ok(())
    }

    fn get_peer(&self, peer: &PeerAddr) -> Result<PeerInfo, DriverError> {
        self.ensure_init()?;
        Ok(self.peers[self.position(peer)?])
    }

    fn fetch_peer(&mut self, from_head: bool) -> Result<PeerInfo, DriverError> {
        self.ensure_init()?;

        if from_head {
            self.cursor = 0;
        }

        let peer = *self
            .unicast_peers()
            .nth(self.cursor)
            .ok_or(DriverError::NOT_FOUND)?;

        self.cursor += 1;
        Ok(peer)
    }

    fn peer_num(&self) -> Result<PeerNum, DriverError> {
        self.ensure_init()?;

        Ok(PeerNum {
            total: self.peers.len(),
            encrypted: self.n_encrypted(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: PeerAddr = PeerAddr([2, 0, 0, 0, 0, 0xa]);
    const B: PeerAddr = PeerAddr([2, 0, 0, 0, 0, 0xb]);

    #[test]
    fn peer_ops_need_init() {
        let medium = Medium::new();
        let mut radio = medium.radio(A);

        assert_eq!(
            radio.add_peer(&PeerInfo::new(B)),
            Err(DriverError::NOT_INIT)
        );
        assert_eq!(radio.send(Some(&B), b"x"), Err(DriverError::NOT_INIT));
        assert_eq!(radio.peer_num(), Err(DriverError::NOT_INIT));
    }

    #[test]
    fn directory_limits() {
        let medium = Medium::new();
        let mut radio = medium.radio(A);

        // bypasses init, the directory doesn't care about callbacks
        radio.active = true;

        radio.add_peer(&PeerInfo::new(B)).unwrap();
        assert_eq!(radio.add_peer(&PeerInfo::new(B)), Err(DriverError::EXIST));

        for i in 1..MAX_TOTAL_PEER_NUM as u8 {
            let mut info = PeerInfo::new(PeerAddr([2, 0, 0, 0, 1, i]));
            info.encrypt = usize::from(i) <= MAX_ENCRYPT_PEER_NUM;
            radio.add_peer(&info).unwrap();
        }

        assert_eq!(
            radio.peer_num(),
            Ok(PeerNum {
                total: MAX_TOTAL_PEER_NUM,
                encrypted: MAX_ENCRYPT_PEER_NUM,
            })
        );

        let extra = PeerInfo::new(PeerAddr([2, 0, 0, 0, 2, 0]));
        assert_eq!(radio.add_peer(&extra), Err(DriverError::FULL));

        let mut b = radio.get_peer(&B).unwrap();
        b.encrypt = true;
        assert_eq!(radio.mod_peer(&b), Err(DriverError::FULL));

        radio.del_peer(&B).unwrap();
        assert_eq!(radio.del_peer(&B), Err(DriverError::NOT_FOUND));
    }

    #[test]
    fn fetch_skips_group_addresses() {
        let medium = Medium::new();
        let mut radio = medium.radio(A);
        radio.active = true;

        radio.add_peer(&PeerInfo::new(PeerAddr::BROADCAST)).unwrap();
        radio.add_peer(&PeerInfo::new(B)).unwrap();

        assert_eq!(radio.fetch_peer(true).map(|p| p.peer_addr), Ok(B));
        assert_eq!(radio.fetch_peer(false), Err(DriverError::NOT_FOUND));
        assert_eq!(radio.fetch_peer(true).map(|p| p.peer_addr), Ok(B));
    }

    #[test]
    fn unknown_destination_is_refused() {
        let medium = Medium::new();
        let mut radio = medium.radio(A);
        radio.active = true;

        assert_eq!(radio.send(Some(&B), b"x"), Err(DriverError::NOT_FOUND));

        radio.add_peer(&PeerInfo::new(B)).unwrap();
        assert_eq!(
            radio.send(Some(&B), &[0; MAX_DATA_LEN + 1]),
            Err(DriverError::ARG)
        );
    }
}
