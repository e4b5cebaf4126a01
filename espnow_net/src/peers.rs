//! Peer bookkeeping kept on the application side of the radio stack.

use serde::{Deserialize, Serialize};

use espnow_proto::{Interface, Key, MAX_TOTAL_PEER_NUM, PeerAddr, PeerInfo};

use crate::driver::Driver;

/// The number of unicast peers registered with the radio stack.
///
/// A broadcast send (to `None`) yields one completion per unicast peer, so the
/// send barrier needs this number. It is recomputed by walking the peer
/// directory after every change made through the endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeerCountCache {
    count: usize,
}

impl PeerCountCache {
    #[inline(always)]
    pub const fn get(&self) -> usize {
        self.count
    }

    /// The radio stack forgets every peer when stopped.
    #[inline(always)]
    pub const fn reset(&mut self) {
        self.count = 0;
    }

    /// Walks `driver`'s peer directory and caches the number of unicast peers.
    ///
    /// The walk stops after [`MAX_TOTAL_PEER_NUM`] peers, which the radio stack
    /// never exceeds.
    pub fn refresh<D: Driver + ?Sized>(&mut self, driver: &mut D) -> usize {
        let mut count = 0;

        while count < MAX_TOTAL_PEER_NUM && driver.fetch_peer(count == 0).is_ok() {
            count += 1;
        }

        log::debug!("peer count refreshed: {count} unicast peers");

        self.count = count;
        count
    }
}

/// Changes to apply to a peer record, for
/// [`Endpoint::add_peer`](crate::Endpoint::add_peer) and
/// [`Endpoint::modify_peer`](crate::Endpoint::modify_peer).
///
/// Fields left to `None` keep their current (or default) value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerOptions {
    /// Sets the local master key, and enables encryption.
    pub lmk: Option<Key>,
    pub channel: Option<u8>,
    pub ifidx: Option<Interface>,
    /// Applied after `lmk`, so it can override what setting it implies.
    pub encrypt: Option<bool>,
}

impl PeerOptions {
    #[inline(always)]
    pub fn lmk(mut self, lmk: Key) -> Self {
        self.lmk = Some(lmk);
        self
    }

    #[inline(always)]
    pub fn channel(mut self, channel: u8) -> Self {
        self.channel = Some(channel);
        self
    }

    #[inline(always)]
    pub fn ifidx(mut self, ifidx: Interface) -> Self {
        self.ifidx = Some(ifidx);
        self
    }

    #[inline(always)]
    pub fn encrypt(mut self, encrypt: bool) -> Self {
        self.encrypt = Some(encrypt);
        self
    }

    pub fn apply(&self, info: &mut PeerInfo) {
        if let Some(lmk) = self.lmk {
            info.lmk = lmk;
            info.encrypt = true;
        }

        if let Some(channel) = self.channel {
            info.channel = channel;
        }

        if let Some(ifidx) = self.ifidx {
            info.ifidx = ifidx;
        }

        if let Some(encrypt) = self.encrypt {
            info.encrypt = encrypt;
        }
    }
}

/// Signal strength of the last datagram read from a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PeerSignal {
    /// In dBm.
    pub rssi: i8,
    /// When the datagram was received, in milliseconds since activation
    /// (wrapping).
    pub time_ms: u32,
}

/// Last known signal strength of every peer a datagram was read from.
pub type PeersTable = rustc_hash::FxHashMap<PeerAddr, PeerSignal>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{Callbacks, DriverError};
    use espnow_proto::PeerNum;

    /// A peer directory without any radio behind it.
    #[derive(Default)]
    struct Directory {
        peers: Vec<PeerAddr>,
        cursor: usize,
    }

    impl Driver for Directory {
        fn init(&mut self, _: Callbacks) -> Result<(), DriverError> {
            Ok(())
        }

        fn deinit(&mut self) -> Result<(), DriverError> {
            Ok(())
        }

        fn send(&mut self, _: Option<&PeerAddr>, _: &[u8]) -> Result<(), DriverError> {
            Ok(())
        }

        fn set_pmk(&mut self, _: &Key) -> Result<(), DriverError> {
            Ok(())
        }

        fn set_rate(&mut self, _: u8) -> Result<(), DriverError> {
            Ok(())
        }

        fn add_peer(&mut self, peer: &PeerInfo) -> Result<(), DriverError> {
            self.peers.push(peer.peer_addr);
            Ok(())
        }

        fn mod_peer(&mut self, _: &PeerInfo) -> Result<(), DriverError> {
            Ok(())
        }

        fn del_peer(&mut self, peer: &PeerAddr) -> Result<(), DriverError> {
            self.peers.retain(|p| p != peer);
            Ok(())
        }

        fn get_peer(&self, peer: &PeerAddr) -> Result<PeerInfo, DriverError> {
            Ok(PeerInfo::new(*peer))
        }

        fn fetch_peer(&mut self, from_head: bool) -> Result<PeerInfo, DriverError> {
            if from_head {
                self.cursor = 0;
            }

            let mut unicast = self.peers.iter().filter(|p| !p.is_multicast());
            let peer = unicast.nth(self.cursor).ok_or(DriverError::NOT_FOUND)?;
            self.cursor += 1;

            Ok(PeerInfo::new(*peer))
        }

        fn peer_num(&self) -> Result<PeerNum, DriverError> {
            Ok(PeerNum {
                total: self.peers.len(),
                encrypted: 0,
            })
        }
    }

    #[test]
    fn counts_unicast_peers_only() {
        let mut dir = Directory::default();
        for addr in [
            PeerAddr([2, 0, 0, 0, 0, 1]),
            PeerAddr::BROADCAST,
            PeerAddr([2, 0, 0, 0, 0, 2]),
        ] {
            dir.add_peer(&PeerInfo::new(addr)).unwrap();
        }

        let mut cache = PeerCountCache::default();
        assert_eq!(cache.refresh(&mut dir), 2);
        assert_eq!(cache.get(), 2);

        dir.del_peer(&PeerAddr([2, 0, 0, 0, 0, 1])).unwrap();
        assert_eq!(cache.refresh(&mut dir), 1);

        cache.reset();
        assert_eq!(cache.get(), 0);
    }

    #[test]
    fn refresh_is_bounded() {
        let mut dir = Directory::default();
        for i in 0..(MAX_TOTAL_PEER_NUM as u8 + 5) {
            dir.add_peer(&PeerInfo::new(PeerAddr([2, 0, 0, 0, 0, i])))
                .unwrap();
        }

        let mut cache = PeerCountCache::default();
        assert_eq!(cache.refresh(&mut dir), MAX_TOTAL_PEER_NUM);
    }

    #[test]
    fn options_apply_in_order() {
        let key = Key(*b"0123456789abcdef");
        let mut info = PeerInfo::new(PeerAddr([2, 0, 0, 0, 0, 1]));

        PeerOptions::default().lmk(key).channel(6).apply(&mut info);
        assert!(info.encrypt);
        assert_eq!(info.lmk, key);
        assert_eq!(info.channel, 6);

        PeerOptions::default().encrypt(false).apply(&mut info);
        assert!(!info.encrypt);
        // untouched fields are kept
        assert_eq!(info.channel, 6);
        assert_eq!(info.ifidx, Interface::Station);
    }
}
