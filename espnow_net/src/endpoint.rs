//! The application-facing side of the bridge.

use core::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};
use std::sync::Arc;

use espnow_proto::{
    ETH_ALEN, FrameRef, HEADER_LEN, Header, Key, MAX_DATA_LEN, MAX_FRAME_LEN, Metadata, PeerAddr,
    PeerInfo, PeerNum, frame,
};
use espnow_utils::{Uptime, ring};

use crate::{
    Config, SEND_BARRIER_POLLS,
    driver::{Callbacks, Driver},
    error::{Error, Result},
    peers::{PeerCountCache, PeerOptions, PeerSignal, PeersTable},
    recv::{NOTIFY_QUEUE_LEN, RecvHandler},
    stats::{Counters, Stats},
    tracker::{CompletionHandler, SendBarrier},
};

/// Storage for a received payload.
pub type Message = arrayvec::ArrayVec<u8, MAX_DATA_LEN>;

/// A datagram taken out of the receive queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub peer: PeerAddr,
    pub msg: Message,
    pub meta: Metadata,
}

/// Invoked by [`Endpoint::dispatch_notifications`], once per received datagram.
pub type ReceiveCallback<D> = Box<dyn FnMut(&mut Endpoint<D>)>;

/// State that only exists while the endpoint is active.
#[derive(Debug)]
struct Session {
    reader: ring::FrameReader,
    tokens: rtrb::Consumer<PeerAddr>,
}

/// The bridge between a radio stack and the application.
///
/// An endpoint owns its [`Driver`], so there can be only one endpoint per radio
/// stack. It starts inactive, see [`activate`](Self::activate).
///
/// Received datagrams are queued by the radio stack's context, and taken out of
/// the queue by [`receive`](Self::receive) and friends, which block for up to a
/// timeout. [`send`](Self::send) can optionally block until the radio stack
/// reports whether every recipient acknowledged the datagram.
pub struct Endpoint<D: Driver> {
    driver: D,
    config: Config,
    session: Option<Session>,
    counters: Arc<Counters>,
    peer_count: PeerCountCache,
    peers_table: PeersTable,
    armed: Arc<AtomicBool>,
    on_receive: Option<ReceiveCallback<D>>,
    // bumped every time the callback is replaced
    on_receive_gen: u64,
    poll_interval: Duration,
}

impl<D: Driver> Endpoint<D> {
    /// Creates an inactive endpoint, with the default [`Config`].
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            config: Config::default(),
            session: None,
            counters: Arc::default(),
            peer_count: PeerCountCache::default(),
            peers_table: PeersTable::default(),
            armed: Arc::default(),
            on_receive: None,
            on_receive_gen: 0,
            poll_interval: espnow_utils::BUSY_WAIT,
        }
    }

    /// Creates an inactive endpoint.
    pub fn with_config(driver: D, config: Config) -> Result<Self> {
        let mut endpoint = Self::new(driver);
        endpoint.configure(config)?;
        Ok(endpoint)
    }

    #[inline(always)]
    pub fn driver(&self) -> &D {
        &self.driver
    }

    #[inline(always)]
    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    #[inline(always)]
    fn ensure_active(&self) -> Result<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(Error::NotInitialized)
        }
    }

    /// Activates or deactivates the endpoint, returning whether it is now
    /// active.
    ///
    /// Activating allocates the receive queue, resets the traffic counters and
    /// registers the callbacks with the radio stack. Deactivating unregisters
    /// them and frees the receive queue. Both are no-ops if the endpoint is
    /// already in the requested state.
    pub fn activate(&mut self, active: bool) -> Result<bool> {
        if active {
            self.start()?;
        } else {
            self.stop()?;
        }

        Ok(self.is_active())
    }

    fn start(&mut self) -> Result<()> {
        if self.is_active() {
            return Ok(());
        }

        let capacity = self.config.rx_capacity()?;

        let (writer, mut reader) = ring::frame_queue(capacity);
        reader.set_poll_interval(self.poll_interval);

        let (notify, tokens) = rtrb::RingBuffer::new(NOTIFY_QUEUE_LEN);

        // no callback is registered at this point
        self.counters.reset();

        let callbacks = Callbacks {
            recv: RecvHandler::new(
                writer,
                Arc::clone(&self.counters),
                notify,
                Arc::clone(&self.armed),
                Uptime::new(),
            ),
            send: CompletionHandler::new(Arc::clone(&self.counters)),
        };

        self.driver.init(callbacks)?;

        self.session = Some(Session { reader, tokens });
        self.peer_count.reset();

        log::info!("endpoint activated, {capacity} byte receive buffer");

        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let Some(session) = self.session.take() else {
            return Ok(());
        };

        let deinit = self.driver.deinit();

        // the callbacks are gone with the radio stack, it's now safe to drop the
        // consuming side of the queue
        drop(session);

        // the radio stack forgets every peer
        self.peer_count.reset();

        // forget completions that will never be reported, so that the next
        // synchronous send doesn't wait for them
        let responses = self.counters.tx_responses.load(Ordering::Acquire);
        self.counters.tx_packets.store(responses, Ordering::Release);

        log::info!("endpoint deactivated");

        deinit.map_err(Error::from)
    }

    /// The current settings.
    #[inline(always)]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Applies new settings.
    ///
    /// The new receive queue size only takes effect on the next activation.
    /// The transmit rate, if any, is forwarded to the radio stack right away.
    pub fn configure(&mut self, config: Config) -> Result<()> {
        config.validate()?;

        if let Some(rate) = config.rate {
            self.driver.set_rate(rate)?;
        }

        log::debug!("endpoint configured: {config:?}");

        self.config = config;
        Ok(())
    }

    /// How often blocking calls check for progress.
    #[inline(always)]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn set_poll_interval(&mut self, interval: Duration) {
        self.poll_interval = interval;

        if let Some(session) = &mut self.session {
            session.reader.set_poll_interval(interval);
        }
    }

    #[inline(always)]
    pub fn stats(&self) -> Stats {
        self.counters.snapshot()
    }

    /// Number of bytes waiting in the receive queue.
    pub fn available(&self) -> Result<usize> {
        self.session
            .as_ref()
            .map(|session| session.reader.available())
            .ok_or(Error::NotInitialized)
    }

    /// Signal strength of the last datagram read from each peer.
    ///
    /// Always empty without the `rssi` feature.
    #[inline(always)]
    pub fn peers_table(&self) -> &PeersTable {
        &self.peers_table
    }

    /// Takes the next frame out of the receive queue.
    ///
    /// `accept` is called with the frame's header before anything is consumed.
    /// If it fails, the frame stays in the queue. Returns `Ok(None)` if no
    /// frame arrived within `timeout` (or the configured timeout).
    fn take_frame<T>(
        &mut self,
        timeout: Option<Duration>,
        accept: impl FnOnce(&Header) -> Result<()>,
        consume: impl FnOnce(FrameRef<'_>) -> T,
    ) -> Result<Option<T>> {
        let timeout = timeout.unwrap_or_else(|| self.config.timeout());

        let Some(session) = self.session.as_mut() else {
            return Err(Error::NotInitialized);
        };

        let reader = &mut session.reader;

        if reader.wait_available(HEADER_LEN, timeout).is_err() {
            return Ok(None);
        }

        let mut head = [0; HEADER_LEN];

        // frames are written whole, and we are the only reader
        let header = reader
            .peek(&mut head)
            .map_err(|_| frame::DecodeError::Truncated {
                expected: HEADER_LEN,
                actual: reader.available(),
            })
            .and_then(|()| Header::decode(&head))
            .inspect_err(|e| log::error!("receive buffer corrupted: {e}"))?;

        accept(&header)?;

        let mut buf = [0; MAX_FRAME_LEN];
        let bytes = &mut buf[..header.frame_len()];

        if reader.read_exact(bytes, Duration::ZERO).is_err() {
            let e = frame::DecodeError::Truncated {
                expected: bytes.len(),
                actual: reader.available(),
            };

            log::error!("receive buffer corrupted: {e}");
            return Err(e.into());
        }

        let frame = frame::decode_frame(bytes)?;

        let meta = frame.header.meta;

        if let (Some(rssi), Some(time_ms)) = (meta.rssi(), meta.time_ms()) {
            self.peers_table
                .insert(frame.peer, PeerSignal { rssi, time_ms });
        }

        Ok(Some(consume(frame)))
    }

    /// Waits up to `timeout` (or the configured timeout, if `None`) for a
    /// datagram, and takes it out of the receive queue.
    ///
    /// Returns `Ok(None)` on timeout.
    pub fn receive(&mut self, timeout: Option<Duration>) -> Result<Option<Packet>> {
        self.take_frame(
            timeout,
            |_| Ok(()),
            |frame| Packet {
                peer: frame.peer,
                msg: frame.msg.iter().copied().collect(),
                meta: frame.header.meta,
            },
        )
    }

    /// Like [`receive`](Self::receive), but writes the sender's address to
    /// `peer` and the payload to the start of `msg`, returning the payload's
    /// length.
    ///
    /// `peer` must be exactly [`ETH_ALEN`] bytes long, and `msg` must be long
    /// enough for the next payload. Otherwise, nothing is consumed.
    pub fn receive_into(
        &mut self,
        peer: &mut [u8],
        msg: &mut [u8],
        timeout: Option<Duration>,
    ) -> Result<Option<usize>> {
        self.ensure_active()?;

        let Ok(peer) = <&mut [u8; ETH_ALEN]>::try_from(peer) else {
            log::warn!("rejected receive: peer buffer must be {ETH_ALEN} bytes long");
            return Err(Error::InvalidArgument("peer buffer must be 6 bytes long"));
        };

        let capacity = msg.len();

        self.take_frame(
            timeout,
            |header| {
                if header.msg_len() > capacity {
                    log::warn!(
                        "rejected receive: {} byte message, {capacity} byte buffer",
                        header.msg_len(),
                    );
                    return Err(Error::InvalidArgument("message buffer too small"));
                }

                Ok(())
            },
            |frame| {
                *peer = frame.peer.0;
                msg[..frame.msg.len()].copy_from_slice(frame.msg);
                frame.msg.len()
            },
        )
    }

    /// Returns an iterator of received datagrams, that ends at the first
    /// timeout.
    #[inline(always)]
    pub fn incoming(&mut self, timeout: Option<Duration>) -> Incoming<'_, D> {
        Incoming {
            endpoint: self,
            timeout,
            done: false,
        }
    }

    /// Sends `msg` to `peer`, or to every registered unicast peer if `peer` is
    /// `None`.
    ///
    /// If `sync`, blocks until the radio stack reported the outcome for every
    /// recipient, and returns `false` if any of them did not acknowledge the
    /// datagram. Otherwise, returns `true` as soon as the datagram is queued.
    pub fn send(&mut self, peer: Option<&PeerAddr>, msg: &[u8], sync: bool) -> Result<bool> {
        self.ensure_active()?;

        if msg.len() > MAX_DATA_LEN {
            return Err(Error::InvalidArgument("message too long"));
        }

        let expected = match peer {
            None => self.peer_count.get(),
            Some(_) => 1,
        };

        let barrier = SendBarrier::new(&self.counters, self.poll_interval, SEND_BARRIER_POLLS);
        let driver = &mut self.driver;

        barrier.send(sync, || {
            driver.send(peer, msg)?;
            Ok(expected)
        })
    }

    /// Registers (or, with `None`, unregisters) the callback invoked by
    /// [`dispatch_notifications`](Self::dispatch_notifications).
    pub fn on_receive(&mut self, callback: Option<ReceiveCallback<D>>) {
        self.armed.store(callback.is_some(), Ordering::Release);
        self.on_receive = callback;
        self.on_receive_gen = self.on_receive_gen.wrapping_add(1);
    }

    /// Drains the notifications left by the receive path, and invokes the
    /// receive callback once for each of them.
    ///
    /// This is meant to be called from the application's own loop, never from
    /// the radio stack's context. Returns the number of notifications drained.
    pub fn dispatch_notifications(&mut self) -> usize {
        let Some(session) = &mut self.session else {
            return 0;
        };

        // only drain what is already there, the radio stack may keep pushing
        let queued = session.tokens.slots();
        let tokens = &mut session.tokens;
        let pending = core::iter::from_fn(|| tokens.pop().ok())
            .take(queued)
            .count();

        if pending == 0 {
            return 0;
        }

        let Some(mut callback) = self.on_receive.take() else {
            return pending;
        };

        let generation = self.on_receive_gen;

        for _ in 0..pending {
            callback(self);

            // replaced, or removed, from within
            if self.on_receive_gen != generation {
                return pending;
            }
        }

        self.on_receive = Some(callback);
        pending
    }

    /// Sets the primary master key, `pmk` must be exactly 16 bytes long.
    pub fn set_pmk(&mut self, pmk: &[u8]) -> Result<()> {
        self.ensure_active()?;
        let pmk = Key::try_from(pmk)?;
        Ok(self.driver.set_pmk(&pmk)?)
    }

    pub fn add_peer(&mut self, peer: PeerAddr, options: PeerOptions) -> Result<()> {
        self.ensure_active()?;

        let mut info = PeerInfo::new(peer);
        options.apply(&mut info);

        self.driver.add_peer(&info)?;
        self.peer_count.refresh(&mut self.driver);

        Ok(())
    }

    /// Applies `options` to an already registered peer.
    pub fn modify_peer(&mut self, peer: PeerAddr, options: PeerOptions) -> Result<()> {
        self.ensure_active()?;

        let mut info = self.driver.get_peer(&peer)?;
        options.apply(&mut info);

        self.driver.mod_peer(&info)?;
        self.peer_count.refresh(&mut self.driver);

        Ok(())
    }

    pub fn delete_peer(&mut self, peer: PeerAddr) -> Result<()> {
        self.ensure_active()?;

        self.driver.del_peer(&peer)?;
        self.peer_count.refresh(&mut self.driver);

        Ok(())
    }

    pub fn get_peer(&self, peer: PeerAddr) -> Result<PeerInfo> {
        self.ensure_active()?;
        Ok(self.driver.get_peer(&peer)?)
    }

    /// The records of every registered unicast peer.
    pub fn get_all_peers(&mut self) -> Result<Vec<PeerInfo>> {
        self.ensure_active()?;

        let driver = &mut self.driver;

        Ok((0..self.peer_count.get())
            .map_while(|i| driver.fetch_peer(i == 0).ok())
            .collect())
    }

    /// The number of registered peers, broadcast and multicast included.
    pub fn peer_count(&self) -> Result<PeerNum> {
        self.ensure_active()?;
        Ok(self.driver.peer_num()?)
    }

    /// Number of unicast peers a send to `None` reaches.
    #[inline(always)]
    pub fn unicast_peer_count(&self) -> usize {
        self.peer_count.get()
    }
}

impl<D: Driver> Drop for Endpoint<D> {
    fn drop(&mut self) {
        // nothing left to report to
        let _ = self.stop();
    }
}

/// Iterator returned by [`Endpoint::incoming`].
pub struct Incoming<'a, D: Driver> {
    endpoint: &'a mut Endpoint<D>,
    timeout: Option<Duration>,
    done: bool,
}

impl<D: Driver> Iterator for Incoming<'_, D> {
    type Item = Result<Packet>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let packet = self.endpoint.receive(self.timeout).transpose();

        // stop at the first timeout or error
        self.done = !matches!(packet, Some(Ok(_)));

        packet
    }
}

impl<D: Driver> core::iter::FusedIterator for Incoming<'_, D> {}

#[cfg(all(test, feature = "sim"))]
mod tests {
    use super::*;
    use crate::sim::Medium;
    use core::num::NonZeroUsize;
    use espnow_proto::frame::DecodeError;

    const ADDR: PeerAddr = PeerAddr([2, 0, 0, 0, 0, 1]);

    // swaps the session's queue for one we hold the writing end of
    fn tampered(medium: &Medium) -> (Endpoint<crate::sim::SimRadio>, ring::FrameWriter) {
        let mut endpoint = Endpoint::new(medium.radio(ADDR));
        endpoint.activate(true).unwrap();

        let (writer, reader) = ring::frame_queue(NonZeroUsize::new(64).unwrap());
        let (_, tokens) = rtrb::RingBuffer::new(NOTIFY_QUEUE_LEN);
        endpoint.session = Some(Session { reader, tokens });

        (endpoint, writer)
    }

    #[test]
    fn bad_magic_is_reported_and_left_in_place() {
        let medium = Medium::new();
        let (mut endpoint, mut writer) = tampered(&medium);

        assert!(writer.try_write(&[0x42; 20]));

        assert!(matches!(
            endpoint.receive(Some(Duration::ZERO)),
            Err(Error::BufferCorruption(DecodeError::BadMagic(0x42))),
        ));
        assert_eq!(endpoint.available(), Ok(20));

        let (mut peer, mut msg) = ([0; ETH_ALEN], [0; MAX_DATA_LEN]);
        assert!(matches!(
            endpoint.receive_into(&mut peer, &mut msg, Some(Duration::ZERO)),
            Err(Error::BufferCorruption(DecodeError::BadMagic(0x42))),
        ));
        assert_eq!(endpoint.available(), Ok(20));
    }

    #[test]
    fn truncated_frame_is_reported() {
        let medium = Medium::new();
        let (mut endpoint, mut writer) = tampered(&medium);

        // a valid header announcing 10 bytes of payload, without the payload
        let header = Header::new(10, Metadata::default()).unwrap().encode();
        assert!(writer.try_write(&header));

        assert!(matches!(
            endpoint.receive(Some(Duration::ZERO)),
            Err(Error::BufferCorruption(DecodeError::Truncated { .. })),
        ));
    }

    #[test]
    fn stale_notifications_are_drained_once() {
        let medium = Medium::new();
        let mut endpoint = Endpoint::new(medium.radio(ADDR));
        endpoint.activate(true).unwrap();

        let (mut notify, tokens) = rtrb::RingBuffer::new(NOTIFY_QUEUE_LEN);
        let (_, reader) = ring::frame_queue(NonZeroUsize::new(64).unwrap());
        endpoint.session = Some(Session { reader, tokens });

        for _ in 0..3 {
            notify.push(ADDR).unwrap();
        }

        assert_eq!(endpoint.dispatch_notifications(), 3);
        assert_eq!(endpoint.dispatch_notifications(), 0);
    }
}
