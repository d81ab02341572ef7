//! The swarm registry: every torrent sharing one overlay transport.
//!
//! Routes inbound connections to their torrent by the infohash in the
//! remote handshake, polls the drop zone for new `*.torrent` files, and
//! exposes the callable methods behind the RPC control surface.

mod announcer;
mod peer;
mod requests;
mod torrent;

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;

pub use peer::PeerConn;
pub use requests::{PieceOutcome, PieceTracker};
pub use torrent::Torrent;

use crate::constants::{DEFAULT_MAX_PENDING, DROP_ZONE_POLL_INTERVAL, HANDSHAKE_TIMEOUT};
use crate::metainfo::{InfoHash, Metainfo};
use crate::net::{Inbound, Network};
use crate::peer::{recv_handshake, PeerError, PeerId};
use crate::rpc::{TorrentStatus, TorrentsList};
use crate::storage::{FsStorage, FsTorrent, StorageError};
use crate::tracker::{Announcer, TrackerError, TrackerFactory};

#[derive(Debug, Error)]
pub enum SwarmError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown torrent")]
    UnknownTorrent,

    #[error("torrent already started")]
    AlreadyStarted,

    #[error("torrent already stopped")]
    AlreadyStopped,

    #[error("duplicate peer address")]
    DuplicatePeer,

    #[error("torrent is not running")]
    NotRunning,

    #[error("refusing to dial our own address")]
    SelfConnect,

    #[error("network unavailable")]
    NoNetwork,

    #[error("peer error: {0}")]
    Peer(#[from] PeerError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("tracker error: {0}")]
    Tracker(#[from] TrackerError),
}

/// Torrent lifecycle notifications, replacing per-torrent callback fields
/// with one event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TorrentEvent {
    Started,
    Completed,
    Stopped,
    Removed,
}

#[derive(Debug, Clone)]
pub struct SwarmEvent {
    pub infohash: InfoHash,
    pub event: TorrentEvent,
}

/// A collection of torrents sharing one network transport, one peer
/// identity, and one storage root.
pub struct Swarm {
    id: PeerId,
    storage: Arc<FsStorage>,
    factory: Arc<dyn TrackerFactory>,
    torrents: RwLock<HashMap<InfoHash, Arc<Torrent>>>,
    open_trackers: Mutex<Vec<(String, Arc<dyn Announcer>)>>,
    net_tx: watch::Sender<Option<Arc<dyn Network>>>,
    events_tx: mpsc::UnboundedSender<SwarmEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<SwarmEvent>>>,
    piece_window: AtomicUsize,
}

impl Swarm {
    pub fn new(storage: Arc<FsStorage>, factory: Arc<dyn TrackerFactory>) -> Arc<Self> {
        let (net_tx, _) = watch::channel(None);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            id: PeerId::generate(),
            storage,
            factory,
            torrents: RwLock::new(HashMap::new()),
            open_trackers: Mutex::new(Vec::new()),
            net_tx,
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            piece_window: AtomicUsize::new(DEFAULT_MAX_PENDING),
        })
    }

    pub fn peer_id(&self) -> PeerId {
        self.id
    }

    /// Takes the lifecycle event stream. Yields `None` after the first call.
    pub fn take_events(&self) -> Option<mpsc::UnboundedReceiver<SwarmEvent>> {
        self.events_rx.lock().take()
    }

    /// Installs (or replaces) the active network transport. Suspended
    /// torrents resume their outbound work.
    pub fn obtained_network(&self, net: Arc<dyn Network>) {
        tracing::info!(addr = %net.local_addr(), "network obtained");
        self.net_tx.send_replace(Some(net));
    }

    /// Marks the transport gone. Outbound operations block until a new one
    /// arrives; existing connections die by their own read errors.
    pub fn lost_network(&self) {
        tracing::warn!("network lost, suspending outbound work");
        self.net_tx.send_replace(None);
    }

    async fn network(&self) -> Option<Arc<dyn Network>> {
        let mut rx = self.net_tx.subscribe();
        let result = match rx.wait_for(|n| n.is_some()).await {
            Ok(guard) => guard.clone(),
            Err(_) => None,
        };
        result
    }

    /// Registers an open tracker applied to every torrent, existing
    /// manifests included.
    pub fn add_open_tracker(&self, name: &str, url: &str) -> Result<(), TrackerError> {
        let client = self.factory.from_url(url)?;
        self.open_trackers.lock().push((name.to_string(), client));
        Ok(())
    }

    // ------------------------------------------------------------------
    // Torrent management
    // ------------------------------------------------------------------

    /// Adds a parsed manifest to the swarm and starts it. Adding the same
    /// infohash twice returns the existing torrent.
    pub async fn add_metainfo(self: &Arc<Self>, meta: Metainfo) -> Result<Arc<Torrent>, SwarmError> {
        if let Some(existing) = self.torrents.read().get(&meta.info_hash) {
            return Ok(Arc::clone(existing));
        }
        let st = self.storage.open_torrent(meta).await?;
        self.adopt(st).await
    }

    /// Opens every torrent already present in the metadata directory.
    pub async fn open_existing(self: &Arc<Self>) -> Result<Vec<Arc<Torrent>>, SwarmError> {
        let mut out = Vec::new();
        for st in self.storage.open_all().await? {
            out.push(self.adopt(st).await?);
        }
        Ok(out)
    }

    async fn adopt(self: &Arc<Self>, st: Arc<FsTorrent>) -> Result<Arc<Torrent>, SwarmError> {
        let ih = st.infohash();
        // First open probes every piece so pre-placed data seeds; a known
        // torrent only re-checks what its bitfield claims.
        st.verify_all(st.was_fresh()).await?;

        let mut trackers: Vec<(String, Arc<dyn Announcer>)> = Vec::new();
        for url in st.metainfo().trackers() {
            match self.factory.from_url(&url) {
                Ok(client) => trackers.push((url.clone(), client)),
                Err(err) => tracing::warn!(%url, %err, "skipping unusable tracker"),
            }
        }
        trackers.extend(self.open_trackers.lock().iter().cloned());

        let torrent = Torrent::new(
            self.id,
            st,
            trackers,
            self.net_tx.subscribe(),
            self.events_tx.clone(),
            self.piece_window.load(Ordering::Relaxed),
        );
        {
            let mut map = self.torrents.write();
            if let Some(existing) = map.get(&ih) {
                return Ok(Arc::clone(existing));
            }
            map.insert(ih, Arc::clone(&torrent));
        }
        torrent.start().await?;
        Ok(torrent)
    }

    pub fn torrent(&self, ih: &InfoHash) -> Option<Arc<Torrent>> {
        self.torrents.read().get(ih).cloned()
    }

    pub fn num_torrents(&self) -> usize {
        self.torrents.read().len()
    }

    // ------------------------------------------------------------------
    // Run loops
    // ------------------------------------------------------------------

    /// Drives the inbound accept loop and the drop-zone poll loop. Runs
    /// until the process exits.
    pub async fn run(self: Arc<Self>) {
        let accept = {
            let sw = Arc::clone(&self);
            tokio::spawn(sw.accept_loop())
        };
        let poll = {
            let sw = Arc::clone(&self);
            tokio::spawn(sw.poll_loop())
        };
        let _ = tokio::join!(accept, poll);
    }

    async fn accept_loop(self: Arc<Self>) {
        loop {
            let Some(net) = self.network().await else {
                return;
            };
            match net.accept().await {
                Ok(inbound) => {
                    let sw = Arc::clone(&self);
                    tokio::spawn(sw.handle_inbound(inbound));
                }
                Err(err) => {
                    tracing::warn!(%err, "accept failed");
                    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                }
            }
        }
    }

    async fn handle_inbound(self: Arc<Self>, inbound: Inbound) {
        let mut stream = inbound.conn;
        let theirs = match timeout(HANDSHAKE_TIMEOUT, recv_handshake(&mut stream)).await {
            Ok(Ok(hs)) => hs,
            _ => {
                tracing::debug!(peer = %inbound.from, "inbound handshake failed");
                return;
            }
        };
        let ih = InfoHash::new(theirs.info_hash);
        match self.torrent(&ih) {
            Some(torrent) => torrent.accept_peer(stream, inbound.from, theirs).await,
            None => {
                tracing::debug!(peer = %inbound.from, infohash = %ih, "inbound for unknown torrent")
            }
        }
    }

    async fn poll_loop(self: Arc<Self>) {
        loop {
            tokio::time::sleep(DROP_ZONE_POLL_INTERVAL).await;
            for st in self.storage.poll_new().await {
                tracing::info!(torrent = %st.name(), "adopting torrent from drop zone");
                if let Err(err) = self.adopt(st).await {
                    tracing::warn!(%err, "failed to adopt dropped torrent");
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // RPC-facing methods
    // ------------------------------------------------------------------

    pub fn list(&self) -> TorrentsList {
        TorrentsList {
            torrents: self.torrents.read().values().map(|t| t.status()).collect(),
        }
    }

    pub fn status(&self, ih: &InfoHash) -> Result<TorrentStatus, SwarmError> {
        self.torrent(ih)
            .map(|t| t.status())
            .ok_or(SwarmError::UnknownTorrent)
    }

    pub async fn start(&self, ih: &InfoHash) -> Result<(), SwarmError> {
        self.torrent(ih)
            .ok_or(SwarmError::UnknownTorrent)?
            .start()
            .await
    }

    pub async fn stop(&self, ih: &InfoHash) -> Result<(), SwarmError> {
        self.torrent(ih)
            .ok_or(SwarmError::UnknownTorrent)?
            .stop()
            .await
    }

    /// Stops and unregisters a torrent, leaving its data on disk.
    pub async fn remove(&self, ih: &InfoHash) -> Result<(), SwarmError> {
        let torrent = self.torrent(ih).ok_or(SwarmError::UnknownTorrent)?;
        torrent.remove().await?;
        self.torrents.write().remove(ih);
        Ok(())
    }

    /// Stops, unregisters, and deletes a torrent's files.
    pub async fn delete(&self, ih: &InfoHash) -> Result<(), SwarmError> {
        let torrent = self.torrent(ih).ok_or(SwarmError::UnknownTorrent)?;
        torrent.delete().await?;
        self.torrents.write().remove(ih);
        Ok(())
    }

    /// Applies a new in-flight request cap to every torrent, and to
    /// torrents added later.
    pub fn set_piece_window(&self, n: usize) {
        self.piece_window.store(n.max(1), Ordering::Relaxed);
        for torrent in self.torrents.read().values() {
            torrent.set_piece_window(n);
        }
    }
}
