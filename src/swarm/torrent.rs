use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;

use super::announcer::AnnounceState;
use super::peer::PeerConn;
use super::requests::{PieceOutcome, PieceTracker};
use super::{SwarmError, SwarmEvent, TorrentEvent};
use crate::constants::{
    CLIENT_VERSION, HANDSHAKE_TIMEOUT, MAX_SERVE_LENGTH, PERSIST_PEER_DELAY, PERSIST_PEER_TRIES,
    PEX_BROADCAST_INTERVAL,
};
use crate::metainfo::{InfoHash, Metainfo};
use crate::net::{Conn, Destination, Network};
use crate::peer::{
    recv_handshake, send_handshake, Bitfield, ExtendedHandshake, Handshake, Message, PeerError,
    PeerId, EXTENSION_HANDSHAKE_ID, UT_PEX_ID,
};
use crate::pex::{PexMessage, PexSwarmState};
use crate::rpc::{TorrentFileStatus, TorrentState as RpcState, TorrentStatus};
use crate::storage::{FsTorrent, PieceData, PieceRequest, StorageError};
use crate::tracker::Announcer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum RunState {
    Stopped,
    Running,
    Closing,
}

pub(super) struct Conns {
    pub ib: HashMap<Destination, Arc<PeerConn>>,
    pub ob: HashMap<Destination, Arc<PeerConn>>,
}

/// One torrent in the swarm: its peer set, request scheduler, announcer
/// state, and lifecycle.
pub struct Torrent {
    pub(super) id: PeerId,
    pub(super) st: Arc<FsTorrent>,
    pub(super) requests: PieceTracker,
    pub(super) trackers: Vec<(String, Arc<dyn Announcer>)>,
    pub(super) announce: Mutex<HashMap<String, AnnounceState>>,
    pub(super) conns: Mutex<Conns>,
    state: Mutex<RunState>,
    network_rx: watch::Receiver<Option<Arc<dyn Network>>>,
    pex: PexSwarmState,
    events: mpsc::UnboundedSender<SwarmEvent>,
    /// Set once the `completed` tracker event has been issued.
    pub(super) completed_announced: AtomicBool,
    pub(super) uploaded: AtomicU64,
    pub(super) downloaded: AtomicU64,
}

impl Torrent {
    pub(super) fn new(
        id: PeerId,
        st: Arc<FsTorrent>,
        trackers: Vec<(String, Arc<dyn Announcer>)>,
        network_rx: watch::Receiver<Option<Arc<dyn Network>>>,
        events: mpsc::UnboundedSender<SwarmEvent>,
        max_pending: usize,
    ) -> Arc<Self> {
        let requests = PieceTracker::new(Arc::clone(&st));
        requests.set_max_pending(max_pending);
        Arc::new(Self {
            id,
            st,
            requests,
            trackers,
            announce: Mutex::new(HashMap::new()),
            conns: Mutex::new(Conns {
                ib: HashMap::new(),
                ob: HashMap::new(),
            }),
            state: Mutex::new(RunState::Stopped),
            network_rx,
            pex: PexSwarmState::new(),
            events,
            completed_announced: AtomicBool::new(false),
            uploaded: AtomicU64::new(0),
            downloaded: AtomicU64::new(0),
        })
    }

    pub fn name(&self) -> &str {
        self.st.name()
    }

    pub fn infohash(&self) -> InfoHash {
        self.st.infohash()
    }

    pub fn metainfo(&self) -> &Metainfo {
        self.st.metainfo()
    }

    pub fn bitfield(&self) -> Bitfield {
        self.st.bitfield()
    }

    /// True once every piece is verified and on disk.
    pub fn done(&self) -> bool {
        self.st.is_complete()
    }

    pub(super) fn run_state(&self) -> RunState {
        *self.state.lock()
    }

    fn emit(&self, event: TorrentEvent) {
        let _ = self.events.send(SwarmEvent {
            infohash: self.infohash(),
            event,
        });
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Marks the torrent running and launches its task loops.
    pub async fn start(self: &Arc<Self>) -> Result<(), SwarmError> {
        {
            let mut state = self.state.lock();
            if *state != RunState::Stopped {
                return Err(SwarmError::AlreadyStarted);
            }
            *state = RunState::Running;
        }
        tracing::info!(torrent = %self.name(), infohash = %self.infohash(), "started");
        self.emit(TorrentEvent::Started);

        let t = Arc::clone(self);
        tokio::spawn(t.run_loop());
        let t = Arc::clone(self);
        tokio::spawn(t.announce_loop());
        if !self.metainfo().is_private() {
            let t = Arc::clone(self);
            tokio::spawn(t.pex_loop());
        }
        Ok(())
    }

    // Waits for completion, then announces it to observers once.
    async fn run_loop(self: Arc<Self>) {
        loop {
            if self.run_state() != RunState::Running {
                return;
            }
            if self.done() {
                break;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        tracing::info!(torrent = %self.name(), "download complete");
        self.emit(TorrentEvent::Completed);
    }

    /// Stops the torrent: closes every peer, waits the peer count down to
    /// zero, flushes the store, and tells each tracker we left.
    pub async fn stop(self: &Arc<Self>) -> Result<(), SwarmError> {
        {
            let mut state = self.state.lock();
            if *state != RunState::Running {
                return Err(SwarmError::AlreadyStopped);
            }
            *state = RunState::Closing;
        }
        tracing::info!(torrent = %self.name(), "stopping");

        for peer in self.visit_peers() {
            peer.close();
        }
        while self.num_peers() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.st.flush().await?;

        // Best effort; a suspended network must not wedge shutdown.
        let _ = timeout(Duration::from_secs(10), self.announce_all(crate::tracker::Event::Stopped))
            .await;

        *self.state.lock() = RunState::Stopped;
        self.emit(TorrentEvent::Stopped);
        Ok(())
    }

    /// Stop and ask the registry to forget us.
    pub async fn remove(self: &Arc<Self>) -> Result<(), SwarmError> {
        self.stop().await?;
        self.emit(TorrentEvent::Removed);
        Ok(())
    }

    /// Stop, then delete manifest, bitfield, and content from disk.
    pub async fn delete(self: &Arc<Self>) -> Result<(), SwarmError> {
        let _ = self.stop().await;
        self.st.delete().await?;
        self.emit(TorrentEvent::Removed);
        Ok(())
    }

    /// Adjusts the torrent-wide in-flight request cap.
    pub fn set_piece_window(&self, n: usize) {
        self.requests.set_max_pending(n);
    }

    /// Resolves the active network transport, waiting through suspension.
    /// `None` means the swarm is gone and the caller should bail out.
    pub(super) async fn network(&self) -> Option<Arc<dyn Network>> {
        let mut rx = self.network_rx.clone();
        let result = match rx.wait_for(|n| n.is_some()).await {
            Ok(guard) => guard.clone(),
            Err(_) => None,
        };
        result
    }

    // ------------------------------------------------------------------
    // Peer set
    // ------------------------------------------------------------------

    pub fn num_peers(&self) -> usize {
        let conns = self.conns.lock();
        conns.ib.len() + conns.ob.len()
    }

    pub(super) fn visit_peers(&self) -> Vec<Arc<PeerConn>> {
        let conns = self.conns.lock();
        conns.ib.values().chain(conns.ob.values()).cloned().collect()
    }

    fn has_conn(&self, addr: &Destination) -> bool {
        let conns = self.conns.lock();
        conns.ib.contains_key(addr) || conns.ob.contains_key(addr)
    }

    fn has_ib(&self, addr: &Destination) -> bool {
        self.conns.lock().ib.contains_key(addr)
    }

    fn has_ob(&self, addr: &Destination) -> bool {
        self.conns.lock().ob.contains_key(addr)
    }

    pub(super) fn remove_conn(&self, peer: &Arc<PeerConn>) {
        {
            let mut conns = self.conns.lock();
            let map = if peer.inbound {
                &mut conns.ib
            } else {
                &mut conns.ob
            };
            match map.get(&peer.addr) {
                Some(existing) if Arc::ptr_eq(existing, peer) => {
                    map.remove(&peer.addr);
                }
                _ => return,
            }
        }
        tracing::debug!(torrent = %self.name(), peer = %peer.addr, "peer gone");
        self.pex.on_peer_disconnected(peer.addr.clone());
        self.requests.release_peer(&peer.addr);
    }

    /// Offers freshly learned addresses to the torrent. Our own address
    /// and addresses we already talk to are dropped; the rest get a
    /// persistent dialer task each.
    pub(super) async fn add_destinations(self: &Arc<Self>, dests: Vec<Destination>) {
        let Some(net) = self.network().await else {
            return;
        };
        let local = net.local_addr();
        let mut seen = std::collections::HashSet::new();
        for dest in dests {
            if dest == local || self.has_conn(&dest) || !seen.insert(dest.clone()) {
                continue;
            }
            let t = Arc::clone(self);
            tokio::spawn(async move { t.persist_peer(dest).await });
        }
    }

    // Retries an outbound dial with a bounded number of attempts, backing
    // off a second between tries, and aborts as soon as the peer shows up
    // inbound or the torrent starts closing.
    async fn persist_peer(self: Arc<Self>, addr: Destination) {
        let mut tries_left = PERSIST_PEER_TRIES;
        while self.run_state() == RunState::Running {
            if self.has_ib(&addr) {
                return;
            }
            if !self.has_ob(&addr) {
                match self.dial_peer(&addr).await {
                    Ok(()) => return,
                    Err(err) => {
                        tracing::debug!(peer = %addr, %err, "dial failed");
                        tries_left -= 1;
                        if tries_left == 0 {
                            return;
                        }
                    }
                }
            }
            tokio::time::sleep(PERSIST_PEER_DELAY).await;
        }
    }

    /// Dials `addr`, exchanges handshakes, and installs the peer into the
    /// outbound map.
    pub(super) async fn dial_peer(self: &Arc<Self>, addr: &Destination) -> Result<(), SwarmError> {
        if self.has_ob(addr) {
            return Ok(());
        }
        let Some(net) = self.network().await else {
            return Err(SwarmError::NoNetwork);
        };
        if *addr == net.local_addr() {
            return Err(SwarmError::SelfConnect);
        }

        let mut stream = net.dial(addr).await?;
        let ours = Handshake::new(*self.infohash().as_bytes(), *self.id.as_bytes());
        timeout(HANDSHAKE_TIMEOUT, send_handshake(&mut stream, &ours))
            .await
            .map_err(|_| PeerError::Timeout)??;
        let theirs = timeout(HANDSHAKE_TIMEOUT, recv_handshake(&mut stream))
            .await
            .map_err(|_| PeerError::Timeout)??;
        if theirs.info_hash != *self.infohash().as_bytes() {
            tracing::warn!(peer = %addr, "infohash mismatch in handshake");
            return Err(PeerError::InfohashMismatch.into());
        }
        self.install_peer(stream, addr.clone(), &theirs, false)
    }

    /// Accepts an inbound stream routed to us by the registry; the remote
    /// handshake has been read and its infohash already matched.
    pub(super) async fn accept_peer(
        self: &Arc<Self>,
        mut stream: Box<dyn Conn>,
        from: Destination,
        theirs: Handshake,
    ) {
        if self.has_conn(&from) {
            tracing::debug!(peer = %from, "duplicate inbound peer");
            return;
        }
        let ours = Handshake::new(*self.infohash().as_bytes(), *self.id.as_bytes());
        if timeout(HANDSHAKE_TIMEOUT, send_handshake(&mut stream, &ours))
            .await
            .map_err(|_| PeerError::Timeout)
            .and_then(|r| r.map_err(|_| PeerError::ConnectionClosed))
            .is_err()
        {
            return;
        }
        if let Err(err) = self.install_peer(stream, from.clone(), &theirs, true) {
            tracing::debug!(peer = %from, %err, "inbound peer refused");
        }
    }

    fn install_peer(
        self: &Arc<Self>,
        stream: Box<dyn Conn>,
        addr: Destination,
        theirs: &Handshake,
        inbound: bool,
    ) -> Result<(), SwarmError> {
        if self.run_state() != RunState::Running {
            return Err(SwarmError::NotRunning);
        }
        let (peer, rx) = PeerConn::new(
            addr.clone(),
            PeerId::from_bytes(theirs.peer_id),
            inbound,
            theirs.supports_extended(),
        );
        {
            let mut conns = self.conns.lock();
            if conns.ib.contains_key(&addr) || conns.ob.contains_key(&addr) {
                return Err(SwarmError::DuplicatePeer);
            }
            let map = if inbound {
                &mut conns.ib
            } else {
                &mut conns.ob
            };
            map.insert(addr.clone(), Arc::clone(&peer));
        }
        tracing::debug!(torrent = %self.name(), peer = %addr, inbound, id = %peer.id, "new peer");
        self.pex.on_peer_connected(addr);

        // Bitfield goes out first, then our extended handshake. Everyone
        // is unchoked on arrival: the minimal policy serves interested
        // peers in whatever order they ask.
        peer.send(Message::Bitfield(self.bitfield().to_wire_bytes()));
        if peer.supports_extended {
            peer.send(Message::Extended {
                id: EXTENSION_HANDSHAKE_ID,
                payload: ExtendedHandshake::ours(CLIENT_VERSION).encode(),
            });
        }
        peer.with_state(|s| s.am_choking = false);
        peer.send(Message::Unchoke);

        peer.start(Arc::clone(self), stream, rx);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Wire message handling
    // ------------------------------------------------------------------

    /// Dispatches one inbound message. An error closes the connection.
    pub(super) async fn handle_message(
        self: &Arc<Self>,
        peer: &Arc<PeerConn>,
        msg: Message,
    ) -> Result<(), PeerError> {
        let seen_before = peer.with_state(|s| {
            let was = s.saw_first_message;
            if !matches!(msg, Message::KeepAlive) {
                s.saw_first_message = true;
            }
            was
        });

        match msg {
            Message::KeepAlive => {}
            Message::Choke => {
                peer.with_state(|s| s.peer_choking = true);
                // Whatever we had in flight to them is implicitly discarded.
                self.requests.release_peer(&peer.addr);
            }
            Message::Unchoke => {
                peer.with_state(|s| s.peer_choking = false);
                self.schedule_requests(peer);
            }
            Message::Interested => peer.with_state(|s| s.peer_interested = true),
            Message::NotInterested => peer.with_state(|s| s.peer_interested = false),
            Message::Have { piece } => {
                let np = self.metainfo().num_pieces();
                peer.with_state(|s| {
                    s.bf.get_or_insert_with(|| Bitfield::new(np)).set(piece);
                });
                self.evaluate_interest(peer);
                self.schedule_requests(peer);
            }
            Message::Bitfield(bits) => {
                if seen_before {
                    return Err(PeerError::Protocol("bitfield not first message"));
                }
                let np = self.metainfo().num_pieces();
                peer.with_state(|s| s.bf = Some(Bitfield::from_wire_bytes(&bits, np)));
                self.evaluate_interest(peer);
            }
            Message::Request {
                index,
                begin,
                length,
            } => {
                self.handle_request(
                    peer,
                    PieceRequest {
                        index,
                        begin,
                        length,
                    },
                )
                .await?;
            }
            Message::Piece { index, begin, data } => {
                self.handle_piece(peer, PieceData { index, begin, data })
                    .await?;
            }
            Message::Cancel {
                index,
                begin,
                length,
            } => {
                peer.with_state(|s| {
                    // Unserved cancels can pile up for requests we ignored;
                    // keep the set bounded.
                    if s.cancelled.len() > 256 {
                        s.cancelled.clear();
                    }
                    s.cancelled.insert(PieceRequest {
                        index,
                        begin,
                        length,
                    });
                });
            }
            Message::Extended { id, payload } => self.handle_extended(peer, id, payload).await?,
        }
        Ok(())
    }

    async fn handle_request(
        self: &Arc<Self>,
        peer: &Arc<PeerConn>,
        req: PieceRequest,
    ) -> Result<(), PeerError> {
        if req.length == 0 {
            tracing::info!(peer = %peer.addr, "zero length piece request");
            return Err(PeerError::Protocol("zero length request"));
        }
        if req.length > MAX_SERVE_LENGTH {
            return Err(PeerError::Protocol("request larger than a wire frame"));
        }
        // Serve only pieces we have, and only while not choking them. No
        // reactive CHOKE for the rest; the request is just ignored.
        let am_choking = peer.with_state(|s| s.am_choking);
        if am_choking || !self.bitfield().has(req.index) {
            return Ok(());
        }
        match self.st.visit_piece(&req).await {
            Ok(data) => {
                let was_cancelled = peer.with_state(|s| s.cancelled.remove(&req));
                if !was_cancelled {
                    tracing::debug!(peer = %peer.addr, index = req.index, begin = req.begin, "serving block");
                    self.uploaded
                        .fetch_add(u64::from(req.length), Ordering::Relaxed);
                    peer.send(Message::Piece {
                        index: data.index,
                        begin: data.begin,
                        data: data.data,
                    });
                }
                Ok(())
            }
            Err(err) => {
                tracing::warn!(torrent = %self.name(), index = req.index, %err, "failed to read block for peer");
                Ok(())
            }
        }
    }

    async fn handle_piece(
        self: &Arc<Self>,
        peer: &Arc<PeerConn>,
        piece: PieceData,
    ) -> Result<(), PeerError> {
        peer.count_rx(piece.data.len() as u64);
        self.downloaded
            .fetch_add(piece.data.len() as u64, Ordering::Relaxed);

        match self.requests.handle_piece(&peer.addr, &piece) {
            PieceOutcome::Progress { cancels } => {
                self.send_cancels(cancels);
                self.schedule_requests(peer);
                Ok(())
            }
            PieceOutcome::Complete { data, cancels } => {
                self.send_cancels(cancels);
                let index = piece.index;
                let assembled = PieceData {
                    index,
                    begin: 0,
                    data,
                };
                match self.st.put_piece(&assembled).await {
                    Ok(()) => {
                        tracing::debug!(torrent = %self.name(), index, "got piece");
                        self.broadcast_have(index);
                        for p in self.visit_peers() {
                            self.evaluate_interest(&p);
                        }
                        if self.done() {
                            let _ = self.st.flush().await;
                        }
                        self.schedule_requests(peer);
                        Ok(())
                    }
                    Err(StorageError::InvalidPiece(_)) => {
                        // Descriptor is gone; the piece will be re-fetched
                        // from scratch. The last contributor pays.
                        tracing::warn!(torrent = %self.name(), index, peer = %peer.addr, "piece failed hash check");
                        Err(PeerError::Protocol("piece failed hash check"))
                    }
                    Err(err) => {
                        tracing::warn!(torrent = %self.name(), index, %err, "failed to store piece");
                        self.requests.drop_piece(index);
                        Ok(())
                    }
                }
            }
            PieceOutcome::Ignored => Ok(()),
            PieceOutcome::Malformed => Err(PeerError::Protocol("malformed piece message")),
        }
    }

    async fn handle_extended(
        self: &Arc<Self>,
        peer: &Arc<PeerConn>,
        id: u8,
        payload: Bytes,
    ) -> Result<(), PeerError> {
        if id == EXTENSION_HANDSHAKE_ID {
            let hs = ExtendedHandshake::decode(&payload)?;
            tracing::debug!(peer = %peer.addr, client = ?hs.client, "extended handshake");
            peer.with_state(|s| s.extended = Some(hs));
            return Ok(());
        }
        if id == UT_PEX_ID {
            if self.metainfo().is_private() {
                return Ok(());
            }
            let msg = PexMessage::decode(&payload)?;
            tracing::debug!(peer = %peer.addr, added = msg.added.len(), dropped = msg.dropped.len(), "pex");
            self.add_destinations(msg.added).await;
            return Ok(());
        }
        // Unknown sub-ids are ignored, not fatal.
        Ok(())
    }

    // ------------------------------------------------------------------
    // Scheduling glue
    // ------------------------------------------------------------------

    fn swarm_bitfields(&self) -> Vec<Bitfield> {
        self.visit_peers()
            .into_iter()
            .filter_map(|p| p.bitfield())
            .collect()
    }

    /// Fills the peer's request window if they will serve us.
    fn schedule_requests(&self, peer: &Arc<PeerConn>) {
        let (choked, interested) = peer.with_state(|s| (s.peer_choking, s.am_interested));
        if choked || !interested {
            return;
        }
        let Some(bf) = peer.bitfield() else { return };
        let swarm = self.swarm_bitfields();
        for req in self.requests.next_requests(&peer.addr, &bf, &swarm) {
            peer.send(Message::Request {
                index: req.index,
                begin: req.begin,
                length: req.length,
            });
        }
    }

    /// Flips our interest flag to match whether the peer has anything we
    /// lack, telling them when it changes.
    fn evaluate_interest(&self, peer: &Arc<PeerConn>) {
        let Some(bf) = peer.bitfield() else { return };
        let wants = self.requests.wants_any(&bf);
        let flipped = peer.with_state(|s| {
            if wants != s.am_interested {
                s.am_interested = wants;
                true
            } else {
                false
            }
        });
        if flipped {
            peer.send(if wants {
                Message::Interested
            } else {
                Message::NotInterested
            });
            if wants {
                self.schedule_requests(peer);
            }
        }
    }

    fn broadcast_have(&self, index: u32) {
        for peer in self.visit_peers() {
            peer.send(Message::Have { piece: index });
        }
    }

    fn send_cancels(&self, cancels: Vec<(Destination, PieceRequest)>) {
        if cancels.is_empty() {
            return;
        }
        let conns = self.conns.lock();
        for (dest, req) in cancels {
            let target = conns.ib.get(&dest).or_else(|| conns.ob.get(&dest));
            if let Some(p) = target {
                p.send(Message::Cancel {
                    index: req.index,
                    begin: req.begin,
                    length: req.length,
                });
            }
        }
    }

    // ------------------------------------------------------------------
    // PEX
    // ------------------------------------------------------------------

    async fn pex_loop(self: Arc<Self>) {
        loop {
            tokio::time::sleep(PEX_BROADCAST_INTERVAL).await;
            if self.run_state() != RunState::Running {
                return;
            }
            let msg = self.pex.pop();
            if msg.is_empty() {
                continue;
            }
            let payload = msg.encode();
            for peer in self.visit_peers() {
                if let Some(id) = peer.pex_id() {
                    peer.send(Message::Extended {
                        id,
                        payload: payload.clone(),
                    });
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Status
    // ------------------------------------------------------------------

    pub fn status(&self) -> TorrentStatus {
        let bf = self.bitfield();
        let meta = self.metainfo();
        let state = match self.run_state() {
            RunState::Running if self.done() => RpcState::Seeding,
            RunState::Running => RpcState::Downloading,
            _ => RpcState::Stopped,
        };
        let piece_length = u64::from(meta.info.piece_length);
        let files = meta
            .info
            .files
            .iter()
            .map(|f| {
                // A file's progress is counted over its covering piece
                // range; byte-slicing the bitfield would misalign.
                let progress = if f.length == 0 {
                    1.0
                } else {
                    let first = (f.offset / piece_length) as u32;
                    let last = ((f.offset + f.length - 1) / piece_length) as u32;
                    let have = bf.count_set_in(first, last + 1);
                    f64::from(have) / f64::from(last - first + 1)
                };
                TorrentFileStatus {
                    path: f.path.display().to_string(),
                    length: f.length,
                    progress,
                }
            })
            .collect();

        TorrentStatus {
            name: self.name().to_string(),
            infohash: self.infohash().to_hex(),
            state,
            progress: bf.progress(),
            peers: self.visit_peers().iter().map(|p| p.stats()).collect(),
            files,
        }
    }
}
