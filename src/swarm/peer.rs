use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;

use super::torrent::Torrent;
use crate::constants::{KEEPALIVE_INTERVAL, RECEIVE_TIMEOUT};
use crate::net::{Conn, Destination};
use crate::peer::{Bitfield, ExtendedHandshake, FrameReader, FrameWriter, Message, PeerId, UT_PEX};
use crate::rpc::PeerConnStats;
use crate::storage::PieceRequest;

/// One live peer connection: protocol flags, their bitfield, the outbound
/// queue, and transfer counters. The wire itself is owned by the reader
/// and writer tasks spawned in [`PeerConn::start`].
pub struct PeerConn {
    pub addr: Destination,
    pub id: PeerId,
    pub inbound: bool,
    /// Remote advertised the extended protocol in its handshake.
    pub supports_extended: bool,
    state: Mutex<PeerState>,
    outbound: mpsc::UnboundedSender<Message>,
    closed: AtomicBool,
    close_notify: Notify,
    bytes_tx: AtomicU64,
    bytes_rx: AtomicU64,
}

pub(super) struct PeerState {
    pub bf: Option<Bitfield>,
    pub am_choking: bool,
    pub am_interested: bool,
    pub peer_choking: bool,
    pub peer_interested: bool,
    pub extended: Option<ExtendedHandshake>,
    /// Whether any wire message has been seen yet; BITFIELD is only legal
    /// before this flips.
    pub saw_first_message: bool,
    /// REQUESTs the remote cancelled before we served them.
    pub cancelled: HashSet<PieceRequest>,
}

impl PeerConn {
    pub(super) fn new(
        addr: Destination,
        id: PeerId,
        inbound: bool,
        supports_extended: bool,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = Arc::new(Self {
            addr,
            id,
            inbound,
            supports_extended,
            state: Mutex::new(PeerState {
                bf: None,
                am_choking: true,
                am_interested: false,
                peer_choking: true,
                peer_interested: false,
                extended: None,
                saw_first_message: false,
                cancelled: HashSet::new(),
            }),
            outbound: tx,
            closed: AtomicBool::new(false),
            close_notify: Notify::new(),
            bytes_tx: AtomicU64::new(0),
            bytes_rx: AtomicU64::new(0),
        });
        (conn, rx)
    }

    /// Enqueues a message for the writer task. Errors are ignored; a dead
    /// writer means the connection is on its way down anyway.
    pub(super) fn send(&self, msg: Message) {
        if let Message::Piece { ref data, .. } = msg {
            self.bytes_tx.fetch_add(data.len() as u64, Ordering::Relaxed);
        }
        let _ = self.outbound.send(msg);
    }

    pub(super) fn count_rx(&self, bytes: u64) {
        self.bytes_rx.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(super) fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.close_notify.notify_waiters();
    }

    pub(super) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(super) fn with_state<T>(&self, f: impl FnOnce(&mut PeerState) -> T) -> T {
        f(&mut self.state.lock())
    }

    /// Snapshot of the remote's bitfield, if it has told us anything yet.
    pub(super) fn bitfield(&self) -> Option<Bitfield> {
        self.state.lock().bf.clone()
    }

    /// The sub-id the remote wants `ut_pex` messages sent under.
    pub(super) fn pex_id(&self) -> Option<u8> {
        self.state
            .lock()
            .extended
            .as_ref()
            .and_then(|hs| hs.id_for(UT_PEX))
    }

    pub fn stats(&self) -> PeerConnStats {
        let state = self.state.lock();
        PeerConnStats {
            addr: self.addr.clone(),
            client: self.id.to_string(),
            inbound: self.inbound,
            bytes_tx: self.bytes_tx.load(Ordering::Relaxed),
            bytes_rx: self.bytes_rx.load(Ordering::Relaxed),
            am_choking: state.am_choking,
            am_interested: state.am_interested,
            peer_choking: state.peer_choking,
            peer_interested: state.peer_interested,
        }
    }

    /// Spawns the reader and writer tasks over a handshaken stream.
    pub(super) fn start(
        self: &Arc<Self>,
        torrent: Arc<Torrent>,
        stream: Box<dyn Conn>,
        rx: mpsc::UnboundedReceiver<Message>,
    ) {
        let (read_half, write_half) = tokio::io::split(stream);
        tokio::spawn(reader_task(
            torrent,
            Arc::clone(self),
            FrameReader::new(read_half),
        ));
        tokio::spawn(writer_task(
            Arc::clone(self),
            FrameWriter::new(write_half),
            rx,
        ));
    }
}

async fn reader_task<R>(torrent: Arc<Torrent>, peer: Arc<PeerConn>, mut reader: FrameReader<R>)
where
    R: tokio::io::AsyncRead + Unpin + Send,
{
    while !peer.is_closed() {
        tokio::select! {
            _ = peer.close_notify.notified() => break,
            read = tokio::time::timeout(RECEIVE_TIMEOUT, reader.recv()) => {
                match read {
                    Err(_) => {
                        tracing::debug!(peer = %peer.addr, "peer silent too long");
                        break;
                    }
                    Ok(Err(err)) => {
                        tracing::debug!(peer = %peer.addr, %err, "peer read failed");
                        break;
                    }
                    Ok(Ok(msg)) => {
                        if torrent.handle_message(&peer, msg).await.is_err() {
                            break;
                        }
                    }
                }
            }
        }
    }
    peer.close();
    torrent.remove_conn(&peer);
}

async fn writer_task<W>(
    peer: Arc<PeerConn>,
    mut writer: FrameWriter<W>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) where
    W: tokio::io::AsyncWrite + Unpin + Send,
{
    let mut last_send = Instant::now();
    while !peer.is_closed() {
        tokio::select! {
            _ = peer.close_notify.notified() => break,
            queued = rx.recv() => {
                let Some(msg) = queued else { break };
                if writer.send(&msg).await.is_err() {
                    break;
                }
                last_send = Instant::now();
            }
            _ = tokio::time::sleep_until(last_send + KEEPALIVE_INTERVAL) => {
                if writer.send(&Message::KeepAlive).await.is_err() {
                    break;
                }
                last_send = Instant::now();
            }
        }
    }
    peer.close();
}
