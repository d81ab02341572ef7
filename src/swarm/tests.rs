use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use sha1::{Digest, Sha1};
use tempfile::TempDir;

use super::announcer::AnnounceState;
use super::*;
use crate::metainfo::Metainfo;
use crate::net::memory::{MemoryHub, MemoryNetwork};
use crate::net::{Conn, Destination, Inbound, Network};
use crate::peer::{
    recv_handshake, send_handshake, Bitfield, FrameReader, FrameWriter, Handshake, Message,
};
use crate::rpc::TorrentState;
use crate::storage::PieceRequest;
use crate::tracker::{
    AnnounceRequest, AnnounceResponse, Announcer, Event, TrackerError, TrackerFactory, TrackerPeer,
};

// ----------------------------------------------------------------------
// Test doubles
// ----------------------------------------------------------------------

struct StaticTracker {
    url: String,
    peers: Mutex<Vec<Destination>>,
    events: Mutex<Vec<Event>>,
    fail: AtomicBool,
}

impl StaticTracker {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            url: "http://tracker.b32.i2p/announce".to_string(),
            peers: Mutex::new(Vec::new()),
            events: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        })
    }

    fn set_peers(&self, peers: Vec<Destination>) {
        *self.peers.lock() = peers;
    }

    fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl Announcer for StaticTracker {
    async fn announce(&self, req: AnnounceRequest) -> Result<AnnounceResponse, TrackerError> {
        self.events.lock().push(req.event);
        if self.fail.load(Ordering::Relaxed) {
            return Err(TrackerError::Unreachable("down".to_string()));
        }
        Ok(AnnounceResponse {
            interval: Duration::from_secs(60),
            peers: self
                .peers
                .lock()
                .iter()
                .map(|d| TrackerPeer {
                    id: None,
                    destination: d.clone(),
                })
                .collect(),
        })
    }

    fn url(&self) -> &str {
        &self.url
    }
}

struct StaticFactory {
    tracker: Arc<StaticTracker>,
}

impl TrackerFactory for StaticFactory {
    fn from_url(&self, _url: &str) -> Result<Arc<dyn Announcer>, TrackerError> {
        Ok(Arc::clone(&self.tracker) as Arc<dyn Announcer>)
    }
}

struct CountingNetwork {
    inner: MemoryNetwork,
    dials: AtomicUsize,
}

#[async_trait]
impl Network for CountingNetwork {
    async fn dial(&self, dest: &Destination) -> std::io::Result<Box<dyn Conn>> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        self.inner.dial(dest).await
    }

    async fn accept(&self) -> std::io::Result<Inbound> {
        self.inner.accept().await
    }

    fn local_addr(&self) -> Destination {
        self.inner.local_addr()
    }
}

// ----------------------------------------------------------------------
// Helpers
// ----------------------------------------------------------------------

fn piece_hashes(content: &[u8], piece_length: usize) -> Vec<[u8; 20]> {
    content
        .chunks(piece_length)
        .map(|chunk| Sha1::digest(chunk).into())
        .collect()
}

fn test_meta(name: &str, content: &[u8], piece_length: u32) -> Metainfo {
    let raw = crate::metainfo::tests::single_file_torrent(
        name,
        content.len() as u64,
        piece_length,
        &piece_hashes(content, piece_length as usize),
    );
    Metainfo::from_bytes(&raw).unwrap()
}

async fn make_swarm(root: &Path, tracker: Arc<StaticTracker>) -> Arc<Swarm> {
    let storage = crate::storage::FsStorage::new(root.join("data"), root.join("meta"));
    storage.init().await.unwrap();
    Swarm::new(storage, Arc::new(StaticFactory { tracker }))
}

async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for: {what}");
}

fn test_content(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

// ----------------------------------------------------------------------
// Scenarios
// ----------------------------------------------------------------------

#[tokio::test]
async fn preplaced_data_seeds_immediately() {
    let temp = TempDir::new().unwrap();
    let hub = MemoryHub::new();
    let tracker = StaticTracker::new();
    let swarm = make_swarm(temp.path(), Arc::clone(&tracker)).await;
    swarm.obtained_network(Arc::new(hub.join("seed.b32.i2p")));

    // Exact bytes on disk before the torrent is opened, no bitfield file.
    let content = test_content(32768);
    tokio::fs::create_dir_all(temp.path().join("data"))
        .await
        .unwrap();
    tokio::fs::write(temp.path().join("data/movie.bin"), &content)
        .await
        .unwrap();

    let meta = test_meta("movie.bin", &content, 16384);
    let torrent = swarm.add_metainfo(meta).await.unwrap();

    assert!(torrent.done());
    let status = torrent.status();
    assert_eq!(status.state, TorrentState::Seeding);
    assert_eq!(status.progress, 1.0);
    // Resumed-as-complete torrents report `completed`, not `started`.
    wait_until("completed announce", || {
        tracker.events().contains(&Event::Completed)
    })
    .await;
}

#[tokio::test]
async fn leecher_downloads_from_seeder() {
    let temp = TempDir::new().unwrap();
    let hub = MemoryHub::new();
    let tracker = StaticTracker::new();
    let content = test_content(49152); // 3 pieces of 16 KiB
    let meta = test_meta("blob.bin", &content, 16384);

    // Seeder side.
    let seeder = make_swarm(&temp.path().join("a"), StaticTracker::new()).await;
    seeder.obtained_network(Arc::new(hub.join("seed.b32.i2p")));
    tokio::fs::write(temp.path().join("a/data/blob.bin"), &content)
        .await
        .unwrap();
    let seed_torrent = seeder
        .add_metainfo(Metainfo::from_bytes(meta.as_bytes()).unwrap())
        .await
        .unwrap();
    assert!(seed_torrent.done());
    tokio::spawn(Arc::clone(&seeder).run());

    // Leecher side, pointed at the seeder by its tracker.
    tracker.set_peers(vec!["seed.b32.i2p".into()]);
    let leecher = make_swarm(&temp.path().join("b"), Arc::clone(&tracker)).await;
    leecher.obtained_network(Arc::new(hub.join("leech.b32.i2p")));
    let mut events = leecher.take_events().unwrap();
    let torrent = leecher.add_metainfo(meta).await.unwrap();

    wait_until("download complete", || torrent.done()).await;
    assert_eq!(torrent.bitfield().count_set(), 3);
    assert_eq!(torrent.status().state, TorrentState::Seeding);
    // All in-flight accounting drained.
    assert_eq!(torrent.requests.pending(), 0);

    // Bytes are on disk and correct.
    let got = tokio::fs::read(temp.path().join("b/data/blob.bin"))
        .await
        .unwrap();
    assert_eq!(got, content);

    // The event stream saw the lifecycle.
    let mut saw_completed = false;
    while let Ok(ev) = events.try_recv() {
        if ev.event == TorrentEvent::Completed {
            saw_completed = true;
        }
    }
    assert!(saw_completed);
}

#[tokio::test]
async fn hash_mismatch_leaves_bit_unset_and_drops_peer() {
    let temp = TempDir::new().unwrap();
    let hub = MemoryHub::new();
    let tracker = StaticTracker::new();
    let content = test_content(16384);
    let meta = test_meta("x.bin", &content, 16384);
    let raw_ih = *meta.info_hash.as_bytes();

    // A scripted seeder that claims everything and serves garbage.
    let bad_net = hub.join("bad.b32.i2p");
    let served = Arc::new(AtomicUsize::new(0));
    let served_counter = Arc::clone(&served);
    tokio::spawn(async move {
        let inbound = bad_net.accept().await.unwrap();
        let mut stream = inbound.conn;
        let _theirs = recv_handshake(&mut stream).await.unwrap();
        let ours = Handshake::new(raw_ih, *crate::peer::PeerId::generate().as_bytes());
        send_handshake(&mut stream, &ours).await.unwrap();

        let (r, w) = tokio::io::split(stream);
        let mut reader = FrameReader::new(r);
        let mut writer = FrameWriter::new(w);
        writer
            .send(&Message::Bitfield(
                Bitfield::new(1).inverted().to_wire_bytes(),
            ))
            .await
            .unwrap();
        writer.send(&Message::Unchoke).await.unwrap();
        loop {
            match reader.recv().await {
                Ok(Message::Request {
                    index,
                    begin,
                    length,
                }) => {
                    served_counter.fetch_add(1, Ordering::SeqCst);
                    let junk = Bytes::from(vec![0xAB; length as usize]);
                    if writer
                        .send(&Message::Piece {
                            index,
                            begin,
                            data: junk,
                        })
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Ok(_) => {}
                Err(_) => break,
            }
        }
    });

    tracker.set_peers(vec!["bad.b32.i2p".into()]);
    let swarm = make_swarm(temp.path(), tracker).await;
    swarm.obtained_network(Arc::new(hub.join("victim.b32.i2p")));
    let torrent = swarm.add_metainfo(meta).await.unwrap();

    wait_until("garbage block served", || served.load(Ordering::SeqCst) >= 1).await;
    // The offending peer is dropped, the bit stays unset, and the
    // in-progress descriptor is gone so the piece can be refetched.
    wait_until("bad peer dropped", || torrent.num_peers() == 0).await;
    assert_eq!(torrent.bitfield().count_set(), 0);
    assert_eq!(torrent.requests.pending(), 0);
    assert_eq!(torrent.status().state, TorrentState::Downloading);
}

#[tokio::test]
async fn duplicate_tracker_peers_dial_once() {
    let temp = TempDir::new().unwrap();
    let hub = MemoryHub::new();
    let tracker = StaticTracker::new();
    let content = test_content(16384);
    let meta = test_meta("x.bin", &content, 16384);
    let raw_ih = *meta.info_hash.as_bytes();

    // A quiet but protocol-correct remote peer.
    let remote_net = hub.join("remote.b32.i2p");
    tokio::spawn(async move {
        let inbound = remote_net.accept().await.unwrap();
        let mut stream = inbound.conn;
        let _theirs = recv_handshake(&mut stream).await.unwrap();
        let ours = Handshake::new(raw_ih, *crate::peer::PeerId::generate().as_bytes());
        send_handshake(&mut stream, &ours).await.unwrap();
        let (r, _w) = tokio::io::split(stream);
        let mut reader = FrameReader::new(r);
        while reader.recv().await.is_ok() {}
    });

    // The tracker hands out the same destination twice.
    tracker.set_peers(vec!["remote.b32.i2p".into(), "remote.b32.i2p".into()]);

    let swarm = make_swarm(temp.path(), Arc::clone(&tracker)).await;
    let net = Arc::new(CountingNetwork {
        inner: hub.join("local.b32.i2p"),
        dials: AtomicUsize::new(0),
    });
    swarm.obtained_network(Arc::clone(&net) as Arc<dyn Network>);
    let torrent = swarm.add_metainfo(meta).await.unwrap();

    wait_until("peer connected", || torrent.num_peers() == 1).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(net.dials.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn own_address_is_never_dialed() {
    let temp = TempDir::new().unwrap();
    let hub = MemoryHub::new();
    let tracker = StaticTracker::new();
    tracker.set_peers(vec!["local.b32.i2p".into()]);

    let swarm = make_swarm(temp.path(), Arc::clone(&tracker)).await;
    let net = Arc::new(CountingNetwork {
        inner: hub.join("local.b32.i2p"),
        dials: AtomicUsize::new(0),
    });
    swarm.obtained_network(Arc::clone(&net) as Arc<dyn Network>);
    let content = test_content(16384);
    let _torrent = swarm
        .add_metainfo(test_meta("x.bin", &content, 16384))
        .await
        .unwrap();

    wait_until("first announce", || !tracker.events().is_empty()).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(net.dials.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn drop_zone_pickup() {
    let temp = TempDir::new().unwrap();
    let hub = MemoryHub::new();
    let swarm = make_swarm(temp.path(), StaticTracker::new()).await;
    swarm.obtained_network(Arc::new(hub.join("local.b32.i2p")));
    tokio::spawn(Arc::clone(&swarm).run());

    assert_eq!(swarm.num_torrents(), 0);
    let raw =
        crate::metainfo::tests::single_file_torrent("dropped.bin", 16384, 16384, &[[7u8; 20]]);
    tokio::fs::write(temp.path().join("data/dropped.torrent"), &raw)
        .await
        .unwrap();

    wait_until("drop-zone pickup", || swarm.num_torrents() == 1).await;
    let list = swarm.list();
    assert_eq!(list.torrents.len(), 1);
    assert_eq!(list.torrents[0].name, "dropped.bin");
    assert_eq!(list.torrents[0].state, TorrentState::Downloading);
    assert_eq!(list.torrents[0].progress, 0.0);
}

#[tokio::test]
async fn stop_closes_peers_and_announces_stopped() {
    let temp = TempDir::new().unwrap();
    let hub = MemoryHub::new();
    let tracker = StaticTracker::new();
    let content = test_content(32768);
    let meta = test_meta("blob.bin", &content, 16384);

    let seeder = make_swarm(&temp.path().join("a"), StaticTracker::new()).await;
    seeder.obtained_network(Arc::new(hub.join("seed.b32.i2p")));
    tokio::fs::write(temp.path().join("a/data/blob.bin"), &content)
        .await
        .unwrap();
    seeder
        .add_metainfo(Metainfo::from_bytes(meta.as_bytes()).unwrap())
        .await
        .unwrap();
    tokio::spawn(Arc::clone(&seeder).run());

    tracker.set_peers(vec!["seed.b32.i2p".into()]);
    let leecher = make_swarm(&temp.path().join("b"), Arc::clone(&tracker)).await;
    leecher.obtained_network(Arc::new(hub.join("leech.b32.i2p")));
    let torrent = leecher.add_metainfo(meta).await.unwrap();
    let ih = torrent.infohash();

    wait_until("peer connected", || torrent.num_peers() > 0).await;
    leecher.stop(&ih).await.unwrap();

    assert_eq!(torrent.num_peers(), 0);
    assert_eq!(torrent.status().state, TorrentState::Stopped);
    assert!(tracker.events().contains(&Event::Stopped));
    // Stopping twice is an error, starting again is not.
    assert!(leecher.stop(&ih).await.is_err());
    leecher.start(&ih).await.unwrap();
}

#[tokio::test]
async fn remove_and_delete_unregister() {
    let temp = TempDir::new().unwrap();
    let hub = MemoryHub::new();
    let swarm = make_swarm(temp.path(), StaticTracker::new()).await;
    swarm.obtained_network(Arc::new(hub.join("x.b32.i2p")));

    let content = test_content(16384);
    let torrent = swarm
        .add_metainfo(test_meta("gone.bin", &content, 16384))
        .await
        .unwrap();
    let ih = torrent.infohash();
    assert_eq!(swarm.num_torrents(), 1);

    swarm.delete(&ih).await.unwrap();
    assert_eq!(swarm.num_torrents(), 0);
    assert!(!temp.path().join("data/gone.bin").exists());
    assert!(matches!(
        swarm.status(&ih),
        Err(SwarmError::UnknownTorrent)
    ));
}

// ----------------------------------------------------------------------
// Piece tracker
// ----------------------------------------------------------------------

async fn tracker_fixture(temp: &TempDir, pieces: u32) -> PieceTracker {
    let storage = crate::storage::FsStorage::new(temp.path().join("data"), temp.path().join("meta"));
    storage.init().await.unwrap();
    let content = test_content((pieces * 16384) as usize);
    let st = storage
        .open_torrent(test_meta("t.bin", &content, 16384))
        .await
        .unwrap();
    PieceTracker::new(st)
}

#[tokio::test]
async fn window_limits_are_enforced() {
    let temp = TempDir::new().unwrap();
    let tracker = tracker_fixture(&temp, 64).await;
    tracker.set_max_pending(16);

    let full = Bitfield::new(64).inverted();
    let a: Destination = "a.b32.i2p".into();
    let b: Destination = "b.b32.i2p".into();

    // Per-peer window first.
    let reqs = tracker.next_requests(&a, &full, &[full.clone()]);
    assert_eq!(reqs.len(), crate::constants::DEFAULT_PER_PEER_PENDING);
    // No double-allocation for the same peer while requests are in flight.
    assert!(tracker.next_requests(&a, &full, &[full.clone()]).is_empty());

    // The torrent-wide cap tops out the second peer.
    let reqs_b = tracker.next_requests(&b, &full, &[full.clone()]);
    assert_eq!(reqs_b.len(), 8);
    assert_eq!(tracker.pending(), 16);

    let c: Destination = "c.b32.i2p".into();
    assert!(tracker.next_requests(&c, &full, &[full.clone()]).is_empty());

    // Choke releases a's claims and frees the window.
    tracker.release_peer(&a);
    assert_eq!(tracker.pending(), 8);
    assert_eq!(tracker.next_requests(&c, &full, &[full.clone()]).len(), 8);
}

#[tokio::test]
async fn no_overlapping_blocks_across_peers() {
    let temp = TempDir::new().unwrap();
    let tracker = tracker_fixture(&temp, 4).await;
    tracker.set_max_pending(64);

    let full = Bitfield::new(4).inverted();
    let a: Destination = "a.b32.i2p".into();
    let b: Destination = "b.b32.i2p".into();

    let mut seen = std::collections::HashSet::new();
    for req in tracker
        .next_requests(&a, &full, &[])
        .into_iter()
        .chain(tracker.next_requests(&b, &full, &[]))
    {
        assert!(seen.insert((req.index, req.begin)), "overlap at {req:?}");
    }
}

#[tokio::test]
async fn rarest_piece_is_started_first() {
    let temp = TempDir::new().unwrap();
    let tracker = tracker_fixture(&temp, 4).await;
    tracker.set_max_pending(1);

    let remote = Bitfield::new(4).inverted();
    // Piece 2 is the rarest in the swarm.
    let mut common = Bitfield::new(4).inverted();
    common.unset(2);
    let swarm = vec![common.clone(), common.clone(), remote.clone()];

    let reqs = tracker.next_requests(&"a.b32.i2p".into(), &remote, &swarm);
    assert_eq!(reqs.len(), 1);
    assert_eq!(reqs[0].index, 2);
}

#[tokio::test]
async fn partial_pieces_finish_before_new_ones_start() {
    let temp = TempDir::new().unwrap();
    let tracker = tracker_fixture(&temp, 4).await;
    tracker.set_max_pending(2);

    let full = Bitfield::new(4).inverted();
    let a: Destination = "a.b32.i2p".into();

    // One block in flight on each of pieces 0 and 1 (one block per piece
    // at this piece size), then a arrives back with a free window: the
    // started pieces stay the priority for other peers too.
    let first = tracker.next_requests(&a, &full, &[]);
    assert_eq!(first.len(), 2);
    tracker.release_peer(&a);

    let b: Destination = "b.b32.i2p".into();
    let again = tracker.next_requests(&b, &full, &[]);
    let indices: Vec<u32> = again.iter().map(|r| r.index).collect();
    assert_eq!(indices, vec![0, 1]);
}

#[tokio::test]
async fn duplicate_block_arrival_cancels_other_claim() {
    let temp = TempDir::new().unwrap();
    let tracker = tracker_fixture(&temp, 1).await;
    tracker.set_max_pending(8);

    let full = Bitfield::new(1).inverted();
    let a: Destination = "a.b32.i2p".into();
    let b: Destination = "b.b32.i2p".into();

    let req = tracker.next_requests(&a, &full, &[])[0];

    // Simulate the stale-timeout fallback by letting b claim the same
    // block, then the block arrives from b first.
    tokio::time::pause();
    tokio::time::advance(crate::constants::STALE_REQUEST_TIMEOUT + Duration::from_secs(1)).await;
    let dup = tracker.next_requests(&b, &full, &[]);
    assert_eq!(dup.first(), Some(&req));

    let content = test_content(16384);
    let outcome = tracker.handle_piece(
        &b,
        &crate::storage::PieceData {
            index: req.index,
            begin: req.begin,
            data: Bytes::copy_from_slice(&content[..req.length as usize]),
        },
    );
    match outcome {
        PieceOutcome::Complete { cancels, .. } => {
            assert_eq!(cancels.len(), 1);
            assert_eq!(cancels[0].0, a);
            assert_eq!(cancels[0].1, req);
        }
        other => panic!("expected completion, got {other:?}"),
    }
    assert_eq!(tracker.pending(), 0);
}

#[tokio::test]
async fn malformed_piece_is_flagged() {
    let temp = TempDir::new().unwrap();
    let tracker = tracker_fixture(&temp, 1).await;
    let full = Bitfield::new(1).inverted();
    let a: Destination = "a.b32.i2p".into();
    let req = tracker.next_requests(&a, &full, &[])[0];

    // Misaligned offset.
    let outcome = tracker.handle_piece(
        &a,
        &crate::storage::PieceData {
            index: req.index,
            begin: 3,
            data: Bytes::from_static(b"xx"),
        },
    );
    assert!(matches!(outcome, PieceOutcome::Malformed));

    // A block for a piece we never started is ignored.
    let outcome = tracker.handle_piece(
        &a,
        &crate::storage::PieceData {
            index: 7,
            begin: 0,
            data: Bytes::from_static(b"xx"),
        },
    );
    assert!(matches!(outcome, PieceOutcome::Ignored));
}

#[tokio::test]
async fn wants_any_tracks_local_progress() {
    let temp = TempDir::new().unwrap();
    let storage = crate::storage::FsStorage::new(temp.path().join("data"), temp.path().join("meta"));
    storage.init().await.unwrap();
    let content = test_content(16384);
    tokio::fs::write(temp.path().join("data/t.bin"), &content)
        .await
        .unwrap();
    let st = storage
        .open_torrent(test_meta("t.bin", &content, 16384))
        .await
        .unwrap();
    st.verify_all(true).await.unwrap();

    let tracker = PieceTracker::new(st);
    let full = Bitfield::new(1).inverted();
    // We already have everything; a full remote is not interesting.
    assert!(!tracker.wants_any(&full));
}

// ----------------------------------------------------------------------
// Announce pacing
// ----------------------------------------------------------------------

#[test]
fn announce_backoff_doubles_and_caps() {
    let mut state = AnnounceState::default();
    let t0 = std::time::Instant::now();

    state.on_failure();
    let first = state.next.duration_since(t0);
    assert!(first >= Duration::from_secs(59) && first <= Duration::from_secs(61));

    state.on_failure();
    let second = state.next.duration_since(std::time::Instant::now());
    assert!(second > first);

    for _ in 0..10 {
        state.on_failure();
    }
    assert!(
        state.next.duration_since(std::time::Instant::now())
            <= crate::constants::ANNOUNCE_BACKOFF_CAP
    );

    // Success resets the failure count and honours the interval floor.
    state.on_success(Duration::from_secs(5));
    assert_eq!(state.fails, 0);
    assert_eq!(state.interval, crate::constants::MIN_ANNOUNCE_INTERVAL);
    state.on_success(Duration::from_secs(1800));
    assert_eq!(state.interval, Duration::from_secs(1800));
}

#[test]
fn announce_due_respects_next() {
    let mut state = AnnounceState::default();
    assert!(state.due(std::time::Instant::now()));
    state.on_success(Duration::from_secs(60));
    assert!(!state.due(std::time::Instant::now()));
}

// ----------------------------------------------------------------------
// Requests served to peers
// ----------------------------------------------------------------------

#[tokio::test]
async fn request_window_change_applies() {
    let temp = TempDir::new().unwrap();
    let tracker = tracker_fixture(&temp, 64).await;
    tracker.set_max_pending(2);

    let full = Bitfield::new(64).inverted();
    let a: Destination = "a.b32.i2p".into();
    assert_eq!(tracker.next_requests(&a, &full, &[]).len(), 2);

    tracker.set_max_pending(6);
    assert_eq!(tracker.next_requests(&a, &full, &[]).len(), 4);
    assert_eq!(tracker.pending(), 6);
}

#[test]
fn piece_request_is_hashable() {
    // Used as a set key for CANCEL bookkeeping.
    let mut set = std::collections::HashSet::new();
    set.insert(PieceRequest {
        index: 1,
        begin: 0,
        length: 16384,
    });
    assert!(set.contains(&PieceRequest {
        index: 1,
        begin: 0,
        length: 16384,
    }));
}
