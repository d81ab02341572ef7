use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::constants::{
    BLOCK_SIZE, DEFAULT_MAX_PENDING, DEFAULT_PER_PEER_PENDING, STALE_REQUEST_TIMEOUT,
};
use crate::net::Destination;
use crate::peer::Bitfield;
use crate::storage::{FsTorrent, PieceData, PieceRequest};

/// What became of a received PIECE block.
#[derive(Debug)]
pub enum PieceOutcome {
    /// Accepted; the piece is still incomplete. `cancels` lists peers whose
    /// duplicate claim on this block should now be cancelled.
    Progress {
        cancels: Vec<(Destination, PieceRequest)>,
    },
    /// The final block arrived; the assembled piece is returned and its
    /// descriptor dropped. Hash checking is the caller's next step.
    Complete {
        data: Bytes,
        cancels: Vec<(Destination, PieceRequest)>,
    },
    /// Not ours: no descriptor for the piece, or the block was already in.
    Ignored,
    /// Offsets or length inconsistent with the piece layout.
    Malformed,
}

/// The per-torrent request scheduler.
///
/// Tracks every in-progress piece and every outstanding block request,
/// bounding the total in-flight count by `max_pending` and the per-peer
/// count by `max_per_peer`. Piece choice prefers finishing a started piece
/// over opening a new one; new pieces come from rarest-first selection
/// across the swarm's bitfields.
pub struct PieceTracker {
    store: Arc<FsTorrent>,
    inner: Mutex<Inner>,
}

struct Inner {
    in_progress: HashMap<u32, Inflight>,
    pending: usize,
    max_pending: usize,
    max_per_peer: usize,
}

struct Inflight {
    length: u32,
    received: Vec<bool>,
    buffer: Vec<u8>,
    claims: Vec<Claim>,
}

struct Claim {
    peer: Destination,
    request: PieceRequest,
    issued: Instant,
}

impl Inflight {
    fn new(length: u32) -> Self {
        Self {
            length,
            received: vec![false; (length.div_ceil(BLOCK_SIZE)) as usize],
            buffer: vec![0; length as usize],
            claims: Vec::new(),
        }
    }

    fn block_count(&self) -> u32 {
        self.length.div_ceil(BLOCK_SIZE)
    }

    fn block_length(&self, block: u32) -> u32 {
        (self.length - block * BLOCK_SIZE).min(BLOCK_SIZE)
    }

    fn is_complete(&self) -> bool {
        self.received.iter().all(|&r| r)
    }

    // A block is claimable when it has not arrived and no live (non-stale)
    // claim covers it. A stale claim stays on the books so the in-flight
    // accounting survives, but no longer blocks re-issue.
    fn claimable_block(&self, now: Instant) -> Option<u32> {
        (0..self.block_count()).find(|&b| {
            !self.received[b as usize]
                && !self.claims.iter().any(|c| {
                    c.request.begin == b * BLOCK_SIZE
                        && now.duration_since(c.issued) < STALE_REQUEST_TIMEOUT
                })
        })
    }
}

impl PieceTracker {
    pub fn new(store: Arc<FsTorrent>) -> Self {
        Self {
            store,
            inner: Mutex::new(Inner {
                in_progress: HashMap::new(),
                pending: 0,
                max_pending: DEFAULT_MAX_PENDING,
                max_per_peer: DEFAULT_PER_PEER_PENDING,
            }),
        }
    }

    pub fn set_max_pending(&self, n: usize) {
        self.inner.lock().max_pending = n.max(1);
    }

    /// Total outstanding requests across all peers.
    pub fn pending(&self) -> usize {
        self.inner.lock().pending
    }

    /// True when the peer has any piece we lack.
    pub fn wants_any(&self, peer_bf: &Bitfield) -> bool {
        let local = self.store.bitfield();
        (0..local.len()).any(|i| peer_bf.has(i) && !local.has(i))
    }

    /// Picks the next block requests to issue to `peer`, filling its window
    /// without exceeding the torrent-wide in-flight cap.
    pub fn next_requests(
        &self,
        peer: &Destination,
        peer_bf: &Bitfield,
        swarm: &[Bitfield],
    ) -> Vec<PieceRequest> {
        let now = Instant::now();
        let local = self.store.bitfield();
        let mut inner = self.inner.lock();

        let peer_outstanding: usize = inner
            .in_progress
            .values()
            .flat_map(|fl| fl.claims.iter())
            .filter(|c| &c.peer == peer)
            .count();
        let mut budget = inner
            .max_per_peer
            .saturating_sub(peer_outstanding)
            .min(inner.max_pending.saturating_sub(inner.pending));

        let mut out = Vec::new();
        while budget > 0 {
            let index = match self.pick_piece(&inner, peer_bf, &local, swarm, now) {
                Some(index) => index,
                None => break,
            };
            if !inner.in_progress.contains_key(&index) {
                let length = self.store.metainfo().length_of_piece(index);
                inner.in_progress.insert(index, Inflight::new(length));
            }

            let mut allocated = false;
            while budget > 0 {
                let Some(fl) = inner.in_progress.get_mut(&index) else {
                    break;
                };
                let Some(block) = fl.claimable_block(now) else {
                    break;
                };
                let request = PieceRequest {
                    index,
                    begin: block * BLOCK_SIZE,
                    length: fl.block_length(block),
                };
                fl.claims.push(Claim {
                    peer: peer.clone(),
                    request,
                    issued: now,
                });
                inner.pending += 1;
                budget -= 1;
                allocated = true;
                out.push(request);
            }
            if !allocated {
                break;
            }
        }
        out
    }

    // Partial pieces first, lowest index, so storage holes close quickly;
    // then rarest-first among untouched pieces.
    fn pick_piece(
        &self,
        inner: &Inner,
        peer_bf: &Bitfield,
        local: &Bitfield,
        swarm: &[Bitfield],
        now: Instant,
    ) -> Option<u32> {
        let mut partial: Vec<u32> = inner
            .in_progress
            .iter()
            .filter(|(idx, fl)| peer_bf.has(**idx) && fl.claimable_block(now).is_some())
            .map(|(idx, _)| *idx)
            .collect();
        partial.sort_unstable();
        if let Some(&idx) = partial.first() {
            return Some(idx);
        }

        peer_bf.find_rarest(swarm, |i| local.has(i) || inner.in_progress.contains_key(&i))
    }

    /// Routes an arriving PIECE block into its descriptor.
    pub fn handle_piece(&self, from: &Destination, piece: &PieceData) -> PieceOutcome {
        let mut inner = self.inner.lock();
        let Some(fl) = inner.in_progress.get_mut(&piece.index) else {
            return PieceOutcome::Ignored;
        };

        if piece.begin % BLOCK_SIZE != 0 {
            return PieceOutcome::Malformed;
        }
        let block = piece.begin / BLOCK_SIZE;
        if block >= fl.block_count() || piece.data.len() != fl.block_length(block) as usize {
            return PieceOutcome::Malformed;
        }

        // Retire every claim on this block; other claimants get a CANCEL.
        let mut cancels = Vec::new();
        let mut retired = 0usize;
        fl.claims.retain(|c| {
            if c.request.begin == piece.begin {
                if &c.peer != from {
                    cancels.push((c.peer.clone(), c.request));
                }
                retired += 1;
                false
            } else {
                true
            }
        });

        let outcome = if fl.received[block as usize] {
            PieceOutcome::Ignored
        } else {
            let at = piece.begin as usize;
            fl.buffer[at..at + piece.data.len()].copy_from_slice(&piece.data);
            fl.received[block as usize] = true;

            if fl.is_complete() {
                let data = Bytes::from(std::mem::take(&mut fl.buffer));
                inner.in_progress.remove(&piece.index);
                PieceOutcome::Complete { data, cancels }
            } else {
                PieceOutcome::Progress { cancels }
            }
        };
        inner.pending = inner.pending.saturating_sub(retired);
        outcome
    }

    /// Drops the in-progress descriptor for `index`, if any. Used after a
    /// hash mismatch so the piece is re-fetched from scratch.
    pub fn drop_piece(&self, index: u32) {
        let mut inner = self.inner.lock();
        if let Some(fl) = inner.in_progress.remove(&index) {
            inner.pending = inner.pending.saturating_sub(fl.claims.len());
        }
    }

    /// Releases every outstanding claim held by `peer` (they choked us,
    /// or the connection went away). Partial data stays buffered.
    pub fn release_peer(&self, peer: &Destination) {
        let mut inner = self.inner.lock();
        let mut released = 0usize;
        for fl in inner.in_progress.values_mut() {
            let before = fl.claims.len();
            fl.claims.retain(|c| &c.peer != peer);
            released += before - fl.claims.len();
        }
        inner.pending = inner.pending.saturating_sub(released);
    }
}
