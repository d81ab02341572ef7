//! Protocol constants and tuning parameters.

use std::time::Duration;

/// Client name and version advertised in the extended handshake.
pub const CLIENT_VERSION: &str = "ibit/0.1.0";

// ============================================================================
// Request scheduling
// ============================================================================

/// Granularity of REQUEST/PIECE messages (16 KiB).
pub const BLOCK_SIZE: u32 = 16384;

/// Default cap on in-flight requests across a whole torrent; adjustable at
/// runtime via the piece-window RPC.
pub const DEFAULT_MAX_PENDING: usize = 16;

/// Cap on in-flight requests to a single peer.
pub const DEFAULT_PER_PEER_PENDING: usize = 8;

/// An outstanding request older than this may be re-issued to another peer.
pub const STALE_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Largest REQUEST length we will serve; bounded by what fits one wire
/// frame (body = 9 bytes of header + payload).
pub const MAX_SERVE_LENGTH: u32 = crate::peer::MAX_WIRE_BODY as u32 - 9;

// ============================================================================
// Peer connection
// ============================================================================

/// Send a keep-alive when nothing else has gone out for this long.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(120);

/// Close a connection that has been silent for this long.
pub const RECEIVE_TIMEOUT: Duration = Duration::from_secs(120);

/// Deadline for the remote's half of the handshake exchange.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Dial attempts for a peer address learned from a tracker or PEX.
pub const PERSIST_PEER_TRIES: u32 = 10;

/// Delay between those attempts.
pub const PERSIST_PEER_DELAY: Duration = Duration::from_secs(1);

// ============================================================================
// Announce
// ============================================================================

/// Cadence of the per-torrent announce evaluation tick.
pub const ANNOUNCE_TICK: Duration = Duration::from_secs(1);

/// Floor applied to tracker-supplied intervals.
pub const MIN_ANNOUNCE_INTERVAL: Duration = Duration::from_secs(30);

/// Base of the failure backoff: `base * 2^fails`, capped below.
pub const ANNOUNCE_BACKOFF_BASE: Duration = Duration::from_secs(30);

/// Ceiling of the failure backoff.
pub const ANNOUNCE_BACKOFF_CAP: Duration = Duration::from_secs(600);

/// Peers requested per announce.
pub const ANNOUNCE_NUM_WANT: u32 = 50;

// ============================================================================
// Swarm upkeep
// ============================================================================

/// Cadence of PEX broadcasts on non-private torrents.
pub const PEX_BROADCAST_INTERVAL: Duration = Duration::from_secs(90);

/// Cadence of the drop-zone scan for new `*.torrent` files.
pub const DROP_ZONE_POLL_INTERVAL: Duration = Duration::from_secs(10);
