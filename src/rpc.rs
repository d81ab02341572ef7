//! Status types behind the JSON control surface.
//!
//! The HTTP framing lives outside this crate; these are the serializable
//! shapes it exchanges, and [`crate::swarm::Swarm`] carries the callable
//! methods behind each operation (`list`, `add`, `start`, `stop`,
//! `remove`, `delete`, `status`, `set_piece_window`).

use serde::{Deserialize, Serialize};

use crate::net::Destination;

/// Coarse per-torrent state. There is no distinct error state; an
/// unrecoverable torrent reads as stopped, with context in the logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TorrentState {
    Downloading,
    Seeding,
    Stopped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerConnStats {
    pub addr: Destination,
    pub client: String,
    pub inbound: bool,
    pub bytes_tx: u64,
    pub bytes_rx: u64,
    pub am_choking: bool,
    pub am_interested: bool,
    pub peer_choking: bool,
    pub peer_interested: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TorrentFileStatus {
    pub path: String,
    pub length: u64,
    /// Fraction of this file's covering pieces that are verified. Computed
    /// over the file's piece range, since piece boundaries rarely align
    /// with file boundaries.
    pub progress: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TorrentStatus {
    pub name: String,
    pub infohash: String,
    pub state: TorrentState,
    pub progress: f64,
    pub peers: Vec<PeerConnStats>,
    pub files: Vec<TorrentFileStatus>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TorrentsList {
    pub torrents: Vec<TorrentStatus>,
}
