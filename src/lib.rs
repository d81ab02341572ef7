//! ibit - a BitTorrent swarm engine for anonymity overlays
//!
//! This library implements a BitTorrent peer that speaks the wire protocol
//! over an injected overlay transport (I2P-style destination addresses)
//! instead of raw sockets. It downloads and seeds torrents: per-torrent
//! peer pools, rarest-first block scheduling with bounded parallelism,
//! SHA-1 piece verification, durable bitfields, periodic tracker announces
//! with backoff, and PEX gossip.
//!
//! # Modules
//!
//! - [`bencode`] - Bencode encoding/decoding
//! - [`metainfo`] - Torrent manifest parsing and infohashes
//! - [`net`] - The injected overlay transport interface
//! - [`peer`] - Wire protocol: handshake, messages, framing, bitfields
//! - [`pex`] - Peer exchange over the overlay
//! - [`storage`] - On-disk piece store and bitfield persistence
//! - [`swarm`] - The engine: torrents, peers, scheduling, lifecycle
//! - [`tracker`] - The injected announce interface
//! - [`config`] - Tracker config file handling
//! - [`rpc`] - Status types behind the JSON control surface

pub mod bencode;
pub mod config;
pub mod constants;
pub mod metainfo;
pub mod net;
pub mod peer;
pub mod pex;
pub mod rpc;
pub mod storage;
pub mod swarm;
pub mod tracker;

pub use bencode::{BencodeError, Value};
pub use metainfo::{InfoHash, Metainfo, MetainfoError};
pub use net::{Destination, Network};
pub use peer::{Bitfield, Handshake, Message, PeerError, PeerId};
pub use pex::PexMessage;
pub use storage::{FsStorage, FsTorrent, PieceData, PieceRequest, StorageError};
pub use swarm::{Swarm, SwarmError, SwarmEvent, Torrent, TorrentEvent};
pub use tracker::{AnnounceRequest, AnnounceResponse, Announcer, TrackerError, TrackerFactory};
