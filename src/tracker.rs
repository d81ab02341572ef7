//! Tracker announce interface.
//!
//! The announce transport is injected: the swarm engine builds an
//! [`AnnounceRequest`] and hands it to whatever [`Announcer`] the host
//! application wired in (an HTTP-over-I2P client in production, a mock in
//! tests). The engine only owns the cadence, the event sequencing, and the
//! backoff policy around these calls.

mod error;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

pub use error::TrackerError;

use crate::metainfo::InfoHash;
use crate::net::Destination;
use crate::peer::PeerId;

/// The event slot of an announce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Started,
    Stopped,
    Completed,
    /// A periodic announce with nothing to report.
    Nop,
}

impl Event {
    /// The wire form; `Nop` is the absent event parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::Started => "started",
            Event::Stopped => "stopped",
            Event::Completed => "completed",
            Event::Nop => "",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnnounceRequest {
    pub info_hash: InfoHash,
    pub peer_id: PeerId,
    /// Our own overlay destination, so the tracker can hand it to others.
    pub destination: Destination,
    pub uploaded: u64,
    pub downloaded: u64,
    pub left: u64,
    pub event: Event,
    pub num_want: u32,
    pub compact: bool,
}

/// One peer from an announce response.
#[derive(Debug, Clone)]
pub struct TrackerPeer {
    pub id: Option<PeerId>,
    pub destination: Destination,
}

#[derive(Debug, Clone)]
pub struct AnnounceResponse {
    /// How long the tracker wants us to wait before the next announce.
    pub interval: Duration,
    pub peers: Vec<TrackerPeer>,
}

/// The injected announce transport for one tracker.
#[async_trait]
pub trait Announcer: Send + Sync {
    async fn announce(&self, req: AnnounceRequest) -> Result<AnnounceResponse, TrackerError>;

    /// The announce URL, for logs and config round-trips.
    fn url(&self) -> &str;
}

/// Builds [`Announcer`]s from the announce URLs found in manifests and the
/// open-tracker config.
pub trait TrackerFactory: Send + Sync {
    fn from_url(&self, url: &str) -> Result<Arc<dyn Announcer>, TrackerError>;
}
