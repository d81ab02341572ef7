//! Peer exchange over the anonymity overlay.
//!
//! Connected peers gossip each other's destinations so a swarm can grow
//! without hammering trackers. The payload rides the extended protocol
//! under the `ut_pex` sub-id: a bencoded dict with `added` and `dropped`
//! lists of destination strings. Unlike clearnet PEX there is no compact
//! address form; destinations are opaque variable-length strings.

use std::collections::HashSet;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::bencode::{decode, encode, BencodeError, DictBuilder, Value};
use crate::net::Destination;

/// One `ut_pex` message: destinations that joined and left since the
/// sender's previous broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PexMessage {
    pub added: Vec<Destination>,
    pub dropped: Vec<Destination>,
}

impl PexMessage {
    pub fn new(added: Vec<Destination>, dropped: Vec<Destination>) -> Self {
        Self { added, dropped }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.dropped.is_empty()
    }

    pub fn encode(&self) -> Bytes {
        let to_list = |dests: &[Destination]| {
            Value::List(
                dests
                    .iter()
                    .map(|d| Value::Bytes(Bytes::copy_from_slice(d.as_str().as_bytes())))
                    .collect(),
            )
        };
        let dict = DictBuilder::new()
            .put(b"added", to_list(&self.added))
            .put(b"dropped", to_list(&self.dropped))
            .build();
        encode(&dict)
    }

    pub fn decode(payload: &[u8]) -> Result<Self, BencodeError> {
        let value = decode(payload)?;
        let read_list = |key: &[u8]| -> Vec<Destination> {
            value
                .get(key)
                .and_then(Value::list)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|v| v.str().map(Destination::from))
                        .collect()
                })
                .unwrap_or_default()
        };
        Ok(Self {
            added: read_list(b"added"),
            dropped: read_list(b"dropped"),
        })
    }
}

/// Accumulates peer churn between periodic PEX broadcasts.
///
/// A peer that connects and disconnects within one window cancels itself
/// out instead of being announced both ways.
#[derive(Debug, Default)]
pub struct PexSwarmState {
    inner: Mutex<PexSets>,
}

#[derive(Debug, Default)]
struct PexSets {
    connected: HashSet<Destination>,
    disconnected: HashSet<Destination>,
}

impl PexSwarmState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_peer_connected(&self, dest: Destination) {
        let mut sets = self.inner.lock();
        sets.disconnected.remove(&dest);
        sets.connected.insert(dest);
    }

    pub fn on_peer_disconnected(&self, dest: Destination) {
        let mut sets = self.inner.lock();
        sets.connected.remove(&dest);
        sets.disconnected.insert(dest);
    }

    /// Takes and clears both accumulated lists.
    pub fn pop(&self) -> PexMessage {
        let mut sets = self.inner.lock();
        PexMessage {
            added: sets.connected.drain().collect(),
            dropped: sets.disconnected.drain().collect(),
        }
    }
}
