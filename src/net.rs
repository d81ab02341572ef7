//! Overlay network transport.
//!
//! The swarm engine never opens sockets itself: it is handed a [`Network`]
//! that dials and accepts streams addressed by opaque [`Destination`]
//! strings (I2P-style base32 endpoints). The real anonymity-overlay
//! transport lives outside this crate; [`memory`] provides an in-process
//! implementation for tests and simulations.

use std::fmt;
use std::io;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};

pub mod memory;

/// An opaque overlay endpoint address.
///
/// Destinations are compared as strings; they carry no routable structure
/// we can inspect. Typically a base32 string ending in `.i2p`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Destination(String);

impl Destination {
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Destination {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Destination {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A bidirectional stream to a remote destination.
pub trait Conn: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Conn for T {}

/// An accepted inbound stream together with the dialer's address.
pub struct Inbound {
    pub conn: Box<dyn Conn>,
    pub from: Destination,
}

/// The injected overlay transport.
#[async_trait]
pub trait Network: Send + Sync {
    /// Opens a stream to `dest`. Blocks for as long as the overlay needs
    /// to build a tunnel.
    async fn dial(&self, dest: &Destination) -> io::Result<Box<dyn Conn>>;

    /// Waits for the next inbound stream.
    async fn accept(&self) -> io::Result<Inbound>;

    /// Our own destination, as remote peers will see it.
    fn local_addr(&self) -> Destination;
}
