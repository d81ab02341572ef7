//! In-process overlay transport for tests and simulations.
//!
//! A [`MemoryHub`] is a private overlay: every endpoint that joins it can
//! dial every other by destination string, over paired in-memory pipes.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{Conn, Destination, Inbound, Network};

const PIPE_CAPACITY: usize = 64 * 1024;

/// The shared fabric endpoints register with.
#[derive(Default)]
pub struct MemoryHub {
    endpoints: Mutex<HashMap<Destination, mpsc::UnboundedSender<Inbound>>>,
}

impl MemoryHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers an endpoint under `addr` and returns its network handle.
    pub fn join(self: &Arc<Self>, addr: impl Into<Destination>) -> MemoryNetwork {
        let addr = addr.into();
        let (tx, rx) = mpsc::unbounded_channel();
        self.endpoints.lock().insert(addr.clone(), tx);
        MemoryNetwork {
            hub: Arc::clone(self),
            addr,
            incoming: tokio::sync::Mutex::new(rx),
        }
    }

    /// Drops an endpoint; subsequent dials to it fail.
    pub fn leave(&self, addr: &Destination) {
        self.endpoints.lock().remove(addr);
    }
}

/// One endpoint on a [`MemoryHub`].
pub struct MemoryNetwork {
    hub: Arc<MemoryHub>,
    addr: Destination,
    incoming: tokio::sync::Mutex<mpsc::UnboundedReceiver<Inbound>>,
}

#[async_trait]
impl Network for MemoryNetwork {
    async fn dial(&self, dest: &Destination) -> io::Result<Box<dyn Conn>> {
        let target = self
            .hub
            .endpoints
            .lock()
            .get(dest)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such destination"))?;

        let (near, far) = tokio::io::duplex(PIPE_CAPACITY);
        target
            .send(Inbound {
                conn: Box::new(far),
                from: self.addr.clone(),
            })
            .map_err(|_| io::Error::new(io::ErrorKind::ConnectionRefused, "endpoint gone"))?;
        Ok(Box::new(near))
    }

    async fn accept(&self) -> io::Result<Inbound> {
        self.incoming
            .lock()
            .await
            .recv()
            .await
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "hub closed"))
    }

    fn local_addr(&self) -> Destination {
        self.addr.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn dial_and_accept() {
        let hub = MemoryHub::new();
        let alice = hub.join("alice.b32.i2p");
        let bob = hub.join("bob.b32.i2p");

        let mut conn = alice.dial(&"bob.b32.i2p".into()).await.unwrap();
        conn.write_all(b"hi").await.unwrap();

        let inbound = bob.accept().await.unwrap();
        assert_eq!(inbound.from.as_str(), "alice.b32.i2p");
        let mut buf = [0u8; 2];
        let mut conn_in = inbound.conn;
        conn_in.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hi");
    }

    #[tokio::test]
    async fn dial_unknown_destination_fails() {
        let hub = MemoryHub::new();
        let alice = hub.join("alice.b32.i2p");
        assert!(alice.dial(&"ghost.b32.i2p".into()).await.is_err());
    }
}
