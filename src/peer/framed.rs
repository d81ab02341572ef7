use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::error::PeerError;
use super::message::{Handshake, Message, HANDSHAKE_LEN, MAX_WIRE_BODY};

/// Sends our handshake frame.
pub async fn send_handshake<S>(stream: &mut S, hs: &Handshake) -> Result<(), PeerError>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(&hs.encode()).await?;
    stream.flush().await?;
    Ok(())
}

/// Reads the remote handshake frame.
pub async fn recv_handshake<S>(stream: &mut S) -> Result<Handshake, PeerError>
where
    S: AsyncRead + Unpin,
{
    let mut buf = [0u8; HANDSHAKE_LEN];
    stream
        .read_exact(&mut buf)
        .await
        .map_err(|_| PeerError::ConnectionClosed)?;
    Handshake::decode(&buf)
}

/// Reads length-prefixed wire messages from one half of a peer stream.
pub struct FrameReader<R> {
    stream: R,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(stream: R) -> Self {
        Self { stream }
    }

    /// Reads the next message.
    ///
    /// Frames whose declared body length exceeds [`MAX_WIRE_BODY`] are
    /// drained from the stream, logged, and skipped; the read continues
    /// with the following frame. Truncated frames and malformed payloads
    /// are errors that close the connection.
    pub async fn recv(&mut self) -> Result<Message, PeerError> {
        loop {
            let mut prefix = [0u8; 4];
            self.stream
                .read_exact(&mut prefix)
                .await
                .map_err(|_| PeerError::ConnectionClosed)?;
            let length = u32::from_be_bytes(prefix) as usize;

            if length == 0 {
                return Ok(Message::KeepAlive);
            }
            if length > MAX_WIRE_BODY {
                tracing::warn!(length, "oversize frame, draining");
                self.drain(length).await?;
                continue;
            }

            let mut body = BytesMut::zeroed(length);
            self.stream
                .read_exact(&mut body)
                .await
                .map_err(|_| PeerError::ConnectionClosed)?;
            return Message::from_body(body.freeze());
        }
    }

    async fn drain(&mut self, mut remaining: usize) -> Result<(), PeerError> {
        let mut scratch = [0u8; 4096];
        while remaining > 0 {
            let take = remaining.min(scratch.len());
            self.stream
                .read_exact(&mut scratch[..take])
                .await
                .map_err(|_| PeerError::ConnectionClosed)?;
            remaining -= take;
        }
        Ok(())
    }
}

/// Writes wire messages to the other half of a peer stream.
pub struct FrameWriter<W> {
    stream: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(stream: W) -> Self {
        Self { stream }
    }

    pub async fn send(&mut self, msg: &Message) -> Result<(), PeerError> {
        self.stream.write_all(&msg.encode()).await?;
        self.stream.flush().await?;
        Ok(())
    }
}
