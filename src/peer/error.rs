use thiserror::Error;

/// Errors that close a peer connection.
#[derive(Debug, Error)]
pub enum PeerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid handshake")]
    InvalidHandshake,

    #[error("infohash mismatch")]
    InfohashMismatch,

    #[error("invalid message: {0}")]
    InvalidMessage(&'static str),

    #[error("unknown message id: {0}")]
    UnknownMessageId(u8),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("timed out")]
    Timeout,

    #[error("protocol violation: {0}")]
    Protocol(&'static str),

    #[error("bencode error: {0}")]
    Bencode(#[from] crate::bencode::BencodeError),
}
