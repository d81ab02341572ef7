use thiserror::Error;

/// Errors raised while parsing a torrent manifest.
#[derive(Debug, Error)]
pub enum MetainfoError {
    #[error("bencode error: {0}")]
    Bencode(#[from] crate::bencode::BencodeError),

    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("invalid field: {0}")]
    InvalidField(&'static str),

    #[error("v2-only torrent: no v1 piece hashes present")]
    V2Only,

    #[error("invalid infohash")]
    InvalidInfoHash,
}
