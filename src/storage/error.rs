use thiserror::Error;

/// Errors from the on-disk piece store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A content file short-read mid-stream; on preallocated files this
    /// means the layout on disk no longer matches the manifest.
    #[error("unexpected eof in content files")]
    UnexpectedEof,

    #[error("piece {0} failed hash check")]
    InvalidPiece(u32),

    #[error("piece index {0} out of range")]
    InvalidPieceIndex(u32),

    #[error("read/write beyond content length")]
    OutOfRange,

    #[error("manifest error: {0}")]
    Metainfo(#[from] crate::metainfo::MetainfoError),

    #[error("corrupt bitfield file: {0}")]
    CorruptBitfield(#[from] crate::bencode::BencodeError),
}
