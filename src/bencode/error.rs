use thiserror::Error;

/// Errors produced while decoding bencode.
#[derive(Debug, Error)]
pub enum BencodeError {
    #[error("truncated input")]
    Truncated,

    #[error("unexpected byte {0:#04x} at offset {1}")]
    UnexpectedByte(u8, usize),

    #[error("invalid integer literal")]
    InvalidInteger,

    #[error("invalid string length prefix")]
    InvalidLength,

    #[error("nesting deeper than {0} levels")]
    TooDeep(usize),

    #[error("trailing bytes after value")]
    TrailingBytes,
}
