//! Torrent manifest handling.
//!
//! Parses `.torrent` files into an immutable [`Metainfo`], computes the
//! v1 infohash from the canonical re-encoded `info` dictionary, and rejects
//! v2-only manifests (we parse the schema but speak v1 piece semantics only).

mod error;
mod info_hash;
mod torrent;

pub use error::MetainfoError;
pub use info_hash::InfoHash;
pub use torrent::{FileEntry, Info, Metainfo};
