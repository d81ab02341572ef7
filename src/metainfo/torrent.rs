use std::path::PathBuf;

use bytes::Bytes;
use sha1::{Digest, Sha1};

use super::error::MetainfoError;
use super::info_hash::InfoHash;
use crate::bencode::{decode, encode, Value};

/// A parsed torrent manifest. Immutable after load.
#[derive(Debug, Clone)]
pub struct Metainfo {
    pub info: Info,
    pub info_hash: InfoHash,
    /// Primary tracker URL.
    pub announce: Option<String>,
    /// Tiered tracker list; flattened by [`Metainfo::trackers`].
    pub announce_list: Vec<Vec<String>>,
    /// The complete manifest as read from disk or the wire. Written back
    /// verbatim so the infohash survives a store/load cycle.
    raw: Bytes,
}

/// The `info` dictionary: everything the infohash commits to.
#[derive(Debug, Clone)]
pub struct Info {
    /// Name of the content file, or of the root directory for multi-file.
    pub name: String,
    /// Bytes per piece; the final piece may be shorter.
    pub piece_length: u32,
    /// SHA-1 per piece, in order.
    pub pieces: Vec<[u8; 20]>,
    /// Files in torrent order, each with its offset into the linear byte
    /// stream. Single-file torrents have exactly one entry named `name`.
    pub files: Vec<FileEntry>,
    pub total_length: u64,
    /// Private torrents never gossip peers over PEX.
    pub private: bool,
    single_file: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Path relative to the data directory, `name` included.
    pub path: PathBuf,
    pub length: u64,
    /// Offset of this file within the torrent's linear byte stream.
    pub offset: u64,
}

impl Metainfo {
    pub fn from_bytes(data: &[u8]) -> Result<Self, MetainfoError> {
        let root = decode(data)?;
        let info_value = root
            .get(b"info")
            .ok_or(MetainfoError::MissingField("info"))?;

        let raw_info = encode(info_value);
        let info_hash = InfoHash::of_info(&raw_info);
        let info = Info::parse(info_value)?;

        let announce = root.get(b"announce").and_then(Value::str).map(String::from);
        let announce_list = root
            .get(b"announce-list")
            .and_then(Value::list)
            .map(|tiers| {
                tiers
                    .iter()
                    .filter_map(|tier| {
                        tier.list().map(|urls| {
                            urls.iter().filter_map(|u| u.str().map(String::from)).collect()
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            info,
            info_hash,
            announce,
            announce_list,
            raw: Bytes::copy_from_slice(data),
        })
    }

    /// The manifest exactly as loaded, for writing to the metadata dir.
    pub fn as_bytes(&self) -> &Bytes {
        &self.raw
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn num_pieces(&self) -> u32 {
        self.info.pieces.len() as u32
    }

    pub fn total_length(&self) -> u64 {
        self.info.total_length
    }

    pub fn is_private(&self) -> bool {
        self.info.private
    }

    pub fn is_single_file(&self) -> bool {
        self.info.single_file
    }

    /// Length of piece `idx`; the final piece carries the tail remainder.
    pub fn length_of_piece(&self, idx: u32) -> u32 {
        let np = self.num_pieces();
        if idx + 1 == np {
            let full = u64::from(np) * u64::from(self.info.piece_length);
            (u64::from(self.info.piece_length) - (full - self.info.total_length)) as u32
        } else {
            self.info.piece_length
        }
    }

    /// Checks piece data against the committed hash for `idx`.
    pub fn check_piece(&self, idx: u32, data: &[u8]) -> bool {
        match self.info.pieces.get(idx as usize) {
            Some(expected) => {
                let mut hasher = Sha1::new();
                hasher.update(data);
                let got: [u8; 20] = hasher.finalize().into();
                &got == expected
            }
            None => false,
        }
    }

    /// Every announce URL, primary first, duplicates removed.
    pub fn trackers(&self) -> Vec<String> {
        let mut urls = Vec::new();
        if let Some(ref a) = self.announce {
            urls.push(a.clone());
        }
        for tier in &self.announce_list {
            for url in tier {
                if !url.is_empty() && !urls.contains(url) {
                    urls.push(url.clone());
                }
            }
        }
        urls
    }
}

impl Info {
    fn parse(value: &Value) -> Result<Self, MetainfoError> {
        let dict = value.dict().ok_or(MetainfoError::InvalidField("info"))?;

        // v2-only manifests carry "meta version" = 2 and no v1 piece string.
        // We speak v1 piece semantics only, so those are refused outright
        // rather than mis-hashed; hybrids with a v1 piece list are fine.
        let meta_version = dict.get(b"meta version".as_slice()).and_then(Value::int);
        let pieces_bytes = dict.get(b"pieces".as_slice()).and_then(Value::bytes);
        if meta_version == Some(2) && pieces_bytes.map_or(true, |p| p.is_empty()) {
            return Err(MetainfoError::V2Only);
        }

        let name = dict
            .get(b"name".as_slice())
            .and_then(Value::str)
            .ok_or(MetainfoError::MissingField("name"))?
            .to_string();

        let piece_length = dict
            .get(b"piece length".as_slice())
            .and_then(Value::int)
            .filter(|&l| l > 0 && l <= i64::from(u32::MAX))
            .ok_or(MetainfoError::InvalidField("piece length"))? as u32;

        let pieces_bytes = pieces_bytes.ok_or(MetainfoError::MissingField("pieces"))?;
        if pieces_bytes.is_empty() || pieces_bytes.len() % 20 != 0 {
            return Err(MetainfoError::InvalidField("pieces"));
        }
        let pieces: Vec<[u8; 20]> = pieces_bytes
            .chunks_exact(20)
            .map(|chunk| {
                let mut arr = [0u8; 20];
                arr.copy_from_slice(chunk);
                arr
            })
            .collect();

        let private = dict
            .get(b"private".as_slice())
            .and_then(Value::int)
            .is_some_and(|v| v > 0);

        let (files, total_length, single_file) =
            if let Some(length) = dict.get(b"length".as_slice()).and_then(Value::int) {
                let length = length as u64;
                let file = FileEntry {
                    path: PathBuf::from(&name),
                    length,
                    offset: 0,
                };
                (vec![file], length, true)
            } else if let Some(list) = dict.get(b"files".as_slice()).and_then(Value::list) {
                let mut files = Vec::with_capacity(list.len());
                let mut offset = 0u64;
                for entry in list {
                    let length = entry
                        .get(b"length")
                        .and_then(Value::int)
                        .filter(|&l| l >= 0)
                        .ok_or(MetainfoError::MissingField("file length"))?
                        as u64;
                    let segments = entry
                        .get(b"path")
                        .and_then(Value::list)
                        .ok_or(MetainfoError::MissingField("file path"))?;
                    let path: PathBuf = std::iter::once(name.clone())
                        .chain(segments.iter().filter_map(|s| s.str().map(String::from)))
                        .collect();
                    files.push(FileEntry {
                        path,
                        length,
                        offset,
                    });
                    offset += length;
                }
                if files.is_empty() {
                    return Err(MetainfoError::InvalidField("files"));
                }
                (files, offset, false)
            } else {
                return Err(MetainfoError::MissingField("length or files"));
            };

        // The piece list must exactly tile the content.
        let expected = total_length.div_ceil(u64::from(piece_length)).max(1);
        if pieces.len() as u64 != expected {
            return Err(MetainfoError::InvalidField("pieces"));
        }

        Ok(Self {
            name,
            piece_length,
            pieces,
            files,
            total_length,
            private,
            single_file,
        })
    }
}
