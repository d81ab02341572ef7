use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use super::error::StorageError;
use crate::metainfo::{InfoHash, Metainfo};
use crate::peer::Bitfield;

/// A request for a byte range within one piece, as it arrives in a
/// REQUEST message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PieceRequest {
    pub index: u32,
    pub begin: u32,
    pub length: u32,
}

/// A byte range of one piece together with its payload, as carried by a
/// PIECE message.
#[derive(Debug, Clone)]
pub struct PieceData {
    pub index: u32,
    pub begin: u32,
    pub data: Bytes,
}

/// Filesystem-backed torrent storage shared by all torrents of a swarm.
///
/// Layout:
/// - `{meta_dir}/{ih_hex}.torrent` — the manifest, written once on open.
/// - `{meta_dir}/{ih_hex}.bitfield` — bencoded `{bits, length}`.
/// - `{data_dir}/{name}` or `{data_dir}/{name}/…` — preallocated content.
/// - `{data_dir}/*.torrent` — drop-zone polled for new torrents.
pub struct FsStorage {
    data_dir: PathBuf,
    meta_dir: PathBuf,
}

impl FsStorage {
    pub fn new(data_dir: impl Into<PathBuf>, meta_dir: impl Into<PathBuf>) -> Arc<Self> {
        Arc::new(Self {
            data_dir: data_dir.into(),
            meta_dir: meta_dir.into(),
        })
    }

    /// Ensures both directories exist.
    pub async fn init(&self) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.data_dir).await?;
        tokio::fs::create_dir_all(&self.meta_dir).await?;
        Ok(())
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn metainfo_path(&self, ih: &InfoHash) -> PathBuf {
        self.meta_dir.join(format!("{}.torrent", ih.to_hex()))
    }

    fn bitfield_path(&self, ih: &InfoHash) -> PathBuf {
        self.meta_dir.join(format!("{}.bitfield", ih.to_hex()))
    }

    pub async fn has_bitfield(&self, ih: &InfoHash) -> bool {
        tokio::fs::try_exists(self.bitfield_path(ih))
            .await
            .unwrap_or(false)
    }

    /// Loads the persisted bitfield, if one exists and parses.
    pub async fn find_bitfield(&self, ih: &InfoHash) -> Option<Bitfield> {
        let data = tokio::fs::read(self.bitfield_path(ih)).await.ok()?;
        match Bitfield::from_bencode(&data) {
            Ok(bf) => Some(bf),
            Err(err) => {
                tracing::warn!(infohash = %ih, %err, "discarding corrupt bitfield file");
                None
            }
        }
    }

    async fn write_bitfield(&self, ih: &InfoHash, bf: &Bitfield) -> Result<(), StorageError> {
        tokio::fs::write(self.bitfield_path(ih), bf.to_bencode()).await?;
        Ok(())
    }

    /// Opens a torrent: persists the manifest once, preallocates content
    /// files to their exact length, and loads or creates the bitfield.
    pub async fn open_torrent(
        self: &Arc<Self>,
        meta: Metainfo,
    ) -> Result<Arc<FsTorrent>, StorageError> {
        let ih = meta.info_hash;

        if !meta.is_single_file() {
            tokio::fs::create_dir_all(self.data_dir.join(meta.name())).await?;
        }

        let metapath = self.metainfo_path(&ih);
        if !tokio::fs::try_exists(&metapath).await.unwrap_or(false) {
            tokio::fs::write(&metapath, meta.as_bytes()).await?;
        }

        let (bitfield, fresh) = match self.find_bitfield(&ih).await {
            Some(bf) => (bf, false),
            None => (Bitfield::new(meta.num_pieces()), true),
        };
        if fresh {
            self.write_bitfield(&ih, &bitfield).await?;
        }

        let torrent = Arc::new(FsTorrent {
            store: Arc::clone(self),
            meta,
            ih,
            bitfield: RwLock::new(bitfield),
            fresh,
            flush_gate: tokio::sync::Mutex::new(()),
        });
        torrent.allocate().await?;
        Ok(torrent)
    }

    /// Opens every torrent whose manifest lives in the metadata directory.
    pub async fn open_all(self: &Arc<Self>) -> Result<Vec<Arc<FsTorrent>>, StorageError> {
        let mut torrents = Vec::new();
        for path in self.torrent_files(&self.meta_dir).await? {
            match self.load_manifest(&path).await {
                Ok(meta) => torrents.push(self.open_torrent(meta).await?),
                Err(err) => {
                    tracing::warn!(path = %path.display(), %err, "skipping unreadable manifest")
                }
            }
        }
        Ok(torrents)
    }

    /// Scans the download directory for dropped-in `*.torrent` files whose
    /// infohash we are not yet tracking, and opens them.
    pub async fn poll_new(self: &Arc<Self>) -> Vec<Arc<FsTorrent>> {
        let mut fresh = Vec::new();
        let candidates = match self.torrent_files(&self.data_dir).await {
            Ok(paths) => paths,
            Err(_) => return fresh,
        };
        for path in candidates {
            let meta = match self.load_manifest(&path).await {
                Ok(meta) => meta,
                Err(err) => {
                    tracing::warn!(path = %path.display(), %err, "bad torrent file in drop zone");
                    continue;
                }
            };
            if self.has_bitfield(&meta.info_hash).await {
                continue;
            }
            match self.open_torrent(meta).await {
                Ok(t) => fresh.push(t),
                Err(err) => {
                    tracing::warn!(path = %path.display(), %err, "failed to adopt torrent")
                }
            }
        }
        fresh
    }

    async fn load_manifest(&self, path: &Path) -> Result<Metainfo, StorageError> {
        let data = tokio::fs::read(path).await?;
        Ok(Metainfo::from_bytes(&data)?)
    }

    async fn torrent_files(&self, dir: &Path) -> Result<Vec<PathBuf>, StorageError> {
        let mut out = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "torrent") {
                out.push(path);
            }
        }
        out.sort();
        Ok(out)
    }
}

/// One torrent's on-disk state: content files addressed as a single linear
/// byte stream, plus the in-memory bitfield flushed on demand.
pub struct FsTorrent {
    store: Arc<FsStorage>,
    meta: Metainfo,
    ih: InfoHash,
    bitfield: RwLock<Bitfield>,
    fresh: bool,
    // Serializes bitfield flushes; the write itself must not hold the
    // in-memory lock across await.
    flush_gate: tokio::sync::Mutex<()>,
}

impl FsTorrent {
    pub fn metainfo(&self) -> &Metainfo {
        &self.meta
    }

    pub fn infohash(&self) -> InfoHash {
        self.ih
    }

    /// True when no bitfield file existed at open time, i.e. this torrent
    /// has never been checked and every piece should be probed once.
    pub fn was_fresh(&self) -> bool {
        self.fresh
    }

    pub fn name(&self) -> &str {
        self.meta.name()
    }

    /// Snapshot of the current bitfield.
    pub fn bitfield(&self) -> Bitfield {
        self.bitfield.read().clone()
    }

    pub fn is_complete(&self) -> bool {
        self.bitfield.read().is_complete()
    }

    /// Bytes still missing, counted in whole pieces.
    pub fn download_remaining(&self) -> u64 {
        let have = u64::from(self.bitfield.read().count_set()) * u64::from(self.meta.info.piece_length);
        self.meta.total_length().saturating_sub(have)
    }

    /// Preallocates every content file to its exact declared length.
    pub async fn allocate(&self) -> Result<(), StorageError> {
        for entry in &self.meta.info.files {
            let path = self.store.data_dir.join(&entry.path);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(false)
                .open(&path)
                .await?;
            if file.metadata().await?.len() != entry.length {
                file.set_len(entry.length).await?;
            }
        }
        Ok(())
    }

    /// Reads `buf.len()` bytes at `offset` of the linear content stream,
    /// walking the file list left to right. A short read inside the stream
    /// is `UnexpectedEof`, not a terminator.
    pub async fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<(), StorageError> {
        if offset + buf.len() as u64 > self.meta.total_length() {
            return Err(StorageError::OutOfRange);
        }
        let mut filled = 0usize;
        let mut pos = offset;
        for entry in &self.meta.info.files {
            if filled == buf.len() {
                break;
            }
            let file_end = entry.offset + entry.length;
            if pos >= file_end {
                continue;
            }
            let file_off = pos - entry.offset;
            let take = (entry.length - file_off).min((buf.len() - filled) as u64) as usize;

            let path = self.store.data_dir.join(&entry.path);
            let mut file = File::open(&path).await?;
            file.seek(SeekFrom::Start(file_off)).await?;
            file.read_exact(&mut buf[filled..filled + take])
                .await
                .map_err(|e| {
                    if e.kind() == std::io::ErrorKind::UnexpectedEof {
                        StorageError::UnexpectedEof
                    } else {
                        StorageError::Io(e)
                    }
                })?;
            filled += take;
            pos += take as u64;
        }
        if filled < buf.len() {
            return Err(StorageError::UnexpectedEof);
        }
        Ok(())
    }

    /// Writes `data` at `offset` of the linear content stream. Each file
    /// handle is opened and closed per call.
    pub async fn write_at(&self, data: &[u8], offset: u64) -> Result<(), StorageError> {
        if offset + data.len() as u64 > self.meta.total_length() {
            return Err(StorageError::OutOfRange);
        }
        let mut written = 0usize;
        let mut pos = offset;
        for entry in &self.meta.info.files {
            if written == data.len() {
                break;
            }
            let file_end = entry.offset + entry.length;
            if pos >= file_end {
                continue;
            }
            let file_off = pos - entry.offset;
            let take = (entry.length - file_off).min((data.len() - written) as u64) as usize;

            let path = self.store.data_dir.join(&entry.path);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(false)
                .open(&path)
                .await?;
            file.seek(SeekFrom::Start(file_off)).await?;
            file.write_all(&data[written..written + take]).await?;
            written += take;
            pos += take as u64;
        }
        Ok(())
    }

    /// Reads the byte range a REQUEST names and returns it as piece data.
    pub async fn visit_piece(&self, req: &PieceRequest) -> Result<PieceData, StorageError> {
        if req.index >= self.meta.num_pieces() {
            return Err(StorageError::InvalidPieceIndex(req.index));
        }
        let mut data = vec![0u8; req.length as usize];
        let offset =
            u64::from(req.index) * u64::from(self.meta.info.piece_length) + u64::from(req.begin);
        self.read_at(&mut data, offset).await?;
        Ok(PieceData {
            index: req.index,
            begin: req.begin,
            data: Bytes::from(data),
        })
    }

    /// Re-reads piece `index` from disk and checks it against the manifest.
    pub async fn verify_piece(&self, index: u32) -> Result<bool, StorageError> {
        let piece = self
            .visit_piece(&PieceRequest {
                index,
                begin: 0,
                length: self.meta.length_of_piece(index),
            })
            .await?;
        Ok(self.meta.check_piece(index, &piece.data))
    }

    /// Stores a full verified piece and sets its bit.
    ///
    /// The hash is re-checked here so the bitfield invariant cannot be
    /// broken by a confused caller; a write failure leaves the bit unset
    /// and a later `verify_all` resynchronises.
    pub async fn put_piece(&self, piece: &PieceData) -> Result<(), StorageError> {
        if piece.begin != 0 || piece.data.len() != self.meta.length_of_piece(piece.index) as usize {
            return Err(StorageError::InvalidPiece(piece.index));
        }
        if !self.meta.check_piece(piece.index, &piece.data) {
            return Err(StorageError::InvalidPiece(piece.index));
        }
        let offset = u64::from(piece.index) * u64::from(self.meta.info.piece_length);
        self.write_at(&piece.data, offset).await?;
        self.bitfield.write().set(piece.index);
        Ok(())
    }

    /// Re-checks local data against the manifest and installs the result
    /// as the live bitfield.
    ///
    /// With `fresh` every piece is probed — used on first open so that
    /// pre-placed data seeds immediately. Otherwise only the pieces the
    /// loaded bitfield claims are re-read; mismatches are cleared with a
    /// warning.
    pub async fn verify_all(&self, fresh: bool) -> Result<(), StorageError> {
        const BATCH: u32 = 32;

        let np = self.meta.num_pieces();
        let check = if fresh {
            Bitfield::new(np).inverted()
        } else {
            self.bitfield()
        };

        let mut have = Bitfield::new(np);
        let mut batch_start = 0;
        while batch_start < np {
            let batch_end = (batch_start + BATCH).min(np);
            let indices: Vec<u32> = (batch_start..batch_end).filter(|&i| check.has(i)).collect();
            let results =
                futures::future::join_all(indices.iter().map(|&i| self.verify_piece(i))).await;
            for (&index, result) in indices.iter().zip(results) {
                match result {
                    Ok(true) => have.set(index),
                    Ok(false) => {
                        if !fresh {
                            tracing::warn!(torrent = %self.name(), index, "piece failed re-check");
                        }
                    }
                    Err(err) => {
                        if !fresh {
                            tracing::warn!(torrent = %self.name(), index, %err, "piece unreadable");
                        }
                    }
                }
            }
            batch_start = batch_end;
        }

        if !fresh && have != check {
            tracing::warn!(torrent = %self.name(), "local data does not match bitfield");
        }
        *self.bitfield.write() = have;
        self.flush().await
    }

    /// Rewrites the bitfield file. One flush at a time.
    pub async fn flush(&self) -> Result<(), StorageError> {
        let _gate = self.flush_gate.lock().await;
        let snapshot = self.bitfield();
        self.store.write_bitfield(&self.ih, &snapshot).await
    }

    /// Removes the manifest, the bitfield, and all content from disk.
    pub async fn delete(&self) -> Result<(), StorageError> {
        let _ = tokio::fs::remove_file(self.store.metainfo_path(&self.ih)).await;
        let _ = tokio::fs::remove_file(self.store.bitfield_path(&self.ih)).await;
        let content = self.store.data_dir.join(self.meta.name());
        if self.meta.is_single_file() {
            tokio::fs::remove_file(&content).await?;
        } else {
            tokio::fs::remove_dir_all(&content).await?;
        }
        Ok(())
    }
}
