//! Configuration: the open-tracker file and swarm tuning knobs.
//!
//! Trackers live in an INI-style file, one section per tracker name with a
//! `url` key. A missing file is created with the default I2P open-tracker
//! set. The `XD_OPENTRACKER_URL` environment variable overrides the whole
//! file with a single `default` tracker.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use crate::constants::DEFAULT_MAX_PENDING;

/// Environment variable overriding the tracker config file.
pub const ENV_OPEN_TRACKER: &str = "XD_OPENTRACKER_URL";

/// Default tracker config filename.
pub const DEFAULT_TRACKER_FILENAME: &str = "trackers.ini";

fn default_open_trackers() -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            "dg-opentracker".to_string(),
            "http://w7tpbzncbcocrqtwwm3nezhnnsw4ozadvi2hmvzdhrqzfxfum7wa.b32.i2p/a".to_string(),
        ),
        (
            "thebland-opentracker".to_string(),
            "http://s5ikrdyjwbcgxmqetxb3nyheizftms7euacuub2hic7defkh3xhq.b32.i2p/a".to_string(),
        ),
        (
            "psi-chihaya".to_string(),
            "http://uajd4nctepxpac4c4bdyrdw7qvja2a5u3x25otfhkptcjgd53ioq.b32.i2p/announce"
                .to_string(),
        ),
    ])
}

/// The set of open trackers announced to for every torrent.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub trackers: BTreeMap<String, String>,
    pub file_name: PathBuf,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            trackers: BTreeMap::new(),
            file_name: PathBuf::from(DEFAULT_TRACKER_FILENAME),
        }
    }
}

impl TrackerConfig {
    pub fn with_file(file_name: impl Into<PathBuf>) -> Self {
        Self {
            trackers: BTreeMap::new(),
            file_name: file_name.into(),
        }
    }

    /// Loads the tracker file, creating it with defaults when absent, then
    /// applies the environment override.
    pub fn load(&mut self) -> io::Result<()> {
        if !self.file_name.exists() {
            if self.trackers.is_empty() {
                self.trackers = default_open_trackers();
            }
            self.save()?;
        }
        let text = std::fs::read_to_string(&self.file_name)?;
        self.trackers = parse_sections(&text);
        self.load_env();
        Ok(())
    }

    /// Writes the tracker set back out, one section per tracker.
    pub fn save(&self) -> io::Result<()> {
        let mut out = String::new();
        for (name, url) in &self.trackers {
            out.push_str(&format!("[{}]\nurl = {}\n\n", name, url));
        }
        if let Some(parent) = self.file_name.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.file_name, out)
    }

    /// `XD_OPENTRACKER_URL`, when set, replaces everything with a single
    /// `default` tracker.
    pub fn load_env(&mut self) {
        if let Ok(url) = std::env::var(ENV_OPEN_TRACKER) {
            if !url.is_empty() {
                self.trackers = BTreeMap::from([("default".to_string(), url)]);
            }
        }
    }
}

// Minimal INI reading: [section] headers, key = value lines, `#` and `;`
// comments. Only the `url` key matters.
fn parse_sections(text: &str) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    let mut section: Option<String> = None;
    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            section = Some(name.trim().to_string());
            continue;
        }
        if let (Some(name), Some((key, value))) = (&section, line.split_once('=')) {
            if key.trim() == "url" && !value.trim().is_empty() {
                out.insert(name.clone(), value.trim().to_string());
            }
        }
    }
    out
}

/// Swarm-level settings from the host application's config file.
#[derive(Debug, Clone)]
pub struct BittorrentConfig {
    /// Gossip peers over PEX on non-private torrents.
    pub pex: bool,
    /// In-flight request cap per torrent.
    pub piece_window: usize,
    pub trackers: TrackerConfig,
}

impl Default for BittorrentConfig {
    fn default() -> Self {
        Self {
            pex: true,
            piece_window: DEFAULT_MAX_PENDING,
            trackers: TrackerConfig::default(),
        }
    }
}

impl BittorrentConfig {
    pub fn load(tracker_file: impl AsRef<Path>) -> io::Result<Self> {
        let mut cfg = Self {
            trackers: TrackerConfig::with_file(tracker_file.as_ref()),
            ..Self::default()
        };
        cfg.trackers.load()?;
        Ok(cfg)
    }
}
