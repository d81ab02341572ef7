use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::torrent::{RunState, Torrent};
use crate::constants::{
    ANNOUNCE_BACKOFF_BASE, ANNOUNCE_BACKOFF_CAP, ANNOUNCE_NUM_WANT, ANNOUNCE_TICK,
    MIN_ANNOUNCE_INTERVAL,
};
use crate::tracker::{AnnounceRequest, Event};

/// Per-tracker announce pacing: next attempt time, consecutive failures,
/// and the interval the tracker last asked for.
pub(super) struct AnnounceState {
    pub(super) next: Instant,
    pub(super) fails: u32,
    pub(super) interval: Duration,
}

impl Default for AnnounceState {
    fn default() -> Self {
        Self {
            next: Instant::now(),
            fails: 0,
            interval: MIN_ANNOUNCE_INTERVAL,
        }
    }
}

impl AnnounceState {
    pub(super) fn due(&self, now: Instant) -> bool {
        now >= self.next
    }

    pub(super) fn on_success(&mut self, interval: Duration) {
        self.fails = 0;
        self.interval = interval.max(MIN_ANNOUNCE_INTERVAL);
        self.next = Instant::now() + self.interval;
    }

    pub(super) fn on_failure(&mut self) {
        self.fails += 1;
        let shift = self.fails.min(8);
        let backoff = ANNOUNCE_BACKOFF_BASE
            .saturating_mul(1u32 << shift.min(31))
            .min(ANNOUNCE_BACKOFF_CAP);
        self.next = Instant::now() + backoff;
    }
}

impl Torrent {
    /// Drives announces to every tracker: an immediate first round with
    /// `started` (or `completed` when resuming a finished torrent), then a
    /// one-second evaluation tick for the rest of the torrent's life.
    pub(super) async fn announce_loop(self: Arc<Self>) {
        let initial = if self.done() {
            self.completed_announced.store(true, Ordering::Release);
            Event::Completed
        } else {
            Event::Started
        };
        for (name, _) in &self.trackers {
            self.announce_to(name, initial).await;
        }

        loop {
            tokio::time::sleep(ANNOUNCE_TICK).await;
            if self.run_state() != RunState::Running {
                return;
            }

            let now = Instant::now();
            let due: Vec<String> = {
                let mut table = self.announce.lock();
                self.trackers
                    .iter()
                    .filter(|(name, _)| table.entry(name.clone()).or_default().due(now))
                    .map(|(name, _)| name.clone())
                    .collect()
            };
            if due.is_empty() {
                continue;
            }

            // `completed` fires on the first announce round after the
            // download finishes, and only once.
            let event = if self.done() && !self.completed_announced.swap(true, Ordering::AcqRel) {
                Event::Completed
            } else {
                Event::Nop
            };
            for name in due {
                self.announce_to(&name, event).await;
            }
        }
    }

    /// One best-effort announce to every tracker, used for `stopped`.
    pub(super) async fn announce_all(self: &Arc<Self>, event: Event) {
        for (name, _) in &self.trackers {
            self.announce_to(name, event).await;
        }
    }

    async fn announce_to(self: &Arc<Self>, name: &str, event: Event) {
        let Some((_, client)) = self.trackers.iter().find(|(n, _)| n == name) else {
            return;
        };
        let Some(net) = self.network().await else {
            return;
        };

        let req = AnnounceRequest {
            info_hash: self.infohash(),
            peer_id: self.id,
            destination: net.local_addr(),
            uploaded: self.uploaded.load(Ordering::Relaxed),
            downloaded: self.downloaded.load(Ordering::Relaxed),
            left: self.st.download_remaining(),
            event,
            num_want: ANNOUNCE_NUM_WANT,
            compact: true,
        };

        match client.announce(req).await {
            Ok(resp) => {
                tracing::debug!(
                    torrent = %self.name(),
                    tracker = name,
                    peers = resp.peers.len(),
                    "announce ok"
                );
                self.announce
                    .lock()
                    .entry(name.to_string())
                    .or_default()
                    .on_success(resp.interval);
                self.add_destinations(resp.peers.into_iter().map(|p| p.destination).collect())
                    .await;
            }
            Err(err) => {
                tracing::warn!(torrent = %self.name(), tracker = name, %err, "announce failed");
                self.announce
                    .lock()
                    .entry(name.to_string())
                    .or_default()
                    .on_failure();
            }
        }
    }
}
