//! Per-transfer progress tracking and the process-wide registry.
//!
//! Every stream in flight owns an `Arc<TransferStatus>` registered in the
//! [`StatusRegistry`] under its player. Registering a queue stream
//! terminates the player's other queue streams inside the same map-entry
//! lock, so two concurrent requests can never both survive.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use streamforged_common::{MediaFileId, PlayerId, TransferId};

/// How a stream was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    /// The player's live play queue. At most one per player.
    Queue,
    /// One explicit file, private queue.
    SingleFile,
    /// A playlist streamed back to back, private queue.
    Podcast,
}

impl StreamKind {
    /// Whether streams of this kind coexist with others on the same player.
    pub fn is_isolated(self) -> bool {
        !matches!(self, StreamKind::Queue)
    }
}

/// One `(time, cumulative bytes)` observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Sample {
    pub timestamp_millis: u64,
    pub bytes: u64,
}

/// Mutable progress of one in-flight stream.
#[derive(Debug)]
pub struct TransferStatus {
    id: TransferId,
    player: PlayerId,
    username: String,
    kind: StreamKind,
    file: Mutex<Option<MediaFileId>>,
    bytes: AtomicU64,
    created_at: DateTime<Utc>,
    started: Instant,
    /// Millis since `started` of the last byte update.
    last_update: AtomicU64,
    history: Mutex<VecDeque<Sample>>,
    history_capacity: usize,
    sample_interval_millis: u64,
    active: AtomicBool,
    terminated: AtomicBool,
}

impl TransferStatus {
    pub fn new(player: PlayerId, username: impl Into<String>, kind: StreamKind) -> Self {
        Self::with_history(player, username, kind, 200, Duration::from_secs(5))
    }

    pub fn with_history(
        player: PlayerId,
        username: impl Into<String>,
        kind: StreamKind,
        capacity: usize,
        sample_interval: Duration,
    ) -> Self {
        Self {
            id: TransferId::new(),
            player,
            username: username.into(),
            kind,
            file: Mutex::new(None),
            bytes: AtomicU64::new(0),
            created_at: Utc::now(),
            started: Instant::now(),
            last_update: AtomicU64::new(0),
            history: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            history_capacity: capacity.max(1),
            sample_interval_millis: sample_interval.as_millis() as u64,
            active: AtomicBool::new(true),
            terminated: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> TransferId {
        self.id
    }

    pub fn player(&self) -> &PlayerId {
        &self.player
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    pub fn file(&self) -> Option<MediaFileId> {
        *self.file.lock()
    }

    pub fn set_file(&self, file: Option<MediaFileId>) {
        *self.file.lock() = file;
    }

    pub fn bytes_transferred(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    /// Count `n` more bytes, sampling the history when the sample interval
    /// has elapsed.
    pub fn add_bytes(&self, n: u64) {
        let total = self.bytes.fetch_add(n, Ordering::Relaxed) + n;
        let now = self.elapsed_millis();
        self.last_update.store(now, Ordering::Relaxed);

        let due = {
            let history = self.history.lock();
            history
                .back()
                .map_or(true, |s| now.saturating_sub(s.timestamp_millis) >= self.sample_interval_millis)
        };
        if due {
            self.add_sample(now, total);
        }
    }

    /// Append a sample, evicting the oldest when the history is full.
    pub fn add_sample(&self, timestamp_millis: u64, cumulative_bytes: u64) {
        let mut history = self.history.lock();
        if history.len() == self.history_capacity {
            history.pop_front();
        }
        history.push_back(Sample {
            timestamp_millis,
            bytes: cumulative_bytes,
        });
    }

    pub fn history(&self) -> Vec<Sample> {
        self.history.lock().iter().copied().collect()
    }

    /// Average rate over the sample history in kbit/s.
    pub fn rate_kbps(&self) -> f64 {
        let history = self.history.lock();
        match (history.front(), history.back()) {
            (Some(a), Some(b)) if b.timestamp_millis > a.timestamp_millis => {
                let bits = (b.bytes - a.bytes) as f64 * 8.0;
                bits / (b.timestamp_millis - a.timestamp_millis) as f64
            }
            _ => 0.0,
        }
    }

    pub fn millis_since_last_update(&self) -> u64 {
        self.elapsed_millis()
            .saturating_sub(self.last_update.load(Ordering::Relaxed))
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire) && !self.is_terminated()
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }

    /// Ask the copy loop to stop at its next liveness check.
    pub fn terminate(&self) {
        self.terminated.store(true, Ordering::Release);
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> TransferSnapshot {
        TransferSnapshot {
            id: self.id,
            player: self.player.clone(),
            username: self.username.clone(),
            kind: self.kind,
            file: self.file(),
            bytes_transferred: self.bytes_transferred(),
            rate_kbps: self.rate_kbps(),
            started_at: self.created_at,
            millis_since_last_update: self.millis_since_last_update(),
            active: self.is_active(),
            terminated: self.is_terminated(),
        }
    }

    fn elapsed_millis(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

/// Serializable view of a [`TransferStatus`].
#[derive(Debug, Clone, Serialize)]
pub struct TransferSnapshot {
    pub id: TransferId,
    pub player: PlayerId,
    pub username: String,
    pub kind: StreamKind,
    pub file: Option<MediaFileId>,
    pub bytes_transferred: u64,
    pub rate_kbps: f64,
    pub started_at: DateTime<Utc>,
    pub millis_since_last_update: u64,
    pub active: bool,
    pub terminated: bool,
}

/// Concurrent map of player id to the player's in-flight transfers.
#[derive(Debug)]
pub struct StatusRegistry {
    by_player: DashMap<PlayerId, Vec<Arc<TransferStatus>>>,
    history_capacity: usize,
    sample_interval: Duration,
}

impl Default for StatusRegistry {
    fn default() -> Self {
        Self::new(200, Duration::from_secs(5))
    }
}

impl StatusRegistry {
    pub fn new(history_capacity: usize, sample_interval: Duration) -> Self {
        Self {
            by_player: DashMap::new(),
            history_capacity,
            sample_interval,
        }
    }

    /// Create and register a status for a new stream.
    ///
    /// For [`StreamKind::Queue`] every other live queue stream of the same
    /// player is terminated before the new status becomes visible.
    pub fn register(
        &self,
        player: &PlayerId,
        username: &str,
        kind: StreamKind,
    ) -> Arc<TransferStatus> {
        let status = Arc::new(TransferStatus::with_history(
            player.clone(),
            username,
            kind,
            self.history_capacity,
            self.sample_interval,
        ));

        let mut entry = self.by_player.entry(player.clone()).or_default();
        if kind == StreamKind::Queue {
            for previous in entry.iter().filter(|s| s.kind() == StreamKind::Queue) {
                if !previous.is_terminated() {
                    previous.terminate();
                    tracing::info!(
                        player = %player,
                        superseded = %previous.id(),
                        transfer = %status.id(),
                        "Terminated superseded queue stream"
                    );
                }
            }
        }
        entry.push(Arc::clone(&status));

        status
    }

    /// Remove a status. Players with no transfers left are dropped.
    pub fn deregister(&self, status: &Arc<TransferStatus>) {
        status.set_active(false);
        if let Some(mut entry) = self.by_player.get_mut(status.player()) {
            entry.retain(|s| !Arc::ptr_eq(s, status));
        }
        self.by_player
            .remove_if(status.player(), |_, list| list.is_empty());
    }

    /// Transfers currently registered for `player`.
    pub fn for_player(&self, player: &PlayerId) -> Vec<Arc<TransferStatus>> {
        self.by_player
            .get(player)
            .map(|list| list.clone())
            .unwrap_or_default()
    }

    /// Number of registered transfers that are still copying.
    pub fn active_count(&self) -> usize {
        self.by_player
            .iter()
            .map(|entry| entry.value().iter().filter(|s| s.is_active()).count())
            .sum()
    }

    pub fn snapshot(&self) -> Vec<TransferSnapshot> {
        let mut all: Vec<TransferSnapshot> = self
            .by_player
            .iter()
            .flat_map(|entry| {
                entry
                    .value()
                    .iter()
                    .map(|s| s.snapshot())
                    .collect::<Vec<_>>()
            })
            .collect();
        all.sort_by_key(|s| s.started_at);
        all
    }
}
