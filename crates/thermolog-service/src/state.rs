//! Application state shared across handlers and the sampler.
//!
//! The reading log sits behind a single-writer/many-reader lock: the sampler
//! takes the write side for appends and compaction, HTTP queries take the
//! read side. A history stream holds its read guard only while it opens the
//! file; the rest of the scan runs on that handle without the lock.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use thermolog_store::{CompactStats, ReadingLog};
use thermolog_types::{Reading, Timestamp};
use time::OffsetDateTime;
use tokio::sync::{RwLock, watch};

use crate::clock::Clock;
use crate::config::Config;

/// Shared application state.
pub struct AppState {
    /// The reading log.
    pub log: Arc<RwLock<ReadingLog>>,
    /// Configuration (fixed for the lifetime of the process).
    pub config: Config,
    /// Validated wall-clock source.
    pub clock: Arc<dyn Clock>,
    /// Sampler control and statistics.
    pub sampler: SamplerState,
}

impl AppState {
    /// Create new application state.
    pub fn new(log: ReadingLog, config: Config, clock: Arc<dyn Clock>) -> Arc<Self> {
        Arc::new(Self {
            log: Arc::new(RwLock::new(log)),
            config,
            clock,
            sampler: SamplerState::new(),
        })
    }
}

/// State for tracking and controlling the sampler.
pub struct SamplerState {
    running: AtomicBool,
    /// When the sampler was started (Unix timestamp).
    started_at: AtomicU64,
    stop_tx: watch::Sender<bool>,
    stop_rx: watch::Receiver<bool>,
    /// Running counters, exposed through `/api/health`.
    pub stats: RwLock<SamplerStats>,
}

impl SamplerState {
    /// Create a new, stopped sampler state.
    pub fn new() -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        Self {
            running: AtomicBool::new(false),
            started_at: AtomicU64::new(0),
            stop_tx,
            stop_rx,
            stats: RwLock::new(SamplerStats::default()),
        }
    }

    /// Check if the sampler is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Mark the sampler as started or stopped.
    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
        if running {
            let now = OffsetDateTime::now_utc().unix_timestamp() as u64;
            self.started_at.store(now, Ordering::SeqCst);
        }
    }

    /// Get the sampler start time.
    pub fn started_at(&self) -> Option<OffsetDateTime> {
        match self.started_at.load(Ordering::SeqCst) {
            0 => None,
            ts => OffsetDateTime::from_unix_timestamp(ts as i64).ok(),
        }
    }

    /// Get a receiver for the stop signal.
    pub fn subscribe_stop(&self) -> watch::Receiver<bool> {
        self.stop_rx.clone()
    }

    /// Signal the sampler to stop.
    pub fn signal_stop(&self) {
        let _ = self.stop_tx.send(true);
        self.running.store(false, Ordering::SeqCst);
    }
}

impl Default for SamplerState {
    fn default() -> Self {
        Self::new()
    }
}

/// Sampler counters.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SamplerStats {
    /// Readings appended to the log.
    pub samples_logged: u64,
    /// Samples dropped because the sensor read failed.
    pub sensor_failures: u64,
    /// Samples dropped because a value was out of range.
    pub rejected: u64,
    /// Samples or compactions deferred because the clock was not synced.
    pub clock_skips: u64,
    /// Appends that failed at the storage layer.
    pub append_failures: u64,
    /// Completed compaction passes.
    pub compactions: u64,
    /// Compaction passes that failed at the storage layer.
    pub compaction_failures: u64,
    /// Outcome of the most recent compaction.
    pub last_compaction: Option<CompactStats>,
    /// Timestamp of the most recent logged reading.
    pub last_logged_at: Option<Timestamp>,
}

impl SamplerStats {
    pub(crate) fn record_logged(&mut self, reading: &Reading) {
        self.samples_logged += 1;
        self.last_logged_at = Some(reading.timestamp);
    }
}
