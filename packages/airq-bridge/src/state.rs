use chrono::{DateTime, Local};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::classify::{AirStatus, Classification};

/// Most recent classification visible to queries
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatestState {
    pub value: f64,
    pub status: AirStatus,
    /// False until the first reading is published
    pub updated: bool,
}

impl Default for LatestState {
    fn default() -> Self {
        Self {
            value: 0.0,
            status: AirStatus::Unknown,
            updated: false,
        }
    }
}

impl From<Classification> for LatestState {
    fn from(c: Classification) -> Self {
        Self {
            value: c.value,
            status: c.status,
            updated: true,
        }
    }
}

/// Handle to the process-wide `LatestState`.
///
/// Cloning shares the same slot. Updates replace the whole struct under the
/// write lock, so a snapshot never mixes fields of two different updates.
#[derive(Clone, Default)]
pub struct SharedState {
    latest: Arc<RwLock<LatestState>>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current state with a freshly classified reading
    pub fn publish(&self, classification: Classification) {
        *self.latest.write() = LatestState::from(classification);
    }

    /// Copy out the current state without waiting for new readings
    pub fn snapshot(&self) -> LatestState {
        *self.latest.read()
    }
}

/// Counters maintained by the ingestion loop
#[derive(Debug, Default)]
pub struct IngestStats {
    connection_attempts: AtomicU64,
    lines_received: AtomicU64,
    readings_published: AtomicU64,
    lines_skipped: AtomicU64,
    lines_rejected: AtomicU64,
    log_failures: AtomicU64,
    connected: AtomicBool,
    last_reading_at: RwLock<Option<DateTime<Local>>>,
}

/// Point-in-time copy of [`IngestStats`]
#[derive(Debug, Clone, Serialize)]
pub struct IngestStatsSnapshot {
    pub connected: bool,
    pub connection_attempts: u64,
    pub lines_received: u64,
    pub readings_published: u64,
    pub lines_skipped: u64,
    pub lines_rejected: u64,
    pub log_failures: u64,
    pub last_reading_at: Option<DateTime<Local>>,
}

impl IngestStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_connection_attempt(&self) {
        self.connection_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub fn record_line(&self) {
        self.lines_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_published(&self, at: DateTime<Local>) {
        self.readings_published.fetch_add(1, Ordering::Relaxed);
        *self.last_reading_at.write() = Some(at);
    }

    pub fn record_skipped(&self) {
        self.lines_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.lines_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_log_failure(&self) {
        self.log_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn readings_published(&self) -> u64 {
        self.readings_published.load(Ordering::Relaxed)
    }

    pub fn lines_received(&self) -> u64 {
        self.lines_received.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> IngestStatsSnapshot {
        IngestStatsSnapshot {
            connected: self.is_connected(),
            connection_attempts: self.connection_attempts.load(Ordering::Relaxed),
            lines_received: self.lines_received(),
            readings_published: self.readings_published(),
            lines_skipped: self.lines_skipped.load(Ordering::Relaxed),
            lines_rejected: self.lines_rejected.load(Ordering::Relaxed),
            log_failures: self.log_failures.load(Ordering::Relaxed),
            last_reading_at: *self.last_reading_at.read(),
        }
    }
}
