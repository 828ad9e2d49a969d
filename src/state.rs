use crate::model::CycleKey;
use serde::Serialize;
use std::collections::BTreeMap;
use tokio::sync::watch;

pub type LiveCounts = BTreeMap<CycleKey, usize>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestResult {
    Applied,
    OutOfOrder,
    UnknownJob,
    Unassigned,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    pub applied: u64,
    pub out_of_order: u64,
    pub unknown_job: u64,
    pub unassigned: u64,
    pub failed: u64,
    pub transitions: u64,
}

/// Shared by workers and the API. Closed-cycle counts are pushed to
/// `watch` subscribers.
#[derive(Debug)]
pub struct AppState {
    live_counts: LiveCounts,
    live_counts_tx: watch::Sender<LiveCounts>,
    stats: IngestStats,
}

impl AppState {
    pub fn new() -> Self {
        let (live_counts_tx, _live_counts_rx) = watch::channel(LiveCounts::new());
        Self {
            live_counts: LiveCounts::new(),
            live_counts_tx,
            stats: IngestStats::default(),
        }
    }

    pub fn live_count(&self, key: &CycleKey) -> Option<usize> {
        self.live_counts.get(key).copied()
    }

    pub fn live_counts(&self) -> &LiveCounts {
        &self.live_counts
    }

    pub fn subscribe_live_counts(&self) -> watch::Receiver<LiveCounts> {
        self.live_counts_tx.subscribe()
    }

    /// Store the closed-cycle count of a key; subscribers only wake on change.
    pub fn set_live_count(&mut self, key: CycleKey, count: usize) {
        if self.live_counts.insert(key, count) == Some(count) {
            return;
        }
        self.live_counts_tx.send_replace(self.live_counts.clone());
    }

    pub fn stats(&self) -> &IngestStats {
        &self.stats
    }

    pub fn record_ingest(&mut self, result: IngestResult, transitions: usize) {
        match result {
            IngestResult::Applied => self.stats.applied += 1,
            IngestResult::OutOfOrder => self.stats.out_of_order += 1,
            IngestResult::UnknownJob => self.stats.unknown_job += 1,
            IngestResult::Unassigned => self.stats.unassigned += 1,
            IngestResult::Failed => self.stats.failed += 1,
        }
        self.stats.transitions += transitions as u64;
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
