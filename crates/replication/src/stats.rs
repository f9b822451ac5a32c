use std::time::Duration;

use serde::Serialize;

/// Per-tick replication statistics for instrumentation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickStats {
    pub tick: u64,
    /// Objects whose world info was read from the source this tick.
    pub objects_polled: usize,
    /// Objects re-bucketed by the filters.
    pub objects_synced: usize,
    pub pairs_evaluated: usize,
    /// (connection, profile) full refreshes across all filters.
    pub connections_refreshed: usize,
    pub capped_queries: usize,
    pub relevancy_changes: usize,
    pub elapsed: Duration,
}

/// Ring buffer of recent tick statistics.
#[derive(Debug)]
pub struct TickHistory {
    history: Vec<TickStats>,
    capacity: usize,
    index: usize,
    filled: bool,
}

impl Default for TickHistory {
    fn default() -> Self {
        Self::new(64)
    }
}

impl TickHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            history: vec![TickStats::default(); capacity],
            capacity,
            index: 0,
            filled: false,
        }
    }

    pub fn record(&mut self, stats: TickStats) {
        self.history[self.index] = stats;
        self.index = (self.index + 1) % self.capacity;
        if self.index == 0 {
            self.filled = true;
        }
    }

    pub fn count(&self) -> usize {
        if self.filled {
            self.capacity
        } else {
            self.index
        }
    }

    /// Most recently recorded stats.
    pub fn latest(&self) -> Option<&TickStats> {
        if self.count() == 0 {
            return None;
        }
        let last = (self.index + self.capacity - 1) % self.capacity;
        Some(&self.history[last])
    }

    pub fn average_elapsed(&self) -> Duration {
        let count = self.count();
        if count == 0 {
            return Duration::ZERO;
        }
        let total: Duration = self.recorded().iter().map(|s| s.elapsed).sum();
        total / count as u32
    }

    pub fn max_elapsed(&self) -> Duration {
        self.recorded()
            .iter()
            .map(|s| s.elapsed)
            .max()
            .unwrap_or(Duration::ZERO)
    }

    pub fn average_pairs_evaluated(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            return 0.0;
        }
        let total: usize = self.recorded().iter().map(|s| s.pairs_evaluated).sum();
        total as f64 / count as f64
    }

    /// Relevancy changes summed over the recorded window.
    pub fn total_changes(&self) -> usize {
        self.recorded().iter().map(|s| s.relevancy_changes).sum()
    }

    fn recorded(&self) -> &[TickStats] {
        &self.history[..self.count()]
    }
}
