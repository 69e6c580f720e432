//! Round counters, readable while the barrier runs.

use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};

/// Live counters shared between a group and its round barrier thread.
#[derive(Debug)]
pub struct RoundStats {
    rounds: AtomicU64,
    buffers: Vec<AtomicU64>,
    dropped: AtomicU64,
    last_error: AtomicI32,
}

/// Point-in-time copy of [`RoundStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Rounds delivered to the callback
    pub rounds_completed: u64,
    /// Buffers drained per board, in group order
    pub buffers_consumed: Vec<u64>,
    /// Rounds a channel sink could not accept
    pub rounds_dropped: u64,
    /// Code of the failure that ended the last loop
    pub last_error: Option<i32>,
}

impl RoundStats {
    pub(crate) fn new(boards: usize) -> Self {
        Self {
            rounds: AtomicU64::new(0),
            buffers: (0..boards).map(|_| AtomicU64::new(0)).collect(),
            dropped: AtomicU64::new(0),
            last_error: AtomicI32::new(0),
        }
    }

    pub(crate) fn record_round(&self) -> u64 {
        self.rounds.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn record_buffer(&self, board_index: usize) {
        if let Some(counter) = self.buffers.get(board_index) {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_failure(&self, code: i32) {
        self.last_error.store(code, Ordering::SeqCst);
    }

    pub(crate) fn reset(&self) {
        self.rounds.store(0, Ordering::SeqCst);
        for counter in &self.buffers {
            counter.store(0, Ordering::SeqCst);
        }
        self.dropped.store(0, Ordering::SeqCst);
        self.last_error.store(0, Ordering::SeqCst);
    }

    /// Rounds delivered since the last install.
    pub fn rounds_completed(&self) -> u64 {
        self.rounds.load(Ordering::SeqCst)
    }

    /// Buffers drained from the board at `board_index` since the last install.
    pub fn buffers_consumed(&self, board_index: usize) -> u64 {
        self.buffers
            .get(board_index)
            .map_or(0, |c| c.load(Ordering::SeqCst))
    }

    /// Rounds dropped by a full channel sink.
    pub fn rounds_dropped(&self) -> u64 {
        self.dropped.load(Ordering::SeqCst)
    }

    /// Code of the terminal failure, if the loop ended on one.
    pub fn last_error(&self) -> Option<i32> {
        match self.last_error.load(Ordering::SeqCst) {
            0 => None,
            code => Some(code),
        }
    }

    /// Copy every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            rounds_completed: self.rounds_completed(),
            buffers_consumed: self
                .buffers
                .iter()
                .map(|c| c.load(Ordering::SeqCst))
                .collect(),
            rounds_dropped: self.rounds_dropped(),
            last_error: self.last_error(),
        }
    }
}
