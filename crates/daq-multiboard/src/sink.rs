//! Owned round snapshots for channel consumers.

use std::time::SystemTime;

use tokio::sync::mpsc;

use crate::error::MultiboardError;
use crate::readout::ReadoutBatch;

/// Receiving end returned by [`MultiboardGroup::install_channel`](crate::MultiboardGroup::install_channel).
pub type RoundReceiver = mpsc::Receiver<Result<RoundSnapshot, MultiboardError>>;

/// A round copied out of the barrier's reusable batches.
#[derive(Debug, Clone)]
pub struct RoundSnapshot {
    /// Round number (1-based)
    pub round: u64,
    /// Wall-clock time the round was released
    pub timestamp: SystemTime,
    /// One batch per board, in group order
    pub boards: Vec<ReadoutBatch>,
}

impl RoundSnapshot {
    pub(crate) fn capture(batches: &[ReadoutBatch]) -> Self {
        Self {
            round: batches.first().map_or(0, ReadoutBatch::round),
            timestamp: SystemTime::now(),
            boards: batches.to_vec(),
        }
    }

    /// Batch read from board `id`.
    pub fn board(&self, id: u32) -> Option<&ReadoutBatch> {
        self.boards.iter().find(|b| b.board_id() == id)
    }
}
