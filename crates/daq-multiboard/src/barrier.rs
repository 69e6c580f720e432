//! The round barrier event loop.
//!
//! One thread waits on every outstanding board's interrupt descriptor,
//! drains exactly one completed buffer per board, and invokes the callback
//! only after all boards have contributed to the round:
//!
//! ```text
//!   ┌──────────────► wait(boards not yet ready) ◄────────────┐
//!   │                        │                               │
//!   │        terminate? ─────┼──► exit                       │
//!   │                        ▼                               │
//!   │            drain readable boards (one buffer each)     │
//!   │                        │                               │
//!   │        all ready? ─no──┘                               │
//!   │           │yes                                         │
//!   └─ clear flags, convert, callback(Round) ─────────────────┘
//! ```
//!
//! A board that is several buffers ahead keeps its later completions queued
//! until the next rounds, so the batches handed to the callback are always
//! aligned. Any failure is reported once through the callback and ends the
//! loop; boards are never closed here.

use std::os::fd::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use daq_board::AcquisitionBoard;
use tracing::{debug, error, trace};

use crate::error::{MultiboardError, Result};
use crate::group::BoardSlot;
use crate::readout::{ReadoutBatch, RoundEvent};
use crate::stats::RoundStats;
use crate::wait::{Readiness, WaitSet};

/// Callback invoked by the round barrier thread.
pub type RoundCallback = Box<dyn FnMut(RoundEvent<'_>) + Send + 'static>;

pub(crate) struct RoundBarrier {
    boards: Arc<[BoardSlot]>,
    batches: Vec<ReadoutBatch>,
    terminate: Arc<AtomicBool>,
    stats: Arc<RoundStats>,
    callback: RoundCallback,
}

impl RoundBarrier {
    pub(crate) fn new(
        boards: Arc<[BoardSlot]>,
        batches: Vec<ReadoutBatch>,
        terminate: Arc<AtomicBool>,
        stats: Arc<RoundStats>,
        callback: RoundCallback,
    ) -> Self {
        Self {
            boards,
            batches,
            terminate,
            stats,
            callback,
        }
    }

    /// Run until terminated or failed. Hands the readout batches back.
    pub(crate) fn run(mut self) -> Vec<ReadoutBatch> {
        let n = self.boards.len();
        let fds: Vec<(u32, RawFd)> = self
            .boards
            .iter()
            .map(|slot| {
                let board = slot.lock();
                (board.id(), board.interrupt_fd())
            })
            .collect();

        let mut ready = vec![false; n];
        let mut waits = WaitSet::with_capacity(n);
        let mut round: u64 = 0;

        debug!(boards = n, "Round barrier started");

        loop {
            if self.terminate.load(Ordering::SeqCst) {
                debug!(round, "Round barrier terminated");
                break;
            }

            if ready.iter().all(|&r| r) {
                ready.fill(false);
                round = self.stats.record_round();
                for batch in &mut self.batches {
                    batch.convert(round);
                }
                trace!(round, "Round complete");
                (self.callback)(RoundEvent::Round(&self.batches));
                continue;
            }

            waits.clear();
            for (index, &(_, fd)) in fds.iter().enumerate() {
                if !ready[index] {
                    waits.push(index, fd);
                }
            }

            let woken = waits.wait();
            if self.terminate.load(Ordering::SeqCst) {
                debug!(round, "Round barrier terminated");
                break;
            }

            let outcome = match woken {
                Err(e) => Err(MultiboardError::MultiplexFailed(e)),
                Ok(0) => Err(MultiboardError::NoData),
                Ok(count) => {
                    trace!(ready = count, waiting = waits.len(), "Woken");
                    self.service(&waits, &fds, &mut ready)
                }
            };

            if let Err(err) = outcome {
                self.fail(err);
                break;
            }
        }

        self.batches
    }

    /// Drain every board the last wait reported.
    fn service(&mut self, waits: &WaitSet, fds: &[(u32, RawFd)], ready: &mut [bool]) -> Result<()> {
        for (index, readiness) in waits.events() {
            match readiness {
                Readiness::NotReady => continue,
                Readiness::Exceptional(revents) => {
                    return Err(MultiboardError::ChannelIo {
                        board: fds[index].0,
                        revents,
                    });
                }
                Readiness::Readable => {
                    let mut board = self.boards[index].lock();
                    if drain_board(&mut **board, &mut self.batches[index])? {
                        ready[index] = true;
                        self.stats.record_buffer(index);
                    } else {
                        trace!(board = fds[index].0, "Spurious wake");
                    }
                }
            }
        }
        Ok(())
    }

    fn fail(&mut self, err: MultiboardError) {
        error!(code = err.code(), board = ?err.board(), error = %err, "Round barrier failed");
        self.stats.record_failure(err.code());
        (self.callback)(RoundEvent::Failed(err));
    }
}

/// Pull interrupt records until one buffer has been consumed.
///
/// Returns `Ok(true)` once a buffer has been copied out, `Ok(false)` when the
/// queue ran dry first.
pub(crate) fn drain_board(
    board: &mut dyn AcquisitionBoard,
    batch: &mut ReadoutBatch,
) -> Result<bool> {
    let id = board.id();
    loop {
        let record = board.next_interrupt()?;
        if !record.valid {
            return Ok(false);
        }
        if record.error {
            return Err(MultiboardError::InterruptGet {
                board: id,
                message: "interrupt record carries the error flag".to_string(),
            });
        }

        if record.is_buffer_complete() {
            consume_buffer(board, batch)?;
            return Ok(true);
        }

        trace!(board = id, source = ?record.source, "Acknowledging non-buffer interrupt");
        board.acknowledge()?;
        if !record.has_more() {
            return Ok(false);
        }
    }
}

fn consume_buffer(board: &mut dyn AcquisitionBoard, batch: &mut ReadoutBatch) -> Result<()> {
    let id = board.id();
    let index = board.next_index();

    for channel in 0..batch.channel_count() {
        if !board.buffer_full(channel, index)? {
            return Err(MultiboardError::BufferNotFull { board: id, index });
        }
        board.copy_buffer(channel, index, batch.raw_channel_mut(channel))?;
        if board.channel_error(channel)? {
            return Err(MultiboardError::ChannelDma { board: id, channel });
        }
        board.reset_buffer(channel, index)?;
        board.clear_interrupt_bits(channel)?;
    }

    board.acknowledge()?;
    let next = board.advance_index();
    trace!(board = id, index, next, "Drained buffer");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use daq_board::{
        AcquisitionConfig, BoardCapabilities, SimController, SimFault, SimOptions, SimWaveform,
        SimulatedBoard,
    };

    fn started_board() -> (SimulatedBoard, SimController, ReadoutBatch) {
        let mut board = SimulatedBoard::open_with(
            1,
            BoardCapabilities::default(),
            SimOptions {
                waveform: SimWaveform::Sequence,
                ..SimOptions::default()
            },
        )
        .unwrap();
        let config = AcquisitionConfig {
            samples_per_buffer: 8,
            buffer_depth: 2,
            ..AcquisitionConfig::default()
        };
        let batch = ReadoutBatch::new(1, board.configure(&config).unwrap());
        for channel in 0..8 {
            board.start_dma(channel).unwrap();
        }
        board.arm_triggers().unwrap();
        board.program_rate().unwrap();
        board.initialize_and_start().unwrap();
        let controller = board.controller();
        (board, controller, batch)
    }

    #[test]
    fn test_engine_start_alone_is_not_a_buffer() {
        let (mut board, _controller, mut batch) = started_board();
        assert!(!drain_board(&mut board, &mut batch).unwrap());
        assert!(!drain_board(&mut board, &mut batch).unwrap());
    }

    #[test]
    fn test_drain_stops_after_one_buffer() {
        let (mut board, controller, mut batch) = started_board();
        controller.complete_buffers(2).unwrap();

        assert!(drain_board(&mut board, &mut batch).unwrap());
        assert_eq!(batch.raw_channel(0).unwrap(), &[0; 8]);
        assert_eq!(board.next_index(), 1);
        assert_eq!(controller.pending_interrupts(), 1);
        assert!(!controller.interrupt_bit(7));

        assert!(drain_board(&mut board, &mut batch).unwrap());
        assert_eq!(batch.raw_channel(0).unwrap(), &[1; 8]);
        assert_eq!(board.next_index(), 0);
    }

    #[test]
    fn test_drain_failures() {
        let (mut board, controller, mut batch) = started_board();

        controller.inject(SimFault::IncompleteBuffer);
        controller.complete_buffer().unwrap();
        let err = drain_board(&mut board, &mut batch).unwrap_err();
        assert_eq!(err.code(), -3);

        controller.inject(SimFault::InterruptGetError);
        let err = drain_board(&mut board, &mut batch).unwrap_err();
        assert_eq!(err.code(), -5);
    }

    #[test]
    fn test_dma_error_reported_with_channel() {
        let (mut board, controller, mut batch) = started_board();
        controller.inject(SimFault::DmaError { channel: 5 });
        controller.complete_buffer().unwrap();
        let err = drain_board(&mut board, &mut batch).unwrap_err();
        assert!(matches!(err, MultiboardError::ChannelDma { board: 1, channel: 5 }));
    }

    #[test]
    fn test_acknowledge_failure() {
        let (mut board, controller, mut batch) = started_board();
        controller.complete_buffer().unwrap();
        controller.inject(SimFault::AcknowledgeFailure);
        // Fails on the engine-started record
        let err = drain_board(&mut board, &mut batch).unwrap_err();
        assert_eq!(err.code(), -6);
    }
}
