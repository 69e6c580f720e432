//! Drive a group of simulated boards for a fixed number of rounds.

use std::fmt;

use anyhow::{Context, Result};
use daq_board::{AcquisitionBoard, BoardCapabilities, SimController, SimMode, SimulatedBoard};
use daq_multiboard::{MultiboardGroup, ReadoutBatch, RoundSnapshot};
use tracing::{info, warn};

use crate::config::RunConfig;

/// Voltage statistics of one board over every channel of a round.
#[derive(Debug, Clone, PartialEq)]
pub struct BoardSummary {
    /// Board identifier
    pub board: u32,
    /// Smallest sample in volts
    pub min: f64,
    /// Largest sample in volts
    pub max: f64,
    /// Mean in volts
    pub mean: f64,
}

impl BoardSummary {
    /// Summarise one board's readout.
    pub fn from_batch(batch: &ReadoutBatch) -> Self {
        let volts = batch.volts();
        let (min, max, sum) = volts.iter().fold(
            (f64::INFINITY, f64::NEG_INFINITY, 0.0),
            |(min, max, sum), &v| (min.min(v), max.max(v), sum + v),
        );
        let mean = if volts.is_empty() {
            0.0
        } else {
            sum / volts.len() as f64
        };
        Self {
            board: batch.board_id(),
            min,
            max,
            mean,
        }
    }
}

impl fmt::Display for BoardSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "board {}: min {:+.4} V  max {:+.4} V  mean {:+.4} V",
            self.board, self.min, self.max, self.mean
        )
    }
}

/// Outcome of a run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Rounds received by the consumer
    pub rounds: u64,
    /// Rounds dropped because the consumer fell behind
    pub dropped: u64,
    /// Summary of the last round received
    pub last: Vec<BoardSummary>,
    /// Code of the failure that ended the run early
    pub failure: Option<i32>,
}

/// A configured group plus controllers for its manual-mode boards.
pub struct Session {
    /// The board group
    pub group: MultiboardGroup,
    /// Boards the runner has to pace itself
    pub manual: Vec<SimController>,
}

/// Open and configure every enabled board and group them.
pub fn open_group(config: &RunConfig) -> Result<Session> {
    let mut boards: Vec<Box<dyn AcquisitionBoard>> = Vec::new();
    let mut manual = Vec::new();

    for definition in config.enabled_boards() {
        let mut board = SimulatedBoard::open_with(
            definition.id,
            BoardCapabilities::default(),
            definition.simulation.clone(),
        )
        .with_context(|| format!("Failed to open board {}", definition.id))?;

        let resolved = board
            .configure(&definition.acquisition)
            .with_context(|| format!("Failed to configure board {}", definition.id))?;
        info!(
            board = definition.id,
            requested = definition.acquisition.sample_rate,
            achieved = resolved.achieved_rate,
            "Board ready"
        );

        if definition.simulation.mode == SimMode::Manual {
            manual.push(board.controller());
        }
        boards.push(Box::new(board));
    }

    let group = MultiboardGroup::new(boards).context("Failed to group boards")?;
    Ok(Session { group, manual })
}

/// Run the configured group until `config.run.rounds` rounds arrive, a
/// failure ends the loop, or Ctrl-C.
pub async fn run<F>(config: &RunConfig, mut on_round: F) -> Result<RunReport>
where
    F: FnMut(&RoundSnapshot),
{
    let Session { mut group, manual } = open_group(config)?;
    let mut rx = group
        .install_channel(config.run.channel_capacity)
        .context("Failed to install round sink")?;
    let stats = group.stats();

    let mut report = RunReport::default();
    while report.rounds < config.run.rounds {
        for controller in &manual {
            controller
                .complete_buffer()
                .with_context(|| format!("Failed to pace board {}", controller.board_id()))?;
        }

        tokio::select! {
            message = rx.recv() => match message {
                Some(Ok(snapshot)) => {
                    report.rounds += 1;
                    report.last = snapshot.boards.iter().map(BoardSummary::from_batch).collect();
                    on_round(&snapshot);
                }
                Some(Err(err)) => {
                    warn!(code = err.code(), error = %err, "Acquisition failed");
                    report.failure = Some(err.code());
                    break;
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    group.remove().context("Failed to stop boards")?;
    report.dropped = stats.rounds_dropped();
    info!(rounds = report.rounds, dropped = report.dropped, "Run finished");
    Ok(report)
}
