//! Simulated acquisition board.
//!
//! [`SimulatedBoard`] implements every [`AcquisitionBoard`] primitive against
//! an in-process DMA ring and uses an OS pipe as its interrupt channel, so a
//! multiplexed `poll` over several simulated boards behaves like one over real
//! interrupt descriptors.
//!
//! Two modes are available:
//!
//! - [`SimMode::Manual`]: nothing happens until a [`SimController`] completes
//!   a buffer. Tests use this to drive boards at different paces.
//! - [`SimMode::FreeRunning`]: a producer thread completes one buffer every
//!   `samples_per_buffer / achieved_rate` seconds while the engine runs.
//!
//! # Example
//!
//! ```
//! use daq_board::{AcquisitionBoard, AcquisitionConfig, SimulatedBoard};
//!
//! let mut board = SimulatedBoard::open(0)?;
//! board.configure(&AcquisitionConfig::default())?;
//! let controller = board.controller();
//!
//! for channel in 0..8 {
//!     board.start_dma(channel)?;
//! }
//! board.arm_triggers()?;
//! board.program_rate()?;
//! board.initialize_and_start()?;
//!
//! controller.complete_buffer()?;
//! assert_eq!(controller.pending_interrupts(), 2);
//! # Ok::<(), daq_board::BoardError>(())
//! ```

mod faults;
mod irq;
mod ring;
mod waveform;

use std::collections::VecDeque;
use std::io;
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

pub use faults::SimFault;
pub use waveform::SimWaveform;

use self::faults::FaultPlan;
use self::irq::InterruptLine;
use self::ring::DmaRing;
use self::waveform::WaveformGenerator;
use crate::board::{AcquisitionBoard, InterruptWaker};
use crate::capabilities::BoardCapabilities;
use crate::config::{AcquisitionConfig, ResolvedConfig};
use crate::error::{BoardError, Result};
use crate::interrupt::{InterruptRecord, InterruptSource};
use crate::range::RawSample;

/// How buffer completions are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimMode {
    /// Completions are driven through a [`SimController`]
    #[default]
    Manual,
    /// A producer thread completes buffers at the configured rate
    FreeRunning,
}

/// Behaviour of a simulated board.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimOptions {
    /// Completion mode
    pub mode: SimMode,
    /// Signal written into the ring
    pub waveform: SimWaveform,
    /// Noise seed (defaults to the board id)
    pub seed: Option<u64>,
}

struct SimState {
    ring: Option<DmaRing>,
    queue: VecDeque<InterruptRecord>,
    faults: FaultPlan,
    started: bool,
    sequence: u64,
    generator: Option<WaveformGenerator>,
}

struct SimShared {
    id: u32,
    line: InterruptLine,
    state: Mutex<SimState>,
}

impl SimShared {
    // Called with the state lock held so a concurrent drain cannot swallow
    // the byte written for this record.
    fn push(&self, state: &mut SimState, record: InterruptRecord) -> Result<()> {
        state.queue.push_back(record);
        self.line.raise()?;
        Ok(())
    }

    fn complete_buffer(&self) -> Result<usize> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if !state.started {
            return Err(BoardError::HardwareError {
                board: self.id,
                message: "sampling engine not running".to_string(),
            });
        }

        let incomplete = state.faults.take_incomplete();
        let dma_error = state.faults.take_dma_error();
        let sequence = state.sequence;

        let ring = state
            .ring
            .as_mut()
            .ok_or(BoardError::NotConfigured { board: self.id })?;
        let generator = &mut state.generator;
        let produced = ring.produce(!incomplete, |channel, buf| {
            if let Some(generator) = generator.as_mut() {
                generator.fill(channel, sequence, buf);
            }
        });
        if let Some(channel) = dma_error {
            ring.set_channel_error(channel)?;
        }

        state.sequence += 1;
        self.push(state, InterruptRecord::new(InterruptSource::BufferComplete))?;

        match produced {
            Ok(index) => {
                trace!(board = self.id, index, sequence, "Buffer completed");
                Ok(index)
            }
            Err(_) => {
                warn!(board = self.id, sequence, "DMA ring overflow");
                Err(BoardError::HardwareError {
                    board: self.id,
                    message: "DMA ring overflow".to_string(),
                })
            }
        }
    }
}

impl InterruptWaker for SimShared {
    fn wake(&self) -> io::Result<()> {
        self.line.raise()
    }
}

/// Free-running completion thread.
struct Producer {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Producer {
    fn spawn(shared: Arc<SimShared>, period: Duration) -> Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        let id = shared.id;

        let handle = thread::Builder::new()
            .name(format!("sim-board-{}", id))
            .spawn(move || {
                debug!(board = id, ?period, "Producer thread started");
                let mut next = Instant::now() + period;
                while flag.load(Ordering::Acquire) {
                    let now = Instant::now();
                    if now < next {
                        thread::sleep((next - now).min(Duration::from_millis(5)));
                        continue;
                    }
                    if let Err(e) = shared.complete_buffer() {
                        warn!(board = id, error = %e, "Producer thread stopping");
                        break;
                    }
                    next += period;
                }
                debug!(board = id, "Producer thread exited");
            })?;

        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Simulated producer thread panicked");
            }
        }
    }
}

impl Drop for Producer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// In-process stand-in for one acquisition board.
pub struct SimulatedBoard {
    shared: Arc<SimShared>,
    caps: BoardCapabilities,
    options: SimOptions,
    resolved: Option<ResolvedConfig>,
    triggers_armed: bool,
    rate_programmed: bool,
    next_index: usize,
    producer: Option<Producer>,
}

impl SimulatedBoard {
    /// Open a manual-mode board with default capabilities.
    pub fn open(id: u32) -> Result<Self> {
        Self::open_with(id, BoardCapabilities::default(), SimOptions::default())
    }

    /// Open a board with explicit capabilities and behaviour.
    pub fn open_with(id: u32, caps: BoardCapabilities, options: SimOptions) -> Result<Self> {
        let line = InterruptLine::new().map_err(|e| BoardError::OpenFailed {
            board: id,
            message: e.to_string(),
        })?;

        info!(board = id, mode = ?options.mode, fd = line.fd(), "Opened simulated board");

        Ok(Self {
            shared: Arc::new(SimShared {
                id,
                line,
                state: Mutex::new(SimState {
                    ring: None,
                    queue: VecDeque::new(),
                    faults: FaultPlan::default(),
                    started: false,
                    sequence: 0,
                    generator: None,
                }),
            }),
            caps,
            options,
            resolved: None,
            triggers_armed: false,
            rate_programmed: false,
            next_index: 0,
            producer: None,
        })
    }

    /// Handle for driving completions and injecting faults.
    pub fn controller(&self) -> SimController {
        SimController {
            shared: self.shared.clone(),
        }
    }

    fn require_configured(&self) -> Result<&ResolvedConfig> {
        self.resolved.as_ref().ok_or(BoardError::NotConfigured {
            board: self.shared.id,
        })
    }

    fn with_ring<T>(&self, f: impl FnOnce(&mut DmaRing) -> Result<T>) -> Result<T> {
        let mut state = self.shared.state.lock();
        let ring = state.ring.as_mut().ok_or(BoardError::NotConfigured {
            board: self.shared.id,
        })?;
        f(ring)
    }

    fn stop_producer(&mut self) {
        if let Some(mut producer) = self.producer.take() {
            producer.stop();
        }
    }
}

impl AcquisitionBoard for SimulatedBoard {
    fn id(&self) -> u32 {
        self.shared.id
    }

    fn capabilities(&self) -> &BoardCapabilities {
        &self.caps
    }

    fn configure(&mut self, config: &AcquisitionConfig) -> Result<&ResolvedConfig> {
        if self.is_started() {
            return Err(BoardError::Busy {
                board: self.shared.id,
            });
        }

        let resolved = config.resolve(&self.caps)?;
        let ring = DmaRing::new(resolved.geometry)?;
        let generator = WaveformGenerator::new(
            self.options.waveform.clone(),
            self.options.seed.unwrap_or(u64::from(self.shared.id)),
            resolved.achieved_rate,
            resolved.range(),
            resolved.resolution_bits,
        );

        {
            let mut state = self.shared.state.lock();
            state.ring = Some(ring);
            state.generator = Some(generator);
            state.queue.clear();
            state.sequence = 0;
            self.shared.line.drain()?;
        }

        self.triggers_armed = false;
        self.rate_programmed = false;
        self.next_index = 0;

        info!(
            board = self.shared.id,
            rate = resolved.achieved_rate,
            channels = resolved.geometry.channels,
            samples_per_buffer = resolved.geometry.samples_per_buffer,
            depth = resolved.geometry.depth,
            "Configured simulated board"
        );

        Ok(self.resolved.insert(resolved))
    }

    fn resolved(&self) -> Option<&ResolvedConfig> {
        self.resolved.as_ref()
    }

    fn is_started(&self) -> bool {
        self.shared.state.lock().started
    }

    fn start_dma(&mut self, channel: usize) -> Result<()> {
        let resolved = self.require_configured()?;
        let mode = resolved.requested.mode;
        let physical = self.caps.physical_channels;
        let (positive, negative) = mode
            .physical_pair(channel, physical)
            .ok_or(BoardError::InvalidChannel {
                channel,
                max: mode.active_channels(physical),
            })?;
        self.with_ring(|ring| ring.start_dma(channel))?;
        trace!(board = self.shared.id, channel, positive, ?negative, "DMA engine started");
        Ok(())
    }

    fn arm_triggers(&mut self) -> Result<()> {
        self.require_configured()?;
        self.triggers_armed = true;
        Ok(())
    }

    fn program_rate(&mut self) -> Result<()> {
        let rate = self.require_configured()?.achieved_rate;
        self.rate_programmed = true;
        debug!(board = self.shared.id, rate, "Programmed sample clock");
        Ok(())
    }

    fn initialize_and_start(&mut self) -> Result<()> {
        let period = self.require_configured()?.buffer_period();
        let id = self.shared.id;

        {
            let mut state = self.shared.state.lock();
            if state.faults.take_start() {
                return Err(BoardError::StartFailed {
                    board: id,
                    message: "timed out waiting for sampling engine".to_string(),
                });
            }
            if state.started {
                return Err(BoardError::Busy { board: id });
            }

            let dma_ready = state.ring.as_ref().is_some_and(DmaRing::all_dma_started);
            if !(dma_ready && self.triggers_armed && self.rate_programmed) {
                return Err(BoardError::StartFailed {
                    board: id,
                    message: "start sequence incomplete".to_string(),
                });
            }

            state.started = true;
            self.shared
                .push(&mut state, InterruptRecord::new(InterruptSource::EngineStarted))?;
        }

        if self.options.mode == SimMode::FreeRunning {
            self.producer = Some(Producer::spawn(self.shared.clone(), period)?);
        }

        info!(board = id, "Sampling engine started");
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.stop_producer();

        let mut state = self.shared.state.lock();
        let was_started = std::mem::replace(&mut state.started, false);
        if let Some(ring) = state.ring.as_mut() {
            ring.rewind();
        }
        state.queue.clear();
        state.sequence = 0;
        self.shared.line.drain()?;
        drop(state);

        self.triggers_armed = false;
        self.rate_programmed = false;
        self.next_index = 0;

        if was_started {
            info!(board = self.shared.id, "Sampling engine stopped");
        }
        Ok(())
    }

    fn interrupt_fd(&self) -> RawFd {
        self.shared.line.fd()
    }

    fn waker(&self) -> Arc<dyn InterruptWaker> {
        self.shared.clone()
    }

    fn next_interrupt(&mut self) -> Result<InterruptRecord> {
        let mut state = self.shared.state.lock();
        if state.faults.take_interrupt_get() {
            return Ok(InterruptRecord::failed());
        }

        let record = match state.queue.pop_front() {
            Some(mut record) => {
                record.pending = state.queue.len() as u32;
                record
            }
            None => InterruptRecord::empty(),
        };
        if state.queue.is_empty() {
            self.shared.line.drain()?;
        }
        Ok(record)
    }

    fn acknowledge(&mut self) -> Result<()> {
        if self.shared.state.lock().faults.take_acknowledge() {
            return Err(BoardError::InterruptAck {
                board: self.shared.id,
                message: "acknowledge register write timed out".to_string(),
            });
        }
        Ok(())
    }

    fn buffer_full(&self, channel: usize, index: usize) -> Result<bool> {
        self.with_ring(|ring| ring.is_full(channel, index))
    }

    fn copy_buffer(&self, channel: usize, index: usize, dst: &mut [RawSample]) -> Result<()> {
        self.with_ring(|ring| ring.copy_out(channel, index, dst))
    }

    fn reset_buffer(&mut self, channel: usize, index: usize) -> Result<()> {
        self.with_ring(|ring| ring.reset_slot(channel, index))
    }

    fn clear_interrupt_bits(&mut self, channel: usize) -> Result<()> {
        self.with_ring(|ring| ring.clear_irq(channel))
    }

    fn channel_error(&self, channel: usize) -> Result<bool> {
        self.with_ring(|ring| ring.channel_error(channel))
    }

    fn next_index(&self) -> usize {
        self.next_index
    }

    fn advance_index(&mut self) -> usize {
        let depth = self.resolved.as_ref().map_or(1, |r| r.geometry.depth);
        self.next_index = (self.next_index + 1) % depth;
        self.next_index
    }
}

impl std::fmt::Debug for SimulatedBoard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedBoard")
            .field("id", &self.shared.id)
            .field("mode", &self.options.mode)
            .field("configured", &self.resolved.is_some())
            .field("next_index", &self.next_index)
            .finish()
    }
}

impl Drop for SimulatedBoard {
    fn drop(&mut self) {
        self.stop_producer();
        info!(board = self.shared.id, "Closed simulated board");
    }
}

/// Cloneable handle that drives a [`SimulatedBoard`] from another thread.
#[derive(Clone)]
pub struct SimController {
    shared: Arc<SimShared>,
}

impl SimController {
    /// Board this controller drives.
    pub fn board_id(&self) -> u32 {
        self.shared.id
    }

    /// Complete one buffer on every active channel and raise its interrupt.
    ///
    /// Returns the ring slot that was filled.
    pub fn complete_buffer(&self) -> Result<usize> {
        self.shared.complete_buffer()
    }

    /// Complete `count` buffers back to back.
    pub fn complete_buffers(&self, count: usize) -> Result<()> {
        for _ in 0..count {
            self.shared.complete_buffer()?;
        }
        Ok(())
    }

    /// Raise a trigger interrupt that carries no data.
    pub fn raise_trigger(&self) -> Result<()> {
        let mut state = self.shared.state.lock();
        self.shared
            .push(&mut state, InterruptRecord::new(InterruptSource::Trigger))
    }

    /// Arm a fault.
    pub fn inject(&self, fault: SimFault) {
        debug!(board = self.shared.id, ?fault, "Injecting fault");
        if !self.shared.state.lock().faults.arm(fault) {
            self.shared.line.hang_up();
        }
    }

    /// Interrupts queued and not yet retrieved.
    pub fn pending_interrupts(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    /// Buffers completed since the engine was last configured or stopped.
    pub fn buffers_completed(&self) -> u64 {
        self.shared.state.lock().sequence
    }

    /// Check if the sampling engine is running.
    pub fn is_started(&self) -> bool {
        self.shared.state.lock().started
    }

    /// Check if the DMA interrupt bit of `channel` is still set.
    pub fn interrupt_bit(&self, channel: usize) -> bool {
        self.shared
            .state
            .lock()
            .ring
            .as_ref()
            .is_some_and(|ring| ring.irq_pending(channel))
    }
}

impl std::fmt::Debug for SimController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimController")
            .field("board", &self.shared.id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started(config: AcquisitionConfig) -> (SimulatedBoard, SimController) {
        let mut board = SimulatedBoard::open_with(
            7,
            BoardCapabilities::default(),
            SimOptions {
                waveform: SimWaveform::Sequence,
                ..SimOptions::default()
            },
        )
        .unwrap();
        let channels = board.configure(&config).unwrap().geometry.channels;
        for channel in 0..channels {
            board.start_dma(channel).unwrap();
        }
        board.arm_triggers().unwrap();
        board.program_rate().unwrap();
        board.initialize_and_start().unwrap();
        let controller = board.controller();
        (board, controller)
    }

    #[test]
    fn test_unconfigured_board_rejects_start() {
        let mut board = SimulatedBoard::open(1).unwrap();
        assert!(matches!(
            board.start_dma(0),
            Err(BoardError::NotConfigured { board: 1 })
        ));
        assert!(board.initialize_and_start().is_err());
    }

    #[test]
    fn test_incomplete_start_sequence() {
        let mut board = SimulatedBoard::open(1).unwrap();
        board.configure(&AcquisitionConfig::default()).unwrap();
        board.arm_triggers().unwrap();
        board.program_rate().unwrap();
        let err = board.initialize_and_start().unwrap_err();
        assert!(matches!(err, BoardError::StartFailed { .. }));
    }

    #[test]
    fn test_engine_started_record_first() {
        let (mut board, _controller) = started(AcquisitionConfig::default());
        let record = board.next_interrupt().unwrap();
        assert_eq!(record.source, InterruptSource::EngineStarted);
        assert!(!record.has_more());
        assert!(!board.next_interrupt().unwrap().valid);
    }

    #[test]
    fn test_drain_one_buffer() {
        let config = AcquisitionConfig::builder()
            .samples_per_buffer(16)
            .buffer_depth(2)
            .build()
            .unwrap();
        let (mut board, controller) = started(config);
        board.next_interrupt().unwrap();

        assert_eq!(controller.complete_buffer().unwrap(), 0);
        assert_eq!(controller.complete_buffer().unwrap(), 1);

        let record = board.next_interrupt().unwrap();
        assert!(record.is_buffer_complete());
        assert_eq!(record.pending, 1);

        let index = board.next_index();
        assert!(board.buffer_full(0, index).unwrap());
        let mut out = vec![0i16; 16];
        board.copy_buffer(3, index, &mut out).unwrap();
        assert!(out.iter().all(|&s| s == 0));

        board.reset_buffer(3, index).unwrap();
        board.clear_interrupt_bits(3).unwrap();
        assert!(!controller.interrupt_bit(3));
        board.acknowledge().unwrap();
        assert_eq!(board.advance_index(), 1);

        board.copy_buffer(0, 1, &mut out).unwrap();
        assert!(out.iter().all(|&s| s == 1));
        assert_eq!(board.advance_index(), 0);
    }

    #[test]
    fn test_one_shot_faults() {
        let (mut board, controller) = started(AcquisitionConfig::default());

        controller.inject(SimFault::AcknowledgeFailure);
        assert!(matches!(
            board.acknowledge(),
            Err(BoardError::InterruptAck { board: 7, .. })
        ));
        board.acknowledge().unwrap();

        controller.inject(SimFault::InterruptGetError);
        assert!(board.next_interrupt().unwrap().error);

        controller.inject(SimFault::IncompleteBuffer);
        let index = controller.complete_buffer().unwrap();
        assert!(!board.buffer_full(0, index).unwrap());

        controller.inject(SimFault::DmaError { channel: 2 });
        controller.complete_buffer().unwrap();
        assert!(board.channel_error(2).unwrap());
        assert!(!board.channel_error(1).unwrap());
    }

    #[test]
    fn test_stop_resets_ring() {
        let (mut board, controller) = started(AcquisitionConfig::default());
        controller.complete_buffers(2).unwrap();
        board.advance_index();
        board.stop().unwrap();

        assert!(!board.is_started());
        assert_eq!(controller.pending_interrupts(), 0);
        assert_eq!(board.next_index(), 0);
        assert!(!board.buffer_full(0, 0).unwrap());
        assert!(controller.complete_buffer().is_err());
    }

    #[test]
    fn test_free_running_produces_buffers() {
        let mut board = SimulatedBoard::open_with(
            3,
            BoardCapabilities::default(),
            SimOptions {
                mode: SimMode::FreeRunning,
                ..SimOptions::default()
            },
        )
        .unwrap();
        // 100 samples at 10 kHz: one buffer every 10 ms
        let config = AcquisitionConfig::builder()
            .sample_rate(10_000.0)
            .samples_per_buffer(100)
            .buffer_depth(16)
            .build()
            .unwrap();
        board.configure(&config).unwrap();
        for channel in 0..8 {
            board.start_dma(channel).unwrap();
        }
        board.arm_triggers().unwrap();
        board.program_rate().unwrap();
        board.initialize_and_start().unwrap();

        let controller = board.controller();
        let deadline = Instant::now() + Duration::from_secs(2);
        while controller.buffers_completed() < 3 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(controller.buffers_completed() >= 3);
        board.stop().unwrap();
    }
}
