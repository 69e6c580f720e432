//! The single-board acquisition interface consumed by the multiboard core.
//!
//! An [`AcquisitionBoard`] is one opened and configured board. Its lifecycle
//! is `open` → [`configure`](AcquisitionBoard::configure) → start sequence →
//! drain primitives → `Drop` (close). The start sequence is split into the
//! same steps the hardware exposes so a caller can bring several boards up
//! with minimal relative skew:
//!
//! 1. [`start_dma`](AcquisitionBoard::start_dma) for every active channel
//! 2. [`arm_triggers`](AcquisitionBoard::arm_triggers)
//! 3. [`program_rate`](AcquisitionBoard::program_rate)
//! 4. [`initialize_and_start`](AcquisitionBoard::initialize_and_start)
//!
//! Once running, the board raises interrupts on the file descriptor returned
//! by [`interrupt_fd`](AcquisitionBoard::interrupt_fd). The descriptor is
//! level-triggered: it stays readable while interrupts are pending.

use std::io;
use std::os::fd::RawFd;
use std::sync::Arc;

use crate::capabilities::BoardCapabilities;
use crate::config::{AcquisitionConfig, BufferGeometry, ResolvedConfig};
use crate::error::Result;
use crate::interrupt::InterruptRecord;
use crate::range::RawSample;

/// Cross-thread wake primitive for a board's interrupt channel.
///
/// Waking makes the interrupt descriptor readable without queueing an
/// interrupt, so a thread parked in `poll` returns and the next
/// [`AcquisitionBoard::next_interrupt`] yields an empty record.
pub trait InterruptWaker: Send + Sync {
    /// Wake any thread waiting on the interrupt channel.
    fn wake(&self) -> io::Result<()>;
}

/// One data-acquisition board.
pub trait AcquisitionBoard: Send {
    /// Board identifier passed to `open`.
    fn id(&self) -> u32;

    /// Hardware limits of this board.
    fn capabilities(&self) -> &BoardCapabilities;

    /// Validate `config`, allocate ring buffers and arm DMA with interrupts
    /// disabled.
    fn configure(&mut self, config: &AcquisitionConfig) -> Result<&ResolvedConfig>;

    /// Configuration accepted by the last successful `configure`.
    fn resolved(&self) -> Option<&ResolvedConfig>;

    /// Check if the sampling engine is running.
    fn is_started(&self) -> bool;

    /// Start the DMA engine of one active channel.
    fn start_dma(&mut self, channel: usize) -> Result<()>;

    /// Arm the start and stop triggers.
    fn arm_triggers(&mut self) -> Result<()>;

    /// Program the sample clock divisor.
    fn program_rate(&mut self) -> Result<()>;

    /// Initialise and start the sampling engine.
    ///
    /// May block up to a bounded, board-specific timeout.
    fn initialize_and_start(&mut self) -> Result<()>;

    /// Stop the sampling engine and return the ring to its armed state.
    fn stop(&mut self) -> Result<()>;

    /// Readiness-checkable interrupt descriptor, valid for the board's lifetime.
    fn interrupt_fd(&self) -> RawFd;

    /// Wake primitive for [`interrupt_fd`](Self::interrupt_fd).
    fn waker(&self) -> Arc<dyn InterruptWaker>;

    /// Pop one pending interrupt record.
    fn next_interrupt(&mut self) -> Result<InterruptRecord>;

    /// Acknowledge the current interrupt at board level.
    fn acknowledge(&mut self) -> Result<()>;

    /// Check if ring slot `index` of `channel` holds a complete buffer.
    fn buffer_full(&self, channel: usize, index: usize) -> Result<bool>;

    /// Copy ring slot `index` of `channel` into `dst`.
    fn copy_buffer(&self, channel: usize, index: usize, dst: &mut [RawSample]) -> Result<()>;

    /// Hand ring slot `index` of `channel` back to the DMA engine.
    fn reset_buffer(&mut self, channel: usize, index: usize) -> Result<()>;

    /// Clear the per-channel interrupt status bits.
    fn clear_interrupt_bits(&mut self, channel: usize) -> Result<()>;

    /// Check the per-channel DMA error flag.
    fn channel_error(&self, channel: usize) -> Result<bool>;

    /// Ring slot the next completed buffer is expected in.
    fn next_index(&self) -> usize;

    /// Advance the expected ring slot, modulo the ring depth.
    fn advance_index(&mut self) -> usize;

    /// Ring geometry, if configured.
    fn geometry(&self) -> Option<BufferGeometry> {
        self.resolved().map(|r| r.geometry)
    }
}
