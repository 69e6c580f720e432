//! Hardware limits of an acquisition board.
//!
//! Every [`AcquisitionConfig`](crate::AcquisitionConfig) is validated against
//! the board's [`BoardCapabilities`] before ring buffers are allocated.
//!
//! # Timing Model
//!
//! ```text
//!   base clock ──► divisor ──► sample clock (all channels sampled together)
//!
//!   achieved_rate = base_clock_hz / round(base_clock_hz / requested_rate)
//! ```

use tracing::debug;

use crate::error::{BoardError, Result};
use crate::range::InputRange;

/// Hardware timing and buffer capabilities.
#[derive(Debug, Clone)]
pub struct BoardCapabilities {
    /// Number of physical analog inputs
    pub physical_channels: usize,
    /// Converter resolution in bits
    pub resolution_bits: u32,
    /// Maximum per-channel sample rate in Hz
    pub max_sample_rate: f64,
    /// Minimum per-channel sample rate in Hz
    pub min_sample_rate: f64,
    /// Base clock frequency in Hz
    pub base_clock_hz: f64,
    /// Clock divisor range
    pub divisor_range: (u32, u32),
    /// Maximum samples per channel in one DMA buffer
    pub max_samples_per_buffer: usize,
    /// Maximum number of ring slots per channel
    pub max_buffer_depth: usize,
    /// Maximum start delay in sample clock ticks
    pub max_delay: u32,
    /// Ranges the gain stage supports
    pub ranges: Vec<InputRange>,
}

impl Default for BoardCapabilities {
    fn default() -> Self {
        // 8-input, 16-bit simultaneous-sampling board
        Self {
            physical_channels: 8,
            resolution_bits: 16,
            max_sample_rate: 1_000_000.0,
            min_sample_rate: 1.0,
            base_clock_hz: 80_000_000.0,
            divisor_range: (80, 80_000_000),
            max_samples_per_buffer: 1 << 20,
            max_buffer_depth: 64,
            max_delay: 0x00FF_FFFF,
            ranges: InputRange::ALL.to_vec(),
        }
    }
}

impl BoardCapabilities {
    /// Check if a sample rate is achievable.
    pub fn validate_sample_rate(&self, rate: f64) -> Result<()> {
        if !rate.is_finite() || rate < self.min_sample_rate || rate > self.max_sample_rate {
            return Err(BoardError::InvalidRate {
                requested: rate,
                min: self.min_sample_rate,
                max: self.max_sample_rate,
            });
        }
        Ok(())
    }

    /// Calculate the closest achievable sample rate.
    pub fn nearest_sample_rate(&self, requested: f64) -> f64 {
        let ideal_divisor = self.base_clock_hz / requested;
        let actual_divisor = ideal_divisor
            .round()
            .clamp(self.divisor_range.0 as f64, self.divisor_range.1 as f64);

        let achieved = self.base_clock_hz / actual_divisor;
        debug!(requested, achieved, divisor = actual_divisor, "Quantised sample rate");
        achieved
    }

    /// Check per-buffer sample count and ring depth.
    pub fn validate_buffer(&self, samples_per_buffer: usize, depth: usize) -> Result<()> {
        if samples_per_buffer == 0 || samples_per_buffer > self.max_samples_per_buffer {
            return Err(BoardError::InvalidBufferSize {
                message: format!(
                    "{} samples per buffer outside 1..={}",
                    samples_per_buffer, self.max_samples_per_buffer
                ),
            });
        }
        if depth == 0 || depth > self.max_buffer_depth {
            return Err(BoardError::InvalidBufferSize {
                message: format!(
                    "ring depth {} outside 1..={}",
                    depth, self.max_buffer_depth
                ),
            });
        }
        Ok(())
    }
}
