//! Acquisition configuration for a single board.
//!
//! # Example
//!
//! ```
//! use daq_board::{AcquisitionConfig, InputMode, InputRange};
//!
//! let config = AcquisitionConfig::builder()
//!     .sample_rate(100_000.0)
//!     .samples_per_buffer(4096)
//!     .buffer_depth(8)
//!     .mode(InputMode::Differential)
//!     .range(InputRange::Bipolar5V)
//!     .build()?;
//!
//! assert_eq!(config.samples_per_buffer, 4096);
//! # Ok::<(), daq_board::BoardError>(())
//! ```

use serde::{Deserialize, Serialize};

use crate::capabilities::BoardCapabilities;
use crate::error::{BoardError, Result};
use crate::range::{InputMode, InputRange};

/// Parameters passed to `Configure`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Requested per-channel sample rate in Hz
    pub sample_rate: f64,
    /// Samples per channel in one DMA buffer
    pub samples_per_buffer: usize,
    /// Number of ring slots per channel
    pub buffer_depth: usize,
    /// Start delay in sample clock ticks
    pub delay: u32,
    /// Input wiring mode
    pub mode: InputMode,
    /// Input range applied to every active channel
    pub range: InputRange,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            sample_rate: 10_000.0,
            samples_per_buffer: 1024,
            buffer_depth: 4,
            delay: 0,
            mode: InputMode::SingleEnded,
            range: InputRange::Bipolar10V,
        }
    }
}

impl AcquisitionConfig {
    /// Create a new builder for acquisition configuration.
    pub fn builder() -> AcquisitionConfigBuilder {
        AcquisitionConfigBuilder::default()
    }

    /// Validate the hardware-independent parts of the configuration.
    pub fn validate(&self) -> Result<()> {
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            return Err(BoardError::InvalidRate {
                requested: self.sample_rate,
                min: 0.0,
                max: f64::INFINITY,
            });
        }

        if self.samples_per_buffer == 0 {
            return Err(BoardError::InvalidBufferSize {
                message: "Samples per buffer must be greater than 0".to_string(),
            });
        }

        if self.buffer_depth == 0 {
            return Err(BoardError::InvalidBufferSize {
                message: "Buffer depth must be greater than 0".to_string(),
            });
        }

        Ok(())
    }

    /// Validate against board capabilities and compute the resulting setup.
    pub fn resolve(&self, caps: &BoardCapabilities) -> Result<ResolvedConfig> {
        self.validate()?;
        caps.validate_sample_rate(self.sample_rate)?;
        caps.validate_buffer(self.samples_per_buffer, self.buffer_depth)?;

        if !caps.ranges.contains(&self.range) {
            return Err(BoardError::InvalidConfig {
                message: format!("Range {} not supported", self.range.description()),
            });
        }

        if self.delay > caps.max_delay {
            return Err(BoardError::InvalidConfig {
                message: format!("Delay {} exceeds maximum {}", self.delay, caps.max_delay),
            });
        }

        let channels = self.mode.active_channels(caps.physical_channels);
        if channels == 0 {
            return Err(BoardError::InvalidChannel {
                channel: 0,
                max: channels,
            });
        }

        Ok(ResolvedConfig {
            requested: self.clone(),
            achieved_rate: caps.nearest_sample_rate(self.sample_rate),
            geometry: BufferGeometry {
                channels,
                samples_per_buffer: self.samples_per_buffer,
                depth: self.buffer_depth,
            },
            resolution_bits: caps.resolution_bits,
        })
    }
}

/// Builder for AcquisitionConfig.
#[derive(Debug, Default)]
pub struct AcquisitionConfigBuilder {
    config: AcquisitionConfig,
}

impl AcquisitionConfigBuilder {
    /// Set the sample rate in Hz.
    pub fn sample_rate(mut self, rate: f64) -> Self {
        self.config.sample_rate = rate;
        self
    }

    /// Set the number of samples per channel in one buffer.
    pub fn samples_per_buffer(mut self, samples: usize) -> Self {
        self.config.samples_per_buffer = samples;
        self
    }

    /// Set the ring depth.
    pub fn buffer_depth(mut self, depth: usize) -> Self {
        self.config.buffer_depth = depth;
        self
    }

    /// Set the start delay in sample clock ticks.
    pub fn delay(mut self, delay: u32) -> Self {
        self.config.delay = delay;
        self
    }

    /// Set the input wiring mode.
    pub fn mode(mut self, mode: InputMode) -> Self {
        self.config.mode = mode;
        self
    }

    /// Set the input range.
    pub fn range(mut self, range: InputRange) -> Self {
        self.config.range = range;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> Result<AcquisitionConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Shape of a board's DMA ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferGeometry {
    /// Active channels
    pub channels: usize,
    /// Samples per channel per buffer
    pub samples_per_buffer: usize,
    /// Ring slots per channel
    pub depth: usize,
}

impl BufferGeometry {
    /// Total raw samples held by one ring slot across all channels.
    pub fn samples_per_slot(&self) -> usize {
        self.channels * self.samples_per_buffer
    }

    /// Bytes of raw memory the full ring occupies.
    pub fn ring_bytes(&self) -> usize {
        self.samples_per_slot() * self.depth * std::mem::size_of::<crate::RawSample>()
    }
}

/// A configuration accepted by the hardware.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    /// Parameters as requested
    pub requested: AcquisitionConfig,
    /// Sample rate the clock divisor actually produces
    pub achieved_rate: f64,
    /// Ring geometry
    pub geometry: BufferGeometry,
    /// Converter resolution in bits
    pub resolution_bits: u32,
}

impl ResolvedConfig {
    /// Configured input range.
    pub fn range(&self) -> InputRange {
        self.requested.range
    }

    /// Convert one raw sample to volts using the configured range.
    pub fn to_volts(&self, raw: crate::RawSample) -> f64 {
        self.range().to_volts(raw, self.resolution_bits)
    }

    /// Wall-clock time to fill one buffer at the achieved rate.
    pub fn buffer_period(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(
            self.geometry.samples_per_buffer as f64 / self.achieved_rate,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = AcquisitionConfig::builder()
            .sample_rate(50_000.0)
            .samples_per_buffer(2048)
            .buffer_depth(3)
            .build()
            .unwrap();

        assert_eq!(config.sample_rate, 50_000.0);
        assert_eq!(config.samples_per_buffer, 2048);
        assert_eq!(config.buffer_depth, 3);
    }

    #[test]
    fn test_config_validation() {
        assert!(AcquisitionConfig::builder().sample_rate(0.0).build().is_err());
        assert!(AcquisitionConfig::builder()
            .samples_per_buffer(0)
            .build()
            .unwrap_err()
            .is_invalid_buffer_size());
        assert!(AcquisitionConfig::builder().buffer_depth(0).build().is_err());
    }

    #[test]
    fn test_resolve_against_capabilities() {
        let caps = BoardCapabilities::default();
        let resolved = AcquisitionConfig::builder()
            .sample_rate(100_000.0)
            .samples_per_buffer(1000)
            .mode(InputMode::Differential)
            .build()
            .unwrap()
            .resolve(&caps)
            .unwrap();

        assert_eq!(resolved.achieved_rate, 100_000.0);
        assert_eq!(resolved.geometry.channels, 4);
        assert_eq!(resolved.buffer_period(), std::time::Duration::from_millis(10));
    }

    #[test]
    fn test_resolve_rejects_rate_above_ceiling() {
        let caps = BoardCapabilities::default();
        let err = AcquisitionConfig::builder()
            .sample_rate(caps.max_sample_rate * 2.0)
            .build()
            .unwrap()
            .resolve(&caps)
            .unwrap_err();
        assert!(err.is_invalid_rate());
    }

    #[test]
    fn test_ring_bytes() {
        let geometry = BufferGeometry {
            channels: 4,
            samples_per_buffer: 256,
            depth: 2,
        };
        assert_eq!(geometry.ring_bytes(), 4 * 256 * 2 * 2);
    }

    #[test]
    fn test_config_from_toml() {
        let config: AcquisitionConfig = toml::from_str(
            r#"
            sample_rate = 25000.0
            samples_per_buffer = 512
            mode = "differential"
            range = "bipolar_2v5"
            "#,
        )
        .unwrap();

        assert_eq!(config.samples_per_buffer, 512);
        assert_eq!(config.mode, InputMode::Differential);
        assert_eq!(config.range, InputRange::Bipolar2V5);
        assert_eq!(config.buffer_depth, 4);
    }
}
