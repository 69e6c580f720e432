//! Error types for single-board acquisition operations.
//!
//! Every failure a board backend can report is expressed as a [`BoardError`].
//! Configuration-time failures (rate and buffer geometry) are kept distinct so
//! callers can tell a rejected parameter set from a runtime fault.

use thiserror::Error;

/// Result type alias for board operations.
pub type Result<T> = std::result::Result<T, BoardError>;

/// Errors that can occur when working with an acquisition board.
#[derive(Error, Debug)]
pub enum BoardError {
    /// Board could not be opened (unknown id, already claimed, ...)
    #[error("Failed to open board {board}: {message}")]
    OpenFailed { board: u32, message: String },

    /// Requested sample rate outside the hardware limits
    #[error("Invalid sample rate {requested} Hz: board supports {min}..={max} Hz")]
    InvalidRate { requested: f64, min: f64, max: f64 },

    /// Samples per buffer or ring depth outside the hardware limits
    #[error("Invalid buffer geometry: {message}")]
    InvalidBufferSize { message: String },

    /// Channel index outside the active channel set
    #[error("Invalid channel {channel}: board has {max} active channels")]
    InvalidChannel { channel: usize, max: usize },

    /// Ring slot index outside the configured depth
    #[error("Invalid buffer index {index}: ring depth is {depth}")]
    InvalidBufferIndex { index: usize, depth: usize },

    /// Invalid configuration or parameter
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Ring buffer allocation failed
    #[error("Failed to allocate {bytes} bytes of ring buffer memory")]
    AllocationFailed { bytes: usize },

    /// Operation requires a configured board
    #[error("Board {board} is not configured")]
    NotConfigured { board: u32 },

    /// Operation not allowed while the sampling engine is running
    #[error("Board {board} is busy (sampling engine running)")]
    Busy { board: u32 },

    /// Sampling engine failed to start within its timeout
    #[error("Board {board} failed to start: {message}")]
    StartFailed { board: u32, message: String },

    /// Interrupt retrieval failed at the register level
    #[error("Interrupt retrieval failed on board {board}: {message}")]
    InterruptGet { board: u32, message: String },

    /// Interrupt acknowledge failed at the register level
    #[error("Interrupt acknowledge failed on board {board}: {message}")]
    InterruptAck { board: u32, message: String },

    /// Buffer copy destination does not match the buffer geometry
    #[error("Buffer size mismatch: expected {expected} samples, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    /// Hardware error reported by the device
    #[error("Hardware error on board {board}: {message}")]
    HardwareError { board: u32, message: String },

    /// I/O error from the operating system
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BoardError {
    /// Check if this error was raised while validating a configuration.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidRate { .. }
                | Self::InvalidBufferSize { .. }
                | Self::InvalidChannel { .. }
                | Self::InvalidConfig { .. }
                | Self::AllocationFailed { .. }
        )
    }

    /// Check if this is a sample rate rejection.
    pub fn is_invalid_rate(&self) -> bool {
        matches!(self, Self::InvalidRate { .. })
    }

    /// Check if this is a buffer geometry rejection.
    pub fn is_invalid_buffer_size(&self) -> bool {
        matches!(self, Self::InvalidBufferSize { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BoardError::InvalidRate {
            requested: 5.0e6,
            min: 1.0,
            max: 1.0e6,
        };
        assert!(err.to_string().contains("5000000"));
        assert!(err.is_invalid_rate());
        assert!(err.is_configuration());
    }

    #[test]
    fn test_runtime_errors_are_not_configuration() {
        let err = BoardError::InterruptAck {
            board: 2,
            message: "register write timed out".to_string(),
        };
        assert!(!err.is_configuration());
        assert!(err.to_string().contains("board 2"));
    }
}
