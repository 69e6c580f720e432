//! Single-board acquisition layer for the multiboard DAQ controller.
//!
//! This crate defines what the multiboard core needs from one board and
//! nothing more: configuration and its validation against hardware limits,
//! the start sequence, a pollable interrupt descriptor with a cross-thread
//! wake, and the per-interrupt drain primitives.
//!
//! # Architecture
//!
//! - [`AcquisitionBoard`] - Trait implemented by every board backend
//! - [`InterruptWaker`] - Wakes a thread parked on a board's interrupt fd
//! - [`AcquisitionConfig`] / [`ResolvedConfig`] - Requested and accepted setup
//! - [`BoardCapabilities`] - Rate, buffer and range limits
//! - [`InputRange`] / [`InputMode`] - Gain and wiring, raw to volts conversion
//! - [`InterruptRecord`] - One entry of the pending-interrupt queue
//! - [`SimulatedBoard`] - Backend with an in-process DMA ring and a pipe as
//!   interrupt channel, used by tests and the `multiboard-run` binary
//!
//! # Example
//!
//! ```
//! use daq_board::{AcquisitionBoard, AcquisitionConfig, InputRange, SimulatedBoard};
//!
//! let mut board = SimulatedBoard::open(0)?;
//! let resolved = board.configure(
//!     &AcquisitionConfig::builder()
//!         .sample_rate(50_000.0)
//!         .range(InputRange::Bipolar5V)
//!         .build()?,
//! )?;
//!
//! assert_eq!(resolved.achieved_rate, 50_000.0);
//! assert_eq!(resolved.to_volts(0), 0.0);
//! # Ok::<(), daq_board::BoardError>(())
//! ```

pub mod board;
pub mod capabilities;
pub mod config;
pub mod error;
pub mod interrupt;
pub mod range;
pub mod sim;

pub use board::{AcquisitionBoard, InterruptWaker};
pub use capabilities::BoardCapabilities;
pub use config::{AcquisitionConfig, AcquisitionConfigBuilder, BufferGeometry, ResolvedConfig};
pub use error::{BoardError, Result};
pub use interrupt::{InterruptRecord, InterruptSource};
pub use range::{InputMode, InputRange, RawSample};
pub use sim::{SimController, SimFault, SimMode, SimOptions, SimWaveform, SimulatedBoard};
