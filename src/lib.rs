//! Multiboard DAQ application crate.
//!
//! Ties the workspace together for the `multiboard-run` binary:
//!
//! - [`config`] - Figment-based TOML and environment configuration
//! - [`logging`] - `tracing-subscriber` initialisation
//! - [`runner`] - Opens simulated boards, groups them and collects rounds
//!
//! The acquisition layers are re-exported as [`daq_board`] and
//! [`daq_multiboard`].

pub mod config;
pub mod logging;
pub mod runner;

pub use daq_board;
pub use daq_multiboard;
