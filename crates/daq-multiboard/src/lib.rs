//! Synchronised readout of several acquisition boards.
//!
//! Each board runs its own sample clock and raises its own interrupts. A
//! [`MultiboardGroup`] hides that skew: it waits on every board's interrupt
//! channel and releases a *round* to the application only once each board has
//! completed exactly one fresh buffer.
//!
//! # Architecture
//!
//! - [`MultiboardGroup`] - Owns the boards, installs and removes the callback
//! - [`StopHandle`] - Ends an installation from another thread or the callback
//! - Round barrier - Dedicated thread multiplexing the boards' interrupt
//!   descriptors with `poll(2)` and draining one buffer per board per round
//! - [`ReadoutBatch`] - Per-board converted samples, reused every round
//! - [`RoundEvent`] - What the callback receives: a round or a terminal failure
//! - [`MultiboardError`] - Error taxonomy with stable negative codes
//! - [`RoundStats`] - Live counters
//! - [`RoundSnapshot`] - Owned copy of a round for channel consumers
//!
//! # Lifecycle
//!
//! ```text
//!   open + configure boards ──► MultiboardGroup::new
//!                                   │
//!                                   ▼
//!                 install(callback) ──► callback(Round) per round
//!                                   │          ⋮
//!                                   │   callback(Failed) on terminal error
//!                                   ▼
//!                              remove / drop
//! ```
//!
//! See [`MultiboardGroup`] for a complete example.

mod barrier;
pub mod error;
mod group;
mod readout;
mod sink;
mod stats;
mod wait;

pub use barrier::RoundCallback;
pub use error::{MultiboardError, Result};
pub use group::{InstallMode, MultiboardGroup, StopHandle};
pub use readout::{ReadoutBatch, RoundEvent};
pub use sink::{RoundReceiver, RoundSnapshot};
pub use stats::{RoundStats, StatsSnapshot};
