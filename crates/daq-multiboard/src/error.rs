//! Error taxonomy of the multiboard core.
//!
//! Every variant maps to a stable negative code via [`MultiboardError::code`].
//! Setup failures are returned synchronously; everything that happens once
//! the round barrier is running reaches the application only through the
//! installed callback, as [`RoundEvent::Failed`](crate::RoundEvent::Failed).

use std::io;

use daq_board::BoardError;
use thiserror::Error;

/// Result type alias for multiboard operations.
pub type Result<T> = std::result::Result<T, MultiboardError>;

/// Errors raised by a [`MultiboardGroup`](crate::MultiboardGroup).
#[derive(Error, Debug)]
pub enum MultiboardError {
    /// Sample rate rejected when configuring a board
    #[error("Invalid sample rate: {0}")]
    InvalidRate(#[source] BoardError),

    /// Buffer geometry rejected when configuring a board
    #[error("Invalid buffer size: {0}")]
    InvalidBufferSize(#[source] BoardError),

    /// Expected ring slot was signalled complete but is not full
    #[error("Board {board}: ring slot {index} signalled complete but not full")]
    BufferNotFull { board: u32, index: usize },

    /// DMA error flag raised on a channel
    #[error("Board {board}: DMA error on channel {channel}")]
    ChannelDma { board: u32, channel: usize },

    /// Interrupt retrieval failed or the record carried the error flag
    #[error("Board {board}: interrupt retrieval failed: {message}")]
    InterruptGet { board: u32, message: String },

    /// Board-level interrupt acknowledge failed
    #[error("Board {board}: interrupt acknowledge failed: {message}")]
    InterruptAck { board: u32, message: String },

    /// The readiness wait itself failed
    #[error("Interrupt multiplexing failed: {0}")]
    MultiplexFailed(#[source] io::Error),

    /// The readiness wait returned with nothing ready
    #[error("Interrupt wait returned without any ready board")]
    NoData,

    /// Exceptional condition (error, hang-up, invalid fd) on an interrupt channel
    #[error("Board {board}: exceptional condition on interrupt channel (revents {revents:#06x})")]
    ChannelIo { board: u32, revents: i16 },

    /// A callback is already installed on this group
    #[error("A round callback is already installed")]
    AlreadyInstalled,

    /// Any other board failure while draining
    #[error("Board failure: {0}")]
    Board(#[source] BoardError),

    /// Invalid group or thread setup failure
    #[error("Setup failed: {message}")]
    Setup { message: String },

    /// A board's sampling engine failed to start during install
    #[error("Board {board} failed to start: {source}")]
    StartFailed {
        board: u32,
        #[source]
        source: BoardError,
    },
}

impl MultiboardError {
    /// Stable negative code reported to callers.
    pub fn code(&self) -> i32 {
        match self {
            Self::InvalidRate(_) => -1,
            Self::InvalidBufferSize(_) => -2,
            Self::BufferNotFull { .. } => -3,
            Self::ChannelDma { .. } => -4,
            Self::InterruptGet { .. } => -5,
            Self::InterruptAck { .. } => -6,
            Self::MultiplexFailed(_) => -7,
            Self::NoData => -8,
            Self::ChannelIo { .. } => -9,
            Self::AlreadyInstalled => -10,
            Self::Board(_) => -11,
            Self::Setup { .. } | Self::StartFailed { .. } => -12,
        }
    }

    /// Board the error is attributed to, when there is one.
    pub fn board(&self) -> Option<u32> {
        match self {
            Self::BufferNotFull { board, .. }
            | Self::ChannelDma { board, .. }
            | Self::InterruptGet { board, .. }
            | Self::InterruptAck { board, .. }
            | Self::ChannelIo { board, .. }
            | Self::StartFailed { board, .. } => Some(*board),
            _ => None,
        }
    }

    pub(crate) fn setup(message: impl Into<String>) -> Self {
        Self::Setup {
            message: message.into(),
        }
    }
}

impl From<BoardError> for MultiboardError {
    fn from(err: BoardError) -> Self {
        match err {
            e if e.is_invalid_rate() => Self::InvalidRate(e),
            e if e.is_invalid_buffer_size() => Self::InvalidBufferSize(e),
            BoardError::InterruptGet { board, message } => Self::InterruptGet { board, message },
            BoardError::InterruptAck { board, message } => Self::InterruptAck { board, message },
            e => Self::Board(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_table() {
        let cases: Vec<(MultiboardError, i32)> = vec![
            (
                BoardError::InvalidRate {
                    requested: 0.0,
                    min: 1.0,
                    max: 2.0,
                }
                .into(),
                -1,
            ),
            (
                BoardError::InvalidBufferSize {
                    message: "zero".to_string(),
                }
                .into(),
                -2,
            ),
            (MultiboardError::BufferNotFull { board: 0, index: 1 }, -3),
            (MultiboardError::ChannelDma { board: 0, channel: 2 }, -4),
            (
                BoardError::InterruptGet {
                    board: 1,
                    message: "x".to_string(),
                }
                .into(),
                -5,
            ),
            (
                BoardError::InterruptAck {
                    board: 1,
                    message: "x".to_string(),
                }
                .into(),
                -6,
            ),
            (
                MultiboardError::MultiplexFailed(io::Error::from_raw_os_error(libc::EBADF)),
                -7,
            ),
            (MultiboardError::NoData, -8),
            (MultiboardError::ChannelIo { board: 0, revents: 0x10 }, -9),
            (MultiboardError::AlreadyInstalled, -10),
            (BoardError::NotConfigured { board: 3 }.into(), -11),
            (MultiboardError::setup("empty group"), -12),
        ];

        for (err, code) in cases {
            assert_eq!(err.code(), code, "{err}");
        }
    }

    #[test]
    fn test_board_attribution() {
        assert_eq!(MultiboardError::ChannelDma { board: 4, channel: 0 }.board(), Some(4));
        assert_eq!(MultiboardError::NoData.board(), None);
    }

    #[test]
    fn test_error_display() {
        let err = MultiboardError::ChannelIo {
            board: 2,
            revents: libc::POLLHUP,
        };
        assert!(err.to_string().contains("Board 2"));
        assert!(err.to_string().contains("0x0010"));
    }
}
