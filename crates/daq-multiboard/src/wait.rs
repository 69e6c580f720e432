//! Readiness multiplexing over board interrupt descriptors.

use std::io;
use std::os::fd::RawFd;

const EXCEPTIONAL: libc::c_short = libc::POLLERR | libc::POLLHUP | libc::POLLNVAL;

/// Readiness of one board after a wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Readiness {
    Readable,
    Exceptional(libc::c_short),
    NotReady,
}

/// Reusable `poll(2)` set keyed by board index.
pub(crate) struct WaitSet {
    fds: Vec<libc::pollfd>,
    boards: Vec<usize>,
}

impl WaitSet {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            fds: Vec::with_capacity(capacity),
            boards: Vec::with_capacity(capacity),
        }
    }

    pub(crate) fn clear(&mut self) {
        self.fds.clear();
        self.boards.clear();
    }

    pub(crate) fn push(&mut self, board_index: usize, fd: RawFd) {
        self.fds.push(libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        });
        self.boards.push(board_index);
    }

    pub(crate) fn len(&self) -> usize {
        self.fds.len()
    }

    /// Block without timeout until at least one descriptor is ready.
    ///
    /// `EINTR` is retried. Returns the number of ready descriptors.
    pub(crate) fn wait(&mut self) -> io::Result<usize> {
        self.wait_timeout(-1)
    }

    fn wait_timeout(&mut self, timeout_ms: libc::c_int) -> io::Result<usize> {
        loop {
            // SAFETY: fds is a live, correctly sized array of pollfd
            let rc = unsafe {
                libc::poll(
                    self.fds.as_mut_ptr(),
                    self.fds.len() as libc::nfds_t,
                    timeout_ms,
                )
            };
            if rc >= 0 {
                return Ok(rc as usize);
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }

    /// Board indices with their readiness from the last wait, in push order.
    pub(crate) fn events(&self) -> impl Iterator<Item = (usize, Readiness)> + '_ {
        self.boards.iter().zip(&self.fds).map(|(&board, pfd)| {
            let readiness = if pfd.revents & EXCEPTIONAL != 0 {
                Readiness::Exceptional(pfd.revents)
            } else if pfd.revents & libc::POLLIN != 0 {
                Readiness::Readable
            } else {
                Readiness::NotReady
            };
            (board, readiness)
        })
    }
}
