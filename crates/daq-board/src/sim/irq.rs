//! Pipe-backed interrupt line for simulated boards.
//!
//! The read end is what callers `poll`. Raising an interrupt (or waking a
//! waiter) writes one byte; the consumer drains the pipe once the pending
//! queue is empty, so the descriptor is readable exactly while something is
//! pending. Closing the write end produces `POLLHUP` on the read end, which is
//! how a hung-up channel is simulated.

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

use parking_lot::Mutex;
use tracing::trace;

pub(crate) struct InterruptLine {
    read: OwnedFd,
    write: Mutex<Option<OwnedFd>>,
}

impl InterruptLine {
    pub(crate) fn new() -> io::Result<Self> {
        let mut fds: [libc::c_int; 2] = [-1; 2];

        // SAFETY: fds points to two writable c_ints
        let rc = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_NONBLOCK | libc::O_CLOEXEC) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }

        // SAFETY: pipe2 succeeded, both descriptors are fresh and owned by us
        let (read, write) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };

        Ok(Self {
            read,
            write: Mutex::new(Some(write)),
        })
    }

    pub(crate) fn fd(&self) -> RawFd {
        self.read.as_raw_fd()
    }

    /// Make the read end readable.
    pub(crate) fn raise(&self) -> io::Result<()> {
        let guard = self.write.lock();
        let Some(write) = guard.as_ref() else {
            // Hung up: POLLHUP already wakes every waiter.
            return Ok(());
        };

        let byte = [1u8];
        // SAFETY: write end is open and byte is a valid 1-byte buffer
        let rc = unsafe { libc::write(write.as_raw_fd(), byte.as_ptr().cast(), 1) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            // A full pipe is still readable
            if err.raw_os_error() != Some(libc::EAGAIN) {
                return Err(err);
            }
        }
        Ok(())
    }

    /// Consume every byte so the read end stops polling readable.
    pub(crate) fn drain(&self) -> io::Result<()> {
        let mut scratch = [0u8; 64];
        loop {
            // SAFETY: read end is open and scratch is a valid buffer
            let rc = unsafe {
                libc::read(
                    self.read.as_raw_fd(),
                    scratch.as_mut_ptr().cast(),
                    scratch.len(),
                )
            };
            if rc > 0 {
                continue;
            }
            if rc == 0 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            return match err.raw_os_error() {
                Some(libc::EAGAIN) => Ok(()),
                Some(libc::EINTR) => continue,
                _ => Err(err),
            };
        }
    }

    /// Close the write end.
    pub(crate) fn hang_up(&self) {
        if self.write.lock().take().is_some() {
            trace!(fd = self.fd(), "Interrupt line hung up");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn readable(fd: RawFd) -> libc::c_short {
        let mut pfd = libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        };
        // SAFETY: pfd is a valid pollfd
        let rc = unsafe { libc::poll(&mut pfd, 1, 0) };
        assert!(rc >= 0);
        pfd.revents
    }

    #[test]
    fn test_raise_and_drain() {
        let line = InterruptLine::new().unwrap();
        assert_eq!(readable(line.fd()), 0);

        line.raise().unwrap();
        line.raise().unwrap();
        assert_ne!(readable(line.fd()) & libc::POLLIN, 0);

        line.drain().unwrap();
        assert_eq!(readable(line.fd()), 0);
    }

    #[test]
    fn test_hang_up_reports_pollhup() {
        let line = InterruptLine::new().unwrap();
        line.hang_up();
        assert_ne!(readable(line.fd()) & libc::POLLHUP, 0);
        // Raising after hang-up is harmless
        line.raise().unwrap();
    }
}
