use std::io::ErrorKind;
use std::os::fd::RawFd;
use std::time::{Duration, Instant};

use crate::error::Result;

/// Wait for `fd` to become readable, hung up, or errored.
///
/// Hang-up and error conditions count as readable: a subsequent read returns
/// immediately with either data, `0` (end-of-stream) or the error.
pub(crate) fn poll_readable(fd: RawFd, timeout: Option<Duration>) -> Result<bool> {
    let deadline = timeout.map(|t| Instant::now() + t);

    loop {
        let wait_ms: libc::c_int = match deadline {
            None => -1,
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                // Round up so a sub-millisecond remainder still waits.
                let ms = remaining.as_micros().div_ceil(1000);
                ms.min(libc::c_int::MAX as u128) as libc::c_int
            }
        };

        let mut pfd = libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        };

        // SAFETY: `pfd` is a valid, writable pollfd and we pass a count of 1.
        let rc = unsafe { libc::poll(&mut pfd, 1, wait_ms) };

        if rc < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == ErrorKind::Interrupted {
                continue;
            }
            return Err(err.into());
        }

        if rc == 0 {
            return Ok(false);
        }

        if pfd.revents & libc::POLLNVAL != 0 {
            return Err(std::io::Error::from_raw_os_error(libc::EBADF).into());
        }

        return Ok(pfd.revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0);
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn empty_pipe_is_not_readable() {
        let duplex = crate::pipe().unwrap();
        let fd = duplex.read.raw_fd().unwrap();
        assert!(!poll_readable(fd, Some(Duration::ZERO)).unwrap());
    }

    #[test]
    fn written_pipe_is_readable() {
        let duplex = crate::pipe().unwrap();
        (&duplex.write).write_all(b"x").unwrap();
        let fd = duplex.read.raw_fd().unwrap();
        assert!(poll_readable(fd, Some(Duration::ZERO)).unwrap());
    }

    #[test]
    fn hung_up_pipe_is_readable() {
        let duplex = crate::pipe().unwrap();
        let fd = duplex.read.raw_fd().unwrap();
        drop(duplex.write);
        assert!(poll_readable(fd, Some(Duration::ZERO)).unwrap());
    }

    #[test]
    fn timeout_elapses() {
        let duplex = crate::pipe().unwrap();
        let fd = duplex.read.raw_fd().unwrap();
        let started = Instant::now();
        assert!(!poll_readable(fd, Some(Duration::from_millis(20))).unwrap());
        assert!(started.elapsed() >= Duration::from_millis(15));
    }
}
