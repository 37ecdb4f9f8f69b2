//! Descriptor checks shared by pipe and TCP reattachment.

use std::os::fd::{FromRawFd, OwnedFd, RawFd};

use crate::error::{Result, TransportError};

/// What a descriptor refers to, as far as reattachment cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FdInfo {
    pub(crate) fifo: bool,
    pub(crate) socket: bool,
    pub(crate) dev: u64,
    pub(crate) ino: u64,
    pub(crate) readable: bool,
    pub(crate) writable: bool,
}

pub(crate) fn inspect(fd: RawFd) -> Result<FdInfo> {
    // SAFETY: `stat` is plain old data; zeroed is a valid bit pattern.
    let mut st: libc::stat = unsafe { std::mem::zeroed() };
    // SAFETY: `st` is a valid out-pointer; a bad `fd` is reported via the
    // return value.
    let rc = unsafe { libc::fstat(fd, &mut st) };
    if rc != 0 {
        return Err(os_error(fd));
    }

    // SAFETY: F_GETFL only reads descriptor status flags.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(os_error(fd));
    }
    let mode = flags & libc::O_ACCMODE;
    let file_type = st.st_mode & libc::S_IFMT;

    Ok(FdInfo {
        fifo: file_type == libc::S_IFIFO,
        socket: file_type == libc::S_IFSOCK,
        dev: st.st_dev as u64,
        ino: st.st_ino as u64,
        readable: mode == libc::O_RDONLY || mode == libc::O_RDWR,
        writable: mode == libc::O_WRONLY || mode == libc::O_RDWR,
    })
}

/// Duplicate `fd` into a new close-on-exec descriptor.
pub(crate) fn dup(fd: RawFd) -> Result<OwnedFd> {
    // SAFETY: F_DUPFD_CLOEXEC only reads `fd`; an invalid descriptor is
    // reported through the return value.
    let dup = unsafe { libc::fcntl(fd, libc::F_DUPFD_CLOEXEC, 0) };
    if dup < 0 {
        return Err(os_error(fd));
    }

    // SAFETY: `dup` is a freshly created descriptor owned by nobody else.
    Ok(unsafe { OwnedFd::from_raw_fd(dup) })
}

pub(crate) fn mismatch(fd: RawFd, expected: impl Into<String>) -> TransportError {
    TransportError::Mismatch {
        fd,
        expected: expected.into(),
    }
}

fn os_error(fd: RawFd) -> TransportError {
    let err = std::io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::EBADF) {
        TransportError::StaleHandle { fd }
    } else {
        TransportError::Io(err)
    }
}
