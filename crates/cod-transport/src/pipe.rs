use std::fs::File;
use std::os::fd::{FromRawFd, OwnedFd, RawFd};

use tracing::debug;

use crate::error::{Result, TransportError};
use crate::fd;
use crate::stream::{Duplex, Stream};

/// Create an anonymous pipe.
///
/// Both descriptors are marked close-on-exec. They are still inherited by a
/// forked child, which is how pipes are shared between processes.
pub fn pipe() -> Result<Duplex> {
    let fds = open_pipe().map_err(TransportError::Pipe)?;

    // SAFETY: the pipe call succeeded, so both descriptors are open and owned
    // by us.
    let (read, write) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };

    debug!(read_fd = fds[0], write_fd = fds[1], "created pipe");

    Ok(Duplex {
        read: Stream::from_pipe(File::from(read)),
        write: Stream::from_pipe(File::from(write)),
    })
}

/// Reattach to a pipe through descriptors this process already holds.
///
/// Used after `fork` (or any other form of descriptor inheritance): the
/// descriptors are duplicated, so the returned streams own fresh handles that
/// close independently of the originals.
///
/// Both descriptors must be the two ends of one pipe, `read_fd` open for
/// reading and `write_fd` for writing. Anything else (a closed number, a
/// number reused for a file or socket, ends of two different pipes) is
/// rejected before a handle is created.
pub fn reattach(read_fd: RawFd, write_fd: RawFd) -> Result<Duplex> {
    let read_info = fd::inspect(read_fd)?;
    let write_info = fd::inspect(write_fd)?;

    if !read_info.fifo || !read_info.readable {
        return Err(fd::mismatch(read_fd, "the read end of a pipe"));
    }
    if !write_info.fifo || !write_info.writable {
        return Err(fd::mismatch(write_fd, "the write end of a pipe"));
    }
    if (read_info.dev, read_info.ino) != (write_info.dev, write_info.ino) {
        return Err(fd::mismatch(
            write_fd,
            format!("the write end of the pipe read through descriptor {read_fd}"),
        ));
    }

    let read = fd::dup(read_fd)?;
    let write = fd::dup(write_fd)?;

    debug!(read_fd, write_fd, "reattached to inherited pipe");

    Ok(Duplex {
        read: Stream::from_pipe(File::from(read)),
        write: Stream::from_pipe(File::from(write)),
    })
}

#[cfg(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly",
    target_os = "illumos",
))]
fn open_pipe() -> std::io::Result<[libc::c_int; 2]> {
    let mut fds: [libc::c_int; 2] = [-1, -1];

    // SAFETY: `fds` is a valid, writable array of two descriptors.
    let rc = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(fds)
}

// No pipe2 here: a fork+exec racing between the two calls can leak the
// descriptors into the exec'd image.
#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly",
    target_os = "illumos",
)))]
fn open_pipe() -> std::io::Result<[libc::c_int; 2]> {
    let mut fds: [libc::c_int; 2] = [-1, -1];

    // SAFETY: `fds` is a valid, writable array of two descriptors.
    let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error());
    }
    for fd in fds {
        if let Err(err) = set_cloexec(fd) {
            // SAFETY: both descriptors were just created and are not shared.
            unsafe {
                libc::close(fds[0]);
                libc::close(fds[1]);
            }
            return Err(err);
        }
    }
    Ok(fds)
}

#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly",
    target_os = "illumos",
)))]
fn set_cloexec(fd: RawFd) -> std::io::Result<()> {
    // SAFETY: `fd` is an open descriptor owned by the caller.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
    if flags < 0 {
        return Err(std::io::Error::last_os_error());
    }
    // SAFETY: as above; only descriptor flags are modified.
    let rc = unsafe { libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC) };
    if rc < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}
