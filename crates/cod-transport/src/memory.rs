//! In-memory pipe with the same blocking and end-of-stream behaviour as an OS
//! pipe. Used to exercise channels without touching the kernel.

use std::collections::VecDeque;
use std::io::ErrorKind;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

use crate::stream::{Duplex, Stream};

#[derive(Debug, Default)]
struct State {
    buf: VecDeque<u8>,
    readers: usize,
    writers: usize,
}

#[derive(Debug, Default)]
pub(crate) struct Shared {
    state: Mutex<State>,
    ready: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        // A panic while holding the lock cannot leave the byte queue in a
        // half-updated state, so recover the guard.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// One end of an in-memory pipe.
#[derive(Debug)]
pub(crate) enum MemoryEnd {
    Reader(Arc<Shared>),
    Writer(Arc<Shared>),
}

impl MemoryEnd {
    pub(crate) fn read(&self, buf: &mut [u8]) -> std::io::Result<usize> {
        let shared = match self {
            MemoryEnd::Reader(shared) => shared,
            MemoryEnd::Writer(_) => {
                return Err(std::io::Error::new(
                    ErrorKind::Unsupported,
                    "cannot read from the write end of a memory pipe",
                ))
            }
        };

        let mut state = shared.lock();
        while state.buf.is_empty() && state.writers > 0 {
            state = shared.ready.wait(state).unwrap_or_else(|e| e.into_inner());
        }

        let n = buf.len().min(state.buf.len());
        for (slot, byte) in buf.iter_mut().zip(state.buf.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    pub(crate) fn write(&self, buf: &[u8]) -> std::io::Result<usize> {
        let shared = match self {
            MemoryEnd::Writer(shared) => shared,
            MemoryEnd::Reader(_) => {
                return Err(std::io::Error::new(
                    ErrorKind::Unsupported,
                    "cannot write to the read end of a memory pipe",
                ));
            }
        };

        let mut state = shared.lock();
        if state.readers == 0 {
            return Err(std::io::Error::from(ErrorKind::BrokenPipe));
        }
        state.buf.extend(buf);
        shared.ready.notify_all();
        Ok(buf.len())
    }

    pub(crate) fn poll_readable(&self, timeout: Option<Duration>) -> bool {
        let shared = match self {
            MemoryEnd::Reader(shared) => shared,
            MemoryEnd::Writer(_) => return false,
        };

        let state = shared.lock();
        let not_ready = |s: &mut State| s.buf.is_empty() && s.writers > 0;

        let state = match timeout {
            None => shared
                .ready
                .wait_while(state, not_ready)
                .unwrap_or_else(|e| e.into_inner()),
            Some(timeout) => {
                shared
                    .ready
                    .wait_timeout_while(state, timeout, not_ready)
                    .unwrap_or_else(|e| e.into_inner())
                    .0
            }
        };

        !state.buf.is_empty() || state.writers == 0
    }
}

impl Drop for MemoryEnd {
    fn drop(&mut self) {
        match self {
            MemoryEnd::Reader(shared) => {
                let mut state = shared.lock();
                state.readers -= 1;
                state.buf.clear();
            }
            MemoryEnd::Writer(shared) => {
                let mut state = shared.lock();
                state.writers -= 1;
                shared.ready.notify_all();
            }
        }
    }
}

/// Create an in-memory pipe.
///
/// The read side reports end-of-stream once the write side has been dropped
/// and the buffered bytes are consumed, exactly like an OS pipe.
pub fn memory_pipe() -> Duplex {
    let shared = Arc::new(Shared::default());
    {
        let mut state = shared.lock();
        state.readers = 1;
        state.writers = 1;
    }

    Duplex {
        read: Stream::from_memory(MemoryEnd::Reader(Arc::clone(&shared))),
        write: Stream::from_memory(MemoryEnd::Writer(shared)),
    }
}
