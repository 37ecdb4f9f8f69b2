//! Raw duplex byte streams underneath cod channels.
//!
//! Provides one handle type over the supported transports:
//! - Anonymous OS pipes (Unix), inheritable across `fork`
//! - TCP sockets, likewise reattachable by descriptor on Unix
//! - An in-memory pipe used as a test double
//!
//! This is the lowest layer of cod. Every transport is handed out as a
//! [`Duplex`]: a read-side and a write-side [`Stream`] that can be released
//! independently of each other.

pub mod error;
#[cfg(unix)]
mod fd;
pub mod memory;
#[cfg(unix)]
pub mod pipe;
pub mod stream;
pub mod tcp;

#[cfg(unix)]
mod poll;

pub use error::{Result, TransportError};
pub use memory::memory_pipe;
#[cfg(unix)]
pub use pipe::{pipe, reattach};
pub use stream::{Duplex, Stream, StreamKind};
#[cfg(unix)]
pub use tcp::reattach_tcp;
pub use tcp::{connect, TcpAcceptor};
