//! Direction-dedicated message channels over raw byte transports.
//!
//! A [`Channel`] pairs a transport with a [`Serializer`] and exposes
//! `put`/`get`. The first operation on an instance dedicates it to that
//! direction for good; the other side of the transport is released right
//! away so that peers observe end-of-stream once every writer is gone.
//!
//! Channels are created through a [`Context`], which also turns an
//! [`Identifier`] (itself sendable as a message) back into a working channel.

pub mod channel;
pub mod context;
pub mod error;
pub mod identifier;
mod reader;
pub mod serializer;
mod writer;

pub use channel::{Channel, ChannelConfig, Direction, State};
pub use context::Context;
pub use error::{ChannelError, CodecError, ProtocolError, Result, SerializationError};
pub use identifier::{Endpoint, Identifier};
pub use serializer::{JsonSerializer, Serializer, DEFAULT_MAX_MESSAGE, HEADER_SIZE, MAGIC};
