//! Uniform put/get channels over pipes, TCP and beanstalkd.
//!
//! cod gives every transport the same two verbs: `put` an object in,
//! `get` it out on the other side. The first verb used on a channel
//! instance dedicates it to that direction; duplicate the channel (or fork)
//! to talk both ways.
//!
//! # Crate Structure
//!
//! - [`transport`]: raw byte streams (anonymous pipes, TCP, in-memory)
//! - [`channel`]: serializers, the `Channel` state machine, `Context`
//! - [`beanstalk`]: beanstalkd protocol codec and client
//!
//! ```no_run
//! use cod::channel::{Context, JsonSerializer};
//!
//! # fn main() -> cod::channel::Result<()> {
//! let ctx = Context::new();
//! let (mut rx, mut tx) = ctx.pipe(JsonSerializer::<String>::new())?.split()?;
//! tx.put(&"hello".to_string())?;
//! assert_eq!(rx.get()?, "hello");
//! # Ok(())
//! # }
//! ```

/// Re-export transport types.
pub mod transport {
    pub use cod_transport::*;
}

/// Re-export channel types.
pub mod channel {
    pub use cod_channel::*;
}

/// Re-export beanstalkd protocol types.
pub mod beanstalk {
    pub use cod_beanstalk::*;
}

pub use cod_channel::{Channel, ChannelError, Context, Identifier, JsonSerializer, Serializer};
