//! beanstalkd wire protocol for cod channels.
//!
//! Commands and replies are [`Command`] tuples: a keyword, ordered
//! arguments and, for the few keywords that carry one, a binary body:
//! ```text
//! put 10 0 60 5\r\n        <->  Command { keyword: "put", args: [10, 0, 60], body: "hello" }
//! hello\r\n
//! INSERTED 5\r\n           <->  Command { keyword: "INSERTED", args: [5], body: None }
//! ```
//! The body length never appears in `args`; [`table`] says where it goes.
//!
//! [`BeanstalkCodec`] plugs the codec into any [`cod_channel::Channel`],
//! and [`Client`] runs a request/reply conversation over TCP.

pub mod client;
pub mod codec;
pub mod command;
pub mod error;
pub mod table;

pub use client::{Client, Job};
pub use codec::{
    decode_command, encode_command, read_command, BeanstalkCodec, CodecConfig,
    DEFAULT_MAX_BODY_SIZE, DEFAULT_MAX_LINE_LENGTH,
};
pub use command::{Arg, Command};
pub use error::{BeanstalkError, Result};
