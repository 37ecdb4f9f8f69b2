use std::net::ToSocketAddrs;

use bytes::Bytes;
use cod_channel::{Channel, Context, Identifier};
use tracing::{debug, warn};

use crate::codec::BeanstalkCodec;
use crate::command::Command;
use crate::error::{BeanstalkError, Result};
use crate::table;

/// A reserved job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: u64,
    pub body: Bytes,
}

/// Request/reply conversation with a beanstalkd server.
///
/// Wraps one TCP channel split into a reader and a writer, both carrying
/// [`BeanstalkCodec`]. Replies are matched to requests by order.
pub struct Client {
    reader: Channel<BeanstalkCodec>,
    writer: Channel<BeanstalkCodec>,
}

impl Client {
    /// Connect to a server.
    pub fn connect(ctx: &Context, addr: impl ToSocketAddrs + std::fmt::Debug) -> Result<Self> {
        Self::connect_with_codec(ctx, addr, BeanstalkCodec::default())
    }

    /// Connect with explicit codec limits.
    pub fn connect_with_codec(
        ctx: &Context,
        addr: impl ToSocketAddrs + std::fmt::Debug,
        codec: BeanstalkCodec,
    ) -> Result<Self> {
        let channel = ctx.connect(addr, codec)?;
        Self::from_channel(channel)
    }

    /// Run the conversation over an existing undedicated channel.
    pub fn from_channel(channel: Channel<BeanstalkCodec>) -> Result<Self> {
        let (reader, writer) = channel.split()?;
        debug!(key = reader.identifier().key, "beanstalk client ready");
        Ok(Self { reader, writer })
    }

    /// Send `command` and wait for its reply.
    ///
    /// Error replies (`BAD_FORMAT`, `UNKNOWN_COMMAND`, ...) are returned as
    /// replies like any other; the typed helpers below turn them into errors.
    pub fn interact(&mut self, command: &Command) -> Result<Command> {
        self.writer.put(command)?;
        let reply = self.reader.get()?;
        debug!(command = %command.keyword, reply = %reply.keyword, "beanstalk round trip");
        Ok(reply)
    }

    /// Select the tube `put` stores jobs in.
    pub fn use_tube(&mut self, tube: &str) -> Result<()> {
        let command = Command::new("use").arg(tube);
        let reply = self.interact(&command)?;
        expect(&command, &reply, &["USING"]).map(drop)
    }

    /// Add `tube` to the watch list; returns the number of watched tubes.
    pub fn watch(&mut self, tube: &str) -> Result<u64> {
        let command = Command::new("watch").arg(tube);
        let reply = self.interact(&command)?;
        expect(&command, &reply, &["WATCHING"])?;
        number(&command, &reply)
    }

    /// Store a job and return its id.
    ///
    /// A job the server buried for lack of memory still has an id, so
    /// `BURIED` counts as success.
    pub fn put(&mut self, pri: u32, delay: u32, ttr: u32, data: impl Into<Bytes>) -> Result<u64> {
        let command = Command::put(pri, delay, ttr, data);
        let reply = self.interact(&command)?;
        match reply.keyword.as_str() {
            "INSERTED" => number(&command, &reply),
            "BURIED" => {
                warn!("job was buried on insert");
                number(&command, &reply)
            }
            _ => Err(unexpected(&command, &reply)),
        }
    }

    /// Wait for a job on the watched tubes.
    pub fn reserve(&mut self) -> Result<Job> {
        let command = Command::new("reserve");
        let reply = self.interact(&command)?;
        job(&command, reply)
    }

    /// Wait at most `timeout_secs` for a job; `None` on `TIMED_OUT`.
    pub fn reserve_with_timeout(&mut self, timeout_secs: u32) -> Result<Option<Job>> {
        let command = Command::new("reserve-with-timeout").arg(timeout_secs);
        let reply = self.interact(&command)?;
        if reply.is("TIMED_OUT") {
            return Ok(None);
        }
        job(&command, reply).map(Some)
    }

    /// Delete a job; `false` if the server did not know it.
    pub fn delete(&mut self, id: u64) -> Result<bool> {
        let command = Command::new("delete").arg(id);
        let reply = self.interact(&command)?;
        expect(&command, &reply, &["DELETED", "NOT_FOUND"]).map(|keyword| keyword == "DELETED")
    }

    /// Identifier of the underlying TCP channel.
    pub fn identifier(&self) -> Identifier {
        self.writer.identifier()
    }

    /// Say goodbye and close the connection.
    pub fn quit(mut self) -> Result<()> {
        self.writer.put(&Command::new("quit"))?;
        self.writer.close();
        self.reader.close();
        debug!("beanstalk client closed");
        Ok(())
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("reader", &self.reader)
            .field("writer", &self.writer)
            .finish()
    }
}

fn unexpected(command: &Command, reply: &Command) -> BeanstalkError {
    BeanstalkError::UnexpectedReply {
        command: command.keyword.clone(),
        reply: reply.to_string(),
    }
}

fn expect<'a>(command: &Command, reply: &'a Command, allowed: &[&str]) -> Result<&'a str> {
    if allowed.contains(&reply.keyword.as_str()) {
        return Ok(&reply.keyword);
    }
    if table::is_error_reply(&reply.keyword) {
        warn!(command = %command.keyword, reply = %reply.keyword, "server rejected command");
    }
    Err(unexpected(command, reply))
}

fn number(command: &Command, reply: &Command) -> Result<u64> {
    reply.number(0).ok_or_else(|| unexpected(command, reply))
}

fn job(command: &Command, reply: Command) -> Result<Job> {
    expect(command, &reply, &["RESERVED"])?;
    let id = number(command, &reply)?;
    let body = reply.body.clone().unwrap_or_default();
    Ok(Job { id, body })
}
