use std::collections::hash_map::RandomState;
use std::collections::HashMap;
use std::hash::{BuildHasher, Hasher};
use std::net::ToSocketAddrs;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use cod_transport::{Duplex, Stream, TcpAcceptor};
use tracing::debug;

use crate::channel::{Channel, ChannelConfig};
use crate::error::{ChannelError, Result};
use crate::identifier::{Endpoint, Identifier};
use crate::serializer::Serializer;

/// Weak view of a transport's two sides, used to reattach without keeping
/// the transport alive.
struct Entry {
    read: Weak<Stream>,
    write: Weak<Stream>,
}

impl Entry {
    fn is_dead(&self) -> bool {
        self.read.strong_count() == 0 && self.write.strong_count() == 0
    }
}

/// Factory for channels; create one per process and pass it to whoever
/// opens or resolves channels.
///
/// The context remembers every transport it opened (weakly), so an
/// [`Identifier`] produced by one of its channels resolves to a channel
/// sharing the very same handles. A forked child inherits a copy of the
/// context together with the descriptors it refers to.
pub struct Context {
    nonce: u64,
    next_key: AtomicU64,
    registry: Mutex<HashMap<u64, Entry>>,
    config: ChannelConfig,
}

impl Context {
    pub fn new() -> Self {
        Self::with_config(ChannelConfig::default())
    }

    /// A context whose channels all use `config`.
    pub fn with_config(config: ChannelConfig) -> Self {
        Self {
            nonce: fresh_nonce(),
            next_key: AtomicU64::new(1),
            registry: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Open an anonymous pipe.
    #[cfg(unix)]
    pub fn pipe<S: Serializer>(&self, serializer: S) -> Result<Channel<S>> {
        let duplex = cod_transport::pipe()?;
        let (read_fd, write_fd) = descriptors(&duplex);
        let endpoint = Endpoint::Pipe { read_fd, write_fd };
        Ok(self.register(duplex, endpoint, serializer))
    }

    /// Open an in-memory pipe (test double for an OS pipe).
    pub fn memory<S: Serializer>(&self, serializer: S) -> Channel<S> {
        self.register(cod_transport::memory_pipe(), Endpoint::Memory, serializer)
    }

    /// Connect to a TCP listener.
    pub fn connect<S: Serializer>(
        &self,
        addr: impl ToSocketAddrs + std::fmt::Debug,
        serializer: S,
    ) -> Result<Channel<S>> {
        let duplex = cod_transport::connect(addr)?;
        self.tcp_channel(duplex, serializer)
    }

    /// Accept the next connection on `acceptor`.
    pub fn accept<S: Serializer>(
        &self,
        acceptor: &TcpAcceptor,
        serializer: S,
    ) -> Result<Channel<S>> {
        let duplex = acceptor.accept()?;
        self.tcp_channel(duplex, serializer)
    }

    /// Build a new undedicated channel on the transport `identifier` names.
    ///
    /// Identifiers from this context resolve to the same handles its live
    /// channels hold. Identifiers from elsewhere reattach by descriptor: pipe
    /// and TCP descriptors inherited by this process are checked against the
    /// recorded endpoint and duplicated. No new connection is ever opened, so
    /// the result always shares the named transport.
    pub fn resolve<S: Serializer>(
        &self,
        identifier: &Identifier,
        serializer: S,
    ) -> Result<Channel<S>> {
        if identifier.context == self.nonce {
            let (read, write) = {
                let registry = self.registry();
                let entry = registry
                    .get(&identifier.key)
                    .ok_or(ChannelError::Unresolvable {
                        key: identifier.key,
                        reason: "unknown transport key",
                    })?;
                (entry.read.upgrade(), entry.write.upgrade())
            };

            if read.is_none() && write.is_none() {
                return Err(ChannelError::Unresolvable {
                    key: identifier.key,
                    reason: "transport already released",
                });
            }

            debug!(key = identifier.key, "resolved identifier locally");
            let mut local = identifier.clone();
            local.pid = std::process::id();
            return Ok(Channel::from_parts(
                read,
                write,
                local,
                serializer,
                self.config.clone(),
            ));
        }

        match &identifier.endpoint {
            #[cfg(unix)]
            Endpoint::Pipe { read_fd, write_fd } => {
                let duplex = cod_transport::reattach(*read_fd, *write_fd)?;
                debug!(key = identifier.key, "resolved pipe identifier by descriptor");
                let (read_fd, write_fd) = descriptors(&duplex);
                let endpoint = Endpoint::Pipe { read_fd, write_fd };
                Ok(self.register(duplex, endpoint, serializer))
            }
            #[cfg(not(unix))]
            Endpoint::Pipe { .. } => Err(ChannelError::Unresolvable {
                key: identifier.key,
                reason: "pipes require a unix platform",
            }),
            #[cfg(unix)]
            Endpoint::Tcp {
                read_fd,
                write_fd,
                peer,
            } => {
                let duplex = cod_transport::reattach_tcp(*read_fd, *write_fd, *peer)?;
                debug!(key = identifier.key, %peer, "resolved tcp identifier by descriptor");
                self.tcp_channel(duplex, serializer)
            }
            #[cfg(not(unix))]
            Endpoint::Tcp { .. } => Err(ChannelError::Unresolvable {
                key: identifier.key,
                reason: "descriptor reattachment requires a unix platform",
            }),
            Endpoint::Memory => Err(ChannelError::Unresolvable {
                key: identifier.key,
                reason: "memory transports are local to their context",
            }),
        }
    }

    /// Number of transports with at least one side still open.
    pub fn live_transports(&self) -> usize {
        self.registry().values().filter(|e| !e.is_dead()).count()
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    fn tcp_channel<S: Serializer>(&self, duplex: Duplex, serializer: S) -> Result<Channel<S>> {
        let peer = duplex.read.peer_addr().ok_or_else(|| {
            ChannelError::from(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "tcp stream has no peer address",
            ))
        })?;
        let (read_fd, write_fd) = descriptors(&duplex);
        let endpoint = Endpoint::Tcp {
            read_fd,
            write_fd,
            peer,
        };
        Ok(self.register(duplex, endpoint, serializer))
    }

    fn register<S: Serializer>(
        &self,
        duplex: Duplex,
        endpoint: Endpoint,
        serializer: S,
    ) -> Channel<S> {
        let key = self.next_key.fetch_add(1, Ordering::Relaxed);
        let read = Arc::new(duplex.read);
        let write = Arc::new(duplex.write);

        {
            let mut registry = self.registry();
            registry.retain(|_, entry| !entry.is_dead());
            registry.insert(
                key,
                Entry {
                    read: Arc::downgrade(&read),
                    write: Arc::downgrade(&write),
                },
            );
        }

        let identifier = Identifier {
            context: self.nonce,
            key,
            pid: std::process::id(),
            endpoint,
        };
        debug!(key, transport = identifier.transport_name(), "channel opened");

        Channel::from_parts(
            Some(read),
            Some(write),
            identifier,
            serializer,
            self.config.clone(),
        )
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<u64, Entry>> {
        // Entries are plain weak pointers; a poisoned map is still consistent.
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("nonce", &format_args!("{:#018x}", self.nonce))
            .field("live_transports", &self.live_transports())
            .finish()
    }
}

fn descriptors(duplex: &Duplex) -> (i32, i32) {
    (
        duplex.read.raw_fd().unwrap_or(-1),
        duplex.write.raw_fd().unwrap_or(-1),
    )
}

fn fresh_nonce() -> u64 {
    // RandomState is seeded per instance, which is all the uniqueness needed
    // to tell contexts apart.
    let mut hasher = RandomState::new().build_hasher();
    hasher.write_u32(std::process::id());
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serializer::JsonSerializer;

    #[test]
    fn contexts_get_distinct_nonces() {
        let a = Context::new();
        let b = Context::new();
        assert_ne!(a.nonce, b.nonce);
    }

    #[test]
    fn resolve_shares_local_transport() {
        let ctx = Context::new();
        let mut writer = ctx.memory(JsonSerializer::<u32>::new());
        let mut reader = ctx
            .resolve(&writer.identifier(), JsonSerializer::<u32>::new())
            .unwrap();

        writer.put(&42).unwrap();
        assert_eq!(reader.get().unwrap(), 42);
    }

    #[test]
    fn resolve_after_release_fails() {
        let ctx = Context::new();
        let mut chan = ctx.memory(JsonSerializer::<u32>::new());
        let id = chan.identifier();
        chan.close();

        let err = ctx.resolve(&id, JsonSerializer::<u32>::new()).unwrap_err();
        assert!(matches!(err, ChannelError::Unresolvable { .. }));
        assert_eq!(ctx.live_transports(), 0);
    }

    #[test]
    fn resolve_with_released_side_reports_it() {
        let ctx = Context::new();
        let (reader, mut writer) = ctx.memory(JsonSerializer::<u32>::new()).split().unwrap();
        let id = writer.identifier();
        drop(reader);

        let mut resolved = ctx.resolve(&id, JsonSerializer::<u32>::new()).unwrap();
        let err = resolved.get().unwrap_err();
        assert!(matches!(
            err,
            ChannelError::Released {
                side: crate::Direction::Read
            }
        ));
        writer.close();
    }

    #[test]
    fn memory_identifier_from_other_context_is_unresolvable() {
        let a = Context::new();
        let b = Context::new();
        let chan = a.memory(JsonSerializer::<u32>::new());
        let err = b
            .resolve(&chan.identifier(), JsonSerializer::<u32>::new())
            .unwrap_err();
        assert!(matches!(err, ChannelError::Unresolvable { .. }));
    }

    #[test]
    fn unknown_key_is_unresolvable() {
        let ctx = Context::new();
        let chan = ctx.memory(JsonSerializer::<u32>::new());
        let mut id = chan.identifier();
        id.key += 100;
        let err = ctx.resolve(&id, JsonSerializer::<u32>::new()).unwrap_err();
        assert!(matches!(
            err,
            ChannelError::Unresolvable {
                reason: "unknown transport key",
                ..
            }
        ));
    }

    #[test]
    #[cfg(unix)]
    fn pipe_identifier_resolves_by_descriptor_elsewhere() {
        let a = Context::new();
        let b = Context::new();
        let mut writer = a.pipe(JsonSerializer::<String>::new()).unwrap();
        let mut reader = b
            .resolve(&writer.identifier(), JsonSerializer::<String>::new())
            .unwrap();

        writer.put(&"across contexts".to_string()).unwrap();
        assert_eq!(reader.get().unwrap(), "across contexts");
    }

    #[test]
    #[cfg(unix)]
    fn foreign_descriptors_are_not_adopted() {
        use std::os::fd::AsRawFd;

        let path = std::env::temp_dir().join(format!("cod-foreign-{}", std::process::id()));
        let file = std::fs::File::create(&path).unwrap();
        let fd = file.as_raw_fd();
        let id = Identifier {
            context: 12345,
            key: 1,
            pid: 999_999,
            endpoint: Endpoint::Pipe {
                read_fd: fd,
                write_fd: fd,
            },
        };

        let ctx = Context::new();
        let err = ctx.resolve(&id, JsonSerializer::<String>::new()).unwrap_err();
        assert!(matches!(
            err,
            ChannelError::Transport(cod_transport::TransportError::Mismatch { .. })
        ));
        assert_eq!(ctx.live_transports(), 0);

        drop(file);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    #[cfg(unix)]
    fn resolved_pipe_advertises_its_own_descriptors() {
        let a = Context::new();
        let b = Context::new();
        let original = a.pipe(JsonSerializer::<u8>::new()).unwrap();
        let resolved = b
            .resolve(&original.identifier(), JsonSerializer::<u8>::new())
            .unwrap();
        assert_ne!(resolved.identifier().endpoint, original.identifier().endpoint);
    }

    #[test]
    fn registry_prunes_dead_entries() {
        let ctx = Context::new();
        for _ in 0..4 {
            let mut chan = ctx.memory(JsonSerializer::<u8>::new());
            chan.close();
        }
        let _live = ctx.memory(JsonSerializer::<u8>::new());
        assert_eq!(ctx.live_transports(), 1);
        assert_eq!(ctx.registry().len(), 1);
    }
}
