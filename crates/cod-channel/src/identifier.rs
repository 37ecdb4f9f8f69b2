use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

/// How to reach a transport from somewhere else.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Endpoint {
    /// Anonymous pipe; the descriptors are valid in the creating process and
    /// in every process that inherited them.
    Pipe { read_fd: i32, write_fd: i32 },
    /// TCP connection to `peer`. The descriptors are valid in the process
    /// that opened or accepted it and in every process that inherited them.
    Tcp {
        read_fd: i32,
        write_fd: i32,
        peer: SocketAddr,
    },
    /// In-memory pipe; only reachable from the creating context.
    Memory,
}

/// Serializable token naming a channel's transport.
///
/// Sending an identifier as a message lets the receiver rebuild a channel on
/// the same transport with [`Context::resolve`](crate::Context::resolve).
/// An identifier owns nothing; it does not keep the transport open.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identifier {
    /// Nonce of the [`Context`](crate::Context) that created the transport.
    pub context: u64,
    /// Transport key within that context.
    pub key: u64,
    /// Process that produced this identifier.
    pub pid: u32,
    pub endpoint: Endpoint,
}

impl Identifier {
    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match self.endpoint {
            Endpoint::Pipe { .. } => "pipe",
            Endpoint::Tcp { .. } => "tcp",
            Endpoint::Memory => "memory",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_shape_is_tagged() {
        let id = Identifier {
            context: 1,
            key: 2,
            pid: 3,
            endpoint: Endpoint::Pipe {
                read_fd: 4,
                write_fd: 5,
            },
        };
        let json = serde_json::to_value(&id).unwrap();
        assert_eq!(json["endpoint"]["kind"], "pipe");
        assert_eq!(json["endpoint"]["write_fd"], 5);

        let back: Identifier = serde_json::from_value(json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn tcp_endpoint_keeps_address() {
        let id = Identifier {
            context: 9,
            key: 1,
            pid: 1,
            endpoint: Endpoint::Tcp {
                read_fd: 7,
                write_fd: 8,
                peer: "127.0.0.1:11300".parse().unwrap(),
            },
        };
        let text = serde_json::to_string(&id).unwrap();
        assert!(text.contains("127.0.0.1:11300"));
        assert!(text.contains(r#""write_fd":8"#));
        assert_eq!(id.transport_name(), "tcp");
    }
}
