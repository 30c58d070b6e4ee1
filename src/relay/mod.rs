//! Raw stream relays for the media and control ports.
//!
//! # Data Flow
//! ```text
//! TCP:  client ──accept──→ tcp.rs ──connect (5s)──→ host
//!       two pumps (client→host, host→client), 1500-byte reads, either end closes both
//!
//! UDP:  datagram from host   ──→ udp.rs ──→ last learned client (or dropped)
//!       datagram from anyone else ──→ learned as client ──→ host
//! ```
//!
//! # Design Decisions
//! - Relays run until process exit; there is no drain
//! - Payloads are never inspected or rewritten
//! - UDP remembers a single client per port; a new sender takes over the session

pub mod tcp;
pub mod udp;

use std::io;
use std::net::SocketAddr;
use thiserror::Error;

use crate::net::ListenerError;

pub use tcp::TcpRelay;
pub use udp::{Route, UdpRelay, UdpSession};

/// Size of every relay read buffer.
pub const BUFFER_SIZE: usize = 1500;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("failed to bind UDP {addr}: {source}")]
    UdpBind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("failed to read local address: {0}")]
    LocalAddr(#[source] io::Error),

    #[error("UDP relay on port {port} failed: {source}")]
    Socket {
        port: u16,
        #[source]
        source: io::Error,
    },
}

impl RelayError {
    pub fn is_addr_in_use(&self) -> bool {
        match self {
            RelayError::Listener(e) => e.is_addr_in_use(),
            RelayError::UdpBind { source, .. } => source.kind() == io::ErrorKind::AddrInUse,
            _ => false,
        }
    }
}
