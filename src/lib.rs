//! GameStream relay library.
//!
//! A man-in-the-middle relay that presents itself to streaming clients as
//! the streaming host, forwards control requests to the real host over mutual
//! TLS (rewriting `/serverinfo` on the way back), and tunnels the raw TCP and
//! UDP media ports.

// Core subsystems
pub mod host;
pub mod http;
pub mod identity;
pub mod net;
pub mod proxy;
pub mod relay;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod pairing;

pub use config::RelayConfig;
pub use host::{HostClient, HostError};
pub use http::EmbeddedServer;
pub use identity::{Identity, IdentityStore};
pub use proxy::ProxyHandler;
