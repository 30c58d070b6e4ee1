//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, optional connection limit)
//!     → tls.rs (optional TLS handshake with the server identity)
//!     → connection.rs (ID + active-connection accounting)
//!     → Hand off to the HTTP server or a TCP relay
//!
//! Outgoing request to the host
//!     → tls.rs (client identity + trust policy)
//! ```
//!
//! # Design Decisions
//! - Connection limit is optional; unlimited by default
//! - Each connection gets an ID that appears in every log line about it
//! - TLS is optional and handled transparently

pub mod connection;
pub mod listener;
pub mod tls;

pub use listener::{Listener, ListenerError};
pub use tls::{is_certificate_error, TlsError, TrustPolicy};
