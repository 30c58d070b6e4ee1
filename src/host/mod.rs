//! Protocol client for the real streaming host.
//!
//! # Data Flow
//! ```text
//! caller (startup pair check, reverse proxy)
//!     → client.rs (builds a fresh mutual-TLS client per request)
//!     → host HTTPS port ── certificate rejected ──→ 401 ──→ host HTTP port
//!     → xml.rs (root status check, field extraction)
//! ```
//!
//! # Design Decisions
//! - The identity is read on every request, never cached in a client
//! - 404 is its own error variant so callers can tell "missing" from "refused"
//! - Malformed data is always an error, never defaulted

pub mod client;
pub mod xml;

use thiserror::Error;

use crate::identity::IdentityError;
use crate::net::TlsError;

pub use client::{HostClient, RemoteSession};

/// Device identifier sent to the host. Shared by every relay install so one
/// relay can end a session started by another.
pub const UNIQUE_ID: &str = "0123456789ABCDEF";

/// Errors raised while talking to the host.
#[derive(Debug, Error)]
pub enum HostError {
    /// Connect, read or write failure.
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The HTTP client for a request could not be constructed.
    #[error("could not build client for {url}: {source}")]
    ClientBuild {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {url} timed out")]
    Timeout { url: String },

    /// The host answered 404.
    #[error("{url} not found on host")]
    NotFound { url: String },

    /// The host reported a non-success status, in the HTTP status line or the XML envelope.
    #[error("host returned status {code}: {message}")]
    Status { code: i32, message: String },

    #[error("malformed XML: {0}")]
    Xml(String),

    #[error("response has no <{0}> element")]
    MissingField(String),

    #[error("malformed status code {0:?}")]
    MalformedStatus(String),

    #[error("malformed server version {0:?}")]
    MalformedVersion(String),

    #[error("invalid request path {0:?}")]
    InvalidPath(String),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Tls(#[from] TlsError),
}

impl HostError {
    /// Numeric code of a status error.
    pub fn status_code(&self) -> Option<i32> {
        match self {
            HostError::Status { code, .. } => Some(*code),
            _ => None,
        }
    }
}
