//! TLS identity subsystem.
//!
//! # Data Flow
//! ```text
//! first certificate_chain()/private_key() call
//!     → store.rs (lock, load both artifacts from disk)
//!     → generate.rs (only when an artifact is missing: RSA-2048 + self-signed cert)
//!     → store.rs (persist, reload from disk)
//!     → Arc<Identity> (immutable, shared by every handshake)
//! ```
//!
//! # Design Decisions
//! - Two independent stores per process: the server identity presented to
//!   clients and the client identity presented to the real host
//! - A corrupt artifact is an error, never silently replaced
//! - Persistence failure is logged; the generated identity is still used

pub mod generate;
pub mod store;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use std::path::PathBuf;
use thiserror::Error;

pub use store::{Identity, IdentityStore};

/// Which side of the protocol an identity authenticates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityRole {
    /// Presented to streaming clients by the relay's HTTPS listener.
    Server,
    /// Presented to the real host for mutual TLS.
    Client,
}

impl IdentityRole {
    /// Common name written into generated certificates.
    pub fn common_name(&self) -> &'static str {
        match self {
            IdentityRole::Server => "NVIDIA GameStream Server",
            IdentityRole::Client => "NVIDIA GameStream Client",
        }
    }
}

/// Anything that can hand out a certificate chain and its private key.
///
/// TLS contexts are built from this capability rather than from files so
/// tests and embedders can supply identities from anywhere.
pub trait IdentityProvider: Send + Sync {
    /// Ordered certificate chain, leaf first.
    fn certificate_chain(&self) -> Result<Vec<CertificateDer<'static>>, IdentityError>;

    /// Private key matching the leaf certificate.
    fn private_key(&self) -> Result<PrivateKeyDer<'static>, IdentityError>;
}

/// Errors raised while loading or generating an identity.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// Reading an artifact failed for a reason other than absence.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The certificate file exists but does not hold usable certificates.
    #[error("unparsable certificate in {}: {reason}", path.display())]
    BadCertificate { path: PathBuf, reason: String },

    /// The key file exists but is not a PKCS#8 RSA private key.
    #[error("unparsable private key in {}: {reason}", path.display())]
    BadKey { path: PathBuf, reason: String },

    /// Key or certificate generation failed.
    #[error("identity generation failed: {0}")]
    Generate(String),
}
