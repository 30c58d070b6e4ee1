//! HTTPS reverse proxy toward the real host.
//!
//! # Data Flow
//! ```text
//! HandlerRequest (from the embedded server)
//!     → handler.rs (categorize by path prefix, rebuild path?query)
//!     → HostClient::forward_text / forward_bytes (mutual TLS, no read timeout)
//!     → rewrite.rs (serverinfo only: LocalIP, ExternalIP, hostname, uniqueid)
//!     → Reply (or an error reply; a failed forward never reaches the server loop)
//! ```

pub mod handler;
pub mod rewrite;

pub use handler::{Category, ProxyHandler};
pub use rewrite::ReportedAddresses;
