//! Embedded HTTP(S) server subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (accept loop, TLS handshake, hyper HTTP/1.1, one request)
//!     → request.rs (path + decoded parameters)
//!     → RequestHandler (the reverse proxy, or a test stub)
//!     → response.rs (status, content type, body)
//!     → Send to client, close
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{HandlerRequest, Params};
pub use response::Reply;
pub use server::{start, EmbeddedServer, RequestHandler, ServerError};
