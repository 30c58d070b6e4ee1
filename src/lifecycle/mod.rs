//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Resolve host → Bind primary ports (or side-by-side) → Spawn servers and relays
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → abort every task and exit
//! ```
//!
//! # Design Decisions
//! - Fail fast: any startup error other than a taken port is fatal
//! - No connection drain on shutdown

pub mod signals;
pub mod startup;

pub use startup::{launch, resolve, Launched, PortMode, StartupError};
