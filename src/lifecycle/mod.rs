//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Load wallet → Assemble dispatcher → Warm up → Start listener
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Cancel inclusion waits → Drain → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
