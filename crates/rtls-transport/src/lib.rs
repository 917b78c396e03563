//! Transports for driving rtls sessions.
//!
//! Implements:
//! - In-memory duplex pipes with optional back-pressure (tests, loopback)
//! - TCP over tokio with an async driver for the non-blocking session API
//!
//! Sessions from `rtls-core` never block; the drivers here wait for the
//! direction the session reports and retry.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod memory;

#[cfg(feature = "tcp")]
pub mod tcp;

pub use error::{Error, Result};
pub use memory::MemoryTransport;
