//! Logging setup shared by the socially binaries.
//!
//! Human-readable output for terminals, JSON for log shippers; both honour
//! `RUST_LOG` before the configured level.

pub mod logging;
