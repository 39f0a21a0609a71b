//! Engine Access Module
//!
//! Everything the proxy needs to reach an engine instance.
//!
//! ## Submodules
//! - **`types`**: Targets, data-engine selection, and the engine's method catalogue.
//! - **`connection`**: The connection/connector seam and its HTTP implementation.
//! - **`registry`**: Per-address pool of warm connections with single-flight dialing.
//! - **`router`**: Forwarding with one redial-and-retry on transport failure.

pub mod connection;
pub mod registry;
pub mod router;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;
