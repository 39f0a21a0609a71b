//! Engine Proxy Library
//!
//! A proxy between a storage-cluster control plane and the per-volume engine
//! processes. It routes each call to the engine named in the request, reusing
//! one connection per engine address, and tracks the engines' long-running
//! operations so their status can be polled without reaching the engine.
//!
//! ## Architecture Modules
//!
//! - **`engine`**: Connections to engine processes. A registry that dials each
//!   address once and redials after a transport failure, and a router that
//!   forwards one call with a timeout and a single retry.
//! - **`operations`**: The generic operation tracker, per-kind status payloads,
//!   the status aggregator and the per-replica pollers.
//! - **`proxy`**: The `ProxyService` façade implementing every RPC and the
//!   axum HTTP surface in front of it.
//! - **`config`**: Runtime configuration.
//! - **`error`**: The error taxonomy and its HTTP mapping.

pub mod config;
pub mod engine;
pub mod error;
pub mod operations;
pub mod proxy;
