//! Proxy Façade and HTTP Surface
//!
//! ## Submodules
//! - **`protocol`**: Request and response messages of every RPC.
//! - **`service`**: `ProxyService`, which classifies each RPC and drives the
//!   router and the operation trackers.
//! - **`handlers`**: Axum handlers and the `/v1/proxy/<Rpc>` router.

pub mod handlers;
pub mod protocol;
pub mod service;
