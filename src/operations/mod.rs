//! Long-running Operation Tracking
//!
//! Engine operations such as backups, restores, snapshot purge/clone/hash and
//! replica rebuilds run in the background on the engine. The proxy records
//! each of them under a stable key and keeps a per-replica status map fresh by
//! polling, so `*Status` calls never have to reach the engine.
//!
//! ## Submodules
//! - **`types`**: Keys, kinds, replica states and the `ReplicaProgress` payload trait.
//! - **`status`**: The concrete status payload of each operation kind.
//! - **`tracker`**: Generic begin/report/query/finish store.
//! - **`aggregator`**: Map-shaped views and the sticky-terminal update rule.
//! - **`poller`**: Per-replica background status queries.

pub mod aggregator;
pub mod poller;
pub mod status;
pub mod tracker;
pub mod types;

#[cfg(test)]
mod tests;
