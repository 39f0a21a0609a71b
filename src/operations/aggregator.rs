//! Status Aggregator
//!
//! Builds the per-replica maps the `*Status` RPCs return. Each replica stays
//! independently visible: the aggregator never rolls replicas up into a single
//! verdict, that is left to the control plane.

use super::tracker::OperationTracker;
use super::types::*;
use crate::engine::types::EngineTarget;
use crate::error::{ProxyError, Result};

use std::sync::Arc;

/// Update policy for one replica's entry: whether a new report may replace `current`.
///
/// Reports carry no sequence number, so a terminal entry is final: a late
/// `InProgress` (or anything else) must not replace `Complete` or `Error`.
pub fn should_replace<S: ReplicaProgress>(current: Option<&S>) -> bool {
    match current {
        Some(existing) => !existing.state().is_terminal(),
        None => true,
    }
}

pub struct StatusAggregator<S> {
    tracker: Arc<OperationTracker<S>>,
}

impl<S: ReplicaProgress> StatusAggregator<S> {
    pub fn new(tracker: Arc<OperationTracker<S>>) -> Self {
        Self { tracker }
    }

    /// Map for exactly one operation.
    pub fn merge(&self, key: &OperationKey) -> Result<StatusMap<S>> {
        self.tracker.query(key)
    }

    /// Union over every operation of `kind` on `target`.
    ///
    /// Used when the status request does not name a discriminator. If two
    /// operations report the same replica, the newer operation's entry wins.
    pub fn merge_kind(&self, target: &EngineTarget, kind: OperationKind) -> Result<StatusMap<S>> {
        let maps = self.tracker.query_matching(target, kind);
        if maps.is_empty() {
            return Err(ProxyError::UnknownOperation(format!(
                "{}/{}/{}/{}",
                target.address, target.engine_name, target.volume_name, kind
            )));
        }

        let mut merged = StatusMap::new();
        for statuses in maps {
            merged.extend(statuses);
        }
        Ok(merged)
    }

    /// Narrows a map to one replica; an empty `replica_address` keeps all.
    pub fn only_replica(mut statuses: StatusMap<S>, replica_address: &str) -> StatusMap<S> {
        if !replica_address.is_empty() {
            statuses.retain(|replica, _| replica == replica_address);
        }
        statuses
    }
}
