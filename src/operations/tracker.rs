//! Asynchronous Operation Tracker
//!
//! Keyed store of long-running operations and the per-replica status each of
//! their pollers reports. One tracker instance exists per operation kind,
//! parameterized over that kind's status payload.
//!
//! ## Lifecycle
//! `begin` → any number of `report`s → `query` at will → `finish` (or the
//! retention sweep once every replica is terminal).

use super::aggregator;
use super::types::*;
use crate::engine::types::EngineTarget;
use crate::error::{ProxyError, Result};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// What a caller gets back from a successful `begin`.
#[derive(Debug, Clone)]
pub struct OperationHandle {
    pub id: OperationId,
    pub key: OperationKey,
    pub replicas: Vec<String>,
}

struct Operation<S> {
    id: OperationId,
    replicas: HashSet<String>,
    statuses: StatusMap<S>,
    created_at: Instant,
    /// Set when the last replica turns terminal.
    completed_at: Option<Instant>,
    pollers: Vec<JoinHandle<()>>,
}

impl<S: ReplicaProgress> Operation<S> {
    fn all_terminal(&self) -> bool {
        self.replicas.iter().all(|replica| {
            self.statuses
                .get(replica)
                .map(|status| status.state().is_terminal())
                .unwrap_or(false)
        })
    }

    fn is_active(&self) -> bool {
        !self.all_terminal()
    }

    fn abort_pollers(&mut self) {
        for poller in self.pollers.drain(..) {
            poller.abort();
        }
    }
}

pub struct OperationTracker<S> {
    operations: DashMap<OperationKey, Operation<S>>,
}

impl<S: ReplicaProgress> OperationTracker<S> {
    pub fn new() -> Self {
        Self {
            operations: DashMap::new(),
        }
    }

    /// Registers a new operation over `replicas`.
    ///
    /// Fails with `DuplicateOperation` while another operation under the same
    /// key still has a replica in progress. A fully terminal one is replaced.
    pub fn begin<I>(&self, key: OperationKey, replicas: I) -> Result<OperationHandle>
    where
        I: IntoIterator<Item = String>,
    {
        let replicas: HashSet<String> = replicas
            .into_iter()
            .filter(|replica| !replica.is_empty())
            .collect();
        if replicas.is_empty() {
            return Err(ProxyError::InvalidArgument(format!(
                "operation {} has no replicas to track",
                key
            )));
        }

        let operation = Operation {
            id: OperationId::new(),
            replicas,
            statuses: StatusMap::new(),
            created_at: Instant::now(),
            completed_at: None,
            pollers: Vec::new(),
        };
        let mut handle = OperationHandle {
            id: operation.id.clone(),
            key: key.clone(),
            replicas: operation.replicas.iter().cloned().collect(),
        };
        handle.replicas.sort();

        match self.operations.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_active() {
                    tracing::debug!("Rejected duplicate operation {}", key);
                    return Err(ProxyError::DuplicateOperation(key.to_string()));
                }
                let mut previous = occupied.insert(operation);
                previous.abort_pollers();
                tracing::info!("Replaced completed operation {}", key);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(operation);
            }
        }

        tracing::info!(
            "Began operation {} ({}) over {} replica(s)",
            key,
            handle.id.0,
            handle.replicas.len()
        );

        Ok(handle)
    }

    /// Hands the operation's poller tasks over so `finish` can stop them.
    ///
    /// If the operation is gone (or was replaced) in the meantime, the pollers
    /// are aborted right away.
    pub fn attach_pollers(&self, handle: &OperationHandle, pollers: Vec<JoinHandle<()>>) {
        if let Some(mut operation) = self.operations.get_mut(&handle.key)
            && operation.id == handle.id
        {
            operation.pollers.extend(pollers);
            return;
        }

        for poller in pollers {
            poller.abort();
        }
    }

    /// Upserts one replica's status. Unknown keys are dropped, not errors.
    pub fn report(&self, key: &OperationKey, replica_address: &str, status: S) -> bool {
        self.apply_report(key, None, replica_address, status)
    }

    /// Like [`report`](Self::report), but only for the given incarnation.
    pub fn report_for(&self, handle: &OperationHandle, replica_address: &str, status: S) -> bool {
        self.apply_report(&handle.key, Some(&handle.id), replica_address, status)
    }

    fn apply_report(
        &self,
        key: &OperationKey,
        id: Option<&OperationId>,
        replica_address: &str,
        status: S,
    ) -> bool {
        let Some(mut operation) = self.operations.get_mut(key) else {
            tracing::debug!(
                "Dropped report for unknown operation {} from {}",
                key,
                replica_address
            );
            return false;
        };

        if let Some(id) = id
            && &operation.id != id
        {
            tracing::debug!(
                "Dropped stale report for operation {} from {}",
                key,
                replica_address
            );
            return false;
        }

        if !operation.replicas.contains(replica_address) {
            tracing::warn!(
                "Dropped report for operation {} from untracked replica {}",
                key,
                replica_address
            );
            return false;
        }

        if !aggregator::should_replace(operation.statuses.get(replica_address)) {
            tracing::trace!(
                "Ignored {:?} report for terminal replica {} of {}",
                status.state(),
                replica_address,
                key
            );
            return false;
        }

        tracing::debug!(
            "Operation {} replica {} -> {:?} ({}%)",
            key,
            replica_address,
            status.state(),
            status.progress()
        );
        operation
            .statuses
            .insert(replica_address.to_string(), status);

        if operation.completed_at.is_none() && operation.all_terminal() {
            operation.completed_at = Some(Instant::now());
            tracing::info!("All replicas of operation {} are terminal", key);
        }

        true
    }

    /// Current per-replica snapshot of one operation.
    pub fn query(&self, key: &OperationKey) -> Result<StatusMap<S>> {
        self.operations
            .get(key)
            .map(|operation| operation.statuses.clone())
            .ok_or_else(|| ProxyError::UnknownOperation(key.to_string()))
    }

    /// Status maps of every operation of one kind on one engine, oldest first.
    pub fn query_matching(
        &self,
        target: &EngineTarget,
        kind: OperationKind,
    ) -> Vec<StatusMap<S>> {
        let mut matching: Vec<(Instant, StatusMap<S>)> = self
            .operations
            .iter()
            .filter(|entry| entry.key().matches(target, kind))
            .map(|entry| (entry.value().created_at, entry.value().statuses.clone()))
            .collect();
        matching.sort_by_key(|(created_at, _)| *created_at);
        matching.into_iter().map(|(_, statuses)| statuses).collect()
    }

    /// True while this exact incarnation is still tracked.
    pub fn is_current(&self, handle: &OperationHandle) -> bool {
        self.operations
            .get(&handle.key)
            .map(|operation| operation.id == handle.id)
            .unwrap_or(false)
    }

    /// True if an operation under `key` still has a replica in progress.
    pub fn is_active(&self, key: &OperationKey) -> bool {
        self.operations
            .get(key)
            .map(|operation| operation.is_active())
            .unwrap_or(false)
    }

    /// Removes the operation and stops its pollers. Finishing twice is a no-op.
    pub fn finish(&self, key: &OperationKey) -> bool {
        match self.operations.remove(key) {
            Some((_, mut operation)) => {
                operation.abort_pollers();
                tracing::info!("Finished operation {}", key);
                true
            }
            None => {
                tracing::debug!("Finish for unknown operation {} ignored", key);
                false
            }
        }
    }

    /// Removes only if `handle` is still the current incarnation.
    pub fn finish_handle(&self, handle: &OperationHandle) -> bool {
        match self
            .operations
            .remove_if(&handle.key, |_, operation| operation.id == handle.id)
        {
            Some((_, mut operation)) => {
                operation.abort_pollers();
                tracing::info!("Finished operation {}", handle.key);
                true
            }
            None => false,
        }
    }

    /// Finishes every operation whose replicas are all terminal.
    pub fn finish_completed(&self) -> usize {
        self.remove_where(|operation| operation.all_terminal())
    }

    /// Drops operations that have been fully terminal for at least `retention`.
    pub fn reap(&self, retention: Duration) -> usize {
        self.remove_where(|operation| {
            operation
                .completed_at
                .map(|completed_at| completed_at.elapsed() >= retention)
                .unwrap_or(false)
        })
    }

    /// Shutdown path: stops every poller and forgets every operation.
    pub fn finish_all(&self) -> usize {
        self.remove_where(|_| true)
    }

    fn remove_where<F>(&self, predicate: F) -> usize
    where
        F: Fn(&Operation<S>) -> bool,
    {
        let mut removed = 0;
        self.operations.retain(|key, operation| {
            if predicate(operation) {
                operation.abort_pollers();
                tracing::debug!("Removed operation {}", key);
                removed += 1;
                false
            } else {
                true
            }
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

impl<S: ReplicaProgress> Default for OperationTracker<S> {
    fn default() -> Self {
        Self::new()
    }
}
