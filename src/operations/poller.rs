//! Replica Pollers
//!
//! One background task per replica of a tracked operation. Each cycle it asks
//! the engine for that replica's native status and reports the answer to the
//! tracker. It stops on its own once the replica is terminal or the operation
//! is no longer the tracked incarnation; `finish` aborts it otherwise.

use super::tracker::{OperationHandle, OperationTracker};
use super::types::*;
use crate::engine::router::RequestRouter;
use crate::engine::types::EngineTarget;
use crate::error::ProxyError;

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Body of the engine's per-replica status query.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EngineStatusRequest {
    pub replica_address: String,
    /// Backup or snapshot name for kinds that need one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct PollerSettings {
    pub interval: Duration,
    /// Consecutive transport failures tolerated before the replica is marked errored.
    pub failure_threshold: u32,
}

pub struct ReplicaPoller<S> {
    router: Arc<RequestRouter>,
    tracker: Arc<OperationTracker<S>>,
    target: EngineTarget,
    handle: OperationHandle,
    request: EngineStatusRequest,
    settings: PollerSettings,
}

impl<S: ReplicaProgress> ReplicaPoller<S> {
    pub fn new(
        router: Arc<RequestRouter>,
        tracker: Arc<OperationTracker<S>>,
        target: EngineTarget,
        handle: OperationHandle,
        replica_address: String,
        settings: PollerSettings,
    ) -> Self {
        let request = EngineStatusRequest {
            replica_address,
            name: handle.key.discriminator.clone(),
        };
        Self {
            router,
            tracker,
            target,
            handle,
            request,
            settings,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    async fn run(self) {
        let replica = self.request.replica_address.clone();
        let method = self.handle.key.kind.status_method();

        // Spread the first query so pollers started together do not fire together.
        let jitter = Duration::from_millis(rand::random::<u64>() % 50);
        let mut interval =
            tokio::time::interval_at(tokio::time::Instant::now() + jitter, self.settings.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::debug!("Poller for {} replica {} started", self.handle.key, replica);

        let mut failures = 0u32;
        loop {
            interval.tick().await;

            if !self.tracker.is_current(&self.handle) {
                tracing::debug!(
                    "Operation {} is gone, poller for {} exiting",
                    self.handle.key,
                    replica
                );
                break;
            }

            match self
                .router
                .forward::<_, S>(&self.target, method, &self.request)
                .await
            {
                Ok(status) => {
                    failures = 0;
                    let state = status.state();
                    self.tracker.report_for(&self.handle, &replica, status);
                    if state.is_terminal() {
                        tracing::info!(
                            "Replica {} of {} reached {:?}",
                            replica,
                            self.handle.key,
                            state
                        );
                        break;
                    }
                }
                Err(e @ (ProxyError::Connection { .. } | ProxyError::UpstreamUnavailable { .. })) => {
                    failures += 1;
                    tracing::warn!(
                        "Status query {}/{} for replica {} of {} failed: {}",
                        failures,
                        self.settings.failure_threshold,
                        replica,
                        self.handle.key,
                        e
                    );
                    if failures >= self.settings.failure_threshold {
                        self.tracker
                            .report_for(&self.handle, &replica, S::failed(&replica, e.to_string()));
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        "Engine failed status query for replica {} of {}: {}",
                        replica,
                        self.handle.key,
                        e
                    );
                    self.tracker
                        .report_for(&self.handle, &replica, S::failed(&replica, e.to_string()));
                    break;
                }
            }
        }
    }
}
