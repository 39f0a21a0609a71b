//! Proxy Service
//!
//! One method per RPC of the contract. Each method falls into one of four
//! patterns:
//!
//! - **Synchronous forward**: forward the request, return the engine's reply.
//! - **Fire-and-track**: reserve the operation key, forward the start call,
//!   spawn one poller per replica and return right away.
//! - **Status query**: answered from the trackers; the engine is not contacted.
//! - **Finish/cleanup**: forward to the engine, then drop tracked operations.

use super::protocol::*;
use crate::config::ProxyConfig;
use crate::engine::connection::EngineConnector;
use crate::engine::registry::ConnectionRegistry;
use crate::engine::router::RequestRouter;
use crate::engine::types::{EngineMethod, EngineTarget, ReplicaListReply};
use crate::error::{ProxyError, Result};
use crate::operations::aggregator::StatusAggregator;
use crate::operations::poller::{PollerSettings, ReplicaPoller};
use crate::operations::status::*;
use crate::operations::tracker::{OperationHandle, OperationTracker};
use crate::operations::types::*;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// One tracker per operation kind.
#[derive(Clone, Default)]
pub struct OperationTrackers {
    pub backup: Arc<OperationTracker<BackupStatus>>,
    pub restore: Arc<OperationTracker<RestoreStatus>>,
    pub purge: Arc<OperationTracker<SnapshotPurgeStatus>>,
    pub clone: Arc<OperationTracker<SnapshotCloneStatus>>,
    pub hash: Arc<OperationTracker<SnapshotHashStatus>>,
    pub rebuild: Arc<OperationTracker<ReplicaRebuildStatus>>,
}

impl OperationTrackers {
    pub fn reap(&self, retention: Duration) -> usize {
        self.backup.reap(retention)
            + self.restore.reap(retention)
            + self.purge.reap(retention)
            + self.clone.reap(retention)
            + self.hash.reap(retention)
            + self.rebuild.reap(retention)
    }

    pub fn finish_all(&self) -> usize {
        self.backup.finish_all()
            + self.restore.finish_all()
            + self.purge.finish_all()
            + self.clone.finish_all()
            + self.hash.finish_all()
            + self.rebuild.finish_all()
    }

    pub fn len(&self) -> usize {
        self.backup.len()
            + self.restore.len()
            + self.purge.len()
            + self.clone.len()
            + self.hash.len()
            + self.rebuild.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct ProxyService {
    config: ProxyConfig,
    router: Arc<RequestRouter>,
    trackers: OperationTrackers,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl ProxyService {
    /// Builds the registry, router and trackers and starts the retention sweeper.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: ProxyConfig, connector: Arc<dyn EngineConnector>) -> Result<Arc<Self>> {
        config.validate()?;

        let registry = ConnectionRegistry::new(connector, config.dial_timeout);
        let router = RequestRouter::new(
            registry,
            config.forward_timeout,
            config.v2_data_engine_enabled,
        );
        let trackers = OperationTrackers::default();
        let sweeper = Self::spawn_sweeper(
            trackers.clone(),
            config.retention,
            config.sweep_interval,
        );

        tracing::info!(
            "Proxy service ready (poll every {:?}, retention {:?}, v2 data engine {})",
            config.poll_interval,
            config.retention,
            if config.v2_data_engine_enabled { "enabled" } else { "disabled" }
        );

        Ok(Arc::new(Self {
            config,
            router,
            trackers,
            sweeper: Mutex::new(Some(sweeper)),
        }))
    }

    fn spawn_sweeper(
        trackers: OperationTrackers,
        retention: Duration,
        sweep_interval: Duration,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(sweep_interval);
            loop {
                interval.tick().await;
                let reaped = trackers.reap(retention);
                if reaped > 0 {
                    tracing::info!("Retention sweep removed {} operation(s)", reaped);
                }
            }
        })
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        self.router.registry()
    }

    pub fn trackers(&self) -> &OperationTrackers {
        &self.trackers
    }

    /// Stops the sweeper, every poller and every engine connection.
    pub async fn shutdown(&self) {
        if let Some(sweeper) = self.sweeper.lock().await.take() {
            sweeper.abort();
        }
        let finished = self.trackers.finish_all();
        self.registry().close_all();
        tracing::info!("Proxy service stopped ({} operation(s) dropped)", finished);
    }

    // ============================================================
    // SYNCHRONOUS FORWARD
    // ============================================================

    async fn forward<Req, Resp>(&self, proxy: &ProxyEngineRequest, method: EngineMethod, request: &Req) -> Result<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let target = proxy.target()?;
        self.router.forward(&target, method, request).await
    }

    pub async fn server_version_get(&self, req: EngineRequest) -> Result<EngineVersionProxyResponse> {
        let version: Value = self
            .forward(&req.proxy_engine_request, EngineMethod::ServerVersionGet, &req)
            .await?;
        Ok(EngineVersionProxyResponse { version })
    }

    pub async fn volume_get(&self, req: EngineRequest) -> Result<EngineVolumeGetProxyResponse> {
        let volume: Value = self
            .forward(&req.proxy_engine_request, EngineMethod::VolumeGet, &req)
            .await?;
        Ok(EngineVolumeGetProxyResponse { volume })
    }

    pub async fn volume_expand(&self, req: EngineVolumeExpandRequest) -> Result<Empty> {
        self.forward(&req.proxy_engine_request, EngineMethod::VolumeExpand, &req)
            .await
    }

    pub async fn volume_frontend_start(&self, req: EngineVolumeFrontendStartRequest) -> Result<Empty> {
        self.forward(&req.proxy_engine_request, EngineMethod::VolumeFrontendStart, &req)
            .await
    }

    pub async fn volume_frontend_shutdown(&self, req: EngineRequest) -> Result<Empty> {
        self.forward(&req.proxy_engine_request, EngineMethod::VolumeFrontendShutdown, &req)
            .await
    }

    pub async fn volume_unmap_mark_snap_chain_removed_set(
        &self,
        req: EngineVolumeUnmapMarkSnapChainRemovedSetRequest,
    ) -> Result<Empty> {
        self.forward(
            &req.proxy_engine_request,
            EngineMethod::VolumeUnmapMarkSnapChainRemovedSet,
            &req,
        )
        .await
    }

    pub async fn volume_snapshot_max_count_set(
        &self,
        req: EngineVolumeSnapshotMaxCountSetRequest,
    ) -> Result<Empty> {
        self.forward(&req.proxy_engine_request, EngineMethod::VolumeSnapshotMaxCountSet, &req)
            .await
    }

    pub async fn volume_snapshot_max_size_set(
        &self,
        req: EngineVolumeSnapshotMaxSizeSetRequest,
    ) -> Result<Empty> {
        self.forward(&req.proxy_engine_request, EngineMethod::VolumeSnapshotMaxSizeSet, &req)
            .await
    }

    pub async fn volume_snapshot(
        &self,
        req: EngineVolumeSnapshotRequest,
    ) -> Result<EngineVolumeSnapshotProxyResponse> {
        let snapshot: VolumeSnapshotReply = self
            .forward(&req.proxy_engine_request, EngineMethod::VolumeSnapshot, &req)
            .await?;
        Ok(EngineVolumeSnapshotProxyResponse { snapshot })
    }

    pub async fn snapshot_list(&self, req: EngineRequest) -> Result<EngineSnapshotListProxyResponse> {
        self.forward(&req.proxy_engine_request, EngineMethod::SnapshotList, &req)
            .await
    }

    pub async fn snapshot_revert(&self, req: EngineSnapshotRevertRequest) -> Result<Empty> {
        self.forward(&req.proxy_engine_request, EngineMethod::SnapshotRevert, &req)
            .await
    }

    pub async fn snapshot_remove(&self, req: EngineSnapshotRemoveRequest) -> Result<Empty> {
        self.forward(&req.proxy_engine_request, EngineMethod::SnapshotRemove, &req)
            .await
    }

    pub async fn replica_add(&self, req: EngineReplicaAddRequest) -> Result<Empty> {
        self.forward(&req.proxy_engine_request, EngineMethod::ReplicaAdd, &req)
            .await
    }

    pub async fn replica_list(&self, req: EngineRequest) -> Result<EngineReplicaListProxyResponse> {
        let replica_list: ReplicaListReply = self
            .forward(&req.proxy_engine_request, EngineMethod::ReplicaList, &req)
            .await?;
        Ok(EngineReplicaListProxyResponse { replica_list })
    }

    /// Also drops any rebuild tracked for the removed replica.
    pub async fn replica_remove(&self, req: EngineReplicaRemoveRequest) -> Result<Empty> {
        let target = req.proxy_engine_request.target()?;
        let reply: Empty = self
            .router
            .forward(&target, EngineMethod::ReplicaRemove, &req)
            .await?;

        let key = OperationKey::new(
            &target,
            OperationKind::ReplicaRebuild,
            Some(&req.replica_address),
        );
        self.trackers.rebuild.finish(&key);

        Ok(reply)
    }

    pub async fn replica_mode_update(&self, req: EngineReplicaModeUpdateRequest) -> Result<Empty> {
        self.forward(&req.proxy_engine_request, EngineMethod::ReplicaModeUpdate, &req)
            .await
    }

    pub async fn metrics_get(&self, req: EngineRequest) -> Result<EngineMetricsGetProxyResponse> {
        let metrics: Value = self
            .forward(&req.proxy_engine_request, EngineMethod::MetricsGet, &req)
            .await?;
        Ok(EngineMetricsGetProxyResponse { metrics })
    }

    // ============================================================
    // FIRE-AND-TRACK
    // ============================================================

    /// Replicas a volume-wide operation runs on: every replica not in `ERR` mode.
    async fn healthy_replicas(&self, target: &EngineTarget) -> Result<Vec<String>> {
        let reply: ReplicaListReply = self
            .router
            .forward(target, EngineMethod::ReplicaList, &Empty {})
            .await?;
        Ok(reply.healthy_addresses())
    }

    /// Reserves `key`, then forwards the start call. A failed start releases
    /// the reservation.
    async fn start_tracked<S, Req, Resp>(
        &self,
        tracker: &Arc<OperationTracker<S>>,
        target: &EngineTarget,
        key: OperationKey,
        replicas: Vec<String>,
        method: EngineMethod,
        request: &Req,
    ) -> Result<(OperationHandle, Resp)>
    where
        S: ReplicaProgress,
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let handle = tracker.begin(key, replicas)?;

        match self.router.forward(target, method, request).await {
            Ok(response) => Ok((handle, response)),
            Err(e) => {
                tracing::warn!("Starting {} failed: {}", handle.key, e);
                tracker.finish_handle(&handle);
                Err(e)
            }
        }
    }

    fn spawn_pollers<S, I>(
        &self,
        tracker: &Arc<OperationTracker<S>>,
        target: &EngineTarget,
        handle: &OperationHandle,
        replicas: I,
    ) where
        S: ReplicaProgress,
        I: IntoIterator<Item = String>,
    {
        let settings = PollerSettings {
            interval: self.config.poll_interval,
            failure_threshold: self.config.poll_failure_threshold,
        };

        let pollers = replicas
            .into_iter()
            .map(|replica| {
                ReplicaPoller::new(
                    self.router.clone(),
                    tracker.clone(),
                    target.clone(),
                    handle.clone(),
                    replica,
                    settings,
                )
                .spawn()
            })
            .collect();

        tracker.attach_pollers(handle, pollers);
    }

    pub async fn snapshot_backup(
        &self,
        req: EngineSnapshotBackupRequest,
    ) -> Result<EngineSnapshotBackupProxyResponse> {
        let target = req.proxy_engine_request.target()?;
        if req.backup_name.is_empty() {
            return Err(ProxyError::InvalidArgument("backup_name is required".to_string()));
        }

        let key = OperationKey::new(&target, OperationKind::Backup, Some(&req.backup_name));
        let replicas = self.healthy_replicas(&target).await?;
        let tracker = &self.trackers.backup;

        let (handle, response): (_, EngineSnapshotBackupProxyResponse) = self
            .start_tracked(tracker, &target, key, replicas, EngineMethod::SnapshotBackup, &req)
            .await?;

        tracing::info!(
            "Backup {} started on {} (id {}, incremental {})",
            req.backup_name,
            target.engine_name,
            response.backup_id,
            response.is_incremental
        );

        self.spawn_pollers(tracker, &target, &handle, handle.replicas.clone());
        Ok(response)
    }

    /// Replicas the engine reports as failed to start are recorded as errored
    /// and get no poller. The engine's reply is returned as is.
    pub async fn backup_restore(
        &self,
        req: EngineBackupRestoreRequest,
    ) -> Result<EngineBackupRestoreProxyResponse> {
        let target = req.proxy_engine_request.target()?;
        let key = OperationKey::new(&target, OperationKind::Restore, None);
        let replicas = self.healthy_replicas(&target).await?;
        let tracker = &self.trackers.restore;

        let (handle, response): (_, EngineBackupRestoreProxyResponse) = self
            .start_tracked(tracker, &target, key, replicas, EngineMethod::BackupRestore, &req)
            .await?;

        let failed: HashMap<&str, &str> = response
            .task_error
            .iter()
            .flat_map(|task_error| task_error.replica_errors.iter())
            .map(|error| (error.address.as_str(), error.message.as_str()))
            .collect();

        for (replica, message) in &failed {
            tracing::warn!("Restore could not start on replica {}: {}", replica, message);
            tracker.report_for(&handle, replica, RestoreStatus::failed(replica, message.to_string()));
        }

        let started: Vec<String> = handle
            .replicas
            .iter()
            .filter(|replica| !failed.contains_key(replica.as_str()))
            .cloned()
            .collect();
        self.spawn_pollers(tracker, &target, &handle, started);

        Ok(response)
    }

    pub async fn snapshot_purge(&self, req: EngineSnapshotPurgeRequest) -> Result<Empty> {
        let target = req.proxy_engine_request.target()?;
        let key = OperationKey::new(&target, OperationKind::SnapshotPurge, None);
        let tracker = &self.trackers.purge;

        if req.skip_if_in_progress && tracker.is_active(&key) {
            tracing::info!("Snapshot purge already running for {}, skipped", key);
            return Ok(Empty {});
        }

        let replicas = self.healthy_replicas(&target).await?;
        let started = self
            .start_tracked(tracker, &target, key, replicas, EngineMethod::SnapshotPurge, &req)
            .await;

        // A concurrent purge can take the key between the check above and `begin`.
        let (handle, response): (_, Empty) = match started {
            Err(ProxyError::DuplicateOperation(key)) if req.skip_if_in_progress => {
                tracing::info!("Snapshot purge already running for {}, skipped", key);
                return Ok(Empty {});
            }
            other => other?,
        };

        self.spawn_pollers(tracker, &target, &handle, handle.replicas.clone());
        Ok(response)
    }

    pub async fn snapshot_clone(&self, req: EngineSnapshotCloneRequest) -> Result<Empty> {
        let target = req.proxy_engine_request.target()?;
        let key = OperationKey::new(&target, OperationKind::SnapshotClone, None);
        let replicas = self.healthy_replicas(&target).await?;
        let tracker = &self.trackers.clone;

        let (handle, response): (_, Empty) = self
            .start_tracked(tracker, &target, key, replicas, EngineMethod::SnapshotClone, &req)
            .await?;

        self.spawn_pollers(tracker, &target, &handle, handle.replicas.clone());
        Ok(response)
    }

    pub async fn snapshot_hash(&self, req: EngineSnapshotHashRequest) -> Result<Empty> {
        let target = req.proxy_engine_request.target()?;
        if req.snapshot_name.is_empty() {
            return Err(ProxyError::InvalidArgument("snapshot_name is required".to_string()));
        }

        let key = OperationKey::new(&target, OperationKind::SnapshotHash, Some(&req.snapshot_name));
        let replicas = self.healthy_replicas(&target).await?;
        let tracker = &self.trackers.hash;

        let (handle, response): (_, Empty) = self
            .start_tracked(tracker, &target, key, replicas, EngineMethod::SnapshotHash, &req)
            .await?;

        self.spawn_pollers(tracker, &target, &handle, handle.replicas.clone());
        Ok(response)
    }

    /// Tracks the rebuild of the one replica named in the request.
    pub async fn replica_verify_rebuild(&self, req: EngineReplicaVerifyRebuildRequest) -> Result<Empty> {
        let target = req.proxy_engine_request.target()?;
        if req.replica_address.is_empty() {
            return Err(ProxyError::InvalidArgument("replica_address is required".to_string()));
        }

        let key = OperationKey::new(
            &target,
            OperationKind::ReplicaRebuild,
            Some(&req.replica_address),
        );
        let tracker = &self.trackers.rebuild;

        let (handle, response): (_, Empty) = self
            .start_tracked(
                tracker,
                &target,
                key,
                vec![req.replica_address.clone()],
                EngineMethod::ReplicaVerifyRebuild,
                &req,
            )
            .await?;

        self.spawn_pollers(tracker, &target, &handle, handle.replicas.clone());
        Ok(response)
    }

    // ============================================================
    // STATUS QUERIES
    // ============================================================

    /// Map for the named operation, or the union over every operation of
    /// `kind` on the target when no discriminator is given.
    fn tracked_status<S: ReplicaProgress>(
        tracker: &Arc<OperationTracker<S>>,
        target: &EngineTarget,
        kind: OperationKind,
        discriminator: Option<&str>,
    ) -> Result<StatusMap<S>> {
        let aggregator = StatusAggregator::new(tracker.clone());
        match discriminator.filter(|value| !value.is_empty()) {
            Some(discriminator) => {
                aggregator.merge(&OperationKey::new(target, kind, Some(discriminator)))
            }
            None => aggregator.merge_kind(target, kind),
        }
    }

    pub fn snapshot_backup_status(
        &self,
        req: EngineSnapshotBackupStatusRequest,
    ) -> Result<StatusProxyResponse<BackupStatus>> {
        let target = req.proxy_engine_request.target()?;
        let statuses = Self::tracked_status(
            &self.trackers.backup,
            &target,
            OperationKind::Backup,
            Some(&req.backup_name),
        )?;
        Ok(StatusAggregator::only_replica(statuses, &req.replica_address).into())
    }

    pub fn backup_restore_status(&self, req: EngineRequest) -> Result<StatusProxyResponse<RestoreStatus>> {
        let target = req.proxy_engine_request.target()?;
        Self::tracked_status(&self.trackers.restore, &target, OperationKind::Restore, None)
            .map(Into::into)
    }

    pub fn snapshot_purge_status(
        &self,
        req: EngineRequest,
    ) -> Result<StatusProxyResponse<SnapshotPurgeStatus>> {
        let target = req.proxy_engine_request.target()?;
        Self::tracked_status(&self.trackers.purge, &target, OperationKind::SnapshotPurge, None)
            .map(Into::into)
    }

    pub fn snapshot_clone_status(
        &self,
        req: EngineRequest,
    ) -> Result<StatusProxyResponse<SnapshotCloneStatus>> {
        let target = req.proxy_engine_request.target()?;
        Self::tracked_status(&self.trackers.clone, &target, OperationKind::SnapshotClone, None)
            .map(Into::into)
    }

    pub fn snapshot_hash_status(
        &self,
        req: EngineSnapshotHashStatusRequest,
    ) -> Result<StatusProxyResponse<SnapshotHashStatus>> {
        let target = req.proxy_engine_request.target()?;
        Self::tracked_status(
            &self.trackers.hash,
            &target,
            OperationKind::SnapshotHash,
            Some(&req.snapshot_name),
        )
        .map(Into::into)
    }

    pub fn replica_rebuilding_status(
        &self,
        req: EngineRequest,
    ) -> Result<StatusProxyResponse<ReplicaRebuildStatus>> {
        let target = req.proxy_engine_request.target()?;
        Self::tracked_status(&self.trackers.rebuild, &target, OperationKind::ReplicaRebuild, None)
            .map(Into::into)
    }

    // ============================================================
    // FINISH / CLEANUP
    // ============================================================

    pub async fn backup_restore_finish(&self, req: EngineBackupRestoreFinishRequest) -> Result<Empty> {
        let target = req.proxy_engine_request.target()?;
        let reply: Empty = self
            .router
            .forward(&target, EngineMethod::BackupRestoreFinish, &req)
            .await?;

        self.trackers
            .restore
            .finish(&OperationKey::new(&target, OperationKind::Restore, None));
        Ok(reply)
    }

    /// Fans out to every engine the proxy holds a connection to, then drops
    /// the backup and restore operations that have fully terminated.
    pub async fn cleanup_backup_mount_points(&self, _req: Empty) -> Result<Empty> {
        let mut first_error = None;
        for address in self.registry().addresses() {
            if let Err(e) = self
                .router
                .forward_to(&address, EngineMethod::CleanupBackupMountPoints, &Empty {})
                .await
            {
                tracing::warn!("Cleaning backup mount points on {} failed: {}", address, e);
                first_error.get_or_insert(e);
            }
        }

        let finished =
            self.trackers.backup.finish_completed() + self.trackers.restore.finish_completed();
        tracing::info!("Backup mount point cleanup finished {} operation(s)", finished);

        match first_error {
            Some(e) => Err(e),
            None => Ok(Empty {}),
        }
    }
}
