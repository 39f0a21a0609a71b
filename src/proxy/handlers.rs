use super::protocol::*;
use super::service::ProxyService;
use crate::error::Result;
use crate::operations::status::*;

use axum::{Extension, Json, Router, routing::post};
use std::sync::Arc;

/// Every RPC as `POST /v1/proxy/<Rpc>`.
pub fn router(service: Arc<ProxyService>) -> Router {
    Router::new()
        .route("/v1/proxy/ServerVersionGet", post(handle_server_version_get))
        .route("/v1/proxy/VolumeGet", post(handle_volume_get))
        .route("/v1/proxy/VolumeExpand", post(handle_volume_expand))
        .route("/v1/proxy/VolumeFrontendStart", post(handle_volume_frontend_start))
        .route("/v1/proxy/VolumeFrontendShutdown", post(handle_volume_frontend_shutdown))
        .route(
            "/v1/proxy/VolumeUnmapMarkSnapChainRemovedSet",
            post(handle_volume_unmap_mark_snap_chain_removed_set),
        )
        .route("/v1/proxy/VolumeSnapshotMaxCountSet", post(handle_volume_snapshot_max_count_set))
        .route("/v1/proxy/VolumeSnapshotMaxSizeSet", post(handle_volume_snapshot_max_size_set))
        .route("/v1/proxy/VolumeSnapshot", post(handle_volume_snapshot))
        .route("/v1/proxy/SnapshotList", post(handle_snapshot_list))
        .route("/v1/proxy/SnapshotRevert", post(handle_snapshot_revert))
        .route("/v1/proxy/SnapshotPurge", post(handle_snapshot_purge))
        .route("/v1/proxy/SnapshotPurgeStatus", post(handle_snapshot_purge_status))
        .route("/v1/proxy/SnapshotClone", post(handle_snapshot_clone))
        .route("/v1/proxy/SnapshotCloneStatus", post(handle_snapshot_clone_status))
        .route("/v1/proxy/SnapshotRemove", post(handle_snapshot_remove))
        .route("/v1/proxy/SnapshotHash", post(handle_snapshot_hash))
        .route("/v1/proxy/SnapshotHashStatus", post(handle_snapshot_hash_status))
        .route("/v1/proxy/SnapshotBackup", post(handle_snapshot_backup))
        .route("/v1/proxy/SnapshotBackupStatus", post(handle_snapshot_backup_status))
        .route("/v1/proxy/BackupRestore", post(handle_backup_restore))
        .route("/v1/proxy/BackupRestoreStatus", post(handle_backup_restore_status))
        .route("/v1/proxy/BackupRestoreFinish", post(handle_backup_restore_finish))
        .route("/v1/proxy/CleanupBackupMountPoints", post(handle_cleanup_backup_mount_points))
        .route("/v1/proxy/ReplicaAdd", post(handle_replica_add))
        .route("/v1/proxy/ReplicaList", post(handle_replica_list))
        .route("/v1/proxy/ReplicaRebuildingStatus", post(handle_replica_rebuilding_status))
        .route("/v1/proxy/ReplicaVerifyRebuild", post(handle_replica_verify_rebuild))
        .route("/v1/proxy/ReplicaRemove", post(handle_replica_remove))
        .route("/v1/proxy/ReplicaModeUpdate", post(handle_replica_mode_update))
        .route("/v1/proxy/MetricsGet", post(handle_metrics_get))
        .layer(Extension(service))
}

// ============================================================
// VERSION / VOLUME
// ============================================================

pub async fn handle_server_version_get(
    Extension(service): Extension<Arc<ProxyService>>,
    Json(req): Json<EngineRequest>,
) -> Result<Json<EngineVersionProxyResponse>> {
    service.server_version_get(req).await.map(Json)
}

pub async fn handle_volume_get(
    Extension(service): Extension<Arc<ProxyService>>,
    Json(req): Json<EngineRequest>,
) -> Result<Json<EngineVolumeGetProxyResponse>> {
    service.volume_get(req).await.map(Json)
}

pub async fn handle_volume_expand(
    Extension(service): Extension<Arc<ProxyService>>,
    Json(req): Json<EngineVolumeExpandRequest>,
) -> Result<Json<Empty>> {
    tracing::info!(
        "Expanding volume {} to {} bytes",
        req.proxy_engine_request.volume_name,
        req.expand.size
    );
    service.volume_expand(req).await.map(Json)
}

pub async fn handle_volume_frontend_start(
    Extension(service): Extension<Arc<ProxyService>>,
    Json(req): Json<EngineVolumeFrontendStartRequest>,
) -> Result<Json<Empty>> {
    service.volume_frontend_start(req).await.map(Json)
}

pub async fn handle_volume_frontend_shutdown(
    Extension(service): Extension<Arc<ProxyService>>,
    Json(req): Json<EngineRequest>,
) -> Result<Json<Empty>> {
    service.volume_frontend_shutdown(req).await.map(Json)
}

pub async fn handle_volume_unmap_mark_snap_chain_removed_set(
    Extension(service): Extension<Arc<ProxyService>>,
    Json(req): Json<EngineVolumeUnmapMarkSnapChainRemovedSetRequest>,
) -> Result<Json<Empty>> {
    service
        .volume_unmap_mark_snap_chain_removed_set(req)
        .await
        .map(Json)
}

pub async fn handle_volume_snapshot_max_count_set(
    Extension(service): Extension<Arc<ProxyService>>,
    Json(req): Json<EngineVolumeSnapshotMaxCountSetRequest>,
) -> Result<Json<Empty>> {
    service.volume_snapshot_max_count_set(req).await.map(Json)
}

pub async fn handle_volume_snapshot_max_size_set(
    Extension(service): Extension<Arc<ProxyService>>,
    Json(req): Json<EngineVolumeSnapshotMaxSizeSetRequest>,
) -> Result<Json<Empty>> {
    service.volume_snapshot_max_size_set(req).await.map(Json)
}

pub async fn handle_volume_snapshot(
    Extension(service): Extension<Arc<ProxyService>>,
    Json(req): Json<EngineVolumeSnapshotRequest>,
) -> Result<Json<EngineVolumeSnapshotProxyResponse>> {
    service.volume_snapshot(req).await.map(Json)
}

// ============================================================
// SNAPSHOTS
// ============================================================

pub async fn handle_snapshot_list(
    Extension(service): Extension<Arc<ProxyService>>,
    Json(req): Json<EngineRequest>,
) -> Result<Json<EngineSnapshotListProxyResponse>> {
    service.snapshot_list(req).await.map(Json)
}

pub async fn handle_snapshot_revert(
    Extension(service): Extension<Arc<ProxyService>>,
    Json(req): Json<EngineSnapshotRevertRequest>,
) -> Result<Json<Empty>> {
    tracing::info!(
        "Reverting volume {} to snapshot {}",
        req.proxy_engine_request.volume_name,
        req.name
    );
    service.snapshot_revert(req).await.map(Json)
}

pub async fn handle_snapshot_purge(
    Extension(service): Extension<Arc<ProxyService>>,
    Json(req): Json<EngineSnapshotPurgeRequest>,
) -> Result<Json<Empty>> {
    service.snapshot_purge(req).await.map(Json)
}

pub async fn handle_snapshot_purge_status(
    Extension(service): Extension<Arc<ProxyService>>,
    Json(req): Json<EngineRequest>,
) -> Result<Json<StatusProxyResponse<SnapshotPurgeStatus>>> {
    service.snapshot_purge_status(req).map(Json)
}

pub async fn handle_snapshot_clone(
    Extension(service): Extension<Arc<ProxyService>>,
    Json(req): Json<EngineSnapshotCloneRequest>,
) -> Result<Json<Empty>> {
    service.snapshot_clone(req).await.map(Json)
}

pub async fn handle_snapshot_clone_status(
    Extension(service): Extension<Arc<ProxyService>>,
    Json(req): Json<EngineRequest>,
) -> Result<Json<StatusProxyResponse<SnapshotCloneStatus>>> {
    service.snapshot_clone_status(req).map(Json)
}

pub async fn handle_snapshot_remove(
    Extension(service): Extension<Arc<ProxyService>>,
    Json(req): Json<EngineSnapshotRemoveRequest>,
) -> Result<Json<Empty>> {
    service.snapshot_remove(req).await.map(Json)
}

pub async fn handle_snapshot_hash(
    Extension(service): Extension<Arc<ProxyService>>,
    Json(req): Json<EngineSnapshotHashRequest>,
) -> Result<Json<Empty>> {
    service.snapshot_hash(req).await.map(Json)
}

pub async fn handle_snapshot_hash_status(
    Extension(service): Extension<Arc<ProxyService>>,
    Json(req): Json<EngineSnapshotHashStatusRequest>,
) -> Result<Json<StatusProxyResponse<SnapshotHashStatus>>> {
    service.snapshot_hash_status(req).map(Json)
}

// ============================================================
// BACKUP / RESTORE
// ============================================================

pub async fn handle_snapshot_backup(
    Extension(service): Extension<Arc<ProxyService>>,
    Json(req): Json<EngineSnapshotBackupRequest>,
) -> Result<Json<EngineSnapshotBackupProxyResponse>> {
    service.snapshot_backup(req).await.map(Json)
}

pub async fn handle_snapshot_backup_status(
    Extension(service): Extension<Arc<ProxyService>>,
    Json(req): Json<EngineSnapshotBackupStatusRequest>,
) -> Result<Json<StatusProxyResponse<BackupStatus>>> {
    service.snapshot_backup_status(req).map(Json)
}

pub async fn handle_backup_restore(
    Extension(service): Extension<Arc<ProxyService>>,
    Json(req): Json<EngineBackupRestoreRequest>,
) -> Result<Json<EngineBackupRestoreProxyResponse>> {
    tracing::info!(
        "Restoring {} into volume {}",
        req.url,
        req.proxy_engine_request.volume_name
    );
    service.backup_restore(req).await.map(Json)
}

pub async fn handle_backup_restore_status(
    Extension(service): Extension<Arc<ProxyService>>,
    Json(req): Json<EngineRequest>,
) -> Result<Json<StatusProxyResponse<RestoreStatus>>> {
    service.backup_restore_status(req).map(Json)
}

pub async fn handle_backup_restore_finish(
    Extension(service): Extension<Arc<ProxyService>>,
    Json(req): Json<EngineBackupRestoreFinishRequest>,
) -> Result<Json<Empty>> {
    service.backup_restore_finish(req).await.map(Json)
}

pub async fn handle_cleanup_backup_mount_points(
    Extension(service): Extension<Arc<ProxyService>>,
    Json(req): Json<Empty>,
) -> Result<Json<Empty>> {
    service.cleanup_backup_mount_points(req).await.map(Json)
}

// ============================================================
// REPLICAS / METRICS
// ============================================================

pub async fn handle_replica_add(
    Extension(service): Extension<Arc<ProxyService>>,
    Json(req): Json<EngineReplicaAddRequest>,
) -> Result<Json<Empty>> {
    tracing::info!(
        "Adding replica {} to volume {}",
        req.replica_address,
        req.proxy_engine_request.volume_name
    );
    service.replica_add(req).await.map(Json)
}

pub async fn handle_replica_list(
    Extension(service): Extension<Arc<ProxyService>>,
    Json(req): Json<EngineRequest>,
) -> Result<Json<EngineReplicaListProxyResponse>> {
    service.replica_list(req).await.map(Json)
}

pub async fn handle_replica_rebuilding_status(
    Extension(service): Extension<Arc<ProxyService>>,
    Json(req): Json<EngineRequest>,
) -> Result<Json<StatusProxyResponse<ReplicaRebuildStatus>>> {
    service.replica_rebuilding_status(req).map(Json)
}

pub async fn handle_replica_verify_rebuild(
    Extension(service): Extension<Arc<ProxyService>>,
    Json(req): Json<EngineReplicaVerifyRebuildRequest>,
) -> Result<Json<Empty>> {
    service.replica_verify_rebuild(req).await.map(Json)
}

pub async fn handle_replica_remove(
    Extension(service): Extension<Arc<ProxyService>>,
    Json(req): Json<EngineReplicaRemoveRequest>,
) -> Result<Json<Empty>> {
    tracing::info!(
        "Removing replica {} from volume {}",
        req.replica_address,
        req.proxy_engine_request.volume_name
    );
    service.replica_remove(req).await.map(Json)
}

pub async fn handle_replica_mode_update(
    Extension(service): Extension<Arc<ProxyService>>,
    Json(req): Json<EngineReplicaModeUpdateRequest>,
) -> Result<Json<Empty>> {
    service.replica_mode_update(req).await.map(Json)
}

pub async fn handle_metrics_get(
    Extension(service): Extension<Arc<ProxyService>>,
    Json(req): Json<EngineRequest>,
) -> Result<Json<EngineMetricsGetProxyResponse>> {
    service.metrics_get(req).await.map(Json)
}
