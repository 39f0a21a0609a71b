//! Wire messages of the proxy's HTTP surface.
//!
//! Every request embeds a `proxy_engine_request` block naming the engine it is
//! aimed at. The router strips that block before the rest of the body is
//! forwarded to the engine. Read models the engine owns (version, volume,
//! metrics) are passed through as opaque JSON.

use crate::engine::types::{
    BackendStoreDriver, DataEngine, EngineTarget, ReplicaListReply, ReplicaMode,
    resolve_data_engine,
};
use crate::error::{ProxyError, Result};
use crate::operations::types::StatusMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Empty {}

/// Addressing block carried by every proxied request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProxyEngineRequest {
    pub address: String,
    pub engine_name: String,
    pub volume_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_engine: Option<DataEngine>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend_store_driver: Option<BackendStoreDriver>,
}

impl ProxyEngineRequest {
    pub fn target(&self) -> Result<EngineTarget> {
        if self.address.is_empty() {
            return Err(ProxyError::InvalidArgument(
                "proxy_engine_request.address is required".to_string(),
            ));
        }

        Ok(EngineTarget {
            address: self.address.clone(),
            engine_name: self.engine_name.clone(),
            volume_name: self.volume_name.clone(),
            data_engine: resolve_data_engine(self.data_engine, self.backend_store_driver),
        })
    }
}

/// Body of the RPCs that need nothing beyond the target.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineRequest {
    pub proxy_engine_request: ProxyEngineRequest,
}

// ============================================================
// VERSION / VOLUME
// ============================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineVersionProxyResponse {
    pub version: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineVolumeGetProxyResponse {
    pub volume: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VolumeExpandRequest {
    pub size: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineVolumeExpandRequest {
    pub proxy_engine_request: ProxyEngineRequest,
    pub expand: VolumeExpandRequest,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VolumeFrontendStartRequest {
    pub frontend: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineVolumeFrontendStartRequest {
    pub proxy_engine_request: ProxyEngineRequest,
    pub frontend_start: VolumeFrontendStartRequest,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VolumeSnapshotRequest {
    pub name: String,
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineVolumeSnapshotRequest {
    pub proxy_engine_request: ProxyEngineRequest,
    pub snapshot_volume: VolumeSnapshotRequest,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VolumeSnapshotReply {
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineVolumeSnapshotProxyResponse {
    pub snapshot: VolumeSnapshotReply,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VolumeUnmapMarkSnapChainRemovedSetRequest {
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineVolumeUnmapMarkSnapChainRemovedSetRequest {
    pub proxy_engine_request: ProxyEngineRequest,
    pub unmap_mark_snap: VolumeUnmapMarkSnapChainRemovedSetRequest,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VolumeSnapshotMaxCountSetRequest {
    pub count: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineVolumeSnapshotMaxCountSetRequest {
    pub proxy_engine_request: ProxyEngineRequest,
    pub count: VolumeSnapshotMaxCountSetRequest,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VolumeSnapshotMaxSizeSetRequest {
    pub size: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineVolumeSnapshotMaxSizeSetRequest {
    pub proxy_engine_request: ProxyEngineRequest,
    pub size: VolumeSnapshotMaxSizeSetRequest,
}

// ============================================================
// SNAPSHOTS
// ============================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineSnapshotDiskInfo {
    pub name: String,
    pub parent: String,
    pub children: HashMap<String, bool>,
    pub removed: bool,
    pub user_created: bool,
    pub created: String,
    pub size: String,
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineSnapshotListProxyResponse {
    pub disks: HashMap<String, EngineSnapshotDiskInfo>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineSnapshotRevertRequest {
    pub proxy_engine_request: ProxyEngineRequest,
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineSnapshotPurgeRequest {
    pub proxy_engine_request: ProxyEngineRequest,
    /// Succeed without starting anything while a purge is already running.
    pub skip_if_in_progress: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineSnapshotCloneRequest {
    pub proxy_engine_request: ProxyEngineRequest,
    pub from_engine_address: String,
    pub from_engine_name: String,
    pub from_volume_name: String,
    pub snapshot_name: String,
    pub export_backing_image_if_exist: bool,
    pub file_sync_http_client_timeout: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineSnapshotRemoveRequest {
    pub proxy_engine_request: ProxyEngineRequest,
    pub names: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineSnapshotHashRequest {
    pub proxy_engine_request: ProxyEngineRequest,
    pub snapshot_name: String,
    pub rehash: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineSnapshotHashStatusRequest {
    pub proxy_engine_request: ProxyEngineRequest,
    pub snapshot_name: String,
}

// ============================================================
// BACKUP / RESTORE
// ============================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineSnapshotBackupRequest {
    pub proxy_engine_request: ProxyEngineRequest,
    pub envs: Vec<String>,
    pub backup_name: String,
    pub snapshot_name: String,
    pub backup_target: String,
    pub backing_image_name: String,
    pub backing_image_checksum: String,
    pub labels: HashMap<String, String>,
    pub compression_method: String,
    pub concurrent_limit: i32,
    pub storage_class_name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineSnapshotBackupProxyResponse {
    pub backup_id: String,
    pub replica: String,
    pub is_incremental: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineSnapshotBackupStatusRequest {
    pub proxy_engine_request: ProxyEngineRequest,
    pub backup_name: String,
    /// Narrows the answer to one replica when set.
    pub replica_address: String,
    pub replica_name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineBackupRestoreRequest {
    pub proxy_engine_request: ProxyEngineRequest,
    pub envs: Vec<String>,
    pub url: String,
    pub target: String,
    pub volume_name: String,
    pub concurrent_limit: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReplicaError {
    pub address: String,
    pub message: String,
}

/// Replicas the engine could not start a restore on.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TaskError {
    pub replica_errors: Vec<ReplicaError>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineBackupRestoreProxyResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_error: Option<TaskError>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineBackupRestoreFinishRequest {
    pub proxy_engine_request: ProxyEngineRequest,
}

// ============================================================
// REPLICAS
// ============================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineReplicaAddRequest {
    pub proxy_engine_request: ProxyEngineRequest,
    pub replica_address: String,
    pub replica_name: String,
    pub restore: bool,
    pub size: i64,
    pub current_size: i64,
    pub fast_sync: bool,
    pub file_sync_http_client_timeout: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineReplicaListProxyResponse {
    pub replica_list: ReplicaListReply,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineReplicaVerifyRebuildRequest {
    pub proxy_engine_request: ProxyEngineRequest,
    pub replica_address: String,
    pub replica_name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineReplicaRemoveRequest {
    pub proxy_engine_request: ProxyEngineRequest,
    pub replica_address: String,
    pub replica_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineReplicaModeUpdateRequest {
    #[serde(default)]
    pub proxy_engine_request: ProxyEngineRequest,
    pub replica_address: String,
    pub mode: ReplicaMode,
}

// ============================================================
// METRICS / STATUS
// ============================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineMetricsGetProxyResponse {
    pub metrics: Value,
}

/// `{"status": {<replica address>: <entry>}}`, the shape of every `*Status` reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusProxyResponse<S> {
    pub status: StatusMap<S>,
}

impl<S> From<StatusMap<S>> for StatusProxyResponse<S> {
    fn from(status: StatusMap<S>) -> Self {
        Self { status }
    }
}
