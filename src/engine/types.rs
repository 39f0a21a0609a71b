use serde::{Deserialize, Serialize};
use std::fmt;

/// Storage data path an engine instance runs on.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum DataEngine {
    #[default]
    #[serde(rename = "DATA_ENGINE_V1")]
    V1,
    #[serde(rename = "DATA_ENGINE_V2")]
    V2,
}

/// Deprecated predecessor of [`DataEngine`]; still accepted on the wire.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BackendStoreDriver {
    #[serde(rename = "v1")]
    V1,
    #[serde(rename = "v2")]
    V2,
}

impl From<BackendStoreDriver> for DataEngine {
    fn from(driver: BackendStoreDriver) -> Self {
        match driver {
            BackendStoreDriver::V1 => DataEngine::V1,
            BackendStoreDriver::V2 => DataEngine::V2,
        }
    }
}

impl fmt::Display for DataEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataEngine::V1 => write!(f, "v1"),
            DataEngine::V2 => write!(f, "v2"),
        }
    }
}

/// Picks the data engine for a request carrying either or both selectors.
///
/// `data_engine` wins when both are set. A disagreement is logged rather than
/// rejected, since older control planes still fill in only the driver field.
pub fn resolve_data_engine(
    data_engine: Option<DataEngine>,
    backend_store_driver: Option<BackendStoreDriver>,
) -> DataEngine {
    match (data_engine, backend_store_driver) {
        (Some(engine), Some(driver)) => {
            let legacy = DataEngine::from(driver);
            if legacy != engine {
                tracing::warn!(
                    "Conflicting data engine selectors: data_engine={} backend_store_driver={}, using data_engine",
                    engine,
                    legacy
                );
            }
            engine
        }
        (Some(engine), None) => engine,
        (None, Some(driver)) => driver.into(),
        (None, None) => DataEngine::default(),
    }
}

/// Identifies the engine process and volume a call is aimed at.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EngineTarget {
    pub address: String,
    pub engine_name: String,
    pub volume_name: String,
    pub data_engine: DataEngine,
}

/// Replica access mode as reported by the engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ReplicaMode {
    #[serde(rename = "RW")]
    ReadWrite,
    #[serde(rename = "WO")]
    WriteOnly,
    #[serde(rename = "ERR")]
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ControllerReplica {
    pub address: String,
    pub mode: ReplicaMode,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ReplicaListReply {
    #[serde(default)]
    pub replicas: Vec<ControllerReplica>,
}

impl ReplicaListReply {
    /// Addresses of the replicas that can take part in a long-running operation.
    pub fn healthy_addresses(&self) -> Vec<String> {
        self.replicas
            .iter()
            .filter(|replica| replica.mode != ReplicaMode::Error)
            .map(|replica| replica.address.clone())
            .collect()
    }
}

/// Methods exposed by an engine instance, one per path under `/v1/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineMethod {
    ServerVersionGet,
    VolumeGet,
    VolumeExpand,
    VolumeFrontendStart,
    VolumeFrontendShutdown,
    VolumeUnmapMarkSnapChainRemovedSet,
    VolumeSnapshotMaxCountSet,
    VolumeSnapshotMaxSizeSet,
    VolumeSnapshot,
    SnapshotList,
    SnapshotRevert,
    SnapshotPurge,
    SnapshotPurgeStatus,
    SnapshotClone,
    SnapshotCloneStatus,
    SnapshotRemove,
    SnapshotHash,
    SnapshotHashStatus,
    SnapshotBackup,
    SnapshotBackupStatus,
    BackupRestore,
    BackupRestoreStatus,
    BackupRestoreFinish,
    CleanupBackupMountPoints,
    ReplicaAdd,
    ReplicaList,
    ReplicaRebuildingStatus,
    ReplicaVerifyRebuild,
    ReplicaRemove,
    ReplicaModeUpdate,
    MetricsGet,
}

impl EngineMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineMethod::ServerVersionGet => "ServerVersionGet",
            EngineMethod::VolumeGet => "VolumeGet",
            EngineMethod::VolumeExpand => "VolumeExpand",
            EngineMethod::VolumeFrontendStart => "VolumeFrontendStart",
            EngineMethod::VolumeFrontendShutdown => "VolumeFrontendShutdown",
            EngineMethod::VolumeUnmapMarkSnapChainRemovedSet => {
                "VolumeUnmapMarkSnapChainRemovedSet"
            }
            EngineMethod::VolumeSnapshotMaxCountSet => "VolumeSnapshotMaxCountSet",
            EngineMethod::VolumeSnapshotMaxSizeSet => "VolumeSnapshotMaxSizeSet",
            EngineMethod::VolumeSnapshot => "VolumeSnapshot",
            EngineMethod::SnapshotList => "SnapshotList",
            EngineMethod::SnapshotRevert => "SnapshotRevert",
            EngineMethod::SnapshotPurge => "SnapshotPurge",
            EngineMethod::SnapshotPurgeStatus => "SnapshotPurgeStatus",
            EngineMethod::SnapshotClone => "SnapshotClone",
            EngineMethod::SnapshotCloneStatus => "SnapshotCloneStatus",
            EngineMethod::SnapshotRemove => "SnapshotRemove",
            EngineMethod::SnapshotHash => "SnapshotHash",
            EngineMethod::SnapshotHashStatus => "SnapshotHashStatus",
            EngineMethod::SnapshotBackup => "SnapshotBackup",
            EngineMethod::SnapshotBackupStatus => "SnapshotBackupStatus",
            EngineMethod::BackupRestore => "BackupRestore",
            EngineMethod::BackupRestoreStatus => "BackupRestoreStatus",
            EngineMethod::BackupRestoreFinish => "BackupRestoreFinish",
            EngineMethod::CleanupBackupMountPoints => "CleanupBackupMountPoints",
            EngineMethod::ReplicaAdd => "ReplicaAdd",
            EngineMethod::ReplicaList => "ReplicaList",
            EngineMethod::ReplicaRebuildingStatus => "ReplicaRebuildingStatus",
            EngineMethod::ReplicaVerifyRebuild => "ReplicaVerifyRebuild",
            EngineMethod::ReplicaRemove => "ReplicaRemove",
            EngineMethod::ReplicaModeUpdate => "ReplicaModeUpdate",
            EngineMethod::MetricsGet => "MetricsGet",
        }
    }

    /// Path of this method on the engine's HTTP API.
    pub fn path(&self) -> String {
        format!("/v1/{}", self.as_str())
    }
}

impl fmt::Display for EngineMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
