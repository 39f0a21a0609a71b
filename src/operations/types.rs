use crate::engine::types::{EngineMethod, EngineTarget};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Unique identifier of one incarnation of an operation.
///
/// Two operations may share an [`OperationKey`] over time (a purge that
/// completed and is started again); the id tells them apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperationId(pub String);

impl OperationId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Backup,
    Restore,
    SnapshotPurge,
    SnapshotClone,
    SnapshotHash,
    ReplicaRebuild,
}

impl OperationKind {
    /// Engine method a poller calls to learn one replica's progress.
    pub fn status_method(&self) -> EngineMethod {
        match self {
            OperationKind::Backup => EngineMethod::SnapshotBackupStatus,
            OperationKind::Restore => EngineMethod::BackupRestoreStatus,
            OperationKind::SnapshotPurge => EngineMethod::SnapshotPurgeStatus,
            OperationKind::SnapshotClone => EngineMethod::SnapshotCloneStatus,
            OperationKind::SnapshotHash => EngineMethod::SnapshotHashStatus,
            OperationKind::ReplicaRebuild => EngineMethod::ReplicaRebuildingStatus,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Backup => "backup",
            OperationKind::Restore => "restore",
            OperationKind::SnapshotPurge => "snapshot_purge",
            OperationKind::SnapshotClone => "snapshot_clone",
            OperationKind::SnapshotHash => "snapshot_hash",
            OperationKind::ReplicaRebuild => "replica_rebuild",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable identity of a long-running operation.
///
/// Built only from fields a narrow `*Status` request still carries, so a
/// status query can find the operation without the original start request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperationKey {
    pub address: String,
    pub engine_name: String,
    pub volume_name: String,
    pub kind: OperationKind,
    /// Backup name, snapshot name or replica address, depending on the kind.
    pub discriminator: Option<String>,
}

impl OperationKey {
    pub fn new(target: &EngineTarget, kind: OperationKind, discriminator: Option<&str>) -> Self {
        Self {
            address: target.address.clone(),
            engine_name: target.engine_name.clone(),
            volume_name: target.volume_name.clone(),
            kind,
            discriminator: discriminator
                .filter(|value| !value.is_empty())
                .map(str::to_string),
        }
    }

    /// True if this key belongs to `target` and `kind`, whatever its discriminator.
    pub fn matches(&self, target: &EngineTarget, kind: OperationKind) -> bool {
        self.kind == kind
            && self.address == target.address
            && self.engine_name == target.engine_name
            && self.volume_name == target.volume_name
    }
}

impl fmt::Display for OperationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.address, self.engine_name, self.volume_name, self.kind
        )?;
        if let Some(discriminator) = &self.discriminator {
            write!(f, "/{}", discriminator)?;
        }
        Ok(())
    }
}

/// Per-replica state as the engine reports it.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReplicaState {
    #[default]
    InProgress,
    Complete,
    Error,
}

impl ReplicaState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReplicaState::Complete | ReplicaState::Error)
    }
}

/// Shape every per-kind status payload shares.
pub trait ReplicaProgress:
    Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    fn state(&self) -> ReplicaState;

    fn progress(&self) -> i32;

    fn error(&self) -> Option<&str>;

    /// Status recorded when the proxy itself gives up on a replica.
    fn failed(replica_address: &str, message: String) -> Self;
}

/// Replica address to status. No ordering guarantee; an absent replica has
/// simply not reported yet.
pub type StatusMap<S> = HashMap<String, S>;
