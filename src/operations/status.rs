//! Per-kind Replica Status Payloads
//!
//! Field names follow the engine's own status replies so that entries can be
//! decoded from the engine and re-encoded to the control plane without
//! translation.

use super::types::{ReplicaProgress, ReplicaState};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackupStatus {
    pub replica_address: String,
    pub state: ReplicaState,
    pub progress: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub backup_url: String,
    pub snapshot_name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RestoreStatus {
    pub is_restoring: bool,
    pub last_restored: String,
    pub current_restoring_backup: String,
    pub progress: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub filename: String,
    pub state: ReplicaState,
    pub backup_url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SnapshotPurgeStatus {
    pub is_purging: bool,
    pub progress: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub state: ReplicaState,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SnapshotCloneStatus {
    pub is_cloning: bool,
    pub progress: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub state: ReplicaState,
    pub from_replica_address: String,
    pub snapshot_name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SnapshotHashStatus {
    pub state: ReplicaState,
    pub checksum: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub silently_corrupted: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReplicaRebuildStatus {
    pub is_rebuilding: bool,
    pub progress: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub state: ReplicaState,
    pub from_replica_address: String,
}

impl ReplicaProgress for BackupStatus {
    fn state(&self) -> ReplicaState {
        self.state
    }

    fn progress(&self) -> i32 {
        self.progress
    }

    fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    fn failed(replica_address: &str, message: String) -> Self {
        Self {
            replica_address: replica_address.to_string(),
            state: ReplicaState::Error,
            error: Some(message),
            ..Self::default()
        }
    }
}

impl ReplicaProgress for RestoreStatus {
    fn state(&self) -> ReplicaState {
        self.state
    }

    fn progress(&self) -> i32 {
        self.progress
    }

    fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    fn failed(_replica_address: &str, message: String) -> Self {
        Self {
            state: ReplicaState::Error,
            error: Some(message),
            ..Self::default()
        }
    }
}

impl ReplicaProgress for SnapshotPurgeStatus {
    fn state(&self) -> ReplicaState {
        self.state
    }

    fn progress(&self) -> i32 {
        self.progress
    }

    fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    fn failed(_replica_address: &str, message: String) -> Self {
        Self {
            state: ReplicaState::Error,
            error: Some(message),
            ..Self::default()
        }
    }
}

impl ReplicaProgress for SnapshotCloneStatus {
    fn state(&self) -> ReplicaState {
        self.state
    }

    fn progress(&self) -> i32 {
        self.progress
    }

    fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    fn failed(_replica_address: &str, message: String) -> Self {
        Self {
            state: ReplicaState::Error,
            error: Some(message),
            ..Self::default()
        }
    }
}

impl ReplicaProgress for SnapshotHashStatus {
    fn state(&self) -> ReplicaState {
        self.state
    }

    // Hashing reports no percentage.
    fn progress(&self) -> i32 {
        match self.state {
            ReplicaState::Complete => 100,
            _ => 0,
        }
    }

    fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    fn failed(_replica_address: &str, message: String) -> Self {
        Self {
            state: ReplicaState::Error,
            error: Some(message),
            ..Self::default()
        }
    }
}

impl ReplicaProgress for ReplicaRebuildStatus {
    fn state(&self) -> ReplicaState {
        self.state
    }

    fn progress(&self) -> i32 {
        self.progress
    }

    fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    fn failed(_replica_address: &str, message: String) -> Self {
        Self {
            state: ReplicaState::Error,
            error: Some(message),
            ..Self::default()
        }
    }
}
