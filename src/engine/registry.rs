//! Connection Registry
//!
//! Keeps one warm connection per engine address. Each address maps to a slot
//! holding a `OnceCell` with the outcome of one dial: concurrent acquirers of
//! an address that has no connection yet all wait on that dial and all see its
//! result, success or failure. A failed slot is removed from the map, so the
//! next acquire dials again and unreachable addresses do not accumulate.
//!
//! Invalidation swaps the slot out of the map, which starts a new epoch for
//! that address.

use super::connection::{EngineConnection, EngineConnector};
use crate::error::{ProxyError, Result};

use dashmap::DashMap;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::OnceCell;

struct Slot {
    epoch: u64,
    cell: OnceCell<Result<Arc<dyn EngineConnection>>>,
}

impl Slot {
    fn connection(&self) -> Option<&Arc<dyn EngineConnection>> {
        match self.cell.get() {
            Some(Ok(connection)) => Some(connection),
            _ => None,
        }
    }
}

/// A connection borrowed for the duration of one call.
pub struct Lease {
    address: String,
    epoch: u64,
    connection: Arc<dyn EngineConnection>,
}

impl Lease {
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

impl Deref for Lease {
    type Target = dyn EngineConnection;

    fn deref(&self) -> &Self::Target {
        self.connection.as_ref()
    }
}

pub struct ConnectionRegistry {
    connector: Arc<dyn EngineConnector>,
    slots: DashMap<String, Arc<Slot>>,
    next_epoch: AtomicU64,
    dial_timeout: Duration,
}

impl ConnectionRegistry {
    pub fn new(connector: Arc<dyn EngineConnector>, dial_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            connector,
            slots: DashMap::new(),
            next_epoch: AtomicU64::new(1),
            dial_timeout,
        })
    }

    /// Returns the live connection for `address`, dialing it if needed.
    pub async fn acquire(&self, address: &str) -> Result<Lease> {
        // Clone the slot out so no map guard is held across the dial.
        let slot = self
            .slots
            .entry(address.to_string())
            .or_insert_with(|| {
                Arc::new(Slot {
                    epoch: self.next_epoch.fetch_add(1, Ordering::Relaxed),
                    cell: OnceCell::new(),
                })
            })
            .clone();

        let outcome = slot
            .cell
            .get_or_init(|| self.dial(address, slot.epoch))
            .await;

        let connection = match outcome {
            Ok(connection) => connection.clone(),
            Err(e) => {
                // Later acquires must dial again; waiters on this attempt share the error.
                self.slots
                    .remove_if(address, |_, current| current.epoch == slot.epoch);
                return Err(e.clone());
            }
        };

        Ok(Lease {
            address: address.to_string(),
            epoch: slot.epoch,
            connection,
        })
    }

    async fn dial(&self, address: &str, epoch: u64) -> Result<Arc<dyn EngineConnection>> {
        tracing::debug!("Dialing engine {} (epoch {})", address, epoch);

        match tokio::time::timeout(self.dial_timeout, self.connector.dial(address)).await {
            Ok(Ok(connection)) => {
                tracing::info!("Established connection to engine {}", address);
                Ok(connection)
            }
            Ok(Err(e)) => {
                tracing::warn!("Failed to dial engine {}: {}", address, e);
                Err(e)
            }
            Err(_) => {
                tracing::warn!(
                    "Dial to engine {} timed out after {:?}",
                    address,
                    self.dial_timeout
                );
                Err(ProxyError::Connection {
                    address: address.to_string(),
                    message: format!("dial timed out after {:?}", self.dial_timeout),
                })
            }
        }
    }

    /// Connections stay warm between calls, so there is nothing to hand back.
    pub fn release(&self, address: &str) {
        tracing::trace!("Released lease on engine {}", address);
    }

    /// Drops and closes the connection for `address` unconditionally.
    pub fn invalidate(&self, address: &str) {
        if let Some((_, slot)) = self.slots.remove(address) {
            close_slot(address, &slot);
        }
    }

    /// Invalidates only if the lease still refers to the current epoch, so a
    /// late failure on an old connection cannot evict a freshly dialed one.
    pub fn invalidate_lease(&self, lease: &Lease) {
        if let Some((_, slot)) = self
            .slots
            .remove_if(&lease.address, |_, slot| slot.epoch == lease.epoch)
        {
            close_slot(&lease.address, &slot);
        }
    }

    /// Addresses with an established connection.
    pub fn addresses(&self) -> Vec<String> {
        self.slots
            .iter()
            .filter(|entry| entry.value().connection().is_some())
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn connection_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|entry| entry.value().connection().is_some())
            .count()
    }

    /// Addresses with a slot, dialed or not.
    #[cfg(test)]
    pub(crate) fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn close_all(&self) {
        let addresses: Vec<String> = self.slots.iter().map(|entry| entry.key().clone()).collect();
        for address in addresses {
            self.invalidate(&address);
        }
        tracing::info!("Closed all engine connections");
    }
}

fn close_slot(address: &str, slot: &Slot) {
    if let Some(connection) = slot.connection() {
        connection.close();
        tracing::info!(
            "Invalidated connection to engine {} (epoch {})",
            address,
            slot.epoch
        );
    }
}
