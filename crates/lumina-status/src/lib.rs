//! # lumina-status
//!
//! Replication of player status to observers.
//!
//! The executor publishes partial updates; the hub merges them into a
//! last-known record and fans each patch out to subscribers. Observers that
//! join late start from [`StatusHub::subscribe_with_snapshot`].

use chrono::{DateTime, Utc};
use lumina_core::{PlayerStatus, Result, StatusPatch, StatusPublisher};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

/// Default number of patches buffered per slow subscriber.
pub const DEFAULT_CAPACITY: usize = 64;

/// Message sent to status observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum StatusEvent {
    /// Incremental update.
    Status(StatusPatch),
    /// Full record, sent once when an observer joins.
    Snapshot(PlayerStatus),
}

impl StatusEvent {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Last-known status with the time it last changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub status: PlayerStatus,
    pub updated_at: DateTime<Utc>,
}

pub struct StatusHub {
    current: RwLock<StatusSnapshot>,
    tx: broadcast::Sender<StatusPatch>,
}

impl StatusHub {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            current: RwLock::new(StatusSnapshot {
                status: PlayerStatus::default(),
                updated_at: Utc::now(),
            }),
            tx,
        }
    }

    /// Receive every patch published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<StatusPatch> {
        self.tx.subscribe()
    }

    /// Current record plus a receiver positioned right after it, so no patch
    /// is missed or applied twice.
    pub fn subscribe_with_snapshot(&self) -> (PlayerStatus, broadcast::Receiver<StatusPatch>) {
        let current = self.current.read();
        (current.status.clone(), self.tx.subscribe())
    }

    pub fn status(&self) -> PlayerStatus {
        self.current.read().status.clone()
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.current.read().clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for StatusHub {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusPublisher for StatusHub {
    fn publish(&self, patch: StatusPatch) {
        if patch.is_empty() {
            return;
        }
        let mut current = self.current.write();
        current.status.apply(&patch);
        current.updated_at = Utc::now();
        trace!("Status patch {:?}", patch);
        // Sent under the lock so snapshot subscribers see a consistent order.
        // No subscribers is not an error.
        let _ = self.tx.send(patch);
    }
}
