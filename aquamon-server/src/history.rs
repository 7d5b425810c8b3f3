//! In-memory per-pond snapshot history.
//!
//! Keeps the most recent snapshots per pond, newest last, so a predict
//! request can derive a trend without the caller resending the prior
//! reading. Bounded per pond; the oldest entry falls off.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use aquamon_core::{PondId, SensorSnapshot};
use tokio::sync::RwLock;

#[derive(Clone)]
pub struct SnapshotHistory {
    capacity: usize,
    ponds: Arc<RwLock<HashMap<PondId, VecDeque<SensorSnapshot>>>>,
}

impl SnapshotHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            ponds: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Record a snapshot and return the one before it, if any. Stale
    /// snapshots (not newer than the pond's latest) are not recorded
    /// and the latest is returned as the trend anchor instead.
    pub async fn record(&self, snapshot: SensorSnapshot) -> Option<SensorSnapshot> {
        let mut ponds = self.ponds.write().await;
        let history = ponds.entry(snapshot.pond_id.clone()).or_default();

        if let Some(latest) = history.back()
            && latest.timestamp >= snapshot.timestamp
        {
            return history.back().cloned();
        }

        let previous = history.back().cloned();
        history.push_back(snapshot);
        while history.len() > self.capacity {
            history.pop_front();
        }
        previous
    }

    pub async fn latest(&self, pond: &PondId) -> Option<SensorSnapshot> {
        let ponds = self.ponds.read().await;
        ponds.get(pond).and_then(|h| h.back()).cloned()
    }

    pub async fn len(&self, pond: &PondId) -> usize {
        let ponds = self.ponds.read().await;
        ponds.get(pond).map_or(0, VecDeque::len)
    }
}
