use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use common::NodeRecord;
use tokio::sync::RwLock;

use crate::BeekeeperClient;
use crate::error::Result;

/// Immutable joined view, shared between readers.
#[derive(Debug, Clone)]
pub struct NodeSnapshot {
    pub ticket: u64,
    pub fetched_at: DateTime<Utc>,
    pub nodes: Arc<[NodeRecord]>,
}

/// Holds the most recent joined node view in memory.
///
/// Every refresh draws a ticket before fetching; a completed fetch is kept only
/// if no later ticket has been stored yet, so a slow, older refresh never
/// replaces a newer one.
#[derive(Clone)]
pub struct SnapshotCache {
    client: BeekeeperClient,
    next_ticket: Arc<AtomicU64>,
    current: Arc<RwLock<Option<NodeSnapshot>>>,
}

impl SnapshotCache {
    pub fn new(client: BeekeeperClient) -> Self {
        Self {
            client,
            next_ticket: Arc::new(AtomicU64::new(0)),
            current: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn latest(&self) -> Option<NodeSnapshot> {
        self.current.read().await.clone()
    }

    /// Fetches a fresh joined view. On failure the previous snapshot stays in place.
    pub async fn refresh(&self) -> Result<NodeSnapshot> {
        let ticket = self.begin();
        let nodes = self.client.fetch_joined_state().await?;
        let candidate = NodeSnapshot {
            ticket,
            fetched_at: Utc::now(),
            nodes: nodes.into(),
        };

        if self.complete(candidate.clone()).await {
            Ok(candidate)
        } else {
            Ok(self.latest().await.unwrap_or(candidate))
        }
    }

    pub async fn latest_or_refresh(&self) -> Result<NodeSnapshot> {
        match self.latest().await {
            Some(snapshot) => Ok(snapshot),
            None => self.refresh().await,
        }
    }

    fn begin(&self) -> u64 {
        self.next_ticket.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Returns whether `snapshot` became the current one.
    async fn complete(&self, snapshot: NodeSnapshot) -> bool {
        let mut current = self.current.write().await;
        if current
            .as_ref()
            .is_some_and(|stored| stored.ticket > snapshot.ticket)
        {
            tracing::debug!(
                ticket = snapshot.ticket,
                "discarding stale node snapshot"
            );
            return false;
        }

        *current = Some(snapshot);
        true
    }
}
