//! Snapshot of the tracker kept in a single blob slot.
//!
//! The slot is read once at startup and overwritten after every applied
//! mutation. Writes go through a background task that always stores the
//! newest snapshot; a snapshot superseded before it was written is skipped.

use std::sync::Arc;

use anyhow::Context;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::goals::model::GoalProfile;
use crate::ledger::repo::Ledger;
use crate::storage::StorageClient;
use crate::tracker::Tracker;

pub const SNAPSHOT_CONTENT_TYPE: &str = "application/json";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotRef<'a> {
    ledger: &'a Ledger,
    goal_profile: &'a GoalProfile,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snapshot {
    #[serde(default, alias = "logs")]
    ledger: Ledger,
    #[serde(default, alias = "goal")]
    goal_profile: GoalProfile,
}

pub fn encode(tracker: &Tracker) -> anyhow::Result<Bytes> {
    let body = serde_json::to_vec(&SnapshotRef {
        ledger: &tracker.ledger,
        goal_profile: &tracker.goal,
    })
    .context("serialize snapshot")?;
    Ok(Bytes::from(body))
}

/// The draft starts as a copy of the stored profile; drafts are never persisted.
pub fn decode(body: &[u8]) -> anyhow::Result<Tracker> {
    let snapshot: Snapshot = serde_json::from_slice(body).context("parse snapshot")?;
    Ok(Tracker::new(
        snapshot.ledger.normalized(),
        snapshot.goal_profile,
    ))
}

/// Reads the slot. Missing, unreadable or corrupt data yields a default tracker.
pub async fn load(storage: &dyn StorageClient, key: &str) -> Tracker {
    let body = match storage.get_object(key).await {
        Ok(Some(body)) => body,
        Ok(None) => {
            info!(key, "no saved data; starting fresh");
            return Tracker::default();
        }
        Err(e) => {
            warn!(error = %e, key, "failed to read saved data; starting fresh");
            return Tracker::default();
        }
    };
    match decode(&body) {
        Ok(tracker) => {
            info!(key, days = tracker.ledger.len(), "saved data loaded");
            tracker
        }
        Err(e) => {
            warn!(error = %format!("{e:#}"), key, "failed to load saved data; starting fresh");
            Tracker::default()
        }
    }
}

/// Fire-and-forget writer for the snapshot slot.
#[derive(Clone)]
pub struct Persister {
    tx: Arc<watch::Sender<Option<Bytes>>>,
}

impl Persister {
    /// Spawns the writer task on the current runtime.
    pub fn spawn(storage: Arc<dyn StorageClient>, key: String) -> Self {
        let (tx, mut rx) = watch::channel::<Option<Bytes>>(None);
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let Some(body) = rx.borrow_and_update().clone() else {
                    continue;
                };
                match storage.put_object(&key, body, SNAPSHOT_CONTENT_TYPE).await {
                    Ok(()) => debug!(key = %key, "snapshot written"),
                    Err(e) => warn!(error = %e, key = %key, "snapshot write failed"),
                }
            }
            debug!("persister stopped");
        });
        Self { tx: Arc::new(tx) }
    }

    /// Queues the current state. Never blocks on storage.
    pub fn save(&self, tracker: &Tracker) {
        match encode(tracker) {
            Ok(body) => {
                self.tx.send_replace(Some(body));
            }
            Err(e) => warn!(error = %e, "snapshot encode failed"),
        }
    }
}
