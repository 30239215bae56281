//! Change-feed broadcast for table events.
//!
//! Every committed insert/update/delete publishes a [`RowChange`] through a
//! tokio broadcast channel. Subscribers filter client-side, the way the
//! hosted platform's per-table subscriptions do. Lagging subscribers drop
//! the oldest events; consumers reconcile by re-fetching, so a dropped
//! event costs freshness, not correctness.

use std::sync::atomic::{AtomicU64, Ordering};
use serde_json::Value;
use tokio::sync::broadcast;

/// What happened to the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Inserted,
    Updated,
    Deleted,
}

/// One committed row change.
///
/// `old` is present for updates and deletes, `new` for inserts and
/// updates — the `{old, new}` pair the platform's change feed delivers.
#[derive(Debug, Clone)]
pub struct RowChange {
    pub table: &'static str,
    pub kind: ChangeKind,
    pub old: Option<Value>,
    pub new: Option<Value>,
}

/// Fan-out of row changes to all subscribers.
pub struct ChangeFeed {
    sender: broadcast::Sender<RowChange>,
    published: AtomicU64,
}

impl ChangeFeed {
    /// `capacity` bounds how many events a slow subscriber may fall behind
    /// before it starts losing the oldest ones.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            published: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RowChange> {
        self.sender.subscribe()
    }

    /// Publish a change. A send error only means nobody is listening.
    pub fn publish(&self, change: RowChange) {
        self.published.fetch_add(1, Ordering::Relaxed);
        let _ = self.sender.send(change);
    }

    /// Total events published since construction.
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}
