//! The optimistic mutation primitive.
//!
//! Toggles apply locally first, then commit remotely:
//!
//! ```text
//! snapshot ── apply ── commit ──ok──► keep (Committed)
//!                        │
//!                        └─err──► restore snapshot (RolledBack)
//! ```
//!
//! A per-entity in-flight set serializes toggles: while a commit for an
//! entity is outstanding, further toggles on the same entity are skipped
//! rather than queued, so the user cannot race the remote into an
//! inconsistent edge state. Remote failure is absorbed into the outcome,
//! not surfaced as an error; the caller's state is back to the snapshot.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Mutex;

use uuid::Uuid;

use connect_core::RemoteError;

use crate::store::{AppStore, StoreError, StoreState};

/// How an optimistic toggle resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// Applied locally and committed remotely.
    Committed,
    /// Applied locally, commit failed, local state restored.
    RolledBack,
    /// Another toggle for the same entity was in flight; nothing happened.
    Skipped,
}

/// Run one optimistic mutation against the store.
pub(crate) async fn run<A, C, Fut>(
    store: &AppStore,
    entity: Uuid,
    apply: A,
    commit: C,
) -> Result<ToggleOutcome, StoreError>
where
    A: FnOnce(&mut StoreState),
    C: FnOnce() -> Fut,
    Fut: Future<Output = Result<(), RemoteError>>,
{
    let Some(_guard) = InFlightGuard::acquire(&store.in_flight, entity) else {
        log::debug!("toggle for {entity} already in flight, skipping");
        return Ok(ToggleOutcome::Skipped);
    };

    let snapshot = {
        let mut state = store.state.write().await;
        let snapshot = state.clone();
        apply(&mut state);
        snapshot
    };

    match commit().await {
        Ok(()) => Ok(ToggleOutcome::Committed),
        Err(err) => {
            log::warn!("commit for {entity} failed, rolling back: {err}");
            *store.state.write().await = snapshot;
            Ok(ToggleOutcome::RolledBack)
        }
    }
}

/// Membership in the in-flight set, released on drop.
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<Uuid>>,
    entity: Uuid,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(set: &'a Mutex<HashSet<Uuid>>, entity: Uuid) -> Option<Self> {
        let mut in_flight = set.lock().expect("in-flight lock poisoned");
        if !in_flight.insert(entity) {
            return None;
        }
        Some(InFlightGuard { set, entity })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .expect("in-flight lock poisoned")
            .remove(&self.entity);
    }
}
