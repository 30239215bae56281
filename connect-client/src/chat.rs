//! A live two-party conversation.
//!
//! `Conversation::open` subscribes to the change feed *before* the initial
//! fetch, so nothing sent in between is missed; the intake task then keeps
//! the transcript current. Incoming messages are deduplicated by id — the
//! sender's own messages come back over the feed too, and the transcript
//! must not double them. Messages addressed to the viewer are marked read
//! the moment they are seen, which is what drives the peer's read receipts.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

use connect_backend::{tables, Backend, ChangeKind, Filter, RowChange};
use connect_core::{Message, RemoteError};

use crate::store::{AppStore, StoreError};

/// One open conversation between the viewer and a peer.
///
/// Dropping the conversation stops its intake task.
pub struct Conversation {
    store: Arc<AppStore>,
    me: Uuid,
    peer: Uuid,
    messages: Arc<Mutex<Vec<Message>>>,
    intake: JoinHandle<()>,
}

impl std::fmt::Debug for Conversation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conversation")
            .field("me", &self.me)
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}

impl Conversation {
    /// Open the conversation with `peer` and load its transcript.
    pub async fn open(store: &Arc<AppStore>, peer: Uuid) -> Result<Conversation, StoreError> {
        let me = store.viewer_id().await?;
        let messages = Arc::new(Mutex::new(Vec::new()));

        // Subscribe before the initial fetch
        let rx = store.backend.subscribe();
        let intake = tokio::spawn(intake_loop(
            rx,
            Arc::downgrade(store),
            Arc::clone(&messages),
            me,
            peer,
        ));

        let conversation = Conversation {
            store: Arc::clone(store),
            me,
            peer,
            messages,
            intake,
        };
        conversation.load().await?;
        Ok(conversation)
    }

    pub fn peer(&self) -> Uuid {
        self.peer
    }

    /// Transcript snapshot, oldest first.
    pub async fn messages(&self) -> Vec<Message> {
        self.messages.lock().await.clone()
    }

    /// Re-fetch the transcript and mark everything addressed to the viewer
    /// as read, in one batch.
    pub async fn load(&self) -> Result<Vec<Message>, StoreError> {
        let mut fetched = fetch_transcript(&self.store.backend, self.me, self.peer).await?;

        let unread: Vec<Uuid> = fetched
            .iter()
            .filter(|m| m.receiver_id == self.me && !m.read)
            .map(|m| m.id)
            .collect();
        if !unread.is_empty() {
            // Read receipts are best-effort; a failed mark leaves the
            // messages unread and the next load retries
            match mark_read(&self.store.backend, &unread).await {
                Ok(()) => {
                    for message in &mut fetched {
                        if unread.contains(&message.id) {
                            message.read = true;
                        }
                    }
                }
                Err(err) => log::warn!("batch read-mark failed: {err}"),
            }
            self.store.refresh_unread_total().await;
        }

        // The intake task may have appended messages while the fetch was in
        // flight; their feed events are already consumed, so replacing the
        // transcript would lose them. Merge by id instead.
        let mut messages = self.messages.lock().await;
        for live in messages.iter() {
            if !fetched.iter().any(|m| m.id == live.id) {
                fetched.push(live.clone());
            }
        }
        fetched.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        *messages = fetched.clone();
        drop(messages);
        Ok(fetched)
    }

    /// Send a message to the peer. Blank input is a silent no-op, matching
    /// the compose box. The sent message is appended locally right away;
    /// when it echoes back over the feed, dedup keeps it single.
    pub async fn send(&self, content: &str) -> Result<Option<Message>, StoreError> {
        let content = content.trim();
        if content.is_empty() {
            return Ok(None);
        }
        let row = self
            .store
            .backend
            .insert(
                tables::MESSAGES,
                Message::insert_row(self.me, self.peer, content),
            )
            .await?;
        let message = Message::from_row(&row)
            .ok_or_else(|| RemoteError::Malformed("insert returned unusable row".to_owned()))?;

        let mut messages = self.messages.lock().await;
        if !messages.iter().any(|m| m.id == message.id) {
            messages.push(message.clone());
        }
        Ok(Some(message))
    }

    /// Delete messages the viewer sent. Optimistic: they vanish from the
    /// transcript immediately; if the remote delete fails, the transcript
    /// is reconciled by re-fetching, and the error surfaces.
    pub async fn delete_messages(&self, ids: &[Uuid]) -> Result<(), StoreError> {
        {
            let messages = self.messages.lock().await;
            for id in ids {
                let message = messages
                    .iter()
                    .find(|m| m.id == *id)
                    .ok_or(StoreError::UnknownEntity(*id))?;
                if message.sender_id != self.me {
                    return Err(StoreError::NotOwner);
                }
            }
        }

        self.messages
            .lock()
            .await
            .retain(|m| !ids.contains(&m.id));

        let filter = Filter::new()
            .id_in(ids.iter())
            .eq("sender_id", self.me.to_string());
        if let Err(err) = self.store.backend.delete(tables::MESSAGES, &filter).await {
            log::warn!("message delete failed, re-fetching transcript: {err}");
            if let Ok(fetched) = fetch_transcript(&self.store.backend, self.me, self.peer).await {
                *self.messages.lock().await = fetched;
            }
            return Err(err.into());
        }
        Ok(())
    }
}

impl Drop for Conversation {
    fn drop(&mut self) {
        self.intake.abort();
    }
}

/// Both directions of the conversation, oldest first.
async fn fetch_transcript(
    backend: &Backend,
    me: Uuid,
    peer: Uuid,
) -> Result<Vec<Message>, RemoteError> {
    let filter = Filter::new()
        .or_group(&[
            ("sender_id", Value::from(me.to_string())),
            ("receiver_id", Value::from(peer.to_string())),
        ])
        .or_group(&[
            ("sender_id", Value::from(peer.to_string())),
            ("receiver_id", Value::from(me.to_string())),
        ]);
    let rows = backend
        .select_ordered(tables::MESSAGES, &filter, "created_at", false)
        .await?;
    Ok(rows.iter().filter_map(Message::from_row).collect())
}

async fn mark_read(backend: &Backend, ids: &[Uuid]) -> Result<(), RemoteError> {
    backend
        .update(
            tables::MESSAGES,
            &Filter::new().id_in(ids.iter()),
            &json!({ "is_read": true }),
        )
        .await?;
    Ok(())
}

/// The intake task: folds feed events into the transcript until the feed
/// closes or the store is dropped.
async fn intake_loop(
    mut rx: tokio::sync::broadcast::Receiver<RowChange>,
    store: std::sync::Weak<AppStore>,
    messages: Arc<Mutex<Vec<Message>>>,
    me: Uuid,
    peer: Uuid,
) {
    loop {
        match rx.recv().await {
            Ok(change) => {
                if change.table != tables::MESSAGES {
                    continue;
                }
                let Some(store) = store.upgrade() else { break };
                handle_change(&store, &messages, me, peer, change).await;
            }
            Err(RecvError::Lagged(n)) => {
                log::warn!("conversation intake lagged by {n} events, re-fetching");
                let Some(store) = store.upgrade() else { break };
                if let Ok(fetched) = fetch_transcript(&store.backend, me, peer).await {
                    *messages.lock().await = fetched;
                }
            }
            Err(RecvError::Closed) => break,
        }
    }
}

async fn handle_change(
    store: &Arc<AppStore>,
    messages: &Mutex<Vec<Message>>,
    me: Uuid,
    peer: Uuid,
    change: RowChange,
) {
    match change.kind {
        ChangeKind::Inserted => {
            let Some(message) = change.new.as_ref().and_then(Message::from_row) else {
                return;
            };
            if !message.between(me, peer) {
                return;
            }
            let incoming_unread = message.receiver_id == me && !message.read;
            let id = message.id;
            {
                let mut messages = messages.lock().await;
                if !messages.iter().any(|m| m.id == id) {
                    messages.push(message);
                }
            }
            // Seeing the message is what reads it
            if incoming_unread {
                if let Err(err) = mark_read(&store.backend, &[id]).await {
                    log::warn!("read receipt for {id} failed: {err}");
                }
                store.refresh_unread_total().await;
                let mut messages = messages.lock().await;
                if let Some(local) = messages.iter_mut().find(|m| m.id == id) {
                    local.read = true;
                }
            }
        }
        ChangeKind::Updated => {
            let Some(incoming) = change.new.as_ref().and_then(Message::from_row) else {
                return;
            };
            if !incoming.between(me, peer) {
                return;
            }
            let mut messages = messages.lock().await;
            if let Some(local) = messages.iter_mut().find(|m| m.id == incoming.id) {
                // Newest wins; never regress onto an older version
                if incoming.created_at >= local.created_at {
                    *local = incoming;
                }
            }
        }
        ChangeKind::Deleted => {
            let Some(id) = change
                .old
                .as_ref()
                .and_then(|row| row.get("id"))
                .and_then(Value::as_str)
                .and_then(|s| Uuid::parse_str(s).ok())
            else {
                return;
            };
            messages.lock().await.retain(|m| m.id != id);
        }
    }
}
