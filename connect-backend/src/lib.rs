//! # connect-backend — in-process emulation of the hosted platform
//!
//! StartupConnect runs against a managed backend-as-a-service: session
//! auth with email confirmation, a relational store, a change feed,
//! presence channels, and object storage. This crate emulates that
//! surface in-process so the client store, the integration tests, and the
//! demo can run without the real service.
//!
//! ```text
//! ┌─────────────┐   select/insert/…   ┌──────────────┐
//! │ AppStore /  │ ◄──────────────────► │ TableStore   │
//! │ Conversation│                      └──────┬───────┘
//! └──────┬──────┘                             │ committed writes
//!        │ subscribe()                 ┌──────▼───────┐
//!        └─────────────────────────────│ ChangeFeed   │
//!                                      └──────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`table`] — JSON-row tables, filters, unique constraints, faults
//! - [`feed`] — broadcast change feed of committed writes
//! - [`auth`] — sign-up / confirmation / sessions
//! - [`presence`] — named membership channels with watch notifications
//! - [`storage`] — path-addressed object store

pub mod auth;
pub mod feed;
pub mod presence;
pub mod storage;
pub mod table;

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::broadcast;

use connect_core::{AuthError, RemoteError};

pub use auth::{AuthService, SessionInfo};
pub use feed::{ChangeKind, RowChange};
pub use presence::{PresenceGuard, PresenceRegistry};
pub use storage::ObjectStore;
pub use table::{Filter, TableSpec};

/// Table names used across the workspace.
pub mod tables {
    pub const PROFILES: &str = "profiles";
    pub const POSTS: &str = "posts";
    pub const POST_LIKES: &str = "post_likes";
    pub const FOLLOWS: &str = "follows";
    pub const MESSAGES: &str = "messages";
}

const SCHEMA: &[TableSpec] = &[
    TableSpec {
        name: tables::PROFILES,
        unique: &[&["username"]],
        auto_id: false,
        auto_timestamp: false,
    },
    TableSpec {
        name: tables::POSTS,
        unique: &[],
        auto_id: true,
        auto_timestamp: true,
    },
    TableSpec {
        name: tables::POST_LIKES,
        unique: &[&["post_id", "user_id"]],
        auto_id: false,
        auto_timestamp: false,
    },
    TableSpec {
        name: tables::FOLLOWS,
        unique: &[&["follower_id", "following_id"]],
        auto_id: false,
        auto_timestamp: false,
    },
    TableSpec {
        name: tables::MESSAGES,
        unique: &[],
        auto_id: true,
        auto_timestamp: true,
    },
];

const FEED_CAPACITY: usize = 256;

/// The emulated platform, shared as one `Arc` by every client.
pub struct Backend {
    pub auth: AuthService,
    pub presence: PresenceRegistry,
    pub storage: ObjectStore,
    tables: table::TableStore,
}

impl Backend {
    pub fn new() -> Arc<Backend> {
        Arc::new(Backend {
            auth: AuthService::new(),
            presence: PresenceRegistry::new(),
            storage: ObjectStore::new("https://storage.connect.test/media"),
            tables: table::TableStore::new(SCHEMA, FEED_CAPACITY),
        })
    }

    // ── Relational surface ─────────────────────────────────────────────

    pub async fn select(
        &self,
        table: &'static str,
        filter: &Filter,
    ) -> Result<Vec<Value>, RemoteError> {
        self.tables.select(table, filter).await
    }

    pub async fn select_ordered(
        &self,
        table: &'static str,
        filter: &Filter,
        column: &str,
        descending: bool,
    ) -> Result<Vec<Value>, RemoteError> {
        self.tables
            .select_ordered(table, filter, column, descending)
            .await
    }

    pub async fn count(&self, table: &'static str, filter: &Filter) -> Result<usize, RemoteError> {
        self.tables.count(table, filter).await
    }

    pub async fn insert(&self, table: &'static str, row: Value) -> Result<Value, RemoteError> {
        self.tables.insert(table, row).await
    }

    pub async fn update(
        &self,
        table: &'static str,
        filter: &Filter,
        patch: &Value,
    ) -> Result<Vec<Value>, RemoteError> {
        self.tables.update(table, filter, patch).await
    }

    pub async fn delete(
        &self,
        table: &'static str,
        filter: &Filter,
    ) -> Result<Vec<Value>, RemoteError> {
        self.tables.delete(table, filter).await
    }

    // ── Change feed ────────────────────────────────────────────────────

    pub fn subscribe(&self) -> broadcast::Receiver<RowChange> {
        self.tables.feed().subscribe()
    }

    /// Make the next n table writes fail with `RemoteError::Unavailable`.
    pub fn fail_next_writes(&self, n: usize) {
        self.tables.faults().fail_next_writes(n);
    }

    // ── Auth orchestration ─────────────────────────────────────────────

    /// Confirm an email and run the post-confirmation hook: if the
    /// subject has no profile row yet, create one from the sign-up
    /// metadata with fallback defaults.
    pub async fn confirm_email(&self, email: &str) -> Result<SessionInfo, AuthError> {
        let session = self.auth.confirm_email(email).await?;
        self.ensure_profile(&session).await?;
        Ok(session)
    }

    async fn ensure_profile(&self, session: &SessionInfo) -> Result<(), AuthError> {
        let filter = Filter::new().eq("id", session.user_id.to_string());
        let existing = self.select(tables::PROFILES, &filter).await?;
        if !existing.is_empty() {
            return Ok(());
        }

        let metadata = self
            .auth
            .metadata(&session.email)
            .await
            .unwrap_or(Value::Null);
        let meta_str = |key: &str| -> Value {
            match metadata.get(key).and_then(Value::as_str) {
                Some(s) if !s.is_empty() => Value::from(s),
                _ => Value::Null,
            }
        };

        log::info!(
            "auth: creating profile for newly confirmed user {}",
            session.user_id
        );
        let row = json!({
            "id": session.user_id.to_string(),
            "email": session.email,
            "full_name": metadata.get("full_name").and_then(Value::as_str).unwrap_or(""),
            "username": meta_str("username"),
            "user_type": metadata.get("user_type").and_then(Value::as_str).unwrap_or("entrepreneur"),
        });
        self.insert(tables::PROFILES, row).await?;
        Ok(())
    }

    /// Events published on the change feed so far.
    pub fn feed_events(&self) -> u64 {
        self.tables.feed().published()
    }
}
