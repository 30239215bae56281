//! The client data store.
//!
//! One `AppStore` per signed-in app instance. All reads go through
//! [`AppStore::state`], which hands out a snapshot; all mutations go through
//! the store's methods, so every write path either committed remotely or
//! left local state untouched (toggles roll back on failure, remote-first
//! operations never applied locally to begin with).

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use uuid::Uuid;

use connect_backend::{tables, Backend, Filter, PresenceGuard};
use connect_core::{
    validate, AuthError, AuthorCard, Post, PostDraft, ProfileUpdate, RemoteError, User,
    ValidationError,
};

use crate::optimistic::{self, ToggleOutcome};

/// Everything a store operation can fail with.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("operation requires a signed-in user")]
    AuthRequired,

    #[error("no such entity: {0}")]
    UnknownEntity(Uuid),

    #[error("only the owner may modify this")]
    NotOwner,

    #[error("you cannot follow yourself")]
    SelfFollow,

    #[error("this username is already taken")]
    DuplicateUsername,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// The viewer-scoped application state, cheap to snapshot.
///
/// `posts` carry their annotations (`likes`, `liked`, `author_followed`)
/// already resolved for the current viewer; `followed` is the set of user
/// ids the viewer follows and is the single source the annotation flags are
/// derived from.
#[derive(Debug, Clone, Default)]
pub struct StoreState {
    pub current_user: Option<User>,
    pub posts: Vec<Post>,
    pub users: Vec<User>,
    pub followed: HashSet<Uuid>,
    pub unread_total: usize,
}

/// The store. Shared as `Arc<AppStore>`; background watchers hold `Weak`
/// references so the store can be dropped while they are alive.
pub struct AppStore {
    pub(crate) backend: Arc<Backend>,
    pub(crate) state: RwLock<StoreState>,
    /// Entities with a toggle commit in flight. Guards are synchronous and
    /// never held across an await point.
    pub(crate) in_flight: Mutex<HashSet<Uuid>>,
    pub(crate) unread_watcher: Mutex<Option<JoinHandle<()>>>,
    pub(crate) presence_guard: Mutex<Option<PresenceGuard>>,
}

impl AppStore {
    pub fn new(backend: Arc<Backend>) -> Arc<AppStore> {
        Arc::new(AppStore {
            backend,
            state: RwLock::new(StoreState::default()),
            in_flight: Mutex::new(HashSet::new()),
            unread_watcher: Mutex::new(None),
            presence_guard: Mutex::new(None),
        })
    }

    pub fn backend(&self) -> &Arc<Backend> {
        &self.backend
    }

    /// Snapshot of the current state.
    pub async fn state(&self) -> StoreState {
        self.state.read().await.clone()
    }

    pub(crate) async fn viewer_id(&self) -> Result<Uuid, StoreError> {
        self.state
            .read()
            .await
            .current_user
            .as_ref()
            .map(|user| user.id)
            .ok_or(StoreError::AuthRequired)
    }

    // ── Fetches ────────────────────────────────────────────────────────

    /// Fetch the post feed, newest first, with per-viewer annotations.
    ///
    /// Posts, author profiles, likes, and the viewer's follow edges are
    /// fetched separately and joined client-side. Rows that fail to map are
    /// dropped, not fatal.
    pub async fn fetch_posts(&self) -> Result<Vec<Post>, StoreError> {
        let viewer = self.state.read().await.current_user.as_ref().map(|u| u.id);

        let post_rows = self
            .backend
            .select_ordered(tables::POSTS, &Filter::new(), "created_at", true)
            .await?;
        let profile_rows = self.backend.select(tables::PROFILES, &Filter::new()).await?;
        let like_rows = self
            .backend
            .select(tables::POST_LIKES, &Filter::new())
            .await?;
        let followed = match viewer {
            Some(viewer) => self.fetch_followed_ids(viewer).await?,
            None => HashSet::new(),
        };

        let authors: HashMap<&str, AuthorCard> = profile_rows
            .iter()
            .filter_map(|row| {
                let id = row.get("id").and_then(Value::as_str)?;
                Some((id, AuthorCard::from_profile_row(row)))
            })
            .collect();

        let mut like_counts: HashMap<&str, usize> = HashMap::new();
        let mut liked_by_viewer: HashSet<&str> = HashSet::new();
        let viewer_str = viewer.map(|id| id.to_string());
        for row in &like_rows {
            let Some(post_id) = row.get("post_id").and_then(Value::as_str) else {
                continue;
            };
            *like_counts.entry(post_id).or_default() += 1;
            if viewer_str.is_some()
                && row.get("user_id").and_then(Value::as_str) == viewer_str.as_deref()
            {
                liked_by_viewer.insert(post_id);
            }
        }

        let posts: Vec<Post> = post_rows
            .iter()
            .filter_map(|row| {
                let mut post = Post::from_row(row)?;
                let id = post.id.to_string();
                if let Some(author_id) = row.get("user_id").and_then(Value::as_str) {
                    if let Some(card) = authors.get(author_id) {
                        post.author = card.clone();
                    }
                }
                post.likes = like_counts.get(id.as_str()).copied().unwrap_or(0);
                post.liked = liked_by_viewer.contains(id.as_str());
                post.author_followed = followed.contains(&post.author_id);
                Some(post)
            })
            .collect();

        let mut state = self.state.write().await;
        state.posts = posts.clone();
        state.followed = followed;
        sync_follow_flags(&mut state);
        Ok(posts)
    }

    /// Fetch every profile except the viewer's own, with follow flags.
    pub async fn fetch_users(&self) -> Result<Vec<User>, StoreError> {
        let viewer = self.state.read().await.current_user.as_ref().map(|u| u.id);
        let rows = self.backend.select(tables::PROFILES, &Filter::new()).await?;

        let mut state = self.state.write().await;
        let users: Vec<User> = rows
            .iter()
            .filter_map(User::from_row)
            .filter(|user| Some(user.id) != viewer)
            .map(|mut user| {
                user.followed = state.followed.contains(&user.id);
                user
            })
            .collect();
        state.users = users.clone();
        Ok(users)
    }

    /// Profiles of everyone the viewer follows.
    pub async fn fetch_followed_profiles(&self) -> Result<Vec<User>, StoreError> {
        let viewer = self.viewer_id().await?;
        let followed = self.fetch_followed_ids(viewer).await?;
        if followed.is_empty() {
            return Ok(Vec::new());
        }
        let rows = self
            .backend
            .select(tables::PROFILES, &Filter::new().id_in(followed.iter()))
            .await?;
        Ok(rows
            .iter()
            .filter_map(User::from_row)
            .map(|mut user| {
                user.followed = true;
                user
            })
            .collect())
    }

    async fn fetch_followed_ids(&self, viewer: Uuid) -> Result<HashSet<Uuid>, StoreError> {
        let rows = self
            .backend
            .select(
                tables::FOLLOWS,
                &Filter::new().eq("follower_id", viewer.to_string()),
            )
            .await?;
        Ok(rows
            .iter()
            .filter_map(|row| {
                row.get("following_id")
                    .and_then(Value::as_str)
                    .and_then(|s| Uuid::parse_str(s).ok())
            })
            .collect())
    }

    // ── Posts ──────────────────────────────────────────────────────────

    /// Create a post and prepend it to the local feed. Remote-first: the
    /// row is committed before local state changes.
    pub async fn create_post(&self, draft: &PostDraft) -> Result<Post, StoreError> {
        let viewer = self.viewer_id().await?;
        let row = self
            .backend
            .insert(tables::POSTS, draft.to_insert_row(viewer))
            .await?;
        let mut post = Post::from_row(&row)
            .ok_or_else(|| RemoteError::Malformed("insert returned unusable row".to_owned()))?;

        let mut state = self.state.write().await;
        if let Some(user) = &state.current_user {
            post.author = author_card(user);
        }
        state.posts.insert(0, post.clone());
        Ok(post)
    }

    /// Edit a post the viewer owns. The authorship check runs locally and
    /// the remote filter re-asserts it.
    pub async fn update_post(&self, post_id: Uuid, draft: &PostDraft) -> Result<Post, StoreError> {
        let viewer = self.viewer_id().await?;
        self.assert_owner(post_id, viewer).await?;

        let filter = Filter::new()
            .eq("id", post_id.to_string())
            .eq("user_id", viewer.to_string());
        let updated = self
            .backend
            .update(tables::POSTS, &filter, &draft.to_update_patch())
            .await?;
        if updated.is_empty() {
            return Err(RemoteError::NotFound.into());
        }

        let mut state = self.state.write().await;
        let post = state
            .posts
            .iter_mut()
            .find(|p| p.id == post_id)
            .ok_or(StoreError::UnknownEntity(post_id))?;
        post.title = draft.title.clone();
        post.content = draft.content.clone();
        post.media_urls = draft.media_urls.clone();
        post.tags = draft.tags.clone();
        post.category = draft.category.clone();
        post.startup_details = draft.startup_details.clone();
        Ok(post.clone())
    }

    /// Delete a post the viewer owns, along with its local like entries.
    pub async fn delete_post(&self, post_id: Uuid) -> Result<(), StoreError> {
        let viewer = self.viewer_id().await?;
        self.assert_owner(post_id, viewer).await?;

        let filter = Filter::new()
            .eq("id", post_id.to_string())
            .eq("user_id", viewer.to_string());
        let removed = self.backend.delete(tables::POSTS, &filter).await?;
        if removed.is_empty() {
            return Err(RemoteError::NotFound.into());
        }
        self.backend
            .delete(
                tables::POST_LIKES,
                &Filter::new().eq("post_id", post_id.to_string()),
            )
            .await?;

        self.state.write().await.posts.retain(|p| p.id != post_id);
        Ok(())
    }

    async fn assert_owner(&self, post_id: Uuid, viewer: Uuid) -> Result<(), StoreError> {
        let state = self.state.read().await;
        let post = state
            .posts
            .iter()
            .find(|p| p.id == post_id)
            .ok_or(StoreError::UnknownEntity(post_id))?;
        if post.author_id != viewer {
            return Err(StoreError::NotOwner);
        }
        Ok(())
    }

    // ── Profile ────────────────────────────────────────────────────────

    /// Patch the viewer's profile. A username collision surfaces as
    /// [`StoreError::DuplicateUsername`] instead of the raw constraint name.
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<User, StoreError> {
        let viewer = self.viewer_id().await?;
        if let Some(username) = &update.username {
            validate::validate_username(username)?;
        }

        let filter = Filter::new().eq("id", viewer.to_string());
        let result = self
            .backend
            .update(tables::PROFILES, &filter, &update.to_patch())
            .await;
        match result {
            Ok(rows) if rows.is_empty() => return Err(RemoteError::NotFound.into()),
            Ok(_) => {}
            Err(RemoteError::UniqueViolation { constraint })
                if constraint.starts_with("profiles_username") =>
            {
                return Err(StoreError::DuplicateUsername);
            }
            Err(err) => return Err(err.into()),
        }

        let mut state = self.state.write().await;
        let user = state
            .current_user
            .as_mut()
            .ok_or(StoreError::AuthRequired)?;
        update.apply_to(user);
        let user = user.clone();
        for post in state.posts.iter_mut().filter(|p| p.author_id == viewer) {
            post.author = author_card(&user);
        }
        Ok(user)
    }

    /// Upload a new avatar and point the viewer's profile at it.
    ///
    /// The object path is derived from the viewer id, so re-uploading
    /// replaces the previous avatar in place.
    pub async fn upload_avatar(
        &self,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StoreError> {
        let viewer = self.viewer_id().await?;
        let ext = match content_type {
            "image/png" => "png",
            "image/jpeg" => "jpg",
            "image/webp" => "webp",
            _ => "bin",
        };
        let path = format!("avatars/{viewer}.{ext}");
        let url = self.backend.storage.upload(&path, bytes, content_type).await;
        self.update_profile(&ProfileUpdate {
            avatar_url: Some(url.clone()),
            ..ProfileUpdate::default()
        })
        .await?;
        Ok(url)
    }

    // ── Unread counter ─────────────────────────────────────────────────

    /// Recount unread messages addressed to the viewer.
    ///
    /// A failed count degrades to zero rather than surfacing an error; the
    /// badge is advisory and the next successful refresh corrects it.
    pub async fn refresh_unread_total(&self) -> usize {
        let viewer = match self.state.read().await.current_user.as_ref().map(|u| u.id) {
            Some(viewer) => viewer,
            None => return 0,
        };
        let filter = Filter::new()
            .eq("receiver_id", viewer.to_string())
            .eq("is_read", false);
        let total = match self.backend.count(tables::MESSAGES, &filter).await {
            Ok(total) => total,
            Err(err) => {
                log::warn!("unread count failed, showing zero: {err}");
                0
            }
        };
        self.state.write().await.unread_total = total;
        total
    }

    /// Unread messages from one specific sender.
    pub async fn unread_from(&self, peer: Uuid) -> Result<usize, StoreError> {
        let viewer = self.viewer_id().await?;
        let filter = Filter::new()
            .eq("sender_id", peer.to_string())
            .eq("receiver_id", viewer.to_string())
            .eq("is_read", false);
        Ok(self.backend.count(tables::MESSAGES, &filter).await?)
    }

    // ── Optimistic toggles ─────────────────────────────────────────────

    /// Toggle the viewer's like on a post.
    ///
    /// The count and flag flip locally before the remote commit; a failed
    /// commit restores the pre-toggle state. A second toggle on the same
    /// post while one is in flight is skipped.
    pub async fn toggle_like(&self, post_id: Uuid) -> Result<ToggleOutcome, StoreError> {
        let viewer = self.viewer_id().await?;
        let liked = {
            let state = self.state.read().await;
            state
                .posts
                .iter()
                .find(|p| p.id == post_id)
                .map(|p| p.liked)
                .ok_or(StoreError::UnknownEntity(post_id))?
        };

        let backend = Arc::clone(&self.backend);
        optimistic::run(
            self,
            post_id,
            move |state| {
                if let Some(post) = state.posts.iter_mut().find(|p| p.id == post_id) {
                    if liked {
                        post.likes = post.likes.saturating_sub(1);
                        post.liked = false;
                    } else {
                        post.likes += 1;
                        post.liked = true;
                    }
                }
            },
            move || async move {
                let pair = Filter::new()
                    .eq("post_id", post_id.to_string())
                    .eq("user_id", viewer.to_string());
                if liked {
                    backend.delete(tables::POST_LIKES, &pair).await?;
                } else {
                    backend
                        .insert(
                            tables::POST_LIKES,
                            serde_json::json!({
                                "post_id": post_id.to_string(),
                                "user_id": viewer.to_string(),
                            }),
                        )
                        .await?;
                }
                Ok(())
            },
        )
        .await
    }

    /// Toggle whether the viewer follows `target`.
    ///
    /// Updates the followed set and every derived flag (user list, post
    /// annotations) in one local step, then commits the edge. Self-follow
    /// is rejected before anything happens.
    pub async fn toggle_follow(&self, target: Uuid) -> Result<ToggleOutcome, StoreError> {
        let viewer = self.viewer_id().await?;
        if target == viewer {
            return Err(StoreError::SelfFollow);
        }
        let following = self.state.read().await.followed.contains(&target);

        let backend = Arc::clone(&self.backend);
        optimistic::run(
            self,
            target,
            move |state| {
                if following {
                    state.followed.remove(&target);
                } else {
                    state.followed.insert(target);
                }
                sync_follow_flags(state);
            },
            move || async move {
                let edge = Filter::new()
                    .eq("follower_id", viewer.to_string())
                    .eq("following_id", target.to_string());
                if following {
                    backend.delete(tables::FOLLOWS, &edge).await?;
                } else {
                    backend
                        .insert(
                            tables::FOLLOWS,
                            serde_json::json!({
                                "follower_id": viewer.to_string(),
                                "following_id": target.to_string(),
                            }),
                        )
                        .await?;
                }
                Ok(())
            },
        )
        .await
    }
}

/// Re-derive every follow flag from the followed set.
fn sync_follow_flags(state: &mut StoreState) {
    for user in &mut state.users {
        user.followed = state.followed.contains(&user.id);
    }
    for post in &mut state.posts {
        post.author_followed = state.followed.contains(&post.author_id);
    }
}

fn author_card(user: &User) -> AuthorCard {
    AuthorCard {
        full_name: if user.full_name.is_empty() {
            "Unknown".to_owned()
        } else {
            user.full_name.clone()
        },
        username: if user.username.is_empty() {
            "unknown".to_owned()
        } else {
            user.username.clone()
        },
        avatar_url: user.avatar_url.clone(),
        location: user.location.clone(),
        industry: user.industry.clone(),
        founded_year: user.founded_year,
        team_size: user.team_size,
        bio: user.bio.clone(),
    }
}
