//! Session lifecycle: registration, confirmation, sign-in, bootstrap,
//! logout.
//!
//! Registration is two-phase. `register` validates the form client-side and
//! creates an unconfirmed identity; no profile exists yet.
//! `complete_registration` stands in for the user following the
//! confirmation link: it confirms the email (which creates the profile
//! server-side) and signs the session in. Login pulls the profile, primes
//! the feed and the unread counter, joins the viewer's presence channel,
//! and starts the unread watcher.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use connect_backend::{tables, Filter};
use connect_core::{validate, AuthError, RemoteError, User, UserRole};

use crate::presence;
use crate::store::{AppStore, StoreError, StoreState};

/// What the registration form submits.
#[derive(Debug, Clone)]
pub struct RegistrationForm {
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub username: String,
    pub role: UserRole,
}

impl RegistrationForm {
    /// Sign-up metadata consumed later by the post-confirmation profile
    /// hook.
    fn metadata(&self) -> Value {
        json!({
            "full_name": self.full_name,
            "username": self.username,
            "user_type": self.role.as_str(),
        })
    }
}

impl AppStore {
    /// Phase one of registration. All form validation happens here, before
    /// any remote call; success means an unconfirmed identity exists.
    pub async fn register(&self, form: &RegistrationForm) -> Result<Uuid, StoreError> {
        validate::validate_email(&form.email)?;
        validate::validate_username(&form.username)?;
        validate::validate_password(&form.password)?;
        let user_id = self
            .backend
            .auth
            .sign_up(&form.email, &form.password, form.metadata())
            .await?;
        log::info!("registered {}, awaiting email confirmation", form.email);
        Ok(user_id)
    }

    /// Phase two: the confirmation-link callback. Confirms the email and
    /// signs in, so the new user lands with a live session.
    pub async fn complete_registration(self: &Arc<Self>, email: &str) -> Result<User, StoreError> {
        let session = self.backend.confirm_email(email).await?;
        self.login(session.user_id).await
    }

    pub async fn sign_in(self: &Arc<Self>, email: &str, password: &str) -> Result<User, StoreError> {
        let session = self.backend.auth.sign_in(email, password).await?;
        self.login(session.user_id).await
    }

    /// Bootstrap from a possibly-stale session id, e.g. one restored from
    /// disk. A missing session is a normal signed-out start, not an error.
    pub async fn resolve_session(
        self: &Arc<Self>,
        user_id: Uuid,
    ) -> Result<Option<User>, StoreError> {
        if self.backend.auth.session(user_id).await.is_none() {
            return Ok(None);
        }
        match self.login(user_id).await {
            Ok(user) => Ok(Some(user)),
            // A session without a profile row is a signed-out start too
            Err(StoreError::Remote(RemoteError::NotFound)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Bring the store up for an authenticated user: profile, feed, unread
    /// counter, presence, unread watcher.
    pub async fn login(self: &Arc<Self>, user_id: Uuid) -> Result<User, StoreError> {
        let session = self
            .backend
            .auth
            .session(user_id)
            .await
            .ok_or(AuthError::NoSession)?;

        let rows = self
            .backend
            .select(
                tables::PROFILES,
                &Filter::new().eq("id", user_id.to_string()),
            )
            .await?;
        let row = rows.first().ok_or(RemoteError::NotFound)?;
        let mut user =
            User::from_row(row).ok_or_else(|| RemoteError::Malformed("profile row".to_owned()))?;
        user.email = session.email;

        self.state.write().await.current_user = Some(user.clone());
        self.fetch_posts().await?;
        self.refresh_unread_total().await;

        let guard = self
            .backend
            .presence
            .track(&presence::channel_for(user_id), user_id);
        *self
            .presence_guard
            .lock()
            .expect("presence guard lock poisoned") = Some(guard);

        self.spawn_unread_watcher(user_id);
        log::info!("signed in as {} ({user_id})", user.username);
        Ok(user)
    }

    /// Sign out: invalidate the session, leave presence, stop the unread
    /// watcher, and clear all viewer-scoped state.
    pub async fn logout(&self) {
        let user_id = {
            let mut state = self.state.write().await;
            let user_id = state.current_user.as_ref().map(|u| u.id);
            *state = StoreState::default();
            user_id
        };
        if let Some(user_id) = user_id {
            self.backend.auth.sign_out(user_id).await;
            log::info!("signed out {user_id}");
        }
        if let Some(handle) = self
            .unread_watcher
            .lock()
            .expect("watcher lock poisoned")
            .take()
        {
            handle.abort();
        }
        self.presence_guard
            .lock()
            .expect("presence guard lock poisoned")
            .take();
    }

    /// Watch the change feed and recount unread messages whenever a message
    /// addressed to the viewer changes. Holds only a `Weak` store handle:
    /// the watcher dies with the store and never keeps it alive.
    fn spawn_unread_watcher(self: &Arc<Self>, user_id: Uuid) {
        let mut rx = self.backend.subscribe();
        let weak = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let me = user_id.to_string();
            loop {
                match rx.recv().await {
                    Ok(change) => {
                        if change.table != tables::MESSAGES {
                            continue;
                        }
                        let addressed_to_me = [&change.new, &change.old].iter().any(|row| {
                            row.as_ref()
                                .and_then(|r| r.get("receiver_id"))
                                .and_then(Value::as_str)
                                == Some(me.as_str())
                        });
                        if !addressed_to_me {
                            continue;
                        }
                        let Some(store) = weak.upgrade() else { break };
                        store.refresh_unread_total().await;
                    }
                    Err(RecvError::Lagged(n)) => {
                        log::warn!("unread watcher lagged by {n} events, recounting");
                        let Some(store) = weak.upgrade() else { break };
                        store.refresh_unread_total().await;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        if let Some(previous) = self
            .unread_watcher
            .lock()
            .expect("watcher lock poisoned")
            .replace(handle)
        {
            previous.abort();
        }
    }
}
