//! Session-based authentication with deferred email confirmation.
//!
//! Sign-up creates an *unconfirmed* identity only — no profile row.
//! Confirmation (the platform's email-callback step) establishes a session;
//! the profile row is created by the backend's post-confirmation hook, not
//! here. Passwords are compared verbatim: credential hardening belongs to
//! the real platform, not its emulation.

use std::collections::HashMap;

use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use connect_core::AuthError;

/// An active session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub user_id: Uuid,
    pub email: String,
}

#[derive(Debug, Clone)]
struct Identity {
    user_id: Uuid,
    password: String,
    /// Sign-up metadata (full_name, username, user_type) consumed by the
    /// post-confirmation profile hook.
    metadata: Value,
    confirmed: bool,
}

/// The emulated auth service.
pub struct AuthService {
    identities: RwLock<HashMap<String, Identity>>,
    sessions: RwLock<HashMap<Uuid, SessionInfo>>,
}

impl AuthService {
    pub fn new() -> Self {
        Self {
            identities: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Create an unconfirmed identity. Duplicate emails are rejected with
    /// a distinguishable error, not a generic failure.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Value,
    ) -> Result<Uuid, AuthError> {
        let mut identities = self.identities.write().await;
        if identities.contains_key(email) {
            return Err(AuthError::AlreadyRegistered);
        }
        let user_id = Uuid::new_v4();
        identities.insert(
            email.to_owned(),
            Identity {
                user_id,
                password: password.to_owned(),
                metadata,
                confirmed: false,
            },
        );
        log::info!("auth: identity created for {email}, awaiting confirmation");
        Ok(user_id)
    }

    /// Mark the identity confirmed and open a session, emulating the user
    /// following the confirmation link. Idempotent for already-confirmed
    /// identities.
    pub async fn confirm_email(&self, email: &str) -> Result<SessionInfo, AuthError> {
        let mut identities = self.identities.write().await;
        let identity = identities
            .get_mut(email)
            .ok_or(AuthError::InvalidCredentials)?;
        identity.confirmed = true;
        let session = SessionInfo {
            user_id: identity.user_id,
            email: email.to_owned(),
        };
        drop(identities);

        self.sessions
            .write()
            .await
            .insert(session.user_id, session.clone());
        Ok(session)
    }

    /// Password sign-in for an already-confirmed identity.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<SessionInfo, AuthError> {
        let identities = self.identities.read().await;
        let identity = identities.get(email).ok_or(AuthError::InvalidCredentials)?;
        if identity.password != password {
            return Err(AuthError::InvalidCredentials);
        }
        if !identity.confirmed {
            return Err(AuthError::NotConfirmed);
        }
        let session = SessionInfo {
            user_id: identity.user_id,
            email: email.to_owned(),
        };
        drop(identities);

        self.sessions
            .write()
            .await
            .insert(session.user_id, session.clone());
        Ok(session)
    }

    /// The active session for `user_id`, if any. Absence is a valid
    /// non-error state.
    pub async fn session(&self, user_id: Uuid) -> Option<SessionInfo> {
        self.sessions.read().await.get(&user_id).cloned()
    }

    /// Invalidate the session. No other remote side effect.
    pub async fn sign_out(&self, user_id: Uuid) {
        self.sessions.write().await.remove(&user_id);
    }

    /// Sign-up metadata for the post-confirmation profile hook.
    pub(crate) async fn metadata(&self, email: &str) -> Option<Value> {
        self.identities
            .read()
            .await
            .get(email)
            .map(|identity| identity.metadata.clone())
    }
}

impl Default for AuthService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_duplicate_email_is_distinguishable() {
        let auth = AuthService::new();
        auth.sign_up("a@b.co", "secret", json!({})).await.unwrap();
        let err = auth.sign_up("a@b.co", "other", json!({})).await.unwrap_err();
        assert_eq!(err, AuthError::AlreadyRegistered);
    }

    #[tokio::test]
    async fn test_sign_in_requires_confirmation() {
        let auth = AuthService::new();
        auth.sign_up("a@b.co", "secret", json!({})).await.unwrap();
        assert_eq!(
            auth.sign_in("a@b.co", "secret").await.unwrap_err(),
            AuthError::NotConfirmed
        );

        auth.confirm_email("a@b.co").await.unwrap();
        let session = auth.sign_in("a@b.co", "secret").await.unwrap();
        assert_eq!(session.email, "a@b.co");
    }

    #[tokio::test]
    async fn test_wrong_password_rejected() {
        let auth = AuthService::new();
        auth.sign_up("a@b.co", "secret", json!({})).await.unwrap();
        auth.confirm_email("a@b.co").await.unwrap();
        assert_eq!(
            auth.sign_in("a@b.co", "wrong").await.unwrap_err(),
            AuthError::InvalidCredentials
        );
    }

    #[tokio::test]
    async fn test_sign_out_invalidates_session() {
        let auth = AuthService::new();
        let id = auth.sign_up("a@b.co", "secret", json!({})).await.unwrap();
        auth.confirm_email("a@b.co").await.unwrap();
        assert!(auth.session(id).await.is_some());

        auth.sign_out(id).await;
        assert!(auth.session(id).await.is_none());
    }
}
