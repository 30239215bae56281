//! Who is online.
//!
//! Every signed-in user is tracked on their own channel, named
//! `online:{user_id}`; observers watch that channel rather than a global
//! roster, so watching one user costs one receiver.

use tokio::sync::watch;
use uuid::Uuid;

use connect_backend::Backend;

/// The presence channel a user is tracked on.
pub fn channel_for(user_id: Uuid) -> String {
    format!("online:{user_id}")
}

/// A live view of one user's online status.
pub struct PresenceWatcher {
    user_id: Uuid,
    members: watch::Receiver<Vec<Uuid>>,
}

impl PresenceWatcher {
    pub fn watch(backend: &Backend, user_id: Uuid) -> PresenceWatcher {
        PresenceWatcher {
            user_id,
            members: backend.presence.watch_members(&channel_for(user_id)),
        }
    }

    pub fn is_online(&self) -> bool {
        self.members.borrow().contains(&self.user_id)
    }

    /// Wait for the next membership change. Errors only when the channel
    /// itself is gone, which observers treat as permanently offline.
    pub async fn changed(&mut self) -> bool {
        if self.members.changed().await.is_err() {
            return false;
        }
        self.members.borrow_and_update().contains(&self.user_id)
    }
}
