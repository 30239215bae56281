//! Presence channels: named membership sets with sync notifications.
//!
//! A user is "online" on a channel exactly while their id is in the
//! channel's membership set — no heartbeat or timeout logic beyond that.
//! Membership changes are published through a `tokio::sync::watch`, giving
//! every observer the channel's current membership plus a change signal
//! (the platform's `sync` callback surface).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::watch;
use uuid::Uuid;

struct Channel {
    members: watch::Sender<Vec<Uuid>>,
}

impl Channel {
    fn new() -> Self {
        let (members, _) = watch::channel(Vec::new());
        Self { members }
    }
}

/// All presence channels, keyed by name.
pub struct PresenceRegistry {
    channels: RwLock<HashMap<String, Arc<Channel>>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
        }
    }

    fn channel(&self, name: &str) -> Arc<Channel> {
        // Fast path: read lock
        if let Some(channel) = self
            .channels
            .read()
            .expect("presence lock poisoned")
            .get(name)
        {
            return channel.clone();
        }
        let mut channels = self.channels.write().expect("presence lock poisoned");
        channels
            .entry(name.to_owned())
            .or_insert_with(|| Arc::new(Channel::new()))
            .clone()
    }

    /// Enter the channel. The returned guard keeps the membership alive;
    /// dropping it leaves the channel.
    pub fn track(&self, name: &str, user_id: Uuid) -> PresenceGuard {
        let channel = self.channel(name);
        channel.members.send_modify(|members| {
            if !members.contains(&user_id) {
                members.push(user_id);
            }
        });
        log::debug!("presence: {user_id} joined {name}");
        PresenceGuard {
            channel,
            name: name.to_owned(),
            user_id,
        }
    }

    /// Observe a channel's membership. The receiver always holds the
    /// current set and signals on every join/leave.
    pub fn watch_members(&self, name: &str) -> watch::Receiver<Vec<Uuid>> {
        self.channel(name).members.subscribe()
    }

    /// Current membership snapshot.
    pub fn members(&self, name: &str) -> Vec<Uuid> {
        self.channel(name).members.borrow().clone()
    }
}

impl Default for PresenceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII membership: drop to leave the channel.
pub struct PresenceGuard {
    channel: Arc<Channel>,
    name: String,
    user_id: Uuid,
}

impl Drop for PresenceGuard {
    fn drop(&mut self) {
        self.channel
            .members
            .send_modify(|members| members.retain(|id| *id != self.user_id));
        log::debug!("presence: {} left {}", self.user_id, self.name);
    }
}
