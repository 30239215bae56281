//! Debounced availability checks for the registration form.
//!
//! Keystroke-driven checks must not hammer the remote: each new check
//! cancels the previous pending one, and only after half a second of
//! quiet does the query run. Format validation short-circuits locally,
//! with no delay and no remote call.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use connect_backend::{tables, Backend, Filter};
use connect_core::validate;

pub const DEBOUNCE_DELAY: Duration = Duration::from_millis(500);

/// Runs at most one pending future, after a quiet period. Scheduling a new
/// future aborts the pending one.
pub struct Debouncer {
    delay: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Mutex::new(None),
        }
    }

    pub fn schedule<F>(&self, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let delay = self.delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            future.await;
        });
        if let Some(previous) = self
            .pending
            .lock()
            .expect("debounce lock poisoned")
            .replace(handle)
        {
            previous.abort();
        }
    }

    pub fn cancel(&self) {
        if let Some(handle) = self.pending.lock().expect("debounce lock poisoned").take() {
            handle.abort();
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Result of an availability check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability {
    /// No check has completed yet, or one is pending.
    Unknown,
    Available,
    Taken,
    /// Rejected locally before any remote call, with the form message.
    Invalid(String),
}

/// Debounced username/email availability for the registration form.
///
/// Results arrive through a watch channel: the form subscribes once and
/// re-renders on every resolved check. Stale in-flight checks are aborted,
/// so the channel only ever reflects the latest input.
pub struct AvailabilityChecker {
    backend: Arc<Backend>,
    debouncer: Debouncer,
    result: watch::Sender<Availability>,
    viewer: Option<Uuid>,
}

impl AvailabilityChecker {
    pub fn new(backend: Arc<Backend>) -> Self {
        Self::with_delay(backend, DEBOUNCE_DELAY)
    }

    pub fn with_delay(backend: Arc<Backend>, delay: Duration) -> Self {
        let (result, _) = watch::channel(Availability::Unknown);
        Self {
            backend,
            debouncer: Debouncer::new(delay),
            result,
            viewer: None,
        }
    }

    /// Exempt a profile from collision checks, for the edit-profile form
    /// where the viewer's current values must not read as taken.
    pub fn exempt(mut self, viewer: Uuid) -> Self {
        self.viewer = Some(viewer);
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<Availability> {
        self.result.subscribe()
    }

    pub fn check_username(&self, username: &str) {
        if let Err(err) = validate::validate_username(username) {
            self.debouncer.cancel();
            let _ = self.result.send(Availability::Invalid(err.message));
            return;
        }
        self.schedule_query("username", username);
    }

    pub fn check_email(&self, email: &str) {
        if let Err(err) = validate::validate_email(email) {
            self.debouncer.cancel();
            let _ = self.result.send(Availability::Invalid(err.message));
            return;
        }
        self.schedule_query("email", email);
    }

    fn schedule_query(&self, column: &'static str, value: &str) {
        let _ = self.result.send(Availability::Unknown);
        let backend = Arc::clone(&self.backend);
        let result = self.result.clone();
        let viewer = self.viewer;
        let value = value.to_owned();
        self.debouncer.schedule(async move {
            let filter = Filter::new().eq(column, value);
            let availability = match backend.select(tables::PROFILES, &filter).await {
                Ok(rows) => {
                    let taken = rows.iter().any(|row| {
                        row.get("id")
                            .and_then(serde_json::Value::as_str)
                            .and_then(|s| Uuid::parse_str(s).ok())
                            != viewer
                    });
                    if taken {
                        Availability::Taken
                    } else {
                        Availability::Available
                    }
                }
                Err(err) => {
                    log::warn!("{column} availability check failed: {err}");
                    Availability::Unknown
                }
            };
            let _ = result.send(availability);
        });
    }
}
