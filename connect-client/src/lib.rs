//! # connect-client — the StartupConnect client data store
//!
//! The state layer behind the app's UI: one [`AppStore`] holds the signed-in
//! user, the post feed with viewer-scoped annotations, the follow graph as
//! the viewer sees it, and the unread-message counter. Mutations that the
//! user perceives as instant (like, follow) are applied locally first and
//! reconciled with the remote commit; everything else is remote-first.
//!
//! ## Modules
//!
//! - [`store`] — the store itself: state, fetches, posts, toggles
//! - [`optimistic`] — the apply/commit/rollback primitive the toggles share
//! - [`session`] — registration, sign-in, bootstrap, logout
//! - [`chat`] — a live two-party conversation with read receipts
//! - [`presence`] — who is online, per user channel
//! - [`debounce`] — delayed availability checks for registration forms

pub mod chat;
pub mod debounce;
pub mod optimistic;
pub mod presence;
pub mod session;
pub mod store;

pub use chat::Conversation;
pub use debounce::{Availability, AvailabilityChecker, Debouncer};
pub use optimistic::ToggleOutcome;
pub use presence::PresenceWatcher;
pub use session::RegistrationForm;
pub use store::{AppStore, StoreError, StoreState};
