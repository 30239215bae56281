//! # connect-core — shared domain model for StartupConnect
//!
//! Entities, remote-row mapping, client-side validation, and the error
//! taxonomy shared by the backend emulation and the client store.
//!
//! ## Modules
//!
//! - [`user`] — profiles, roles, and profile update patches
//! - [`post`] — startup-idea posts with viewer-scoped annotations
//! - [`message`] — direct messages with a one-way read flag
//! - [`validate`] — form validation performed before any remote call
//! - [`error`] — remote / auth / validation error types
//!
//! Remote rows travel as `serde_json::Value` objects with snake_case
//! columns, the shape the hosted platform returns. Each entity has exactly
//! one `from_row` mapping; every fetch site goes through it.

pub mod error;
pub mod message;
pub mod post;
pub mod user;
pub mod validate;

mod row;

pub use error::{AuthError, RemoteError, ValidationError};
pub use message::Message;
pub use post::{AuthorCard, Post, PostDraft, StartupDetails};
pub use user::{ProfileUpdate, User, UserRole};
