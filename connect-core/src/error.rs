//! Error taxonomy shared across the workspace.
//!
//! Three families, matching how failures surface to the user:
//! validation errors never leave the client, auth errors carry
//! distinguishing messages, and remote errors are either retried (reads)
//! or absorbed by optimistic rollback (writes).

use thiserror::Error;

/// Failure of a remote read/write against the hosted platform.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// No row matched a query that required one.
    #[error("row not found")]
    NotFound,

    /// A declared unique constraint rejected the write.
    ///
    /// `constraint` follows the platform's naming scheme, e.g.
    /// `profiles_username_key`, so callers can translate specific
    /// violations into user-facing messages.
    #[error("unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    /// Transient transport/storage failure. Reads surface this as a
    /// retryable state; optimistic writes roll back.
    #[error("remote service unavailable")]
    Unavailable,

    /// The remote returned a row we could not interpret.
    #[error("malformed row: {0}")]
    Malformed(String),
}

/// Failure of a credential event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("this email is already registered")]
    AlreadyRegistered,

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("email address has not been confirmed")]
    NotConfirmed,

    #[error("no active session")]
    NoSession,

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// Client-side form rejection, surfaced inline per field.
///
/// Validation runs before any remote call; a `ValidationError` means the
/// remote layer was never touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}
