//! Error types for tandem-core

use thiserror::Error;

/// Top-level error type for tandem-core
#[derive(Error, Debug)]
pub enum TandemError {
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors related to session lifecycle
#[derive(Error, Debug)]
pub enum SessionError {
    /// Join target missing, or the host is no longer present
    #[error("Session not found: {0}")]
    NotFound(String),

    /// A create/join was attempted while another session is active
    #[error("Session already active: {0}")]
    AlreadyActive(String),

    /// A send was attempted with no active session
    #[error("No active session")]
    NotActive,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors from the session store adapter
///
/// Store failures surface synchronously as the `Result` of the
/// triggering call, never through an unrelated subscription.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Transient store unavailability; the caller decides whether to
    /// re-validate and resend, there is no automatic retry
    #[error("Write failed: {0}")]
    WriteFailed(String),

    /// The connection is offline or has been severed
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
