//! Error types for crewdeck-sync.
//!
//! Nothing in this crate panics or throws across the consumer boundary:
//! connection failures surface as [`ConnectionState`](crate::supervisor::ConnectionState)
//! values, fetch failures retain the previous snapshot, and the error values
//! below are returned only from fallible setup/boundary calls.

use std::time::Duration;
use thiserror::Error;

/// Errors produced by the sync core and its collaborator boundaries.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The change-feed transport reported a channel-level failure.
    #[error("Channel error: {0}")]
    Channel(String),

    /// The transport closed the channel (server side or stream ended).
    #[error("Channel closed: {0}")]
    Closed(String),

    /// No `Subscribed` acknowledgment arrived within the bounded wait.
    #[error("Subscribe timed out after {0:?}")]
    SubscribeTimeout(Duration),

    /// The bulk list operation failed. Data-layer only; never alters
    /// connection state.
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// Presence join/track failure. Non-fatal; degrades the online count.
    #[error("Presence error: {0}")]
    Presence(String),

    /// No authenticated identity is available for the requested operation.
    #[error("No authenticated identity")]
    NoIdentity,

    /// Builder/setup misuse (missing collaborator, bad option).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Invalid operation for the current lifecycle state.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

/// Result type for sync-core operations.
pub type Result<T> = std::result::Result<T, SyncError>;
