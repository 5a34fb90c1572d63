//! Boundary contracts for the external collaborators.
//!
//! Three seams, all out of scope for this crate and implemented by the host
//! application:
//!
//! - [`ChangeFeed`]: the realtime change-feed subscribe primitive. Events
//!   arrive over a channel as closed [`FeedEvent`] values instead of string
//!   status codes.
//! - [`DataSource`]: the bulk list operation per resource kind. The feed is
//!   only an invalidation signal; this is where authoritative state comes
//!   from.
//! - [`PresenceTransport`]: the lightweight who-is-online channel, separate
//!   from row-level change events.

use crate::error::Result;
use crate::identity::IdentityId;
use crate::models::CollectionRows;
use crate::resource::{PresenceChannel, ResourceKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

// ── Change feed ─────────────────────────────────────────────────────────────

/// Row-level operation reported by the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOp {
    Insert,
    Update,
    Delete,
}

/// Minimal change metadata: "something in this table changed".
///
/// `record` may carry the changed row when the transport includes one, but
/// nothing in this crate relies on it; the authoritative state is always
/// re-fetched in bulk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeNotice {
    pub op: ChangeOp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<serde_json::Value>,
}

impl ChangeNotice {
    pub fn new(op: ChangeOp) -> Self {
        Self {
            op,
            row_id: None,
            record: None,
        }
    }
}

/// Events delivered by a feed channel.
///
/// A closed enum replacing the transport's string status codes: exactly one
/// `Subscribed` is expected per successful subscribe, then any number of
/// `Change` events until an error/closed terminal event.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// Explicit acknowledgment that the subscription is live.
    Subscribed,
    /// A row in the subscribed table changed.
    Change(ChangeNotice),
    /// The transport reported a channel error.
    ChannelError(String),
    /// The transport reported a subscribe/heartbeat timeout.
    TimedOut,
    /// The channel was closed.
    Closed,
}

/// Restricts which row operations a subscription receives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    /// Restrict to specific operations; `None` means all.
    pub ops: Option<Vec<ChangeOp>>,
}

impl EventFilter {
    /// All row operations.
    pub fn all() -> Self {
        Self::default()
    }
}

/// A live feed subscription: an event stream plus a close handle.
///
/// Closing (or dropping) cancels the token handed to the transport so it can
/// release the underlying channel.
pub struct FeedSubscription {
    /// Feed events, in delivery order.
    pub events: mpsc::Receiver<FeedEvent>,
    closer: CancellationToken,
}

impl FeedSubscription {
    pub fn new(events: mpsc::Receiver<FeedEvent>, closer: CancellationToken) -> Self {
        Self { events, closer }
    }

    /// Signal the transport to tear the channel down. Idempotent.
    pub fn close(&self) {
        self.closer.cancel();
    }
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        self.closer.cancel();
    }
}

/// The change-feed subscribe primitive.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Open a channel on `topic` scoped to `identity` and subscribe.
    ///
    /// The returned subscription must emit [`FeedEvent::Subscribed`] once the
    /// transport acknowledges the subscription; the caller bounds that wait.
    async fn subscribe(
        &self,
        topic: &str,
        filter: &EventFilter,
        identity: &IdentityId,
    ) -> Result<FeedSubscription>;
}

// ── Bulk list ───────────────────────────────────────────────────────────────

/// The bulk list operation per resource kind.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Fetch the full, ordered collection visible to `identity`.
    async fn list(&self, kind: ResourceKind, identity: &IdentityId) -> Result<CollectionRows>;
}

// ── Presence ────────────────────────────────────────────────────────────────

/// Metadata announced with our own presence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceMeta {
    pub display_name: String,
    pub joined_at: DateTime<Utc>,
}

/// Events delivered by a presence channel.
#[derive(Debug, Clone)]
pub enum PresenceEvent {
    /// The presence channel is live; time to announce ourselves.
    Subscribed,
    /// Full-state sync: replace the online set.
    Sync(Vec<IdentityId>),
    /// One identity came online.
    Join(IdentityId),
    /// One identity went offline.
    Leave(IdentityId),
    /// The channel was closed.
    Closed,
}

/// A live presence subscription: events, an announce path, and a close handle.
pub struct PresenceSubscription {
    /// Presence events, in delivery order.
    pub events: mpsc::Receiver<PresenceEvent>,
    announce_tx: mpsc::Sender<PresenceMeta>,
    closer: CancellationToken,
}

impl PresenceSubscription {
    pub fn new(
        events: mpsc::Receiver<PresenceEvent>,
        announce_tx: mpsc::Sender<PresenceMeta>,
        closer: CancellationToken,
    ) -> Self {
        Self {
            events,
            announce_tx,
            closer,
        }
    }

    /// Announce (track) our own presence on the channel.
    ///
    /// Best-effort: a failure here degrades the online count, nothing else.
    pub async fn announce(&self, meta: PresenceMeta) -> bool {
        self.announce_tx.send(meta).await.is_ok()
    }

    /// Leave the channel. Idempotent.
    pub fn close(&self) {
        self.closer.cancel();
    }
}

impl Drop for PresenceSubscription {
    fn drop(&mut self) {
        self.closer.cancel();
    }
}

/// The presence primitive.
#[async_trait]
pub trait PresenceTransport: Send + Sync {
    /// Join a presence channel as `identity`.
    async fn join(
        &self,
        channel: PresenceChannel,
        identity: &IdentityId,
    ) -> Result<PresenceSubscription>;
}
