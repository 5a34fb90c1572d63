//! Realtime synchronization and derived-analytics core for Crewdeck.
//!
//! Keeps locally cached views of the shared collections (tasks, clients,
//! team members, activity) consistent with a remote change feed, without
//! each screen opening its own connection. Handles:
//!
//! - One shared channel per resource kind, multiplexed across consumers by
//!   a refcounted [`SubscriptionRegistry`] with debounced teardown
//! - Connection supervision with exponential-backoff retry and a bounded
//!   subscribe-ack wait ([`ConnectionSupervisor`])
//! - Fetch-on-invalidate: feed events trigger coalesced bulk re-fetches via
//!   the [`ChangeNotifier`]; snapshots are replaced wholesale
//! - Best-effort presence tracking ([`PresenceTracker`])
//! - Pure derived metrics recomputed on snapshot replacement
//!   ([`analytics::recompute`])
//!
//! The persistence store, realtime transport and identity provider are
//! external collaborators behind the traits in [`transport`] and
//! [`identity`]; all failures surface as state values, never as panics or
//! exceptions across the consumer boundary.
//!
//! # Example
//!
//! ```rust,no_run
//! use crewdeck_sync::{ResourceKind, SyncClient};
//! # use crewdeck_sync::{identity::SessionIdentity, IdentityId};
//! # async fn example(
//! #     feed: std::sync::Arc<dyn crewdeck_sync::ChangeFeed>,
//! #     source: std::sync::Arc<dyn crewdeck_sync::DataSource>,
//! # ) -> crewdeck_sync::Result<()> {
//! let session = SessionIdentity::new(Some(IdentityId::new("user-1")));
//! let client = SyncClient::builder()
//!     .change_feed(feed)
//!     .data_source(source)
//!     .identity_provider(session)
//!     .build()?;
//!
//! // A screen attaches; the channel starts (or is shared) and the
//! // collection refreshes on every feed event.
//! let handle = client.attach(ResourceKind::Tasks)?;
//! let metrics = client.analytics();
//! println!("completion rate: {}%", metrics.completion_rate);
//! drop(handle); // released; channel tears down after the debounce window
//! # Ok(())
//! # }
//! ```

pub mod analytics;
pub mod client;
pub mod error;
pub mod identity;
pub mod models;
pub mod notifier;
pub mod presence;
pub mod registry;
pub mod resource;
pub mod retry;
pub mod store;
pub mod supervisor;
pub mod timeouts;
pub mod transport;

pub use analytics::{AnalyticsSnapshot, MemberProductivity, WeekBucket, WEEKLY_BUCKETS};
pub use client::{SyncClient, SyncClientBuilder};
pub use error::{Result, SyncError};
pub use identity::{IdentityId, IdentityProvider};
pub use models::{
    ActivityEntry, Client, ClientStatus, CollectionRows, MemberRole, Platform, Task, TaskPriority,
    TaskStatus, TeamMember,
};
pub use notifier::ChangeNotifier;
pub use presence::PresenceTracker;
pub use registry::{RegistryEntryStats, SubscriptionHandle, SubscriptionRegistry};
pub use resource::{PresenceChannel, ResourceKind};
pub use retry::RetryOptions;
pub use store::{CollectionStore, ListenerGuard, StoreCell};
pub use supervisor::{ConnectionState, ConnectionSupervisor};
pub use timeouts::SyncTimeouts;
pub use transport::{
    ChangeFeed, ChangeNotice, ChangeOp, DataSource, EventFilter, FeedEvent, FeedSubscription,
    PresenceEvent, PresenceMeta, PresenceSubscription, PresenceTransport,
};
