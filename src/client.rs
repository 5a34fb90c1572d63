//! The sync-core facade.
//!
//! One `SyncClient` is constructed per process and passed by reference to
//! consumers; all previously "global" channel state lives on this object
//! with an explicit lifecycle. It wires together:
//!
//! - the [`SubscriptionRegistry`] multiplexing screens onto shared channels,
//! - the [`ChangeNotifier`] feeding the collection store,
//! - the analytics cell recomputing metrics when the task or team snapshot
//!   is replaced,
//! - the identity watch, which rebinds or tears down channels on sign-in /
//!   sign-out.

use crate::analytics::{recompute, AnalyticsSnapshot};
use crate::error::{Result, SyncError};
use crate::identity::{IdentityId, IdentityProvider};
use crate::models::CollectionRows;
use crate::notifier::ChangeNotifier;
use crate::presence::PresenceTracker;
use crate::registry::{RegistryEntryStats, SubscriptionRegistry, SubscriptionHandle};
use crate::resource::{PresenceChannel, ResourceKind};
use crate::retry::RetryOptions;
use crate::store::{CollectionStore, ListenerGuard};
use crate::supervisor::ConnectionState;
use crate::timeouts::SyncTimeouts;
use crate::transport::{ChangeFeed, DataSource, PresenceMeta, PresenceTransport};
use chrono::Utc;
use log::info;
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

// ── Analytics cell ──────────────────────────────────────────────────────────

/// Holds the derived metrics snapshot and recomputes it only when a source
/// collection's version changes, never on reads.
struct AnalyticsCell {
    store: Arc<CollectionStore>,
    snapshot: RwLock<Arc<AnalyticsSnapshot>>,
    last_versions: Mutex<(u64, u64)>,
}

impl AnalyticsCell {
    fn new(store: Arc<CollectionStore>) -> Arc<Self> {
        Arc::new(Self {
            store,
            snapshot: RwLock::new(Arc::new(AnalyticsSnapshot::empty(Utc::now()))),
            last_versions: Mutex::new((0, 0)),
        })
    }

    fn maybe_recompute(&self) {
        let versions = (
            self.store.tasks.version(),
            self.store.team_members.version(),
        );
        let mut last = match self.last_versions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if *last == versions {
            return;
        }
        *last = versions;

        let tasks = self.store.tasks.snapshot();
        let team = self.store.team_members.snapshot();
        let next = Arc::new(recompute(&tasks, &team, Utc::now()));
        match self.snapshot.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    fn snapshot(&self) -> Arc<AnalyticsSnapshot> {
        match self.snapshot.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

// ── Client ──────────────────────────────────────────────────────────────────

/// The realtime sync core.
///
/// Use [`SyncClient::builder`] to wire in the collaborator boundaries.
pub struct SyncClient {
    registry: Arc<SubscriptionRegistry>,
    store: Arc<CollectionStore>,
    notifier: Arc<ChangeNotifier>,
    identity: Arc<dyn IdentityProvider>,
    presence: Option<Arc<dyn PresenceTransport>>,
    timeouts: SyncTimeouts,
    display_name: Option<String>,
    analytics: Arc<AnalyticsCell>,
    cancel: CancellationToken,
    _identity_task: JoinHandle<()>,
    _analytics_guards: [ListenerGuard; 2],
}

impl SyncClient {
    /// Create a new builder.
    pub fn builder() -> SyncClientBuilder {
        SyncClientBuilder::new()
    }

    /// Attach a consumer to the shared channel for `kind` under the current
    /// identity. The returned handle releases on drop.
    pub fn attach(&self, kind: ResourceKind) -> Result<SubscriptionHandle> {
        let identity = self.identity.current().ok_or(SyncError::NoIdentity)?;
        Ok(self.registry.acquire(kind, identity))
    }

    /// Manually invalidate and re-fetch `kind` (coalesced with feed-driven
    /// re-fetches).
    pub fn refresh(&self, kind: ResourceKind) -> Result<()> {
        let identity = self.identity.current().ok_or(SyncError::NoIdentity)?;
        self.notifier.on_feed_event(kind, identity);
        Ok(())
    }

    /// Restart a channel that exhausted its retries and settled at
    /// `Disconnected`. Returns whether a restart happened.
    pub fn reattach(&self, kind: ResourceKind) -> bool {
        self.registry.reattach(kind)
    }

    /// The collection store (snapshots, versions, update listeners).
    pub fn store(&self) -> &Arc<CollectionStore> {
        &self.store
    }

    /// Current snapshot of `kind` as a tagged payload.
    pub fn snapshot(&self, kind: ResourceKind) -> CollectionRows {
        self.store.rows(kind)
    }

    /// Connection state for `kind` (`Disconnected` when nothing is attached).
    pub fn connection_state(&self, kind: ResourceKind) -> ConnectionState {
        self.registry.connection_state(kind)
    }

    /// Watch stream of connection state for `kind`, if attached.
    pub fn watch_connection(&self, kind: ResourceKind) -> Option<watch::Receiver<ConnectionState>> {
        self.registry.watch_connection(kind)
    }

    /// The current derived-metrics snapshot.
    pub fn analytics(&self) -> Arc<AnalyticsSnapshot> {
        self.analytics.snapshot()
    }

    /// Join a presence channel as the current identity.
    pub fn join_presence(&self, channel: PresenceChannel) -> Result<PresenceTracker> {
        let transport = self
            .presence
            .clone()
            .ok_or_else(|| SyncError::Configuration("no presence transport configured".into()))?;
        let identity = self.identity.current().ok_or(SyncError::NoIdentity)?;
        let meta = PresenceMeta {
            display_name: self
                .display_name
                .clone()
                .unwrap_or_else(|| identity.to_string()),
            joined_at: Utc::now(),
        };
        Ok(PresenceTracker::join(
            channel,
            identity,
            meta,
            transport,
            &self.timeouts,
        ))
    }

    /// The shared registry (advanced consumers and tests).
    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// Diagnostic snapshot of every live channel.
    pub fn registry_stats(&self) -> Vec<RegistryEntryStats> {
        self.registry.stats()
    }
}

impl Drop for SyncClient {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// React to sign-in/sign-out: rebind live channels to the new identity, or
/// tear everything down and clear the caches.
async fn run_identity_watch(
    identity: Arc<dyn IdentityProvider>,
    registry: Arc<SubscriptionRegistry>,
    notifier: Arc<ChangeNotifier>,
    store: Arc<CollectionStore>,
    cancel: CancellationToken,
) {
    let mut rx = identity.watch();
    let mut current = rx.borrow().clone();

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => return,

            changed = rx.changed() => {
                if changed.is_err() {
                    return;
                }
                let next = rx.borrow_and_update().clone();
                if next == current {
                    continue;
                }
                match &next {
                    None => {
                        info!("[sync] signed out, tearing down all channels");
                        registry.reset();
                        store.reset_all();
                    }
                    Some(id) => {
                        let rebound = registry.rebind(id);
                        // Rebound collections belong to the new identity now;
                        // their cached rows are stale until re-fetched.
                        for kind in rebound {
                            notifier.on_feed_event(kind, id.clone());
                        }
                    }
                }
                current = next;
            }
        }
    }
}

// ── Builder ─────────────────────────────────────────────────────────────────

/// Builder for [`SyncClient`].
pub struct SyncClientBuilder {
    feed: Option<Arc<dyn ChangeFeed>>,
    data_source: Option<Arc<dyn DataSource>>,
    presence: Option<Arc<dyn PresenceTransport>>,
    identity: Option<Arc<dyn IdentityProvider>>,
    display_name: Option<String>,
    retry: RetryOptions,
    timeouts: SyncTimeouts,
}

impl SyncClientBuilder {
    fn new() -> Self {
        Self {
            feed: None,
            data_source: None,
            presence: None,
            identity: None,
            display_name: None,
            retry: RetryOptions::default(),
            timeouts: SyncTimeouts::default(),
        }
    }

    /// Set the change-feed transport (required).
    pub fn change_feed(mut self, feed: Arc<dyn ChangeFeed>) -> Self {
        self.feed = Some(feed);
        self
    }

    /// Set the bulk-list data source (required).
    pub fn data_source(mut self, source: Arc<dyn DataSource>) -> Self {
        self.data_source = Some(source);
        self
    }

    /// Set the presence transport (optional; presence joins fail without it).
    pub fn presence_transport(mut self, transport: Arc<dyn PresenceTransport>) -> Self {
        self.presence = Some(transport);
        self
    }

    /// Set the identity provider (required).
    pub fn identity_provider(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.identity = Some(provider);
        self
    }

    /// Display name announced on presence channels. Defaults to the
    /// identity key.
    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Override the retry policy.
    pub fn retry(mut self, retry: RetryOptions) -> Self {
        self.retry = retry;
        self
    }

    /// Override the timeout configuration.
    pub fn timeouts(mut self, timeouts: SyncTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Build the client. Must run inside a tokio runtime.
    pub fn build(self) -> Result<SyncClient> {
        let feed = self
            .feed
            .ok_or_else(|| SyncError::Configuration("change_feed is required".into()))?;
        let data_source = self
            .data_source
            .ok_or_else(|| SyncError::Configuration("data_source is required".into()))?;
        let identity = self
            .identity
            .ok_or_else(|| SyncError::Configuration("identity_provider is required".into()))?;

        let store = CollectionStore::new();
        let notifier = ChangeNotifier::new(data_source, store.clone());
        let registry = SubscriptionRegistry::new(
            feed,
            notifier.clone(),
            self.retry.clone(),
            self.timeouts.clone(),
        );

        let analytics = AnalyticsCell::new(store.clone());
        let tasks_cell = analytics.clone();
        let team_cell = analytics.clone();
        let analytics_guards = [
            store.tasks.subscribe_updates(move || tasks_cell.maybe_recompute()),
            store
                .team_members
                .subscribe_updates(move || team_cell.maybe_recompute()),
        ];

        let cancel = CancellationToken::new();
        let identity_task = tokio::spawn(run_identity_watch(
            identity.clone(),
            registry.clone(),
            notifier.clone(),
            store.clone(),
            cancel.clone(),
        ));

        Ok(SyncClient {
            registry,
            store,
            notifier,
            identity,
            presence: self.presence,
            timeouts: self.timeouts,
            display_name: self.display_name,
            analytics,
            cancel,
            _identity_task: identity_task,
            _analytics_guards: analytics_guards,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::SessionIdentity;
    use crate::transport::{EventFilter, FeedEvent, FeedSubscription};
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    struct NullFeed;

    #[async_trait]
    impl ChangeFeed for NullFeed {
        async fn subscribe(
            &self,
            _topic: &str,
            _filter: &EventFilter,
            _identity: &IdentityId,
        ) -> Result<FeedSubscription> {
            let (tx, rx) = mpsc::channel(1);
            let _ = tx.send(FeedEvent::Subscribed).await;
            std::mem::forget(tx);
            Ok(FeedSubscription::new(rx, CancellationToken::new()))
        }
    }

    struct NullSource;

    #[async_trait]
    impl DataSource for NullSource {
        async fn list(&self, kind: ResourceKind, _identity: &IdentityId) -> Result<CollectionRows> {
            Ok(CollectionRows::empty(kind))
        }
    }

    #[tokio::test]
    async fn builder_requires_collaborators() {
        let result = SyncClient::builder().build();
        assert!(matches!(result, Err(SyncError::Configuration(_))));
    }

    #[tokio::test]
    async fn attach_without_identity_fails() {
        let client = SyncClient::builder()
            .change_feed(Arc::new(NullFeed))
            .data_source(Arc::new(NullSource))
            .identity_provider(SessionIdentity::new(None))
            .build()
            .unwrap();

        assert!(matches!(
            client.attach(ResourceKind::Tasks),
            Err(SyncError::NoIdentity)
        ));
        assert_eq!(
            client.connection_state(ResourceKind::Tasks),
            ConnectionState::Disconnected
        );
    }
}
