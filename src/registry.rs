//! Process-wide, reference-counted directory of live connection supervisors.
//!
//! Multiplexes N independent consumers (screens) onto one physical channel
//! per resource kind:
//!
//! - `acquire` reuses a live entry bound to the same identity, or tears a
//!   stale entry down first when the identity changed (re-authentication).
//! - `release` decrements the refcount; at zero, teardown is deferred by a
//!   short debounce window so rapid detach/attach churn never restarts the
//!   connect cycle.
//! - Refcount is never negative, and at most one live supervisor exists per
//!   `(resource kind, identity)` at any instant.
//!
//! Entries carry an `instance` id (bumped whenever an entry is replaced) so
//! a release from a handle of a superseded entry cannot touch its
//! replacement. The `epoch` counter is bumped on every acquire and
//! release; a scheduled teardown fires only if the epoch it captured is
//! still current.
//!
//! Construction and `acquire` must run inside a tokio runtime (supervisors
//! and the teardown janitor are spawned tasks); releases are runtime-free.

use crate::identity::IdentityId;
use crate::notifier::ChangeNotifier;
use crate::resource::ResourceKind;
use crate::retry::RetryOptions;
use crate::supervisor::{ConnectionState, ConnectionSupervisor};
use crate::timeouts::SyncTimeouts;
use crate::transport::ChangeFeed;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, watch};

struct RegistryEntry {
    supervisor: Arc<ConnectionSupervisor>,
    refcount: usize,
    identity: IdentityId,
    /// Bumped when the entry is replaced; stale handles are ignored.
    instance: u64,
    /// Bumped on every acquire/release; guards debounced teardown.
    epoch: u64,
}

struct TeardownRequest {
    kind: ResourceKind,
    instance: u64,
    epoch: u64,
}

/// Snapshot of one registry entry, for diagnostics.
#[derive(Debug, Clone)]
pub struct RegistryEntryStats {
    pub kind: ResourceKind,
    pub identity: IdentityId,
    pub refcount: usize,
    pub state: ConnectionState,
    pub retry_attempts: u32,
}

/// The refcounted supervisor directory.
pub struct SubscriptionRegistry {
    entries: DashMap<ResourceKind, RegistryEntry>,
    feed: Arc<dyn ChangeFeed>,
    notifier: Arc<ChangeNotifier>,
    retry: RetryOptions,
    timeouts: SyncTimeouts,
    next_instance: AtomicU64,
    janitor_tx: mpsc::UnboundedSender<TeardownRequest>,
}

impl SubscriptionRegistry {
    /// Create the registry and start its teardown janitor.
    pub fn new(
        feed: Arc<dyn ChangeFeed>,
        notifier: Arc<ChangeNotifier>,
        retry: RetryOptions,
        timeouts: SyncTimeouts,
    ) -> Arc<Self> {
        let (janitor_tx, janitor_rx) = mpsc::unbounded_channel();
        let debounce = timeouts.teardown_debounce;

        let registry = Arc::new(Self {
            entries: DashMap::new(),
            feed,
            notifier,
            retry,
            timeouts,
            next_instance: AtomicU64::new(0),
            janitor_tx,
        });

        // The janitor holds only a weak reference: the registry dropping
        // closes the channel and ends the task.
        tokio::spawn(run_janitor(Arc::downgrade(&registry), janitor_rx, debounce));

        registry
    }

    fn spawn_supervisor(&self, kind: ResourceKind, identity: IdentityId) -> Arc<ConnectionSupervisor> {
        Arc::new(ConnectionSupervisor::attach(
            kind,
            identity,
            self.feed.clone(),
            self.notifier.clone(),
            self.retry.clone(),
            self.timeouts.clone(),
        ))
    }

    /// Attach a consumer to `(kind, identity)`, starting or sharing the
    /// underlying channel.
    pub fn acquire(self: &Arc<Self>, kind: ResourceKind, identity: IdentityId) -> SubscriptionHandle {
        let instance = match self.entries.entry(kind) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if entry.identity == identity {
                    entry.refcount += 1;
                    entry.epoch += 1;
                    debug!(
                        "[sync] {}: acquired shared channel (refcount {})",
                        kind, entry.refcount
                    );
                    entry.instance
                } else {
                    // Identity changed: the stale channel goes down now, a
                    // fresh one comes up for the new identity.
                    info!(
                        "[sync] {}: identity changed ({} -> {}), recreating channel",
                        kind, entry.identity, identity
                    );
                    entry.supervisor.detach();
                    let instance = self.next_instance.fetch_add(1, Ordering::Relaxed) + 1;
                    *entry = RegistryEntry {
                        supervisor: self.spawn_supervisor(kind, identity.clone()),
                        refcount: 1,
                        identity: identity.clone(),
                        instance,
                        epoch: 0,
                    };
                    instance
                }
            }
            Entry::Vacant(vacant) => {
                let instance = self.next_instance.fetch_add(1, Ordering::Relaxed) + 1;
                debug!("[sync] {}: starting channel for {}", kind, identity);
                vacant.insert(RegistryEntry {
                    supervisor: self.spawn_supervisor(kind, identity.clone()),
                    refcount: 1,
                    identity,
                    instance,
                    epoch: 0,
                });
                instance
            }
        };

        SubscriptionHandle {
            registry: self.clone(),
            kind,
            instance,
            released: AtomicBool::new(false),
        }
    }

    fn release_inner(&self, kind: ResourceKind, instance: u64) {
        let scheduled = {
            let mut entry = match self.entries.get_mut(&kind) {
                Some(entry) => entry,
                None => return,
            };
            if entry.instance != instance {
                // Handle from a superseded entry; its channel is long gone.
                return;
            }
            if entry.refcount == 0 {
                warn!("[sync] {}: release with zero refcount ignored", kind);
                return;
            }
            entry.refcount -= 1;
            entry.epoch += 1;
            debug!("[sync] {}: released (refcount {})", kind, entry.refcount);
            (entry.refcount == 0).then_some(entry.epoch)
        };

        if let Some(epoch) = scheduled {
            let _ = self.janitor_tx.send(TeardownRequest {
                kind,
                instance,
                epoch,
            });
        }
    }

    fn finish_teardown(&self, kind: ResourceKind, instance: u64, epoch: u64) {
        if let Entry::Occupied(occupied) = self.entries.entry(kind) {
            let entry = occupied.get();
            if entry.instance == instance && entry.epoch == epoch && entry.refcount == 0 {
                entry.supervisor.detach();
                occupied.remove();
                debug!("[sync] {}: channel torn down after debounce", kind);
            }
        }
    }

    /// Rebind every live entry to a new identity (re-authentication).
    ///
    /// Consumer refcounts are preserved; each rebound kind gets a fresh
    /// supervisor under the new identity. Returns the kinds rebound.
    pub fn rebind(self: &Arc<Self>, new_identity: &IdentityId) -> Vec<ResourceKind> {
        let mut rebound = Vec::new();
        for mut entry in self.entries.iter_mut() {
            if &entry.identity != new_identity {
                let kind = *entry.key();
                entry.supervisor.detach();
                entry.supervisor = self.spawn_supervisor(kind, new_identity.clone());
                entry.identity = new_identity.clone();
                entry.epoch += 1;
                rebound.push(kind);
            }
        }
        if !rebound.is_empty() {
            info!(
                "[sync] rebound {} channel(s) to {}",
                rebound.len(),
                new_identity
            );
        }
        rebound
    }

    /// Tear down every entry immediately (sign-out). Outstanding handles
    /// become inert.
    pub fn reset(&self) {
        let before = self.entries.len();
        self.entries.retain(|_, entry| {
            entry.supervisor.detach();
            false
        });
        if before > 0 {
            info!("[sync] registry reset, {} channel(s) torn down", before);
        }
    }

    /// Restart a supervisor that settled at `Disconnected` after exhausting
    /// its retries. No-op unless the entry exists and is terminal.
    pub fn reattach(self: &Arc<Self>, kind: ResourceKind) -> bool {
        let mut entry = match self.entries.get_mut(&kind) {
            Some(entry) => entry,
            None => return false,
        };
        if entry.supervisor.state() != ConnectionState::Disconnected {
            return false;
        }
        info!("[sync] {}: manual re-attach", kind);
        let identity = entry.identity.clone();
        entry.supervisor.detach();
        entry.supervisor = self.spawn_supervisor(kind, identity);
        entry.epoch += 1;
        true
    }

    /// Consumer count for `kind` (0 when no entry exists).
    pub fn refcount(&self, kind: ResourceKind) -> usize {
        self.entries.get(&kind).map(|e| e.refcount).unwrap_or(0)
    }

    /// The live supervisor for `kind`, if any.
    pub fn supervisor(&self, kind: ResourceKind) -> Option<Arc<ConnectionSupervisor>> {
        self.entries.get(&kind).map(|e| e.supervisor.clone())
    }

    /// Connection state for `kind` (`Disconnected` when no entry exists).
    pub fn connection_state(&self, kind: ResourceKind) -> ConnectionState {
        self.entries
            .get(&kind)
            .map(|e| e.supervisor.state())
            .unwrap_or(ConnectionState::Disconnected)
    }

    /// Watch stream of connection state for `kind`.
    pub fn watch_connection(&self, kind: ResourceKind) -> Option<watch::Receiver<ConnectionState>> {
        self.entries.get(&kind).map(|e| e.supervisor.watch_state())
    }

    /// Diagnostic snapshot of every live entry.
    pub fn stats(&self) -> Vec<RegistryEntryStats> {
        self.entries
            .iter()
            .map(|entry| RegistryEntryStats {
                kind: *entry.key(),
                identity: entry.identity.clone(),
                refcount: entry.refcount,
                state: entry.supervisor.state(),
                retry_attempts: entry.supervisor.retry_attempts(),
            })
            .collect()
    }
}

async fn run_janitor(
    registry: Weak<SubscriptionRegistry>,
    mut rx: mpsc::UnboundedReceiver<TeardownRequest>,
    debounce: std::time::Duration,
) {
    while let Some(request) = rx.recv().await {
        let registry = registry.clone();
        tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            if let Some(registry) = registry.upgrade() {
                registry.finish_teardown(request.kind, request.instance, request.epoch);
            }
        });
    }
}

/// A consumer's claim on a shared channel. Releases on drop.
pub struct SubscriptionHandle {
    registry: Arc<SubscriptionRegistry>,
    kind: ResourceKind,
    instance: u64,
    released: AtomicBool,
}

impl SubscriptionHandle {
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Connection state of the underlying channel.
    pub fn connection_state(&self) -> ConnectionState {
        self.registry.connection_state(self.kind)
    }

    /// Detach this consumer. Idempotent; also runs on drop.
    pub fn release(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            self.registry.release_inner(self.kind, self.instance);
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::store::CollectionStore;
    use crate::transport::{DataSource, EventFilter, FeedEvent, FeedSubscription};
    use crate::models::CollectionRows;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use tokio_util::sync::CancellationToken;

    /// Feed that acks immediately and counts subscribe calls. Senders are
    /// retained so channels stay open until torn down.
    struct CountingFeed {
        subscribes: AtomicUsize,
        senders: Mutex<Vec<mpsc::Sender<FeedEvent>>>,
    }

    impl CountingFeed {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                subscribes: AtomicUsize::new(0),
                senders: Mutex::new(Vec::new()),
            })
        }

        fn subscribe_count(&self) -> usize {
            self.subscribes.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ChangeFeed for CountingFeed {
        async fn subscribe(
            &self,
            _topic: &str,
            _filter: &EventFilter,
            _identity: &IdentityId,
        ) -> Result<FeedSubscription> {
            self.subscribes.fetch_add(1, Ordering::SeqCst);
            let (tx, rx) = mpsc::channel(8);
            tx.send(FeedEvent::Subscribed).await.ok();
            self.senders.lock().unwrap().push(tx);
            Ok(FeedSubscription::new(rx, CancellationToken::new()))
        }
    }

    struct EmptySource;

    #[async_trait]
    impl DataSource for EmptySource {
        async fn list(&self, kind: ResourceKind, _identity: &IdentityId) -> Result<CollectionRows> {
            Ok(CollectionRows::empty(kind))
        }
    }

    fn make_registry(feed: Arc<CountingFeed>) -> Arc<SubscriptionRegistry> {
        let store = CollectionStore::new();
        let notifier = ChangeNotifier::new(Arc::new(EmptySource), store);
        SubscriptionRegistry::new(feed, notifier, RetryOptions::default(), SyncTimeouts::fast())
    }

    #[tokio::test(start_paused = true)]
    async fn refcount_shares_one_channel() {
        let feed = CountingFeed::new();
        let registry = make_registry(feed.clone());
        let identity = IdentityId::new("user-1");

        let a = registry.acquire(ResourceKind::Tasks, identity.clone());
        let b = registry.acquire(ResourceKind::Tasks, identity.clone());
        tokio::time::sleep(std::time::Duration::from_millis(1)).await;

        assert_eq!(registry.refcount(ResourceKind::Tasks), 2);
        assert_eq!(feed.subscribe_count(), 1);

        a.release();
        assert_eq!(registry.refcount(ResourceKind::Tasks), 1);
        drop(b);
        // Debounce window not yet elapsed: entry still present.
        assert_eq!(registry.refcount(ResourceKind::Tasks), 0);
        assert!(registry.supervisor(ResourceKind::Tasks).is_some());

        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        assert!(registry.supervisor(ResourceKind::Tasks).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn reacquire_within_debounce_keeps_channel() {
        let feed = CountingFeed::new();
        let registry = make_registry(feed.clone());
        let identity = IdentityId::new("user-1");

        let a = registry.acquire(ResourceKind::Tasks, identity.clone());
        tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        let first = registry.supervisor(ResourceKind::Tasks).unwrap();

        a.release();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let b = registry.acquire(ResourceKind::Tasks, identity.clone());

        // Past the original debounce deadline: teardown must have been
        // cancelled by the re-acquire.
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        assert_eq!(registry.refcount(ResourceKind::Tasks), 1);
        let second = registry.supervisor(ResourceKind::Tasks).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(feed.subscribe_count(), 1);
        drop(b);
    }

    #[tokio::test(start_paused = true)]
    async fn identity_change_recreates_entry_and_ignores_stale_release() {
        let feed = CountingFeed::new();
        let registry = make_registry(feed.clone());

        let old = registry.acquire(ResourceKind::Tasks, IdentityId::new("user-1"));
        tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        let new = registry.acquire(ResourceKind::Tasks, IdentityId::new("user-2"));
        tokio::time::sleep(std::time::Duration::from_millis(1)).await;

        assert_eq!(feed.subscribe_count(), 2);
        assert_eq!(registry.refcount(ResourceKind::Tasks), 1);

        // The superseded handle must not decrement the fresh entry.
        old.release();
        assert_eq!(registry.refcount(ResourceKind::Tasks), 1);

        drop(new);
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        assert!(registry.supervisor(ResourceKind::Tasks).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn double_release_is_idempotent() {
        let feed = CountingFeed::new();
        let registry = make_registry(feed);
        let handle = registry.acquire(ResourceKind::Tasks, IdentityId::new("user-1"));

        handle.release();
        handle.release();
        assert_eq!(registry.refcount(ResourceKind::Tasks), 0);
    }
}
