//! In-memory authoritative caches for the synced collections.
//!
//! Each resource kind has one snapshot cell. Snapshots are replaced
//! wholesale (`Arc<Vec<T>>` swap) so readers never observe a partially
//! updated collection, and every replacement bumps a monotonic version and
//! notifies the registered update listeners synchronously.

use crate::models::{ActivityEntry, Client, CollectionRows, Task, TeamMember};
use crate::resource::ResourceKind;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

/// Callback invoked after a snapshot replacement.
pub type UpdateListener = Arc<dyn Fn() + Send + Sync>;

type ListenerSlots = Arc<Mutex<Vec<(u64, UpdateListener)>>>;

/// Removes its listener from the owning cell when dropped.
pub struct ListenerGuard {
    slots: Weak<Mutex<Vec<(u64, UpdateListener)>>>,
    id: u64,
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        if let Some(slots) = self.slots.upgrade() {
            if let Ok(mut slots) = slots.lock() {
                slots.retain(|(id, _)| *id != self.id);
            }
        }
    }
}

/// One collection's snapshot cell.
pub struct StoreCell<T> {
    snapshot: RwLock<Arc<Vec<T>>>,
    loading: AtomicBool,
    version: AtomicU64,
    listeners: ListenerSlots,
    next_listener_id: AtomicU64,
}

impl<T> StoreCell<T> {
    fn new() -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(Vec::new())),
            loading: AtomicBool::new(false),
            version: AtomicU64::new(0),
            listeners: Arc::new(Mutex::new(Vec::new())),
            next_listener_id: AtomicU64::new(1),
        }
    }

    /// The current snapshot. Cheap: clones an `Arc`, never the rows.
    pub fn snapshot(&self) -> Arc<Vec<T>> {
        match self.snapshot.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Monotonic counter bumped on every snapshot replacement.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Whether a re-fetch for this collection is in flight.
    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Acquire)
    }

    pub(crate) fn set_loading(&self, loading: bool) {
        self.loading.store(loading, Ordering::Release);
    }

    /// Replace the snapshot wholesale and notify listeners synchronously.
    pub(crate) fn replace(&self, rows: Vec<T>) {
        {
            let mut guard = match self.snapshot.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            *guard = Arc::new(rows);
        }
        self.version.fetch_add(1, Ordering::AcqRel);
        self.loading.store(false, Ordering::Release);
        self.notify();
    }

    /// Register a listener fired on every snapshot replacement.
    ///
    /// The listener is removed when the returned guard drops.
    pub fn subscribe_updates(&self, listener: impl Fn() + Send + Sync + 'static) -> ListenerGuard {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut slots) = self.listeners.lock() {
            slots.push((id, Arc::new(listener)));
        }
        ListenerGuard {
            slots: Arc::downgrade(&self.listeners),
            id,
        }
    }

    fn notify(&self) {
        // Clone the callbacks out first so a listener that reads the store
        // (or drops its own guard) never re-enters the slots lock.
        let callbacks: Vec<UpdateListener> = match self.listeners.lock() {
            Ok(slots) => slots.iter().map(|(_, cb)| cb.clone()).collect(),
            Err(_) => Vec::new(),
        };
        for cb in callbacks {
            cb();
        }
    }
}

/// The set of per-kind snapshot cells.
pub struct CollectionStore {
    pub tasks: StoreCell<Task>,
    pub clients: StoreCell<Client>,
    pub team_members: StoreCell<TeamMember>,
    pub activity: StoreCell<ActivityEntry>,
}

impl CollectionStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            tasks: StoreCell::new(),
            clients: StoreCell::new(),
            team_members: StoreCell::new(),
            activity: StoreCell::new(),
        })
    }

    /// Route a fetched payload to its cell.
    pub(crate) fn apply(&self, rows: CollectionRows) {
        match rows {
            CollectionRows::Tasks(rows) => self.tasks.replace(rows),
            CollectionRows::Clients(rows) => self.clients.replace(rows),
            CollectionRows::TeamMembers(rows) => self.team_members.replace(rows),
            CollectionRows::Activity(rows) => self.activity.replace(rows),
        }
    }

    /// The current snapshot of `kind` as a tagged payload (rows cloned).
    pub fn rows(&self, kind: ResourceKind) -> CollectionRows {
        match kind {
            ResourceKind::Tasks => CollectionRows::Tasks(self.tasks.snapshot().as_ref().clone()),
            ResourceKind::Clients => {
                CollectionRows::Clients(self.clients.snapshot().as_ref().clone())
            }
            ResourceKind::TeamMembers => {
                CollectionRows::TeamMembers(self.team_members.snapshot().as_ref().clone())
            }
            ResourceKind::Activity => {
                CollectionRows::Activity(self.activity.snapshot().as_ref().clone())
            }
        }
    }

    pub fn version(&self, kind: ResourceKind) -> u64 {
        match kind {
            ResourceKind::Tasks => self.tasks.version(),
            ResourceKind::Clients => self.clients.version(),
            ResourceKind::TeamMembers => self.team_members.version(),
            ResourceKind::Activity => self.activity.version(),
        }
    }

    pub fn is_loading(&self, kind: ResourceKind) -> bool {
        match kind {
            ResourceKind::Tasks => self.tasks.is_loading(),
            ResourceKind::Clients => self.clients.is_loading(),
            ResourceKind::TeamMembers => self.team_members.is_loading(),
            ResourceKind::Activity => self.activity.is_loading(),
        }
    }

    pub(crate) fn set_loading(&self, kind: ResourceKind, loading: bool) {
        match kind {
            ResourceKind::Tasks => self.tasks.set_loading(loading),
            ResourceKind::Clients => self.clients.set_loading(loading),
            ResourceKind::TeamMembers => self.team_members.set_loading(loading),
            ResourceKind::Activity => self.activity.set_loading(loading),
        }
    }

    /// Register an update listener for `kind`.
    pub fn subscribe_updates(
        &self,
        kind: ResourceKind,
        listener: impl Fn() + Send + Sync + 'static,
    ) -> ListenerGuard {
        match kind {
            ResourceKind::Tasks => self.tasks.subscribe_updates(listener),
            ResourceKind::Clients => self.clients.subscribe_updates(listener),
            ResourceKind::TeamMembers => self.team_members.subscribe_updates(listener),
            ResourceKind::Activity => self.activity.subscribe_updates(listener),
        }
    }

    /// Reset every cell to an empty, not-loading snapshot (sign-out).
    pub(crate) fn reset_all(&self) {
        self.tasks.replace(Vec::new());
        self.clients.replace(Vec::new());
        self.team_members.replace(Vec::new());
        self.activity.replace(Vec::new());
    }
}
