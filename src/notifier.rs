//! The invalidate-then-refetch strategy.
//!
//! Feed events never apply payloads; each one invalidates its collection and
//! triggers a full bulk re-fetch. Re-fetches are coalesced per resource kind
//! with a single pending flag (trailing edge): at most one fetch runs at a
//! time, and any number of events arriving while it runs collapse into at
//! most one follow-up fetch.
//!
//! A fetch failure retains the previous snapshot and is logged; it never
//! touches connection state. That split keeps data-layer and
//! connection-layer failures independent.

use crate::identity::IdentityId;
use crate::resource::ResourceKind;
use crate::store::CollectionStore;
use crate::transport::DataSource;
use dashmap::DashMap;
use log::{debug, warn};
use std::sync::Arc;

#[derive(Default)]
struct RefetchGate {
    running: bool,
    /// Identity for the coalesced follow-up fetch, if one is owed.
    pending: Option<IdentityId>,
}

/// Named strategy object for the fetch-on-invalidate policy.
///
/// Owning the policy here (rather than inside the supervisor) means a
/// delta-merge strategy could replace it without touching the connection
/// state machine.
pub struct ChangeNotifier {
    source: Arc<dyn DataSource>,
    store: Arc<CollectionStore>,
    gates: DashMap<ResourceKind, RefetchGate>,
}

impl ChangeNotifier {
    pub fn new(source: Arc<dyn DataSource>, store: Arc<CollectionStore>) -> Arc<Self> {
        Arc::new(Self {
            source,
            store,
            gates: DashMap::new(),
        })
    }

    /// The collection store fed by this notifier.
    pub fn store(&self) -> &Arc<CollectionStore> {
        &self.store
    }

    /// Invalidate `kind` and schedule a re-fetch as `identity`.
    ///
    /// Called by the supervisor on every feed change event and by manual
    /// refresh. Returns immediately; the fetch runs on its own task so the
    /// caller's state machine never blocks on it.
    pub fn on_feed_event(self: &Arc<Self>, kind: ResourceKind, identity: IdentityId) {
        {
            let mut gate = self.gates.entry(kind).or_default();
            if gate.running {
                // Trailing-edge coalescing: one pending flag, not a queue.
                gate.pending = Some(identity);
                debug!("[sync] {}: refetch already in flight, coalescing", kind);
                return;
            }
            gate.running = true;
        }

        let notifier = self.clone();
        tokio::spawn(async move {
            notifier.run_refetch(kind, identity).await;
        });
    }

    async fn run_refetch(self: Arc<Self>, kind: ResourceKind, mut identity: IdentityId) {
        loop {
            self.store.set_loading(kind, true);
            match self.source.list(kind, &identity).await {
                Ok(rows) if rows.kind() == kind => {
                    debug!("[sync] {}: refetched {} rows", kind, rows.len());
                    self.store.apply(rows);
                }
                Ok(rows) => {
                    self.store.set_loading(kind, false);
                    warn!(
                        "[sync] {}: data source returned mismatched payload ({}), keeping previous snapshot",
                        kind,
                        rows.kind()
                    );
                }
                Err(e) => {
                    self.store.set_loading(kind, false);
                    warn!(
                        "[sync] {}: refetch failed, keeping previous snapshot: {}",
                        kind, e
                    );
                }
            }

            // Trailing edge: run exactly one follow-up if events arrived
            // while we were fetching, otherwise release the gate.
            let next = {
                let mut gate = match self.gates.get_mut(&kind) {
                    Some(gate) => gate,
                    None => return,
                };
                match gate.pending.take() {
                    Some(next) => Some(next),
                    None => {
                        gate.running = false;
                        None
                    }
                }
            };

            match next {
                Some(next) => identity = next,
                None => return,
            }
        }
    }
}
