//! Shared mock collaborators for the integration suite.
//!
//! - [`MockFeed`]: scriptable change-feed transport. Each subscribe call
//!   consumes the next [`SubscribeOutcome`] from the script (default: ack
//!   immediately); the active channel per topic can be driven with
//!   [`MockFeed::emit`].
//! - [`MockSource`]: scriptable bulk-list source with per-kind rows, a
//!   failure switch, and a hold gate for coalescing tests.
//! - [`MockPresence`]: presence transport handing the test a remote end to
//!   drive Sync/Join/Leave events and observe announces.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use crewdeck_sync::{
    ChangeFeed, ChangeNotice, ChangeOp, CollectionRows, DataSource, EventFilter, FeedEvent,
    FeedSubscription, IdentityId, Platform, PresenceChannel, PresenceEvent, PresenceMeta,
    PresenceSubscription, PresenceTransport, ResourceKind, Result, SyncError, Task, TaskPriority,
    TaskStatus, TeamMember,
};
use crewdeck_sync::models::MemberRole;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

// ── Change feed ─────────────────────────────────────────────────────────────

/// What one subscribe call should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    /// Ack immediately.
    Ok,
    /// The subscribe call itself fails.
    ErrCall,
    /// Open the channel, then report a channel error instead of an ack.
    ChannelError,
    /// Open the channel and never ack (drives the bounded-wait timeout).
    Silent,
}

#[derive(Default)]
struct FeedState {
    script: VecDeque<SubscribeOutcome>,
    subscribes: Vec<Instant>,
    active: HashMap<String, mpsc::Sender<FeedEvent>>,
}

pub struct MockFeed {
    state: Mutex<FeedState>,
}

impl MockFeed {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(FeedState::default()),
        })
    }

    /// Queue outcomes for upcoming subscribe calls (consumed in order; an
    /// empty script acks immediately).
    pub fn script(&self, outcomes: impl IntoIterator<Item = SubscribeOutcome>) {
        self.state.lock().unwrap().script.extend(outcomes);
    }

    pub fn subscribe_count(&self) -> usize {
        self.state.lock().unwrap().subscribes.len()
    }

    /// Paused-clock instants of every subscribe call, in order.
    pub fn subscribe_instants(&self) -> Vec<Instant> {
        self.state.lock().unwrap().subscribes.clone()
    }

    /// Emit a feed event on the active channel for `topic`.
    pub fn emit(&self, topic: &str, event: FeedEvent) -> bool {
        let sender = self.state.lock().unwrap().active.get(topic).cloned();
        match sender {
            Some(tx) => tx.try_send(event).is_ok(),
            None => false,
        }
    }

    /// Emit a row-change notice on `topic`.
    pub fn emit_change(&self, topic: &str) -> bool {
        self.emit(topic, FeedEvent::Change(ChangeNotice::new(ChangeOp::Update)))
    }
}

#[async_trait]
impl ChangeFeed for MockFeed {
    async fn subscribe(
        &self,
        topic: &str,
        _filter: &EventFilter,
        _identity: &IdentityId,
    ) -> Result<FeedSubscription> {
        let outcome = {
            let mut state = self.state.lock().unwrap();
            state.subscribes.push(Instant::now());
            state.script.pop_front().unwrap_or(SubscribeOutcome::Ok)
        };

        if outcome == SubscribeOutcome::ErrCall {
            return Err(SyncError::Channel("mock subscribe refused".into()));
        }

        let (tx, rx) = mpsc::channel(64);
        match outcome {
            SubscribeOutcome::Ok => {
                tx.try_send(FeedEvent::Subscribed).ok();
            }
            SubscribeOutcome::ChannelError => {
                tx.try_send(FeedEvent::ChannelError("mock channel error".into()))
                    .ok();
            }
            SubscribeOutcome::Silent | SubscribeOutcome::ErrCall => {}
        }
        self.state
            .lock()
            .unwrap()
            .active
            .insert(topic.to_string(), tx);

        Ok(FeedSubscription::new(rx, CancellationToken::new()))
    }
}

// ── Data source ─────────────────────────────────────────────────────────────

pub struct MockSource {
    rows: Mutex<HashMap<ResourceKind, CollectionRows>>,
    fail: AtomicBool,
    calls: AtomicUsize,
    last_identity: Mutex<Option<IdentityId>>,
    hold: Mutex<Option<Arc<Notify>>>,
}

impl MockSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            rows: Mutex::new(HashMap::new()),
            fail: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            last_identity: Mutex::new(None),
            hold: Mutex::new(None),
        })
    }

    pub fn set_rows(&self, rows: CollectionRows) {
        self.rows.lock().unwrap().insert(rows.kind(), rows);
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_identity(&self) -> Option<IdentityId> {
        self.last_identity.lock().unwrap().clone()
    }

    /// Hold every list call open until [`MockSource::release_one`].
    pub fn block(&self) {
        *self.hold.lock().unwrap() = Some(Arc::new(Notify::new()));
    }

    /// Let one held list call proceed.
    pub fn release_one(&self) {
        if let Some(gate) = self.hold.lock().unwrap().as_ref() {
            gate.notify_one();
        }
    }

    /// Stop holding list calls.
    pub fn unblock(&self) {
        *self.hold.lock().unwrap() = None;
    }
}

#[async_trait]
impl DataSource for MockSource {
    async fn list(&self, kind: ResourceKind, identity: &IdentityId) -> Result<CollectionRows> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_identity.lock().unwrap() = Some(identity.clone());

        let gate = self.hold.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if self.fail.load(Ordering::SeqCst) {
            return Err(SyncError::Fetch("mock list failure".into()));
        }
        let rows = self.rows.lock().unwrap().get(&kind).cloned();
        Ok(rows.unwrap_or_else(|| CollectionRows::empty(kind)))
    }
}

// ── Presence ────────────────────────────────────────────────────────────────

/// Test-side end of a joined presence channel.
pub struct PresenceRemote {
    pub events: mpsc::Sender<PresenceEvent>,
    pub announces: mpsc::Receiver<PresenceMeta>,
}

pub struct MockPresence {
    fail: AtomicBool,
    remote: Mutex<Option<PresenceRemote>>,
}

impl MockPresence {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            fail: AtomicBool::new(false),
            remote: Mutex::new(None),
        })
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Take the remote end of the most recent join.
    pub fn take_remote(&self) -> Option<PresenceRemote> {
        self.remote.lock().unwrap().take()
    }
}

#[async_trait]
impl PresenceTransport for MockPresence {
    async fn join(
        &self,
        _channel: PresenceChannel,
        _identity: &IdentityId,
    ) -> Result<PresenceSubscription> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(SyncError::Presence("mock join refused".into()));
        }
        let (event_tx, event_rx) = mpsc::channel(64);
        let (announce_tx, announce_rx) = mpsc::channel(8);
        *self.remote.lock().unwrap() = Some(PresenceRemote {
            events: event_tx,
            announces: announce_rx,
        });
        Ok(PresenceSubscription::new(
            event_rx,
            announce_tx,
            CancellationToken::new(),
        ))
    }
}

// ── Fixtures ────────────────────────────────────────────────────────────────

pub fn at(y: i32, mo: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, 0, 0).unwrap()
}

pub fn task(id: &str, status: TaskStatus) -> Task {
    let created = at(2026, 8, 3, 9);
    Task {
        id: id.to_string(),
        title: format!("task {}", id),
        status,
        priority: TaskPriority::Medium,
        platform: Platform::Instagram,
        assignee_id: None,
        created_at: created,
        updated_at: created,
        completed_at: (status == TaskStatus::Completed).then(|| at(2026, 8, 5, 9)),
        due_at: None,
    }
}

pub fn member(id: &str, identity: &str) -> TeamMember {
    TeamMember {
        id: id.to_string(),
        identity: IdentityId::new(identity),
        name: format!("member {}", id),
        role: MemberRole::Member,
        created_at: at(2026, 1, 1, 0),
    }
}
