//! Best-effort presence tracking.
//!
//! A parallel, lighter-weight channel than the change feed: it reports which
//! identities are currently connected, independent of row-level changes.
//! Three event kinds update the online set: full-state sync (replace),
//! join (add one), leave (remove one). The tracker announces its own
//! presence once the channel reports a successful subscription.
//!
//! Presence failure never touches the change-notifier path; it only
//! degrades the online count to zero.

use crate::identity::IdentityId;
use crate::resource::PresenceChannel;
use crate::timeouts::SyncTimeouts;
use crate::transport::{PresenceEvent, PresenceMeta, PresenceTransport};
use log::{debug, warn};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Tracks the online-identity set for one presence channel.
pub struct PresenceTracker {
    channel: PresenceChannel,
    online: Arc<Mutex<HashSet<IdentityId>>>,
    count_rx: watch::Receiver<usize>,
    cancel: CancellationToken,
    _task: JoinHandle<()>,
}

impl PresenceTracker {
    /// Join `channel` as `identity` and start tracking.
    ///
    /// Best-effort: when the join fails or times out, the tracker stays
    /// alive with a zero online count.
    pub fn join(
        channel: PresenceChannel,
        identity: IdentityId,
        meta: PresenceMeta,
        transport: Arc<dyn PresenceTransport>,
        timeouts: &SyncTimeouts,
    ) -> Self {
        let online: Arc<Mutex<HashSet<IdentityId>>> = Arc::new(Mutex::new(HashSet::new()));
        let (count_tx, count_rx) = watch::channel(0usize);
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run_tracker(
            channel,
            identity,
            meta,
            transport,
            timeouts.presence_join_timeout,
            online.clone(),
            count_tx,
            cancel.clone(),
        ));

        Self {
            channel,
            online,
            count_rx,
            cancel,
            _task: task,
        }
    }

    pub fn channel(&self) -> PresenceChannel {
        self.channel
    }

    /// Number of identities currently online (0 when degraded).
    pub fn online_count(&self) -> usize {
        *self.count_rx.borrow()
    }

    /// Watch stream of the online count.
    pub fn watch_online_count(&self) -> watch::Receiver<usize> {
        self.count_rx.clone()
    }

    /// The current online set.
    pub fn online(&self) -> HashSet<IdentityId> {
        match self.online.lock() {
            Ok(set) => set.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Leave the channel. Idempotent; also runs on drop.
    pub fn leave(&self) {
        self.cancel.cancel();
    }
}

impl Drop for PresenceTracker {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_tracker(
    channel: PresenceChannel,
    identity: IdentityId,
    meta: PresenceMeta,
    transport: Arc<dyn PresenceTransport>,
    join_timeout: std::time::Duration,
    online: Arc<Mutex<HashSet<IdentityId>>>,
    count_tx: watch::Sender<usize>,
    cancel: CancellationToken,
) {
    let joined = tokio::select! {
        biased;
        _ = cancel.cancelled() => return,
        result = tokio::time::timeout(join_timeout, transport.join(channel, &identity)) => result,
    };

    let mut sub = match joined {
        Ok(Ok(sub)) => sub,
        Ok(Err(e)) => {
            warn!("[presence] {}: join failed, online count unavailable: {}", channel, e);
            return;
        }
        Err(_) => {
            warn!(
                "[presence] {}: join timed out after {:?}, online count unavailable",
                channel, join_timeout
            );
            return;
        }
    };

    let update = |set: &HashSet<IdentityId>| {
        let _ = count_tx.send(set.len());
    };

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                sub.close();
                return;
            }

            event = sub.events.recv() => {
                match event {
                    Some(PresenceEvent::Subscribed) => {
                        debug!("[presence] {}: subscribed, announcing {}", channel, identity);
                        if !sub.announce(meta.clone()).await {
                            warn!("[presence] {}: announce failed", channel);
                        }
                    }
                    Some(PresenceEvent::Sync(identities)) => {
                        let mut set = lock_set(&online);
                        set.clear();
                        set.extend(identities);
                        update(&set);
                    }
                    Some(PresenceEvent::Join(id)) => {
                        let mut set = lock_set(&online);
                        set.insert(id);
                        update(&set);
                    }
                    Some(PresenceEvent::Leave(id)) => {
                        let mut set = lock_set(&online);
                        set.remove(&id);
                        update(&set);
                    }
                    Some(PresenceEvent::Closed) | None => {
                        warn!("[presence] {}: channel closed, online count unavailable", channel);
                        lock_set(&online).clear();
                        let _ = count_tx.send(0);
                        return;
                    }
                }
            }
        }
    }
}

fn lock_set(online: &Mutex<HashSet<IdentityId>>) -> std::sync::MutexGuard<'_, HashSet<IdentityId>> {
    match online.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
