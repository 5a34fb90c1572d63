//! Connection supervision for a single resource feed.
//!
//! One supervisor exists per `(resource kind, identity)` pair. It owns the
//! feed subscription and runs the connect → subscribe → (ack | error |
//! timeout) cycle on a background task:
//!
//! - A `Subscribed` acknowledgment (bounded wait) transitions to `Connected`
//!   and resets the retry counter.
//! - A subscribe failure, channel error, or timeout transitions to `Error`
//!   and schedules a retry with exponential backoff.
//! - Exhausted retries settle at `Disconnected` permanently; only a fresh
//!   attach cycle (identity change or manual re-attach) starts over.
//! - Every feed change event hands the collection to the change notifier
//!   without blocking this state machine.
//!
//! Detach is idempotent: it cancels in-flight connects and pending retry
//! timers, and no stale `Connected` transition can land after it.

use crate::identity::IdentityId;
use crate::notifier::ChangeNotifier;
use crate::resource::ResourceKind;
use crate::retry::RetryOptions;
use crate::timeouts::SyncTimeouts;
use crate::transport::{ChangeFeed, EventFilter, FeedEvent, FeedSubscription};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Connection lifecycle state, surfaced to consumers as a value, never as
/// an exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// How one connect attempt ended.
enum CycleEnd {
    /// Detached while connected or connecting.
    Canceled,
    /// Channel failed; retry policy decides what happens next.
    Failed(String),
}

/// Supervises one feed channel.
pub struct ConnectionSupervisor {
    kind: ResourceKind,
    identity: IdentityId,
    state_rx: watch::Receiver<ConnectionState>,
    attempts: Arc<AtomicU32>,
    cancel: CancellationToken,
    _task: JoinHandle<()>,
}

impl ConnectionSupervisor {
    /// Spawn the supervision cycle for `(kind, identity)`.
    pub fn attach(
        kind: ResourceKind,
        identity: IdentityId,
        feed: Arc<dyn ChangeFeed>,
        notifier: Arc<ChangeNotifier>,
        retry: RetryOptions,
        timeouts: SyncTimeouts,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let attempts = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run_cycle(
            kind,
            identity.clone(),
            feed,
            notifier,
            retry,
            timeouts,
            state_tx,
            attempts.clone(),
            cancel.clone(),
        ));

        Self {
            kind,
            identity,
            state_rx,
            attempts,
            cancel,
            _task: task,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn identity(&self) -> &IdentityId {
        &self.identity
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Watch stream of state transitions.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Retry attempts recorded in the current attach cycle. Reset to zero on
    /// every successful `Connected` transition.
    pub fn retry_attempts(&self) -> u32 {
        self.attempts.load(Ordering::Acquire)
    }

    /// Tear down the channel and cancel any pending retry. Idempotent; safe
    /// to call during an in-flight connect.
    pub fn detach(&self) {
        self.cancel.cancel();
    }

    pub fn is_detached(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for ConnectionSupervisor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Open a channel and wait (bounded) for the `Subscribed` acknowledgment.
async fn open_and_await_ack(
    feed: &Arc<dyn ChangeFeed>,
    kind: ResourceKind,
    identity: &IdentityId,
    timeouts: &SyncTimeouts,
) -> Result<FeedSubscription, String> {
    let mut sub = feed
        .subscribe(kind.topic(), &EventFilter::all(), identity)
        .await
        .map_err(|e| format!("subscribe call failed: {}", e))?;

    let ack = tokio::time::timeout(timeouts.subscribe_timeout, async {
        loop {
            match sub.events.recv().await {
                Some(FeedEvent::Subscribed) => return Ok(()),
                Some(FeedEvent::ChannelError(e)) => {
                    return Err(format!("channel error before ack: {}", e))
                }
                Some(FeedEvent::TimedOut) => return Err("transport reported timeout".to_string()),
                Some(FeedEvent::Closed) | None => {
                    return Err("channel closed before ack".to_string())
                }
                Some(FeedEvent::Change(_)) => {
                    // Changes before the ack are a transport quirk; the bulk
                    // re-fetch after Connected covers them anyway.
                    debug!("[sync] {}: change event before ack, ignoring", kind);
                }
            }
        }
    })
    .await;

    match ack {
        Ok(Ok(())) => Ok(sub),
        Ok(Err(reason)) => Err(reason),
        Err(_) => Err(format!(
            "no ack within {:?}",
            timeouts.subscribe_timeout
        )),
    }
}

/// Pump feed events until the channel fails, closes, or we are detached.
async fn pump_events(
    sub: &mut FeedSubscription,
    kind: ResourceKind,
    identity: &IdentityId,
    notifier: &Arc<ChangeNotifier>,
    cancel: &CancellationToken,
) -> CycleEnd {
    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                return CycleEnd::Canceled;
            }

            event = sub.events.recv() => {
                match event {
                    Some(FeedEvent::Change(notice)) => {
                        debug!("[sync] {}: {:?} event, invalidating", kind, notice.op);
                        notifier.on_feed_event(kind, identity.clone());
                    }
                    Some(FeedEvent::Subscribed) => {
                        // Duplicate ack after reconnect inside the transport.
                        debug!("[sync] {}: duplicate subscribed ack", kind);
                    }
                    Some(FeedEvent::ChannelError(e)) => {
                        return CycleEnd::Failed(format!("channel error: {}", e));
                    }
                    Some(FeedEvent::TimedOut) => {
                        return CycleEnd::Failed("transport reported timeout".to_string());
                    }
                    Some(FeedEvent::Closed) => {
                        return CycleEnd::Failed("channel closed".to_string());
                    }
                    None => {
                        return CycleEnd::Failed("event stream ended".to_string());
                    }
                }
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_cycle(
    kind: ResourceKind,
    identity: IdentityId,
    feed: Arc<dyn ChangeFeed>,
    notifier: Arc<ChangeNotifier>,
    retry: RetryOptions,
    timeouts: SyncTimeouts,
    state_tx: watch::Sender<ConnectionState>,
    attempts: Arc<AtomicU32>,
    cancel: CancellationToken,
) {
    let retry_key = format!("{}/{}", kind.topic(), identity);

    loop {
        if cancel.is_cancelled() {
            break;
        }
        let _ = state_tx.send(ConnectionState::Connecting);

        // Detach during an in-flight connect must win the race so a late
        // ack can never land as a stale Connected transition.
        let connect = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = open_and_await_ack(&feed, kind, &identity, &timeouts) => result,
        };

        match connect {
            Ok(mut sub) => {
                attempts.store(0, Ordering::Release);
                let _ = state_tx.send(ConnectionState::Connected);
                info!("[sync] {}: subscribed as {}", kind, identity);

                match pump_events(&mut sub, kind, &identity, &notifier, &cancel).await {
                    CycleEnd::Canceled => {
                        sub.close();
                        break;
                    }
                    CycleEnd::Failed(reason) => {
                        sub.close();
                        warn!("[sync] {}: {}", kind, reason);
                    }
                }
            }
            Err(reason) => {
                warn!("[sync] {}: subscribe failed: {}", kind, reason);
            }
        }

        if cancel.is_cancelled() {
            break;
        }
        let _ = state_tx.send(ConnectionState::Error);

        let n = attempts.load(Ordering::Acquire);
        if n >= retry.max_attempts {
            warn!(
                "[sync] {}: retries exhausted after {} attempts, staying disconnected",
                kind, n
            );
            let _ = state_tx.send(ConnectionState::Disconnected);
            return;
        }

        let n = n + 1;
        attempts.store(n, Ordering::Release);
        let delay = retry.delay_for_attempt(&retry_key, n);
        debug!(
            "[sync] {}: retry {}/{} in {:?}",
            kind, n, retry.max_attempts, delay
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    // Detached: release the channel and leave a terminal state behind for
    // any watcher still holding the receiver.
    let _ = state_tx.send(ConnectionState::Disconnected);
    debug!("[sync] {}: supervisor detached", kind);
}
