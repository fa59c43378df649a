//! FutureRegistry: pending request tracking with timeout sweeping.
//!
//! # Architecture
//!
//! ```text
//! create(channel, id, timeout)
//!   └─ insert into by_id + by_channel ──► ResponseFuture (oneshot::Receiver)
//!
//! received(response) ─┐
//! cancel(id, reason) ─┼─ remove from both indexes under the lock
//! sweep(now) ─────────┘   └─ send outcome on the oneshot after unlocking
//! ```
//!
//! Removal from both indexes happens under one lock acquisition, so only the
//! first completer ever sees the entry. The outcome is delivered after the
//! lock is released; a completer never waits on the caller.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle, Thread};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tokio::sync::oneshot;

use super::response_future::{ResponseFuture, ResponseResult};
use crate::config::RegistryConfig;
use crate::envelope::Response;
use crate::error::{ExchangeError, ExchangeResult};
use crate::transport::ChannelId;

/// A request awaiting its response.
struct PendingEntry {
    /// Channel the request was sent on.
    channel: ChannelId,

    /// When the entry was registered.
    created_at: Instant,

    /// When the sweep completes the entry with a timeout.
    deadline: Instant,

    /// When the transport confirmed the write, if it has.
    sent_at: Option<Instant>,

    /// Completion slot; consumed on completion.
    sender: oneshot::Sender<ResponseResult>,
}

#[derive(Default)]
struct RegistryState {
    /// Pending entries keyed by request id.
    by_id: HashMap<u64, PendingEntry>,

    /// Request ids keyed by owning channel. Empty sets are removed.
    by_channel: HashMap<ChannelId, HashSet<u64>>,
}

impl RegistryState {
    /// Remove an entry from both indexes.
    ///
    /// Returns the entry and whether its channel has no pending work left.
    fn remove(&mut self, id: u64) -> Option<(PendingEntry, bool)> {
        let entry = self.by_id.remove(&id)?;
        let mut drained = false;
        if let Some(ids) = self.by_channel.get_mut(&entry.channel) {
            ids.remove(&id);
            if ids.is_empty() {
                self.by_channel.remove(&entry.channel);
                drained = true;
            }
        }
        Some((entry, drained))
    }
}

struct Shared {
    state: Mutex<RegistryState>,

    /// Signalled whenever a channel's pending set becomes empty.
    drained: Condvar,

    config: RegistryConfig,

    /// Sweeper started by [`FutureRegistry::new`]; woken on drop so it exits.
    sweeper: Mutex<Option<Thread>>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.get_mut().take() {
            sweeper.unpark();
        }
    }
}

/// Correlates request ids with pending results.
///
/// Cloning is cheap; clones share the same indexes. A registry built with
/// [`FutureRegistry::new`] runs its own timeout sweeper until the last clone
/// is dropped. [`FutureRegistry::manual`] leaves sweeping to the caller.
#[derive(Clone)]
pub struct FutureRegistry {
    shared: Arc<Shared>,
}

impl Default for FutureRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl FutureRegistry {
    /// Create an empty registry with a background timeout sweeper.
    ///
    /// The sweeper runs every `sweep_interval` and stops once every clone of
    /// the registry is dropped.
    pub fn new(config: RegistryConfig) -> Self {
        let registry = Self::manual(config);
        match registry.start_sweeper(Arc::new(AtomicBool::new(false))) {
            Ok(thread) => {
                *registry.shared.sweeper.lock() = Some(thread.thread().clone());
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to start future sweeper; timeouts will not fire");
            }
        }
        registry
    }

    /// Create an empty registry without a sweeper.
    ///
    /// Timeouts fire only when [`FutureRegistry::sweep`] is called or a
    /// sweeper is started with [`FutureRegistry::spawn_sweeper`].
    pub fn manual(config: RegistryConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(RegistryState::default()),
                drained: Condvar::new(),
                config,
                sweeper: Mutex::new(None),
            }),
        }
    }

    /// Register a pending request.
    ///
    /// # Errors
    ///
    /// Returns `ExchangeError::DuplicateId` if `request_id` is already pending.
    pub fn create(
        &self,
        channel: ChannelId,
        request_id: u64,
        timeout: Duration,
    ) -> ExchangeResult<ResponseFuture> {
        let (sender, receiver) = oneshot::channel();
        let now = Instant::now();
        {
            let mut state = self.shared.state.lock();
            if state.by_id.contains_key(&request_id) {
                tracing::error!(request_id, %channel, "request id already pending");
                return Err(ExchangeError::DuplicateId { id: request_id });
            }
            state.by_id.insert(
                request_id,
                PendingEntry {
                    channel,
                    created_at: now,
                    deadline: now + timeout,
                    sent_at: None,
                    sender,
                },
            );
            state.by_channel.entry(channel).or_default().insert(request_id);
        }
        tracing::debug!(request_id, %channel, ?timeout, "pending request registered");
        Ok(ResponseFuture::new(
            request_id,
            channel,
            timeout,
            receiver,
            self.clone(),
        ))
    }

    /// Complete the pending request matching `response`.
    ///
    /// Returns `false` when no request with that id is pending (it already
    /// timed out or was cancelled); the response is logged and dropped.
    pub fn received(&self, response: Response) -> bool {
        let id = response.id();
        match self.take(id) {
            Some(entry) => {
                tracing::debug!(request_id = id, status = ?response.status(), "response matched");
                deliver(id, entry, Ok(response));
                true
            }
            None => {
                tracing::warn!(
                    request_id = id,
                    status = ?response.status(),
                    "dropping response for unknown request (timed out or cancelled)"
                );
                false
            }
        }
    }

    /// Complete a pending request with a cancellation error.
    ///
    /// Returns `false` if the request was already completed.
    pub fn cancel(&self, request_id: u64, reason: &str) -> bool {
        match self.take(request_id) {
            Some(entry) => {
                tracing::debug!(request_id, reason, "pending request cancelled");
                deliver(
                    request_id,
                    entry,
                    Err(ExchangeError::Cancelled {
                        id: request_id,
                        reason: reason.to_string(),
                    }),
                );
                true
            }
            None => false,
        }
    }

    /// Record that the transport wrote the request out of its local buffer.
    pub fn mark_sent(&self, request_id: u64) {
        if let Some(entry) = self.shared.state.lock().by_id.get_mut(&request_id) {
            entry.sent_at.get_or_insert_with(Instant::now);
        }
    }

    /// Whether any request sent on `channel` is still pending.
    pub fn has_pending(&self, channel: ChannelId) -> bool {
        self.shared.state.lock().by_channel.contains_key(&channel)
    }

    /// Number of pending requests across all channels.
    pub fn pending_count(&self) -> usize {
        self.shared.state.lock().by_id.len()
    }

    /// Complete every entry whose deadline is at or before `now` with a timeout.
    ///
    /// Returns the number of entries that timed out.
    pub fn sweep(&self, now: Instant) -> usize {
        let expired: Vec<(u64, PendingEntry)> = {
            let mut state = self.shared.state.lock();
            let ids: Vec<u64> = state
                .by_id
                .iter()
                .filter(|(_, entry)| entry.deadline <= now)
                .map(|(id, _)| *id)
                .collect();
            let mut drained = false;
            let mut expired = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some((entry, channel_drained)) = state.remove(id) {
                    drained |= channel_drained;
                    expired.push((id, entry));
                }
            }
            if drained {
                self.shared.drained.notify_all();
            }
            expired
        };

        let count = expired.len();
        for (id, entry) in expired {
            let elapsed = now.saturating_duration_since(entry.created_at);
            let sent = entry.sent_at.is_some();
            tracing::debug!(request_id = id, ?elapsed, sent, "pending request timed out");
            deliver(id, entry, Err(ExchangeError::Timeout { id, elapsed, sent }));
        }
        count
    }

    /// Block until `channel` has no pending requests or `timeout` elapses.
    ///
    /// Returns `true` if the channel drained in time.
    pub fn wait_drained(&self, channel: ChannelId, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        while state.by_channel.contains_key(&channel) {
            if self
                .shared
                .drained
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return !state.by_channel.contains_key(&channel);
            }
        }
        true
    }

    /// Start an additional timeout sweeper owned by the caller.
    ///
    /// Meant for [`FutureRegistry::manual`] registries. The sweeper runs every
    /// `sweep_interval` until the returned handle is stopped or dropped, or
    /// until every clone of this registry is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the sweeper thread cannot be spawned.
    pub fn spawn_sweeper(&self) -> std::io::Result<SweeperHandle> {
        let stop = Arc::new(AtomicBool::new(false));
        let thread = self.start_sweeper(stop.clone())?;
        Ok(SweeperHandle {
            stop,
            thread: Some(thread),
        })
    }

    fn start_sweeper(&self, stop: Arc<AtomicBool>) -> std::io::Result<JoinHandle<()>> {
        let registry = Arc::downgrade(&self.shared);
        let interval = self.shared.config.sweep_interval;
        let thread = thread::Builder::new()
            .name("thor-future-sweeper".to_string())
            .spawn(move || sweep_loop(registry, stop, interval))?;
        tracing::debug!(?interval, "future sweeper started");
        Ok(thread)
    }

    fn take(&self, request_id: u64) -> Option<PendingEntry> {
        let mut state = self.shared.state.lock();
        let (entry, drained) = state.remove(request_id)?;
        if drained {
            self.shared.drained.notify_all();
        }
        Some(entry)
    }
}

impl fmt::Debug for FutureRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("FutureRegistry")
            .field("pending", &state.by_id.len())
            .field("channels", &state.by_channel.len())
            .finish()
    }
}

/// Hand the outcome to the waiting caller. Called without the registry lock.
fn deliver(request_id: u64, entry: PendingEntry, outcome: ResponseResult) {
    if entry.sender.send(outcome).is_err() {
        tracing::debug!(request_id, "caller dropped the response future");
    }
}

fn sweep_loop(registry: Weak<Shared>, stop: Arc<AtomicBool>, interval: Duration) {
    loop {
        thread::park_timeout(interval);
        if stop.load(Ordering::Acquire) {
            break;
        }
        let Some(shared) = registry.upgrade() else {
            break;
        };
        FutureRegistry { shared }.sweep(Instant::now());
    }
    tracing::debug!("future sweeper stopped");
}

/// Owner of a running sweeper thread. Stops the sweeper when dropped.
pub struct SweeperHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    /// Stop the sweeper and wait for its thread to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            thread.thread().unpark();
            if thread.join().is_err() {
                tracing::error!("future sweeper thread panicked");
            }
        }
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
