//! Session registry and per-session outbound queues.
//!
//! A session is owned by its event stream through a [`SessionGuard`]. The
//! registry only keeps a `Weak` handle so the router can address a live
//! stream by id; once the guard drops, the session is gone.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::Notify;
use toolbridge_core::ids::SessionId;

use crate::error::RegistryError;
use crate::rpc::RpcResponse;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageKind {
    Handshake,
    RpcResult,
    Keepalive,
}

/// One frame on an event stream.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub kind: MessageKind,
    pub payload: Value,
}

impl Message {
    pub fn handshake(payload: Value) -> Self {
        Self {
            kind: MessageKind::Handshake,
            payload,
        }
    }

    pub fn rpc_result(response: &RpcResponse) -> Self {
        Self {
            kind: MessageKind::RpcResult,
            payload: response.to_value(),
        }
    }

    pub fn keepalive() -> Self {
        Self {
            kind: MessageKind::Keepalive,
            payload: serde_json::json!({"keepalive": true}),
        }
    }

    pub fn to_json(&self) -> String {
        self.payload.to_string()
    }
}

#[derive(Debug, thiserror::Error)]
#[error("session queue closed")]
pub struct QueueClosed;

struct Slot {
    seq: u64,
    message: Option<Message>,
}

#[derive(Default)]
struct QueueState {
    slots: VecDeque<Slot>,
    next_seq: u64,
    closed: bool,
    dropped: u64,
}

/// Bounded FIFO of outbound messages.
///
/// Producers reserve a slot when a call is accepted and fill it when the
/// result is ready; only a filled slot at the front can be popped, so
/// delivery order is reservation order. Past `capacity` the oldest slot is
/// evicted.
pub struct SessionQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    capacity: usize,
}

impl SessionQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            capacity: capacity.max(1),
        }
    }

    /// Reserve the next delivery slot and return its sequence number.
    pub fn reserve(&self) -> Result<u64, QueueClosed> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(QueueClosed);
        }
        let mut evicted = false;
        while state.slots.len() >= self.capacity {
            if let Some(old) = state.slots.pop_front() {
                state.dropped += 1;
                evicted = true;
                tracing::warn!(
                    seq = old.seq,
                    ready = old.message.is_some(),
                    dropped = state.dropped,
                    "session queue full, dropping oldest message"
                );
            }
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        state.slots.push_back(Slot { seq, message: None });
        drop(state);
        if evicted {
            self.notify.notify_one();
        }
        Ok(seq)
    }

    /// Fill a reserved slot. Returns false if it was evicted or the queue closed.
    pub fn fill(&self, seq: u64, message: Message) -> bool {
        let mut state = self.state.lock();
        let Ok(index) = state.slots.binary_search_by_key(&seq, |s| s.seq) else {
            return false;
        };
        state.slots[index].message = Some(message);
        drop(state);
        // Later slots wait behind the front one
        if index == 0 {
            self.notify.notify_one();
        }
        true
    }

    /// Reserve and fill in one step.
    pub fn push(&self, message: Message) -> Result<(), QueueClosed> {
        let seq = self.reserve()?;
        if self.fill(seq, message) {
            Ok(())
        } else {
            Err(QueueClosed)
        }
    }

    /// Pop the front message if it is ready.
    pub fn pop_ready(&self) -> Option<Message> {
        let mut state = self.state.lock();
        if state.slots.front().is_some_and(|s| s.message.is_some()) {
            state.slots.pop_front().and_then(|s| s.message)
        } else {
            None
        }
    }

    /// Resolves after the next `fill` of the front slot, eviction or close.
    /// A wakeup that happened before the call is not lost.
    pub async fn changed(&self) {
        self.notify.notified().await;
    }

    /// Close the queue and discard anything pending.
    pub fn close(&self) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        state.slots.clear();
        drop(state);
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Pending slots, filled or not.
    pub fn len(&self) -> usize {
        self.state.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Messages evicted because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.state.lock().dropped
    }
}

/// A live binding between an event stream and its id.
pub struct Session {
    id: SessionId,
    queue: SessionQueue,
    created_at: DateTime<Utc>,
    last_activity_ms: AtomicI64,
}

impl Session {
    fn new(id: SessionId, capacity: usize) -> Self {
        let now = Utc::now();
        Self {
            id,
            queue: SessionQueue::new(capacity),
            created_at: now,
            last_activity_ms: AtomicI64::new(now.timestamp_millis()),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn queue(&self) -> &SessionQueue {
        &self.queue
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        let ms = self.last_activity_ms.load(Ordering::Relaxed);
        Utc.timestamp_millis_opt(ms).single().unwrap_or(self.created_at)
    }

    /// Record real traffic. Keepalives don't count.
    pub fn touch(&self) {
        self.last_activity_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn is_idle(&self, max_idle: Duration) -> bool {
        let max_idle = chrono::Duration::from_std(max_idle).unwrap_or(chrono::Duration::MAX);
        Utc::now() - self.last_activity() > max_idle
    }

    /// Reserve a delivery slot for the call with `id`.
    pub fn reserve(self: &Arc<Self>, id: Option<Value>) -> Result<Reservation, QueueClosed> {
        let seq = self.queue.reserve()?;
        Ok(Reservation {
            session: Arc::clone(self),
            seq,
            id,
            completed: false,
        })
    }
}

/// A reserved queue slot that must be completed with exactly one response.
///
/// Dropping it uncompleted (e.g. the executing task panicked) fills the
/// slot with an internal error so the queue never stalls.
pub struct Reservation {
    session: Arc<Session>,
    seq: u64,
    id: Option<Value>,
    completed: bool,
}

impl Reservation {
    pub fn id(&self) -> Option<&Value> {
        self.id.as_ref()
    }

    pub fn complete(mut self, response: RpcResponse) {
        self.deliver(&response);
    }

    fn deliver(&mut self, response: &RpcResponse) {
        self.completed = true;
        if !self.session.queue.fill(self.seq, Message::rpc_result(response)) {
            tracing::debug!(
                session_id = %self.session.id,
                seq = self.seq,
                "result discarded, slot no longer pending"
            );
        }
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.completed {
            tracing::warn!(session_id = %self.session.id, seq = self.seq, "reservation abandoned");
            let response = RpcResponse::internal_error(self.id.take(), "tool execution aborted");
            self.deliver(&response);
        }
    }
}

/// Process-wide lookup of open sessions.
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Weak<Session>>,
    open: AtomicUsize,
    max_sessions: usize,
    max_queue: usize,
}

impl SessionRegistry {
    pub fn new(max_sessions: usize, max_queue: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            open: AtomicUsize::new(0),
            max_sessions,
            max_queue,
        }
    }

    /// Allocate a session with a fresh id and an empty queue.
    pub fn create(self: &Arc<Self>) -> Result<SessionGuard, RegistryError> {
        let limit = self.max_sessions;
        self.open
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < limit).then_some(n + 1))
            .map_err(|_| RegistryError::Exhausted { limit })?;

        let session = loop {
            match self.sessions.entry(SessionId::generate()) {
                Entry::Vacant(slot) => {
                    let session = Arc::new(Session::new(slot.key().clone(), self.max_queue));
                    slot.insert(Arc::downgrade(&session));
                    break session;
                }
                Entry::Occupied(_) => continue,
            }
        };

        tracing::info!(session_id = %session.id, open = self.count(), "session created");
        Ok(SessionGuard {
            session,
            registry: Arc::clone(self),
        })
    }

    /// Find a live session by id.
    pub fn lookup(&self, id: &str) -> Result<Arc<Session>, RegistryError> {
        self.sessions
            .get(id)
            .and_then(|entry| entry.value().upgrade())
            .filter(|s| !s.queue.is_closed())
            .ok_or_else(|| RegistryError::SessionNotFound(id.to_string()))
    }

    /// Remove a session and close its queue. Safe to call repeatedly.
    pub fn destroy(&self, id: &SessionId) -> bool {
        let Some((_, weak)) = self.sessions.remove(id) else {
            return false;
        };
        self.open.fetch_sub(1, Ordering::SeqCst);
        if let Some(session) = weak.upgrade() {
            session.queue.close();
        }
        true
    }

    /// Number of open sessions.
    pub fn count(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    /// Close every queue so all streams end. Used at shutdown.
    pub fn close_all(&self) -> usize {
        let live: Vec<Arc<Session>> = self
            .sessions
            .iter()
            .filter_map(|entry| entry.value().upgrade())
            .collect();
        for session in &live {
            session.queue.close();
        }
        live.len()
    }

    /// Close sessions with no real traffic for `max_idle`.
    pub fn reap_idle(&self, max_idle: Duration) -> usize {
        let idle: Vec<Arc<Session>> = self
            .sessions
            .iter()
            .filter_map(|entry| entry.value().upgrade())
            .filter(|s| !s.queue.is_closed() && s.is_idle(max_idle))
            .collect();

        for session in &idle {
            tracing::info!(session_id = %session.id, "closing idle session");
            session.queue.close();
        }
        idle.len()
    }
}

/// Owning handle held by the event stream. Dropping it destroys the session.
pub struct SessionGuard {
    session: Arc<Session>,
    registry: Arc<SessionRegistry>,
}

impl SessionGuard {
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn id(&self) -> &SessionId {
        &self.session.id
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        // Destroying clears the queue, so count leftovers first
        let undelivered = self.session.queue.len();
        if self.registry.destroy(&self.session.id) {
            let lived = Utc::now() - self.session.created_at;
            tracing::info!(
                session_id = %self.session.id,
                lived_ms = lived.num_milliseconds(),
                dropped = self.session.queue.dropped(),
                undelivered,
                open = self.registry.count(),
                "session closed"
            );
        }
    }
}

/// Start a background task that periodically closes idle sessions.
pub fn start_reaper_task(
    registry: Arc<SessionRegistry>,
    max_idle: Duration,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let reaped = registry.reap_idle(max_idle);
            if reaped > 0 {
                tracing::info!(reaped, "idle session cleanup");
            }
        }
    })
}
