//! Bounded FIFO queue with a shutdown/resume lifecycle.
//!
//! Every stage owns exactly one `BoundedQueue` as its input. Producers push
//! from their own threads (fan-out callbacks run on the producer's thread),
//! the owning stage pops from its thread.
//!
//! Items travel over a bounded `crossbeam_channel`, so the capacity is a hard
//! limit. A second, never-written channel acts as the shutdown signal:
//! dropping its sender wakes every thread selecting on it.
//!
//! # Lifecycle
//!
//! ```text
//! Active ──shutdown()──► Draining ──(popped empty)──► ShutDown
//!    ▲                                                   │
//!    └──────────────────── resume() ─────────────────────┘
//! ```
//!
//! - Pushes are accepted only while `Active`; afterwards they are discarded
//!   with a warning and the call returns `false` without blocking.
//! - `pop` keeps returning queued items after `shutdown()` until the queue is
//!   empty, then returns `None`. A shut-down queue never blocks a popper.
//! - `shutdown()` wakes every blocked popper and pusher.
//!
//! Introspection (`len`, `is_empty`, `is_shut_down`, `state`) is lock-free
//! and may be stale as soon as it is returned.

use crate::error::{PipelineError, Result};
use crate::types::QueueState;
use crossbeam_channel::{bounded, select, Receiver, Select, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// How long a draining pop waits for a push that raced `shutdown()`.
const DRAIN_POLL: Duration = Duration::from_millis(1);

/// Disconnects when the queue shuts down; nothing is ever sent on it.
struct ShutdownSignal {
    tx: Option<Sender<()>>,
    rx: Receiver<()>,
}

impl ShutdownSignal {
    fn new() -> Self {
        let (tx, rx) = bounded(0);
        Self { tx: Some(tx), rx }
    }
}

/// Thread-safe FIFO channel with a hard capacity bound.
pub struct BoundedQueue<T> {
    name: String,
    capacity: usize,
    tx: Sender<T>,
    rx: Receiver<T>,
    signal: Mutex<ShutdownSignal>,
    shutdown: AtomicBool,
    /// Items pushed (or being pushed) and not yet taken by a popper.
    outstanding: AtomicUsize,
    /// Threads currently parked in `pop` or `push_blocking`.
    waiters: AtomicUsize,
}

impl<T> BoundedQueue<T> {
    /// Create an active queue. `capacity` is clamped to at least 1.
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = bounded(capacity);
        Self {
            name: name.into(),
            capacity,
            tx,
            rx,
            signal: Mutex::new(ShutdownSignal::new()),
            shutdown: AtomicBool::new(false),
            outstanding: AtomicUsize::new(0),
            waiters: AtomicUsize::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock_signal(&self) -> MutexGuard<'_, ShutdownSignal> {
        self.signal.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn shutdown_signal(&self) -> Receiver<()> {
        self.lock_signal().rx.clone()
    }

    fn discard(&self) -> bool {
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
        tracing::warn!("Queue '{}' is shut down, discarding pushed item", self.name);
        false
    }

    fn take(&self, item: T, on_take: impl FnOnce()) -> T {
        on_take();
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
        item
    }

    /// Append if there is room, without waiting.
    ///
    /// `Full` hands the item back so the caller can make room and retry.
    /// `Disconnected` means the queue is shut down; the item is discarded.
    pub fn try_push(&self, item: T) -> std::result::Result<(), TrySendError<T>> {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        if self.is_shut_down() {
            self.discard();
            return Err(TrySendError::Disconnected(item));
        }
        self.tx.try_send(item).map_err(|err| {
            self.outstanding.fetch_sub(1, Ordering::SeqCst);
            err
        })
    }

    /// Append without waiting for room.
    ///
    /// Returns `false` (and drops `item`) if the queue is full or no longer
    /// active. Producers that must not lose items use
    /// [`push_blocking`](Self::push_blocking) or [`try_push`](Self::try_push).
    pub fn push(&self, item: T) -> bool {
        match self.try_push(item) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(
                    "Queue '{}' is full ({} items), dropping pushed item",
                    self.name,
                    self.capacity
                );
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Append, waiting while the queue holds `capacity` items.
    ///
    /// Each wait lasts at most `max_wait`; when it elapses the call logs and
    /// retries, so an accepted item is never dropped for being slow. The item
    /// is discarded (returning `false`) only if the queue leaves `Active`.
    pub fn push_blocking(&self, item: T, max_wait: Duration) -> bool {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        let mut item = item;
        loop {
            if self.is_shut_down() {
                return self.discard();
            }
            match self.tx.try_send(item) {
                Ok(()) => return true,
                Err(TrySendError::Full(back)) => item = back,
                Err(TrySendError::Disconnected(_)) => return self.discard(),
            }

            let signal = self.shutdown_signal();
            let mut select = Select::new();
            let send = select.send(&self.tx);
            select.recv(&signal);

            self.waiters.fetch_add(1, Ordering::SeqCst);
            let selected = select.select_timeout(max_wait);
            self.waiters.fetch_sub(1, Ordering::SeqCst);

            match selected {
                Ok(op) if op.index() == send => {
                    return match op.send(&self.tx, item) {
                        Ok(()) => true,
                        Err(_) => self.discard(),
                    };
                }
                // Shutdown signal; re-checked at the top of the loop.
                Ok(op) => {
                    let _ = op.recv(&signal);
                }
                Err(_) => {
                    tracing::debug!(
                        "Queue '{}' still full after {:?} ({} items), retrying push",
                        self.name,
                        max_wait,
                        self.len()
                    );
                }
            }
        }
    }

    /// Block until an item is available.
    ///
    /// Returns `None` once the queue is shut down and empty.
    pub fn pop(&self) -> Option<T> {
        self.pop_with(|| {})
    }

    /// Like [`pop`](Self::pop), but runs `on_take` before the item stops
    /// counting as outstanding.
    ///
    /// Modules use this to raise their `working` flag before the queue can
    /// look settled, so "queue settled and module idle" can never be observed
    /// while an item is in hand.
    pub fn pop_with(&self, on_take: impl FnOnce()) -> Option<T> {
        loop {
            if self.is_shut_down() {
                return self.drain_with(on_take);
            }

            let signal = self.shutdown_signal();
            self.waiters.fetch_add(1, Ordering::SeqCst);
            let received = select! {
                recv(self.rx) -> item => item.ok(),
                recv(signal) -> _ => None,
            };
            self.waiters.fetch_sub(1, Ordering::SeqCst);

            if let Some(item) = received {
                return Some(self.take(item, on_take));
            }
        }
    }

    /// Pop after shutdown. Waits only for pushes that were already past
    /// their shutdown check, which are counted in `outstanding`.
    fn drain_with(&self, on_take: impl FnOnce()) -> Option<T> {
        loop {
            if let Ok(item) = self.rx.try_recv() {
                return Some(self.take(item, on_take));
            }
            if self.outstanding.load(Ordering::SeqCst) == 0 {
                return None;
            }
            if let Ok(item) = self.rx.recv_timeout(DRAIN_POLL) {
                return Some(self.take(item, on_take));
            }
        }
    }

    /// Non-blocking pop; `None` when empty regardless of state.
    pub fn try_pop(&self) -> Option<T> {
        self.try_pop_with(|| {})
    }

    /// Non-blocking counterpart of [`pop_with`](Self::pop_with).
    pub fn try_pop_with(&self, on_take: impl FnOnce()) -> Option<T> {
        let item = self.rx.try_recv().ok()?;
        Some(self.take(item, on_take))
    }

    /// Stop accepting pushes and wake every waiter. Idempotent.
    pub fn shutdown(&self) {
        if !self.shutdown.swap(true, Ordering::SeqCst) {
            tracing::debug!(
                "Shutting down queue '{}' ({} items left to drain)",
                self.name,
                self.len()
            );
        }
        self.lock_signal().tx.take();
    }

    /// Reactivate a shut-down queue. Items still queued are kept.
    ///
    /// Fails if any thread is still parked on the queue.
    pub fn resume(&self) -> Result<()> {
        let waiters = self.waiters();
        if waiters > 0 {
            return Err(PipelineError::QueueBusy {
                name: self.name.clone(),
                waiters,
            });
        }
        let mut signal = self.lock_signal();
        if signal.tx.is_none() {
            tracing::debug!("Resuming queue '{}'", self.name);
            *signal = ShutdownSignal::new();
        }
        self.shutdown.store(false, Ordering::SeqCst);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Whether shutdown has been requested (`Draining` or `ShutDown`).
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Shut down, or nothing queued and no push in progress.
    pub fn is_settled(&self) -> bool {
        self.is_shut_down() || self.outstanding.load(Ordering::SeqCst) == 0
    }

    pub fn state(&self) -> QueueState {
        match (self.is_shut_down(), self.is_empty()) {
            (false, _) => QueueState::Active,
            (true, false) => QueueState::Draining,
            (true, true) => QueueState::ShutDown,
        }
    }

    /// Number of threads currently parked on the queue.
    pub fn waiters(&self) -> usize {
        self.waiters.load(Ordering::SeqCst)
    }
}

impl<T> std::fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedQueue")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("state", &self.state())
            .field("len", &self.len())
            .finish()
    }
}
