//! BoundedQueue - fixed-capacity FIFO between producer and worker
//!
//! A `Mutex<VecDeque>` plus three `Notify` wake-ups:
//! - `not_empty`: an item was pushed or the queue was closed
//! - `not_full`: a slot was freed or the queue was closed
//! - `idle`: the last in-flight item finished with nothing left queued
//!
//! Every waiter registers (`Notified::enable`) before inspecting the state,
//! so a wake-up between the check and the `.await` is never lost.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tokio::sync::Notify;

/// Error returned by [`BoundedQueue::push`] / [`BoundedQueue::try_push`].
///
/// Hands the rejected item back to the caller.
#[derive(PartialEq, Eq)]
pub enum PushError<T> {
    /// No free slot (only from `try_push`)
    Full(T),
    /// Queue closed, no further items accepted
    Closed(T),
}

impl<T> PushError<T> {
    pub fn into_inner(self) -> T {
        match self {
            Self::Full(item) | Self::Closed(item) => item,
        }
    }
}

impl<T> fmt::Debug for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full(_) => f.write_str("Full(..)"),
            Self::Closed(_) => f.write_str("Closed(..)"),
        }
    }
}

impl<T> fmt::Display for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full(_) => f.write_str("queue is full"),
            Self::Closed(_) => f.write_str("queue is closed"),
        }
    }
}

impl<T> std::error::Error for PushError<T> {}

/// Error returned by [`BoundedQueue::drain_wait`]
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DrainError {
    /// The consumer detached before the queue was empty
    #[error("consumer detached with {pending} item(s) pending")]
    Abandoned { pending: usize },
}

struct State<T> {
    items: VecDeque<T>,
    in_flight: usize,
    closed: bool,
    detached: bool,
}

/// Fixed-capacity, thread-safe FIFO queue with async blocking operations.
pub struct BoundedQueue<T> {
    state: Mutex<State<T>>,
    capacity: usize,
    not_empty: Notify,
    not_full: Notify,
    idle: Notify,
}

impl<T> BoundedQueue<T> {
    /// Create a queue holding at most `capacity` items.
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "bounded queue requires capacity > 0");
        Self {
            state: Mutex::new(State {
                items: VecDeque::new(),
                in_flight: 0,
                closed: false,
                detached: false,
            }),
            capacity,
            not_empty: Notify::new(),
            not_full: Notify::new(),
            idle: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        // State stays consistent even if a holder panicked; every mutation is a single step.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of queued items (in-flight item excluded)
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Nothing queued and nothing being processed
    pub fn is_idle(&self) -> bool {
        let state = self.lock();
        state.items.is_empty() && state.in_flight == 0
    }

    /// Append an item, waiting for a free slot while the queue is full.
    ///
    /// Returns `Closed` if the queue is (or becomes) closed before a slot frees up.
    pub async fn push(&self, item: T) -> Result<(), PushError<T>> {
        loop {
            let notified = self.not_full.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if state.closed {
                    return Err(PushError::Closed(item));
                }
                if state.items.len() < self.capacity {
                    state.items.push_back(item);
                    drop(state);
                    self.not_empty.notify_one();
                    return Ok(());
                }
            }

            notified.await;
        }
    }

    /// Append an item without waiting.
    pub fn try_push(&self, item: T) -> Result<(), PushError<T>> {
        let mut state = self.lock();
        if state.closed {
            return Err(PushError::Closed(item));
        }
        if state.items.len() >= self.capacity {
            return Err(PushError::Full(item));
        }
        state.items.push_back(item);
        drop(state);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Take the oldest item, waiting while the queue is empty.
    ///
    /// The item counts as in flight until [`task_done`](Self::task_done).
    /// Returns `None` once the queue is closed and empty.
    pub async fn pop(&self) -> Option<T> {
        loop {
            let notified = self.not_empty.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if let Some(item) = state.items.pop_front() {
                    state.in_flight += 1;
                    drop(state);
                    self.not_full.notify_one();
                    return Some(item);
                }
                if state.closed {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Mark the last popped item as finished.
    pub fn task_done(&self) {
        let mut state = self.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        let idle = state.items.is_empty() && state.in_flight == 0;
        drop(state);
        if idle {
            self.idle.notify_waiters();
        }
    }

    /// Wait until every queued item has been popped and marked done.
    pub async fn drain_wait(&self) -> Result<(), DrainError> {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let state = self.lock();
                if state.items.is_empty() && state.in_flight == 0 {
                    return Ok(());
                }
                if state.detached {
                    return Err(DrainError::Abandoned {
                        pending: state.items.len(),
                    });
                }
            }

            notified.await;
        }
    }

    /// Refuse further pushes. Items already queued can still be popped.
    ///
    /// Wakes producers blocked in `push` (they get `Closed`) and an idle consumer.
    pub fn close(&self) {
        let mut state = self.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        drop(state);
        self.not_full.notify_waiters();
        self.not_empty.notify_waiters();
    }

    /// The consumer is gone for good: close the queue and release everyone waiting on it.
    pub fn detach_consumer(&self) {
        let mut state = self.lock();
        state.closed = true;
        state.detached = true;
        state.in_flight = 0;
        drop(state);
        self.not_full.notify_waiters();
        self.not_empty.notify_waiters();
        self.idle.notify_waiters();
    }
}

impl<T> fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("BoundedQueue")
            .field("capacity", &self.capacity)
            .field("len", &state.items.len())
            .field("in_flight", &state.in_flight)
            .field("closed", &state.closed)
            .finish()
    }
}
