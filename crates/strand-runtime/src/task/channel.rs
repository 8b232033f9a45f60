// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Channels.
//!
//! FIFO queue with an optional capacity bound, a closed flag, and two
//! condition variables. Sending on a closed channel raises; receiving from
//! a closed channel drains the remaining items, then returns undef as
//! end-of-stream. Closing wakes every waiter so each recheck its
//! predicate.
//!
//! Refcounts: `send` adds one reference that travels with the item;
//! `recv` hands that reference to the receiver.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, PoisonError};

use crate::except::{RtError, throw};
use crate::value::{Payload, Value};

struct ChanInner {
    queue: VecDeque<Value>,
    closed: bool,
}

/// A channel shared between threads through its own mutex.
pub struct RtChannel {
    inner: Mutex<ChanInner>,
    not_empty: Condvar,
    not_full: Condvar,
    /// 0 means unbounded.
    capacity: usize,
}

impl RtChannel {
    /// A new open channel; `capacity` 0 is unbounded.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(ChanInner {
                queue: VecDeque::new(),
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        }
    }

    /// Queue `v`, blocking while a bounded channel is full. The item gains
    /// a reference that travels to the receiver.
    pub fn send(&self, v: Value) -> Result<(), RtError> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.closed {
            return Err(throw("send on closed channel"));
        }
        if self.capacity > 0 {
            while inner.queue.len() >= self.capacity && !inner.closed {
                inner = self
                    .not_full
                    .wait(inner)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            if inner.closed {
                return Err(throw("send on closed channel"));
            }
        }
        inner.queue.push_back(v.incref());
        drop(inner);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Dequeue the next item, blocking while the channel is open and empty.
    /// Undef means end-of-stream (closed and drained).
    pub fn recv(&self) -> Value {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        while inner.queue.is_empty() && !inner.closed {
            inner = self
                .not_empty
                .wait(inner)
                .unwrap_or_else(PoisonError::into_inner);
        }
        match inner.queue.pop_front() {
            Some(v) => {
                drop(inner);
                self.not_full.notify_one();
                v
            }
            None => Value::undef(),
        }
    }

    /// Non-blocking send: `Ok(false)` when the channel is full.
    pub fn try_send(&self, v: Value) -> Result<bool, RtError> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.closed {
            return Err(throw("send on closed channel"));
        }
        if self.capacity > 0 && inner.queue.len() >= self.capacity {
            return Ok(false);
        }
        inner.queue.push_back(v.incref());
        drop(inner);
        self.not_empty.notify_one();
        Ok(true)
    }

    /// Non-blocking receive: `None` when nothing is queued (including the
    /// closed-and-drained case).
    pub fn try_recv(&self) -> Option<Value> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let v = inner.queue.pop_front();
        drop(inner);
        if v.is_some() {
            self.not_full.notify_one();
        }
        v
    }

    /// Close the channel and wake every waiter.
    pub fn close(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.closed = true;
        drop(inner);
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    /// Whether the channel is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .closed
    }

    /// Number of queued items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .queue
            .len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for RtChannel {
    fn drop(&mut self) {
        // Last reference: release everything still queued.
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        for v in inner.queue.drain(..) {
            v.decref();
        }
    }
}

/// Extract the shared channel from a CHANNEL value. The clone keeps the
/// channel alive across blocking calls even if the value is freed
/// meanwhile.
pub(crate) fn channel_of(v: Value) -> Result<std::sync::Arc<RtChannel>, RtError> {
    match v.payload() {
        Payload::Channel(ch) => Ok(ch.clone()),
        _ => Err(throw(format!("Not a CHANNEL value: {}", v.type_name()))),
    }
}
