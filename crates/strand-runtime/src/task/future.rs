// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Future state machine.
//!
//! `PENDING -> RUNNING -> (COMPLETED | CANCELLED | TIMEOUT)`; terminal
//! states are absorbing. The worker publishes exactly once; an awaiter that
//! hits its deadline transitions the future to TIMEOUT itself, and a late
//! publish against a terminal state is discarded.
//!
//! Cancellation is cooperative: a pending task is skipped, a running
//! closure finishes undisturbed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use crate::except::{RtError, throw};
use crate::value::{Payload, Value, closure_call};

/// Lifecycle state of a future.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FutureState {
    /// Queued, not yet picked up by a worker.
    Pending,
    /// A worker is executing the closure.
    Running,
    /// Result or error published.
    Completed,
    /// Skipped before running, or publish discarded after cancellation.
    Cancelled,
    /// An awaiter's deadline expired.
    TimedOut,
}

impl FutureState {
    /// Whether this state is absorbing.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::TimedOut)
    }
}

/// Completion signal shared by `race` awaiters.
pub struct DoneSignal {
    flag: Mutex<bool>,
    cv: Condvar,
}

impl DoneSignal {
    /// A new unsignaled flag.
    #[must_use]
    pub fn new() -> Self {
        Self {
            flag: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    /// Raise the flag and wake waiters.
    pub fn notify(&self) {
        let mut flag = self.flag.lock().unwrap_or_else(PoisonError::into_inner);
        *flag = true;
        drop(flag);
        self.cv.notify_all();
    }

    /// Block until the flag is raised, then lower it for the next round.
    pub fn wait(&self) {
        let mut flag = self.flag.lock().unwrap_or_else(PoisonError::into_inner);
        while !*flag {
            flag = self.cv.wait(flag).unwrap_or_else(PoisonError::into_inner);
        }
        *flag = false;
    }
}

impl Default for DoneSignal {
    fn default() -> Self {
        Self::new()
    }
}

struct FutureInner {
    state: FutureState,
    result: Option<Value>,
    error: Option<RtError>,
    /// The task closure, owned until the worker takes it.
    closure: Option<Value>,
    watchers: Vec<Arc<DoneSignal>>,
}

/// The eventual result of a pool task.
pub struct RtFuture {
    inner: Mutex<FutureInner>,
    done: Condvar,
    cancel_requested: AtomicBool,
}

impl RtFuture {
    /// A pending future owning its closure (one reference donated).
    #[must_use]
    pub fn new(closure: Value) -> Self {
        Self {
            inner: Mutex::new(FutureInner {
                state: FutureState::Pending,
                result: None,
                error: None,
                closure: Some(closure),
                watchers: Vec::new(),
            }),
            done: Condvar::new(),
            cancel_requested: AtomicBool::new(false),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> FutureState {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .state
    }

    /// Whether the future reached a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    /// Whether the future was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state() == FutureState::Cancelled
    }

    /// Ask the future to cancel. Only a task that has not started is
    /// prevented from running.
    pub fn request_cancel(&self) {
        self.cancel_requested.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::SeqCst)
    }

    /// Register a completion watcher; an already-terminal future notifies
    /// immediately.
    pub fn attach_watcher(&self, watcher: Arc<DoneSignal>) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.state.is_terminal() {
            drop(inner);
            watcher.notify();
        } else {
            inner.watchers.push(watcher);
        }
    }

    /// Block until the future reaches a terminal state.
    pub fn wait_terminal(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        while !inner.state.is_terminal() {
            inner = self
                .done
                .wait(inner)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Worker entry point: run the closure and publish once.
    pub(crate) fn run(&self) {
        let closure = {
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            if inner.state.is_terminal() {
                // An awaiter already timed this future out; terminal states
                // are absorbing.
                let closure = inner.closure.take();
                drop(inner);
                if let Some(closure) = closure {
                    closure.decref();
                }
                return;
            }
            if self.cancel_requested() {
                let closure = inner.closure.take();
                let watchers = Self::finish(&mut inner, FutureState::Cancelled);
                drop(inner);
                self.done.notify_all();
                for w in watchers {
                    w.notify();
                }
                if let Some(closure) = closure {
                    closure.decref();
                }
                return;
            }
            inner.state = FutureState::Running;
            inner.closure.take()
        };

        let outcome = match closure {
            Some(closure) => {
                let args = Value::array();
                let outcome = closure_call(closure, args);
                args.decref();
                closure.decref();
                outcome
            }
            None => Err(throw("future has no task")),
        };

        let (watchers, discarded) = {
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            if inner.state.is_terminal() {
                // An awaiter already timed this future out; the publish is
                // dropped on the floor.
                (Vec::new(), Some(outcome))
            } else if self.cancel_requested() {
                let watchers = Self::finish(&mut inner, FutureState::Cancelled);
                (watchers, Some(outcome))
            } else {
                match outcome {
                    Ok(v) => inner.result = Some(v),
                    Err(e) => inner.error = Some(e),
                }
                let watchers = Self::finish(&mut inner, FutureState::Completed);
                (watchers, None)
            }
        };

        self.done.notify_all();
        for w in watchers {
            w.notify();
        }
        if let Some(outcome) = discarded {
            match outcome {
                Ok(v) => v.decref(),
                Err(e) => e.release(),
            }
        }
    }

    fn finish(inner: &mut FutureInner, state: FutureState) -> Vec<Arc<DoneSignal>> {
        inner.state = state;
        std::mem::take(&mut inner.watchers)
    }

    /// Block until terminal, then return the published result (owned) or
    /// re-raise the captured error.
    pub fn await_result(&self) -> Result<Value, RtError> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        while !inner.state.is_terminal() {
            inner = self
                .done
                .wait(inner)
                .unwrap_or_else(PoisonError::into_inner);
        }
        Self::terminal_outcome(&inner)
    }

    /// Like [`await_result`](Self::await_result) with a deadline; expiry
    /// transitions the future to TIMEOUT and raises.
    pub fn await_timeout(&self, timeout: Duration) -> Result<Value, RtError> {
        let deadline = std::time::Instant::now() + timeout;
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        while !inner.state.is_terminal() {
            let now = std::time::Instant::now();
            if now >= deadline {
                let watchers = Self::finish(&mut inner, FutureState::TimedOut);
                drop(inner);
                self.done.notify_all();
                for w in watchers {
                    w.notify();
                }
                return Err(throw("Future timed out"));
            }
            let (guard, _timeout_result) = self
                .done
                .wait_timeout(inner, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            inner = guard;
        }
        Self::terminal_outcome(&inner)
    }

    fn terminal_outcome(inner: &FutureInner) -> Result<Value, RtError> {
        match inner.state {
            FutureState::Completed => match &inner.error {
                Some(error) => Err(error.duplicate()),
                None => Ok(inner
                    .result
                    .map_or_else(Value::undef, |v| v.incref())),
            },
            FutureState::Cancelled => Err(throw("Future was cancelled")),
            FutureState::TimedOut => Err(throw("Future timed out")),
            FutureState::Pending | FutureState::Running => {
                unreachable!("awaited future left non-terminal")
            }
        }
    }
}

impl Drop for RtFuture {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(result) = inner.result.take() {
            result.decref();
        }
        if let Some(error) = inner.error.take() {
            error.release();
        }
        if let Some(closure) = inner.closure.take() {
            closure.decref();
        }
    }
}

/// Extract the shared future from a FUTURE value.
pub(crate) fn future_of(v: Value) -> Result<Arc<RtFuture>, RtError> {
    match v.payload() {
        Payload::Future(f) => Ok(f.clone()),
        _ => Err(throw(format!("Not a FUTURE value: {}", v.type_name()))),
    }
}
