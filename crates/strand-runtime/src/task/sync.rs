// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Language-level mutex and condition variable.
//!
//! Strand exposes explicit `lock`/`unlock` and `wait`/`signal` calls, so
//! the wrappers here carry their own locked flag and wake generation
//! instead of relying on scoped guards.

use std::sync::{Arc, Condvar, Mutex, PoisonError};

use crate::except::{RtError, throw};
use crate::value::{CPointer, Payload, Value};

/// Explicitly locked/unlocked mutex.
pub struct RtMutex {
    locked: Mutex<bool>,
    cv: Condvar,
}

impl RtMutex {
    /// A new unlocked mutex.
    #[must_use]
    pub fn new() -> Self {
        Self {
            locked: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    /// Block until the mutex is acquired.
    pub fn lock(&self) {
        let mut locked = self.locked.lock().unwrap_or_else(PoisonError::into_inner);
        while *locked {
            locked = self.cv.wait(locked).unwrap_or_else(PoisonError::into_inner);
        }
        *locked = true;
    }

    /// Acquire without blocking; false when already held.
    pub fn try_lock(&self) -> bool {
        let mut locked = self.locked.lock().unwrap_or_else(PoisonError::into_inner);
        if *locked {
            false
        } else {
            *locked = true;
            true
        }
    }

    /// Release the mutex.
    pub fn unlock(&self) {
        let mut locked = self.locked.lock().unwrap_or_else(PoisonError::into_inner);
        *locked = false;
        drop(locked);
        self.cv.notify_one();
    }
}

impl Default for RtMutex {
    fn default() -> Self {
        Self::new()
    }
}

/// Condition variable paired with an [`RtMutex`] at wait time.
pub struct RtCond {
    generation: Mutex<u64>,
    cv: Condvar,
}

impl RtCond {
    /// A new condition variable.
    #[must_use]
    pub fn new() -> Self {
        Self {
            generation: Mutex::new(0),
            cv: Condvar::new(),
        }
    }

    /// Atomically release `mutex`, wait for a wake, and reacquire it.
    pub fn wait(&self, mutex: &RtMutex) {
        let start = {
            let generation = self
                .generation
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            *generation
        };
        mutex.unlock();
        let mut generation = self
            .generation
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while *generation == start {
            generation = self
                .cv
                .wait(generation)
                .unwrap_or_else(PoisonError::into_inner);
        }
        drop(generation);
        mutex.lock();
    }

    /// Wake at least one waiter.
    pub fn signal(&self) {
        let mut generation = self
            .generation
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *generation += 1;
        drop(generation);
        self.cv.notify_one();
    }

    /// Wake every waiter.
    pub fn broadcast(&self) {
        let mut generation = self
            .generation
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *generation += 1;
        drop(generation);
        self.cv.notify_all();
    }
}

impl Default for RtCond {
    fn default() -> Self {
        Self::new()
    }
}

fn mutex_of(v: Value) -> Result<Arc<RtMutex>, RtError> {
    match v.payload() {
        Payload::CPointer(CPointer::Mutex(m)) => Ok(Arc::clone(m)),
        _ => Err(throw(format!("Not a mutex value: {}", v.type_name()))),
    }
}

fn cond_of(v: Value) -> Result<Arc<RtCond>, RtError> {
    match v.payload() {
        Payload::CPointer(CPointer::Cond(c)) => Ok(Arc::clone(c)),
        _ => Err(throw(format!(
            "Not a condition-variable value: {}",
            v.type_name()
        ))),
    }
}

/// A new mutex value.
#[must_use]
pub fn mutex_new() -> Value {
    Value::mutex()
}

/// A new condition-variable value.
#[must_use]
pub fn cond_new() -> Value {
    Value::cond()
}

/// Block until the mutex value is acquired.
pub fn mutex_lock(v: Value) -> Result<(), RtError> {
    mutex_of(v)?.lock();
    Ok(())
}

/// Acquire without blocking; false when already held.
pub fn mutex_try_lock(v: Value) -> Result<bool, RtError> {
    Ok(mutex_of(v)?.try_lock())
}

/// Release the mutex value.
pub fn mutex_unlock(v: Value) -> Result<(), RtError> {
    mutex_of(v)?.unlock();
    Ok(())
}

/// Release `mutex`, wait on `cond`, reacquire `mutex`.
pub fn cond_wait(cond: Value, mutex: Value) -> Result<(), RtError> {
    let cond = cond_of(cond)?;
    let mutex = mutex_of(mutex)?;
    cond.wait(&mutex);
    Ok(())
}

/// Wake at least one waiter of a condition-variable value.
pub fn cond_signal(v: Value) -> Result<(), RtError> {
    cond_of(v)?.signal();
    Ok(())
}

/// Wake every waiter of a condition-variable value.
pub fn cond_broadcast(v: Value) -> Result<(), RtError> {
    cond_of(v)?.broadcast();
    Ok(())
}
