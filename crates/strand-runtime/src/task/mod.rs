// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Worker pool and the value-level concurrency API.
//!
//! A fixed set of OS worker threads pulls tasks from a FIFO queue guarded
//! by one mutex. Submitting the first future starts the pool implicitly;
//! starting the pool flips the process into atomic-refcount mode for good.
//!
//! `race` waits on a completion signal registered with every contender
//! rather than polling, then cancels the losers.


pub mod atomic;
pub mod channel;
pub mod future;
pub mod sync;

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use once_cell::sync::Lazy;

use crate::except::RtError;
use crate::heap;
use crate::seq::{SeqHandle, Sequence};
use crate::value::Value;

use channel::{RtChannel, channel_of};
use future::{DoneSignal, RtFuture, future_of};

/// Worker count when nothing overrides it.
pub const DEFAULT_WORKERS: usize = 4;

/// Runtime tunables with their ambient defaults. Only the pool size is
/// adjustable at startup; the rest report the compiled-in values.
pub struct RuntimeConfig {
    /// Worker threads for the task pool.
    pub pool_workers: usize,
    /// Value cells kept per thread-local freelist.
    pub cell_freelist_cap: usize,
    /// Metadata records kept per thread-local pool.
    pub meta_freelist_cap: usize,
    /// Immortal small-integer range, inclusive.
    pub small_int_range: (i64, i64),
    /// Slots per thread-local dispatch cache.
    pub dispatch_cache_slots: usize,
}

impl RuntimeConfig {
    /// Defaults with environment overrides applied
    /// (`STRAND_POOL_THREADS`).
    #[must_use]
    pub fn from_env() -> Self {
        let pool_workers = std::env::var("STRAND_POOL_THREADS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|&n| n > 0)
            .unwrap_or(DEFAULT_WORKERS);
        Self {
            pool_workers,
            ..Self::default()
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            pool_workers: DEFAULT_WORKERS,
            cell_freelist_cap: heap::CELL_FREELIST_CAP,
            meta_freelist_cap: heap::META_FREELIST_CAP,
            small_int_range: (heap::SMALL_INT_MIN, heap::SMALL_INT_MAX),
            dispatch_cache_slots: crate::oop::CACHE_SLOTS,
        }
    }
}

struct PoolInner {
    queue: VecDeque<Arc<RtFuture>>,
    running: bool,
}

struct ThreadPool {
    inner: Mutex<PoolInner>,
    available: Condvar,
}

impl ThreadPool {
    fn new() -> Self {
        Self {
            inner: Mutex::new(PoolInner {
                queue: VecDeque::new(),
                running: true,
            }),
            available: Condvar::new(),
        }
    }
}

struct PoolState {
    pool: Option<Arc<ThreadPool>>,
    workers: Vec<JoinHandle<()>>,
}

static POOL: Lazy<Mutex<PoolState>> = Lazy::new(|| {
    Mutex::new(PoolState {
        pool: None,
        workers: Vec::new(),
    })
});

fn worker_loop(pool: &ThreadPool) {
    loop {
        let task = {
            let mut inner = pool.inner.lock().unwrap_or_else(PoisonError::into_inner);
            loop {
                if let Some(task) = inner.queue.pop_front() {
                    break Some(task);
                }
                if !inner.running {
                    break None;
                }
                inner = pool
                    .available
                    .wait(inner)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        };
        match task {
            Some(task) => task.run(),
            None => return,
        }
    }
}

/// Start the worker pool with `n` threads. Idempotent; the first call also
/// switches every refcount to atomic mode, permanently.
pub fn pool_init(n: usize) {
    let mut state = POOL.lock().unwrap_or_else(PoisonError::into_inner);
    if state.pool.is_some() {
        return;
    }
    heap::activate_threading();
    let pool = Arc::new(ThreadPool::new());
    for i in 0..n.max(1) {
        let pool = Arc::clone(&pool);
        let worker = std::thread::Builder::new()
            .name(format!("strand-worker-{i}"))
            .spawn(move || worker_loop(&pool))
            .expect("failed to spawn pool worker");
        state.workers.push(worker);
    }
    state.pool = Some(pool);
}

/// Start the pool with the configured worker count.
pub fn pool_init_default() {
    pool_init(RuntimeConfig::from_env().pool_workers);
}

/// Stop the pool: pending tasks are cancelled, workers drain and join.
pub fn pool_shutdown() {
    let (pool, workers) = {
        let mut state = POOL.lock().unwrap_or_else(PoisonError::into_inner);
        (state.pool.take(), std::mem::take(&mut state.workers))
    };
    let Some(pool) = pool else {
        return;
    };

    let pending = {
        let mut inner = pool.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.running = false;
        std::mem::take(&mut inner.queue)
    };
    pool.available.notify_all();

    for task in pending {
        task.request_cancel();
        task.run();
    }
    for worker in workers {
        if worker.join().is_err() {
            log::warn!("pool worker panicked during shutdown");
        }
    }
}

fn submit(task: Arc<RtFuture>) {
    {
        let state = POOL.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(pool) = &state.pool {
            let mut inner = pool.inner.lock().unwrap_or_else(PoisonError::into_inner);
            inner.queue.push_back(task);
            drop(inner);
            pool.available.notify_one();
            return;
        }
    }
    // No pool yet: bring one up with the ambient defaults and retry.
    pool_init_default();
    let state = POOL.lock().unwrap_or_else(PoisonError::into_inner);
    match &state.pool {
        Some(pool) => {
            let mut inner = pool.inner.lock().unwrap_or_else(PoisonError::into_inner);
            inner.queue.push_back(task);
            drop(inner);
            pool.available.notify_one();
        }
        None => {
            // Shut down while we were initializing; the task is cancelled.
            task.request_cancel();
            task.run();
        }
    }
}

// --- futures ---

/// Create a future over `closure` (one reference donated) and submit it to
/// the pool.
#[must_use]
pub fn future_new(closure: Value) -> Value {
    let task = Arc::new(RtFuture::new(closure));
    submit(Arc::clone(&task));
    Value::future(task)
}

/// Await a FUTURE value; returns its result or re-raises its error.
pub fn future_await(fv: Value) -> Result<Value, RtError> {
    future_of(fv)?.await_result()
}

/// Await with a deadline in milliseconds.
pub fn future_await_timeout(fv: Value, ms: u64) -> Result<Value, RtError> {
    future_of(fv)?.await_timeout(Duration::from_millis(ms))
}

/// Request cooperative cancellation.
pub fn future_cancel(fv: Value) -> Result<(), RtError> {
    future_of(fv)?.request_cancel();
    Ok(())
}

/// Whether the future reached a terminal state.
pub fn future_is_done(fv: Value) -> Result<bool, RtError> {
    Ok(future_of(fv)?.is_terminal())
}

/// Whether the future ended cancelled.
pub fn future_is_cancelled(fv: Value) -> Result<bool, RtError> {
    Ok(future_of(fv)?.is_cancelled())
}

/// Await every future in an ARRAY value, in order, returning a fresh
/// sequence of their results.
pub fn future_all(futures: Value) -> Result<Value, RtError> {
    let handles = collect_futures(futures)?;
    let mut results = Sequence::with_capacity(handles.len());
    for handle in &handles {
        match handle.await_result() {
            Ok(v) => results.push_take(v),
            Err(err) => {
                let partial = Value::array_from(SeqHandle::from_seq(results));
                partial.decref();
                return Err(err);
            }
        }
    }
    Ok(Value::array_from(SeqHandle::from_seq(results)))
}

/// Wait for the first future in an ARRAY value to finish, cancel the rest,
/// and return the winner's result.
pub fn future_race(futures: Value) -> Result<Value, RtError> {
    let handles = collect_futures(futures)?;
    if handles.is_empty() {
        return Err(crate::except::throw("race over an empty future list"));
    }

    let signal = Arc::new(DoneSignal::new());
    for handle in &handles {
        handle.attach_watcher(Arc::clone(&signal));
    }

    let winner = loop {
        if let Some(winner) = handles.iter().position(|h| h.is_terminal()) {
            break winner;
        }
        signal.wait();
    };

    for (i, handle) in handles.iter().enumerate() {
        if i != winner {
            handle.request_cancel();
        }
    }
    handles[winner].await_result()
}

fn collect_futures(futures: Value) -> Result<Vec<Arc<RtFuture>>, RtError> {
    let backing = crate::seq::backing(futures).ok_or_else(|| {
        crate::except::throw(format!("Not an ARRAY value: {}", futures.type_name()))
    })?;
    backing
        .borrow()
        .as_slice()
        .iter()
        .map(|v| future_of(*v))
        .collect()
}

// --- channels ---

/// A new CHANNEL value; `capacity` 0 is unbounded.
#[must_use]
pub fn channel_new(capacity: usize) -> Value {
    Value::channel(Arc::new(RtChannel::new(capacity)))
}

/// Send on a CHANNEL value; blocks while a bounded channel is full, raises
/// when the channel is closed.
pub fn channel_send(chv: Value, v: Value) -> Result<(), RtError> {
    channel_of(chv)?.send(v)
}

/// Receive from a CHANNEL value; blocks while open and empty, undef at
/// end-of-stream.
pub fn channel_recv(chv: Value) -> Result<Value, RtError> {
    Ok(channel_of(chv)?.recv())
}

/// Non-blocking send; false when full.
pub fn channel_try_send(chv: Value, v: Value) -> Result<bool, RtError> {
    channel_of(chv)?.try_send(v)
}

/// Non-blocking receive; undef when nothing is queued.
pub fn channel_try_recv(chv: Value) -> Result<Value, RtError> {
    Ok(channel_of(chv)?.try_recv().unwrap_or_else(Value::undef))
}

/// Close a CHANNEL value, waking every waiter.
pub fn channel_close(chv: Value) -> Result<(), RtError> {
    channel_of(chv)?.close();
    Ok(())
}

/// Whether a CHANNEL value is closed.
pub fn channel_is_closed(chv: Value) -> Result<bool, RtError> {
    Ok(channel_of(chv)?.is_closed())
}

/// Queued item count of a CHANNEL value.
pub fn channel_len(chv: Value) -> Result<i64, RtError> {
    Ok(channel_of(chv)?.len() as i64)
}
