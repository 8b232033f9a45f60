// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Allocation support for value cells.
//!
//! This module owns the pieces that keep allocation pressure off the global
//! allocator:
//! - the [`RefCount`] primitive with its non-atomic/atomic mode switch,
//! - thread-local freelists for value cells and metadata records,
//! - the immortal small-integer pool and the undef/empty-string singletons.
//!
//! Thread safety: freelists are thread-local, so a cell allocated on one
//! thread and freed on another lands in the freeing thread's list. The
//! threading flag flips from false to true the first time a worker pool is
//! started and never flips back; after that every refcount update uses
//! sequentially consistent atomics.

#[cfg(test)]
mod mod_test;

use std::cell::RefCell;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use once_cell::sync::Lazy;

use crate::value::{Meta, Payload, RtCell, Value};

/// Cells kept per thread before falling back to the allocator.
pub const CELL_FREELIST_CAP: usize = 16 * 1024;

/// Metadata records kept per thread.
pub const META_FREELIST_CAP: usize = 4 * 1024;

/// Smallest integer served from the immortal pool.
pub const SMALL_INT_MIN: i64 = -1;

/// Largest integer served from the immortal pool.
pub const SMALL_INT_MAX: i64 = 255;

/// Counts at or above this are treated as immortal sentinels.
const IMMORTAL_FLOOR: i32 = 1_000_000_000;

/// Sentinel stored in immortal cells, near `i32::MAX` with headroom so a
/// stray increment still reads as immortal.
const IMMORTAL_SENTINEL: i32 = i32::MAX - 0xFF;

static THREADING_ACTIVE: AtomicBool = AtomicBool::new(false);

/// Whether any parallel worker has ever been spawned.
#[inline]
#[must_use]
pub fn threading_active() -> bool {
    THREADING_ACTIVE.load(Ordering::Relaxed)
}

/// Switch every refcount update to atomics. Called on first pool
/// initialization; never reversed.
pub fn activate_threading() {
    THREADING_ACTIVE.store(true, Ordering::SeqCst);
}

/// Reference count with a global non-atomic/atomic mode switch.
///
/// Before any thread is spawned, updates are plain load/store. Once
/// [`activate_threading`] has run they become seq-cst read-modify-write.
/// Immortal counts short-circuit both directions.
pub struct RefCount(AtomicI32);

impl RefCount {
    /// A count starting at `n`.
    #[inline]
    #[must_use]
    pub const fn new(n: i32) -> Self {
        Self(AtomicI32::new(n))
    }

    /// An immortal count; increments and decrements are no-ops.
    #[inline]
    #[must_use]
    pub const fn immortal() -> Self {
        Self(AtomicI32::new(IMMORTAL_SENTINEL))
    }

    /// Current count.
    #[inline]
    #[must_use]
    pub fn get(&self) -> i32 {
        self.0.load(Ordering::Relaxed)
    }

    /// Whether this count is an immortal sentinel.
    #[inline]
    #[must_use]
    pub fn is_immortal(&self) -> bool {
        self.get() >= IMMORTAL_FLOOR
    }

    /// Increment. No-op on immortal counts.
    #[inline]
    pub fn inc(&self) {
        if self.is_immortal() {
            return;
        }
        if threading_active() {
            self.0.fetch_add(1, Ordering::SeqCst);
        } else {
            let n = self.0.load(Ordering::Relaxed);
            self.0.store(n + 1, Ordering::Relaxed);
        }
    }

    /// Overwrite the raw count. The free cascade uses this to keep a dying
    /// object alive across its DESTROY call; nothing else should.
    #[inline]
    pub(crate) fn set_raw(&self, n: i32) {
        self.0.store(n, Ordering::SeqCst);
    }

    /// Decrement. Returns true when the count reached zero and the owner
    /// must be freed. No-op (always false) on immortal counts.
    #[inline]
    pub fn dec(&self) -> bool {
        if self.is_immortal() {
            return false;
        }
        if threading_active() {
            self.0.fetch_sub(1, Ordering::SeqCst) == 1
        } else {
            let n = self.0.load(Ordering::Relaxed);
            self.0.store(n - 1, Ordering::Relaxed);
            n == 1
        }
    }
}

thread_local! {
    static CELL_FREELIST: RefCell<Vec<NonNull<RtCell>>> = const { RefCell::new(Vec::new()) };
    static META_FREELIST: RefCell<Vec<Box<Meta>>> = const { RefCell::new(Vec::new()) };
}

/// Allocate a cell, preferring the thread-local freelist.
pub(crate) fn alloc_cell(cell: RtCell) -> NonNull<RtCell> {
    let recycled = CELL_FREELIST.with(|fl| fl.borrow_mut().pop());
    match recycled {
        Some(ptr) => {
            // Recycled cells were reset before entering the freelist, so
            // overwriting without running drop leaks nothing.
            unsafe { ptr.as_ptr().write(cell) };
            ptr
        }
        None => {
            let boxed = Box::new(cell);
            // SAFETY: Box::into_raw never returns null.
            unsafe { NonNull::new_unchecked(Box::into_raw(boxed)) }
        }
    }
}

/// Return a cell to the freelist, or to the allocator when the list is full.
///
/// # Safety
///
/// `ptr` must come from [`alloc_cell`], must not be referenced anywhere, and
/// the cell must already be reset (undef payload, no metadata).
pub(crate) unsafe fn recycle_cell(ptr: NonNull<RtCell>) {
    let kept = CELL_FREELIST.with(|fl| {
        let mut fl = fl.borrow_mut();
        if fl.len() < CELL_FREELIST_CAP {
            fl.push(ptr);
            true
        } else {
            false
        }
    });
    if !kept {
        // SAFETY: caller hands over the last pointer to a reset cell.
        drop(unsafe { Box::from_raw(ptr.as_ptr()) });
    }
}

/// Allocate a metadata record, preferring the thread-local pool.
pub(crate) fn alloc_meta() -> Box<Meta> {
    META_FREELIST
        .with(|fl| fl.borrow_mut().pop())
        .unwrap_or_default()
}

/// Return a metadata record to the pool. The record must already be reset.
pub(crate) fn recycle_meta(meta: Box<Meta>) {
    META_FREELIST.with(|fl| {
        let mut fl = fl.borrow_mut();
        if fl.len() < META_FREELIST_CAP {
            fl.push(meta);
        }
    });
}

static UNDEF_SINGLETON: Lazy<&'static RtCell> =
    Lazy::new(|| Box::leak(Box::new(RtCell::immortal(Payload::Undef))));

static EMPTY_STR_SINGLETON: Lazy<&'static RtCell> =
    Lazy::new(|| Box::leak(Box::new(RtCell::immortal(Payload::Str(Vec::new())))));

static SMALL_INTS: Lazy<Box<[&'static RtCell]>> = Lazy::new(|| {
    (SMALL_INT_MIN..=SMALL_INT_MAX)
        .map(|n| &*Box::leak(Box::new(RtCell::immortal(Payload::Int(n)))))
        .collect()
});

/// The immortal undef singleton.
#[inline]
pub(crate) fn undef_singleton() -> Value {
    Value::from_cell(NonNull::from(*UNDEF_SINGLETON))
}

/// The immortal empty-string singleton.
#[inline]
pub(crate) fn empty_str_singleton() -> Value {
    Value::from_cell(NonNull::from(*EMPTY_STR_SINGLETON))
}

/// Look up `n` in the immortal small-integer pool.
#[inline]
pub(crate) fn small_int(n: i64) -> Option<Value> {
    if (SMALL_INT_MIN..=SMALL_INT_MAX).contains(&n) {
        let idx = (n - SMALL_INT_MIN) as usize;
        Some(Value::from_cell(NonNull::from(SMALL_INTS[idx])))
    } else {
        None
    }
}
