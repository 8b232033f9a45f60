// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Atomic integer cells.
//!
//! Every operation is sequentially consistent; CAS succeeds exactly when
//! the current value equals the expected one.

use std::sync::atomic::{AtomicI64, Ordering};

use crate::except::{RtError, throw};
use crate::value::{Payload, Value};

fn with_cell<R>(v: Value, f: impl FnOnce(&AtomicI64) -> R) -> Result<R, RtError> {
    match v.payload() {
        Payload::Atomic(a) => Ok(f(a)),
        _ => Err(throw(format!("Not an ATOMIC value: {}", v.type_name()))),
    }
}

/// A new atomic cell value.
#[must_use]
pub fn atomic_new(initial: i64) -> Value {
    Value::atomic(initial)
}

/// Current value.
pub fn atomic_load(v: Value) -> Result<i64, RtError> {
    with_cell(v, |a| a.load(Ordering::SeqCst))
}

/// Overwrite the value.
pub fn atomic_store(v: Value, n: i64) -> Result<(), RtError> {
    with_cell(v, |a| a.store(n, Ordering::SeqCst))
}

/// Add `n`, returning the updated value.
pub fn atomic_add(v: Value, n: i64) -> Result<i64, RtError> {
    with_cell(v, |a| a.fetch_add(n, Ordering::SeqCst) + n)
}

/// Subtract `n`, returning the updated value.
pub fn atomic_sub(v: Value, n: i64) -> Result<i64, RtError> {
    with_cell(v, |a| a.fetch_sub(n, Ordering::SeqCst) - n)
}

/// Increment, returning the updated value.
pub fn atomic_inc(v: Value) -> Result<i64, RtError> {
    atomic_add(v, 1)
}

/// Decrement, returning the updated value.
pub fn atomic_dec(v: Value) -> Result<i64, RtError> {
    atomic_sub(v, 1)
}

/// Compare-and-swap: store `new` if the current value is `expected`.
/// Returns whether the swap happened.
pub fn atomic_cas(v: Value, expected: i64, new: i64) -> Result<bool, RtError> {
    with_cell(v, |a| {
        a.compare_exchange(expected, new, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    })
}
