// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Reference cells and the weak-reference registry.
//!
//! A strong reference owns one count on its target. A weak reference holds
//! the same pointer without counting, and is registered in a process-wide
//! table keyed by the target's address; when the target is freed, every
//! registered weak cell has its target pointer nulled (the cell stays a REF
//! so polymorphic code still recognizes it).
//!
//! The registry is bypassed entirely until the first weak reference is
//! created: a sticky flag keeps target-death notification free for programs
//! that never weaken anything.

#[cfg(test)]
mod mod_test;

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use once_cell::sync::Lazy;

use crate::value::{Payload, Tag, Value};

static EVER_WEAK: AtomicBool = AtomicBool::new(false);

static REGISTRY: Lazy<Mutex<HashMap<usize, Vec<Value>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Whether any weak reference was ever registered.
#[inline]
#[must_use]
pub(crate) fn weak_refs_ever_used() -> bool {
    EVER_WEAK.load(Ordering::Relaxed)
}

fn register_weak(weak_cell: Value, target_addr: usize) {
    EVER_WEAK.store(true, Ordering::SeqCst);
    let mut registry = REGISTRY
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    registry.entry(target_addr).or_default().push(weak_cell);
}

/// Remove a dying weak cell from the registry before its payload goes away.
pub(crate) fn unregister_weak(weak_cell: Value) {
    let target_addr = match weak_cell.payload() {
        Payload::Ref(Some(target)) => target.addr(),
        // Target already died; its notification removed the entry.
        _ => return,
    };
    let mut registry = REGISTRY
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    if let Some(cells) = registry.get_mut(&target_addr) {
        cells.retain(|c| !c.ptr_eq(&weak_cell));
        if cells.is_empty() {
            registry.remove(&target_addr);
        }
    }
}

/// Null every weak reference to a target that just died.
pub(crate) fn notify_target_freed(target_addr: usize) {
    let cells = {
        let mut registry = REGISTRY
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        registry.remove(&target_addr)
    };
    if let Some(cells) = cells {
        for cell in cells {
            // SAFETY: the weak cell is alive (it unregisters before its own
            // free) and nulling the target is the registry's job.
            *unsafe { cell.payload_mut() } = Payload::Ref(None);
        }
    }
}

/// A strong reference to `target`, incrementing it.
#[must_use]
pub fn ref_create(target: Value) -> Value {
    Value::ref_to(target)
}

/// A strong reference taking ownership of the caller's count on `target`.
#[must_use]
pub fn ref_create_take(target: Value) -> Value {
    Value::ref_take(target)
}

/// The reference target, owned. Undef for non-references and for weak
/// references whose target died.
#[must_use]
pub fn deref(r: Value) -> Value {
    match r.payload() {
        Payload::Ref(Some(target)) => target.incref(),
        _ => Value::undef(),
    }
}

/// Assign through a reference: duplicate `new`'s payload into the target
/// cell in place, so every alias of the target observes the change. One
/// reference to `new` is donated by the caller.
///
/// Payloads that cannot be duplicated (live handles, sockets, raw
/// pointers) leave the target untouched; type mismatches never raise.
pub fn deref_set(r: Value, new: Value) {
    let target = match r.payload() {
        Payload::Ref(Some(target)) => *target,
        _ => {
            new.decref();
            return;
        }
    };
    // Immortal cells (small-int pool, singletons) are shared process-wide
    // and must never be written through.
    if target.is_immortal() || target.ptr_eq(&new) {
        new.decref();
        return;
    }
    let Some(duplicate) = duplicate_payload(new) else {
        new.decref();
        return;
    };
    // SAFETY: single mutator per the threading contract.
    let old = std::mem::replace(unsafe { target.payload_mut() }, duplicate);
    crate::value::release_payload(old);
    new.decref();
}

/// Duplicate a value's payload for assignment-through-reference. Containers
/// and coordination cells share their backing store; plain data is copied.
fn duplicate_payload(v: Value) -> Option<Payload> {
    match v.payload() {
        Payload::Undef => Some(Payload::Undef),
        Payload::Int(n) => Some(Payload::Int(*n)),
        Payload::Num(n) => Some(Payload::Num(*n)),
        Payload::Str(bytes) => Some(Payload::Str(bytes.clone())),
        Payload::Array(seq) => Some(Payload::Array(seq.incref())),
        Payload::Hash(map) => Some(Payload::Hash(map.incref())),
        Payload::Ref(Some(target)) => Some(Payload::Ref(Some(target.incref()))),
        Payload::Ref(None) => Some(Payload::Ref(None)),
        Payload::Closure(closure) => Some(Payload::Closure(crate::value::clone_closure(closure))),
        Payload::Future(f) => Some(Payload::Future(f.clone())),
        Payload::Channel(ch) => Some(Payload::Channel(ch.clone())),
        Payload::Atomic(a) => Some(Payload::Atomic(std::sync::atomic::AtomicI64::new(
            a.load(Ordering::SeqCst),
        ))),
        Payload::CStruct(block) => Some(Payload::CStruct(block.clone())),
        Payload::FileHandle(_)
        | Payload::Regex(_)
        | Payload::Socket(_)
        | Payload::CPointer(_) => None,
    }
}

/// Turn a reference weak.
///
/// A shared reference (count above one) is cloned into a fresh weak cell so
/// only the caller's handle becomes weak; a sole reference converts in
/// place and gives up its count on the target. Takes the caller's handle
/// and returns the (possibly new) one.
#[must_use]
pub fn weaken(r: Value) -> Value {
    if r.is_weak() {
        return r;
    }
    let target = match r.payload() {
        Payload::Ref(Some(target)) => *target,
        _ => return r,
    };

    if r.refcount() > 1 {
        let weak = Value::ref_take(target);
        weak.ensure_meta().weak = true;
        register_weak(weak, target.addr());
        r.decref();
        weak
    } else {
        r.ensure_meta().weak = true;
        register_weak(r, target.addr());
        target.decref();
        r
    }
}

/// Whether a reference is weak.
#[must_use]
pub fn isweak(r: Value) -> bool {
    r.is_weak()
}

/// The target's container type as a string value ("ARRAY", "HASH", "CODE",
/// "SCALAR"); undef for non-references.
#[must_use]
pub fn reftype(r: Value) -> Value {
    match r.payload() {
        Payload::Ref(Some(target)) => Value::str(match target.tag() {
            Tag::Array => "ARRAY",
            Tag::Hash => "HASH",
            Tag::Closure => "CODE",
            Tag::Ref => "REF",
            _ => "SCALAR",
        }),
        Payload::Ref(None) => Value::str("SCALAR"),
        _ => Value::undef(),
    }
}
