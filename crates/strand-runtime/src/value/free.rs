// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! The free cascade.
//!
//! A cell is freed exactly when its refcount transitions to zero. Teardown
//! order matters:
//! 1. notify the weak registry so outstanding weak references are nulled,
//! 2. unregister the cell itself if it is a weak reference,
//! 3. release the tie delegate,
//! 4. run DESTROY once for blessed values, then release the package name,
//! 5. tear down the tag-specific payload,
//! 6. recycle the metadata record and the cell.

use std::mem;

use crate::heap;
use crate::value::{Closure, Payload, Value};
use crate::{intern, oop, refs};

/// Free a cell whose refcount just reached zero.
pub(crate) fn free_value(value: Value) {
    // 1. Null out any weak references pointing here. The registry keeps a
    //    sticky "ever used" flag so programs without weak refs skip this.
    if refs::weak_refs_ever_used() {
        refs::notify_target_freed(value.addr());
    }

    // 2. A dying weak reference must leave the registry before its target
    //    pointer goes away.
    let was_weak = value.is_weak();
    if was_weak {
        refs::unregister_weak(value);
    }

    // 3. Tied containers drop their delegate.
    if let Some(delegate) = value.meta_opt_mut().and_then(|meta| meta.tied.take()) {
        delegate.decref();
    }

    // 4. Blessed values get their DESTROY chain, guarded against recursive
    //    entry. The metadata stays attached so the destructor still sees a
    //    blessed object.
    if let Some(pkg) = value.blessed() {
        let enter = value.meta_opt_mut().is_some_and(|meta| {
            if meta.destroy_running {
                false
            } else {
                meta.destroy_running = true;
                true
            }
        });
        if enter {
            // Keep the object alive while user code sees it.
            value.set_refcount_raw(1);
            oop::run_destroy(value, pkg);
            value.set_refcount_raw(0);
        }
        intern::release(pkg);
    }

    if let Some(mut meta) = value.take_meta() {
        meta.reset();
        heap::recycle_meta(meta);
    }

    // 5. Tag-specific teardown.
    // SAFETY: refcount is zero; no other handle can touch this payload.
    let payload = mem::replace(unsafe { value.payload_mut() }, Payload::Undef);
    free_payload(payload, was_weak);

    // 6. Back to the pools.
    // SAFETY: the cell is reset (undef payload, no meta) and unreferenced.
    unsafe { heap::recycle_cell(value.cell_ptr()) };
}

/// Release a payload detached from a live cell (assignment through a
/// reference replaces the old payload without the cell dying).
pub(crate) fn release_payload(payload: Payload) {
    free_payload(payload, false);
}

fn free_payload(payload: Payload, was_weak: bool) {
    match payload {
        Payload::Undef | Payload::Int(_) | Payload::Num(_) | Payload::Atomic(_) => {}
        Payload::Str(_) | Payload::CStruct(_) => {
            // Buffer drops with the payload.
        }
        Payload::Array(seq) => seq.decref(),
        Payload::Hash(map) => map.decref(),
        Payload::Ref(target) => {
            // Weak references never contributed to the target's count.
            if !was_weak {
                if let Some(target) = target {
                    target.decref();
                }
            }
        }
        Payload::FileHandle(mut handle) => {
            // Route through the kind-specific close; errors at free time
            // have nowhere to go.
            if let Err(err) = handle.close() {
                log::debug!("file handle close failed during free: {err}");
            }
        }
        Payload::Regex(compiled) => drop(compiled),
        Payload::Socket(socket) => drop(socket),
        Payload::CPointer(ptr) => drop(ptr),
        Payload::Closure(closure) => match closure {
            Closure::Native(_) => {}
            Closure::Captured { captures, .. } => {
                for cell in captures {
                    cell.decref();
                }
            }
        },
        Payload::Future(future) => {
            // A future dying while pending or running must not tear down
            // under the worker; request cancellation and wait for a
            // terminal state.
            if !future.is_terminal() {
                future.request_cancel();
                future.wait_terminal();
            }
            drop(future);
        }
        Payload::Channel(channel) => {
            channel.close();
            drop(channel);
        }
    }
}
