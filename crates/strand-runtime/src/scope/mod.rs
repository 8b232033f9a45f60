// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Package globals and dynamic scoping.
//!
//! `local` saves the current value of a package-scoped global on a
//! per-thread stack and writes it back on scope exit; unwinding restores to
//! a recorded depth, so both normal and exceptional exits converge on the
//! same state.


use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Mutex;

use once_cell::sync::Lazy;

use crate::intern::{Interned, intern_str};
use crate::value::Value;

/// Per-thread save-stack capacity.
const LOCAL_STACK_CAP: usize = 4096;

static GLOBALS: Lazy<Mutex<HashMap<Interned, Value>>> = Lazy::new(|| Mutex::new(HashMap::new()));

thread_local! {
    static LOCAL_STACK: RefCell<Vec<(Interned, Value)>> = const { RefCell::new(Vec::new()) };
}

/// Store a package global (one reference donated). The previous value is
/// released.
pub fn global_set(name: &str, v: Value) {
    let name = intern_str(name);
    let old = {
        let mut globals = GLOBALS
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        globals.insert(name, v)
    };
    if let Some(old) = old {
        old.decref();
    }
}

/// Read a package global, owned; undef when unset.
#[must_use]
pub fn global_get(name: &str) -> Value {
    let name = intern_str(name);
    let globals = GLOBALS
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    globals.get(&name).map_or_else(Value::undef, |v| v.incref())
}

/// Save the current value of a global for later restore.
pub fn local_save(name: &str) {
    let current = global_get(name);
    let name = intern_str(name);
    LOCAL_STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        if stack.len() >= LOCAL_STACK_CAP {
            // Resource exhaustion is fatal, not an unwind.
            eprintln!("local save stack exhausted ({LOCAL_STACK_CAP} entries)");
            std::process::exit(1);
        }
        stack.push((name, current));
    });
}

/// Restore the most recently saved global.
pub fn local_restore() {
    let entry = LOCAL_STACK.with(|stack| stack.borrow_mut().pop());
    if let Some((name, saved)) = entry {
        // The registry consumes the saved reference.
        let old = {
            let mut globals = GLOBALS
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            globals.insert(name, saved)
        };
        if let Some(old) = old {
            old.decref();
        }
    }
}

/// Current depth of the save stack, recorded at scope entry.
#[must_use]
pub fn local_depth() -> usize {
    LOCAL_STACK.with(|stack| stack.borrow().len())
}

/// Unwind the save stack to `depth`, restoring every global above it. Runs
/// on both normal and exceptional scope exit.
pub fn local_restore_to(depth: usize) {
    while local_depth() > depth {
        local_restore();
    }
}
