// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Exception propagation.
//!
//! Errors travel as [`RtError`] through `Result` returns; the nonlocal-exit
//! stack of the original design becomes `?` propagation in generated code.
//! What remains runtime state is thread-local: the current exception (for
//! `get_exception` after a catch), the try-block depth, and the
//! pending-cleanup register.
//!
//! The cleanup register holds owned values that generated code accumulated
//! mid-expression. A try block records a mark on entry; a normal exit
//! restores to the mark (the values escaped outward, nothing is released),
//! an exceptional exit drains to the mark (everything above it is
//! released).


use std::cell::RefCell;

use thiserror::Error;

use crate::value::Value;

/// A raised runtime error: a message plus an optional typed payload.
///
/// Not `Clone`: the payload carries a reference that must be released
/// exactly once. Use [`duplicate`](Self::duplicate) to re-raise a stored
/// error.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct RtError {
    message: String,
    value: Option<Value>,
}

impl RtError {
    /// The message text.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The typed payload, when thrown with one (borrowed).
    #[must_use]
    pub fn value(&self) -> Option<Value> {
        self.value
    }

    /// The exception as a value, ownership transferred: the payload when
    /// present, the message as a string otherwise.
    #[must_use]
    pub fn into_value(self) -> Value {
        match self.value {
            Some(v) => v,
            None => Value::str(&self.message),
        }
    }

    /// Release the payload of an error that will not be re-thrown.
    pub fn release(self) {
        if let Some(v) = self.value {
            v.decref();
        }
    }

    /// Copy for re-raising while the original stays stored; the payload
    /// gains a reference so both copies can be released independently.
    #[must_use]
    pub fn duplicate(&self) -> Self {
        Self {
            message: self.message.clone(),
            value: self.value.map(Value::incref),
        }
    }
}

struct ExcState {
    current_message: Option<String>,
    current_value: Option<Value>,
    cleanup: Vec<Value>,
    try_depth: usize,
}

thread_local! {
    static EXC: RefCell<ExcState> = const {
        RefCell::new(ExcState {
            current_message: None,
            current_value: None,
            cleanup: Vec::new(),
            try_depth: 0,
        })
    };
}

/// Raise with a message. Also records the exception in the thread-local
/// register so `get_exception` sees it.
pub fn throw(msg: impl Into<String>) -> RtError {
    let message = msg.into();
    EXC.with(|exc| {
        let mut exc = exc.borrow_mut();
        exc.current_message = Some(message.clone());
        if let Some(old) = exc.current_value.take() {
            old.decref();
        }
    });
    RtError {
        message,
        value: None,
    }
}

/// Raise with a typed payload (one reference donated by the caller).
pub fn throw_value(v: Value) -> RtError {
    let message = crate::value::to_string_lossy(v);
    EXC.with(|exc| {
        let mut exc = exc.borrow_mut();
        exc.current_message = Some(message.clone());
        let old = exc.current_value.replace(v.incref());
        if let Some(old) = old {
            old.decref();
        }
    });
    RtError {
        message,
        value: Some(v),
    }
}

/// Programmatic fatal raise; `die` is `throw` under its surface name.
pub fn die(msg: impl Into<String>) -> RtError {
    throw(msg)
}

/// Write an unadorned line to stderr.
pub fn warn(msg: &str) {
    eprintln!("{msg}");
}

/// The current exception as an owned value; undef when clear.
#[must_use]
pub fn get_exception() -> Value {
    EXC.with(|exc| {
        let exc = exc.borrow();
        match (&exc.current_value, &exc.current_message) {
            (Some(v), _) => v.incref(),
            (None, Some(msg)) => Value::str(msg),
            (None, None) => Value::undef(),
        }
    })
}

/// Clear the current exception.
pub fn clear_exception() {
    EXC.with(|exc| {
        let mut exc = exc.borrow_mut();
        exc.current_message = None;
        if let Some(v) = exc.current_value.take() {
            v.decref();
        }
    });
}

/// Whether any try block is active on this thread.
#[must_use]
pub fn in_try_block() -> bool {
    EXC.with(|exc| exc.borrow().try_depth > 0)
}

// --- pending-cleanup register ---

/// Register an owned value for release on unwind.
pub fn cleanup_push(v: Value) {
    EXC.with(|exc| exc.borrow_mut().cleanup.push(v));
}

/// Take back the most recently registered value.
pub fn cleanup_pop() -> Option<Value> {
    EXC.with(|exc| exc.borrow_mut().cleanup.pop())
}

/// Current watermark of the cleanup register.
#[must_use]
pub fn cleanup_mark() -> usize {
    EXC.with(|exc| exc.borrow().cleanup.len())
}

/// Drop the watermark without releasing anything; the values above it
/// escaped outward on a normal exit.
pub fn cleanup_restore(mark: usize) {
    EXC.with(|exc| exc.borrow_mut().cleanup.truncate(mark));
}

/// Release everything above the watermark; the values above it were
/// abandoned by an exceptional exit.
pub fn cleanup_drain_to(mark: usize) {
    let abandoned = EXC.with(|exc| {
        let mut exc = exc.borrow_mut();
        exc.cleanup.split_off(mark)
    });
    for v in abandoned.into_iter().rev() {
        v.decref();
    }
}

// --- try blocks ---

/// Enter a try block: bumps the depth and returns the cleanup mark to pass
/// back on exit.
pub fn try_enter() -> usize {
    EXC.with(|exc| exc.borrow_mut().try_depth += 1);
    cleanup_mark()
}

/// Leave a try block on the normal path.
pub fn try_exit(mark: usize) {
    EXC.with(|exc| exc.borrow_mut().try_depth -= 1);
    cleanup_restore(mark);
}

/// Leave a try block on the exceptional path. Releases abandoned
/// temporaries and hands the exception to the catch body as an owned value.
pub fn try_catch(mark: usize, err: RtError) -> Value {
    EXC.with(|exc| exc.borrow_mut().try_depth -= 1);
    cleanup_drain_to(mark);
    err.into_value()
}

/// Print an uncaught exception with the call-stack trace and exit.
pub fn report_uncaught(err: &RtError) -> ! {
    eprintln!("{}", err.message());
    let trace = crate::context::stack_trace();
    if !trace.is_empty() {
        eprint!("{trace}");
    }
    std::process::exit(1);
}
