// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Per-thread call bookkeeping and process-wide output plumbing.
//!
//! Three small pieces generated code leans on at every call boundary:
//! - the call-stack trace frames behind uncaught-error reports,
//! - the dynamic call context (scalar/list/hash) callers advertise to
//!   callees so they can shape their return value,
//! - the default output handle `print`/`say` write through.


use std::cell::{Cell, RefCell};
use std::io::Write;
use std::sync::Mutex;

use once_cell::sync::Lazy;

use crate::except::RtError;
use crate::handle;
use crate::value::{Value, to_str_bytes};

/// Return-shape a caller expects from a sub.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum CallContext {
    /// Single value.
    #[default]
    Scalar,
    /// Flattened sequence.
    List,
    /// Key/value pairs.
    Hash,
}

thread_local! {
    static CONTEXT: Cell<CallContext> = const { Cell::new(CallContext::Scalar) };
    static FRAMES: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

/// The context advertised by the innermost caller.
#[must_use]
pub fn call_context() -> CallContext {
    CONTEXT.with(Cell::get)
}

/// Advertise `ctx` for the next call; returns the previous value so the
/// caller can restore it.
pub fn set_call_context(ctx: CallContext) -> CallContext {
    CONTEXT.with(|c| c.replace(ctx))
}

struct Frame {
    function: &'static str,
    file: &'static str,
    line: u32,
}

/// Scope guard for one call-stack frame; dropping pops the frame.
pub struct FrameGuard {
    _private: (),
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        FRAMES.with(|frames| {
            frames.borrow_mut().pop();
        });
    }
}

/// Push a trace frame for the duration of the returned guard.
pub fn push_frame(function: &'static str, file: &'static str, line: u32) -> FrameGuard {
    FRAMES.with(|frames| {
        frames.borrow_mut().push(Frame {
            function,
            file,
            line,
        });
    });
    FrameGuard { _private: () }
}

/// Update the innermost frame's line, called by generated code before
/// operations that may raise.
pub fn frame_set_line(line: u32) {
    FRAMES.with(|frames| {
        if let Some(top) = frames.borrow_mut().last_mut() {
            top.line = line;
        }
    });
}

/// Render the current call stack, innermost frame first.
#[must_use]
pub fn stack_trace() -> String {
    FRAMES.with(|frames| {
        let frames = frames.borrow();
        let mut out = String::new();
        for frame in frames.iter().rev() {
            out.push_str(&format!(
                "    at {} ({}:{})\n",
                frame.function, frame.file, frame.line
            ));
        }
        out
    })
}

static DEFAULT_OUT: Lazy<Mutex<Option<Value>>> = Lazy::new(|| Mutex::new(None));

/// Route `print`/`say` through `fh` (one reference donated); `undef`
/// restores stdout. Returns nothing; the previous handle is released.
pub fn set_default_output(fh: Value) {
    let mut out = DEFAULT_OUT
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let old = if fh.is_undef() {
        fh.decref();
        out.take()
    } else {
        out.replace(fh)
    };
    drop(out);
    if let Some(old) = old {
        old.decref();
    }
}

fn write_default(bytes: &[u8]) -> Result<(), RtError> {
    let out = DEFAULT_OUT
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    match *out {
        Some(fh) => handle::write_bytes(fh, bytes),
        None => std::io::stdout()
            .write_all(bytes)
            .map_err(|e| crate::except::throw(format!("print failed: {e}"))),
    }
}

/// Stringify and write each argument to the default output handle.
pub fn print(args: &[Value]) -> Result<(), RtError> {
    for v in args {
        write_default(&to_str_bytes(*v))?;
    }
    Ok(())
}

/// `print` plus a trailing newline.
pub fn say(args: &[Value]) -> Result<(), RtError> {
    print(args)?;
    write_default(b"\n")
}
