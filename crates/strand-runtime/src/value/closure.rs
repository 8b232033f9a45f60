// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Closure records.
//!
//! Generated code lowers every Strand sub to a plain function pointer. Subs
//! that close over variables get a capture array of shared cells (the cells
//! are ordinary reference values, so mutation through the closure behaves
//! like the source language).

use crate::except::RtError;
use crate::value::{Payload, Value};

/// A function taking the argument sequence as an ARRAY value.
pub type NativeFn = fn(Value) -> Result<Value, RtError>;

/// A function taking captured cells plus the argument sequence.
pub type CapturedFn = fn(&[Value], Value) -> Result<Value, RtError>;

/// Payload of a CLOSURE value.
pub enum Closure {
    /// A sub with no captured environment.
    Native(NativeFn),
    /// A sub with captured cells.
    Captured {
        /// The compiled body.
        func: CapturedFn,
        /// Declared parameter count, for arity diagnostics.
        params: u8,
        /// Captured cells, owned by the closure.
        captures: Vec<Value>,
    },
}

impl Closure {
    /// Declared parameter count, when known.
    #[must_use]
    pub fn params(&self) -> Option<u8> {
        match self {
            Self::Native(_) => None,
            Self::Captured { params, .. } => Some(*params),
        }
    }
}

/// Duplicate a closure record; captured cells gain a reference.
#[must_use]
pub(crate) fn clone_closure(closure: &Closure) -> Closure {
    match closure {
        Closure::Native(func) => Closure::Native(*func),
        Closure::Captured {
            func,
            params,
            captures,
        } => Closure::Captured {
            func: *func,
            params: *params,
            captures: captures.iter().map(|c| c.incref()).collect(),
        },
    }
}

/// Call a closure value with an argument sequence.
///
/// `args` is borrowed; the closure body is responsible for the refcounts of
/// anything it takes out of the sequence. Non-closure values raise.
pub fn closure_call(closure: Value, args: Value) -> Result<Value, RtError> {
    match closure.payload() {
        Payload::Closure(Closure::Native(func)) => func(args),
        Payload::Closure(Closure::Captured { func, captures, .. }) => func(captures, args),
        _ => Err(crate::except::throw(format!(
            "Not a CODE reference: {}",
            closure.type_name()
        ))),
    }
}
