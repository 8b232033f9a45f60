// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Tied containers.
//!
//! A container whose cell carries a tie delegate routes every read, write,
//! existence test, deletion, and iteration step through method calls on the
//! delegate (`FETCH`, `STORE`, `EXISTS`, `DELETE`, `FIRSTKEY`, `NEXTKEY`,
//! `CLEAR`). Untied containers never reach this module; their operations
//! branch on the tie flag and stay on the direct path.
//!
//! Tying calls the class's constructor (`TIEHASH`/`TIEARRAY`/`TIESCALAR`)
//! with the class name and the extra arguments; the returned object becomes
//! the delegate, owned by the container cell.


use crate::except::{RtError, throw};
use crate::oop;
use crate::seq::{SeqHandle, Sequence};
use crate::value::{Payload, Value};

/// The container a tie operates on: references are followed one level.
fn container_of(v: Value) -> Value {
    match v.payload() {
        Payload::Ref(Some(target)) => *target,
        _ => v,
    }
}

fn tie_with(constructor: &str, container: Value, class: &str, extra: &[Value]) -> Result<Value, RtError> {
    let mut seq = Sequence::with_capacity(extra.len() + 1);
    seq.push_take(Value::str(class));
    for v in extra {
        seq.push(*v);
    }
    let class_value = seq.get(0);
    let args = Value::array_from(SeqHandle::from_seq(seq));
    let delegate = oop::method_call(class_value, constructor, args);
    args.decref();
    let delegate = delegate?;

    let meta = container.ensure_meta();
    if let Some(old) = meta.tied.take() {
        old.decref();
    }
    meta.tied = Some(delegate);
    Ok(delegate.incref())
}

/// Tie a map (given directly or through a reference) to `class`. Returns
/// the delegate object, owned.
pub fn tie_hash(hv: Value, class: &str, extra: &[Value]) -> Result<Value, RtError> {
    let container = container_of(hv);
    if !container.is_hash() {
        return Err(throw(format!(
            "Can't tie {} as a hash",
            container.type_name()
        )));
    }
    tie_with("TIEHASH", container, class, extra)
}

/// Tie a sequence (given directly or through a reference) to `class`.
/// Returns the delegate object, owned.
pub fn tie_array(av: Value, class: &str, extra: &[Value]) -> Result<Value, RtError> {
    let container = container_of(av);
    if !container.is_array() {
        return Err(throw(format!(
            "Can't tie {} as an array",
            container.type_name()
        )));
    }
    tie_with("TIEARRAY", container, class, extra)
}

/// Tie a scalar cell to `class`. Returns the delegate object, owned.
pub fn tie_scalar(sv: Value, class: &str, extra: &[Value]) -> Result<Value, RtError> {
    tie_with("TIESCALAR", container_of(sv), class, extra)
}

/// Remove a tie. Calls the delegate's optional UNTIE, then releases it;
/// the container keeps whatever direct contents it has (a container that
/// was only ever used tied is simply empty).
pub fn untie(v: Value) -> Result<(), RtError> {
    let container = container_of(v);
    let Some(delegate) = container.take_meta().and_then(|mut meta| {
        let delegate = meta.tied.take();
        // Preserve the rest of the record.
        if !meta.is_clear() {
            let restored = container.ensure_meta();
            restored.blessed = meta.blessed;
            restored.struct_name = meta.struct_name;
            restored.weak = meta.weak;
            restored.destroy_running = meta.destroy_running;
        }
        meta.reset();
        crate::heap::recycle_meta(meta);
        delegate
    }) else {
        return Ok(());
    };

    let untie_method = oop::can(delegate, "UNTIE");
    let has_untie = crate::value::to_bool(untie_method);
    untie_method.decref();
    if has_untie {
        let mut seq = Sequence::with_capacity(1);
        seq.push(delegate);
        let args = Value::array_from(SeqHandle::from_seq(seq));
        let outcome = oop::method_call(delegate, "UNTIE", args);
        args.decref();
        match outcome {
            Ok(result) => result.decref(),
            Err(err) => {
                delegate.decref();
                return Err(err);
            }
        }
    }
    delegate.decref();
    Ok(())
}

/// The tie delegate of a container, owned; undef when untied.
#[must_use]
pub fn tied(v: Value) -> Value {
    container_of(v)
        .tied_delegate()
        .map_or_else(Value::undef, Value::incref)
}

/// Read through a tied scalar's FETCH.
pub fn scalar_fetch(sv: Value) -> Result<Value, RtError> {
    delegate_call0(sv, "FETCH")
}

/// Write through a tied scalar's STORE (one reference to `v` donated).
pub fn scalar_store(sv: Value, v: Value) -> Result<(), RtError> {
    delegate_call1(sv, "STORE", v)?.decref();
    Ok(())
}

fn delegate_of(container: Value) -> Result<Value, RtError> {
    container
        .tied_delegate()
        .ok_or_else(|| throw("Container is not tied"))
}

/// Call a delegate method with no extra arguments. Returns the owned result.
pub(crate) fn delegate_call0(container: Value, method: &str) -> Result<Value, RtError> {
    let delegate = delegate_of(container)?;
    let mut seq = Sequence::with_capacity(1);
    seq.push(delegate);
    let args = Value::array_from(SeqHandle::from_seq(seq));
    let result = oop::method_call(delegate, method, args);
    args.decref();
    result
}

/// Call a delegate method with one argument (one reference donated).
pub(crate) fn delegate_call1(container: Value, method: &str, a: Value) -> Result<Value, RtError> {
    let delegate = delegate_of(container)?;
    let mut seq = Sequence::with_capacity(2);
    seq.push(delegate);
    seq.push_take(a);
    let args = Value::array_from(SeqHandle::from_seq(seq));
    let result = oop::method_call(delegate, method, args);
    args.decref();
    result
}

/// Call a delegate method with two arguments (one reference each donated).
pub(crate) fn delegate_call2(
    container: Value,
    method: &str,
    a: Value,
    b: Value,
) -> Result<Value, RtError> {
    let delegate = delegate_of(container)?;
    let mut seq = Sequence::with_capacity(3);
    seq.push(delegate);
    seq.push_take(a);
    seq.push_take(b);
    let args = Value::array_from(SeqHandle::from_seq(seq));
    let result = oop::method_call(delegate, method, args);
    args.decref();
    result
}
