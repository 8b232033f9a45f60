// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Tests for package dispatch, inheritance, modifiers, and overloads.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{
    ModifierKind, bless, blessed, can, inherit, isa, method_call, method_register,
    modifier_register, overload_binary, overload_register, super_call,
};
use crate::except::RtError;
use crate::value::{Value, closure_call, to_int, to_string_lossy};

fn new_obj(pkg: &str) -> Value {
    bless(Value::ref_take(Value::hash()), pkg).unwrap()
}

fn args_with(receiver: Value, rest: &[Value]) -> Value {
    let av = Value::array();
    let backing = crate::seq::backing(av).unwrap();
    // SAFETY: freshly created, single owner.
    let seq = unsafe { backing.borrow_mut() };
    seq.push(receiver);
    for v in rest {
        seq.push(*v);
    }
    av
}

fn ret_str(text: &'static str) -> Value {
    Value::str(text)
}

// --- plain dispatch ---

fn greet(_args: Value) -> Result<Value, RtError> {
    Ok(ret_str("woof"))
}

#[test]
fn dispatch_finds_a_registered_method() {
    method_register("OopT::Dog", "speak", greet);
    let dog = new_obj("OopT::Dog");
    let args = args_with(dog, &[]);
    let out = method_call(dog, "speak", args).unwrap();
    assert_eq!(to_string_lossy(out), "woof");
    out.decref();
    args.decref();
    dog.decref();
}

#[test]
fn unknown_methods_raise_with_the_package_name() {
    let obj = new_obj("OopT::Silent");
    let args = args_with(obj, &[]);
    let err = method_call(obj, "speak", args).unwrap_err();
    assert!(err.message().contains("OopT::Silent"), "{}", err.message());
    args.decref();
    obj.decref();
}

#[test]
fn class_methods_dispatch_through_a_name_string() {
    method_register("OopT::Factory", "make", greet);
    let class = Value::str("OopT::Factory");
    let args = args_with(class, &[]);
    let out = method_call(class, "make", args).unwrap();
    assert_eq!(to_string_lossy(out), "woof");
    out.decref();
    args.decref();
    class.decref();
}

// --- inheritance order ---

fn from_base(_args: Value) -> Result<Value, RtError> {
    Ok(ret_str("base"))
}

fn from_right(_args: Value) -> Result<Value, RtError> {
    Ok(ret_str("right"))
}

#[test]
fn resolution_is_depth_first_left_to_right() {
    // Diamond: D -> (B, C); B -> A. Both A and C define the method; the
    // depth-first walk hits A through B before it ever looks at C.
    method_register("OopT::DiamondA", "which", from_base);
    method_register("OopT::DiamondC", "which", from_right);
    inherit("OopT::DiamondB", "OopT::DiamondA");
    inherit("OopT::DiamondD", "OopT::DiamondB");
    inherit("OopT::DiamondD", "OopT::DiamondC");

    let obj = new_obj("OopT::DiamondD");
    let args = args_with(obj, &[]);
    let out = method_call(obj, "which", args).unwrap();
    assert_eq!(to_string_lossy(out), "base");
    out.decref();
    args.decref();
    obj.decref();
}

fn version_one(_args: Value) -> Result<Value, RtError> {
    Ok(ret_str("v1"))
}

fn version_two(_args: Value) -> Result<Value, RtError> {
    Ok(ret_str("v2"))
}

#[test]
fn re_registration_invalidates_the_cache() {
    method_register("OopT::Hot", "swap", version_one);
    let obj = new_obj("OopT::Hot");

    let args = args_with(obj, &[]);
    let out = method_call(obj, "swap", args).unwrap();
    assert_eq!(to_string_lossy(out), "v1");
    out.decref();

    method_register("OopT::Hot", "swap", version_two);
    let out = method_call(obj, "swap", args).unwrap();
    assert_eq!(to_string_lossy(out), "v2");
    out.decref();
    args.decref();
    obj.decref();
}

// --- isa / can ---

#[test]
fn isa_walks_the_transitive_closure() {
    inherit("OopT::Spaniel", "OopT::Canine");
    inherit("OopT::Canine", "OopT::Animal");
    let obj = new_obj("OopT::Spaniel");

    assert!(isa(obj, "OopT::Spaniel"));
    assert!(isa(obj, "OopT::Canine"));
    assert!(isa(obj, "OopT::Animal"));
    assert!(!isa(obj, "OopT::Feline"));
    // Cached answers stay correct on repeat.
    assert!(isa(obj, "OopT::Animal"));
    obj.decref();
}

#[test]
fn isa_dispatches_as_a_universal_method() {
    inherit("OopT::Pug", "OopT::Doglike");
    let obj = new_obj("OopT::Pug");
    let target = Value::str("OopT::Doglike");
    let args = args_with(obj, &[target]);
    let out = method_call(obj, "isa", args).unwrap();
    assert_eq!(to_int(out), 1);
    out.decref();
    args.decref();
    target.decref();
    obj.decref();
}

#[test]
fn can_returns_a_callable_or_undef() {
    method_register("OopT::Able", "jump", greet);
    let obj = new_obj("OopT::Able");

    let callable = can(obj, "jump");
    assert!(callable.is_closure());
    let args = args_with(obj, &[]);
    let out = closure_call(callable, args).unwrap();
    assert_eq!(to_string_lossy(out), "woof");
    out.decref();
    args.decref();
    callable.decref();

    assert!(can(obj, "fly").is_undef());
    obj.decref();
}

// --- AUTOLOAD ---

fn autoload(args: Value) -> Result<Value, RtError> {
    // The requested method name is prepended to the arguments.
    crate::seq::fetch(args, 0)
}

#[test]
fn missing_methods_fall_back_to_autoload() {
    method_register("OopT::Ghost", "AUTOLOAD", autoload);
    let obj = new_obj("OopT::Ghost");
    let args = args_with(obj, &[]);
    let out = method_call(obj, "phantom", args).unwrap();
    assert_eq!(to_string_lossy(out), "phantom");
    out.decref();
    args.decref();
    obj.decref();
}

// --- SUPER ---

fn child_speak(_args: Value) -> Result<Value, RtError> {
    Ok(ret_str("child"))
}

fn parent_speak(_args: Value) -> Result<Value, RtError> {
    Ok(ret_str("parent"))
}

#[test]
fn super_skips_the_package_itself() {
    method_register("OopT::SubClass", "speak", child_speak);
    method_register("OopT::BaseClass", "speak", parent_speak);
    inherit("OopT::SubClass", "OopT::BaseClass");

    let obj = new_obj("OopT::SubClass");
    let args = args_with(obj, &[]);

    let out = method_call(obj, "speak", args).unwrap();
    assert_eq!(to_string_lossy(out), "child");
    out.decref();

    let out = super_call(obj, "OopT::SubClass", "speak", args).unwrap();
    assert_eq!(to_string_lossy(out), "parent");
    out.decref();
    args.decref();
    obj.decref();
}

// --- method modifiers ---

static MOD_EVENTS: Mutex<Vec<&'static str>> = Mutex::new(Vec::new());

fn mod_push(event: &'static str) {
    MOD_EVENTS.lock().unwrap().push(event);
}

fn bark(_args: Value) -> Result<Value, RtError> {
    mod_push("bark");
    Ok(ret_str("yip"))
}

fn before_bark(_args: Value) -> Result<Value, RtError> {
    mod_push("A");
    Ok(Value::undef())
}

fn after_bark(_args: Value) -> Result<Value, RtError> {
    mod_push("B");
    Ok(Value::undef())
}

fn around_bark(args: Value) -> Result<Value, RtError> {
    mod_push("C1");
    // The original arrives as a callable prepended to the arguments.
    let original = crate::seq::fetch(args, 0)?;
    let rest = Value::array();
    {
        let outer = crate::seq::backing(args).unwrap();
        let inner = crate::seq::backing(rest).unwrap();
        // SAFETY: fresh sequence, single owner.
        let inner = unsafe { inner.borrow_mut() };
        for v in &outer.borrow().as_slice()[1..] {
            inner.push(*v);
        }
    }
    let result = closure_call(original, rest);
    rest.decref();
    original.decref();
    mod_push("C2");
    result
}

#[test]
fn modifiers_run_in_documented_order() {
    method_register("OopT::Beagle", "bark", bark);
    modifier_register("OopT::Beagle", "bark", ModifierKind::Before, before_bark);
    modifier_register("OopT::Beagle", "bark", ModifierKind::After, after_bark);
    modifier_register("OopT::Beagle", "bark", ModifierKind::Around, around_bark);

    MOD_EVENTS.lock().unwrap().clear();
    let obj = new_obj("OopT::Beagle");
    let args = args_with(obj, &[]);
    let out = method_call(obj, "bark", args).unwrap();
    assert_eq!(to_string_lossy(out), "yip");
    out.decref();
    args.decref();
    obj.decref();

    assert_eq!(*MOD_EVENTS.lock().unwrap(), ["A", "C1", "bark", "C2", "B"]);
}

// --- operator overloading ---

fn vec_add(args: Value) -> Result<Value, RtError> {
    let left = crate::seq::fetch(args, 0)?;
    let right = crate::seq::fetch(args, 1)?;
    let m = magnitude(left);
    let sum = to_int(m) + to_int(right);
    m.decref();
    left.decref();
    right.decref();
    Ok(Value::int(sum))
}

fn magnitude(obj: Value) -> Value {
    let target = crate::refs::deref(obj);
    if target.is_hash() {
        let v = crate::map::fetch(target, b"n").unwrap();
        target.decref();
        // Borrow semantics are enough here.
        let n = to_int(v);
        v.decref();
        return Value::int(n);
    }
    target.decref();
    obj.incref()
}

#[test]
fn binary_overload_prefers_the_left_operand() {
    overload_register("OopT::Vec", "+", vec_add);
    let obj = new_obj("OopT::Vec");
    let target = crate::refs::deref(obj);
    crate::map::store(target, b"n", Value::int(40).incref()).unwrap();
    target.decref();

    let forty_two = overload_binary("+", obj, Value::int(2)).unwrap().unwrap();
    assert_eq!(to_int(forty_two), 42);
    forty_two.decref();

    // Right-operand dispatch swaps the operands.
    let swapped = overload_binary("+", Value::int(2), obj).unwrap().unwrap();
    assert_eq!(to_int(swapped), 42);
    swapped.decref();

    assert!(overload_binary("+", Value::int(1), Value::int(2)).is_none());
    obj.decref();
}

fn show(args: Value) -> Result<Value, RtError> {
    let receiver = crate::seq::fetch(args, 0)?;
    receiver.decref();
    Ok(ret_str("<vec>"))
}

#[test]
fn stringify_overload_fires_in_string_context() {
    overload_register("OopT::Shown", "\"\"", show);
    let obj = new_obj("OopT::Shown");
    assert_eq!(to_string_lossy(obj), "<vec>");
    obj.decref();
}

// --- bless / blessed / DESTROY ---

#[test]
fn bless_is_idempotent() {
    let obj = new_obj("OopT::First");
    let obj = bless(obj, "OopT::Second").unwrap();
    let pkg = blessed(obj);
    assert_eq!(to_string_lossy(pkg), "OopT::Second");
    pkg.decref();
    obj.decref();
}

#[test]
fn bless_rejects_non_references() {
    let v = Value::int(5000);
    assert!(bless(v, "OopT::Nope").is_err());
    v.decref();
}

static DESTROYED: AtomicUsize = AtomicUsize::new(0);

fn destroy(_args: Value) -> Result<Value, RtError> {
    DESTROYED.fetch_add(1, Ordering::SeqCst);
    Ok(Value::undef())
}

#[test]
fn destroy_runs_exactly_once_on_free() {
    method_register("OopT::Mortal", "DESTROY", destroy);

    let obj = new_obj("OopT::Mortal");
    let extra = obj.incref();
    extra.decref();
    let before = DESTROYED.load(Ordering::SeqCst);

    obj.decref();
    assert_eq!(DESTROYED.load(Ordering::SeqCst), before + 1);
}

static DESTROYED_VIA_PARENT: AtomicUsize = AtomicUsize::new(0);

fn destroy_via_parent(_args: Value) -> Result<Value, RtError> {
    DESTROYED_VIA_PARENT.fetch_add(1, Ordering::SeqCst);
    Ok(Value::undef())
}

#[test]
fn destroy_is_inherited() {
    method_register("OopT::MortalBase", "DESTROY", destroy_via_parent);
    inherit("OopT::MortalChild", "OopT::MortalBase");

    let before = DESTROYED_VIA_PARENT.load(Ordering::SeqCst);
    let obj = new_obj("OopT::MortalChild");
    obj.decref();
    assert_eq!(DESTROYED_VIA_PARENT.load(Ordering::SeqCst), before + 1);
}

#[test]
fn malformed_package_names_skip_destroy_without_crashing() {
    let obj = Value::ref_take(Value::hash());
    let obj = bless(obj, "\u{1}garbled").unwrap();
    // The free path logs and skips DESTROY; it must not panic.
    obj.decref();
}
