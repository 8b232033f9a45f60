// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! End-to-end tests for dispatch, inheritance, and exception flow.

mod common;

use strand_runtime::except::{self, RtError};
use strand_runtime::oop::{
    ModifierKind, bless, inherit, isa, method_call, method_register, modifier_register,
};
use strand_runtime::value::{Value, to_int, to_string_lossy};
use strand_runtime::{scope, seq, strings};

fn new_obj(pkg: &str) -> Value {
    bless(Value::ref_take(Value::hash()), pkg).unwrap()
}

fn args_for(receiver: Value) -> Value {
    let av = Value::array();
    seq::push(av, receiver).unwrap();
    av
}

fn record(event: &str) {
    let log = scope::global_get("ZooT::log");
    let event_v = Value::str(event);
    let appended = if log.is_undef() {
        log.decref();
        event_v
    } else {
        let sep = Value::str(",");
        let with_sep = strings::concat_inplace(log, sep);
        sep.decref();
        strings::concat_inplace(with_sep, event_v)
    };
    if !appended.ptr_eq(&event_v) {
        event_v.decref();
    }
    scope::global_set("ZooT::log", appended);
}

fn speak(_args: Value) -> Result<Value, RtError> {
    record("speak");
    Ok(Value::str("arf"))
}

fn before_speak(_args: Value) -> Result<Value, RtError> {
    record("before");
    Ok(Value::undef())
}

fn after_speak(_args: Value) -> Result<Value, RtError> {
    record("after");
    Ok(Value::undef())
}

fn around_speak(args: Value) -> Result<Value, RtError> {
    record("around-pre");
    let original = seq::fetch(args, 0)?;
    let rest = Value::array();
    let len = seq::length(args)?;
    for i in 1..len {
        let v = seq::fetch(args, i)?;
        seq::push_take(rest, v)?;
    }
    let result = strand_runtime::value::closure_call(original, rest);
    rest.decref();
    original.decref();
    record("around-post");
    result
}

#[test]
fn modifier_chain_runs_in_documented_order() {
    method_register("ZooT::Dog", "speak", speak);
    modifier_register("ZooT::Dog", "speak", ModifierKind::Before, before_speak);
    modifier_register("ZooT::Dog", "speak", ModifierKind::Around, around_speak);
    modifier_register("ZooT::Dog", "speak", ModifierKind::After, after_speak);

    scope::global_set("ZooT::log", Value::undef());
    let dog = new_obj("ZooT::Dog");
    let args = args_for(dog);
    let out = method_call(dog, "speak", args).unwrap();
    assert_eq!(to_string_lossy(out), "arf");
    out.decref();
    args.decref();
    dog.decref();

    let log = scope::global_get("ZooT::log");
    assert_eq!(
        to_string_lossy(log),
        "before,around-pre,speak,around-post,after"
    );
    log.decref();
    scope::global_set("ZooT::log", Value::undef());
}

#[test]
fn isa_matches_the_transitive_parent_closure() {
    inherit("ZooT::Puppy", "ZooT::Canine");
    inherit("ZooT::Canine", "ZooT::Mammal");
    inherit("ZooT::Puppy", "ZooT::Pet");

    let obj = new_obj("ZooT::Puppy");
    for parent in ["ZooT::Puppy", "ZooT::Canine", "ZooT::Mammal", "ZooT::Pet"] {
        assert!(isa(obj, parent), "{parent}");
    }
    assert!(!isa(obj, "ZooT::Reptile"));
    obj.decref();
}

fn left_m(_args: Value) -> Result<Value, RtError> {
    Ok(Value::str("left-branch"))
}

fn right_m(_args: Value) -> Result<Value, RtError> {
    Ok(Value::str("right-branch"))
}

#[test]
fn dispatch_follows_depth_first_left_to_right() {
    // Left branch wins even when the right branch's match is shallower.
    method_register("ZooT::LeftDeep", "pick", left_m);
    method_register("ZooT::Right", "pick", right_m);
    inherit("ZooT::Left", "ZooT::LeftDeep");
    inherit("ZooT::Mixed", "ZooT::Left");
    inherit("ZooT::Mixed", "ZooT::Right");

    let obj = new_obj("ZooT::Mixed");
    let args = args_for(obj);
    let out = method_call(obj, "pick", args).unwrap();
    assert_eq!(to_string_lossy(out), "left-branch");
    out.decref();
    args.decref();
    obj.decref();
}

fn faulty(_args: Value) -> Result<Value, RtError> {
    Err(except::throw("kennel on fire"))
}

#[test]
fn method_errors_propagate_through_try_blocks() {
    method_register("ZooT::Faulty", "ignite", faulty);
    let obj = new_obj("ZooT::Faulty");
    let args = args_for(obj);

    let temp = Value::str("mid-expression temporary");
    let mark = except::try_enter();
    except::cleanup_push(temp.incref());

    let outcome = method_call(obj, "ignite", args);
    let caught = match outcome {
        Ok(v) => {
            v.decref();
            panic!("expected the method to raise");
        }
        Err(err) => except::try_catch(mark, err),
    };
    assert_eq!(to_string_lossy(caught), "kennel on fire");
    assert_eq!(temp.refcount(), 1, "temporary drained on unwind");

    caught.decref();
    except::clear_exception();
    temp.decref();
    args.decref();
    obj.decref();
}

#[test]
fn local_scoping_survives_an_exceptional_exit() {
    scope::global_set("ZooT::mood", Value::str("calm"));
    let depth = scope::local_depth();

    let result: Result<(), RtError> = (|| {
        scope::local_save("ZooT::mood");
        scope::global_set("ZooT::mood", Value::str("frantic"));
        Err(except::throw("interrupted"))
    })();

    assert!(result.is_err());
    result.unwrap_err().release();
    except::clear_exception();

    // The unwind path restores to the recorded depth.
    scope::local_restore_to(depth);
    let mood = scope::global_get("ZooT::mood");
    assert_eq!(to_string_lossy(mood), "calm");
    mood.decref();
    scope::global_set("ZooT::mood", Value::undef());
}

fn count_args(args: Value) -> Result<Value, RtError> {
    seq::length(args).map(Value::int)
}

#[test]
fn methods_see_the_full_argument_sequence() {
    method_register("ZooT::Counter", "tally", count_args);
    let obj = new_obj("ZooT::Counter");
    let args = args_for(obj);
    for text in ["one", "two", "three"] {
        seq::push_take(args, Value::str(text)).unwrap();
    }
    let out = method_call(obj, "tally", args).unwrap();
    assert_eq!(to_int(out), 4, "receiver plus three arguments");
    out.decref();
    args.decref();
    obj.decref();
}
