// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Tests for references and the weak-reference registry.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::{deref, deref_set, isweak, ref_create, ref_create_take, reftype, weaken};
use crate::value::{Payload, Value, to_int, to_string_lossy};

#[test]
fn deref_returns_owned_target() {
    let target = Value::str("pointee");
    let r = ref_create(target);
    assert_eq!(target.refcount(), 2);

    let out = deref(r);
    assert!(out.ptr_eq(&target));
    assert_eq!(target.refcount(), 3);
    out.decref();
    r.decref();
    assert_eq!(target.refcount(), 1);
    target.decref();
}

#[test]
fn deref_of_non_ref_is_undef() {
    let v = Value::int(5000);
    assert!(deref(v).is_undef());
    v.decref();
}

#[test]
fn reftype_names_the_target_container() {
    let av = Value::array();
    let r = ref_create_take(av);
    let t = reftype(r);
    assert_eq!(to_string_lossy(t), "ARRAY");
    t.decref();
    r.decref();

    let sv = Value::str("s");
    let r = ref_create_take(sv);
    let t = reftype(r);
    assert_eq!(to_string_lossy(t), "SCALAR");
    t.decref();
    r.decref();

    let v = Value::int(5000);
    assert!(reftype(v).is_undef());
    v.decref();
}

#[test]
fn deref_set_is_visible_through_aliases() {
    let target = Value::int(1000);
    let r1 = ref_create(target);
    let r2 = ref_create(target);
    target.decref();

    deref_set(r1, Value::int(2000));

    let seen = deref(r2);
    assert_eq!(to_int(seen), 2000);
    seen.decref();
    r1.decref();
    r2.decref();
}

#[test]
fn deref_set_shares_containers() {
    let av = Value::array();
    crate::seq::store(av, 0, Value::str("inside")).unwrap();
    let target = Value::int(1000);
    let r = ref_create_take(target);

    deref_set(r, av.incref());
    let seen = deref(r);
    assert!(seen.is_array());
    let first = crate::seq::fetch(seen, 0).unwrap();
    assert_eq!(to_string_lossy(first), "inside");
    first.decref();
    seen.decref();
    r.decref();
    av.decref();
}

#[test]
fn weaken_sole_reference_converts_in_place() {
    let target = Value::str("watched");
    let r = ref_create(target);
    assert_eq!(target.refcount(), 2);

    let r = weaken(r);
    assert!(isweak(r));
    assert_eq!(target.refcount(), 1, "weak refs do not count");

    // Freeing the weak cell must not decrement the target again.
    r.decref();
    assert_eq!(target.refcount(), 1);
    target.decref();
}

#[test]
fn weaken_shared_reference_clones_a_weak_cell() {
    let target = Value::str("shared-target");
    let strong = ref_create(target);
    let strong2 = strong.incref();

    let weak = weaken(strong2);
    assert!(isweak(weak));
    assert!(!isweak(strong));
    assert_eq!(target.refcount(), 2, "only the strong ref counts");

    weak.decref();
    strong.decref();
    assert_eq!(target.refcount(), 1);
    target.decref();
}

#[test]
fn target_death_nulls_the_weak_cell() {
    let target = Value::str("short-lived");
    let r = weaken(ref_create(target));
    assert!(isweak(r));

    target.decref();

    // The cell is still a REF, still weak, but its target is gone.
    assert!(isweak(r));
    assert!(matches!(r.payload(), Payload::Ref(None)));
    assert!(deref(r).is_undef());
    assert!(!crate::value::to_bool(r));
    r.decref();
}

#[test]
fn weak_cell_death_unregisters_before_target() {
    let target = Value::str("outliving");
    let r = weaken(ref_create(target));
    r.decref();
    // The registry entry is gone; freeing the target later must not touch
    // the dead cell.
    target.decref();
}

#[test]
fn weaken_is_idempotent() {
    let target = Value::str("once");
    let r = weaken(ref_create(target));
    let r = weaken(r);
    assert!(isweak(r));
    assert_eq!(target.refcount(), 1);
    r.decref();
    target.decref();
}
