// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Tests for value coercions.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::{Value, to_bool, to_int, to_num, to_str_bytes, to_string_lossy};

fn str_val(s: &str) -> Value {
    Value::str(s)
}

#[test]
fn undef_coerces_to_zero_and_empty() {
    let v = Value::undef();
    assert_eq!(to_int(v), 0);
    assert_eq!(to_num(v), 0.0);
    assert_eq!(to_str_bytes(v), b"");
    assert!(!to_bool(v));
}

#[test]
fn int_num_cast_both_ways() {
    let i = Value::int(7000);
    assert_eq!(to_num(i), 7000.0);
    i.decref();
    let n = Value::num(3.9);
    assert_eq!(to_int(n), 3);
    n.decref();
}

#[test]
fn string_parses_leading_numeric_prefix() {
    for (text, int, num) in [
        ("42abc", 42, 42.0),
        ("  -7", -7, -7.0),
        ("3.5e2x", 350, 350.0),
        ("abc", 0, 0.0),
        ("", 0, 0.0),
        ("0x10", 0, 0.0),
        ("12.75", 12, 12.75),
    ] {
        let v = str_val(text);
        assert_eq!(to_int(v), int, "to_int({text:?})");
        assert_eq!(to_num(v), num, "to_num({text:?})");
        v.decref();
    }
}

#[test]
fn truthiness_rules() {
    for (v, expected) in [
        (Value::int(1000), true),
        (Value::int(0).incref(), false),
        (Value::num(0.0), false),
        (str_val(""), false),
        (str_val("0"), false),
        (str_val("00"), true),
        (str_val("false"), true),
    ] {
        assert_eq!(to_bool(v), expected);
        v.decref();
    }
}

#[test]
fn container_truthiness_is_emptiness() {
    let av = Value::array();
    assert!(!to_bool(av));
    crate::seq::store(av, 0, Value::int(1).incref()).unwrap();
    assert!(to_bool(av));
    av.decref();

    let hv = Value::hash();
    assert!(!to_bool(hv));
    crate::map::store(hv, b"k", Value::int(1).incref()).unwrap();
    assert!(to_bool(hv));
    hv.decref();
}

#[test]
fn ref_truthiness_follows_target() {
    let falsy = Value::int(0).incref();
    let r = Value::ref_take(falsy);
    assert!(!to_bool(r));
    r.decref();

    let truthy = str_val("yes");
    let r = Value::ref_take(truthy);
    assert!(to_bool(r));
    r.decref();
}

#[test]
fn numbers_stringify_like_string_context() {
    let i = Value::int(-12);
    assert_eq!(to_string_lossy(i), "-12");
    i.decref();

    let whole = Value::num(3.0);
    assert_eq!(to_string_lossy(whole), "3");
    whole.decref();

    let frac = Value::num(2.5);
    assert_eq!(to_string_lossy(frac), "2.5");
    frac.decref();
}

#[test]
fn refs_stringify_with_container_type() {
    let av = Value::array();
    let r = Value::ref_take(av);
    let text = to_string_lossy(r);
    assert!(text.starts_with("ARRAY(0x"), "got {text}");
    r.decref();
}

#[test]
fn blessed_refs_stringify_with_package() {
    let hv = Value::hash();
    let r = Value::ref_take(hv);
    let r = crate::oop::bless(r, "Coerce::Test::Point").unwrap();
    let text = to_string_lossy(r);
    assert!(text.starts_with("Coerce::Test::Point=HASH(0x"), "got {text}");
    r.decref();
}

#[test]
fn ref_numifies_to_target_address() {
    let target = str_val("spot");
    let r = Value::ref_to(target);
    assert_eq!(to_int(r), target.addr() as i64);
    r.decref();
    target.decref();
}
