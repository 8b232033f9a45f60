// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Coercions between value types.
//!
//! The rules are Perl-flavored: undef reads as 0 / "" / false, strings
//! numify by their leading numeric prefix, and "0" is false. References
//! numify to their target's address and stringify as `TYPE(0xADDR)` (with
//! the package prepended when blessed), unless a stringify overload is
//! registered.

use crate::oop;
use crate::value::{Payload, Tag, Value};

/// Parse the leading numeric prefix of a byte string, Perl style.
/// `" 42abc"` is 42, `"3.5e2x"` is 350, anything else is 0.
fn parse_num_prefix(bytes: &[u8]) -> f64 {
    let mut i = 0;
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    let start = i;
    if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
        i += 1;
    }
    let mut saw_digit = false;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
        saw_digit = true;
    }
    if i < bytes.len() && bytes[i] == b'.' {
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
            saw_digit = true;
        }
    }
    if saw_digit && i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        let mut j = i + 1;
        if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
            j += 1;
        }
        let exp_digits = j;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if j > exp_digits {
            i = j;
        }
    }
    if !saw_digit {
        return 0.0;
    }
    std::str::from_utf8(&bytes[start..i])
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0.0)
}

/// Integer coercion.
#[must_use]
pub fn to_int(v: Value) -> i64 {
    match v.payload() {
        Payload::Undef => 0,
        Payload::Int(n) => *n,
        Payload::Num(n) => *n as i64,
        Payload::Str(bytes) => parse_num_prefix(bytes) as i64,
        Payload::Ref(Some(target)) => target.addr() as i64,
        Payload::Ref(None) => 0,
        Payload::Array(seq) => seq.borrow().len() as i64,
        Payload::Hash(map) => map.borrow().len() as i64,
        Payload::Atomic(a) => a.load(std::sync::atomic::Ordering::SeqCst),
        _ => 0,
    }
}

/// Float coercion.
#[must_use]
pub fn to_num(v: Value) -> f64 {
    match v.payload() {
        Payload::Undef => 0.0,
        Payload::Int(n) => *n as f64,
        Payload::Num(n) => *n,
        Payload::Str(bytes) => parse_num_prefix(bytes),
        Payload::Ref(Some(target)) => target.addr() as f64,
        Payload::Ref(None) => 0.0,
        Payload::Array(seq) => seq.borrow().len() as f64,
        Payload::Hash(map) => map.borrow().len() as f64,
        Payload::Atomic(a) => a.load(std::sync::atomic::Ordering::SeqCst) as f64,
        _ => 0.0,
    }
}

/// Truthiness.
#[must_use]
pub fn to_bool(v: Value) -> bool {
    match v.payload() {
        Payload::Undef => false,
        Payload::Int(n) => *n != 0,
        Payload::Num(n) => *n != 0.0,
        Payload::Str(bytes) => !(bytes.is_empty() || bytes == b"0"),
        Payload::Array(seq) => !seq.borrow().is_empty(),
        Payload::Hash(map) => !map.borrow().is_empty(),
        Payload::Ref(Some(target)) => to_bool(*target),
        Payload::Ref(None) => false,
        _ => true,
    }
}

/// Format a float the way string context shows it: integral values without
/// a fraction, everything else via the shortest round-trip rendering.
fn format_num(n: f64) -> String {
    if n == n.trunc() && n.abs() < 1e15 && !n.is_nan() && !n.is_infinite() {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// Stringify into raw bytes (binary-safe for STR inputs).
#[must_use]
pub fn to_str_bytes(v: Value) -> Vec<u8> {
    if let Some(overloaded) = oop::overload_stringify(v) {
        let bytes = match overloaded.payload() {
            Payload::Str(b) => b.clone(),
            _ => to_str_bytes(overloaded),
        };
        overloaded.decref();
        return bytes;
    }
    match v.payload() {
        Payload::Undef => Vec::new(),
        Payload::Int(n) => n.to_string().into_bytes(),
        Payload::Num(n) => format_num(*n).into_bytes(),
        Payload::Str(bytes) => bytes.clone(),
        Payload::Ref(target) => {
            let inner = match target {
                Some(t) => format!("{}(0x{:x})", ref_type_name(*t), t.addr()),
                None => "SCALAR(0x0)".to_owned(),
            };
            match v.blessed() {
                Some(pkg) => format!("{}={inner}", pkg.display()).into_bytes(),
                None => inner.into_bytes(),
            }
        }
        _ => format!("{}(0x{:x})", v.type_name(), v.addr()).into_bytes(),
    }
}

fn ref_type_name(target: Value) -> &'static str {
    match target.tag() {
        Tag::Array => "ARRAY",
        Tag::Hash => "HASH",
        Tag::Closure => "CODE",
        Tag::Ref => "REF",
        _ => "SCALAR",
    }
}

/// Stringify into an owned STR value. STR inputs without a stringify
/// overload share their cell.
#[must_use]
pub fn to_str_value(v: Value) -> Value {
    if v.is_str() && v.blessed().is_none() {
        return v.incref();
    }
    Value::from_bytes(to_str_bytes(v))
}

/// Stringify into text, replacing invalid UTF-8.
#[must_use]
pub fn to_string_lossy(v: Value) -> String {
    match String::from_utf8_lossy(&to_str_bytes(v)) {
        std::borrow::Cow::Borrowed(s) => s.to_owned(),
        std::borrow::Cow::Owned(s) => s,
    }
}
