// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Shared helpers for the runtime integration tests.

#![allow(dead_code, reason = "each integration test binary uses a subset")]

use strand_runtime::value::{Value, to_int, to_string_lossy};
use strand_runtime::{map, seq};

/// Collect an ARRAY value's elements as integers.
pub fn ints_of(av: Value) -> Vec<i64> {
    let len = seq::length(av).expect("array value");
    (0..len)
        .map(|i| {
            let v = seq::fetch(av, i).expect("in range");
            let n = to_int(v);
            v.decref();
            n
        })
        .collect()
}

/// Collect an ARRAY value's elements as text.
pub fn texts_of(av: Value) -> Vec<String> {
    let len = seq::length(av).expect("array value");
    (0..len)
        .map(|i| {
            let v = seq::fetch(av, i).expect("in range");
            let s = to_string_lossy(v);
            v.decref();
            s
        })
        .collect()
}

/// Build an ARRAY value from integers.
pub fn int_array(values: &[i64]) -> Value {
    let av = Value::array();
    for (i, &n) in values.iter().enumerate() {
        seq::store(av, i as i64, Value::int(n)).expect("store");
    }
    av
}

/// Read a map entry as text.
pub fn text_at(hv: Value, key: &[u8]) -> String {
    let v = map::fetch(hv, key).expect("hash value");
    let s = to_string_lossy(v);
    v.decref();
    s
}
