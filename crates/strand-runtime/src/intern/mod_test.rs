// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Tests for the intern pool.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::{INTERN_MAX_LEN, Interned, intern, intern_str, release};

#[test]
fn intern_same_bytes_same_pointer() {
    let a = intern(b"Dog::bark");
    let b = intern(b"Dog::bark");
    assert_eq!(a, b);
    assert!(std::ptr::eq(a.as_bytes().as_ptr(), b.as_bytes().as_ptr()));
}

#[test]
fn intern_different_bytes_differ() {
    let a = intern(b"alpha");
    let b = intern(b"beta");
    assert_ne!(a, b);
}

#[test]
fn intern_str_matches_intern() {
    let a = intern_str("name");
    let b = intern(b"name");
    assert_eq!(a, b);
}

#[test]
fn intern_binary_safe() {
    let a = intern(b"a\0b");
    assert_eq!(a.as_bytes(), b"a\0b");
    assert_eq!(a.len(), 3);
}

#[test]
fn intern_empty() {
    let a = intern(b"");
    assert!(a.is_empty());
    assert_eq!(a.len(), 0);
}

#[test]
fn display_lossy_for_binary() {
    let a = intern(b"\xff\xfe");
    // Lossy rendering, no panic.
    assert!(!a.display().is_empty());
}

#[test]
fn release_is_noop() {
    let a = intern(b"kept");
    release(a);
    let b = intern(b"kept");
    assert_eq!(a, b);
}

#[test]
fn handles_are_copy_and_hashable() {
    use std::collections::HashMap;
    let mut m: HashMap<Interned, u32> = HashMap::new();
    let k = intern(b"key");
    m.insert(k, 1);
    let k2 = intern(b"key");
    assert_eq!(m.get(&k2), Some(&1));
}

#[test]
fn max_len_constant_is_sane() {
    assert!(INTERN_MAX_LEN >= 16);
}
