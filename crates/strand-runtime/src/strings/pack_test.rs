// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Tests for binary pack/unpack.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use proptest::prelude::*;

use super::{pack, unpack};
use crate::value::{Value, to_int, to_str_bytes, to_string_lossy};

fn packed(fmt: &str, args: Vec<Value>) -> Vec<u8> {
    let out = pack(fmt, &args).unwrap();
    let bytes = to_str_bytes(out);
    out.decref();
    for v in args {
        v.decref();
    }
    bytes
}

fn unpacked_ints(fmt: &str, data: &[u8]) -> Vec<i64> {
    let out = unpack(fmt, data).unwrap();
    let backing = crate::seq::backing(out).unwrap();
    let ints = backing.borrow().as_slice().iter().map(|v| to_int(*v)).collect();
    out.decref();
    ints
}

#[test]
fn big_and_little_endian_shorts() {
    assert_eq!(packed("n", vec![Value::int(0x1234)]), [0x12, 0x34]);
    assert_eq!(packed("v", vec![Value::int(0x1234)]), [0x34, 0x12]);
}

#[test]
fn big_and_little_endian_longs() {
    assert_eq!(
        packed("N", vec![Value::int(0x0102_0304)]),
        [1, 2, 3, 4]
    );
    assert_eq!(
        packed("V", vec![Value::int(0x0102_0304)]),
        [4, 3, 2, 1]
    );
}

#[test]
fn signed_byte_round_trip() {
    let data = packed("c", vec![Value::int(-1)]);
    assert_eq!(data, [0xff]);
    assert_eq!(unpacked_ints("c", &data), [-1]);
    assert_eq!(unpacked_ints("C", &data), [255]);
}

#[test]
fn repeat_counts_consume_arguments() {
    let data = packed(
        "C3",
        vec![Value::int(1), Value::int(2), Value::int(3)],
    );
    assert_eq!(data, [1, 2, 3]);
    assert_eq!(unpacked_ints("C3", &data), [1, 2, 3]);
}

#[test]
fn star_unpacks_the_remainder() {
    let data = packed(
        "N2",
        vec![Value::int(7), Value::int(9)],
    );
    assert_eq!(unpacked_ints("N*", &data), [7, 9]);
}

#[test]
fn ascii_null_padding() {
    let data = packed("a5", vec![Value::str("ab")]);
    assert_eq!(data, *b"ab\0\0\0");

    let out = unpack("a5", &data).unwrap();
    let backing = crate::seq::backing(out).unwrap();
    assert_eq!(to_str_bytes(backing.borrow().get(0)), b"ab\0\0\0");
    out.decref();
}

#[test]
fn ascii_space_padding_strips_on_unpack() {
    let data = packed("A5", vec![Value::str("ab")]);
    assert_eq!(data, *b"ab   ");

    let out = unpack("A5", &data).unwrap();
    let backing = crate::seq::backing(out).unwrap();
    assert_eq!(to_string_lossy(backing.borrow().get(0)), "ab");
    out.decref();
}

#[test]
fn hex_nibbles_high_first() {
    let data = packed("H4", vec![Value::str("1f2a")]);
    assert_eq!(data, [0x1f, 0x2a]);

    let out = unpack("H4", &data).unwrap();
    let backing = crate::seq::backing(out).unwrap();
    assert_eq!(to_string_lossy(backing.borrow().get(0)), "1f2a");
    out.decref();
}

#[test]
fn odd_hex_count_pads_the_low_nibble() {
    let data = packed("H3", vec![Value::str("abc")]);
    assert_eq!(data, [0xab, 0xc0]);
}

#[test]
fn pad_backup_and_position() {
    assert_eq!(packed("x3", vec![]), [0, 0, 0]);
    assert_eq!(packed("C2X", vec![Value::int(1), Value::int(2)]), [1]);
    assert_eq!(packed("C@4", vec![Value::int(9)]), [9, 0, 0, 0]);
}

#[test]
fn unpack_position_is_absolute() {
    let data = [1u8, 2, 3, 4];
    assert_eq!(unpacked_ints("@2C", &data), [3]);
    assert_eq!(unpacked_ints("C3XC", &data), [1, 2, 3, 3]);
}

#[test]
fn unpack_past_the_end_raises() {
    assert!(unpack("N", &[1, 2]).is_err());
    assert!(unpack("@9C", &[0]).is_err());
}

#[test]
fn unknown_format_characters_raise() {
    assert!(pack("Z", &[]).is_err());
    assert!(unpack("Z", &[]).is_err());
}

proptest! {
    #[test]
    fn unsigned_long_round_trips(values in prop::collection::vec(0u32.., 0..8)) {
        let args: Vec<Value> = values.iter().map(|&n| Value::int(i64::from(n))).collect();
        let fmt = format!("N{}", values.len());
        let data = packed(&fmt, args);
        let expected: Vec<i64> = values.iter().map(|&n| i64::from(n)).collect();
        prop_assert_eq!(unpacked_ints(&fmt, &data), expected);
    }

    #[test]
    fn native_quad_round_trips(n in any::<i64>()) {
        let data = packed("q", vec![Value::int(n)]);
        prop_assert_eq!(unpacked_ints("q", &data), [n]);
    }

    #[test]
    fn short_pairs_round_trip(a in 0u16.., b in 0u16..) {
        let data = packed("nv", vec![Value::int(i64::from(a)), Value::int(i64::from(b))]);
        prop_assert_eq!(unpacked_ints("nv", &data), [i64::from(a), i64::from(b)]);
    }
}
