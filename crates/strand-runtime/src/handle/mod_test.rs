// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Tests for file-handle kinds and their close routing.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::io::Write;

use super::{
    PipeMode, close, open_file, open_mem_read, open_mem_write, open_mem_write_ref, open_pipe,
    read_all, read_line, write_bytes,
};
use crate::value::{Value, to_str_bytes, to_string_lossy};

#[test]
fn mem_read_yields_lines_then_undef() {
    let fh = open_mem_read(b"one\ntwo\nthree".to_vec());

    let line = read_line(fh).unwrap();
    assert_eq!(to_string_lossy(line), "one\n");
    line.decref();

    let line = read_line(fh).unwrap();
    assert_eq!(to_string_lossy(line), "two\n");
    line.decref();

    let line = read_line(fh).unwrap();
    assert_eq!(to_string_lossy(line), "three");
    line.decref();

    assert!(read_line(fh).unwrap().is_undef());
    close(fh).unwrap();
    fh.decref();
}

#[test]
fn mem_read_read_all_consumes_the_rest() {
    let fh = open_mem_read(b"head\ntail".to_vec());
    let line = read_line(fh).unwrap();
    line.decref();

    let rest = read_all(fh).unwrap();
    assert_eq!(to_string_lossy(rest), "tail");
    rest.decref();

    let empty = read_all(fh).unwrap();
    assert_eq!(to_str_bytes(empty), b"");
    empty.decref();
    fh.decref();
}

#[test]
fn mem_write_accumulates() {
    let fh = open_mem_write();
    write_bytes(fh, b"part one, ").unwrap();
    write_bytes(fh, b"part two").unwrap();
    close(fh).unwrap();
    fh.decref();
}

#[test]
fn mem_write_ref_flushes_into_the_target_on_close() {
    let target = Value::str("untouched");
    let fh = open_mem_write_ref(Value::ref_to(target));

    write_bytes(fh, b"captured ").unwrap();
    write_bytes(fh, b"output").unwrap();
    assert_eq!(to_string_lossy(target), "untouched", "write-back waits for close");

    close(fh).unwrap();
    assert_eq!(to_string_lossy(target), "captured output");
    assert_eq!(target.refcount(), 1, "close released the captured reference");

    fh.decref();
    target.decref();
}

#[test]
fn mem_write_ref_flushes_on_free_if_never_closed() {
    let target = Value::str("");
    let fh = open_mem_write_ref(Value::ref_to(target));
    write_bytes(fh, b"drop-flushed").unwrap();

    fh.decref();
    assert_eq!(to_string_lossy(target), "drop-flushed");
    target.decref();
}

#[test]
fn normal_files_round_trip() {
    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    tmp.write_all(b"alpha\nbeta\n").unwrap();
    tmp.flush().unwrap();
    let path = tmp.path().to_str().unwrap().to_owned();

    let fh = open_file(&path, "<").unwrap();
    let line = read_line(fh).unwrap();
    assert_eq!(to_string_lossy(line), "alpha\n");
    line.decref();
    let rest = read_all(fh).unwrap();
    assert_eq!(to_string_lossy(rest), "beta\n");
    rest.decref();
    close(fh).unwrap();
    fh.decref();
}

#[test]
fn write_mode_truncates_and_writes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.txt");
    let path = path.to_str().unwrap();

    let fh = open_file(path, ">").unwrap();
    write_bytes(fh, b"written through the runtime\n").unwrap();
    close(fh).unwrap();
    fh.decref();

    let back = std::fs::read(path).unwrap();
    assert_eq!(back, b"written through the runtime\n");
}

#[test]
fn unknown_open_modes_raise() {
    assert!(open_file("/tmp/irrelevant", "<>").is_err());
}

#[test]
fn reading_a_write_only_handle_raises() {
    let fh = open_mem_write();
    assert!(read_all(fh).is_err());
    fh.decref();
}

#[test]
fn writing_a_read_only_handle_raises() {
    let fh = open_mem_read(b"data".to_vec());
    assert!(write_bytes(fh, b"nope").is_err());
    fh.decref();
}

#[test]
fn pipes_read_child_output_and_pclose() {
    let fh = open_pipe("printf 'from the child\\n'", PipeMode::Read).unwrap();
    let out = read_all(fh).unwrap();
    assert_eq!(to_string_lossy(out), "from the child\n");
    out.decref();
    close(fh).unwrap();
    fh.decref();
}

#[test]
fn operations_on_non_handles_raise() {
    let v = Value::int(5000);
    assert!(write_bytes(v, b"x").is_err());
    assert!(close(v).is_err());
    v.decref();
}
