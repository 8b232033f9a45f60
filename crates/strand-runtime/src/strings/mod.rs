// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! String operations over binary-safe byte buffers.
//!
//! Strings carry an explicit length; embedded NULs are data. Codepoint and
//! byte indexing are distinct operations (`substr` is codepoint-based,
//! `substr_bytes` byte-based, `index`/`rindex` byte-based). Non-string
//! operands are stringified on the fly.
//!
//! The in-place concatenation fast path reuses the left operand when the
//! caller holds the only reference.

#[cfg(test)]
mod pack_test;

mod pack;

pub use pack::{pack, unpack};

use crate::except::{RtError, throw};
use crate::seq::{SeqHandle, Sequence};
use crate::value::{Payload, Value, to_str_bytes, to_string_lossy};

/// Byte length in string context.
#[must_use]
pub fn length_bytes(v: Value) -> i64 {
    match v.payload() {
        Payload::Str(bytes) => bytes.len() as i64,
        _ => to_str_bytes(v).len() as i64,
    }
}

/// Codepoint length in string context (invalid bytes count as one
/// replacement character each).
#[must_use]
pub fn length_codepoints(v: Value) -> i64 {
    match v.payload() {
        Payload::Str(bytes) => String::from_utf8_lossy(bytes).chars().count() as i64,
        _ => to_string_lossy(v).chars().count() as i64,
    }
}

/// Concatenate two values into a fresh string, reading string payloads by
/// their stored length and formatting numbers on the fly.
#[must_use]
pub fn concat_sv(a: Value, b: Value) -> Value {
    let left = to_str_bytes(a);
    let right = to_str_bytes(b);
    let mut out = Vec::with_capacity(left.len() + right.len());
    out.extend_from_slice(&left);
    out.extend_from_slice(&right);
    Value::from_bytes(out)
}

/// Append `b` to `a` (one reference to `a` donated), reusing `a`'s buffer
/// when the caller holds the only reference; otherwise falls back to a
/// fresh string and releases `a`.
#[must_use]
pub fn concat_inplace(a: Value, b: Value) -> Value {
    if a.refcount() == 1 && a.is_str() && a.blessed().is_none() {
        let right = to_str_bytes(b);
        // SAFETY: sole owner per the refcount check.
        if let Payload::Str(bytes) = unsafe { a.payload_mut() } {
            bytes.extend_from_slice(&right);
            return a;
        }
    }
    let out = concat_sv(a, b);
    a.decref();
    out
}

fn resolve_span(len: usize, off: i64, span: Option<i64>) -> (usize, usize) {
    let len = len as i64;
    let mut start = if off < 0 { len + off } else { off };
    start = start.clamp(0, len);
    let end = match span {
        None => len,
        Some(n) if n < 0 => (len + n).max(start),
        Some(n) => (start + n).min(len),
    };
    (start as usize, end.max(start) as usize)
}

/// Codepoint-indexed substring with Perl offset rules (negative counts
/// from the end; negative length stops short of the end).
#[must_use]
pub fn substr(v: Value, off: i64, span: Option<i64>) -> Value {
    let text = to_string_lossy(v);
    let chars: Vec<char> = text.chars().collect();
    let (start, end) = resolve_span(chars.len(), off, span);
    Value::from_string(chars[start..end].iter().collect())
}

/// Byte-indexed substring.
#[must_use]
pub fn substr_bytes(v: Value, off: i64, span: Option<i64>) -> Value {
    let bytes = to_str_bytes(v);
    let (start, end) = resolve_span(bytes.len(), off, span);
    Value::from_bytes(bytes[start..end].to_vec())
}

/// Byte position of the first occurrence of `needle` at or after `from`;
/// -1 when absent.
#[must_use]
pub fn index(v: Value, needle: Value, from: i64) -> i64 {
    let haystack = to_str_bytes(v);
    let needle = to_str_bytes(needle);
    let start = from.clamp(0, haystack.len() as i64) as usize;
    if needle.is_empty() {
        return start as i64;
    }
    haystack[start..]
        .windows(needle.len())
        .position(|w| w == needle.as_slice())
        .map_or(-1, |i| (start + i) as i64)
}

/// Byte position of the last occurrence of `needle` at or before `from`
/// (the end when `from` is negative); -1 when absent.
#[must_use]
pub fn rindex(v: Value, needle: Value, from: i64) -> i64 {
    let haystack = to_str_bytes(v);
    let needle = to_str_bytes(needle);
    if needle.is_empty() {
        return haystack.len() as i64;
    }
    if needle.len() > haystack.len() {
        return -1;
    }
    let limit = if from < 0 {
        haystack.len() - needle.len()
    } else {
        (from as usize).min(haystack.len() - needle.len())
    };
    (0..=limit)
        .rev()
        .find(|&i| &haystack[i..i + needle.len()] == needle.as_slice())
        .map_or(-1, |i| i as i64)
}

/// Uppercase.
#[must_use]
pub fn upper(v: Value) -> Value {
    Value::from_string(to_string_lossy(v).to_uppercase())
}

/// Lowercase.
#[must_use]
pub fn lower(v: Value) -> Value {
    Value::from_string(to_string_lossy(v).to_lowercase())
}

/// Uppercase the first character.
#[must_use]
pub fn ucfirst(v: Value) -> Value {
    let text = to_string_lossy(v);
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => {
            Value::from_string(first.to_uppercase().chain(chars).collect())
        }
        None => Value::empty_str(),
    }
}

/// Lowercase the first character.
#[must_use]
pub fn lcfirst(v: Value) -> Value {
    let text = to_string_lossy(v);
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => {
            Value::from_string(first.to_lowercase().chain(chars).collect())
        }
        None => Value::empty_str(),
    }
}

/// Strip ASCII whitespace from both ends.
#[must_use]
pub fn trim(v: Value) -> Value {
    let bytes = to_str_bytes(v);
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    Value::from_bytes(bytes[start..end].to_vec())
}

/// Strip ASCII whitespace from the front.
#[must_use]
pub fn ltrim(v: Value) -> Value {
    let bytes = to_str_bytes(v);
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    Value::from_bytes(bytes[start..].to_vec())
}

/// Strip ASCII whitespace from the back.
#[must_use]
pub fn rtrim(v: Value) -> Value {
    let bytes = to_str_bytes(v);
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(0, |i| i + 1);
    Value::from_bytes(bytes[..end].to_vec())
}

/// Reverse by codepoint.
#[must_use]
pub fn reverse(v: Value) -> Value {
    Value::from_string(to_string_lossy(v).chars().rev().collect())
}

/// Repeat `n` times; non-positive counts yield the empty string.
#[must_use]
pub fn repeat(v: Value, n: i64) -> Value {
    if n <= 0 {
        return Value::empty_str();
    }
    let bytes = to_str_bytes(v);
    Value::from_bytes(bytes.repeat(n as usize))
}

/// The character for a codepoint, UTF-8 encoded; empty for invalid
/// codepoints.
#[must_use]
pub fn chr(code: i64) -> Value {
    u32::try_from(code)
        .ok()
        .and_then(char::from_u32)
        .map_or_else(Value::empty_str, |c| Value::from_string(c.to_string()))
}

/// First codepoint; 0 for the empty string.
#[must_use]
pub fn ord(v: Value) -> i64 {
    to_string_lossy(v)
        .chars()
        .next()
        .map_or(0, |c| i64::from(u32::from(c)))
}

/// First raw byte (0..255); 0 for the empty string.
#[must_use]
pub fn ord_byte(v: Value) -> i64 {
    match v.payload() {
        Payload::Str(bytes) => bytes.first().copied().map_or(0, i64::from),
        _ => to_str_bytes(v).first().copied().map_or(0, i64::from),
    }
}

/// Raw byte at `i`; -1 when out of range.
#[must_use]
pub fn get_byte(v: Value, i: i64) -> i64 {
    let read = |bytes: &[u8]| {
        usize::try_from(i)
            .ok()
            .and_then(|i| bytes.get(i))
            .copied()
            .map_or(-1, i64::from)
    };
    match v.payload() {
        Payload::Str(bytes) => read(bytes),
        _ => read(&to_str_bytes(v)),
    }
}

/// Overwrite the byte at `i` in place, zero-extending as needed. Only
/// meaningful on a string the caller owns; non-strings are untouched.
pub fn set_byte(v: Value, i: i64, byte: u8) {
    let Ok(i) = usize::try_from(i) else {
        return;
    };
    // SAFETY: single mutator per the threading contract.
    if let Payload::Str(bytes) = unsafe { v.payload_mut() } {
        if i >= bytes.len() {
            bytes.resize(i + 1, 0);
        }
        bytes[i] = byte;
    }
}

/// Split on a literal separator; an empty separator splits into single
/// codepoints. A positive `limit` bounds the piece count, with the
/// remainder left intact in the final piece.
#[must_use]
pub fn split(v: Value, sep: Value, limit: Option<usize>) -> Value {
    let haystack = to_str_bytes(v);
    let sep = to_str_bytes(sep);
    let mut out = Sequence::new();

    if sep.is_empty() {
        let text = String::from_utf8_lossy(&haystack);
        for (n, c) in text.chars().enumerate() {
            if limit.is_some_and(|l| n + 1 >= l) {
                let rest: String = text.chars().skip(n).collect();
                out.push_take(Value::from_string(rest));
                break;
            }
            out.push_take(Value::from_string(c.to_string()));
        }
        return Value::array_from(SeqHandle::from_seq(out));
    }

    let mut start = 0;
    while start <= haystack.len() {
        if limit.is_some_and(|l| out.len() + 1 >= l) {
            break;
        }
        let found = haystack[start..]
            .windows(sep.len())
            .position(|w| w == sep.as_slice());
        match found {
            Some(at) => {
                out.push_take(Value::from_bytes(haystack[start..start + at].to_vec()));
                start += at + sep.len();
            }
            None => break,
        }
    }
    out.push_take(Value::from_bytes(haystack[start..].to_vec()));
    Value::array_from(SeqHandle::from_seq(out))
}

/// Join a sequence's elements, stringified, with a separator.
pub fn join(sep: Value, list: Value) -> Result<Value, RtError> {
    let backing = crate::seq::backing(list)
        .ok_or_else(|| throw(format!("Not an ARRAY value: {}", list.type_name())))?;
    let sep = to_str_bytes(sep);
    let mut out = Vec::new();
    for (i, v) in backing.borrow().as_slice().iter().enumerate() {
        if i > 0 {
            out.extend_from_slice(&sep);
        }
        out.extend_from_slice(&to_str_bytes(*v));
    }
    Ok(Value::from_bytes(out))
}

/// `sprintf` subset: `%s %d %f %x %o %e %g %%` with optional width (`-`
/// for left alignment, `0` for zero fill) and precision.
pub fn sprintf(fmt: Value, args: &[Value]) -> Result<Value, RtError> {
    let fmt = to_string_lossy(fmt);
    let mut out = String::new();
    let mut chars = fmt.chars().peekable();
    let mut next_arg = 0;

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        if chars.peek() == Some(&'%') {
            chars.next();
            out.push('%');
            continue;
        }

        let mut left = false;
        let mut zero = false;
        while let Some(&flag) = chars.peek() {
            match flag {
                '-' => left = true,
                '0' => zero = true,
                _ => break,
            }
            chars.next();
        }
        let mut width = 0usize;
        while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
            width = width * 10 + d as usize;
            chars.next();
        }
        let mut precision = None;
        if chars.peek() == Some(&'.') {
            chars.next();
            let mut p = 0usize;
            while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
                p = p * 10 + d as usize;
                chars.next();
            }
            precision = Some(p);
        }

        let code = chars
            .next()
            .ok_or_else(|| throw("sprintf: format ends inside a conversion"))?;
        let arg = args.get(next_arg).copied().unwrap_or_else(Value::undef);
        next_arg += 1;

        let piece = match code {
            's' => {
                let mut s = to_string_lossy(arg);
                if let Some(p) = precision {
                    s = s.chars().take(p).collect();
                }
                s
            }
            'd' | 'i' => crate::value::to_int(arg).to_string(),
            'x' => format!("{:x}", crate::value::to_int(arg)),
            'X' => format!("{:X}", crate::value::to_int(arg)),
            'o' => format!("{:o}", crate::value::to_int(arg)),
            'b' => format!("{:b}", crate::value::to_int(arg)),
            'c' => {
                let ch = chr(crate::value::to_int(arg));
                let s = to_string_lossy(ch);
                ch.decref();
                s
            }
            'f' => format!("{:.*}", precision.unwrap_or(6), crate::value::to_num(arg)),
            'e' => format!("{:.*e}", precision.unwrap_or(6), crate::value::to_num(arg)),
            'g' => {
                let n = crate::value::to_num(arg);
                if n != 0.0 && (n.abs() >= 1e15 || n.abs() < 1e-4) {
                    format!("{n:e}")
                } else {
                    let tmp = Value::num(n);
                    let s = to_string_lossy(tmp);
                    tmp.decref();
                    s
                }
            }
            _ => return Err(throw(format!("sprintf: unknown conversion \"%{code}\""))),
        };

        if piece.len() >= width {
            out.push_str(&piece);
        } else if left {
            out.push_str(&piece);
            out.push_str(&" ".repeat(width - piece.len()));
        } else if zero && matches!(code, 'd' | 'i' | 'x' | 'X' | 'o' | 'b' | 'f' | 'e') {
            let (sign, rest) = match piece.strip_prefix('-') {
                Some(rest) => ("-", rest),
                None => ("", piece.as_str()),
            };
            out.push_str(sign);
            out.push_str(&"0".repeat(width - piece.len()));
            out.push_str(rest);
        } else {
            out.push_str(&" ".repeat(width - piece.len()));
            out.push_str(&piece);
        }
    }

    Ok(Value::from_string(out))
}

/// A new string-builder value for compiler-emitted accumulation loops.
#[must_use]
pub fn builder_new() -> Value {
    Value::cpointer(crate::value::CPointer::StringBuilder(Vec::new()))
}

/// Append a value's string form to a builder.
pub fn builder_append(builder: Value, v: Value) -> Result<(), RtError> {
    let bytes = to_str_bytes(v);
    // SAFETY: single mutator per the threading contract.
    match unsafe { builder.payload_mut() } {
        Payload::CPointer(crate::value::CPointer::StringBuilder(buf)) => {
            buf.extend_from_slice(&bytes);
            Ok(())
        }
        _ => Err(throw(format!(
            "Not a string-builder value: {}",
            builder.type_name()
        ))),
    }
}

/// Take the accumulated bytes out of a builder as a fresh string value,
/// leaving the builder empty.
pub fn builder_finish(builder: Value) -> Result<Value, RtError> {
    // SAFETY: single mutator per the threading contract.
    match unsafe { builder.payload_mut() } {
        Payload::CPointer(crate::value::CPointer::StringBuilder(buf)) => {
            Ok(Value::from_bytes(std::mem::take(buf)))
        }
        _ => Err(throw(format!(
            "Not a string-builder value: {}",
            builder.type_name()
        ))),
    }
}

/// RFC 4648 base64 with `=` padding.
#[must_use]
pub fn base64_encode(v: Value) -> Value {
    Value::from_string(base64::encode(to_str_bytes(v)))
}

/// Decode RFC 4648 base64; raises on malformed input.
pub fn base64_decode(v: Value) -> Result<Value, RtError> {
    let text = to_string_lossy(v);
    base64::decode(text.trim_end())
        .map(Value::from_bytes)
        .map_err(|e| throw(format!("invalid base64: {e}")))
}

/// Parse a hex string (optional `0x` prefix) into an integer; invalid input
/// reads as 0.
#[must_use]
pub fn hex(v: Value) -> i64 {
    let text = to_string_lossy(v);
    let digits = text
        .trim()
        .trim_start_matches("0x")
        .trim_start_matches("0X");
    i64::from_str_radix(digits, 16).unwrap_or(0)
}
