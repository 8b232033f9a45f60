// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Binary pack/unpack.
//!
//! Format alphabet: `c C` signed/unsigned byte, `s S` native short, `n v`
//! big/little-endian 16-bit, `l L` native 32-bit, `N V` big/little-endian
//! 32-bit, `q Q` native 64-bit, `a A` null/space-padded bytes, `H` hex
//! nibbles (high first), `x` zero pad / skip, `X` back up, `@` absolute
//! position (unpack). Repeat counts and `*` apply.

use byteorder::{BigEndian, ByteOrder, LittleEndian, NativeEndian};

use crate::except::{RtError, throw};
use crate::seq::{SeqHandle, Sequence};
use crate::value::{Value, to_int, to_str_bytes};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Count {
    Exact(usize),
    /// `*`: whatever remains.
    All,
}

struct FormatItem {
    code: u8,
    count: Count,
}

fn parse_format(fmt: &str) -> Result<Vec<FormatItem>, RtError> {
    let bytes = fmt.as_bytes();
    let mut items = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let code = bytes[i];
        i += 1;
        if code.is_ascii_whitespace() {
            continue;
        }
        if !b"cCsSnvlLNVqQaAHxX@".contains(&code) {
            return Err(throw(format!(
                "pack: unknown format character \"{}\"",
                code as char
            )));
        }
        let count = if i < bytes.len() && bytes[i] == b'*' {
            i += 1;
            Count::All
        } else {
            let mut n: Option<usize> = None;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                n = Some(n.unwrap_or(0) * 10 + usize::from(bytes[i] - b'0'));
                i += 1;
            }
            Count::Exact(n.unwrap_or(1))
        };
        items.push(FormatItem { code, count });
    }
    Ok(items)
}

fn hex_digit(b: u8) -> Result<u8, RtError> {
    match b {
        b'0'..=b'9' => Ok(b - b'0'),
        b'a'..=b'f' => Ok(b - b'a' + 10),
        b'A'..=b'F' => Ok(b - b'A' + 10),
        _ => Err(throw(format!("pack: bad hex digit \"{}\"", b as char))),
    }
}

/// Pack `args` per `fmt` into a fresh string value.
pub fn pack(fmt: &str, args: &[Value]) -> Result<Value, RtError> {
    let mut out: Vec<u8> = Vec::new();
    let mut next = 0usize;
    let take = |next: &mut usize| {
        let v = args.get(*next).copied().unwrap_or_else(Value::undef);
        *next += 1;
        v
    };

    for item in parse_format(fmt)? {
        match item.code {
            b'c' | b'C' => {
                let n = numeric_count(item.count, args.len() - next.min(args.len()));
                for _ in 0..n {
                    out.push(to_int(take(&mut next)) as u8);
                }
            }
            b's' | b'S' => {
                let n = numeric_count(item.count, args.len() - next.min(args.len()));
                for _ in 0..n {
                    let mut buf = [0u8; 2];
                    NativeEndian::write_u16(&mut buf, to_int(take(&mut next)) as u16);
                    out.extend_from_slice(&buf);
                }
            }
            b'n' | b'v' => {
                let n = numeric_count(item.count, args.len() - next.min(args.len()));
                for _ in 0..n {
                    let mut buf = [0u8; 2];
                    let value = to_int(take(&mut next)) as u16;
                    if item.code == b'n' {
                        BigEndian::write_u16(&mut buf, value);
                    } else {
                        LittleEndian::write_u16(&mut buf, value);
                    }
                    out.extend_from_slice(&buf);
                }
            }
            b'l' | b'L' => {
                let n = numeric_count(item.count, args.len() - next.min(args.len()));
                for _ in 0..n {
                    let mut buf = [0u8; 4];
                    NativeEndian::write_u32(&mut buf, to_int(take(&mut next)) as u32);
                    out.extend_from_slice(&buf);
                }
            }
            b'N' | b'V' => {
                let n = numeric_count(item.count, args.len() - next.min(args.len()));
                for _ in 0..n {
                    let mut buf = [0u8; 4];
                    let value = to_int(take(&mut next)) as u32;
                    if item.code == b'N' {
                        BigEndian::write_u32(&mut buf, value);
                    } else {
                        LittleEndian::write_u32(&mut buf, value);
                    }
                    out.extend_from_slice(&buf);
                }
            }
            b'q' | b'Q' => {
                let n = numeric_count(item.count, args.len() - next.min(args.len()));
                for _ in 0..n {
                    let mut buf = [0u8; 8];
                    NativeEndian::write_u64(&mut buf, to_int(take(&mut next)) as u64);
                    out.extend_from_slice(&buf);
                }
            }
            b'a' | b'A' => {
                let bytes = to_str_bytes(take(&mut next));
                match item.count {
                    Count::All => out.extend_from_slice(&bytes),
                    Count::Exact(width) => {
                        let used = bytes.len().min(width);
                        out.extend_from_slice(&bytes[..used]);
                        let pad = if item.code == b'a' { 0 } else { b' ' };
                        out.resize(out.len() + width - used, pad);
                    }
                }
            }
            b'H' => {
                let digits = to_str_bytes(take(&mut next));
                let nibbles = match item.count {
                    Count::All => digits.len(),
                    Count::Exact(n) => n.min(digits.len()),
                };
                let mut pair = 0u8;
                for (i, &d) in digits[..nibbles].iter().enumerate() {
                    let nibble = hex_digit(d)?;
                    if i % 2 == 0 {
                        pair = nibble << 4;
                    } else {
                        out.push(pair | nibble);
                    }
                }
                if nibbles % 2 == 1 {
                    out.push(pair);
                }
            }
            b'x' => {
                let n = match item.count {
                    Count::All => 1,
                    Count::Exact(n) => n,
                };
                out.resize(out.len() + n, 0);
            }
            b'X' => {
                let n = match item.count {
                    Count::All => out.len(),
                    Count::Exact(n) => n,
                };
                out.truncate(out.len().saturating_sub(n));
            }
            b'@' => {
                let at = match item.count {
                    Count::All => out.len(),
                    Count::Exact(n) => n,
                };
                out.resize(at, 0);
            }
            _ => unreachable!("format already validated"),
        }
    }
    Ok(Value::from_bytes(out))
}

fn numeric_count(count: Count, remaining_args: usize) -> usize {
    match count {
        Count::Exact(n) => n,
        Count::All => remaining_args,
    }
}

/// Unpack `data` per `fmt` into a fresh sequence value.
pub fn unpack(fmt: &str, data: &[u8]) -> Result<Value, RtError> {
    let mut out = Sequence::new();
    let mut pos = 0usize;

    for item in parse_format(fmt)? {
        match item.code {
            b'c' | b'C' | b's' | b'S' | b'n' | b'v' | b'l' | b'L' | b'N' | b'V' | b'q'
            | b'Q' => {
                let width = match item.code {
                    b'c' | b'C' => 1,
                    b's' | b'S' | b'n' | b'v' => 2,
                    b'l' | b'L' | b'N' | b'V' => 4,
                    _ => 8,
                };
                let n = match item.count {
                    Count::Exact(n) => n,
                    Count::All => (data.len() - pos.min(data.len())) / width,
                };
                for _ in 0..n {
                    if pos + width > data.len() {
                        return Err(throw("unpack: data ran out"));
                    }
                    let field = &data[pos..pos + width];
                    pos += width;
                    let value = match item.code {
                        b'c' => i64::from(field[0] as i8),
                        b'C' => i64::from(field[0]),
                        b's' => i64::from(NativeEndian::read_i16(field)),
                        b'S' => i64::from(NativeEndian::read_u16(field)),
                        b'n' => i64::from(BigEndian::read_u16(field)),
                        b'v' => i64::from(LittleEndian::read_u16(field)),
                        b'l' => i64::from(NativeEndian::read_i32(field)),
                        b'L' => i64::from(NativeEndian::read_u32(field)),
                        b'N' => i64::from(BigEndian::read_u32(field)),
                        b'V' => i64::from(LittleEndian::read_u32(field)),
                        b'q' => NativeEndian::read_i64(field),
                        _ => NativeEndian::read_u64(field) as i64,
                    };
                    out.push_take(Value::int(value));
                }
            }
            b'a' | b'A' => {
                let width = match item.count {
                    Count::Exact(n) => n.min(data.len() - pos.min(data.len())),
                    Count::All => data.len() - pos.min(data.len()),
                };
                let mut field = data[pos..pos + width].to_vec();
                pos += width;
                if item.code == b'A' {
                    while field.last().is_some_and(|&b| b == b' ' || b == 0) {
                        field.pop();
                    }
                }
                out.push_take(Value::from_bytes(field));
            }
            b'H' => {
                let nibbles = match item.count {
                    Count::Exact(n) => n.min((data.len() - pos.min(data.len())) * 2),
                    Count::All => (data.len() - pos.min(data.len())) * 2,
                };
                let mut text = String::with_capacity(nibbles);
                for i in 0..nibbles {
                    let byte = data[pos + i / 2];
                    let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0F };
                    text.push(char::from_digit(u32::from(nibble), 16).unwrap_or('0'));
                }
                pos += nibbles.div_ceil(2);
                out.push_take(Value::from_string(text));
            }
            b'x' => {
                let n = match item.count {
                    Count::All => data.len() - pos.min(data.len()),
                    Count::Exact(n) => n,
                };
                if pos + n > data.len() {
                    return Err(throw("unpack: skip past end of data"));
                }
                pos += n;
            }
            b'X' => {
                let n = match item.count {
                    Count::All => pos,
                    Count::Exact(n) => n,
                };
                pos = pos.saturating_sub(n);
            }
            b'@' => {
                let at = match item.count {
                    Count::All => data.len(),
                    Count::Exact(n) => n,
                };
                if at > data.len() {
                    return Err(throw("unpack: position past end of data"));
                }
                pos = at;
            }
            _ => unreachable!("format already validated"),
        }
    }
    Ok(Value::array_from(SeqHandle::from_seq(out)))
}
