// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! File-handle lifecycle.
//!
//! A handle's kind is a sum type owned by its value cell, so closing routes
//! to the right disposal without any side table:
//! - `Normal` closes the stream;
//! - `Pipe` closes the child's stdin and waits for it (pipe-close);
//! - `MemRead` frees the backing buffer;
//! - `MemWrite` frees the accumulated buffer;
//! - `MemWriteRef` writes the accumulated bytes back through a captured
//!   reference, then frees the buffer and releases the reference.
//!
//! Close runs at most once; an explicit `close` wins over the one the free
//! cascade performs. The rich buffered I/O surface lives outside the core;
//! what is here is what the lifecycle contract and the memory-backed kinds
//! need.

#[cfg(test)]
mod mod_test;

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::net::TcpStream;
use std::process::{Child, Command, Stdio};

use crate::except::{RtError, throw};
use crate::refs;
use crate::value::{Payload, Value};

/// Direction of a pipe handle.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PipeMode {
    /// Reading from the child's stdout.
    Read,
    /// Writing to the child's stdin.
    Write,
}

/// A file handle and its kind-specific state.
pub enum FileHandle {
    /// Plain stream.
    Normal(Option<File>),
    /// Child process stream from a pipe open.
    Pipe {
        child: Option<Child>,
        mode: PipeMode,
    },
    /// Reads from a caller-supplied buffer.
    MemRead { buf: Vec<u8>, pos: usize },
    /// Accumulates writes in memory.
    MemWrite { buf: Vec<u8> },
    /// Accumulates writes and flushes them into a string variable (captured
    /// by reference) on close.
    MemWriteRef {
        buf: Vec<u8>,
        target: Option<Value>,
    },
}

impl FileHandle {
    /// Close the handle through its kind-specific path. Safe to call more
    /// than once; later calls are no-ops.
    pub fn close(&mut self) -> Result<(), RtError> {
        match self {
            Self::Normal(file) => {
                drop(file.take());
                Ok(())
            }
            Self::Pipe { child, .. } => {
                if let Some(mut child) = child.take() {
                    // Dropping stdin signals EOF before the wait.
                    drop(child.stdin.take());
                    child
                        .wait()
                        .map_err(|e| throw(format!("pipe close failed: {e}")))?;
                }
                Ok(())
            }
            Self::MemRead { buf, pos } => {
                *buf = Vec::new();
                *pos = 0;
                Ok(())
            }
            Self::MemWrite { buf } => {
                *buf = Vec::new();
                Ok(())
            }
            Self::MemWriteRef { buf, target } => {
                let bytes = std::mem::take(buf);
                if let Some(target) = target.take() {
                    refs::deref_set(target, Value::from_bytes(bytes));
                    target.decref();
                }
                Ok(())
            }
        }
    }
}

impl Drop for FileHandle {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            log::debug!("file handle close failed in drop: {err}");
        }
    }
}

/// Buffered socket: a stream plus read/write buffers. Freeing flushes the
/// write buffer and closes the descriptor.
pub struct SocketHandle {
    stream: Option<TcpStream>,
    read_buf: Vec<u8>,
    write_buf: Vec<u8>,
}

impl SocketHandle {
    /// Wrap a connected stream.
    #[must_use]
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream: Some(stream),
            read_buf: Vec::new(),
            write_buf: Vec::new(),
        }
    }

    /// Queue bytes for writing.
    pub fn buffer_write(&mut self, bytes: &[u8]) {
        self.write_buf.extend_from_slice(bytes);
    }

    /// Flush queued writes to the stream.
    pub fn flush(&mut self) -> std::io::Result<()> {
        if let Some(stream) = self.stream.as_mut() {
            if !self.write_buf.is_empty() {
                stream.write_all(&self.write_buf)?;
                self.write_buf.clear();
            }
            stream.flush()?;
        }
        Ok(())
    }

    /// Bytes buffered for reading.
    #[must_use]
    pub fn read_buffer(&self) -> &[u8] {
        &self.read_buf
    }
}

impl Drop for SocketHandle {
    fn drop(&mut self) {
        if let Err(err) = self.flush() {
            log::debug!("socket flush failed in drop: {err}");
        }
        drop(self.stream.take());
    }
}

/// Open a file by Perl-style mode (`"<"`, `">"`, `">>"`, `"+<"`), returning
/// a FILEHANDLE value.
pub fn open_file(path: &str, mode: &str) -> Result<Value, RtError> {
    let mut options = OpenOptions::new();
    match mode {
        "<" => options.read(true),
        ">" => options.write(true).create(true).truncate(true),
        ">>" => options.append(true).create(true),
        "+<" => options.read(true).write(true),
        _ => return Err(throw(format!("Unknown open mode \"{mode}\""))),
    };
    let file = options
        .open(path)
        .map_err(|e| throw(format!("Can't open \"{path}\": {e}")))?;
    Ok(Value::filehandle(FileHandle::Normal(Some(file))))
}

/// Launch `command` through the shell with one end piped, returning a
/// FILEHANDLE value that pipe-closes.
pub fn open_pipe(command: &str, mode: PipeMode) -> Result<Value, RtError> {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    match mode {
        PipeMode::Read => cmd.stdout(Stdio::piped()),
        PipeMode::Write => cmd.stdin(Stdio::piped()),
    };
    let child = cmd
        .spawn()
        .map_err(|e| throw(format!("Can't start \"{command}\": {e}")))?;
    Ok(Value::filehandle(FileHandle::Pipe {
        child: Some(child),
        mode,
    }))
}

/// A handle reading from an in-memory buffer.
#[must_use]
pub fn open_mem_read(buf: Vec<u8>) -> Value {
    Value::filehandle(FileHandle::MemRead { buf, pos: 0 })
}

/// A handle accumulating writes in memory.
#[must_use]
pub fn open_mem_write() -> Value {
    Value::filehandle(FileHandle::MemWrite { buf: Vec::new() })
}

/// A handle that writes its accumulated bytes into the scalar behind
/// `target` (one reference donated) when closed.
#[must_use]
pub fn open_mem_write_ref(target: Value) -> Value {
    Value::filehandle(FileHandle::MemWriteRef {
        buf: Vec::new(),
        target: Some(target),
    })
}

fn with_handle<R>(
    fh: Value,
    f: impl FnOnce(&mut FileHandle) -> Result<R, RtError>,
) -> Result<R, RtError> {
    // SAFETY: single mutator per the threading contract.
    match unsafe { fh.payload_mut() } {
        Payload::FileHandle(handle) => f(handle),
        _ => Err(throw(format!("Not a FILEHANDLE value: {}", fh.type_name()))),
    }
}

/// Write bytes to a handle value.
pub fn write_bytes(fh: Value, bytes: &[u8]) -> Result<(), RtError> {
    with_handle(fh, |handle| match handle {
        FileHandle::Normal(Some(file)) => file
            .write_all(bytes)
            .map_err(|e| throw(format!("write failed: {e}"))),
        FileHandle::Pipe {
            child: Some(child),
            mode: PipeMode::Write,
        } => child
            .stdin
            .as_mut()
            .ok_or_else(|| throw("pipe has no stdin"))?
            .write_all(bytes)
            .map_err(|e| throw(format!("write failed: {e}"))),
        FileHandle::MemWrite { buf } | FileHandle::MemWriteRef { buf, .. } => {
            buf.extend_from_slice(bytes);
            Ok(())
        }
        _ => Err(throw("write on a read-only or closed handle")),
    })
}

/// Read everything remaining from a handle value, as a string value.
pub fn read_all(fh: Value) -> Result<Value, RtError> {
    with_handle(fh, |handle| {
        let mut out = Vec::new();
        match handle {
            FileHandle::Normal(Some(file)) => {
                file.read_to_end(&mut out)
                    .map_err(|e| throw(format!("read failed: {e}")))?;
            }
            FileHandle::Pipe {
                child: Some(child),
                mode: PipeMode::Read,
            } => {
                child
                    .stdout
                    .as_mut()
                    .ok_or_else(|| throw("pipe has no stdout"))?
                    .read_to_end(&mut out)
                    .map_err(|e| throw(format!("read failed: {e}")))?;
            }
            FileHandle::MemRead { buf, pos } => {
                out.extend_from_slice(&buf[*pos..]);
                *pos = buf.len();
            }
            _ => return Err(throw("read on a write-only or closed handle")),
        }
        Ok(Value::from_bytes(out))
    })
}

/// Read one line (including the newline) from a handle value; undef at end
/// of stream.
pub fn read_line(fh: Value) -> Result<Value, RtError> {
    with_handle(fh, |handle| match handle {
        FileHandle::MemRead { buf, pos } => {
            if *pos >= buf.len() {
                return Ok(Value::undef());
            }
            let rest = &buf[*pos..];
            let end = rest
                .iter()
                .position(|&b| b == b'\n')
                .map_or(rest.len(), |i| i + 1);
            let line = rest[..end].to_vec();
            *pos += end;
            Ok(Value::from_bytes(line))
        }
        FileHandle::Normal(Some(file)) => read_line_bytewise(file),
        FileHandle::Pipe {
            child: Some(child),
            mode: PipeMode::Read,
        } => {
            let stdout = child
                .stdout
                .as_mut()
                .ok_or_else(|| throw("pipe has no stdout"))?;
            read_line_bytewise(stdout)
        }
        _ => Err(throw("read on a write-only or closed handle")),
    })
}

fn read_line_bytewise(reader: &mut impl Read) -> Result<Value, RtError> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        match reader.read(&mut byte) {
            Ok(0) => break,
            Ok(_) => {
                line.push(byte[0]);
                if byte[0] == b'\n' {
                    break;
                }
            }
            Err(e) => return Err(throw(format!("read failed: {e}"))),
        }
    }
    if line.is_empty() {
        Ok(Value::undef())
    } else {
        Ok(Value::from_bytes(line))
    }
}

/// Close a handle value through its kind-specific path.
pub fn close(fh: Value) -> Result<(), RtError> {
    with_handle(fh, FileHandle::close)
}
