// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! # Strand runtime
//!
//! Core runtime for the Strand language. Compiled Strand programs link
//! against this crate for:
//! - reference-counted tagged values with cold metadata records
//! - dynamic containers (deque-backed sequence, chained-bucket map)
//! - binary-safe strings, pack/unpack, and base64
//! - references, weak references, and the target-death registry
//! - blessed-reference dispatch with multiple inheritance, method
//!   modifiers, and operator overloading
//! - a worker pool with futures, channels, atomics, and language-level
//!   mutexes
//! - exception propagation, dynamic scoping, and file-handle lifecycle
//!
//! ## Threading contract
//!
//! Values may be handed between threads through channels and futures, but
//! a cell must not be mutated concurrently with any other access; only
//! atomics, futures, channels, and mutexes synchronize. Refcount updates
//! switch to sequentially consistent atomics the first time the pool
//! starts, and never switch back.

pub mod context;
pub mod except;
pub mod handle;
pub mod heap;
pub mod intern;
pub mod map;
pub mod oop;
pub mod refs;
pub mod scope;
pub mod seq;
pub mod strings;
pub mod task;
pub mod tie;
pub mod value;

// Re-export the types nearly every caller needs.
pub use except::RtError;
pub use intern::Interned;
pub use map::{Map, MapHandle};
pub use seq::{SeqHandle, Sequence};
pub use value::{Payload, Tag, Value};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
