// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Interned byte strings.
//!
//! Short map keys, package names, method names, and operator tokens are
//! stored once in a process-wide pool and referenced through [`Interned`]
//! handles. Handles compare by pointer, which is what the dispatch caches
//! key on.
//!
//! Entries are retained for the lifetime of the process. Releasing an
//! interned name is a logical no-op; the population is bounded (map keys up
//! to [`INTERN_MAX_LEN`] bytes plus identifier names), so retention is not a
//! leak in practice.
//!
//! Thread safety: the pool is guarded by a single mutex. Lookups of already
//! interned names still pay for the lock; callers that care hold on to the
//! `Interned` handle instead of re-interning.

#[cfg(test)]
mod mod_test;

use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

use once_cell::sync::Lazy;

/// Keys longer than this are stored per-entry instead of interned.
pub const INTERN_MAX_LEN: usize = 64;

static POOL: Lazy<Mutex<HashSet<&'static [u8]>>> = Lazy::new(|| Mutex::new(HashSet::new()));

/// Handle to an interned byte string.
///
/// Two handles created from equal bytes point at the same allocation, so
/// equality and hashing work on the pointer alone.
#[derive(Clone, Copy)]
pub struct Interned {
    bytes: &'static [u8],
}

impl Interned {
    /// The interned bytes.
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &'static [u8] {
        self.bytes
    }

    /// Length of the interned bytes.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the interned string is empty.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The interned bytes as text. Names are expected to be UTF-8; binary
    /// map keys fall back to a lossy rendering.
    #[must_use]
    pub fn display(&self) -> Cow<'static, str> {
        String::from_utf8_lossy(self.bytes)
    }
}

impl PartialEq for Interned {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        // Pool guarantees one allocation per distinct byte string.
        std::ptr::eq(self.bytes.as_ptr(), other.bytes.as_ptr())
    }
}

impl Eq for Interned {}

impl Hash for Interned {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (self.bytes.as_ptr() as usize).hash(state);
    }
}

impl fmt::Debug for Interned {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Interned({:?})", self.display())
    }
}

/// Intern a byte string, returning its pooled handle.
pub fn intern(bytes: &[u8]) -> Interned {
    let mut pool = POOL.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    if let Some(existing) = pool.get(bytes) {
        return Interned { bytes: existing };
    }

    let leaked: &'static [u8] = Box::leak(bytes.to_vec().into_boxed_slice());
    pool.insert(leaked);
    Interned { bytes: leaked }
}

/// Intern a text string.
#[inline]
pub fn intern_str(s: &str) -> Interned {
    intern(s.as_bytes())
}

/// Release an interned name.
///
/// The pool retains entries for the process lifetime, so this only exists to
/// keep acquire/release pairing visible at call sites.
#[inline]
pub fn release(_name: Interned) {}
