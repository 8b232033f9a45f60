// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Detached metadata record for cold cell fields.
//!
//! Most values never need a blessed package, a tie delegate, or a weak
//! flag, so those fields live behind an optional pointer on the cell.
//! Accessors treat a missing record as "every field unset".

use crate::intern::Interned;
use crate::value::Value;

/// Cold fields of a value cell, allocated on first need.
#[derive(Default)]
pub struct Meta {
    /// Package this value is blessed into, when it is an object.
    pub blessed: Option<Interned>,
    /// Struct name for C-struct wrappers and tagged pointer owners.
    pub struct_name: Option<Interned>,
    /// Tie delegate; presence means the container is tied.
    pub tied: Option<Value>,
    /// Whether a reference cell is weak.
    pub weak: bool,
    /// Guards DESTROY against recursive entry.
    pub destroy_running: bool,
}

impl Meta {
    /// Clear every field so the record can be recycled.
    pub(crate) fn reset(&mut self) {
        self.blessed = None;
        self.struct_name = None;
        self.tied = None;
        self.weak = false;
        self.destroy_running = false;
    }

    /// Whether every field is unset.
    #[must_use]
    pub(crate) fn is_clear(&self) -> bool {
        self.blessed.is_none()
            && self.struct_name.is_none()
            && self.tied.is_none()
            && !self.weak
            && !self.destroy_running
    }
}
