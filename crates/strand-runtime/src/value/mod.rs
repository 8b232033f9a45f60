// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Value representation for the Strand language.
//!
//! A value is a reference-counted tagged heap cell. Hot fields (tag,
//! refcount, payload) sit inline; cold fields (blessed package, tie
//! delegate, weak flag) live behind an optional metadata record.
//!
//! [`Value`] is a `Copy` handle over the cell pointer. Generated code owns
//! the refcount discipline: storing a value increments, removing it
//! decrements, and on replacement the new value is incremented before the
//! old one is decremented because the two may alias.
//!
//! Thread safety: cells may be handed between threads through channels and
//! futures, but a cell's payload must not be mutated concurrently with any
//! other access. Refcounts switch to atomic updates the first time a worker
//! pool starts.

#[cfg(test)]
mod coerce_test;

mod closure;
mod coerce;
mod free;
mod meta;

pub use closure::{CapturedFn, Closure, NativeFn, closure_call};
pub use coerce::{to_bool, to_int, to_num, to_str_bytes, to_str_value, to_string_lossy};
pub use meta::Meta;

pub(crate) use closure::clone_closure;
pub(crate) use free::release_payload;

use std::any::Any;
use std::cell::UnsafeCell;
use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;
use std::sync::atomic::AtomicI64;

use crate::handle::{FileHandle, SocketHandle};
use crate::heap::{self, RefCount};
use crate::intern::Interned;
use crate::map::MapHandle;
use crate::seq::SeqHandle;
use crate::task::channel::RtChannel;
use crate::task::future::RtFuture;
use crate::task::sync::{RtCond, RtMutex};

/// Value type tag.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum Tag {
    Undef = 0,
    Int = 1,
    Num = 2,
    Str = 3,
    Array = 4,
    Hash = 5,
    Ref = 6,
    FileHandle = 7,
    Regex = 8,
    Socket = 9,
    CStruct = 10,
    CPointer = 11,
    Closure = 12,
    Future = 13,
    Channel = 14,
    Atomic = 15,
}

/// Named C-pointer subtypes with their own teardown.
pub enum CPointer {
    /// An opaque pointer owned elsewhere; freeing is the owner's problem.
    Raw(usize),
    /// Accumulating byte builder.
    StringBuilder(Vec<u8>),
    /// Language-level mutex.
    Mutex(Arc<RtMutex>),
    /// Language-level condition variable.
    Cond(Arc<RtCond>),
}

/// Payload union of a value cell.
pub enum Payload {
    Undef,
    /// 64-bit signed integer.
    Int(i64),
    /// IEEE-754 double.
    Num(f64),
    /// Binary-safe byte string; the length is the vector length, embedded
    /// NULs are data.
    Str(Vec<u8>),
    /// Ordered sequence, shared through its own refcount.
    Array(SeqHandle),
    /// Keyed map, shared through its own refcount.
    Hash(MapHandle),
    /// Reference target. `None` after a weak reference's target died.
    Ref(Option<Value>),
    /// File handle with per-kind close routing.
    FileHandle(FileHandle),
    /// Opaque compiled pattern owned by the regex adapter; drop releases it.
    Regex(Box<dyn Any + Send>),
    /// Buffered socket.
    Socket(SocketHandle),
    /// Raw struct backing block.
    CStruct(Vec<u8>),
    /// Named pointer subtypes.
    CPointer(CPointer),
    /// Closure record.
    Closure(Closure),
    /// Eventual result of a pool task.
    Future(Arc<RtFuture>),
    /// FIFO queue between threads.
    Channel(Arc<RtChannel>),
    /// Lock-free 64-bit cell.
    Atomic(AtomicI64),
}

impl Payload {
    /// Tag of this payload.
    #[must_use]
    pub const fn tag(&self) -> Tag {
        match self {
            Self::Undef => Tag::Undef,
            Self::Int(_) => Tag::Int,
            Self::Num(_) => Tag::Num,
            Self::Str(_) => Tag::Str,
            Self::Array(_) => Tag::Array,
            Self::Hash(_) => Tag::Hash,
            Self::Ref(_) => Tag::Ref,
            Self::FileHandle(_) => Tag::FileHandle,
            Self::Regex(_) => Tag::Regex,
            Self::Socket(_) => Tag::Socket,
            Self::CStruct(_) => Tag::CStruct,
            Self::CPointer(_) => Tag::CPointer,
            Self::Closure(_) => Tag::Closure,
            Self::Future(_) => Tag::Future,
            Self::Channel(_) => Tag::Channel,
            Self::Atomic(_) => Tag::Atomic,
        }
    }
}

/// A value cell: refcount, payload, optional cold metadata.
pub struct RtCell {
    refcount: RefCount,
    payload: UnsafeCell<Payload>,
    meta: UnsafeCell<Option<Box<Meta>>>,
}

// SAFETY: cells are shared between threads only through channels, futures,
// and the immortal singletons. The runtime's contract (section on threading
// in the crate docs) forbids concurrent payload mutation; refcounts are
// atomic once threading starts.
unsafe impl Send for RtCell {}
unsafe impl Sync for RtCell {}

impl RtCell {
    /// A cell starting with refcount 1.
    #[must_use]
    pub fn new(payload: Payload) -> Self {
        Self {
            refcount: RefCount::new(1),
            payload: UnsafeCell::new(payload),
            meta: UnsafeCell::new(None),
        }
    }

    /// An immortal cell (small-int pool, singletons).
    #[must_use]
    pub fn immortal(payload: Payload) -> Self {
        Self {
            refcount: RefCount::immortal(),
            payload: UnsafeCell::new(payload),
            meta: UnsafeCell::new(None),
        }
    }
}

/// Handle to a value cell.
#[derive(Clone, Copy)]
pub struct Value {
    cell: NonNull<RtCell>,
}

// SAFETY: see RtCell. The handle itself is just a pointer.
unsafe impl Send for Value {}
unsafe impl Sync for Value {}

impl Value {
    /// Wrap a cell pointer.
    #[inline]
    pub(crate) const fn from_cell(cell: NonNull<RtCell>) -> Self {
        Self { cell }
    }

    #[inline]
    fn cell(&self) -> &RtCell {
        // SAFETY: a live handle implies a live cell; the refcount discipline
        // keeps the cell allocated while any handle exists.
        unsafe { self.cell.as_ref() }
    }

    #[inline]
    pub(crate) const fn cell_ptr(&self) -> NonNull<RtCell> {
        self.cell
    }

    /// Cell address, used as the weak-registry key.
    #[inline]
    #[must_use]
    pub fn addr(&self) -> usize {
        self.cell.as_ptr() as usize
    }

    /// Whether two handles point at the same cell.
    #[inline]
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.cell == other.cell
    }

    /// Borrow the payload.
    #[inline]
    pub(crate) fn payload(&self) -> &Payload {
        // SAFETY: no concurrent mutation per the threading contract.
        unsafe { &*self.cell().payload.get() }
    }

    /// Mutably borrow the payload.
    ///
    /// # Safety
    ///
    /// The caller must be the only code touching this cell's payload for the
    /// duration of the borrow; the runtime never mutates a payload that
    /// another thread may be reading.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn payload_mut(&self) -> &mut Payload {
        // SAFETY: contract above.
        unsafe { &mut *self.cell().payload.get() }
    }

    /// Value type tag.
    #[inline]
    #[must_use]
    pub fn tag(&self) -> Tag {
        self.payload().tag()
    }

    /// Current reference count.
    #[inline]
    #[must_use]
    pub fn refcount(&self) -> i32 {
        self.cell().refcount.get()
    }

    /// Whether this cell is an immortal singleton.
    #[inline]
    #[must_use]
    pub fn is_immortal(&self) -> bool {
        self.cell().refcount.is_immortal()
    }

    /// Increment the reference count. Returns the handle for chaining.
    #[inline]
    pub fn incref(self) -> Self {
        self.cell().refcount.inc();
        self
    }

    /// Decrement the reference count, freeing the cell at zero.
    #[inline]
    pub fn decref(self) {
        if self.cell().refcount.dec() {
            free::free_value(self);
        }
    }

    /// Force the raw count; only the free cascade uses this to keep the
    /// object alive across its DESTROY call.
    #[inline]
    pub(crate) fn set_refcount_raw(&self, n: i32) {
        self.cell().refcount.set_raw(n);
    }

    // --- metadata ---

    #[inline]
    fn meta(&self) -> Option<&Meta> {
        // SAFETY: no concurrent mutation per the threading contract.
        unsafe { (*self.cell().meta.get()).as_deref() }
    }

    /// Borrow the metadata record, allocating it on first use.
    pub(crate) fn ensure_meta(&self) -> &mut Meta {
        // SAFETY: single mutator per the threading contract.
        let slot = unsafe { &mut *self.cell().meta.get() };
        if slot.is_none() {
            *slot = Some(heap::alloc_meta());
        }
        slot.as_deref_mut().expect("metadata just allocated")
    }

    /// Detach the metadata record, leaving the cell without one.
    pub(crate) fn take_meta(&self) -> Option<Box<Meta>> {
        // SAFETY: single mutator per the threading contract.
        unsafe { (*self.cell().meta.get()).take() }
    }

    /// Mutably borrow the metadata record when one exists.
    pub(crate) fn meta_opt_mut(&self) -> Option<&mut Meta> {
        // SAFETY: single mutator per the threading contract.
        unsafe { (*self.cell().meta.get()).as_deref_mut() }
    }

    /// Package this value is blessed into.
    #[inline]
    #[must_use]
    pub fn blessed(&self) -> Option<Interned> {
        self.meta().and_then(|m| m.blessed)
    }

    /// Struct name of a C-struct wrapper.
    #[inline]
    #[must_use]
    pub fn struct_name(&self) -> Option<Interned> {
        self.meta().and_then(|m| m.struct_name)
    }

    /// Tie delegate of a tied container.
    #[inline]
    #[must_use]
    pub fn tied_delegate(&self) -> Option<Value> {
        self.meta().and_then(|m| m.tied)
    }

    /// Whether this container routes through a tie delegate.
    #[inline]
    #[must_use]
    pub fn is_tied(&self) -> bool {
        self.meta().is_some_and(|m| m.tied.is_some())
    }

    /// Whether this reference cell is weak.
    #[inline]
    #[must_use]
    pub fn is_weak(&self) -> bool {
        self.meta().is_some_and(|m| m.weak)
    }

    // --- constructors ---

    /// The immortal undef singleton.
    #[inline]
    #[must_use]
    pub fn undef() -> Self {
        heap::undef_singleton()
    }

    /// The immortal empty-string singleton.
    #[inline]
    #[must_use]
    pub fn empty_str() -> Self {
        heap::empty_str_singleton()
    }

    /// A new integer value. Small integers come from the immortal pool.
    #[must_use]
    pub fn int(n: i64) -> Self {
        heap::small_int(n).unwrap_or_else(|| Self::alloc(Payload::Int(n)))
    }

    /// A new float value.
    #[must_use]
    pub fn num(n: f64) -> Self {
        Self::alloc(Payload::Num(n))
    }

    /// A new string value from text.
    #[must_use]
    pub fn str(s: &str) -> Self {
        Self::alloc(Payload::Str(s.as_bytes().to_vec()))
    }

    /// A new string value from bytes.
    #[must_use]
    pub fn str_bytes(bytes: &[u8]) -> Self {
        Self::alloc(Payload::Str(bytes.to_vec()))
    }

    /// A new string value taking ownership of a buffer.
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self::alloc(Payload::Str(bytes))
    }

    /// A new string value taking ownership of a `String`.
    #[must_use]
    pub fn from_string(s: String) -> Self {
        Self::alloc(Payload::Str(s.into_bytes()))
    }

    /// A new empty sequence value.
    #[must_use]
    pub fn array() -> Self {
        Self::alloc(Payload::Array(SeqHandle::new()))
    }

    /// A new sequence value over an existing backing sequence (ownership of
    /// one sequence reference transfers to the cell).
    #[must_use]
    pub fn array_from(seq: SeqHandle) -> Self {
        Self::alloc(Payload::Array(seq))
    }

    /// A new empty map value.
    #[must_use]
    pub fn hash() -> Self {
        Self::alloc(Payload::Hash(MapHandle::new()))
    }

    /// A new map value over an existing backing map.
    #[must_use]
    pub fn hash_from(map: MapHandle) -> Self {
        Self::alloc(Payload::Hash(map))
    }

    /// A new strong reference to `target`, incrementing it.
    #[must_use]
    pub fn ref_to(target: Self) -> Self {
        Self::alloc(Payload::Ref(Some(target.incref())))
    }

    /// A new strong reference taking ownership of the caller's count.
    #[must_use]
    pub fn ref_take(target: Self) -> Self {
        Self::alloc(Payload::Ref(Some(target)))
    }

    /// A new file-handle value.
    #[must_use]
    pub fn filehandle(handle: FileHandle) -> Self {
        Self::alloc(Payload::FileHandle(handle))
    }

    /// A new regex value owning an opaque compiled pattern.
    #[must_use]
    pub fn regex(compiled: Box<dyn Any + Send>) -> Self {
        Self::alloc(Payload::Regex(compiled))
    }

    /// A new socket value.
    #[must_use]
    pub fn socket(socket: SocketHandle) -> Self {
        Self::alloc(Payload::Socket(socket))
    }

    /// A new C-struct wrapper owning its backing block.
    #[must_use]
    pub fn cstruct(block: Vec<u8>, name: Interned) -> Self {
        let v = Self::alloc(Payload::CStruct(block));
        v.ensure_meta().struct_name = Some(name);
        v
    }

    /// A new C-pointer value.
    #[must_use]
    pub fn cpointer(ptr: CPointer) -> Self {
        Self::alloc(Payload::CPointer(ptr))
    }

    /// A new language-level mutex value.
    #[must_use]
    pub fn mutex() -> Self {
        Self::cpointer(CPointer::Mutex(Arc::new(RtMutex::new())))
    }

    /// A new language-level condition-variable value.
    #[must_use]
    pub fn cond() -> Self {
        Self::cpointer(CPointer::Cond(Arc::new(RtCond::new())))
    }

    /// A new closure value with no captures.
    #[must_use]
    pub fn closure_native(func: NativeFn) -> Self {
        Self::alloc(Payload::Closure(Closure::Native(func)))
    }

    /// A new closure value owning its captured cells (caller donates the
    /// counts).
    #[must_use]
    pub fn closure_captured(func: CapturedFn, params: u8, captures: Vec<Self>) -> Self {
        Self::alloc(Payload::Closure(Closure::Captured {
            func,
            params,
            captures,
        }))
    }

    /// A new future value.
    #[must_use]
    pub fn future(future: Arc<RtFuture>) -> Self {
        Self::alloc(Payload::Future(future))
    }

    /// A new channel value.
    #[must_use]
    pub fn channel(channel: Arc<RtChannel>) -> Self {
        Self::alloc(Payload::Channel(channel))
    }

    /// A new atomic cell value.
    #[must_use]
    pub fn atomic(initial: i64) -> Self {
        Self::alloc(Payload::Atomic(AtomicI64::new(initial)))
    }

    fn alloc(payload: Payload) -> Self {
        Self::from_cell(heap::alloc_cell(RtCell::new(payload)))
    }

    // --- predicates ---

    /// Whether this value is undef.
    #[inline]
    #[must_use]
    pub fn is_undef(&self) -> bool {
        matches!(self.payload(), Payload::Undef)
    }

    /// Whether this value is a reference cell.
    #[inline]
    #[must_use]
    pub fn is_ref(&self) -> bool {
        matches!(self.payload(), Payload::Ref(_))
    }

    /// Whether this value is a sequence.
    #[inline]
    #[must_use]
    pub fn is_array(&self) -> bool {
        matches!(self.payload(), Payload::Array(_))
    }

    /// Whether this value is a map.
    #[inline]
    #[must_use]
    pub fn is_hash(&self) -> bool {
        matches!(self.payload(), Payload::Hash(_))
    }

    /// Whether this value is a string.
    #[inline]
    #[must_use]
    pub fn is_str(&self) -> bool {
        matches!(self.payload(), Payload::Str(_))
    }

    /// Whether this value is callable.
    #[inline]
    #[must_use]
    pub fn is_closure(&self) -> bool {
        matches!(self.payload(), Payload::Closure(_))
    }

    /// Type name for diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self.tag() {
            Tag::Undef => "UNDEF",
            Tag::Int => "INT",
            Tag::Num => "NUM",
            Tag::Str => "STR",
            Tag::Array => "ARRAY",
            Tag::Hash => "HASH",
            Tag::Ref => "REF",
            Tag::FileHandle => "FILEHANDLE",
            Tag::Regex => "REGEX",
            Tag::Socket => "SOCKET",
            Tag::CStruct => "CSTRUCT",
            Tag::CPointer => "CPOINTER",
            Tag::Closure => "CODE",
            Tag::Future => "FUTURE",
            Tag::Channel => "CHANNEL",
            Tag::Atomic => "ATOMIC",
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.payload() {
            Payload::Undef => write!(f, "Undef"),
            Payload::Int(n) => write!(f, "Int({n})"),
            Payload::Num(n) => write!(f, "Num({n})"),
            Payload::Str(b) => write!(f, "Str({:?})", String::from_utf8_lossy(b)),
            Payload::Array(_) => write!(f, "Array(0x{:x})", self.addr()),
            Payload::Hash(_) => write!(f, "Hash(0x{:x})", self.addr()),
            Payload::Ref(Some(t)) => write!(f, "Ref(0x{:x})", t.addr()),
            Payload::Ref(None) => write!(f, "Ref(null)"),
            Payload::FileHandle(_) => write!(f, "FileHandle(0x{:x})", self.addr()),
            Payload::Regex(_) => write!(f, "Regex(0x{:x})", self.addr()),
            Payload::Socket(_) => write!(f, "Socket(0x{:x})", self.addr()),
            Payload::CStruct(b) => write!(f, "CStruct({} bytes)", b.len()),
            Payload::CPointer(_) => write!(f, "CPointer(0x{:x})", self.addr()),
            Payload::Closure(_) => write!(f, "Closure(0x{:x})", self.addr()),
            Payload::Future(_) => write!(f, "Future(0x{:x})", self.addr()),
            Payload::Channel(_) => write!(f, "Channel(0x{:x})", self.addr()),
            Payload::Atomic(a) => {
                write!(f, "Atomic({})", a.load(std::sync::atomic::Ordering::SeqCst))
            }
        }
    }
}
