// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Package registry and method dispatch.
//!
//! A package has an ordered parent list (multiple inheritance, resolved
//! depth-first left-to-right), a method table, an operator-overload table,
//! and a list of method modifiers. Blessed references dispatch through
//! their package's resolution order.
//!
//! Caches: method resolution and isa answers are cached in thread-local
//! direct-mapped tables, invalidated by a process-wide generation counter
//! that every registration bumps. The caches store base resolution only;
//! modifiers are applied as a post-step on each call.
//!
//! Thread safety: the registry itself is behind an `RwLock`. Registration
//! is expected during program startup; steady-state dispatch takes the read
//! side only on cache misses.

#[cfg(test)]
mod mod_test;

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use once_cell::sync::Lazy;

use crate::except::{RtError, throw};
use crate::intern::{self, Interned, intern_str};
use crate::seq::Sequence;
use crate::value::{NativeFn, Payload, Value, to_string_lossy};

/// Upper bound on registered packages.
const MAX_PACKAGES: usize = 1024;

/// Slots in each thread-local dispatch cache; a power of two.
pub const CACHE_SLOTS: usize = 512;

/// Longest package name DESTROY will accept.
const MAX_PACKAGE_NAME: usize = 256;

/// Kind of a method modifier.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ModifierKind {
    /// Runs before the original, result discarded.
    Before,
    /// Runs after the original, result discarded.
    After,
    /// Wraps the original; receives it as a callable first argument.
    Around,
}

#[derive(Clone, Copy)]
struct Modifier {
    method: Interned,
    kind: ModifierKind,
    func: NativeFn,
}

struct Package {
    name: Interned,
    parents: Vec<usize>,
    methods: Vec<(Interned, NativeFn)>,
    overloads: Vec<(Interned, NativeFn)>,
    modifiers: Vec<Modifier>,
}

struct Registry {
    packages: Vec<Package>,
    by_name: HashMap<Interned, usize>,
    last_registered: Option<usize>,
}

static REGISTRY: Lazy<RwLock<Registry>> = Lazy::new(|| {
    RwLock::new(Registry {
        packages: Vec::new(),
        by_name: HashMap::new(),
        last_registered: None,
    })
});

static GENERATION: AtomicU64 = AtomicU64::new(0);

fn bump_generation() {
    GENERATION.fetch_add(1, Ordering::SeqCst);
}

#[derive(Clone, Copy)]
struct MethodCacheEntry {
    pkg: usize,
    name: Interned,
    func: NativeFn,
}

#[derive(Clone, Copy)]
struct IsaCacheEntry {
    pkg: usize,
    target: Interned,
    result: bool,
}

struct DispatchCache {
    generation: u64,
    methods: [Option<MethodCacheEntry>; CACHE_SLOTS],
    isa: [Option<IsaCacheEntry>; CACHE_SLOTS],
}

thread_local! {
    static CACHE: RefCell<DispatchCache> = RefCell::new(DispatchCache {
        generation: 0,
        methods: [None; CACHE_SLOTS],
        isa: [None; CACHE_SLOTS],
    });
}

#[inline]
fn cache_slot(pkg: usize, name: Interned) -> usize {
    let name_bits = name.as_bytes().as_ptr() as usize >> 4;
    (pkg.wrapping_mul(31) ^ name_bits) & (CACHE_SLOTS - 1)
}

/// Register (or look up) a package by name, returning its id.
pub fn set_package(name: &str) -> usize {
    let name = intern_str(name);
    let mut registry = REGISTRY
        .write()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    if let Some(&id) = registry.by_name.get(&name) {
        registry.last_registered = Some(id);
        return id;
    }
    if registry.packages.len() >= MAX_PACKAGES {
        // Resource exhaustion is fatal; exit without unwinding so the
        // registry lock is never poisoned.
        eprintln!("package table exhausted ({MAX_PACKAGES} packages)");
        std::process::exit(1);
    }
    let id = registry.packages.len();
    registry.packages.push(Package {
        name,
        parents: Vec::new(),
        methods: Vec::new(),
        overloads: Vec::new(),
        modifiers: Vec::new(),
    });
    registry.by_name.insert(name, id);
    registry.last_registered = Some(id);
    id
}

fn lookup_package(name: Interned) -> Option<usize> {
    let registry = REGISTRY
        .read()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    registry.by_name.get(&name).copied()
}

/// Append `parent` to `child`'s ordered parent list.
pub fn inherit(child: &str, parent: &str) {
    let child_id = set_package(child);
    let parent_id = set_package(parent);
    let mut registry = REGISTRY
        .write()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    if !registry.packages[child_id].parents.contains(&parent_id) {
        registry.packages[child_id].parents.push(parent_id);
    }
    drop(registry);
    bump_generation();
}

/// Append `parent` to the most recently registered package's parent list.
pub fn inherit_from(parent: &str) {
    let child = {
        let registry = REGISTRY
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        registry
            .last_registered
            .map(|id| registry.packages[id].name)
    };
    if let Some(child) = child {
        let child_name = child.display().into_owned();
        inherit(&child_name, parent);
    }
}

/// Register a method on a package.
pub fn method_register(pkg: &str, method: &str, func: NativeFn) {
    let id = set_package(pkg);
    let method = intern_str(method);
    let mut registry = REGISTRY
        .write()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let table = &mut registry.packages[id].methods;
    if let Some(slot) = table.iter_mut().find(|(name, _)| *name == method) {
        slot.1 = func;
    } else {
        table.push((method, func));
    }
    drop(registry);
    bump_generation();
}

/// Register an operator overload on a package. `op` is the operator token
/// (`"+"`, `"=="`, `"\"\""`, ...).
pub fn overload_register(pkg: &str, op: &str, func: NativeFn) {
    let id = set_package(pkg);
    let op = intern_str(op);
    let mut registry = REGISTRY
        .write()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let table = &mut registry.packages[id].overloads;
    if let Some(slot) = table.iter_mut().find(|(name, _)| *name == op) {
        slot.1 = func;
    } else {
        table.push((op, func));
    }
    drop(registry);
    bump_generation();
}

/// Register a method modifier on a package.
pub fn modifier_register(pkg: &str, method: &str, kind: ModifierKind, func: NativeFn) {
    let id = set_package(pkg);
    let method = intern_str(method);
    let mut registry = REGISTRY
        .write()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    registry.packages[id].modifiers.push(Modifier {
        method,
        kind,
        func,
    });
    drop(registry);
    bump_generation();
}

/// Depth-first left-to-right resolution under the registry read lock.
fn resolve_uncached(
    registry: &Registry,
    pkg: usize,
    method: Interned,
    visited: &mut Vec<usize>,
) -> Option<NativeFn> {
    if visited.contains(&pkg) {
        return None;
    }
    visited.push(pkg);
    let package = &registry.packages[pkg];
    for (name, func) in &package.methods {
        if *name == method {
            return Some(*func);
        }
    }
    for &parent in &package.parents {
        if let Some(func) = resolve_uncached(registry, parent, method, visited) {
            return Some(func);
        }
    }
    None
}

/// Resolve `method` for `pkg` through the cache. Misses are not cached.
fn resolve(pkg: usize, method: Interned) -> Option<NativeFn> {
    let generation = GENERATION.load(Ordering::Relaxed);
    let slot = cache_slot(pkg, method);

    let cached = CACHE.with(|cache| {
        let mut cache = cache.borrow_mut();
        if cache.generation != generation {
            cache.methods = [None; CACHE_SLOTS];
            cache.isa = [None; CACHE_SLOTS];
            cache.generation = generation;
            return None;
        }
        cache.methods[slot].filter(|e| e.pkg == pkg && e.name == method)
    });
    if let Some(entry) = cached {
        return Some(entry.func);
    }

    let registry = REGISTRY
        .read()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let func = resolve_uncached(&registry, pkg, method, &mut Vec::new())?;
    drop(registry);

    CACHE.with(|cache| {
        cache.borrow_mut().methods[slot] = Some(MethodCacheEntry {
            pkg,
            name: method,
            func,
        });
    });
    Some(func)
}

/// Resolve `method` starting from the parents of `from_pkg` only, for
/// `SUPER::` calls.
fn resolve_super(from_pkg: usize, method: Interned) -> Option<NativeFn> {
    let registry = REGISTRY
        .read()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let parents = registry.packages[from_pkg].parents.clone();
    let mut visited = vec![from_pkg];
    for parent in parents {
        if let Some(func) = resolve_uncached(&registry, parent, method, &mut visited) {
            return Some(func);
        }
    }
    None
}

fn isa_uncached(registry: &Registry, pkg: usize, target: Interned, visited: &mut Vec<usize>) -> bool {
    if visited.contains(&pkg) {
        return false;
    }
    visited.push(pkg);
    let package = &registry.packages[pkg];
    if package.name == target {
        return true;
    }
    package
        .parents
        .iter()
        .any(|&parent| isa_uncached(registry, parent, target, visited))
}

fn isa_by_id(pkg: usize, target: Interned) -> bool {
    let generation = GENERATION.load(Ordering::Relaxed);
    let slot = cache_slot(pkg, target);

    let cached = CACHE.with(|cache| {
        let mut cache = cache.borrow_mut();
        if cache.generation != generation {
            cache.methods = [None; CACHE_SLOTS];
            cache.isa = [None; CACHE_SLOTS];
            cache.generation = generation;
            return None;
        }
        cache.isa[slot].filter(|e| e.pkg == pkg && e.target == target)
    });
    if let Some(entry) = cached {
        return entry.result;
    }

    let registry = REGISTRY
        .read()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let result = isa_uncached(&registry, pkg, target, &mut Vec::new());
    drop(registry);

    CACHE.with(|cache| {
        cache.borrow_mut().isa[slot] = Some(IsaCacheEntry {
            pkg,
            target,
            result,
        });
    });
    result
}

/// Bless a reference into a package. Idempotent: re-blessing overwrites the
/// package name. Returns the same handle.
pub fn bless(r: Value, pkg: &str) -> Result<Value, RtError> {
    if !r.is_ref() {
        return Err(throw("Can't bless non-reference value"));
    }
    set_package(pkg);
    let name = intern_str(pkg);
    let meta = r.ensure_meta();
    if let Some(old) = meta.blessed.take() {
        intern::release(old);
    }
    meta.blessed = Some(name);
    Ok(r)
}

/// The package a value is blessed into, as a string value; undef when the
/// value is not a blessed reference.
#[must_use]
pub fn blessed(v: Value) -> Value {
    match v.blessed() {
        Some(name) => Value::str_bytes(name.as_bytes()),
        None => Value::undef(),
    }
}

/// Dispatch package of a receiver: the blessed package of a reference, or
/// the package named by a string (class-method call).
fn receiver_package(obj: Value) -> Result<(usize, Interned), RtError> {
    if let Some(name) = obj.blessed() {
        let id = lookup_package(name)
            .ok_or_else(|| throw(format!("Package \"{}\" is not registered", name.display())))?;
        return Ok((id, name));
    }
    if let Payload::Str(bytes) = obj.payload() {
        let name = intern::intern(bytes);
        let id = lookup_package(name)
            .ok_or_else(|| throw(format!("Package \"{}\" is not registered", name.display())))?;
        return Ok((id, name));
    }
    Err(throw(format!(
        "Can't call method on unblessed {}",
        obj.type_name()
    )))
}

/// Modifiers registered for `method` on the receiver's package.
fn modifiers_for(pkg: usize, method: Interned) -> Vec<Modifier> {
    let registry = REGISTRY
        .read()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    registry.packages[pkg]
        .modifiers
        .iter()
        .filter(|m| m.method == method)
        .copied()
        .collect()
}

/// Call `method` on `obj`.
///
/// `args` is the argument sequence with the receiver at index 0 (borrowed;
/// the callee returns an owned result). Resolution is depth-first
/// left-to-right; `isa` and `can` short-circuit; unresolved names fall back
/// to AUTOLOAD with the method name prepended to the arguments.
pub fn method_call(obj: Value, method: &str, args: Value) -> Result<Value, RtError> {
    // Universal methods bypass dispatch entirely.
    if method == "isa" {
        let target = crate::seq::fetch(args, 1)?;
        let result = isa(obj, &to_string_lossy(target));
        target.decref();
        return Ok(Value::int(i64::from(result)));
    }
    if method == "can" {
        let target = crate::seq::fetch(args, 1)?;
        let result = can(obj, &to_string_lossy(target));
        target.decref();
        return Ok(result);
    }

    let (pkg, pkg_name) = receiver_package(obj)?;
    let method_name = intern_str(method);

    match resolve(pkg, method_name) {
        Some(func) => call_with_modifiers(pkg, method_name, func, args),
        None => match resolve(pkg, intern_str("AUTOLOAD")) {
            Some(autoload) => {
                let autoload_args = prepend_arg(args, Value::str(method));
                let result = autoload(autoload_args);
                autoload_args.decref();
                result
            }
            None => Err(throw(format!(
                "Can't locate object method \"{}\" via package \"{}\"",
                method,
                pkg_name.display()
            ))),
        },
    }
}

/// Call `method` resolved through the parents of `from_pkg` only. The
/// receiver stays in `args`; dispatch ignores its blessed package.
pub fn super_call(_obj: Value, from_pkg: &str, method: &str, args: Value) -> Result<Value, RtError> {
    let from = lookup_package(intern_str(from_pkg))
        .ok_or_else(|| throw(format!("Package \"{from_pkg}\" is not registered")))?;
    let method_name = intern_str(method);
    let func = resolve_super(from, method_name).ok_or_else(|| {
        throw(format!(
            "Can't locate object method \"{method}\" via package \"{from_pkg}\" (SUPER)"
        ))
    })?;
    func(args)
}

/// Fresh argument sequence with `first` (one reference donated) prepended.
fn prepend_arg(args: Value, first: Value) -> Value {
    let mut seq = match crate::seq::backing(args) {
        Some(backing) => backing.borrow().copy_onelevel(),
        None => Sequence::new(),
    };
    seq.unshift(first);
    first.decref();
    Value::array_from(crate::seq::SeqHandle::from_seq(seq))
}

fn call_with_modifiers(
    pkg: usize,
    method: Interned,
    func: NativeFn,
    args: Value,
) -> Result<Value, RtError> {
    let modifiers = modifiers_for(pkg, method);
    if modifiers.is_empty() {
        return func(args);
    }

    for m in &modifiers {
        if m.kind == ModifierKind::Before {
            (m.func)(args)?.decref();
        }
    }

    let around = modifiers.iter().find(|m| m.kind == ModifierKind::Around);
    let result = match around {
        Some(wrapper) => {
            // The wrapper receives the original as a callable prepended to
            // the argument sequence.
            let original = Value::closure_native(func);
            let wrapped_args = prepend_arg(args, original);
            let result = (wrapper.func)(wrapped_args);
            wrapped_args.decref();
            result?
        }
        None => func(args)?,
    };

    for m in &modifiers {
        if m.kind == ModifierKind::After {
            (m.func)(args)?.decref();
        }
    }

    Ok(result)
}

/// Whether `v` is blessed into `target` or one of its transitive parents.
#[must_use]
pub fn isa(v: Value, target: &str) -> bool {
    let Some(name) = v.blessed().or_else(|| match v.payload() {
        Payload::Str(bytes) => Some(intern::intern(bytes)),
        _ => None,
    }) else {
        return false;
    };
    let Some(pkg) = lookup_package(name) else {
        return false;
    };
    isa_by_id(pkg, intern_str(target))
}

/// The resolved method as a callable value, or undef.
#[must_use]
pub fn can(v: Value, method: &str) -> Value {
    let Ok((pkg, _)) = receiver_package(v) else {
        return Value::undef();
    };
    match resolve(pkg, intern_str(method)) {
        Some(func) => Value::closure_native(func),
        None => Value::undef(),
    }
}

// --- operator overloading ---

fn overload_lookup(pkg: usize, op: Interned) -> Option<NativeFn> {
    let registry = REGISTRY
        .read()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let mut visited = Vec::new();
    overload_lookup_uncached(&registry, pkg, op, &mut visited)
}

fn overload_lookup_uncached(
    registry: &Registry,
    pkg: usize,
    op: Interned,
    visited: &mut Vec<usize>,
) -> Option<NativeFn> {
    if visited.contains(&pkg) {
        return None;
    }
    visited.push(pkg);
    let package = &registry.packages[pkg];
    for (name, func) in &package.overloads {
        if *name == op {
            return Some(*func);
        }
    }
    for &parent in &package.parents {
        if let Some(func) = overload_lookup_uncached(registry, parent, op, visited) {
            return Some(func);
        }
    }
    None
}

fn blessed_package_id(v: Value) -> Option<usize> {
    v.blessed().and_then(lookup_package)
}

/// Dispatch a binary operator overload: the left operand's package is
/// consulted first, then the right with the operands swapped. `None` when
/// neither side overloads `op`.
pub fn overload_binary(op: &str, left: Value, right: Value) -> Option<Result<Value, RtError>> {
    let op = intern_str(op);
    if let Some(func) = blessed_package_id(left).and_then(|pkg| overload_lookup(pkg, op)) {
        return Some(call_overload(func, left, right, false));
    }
    if let Some(func) = blessed_package_id(right).and_then(|pkg| overload_lookup(pkg, op)) {
        return Some(call_overload(func, right, left, true));
    }
    None
}

fn call_overload(func: NativeFn, a: Value, b: Value, swapped: bool) -> Result<Value, RtError> {
    let mut seq = Sequence::with_capacity(3);
    seq.push(a);
    seq.push(b);
    seq.push_take(Value::int(i64::from(swapped)));
    let args = Value::array_from(crate::seq::SeqHandle::from_seq(seq));
    let result = func(args);
    args.decref();
    result
}

/// Dispatch a unary operator overload on `v`'s package.
pub fn overload_unary(op: &str, v: Value) -> Option<Result<Value, RtError>> {
    let op = intern_str(op);
    let func = blessed_package_id(v).and_then(|pkg| overload_lookup(pkg, op))?;
    let mut seq = Sequence::with_capacity(1);
    seq.push(v);
    let args = Value::array_from(crate::seq::SeqHandle::from_seq(seq));
    let result = func(args);
    args.decref();
    Some(result)
}

/// The `""` overload result when `v` enters string context, or `None`.
/// Errors inside the overload degrade to `None`; string context never
/// raises.
#[must_use]
pub fn overload_stringify(v: Value) -> Option<Value> {
    if v.blessed().is_none() {
        return None;
    }
    match overload_unary("\"\"", v) {
        Some(Ok(result)) => Some(result),
        Some(Err(err)) => {
            log::debug!("stringify overload raised: {err}");
            err.release();
            None
        }
        None => None,
    }
}

/// Run the DESTROY chain for a dying blessed value. Called exactly once by
/// the free cascade, which guards reentry.
pub(crate) fn run_destroy(obj: Value, pkg: Interned) {
    // A memory-safe runtime cannot see a corrupted pointer here, but a
    // user-supplied package name can still be nonsense.
    let bytes = pkg.as_bytes();
    let malformed = bytes.is_empty()
        || bytes.len() > MAX_PACKAGE_NAME
        || !bytes[0].is_ascii_graphic();
    if malformed {
        log::warn!("skipping DESTROY for malformed package name ({} bytes)", bytes.len());
        return;
    }

    let Some(id) = lookup_package(pkg) else {
        return;
    };
    let Some(func) = resolve(id, intern_str("DESTROY")) else {
        return;
    };

    let mut seq = Sequence::with_capacity(1);
    seq.push(obj);
    let args = Value::array_from(crate::seq::SeqHandle::from_seq(seq));
    if let Err(err) = func(args) {
        log::warn!("DESTROY raised: {err}");
        err.release();
    }
    args.decref();
}
