/*!
The construction scope.

Each thread has at most one active [`Source`]. While it is active, statements and
buffer registrations made through this module are directed at it. Outside of a
scope these operations do nothing and return empty results: misuse never panics,
each dropped operation is logged with `tracing::warn!` and counted in
[`violations()`]. The `try_` variants report [`NotInScope`] instead.

A scope is opened with [`enter()`] and closed by [`ScopeGuard::exit()`], which
returns the source. Dropping the guard closes the scope on every other path,
including early returns and panics.
*/

use super::{
    error::{BlockUnderflow, NotInScope, ScopeAlreadyActive},
    source::Source,
};
use crate::{
    access::{AccessMode, AccessTarget},
    buffer::Buffer,
};
use std::{
    cell::{Cell, RefCell},
    marker::PhantomData,
    sync::atomic::{AtomicUsize, Ordering},
};

thread_local! {
    static SCOPE: RefCell<Option<Source>> = const { RefCell::new(None) };
    static RESOURCE_ORDINAL: Cell<usize> = const { Cell::new(0) };
}

static VIOLATIONS: AtomicUsize = AtomicUsize::new(0);

/// The number of operations dropped because no scope was active, across all threads.
pub fn violations() -> usize {
    VIOLATIONS.load(Ordering::Relaxed)
}

pub(crate) fn violation(op: &'static str) {
    VIOLATIONS.fetch_add(1, Ordering::Relaxed);
    tracing::warn!(op, "kernel operation outside of a construction scope ignored");
}

/// The next resource ordinal of the calling thread, starting at 1 for each scope.
pub(crate) fn next_resource_ordinal() -> usize {
    RESOURCE_ORDINAL.with(|x| {
        let ordinal = x.get() + 1;
        x.set(ordinal);
        ordinal
    })
}

/** Makes `source` the active scope of the calling thread.

Resets the thread's resource ordinal, so equal sequences of registrations produce
equal resource names.

**errors**

[`ScopeAlreadyActive`] if the thread already has an active scope. The rejected
source is returned in the error. */
pub fn enter(source: Source) -> Result<ScopeGuard, ScopeAlreadyActive> {
    SCOPE.with(|scope| {
        let mut scope = scope.borrow_mut();
        if let Some(active) = scope.as_ref() {
            return Err(ScopeAlreadyActive {
                active: active.get_kernel_name().to_string(),
                rejected: Box::new(source),
            });
        }
        tracing::debug!(kernel = %source.get_kernel_name(), "scope entered");
        RESOURCE_ORDINAL.with(|x| x.set(0));
        *scope = Some(source);
        Ok(ScopeGuard { _m: PhantomData })
    })
}

/** The active scope of a thread.

Not `Send`, the scope belongs to the thread that entered it. */
#[must_use = "dropping the guard closes the scope"]
#[derive(Debug)]
pub struct ScopeGuard {
    _m: PhantomData<*const ()>,
}

impl ScopeGuard {
    /// Closes the scope, returning the source.
    pub fn exit(self) -> Source {
        let source = match SCOPE.with(|scope| scope.borrow_mut().take()) {
            Some(source) => source,
            // only the guard clears the slot
            None => unreachable!("scope guard without an active source"),
        };
        tracing::debug!(kernel = %source.get_kernel_name(), lines = source.lines().len(), "scope exited");
        source
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        let abandoned = SCOPE
            .try_with(|scope| scope.try_borrow_mut().ok().and_then(|mut x| x.take()))
            .ok()
            .flatten();
        if let Some(source) = abandoned {
            tracing::debug!(kernel = %source.get_kernel_name(), "scope abandoned");
        }
    }
}

/** Calls `f` with the active source, or returns None.

Also None when called from within `f`, the source is already borrowed. */
pub(crate) fn with_active<R>(f: impl FnOnce(&mut Source) -> R) -> Option<R> {
    SCOPE.with(|scope| match scope.try_borrow_mut() {
        Ok(mut scope) => scope.as_mut().map(f),
        Err(_) => {
            tracing::warn!("kernel operation on a source in use ignored");
            None
        }
    })
}

fn with_active_or(op: &'static str, f: impl FnOnce(&mut Source)) {
    if with_active(f).is_none() {
        violation(op);
    }
}

/// Whether the calling thread has an active scope.
pub fn in_scope() -> bool {
    SCOPE.with(|scope| scope.try_borrow().map_or(true, |x| x.is_some()))
}

/// Appends `line` terminated with ';' to the active source.
pub fn add(line: &str) {
    with_active_or("add", |source| source.add(line));
}

/// Appends `line` as is to the active source.
pub fn add_unterminated(line: &str) {
    with_active_or("add", |source| source.add_unterminated(line));
}

/// Like [`add()`], but reports [`NotInScope`].
pub fn try_add(line: &str) -> Result<(), NotInScope> {
    with_active(|source| source.add(line)).ok_or(NotInScope { op: "add" })
}

/// Opens a block in the active source.
pub fn open_block() {
    with_active_or("open_block", Source::open_block);
}

/** Closes a block in the active source.

Does nothing outside of a scope.

**errors**

[`BlockUnderflow`] if the active source has no open block. */
pub fn close_block() -> Result<(), BlockUnderflow> {
    with_active(Source::close_block).unwrap_or_else(|| {
        violation("close_block");
        Ok(())
    })
}

/** Registers `buffer` with the active source, returning its resource name.

Returns an empty string outside of a scope. */
pub fn register_resource(
    buffer: &Buffer,
    mode: AccessMode,
    target: AccessTarget,
    type_name: impl Into<String>,
    size: usize,
) -> String {
    with_active(|source| source.register_resource(buffer, mode, target, type_name, size))
        .unwrap_or_else(|| {
            violation("register_resource");
            String::new()
        })
}

/// Like [`register_resource()`], but reports [`NotInScope`].
pub fn try_register_resource(
    buffer: &Buffer,
    mode: AccessMode,
    target: AccessTarget,
    type_name: impl Into<String>,
    size: usize,
) -> Result<String, NotInScope> {
    with_active(|source| source.register_resource(buffer, mode, target, type_name, size)).ok_or(
        NotInScope {
            op: "register_resource",
        },
    )
}

/// The name of the active kernel, if any.
pub fn kernel_name() -> Option<String> {
    with_active(|source| source.get_kernel_name().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{buffer::Range, kernel::name::IdentityCache, scalar::ScalarType};

    fn source(shape: &str) -> Source {
        Source::builder(shape).build_with(&IdentityCache::new())
    }

    #[test]
    fn operations_outside_scope_are_ignored() {
        assert!(!in_scope());
        let before = violations();
        let a = Buffer::new(ScalarType::F32, Range::d1(4));
        add("int x = 0");
        open_block();
        close_block().unwrap();
        let name = register_resource(&a, AccessMode::Read, AccessTarget::GlobalBuffer, "float*", 8);
        assert_eq!(name, "");
        assert!(!in_scope());
        assert!(violations() >= before + 4);
        assert!(try_add("int x = 0").is_err());
        assert!(try_register_resource(&a, AccessMode::Read, AccessTarget::GlobalBuffer, "float*", 8).is_err());
        assert_eq!(a.owners(), 1);
    }

    #[test]
    fn enter_and_exit() {
        let guard = enter(source("scoped")).unwrap();
        assert!(in_scope());
        add("int x = 0");
        try_add("x += 1").unwrap();
        open_block();
        close_block().unwrap();
        assert!(close_block().is_err());
        let src = guard.exit();
        assert!(!in_scope());
        assert_eq!(src.lines(), ["\tint x = 0;", "\tx += 1;", "\t{", "\t}"]);
    }

    #[test]
    fn nested_enter_is_rejected() {
        let guard = enter(source("outer")).unwrap();
        let err = enter(source("inner")).unwrap_err();
        assert_eq!(err.into_source().get_kernel_name(), "_sycl_kernel_0");
        assert!(in_scope());
        drop(guard);
        assert!(!in_scope());
    }

    #[test]
    fn resource_names_restart_per_scope() {
        let a = Buffer::new(ScalarType::F32, Range::d1(4));
        let b = Buffer::new(ScalarType::F32, Range::d1(4));
        let mut names = Vec::new();
        for _ in 0..2 {
            let guard = enter(source("restart")).unwrap();
            let x = register_resource(&a, AccessMode::Read, AccessTarget::GlobalBuffer, "float*", 8);
            let y = register_resource(&b, AccessMode::Write, AccessTarget::GlobalBuffer, "float*", 8);
            assert_eq!(register_resource(&a, AccessMode::Read, AccessTarget::GlobalBuffer, "float*", 8), x);
            names.push((x, y));
            guard.exit();
        }
        assert_eq!(names[0], names[1]);
        assert_eq!(names[0].0, "_sycl_buf_1");
        assert_eq!(names[0].1, "_sycl_buf_2");
    }

    #[test]
    fn reentrant_operations_are_ignored() {
        let guard = enter(source("reentrant")).unwrap();
        let before = violations();
        let inner = with_active(|_| {
            add("int x = 0");
            assert!(try_add("int x = 0").is_err());
            (in_scope(), kernel_name())
        });
        assert_eq!(inner, Some((true, None)));
        assert!(violations() > before);
        add("int y = 0");
        assert_eq!(guard.exit().lines(), ["\tint y = 0;"]);
    }

    #[test]
    fn scopes_are_per_thread() {
        let _guard = enter(source("main")).unwrap();
        let other = std::thread::spawn(in_scope).join().unwrap();
        assert!(!other);
        assert!(in_scope());
    }
}
