//! The trap-boundary lock.
//!
//! On a single CPU with interrupts masked inside handlers, exclusive
//! access to the kernel record is a structural fact, not something to
//! spin for. [`TrapLock`] encodes that: access is closure-scoped, a
//! free lock is taken in one atomic swap, and a second entry is treated
//! as what it is on this machine, a re-entered trap handler. Waiting it
//! out would deadlock the only CPU, so nesting is surfaced instead.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, Ordering};

/// Exclusive access to a value for the duration of a trap.
///
/// Const-constructable so the kernel record can live in a `static`.
/// No guard object exists; the exclusive window is exactly the
/// closure's dynamic extent, which keeps the release on every exit
/// path of a handler.
pub struct TrapLock<T> {
    entered: AtomicBool,
    data: UnsafeCell<T>,
}

// SAFETY: The entered flag serializes every path into `data`; `T: Send`
// because the value is handed from the boot path to trap context.
unsafe impl<T: Send> Send for TrapLock<T> {}
unsafe impl<T: Send> Sync for TrapLock<T> {}

impl<T> TrapLock<T> {
    /// Wraps `value`.
    pub const fn new(value: T) -> Self {
        Self {
            entered: AtomicBool::new(false),
            data: UnsafeCell::new(value),
        }
    }

    /// Runs `f` with exclusive access to the value.
    ///
    /// # Panics
    ///
    /// Panics on nested entry. With interrupts masked inside handlers
    /// there is no legitimate second holder; nesting means a trap
    /// handler re-entered itself.
    pub fn enter<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        assert!(
            !self.entered.swap(true, Ordering::Acquire),
            "trap handler re-entered"
        );
        // SAFETY: The swap above made this the only accessor until the
        // release below.
        let result = f(unsafe { &mut *self.data.get() });
        self.entered.store(false, Ordering::Release);
        result
    }

    /// Runs `f` only if the lock is free; `None` when it is held.
    ///
    /// For paths that cannot trust the no-nesting invariant: a panic
    /// report racing a trap, or a log sink reached recursively.
    pub fn try_enter<R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        if self.entered.swap(true, Ordering::Acquire) {
            return None;
        }
        // SAFETY: Same exclusion as `enter`.
        let result = f(unsafe { &mut *self.data.get() });
        self.entered.store(false, Ordering::Release);
        Some(result)
    }
}
