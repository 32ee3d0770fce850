//! Thread role verification for axmirror.
//!
//! The snapshot system recognizes exactly two thread roles:
//!
//! - The **owner thread** may mutate the live accessible tree and is the
//!   only writer of a tree's pending-change queues.
//! - The **reader thread** owns the drained snapshot map and is the only
//!   thread allowed to read or mutate it.
//!
//! No third thread is permitted to touch either side's private state. This
//! module provides debug assertions and runtime checks to verify that
//! operations happen on the thread their role demands.
//!
//! # Usage
//!
//! Roles are registered once, typically when the first tree is created
//! (owner) and when the dedicated accessibility service thread starts
//! (reader). After that:
//!
//! ```ignore
//! use axmirror_core::{debug_assert_owner_thread, debug_assert_reader_thread};
//!
//! fn update_children(&mut self) {
//!     // Panic in debug builds if not on the owner thread.
//!     debug_assert_owner_thread!();
//!     // ... compute diff against the live tree ...
//! }
//! ```
//!
//! Two levels of checking are provided:
//!
//! - **Debug assertions** (`debug_assert_owner_thread!` and friends): only
//!   active in debug builds. Use liberally for zero-cost production checks.
//! - **Runtime assertions** (`assert_owner_thread!` and friends): always
//!   active. Use for operations where a role violation would corrupt the
//!   snapshot even in release builds.
//!
//! Before a role has been registered, all checks pass (graceful fallback
//! for early initialization and for unit tests that exercise a single
//! thread).

use std::sync::OnceLock;
use std::thread::ThreadId;

/// Global storage for the owner thread ID.
static OWNER_THREAD_ID: OnceLock<ThreadId> = OnceLock::new();

/// Global storage for the reader thread ID.
static READER_THREAD_ID: OnceLock<ThreadId> = OnceLock::new();

/// Register the current thread as the owner thread.
///
/// This should be called once, from the thread that mutates the live
/// accessible tree, before any snapshot tree is created.
///
/// # Panics
///
/// Panics if a different thread was already registered as the owner.
pub fn set_owner_thread() {
    let current = std::thread::current().id();
    if OWNER_THREAD_ID.set(current).is_err() && OWNER_THREAD_ID.get() != Some(&current) {
        panic!(
            "set_owner_thread() called from a different thread than the original. \
             The owner thread can only be registered once."
        );
    }
}

/// Register the current thread as the reader thread.
///
/// This should be called once, from the dedicated accessibility service
/// thread, before it drains any snapshot tree.
///
/// # Panics
///
/// Panics if a different thread was already registered as the reader.
pub fn set_reader_thread() {
    let current = std::thread::current().id();
    if READER_THREAD_ID.set(current).is_err() && READER_THREAD_ID.get() != Some(&current) {
        panic!(
            "set_reader_thread() called from a different thread than the original. \
             The reader thread can only be registered once."
        );
    }
}

/// Get the owner thread ID if it has been registered.
#[inline]
pub fn owner_thread_id() -> Option<ThreadId> {
    OWNER_THREAD_ID.get().copied()
}

/// Get the reader thread ID if it has been registered.
#[inline]
pub fn reader_thread_id() -> Option<ThreadId> {
    READER_THREAD_ID.get().copied()
}

/// Check if the current thread is the owner thread.
///
/// Returns `true` if we are on the owner thread, or if no owner thread has
/// been registered yet (graceful fallback for early initialization).
#[inline]
pub fn is_owner_thread() -> bool {
    match OWNER_THREAD_ID.get() {
        Some(&id) => std::thread::current().id() == id,
        None => true,
    }
}

/// Check if the current thread is the reader thread.
///
/// Returns `true` if we are on the reader thread, or if no reader thread
/// has been registered yet.
#[inline]
pub fn is_reader_thread() -> bool {
    match READER_THREAD_ID.get() {
        Some(&id) => std::thread::current().id() == id,
        None => true,
    }
}

/// Panics if the current thread is not the owner thread.
///
/// Always active. Use `debug_assert_owner_thread!()` for checks that should
/// only run in debug builds.
#[macro_export]
macro_rules! assert_owner_thread {
    () => {
        $crate::assert_owner_thread!("operation must be performed on the owner thread")
    };
    ($msg:expr) => {
        if !$crate::thread_role::is_owner_thread() {
            $crate::thread_role::panic_wrong_role("owner", $msg, file!(), line!());
        }
    };
}

/// Panics if the current thread is not the reader thread.
///
/// Always active. Use `debug_assert_reader_thread!()` for checks that
/// should only run in debug builds.
#[macro_export]
macro_rules! assert_reader_thread {
    () => {
        $crate::assert_reader_thread!("operation must be performed on the reader thread")
    };
    ($msg:expr) => {
        if !$crate::thread_role::is_reader_thread() {
            $crate::thread_role::panic_wrong_role("reader", $msg, file!(), line!());
        }
    };
}

/// Debug-only assertion that panics if not on the owner thread.
///
/// A no-op in release builds, making it suitable for liberal use in
/// diff-computation code without affecting production performance.
#[macro_export]
macro_rules! debug_assert_owner_thread {
    () => {
        #[cfg(debug_assertions)]
        $crate::assert_owner_thread!()
    };
    ($msg:expr) => {
        #[cfg(debug_assertions)]
        $crate::assert_owner_thread!($msg)
    };
}

/// Debug-only assertion that panics if not on the reader thread.
#[macro_export]
macro_rules! debug_assert_reader_thread {
    () => {
        #[cfg(debug_assertions)]
        $crate::assert_reader_thread!()
    };
    ($msg:expr) => {
        #[cfg(debug_assertions)]
        $crate::assert_reader_thread!($msg)
    };
}

/// Internal function generating the panic message for role violations.
#[cold]
#[inline(never)]
#[doc(hidden)]
pub fn panic_wrong_role(role: &str, msg: &str, file: &str, line: u32) -> ! {
    let current = std::thread::current();
    let current_name = current.name().unwrap_or("<unnamed>");
    let current_id = current.id();

    let registered = match role {
        "owner" => owner_thread_id(),
        _ => reader_thread_id(),
    };
    let registered_info = match registered {
        Some(id) => format!("{role} thread ID: {id:?}"),
        None => format!("{role} thread not yet registered"),
    };

    panic!(
        "\n\
        THREAD ROLE VIOLATION\n\
        \n\
        {msg}\n\
        \n\
        Location: {file}:{line}\n\
        Current thread: \"{current_name}\" (ID: {current_id:?})\n\
        {registered_info}\n\
        \n\
        Pending-change queues may only be written by the owner thread, and\n\
        the drained snapshot map may only be touched by the reader thread.\n\
        Route work to the correct thread with OwnerProxy::call() instead of\n\
        accessing tree state directly."
    )
}

/// Thread affinity tracker for objects bound to a single thread.
///
/// Records the thread on which a value was created and verifies that later
/// operations occur on the same thread.
///
/// # Example
///
/// ```
/// use axmirror_core::thread_role::ThreadAffinity;
///
/// struct ReaderState {
///     affinity: ThreadAffinity,
///     nodes: std::cell::RefCell<Vec<u64>>,
/// }
///
/// impl ReaderState {
///     fn new() -> Self {
///         Self {
///             affinity: ThreadAffinity::current(),
///             nodes: std::cell::RefCell::new(Vec::new()),
///         }
///     }
///
///     fn push(&self, id: u64) {
///         self.affinity.debug_assert_same_thread();
///         self.nodes.borrow_mut().push(id);
///     }
/// }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ThreadAffinity {
    thread_id: ThreadId,
}

impl Default for ThreadAffinity {
    fn default() -> Self {
        Self::current()
    }
}

impl ThreadAffinity {
    /// Create a new affinity tracker for the current thread.
    #[inline]
    pub fn current() -> Self {
        Self {
            thread_id: std::thread::current().id(),
        }
    }

    /// Get the thread ID this affinity is bound to.
    #[inline]
    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    /// Check if the current thread matches this affinity.
    #[inline]
    pub fn is_same_thread(&self) -> bool {
        std::thread::current().id() == self.thread_id
    }

    /// Assert that we are on the same thread as the affinity.
    ///
    /// Always runs, in both debug and release builds.
    ///
    /// # Panics
    ///
    /// Panics if called from a different thread.
    #[inline]
    pub fn assert_same_thread(&self) {
        if !self.is_same_thread() {
            self.panic_wrong_thread();
        }
    }

    /// Debug-only assertion that we are on the same thread.
    #[inline]
    pub fn debug_assert_same_thread(&self) {
        #[cfg(debug_assertions)]
        self.assert_same_thread();
    }

    #[cold]
    #[inline(never)]
    fn panic_wrong_thread(&self) -> ! {
        let current = std::thread::current();
        panic!(
            "value with thread affinity accessed from wrong thread: created on {:?}, \
             accessed from \"{}\" ({:?})",
            self.thread_id,
            current.name().unwrap_or("<unnamed>"),
            current.id()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    // Note: set_owner_thread()/set_reader_thread() use OnceLock, so tests
    // here deliberately avoid registering global roles and focus on the
    // affinity tracker instead.

    #[test]
    fn test_affinity_same_thread() {
        let affinity = ThreadAffinity::current();
        assert!(affinity.is_same_thread());
        affinity.assert_same_thread();
    }

    #[test]
    fn test_affinity_different_thread() {
        let affinity = ThreadAffinity::current();

        let result = Arc::new(AtomicBool::new(false));
        let result_clone = result.clone();
        let handle = std::thread::spawn(move || {
            result_clone.store(!affinity.is_same_thread(), Ordering::SeqCst);
        });
        handle.join().unwrap();

        assert!(
            result.load(Ordering::SeqCst),
            "is_same_thread() should return false from another thread"
        );
    }

    #[test]
    fn test_affinity_panics_on_wrong_thread() {
        let affinity = ThreadAffinity::current();

        let result = std::thread::spawn(move || {
            affinity.assert_same_thread();
        })
        .join();

        assert!(result.is_err(), "expected affinity violation panic");
    }

    #[test]
    fn test_affinity_copy() {
        let a = ThreadAffinity::current();
        let b = a;
        assert_eq!(a.thread_id(), b.thread_id());
    }
}
