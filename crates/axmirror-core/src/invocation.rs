//! Blocking cross-thread invocation for reader-to-owner round-trips.
//!
//! Reader-thread queries occasionally need data that has not been (or
//! cannot be) summarized into the snapshot, e.g. exact layout geometry for
//! an uncached node. For those cases the reader constructs a closure,
//! ships it to the owner thread, and blocks until the owner's run loop has
//! serviced it.
//!
//! # How It Works
//!
//! 1. [`owner_channel`] creates a connected [`OwnerProxy`] / [`OwnerLoop`]
//!    pair over an unbounded channel.
//!
//! 2. The owner thread periodically calls [`OwnerLoop::service`] (or
//!    [`OwnerLoop::service_one`]) as part of its normal turn-taking.
//!
//! 3. Any other thread calls [`OwnerProxy::call`] with a closure. The
//!    closure is wrapped in an [`OwnerInvocation`] together with a
//!    completion handle; the caller blocks on the paired waiter until the
//!    owner thread has executed the closure and signaled completion.
//!
//! The contract is deliberately timeout-free: the reader observably blocks
//! until the owner produces a value. `wait_timeout` exists for tests only.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::error::{CoreError, CoreResult};

/// A type-erased invocation that can be shipped to the owner thread.
///
/// This wraps a closure capturing the operation and its arguments, allowing
/// deferred execution on the owner thread.
pub struct OwnerInvocation {
    /// The actual invocation closure.
    invoke: Box<dyn FnOnce() + Send>,
    /// Optional completion notifier for blocking invocations.
    completion: Option<CompletionHandle>,
}

impl OwnerInvocation {
    /// Create a new fire-and-forget invocation.
    pub fn new<F>(invoke: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            invoke: Box::new(invoke),
            completion: None,
        }
    }

    /// Create a new invocation with a completion handle for blocking.
    pub fn with_completion<F>(invoke: F, completion: CompletionHandle) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            invoke: Box::new(invoke),
            completion: Some(completion),
        }
    }

    /// Execute the invocation.
    pub fn execute(self) {
        (self.invoke)();
        // Signal completion if this was a blocking invocation.
        if let Some(completion) = self.completion {
            completion.signal_done();
        }
    }
}

/// A handle for signaling completion of a blocking invocation.
///
/// The owner side signals when the closure has finished executing, allowing
/// the calling thread to unblock. Dropping the handle without signaling
/// also wakes the waiter, which then reports [`CoreError::InvocationDropped`].
pub struct CompletionHandle {
    inner: Arc<CompletionState>,
}

impl CompletionHandle {
    /// Signal that the invocation is complete.
    fn signal_done(self) {
        self.inner.finish(CompletionOutcome::Done);
    }
}

impl Drop for CompletionHandle {
    fn drop(&mut self) {
        // Wake the waiter even if the invocation never ran (e.g. the owner
        // loop was dropped with the invocation still queued).
        self.inner.finish(CompletionOutcome::Dropped);
    }
}

/// A waiter for blocking on invocation completion.
pub struct CompletionWaiter {
    inner: Arc<CompletionState>,
}

impl CompletionWaiter {
    /// Block the current thread until the invocation completes.
    ///
    /// Returns an error if the invocation was dropped before running.
    ///
    /// # Warning
    ///
    /// Calling this from the owner thread itself will deadlock, since the
    /// owner can no longer service its own run loop. The thread-role
    /// assertions in the tree layer guard against this.
    pub fn wait(self) -> CoreResult<()> {
        let mut outcome = self.inner.outcome.lock();
        while outcome.is_none() {
            self.inner.condvar.wait(&mut outcome);
        }
        match outcome.unwrap() {
            CompletionOutcome::Done => Ok(()),
            CompletionOutcome::Dropped => Err(CoreError::InvocationDropped),
        }
    }

    /// Wait for completion with a timeout. Test use only; production
    /// callers rely on the timeout-free contract of [`wait`](Self::wait).
    ///
    /// Returns `true` if the invocation completed, `false` on timeout.
    pub fn wait_timeout(self, timeout: std::time::Duration) -> bool {
        let mut outcome = self.inner.outcome.lock();
        if outcome.is_some() {
            return true;
        }
        let result = self.inner.condvar.wait_for(&mut outcome, timeout);
        outcome.is_some() || !result.timed_out()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum CompletionOutcome {
    Done,
    Dropped,
}

struct CompletionState {
    outcome: Mutex<Option<CompletionOutcome>>,
    condvar: Condvar,
}

impl CompletionState {
    fn finish(&self, result: CompletionOutcome) {
        let mut outcome = self.outcome.lock();
        // signal_done runs before the handle drops; keep the first outcome.
        if outcome.is_none() {
            *outcome = Some(result);
            self.condvar.notify_all();
        }
    }
}

/// Create a completion handle/waiter pair for blocking invocations.
pub fn completion_pair() -> (CompletionHandle, CompletionWaiter) {
    let state = Arc::new(CompletionState {
        outcome: Mutex::new(None),
        condvar: Condvar::new(),
    });

    (
        CompletionHandle {
            inner: state.clone(),
        },
        CompletionWaiter { inner: state },
    )
}

/// The sending half: posts and blocks-on invocations serviced by the owner
/// thread.
///
/// Cloneable so that every tree sharing one owner thread can hold its own
/// proxy.
#[derive(Clone)]
pub struct OwnerProxy {
    sender: crossbeam_channel::Sender<OwnerInvocation>,
}

impl OwnerProxy {
    /// Post a fire-and-forget closure to the owner thread.
    pub fn post<F>(&self, f: F) -> CoreResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.sender
            .send(OwnerInvocation::new(f))
            .map_err(|_| CoreError::OwnerLoopClosed)
    }

    /// Run a closure on the owner thread and block until it returns.
    ///
    /// The calling thread is suspended until the owner's run loop services
    /// the invocation; the closure's return value is then handed back.
    pub fn call<F, R>(&self, f: F) -> CoreResult<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (handle, waiter) = completion_pair();
        let slot = Arc::new(Mutex::new(None));
        let slot_clone = slot.clone();

        let invocation = OwnerInvocation::with_completion(
            move || {
                *slot_clone.lock() = Some(f());
            },
            handle,
        );
        self.sender
            .send(invocation)
            .map_err(|_| CoreError::OwnerLoopClosed)?;

        waiter.wait()?;
        slot.lock().take().ok_or(CoreError::InvocationDropped)
    }
}

/// The receiving half, serviced by the owner thread.
pub struct OwnerLoop {
    receiver: crossbeam_channel::Receiver<OwnerInvocation>,
}

impl OwnerLoop {
    /// Execute all currently queued invocations without blocking.
    ///
    /// Returns the number of invocations executed. Call this from the owner
    /// thread's normal turn-taking.
    pub fn service(&self) -> usize {
        let mut count = 0;
        while let Ok(invocation) = self.receiver.try_recv() {
            invocation.execute();
            count += 1;
        }
        count
    }

    /// Block until one invocation arrives, then execute it.
    ///
    /// Returns an error when every proxy has been dropped.
    pub fn service_one(&self) -> CoreResult<()> {
        let invocation = self
            .receiver
            .recv()
            .map_err(|_| CoreError::OwnerLoopClosed)?;
        invocation.execute();
        Ok(())
    }

    /// The number of invocations currently queued.
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }
}

/// Create a connected proxy/loop pair.
pub fn owner_channel() -> (OwnerProxy, OwnerLoop) {
    let (sender, receiver) = crossbeam_channel::unbounded();
    (OwnerProxy { sender }, OwnerLoop { receiver })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_post_and_service() {
        let (proxy, owner_loop) = owner_channel();
        let executed = Arc::new(AtomicBool::new(false));

        let executed_clone = executed.clone();
        proxy
            .post(move || {
                executed_clone.store(true, Ordering::SeqCst);
            })
            .unwrap();

        assert_eq!(owner_loop.pending_count(), 1);
        assert_eq!(owner_loop.service(), 1);
        assert!(executed.load(Ordering::SeqCst));
        assert_eq!(owner_loop.pending_count(), 0);
    }

    #[test]
    fn test_blocking_call_returns_value() {
        let (proxy, owner_loop) = owner_channel();

        let owner = std::thread::spawn(move || {
            // Service until the proxy side disconnects.
            while owner_loop.service_one().is_ok() {}
        });

        let result: i32 = proxy.call(|| 21 * 2).unwrap();
        assert_eq!(result, 42);

        drop(proxy);
        owner.join().unwrap();
    }

    #[test]
    fn test_call_after_loop_dropped() {
        let (proxy, owner_loop) = owner_channel();
        drop(owner_loop);

        let result = proxy.call(|| 1);
        assert_eq!(result, Err(CoreError::OwnerLoopClosed));
    }

    #[test]
    fn test_dropped_invocation_unblocks_waiter() {
        let (proxy, owner_loop) = owner_channel();

        let caller = std::thread::spawn(move || proxy.call(|| 7));

        // Drop the loop with the invocation still queued. The queued
        // invocation's completion handle drops with it, waking the caller.
        std::thread::sleep(std::time::Duration::from_millis(20));
        drop(owner_loop);

        let result = caller.join().unwrap();
        assert!(result.is_err());
    }

    #[test]
    fn test_completion_pair() {
        let (handle, waiter) = completion_pair();

        let thread = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(10));
            handle.signal_done();
        });

        waiter.wait().unwrap();
        thread.join().unwrap();
    }

    #[test]
    fn test_completion_timeout() {
        let (_handle, waiter) = completion_pair();
        // _handle is still alive, so the waiter should time out.
        let completed = waiter.wait_timeout(std::time::Duration::from_millis(10));
        assert!(!completed);
    }
}
