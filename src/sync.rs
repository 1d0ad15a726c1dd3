// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Synchronization primitives: the phase barrier and its release guards.

use crate::macros::{log_debug, log_error};
use crate::util::Status;
use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A counting semaphore built on a [`Status`], with an initial value of zero.
struct Semaphore {
    permits: Status<usize>,
}

impl Semaphore {
    fn new() -> Self {
        Self {
            permits: Status::new(0),
        }
    }

    /// Makes one permit available, waking up one waiter.
    ///
    /// This is called from [`Drop`] implementations (possibly during
    /// unwinding), so it must not panic. A poisoned mutex means an acquiring
    /// thread panicked while holding the lock, in which case nothing is
    /// waiting for this permit anymore.
    fn post(&self) {
        if let Err(_e) = self.permits.try_update_notify_one(|permits| *permits += 1) {
            log_error!("Failed to post the semaphore, the mutex was poisoned: {_e:?}");
        }
    }

    /// Blocks until a permit is available, and consumes it.
    fn acquire(&self) {
        let mut guard = self.permits.wait_while(|permits| *permits == 0);
        *guard -= 1;
    }
}

/// A reusable counting barrier for bulk-synchronous fork/join phases.
///
/// A phase consists of a number of [`register()`](Self::register) calls, each
/// accounting for one unit of outstanding work, followed by one
/// [`wait_for_all()`](Self::wait_for_all) call that blocks until every
/// registration of the phase has been released. The barrier then starts over
/// at zero: there is no terminal state, a barrier can serve any number of
/// successive phases.
///
/// Registrations are usually made on the caller's behalf by the dispatch
/// methods of [`DispatchExt`](crate::DispatchExt).
///
/// ```
/// use forkjoin::{DispatchExt, InlineExecutor, PhaseBarrier};
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// let executor = InlineExecutor;
/// let barrier = PhaseBarrier::new();
/// let counter = Arc::new(AtomicUsize::new(0));
/// for _ in 0..10 {
///     let counter = Arc::clone(&counter);
///     executor.dispatch_synced(&barrier, move || {
///         counter.fetch_add(1, Ordering::SeqCst);
///     });
/// }
/// barrier.wait_for_all();
/// assert_eq!(counter.load(Ordering::SeqCst), 10);
/// ```
pub struct PhaseBarrier {
    /// Number of registrations in the current phase. Incremented atomically,
    /// so any number of threads may register concurrently with each other.
    pending: CachePadded<AtomicUsize>,
    /// Semaphore posted once per dropped [`ReleaseGuard`]. Shared with the
    /// guards via [`Arc`] so that a guard can outlive the barrier value
    /// without posting into freed memory; the barrier's own drop still joins
    /// the phase first.
    semaphore: Arc<Semaphore>,
}

impl PhaseBarrier {
    /// Creates a barrier with no outstanding registrations.
    pub fn new() -> Self {
        Self {
            pending: CachePadded::new(AtomicUsize::new(0)),
            semaphore: Arc::new(Semaphore::new()),
        }
    }

    /// Accounts for one unit of outstanding work in the current phase and
    /// returns the guard that releases it.
    ///
    /// This never blocks and is safe to call from multiple threads at once.
    pub fn register(&self) -> ReleaseGuard {
        self.pending.fetch_add(1, Ordering::SeqCst);
        ReleaseGuard {
            semaphore: self.semaphore.clone(),
        }
    }

    /// Blocks until every registration of the current phase has been
    /// released, then resets the barrier for the next phase.
    ///
    /// The number of registrations is read once on entry: all
    /// [`register()`](Self::register) calls of a phase must happen before the
    /// phase's `wait_for_all()` starts. Registering while a join is in flight
    /// undercounts the phase and is not supported.
    ///
    /// With zero outstanding registrations this returns immediately.
    ///
    /// Forward-progress hazard: every guard posts when dropped, even while
    /// unwinding a panicking task, but an executor that discards a task
    /// without ever destroying it makes the corresponding post never happen
    /// and this call would then block forever.
    pub fn wait_for_all(&self) {
        let registered = self.pending.load(Ordering::SeqCst);
        log_debug!("[barrier] Waiting for {registered} outstanding task(s).");
        for _ in 0..registered {
            self.semaphore.acquire();
        }
        self.pending.store(0, Ordering::SeqCst);
        log_debug!("[barrier] Phase complete, barrier reset.");
    }
}

impl Default for PhaseBarrier {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PhaseBarrier {
    /// Joins the current phase, so that the barrier never goes away while a
    /// registration is still unreleased.
    fn drop(&mut self) {
        self.wait_for_all();
    }
}

/// A guard tied to one [`PhaseBarrier`] registration, releasing it when
/// dropped.
///
/// The release happens exactly once per guard, on every exit path of the
/// owning scope, including unwinding when a task body panics.
///
/// A guard is move-only: one registration, one owner, one release. Sharing a
/// guard between sub-tasks doesn't compile, which rules out releasing a single
/// registration twice (a double release would make a later
/// [`wait_for_all()`](PhaseBarrier::wait_for_all) consume more posts than
/// genuinely outstanding work and under-block):
///
/// ```compile_fail
/// let barrier = forkjoin::PhaseBarrier::new();
/// let guard = barrier.register();
/// let copy = guard.clone();
/// drop(guard);
/// drop(copy);
/// barrier.wait_for_all();
/// ```
pub struct ReleaseGuard {
    /// The owning barrier's semaphore.
    semaphore: Arc<Semaphore>,
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        self.semaphore.post();
    }
}
