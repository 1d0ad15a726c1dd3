// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Task values, the executor contract and the dispatch entry points.

use crate::args::BindArgs;
use crate::sync::{PhaseBarrier, ReleaseGuard};

/// An opaque unit of work: a callable, closed over its bound arguments, plus
/// an optional barrier release guard.
///
/// A task is owned by the executor it was submitted to, which destroys it
/// after running it. The guard is released after the callable returns, or
/// while unwinding if the callable panics. An executor that destroys a task
/// without running it still releases the guard, so such a task can never make
/// a phase join block forever; the callable simply never ran.
pub struct Task {
    /// The user callable.
    run: Box<dyn FnOnce() + Send + 'static>,
    /// Barrier registration released when this task is destroyed, if the task
    /// was dispatched against a barrier. Only its drop matters.
    _release: Option<ReleaseGuard>,
}

impl Task {
    /// Wraps the given callable into an unsynchronized task.
    pub fn new(f: impl FnOnce() + Send + 'static) -> Self {
        Self {
            run: Box::new(f),
            _release: None,
        }
    }

    /// Ties this task to a barrier registration.
    fn synced(mut self, guard: ReleaseGuard) -> Self {
        self._release = Some(guard);
        self
    }

    /// Runs the callable, consuming the task.
    ///
    /// The release guard, if any, is dropped once the callable has returned
    /// or while unwinding a panic out of it.
    pub fn run(self) {
        (self.run)();
    }
}

/// The contract this crate requires from a task scheduler: accept one task
/// and run it exactly once, at some unspecified future time, on some thread.
///
/// Nothing is assumed about queueing, worker count or scheduling order.
/// See [`ThreadPool`](crate::ThreadPool) for the provided queue-backed
/// implementation and [`InlineExecutor`](crate::InlineExecutor) for the
/// synchronous one.
pub trait Executor {
    /// Takes ownership of the task for eventual single execution.
    fn submit(&self, task: Task);
}

/// Dispatch methods, available on every [`Executor`].
///
/// These are the four entry points for submitting work: synchronized against
/// a [`PhaseBarrier`] or fire-and-forget, each with or without a tuple of
/// bound arguments. Every form hands the task to the executor and returns
/// immediately; there is no result channel, the callable's side effects are
/// the only observable outcome.
pub trait DispatchExt: Executor {
    /// Submits `f` as a fire-and-forget task.
    ///
    /// No barrier tracks this task: it may outlive the dispatching scope
    /// arbitrarily, which is why the callable must be `'static`.
    fn dispatch<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit(Task::new(f));
    }

    /// Submits `f` as a task registered with the given barrier.
    ///
    /// The registration happens here, at submission time, not when the task
    /// eventually runs: a phase's count is fixed before any of its tasks
    /// starts executing. The registration is released when the executor
    /// destroys the task after running it.
    ///
    /// ```
    /// use forkjoin::{DispatchExt, InlineExecutor, PhaseBarrier};
    /// use std::sync::atomic::{AtomicUsize, Ordering};
    /// use std::sync::Arc;
    ///
    /// let executor = InlineExecutor;
    /// let barrier = PhaseBarrier::new();
    /// let counter = Arc::new(AtomicUsize::new(0));
    /// for _ in 0..3 {
    ///     let counter = Arc::clone(&counter);
    ///     executor.dispatch_synced(&barrier, move || {
    ///         counter.fetch_add(1, Ordering::SeqCst);
    ///     });
    /// }
    /// barrier.wait_for_all();
    /// assert_eq!(counter.load(Ordering::SeqCst), 3);
    /// ```
    fn dispatch_synced<F>(&self, barrier: &PhaseBarrier, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let guard = barrier.register();
        self.submit(Task::new(f).synced(guard));
    }

    /// Submits `f` as a fire-and-forget task, to be invoked with the bound
    /// arguments unpacked positionally.
    ///
    /// The arguments are captured by value now and applied when the task
    /// runs.
    ///
    /// ```
    /// use forkjoin::{DispatchExt, InlineExecutor};
    /// use std::sync::atomic::{AtomicUsize, Ordering};
    /// use std::sync::Arc;
    ///
    /// fn store_sum(slot: Arc<AtomicUsize>, a: usize, b: usize) {
    ///     slot.store(a + b, Ordering::SeqCst);
    /// }
    ///
    /// let slot = Arc::new(AtomicUsize::new(0));
    /// let executor = InlineExecutor;
    /// executor.dispatch_args(store_sum, (Arc::clone(&slot), 3, 4));
    /// drop(executor);
    /// assert_eq!(slot.load(Ordering::SeqCst), 7);
    /// ```
    fn dispatch_args<F, Args>(&self, f: F, args: Args)
    where
        F: BindArgs<Args> + Send + 'static,
        Args: Send + 'static,
    {
        self.submit(Task::new(move || f.call_bound(args)));
    }

    /// Submits `f` as a task registered with the given barrier, to be invoked
    /// with the bound arguments unpacked positionally.
    fn dispatch_synced_args<F, Args>(&self, barrier: &PhaseBarrier, f: F, args: Args)
    where
        F: BindArgs<Args> + Send + 'static,
        Args: Send + 'static,
    {
        let guard = barrier.register();
        self.submit(Task::new(move || f.call_bound(args)).synced(guard));
    }
}

impl<E: Executor + ?Sized> DispatchExt for E {}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Executor that drops every task without running it, as a broken
    /// scheduler would.
    struct DiscardingExecutor;

    impl Executor for DiscardingExecutor {
        fn submit(&self, task: Task) {
            drop(task);
        }
    }

    #[test]
    fn task_releases_its_guard_when_run() {
        let barrier = PhaseBarrier::new();
        let task = Task::new(|| ()).synced(barrier.register());
        task.run();
        barrier.wait_for_all();
    }

    #[test]
    fn task_dropped_unrun_still_releases_its_guard() {
        let barrier = PhaseBarrier::new();
        let ran = Arc::new(AtomicUsize::new(0));
        DiscardingExecutor.dispatch_synced(&barrier, {
            let ran = ran.clone();
            move || {
                ran.fetch_add(1, Ordering::SeqCst);
            }
        });
        // The join must not block on a task the executor threw away.
        barrier.wait_for_all();
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn registration_happens_at_submission_time() {
        /// Executor that parks tasks instead of running them.
        #[derive(Default)]
        struct ParkingExecutor {
            parked: std::sync::Mutex<Vec<Task>>,
        }

        impl Executor for ParkingExecutor {
            fn submit(&self, task: Task) {
                self.parked.lock().unwrap().push(task);
            }
        }

        let executor = ParkingExecutor::default();
        let barrier = PhaseBarrier::new();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..5 {
            let counter = counter.clone();
            executor.dispatch_synced(&barrier, move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        // The phase counts 5 tasks even though none has started yet.
        for task in executor.parked.lock().unwrap().drain(..) {
            task.run();
        }
        barrier.wait_for_all();
        assert_eq!(counter.load(Ordering::SeqCst), 5);
    }
}
