// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Provided [`Executor`] implementations: a queue-backed thread pool and a
//! synchronous inline executor.

use crate::dispatch::{Executor, Task};
use crate::macros::{log_debug, log_error, log_warn};
use crate::util::Status;
// Platforms that support `libc::sched_setaffinity()`.
#[cfg(all(
    not(miri),
    any(
        target_os = "android",
        target_os = "dragonfly",
        target_os = "freebsd",
        target_os = "linux"
    )
))]
use nix::{
    sched::{sched_setaffinity, CpuSet},
    unistd::Pid,
};
use std::collections::VecDeque;
use std::convert::TryFrom;
use std::num::NonZeroUsize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;

/// An executor that runs each task synchronously, inside
/// [`submit()`](Executor::submit) itself.
///
/// Useful as a serial baseline and for testing fork/join code in isolation: a
/// phase's tasks have all finished by the time
/// [`wait_for_all()`](crate::PhaseBarrier::wait_for_all) is called, which
/// therefore never blocks.
///
/// Like the thread pool, this executor contains task failures: a panicking
/// callable is caught and logged instead of unwinding into the dispatching
/// code.
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    fn submit(&self, task: Task) {
        if let Err(_e) = catch_unwind(AssertUnwindSafe(|| task.run())) {
            log_error!("[inline executor] A task panicked: {_e:?}");
        }
    }
}

/// Number of threads to spawn in a thread pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThreadCount {
    /// Spawn the number of threads returned by
    /// [`std::thread::available_parallelism()`].
    AvailableParallelism,
    /// Spawn the given number of threads.
    Count(NonZeroUsize),
}

impl TryFrom<usize> for ThreadCount {
    type Error = <NonZeroUsize as TryFrom<usize>>::Error;

    fn try_from(thread_count: usize) -> Result<Self, Self::Error> {
        let count = NonZeroUsize::try_from(thread_count)?;
        Ok(ThreadCount::Count(count))
    }
}

/// Policy to pin worker threads to CPUs.
#[derive(Clone, Copy)]
pub enum CpuPinningPolicy {
    /// Don't pin worker threads to CPUs.
    No,
    /// Pin each worker thread to a CPU, if CPU pinning is supported and
    /// implemented on this platform.
    IfSupported,
    /// Pin each worker thread to a CPU. If CPU pinning isn't supported on this
    /// platform (or not implemented), building a thread pool will panic.
    Always,
}

/// A builder for [`ThreadPool`].
pub struct ThreadPoolBuilder {
    /// Number of worker threads to spawn in the pool.
    pub num_threads: ThreadCount,
    /// Policy to pin worker threads to CPUs.
    pub cpu_pinning: CpuPinningPolicy,
}

impl ThreadPoolBuilder {
    /// Spawns a thread pool.
    ///
    /// ```
    /// # use forkjoin::{CpuPinningPolicy, DispatchExt, PhaseBarrier, ThreadCount, ThreadPoolBuilder};
    /// # use std::sync::atomic::{AtomicUsize, Ordering};
    /// # use std::sync::Arc;
    /// let pool_builder = ThreadPoolBuilder {
    ///     num_threads: ThreadCount::AvailableParallelism,
    ///     cpu_pinning: CpuPinningPolicy::No,
    /// };
    /// let pool = pool_builder.build();
    ///
    /// let barrier = PhaseBarrier::new();
    /// let counter = Arc::new(AtomicUsize::new(0));
    /// for _ in 0..10 {
    ///     let counter = Arc::clone(&counter);
    ///     pool.dispatch_synced(&barrier, move || {
    ///         counter.fetch_add(1, Ordering::SeqCst);
    ///     });
    /// }
    /// barrier.wait_for_all();
    /// assert_eq!(counter.load(Ordering::SeqCst), 10);
    /// ```
    pub fn build(&self) -> ThreadPool {
        ThreadPool::new(self)
    }
}

/// State of the shared task queue.
struct QueueState {
    /// Tasks submitted but not yet picked up by a worker.
    tasks: VecDeque<Task>,
    /// Whether the pool is shutting down. Workers exit once this is set and
    /// the queue is empty, so every submitted task still runs exactly once.
    shutdown: bool,
}

/// A fixed-size pool of worker threads serving a shared FIFO task queue.
///
/// This is the provided [`Executor`]: [`submit()`](Executor::submit) pushes
/// the task and wakes one worker; workers block on the queue otherwise. Tasks
/// run on any worker, in no guaranteed order relative to other submissions.
///
/// A panicking task is caught on its worker and logged; the worker keeps
/// serving the queue, and the task's barrier registration (if any) is
/// released during unwinding, so a phase join still makes progress.
///
/// Dropping the pool lets the workers drain every already-submitted task
/// before joining them, which makes the drop a synchronization point for
/// fire-and-forget tasks.
pub struct ThreadPool {
    /// Handles to all the worker threads in the pool.
    threads: Vec<WorkerThreadHandle>,
    /// Queue shared with the worker threads.
    queue: Arc<Status<QueueState>>,
}

/// Handle to a worker thread in a thread pool.
struct WorkerThreadHandle {
    /// Thread handle object.
    handle: JoinHandle<()>,
}

impl ThreadPool {
    /// Creates a new thread pool using the given parameters.
    fn new(builder: &ThreadPoolBuilder) -> Self {
        let num_threads: NonZeroUsize = match builder.num_threads {
            ThreadCount::AvailableParallelism => std::thread::available_parallelism()
                .expect("Getting the available parallelism failed"),
            ThreadCount::Count(count) => count,
        };
        let num_threads: usize = num_threads.into();

        let queue = Arc::new(Status::new(QueueState {
            tasks: VecDeque::new(),
            shutdown: false,
        }));

        #[cfg(any(
            miri,
            not(any(
                target_os = "android",
                target_os = "dragonfly",
                target_os = "freebsd",
                target_os = "linux"
            ))
        ))]
        match builder.cpu_pinning {
            CpuPinningPolicy::No => (),
            CpuPinningPolicy::IfSupported => {
                log_warn!("Pinning threads to CPUs is not implemented on this platform.")
            }
            CpuPinningPolicy::Always => {
                panic!("Pinning threads to CPUs is not implemented on this platform.")
            }
        }

        let cpu_pinning = builder.cpu_pinning;
        let threads = (0..num_threads)
            .map(|id| {
                let context = WorkerContext {
                    #[cfg(feature = "log")]
                    id,
                    queue: queue.clone(),
                };
                WorkerThreadHandle {
                    handle: std::thread::spawn(move || {
                        #[cfg(all(
                            not(miri),
                            any(
                                target_os = "android",
                                target_os = "dragonfly",
                                target_os = "freebsd",
                                target_os = "linux"
                            )
                        ))]
                        match cpu_pinning {
                            CpuPinningPolicy::No => (),
                            CpuPinningPolicy::IfSupported => {
                                let mut cpu_set = CpuSet::new();
                                if let Err(_e) = cpu_set.set(id) {
                                    log_warn!("Failed to set CPU affinity for thread #{id}: {_e}");
                                } else if let Err(_e) =
                                    sched_setaffinity(Pid::from_raw(0), &cpu_set)
                                {
                                    log_warn!("Failed to set CPU affinity for thread #{id}: {_e}");
                                } else {
                                    log_debug!("Pinned thread #{id} to CPU #{id}");
                                }
                            }
                            CpuPinningPolicy::Always => {
                                let mut cpu_set = CpuSet::new();
                                if let Err(e) = cpu_set.set(id) {
                                    panic!("Failed to set CPU affinity for thread #{id}: {e}");
                                } else if let Err(e) = sched_setaffinity(Pid::from_raw(0), &cpu_set)
                                {
                                    panic!("Failed to set CPU affinity for thread #{id}: {e}");
                                } else {
                                    log_debug!("Pinned thread #{id} to CPU #{id}");
                                }
                            }
                        }
                        context.run()
                    }),
                }
            })
            .collect();
        log_debug!("[pool] Spawned threads");

        Self { threads, queue }
    }

    /// Returns the number of worker threads that have been spawned in this
    /// thread pool.
    pub fn num_threads(&self) -> NonZeroUsize {
        self.threads.len().try_into().unwrap()
    }
}

impl Executor for ThreadPool {
    fn submit(&self, task: Task) {
        self.queue.update_notify_one(|state| state.tasks.push_back(task));
    }
}

impl Drop for ThreadPool {
    /// Signals shutdown, then joins all the threads in the pool once they
    /// have drained the queue.
    #[allow(clippy::unused_enumerate_index)]
    fn drop(&mut self) {
        log_debug!("[pool] Notifying workers to finish...");
        self.queue.update_notify_all(|state| state.shutdown = true);

        log_debug!("[pool] Joining threads in the pool...");
        for (_i, t) in self.threads.drain(..).enumerate() {
            let result = t.handle.join();
            match result {
                Ok(_) => log_debug!("[pool] Thread {_i} joined with result: {result:?}"),
                Err(_) => log_error!("[pool] Thread {_i} joined with result: {result:?}"),
            }
        }
        log_debug!("[pool] Joined threads.");
    }
}

/// Context object owned by a worker thread.
struct WorkerContext {
    /// Thread index.
    #[cfg(feature = "log")]
    id: usize,
    /// Queue shared with the pool and the other workers.
    queue: Arc<Status<QueueState>>,
}

impl WorkerContext {
    /// Main loop run by this worker thread.
    fn run(&self) {
        loop {
            let mut guard = self
                .queue
                .wait_while(|state| state.tasks.is_empty() && !state.shutdown);
            let task = match guard.tasks.pop_front() {
                Some(task) => task,
                // Shutdown was signaled and the queue is drained.
                None => {
                    log_debug!("[worker {}] Received finish signal", self.id);
                    break;
                }
            };
            drop(guard);

            log_debug!("[worker {}] Picked up a task. Running...", self.id);
            // The task owns everything it touches, and a caught panic only
            // drops it, so resuming this worker afterwards observes no broken
            // state.
            if let Err(_e) = catch_unwind(AssertUnwindSafe(|| task.run())) {
                log_error!("[worker {}] A task panicked: {_e:?}", self.id);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::dispatch::DispatchExt;
    use crate::sync::PhaseBarrier;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn pool(num_threads: usize) -> ThreadPool {
        ThreadPoolBuilder {
            num_threads: ThreadCount::try_from(num_threads).unwrap(),
            cpu_pinning: CpuPinningPolicy::No,
        }
        .build()
    }

    #[test]
    fn thread_count_rejects_zero() {
        assert!(ThreadCount::try_from(0).is_err());
        assert_eq!(
            ThreadCount::try_from(4).unwrap(),
            ThreadCount::Count(NonZeroUsize::try_from(4).unwrap())
        );
    }

    #[test]
    fn inline_executor_runs_at_submission_time() {
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let counter = counter.clone();
            InlineExecutor.dispatch(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn pool_spawns_the_requested_number_of_threads() {
        let pool = pool(4);
        assert_eq!(pool.num_threads().get(), 4);
    }

    #[test]
    fn pool_with_available_parallelism_spawns_threads() {
        let pool = ThreadPoolBuilder {
            num_threads: ThreadCount::AvailableParallelism,
            cpu_pinning: CpuPinningPolicy::No,
        }
        .build();
        assert!(pool.num_threads().get() >= 1);
    }

    #[test]
    fn pool_runs_every_submitted_task() {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let pool = pool(4);
            for _ in 0..100 {
                let counter = counter.clone();
                pool.dispatch(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                });
            }
            // Dropping the pool drains the queue and joins the workers.
        }
        assert_eq!(counter.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn pool_drains_slow_tasks_on_drop() {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let pool = pool(2);
            for _ in 0..10 {
                let counter = counter.clone();
                pool.dispatch(move || {
                    std::thread::sleep(Duration::from_millis(5));
                    counter.fetch_add(1, Ordering::SeqCst);
                });
            }
        }
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn worker_survives_a_panicking_task() {
        let barrier = PhaseBarrier::new();
        let counter = Arc::new(AtomicUsize::new(0));
        {
            // A single worker, so the same thread that caught the panic must
            // also serve the next task.
            let pool = pool(1);
            pool.dispatch_synced(&barrier, || panic!("task panic"));
            let counter = counter.clone();
            pool.dispatch_synced(&barrier, move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
            barrier.wait_for_all();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
