// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// An ergonomic wrapper around a [`Mutex`]-[`Condvar`] pair.
pub struct Status<T> {
    mutex: Mutex<T>,
    condvar: Condvar,
}

impl<T> Status<T> {
    /// Creates a new status initialized with the given value.
    pub fn new(t: T) -> Self {
        Self {
            mutex: Mutex::new(t),
            condvar: Condvar::new(),
        }
    }

    /// Applies the update to the status and notifies one waiting thread.
    pub fn update_notify_one(&self, update: impl FnOnce(&mut T)) {
        update(&mut self.mutex.lock().unwrap());
        self.condvar.notify_one();
    }

    /// Attempts to apply the update to the status, notifying one waiting
    /// thread on success.
    ///
    /// Fails if the [`Mutex`] is poisoned.
    pub fn try_update_notify_one(
        &self,
        update: impl FnOnce(&mut T),
    ) -> Result<(), PoisonError<MutexGuard<'_, T>>> {
        let mut guard: MutexGuard<'_, T> = self.mutex.lock()?;
        update(&mut guard);
        drop(guard);
        self.condvar.notify_one();
        Ok(())
    }

    /// Applies the update to the status and notifies all waiting threads.
    pub fn update_notify_all(&self, update: impl FnOnce(&mut T)) {
        update(&mut self.mutex.lock().unwrap());
        self.condvar.notify_all();
    }

    /// Waits until the predicate is false on this status.
    ///
    /// This returns a [`MutexGuard`], allowing to further inspect or modify
    /// the status.
    pub fn wait_while(&self, predicate: impl FnMut(&mut T) -> bool) -> MutexGuard<T> {
        self.condvar
            .wait_while(self.mutex.lock().unwrap(), predicate)
            .unwrap()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn update_notify_one_wakes_a_waiter() {
        let status = Arc::new(Status::new(0));

        let waiter = std::thread::spawn({
            let status = status.clone();
            move || {
                let guard = status.wait_while(|count| *count == 0);
                *guard
            }
        });

        // Give the waiter a chance to block first.
        std::thread::sleep(Duration::from_millis(10));
        status.update_notify_one(|count| *count += 1);

        assert_eq!(waiter.join().unwrap(), 1);
    }

    #[test]
    fn update_notify_all_wakes_all_waiters() {
        const NUM_THREADS: usize = 4;

        let status = Arc::new(Status::new(false));

        let waiters: Vec<_> = (0..NUM_THREADS)
            .map(|_| {
                std::thread::spawn({
                    let status = status.clone();
                    move || {
                        let guard = status.wait_while(|done| !*done);
                        assert!(*guard);
                    }
                })
            })
            .collect();

        status.update_notify_all(|done| *done = true);

        for waiter in waiters {
            waiter.join().unwrap();
        }
    }

    #[test]
    fn wait_while_returns_immediately_if_predicate_is_false() {
        let status = Status::new(42);
        let guard = status.wait_while(|value| *value != 42);
        assert_eq!(*guard, 42);
    }
}
