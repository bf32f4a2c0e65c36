//! # Condition variable
//!
//! The blocking half of the kernel's monitor discipline. A context that needs
//! a state change parks on a `Condvar` while atomically releasing the mutex
//! guard it holds; the context that makes the change signals the condvar
//! while still holding the lock. Waits are subject to spurious wakeups, so
//! callers always re-check their predicate in a loop.

use crate::mutex::{MutexGuard, guard_inner};

/// A condition variable tied to a [`Mutex`](crate::mutex::Mutex) by usage.
///
/// [`wait`] consumes the caller's guard and hands it back on wakeup, which
/// makes the release-suspend-reacquire step atomic: a notification sent
/// between the predicate check and the suspension cannot be lost as long as
/// the notifier holds the same mutex.
///
/// All waiters of one `Condvar` must wait with guards of the same mutex.
///
/// [`wait`]: Condvar::wait
pub struct Condvar {
    inner: parking_lot::Condvar,
}

impl Condvar {
    /// Creates a new condition variable ready to be waited on and notified.
    #[inline]
    pub const fn new() -> Condvar {
        Condvar {
            inner: parking_lot::Condvar::new(),
        }
    }

    /// Blocks the current context until this condition variable is notified.
    ///
    /// The mutex behind `guard` is released while the context sleeps and is
    /// reacquired before this returns, with the reacquired guard as the
    /// return value. May wake spuriously.
    pub fn wait<'a, T: ?Sized>(&self, mut guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
        self.inner.wait(guard_inner(&mut guard));
        guard
    }

    /// Wakes up one blocked waiter, if any.
    pub fn notify_one(&self) {
        self.inner.notify_one();
    }

    /// Wakes up all blocked waiters.
    ///
    /// This is the kernel's broadcast: every waiter becomes runnable and
    /// requeues on the mutex, the lock itself is not released by the caller.
    pub fn notify_all(&self) {
        self.inner.notify_all();
    }
}

impl Default for Condvar {
    fn default() -> Condvar {
        Condvar::new()
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread, time::Duration};

    use super::*;
    use crate::mutex::Mutex;

    #[test]
    fn test_wait_observes_notification() {
        let pair = Arc::new((Mutex::new(false), Condvar::new()));
        let waiter = {
            let pair = pair.clone();
            thread::spawn(move || {
                let (lock, cvar) = &*pair;
                let mut ready = lock.lock();
                while !*ready {
                    ready = cvar.wait(ready);
                }
            })
        };

        thread::sleep(Duration::from_millis(20));
        let (lock, cvar) = &*pair;
        *lock.lock() = true;
        cvar.notify_one();
        waiter.join().unwrap();
    }

    #[test]
    fn test_notify_all_wakes_every_waiter() {
        let pair = Arc::new((Mutex::new(false), Condvar::new()));
        let waiters: Vec<_> = (0..5)
            .map(|_| {
                let pair = pair.clone();
                thread::spawn(move || {
                    let (lock, cvar) = &*pair;
                    let mut go = lock.lock();
                    while !*go {
                        go = cvar.wait(go);
                    }
                })
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        let (lock, cvar) = &*pair;
        *lock.lock() = true;
        cvar.notify_all();
        for w in waiters {
            w.join().unwrap();
        }
    }

    #[test]
    fn test_wait_releases_the_lock() {
        let pair = Arc::new((Mutex::new(0u32), Condvar::new()));
        let waiter = {
            let pair = pair.clone();
            thread::spawn(move || {
                let (lock, cvar) = &*pair;
                let mut n = lock.lock();
                while *n == 0 {
                    n = cvar.wait(n);
                }
                *n
            })
        };

        thread::sleep(Duration::from_millis(20));
        let (lock, cvar) = &*pair;
        // If the waiter still held the lock this would deadlock.
        *lock.lock() = 7;
        cvar.notify_one();
        assert_eq!(waiter.join().unwrap(), 7);
    }
}
