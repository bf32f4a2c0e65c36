//! # Mutex

use core::{
    fmt,
    ops::{Deref, DerefMut},
};

pub use crate::result::{TryLockError, TryLockResult};

/// A mutual exclusion primitive useful for protecting shared data.
///
/// This mutex blocks contexts waiting for the lock to become available. Each
/// mutex has a type parameter which represents the data it protects. The data
/// can only be accessed through the RAII guards returned from [`lock`] and
/// [`try_lock`], which guarantees the data is only ever touched while the
/// mutex is held.
///
/// Unlike `std::sync::Mutex` there is no poisoning: if a context panics while
/// holding the lock, the lock is released and the next waiter proceeds. The
/// kernel simulation relies on this so that one crashed context cannot wedge
/// the kernel lock for everyone else.
///
/// [`lock`]: Mutex::lock
/// [`try_lock`]: Mutex::try_lock
pub struct Mutex<T: ?Sized> {
    inner: parking_lot::Mutex<T>,
}

impl<T> Mutex<T> {
    /// Creates a new mutex in an unlocked state ready for use.
    #[inline]
    pub const fn new(data: T) -> Mutex<T> {
        Mutex {
            inner: parking_lot::Mutex::new(data),
        }
    }

    /// Consumes this mutex, returning the underlying data.
    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }
}

impl<T: ?Sized> Mutex<T> {
    /// Acquires the mutex, blocking the current context until it is able to
    /// do so.
    ///
    /// An RAII guard is returned; the lock is released when the guard goes
    /// out of scope. Locking a mutex the current context already holds
    /// deadlocks.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        MutexGuard {
            inner: self.inner.lock(),
        }
    }

    /// Attempts to acquire this lock without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`TryLockError::WouldBlock`] if the lock is currently held.
    pub fn try_lock(&self) -> TryLockResult<MutexGuard<'_, T>> {
        match self.inner.try_lock() {
            Some(guard) => Ok(MutexGuard { inner: guard }),
            None => Err(TryLockError::WouldBlock),
        }
    }

    /// Returns a mutable reference to the underlying data.
    ///
    /// Since this call borrows the `Mutex` mutably, no actual locking needs
    /// to take place.
    pub fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }
}

impl<T> From<T> for Mutex<T> {
    /// Creates a new mutex in an unlocked state ready for use.
    /// This is equivalent to [`Mutex::new`].
    fn from(t: T) -> Self {
        Mutex::new(t)
    }
}

impl<T: ?Sized + Default> Default for Mutex<T> {
    /// Creates a `Mutex<T>`, with the `Default` value for T.
    fn default() -> Mutex<T> {
        Mutex::new(Default::default())
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for Mutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("Mutex");
        match self.try_lock() {
            Ok(guard) => {
                d.field("data", &&*guard);
            }
            Err(TryLockError::WouldBlock) => {
                d.field("data", &format_args!("<locked>"));
            }
        }
        d.finish_non_exhaustive()
    }
}

/// An RAII scoped lock of a [`Mutex`]. The protected data is reachable
/// through the guard's [`Deref`] and [`DerefMut`] implementations.
#[must_use = "if unused the Mutex will immediately unlock"]
pub struct MutexGuard<'a, T: ?Sized> {
    inner: parking_lot::MutexGuard<'a, T>,
}

impl<T: ?Sized> Deref for MutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T: ?Sized> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for MutexGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

impl<T: ?Sized + fmt::Display> fmt::Display for MutexGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        (**self).fmt(f)
    }
}

// The condvar needs the backing guard to suspend on; everyone else only ever
// sees the wrapper.
pub(crate) fn guard_inner<'a, 'g, T: ?Sized>(
    guard: &'g mut MutexGuard<'a, T>,
) -> &'g mut parking_lot::MutexGuard<'a, T> {
    &mut guard.inner
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::*;

    #[test]
    fn test_lock_guards_data() {
        let m = Mutex::new(5);
        *m.lock() += 1;
        assert_eq!(*m.lock(), 6);
        assert_eq!(m.into_inner(), 6);
    }

    #[test]
    fn test_try_lock_would_block() {
        let m = Mutex::new(());
        let guard = m.lock();
        assert!(matches!(m.try_lock(), Err(TryLockError::WouldBlock)));
        drop(guard);
        assert!(m.try_lock().is_ok());
    }

    #[test]
    fn test_contended_increments() {
        let m = Arc::new(Mutex::new(0u32));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let m = m.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        *m.lock() += 1;
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(*m.lock(), 4000);
    }

    #[test]
    fn test_get_mut() {
        let mut m = Mutex::new(7);
        *m.get_mut() = 8;
        assert_eq!(*m.lock(), 8);
    }

    #[test]
    fn test_debug_while_locked() {
        let m = Mutex::new(1);
        let _guard = m.lock();
        assert!(format!("{m:?}").contains("<locked>"));
    }
}
