use core::{
    cell::UnsafeCell,
    marker::PhantomData,
    ops::{Deref, DerefMut},
    sync::atomic::{AtomicBool, Ordering},
};

use spin::relax::{RelaxStrategy, Spin};

/// A test-and-test-and-set spinlock.
///
/// Acquiring swaps the flag to `true`; if it was already held, the waiter
/// spins on plain loads until the flag looks free and only then retries the
/// swap, so contended waiters don't keep stealing the cache line from each
/// other. `R` decides what to do on every spin iteration.
pub struct SpinLock<T, R = Spin> {
    locked: AtomicBool,
    data: UnsafeCell<T>,
    relax: PhantomData<R>,
}

// SAFETY: the lock hands out access to `data` to one thread at a time.
unsafe impl<T: Send, R> Sync for SpinLock<T, R> {}
unsafe impl<T: Send, R> Send for SpinLock<T, R> {}

impl<T, R> SpinLock<T, R> {
    /// Creates a new unlocked spinlock wrapping the given data.
    pub const fn new(data: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            data: UnsafeCell::new(data),
            relax: PhantomData,
        }
    }

    /// Is the lock currently held by someone?
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }
}

impl<T, R: RelaxStrategy> SpinLock<T, R> {
    /// Acquires the lock, spinning until it becomes available.
    pub fn lock(&self) -> SpinLockGuard<'_, T, R> {
        while self.locked.swap(true, Ordering::Acquire) {
            while self.is_locked() {
                R::relax();
            }
        }
        SpinLockGuard { lock: self }
    }
}

impl<T: Default, R> Default for SpinLock<T, R> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// Gives access to the data of a [`SpinLock`] and releases it when dropped.
pub struct SpinLockGuard<'a, T, R> {
    lock: &'a SpinLock<T, R>,
}

impl<T, R> Deref for SpinLockGuard<'_, T, R> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: holding the guard means holding the lock.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T, R> DerefMut for SpinLockGuard<'_, T, R> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: holding the guard means holding the lock.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T, R> Drop for SpinLockGuard<'_, T, R> {
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
    }
}
