//! Kernel state locking mechanism
//!
//! The scheduler state is guarded by a single lock. Public kernel operations
//! acquire it once on entry and pass `&mut State` down to the internal
//! functions that implement them, so an operation that is composed of other
//! operations (e.g., task creation followed by rescheduling) never tries to
//! reacquire the lock it already holds.
use core::{fmt, ops};

/// The kernel lock. Contains the data it protects.
pub(crate) struct KernelLock<T>(spin::Mutex<T>);

impl<T> KernelLock<T> {
    pub(crate) const fn new(x: T) -> Self {
        Self(spin::Mutex::new(x))
    }

    /// Acquire the kernel lock and get an RAII guard.
    #[inline]
    pub(crate) fn lock(&self) -> KernelLockGuard<'_, T> {
        KernelLockGuard(self.0.lock())
    }
}

impl<T: fmt::Debug> fmt::Debug for KernelLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        // Don't wait for the lock; the caller might be the one holding it
        if let Some(inner) = self.0.try_lock() {
            f.write_str("KernelLock(")?;
            inner.fmt(f)?;
            f.write_str(")")
        } else {
            f.write_str("KernelLock(< locked >)")
        }
    }
}

/// RAII guard for the kernel lock.
pub(crate) struct KernelLockGuard<'a, T>(spin::MutexGuard<'a, T>);

impl<T> ops::Deref for KernelLockGuard<'_, T> {
    type Target = T;
    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T> ops::DerefMut for KernelLockGuard<'_, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}
