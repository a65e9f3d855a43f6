//! Recursive mutexes
use core::fmt;
use std::{
    sync::Mutex as StdMutex,
    thread::{self, ThreadId},
};

use crate::{
    cfg::Ticks,
    error::{GiveRecursiveMutexError, TakeError},
    mutex::Mutex,
    timeout,
};

/// A [`Mutex`] that the owning thread can acquire repeatedly. It's released
/// when the owner has called [`give`](Self::give) as many times as
/// [`take`](Self::take).
pub struct RecursiveMutex {
    mutex: Mutex,
    st: StdMutex<RecursionSt>,
}

#[derive(Debug, Default)]
struct RecursionSt {
    owner: Option<ThreadId>,
    count: usize,
}

impl Default for RecursiveMutex {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RecursiveMutex {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let st = timeout::lock(&self.st);
        f.debug_struct("RecursiveMutex")
            .field("owner", &st.owner)
            .field("recursion_count", &st.count)
            .finish()
    }
}

impl RecursiveMutex {
    pub fn new() -> Self {
        Self {
            mutex: Mutex::new(),
            st: StdMutex::new(RecursionSt::default()),
        }
    }

    /// Acquire the mutex. If the calling thread already holds it, this only
    /// increments the recursion count and returns immediately. Otherwise it
    /// waits up to `timeout_ticks` ticks.
    pub fn take(&self, timeout_ticks: Ticks) -> Result<(), TakeError> {
        let me = thread::current().id();
        {
            let mut st = timeout::lock(&self.st);
            if st.count > 0 && st.owner == Some(me) {
                st.count += 1;
                return Ok(());
            }
        }

        self.mutex.take(timeout_ticks)?;

        let mut st = timeout::lock(&self.st);
        st.owner = Some(me);
        st.count = 1;
        Ok(())
    }

    /// Decrement the recursion count, releasing the mutex when it reaches
    /// zero.
    ///
    /// Fails with [`GiveRecursiveMutexError::NotOwner`] if the calling thread
    /// doesn't hold the mutex.
    pub fn give(&self) -> Result<(), GiveRecursiveMutexError> {
        let mut st = timeout::lock(&self.st);
        if st.count == 0 || st.owner != Some(thread::current().id()) {
            return Err(GiveRecursiveMutexError::NotOwner);
        }

        st.count -= 1;
        if st.count > 0 {
            return Ok(());
        }
        st.owner = None;
        drop(st);

        self.mutex.give()?;
        Ok(())
    }

    /// Get the number of unmatched `take` calls made by the owner.
    pub fn recursion_count(&self) -> usize {
        timeout::lock(&self.st).count
    }

    pub fn owner(&self) -> Option<ThreadId> {
        timeout::lock(&self.st).owner
    }

    pub fn is_locked(&self) -> bool {
        self.mutex.is_locked()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn nested_take_and_give() {
        let mutex = RecursiveMutex::new();
        mutex.take(0).unwrap();
        mutex.take(0).unwrap();
        mutex.take(0).unwrap();
        assert_eq!(mutex.recursion_count(), 3);

        mutex.give().unwrap();
        mutex.give().unwrap();
        assert!(mutex.is_locked());
        mutex.give().unwrap();
        assert!(!mutex.is_locked());
        assert_eq!(mutex.owner(), None);
        assert_eq!(mutex.give(), Err(GiveRecursiveMutexError::NotOwner));
    }

    #[test]
    fn other_thread_is_excluded() {
        let mutex = Arc::new(RecursiveMutex::new());
        mutex.take(0).unwrap();

        let mutex2 = Arc::clone(&mutex);
        let (take, give) = thread::spawn(move || (mutex2.take(0), mutex2.give()))
            .join()
            .unwrap();
        assert_eq!(take, Err(TakeError::Timeout));
        assert_eq!(give, Err(GiveRecursiveMutexError::NotOwner));
        assert_eq!(mutex.recursion_count(), 1);
    }

    #[test]
    fn released_mutex_passes_to_waiter() {
        let mutex = Arc::new(RecursiveMutex::new());
        mutex.take(0).unwrap();
        mutex.take(0).unwrap();

        let mutex2 = Arc::clone(&mutex);
        let waiter = thread::spawn(move || {
            mutex2.take(10_000).unwrap();
            let count = mutex2.recursion_count();
            mutex2.give().unwrap();
            count
        });

        thread::sleep(std::time::Duration::from_millis(20));
        mutex.give().unwrap();
        mutex.give().unwrap();
        assert_eq!(waiter.join().unwrap(), 1);
    }
}
