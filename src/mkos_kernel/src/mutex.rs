//! Mutexes
use core::fmt;
use std::{
    sync::Mutex as StdMutex,
    thread::{self, ThreadId},
};

use crate::{
    cfg::Ticks,
    error::{GiveError, TakeError},
    semaphore::Semaphore,
    timeout,
};

/// A binary semaphore that records which thread holds it.
///
/// [`give`](Self::give) does not check that the caller is the owner. There's
/// no priority inheritance; the lock blocks threads, not scheduler tasks.
pub struct Mutex {
    sem: Semaphore,
    owner: StdMutex<Option<ThreadId>>,
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Mutex {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Mutex")
            .field("owner", &self.owner())
            .finish()
    }
}

impl Mutex {
    /// Construct an unlocked mutex.
    pub fn new() -> Self {
        Self {
            sem: Semaphore::new(1, 1),
            owner: StdMutex::new(None),
        }
    }

    /// Acquire the mutex, waiting up to `timeout_ticks` ticks. On success, the
    /// calling thread becomes the owner.
    pub fn take(&self, timeout_ticks: Ticks) -> Result<(), TakeError> {
        self.sem.take(timeout_ticks)?;
        *timeout::lock(&self.owner) = Some(thread::current().id());
        Ok(())
    }

    /// Clear the owner and release the mutex, regardless of which thread
    /// calls it.
    ///
    /// Releasing an unlocked mutex is a no-op that returns
    /// [`GiveError::QueueOverflow`].
    pub fn give(&self) -> Result<(), GiveError> {
        *timeout::lock(&self.owner) = None;
        self.sem.give()
    }

    /// Get the thread that last acquired the mutex, if it's still held.
    pub fn owner(&self) -> Option<ThreadId> {
        *timeout::lock(&self.owner)
    }

    pub fn is_locked(&self) -> bool {
        self.sem.count() == 0
    }
}
