//! Semaphores
use core::fmt;
use std::sync::{Condvar, Mutex};

use crate::{
    cfg::Ticks,
    error::{GiveError, TakeError},
    timeout,
};

/// A counting semaphore. A semaphore with `max_count == 1` is a binary
/// semaphore.
///
/// The count stays within `0..=max_count` at all times. Waiters block the
/// calling thread.
pub struct Semaphore {
    count: Mutex<usize>,
    max_count: usize,
    cv: Condvar,
}

impl fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Semaphore")
            .field("count", &self.count())
            .field("max_count", &self.max_count)
            .finish()
    }
}

impl Semaphore {
    /// Construct a semaphore. `initial_count` is clamped to `max_count`.
    pub fn new(max_count: usize, initial_count: usize) -> Self {
        Self {
            count: Mutex::new(initial_count.min(max_count)),
            max_count,
            cv: Condvar::new(),
        }
    }

    /// Construct a binary semaphore (`max_count == 1`).
    pub fn binary(available: bool) -> Self {
        Self::new(1, available as usize)
    }

    /// Decrement the count, waiting up to `timeout_ticks` ticks for it to
    /// become positive. Zero ticks means a single non-blocking attempt.
    pub fn take(&self, timeout_ticks: Ticks) -> Result<(), TakeError> {
        let guard = timeout::lock(&self.count);
        let (mut count, _) = timeout::wait_while(&self.cv, guard, timeout_ticks, |c| *c == 0);
        if *count > 0 {
            *count -= 1;
            Ok(())
        } else {
            Err(TakeError::Timeout)
        }
    }

    /// Increment the count and wake up one waiter.
    ///
    /// If the count is already `max_count`, nothing happens and
    /// [`GiveError::QueueOverflow`] is returned.
    pub fn give(&self) -> Result<(), GiveError> {
        let mut count = timeout::lock(&self.count);
        if *count >= self.max_count {
            return Err(GiveError::QueueOverflow);
        }
        *count += 1;
        self.cv.notify_one();
        Ok(())
    }

    /// Set the count to `new_count` (clamped to `max_count`) and wake up all
    /// waiters. Each waiter rechecks the count on its own.
    pub fn reset(&self, new_count: usize) {
        let mut count = timeout::lock(&self.count);
        *count = new_count.min(self.max_count);
        self.cv.notify_all();
    }

    pub fn count(&self) -> usize {
        *timeout::lock(&self.count)
    }

    pub fn max_count(&self) -> usize {
        self.max_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;
    use std::{sync::Arc, thread, time::Duration};

    #[test]
    fn binary_semaphore() {
        let sem = Semaphore::new(1, 1);
        assert_eq!(sem.take(0), Ok(()));
        assert_eq!(sem.take(0), Err(TakeError::Timeout));
        assert_eq!(sem.give(), Ok(()));
        assert_eq!(sem.take(0), Ok(()));
    }

    #[test]
    fn give_when_saturated_is_noop() {
        let sem = Semaphore::new(2, 2);
        assert_eq!(sem.give(), Err(GiveError::QueueOverflow));
        assert_eq!(sem.count(), 2);
    }

    #[test]
    fn initial_count_is_clamped() {
        let sem = Semaphore::new(3, 10);
        assert_eq!(sem.count(), 3);
        assert!(!Semaphore::binary(false).take(0).is_ok());
    }

    #[test]
    fn reset_clamps() {
        let sem = Semaphore::new(4, 0);
        sem.reset(100);
        assert_eq!(sem.count(), 4);
        sem.reset(1);
        assert_eq!(sem.count(), 1);
    }

    #[test]
    fn take_times_out() {
        let sem = Semaphore::new(1, 0);
        assert_eq!(sem.take(5), Err(TakeError::Timeout));
        assert_eq!(sem.count(), 0);
    }

    #[test]
    fn blocked_take_is_woken_by_give() {
        let _ = env_logger::try_init();
        let sem = Arc::new(Semaphore::new(1, 0));
        let sem2 = Arc::clone(&sem);
        let giver = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            sem2.give().unwrap();
        });
        assert_eq!(sem.take(10_000), Ok(()));
        giver.join().unwrap();
        assert_eq!(sem.count(), 0);
    }

    #[test]
    fn blocked_take_is_woken_by_reset() {
        let sem = Arc::new(Semaphore::new(5, 0));
        let sem2 = Arc::clone(&sem);
        let resetter = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            sem2.reset(2);
        });
        assert_eq!(sem.take(10_000), Ok(()));
        resetter.join().unwrap();
        assert_eq!(sem.count(), 1);
    }

    /// The count never leaves `0..=max_count`, whatever the operation
    /// sequence.
    #[quickcheck]
    fn quickcheck_count_stays_in_bounds(max_count: u8, ops: Vec<u8>) {
        let max_count = max_count as usize % 8;
        let sem = Semaphore::new(max_count, max_count);
        let mut model = max_count;

        for op in ops {
            match op % 3 {
                0 => {
                    assert_eq!(sem.take(0).is_ok(), model > 0);
                    model = model.saturating_sub(1);
                }
                1 => {
                    assert_eq!(sem.give().is_ok(), model < max_count);
                    model = (model + 1).min(max_count);
                }
                _ => {
                    let new_count = op as usize % 10;
                    sem.reset(new_count);
                    model = new_count.min(max_count);
                }
            }
            assert_eq!(sem.count(), model);
            assert!(sem.count() <= sem.max_count());
        }
    }
}
