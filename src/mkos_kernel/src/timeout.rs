//! Tick-denominated timeouts for the blocking primitives
//!
//! The primitives block the calling thread on a condition variable. A
//! timeout given in ticks is converted to a wall-clock deadline using the
//! configured tick rate. A timeout of zero ticks means "don't block".
use std::{
    sync::{Condvar, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use crate::cfg::{self, Ticks};

/// Lock a mutex, recovering the guard if a previous holder panicked.
///
/// The data guarded by the primitives' mutexes is always left consistent
/// between statements, so poisoning carries no information here.
#[inline]
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A point in time after which a wait gives up.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline(Option<Instant>);

impl Deadline {
    /// Construct a deadline `ticks` ticks from now. A deadline too far in the
    /// future to be represented never expires.
    pub(crate) fn after(ticks: Ticks) -> Self {
        Self(Instant::now().checked_add(cfg::ticks_to_duration(ticks)))
    }

    /// Get the time left until the deadline, or `None` if it has passed.
    pub(crate) fn remaining(&self) -> Option<Duration> {
        match self.0 {
            Some(at) => at
                .checked_duration_since(Instant::now())
                .filter(|d| !d.is_zero()),
            None => Some(Duration::MAX),
        }
    }
}

/// Block on `condvar` while `condition` holds, for at most `ticks` ticks.
///
/// Returns the guard and a flag indicating whether the wait timed out with
/// `condition` still holding.
pub(crate) fn wait_while<'a, T>(
    condvar: &Condvar,
    mut guard: MutexGuard<'a, T>,
    ticks: Ticks,
    mut condition: impl FnMut(&mut T) -> bool,
) -> (MutexGuard<'a, T>, bool) {
    let deadline = Deadline::after(ticks);
    while condition(&mut *guard) {
        let Some(remaining) = deadline.remaining() else {
            return (guard, true);
        };
        guard = condvar
            .wait_timeout(guard, remaining)
            .unwrap_or_else(PoisonError::into_inner)
            .0;
    }
    (guard, false)
}

/// Block on `condvar` for at most one tick or until `deadline`, whichever
/// comes first. Returns `false` without blocking if `deadline` has passed.
pub(crate) fn wait_one_tick<'a, T>(
    condvar: &Condvar,
    guard: MutexGuard<'a, T>,
    deadline: &Deadline,
) -> (MutexGuard<'a, T>, bool) {
    let Some(remaining) = deadline.remaining() else {
        return (guard, false);
    };
    let guard = condvar
        .wait_timeout(guard, remaining.min(cfg::tick_period()))
        .unwrap_or_else(PoisonError::into_inner)
        .0;
    (guard, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, thread};

    #[test]
    #[allow(let_underscore_lock)]
    fn zero_ticks_never_blocks() {
        let mutex = Mutex::new(());
        let condvar = Condvar::new();
        let start = Instant::now();
        let (_, timed_out) = wait_while(&condvar, lock(&mutex), 0, |_| true);
        assert!(timed_out);
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn satisfied_condition_returns_immediately() {
        let mutex = Mutex::new(5);
        let condvar = Condvar::new();
        let (guard, timed_out) = wait_while(&condvar, lock(&mutex), 10_000, |x| *x == 0);
        assert!(!timed_out);
        assert_eq!(*guard, 5);
    }

    #[test]
    #[allow(let_underscore_lock)]
    fn times_out_after_ticks() {
        let mutex = Mutex::new(());
        let condvar = Condvar::new();
        let start = Instant::now();
        let (_, timed_out) = wait_while(&condvar, lock(&mutex), 20, |_| true);
        assert!(timed_out);
        assert!(start.elapsed() >= cfg::ticks_to_duration(20));
    }

    #[test]
    fn woken_by_notification() {
        let shared = Arc::new((Mutex::new(false), Condvar::new()));
        let shared2 = Arc::clone(&shared);
        let notifier = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            *lock(&shared2.0) = true;
            shared2.1.notify_all();
        });

        let (guard, timed_out) = wait_while(&shared.1, lock(&shared.0), 10_000, |x| !*x);
        assert!(!timed_out);
        assert!(*guard);
        drop(guard);
        notifier.join().unwrap();
    }

    #[test]
    fn poisoned_mutex_is_recovered() {
        let mutex = Arc::new(Mutex::new(1));
        let mutex2 = Arc::clone(&mutex);
        let _ = thread::spawn(move || {
            let _guard = mutex2.lock().unwrap();
            panic!("poison");
        })
        .join();
        assert!(mutex.is_poisoned());
        assert_eq!(*lock(&mutex), 1);
    }

    #[test]
    fn expired_deadline_has_no_remaining_time() {
        let deadline = Deadline::after(0);
        thread::sleep(Duration::from_millis(1));
        assert_eq!(deadline.remaining(), None);
        assert!(Deadline::after(Ticks::MAX).remaining().is_some());
    }
}
