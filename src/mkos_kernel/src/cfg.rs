//! Build-time kernel configuration
//!
//! These limits are fixed when the crate is compiled. Nothing in the kernel
//! adjusts them at runtime.
use core::time::Duration;

/// The type of tick counts and tick-denominated timeouts.
pub type Ticks = u64;

/// The maximum number of tasks that can exist at the same time, including the
/// idle task.
pub const MAX_TASKS: usize = 32;

/// The number of task priority levels. The valid priorities are
/// `0..MAX_PRIORITIES`.
pub const MAX_PRIORITIES: usize = 8;

/// The frequency of the system tick.
pub const TICK_RATE_HZ: u32 = 1000;

/// The minimum stack size of a task. Smaller requests are rounded up to this
/// value.
pub const MIN_STACK_SIZE: usize = 1024;

/// The size of the kernel heap arena, in bytes.
pub const HEAP_SIZE: usize = 1024 * 1024;

/// The maximum length of a [`Queue`](crate::Queue).
pub const MAX_QUEUE_LENGTH: usize = 16;

/// The maximum number of simultaneously started software timers.
pub const MAX_TIMERS: usize = 16;

/// The maximum length of a task name, in bytes.
pub const TASK_NAME_LEN: usize = 31;

// The ready-list bitmap is a single `u32` word.
const _: () = assert!(MAX_PRIORITIES > 0 && MAX_PRIORITIES <= 32);
const _: () = assert!(TICK_RATE_HZ > 0 && TICK_RATE_HZ <= 1_000_000_000);

const NANOS_PER_TICK: u64 = 1_000_000_000 / TICK_RATE_HZ as u64;

/// The wall-clock length of one tick.
#[inline]
pub const fn tick_period() -> Duration {
    Duration::from_nanos(NANOS_PER_TICK)
}

/// Convert a tick count to wall-clock time. Saturates on overflow.
#[inline]
pub const fn ticks_to_duration(ticks: Ticks) -> Duration {
    Duration::from_nanos(ticks.saturating_mul(NANOS_PER_TICK))
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    #[test]
    fn tick_period_matches_rate() {
        assert_eq!(tick_period() * TICK_RATE_HZ, Duration::from_secs(1));
    }

    #[test]
    fn zero_ticks_is_zero_duration() {
        assert_eq!(ticks_to_duration(0), Duration::ZERO);
    }

    #[test]
    fn saturates_instead_of_overflowing() {
        assert_eq!(
            ticks_to_duration(Ticks::MAX),
            Duration::from_nanos(u64::MAX)
        );
    }

    #[quickcheck]
    fn quickcheck_ticks_to_duration_is_linear(ticks: u32) {
        assert_eq!(
            ticks_to_duration(ticks as Ticks),
            tick_period() * ticks
        );
    }
}
