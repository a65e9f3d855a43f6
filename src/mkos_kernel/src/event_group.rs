//! Event groups
use core::fmt;
use std::sync::{Condvar, Mutex};

use crate::{cfg::Ticks, timeout};

/// Unsigned integer type backing event groups.
pub type EventBits = u32;

bitflags::bitflags! {
    /// Options for [`EventGroup::wait_bits`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
    pub struct EventGroupWaitFlags: u8 {
        /// Wait for all of the specified bits to be set.
        const ALL = 1 << 0;

        /// Clear the specified bits after waiting for them.
        const CLEAR = 1 << 1;
    }
}

/// A set of event flags that threads can wait on.
///
/// The meaning of each bit is up to the users of the event group; no bits are
/// reserved.
pub struct EventGroup {
    bits: Mutex<EventBits>,
    cv: Condvar,
}

impl Default for EventGroup {
    fn default() -> Self {
        Self::new(0)
    }
}

impl fmt::Debug for EventGroup {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "EventGroup({:#x})", self.get_bits())
    }
}

impl EventGroup {
    pub fn new(initial_bits: EventBits) -> Self {
        Self {
            bits: Mutex::new(initial_bits),
            cv: Condvar::new(),
        }
    }

    /// Set the specified bits and wake up all waiters. Returns the new value.
    pub fn set_bits(&self, bits: EventBits) -> EventBits {
        let mut event_group_bits = timeout::lock(&self.bits);
        *event_group_bits |= bits;
        self.cv.notify_all();
        *event_group_bits
    }

    /// Clear the specified bits. Returns the value before clearing.
    pub fn clear_bits(&self, bits: EventBits) -> EventBits {
        let mut event_group_bits = timeout::lock(&self.bits);
        let original_value = *event_group_bits;
        *event_group_bits &= !bits;
        original_value
    }

    pub fn get_bits(&self) -> EventBits {
        *timeout::lock(&self.bits)
    }

    /// Wait until all ([`ALL`]) or any of `bits` are set, for up to
    /// `timeout_ticks` ticks. Zero ticks checks the condition once without
    /// blocking.
    ///
    /// If the condition is met, returns the value at that point and, if
    /// [`CLEAR`] is given, clears `bits`. Otherwise, returns the current value
    /// unchanged. The caller tells the two cases apart by examining the
    /// returned value.
    ///
    /// [`ALL`]: EventGroupWaitFlags::ALL
    /// [`CLEAR`]: EventGroupWaitFlags::CLEAR
    pub fn wait_bits(
        &self,
        bits: EventBits,
        flags: EventGroupWaitFlags,
        timeout_ticks: Ticks,
    ) -> EventBits {
        let guard = timeout::lock(&self.bits);
        let (mut event_group_bits, _) =
            timeout::wait_while(&self.cv, guard, timeout_ticks, |current| {
                !is_satisfied(*current, bits, flags)
            });

        poll_core(&mut event_group_bits, bits, flags).unwrap_or(*event_group_bits)
    }
}

fn is_satisfied(event_group_bits: EventBits, bits: EventBits, flags: EventGroupWaitFlags) -> bool {
    if flags.contains(EventGroupWaitFlags::ALL) {
        (event_group_bits & bits) == bits
    } else {
        (event_group_bits & bits) != 0
    }
}

/// If `event_group_bits` satisfies the wait condition, this function clears
/// some bits `event_group_bits` (if requested by `flags`), and returns
/// `Some(original_value)`. Otherwise, it returns `None`.
fn poll_core(
    event_group_bits: &mut EventBits,
    bits: EventBits,
    flags: EventGroupWaitFlags,
) -> Option<EventBits> {
    if is_satisfied(*event_group_bits, bits, flags) {
        let original_value = *event_group_bits;
        if flags.contains(EventGroupWaitFlags::CLEAR) {
            *event_group_bits &= !bits;
        }
        Some(original_value)
    } else {
        None
    }
}
