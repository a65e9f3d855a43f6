//! Software timers
use core::fmt;
use std::{sync::Arc, thread};

use crate::{
    cfg::{self, Ticks},
    error::StartTimerError,
    timeout::Deadline,
    Kernel,
};

/// A timer callback. Receives the timer's id.
pub type TimerFn = fn(usize);

/// A one-shot or auto-reload timer driven by the kernel tick.
///
/// A started timer is registered with a [`Kernel`], which [checks] it on
/// every tick. When the tick count reaches the expiry, the callback is called
/// (with the kernel lock released). An auto-reload timer then rearms itself
/// one period after the tick at which it fired; a one-shot timer becomes
/// inactive and leaves the registry.
///
/// [checks]: SoftwareTimer::check
pub struct SoftwareTimer {
    name: &'static str,
    period: Ticks,
    auto_reload: bool,
    timer_id: usize,
    callback: TimerFn,
    st: spin::Mutex<TimerSt>,
}

#[derive(Debug, Clone, Copy)]
struct TimerSt {
    active: bool,
    expiry: Ticks,
}

impl fmt::Debug for SoftwareTimer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let st = *self.st.lock();
        f.debug_struct("SoftwareTimer")
            .field("name", &self.name)
            .field("period", &self.period)
            .field("auto_reload", &self.auto_reload)
            .field("timer_id", &self.timer_id)
            .field("active", &st.active)
            .field("expiry", &st.expiry)
            .finish()
    }
}

impl SoftwareTimer {
    /// Construct an inactive timer.
    pub fn new(
        name: &'static str,
        period: Ticks,
        auto_reload: bool,
        timer_id: usize,
        callback: TimerFn,
    ) -> Arc<Self> {
        Arc::new(Self {
            name,
            period,
            auto_reload,
            timer_id,
            callback,
            st: spin::Mutex::new(TimerSt {
                active: false,
                expiry: 0,
            }),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Get the timer period in ticks.
    pub fn period(&self) -> Ticks {
        self.period
    }

    pub fn is_auto_reload(&self) -> bool {
        self.auto_reload
    }

    /// Get the opaque id passed to the callback.
    pub fn timer_id(&self) -> usize {
        self.timer_id
    }

    pub fn is_active(&self) -> bool {
        self.st.lock().active
    }

    /// Get the tick at which the timer fires next. Meaningless while the timer
    /// is inactive.
    pub fn expiry(&self) -> Ticks {
        self.st.lock().expiry
    }

    /// Arm the timer to fire one period after the kernel's current tick, and
    /// register it with `kernel`. Restarting an active timer only moves its
    /// expiry.
    ///
    /// If the kernel's timer registry is full, this waits up to `block_ticks`
    /// ticks for a slot to become free.
    pub fn start(
        self: &Arc<Self>,
        kernel: &Kernel,
        block_ticks: Ticks,
    ) -> Result<(), StartTimerError> {
        if self.period == 0 {
            return Err(StartTimerError::BadParam);
        }

        self.arm(kernel.tick_count());

        let deadline = Deadline::after(block_ticks);
        loop {
            if kernel.register_timer(self) {
                break;
            }
            if deadline.remaining().is_none() {
                self.st.lock().active = false;
                return Err(StartTimerError::QueueOverflow);
            }
            thread::sleep(cfg::tick_period());
        }

        log::debug!(
            "timer {:?} started, expires at tick {}",
            self.name,
            self.expiry()
        );
        Ok(())
    }

    /// Deactivate the timer and remove it from `kernel`'s registry.
    pub fn stop(self: &Arc<Self>, kernel: &Kernel) {
        self.st.lock().active = false;
        kernel.unregister_timer(self);
        log::debug!("timer {:?} stopped", self.name);
    }

    fn arm(&self, now: Ticks) {
        let mut st = self.st.lock();
        st.expiry = now.saturating_add(self.period);
        st.active = true;
    }

    /// Fire the timer if it's active and `current_tick` has reached its
    /// expiry. Called by the kernel on every tick.
    pub fn check(&self, current_tick: Ticks) {
        let fire = {
            let mut st = self.st.lock();
            if st.active && current_tick >= st.expiry {
                if self.auto_reload {
                    st.expiry = current_tick.saturating_add(self.period);
                } else {
                    st.active = false;
                }
                true
            } else {
                false
            }
        };

        if fire {
            log::trace!("timer {:?} fired at tick {current_tick}", self.name);
            (self.callback)(self.timer_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn auto_reload_rearms_from_firing_tick() {
        static FIRED: AtomicUsize = AtomicUsize::new(0);
        fn callback(id: usize) {
            assert_eq!(id, 7);
            FIRED.fetch_add(1, Ordering::Relaxed);
        }

        let timer = SoftwareTimer::new("reload", 10, true, 7, callback);
        timer.arm(0);
        assert_eq!(timer.expiry(), 10);

        timer.check(9);
        assert_eq!(FIRED.load(Ordering::Relaxed), 0);

        timer.check(10);
        assert_eq!(FIRED.load(Ordering::Relaxed), 1);
        assert_eq!(timer.expiry(), 20);
        assert!(timer.is_active());

        timer.check(20);
        assert_eq!(FIRED.load(Ordering::Relaxed), 2);

        // A late check fires once and rearms from the late tick
        timer.check(45);
        assert_eq!(FIRED.load(Ordering::Relaxed), 3);
        assert_eq!(timer.expiry(), 55);
    }

    #[test]
    fn one_shot_deactivates() {
        static FIRED: AtomicUsize = AtomicUsize::new(0);
        fn callback(_: usize) {
            FIRED.fetch_add(1, Ordering::Relaxed);
        }

        let timer = SoftwareTimer::new("once", 5, false, 0, callback);
        timer.arm(100);
        timer.check(105);
        timer.check(110);
        assert_eq!(FIRED.load(Ordering::Relaxed), 1);
        assert!(!timer.is_active());
    }

    #[test]
    fn inactive_timer_never_fires() {
        fn callback(_: usize) {
            panic!("fired");
        }
        let timer = SoftwareTimer::new("idle", 1, true, 0, callback);
        timer.check(1000);
        assert!(!timer.is_active());
    }
}
