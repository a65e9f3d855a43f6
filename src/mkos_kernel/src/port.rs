//! The boundary between the kernel and the (simulated) hardware
use core::sync::atomic::{AtomicUsize, Ordering};

/// Implemented by a port, which connects the kernel to the environment it runs
/// on.
pub trait Port: Send + Sync + 'static {
    /// Request a context switch. Called by the kernel when a task of a higher
    /// (or, for round-robin scheduling, equal) priority than the running task
    /// is ready.
    ///
    /// This is advisory. The kernel doesn't expect any particular effect; on
    /// real hardware this would pend the context-switch exception.
    fn request_context_switch(&self);
}

/// The default port for a hosted environment. Only counts the context switch
/// requests it receives.
#[derive(Debug, Default)]
pub struct StdPort {
    context_switch_requests: AtomicUsize,
}

impl StdPort {
    pub const fn new() -> Self {
        Self {
            context_switch_requests: AtomicUsize::new(0),
        }
    }

    /// Get the number of context switch requests received so far.
    pub fn context_switch_requests(&self) -> usize {
        self.context_switch_requests.load(Ordering::Relaxed)
    }
}

impl Port for StdPort {
    fn request_context_switch(&self) {
        log::trace!("request_context_switch");
        self.context_switch_requests.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_requests() {
        let port = StdPort::new();
        assert_eq!(port.context_switch_requests(), 0);
        port.request_context_switch();
        port.request_context_switch();
        assert_eq!(port.context_switch_requests(), 2);
    }
}
