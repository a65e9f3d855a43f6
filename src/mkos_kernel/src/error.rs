//! Result codes and the error types of kernel operations
use core::fmt;

/// The macro to define [`ResultCode`].
macro_rules! define_result_code {
    (
        $( #[$meta:meta] )*
        pub enum ResultCode {
            $(
                $( #[$vmeta:meta] )*
                $vname:ident = $vd:expr
            ),* $(,)*
        }
    ) => {
        $( #[$meta] )*
        pub enum ResultCode {
            $(
                $( #[$vmeta] )*
                $vname = $vd
            ),*
        }

        impl ResultCode {
            /// Get the short name of the result code.
            ///
            /// # Examples
            ///
            /// ```
            /// use mkos_kernel::ResultCode;
            /// assert_eq!(ResultCode::QueueOverflow.as_str(), "QueueOverflow");
            /// ```
            pub fn as_str(self) -> &'static str {
                match self {
                    $(
                        Self::$vname => stringify!($vname),
                    )*
                }
            }
        }

        impl fmt::Debug for ResultCode {
            #[inline]
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

define_result_code! {
    /// All result codes (including success) that a kernel operation can
    /// produce.
    ///
    /// The numeric values are matched to their closest equivalents in
    /// μITRON4.0.
    #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    #[repr(i8)]
    pub enum ResultCode {
        /// The operation was successful.
        Success = 0,
        /// A parameter is invalid in a way that is not covered by any other
        /// error code.
        BadParam = -17,
        /// The specified object handle does not refer to a live object.
        NoAccess = -18,
        /// The current context disallows the operation.
        BadContext = -25,
        /// The caller does not own the resource.
        NotOwner = -29,
        /// There is not enough memory to complete the operation.
        OutOfMemory = -33,
        /// A target object is in a state that disallows the operation.
        BadObjectState = -41,
        /// An operation or an object couldn't be enqueued because there are too
        /// many of such things that already have been enqueued.
        QueueOverflow = -43,
        /// The operation timed out.
        Timeout = -50,
    }
}

impl ResultCode {
    /// Get a flag indicating whether the code represents a failure.
    ///
    /// Failure codes have negative values.
    #[inline]
    pub fn is_err(self) -> bool {
        (self as i8) < 0
    }

    /// Get a flag indicating whether the code represents a success.
    ///
    /// Success codes have non-negative values.
    #[inline]
    pub fn is_ok(self) -> bool {
        !self.is_err()
    }
}

macro_rules! define_error {
    (
        mod $mod_name:ident {}
        $( #[$meta:meta] )*
        $vis:vis enum $name:ident {
            $(
                $( #[$vmeta:meta] )*
                $vname:ident
            ),* $(,)*
        }
    ) => {
        $( #[$meta] )*
        ///
        /// See [`ResultCode`] for all result codes and generic descriptions.
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(i8)]
        $vis enum $name {
            $(
                $( #[$vmeta] )*
                // Use the same discriminants as `ResultCode`
                $vname = ResultCode::$vname as i8
            ),*
        }

        impl fmt::Debug for $name {
            #[inline]
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                fmt::Debug::fmt(&ResultCode::from(*self), f)
            }
        }

        impl From<Result<(), $name>> for ResultCode {
            #[inline]
            fn from(x: Result<(), $name>) -> Self {
                match x {
                    Ok(()) => Self::Success,
                    Err(e) => Self::from(e),
                }
            }
        }

        impl From<$name> for ResultCode {
            #[inline]
            fn from(x: $name) -> Self {
                match x {
                    $( $name::$vname => Self::$vname, )*
                }
            }
        }

        #[cfg(test)]
        mod $mod_name {
            use super::*;

            #[test]
            fn to_result_code() {
                $(
                    assert_eq!(
                        ResultCode::$vname,
                        ResultCode::from($name::$vname),
                    );
                    assert_eq!(ResultCode::$vname as i8, $name::$vname as i8);
                )*
            }

            #[test]
            fn result_to_result_code() {
                $(
                    assert_eq!(
                        ResultCode::$vname,
                        ResultCode::from(Err($name::$vname)),
                    );
                )*
                assert_eq!(
                    ResultCode::Success,
                    ResultCode::from(Result::<(), $name>::Ok(())),
                );
            }
        }
    };
}

define_error! {
    mod create_task_error {}
    /// Error type for [`Kernel::create_task`].
    ///
    /// [`Kernel::create_task`]: crate::Kernel::create_task
    pub enum CreateTaskError {
        /// The priority is out of range.
        BadParam,
        /// The kernel heap couldn't provide the task's stack.
        OutOfMemory,
        /// The task table is full.
        QueueOverflow,
    }
}

define_error! {
    mod delete_task_error {}
    /// Error type for [`Kernel::delete_task`].
    ///
    /// [`Kernel::delete_task`]: crate::Kernel::delete_task
    pub enum DeleteTaskError {
        /// The task was already deleted.
        NoAccess,
        /// The task is the idle task.
        BadObjectState,
    }
}

define_error! {
    mod suspend_task_error {}
    /// Error type for [`Kernel::suspend_task`].
    ///
    /// [`Kernel::suspend_task`]: crate::Kernel::suspend_task
    pub enum SuspendTaskError {
        /// The task was deleted.
        NoAccess,
        /// The task is already suspended, or it's the idle task.
        BadObjectState,
    }
}

define_error! {
    mod resume_task_error {}
    /// Error type for [`Kernel::resume_task`].
    ///
    /// [`Kernel::resume_task`]: crate::Kernel::resume_task
    pub enum ResumeTaskError {
        /// The task was deleted.
        NoAccess,
        /// The task is not suspended.
        BadObjectState,
    }
}

define_error! {
    mod set_task_priority_error {}
    /// Error type for [`Kernel::set_task_priority`].
    ///
    /// [`Kernel::set_task_priority`]: crate::Kernel::set_task_priority
    pub enum SetTaskPriorityError {
        /// The task was deleted.
        NoAccess,
        /// The priority is out of range.
        BadParam,
        /// The task is the idle task, whose priority is fixed.
        BadObjectState,
    }
}

define_error! {
    mod delay_error {}
    /// Error type for [`Kernel::delay`].
    ///
    /// [`Kernel::delay`]: crate::Kernel::delay
    pub enum DelayError {
        /// There is no running task to delay, or it's the idle task.
        BadContext,
    }
}

define_error! {
    mod start_kernel_error {}
    /// Error type for [`Kernel::start`].
    ///
    /// [`Kernel::start`]: crate::Kernel::start
    pub enum StartKernelError {
        /// The kernel is already running, or it hasn't been initialized.
        BadObjectState,
    }
}

define_error! {
    mod take_error {}
    /// Error type for [`Semaphore::take`] and the lock operations of the
    /// mutexes.
    ///
    /// [`Semaphore::take`]: crate::Semaphore::take
    pub enum TakeError {
        /// No permit became available within the timeout. A zero timeout
        /// reports this immediately if no permit is available.
        Timeout,
    }
}

define_error! {
    mod give_error {}
    /// Error type for [`Semaphore::give`] and [`Mutex::give`].
    ///
    /// [`Semaphore::give`]: crate::Semaphore::give
    /// [`Mutex::give`]: crate::Mutex::give
    pub enum GiveError {
        /// The semaphore is already at its maximum count. The call had no
        /// effect.
        QueueOverflow,
    }
}

define_error! {
    mod give_recursive_mutex_error {}
    /// Error type for [`RecursiveMutex::give`].
    ///
    /// [`RecursiveMutex::give`]: crate::RecursiveMutex::give
    pub enum GiveRecursiveMutexError {
        /// The calling thread does not hold the mutex.
        NotOwner,
        /// The underlying semaphore is already at its maximum count.
        QueueOverflow,
    }
}

impl From<GiveError> for GiveRecursiveMutexError {
    #[inline]
    fn from(x: GiveError) -> Self {
        match x {
            GiveError::QueueOverflow => Self::QueueOverflow,
        }
    }
}

define_error! {
    mod create_queue_error {}
    /// Error type for [`Queue::new`].
    ///
    /// [`Queue::new`]: crate::Queue::new
    pub enum CreateQueueError {
        /// The length is zero or exceeds [`MAX_QUEUE_LENGTH`].
        ///
        /// [`MAX_QUEUE_LENGTH`]: crate::cfg::MAX_QUEUE_LENGTH
        BadParam,
    }
}

define_error! {
    mod create_message_buffer_error {}
    /// Error type for [`MessageBuffer::new`].
    ///
    /// [`MessageBuffer::new`]: crate::MessageBuffer::new
    pub enum CreateMessageBufferError {
        /// The size leaves no room for the ring's slack slot.
        BadParam,
        /// The ring couldn't be allocated.
        OutOfMemory,
    }
}

define_error! {
    mod receive_error {}
    /// Error type for [`Queue::receive`].
    ///
    /// [`Queue::receive`]: crate::Queue::receive
    pub enum ReceiveError {
        /// The queue stayed empty for the whole timeout.
        Timeout,
    }
}

define_error! {
    mod start_timer_error {}
    /// Error type for [`SoftwareTimer::start`].
    ///
    /// [`SoftwareTimer::start`]: crate::SoftwareTimer::start
    pub enum StartTimerError {
        /// The timer period is zero.
        BadParam,
        /// The kernel's timer registry stayed full for the whole block time.
        QueueOverflow,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_code_sign() {
        assert!(ResultCode::Success.is_ok());
        assert!(ResultCode::Timeout.is_err());
        assert!(ResultCode::QueueOverflow.is_err());
    }

    #[test]
    fn debug_prints_code_name() {
        assert_eq!(format!("{:?}", TakeError::Timeout), "Timeout");
        assert_eq!(
            format!("{:?}", CreateTaskError::QueueOverflow),
            "QueueOverflow"
        );
    }

    #[test]
    fn give_error_widens() {
        assert_eq!(
            GiveRecursiveMutexError::from(GiveError::QueueOverflow),
            GiveRecursiveMutexError::QueueOverflow
        );
    }
}
