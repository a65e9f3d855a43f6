#![doc = include_str!("./lib.md")]
#![forbid(unsafe_code)]

pub mod cfg;
pub mod error;
pub mod event_group;
pub mod heap;
mod kernel;
mod klock;
pub mod message_buffer;
pub mod mutex;
pub mod port;
pub mod queue;
pub mod recursive_mutex;
pub mod semaphore;
mod state;
pub mod task;
mod timeout;
pub mod timer;
pub mod utils;

pub use self::{
    cfg::Ticks,
    error::*,
    event_group::{EventBits, EventGroup, EventGroupWaitFlags},
    heap::{Heap, HeapPtr},
    kernel::Kernel,
    message_buffer::MessageBuffer,
    mutex::Mutex,
    port::{Port, StdPort},
    queue::{Queue, SendError},
    recursive_mutex::RecursiveMutex,
    semaphore::Semaphore,
    task::{TaskFn, TaskId, TaskInfo, TaskName, TaskPriority, TaskState},
    timer::{SoftwareTimer, TimerFn},
};
