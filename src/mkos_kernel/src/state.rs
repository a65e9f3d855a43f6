//! The scheduler state protected by the kernel lock
use arrayvec::ArrayVec;
use slab::Slab;

use crate::{
    cfg::{Ticks, MAX_TASKS},
    task::{readyqueue::ReadyQueue, TaskCb, TaskId},
};

#[derive(Debug)]
pub(crate) struct State {
    /// The task table. A task's slot is part of its [`TaskId`].
    pub(crate) tasks: Slab<TaskCb>,

    pub(crate) ready_queue: ReadyQueue,

    /// The Blocked tasks in the order they were delayed.
    pub(crate) delayed: ArrayVec<TaskId, MAX_TASKS>,

    pub(crate) suspended: ArrayVec<TaskId, MAX_TASKS>,

    /// The task the kernel is currently running. It may have left the Running
    /// state (e.g., by delaying itself) until a new task is chosen.
    pub(crate) running_task: Option<TaskId>,

    pub(crate) tick_count: Ticks,

    /// The numeric id the next created task receives.
    pub(crate) next_task_id: u32,

    /// Set when a context switch was requested and not yet consumed.
    pub(crate) preemption_pending: bool,

    pub(crate) context_switch_count: u64,
}

impl State {
    pub(crate) fn new() -> Self {
        Self {
            tasks: Slab::with_capacity(MAX_TASKS),
            ready_queue: ReadyQueue::new(),
            delayed: ArrayVec::new(),
            suspended: ArrayVec::new(),
            running_task: None,
            tick_count: 0,
            next_task_id: 1,
            preemption_pending: false,
            context_switch_count: 0,
        }
    }

    /// Get the [`TaskCb`] for the specified handle, or `None` if the task was
    /// deleted.
    #[inline]
    pub(crate) fn task_cb(&self, task: TaskId) -> Option<&TaskCb> {
        self.tasks.get(task.slot()).filter(|cb| cb.id == task)
    }

    #[inline]
    pub(crate) fn task_cb_mut(&mut self, task: TaskId) -> Option<&mut TaskCb> {
        self.tasks.get_mut(task.slot()).filter(|cb| cb.id == task)
    }

    /// Get the running task if it's still in the Running state.
    pub(crate) fn current_task(&self) -> Option<TaskId> {
        let task = self.running_task?;
        let task_cb = self.task_cb(task)?;
        (task_cb.st == crate::TaskState::Running).then_some(task)
    }
}
