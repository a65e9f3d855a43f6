//! Tasks
use arrayvec::ArrayString;
use core::fmt;

use crate::{
    cfg::{Ticks, MAX_PRIORITIES, TASK_NAME_LEN},
    heap::HeapPtr,
    state::State,
    utils, Kernel,
};

#[doc(hidden)]
pub mod readyqueue;
use self::readyqueue::ScheduleDecision;

/// The behavior of a task.
///
/// The kernel calls it once per tick while the task is Running, passing the
/// parameter given at creation. Each call represents one time slice of the
/// task's work and must return. It may call back into the kernel, e.g., to
/// [`delay`](Kernel::delay) itself.
pub type TaskFn = fn(&Kernel, usize);

/// A task priority. A higher value is more urgent. The valid priorities are
/// `0..`[`MAX_PRIORITIES`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct TaskPriority(pub u8);

impl TaskPriority {
    /// The priority of the idle task.
    pub const IDLE: Self = Self(0);
    pub const LOW: Self = Self(1);
    pub const BELOW_NORMAL: Self = Self(2);
    pub const NORMAL: Self = Self(3);
    pub const ABOVE_NORMAL: Self = Self(4);
    pub const HIGH: Self = Self(5);
    pub const REALTIME: Self = Self(6);
    pub const CRITICAL: Self = Self(7);

    /// Get the priority as a ready-list index.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Get a flag indicating whether the priority is within the configured
    /// level count.
    #[inline]
    pub const fn is_valid(self) -> bool {
        self.index() < MAX_PRIORITIES
    }

    fn name(self) -> Option<&'static str> {
        Some(match self {
            Self::IDLE => "IDLE",
            Self::LOW => "LOW",
            Self::BELOW_NORMAL => "BELOW_NORMAL",
            Self::NORMAL => "NORMAL",
            Self::ABOVE_NORMAL => "ABOVE_NORMAL",
            Self::HIGH => "HIGH",
            Self::REALTIME => "REALTIME",
            Self::CRITICAL => "CRITICAL",
            _ => return None,
        })
    }
}

impl fmt::Debug for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "TaskPriority({})", self.0),
        }
    }
}

/// Task state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// The task is the one the kernel is currently running.
    Running,
    /// The task is in a ready list, waiting for its turn.
    Ready,
    /// The task is in the delayed list until its wake time.
    Blocked,
    /// The task is in the suspended list until it's resumed.
    Suspended,
    /// The task was deleted. Handles to it stay in this state forever.
    Deleted,
}

/// A handle to a task.
///
/// A handle consists of the task's slot in the task table and its numeric
/// id. Ids are assigned monotonically and never reused, so a handle to a
/// deleted task can't be confused with a later task that takes over its slot.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId {
    slot: usize,
    id: u32,
}

impl TaskId {
    pub(crate) const fn new(slot: usize, id: u32) -> Self {
        Self { slot, id }
    }

    /// Get the numeric id of the task. The first task created by a kernel
    /// gets `1`.
    #[inline]
    pub const fn id(self) -> u32 {
        self.id
    }

    #[inline]
    pub(crate) const fn slot(self) -> usize {
        self.slot
    }
}

impl fmt::Debug for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "TaskId({})", self.id)
    }
}

/// The name of a task, truncated to [`TASK_NAME_LEN`] bytes.
pub type TaskName = ArrayString<TASK_NAME_LEN>;

pub(crate) fn task_name(name: &str) -> TaskName {
    let mut out = TaskName::new();
    out.push_str(utils::truncate_str(name, TASK_NAME_LEN));
    out
}

/// *Task control block* - the state data of a task.
pub(crate) struct TaskCb {
    pub(crate) id: TaskId,
    pub(crate) name: TaskName,
    pub(crate) st: TaskState,

    /// The task's effective priority, which determines its ready list.
    pub(crate) priority: TaskPriority,

    /// The task's assigned priority. Equals `priority` since no priority
    /// boosting takes place.
    pub(crate) base_priority: TaskPriority,

    /// The tick at which the task leaves the delayed list. Meaningful only
    /// while the task is Blocked.
    pub(crate) wake_time: Ticks,

    pub(crate) stack: HeapPtr,
    pub(crate) stack_size: usize,

    pub(crate) entry_point: TaskFn,
    pub(crate) entry_param: usize,

    /// The number of time slices the task has received
    pub(crate) run_count: u64,
}

impl fmt::Debug for TaskCb {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("TaskCb")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("st", &self.st)
            .field("priority", &self.priority)
            .field("base_priority", &self.base_priority)
            .field("wake_time", &self.wake_time)
            .field("stack", &self.stack)
            .field("stack_size", &self.stack_size)
            .field("entry_point", &(self.entry_point as usize as *const ()))
            .field("entry_param", &self.entry_param)
            .field("run_count", &self.run_count)
            .finish()
    }
}

/// A snapshot of a task's state, returned by [`Kernel::task_info`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskInfo {
    pub id: TaskId,
    pub name: TaskName,
    pub state: TaskState,
    pub priority: TaskPriority,
    pub base_priority: TaskPriority,
    /// The wake time, present only while the task is Blocked.
    pub wake_time: Option<Ticks>,
    pub stack_size: usize,
    /// The number of time slices the task has received.
    pub run_count: u64,
}

impl From<&TaskCb> for TaskInfo {
    fn from(cb: &TaskCb) -> Self {
        Self {
            id: cb.id,
            name: cb.name,
            state: cb.st,
            priority: cb.priority,
            base_priority: cb.base_priority,
            wake_time: (cb.st == TaskState::Blocked).then_some(cb.wake_time),
            stack_size: cb.stack_size,
            run_count: cb.run_count,
        }
    }
}

/// Get the priority of the running task if it's still in the Running state.
fn running_priority(state: &State) -> Option<usize> {
    let running_task = state.task_cb(state.running_task?)?;
    (running_task.st == TaskState::Running).then(|| running_task.priority.index())
}

/// Transition the task into the Ready state and append it to its ready list.
/// The task must not be in any list.
pub(crate) fn make_ready(state: &mut State, task: TaskId) {
    let Some(task_cb) = state.task_cb_mut(task) else {
        return;
    };
    task_cb.st = TaskState::Ready;
    task_cb.wake_time = 0;
    let priority = task_cb.priority.index();
    state.ready_queue.push_back_task(task, priority);
}

/// Get a flag indicating whether there's a Ready task more urgent than the
/// running task, or any Ready task if there's no running task.
pub(crate) fn preemption_needed(state: &State) -> bool {
    match (running_priority(state), state.ready_queue.highest_priority()) {
        (_, None) => false,
        (None, Some(_)) => true,
        (Some(running), Some(ready)) => ready > running,
    }
}

/// Pick the next task to run, and make it Running. The previous running task
/// is returned to the back of its ready list if it's still Running.
///
/// A Running task is never replaced with a task of a lower priority.
pub(crate) fn choose_next_running_task(state: &mut State) {
    let prev_running_task = state.running_task;
    let prev_task_priority = running_priority(state);

    let next_running_task = match state.ready_queue.pop_front_task(prev_task_priority) {
        ScheduleDecision::SwitchTo(task) => task,
        ScheduleDecision::Keep => return,
    };

    if prev_task_priority.is_some() {
        if let Some(prev) = prev_running_task {
            make_ready(state, prev);
        }
    }

    if let Some(next) = next_running_task {
        if let Some(task_cb) = state.task_cb_mut(next) {
            task_cb.st = TaskState::Running;
            log::trace!("context switch to {:?} ({})", next, task_cb.name);
        }
        if prev_running_task != Some(next) {
            state.context_switch_count += 1;
        }
    } else {
        log::trace!("no task to run");
    }

    state.running_task = next_running_task;
}

/// Move the running task to the delayed list until `wake_time`, and let
/// another task run.
pub(crate) fn wait_until(state: &mut State, task: TaskId, wake_time: Ticks) {
    let Some(task_cb) = state.task_cb_mut(task) else {
        return;
    };
    debug_assert_eq!(task_cb.st, TaskState::Running);
    task_cb.st = TaskState::Blocked;
    task_cb.wake_time = wake_time;

    // The list can hold every task
    let _ = state.delayed.try_push(task);

    choose_next_running_task(state);
}

/// Advance the tick count and move the delayed tasks whose wake time has
/// come to their ready lists.
///
/// Returns `true` if a context switch should be requested, i.e., if a woken
/// task is more urgent than the running task, or if the running task's
/// priority level has more than one Ready task.
pub(crate) fn process_tick(state: &mut State) -> bool {
    state.tick_count += 1;
    let now = state.tick_count;
    let current_priority = running_priority(state);
    let mut preempt = false;

    let mut i = 0;
    while i < state.delayed.len() {
        let task = state.delayed[i];
        let Some(task_cb) = state.task_cb(task) else {
            state.delayed.remove(i);
            continue;
        };
        if task_cb.wake_time > now {
            i += 1;
            continue;
        }

        let priority = task_cb.priority.index();
        state.delayed.remove(i);
        make_ready(state, task);
        log::trace!("{task:?} woke up at tick {now}");

        if current_priority.map_or(true, |current| priority > current) {
            preempt = true;
        }
    }

    // Round robin for the current priority level
    let rr_priority = current_priority.or_else(|| state.ready_queue.highest_priority());
    if let Some(priority) = rr_priority {
        if state.ready_queue.len_at(priority) > 1 {
            preempt = true;
        }
    }

    preempt
}

/// Remove the task from whichever list holds it. A Running task stops being
/// the running task; the caller must choose a new one.
pub(crate) fn detach(state: &mut State, task: TaskId) {
    let Some(task_cb) = state.task_cb(task) else {
        return;
    };
    let (st, priority) = (task_cb.st, task_cb.priority.index());
    match st {
        TaskState::Running => {
            if state.running_task == Some(task) {
                state.running_task = None;
            }
        }
        TaskState::Ready => {
            state.ready_queue.remove_task(task, priority);
        }
        TaskState::Blocked => state.delayed.retain(|t| *t != task),
        TaskState::Suspended => state.suspended.retain(|t| *t != task),
        TaskState::Deleted => {}
    }
}

/// Change a task's priority, moving it between ready lists if it's Ready.
pub(crate) fn set_priority(state: &mut State, task: TaskId, priority: TaskPriority) {
    let Some(task_cb) = state.task_cb_mut(task) else {
        return;
    };
    let old_priority = task_cb.priority;
    let is_ready = task_cb.st == TaskState::Ready;
    task_cb.priority = priority;
    task_cb.base_priority = priority;

    if is_ready && old_priority != priority {
        state.ready_queue.remove_task(task, old_priority.index());
        state.ready_queue.push_back_task(task, priority.index());
    }
}
