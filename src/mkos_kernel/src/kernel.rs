//! The kernel context object
use arrayvec::ArrayVec;
use core::{
    fmt,
    sync::atomic::{AtomicBool, Ordering},
};
use once_cell::sync::OnceCell;
use std::{sync::Arc, thread};

use crate::{
    cfg::{self, Ticks, MAX_TASKS, MAX_TIMERS, MIN_STACK_SIZE},
    error::{
        CreateTaskError, DelayError, DeleteTaskError, ResumeTaskError, SetTaskPriorityError,
        StartKernelError, SuspendTaskError,
    },
    heap::Heap,
    klock::KernelLock,
    port::{Port, StdPort},
    state::State,
    task::{self, TaskCb, TaskFn, TaskId, TaskInfo, TaskPriority, TaskState},
    timer::SoftwareTimer,
};

/// The kernel: the scheduler, the kernel heap, the software timer registry,
/// and the port hook.
///
/// A `Kernel` is typically created once at startup and shared (e.g., in an
/// [`Arc`]) with whatever drives it and with the threads that use its
/// services. Every operation takes `&self`.
///
/// # Examples
///
/// ```
/// use mkos_kernel::{Kernel, TaskPriority, TaskState};
///
/// fn sensor(kernel: &Kernel, _param: usize) {
///     kernel.delay(5).unwrap();
/// }
///
/// let kernel = Kernel::new();
/// kernel.initialize().unwrap();
/// let task = kernel
///     .create_task("Sensor", sensor, 2048, 0, TaskPriority::NORMAL)
///     .unwrap();
///
/// kernel.step();
/// assert_eq!(kernel.task_state(task), TaskState::Blocked);
/// ```
pub struct Kernel {
    state: KernelLock<State>,
    running: AtomicBool,
    idle_task: OnceCell<TaskId>,
    heap: Heap,
    port: Arc<dyn Port>,
    timers: spin::Mutex<ArrayVec<Arc<SoftwareTimer>, MAX_TIMERS>>,
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Kernel")
            .field("state", &self.state)
            .field("running", &self.running)
            .field("idle_task", &self.idle_task.get())
            .field("heap", &self.heap)
            .field("timers", &self.timers.lock().len())
            .finish()
    }
}

/// The behavior of the idle task
fn idle_task_body(_: &Kernel, _: usize) {}

impl Kernel {
    /// Construct a kernel with the default port ([`StdPort`]).
    pub fn new() -> Self {
        Self::with_port(Arc::new(StdPort::new()))
    }

    /// Construct a kernel that sends context switch requests to `port`.
    pub fn with_port(port: Arc<dyn Port>) -> Self {
        Self {
            state: KernelLock::new(State::new()),
            running: AtomicBool::new(false),
            idle_task: OnceCell::new(),
            heap: Heap::default(),
            port,
            timers: spin::Mutex::new(ArrayVec::new()),
        }
    }

    /// Get the kernel heap, from which task stacks are allocated.
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn port(&self) -> &dyn Port {
        &*self.port
    }

    /// Create the idle task. The idle task has the lowest priority, never
    /// blocks, and runs whenever no other task is Ready.
    ///
    /// Calling this again has no effect and returns the same handle.
    pub fn initialize(&self) -> Result<TaskId, CreateTaskError> {
        let idle_task = *self.idle_task.get_or_try_init(|| {
            self.create_task("IDLE", idle_task_body, MIN_STACK_SIZE, 0, TaskPriority::IDLE)
        })?;
        log::debug!("initialized; idle task = {idle_task:?}");
        Ok(idle_task)
    }

    /// Get the idle task if [`initialize`](Self::initialize) has been called.
    pub fn idle_task(&self) -> Option<TaskId> {
        self.idle_task.get().copied()
    }

    /// Start the scheduler and run the simulation loop on the calling thread
    /// until [`stop`](Self::stop) is called. Each iteration is one
    /// [`step`](Self::step) followed by a sleep of one tick period.
    ///
    /// Fails if the kernel is already running or hasn't been initialized.
    pub fn start(&self) -> Result<(), StartKernelError> {
        if self.idle_task.get().is_none() {
            return Err(StartKernelError::BadObjectState);
        }
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(StartKernelError::BadObjectState);
        }
        log::debug!("starting the scheduler");

        {
            let mut state = self.state.lock();
            if state.current_task().is_none() {
                task::choose_next_running_task(&mut state);
            }
        }

        while self.running.load(Ordering::Acquire) {
            self.step();
            thread::sleep(cfg::tick_period());
        }

        log::debug!("scheduler stopped");
        Ok(())
    }

    /// Make [`start`](Self::start) return after its current iteration.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::AcqRel) {
            log::debug!("stopping the scheduler");
        }
    }

    /// Get a flag indicating whether [`start`](Self::start) is running the
    /// simulation loop.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run one iteration of the simulation without sleeping:
    ///
    ///  1. Give the running task a time slice by calling its behavior (with
    ///     the kernel lock released). If no task is running yet, or a Ready
    ///     task is more urgent than the running task, the highest-priority
    ///     Ready task is chosen first.
    ///  2. Process a tick (see [`process_sys_tick`](Self::process_sys_tick)).
    ///  3. If a context switch was requested, [`schedule`](Self::schedule).
    pub fn step(&self) {
        let slice = {
            let mut state = self.state.lock();
            if task::preemption_needed(&state) {
                task::choose_next_running_task(&mut state);
            }
            state.current_task().and_then(|task| {
                let task_cb = state.task_cb_mut(task)?;
                task_cb.run_count += 1;
                Some((task_cb.entry_point, task_cb.entry_param))
            })
        };

        if let Some((entry_point, entry_param)) = slice {
            entry_point(self, entry_param);
        }

        self.process_sys_tick();

        if self.take_preemption_request() {
            self.schedule();
        }
    }

    /// Handle a tick of the system clock.
    ///
    /// Increments the tick count and moves every delayed task whose wake time
    /// has come to the back of its ready list. Requests a context switch from
    /// the port if a woken task is more urgent than the running task, or if
    /// the running task's priority level has more than one Ready task. The
    /// request is advisory; the running task isn't switched here.
    ///
    /// After that, the started software timers are checked (with the kernel
    /// lock released).
    ///
    /// Returns `true` if a context switch was requested.
    pub fn process_sys_tick(&self) -> bool {
        let (preempt, now) = {
            let mut state = self.state.lock();
            let preempt = task::process_tick(&mut state);
            if preempt {
                state.preemption_pending = true;
            }
            (preempt, state.tick_count)
        };

        if preempt {
            log::trace!("preemption requested at tick {now}");
            self.port.request_context_switch();
        }

        self.check_timers(now);

        preempt
    }

    /// Read and clear the pending context switch request.
    pub fn take_preemption_request(&self) -> bool {
        core::mem::replace(&mut self.state.lock().preemption_pending, false)
    }

    /// Switch to the highest-priority Ready task if it's at least as urgent as
    /// the running task. The running task goes to the back of its ready list.
    pub fn schedule(&self) {
        let mut state = self.state.lock();
        task::choose_next_running_task(&mut state);
    }

    /// Block the running task for `ticks` ticks and let another task run.
    /// Zero ticks is a no-op.
    ///
    /// Fails if there's no running task, e.g., when called before the kernel
    /// chose one, or if the running task is the idle task, which never
    /// blocks.
    pub fn delay(&self, ticks: Ticks) -> Result<(), DelayError> {
        let mut state = self.state.lock();
        let task = state.current_task().ok_or(DelayError::BadContext)?;
        if self.idle_task() == Some(task) {
            return Err(DelayError::BadContext);
        }
        if ticks == 0 {
            return Ok(());
        }
        let wake_time = state.tick_count.saturating_add(ticks);
        log::trace!("{task:?} delayed until tick {wake_time}");
        task::wait_until(&mut state, task, wake_time);
        Ok(())
    }

    /// Create a task and make it Ready.
    ///
    /// `stack_size` is rounded up to [`MIN_STACK_SIZE`], and the stack is
    /// allocated from the kernel heap. If the kernel is running and the new
    /// task is more urgent than the running task, the new task preempts it
    /// before this method returns.
    pub fn create_task(
        &self,
        name: &str,
        behavior: TaskFn,
        stack_size: usize,
        param: usize,
        priority: TaskPriority,
    ) -> Result<TaskId, CreateTaskError> {
        if !priority.is_valid() {
            return Err(CreateTaskError::BadParam);
        }

        let mut state = self.state.lock();
        if state.tasks.len() >= MAX_TASKS {
            return Err(CreateTaskError::QueueOverflow);
        }

        let stack_size = stack_size.max(MIN_STACK_SIZE);
        let stack = self
            .heap
            .allocate(stack_size)
            .ok_or(CreateTaskError::OutOfMemory)?;

        let id = state.next_task_id;
        state.next_task_id += 1;

        let entry = state.tasks.vacant_entry();
        let task = TaskId::new(entry.key(), id);
        entry.insert(TaskCb {
            id: task,
            name: task::task_name(name),
            st: TaskState::Ready,
            priority,
            base_priority: priority,
            wake_time: 0,
            stack,
            stack_size,
            entry_point: behavior,
            entry_param: param,
            run_count: 0,
        });
        task::make_ready(&mut state, task);

        log::debug!("created task {name:?} ({task:?}, {priority:?})");

        if self.is_running() && state.running_task.is_some() && task::preemption_needed(&state) {
            task::choose_next_running_task(&mut state);
        }

        Ok(task)
    }

    /// Delete a task, releasing its slot and its stack. The idle task can't be
    /// deleted.
    ///
    /// A task may delete itself from its behavior; it won't be run again.
    pub fn delete_task(&self, task: TaskId) -> Result<(), DeleteTaskError> {
        if self.idle_task() == Some(task) {
            return Err(DeleteTaskError::BadObjectState);
        }

        let mut state = self.state.lock();
        let was_running = state.task_cb(task).ok_or(DeleteTaskError::NoAccess)?.st
            == TaskState::Running;
        task::detach(&mut state, task);
        let task_cb = state.tasks.remove(task.slot());
        self.heap.free(task_cb.stack);

        if was_running {
            task::choose_next_running_task(&mut state);
        }

        log::debug!("deleted task {:?} ({task:?})", task_cb.name);
        Ok(())
    }

    /// Suspend a task until [`resume_task`](Self::resume_task) is called. A
    /// Blocked task loses its wake time. The idle task can't be suspended.
    pub fn suspend_task(&self, task: TaskId) -> Result<(), SuspendTaskError> {
        if self.idle_task() == Some(task) {
            return Err(SuspendTaskError::BadObjectState);
        }

        let mut state = self.state.lock();
        let st = state.task_cb(task).ok_or(SuspendTaskError::NoAccess)?.st;
        if st == TaskState::Suspended {
            return Err(SuspendTaskError::BadObjectState);
        }

        task::detach(&mut state, task);
        if let Some(task_cb) = state.task_cb_mut(task) {
            task_cb.st = TaskState::Suspended;
            task_cb.wake_time = 0;
        }
        // The list can hold every task
        let _ = state.suspended.try_push(task);

        if st == TaskState::Running {
            task::choose_next_running_task(&mut state);
        }

        log::debug!("suspended {task:?}");
        Ok(())
    }

    /// Make a Suspended task Ready again. If the kernel is running and the
    /// task is more urgent than the running task, it preempts it.
    pub fn resume_task(&self, task: TaskId) -> Result<(), ResumeTaskError> {
        let mut state = self.state.lock();
        let st = state.task_cb(task).ok_or(ResumeTaskError::NoAccess)?.st;
        if st != TaskState::Suspended {
            return Err(ResumeTaskError::BadObjectState);
        }

        task::detach(&mut state, task);
        task::make_ready(&mut state, task);
        log::debug!("resumed {task:?}");

        if self.is_running() && state.running_task.is_some() && task::preemption_needed(&state) {
            task::choose_next_running_task(&mut state);
        }
        Ok(())
    }

    /// Change a task's priority. The idle task's priority is fixed.
    ///
    /// A Ready task moves to the back of its new priority's ready list. If the
    /// kernel is running and a Ready task is now more urgent than the running
    /// task, it preempts it.
    pub fn set_task_priority(
        &self,
        task: TaskId,
        priority: TaskPriority,
    ) -> Result<(), SetTaskPriorityError> {
        if !priority.is_valid() {
            return Err(SetTaskPriorityError::BadParam);
        }
        if self.idle_task() == Some(task) {
            return Err(SetTaskPriorityError::BadObjectState);
        }

        let mut state = self.state.lock();
        if state.task_cb(task).is_none() {
            return Err(SetTaskPriorityError::NoAccess);
        }
        task::set_priority(&mut state, task, priority);
        log::trace!("{task:?} priority set to {priority:?}");

        if self.is_running() && state.running_task.is_some() && task::preemption_needed(&state) {
            task::choose_next_running_task(&mut state);
        }
        Ok(())
    }

    /// Get the state of a task. A deleted task is reported as
    /// [`TaskState::Deleted`].
    pub fn task_state(&self, task: TaskId) -> TaskState {
        self.state
            .lock()
            .task_cb(task)
            .map_or(TaskState::Deleted, |task_cb| task_cb.st)
    }

    /// Get a snapshot of a task, or `None` if it was deleted.
    pub fn task_info(&self, task: TaskId) -> Option<TaskInfo> {
        self.state.lock().task_cb(task).map(TaskInfo::from)
    }

    /// Get the task in the Running state.
    pub fn current_task(&self) -> Option<TaskId> {
        self.state.lock().current_task()
    }

    /// Get the task [`schedule`](Self::schedule) would pick from the ready
    /// lists: the front of the highest-priority nonempty list.
    pub fn highest_priority_task(&self) -> Option<TaskId> {
        self.state.lock().ready_queue.front_task()
    }

    /// Get the Ready tasks in the order they would be scheduled: highest
    /// priority first, FIFO within a priority.
    pub fn ready_tasks(&self) -> Vec<TaskId> {
        self.state.lock().ready_queue.iter().collect()
    }

    /// Get the number of live tasks, including the idle task.
    pub fn task_count(&self) -> usize {
        self.state.lock().tasks.len()
    }

    /// Get the number of Ready tasks at `priority`.
    pub fn ready_task_count(&self, priority: TaskPriority) -> usize {
        if !priority.is_valid() {
            return 0;
        }
        self.state.lock().ready_queue.len_at(priority.index())
    }

    pub fn tick_count(&self) -> Ticks {
        self.state.lock().tick_count
    }

    /// Get the number of times the running task changed.
    pub fn context_switch_count(&self) -> u64 {
        self.state.lock().context_switch_count
    }

    /// Get the number of started software timers.
    pub fn timer_count(&self) -> usize {
        self.timers.lock().len()
    }

    /// Add `timer` to the registry unless it's already there. Returns `false`
    /// if the registry is full.
    pub(crate) fn register_timer(&self, timer: &Arc<SoftwareTimer>) -> bool {
        let mut timers = self.timers.lock();
        if timers.iter().any(|t| Arc::ptr_eq(t, timer)) {
            return true;
        }
        timers.try_push(Arc::clone(timer)).is_ok()
    }

    pub(crate) fn unregister_timer(&self, timer: &Arc<SoftwareTimer>) {
        self.timers.lock().retain(|t| !Arc::ptr_eq(t, timer));
    }

    fn check_timers(&self, now: Ticks) {
        // Callbacks may start or stop timers, so don't hold the registry lock
        // while calling them
        let timers = self.timers.lock().clone();
        if timers.is_empty() {
            return;
        }
        for timer in &timers {
            timer.check(now);
        }
        self.timers.lock().retain(|t| t.is_active());
    }
}
