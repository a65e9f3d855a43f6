//! Task ready queue implementation (internal use only).
//!
//! **This module is exempt from the API stability guarantee.**
use std::collections::VecDeque;

use crate::{cfg::MAX_PRIORITIES, task::TaskId, utils::PrioBitmap};

/// Tracks the Ready tasks in per-priority FIFO lists. A bitmap of the
/// nonempty lists makes finding the highest ready priority constant-time.
#[derive(Debug)]
pub(crate) struct ReadyQueue {
    queues: [VecDeque<TaskId>; MAX_PRIORITIES],
    bitmap: PrioBitmap,
}

/// The result of [`ReadyQueue::pop_front_task`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScheduleDecision<T> {
    /// The current task should keep running.
    Keep,
    /// The current task should be replaced with the contained one (or with
    /// nothing).
    SwitchTo(T),
}

impl ReadyQueue {
    pub(crate) fn new() -> Self {
        Self {
            queues: std::array::from_fn(|_| VecDeque::with_capacity(crate::cfg::MAX_TASKS)),
            bitmap: PrioBitmap::new(),
        }
    }

    /// Insert `task` at the back of the list for `priority`.
    pub(crate) fn push_back_task(&mut self, task: TaskId, priority: usize) {
        debug_assert!(!self.queues[priority].contains(&task));
        self.queues[priority].push_back(task);
        self.bitmap.set(priority);
    }

    /// Remove `task` from the list for `priority`. Returns `false` if it wasn't
    /// there.
    pub(crate) fn remove_task(&mut self, task: TaskId, priority: usize) -> bool {
        let queue = &mut self.queues[priority];
        let Some(i) = queue.iter().position(|&t| t == task) else {
            return false;
        };
        queue.remove(i);
        if queue.is_empty() {
            self.bitmap.clear(priority);
        }
        true
    }

    /// Get the task that would be chosen next, without removing it.
    pub(crate) fn front_task(&self) -> Option<TaskId> {
        let priority = self.bitmap.find_highest()?;
        self.queues[priority].front().copied()
    }

    /// Get the highest priority among the Ready tasks.
    pub(crate) fn highest_priority(&self) -> Option<usize> {
        self.bitmap.find_highest()
    }

    /// Get the number of Ready tasks at `priority`.
    pub(crate) fn len_at(&self, priority: usize) -> usize {
        self.queues[priority].len()
    }

    /// Choose the next task to schedule based on `prev_task_priority`, the
    /// priority of the task that is still Running, or `None` if there is no
    /// such task (e.g., it has just blocked).
    ///
    /// The Running task only gives way to a task of equal (round-robin) or
    /// higher priority:
    ///
    /// | `prev_task_priority` | Highest Ready priority |        Returns      |
    /// | -------------------- | ---------------------- | ------------------- |
    /// |       `None`         |         none           |  `SwitchTo(None)`   |
    /// |       `None`         |         any            | `SwitchTo(Some(_))` |
    /// |      `Some(p)`       |   none, or below `p`   |       `Keep`        |
    /// |      `Some(p)`       |       `p` or above     | `SwitchTo(Some(_))` |
    ///
    /// If this method returns `SwitchTo(Some(task))`, `task` is removed from
    /// the queue.
    pub(crate) fn pop_front_task(
        &mut self,
        prev_task_priority: Option<usize>,
    ) -> ScheduleDecision<Option<TaskId>> {
        let Some(priority) = self.bitmap.find_highest() else {
            return if prev_task_priority.is_some() {
                ScheduleDecision::Keep
            } else {
                ScheduleDecision::SwitchTo(None)
            };
        };

        if matches!(prev_task_priority, Some(prev) if prev > priority) {
            return ScheduleDecision::Keep;
        }

        let queue = &mut self.queues[priority];
        let task = queue.pop_front();
        if queue.is_empty() {
            self.bitmap.clear(priority);
        }
        ScheduleDecision::SwitchTo(task)
    }

    /// Iterate over the Ready tasks, highest priority first, FIFO within a
    /// priority.
    pub(crate) fn iter(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.queues.iter().rev().flat_map(|queue| queue.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;
    use std::collections::BTreeMap;

    fn task(i: u32) -> TaskId {
        TaskId::new(i as usize, i + 1)
    }

    #[test]
    fn fifo_within_priority() {
        let mut queue = ReadyQueue::new();
        queue.push_back_task(task(0), 3);
        queue.push_back_task(task(1), 3);
        queue.push_back_task(task(2), 1);

        assert_eq!(queue.front_task(), Some(task(0)));
        assert_eq!(
            queue.pop_front_task(None),
            ScheduleDecision::SwitchTo(Some(task(0)))
        );
        assert_eq!(
            queue.pop_front_task(None),
            ScheduleDecision::SwitchTo(Some(task(1)))
        );
        assert_eq!(queue.highest_priority(), Some(1));
        assert_eq!(
            queue.pop_front_task(None),
            ScheduleDecision::SwitchTo(Some(task(2)))
        );
        assert_eq!(queue.pop_front_task(None), ScheduleDecision::SwitchTo(None));
    }

    #[test]
    fn running_task_is_kept_against_lower_priorities() {
        let mut queue = ReadyQueue::new();
        assert_eq!(queue.pop_front_task(Some(2)), ScheduleDecision::Keep);

        queue.push_back_task(task(0), 1);
        assert_eq!(queue.pop_front_task(Some(2)), ScheduleDecision::Keep);

        queue.push_back_task(task(1), 2);
        assert_eq!(
            queue.pop_front_task(Some(2)),
            ScheduleDecision::SwitchTo(Some(task(1)))
        );
        assert_eq!(queue.iter().count(), 1);
    }

    #[test]
    fn remove_updates_bitmap() {
        let mut queue = ReadyQueue::new();
        queue.push_back_task(task(0), 5);
        assert!(queue.remove_task(task(0), 5));
        assert!(!queue.remove_task(task(0), 5));
        assert_eq!(queue.highest_priority(), None);
        assert_eq!(queue.front_task(), None);
    }

    /// Compare against a model that scans every priority level.
    #[quickcheck]
    fn quickcheck_matches_model(cmds: Vec<(bool, u8)>) {
        let mut subject = ReadyQueue::new();
        let mut model: BTreeMap<usize, VecDeque<TaskId>> = BTreeMap::new();
        let mut next = 0;

        for (push, value) in cmds {
            if push {
                let priority = value as usize % MAX_PRIORITIES;
                let t = task(next);
                next += 1;
                subject.push_back_task(t, priority);
                model.entry(priority).or_default().push_back(t);
            } else {
                let expected = model
                    .iter_mut()
                    .rev()
                    .find(|(_, q)| !q.is_empty())
                    .and_then(|(_, q)| q.pop_front());
                assert_eq!(
                    subject.pop_front_task(None),
                    ScheduleDecision::SwitchTo(expected)
                );
            }

            let expected_iter: Vec<_> = model.values().rev().flatten().copied().collect();
            assert_eq!(subject.iter().collect::<Vec<_>>(), expected_iter);
        }
    }
}
