//! The two task queues behind a run loop.
//!
//! [`DualQueue`] is not synchronized on its own; the run loop core guards it
//! with the same mutex that protects the pending counter.

use crate::task::Task;

use std::collections::VecDeque;

/// Which queue a handle submits to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Lane {
    /// Regular work, run once the priority queue is empty.
    #[default]
    Normal,
    /// Work that overtakes everything waiting in the normal queue.
    Priority,
}

/// A normal and a priority FIFO queue.
///
/// Each task lives in exactly one queue until popped and is never re-inserted.
#[derive(Debug, Default)]
pub(crate) struct DualQueue {
    normal: VecDeque<Task>,
    priority: VecDeque<Task>,
}

impl DualQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Appends `task` to the back of `lane`'s queue.
    pub(crate) fn push(&mut self, lane: Lane, task: Task) {
        match lane {
            Lane::Normal => self.normal.push_back(task),
            Lane::Priority => self.priority.push_back(task),
        }
    }

    /// Pops the next task to run.
    ///
    /// The priority queue always wins while it is non-empty, whatever the
    /// arrival order relative to normal tasks.
    pub(crate) fn pop(&mut self) -> Option<Task> {
        self.priority
            .pop_front()
            .or_else(|| self.normal.pop_front())
    }

    pub(crate) fn len(&self) -> usize {
        self.normal.len() + self.priority.len()
    }

    /// Removes every queued task, priority first.
    pub(crate) fn drain(&mut self) -> Vec<Task> {
        self.priority
            .drain(..)
            .chain(self.normal.drain(..))
            .collect()
    }
}
