//! Cooperative task queue with a virtual clock.
//!
//! Shadows model asynchronous platform behavior by posting tasks. Nothing
//! runs until the scenario drains the queue through the sandbox
//! ([`crate::Sandbox::idle`] and friends), and draining always happens on the
//! scenario's thread.
//!
//! Tasks are ordered by `(due time, post sequence)`, which yields FIFO order
//! for tasks due at the same instant. The clock only moves when the scenario
//! advances it.

use std::{collections::BTreeMap, sync::Mutex, time::Duration};

use crate::{Result, Sandbox};

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce(&Sandbox) -> Result<()> + Send>;

#[derive(Default)]
struct QueueInner {
    now: Duration,
    sequence: u64,
    tasks: BTreeMap<(Duration, u64), Task>,
}

/// Per-sandbox task queue.
#[derive(Default)]
pub(crate) struct TaskQueue {
    inner: Mutex<QueueInner>,
}

impl TaskQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Schedules `task` to run `delay` after the current virtual time.
    pub(crate) fn post_delayed(&self, delay: Duration, task: Task) -> Result<()> {
        let mut inner = lock!(self.inner)?;
        let due = inner.now.saturating_add(delay);
        let sequence = inner.sequence;
        inner.sequence += 1;
        inner.tasks.insert((due, sequence), task);
        Ok(())
    }

    /// Removes the earliest task due at or before `deadline`.
    ///
    /// The clock moves forward to the task's due time if that is later than
    /// the current time.
    pub(crate) fn pop_due(&self, deadline: Duration) -> Result<Option<Task>> {
        let mut inner = lock!(self.inner)?;
        let due = match inner.tasks.first_key_value() {
            Some((&(due, _), _)) if due <= deadline => due,
            _ => return Ok(None),
        };
        if due > inner.now {
            inner.now = due;
        }
        Ok(inner.tasks.pop_first().map(|(_, task)| task))
    }

    /// Moves the clock forward to `time`; never moves it backwards.
    pub(crate) fn advance_to(&self, time: Duration) -> Result<()> {
        let mut inner = lock!(self.inner)?;
        if time > inner.now {
            inner.now = time;
        }
        Ok(())
    }

    /// The current virtual time.
    pub(crate) fn now(&self) -> Result<Duration> {
        Ok(lock!(self.inner)?.now)
    }

    /// Number of queued tasks, due or not.
    pub(crate) fn len(&self) -> Result<usize> {
        Ok(lock!(self.inner)?.tasks.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Task {
        Box::new(|_| Ok(()))
    }

    #[test]
    fn test_due_ordering() {
        let queue = TaskQueue::new();
        queue.post_delayed(Duration::from_millis(10), noop()).unwrap();
        queue.post_delayed(Duration::ZERO, noop()).unwrap();

        assert_eq!(queue.len().unwrap(), 2);
        assert!(queue.pop_due(Duration::ZERO).unwrap().is_some());
        assert!(queue.pop_due(Duration::ZERO).unwrap().is_none());

        assert!(queue.pop_due(Duration::from_millis(10)).unwrap().is_some());
        assert_eq!(queue.now().unwrap(), Duration::from_millis(10));
        assert_eq!(queue.len().unwrap(), 0);
    }

    #[test]
    fn test_clock_never_moves_backwards() {
        let queue = TaskQueue::new();
        queue.advance_to(Duration::from_secs(2)).unwrap();
        queue.advance_to(Duration::from_secs(1)).unwrap();
        assert_eq!(queue.now().unwrap(), Duration::from_secs(2));

        queue.post_delayed(Duration::from_secs(1), noop()).unwrap();
        assert!(queue.pop_due(Duration::from_secs(2)).unwrap().is_none());
        assert!(queue.pop_due(Duration::from_secs(3)).unwrap().is_some());
    }
}
