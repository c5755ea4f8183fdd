use crate::types::{EntityId, GamePhase};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskStatus {
    Continue,
    Done,
}

/// A resumable unit of work advanced once per tick.
pub trait Task {
    fn resume(&mut self, dt_ms: u64) -> TaskStatus;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TaskOwner {
    Entity(EntityId),
    Phase(GamePhase),
}

/// Tasks keyed by owner so that an owner going away cancels everything it
/// started. Tasks run in spawn order.
#[derive(Clone, Debug)]
pub struct TaskList<T> {
    entries: Vec<(TaskOwner, T)>,
}

impl<T> Default for TaskList<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T: Task> TaskList<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn(&mut self, owner: TaskOwner, task: T) {
        self.entries.push((owner, task));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn has_owner(&self, owner: TaskOwner) -> bool {
        self.entries.iter().any(|(entry_owner, _)| *entry_owner == owner)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (TaskOwner, &mut T)> {
        self.entries.iter_mut().map(|(owner, task)| (*owner, task))
    }

    /// Resumes every task and hands back the ones that finished.
    pub fn run(&mut self, dt_ms: u64) -> Vec<(TaskOwner, T)> {
        let mut finished = Vec::new();
        let mut kept = Vec::with_capacity(self.entries.len());
        for (owner, mut task) in self.entries.drain(..) {
            match task.resume(dt_ms) {
                TaskStatus::Continue => kept.push((owner, task)),
                TaskStatus::Done => finished.push((owner, task)),
            }
        }
        self.entries = kept;
        finished
    }

    pub fn cancel_owner(&mut self, owner: TaskOwner) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(entry_owner, _)| *entry_owner != owner);
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Finishes once the given amount of time has been fed to it.
#[derive(Clone, Debug)]
pub struct Countdown {
    remaining_ms: u64,
}

impl Countdown {
    pub fn new(duration_ms: u64) -> Self {
        Self {
            remaining_ms: duration_ms,
        }
    }

    pub fn remaining_ms(&self) -> u64 {
        self.remaining_ms
    }
}

impl Task for Countdown {
    fn resume(&mut self, dt_ms: u64) -> TaskStatus {
        self.remaining_ms = self.remaining_ms.saturating_sub(dt_ms);
        if self.remaining_ms == 0 {
            TaskStatus::Done
        } else {
            TaskStatus::Continue
        }
    }
}
