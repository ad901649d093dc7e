//! Deferred work ("check again in a second").
//!
//! Every task remembers the match generation it was scheduled under. The
//! orchestrator compares that against the live generation when the task
//! comes due and silently drops anything stale.

use crate::host::PlayerId;

/// Identity of a match and round. Changes on every match start, match end and round start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Generation {
    pub match_serial: u64,
    pub round: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deferred {
    /// Re-run the elimination check after a death settles.
    EliminationCheck,
    /// Move a freshly spawned player to their team spawn.
    RedirectToSpawn(PlayerId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledTask {
    pub due: u64,
    pub generation: Generation,
    pub task: Deferred,
}

#[derive(Debug, Default)]
pub struct Scheduler {
    tasks: Vec<ScheduledTask>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Queue `task` to run `delay` ticks after `now`.
    pub fn schedule(&mut self, now: u64, delay: u64, generation: Generation, task: Deferred) {
        self.tasks.push(ScheduledTask {
            due: now + delay,
            generation,
            task,
        });
    }

    /// Remove and return every task due at or before `now`, in scheduling order.
    pub fn take_due(&mut self, now: u64) -> Vec<ScheduledTask> {
        let (due, pending): (Vec<_>, Vec<_>) = self.tasks.drain(..).partition(|t| t.due <= now);
        self.tasks = pending;
        due
    }

    pub fn clear(&mut self) {
        self.tasks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_due_keeps_future_tasks() {
        let mut scheduler = Scheduler::new();
        let generation = Generation::default();
        scheduler.schedule(10, 1, generation, Deferred::EliminationCheck);
        scheduler.schedule(10, 3, generation, Deferred::RedirectToSpawn(4));

        assert!(scheduler.take_due(10).is_empty());
        let due = scheduler.take_due(11);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].task, Deferred::EliminationCheck);
        assert_eq!(scheduler.len(), 1);

        let due = scheduler.take_due(20);
        assert_eq!(due[0].task, Deferred::RedirectToSpawn(4));
        assert!(scheduler.is_empty());
    }
}
