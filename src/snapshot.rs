use std::time::Duration;

use crate::tracker::{CounterId, TaskId};

/// What a progress value counts. Surfaces use this to pick a presentation,
/// e.g. binary byte sizes and a transfer rate for [`Unit::Bytes`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Unit {
    Items,
    Bytes,
}

/// How a task left the active set.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TaskOutcome {
    /// The task ran to completion.
    Completed,
    /// The task was given up on before completing.
    Abandoned,
}

/// The state of a single task at the instant a snapshot was taken.
#[derive(Clone, Debug)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub label: String,
    pub unit: Unit,
    pub current: u64,
    /// `None` means the amount of work is not known yet.
    pub total: Option<u64>,
    /// Time since the task was registered.
    pub elapsed: Duration,
    /// True if `current` has passed a known `total`. Progress is never
    /// clamped, so a surface can use this to flag over-counting callers.
    pub overran: bool,
}

impl TaskSnapshot {
    /// Completed fraction in `0.0..=1.0`, or `None` while the total is unknown.
    pub fn fraction(&self) -> Option<f64> {
        match self.total {
            Some(total) if total > 0 => Some((self.current as f64 / total as f64).clamp(0.0, 1.0)),
            Some(_) => Some(1.0),
            None => None,
        }
    }
}

/// The state of a single aggregate counter at the instant a snapshot was taken.
#[derive(Clone, Debug)]
pub struct CounterSnapshot {
    pub id: CounterId,
    pub name: String,
    pub unit: Unit,
    pub current: u64,
    pub total: u64,
    pub elapsed: Duration,
    pub overran: bool,
}

/// A task that left the active set since the previous snapshot.
#[derive(Clone, Copy, Debug)]
pub struct Departure {
    pub id: TaskId,
    pub outcome: TaskOutcome,
}

/// A consistent point-in-time copy of all live progress state.
///
/// Produced by [`Tracker::snapshot`](crate::Tracker::snapshot) under a single
/// lock acquisition, so no entry can reflect a half-applied update.
/// `departures` lists the tasks removed since the previous snapshot; they are
/// handed out exactly once, to whoever takes that snapshot.
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    pub counters: Vec<CounterSnapshot>,
    pub tasks: Vec<TaskSnapshot>,
    pub departures: Vec<Departure>,
}

impl Snapshot {
    pub fn task(&self, id: TaskId) -> Option<&TaskSnapshot> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn counter(&self, id: CounterId) -> Option<&CounterSnapshot> {
        self.counters.iter().find(|c| c.id == id)
    }
}
