use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use thiserror::Error;

use crate::snapshot::{CounterSnapshot, Departure, Snapshot, TaskOutcome, TaskSnapshot, Unit};

/// Errors returned by [`Tracker`] operations.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Error)]
pub enum TrackError {
    /// The referenced task or counter was never registered or has already
    /// been removed. Surfaced instead of swallowed so callers can catch
    /// remove/advance races.
    #[error("unknown or removed progress handle")]
    HandleNotFound,
}

/// Handle to a task registered with [`Tracker::task`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct TaskId(u64);

/// Handle to an aggregate counter registered with [`Tracker::counter`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct CounterId(u64);

struct TaskState {
    id: TaskId,
    label: String,
    unit: Unit,
    current: u64,
    total: Option<u64>,
    started: Instant,
}

struct CounterState {
    id: CounterId,
    name: String,
    unit: Unit,
    current: u64,
    total: u64,
    started: Instant,
}

#[derive(Default)]
struct TrackerState {
    next_id: u64,
    tasks: Vec<TaskState>,
    counters: Vec<CounterState>,
    departures: Vec<Departure>,
}

impl TrackerState {
    fn task_mut(&mut self, id: TaskId) -> Result<&mut TaskState, TrackError> {
        self.tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(TrackError::HandleNotFound)
    }

    fn counter_mut(&mut self, id: CounterId) -> Result<&mut CounterState, TrackError> {
        self.counters
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(TrackError::HandleNotFound)
    }

    fn depart(&mut self, id: TaskId, outcome: TaskOutcome) -> Result<(), TrackError> {
        let index = self
            .tasks
            .iter()
            .position(|t| t.id == id)
            .ok_or(TrackError::HandleNotFound)?;
        self.tasks.remove(index);
        self.departures.push(Departure { id, outcome });
        Ok(())
    }
}

/// Thread-safe bookkeeping for live progress state.
///
/// A `Tracker` holds removable per-task rows and persistent aggregate
/// counters. Any number of threads can mutate them concurrently; a consumer
/// (usually a [`Renderer`](crate::Renderer)) periodically pulls a consistent
/// [`Snapshot`]. Cloning is cheap and every clone refers to the same state.
///
/// ```
/// use inroads::Tracker;
///
/// let tracker = Tracker::new();
/// let task = tracker.task("copying", Some(100));
/// tracker.advance(task, 10).unwrap();
/// assert_eq!(tracker.snapshot().task(task).unwrap().current, 10);
/// ```
#[derive(Clone, Default)]
pub struct Tracker {
    shared: Arc<Mutex<TrackerState>>,
}

impl Tracker {
    pub fn new() -> Self {
        Self::default()
    }

    // Every operation takes the lock once and updates state in one complete
    // step, so a caller that panics can never leave a half-applied update
    // behind. That also means a poisoned lock still guards consistent data
    // and can be recovered rather than propagated.
    fn state(&self) -> MutexGuard<'_, TrackerState> {
        self.shared
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a new task starting at zero progress.
    ///
    /// `total` may be `None` if the amount of work is not known yet; it can
    /// be filled in later with [`Self::set_total`].
    pub fn task(&self, label: impl Into<String>, total: Option<u64>) -> TaskId {
        self.register_task(label.into(), Unit::Items, total)
    }

    /// Like [`Self::task`], for progress measured in bytes.
    pub fn byte_task(&self, label: impl Into<String>, total: Option<u64>) -> TaskId {
        self.register_task(label.into(), Unit::Bytes, total)
    }

    fn register_task(&self, label: String, unit: Unit, total: Option<u64>) -> TaskId {
        let mut state = self.state();
        state.next_id += 1;
        let id = TaskId(state.next_id);
        state.tasks.push(TaskState {
            id,
            label,
            unit,
            current: 0,
            total,
            started: Instant::now(),
        });
        id
    }

    /// Registers a named aggregate counter, e.g. files processed so far.
    ///
    /// Counters live for the lifetime of the tracker. Their total may grow
    /// after creation as new work is discovered, see
    /// [`Self::grow_counter_total`].
    pub fn counter(&self, name: impl Into<String>, total: u64) -> CounterId {
        self.register_counter(name.into(), Unit::Items, total)
    }

    /// Like [`Self::counter`], for totals measured in bytes.
    pub fn byte_counter(&self, name: impl Into<String>, total: u64) -> CounterId {
        self.register_counter(name.into(), Unit::Bytes, total)
    }

    fn register_counter(&self, name: String, unit: Unit, total: u64) -> CounterId {
        let mut state = self.state();
        state.next_id += 1;
        let id = CounterId(state.next_id);
        state.counters.push(CounterState {
            id,
            name,
            unit,
            current: 0,
            total,
            started: Instant::now(),
        });
        id
    }

    /// Adds `by` to the task's progress.
    ///
    /// Progress is never clamped: advancing past a known total keeps
    /// counting, and the task's [`TaskSnapshot::overran`] flag is set.
    pub fn advance(&self, task: TaskId, by: u64) -> Result<(), TrackError> {
        let mut state = self.state();
        let task = state.task_mut(task)?;
        task.current = task.current.saturating_add(by);
        Ok(())
    }

    /// Adds 1 to the task's progress.
    pub fn inc(&self, task: TaskId) -> Result<(), TrackError> {
        self.advance(task, 1)
    }

    /// Replaces the task's total. Safe to call while other threads advance
    /// the same task; the two updates are serialized by the tracker's lock.
    pub fn set_total(&self, task: TaskId, total: Option<u64>) -> Result<(), TrackError> {
        let mut state = self.state();
        state.task_mut(task)?.total = total;
        Ok(())
    }

    /// Replaces the task's label text.
    pub fn set_label(&self, task: TaskId, label: impl Into<String>) -> Result<(), TrackError> {
        let mut state = self.state();
        state.task_mut(task)?.label = label.into();
        Ok(())
    }

    /// Marks the task as finished and removes it from the active set.
    ///
    /// The next snapshot reports the departure as
    /// [`TaskOutcome::Completed`]; surfaces paint the row full one last
    /// time. Any later operation on the handle fails with
    /// [`TrackError::HandleNotFound`].
    pub fn complete(&self, task: TaskId) -> Result<(), TrackError> {
        self.state().depart(task, TaskOutcome::Completed)
    }

    /// Removes the task without completing it.
    ///
    /// Use this when a worker is cancelled or fails mid-task, so the handle
    /// is never left dangling. The next snapshot reports the departure as
    /// [`TaskOutcome::Abandoned`].
    pub fn abandon(&self, task: TaskId) -> Result<(), TrackError> {
        self.state().depart(task, TaskOutcome::Abandoned)
    }

    /// Adds `by` to an aggregate counter.
    pub fn add(&self, counter: CounterId, by: u64) -> Result<(), TrackError> {
        let mut state = self.state();
        let counter = state.counter_mut(counter)?;
        counter.current = counter.current.saturating_add(by);
        Ok(())
    }

    /// Replaces an aggregate counter's total.
    pub fn set_counter_total(&self, counter: CounterId, total: u64) -> Result<(), TrackError> {
        let mut state = self.state();
        state.counter_mut(counter)?.total = total;
        Ok(())
    }

    /// Grows an aggregate counter's total by `by`.
    ///
    /// Totals may increase while work is in flight, e.g. as the sizes of
    /// newly discovered files become known. Growing the total never resets
    /// the counter's current value.
    pub fn grow_counter_total(&self, counter: CounterId, by: u64) -> Result<(), TrackError> {
        let mut state = self.state();
        let counter = state.counter_mut(counter)?;
        counter.total = counter.total.saturating_add(by);
        Ok(())
    }

    /// Copies all live state into an immutable [`Snapshot`].
    ///
    /// The copy is made under a single lock acquisition, so every entry is
    /// consistent with the same instant. Tasks removed since the previous
    /// snapshot are listed in [`Snapshot::departures`] and reported exactly
    /// once.
    pub fn snapshot(&self) -> Snapshot {
        let mut state = self.state();
        let now = Instant::now();
        Snapshot {
            counters: state
                .counters
                .iter()
                .map(|c| CounterSnapshot {
                    id: c.id,
                    name: c.name.clone(),
                    unit: c.unit,
                    current: c.current,
                    total: c.total,
                    elapsed: now.duration_since(c.started),
                    overran: c.current > c.total,
                })
                .collect(),
            tasks: state
                .tasks
                .iter()
                .map(|t| TaskSnapshot {
                    id: t.id,
                    label: t.label.clone(),
                    unit: t.unit,
                    current: t.current,
                    total: t.total,
                    elapsed: now.duration_since(t.started),
                    overran: t.total.is_some_and(|total| t.current > total),
                })
                .collect(),
            departures: std::mem::take(&mut state.departures),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn concurrent_advances_are_not_lost() {
        let tracker = Tracker::new();
        let task = tracker.task("stress", Some(100_000));

        thread::scope(|s| {
            for _ in 0..100 {
                let tracker = tracker.clone();
                s.spawn(move || {
                    for _ in 0..1000 {
                        tracker.inc(task).unwrap();
                    }
                });
            }
        });

        let snap = tracker.snapshot();
        assert_eq!(snap.task(task).unwrap().current, 100_000);
    }

    #[test]
    fn concurrent_counter_adds_are_not_lost() {
        let tracker = Tracker::new();
        let bytes = tracker.counter("bytes", 0);

        thread::scope(|s| {
            for _ in 0..8 {
                let tracker = tracker.clone();
                s.spawn(move || {
                    for _ in 0..1000 {
                        tracker.add(bytes, 3).unwrap();
                    }
                });
            }
        });

        assert_eq!(tracker.snapshot().counter(bytes).unwrap().current, 24_000);
    }

    #[test]
    fn operations_after_removal_fail() {
        let tracker = Tracker::new();
        let task = tracker.task("gone", Some(10));
        tracker.complete(task).unwrap();

        assert_eq!(tracker.advance(task, 1), Err(TrackError::HandleNotFound));
        assert_eq!(tracker.set_total(task, Some(20)), Err(TrackError::HandleNotFound));
        assert_eq!(tracker.complete(task), Err(TrackError::HandleNotFound));
        assert_eq!(tracker.abandon(task), Err(TrackError::HandleNotFound));
    }

    #[test]
    fn unknown_handle_fails() {
        let a = Tracker::new();
        let b = Tracker::new();
        let foreign = a.task("foreign", None);
        assert_eq!(b.advance(foreign, 1), Err(TrackError::HandleNotFound));
    }

    #[test]
    fn growing_a_total_keeps_current() {
        let tracker = Tracker::new();
        let bytes = tracker.counter("bytes", 100);
        tracker.add(bytes, 60).unwrap();
        tracker.grow_counter_total(bytes, 150).unwrap();

        let snap = tracker.snapshot();
        let counter = snap.counter(bytes).unwrap();
        assert_eq!(counter.current, 60);
        assert_eq!(counter.total, 250);
        assert!(!counter.overran);
    }

    #[test]
    fn raising_a_task_total_keeps_current() {
        let tracker = Tracker::new();
        let task = tracker.task("download", Some(10));
        tracker.advance(task, 7).unwrap();
        tracker.set_total(task, Some(30)).unwrap();

        let snap = tracker.snapshot();
        let entry = snap.task(task).unwrap();
        assert_eq!(entry.current, 7);
        assert_eq!(entry.total, Some(30));
    }

    #[test]
    fn advancing_past_the_total_overruns_without_clamping() {
        let tracker = Tracker::new();
        let task = tracker.task("optimist", Some(10));
        tracker.advance(task, 15).unwrap();

        let snap = tracker.snapshot();
        let entry = snap.task(task).unwrap();
        assert_eq!(entry.current, 15);
        assert!(entry.overran);
        assert_eq!(entry.fraction(), Some(1.0));
    }

    #[test]
    fn indeterminate_tasks_have_no_fraction() {
        let tracker = Tracker::new();
        let task = tracker.task("scanning", None);
        tracker.advance(task, 42).unwrap();

        let snap = tracker.snapshot();
        let entry = snap.task(task).unwrap();
        assert!(!entry.overran);
        assert_eq!(entry.fraction(), None);
    }

    #[test]
    fn complete_removes_and_reports_the_departure_once() {
        let tracker = Tracker::new();
        let task = tracker.task("short", Some(10));
        tracker.advance(task, 4).unwrap();
        tracker.complete(task).unwrap();

        // The departure is visible once; the task itself is gone.
        let snap = tracker.snapshot();
        assert!(snap.task(task).is_none());
        assert_eq!(snap.departures.len(), 1);
        assert_eq!(snap.departures[0].id, task);
        assert_eq!(snap.departures[0].outcome, TaskOutcome::Completed);
        assert!(tracker.snapshot().departures.is_empty());
    }

    #[test]
    fn abandonment_is_reported_as_such() {
        let tracker = Tracker::new();
        let task = tracker.task("doomed", Some(10));
        tracker.advance(task, 3).unwrap();
        tracker.abandon(task).unwrap();

        let snap = tracker.snapshot();
        assert_eq!(snap.departures[0].outcome, TaskOutcome::Abandoned);
    }

    #[test]
    fn snapshots_are_internally_consistent() {
        // A total raised before an advance (in program order, under the same
        // lock discipline) must never be observed "torn": a snapshot that
        // contains the advanced current must also contain the raised total.
        let tracker = Tracker::new();
        let task = tracker.task("torn", Some(1000));
        let done = Arc::new(std::sync::atomic::AtomicBool::new(false));

        thread::scope(|s| {
            let writer = tracker.clone();
            let writer_done = done.clone();
            s.spawn(move || {
                for i in 1..=500u64 {
                    writer.set_total(task, Some(1000 + i)).unwrap();
                    writer.advance(task, 2).unwrap();
                }
                writer_done.store(true, std::sync::atomic::Ordering::Release);
            });

            let reader = tracker.clone();
            s.spawn(move || {
                while !done.load(std::sync::atomic::Ordering::Acquire) {
                    let snap = reader.snapshot();
                    let entry = snap.task(task).unwrap();
                    // current = 2i implies total >= 1000 + i
                    let implied = 1000 + entry.current / 2;
                    assert!(entry.total.unwrap() >= implied);
                }
            });
        });
    }
}
