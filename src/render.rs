use std::collections::HashMap;
use std::io;
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::sync::{mpsc, Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use log::{debug, warn};
use thiserror::Error;

use crate::logsink::{LogSink, SinkShared};
use crate::style::RenderOptions;
use crate::surface::{RowId, Surface};
use crate::tracker::{CounterId, TaskId, Tracker};

/// Errors from [`Renderer`] lifecycle operations.
#[derive(Debug, Error)]
pub enum RenderError {
    /// [`Renderer::start`] was called on a renderer that is running or has
    /// already run. A renderer goes through its lifecycle once; build a new
    /// one to paint again.
    #[error("renderer was already started")]
    AlreadyStarted,
    /// The paint thread panicked. Progress state is unaffected.
    #[error("render thread panicked")]
    TickPanicked,
    #[error(transparent)]
    Io(#[from] io::Error),
}

enum Phase {
    Idle,
    Running {
        stop: Sender<()>,
        thread: JoinHandle<io::Result<()>>,
    },
    Stopped,
}

/// Periodically samples a [`Tracker`] and paints the result to a
/// [`Surface`].
///
/// The renderer owns display-row lifecycle: rows are created when a task or
/// counter first shows up in a snapshot and retired when the task departs.
/// Its cadence is independent of the workers'; updates landing between two
/// ticks are coalesced.
///
/// `start` spawns the paint thread, `stop` signals it, paints one final
/// snapshot and joins. Dropping a running renderer stops it, so the rows
/// are flushed on every exit path.
pub struct Renderer {
    tracker: Tracker,
    surface: Mutex<Option<Box<dyn Surface>>>,
    options: RenderOptions,
    sink: Arc<SinkShared>,
    phase: Mutex<Phase>,
}

impl Renderer {
    pub fn new(tracker: Tracker, surface: impl Surface + 'static, options: RenderOptions) -> Self {
        Renderer {
            tracker,
            surface: Mutex::new(Some(Box::new(surface))),
            options,
            sink: SinkShared::stderr(),
            phase: Mutex::new(Phase::Idle),
        }
    }

    /// A [`LogSink`] whose lines are painted above the live rows while this
    /// renderer runs, and go to stderr otherwise.
    pub fn sink(&self) -> LogSink {
        LogSink::from_shared(self.sink.clone())
    }

    fn phase(&self) -> MutexGuard<'_, Phase> {
        self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts the paint thread.
    ///
    /// Fails with [`RenderError::AlreadyStarted`] if the renderer is
    /// running or was already stopped.
    pub fn start(&self) -> Result<(), RenderError> {
        let mut phase = self.phase();
        if !matches!(*phase, Phase::Idle) {
            return Err(RenderError::AlreadyStarted);
        }
        let Some(surface) = self
            .surface
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            return Err(RenderError::AlreadyStarted);
        };

        let tracker = self.tracker.clone();
        let sink = self.sink.clone();
        let interval = self.options.interval;
        sink.set_live(true);
        let (stop, stop_signal) = mpsc::channel();
        let spawned = thread::Builder::new()
            .name("inroads-render".into())
            .spawn(move || {
                let result = tick_loop(tracker, surface, &sink, interval, &stop_signal);
                sink.set_live(false);
                if let Err(e) = &result {
                    warn!("render loop stopped on I/O error: {e}");
                }
                result
            });
        match spawned {
            Ok(thread) => {
                debug!("render loop started, repainting every {interval:?}");
                *phase = Phase::Running { stop, thread };
                Ok(())
            }
            Err(e) => {
                self.sink.set_live(false);
                Err(e.into())
            }
        }
    }

    /// Stops the paint thread, painting one final snapshot first.
    ///
    /// In-flight tracker mutations are unaffected; anything applied before
    /// this call is included in the final paint. Stopping a renderer that
    /// is not running is a no-op.
    pub fn stop(&self) -> Result<(), RenderError> {
        let mut phase = self.phase();
        match std::mem::replace(&mut *phase, Phase::Stopped) {
            Phase::Running { stop, thread } => {
                // New log lines go straight to stderr from here on; the
                // final tick drains what is already queued.
                self.sink.set_live(false);
                let _ = stop.send(());
                let result = match thread.join() {
                    Ok(result) => result.map_err(RenderError::from),
                    Err(_) => Err(RenderError::TickPanicked),
                };
                // Anything queued after the final drain still gets written.
                for line in self.sink.drain() {
                    self.sink.write_direct(&line);
                }
                debug!("render loop stopped");
                result
            }
            Phase::Idle => {
                *phase = Phase::Idle;
                Ok(())
            }
            Phase::Stopped => Ok(()),
        }
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

fn tick_loop(
    tracker: Tracker,
    mut surface: Box<dyn Surface>,
    sink: &SinkShared,
    interval: std::time::Duration,
    stop: &Receiver<()>,
) -> io::Result<()> {
    let mut counter_rows: HashMap<CounterId, RowId> = HashMap::new();
    let mut task_rows: HashMap<TaskId, RowId> = HashMap::new();
    let mut stopping = false;
    loop {
        paint(
            &tracker,
            surface.as_mut(),
            sink,
            &mut counter_rows,
            &mut task_rows,
        )?;
        if stopping {
            return Ok(());
        }
        match stop.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {}
            // Either an explicit stop or the renderer was dropped; one
            // final paint, then exit.
            Ok(()) | Err(RecvTimeoutError::Disconnected) => stopping = true,
        }
    }
}

fn paint(
    tracker: &Tracker,
    surface: &mut dyn Surface,
    sink: &SinkShared,
    counter_rows: &mut HashMap<CounterId, RowId>,
    task_rows: &mut HashMap<TaskId, RowId>,
) -> io::Result<()> {
    let snap = tracker.snapshot();

    for line in sink.drain() {
        surface.println(&line)?;
    }

    for gone in &snap.departures {
        // A task that came and went entirely between two ticks never got a
        // row; nothing to retire then.
        if let Some(row) = task_rows.remove(&gone.id) {
            surface.remove_row(row, gone.outcome);
        }
    }
    for counter in &snap.counters {
        let row = *counter_rows.entry(counter.id).or_insert_with(|| {
            surface.create_row(counter.unit, &counter.name, Some(counter.total))
        });
        surface.update_row(
            row,
            &counter.name,
            counter.current,
            Some(counter.total),
            counter.elapsed,
        );
    }
    for task in &snap.tasks {
        let row = *task_rows
            .entry(task.id)
            .or_insert_with(|| surface.create_row(task.unit, &task.label, task.total));
        surface.update_row(row, &task.label, task.current, task.total, task.elapsed);
    }
    surface.redraw()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::snapshot::{TaskOutcome, Unit};

    use super::*;

    #[derive(Clone, PartialEq, Debug)]
    enum Event {
        Created(RowId, String, Option<u64>),
        Updated(RowId, u64, Option<u64>),
        Removed(RowId, TaskOutcome),
        Line(String),
    }

    #[derive(Clone, Default)]
    struct Recording(Arc<Mutex<Vec<Event>>>);

    impl Recording {
        fn events(&self) -> Vec<Event> {
            self.0.lock().unwrap().clone()
        }
    }

    struct RecordingSurface {
        events: Recording,
        next_row: u64,
    }

    impl RecordingSurface {
        fn new(events: Recording) -> Self {
            RecordingSurface { events, next_row: 0 }
        }
    }

    impl Surface for RecordingSurface {
        fn create_row(&mut self, _unit: Unit, label: &str, total: Option<u64>) -> RowId {
            self.next_row += 1;
            let id = RowId(self.next_row);
            self.events
                .0
                .lock()
                .unwrap()
                .push(Event::Created(id, label.to_owned(), total));
            id
        }

        fn update_row(
            &mut self,
            row: RowId,
            _label: &str,
            current: u64,
            total: Option<u64>,
            _elapsed: Duration,
        ) {
            self.events
                .0
                .lock()
                .unwrap()
                .push(Event::Updated(row, current, total));
        }

        fn remove_row(&mut self, row: RowId, outcome: TaskOutcome) {
            self.events.0.lock().unwrap().push(Event::Removed(row, outcome));
        }

        fn redraw(&mut self) -> io::Result<()> {
            Ok(())
        }

        fn println(&mut self, line: &str) -> io::Result<()> {
            self.events.0.lock().unwrap().push(Event::Line(line.to_owned()));
            Ok(())
        }
    }

    fn renderer(tracker: &Tracker) -> (Renderer, Recording) {
        let events = Recording::default();
        let renderer = Renderer::new(
            tracker.clone(),
            RecordingSurface::new(events.clone()),
            RenderOptions {
                interval: Duration::from_millis(10),
            },
        );
        (renderer, events)
    }

    #[test]
    fn starting_twice_fails_fast() {
        let tracker = Tracker::new();
        let (renderer, _) = renderer(&tracker);
        renderer.start().unwrap();
        assert!(matches!(renderer.start(), Err(RenderError::AlreadyStarted)));
        renderer.stop().unwrap();
        // No restart after a stop either.
        assert!(matches!(renderer.start(), Err(RenderError::AlreadyStarted)));
    }

    #[test]
    fn stopping_is_idempotent() {
        let tracker = Tracker::new();
        let (renderer, _) = renderer(&tracker);
        renderer.stop().unwrap();
        renderer.start().unwrap();
        renderer.stop().unwrap();
        renderer.stop().unwrap();
    }

    #[test]
    fn rows_follow_task_lifecycle() {
        let tracker = Tracker::new();
        let (renderer, events) = renderer(&tracker);
        let files = tracker.counter("files", 2);
        let task = tracker.task("download", Some(10));

        renderer.start().unwrap();
        // Let at least one tick observe the live task before it departs.
        thread::sleep(Duration::from_millis(30));
        tracker.advance(task, 10).unwrap();
        tracker.complete(task).unwrap();
        tracker.add(files, 1).unwrap();
        // The final paint on stop sees every mutation applied above.
        renderer.stop().unwrap();

        let events = events.events();
        let counter_row = events
            .iter()
            .find_map(|e| match e {
                Event::Created(id, label, _) if label == "files" => Some(*id),
                _ => None,
            })
            .expect("counter row created");
        let task_row = events
            .iter()
            .find_map(|e| match e {
                Event::Created(id, label, _) if label == "download" => Some(*id),
                _ => None,
            })
            .expect("task row created");

        assert!(events.contains(&Event::Removed(task_row, TaskOutcome::Completed)));
        let last_counter_update = events
            .iter()
            .rev()
            .find_map(|e| match e {
                Event::Updated(id, current, _) if *id == counter_row => Some(*current),
                _ => None,
            })
            .expect("counter updated");
        assert_eq!(last_counter_update, 1);
    }

    #[test]
    fn abandoned_tasks_retire_their_row_as_abandoned() {
        let tracker = Tracker::new();
        let (renderer, events) = renderer(&tracker);
        let task = tracker.task("doomed", Some(10));

        renderer.start().unwrap();
        // Let at least one tick observe the live task.
        thread::sleep(Duration::from_millis(30));
        tracker.advance(task, 3).unwrap();
        tracker.abandon(task).unwrap();
        renderer.stop().unwrap();

        let events = events.events();
        assert!(events
            .iter()
            .any(|e| matches!(e, Event::Removed(_, TaskOutcome::Abandoned))));
    }

    #[test]
    fn queued_log_lines_are_painted_between_rows() {
        let tracker = Tracker::new();
        let (renderer, events) = renderer(&tracker);
        let sink = renderer.sink();

        renderer.start().unwrap();
        sink.line("worker checking in");
        renderer.stop().unwrap();

        assert!(events
            .events()
            .contains(&Event::Line("worker checking in".to_owned())));
    }

    #[test]
    fn dropping_a_running_renderer_stops_it() {
        let tracker = Tracker::new();
        let (renderer, events) = renderer(&tracker);
        let task = tracker.task("flushed", Some(5));
        renderer.start().unwrap();
        tracker.advance(task, 5).unwrap();
        drop(renderer);

        // The drop joined the paint thread after a final paint.
        let events = events.events();
        assert!(events
            .iter()
            .any(|e| matches!(e, Event::Updated(_, 5, Some(5)))));
    }

    #[test]
    fn totals_raised_mid_flight_reach_the_surface() {
        let tracker = Tracker::new();
        let (renderer, events) = renderer(&tracker);
        let task = tracker.task("growing", Some(10));

        renderer.start().unwrap();
        tracker.advance(task, 10).unwrap();
        tracker.set_total(task, Some(25)).unwrap();
        renderer.stop().unwrap();

        assert!(events
            .events()
            .iter()
            .any(|e| matches!(e, Event::Updated(_, 10, Some(25)))));
    }
}
