use std::collections::VecDeque;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use log::{LevelFilter, Metadata, Record, SetLoggerError};

pub(crate) struct SinkShared {
    /// True while a renderer is draining the queue.
    live: AtomicBool,
    queue: Mutex<VecDeque<String>>,
    out: Mutex<Box<dyn Write + Send>>,
}

impl SinkShared {
    pub(crate) fn stderr() -> Arc<Self> {
        Self::to_writer(Box::new(io::stderr()))
    }

    pub(crate) fn to_writer(out: Box<dyn Write + Send>) -> Arc<Self> {
        Arc::new(SinkShared {
            live: AtomicBool::new(false),
            queue: Mutex::new(VecDeque::new()),
            out: Mutex::new(out),
        })
    }

    pub(crate) fn set_live(&self, live: bool) {
        self.live.store(live, Ordering::Release);
    }

    pub(crate) fn push(&self, line: String) {
        if self.live.load(Ordering::Acquire) {
            self.queue
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push_back(line);
        } else {
            self.write_direct(&line);
        }
    }

    /// Takes the lines queued since the last drain, oldest first.
    pub(crate) fn drain(&self) -> Vec<String> {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect()
    }

    pub(crate) fn write_direct(&self, line: &str) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        // The whole line goes out under one lock, so concurrent writers
        // never interleave mid-line. Write errors are dropped; there is
        // nowhere left to report them.
        let _ = writeln!(out, "{line}");
        let _ = out.flush();
    }
}

/// A serialized sink for log lines from any thread.
///
/// While a [`Renderer`](crate::Renderer) is running, lines are queued and
/// painted above the live rows on the next tick; otherwise they go straight
/// to the sink's writer (stderr by default). Either way a line is written
/// whole, never interleaved with another writer's.
///
/// The sink also implements [`log::Log`], so it can serve as the logger for
/// the `log` macros; see [`LogSink::install`].
#[derive(Clone)]
pub struct LogSink {
    shared: Arc<SinkShared>,
    level: LevelFilter,
}

impl LogSink {
    /// A standalone sink writing to stderr.
    pub fn stderr() -> Self {
        Self::from_shared(SinkShared::stderr())
    }

    /// A standalone sink writing to the given writer.
    pub fn to_writer(out: Box<dyn Write + Send>) -> Self {
        Self::from_shared(SinkShared::to_writer(out))
    }

    pub(crate) fn from_shared(shared: Arc<SinkShared>) -> Self {
        LogSink {
            shared,
            level: LevelFilter::Info,
        }
    }

    /// Sets the maximum level forwarded by the [`log::Log`] implementation.
    /// Lines submitted through [`LogSink::line`] are never filtered.
    pub fn with_level(mut self, level: LevelFilter) -> Self {
        self.level = level;
        self
    }

    /// Submits one line.
    pub fn line(&self, line: impl Into<String>) {
        self.shared.push(line.into());
    }

    /// Installs this sink as the global logger for the `log` macros.
    pub fn install(self) -> Result<(), SetLoggerError> {
        log::set_max_level(self.level);
        log::set_boxed_logger(Box::new(self))
    }
}

impl log::Log for LogSink {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record<'_>) {
        if self.enabled(record.metadata()) {
            self.line(format!("[{}] {}", record.level(), record.args()));
        }
    }

    fn flush(&self) {}
}
