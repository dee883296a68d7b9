//! Live multi-row progress tracking for concurrent workloads.
//!
//! Worker threads report progress through a shared [`Tracker`]; a
//! [`Renderer`] samples it on a fixed cadence and paints every live row
//! through a pluggable [`Surface`]. Workers never wait on the display and
//! the display never blocks workers beyond the brief lock needed to copy a
//! [`Snapshot`].
//!
//! ```
//! use inroads::{AnsiSurface, RenderOptions, Renderer, Tracker};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let tracker = Tracker::new();
//! let renderer = Renderer::new(
//!     tracker.clone(),
//!     AnsiSurface::stdout(),
//!     RenderOptions::default(),
//! );
//! renderer.start()?;
//!
//! let files = tracker.counter("files", 3);
//! for name in ["a.bin", "b.bin", "c.bin"] {
//!     let task = tracker.task(name, Some(100));
//!     for _ in 0..100 {
//!         tracker.inc(task)?;
//!     }
//!     tracker.complete(task)?;
//!     tracker.add(files, 1)?;
//! }
//!
//! renderer.stop()?;
//! # Ok(())
//! # }
//! ```
//!
//! Several workers can drive the same tracker; see the `inroads` binary
//! for a thread-pool example with per-download rows, aggregate file and
//! byte counters, and log lines painted above the bars.
//!
//! By default rows are painted by [`indicatif`] through
//! [`IndicatifSurface`]; [`AnsiSurface`] is a minimal fallback for plain
//! streams, and any [`Surface`] implementation can stand in for either.

mod cancel;
mod logsink;
mod render;
mod snapshot;
mod style;
mod surface;
mod tracker;

pub use cancel::CancelToken;
pub use logsink::LogSink;
pub use render::{RenderError, Renderer};
pub use snapshot::{CounterSnapshot, Departure, Snapshot, TaskOutcome, TaskSnapshot, Unit};
pub use style::{RenderOptions, RowStyle};
pub use surface::{AnsiSurface, IndicatifSurface, RowId, Surface};
pub use tracker::{CounterId, TaskId, TrackError, Tracker};
