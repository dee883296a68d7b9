use std::time::Duration;

/// Which columns a surface should draw for a row.
///
/// This enumerates the display options actually supported, instead of
/// forwarding arbitrary options to the rendering backend.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct RowStyle {
    /// Animated spinner in front of the row.
    pub spinner: bool,
    /// Elapsed time since the row was created.
    pub elapsed: bool,
    /// Plain `current/total` count.
    pub counts: bool,
    /// Show current/total as byte sizes instead of plain counts.
    pub bytes: bool,
    /// Transfer speed, derived from progress over elapsed time.
    pub rate: bool,
    /// Use binary (KiB/MiB) units for byte sizes and rates.
    pub binary_units: bool,
    /// Width of the bar itself, in characters.
    pub bar_width: usize,
}

impl Default for RowStyle {
    fn default() -> Self {
        Self::counts()
    }
}

impl RowStyle {
    /// Spinner, bar, `current/total` and elapsed time. Suits item counts
    /// such as files processed.
    pub fn counts() -> Self {
        RowStyle {
            spinner: true,
            elapsed: true,
            counts: true,
            bytes: false,
            rate: false,
            binary_units: false,
            bar_width: 20,
        }
    }

    /// Spinner, bar, binary byte sizes and transfer speed. Suits transfer
    /// rows such as bytes downloaded.
    pub fn transfer() -> Self {
        RowStyle {
            spinner: true,
            elapsed: false,
            counts: false,
            bytes: true,
            rate: true,
            binary_units: true,
            bar_width: 20,
        }
    }
}

/// Cadence settings for a [`Renderer`](crate::Renderer).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct RenderOptions {
    /// Time between repaints. Updates landing between two ticks are
    /// coalesced; this is a sampling loop, not an event log.
    pub interval: Duration,
}

impl Default for RenderOptions {
    fn default() -> Self {
        RenderOptions {
            interval: Duration::from_millis(100),
        }
    }
}

