use std::collections::HashMap;
use std::io::{self, Write};
use std::time::Duration;

use indicatif::{BinaryBytes, DecimalBytes, FormattedDuration, MultiProgress, ProgressBar, ProgressStyle};

use crate::snapshot::{TaskOutcome, Unit};
use crate::style::RowStyle;

const BAR_FILLED: char = '█';
const BAR_EMPTY: char = '░';
const SPINNER_FRAMES: [char; 4] = ['|', '/', '-', '\\'];

/// Identifier for a display row, minted by the [`Surface`] that owns it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct RowId(pub u64);

/// A terminal display that knows how to paint progress rows.
///
/// The [`Renderer`](crate::Renderer) is the only caller: it translates each
/// snapshot into row lifecycle calls and a final [`Surface::redraw`]. All
/// methods are invoked from the renderer's tick thread.
pub trait Surface: Send {
    /// Creates a display row. `total` of `None` means indeterminate.
    fn create_row(&mut self, unit: Unit, label: &str, total: Option<u64>) -> RowId;

    /// Updates a row with the latest observed state.
    fn update_row(
        &mut self,
        row: RowId,
        label: &str,
        current: u64,
        total: Option<u64>,
        elapsed: Duration,
    );

    /// Retires a row. Unknown ids are ignored; removal may race with a
    /// renderer that never saw the row alive.
    fn remove_row(&mut self, row: RowId, outcome: TaskOutcome);

    /// Repaints everything that changed since the last call.
    fn redraw(&mut self) -> io::Result<()>;

    /// Writes a log line above the live rows without scrambling them.
    fn println(&mut self, line: &str) -> io::Result<()>;
}

fn template(style: &RowStyle, has_total: bool) -> String {
    let mut parts: Vec<String> = Vec::new();
    if style.spinner {
        parts.push("{spinner}".into());
    }
    parts.push("{msg}".into());
    if has_total {
        parts.push(format!("{{bar:{}}}", style.bar_width));
    }
    if style.bytes {
        if has_total {
            parts.push(if style.binary_units {
                "{binary_bytes}/{binary_total_bytes}".into()
            } else {
                "{bytes}/{total_bytes}".into()
            });
        } else if style.binary_units {
            parts.push("{binary_bytes}".into());
        } else {
            parts.push("{bytes}".into());
        }
    } else if style.counts {
        if has_total {
            parts.push("{pos}/{len}".into());
        } else {
            parts.push("{pos}".into());
        }
    }
    if style.elapsed {
        parts.push("{elapsed_precise}".into());
    }
    if style.rate {
        parts.push(if style.binary_units {
            "{binary_bytes_per_sec}".into()
        } else {
            "{bytes_per_sec}".into()
        });
    }
    parts.join(" ")
}

struct IndicatifRow {
    bar: ProgressBar,
    style: RowStyle,
    has_total: bool,
}

/// A [`Surface`] backed by [`indicatif`]'s `MultiProgress`.
///
/// This is the default collaborator: row layout, redraw throttling and
/// terminal handling are all delegated to indicatif. Elapsed time is
/// tracked by indicatif itself, so the renderer-supplied value is unused
/// here.
pub struct IndicatifSurface {
    multi: MultiProgress,
    items_style: RowStyle,
    bytes_style: RowStyle,
    rows: HashMap<RowId, IndicatifRow>,
    next_row: u64,
}

impl Default for IndicatifSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl IndicatifSurface {
    pub fn new() -> Self {
        IndicatifSurface {
            multi: MultiProgress::new(),
            items_style: RowStyle::counts(),
            bytes_style: RowStyle::transfer(),
            rows: HashMap::new(),
            next_row: 0,
        }
    }

    pub fn with_items_style(mut self, style: RowStyle) -> Self {
        self.items_style = style;
        self
    }

    pub fn with_bytes_style(mut self, style: RowStyle) -> Self {
        self.bytes_style = style;
        self
    }

    fn style_for(&self, unit: Unit) -> RowStyle {
        match unit {
            Unit::Items => self.items_style,
            Unit::Bytes => self.bytes_style,
        }
    }

    fn apply_style(row: &IndicatifRow) {
        let template = template(&row.style, row.has_total);
        row.bar.set_style(
            ProgressStyle::with_template(&template)
                .expect("row template is valid")
                .progress_chars("█░"),
        );
    }
}

impl Surface for IndicatifSurface {
    fn create_row(&mut self, unit: Unit, label: &str, total: Option<u64>) -> RowId {
        self.next_row += 1;
        let id = RowId(self.next_row);

        let bar = match total {
            Some(total) => ProgressBar::new(total),
            None => ProgressBar::new_spinner(),
        };
        let bar = self.multi.add(bar);
        bar.set_message(label.to_owned());
        let row = IndicatifRow {
            bar,
            style: self.style_for(unit),
            has_total: total.is_some(),
        };
        Self::apply_style(&row);
        self.rows.insert(id, row);
        id
    }

    fn update_row(
        &mut self,
        row: RowId,
        label: &str,
        current: u64,
        total: Option<u64>,
        _elapsed: Duration,
    ) {
        let Some(row) = self.rows.get_mut(&row) else {
            return;
        };
        if row.has_total != total.is_some() {
            // A total appeared or went away; switch between bar and spinner.
            row.has_total = total.is_some();
            Self::apply_style(row);
        }
        match total {
            Some(total) => {
                if row.bar.length() != Some(total) {
                    row.bar.set_length(total);
                }
            }
            None => {
                if row.bar.length().is_some() {
                    row.bar.unset_length();
                }
            }
        }
        row.bar.set_message(label.to_owned());
        row.bar.set_position(current);
        row.bar.tick();
    }

    fn remove_row(&mut self, row: RowId, outcome: TaskOutcome) {
        let Some(row) = self.rows.remove(&row) else {
            return;
        };
        match outcome {
            TaskOutcome::Completed => {
                row.bar.finish_and_clear();
                self.multi.remove(&row.bar);
            }
            // Leave the bar on screen, frozen where it stopped.
            TaskOutcome::Abandoned => row.bar.abandon(),
        }
    }

    fn redraw(&mut self) -> io::Result<()> {
        // indicatif repaints as bars change; nothing to do per tick.
        Ok(())
    }

    fn println(&mut self, line: &str) -> io::Result<()> {
        self.multi.println(line)
    }
}

struct AnsiRow {
    id: RowId,
    style: RowStyle,
    label: String,
    current: u64,
    total: Option<u64>,
    elapsed: Duration,
}

/// A minimal [`Surface`] that paints rows itself with ANSI escape codes.
///
/// One line per row, repainted in place by moving the cursor back to the
/// start of the block and clearing to the end of the screen. On a
/// non-interactive stream only retired rows are printed, one final line
/// each, so logs stay readable.
pub struct AnsiSurface {
    out: Box<dyn Write + Send>,
    interactive: bool,
    items_style: RowStyle,
    bytes_style: RowStyle,
    rows: Vec<AnsiRow>,
    retired: Vec<AnsiRow>,
    frame: usize,
    next_row: u64,
}

impl AnsiSurface {
    pub fn stdout() -> Self {
        Self::with_output(Box::new(io::stdout()), atty::is(atty::Stream::Stdout))
    }

    /// Paints to an arbitrary writer, treating it as interactive.
    pub fn to_writer(out: Box<dyn Write + Send>) -> Self {
        Self::with_output(out, true)
    }

    fn with_output(out: Box<dyn Write + Send>, interactive: bool) -> Self {
        AnsiSurface {
            out,
            interactive,
            items_style: RowStyle::counts(),
            bytes_style: RowStyle::transfer(),
            rows: Vec::new(),
            retired: Vec::new(),
            frame: 0,
            next_row: 0,
        }
    }

    pub fn with_items_style(mut self, style: RowStyle) -> Self {
        self.items_style = style;
        self
    }

    pub fn with_bytes_style(mut self, style: RowStyle) -> Self {
        self.bytes_style = style;
        self
    }

    fn render_row(buf: &mut Vec<u8>, row: &AnsiRow, frame: usize) -> io::Result<()> {
        let style = &row.style;
        if style.spinner {
            write!(buf, "{} ", SPINNER_FRAMES[frame % SPINNER_FRAMES.len()])?;
        }
        match row.total {
            Some(total) => {
                let fraction = if total > 0 {
                    (row.current as f64 / total as f64).clamp(0.0, 1.0)
                } else {
                    1.0
                };
                let filled = (fraction * style.bar_width as f64).floor() as usize;
                for i in 0..style.bar_width {
                    let c = if i < filled { BAR_FILLED } else { BAR_EMPTY };
                    write!(buf, "{c}")?;
                }
                write!(
                    buf,
                    " {}/{}",
                    Amount(row.current, style),
                    Amount(total, style)
                )?;
            }
            None => write!(buf, "{}", Amount(row.current, style))?,
        }
        if style.elapsed {
            write!(buf, " {}", FormattedDuration(row.elapsed))?;
        }
        if style.rate {
            let secs = row.elapsed.as_secs_f64();
            let per_sec = if secs > 0.0 {
                (row.current as f64 / secs) as u64
            } else {
                0
            };
            if style.binary_units {
                write!(buf, " {}/s", BinaryBytes(per_sec))?;
            } else {
                write!(buf, " {}/s", DecimalBytes(per_sec))?;
            }
        }
        write!(buf, " {}", row.label)?;
        Ok(())
    }
}

/// Renders a value as a plain count or a byte size, per the row's style.
struct Amount<'a>(u64, &'a RowStyle);

impl std::fmt::Display for Amount<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Amount(value, style) = self;
        if style.bytes {
            if style.binary_units {
                write!(f, "{}", BinaryBytes(*value))
            } else {
                write!(f, "{}", DecimalBytes(*value))
            }
        } else {
            write!(f, "{value}")
        }
    }
}

impl Surface for AnsiSurface {
    fn create_row(&mut self, unit: Unit, label: &str, total: Option<u64>) -> RowId {
        self.next_row += 1;
        let id = RowId(self.next_row);
        let style = match unit {
            Unit::Items => self.items_style,
            Unit::Bytes => self.bytes_style,
        };
        self.rows.push(AnsiRow {
            id,
            style,
            label: label.to_owned(),
            current: 0,
            total,
            elapsed: Duration::ZERO,
        });
        id
    }

    fn update_row(
        &mut self,
        row: RowId,
        label: &str,
        current: u64,
        total: Option<u64>,
        elapsed: Duration,
    ) {
        if let Some(row) = self.rows.iter_mut().find(|r| r.id == row) {
            label.clone_into(&mut row.label);
            row.current = current;
            row.total = total;
            row.elapsed = elapsed;
        }
    }

    fn remove_row(&mut self, row: RowId, outcome: TaskOutcome) {
        let Some(index) = self.rows.iter().position(|r| r.id == row) else {
            return;
        };
        let mut row = self.rows.remove(index);
        // A completed row gets painted full one last time.
        if outcome == TaskOutcome::Completed {
            if let Some(total) = row.total {
                row.current = row.current.max(total);
            }
        }
        self.retired.push(row);
    }

    fn redraw(&mut self) -> io::Result<()> {
        if !self.interactive {
            // No live repaint on a plain stream; retired rows still get one
            // final line each.
            for row in self.retired.drain(..) {
                let mut buf = Vec::new();
                Self::render_row(&mut buf, &row, 0)?;
                buf.push(b'\n');
                self.out.write_all(&buf)?;
            }
            return self.out.flush();
        }

        self.frame += 1;
        let mut buf = Vec::new();
        for row in self.retired.drain(..) {
            Self::render_row(&mut buf, &row, self.frame)?;
            buf.push(b'\n');
        }
        for row in &self.rows {
            Self::render_row(&mut buf, row, self.frame)?;
            buf.push(b'\n');
        }
        self.out.write_all(&buf)?;
        self.out.flush()?;

        if !self.rows.is_empty() {
            // Move to the start of the block and clear to end of screen.
            // Left unflushed so the next write repaints in place.
            write!(self.out, "\u{001b}[{}F\u{001b}[0J", self.rows.len())?;
        }
        Ok(())
    }

    fn println(&mut self, line: &str) -> io::Result<()> {
        // Flushing applies the pending cursor-up escape first, so the line
        // lands where the row block was; the next tick repaints below it.
        writeln!(self.out, "{line}")?;
        self.out.flush()
    }
}
