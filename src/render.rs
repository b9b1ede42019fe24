//! Display of passing spots.
//!
//! The renderer owns the only cross-spot state in the pipeline: the
//! (DX call, timestamp) pair of the last full line it printed. A passing
//! spot with the same pair prints a `*` repeat marker instead. Rejected
//! spots print `.` progress markers that wrap at the terminal width and are
//! erased before the next full line.

use std::io::{self, Write};

use crossterm::{
    queue,
    style::{Color, Print, ResetColor, SetBackgroundColor, SetForegroundColor},
    terminal::{self, Clear, ClearType},
};

use crate::geo::distance_miles;
use crate::spot::Spot;
use crate::station::StationRecord;

/// Placeholder printed for a spot the filter chain rejected.
pub const REJECT_MARKER: char = '.';

/// Marker printed instead of a repeated line.
pub const REPEAT_MARKER: char = '*';

/// Columns kept free at the right edge of the progress line.
const PROGRESS_MARGIN: usize = 10;

/// Highlight category of a displayed line, highest priority first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Highlight {
    /// The operator's own call sign was heard.
    Me,
    /// A friend or club member was heard.
    Friend,
    None,
}

impl Highlight {
    pub fn classify(dx_call: &str, my_call: &str, is_friend: bool) -> Self {
        if dx_call == my_call {
            Highlight::Me
        } else if is_friend {
            Highlight::Friend
        } else {
            Highlight::None
        }
    }

    fn background(self) -> Option<Color> {
        match self {
            Highlight::Me => Some(Color::Yellow),
            Highlight::Friend => Some(Color::Green),
            Highlight::None => None,
        }
    }
}

/// Identity of the last full line printed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderState {
    pub last_call: Option<String>,
    pub last_timestamp: Option<String>,
}

impl RenderState {
    fn is_repeat(&self, spot: &Spot) -> bool {
        self.last_call.as_deref() == Some(spot.dx_call.as_str())
            && self.last_timestamp.as_deref() == Some(spot.timestamp.as_str())
    }

    fn remember(&mut self, spot: &Spot) {
        self.last_call = Some(spot.dx_call.clone());
        self.last_timestamp = Some(spot.timestamp.clone());
    }
}

/// What the renderer did with a passing spot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Emitted {
    Line(String),
    Repeat,
}

pub struct Renderer<W: Write> {
    out: W,
    home: Option<(f64, f64)>,
    state: RenderState,
    dots: usize,
    width: usize,
}

impl<W: Write> Renderer<W> {
    /// Create a renderer sized to the current terminal.
    pub fn new(out: W, home: Option<(f64, f64)>) -> Self {
        let columns = terminal::size().map(|(c, _)| c as usize).unwrap_or(80);
        Self {
            out,
            home,
            state: RenderState::default(),
            dots: 0,
            width: columns.saturating_sub(PROGRESS_MARGIN).max(1),
        }
    }

    /// Override the progress line width.
    pub fn with_width(mut self, width: usize) -> Self {
        self.width = width.max(1);
        self
    }

    pub fn state(&self) -> &RenderState {
        &self.state
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    /// Format a spot as a fixed-width display line.
    ///
    /// `station` supplies the optional distance and location suffix.
    pub fn format_line(&self, spot: &Spot, station: Option<&StationRecord>) -> String {
        let mut line = format!(
            "{:8} de {:6}  {:7.1} kHz  {}  {:>2} dB  {:>2} WPM  {}",
            spot.dx_call,
            spot.de_call,
            spot.frequency_khz,
            spot.mode,
            spot.snr_db,
            spot.wpm,
            spot.timestamp
        );

        if let Some(station) = station {
            if let (Some(home), Some(there)) = (self.home, station.position()) {
                let miles = distance_miles(home, there).round() as i64;
                line.push_str(&format!("  dist {:5} mi", miles));
            }
            if let Some(state) = &station.state {
                line.push_str(&format!("  {}", state));
            } else if let Some(country) = &station.country {
                line.push_str(&format!("  {}", country));
            }
        }

        line
    }

    /// Emit a spot that passed the filter chain.
    pub fn emit(
        &mut self,
        spot: &Spot,
        station: Option<&StationRecord>,
        highlight: Highlight,
    ) -> io::Result<Emitted> {
        if self.state.is_repeat(spot) {
            self.progress(REPEAT_MARKER)?;
            return Ok(Emitted::Repeat);
        }

        let line = self.format_line(spot, station);
        self.clear_progress()?;
        match highlight.background() {
            Some(color) => queue!(
                self.out,
                SetBackgroundColor(color),
                Print(&line),
                ResetColor,
                Print("\n")
            )?,
            None => queue!(self.out, Print(&line), Print("\n"))?,
        }
        self.out.flush()?;

        self.state.remember(spot);
        Ok(Emitted::Line(line))
    }

    /// Advance the progress indicator for a rejected spot.
    pub fn rejected(&mut self) -> io::Result<()> {
        self.progress(REJECT_MARKER)
    }

    /// Print an operator notice on its own line, optionally in color.
    pub fn notice(&mut self, text: &str, color: Option<Color>) -> io::Result<()> {
        self.clear_progress()?;
        match color {
            Some(color) => queue!(
                self.out,
                SetForegroundColor(color),
                Print(text),
                ResetColor,
                Print("\n")
            )?,
            None => queue!(self.out, Print(text), Print("\n"))?,
        }
        self.out.flush()
    }

    fn progress(&mut self, marker: char) -> io::Result<()> {
        if self.dots >= self.width {
            self.clear_progress()?;
        } else {
            queue!(self.out, Print(marker))?;
            self.dots += 1;
        }
        self.out.flush()
    }

    fn clear_progress(&mut self) -> io::Result<()> {
        if self.dots > 0 {
            queue!(self.out, Print("\r"), Clear(ClearType::CurrentLine))?;
            self.dots = 0;
        }
        Ok(())
    }
}
