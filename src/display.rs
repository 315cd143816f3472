//! Slider status display
//!
//! The loop hands every tick's snapshots to a [`DisplaySink`]; sinks only
//! render when something visible changed.

use std::io::Write;
use tracing::{info, warn};

use crate::event::CC_ON;
use crate::slider::{SliderSnapshot, SliderStatus};

pub trait DisplaySink {
    fn render(&mut self, snapshots: &[SliderSnapshot]);
}

/// Short label for one slider: `index|cc|value|status`.
///
/// While both-pressed the button CC and 127 are shown instead of the
/// slider's own CC and value.
pub fn slider_label(snapshot: &SliderSnapshot) -> String {
    if !snapshot.connected {
        return format!("{}|--|---|", snapshot.slider_index);
    }

    let (cc, value) = match (snapshot.status, snapshot.button_cc) {
        (SliderStatus::Both, Some(button_cc)) => (button_cc, CC_ON),
        _ => (snapshot.cc_number, snapshot.value),
    };

    format!(
        "{}|{:02}|{:03}|{}",
        snapshot.slider_index,
        cc,
        value,
        snapshot.status.code()
    )
}

/// Writes one log line per change
#[derive(Debug, Default)]
pub struct LogDisplay {
    labels: Vec<String>,
}

impl LogDisplay {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DisplaySink for LogDisplay {
    fn render(&mut self, snapshots: &[SliderSnapshot]) {
        let labels: Vec<String> = snapshots.iter().map(slider_label).collect();
        if labels == self.labels {
            return;
        }

        info!("{}", labels.join("  "));
        self.labels = labels;
    }
}

/// Writes each changed snapshot as a JSON line
pub struct JsonDisplay<W: Write> {
    out: W,
    last: Vec<SliderSnapshot>,
}

impl JsonDisplay<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> JsonDisplay<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            last: Vec::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_line(&mut self, snapshot: &SliderSnapshot) -> std::io::Result<()> {
        let line = serde_json::to_string(snapshot)?;
        writeln!(self.out, "{}", line)
    }
}

impl<W: Write> DisplaySink for JsonDisplay<W> {
    fn render(&mut self, snapshots: &[SliderSnapshot]) {
        for (idx, snapshot) in snapshots.iter().enumerate() {
            if self.last.get(idx) == Some(snapshot) {
                continue;
            }
            if let Err(e) = self.write_line(snapshot) {
                warn!("Failed to write display output: {}", e);
            }
        }
        self.last = snapshots.to_vec();
    }
}
