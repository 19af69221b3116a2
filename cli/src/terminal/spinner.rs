use std::io::Write;
use std::sync::OnceLock;
use std::time::Duration;

use colored::*;
use indicatif::{ProgressBar, ProgressStyle};

use crate::terminal::colors;

static SPINNER: OnceLock<ProgressBar> = OnceLock::new();

/// Shows the spinner on stderr. Without this call every spinner operation is
/// a no-op and log lines go straight to stderr.
pub fn start() {
    SPINNER.get_or_init(init_spinner);
}

fn init_spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.blue} {msg}") {
        pb.set_style(style.tick_strings(&[
            "▁▁▁▁▁",
            "▁▂▂▂▁",
            "▁▄▂▄▁",
            "▂▄▆▄▂",
            "▄▆█▆▄",
            "▂▄▆▄▂",
            "▁▄▂▄▁",
            "▁▂▂▂▁",
        ]));
    }
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

pub fn report_progress(checked: usize, exposed: usize) {
    if let Some(pb) = SPINNER.get() {
        pb.set_message(
            format!(
                "Checked {} so far, {} exposed...",
                format!("{checked} hosts").green().bold(),
                exposed.to_string().red().bold()
            )
            .color(colors::TEXT_DEFAULT)
            .to_string(),
        );
    }
}

pub fn finish() {
    if let Some(pb) = SPINNER.get() {
        pb.finish_and_clear();
    }
}

/// Writes log lines above the spinner instead of through it.
pub struct SpinnerWriter;

impl Write for SpinnerWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match SPINNER.get() {
            Some(pb) => pb.suspend(|| std::io::stderr().write_all(buf))?,
            None => std::io::stderr().write_all(buf)?,
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        std::io::stderr().flush()
    }
}
