use std::io::Write;
use std::time::Duration;

use colored::*;
use exposr_common::scan::{Origin, VerdictEvent};
use exposr_core::orchestrator::{ScanSummary, VerdictSink};
use tracing::{debug, error};

use crate::mprint;
use crate::terminal::{colors, print, spinner};

/// Prints a red line per exposed host. Closed hosts only show up in debug
/// logs.
#[derive(Default)]
pub struct TerminalSink {
    checked: usize,
    exposed: usize,
}

impl VerdictSink for TerminalSink {
    fn report(&mut self, event: &VerdictEvent) {
        self.checked += 1;
        let verdict = &event.verdict;

        if verdict.is_exposed {
            self.exposed += 1;
            print::print(&finding_line(event));
        } else {
            debug!(address = %verdict.address, kind = %verdict.kind, origin = ?event.origin, "not exposed");
        }

        spinner::report_progress(self.checked, self.exposed);
    }
}

fn finding_line(event: &VerdictEvent) -> String {
    let verdict = &event.verdict;
    let cached: &str = match event.origin {
        Origin::Cached => " (cached)",
        Origin::Probed => "",
    };
    let mut line: String = format!(
        "🔥 IP: {} is an {}{}.",
        verdict.address,
        verdict.kind.exposure_label(),
        cached
    )
    .color(colors::EXPOSED)
    .to_string();

    if let Some(detail) = &event.detail {
        line.push_str(&format!(" {}", detail.color(colors::SEPARATOR)));
    }
    line
}

/// One JSON object per line on stdout, closed hosts included.
pub struct JsonSink<W: Write + Send> {
    out: W,
}

impl<W: Write + Send> JsonSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write + Send> VerdictSink for JsonSink<W> {
    fn report(&mut self, event: &VerdictEvent) {
        let written = serde_json::to_string(event)
            .map_err(std::io::Error::other)
            .and_then(|line| writeln!(self.out, "{line}"));
        if let Err(err) = written {
            error!("Could not write verdict for {}: {err}", event.verdict.address);
        }
    }
}

pub fn print_summary(summary: &ScanSummary, elapsed: Duration, q_level: u8) {
    let exposed: ColoredString = format!("{} exposed hosts", summary.exposed).bold().red();
    let total_time: ColoredString = format!("{:.2}s", elapsed.as_secs_f64()).bold().yellow();
    let output: ColoredString = format!("Scan Complete: {exposed} found in {total_time}").color(colors::TEXT_DEFAULT);

    if q_level > 1 {
        print::print(&output.to_string());
        return;
    }

    mprint!();
    print::header("scan summary", q_level);
    let rows: [(&str, usize); 7] = [
        ("Queries", summary.queries_run),
        ("Failed queries", summary.queries_failed),
        ("Candidates", summary.candidates),
        ("Duplicates", summary.duplicates),
        ("Cache hits", summary.cache_hits),
        ("Probes", summary.probes),
        ("Cache errors", summary.cache_failures),
    ];
    let key_width: usize = rows.iter().map(|(key, _)| key.len()).max().unwrap_or_default();
    for (key, value) in rows {
        print::aligned_line(key, &value.to_string(), key_width);
    }
    print::fat_separator();
    print::centerln(&output.to_string());
}
