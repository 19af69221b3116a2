use std::fmt;

use colored::*;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::FormatEvent;
use tracing_subscriber::fmt::format::{self, Writer};
use tracing_subscriber::registry::LookupSpan;

use crate::terminal::spinner::SpinnerWriter;

/// Events on this target are written verbatim, without a level prefix.
pub const PRINT_TARGET: &str = "exposr::print";

pub struct ExposrFormatter;

impl<S, N> FormatEvent<S, N> for ExposrFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> format::FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &tracing_subscriber::fmt::FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let meta = event.metadata();

        if meta.target() == PRINT_TARGET {
            let mut raw = RawMessage::default();
            event.record(&mut raw);
            return writeln!(writer, "{}", raw.0);
        }

        let (symbol, color_func): (&str, fn(ColoredString) -> ColoredString) = match *meta.level() {
            Level::TRACE => ("[ ]", |s| s.dimmed()),
            Level::DEBUG => ("[?]", |s| s.blue()),
            Level::INFO => ("[+]", |s| s.green().bold()),
            Level::WARN => ("[*]", |s| s.yellow().bold()),
            Level::ERROR => ("[-]", |s| s.red().bold()),
        };

        write!(writer, "{} ", color_func(symbol.into()))?;

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

#[derive(Default)]
struct RawMessage(String);

impl Visit for RawMessage {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "raw_msg" {
            self.0.push_str(value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "raw_msg" {
            self.0 = format!("{value:?}");
        }
    }
}

/// `-q` drops progress chatter, `-qq` leaves only errors and findings.
/// `RUST_LOG` replaces these defaults entirely.
fn default_directives(quiet: u8) -> &'static str {
    match quiet {
        0 => "info",
        1 => "warn,exposr::print=info",
        _ => "error,exposr::print=info",
    }
}

pub fn init_logging(quiet: u8, json: bool) {
    let filter: EnvFilter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(quiet)));

    // Machine-readable output owns stdout, so everything else goes to stderr.
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .event_format(ExposrFormatter);

    let installed = if json {
        builder.with_writer(std::io::stderr).try_init()
    } else {
        builder.with_writer(|| SpinnerWriter).try_init()
    };

    if installed.is_err() {
        eprintln!("logging was already initialized");
    }
}
