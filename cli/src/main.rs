mod commands;
mod terminal;

use std::process::ExitCode;

use commands::{CommandLine, prune, scan};
use terminal::{logging, print};
use tracing::error;

/// Exit status for configuration and storage failures.
const FATAL: u8 = 1;

#[tokio::main]
async fn main() -> ExitCode {
    let commands = CommandLine::parse_args();

    if commands.json {
        colored::control::set_override(false);
    }
    logging::init_logging(commands.quiet, commands.json);

    let result: anyhow::Result<ExitCode> = match commands.prune {
        Some(max_age) => prune::prune(&commands.config, max_age).map(|_| ExitCode::SUCCESS),
        None => {
            if !commands.json {
                print::banner(commands.quiet);
            }
            scan::scan(&commands).await
        }
    };

    result.unwrap_or_else(|err| {
        error!("{err:#}");
        ExitCode::from(FATAL)
    })
}
