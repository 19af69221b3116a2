use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::Context;
use exposr_common::config::Config;
use exposr_common::scan::Signature;
use exposr_core::cache::SqliteCache;
use exposr_core::checks::CheckRegistry;
use exposr_core::clock::SystemClock;
use exposr_core::intel::ShodanClient;
use exposr_core::orchestrator::{ScanOrchestrator, ScanSettings, ScanSummary, VerdictSink};
use tracing::{info, warn};

use crate::commands::CommandLine;
use crate::terminal::{print, report, spinner};

/// Exit status when no discovery query got through.
const ALL_QUERIES_FAILED: u8 = 2;

pub async fn scan(cmd: &CommandLine) -> anyhow::Result<ExitCode> {
    let cfg: Config = Config::load(&cmd.config)
        .with_context(|| format!("could not load {}", cmd.config.display()))?;

    let cache = SqliteCache::open(&cfg.database.path)
        .with_context(|| format!("could not open cache at {}", cfg.database.path.display()))?;
    let source = ShodanClient::new(
        cfg.shodan_api_key.clone(),
        cfg.shodan.base_url.clone(),
        Duration::from_secs(cfg.shodan.timeout_secs),
    )
    .context("could not build the Shodan client")?;

    let sink: Box<dyn VerdictSink> = if cmd.json {
        Box::new(report::JsonSink::new(std::io::stdout()))
    } else {
        Box::new(report::TerminalSink::default())
    };

    let running: Arc<AtomicBool> = Arc::new(AtomicBool::new(true));
    watch_interrupt(running.clone());

    let mut orchestrator = ScanOrchestrator::new(
        Box::new(source),
        Box::new(cache),
        CheckRegistry::from_config(&cfg),
        Arc::new(SystemClock),
        sink,
        ScanSettings {
            cache_expiry: cfg.cache_expiry,
            max_in_flight: cfg.max_in_flight,
        },
    )
    .with_running_flag(running);

    let plan: Vec<Signature> = cfg.scan_plan();
    print::header("starting scan", cmd.quiet);
    info!(
        "{} discovery queries, cache entries trusted for {}s",
        plan.len(),
        cfg.cache_expiry
    );

    if !cmd.json && cmd.quiet == 0 {
        spinner::start();
    }
    let start_time: Instant = Instant::now();
    let summary: ScanSummary = orchestrator.run(&plan).await;
    spinner::finish();

    if !cmd.json {
        report::print_summary(&summary, start_time.elapsed(), cmd.quiet);
    }

    if summary.all_queries_failed() {
        warn!("Every discovery query failed");
        return Ok(ExitCode::from(ALL_QUERIES_FAILED));
    }
    Ok(ExitCode::SUCCESS)
}

/// Ctrl-C stops new work; probes already running finish and are stored.
fn watch_interrupt(running: Arc<AtomicBool>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing probes in flight");
            running.store(false, Ordering::Relaxed);
        }
    });
}
