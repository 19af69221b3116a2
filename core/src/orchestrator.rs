//! # Scan Orchestrator
//!
//! Runs discovery queries one after another and drives every candidate
//! through the same lifecycle:
//!
//! 1. **Received**: look the `(address, kind)` up in the cache.
//! 2. A fresh entry goes straight to **Reported** without touching the network.
//! 3. A miss or stale entry is **Probing**: the check for the candidate's kind runs.
//! 4. **Persisting**: the new verdict is upserted.
//! 5. **Reported**: a [`VerdictEvent`] goes to the sink.
//!
//! Probes may overlap up to `max_in_flight`, but every cache read and write
//! happens on the orchestrating task, so there is one writer per scan. With
//! `max_in_flight == 1` a candidate is reported before the next one is
//! received.

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use exposr_common::scan::{Candidate, CheckKind, Origin, Signature, Verdict, VerdictEvent};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use crate::cache::{Lookup, VerdictCache};
use crate::checks::{CheckRegistry, CheckReport};
use crate::clock::Clock;
use crate::intel::IntelligenceSource;

/// Receives every candidate once it reaches the reported state.
pub trait VerdictSink: Send {
    fn report(&mut self, event: &VerdictEvent);
}

/// Keeps every event in memory. Clones share the same buffer.
#[derive(Debug, Default, Clone)]
pub struct CollectingSink {
    events: Arc<Mutex<Vec<VerdictEvent>>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<VerdictEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl VerdictSink for CollectingSink {
    fn report(&mut self, event: &VerdictEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ScanSettings {
    /// Seconds a cached verdict stays fresh.
    pub cache_expiry: u64,
    pub max_in_flight: usize,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanSummary {
    pub queries_run: usize,
    pub queries_failed: usize,
    pub candidates: usize,
    pub duplicates: usize,
    pub cache_hits: usize,
    pub probes: usize,
    pub exposed: usize,
    pub cache_failures: usize,
}

impl ScanSummary {
    /// True when there were queries to run and none of them got through.
    pub fn all_queries_failed(&self) -> bool {
        self.queries_run == 0 && self.queries_failed > 0
    }
}

type ProbeResult = (Candidate, CheckReport);

pub struct ScanOrchestrator {
    source: Box<dyn IntelligenceSource>,
    cache: Box<dyn VerdictCache>,
    checks: CheckRegistry,
    clock: Arc<dyn Clock>,
    sink: Box<dyn VerdictSink>,
    settings: ScanSettings,
    running: Arc<AtomicBool>,
}

impl ScanOrchestrator {
    pub fn new(
        source: Box<dyn IntelligenceSource>,
        cache: Box<dyn VerdictCache>,
        checks: CheckRegistry,
        clock: Arc<dyn Clock>,
        sink: Box<dyn VerdictSink>,
        settings: ScanSettings,
    ) -> Self {
        Self {
            source,
            cache,
            checks,
            clock,
            sink,
            settings,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Shares a stop flag with the caller. Once it turns false no new query
    /// or probe starts; probes already in flight are still persisted.
    pub fn with_running_flag(mut self, running: Arc<AtomicBool>) -> Self {
        self.running = running;
        self
    }

    pub fn cache(&self) -> &dyn VerdictCache {
        self.cache.as_ref()
    }

    /// Runs `plan` in order. Candidates are de-duplicated per
    /// `(address, kind)` across the whole run.
    pub async fn run(&mut self, plan: &[Signature]) -> ScanSummary {
        let mut summary = ScanSummary::default();
        let mut seen: HashSet<(IpAddr, CheckKind)> = HashSet::new();

        for signature in plan {
            if !self.is_running() {
                warn!("Scan interrupted, skipping remaining queries");
                break;
            }

            info!("Searching for {signature}...");
            let candidates = match self.source.query(signature).await {
                Ok(candidates) => candidates,
                Err(err) => {
                    warn!("Query for {signature} failed: {err}");
                    summary.queries_failed += 1;
                    continue;
                }
            };
            summary.queries_run += 1;
            debug!(count = candidates.len(), "candidates received");

            self.process_candidates(candidates, &mut seen, &mut summary).await;
        }

        summary
    }

    async fn process_candidates(
        &mut self,
        candidates: Vec<Candidate>,
        seen: &mut HashSet<(IpAddr, CheckKind)>,
        summary: &mut ScanSummary,
    ) {
        let max_in_flight: usize = self.settings.max_in_flight.max(1);
        let mut probes: JoinSet<ProbeResult> = JoinSet::new();

        for candidate in candidates {
            if !self.is_running() {
                break;
            }
            summary.candidates += 1;

            if !seen.insert((candidate.address, candidate.kind())) {
                summary.duplicates += 1;
                continue;
            }

            if let Some(verdict) = self.fresh_verdict(&candidate, summary) {
                summary.cache_hits += 1;
                self.emit(verdict, Origin::Cached, None, summary);
                continue;
            }

            let Some(check) = self.checks.get(candidate.kind()) else {
                error!(kind = %candidate.kind(), "no check registered, skipping {}", candidate.address);
                continue;
            };

            summary.probes += 1;
            probes.spawn(async move {
                let report = check.verify(candidate.address).await;
                (candidate, report)
            });

            // At the bound, wait for a slot before looking at the next
            // candidate. With a bound of 1 this finishes every probe in order.
            while probes.len() >= max_in_flight {
                match probes.join_next().await {
                    Some(finished) => self.persist(finished, summary),
                    None => break,
                }
            }
        }

        while let Some(finished) = probes.join_next().await {
            self.persist(finished, summary);
        }
    }

    /// A lookup failure is treated as a miss: the host gets probed anyway.
    fn fresh_verdict(&self, candidate: &Candidate, summary: &mut ScanSummary) -> Option<Verdict> {
        let now: i64 = self.clock.now();
        let lookup = self.cache.lookup_at(
            candidate.address,
            candidate.kind(),
            now,
            self.settings.cache_expiry,
        );
        match lookup {
            Ok(Lookup::Fresh(verdict)) => Some(verdict),
            Ok(Lookup::Stale(verdict)) => {
                debug!(
                    address = %candidate.address,
                    age = now - verdict.last_checked,
                    "cached verdict is stale"
                );
                None
            }
            Ok(Lookup::Miss) => None,
            Err(err) => {
                error!(address = %candidate.address, "Cache lookup failed, probing anyway: {err}");
                summary.cache_failures += 1;
                None
            }
        }
    }

    /// A store failure is logged and counted; the verdict is still reported.
    fn persist(&mut self, finished: Result<ProbeResult, JoinError>, summary: &mut ScanSummary) {
        let (candidate, report) = match finished {
            Ok(result) => result,
            Err(err) => {
                error!("Probe task did not complete: {err}");
                return;
            }
        };

        let verdict = Verdict {
            address: candidate.address,
            kind: candidate.kind(),
            is_exposed: report.is_exposed,
            last_checked: self.clock.now(),
        };
        if let Err(err) = self.cache.store(&verdict) {
            error!(address = %verdict.address, "Failed to store verdict: {err}");
            summary.cache_failures += 1;
        }

        self.emit(verdict, Origin::Probed, report.detail, summary);
    }

    fn emit(&mut self, verdict: Verdict, origin: Origin, detail: Option<String>, summary: &mut ScanSummary) {
        if verdict.is_exposed {
            summary.exposed += 1;
        }
        self.sink.report(&VerdictEvent {
            verdict,
            origin,
            detail,
        });
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }
}
