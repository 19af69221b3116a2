use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use exposr_common::config::Config;
use exposr_common::scan::{CheckKind, Origin, Signature, VerdictEvent};
use exposr_core::cache::{SqliteCache, VerdictCache};
use exposr_core::checks::CheckRegistry;
use exposr_core::clock::ManualClock;
use exposr_core::orchestrator::{CollectingSink, ScanOrchestrator, ScanSettings, ScanSummary};

use crate::utils::{FakeServer, FakeSource, LOOPBACK, SILENT_HOST, spawn_dns_resolver, spawn_snmp_agent};

const START: i64 = 1_700_000_000;
const DOMAINS: [&str; 4] = ["a.example", "b.example", "c.example", "d.example"];

fn config(db: &Path, dns: &FakeServer, snmp: &FakeServer) -> Config {
    let yaml = format!(
        r#"
database:
  path: {db}
cache_expiry: 3600
shodan_api_key: test
asns: [AS64500]
domains_to_test: [{domains}]
success_threshold: 50
snmp_communities: [public, private, secret]
dns:
  port: {dns_port}
  timeout_ms: 200
snmp:
  port: {snmp_port}
  timeout_ms: 200
  version: v2c
"#,
        db = db.display(),
        domains = DOMAINS.join(", "),
        dns_port = dns.port,
        snmp_port = snmp.port,
    );
    let cfg = Config::from_yaml(&yaml).unwrap();
    cfg.validate().unwrap();
    cfg
}

fn orchestrator(
    cfg: &Config,
    source: FakeSource,
    clock: Arc<ManualClock>,
    sink: &CollectingSink,
) -> ScanOrchestrator {
    let cache = SqliteCache::open(&cfg.database.path).unwrap();
    ScanOrchestrator::new(
        Box::new(source),
        Box::new(cache),
        CheckRegistry::from_config(cfg),
        clock,
        Box::new(sink.clone()),
        ScanSettings {
            cache_expiry: cfg.cache_expiry,
            max_in_flight: cfg.max_in_flight,
        },
    )
}

fn asn() -> Signature {
    Signature::DnsRecursion {
        asn: String::from("AS64500"),
    }
}

fn find(events: &[VerdictEvent], address: IpAddr, kind: CheckKind) -> VerdictEvent {
    events
        .iter()
        .find(|e| e.verdict.address == address && e.verdict.kind == kind)
        .cloned()
        .unwrap()
}

#[tokio::test]
async fn half_resolving_resolver_is_flagged_and_cached() {
    let dir = tempfile::tempdir().unwrap();
    let dns = spawn_dns_resolver(&DOMAINS[..2]).await;
    let snmp = spawn_snmp_agent(&[], "unused").await;
    let cfg = config(&dir.path().join("cache.db"), &dns, &snmp);

    let clock = Arc::new(ManualClock::new(START));
    let sink = CollectingSink::new();
    let source = FakeSource::default().with(asn(), &[LOOPBACK]);
    let mut scan = orchestrator(&cfg, source, clock.clone(), &sink);

    let first: ScanSummary = scan.run(&[asn()]).await;
    assert_eq!(first.probes, 1);
    assert_eq!(first.exposed, 1);
    assert_eq!(dns.received(), 4);

    let probed = find(&sink.events(), LOOPBACK, CheckKind::Dns);
    assert!(probed.verdict.is_exposed);
    assert_eq!(probed.origin, Origin::Probed);
    assert_eq!(probed.verdict.last_checked, START);
    assert_eq!(probed.detail.as_deref(), Some("2/4 probe domains resolved"));

    clock.advance(1);
    let second: ScanSummary = scan.run(&[asn()]).await;
    assert_eq!(second.cache_hits, 1);
    assert_eq!(second.probes, 0);
    assert_eq!(dns.received(), 4);

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].origin, Origin::Cached);
    assert!(events[1].verdict.is_exposed);
    assert_eq!(events[1].verdict.last_checked, START);
}

#[tokio::test]
async fn verdicts_survive_reopening_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let dns = spawn_dns_resolver(&DOMAINS[..1]).await;
    let snmp = spawn_snmp_agent(&[], "unused").await;
    let cfg = config(&dir.path().join("nested").join("cache.db"), &dns, &snmp);
    let clock = Arc::new(ManualClock::new(START));

    {
        let sink = CollectingSink::new();
        let source = FakeSource::default().with(asn(), &[LOOPBACK]);
        orchestrator(&cfg, source, clock.clone(), &sink).run(&[asn()]).await;
        assert!(!sink.events()[0].verdict.is_exposed);
    }

    clock.advance(60);
    let sink = CollectingSink::new();
    let source = FakeSource::default().with(asn(), &[LOOPBACK]);
    let summary = orchestrator(&cfg, source, clock.clone(), &sink).run(&[asn()]).await;

    assert_eq!(summary.cache_hits, 1);
    assert_eq!(dns.received(), 4);
    assert!(!sink.events()[0].verdict.is_exposed);
}

#[tokio::test]
async fn snmp_stops_at_first_accepted_community() {
    let dir = tempfile::tempdir().unwrap();
    let dns = spawn_dns_resolver(&[]).await;
    let snmp = spawn_snmp_agent(&["private"], "lab-agent").await;
    let cfg = config(&dir.path().join("cache.db"), &dns, &snmp);

    let sink = CollectingSink::new();
    let source = FakeSource::default().with(Signature::SnmpDefaultCommunity, &[LOOPBACK]);
    let mut scan = orchestrator(&cfg, source, Arc::new(ManualClock::new(START)), &sink);

    let summary = scan.run(&[Signature::SnmpDefaultCommunity]).await;
    assert_eq!(summary.exposed, 1);
    assert_eq!(snmp.received(), 2);

    let event = find(&sink.events(), LOOPBACK, CheckKind::Snmp);
    assert!(event.verdict.is_exposed);
    assert_eq!(
        event.detail.as_deref(),
        Some("community 'private', sysName: lab-agent")
    );
}

#[tokio::test]
async fn dns_verdict_does_not_satisfy_snmp_check() {
    let dir = tempfile::tempdir().unwrap();
    let dns = spawn_dns_resolver(&DOMAINS).await;
    let snmp = spawn_snmp_agent(&[], "unused").await;
    let cfg = config(&dir.path().join("cache.db"), &dns, &snmp);

    let sink = CollectingSink::new();
    let source = FakeSource::default()
        .with(asn(), &[LOOPBACK])
        .with(Signature::SnmpDefaultCommunity, &[LOOPBACK]);
    let queries = source.counter();
    let mut scan = orchestrator(&cfg, source, Arc::new(ManualClock::new(START)), &sink);

    let summary = scan.run(&cfg.scan_plan()).await;
    assert_eq!(queries.load(Ordering::SeqCst), 2);
    assert_eq!(summary.cache_hits, 0);
    assert_eq!(summary.probes, 2);
    assert_eq!(snmp.received(), 3);

    let events = sink.events();
    assert!(find(&events, LOOPBACK, CheckKind::Dns).verdict.is_exposed);
    assert!(!find(&events, LOOPBACK, CheckKind::Snmp).verdict.is_exposed);

    let cache = scan.cache();
    assert!(cache.lookup(LOOPBACK, CheckKind::Dns).unwrap().unwrap().is_exposed);
    assert!(!cache.lookup(LOOPBACK, CheckKind::Snmp).unwrap().unwrap().is_exposed);
}

#[tokio::test]
async fn unreachable_host_is_closed_and_stored() {
    let dir = tempfile::tempdir().unwrap();
    let dns = spawn_dns_resolver(&DOMAINS).await;
    let snmp = spawn_snmp_agent(&[], "unused").await;
    let cfg = config(&dir.path().join("cache.db"), &dns, &snmp);

    let sink = CollectingSink::new();
    let source = FakeSource::default().with(asn(), &[SILENT_HOST, LOOPBACK]);
    let mut scan = orchestrator(&cfg, source, Arc::new(ManualClock::new(START)), &sink);

    let summary = scan.run(&[asn()]).await;
    assert_eq!(summary.probes, 2);
    assert_eq!(summary.exposed, 1);

    let silent = find(&sink.events(), SILENT_HOST, CheckKind::Dns);
    assert!(!silent.verdict.is_exposed);
    assert_eq!(silent.detail.as_deref(), Some("0/4 probe domains resolved"));
    assert!(scan.cache().lookup(SILENT_HOST, CheckKind::Dns).unwrap().is_some());
}
