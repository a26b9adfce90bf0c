//! End-to-end session tests against a scripted in-memory backend.
//!
//! No network: the stub implements the backend capability trait and plays
//! back configured per-server behaviors with fixed latencies, so rankings,
//! exclusions, and cancellation semantics are fully deterministic.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use nsbench::health::{CENSORSHIP_PROBES, HIJACK_PROBE};
use nsbench::{
	dispatch, Anomaly, BenchError, BenchmarkSession, Cancellation, CandidatePool,
	Expectation, HealthStatus, NameServerCandidate, Origin, QueryBackend, QueryDataset,
	QueryOutcome, QueryPhase, SessionConfig, TestQuery, WireResponse,
};

fn ms(millis: u64) -> Duration {
	Duration::from_millis(millis)
}

/// Scripted behavior for one stub nameserver.
#[derive(Debug, Clone, Copy)]
enum Mode {
	/// Correct answers to everything with a fixed latency.
	Healthy { latency_ms: u64 },
	/// Fabricates an ad-redirect answer for every query.
	Hijack,
	/// Never responds at all.
	Silent,
	/// Answers the reachability probe, then times out every later query.
	ProbeOnly,
	/// Diagnostics pass, but every benchmark query times out.
	BenchSilent,
	/// Synthesizes answers for random nonexistent subdomains.
	Wildcard { latency_ms: u64 },
	/// Returns a block-page address for known-answer probes.
	Censored,
}

#[derive(Debug)]
struct StubBackend {
	modes: HashMap<IpAddr, Mode>,
	/// Count of normal-answer queries seen per server, to tell the
	/// reachability probe (first) apart from benchmark queries.
	normal_calls: Mutex<HashMap<IpAddr, usize>>,
	total_calls: AtomicUsize,
	/// Queries currently being served, and the highest count observed.
	in_flight: AtomicUsize,
	max_in_flight: AtomicUsize,
	/// Artificial per-query latency so that concurrent queries overlap in time.
	delay: Option<Duration>,
	/// When set, cancel the signal once this many queries have been issued.
	cancel_at: Option<(usize, Cancellation)>,
}

impl StubBackend {
	fn new(modes: &[(&str, Mode)]) -> Self {
		Self {
			modes: modes.iter()
				.map(|(ip, mode)| (ip.parse().unwrap(), *mode))
				.collect(),
			normal_calls: Mutex::new(HashMap::new()),
			total_calls: AtomicUsize::new(0),
			in_flight: AtomicUsize::new(0),
			max_in_flight: AtomicUsize::new(0),
			delay: None,
			cancel_at: None,
		}
	}

	fn with_cancel_at(mut self, at: usize, cancel: Cancellation) -> Self {
		self.cancel_at = Some((at, cancel));
		self
	}

	fn with_delay(mut self, delay: Duration) -> Self {
		self.delay = Some(delay);
		self
	}
}

/// The answer a well-behaved server gives for `query`.
fn honest_response(server: SocketAddr, query: &TestQuery, latency_ms: u64) -> WireResponse {
	match query.expect {
		Expectation::NxDomain => WireResponse {
			outcome: QueryOutcome::NxDomain,
			duration: ms(latency_ms),
			answers: Vec::new(),
		},
		Expectation::KnownAnswer => {
			let answer: IpAddr = CENSORSHIP_PROBES.iter()
				.find(|p| p.hostname == query.hostname)
				.and_then(|p| p.expected.first())
				.and_then(|cidr| cidr.split('/').next())
				.map(|ip| ip.parse().unwrap())
				.unwrap_or_else(|| server.ip());
			WireResponse {
				outcome: QueryOutcome::Answer,
				duration: ms(latency_ms),
				answers: vec![answer],
			}
		}
		// Answer with the server's own address so answer sets stay
		// distinct across candidates
		Expectation::NormalAnswer => WireResponse {
			outcome: QueryOutcome::Answer,
			duration: ms(latency_ms),
			answers: vec![server.ip()],
		},
	}
}

#[async_trait]
impl QueryBackend for StubBackend {
	async fn query(
		&self,
		server: SocketAddr,
		query: &TestQuery,
		_timeout: Duration,
	) -> WireResponse {
		let issued = self.total_calls.fetch_add(1, Ordering::SeqCst) + 1;
		if let Some((at, cancel)) = &self.cancel_at {
			if issued >= *at {
				cancel.cancel();
			}
		}

		let active = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
		self.max_in_flight.fetch_max(active, Ordering::SeqCst);
		if let Some(delay) = self.delay {
			tokio::time::sleep(delay).await;
		}

		let normal_seq = if query.expect == Expectation::NormalAnswer {
			let mut calls = self.normal_calls.lock().unwrap();
			let counter = calls.entry(server.ip()).or_insert(0);
			*counter += 1;
			*counter
		} else {
			0
		};

		let mode = self.modes.get(&server.ip()).copied().unwrap_or(Mode::Silent);
		let response = match mode {
			Mode::Healthy { latency_ms } => honest_response(server, query, latency_ms),
			Mode::Hijack => WireResponse {
				outcome: QueryOutcome::Answer,
				duration: ms(5),
				answers: vec!["64.94.110.11".parse().unwrap()],
			},
			Mode::Silent => WireResponse::timeout(Duration::ZERO),
			Mode::ProbeOnly => {
				if query.expect == Expectation::NormalAnswer && normal_seq == 1 {
					honest_response(server, query, 8)
				} else {
					WireResponse::timeout(Duration::ZERO)
				}
			}
			Mode::BenchSilent => {
				if query.expect == Expectation::NormalAnswer && normal_seq > 1 {
					WireResponse::timeout(Duration::ZERO)
				} else {
					honest_response(server, query, 8)
				}
			}
			Mode::Wildcard { latency_ms } => {
				if query.hostname == HIJACK_PROBE {
					honest_response(server, query, latency_ms)
				} else if query.expect == Expectation::NxDomain {
					// Synthesized answer for a name that does not exist
					WireResponse {
						outcome: QueryOutcome::Answer,
						duration: ms(latency_ms),
						answers: vec!["203.0.113.9".parse().unwrap()],
					}
				} else {
					honest_response(server, query, latency_ms)
				}
			}
			Mode::Censored => {
				if query.expect == Expectation::KnownAnswer {
					WireResponse {
						outcome: QueryOutcome::Answer,
						duration: ms(12),
						answers: vec!["10.10.10.10".parse().unwrap()],
					}
				} else {
					honest_response(server, query, 12)
				}
			}
		};
		self.in_flight.fetch_sub(1, Ordering::SeqCst);
		response
	}
}

fn test_config() -> SessionConfig {
	SessionConfig {
		runs: 2,
		top_n: 3,
		concurrency: 8,
		..SessionConfig::default()
	}
}

fn test_dataset() -> QueryDataset {
	QueryDataset::from_hostnames(&[
		"alpha.test".to_string(),
		"bravo.test".to_string(),
		"charlie.test".to_string(),
	])
}

fn pool_of(addresses: &[&str]) -> CandidatePool {
	let raw: Vec<String> = addresses.iter().map(|s| s.to_string()).collect();
	CandidatePool::load(&raw, Origin::UserSupplied)
}

fn addr(ip: &str) -> SocketAddr {
	format!("{}:53", ip).parse().unwrap()
}

#[tokio::test]
async fn scenario_selects_healthy_candidates_in_latency_order() {
	// Three healthy servers at 10/20/30 ms, one hijacker, one that answers
	// only the reachability probe and then goes dark.
	let backend = Arc::new(StubBackend::new(&[
		("10.0.0.1", Mode::Healthy { latency_ms: 30 }),
		("10.0.0.2", Mode::Healthy { latency_ms: 10 }),
		("10.0.0.3", Mode::Healthy { latency_ms: 20 }),
		("10.0.0.4", Mode::Hijack),
		("10.0.0.5", Mode::ProbeOnly),
	]));
	let session = BenchmarkSession::new(test_config(), test_dataset(), backend);
	let pool = pool_of(&["10.0.0.1", "10.0.0.2", "10.0.0.3", "10.0.0.4", "10.0.0.5"]);

	let report = session.run(pool).await.unwrap();

	assert_eq!(report.cutoff, 3);
	let selected: Vec<SocketAddr> = report.selected().iter()
		.map(|e| e.candidate.addr)
		.collect();
	assert_eq!(selected, vec![addr("10.0.0.2"), addr("10.0.0.3"), addr("10.0.0.1")]);

	// Scores reflect the configured latencies; no failures means score ==
	// trimmed mean
	assert!((report.entries[0].stats.score - 10.0).abs() < 0.5);
	assert!((report.entries[1].stats.score - 20.0).abs() < 0.5);
	assert!((report.entries[2].stats.score - 30.0).abs() < 0.5);

	let status_of = |ip: &str| {
		report.excluded.iter()
			.find(|c| c.addr == addr(ip))
			.map(|c| c.status.clone())
	};
	assert_eq!(status_of("10.0.0.4"), Some(HealthStatus::Failed(Anomaly::Hijack)));
	assert_eq!(status_of("10.0.0.5"), Some(HealthStatus::Failed(Anomaly::Timeout)));

	// Both misbehaving candidates still appear in the raw result log
	assert!(report.raw_log.iter().any(|r| r.candidate == addr("10.0.0.4")));
	assert!(report.raw_log.iter().any(|r| r.candidate == addr("10.0.0.5")));
}

#[tokio::test]
async fn hijacker_never_selected_regardless_of_speed() {
	let backend = Arc::new(StubBackend::new(&[
		("10.0.0.1", Mode::Hijack),
		("10.0.0.2", Mode::Healthy { latency_ms: 80 }),
	]));
	let config = SessionConfig { top_n: 1, ..test_config() };
	let session = BenchmarkSession::new(config, test_dataset(), backend);

	let report = session.run(pool_of(&["10.0.0.1", "10.0.0.2"])).await.unwrap();

	assert_eq!(report.selected().len(), 1);
	assert_eq!(report.selected()[0].candidate.addr, addr("10.0.0.2"));
	let hijacker = report.excluded.iter()
		.find(|c| c.addr == addr("10.0.0.1"))
		.unwrap();
	assert_eq!(hijacker.status, HealthStatus::Failed(Anomaly::Hijack));
	assert!(report.raw_log.iter().any(|r| r.candidate == addr("10.0.0.1")));
}

#[tokio::test]
async fn pure_timeout_candidate_records_penalty_and_fails() {
	let backend = Arc::new(StubBackend::new(&[
		("10.0.0.1", Mode::BenchSilent),
	]));
	let config = test_config();
	let penalty = config.timeout_penalty;
	let session = BenchmarkSession::new(config, test_dataset(), backend);

	let report = session.run(pool_of(&["10.0.0.1"])).await.unwrap();

	// 3 hostnames x 2 runs, all timed out, each carrying the penalty value
	let timeouts: Vec<_> = report.raw_log.iter()
		.filter(|r| r.outcome == QueryOutcome::Timeout)
		.collect();
	assert_eq!(timeouts.len(), 6);
	assert!(timeouts.iter().all(|r| r.duration == penalty));

	// Failure rate over threshold: barred from the ranking
	assert!(report.entries.is_empty());
	assert_eq!(
		report.excluded[0].status,
		HealthStatus::Failed(Anomaly::Timeout),
	);
}

#[tokio::test]
async fn cancellation_yields_partial_single_run_result() {
	// Two candidates, three configured runs. Per candidate the stub sees
	// 1 probe + 6 health queries, then 3 benchmark queries per run; cancel
	// as the last query of run one is issued.
	let cancel = Cancellation::new();
	let backend = Arc::new(
		StubBackend::new(&[
			("10.0.0.1", Mode::Healthy { latency_ms: 10 }),
			("10.0.0.2", Mode::Healthy { latency_ms: 15 }),
		])
		.with_cancel_at(20, cancel.clone()),
	);
	let config = SessionConfig { runs: 3, ..test_config() };
	let session = BenchmarkSession::new(config, test_dataset(), backend)
		.with_cancellation(cancel);

	let report = session.run(pool_of(&["10.0.0.1", "10.0.0.2"])).await.unwrap();

	let bench_results: Vec<_> = report.raw_log.iter()
		.filter(|r| r.phase == QueryPhase::Benchmark)
		.collect();
	// Benchmark data exists for run 0 only
	assert!(!bench_results.is_empty());
	assert!(bench_results.iter().all(|r| r.run_index == 0));

	// Partial data still aggregates and ranks successfully
	assert_eq!(report.entries.len(), 2);
	assert_eq!(report.entries[0].candidate.addr, addr("10.0.0.1"));
}

#[tokio::test]
async fn all_unreachable_is_a_session_error() {
	let backend = Arc::new(StubBackend::new(&[
		("10.0.0.1", Mode::Silent),
		("10.0.0.2", Mode::Silent),
	]));
	let session = BenchmarkSession::new(test_config(), test_dataset(), backend);

	let result = session.run(pool_of(&["10.0.0.1", "10.0.0.2"])).await;
	assert!(matches!(result, Err(BenchError::NoEligibleServers)));
}

#[tokio::test]
async fn wildcard_caching_is_warning_unless_strict() {
	let servers: &[(&str, Mode)] = &[
		("10.0.0.1", Mode::Wildcard { latency_ms: 10 }),
		("10.0.0.2", Mode::Healthy { latency_ms: 40 }),
	];

	let session = BenchmarkSession::new(
		test_config(),
		test_dataset(),
		Arc::new(StubBackend::new(servers)),
	);
	let report = session.run(pool_of(&["10.0.0.1", "10.0.0.2"])).await.unwrap();
	let wildcard = report.entries.iter()
		.find(|e| e.candidate.addr == addr("10.0.0.1"))
		.unwrap();
	assert_eq!(
		wildcard.candidate.status,
		HealthStatus::Warning(Anomaly::WildcardCaching),
	);

	// Strict mode drops the warned candidate at ranking time
	let strict_session = BenchmarkSession::new(
		SessionConfig { strict: true, ..test_config() },
		test_dataset(),
		Arc::new(StubBackend::new(servers)),
	);
	let strict_report = strict_session
		.run(pool_of(&["10.0.0.1", "10.0.0.2"]))
		.await
		.unwrap();
	assert!(strict_report.entries.iter().all(|e| e.candidate.addr != addr("10.0.0.1")));
	assert!(strict_report.excluded.iter().any(|c| c.addr == addr("10.0.0.1")));
}

#[tokio::test]
async fn censored_candidate_fails_health_checks() {
	let backend = Arc::new(StubBackend::new(&[
		("10.0.0.1", Mode::Censored),
		("10.0.0.2", Mode::Healthy { latency_ms: 25 }),
	]));
	let session = BenchmarkSession::new(test_config(), test_dataset(), backend);

	let report = session.run(pool_of(&["10.0.0.1", "10.0.0.2"])).await.unwrap();

	let censored = report.excluded.iter()
		.find(|c| c.addr == addr("10.0.0.1"))
		.unwrap();
	assert_eq!(censored.status, HealthStatus::Failed(Anomaly::Censorship));
}

#[tokio::test]
async fn duplicates_are_reported_not_benchmarked() {
	let backend = Arc::new(StubBackend::new(&[
		("10.0.0.1", Mode::Healthy { latency_ms: 10 }),
	]));
	let session = BenchmarkSession::new(test_config(), test_dataset(), backend);

	let report = session.run(pool_of(&["10.0.0.1", "10.0.0.1"])).await.unwrap();

	assert_eq!(report.entries.len(), 1);
	let duplicate = report.excluded.iter()
		.find(|c| c.status == HealthStatus::Failed(Anomaly::DuplicateOf(addr("10.0.0.1"))))
		.unwrap();
	assert_eq!(duplicate.addr, addr("10.0.0.1"));
}

#[tokio::test]
async fn in_flight_queries_never_exceed_benchmark_concurrency() {
	// Eight candidates, limit two: with a per-query delay forcing overlap,
	// the stub's gauge records how many queries were ever live at once.
	let ips = [
		"10.0.0.1", "10.0.0.2", "10.0.0.3", "10.0.0.4",
		"10.0.0.5", "10.0.0.6", "10.0.0.7", "10.0.0.8",
	];
	let modes: Vec<(&str, Mode)> = ips.iter()
		.map(|ip| (*ip, Mode::Healthy { latency_ms: 5 }))
		.collect();
	let stub = Arc::new(StubBackend::new(&modes).with_delay(ms(10)));
	let backend: Arc<dyn QueryBackend> = stub.clone();

	let mut candidates: Vec<NameServerCandidate> = ips.iter()
		.map(|ip| NameServerCandidate::new(addr(ip), None, Origin::UserSupplied))
		.collect();
	for c in &mut candidates {
		c.status = HealthStatus::Healthy;
	}
	let config = SessionConfig { runs: 2, concurrency: 2, ..SessionConfig::default() };
	let cancel = Cancellation::new();

	let log = dispatch::run_benchmark(&candidates, &test_dataset(), &backend, &config, &cancel).await;

	assert_eq!(log.len(), 8 * 2 * 3);
	let observed = stub.max_in_flight.load(Ordering::SeqCst);
	assert!(observed <= 2, "{} queries in flight with a limit of 2", observed);
	// The limit was actually reached, so the overlap is real
	assert_eq!(observed, 2);
}

#[tokio::test]
async fn stage_concurrency_caps_bound_probe_and_health_parallelism() {
	let stub = Arc::new(
		StubBackend::new(&[
			("10.0.0.1", Mode::Healthy { latency_ms: 5 }),
			("10.0.0.2", Mode::Healthy { latency_ms: 5 }),
			("10.0.0.3", Mode::Healthy { latency_ms: 5 }),
		])
		.with_delay(ms(2)),
	);
	let backend: Arc<dyn QueryBackend> = stub.clone();
	let config = SessionConfig {
		runs: 1,
		concurrency: 1,
		probe_concurrency: 1,
		health_concurrency: 1,
		..SessionConfig::default()
	};
	let session = BenchmarkSession::new(config, test_dataset(), backend);

	session.run(pool_of(&["10.0.0.1", "10.0.0.2", "10.0.0.3"])).await.unwrap();

	// Every stage ran under a width-one limit, so nothing ever overlapped
	assert_eq!(stub.max_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn probe_entries_are_tagged_apart_from_run_zero_benchmark_entries() {
	let backend = Arc::new(StubBackend::new(&[
		("10.0.0.1", Mode::Healthy { latency_ms: 10 }),
	]));
	let session = BenchmarkSession::new(test_config(), test_dataset(), backend);

	let report = session.run(pool_of(&["10.0.0.1"])).await.unwrap();

	// The reachability probe reuses the dataset's first hostname, so the
	// candidate has two run-zero entries for it; the phase tag tells them apart
	let first_host: Vec<_> = report.raw_log.iter()
		.filter(|r| r.query.hostname == "alpha.test" && r.run_index == 0)
		.collect();
	assert_eq!(first_host.iter().filter(|r| r.phase == QueryPhase::Probe).count(), 1);
	assert_eq!(first_host.iter().filter(|r| r.phase == QueryPhase::Benchmark).count(), 1);

	// Diagnostic entries carry their own tag: hijack + 2 wildcard + 3 censorship
	assert_eq!(
		report.raw_log.iter().filter(|r| r.phase == QueryPhase::Health).count(),
		6,
	);
}

#[tokio::test(start_paused = true)]
async fn deadline_timer_does_not_outlive_completed_session() {
	let cancel = Cancellation::new();
	let backend = Arc::new(StubBackend::new(&[
		("10.0.0.1", Mode::Healthy { latency_ms: 10 }),
	]));
	let config = SessionConfig {
		deadline: Some(Duration::from_secs(60)),
		..test_config()
	};
	let session = BenchmarkSession::new(config, test_dataset(), backend)
		.with_cancellation(cancel.clone());

	session.run(pool_of(&["10.0.0.1"])).await.unwrap();
	assert!(!cancel.is_cancelled());

	// Long after the session finished, the stale timer must not fire
	tokio::time::advance(Duration::from_secs(120)).await;
	tokio::task::yield_now().await;
	assert!(!cancel.is_cancelled());
}

#[tokio::test]
async fn every_candidate_sees_identical_sequence_per_run() {
	let backend: Arc<dyn QueryBackend> = Arc::new(StubBackend::new(&[
		("10.0.0.1", Mode::Healthy { latency_ms: 10 }),
		("10.0.0.2", Mode::Healthy { latency_ms: 20 }),
	]));
	let dataset = QueryDataset::from_hostnames(&[
		"a.test".to_string(),
		"b.test".to_string(),
		"c.test".to_string(),
		"d.test".to_string(),
	]);
	let mut candidates = vec![
		NameServerCandidate::new(addr("10.0.0.1"), None, Origin::UserSupplied),
		NameServerCandidate::new(addr("10.0.0.2"), None, Origin::UserSupplied),
	];
	for c in &mut candidates {
		c.status = HealthStatus::Healthy;
	}
	let config = SessionConfig { runs: 2, ..SessionConfig::default() };
	let cancel = Cancellation::new();

	let log = dispatch::run_benchmark(&candidates, &dataset, &backend, &config, &cancel).await;

	assert_eq!(log.len(), 2 * 2 * 4);
	for run in 0..2u32 {
		let expected: Vec<String> = dataset.run_sequence(run).iter()
			.map(|q| q.hostname.clone())
			.collect();
		for candidate in &candidates {
			let seen: Vec<String> = log.iter()
				.filter(|r| r.candidate == candidate.addr && r.run_index == run)
				.map(|r| r.query.hostname.clone())
				.collect();
			assert_eq!(seen, expected, "run {} sequence mismatch", run);
		}
	}
}
