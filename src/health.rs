use std::net::SocketAddr;
use std::sync::Arc;

use ipnet::IpNet;
use rand::Rng;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::backend::QueryBackend;
use crate::candidate::{Anomaly, HealthStatus, NameServerCandidate};
use crate::config::SessionConfig;
use crate::query::{
	Expectation, QueryOutcome, QueryPhase, QueryResult, RecordKind, TestQuery, WireResponse,
};

/// Reserved hostname guaranteed not to exist (.invalid TLD per RFC 2606).
/// Any resolver answering it with address records is fabricating answers.
pub const HIJACK_PROBE: &str = "nameserver-hygiene-check.invalid";

/// A censorship probe: a well-known hostname whose honest answers fall
/// inside a stable, publicly documented address range.
#[derive(Debug, Clone, Copy)]
pub struct CensorshipProbe {
	pub hostname: &'static str,
	pub expected: &'static [&'static str],
}

/// Hostnames with anycast answers stable enough to serve as expected ranges.
pub const CENSORSHIP_PROBES: &[CensorshipProbe] = &[
	CensorshipProbe {
		hostname: "dns.google",
		expected: &["8.8.8.8/32", "8.8.4.4/32"],
	},
	CensorshipProbe {
		hostname: "one.one.one.one",
		expected: &["1.1.1.1/32", "1.0.0.1/32"],
	},
	CensorshipProbe {
		hostname: "dns.quad9.net",
		expected: &["9.9.9.9/32", "149.112.112.112/32"],
	},
];

/// Address ranges known to host NXDOMAIN-redirect and ad-injection landing
/// pages. An answer for a nonexistent name inside one of these is a strong
/// wildcard-caching signal.
const AD_REDIRECT_NETS: &[&str] = &[
	"146.112.61.104/29",
	"64.94.110.11/32",
	"92.242.140.0/24",
	"198.105.244.0/24",
];

/// Generate a pseudo-random subdomain probe that is vanishingly unlikely to
/// be registered. An honest resolver returns NXDOMAIN.
fn wildcard_probe() -> TestQuery {
	let mut rng = rand::thread_rng();
	let label: String = (0..12)
		.map(|_| char::from(rng.gen_range(b'a'..=b'z')))
		.collect();
	TestQuery {
		hostname: format!("{}.com", label),
		record: RecordKind::A,
		expect: Expectation::NxDomain,
	}
}

fn parse_nets(cidrs: &[&str]) -> Vec<IpNet> {
	cidrs.iter().map(|c| c.parse().unwrap()).collect()
}

/// Anomaly flags accumulated by one candidate's diagnostic battery.
/// Checks are independent; several flags may be set at once.
#[derive(Debug, Default)]
struct Battery {
	hijack: bool,
	wildcard: bool,
	censorship: bool,
	timed_out: bool,
	results: Vec<QueryResult>,
}

impl Battery {
	/// Collapse the accumulated flags into a final status. Hijack and
	/// censorship are disqualifying; wildcard caching alone is a warning.
	fn classify(&self) -> HealthStatus {
		if self.hijack {
			HealthStatus::Failed(Anomaly::Hijack)
		} else if self.censorship {
			HealthStatus::Failed(Anomaly::Censorship)
		} else if self.timed_out {
			HealthStatus::Failed(Anomaly::Timeout)
		} else if self.wildcard {
			HealthStatus::Warning(Anomaly::WildcardCaching)
		} else {
			HealthStatus::Healthy
		}
	}
}

/// Issue one health-check query, retrying on timeout up to the configured
/// retry count. Bounds false negatives from transient loss without
/// retrying forever.
async fn checked_query(
	backend: &Arc<dyn QueryBackend>,
	addr: SocketAddr,
	query: &TestQuery,
	config: &SessionConfig,
) -> WireResponse {
	let mut response = backend.query(addr, query, config.health_timeout).await;
	for _ in 0..config.health_retries {
		if response.outcome != QueryOutcome::Timeout {
			break;
		}
		debug!(addr = %addr, hostname = %query.hostname, "health check timed out, retrying");
		response = backend.query(addr, query, config.health_timeout).await;
	}
	response
}

/// Run the full diagnostic battery against one candidate.
async fn check_candidate(
	backend: Arc<dyn QueryBackend>,
	addr: SocketAddr,
	config: SessionConfig,
) -> Battery {
	let mut battery = Battery::default();

	// Hijack check: the reserved name must come back NXDOMAIN
	let hijack_query = TestQuery {
		hostname: HIJACK_PROBE.to_string(),
		record: RecordKind::A,
		expect: Expectation::NxDomain,
	};
	let response = checked_query(&backend, addr, &hijack_query, &config).await;
	match response.outcome {
		QueryOutcome::Answer if !response.answers.is_empty() => battery.hijack = true,
		QueryOutcome::Timeout => battery.timed_out = true,
		_ => {}
	}
	battery.results.push(QueryResult {
		candidate: addr,
		query: hijack_query,
		phase: QueryPhase::Health,
		run_index: 0,
		duration: response.duration,
		outcome: response.outcome,
		answers: response.answers,
	});

	// Wildcard-caching check: two random labels; consistent synthesized
	// answers, or an answer inside a known ad-redirect range, flag it
	let ad_nets = parse_nets(AD_REDIRECT_NETS);
	let mut synthesized = 0;
	for _ in 0..2 {
		let query = wildcard_probe();
		let response = checked_query(&backend, addr, &query, &config).await;
		match response.outcome {
			QueryOutcome::Answer if !response.answers.is_empty() => {
				synthesized += 1;
				if response.answers.iter()
					.any(|ip| ad_nets.iter().any(|net| net.contains(ip)))
				{
					battery.wildcard = true;
				}
			}
			QueryOutcome::Timeout => battery.timed_out = true,
			_ => {}
		}
		battery.results.push(QueryResult {
			candidate: addr,
			query,
			phase: QueryPhase::Health,
			run_index: 0,
			duration: response.duration,
			outcome: response.outcome,
			answers: response.answers,
		});
	}
	if synthesized == 2 {
		battery.wildcard = true;
	}

	// Censorship check: answers for well-known names must fall inside
	// their expected ranges; NXDOMAIN for them means blocking
	for probe in CENSORSHIP_PROBES {
		let expected = parse_nets(probe.expected);
		let query = TestQuery {
			hostname: probe.hostname.to_string(),
			record: RecordKind::A,
			expect: Expectation::KnownAnswer,
		};
		let response = checked_query(&backend, addr, &query, &config).await;
		match response.outcome {
			QueryOutcome::Answer => {
				let in_range = response.answers.iter()
					.any(|ip| expected.iter().any(|net| net.contains(ip)));
				if !response.answers.is_empty() && !in_range {
					battery.censorship = true;
				}
			}
			QueryOutcome::NxDomain => battery.censorship = true,
			QueryOutcome::Timeout => battery.timed_out = true,
			_ => {}
		}
		battery.results.push(QueryResult {
			candidate: addr,
			query,
			phase: QueryPhase::Health,
			run_index: 0,
			duration: response.duration,
			outcome: response.outcome,
			answers: response.answers,
		});
	}

	battery
}

/// Run the diagnostic battery across all untested candidates, concurrently
/// under the health-check concurrency limit, and set each candidate's final
/// pre-benchmark status.
///
/// Returns every diagnostic query result for the session's raw log.
pub async fn run_health_checks(
	candidates: &mut [NameServerCandidate],
	backend: &Arc<dyn QueryBackend>,
	config: &SessionConfig,
) -> Vec<QueryResult> {
	let semaphore = Arc::new(Semaphore::new(config.health_concurrency.max(1)));
	let mut handles = Vec::new();

	for (i, candidate) in candidates.iter().enumerate() {
		if candidate.status != HealthStatus::Untested {
			continue;
		}
		let sem = Arc::clone(&semaphore);
		let backend = Arc::clone(backend);
		let addr = candidate.addr;
		let config = config.clone();

		handles.push(tokio::spawn(async move {
			let _permit = sem.acquire().await.unwrap();
			let battery = check_candidate(backend, addr, config).await;
			(i, battery)
		}));
	}

	let mut log = Vec::new();
	for handle in handles {
		match handle.await {
			Ok((i, mut battery)) => {
				let status = battery.classify();
				info!(
					addr = %candidates[i].addr,
					status = %status,
					"health check complete",
				);
				candidates[i].status = status;
				log.append(&mut battery.results);
			}
			Err(e) => warn!("health check task failed: {}", e),
		}
	}
	log
}
