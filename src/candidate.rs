use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::backend::QueryBackend;
use crate::config::SessionConfig;
use crate::error::{BenchError, Result};
use crate::query::{QueryOutcome, QueryPhase, QueryResult, TestQuery};

/// Where a candidate address came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
	Builtin,
	Regional,
	UserSupplied,
}

/// Behavioral anomaly attached to a warning or failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anomaly {
	Hijack,
	WildcardCaching,
	Censorship,
	Timeout,
	Malformed,
	DuplicateOf(SocketAddr),
}

impl fmt::Display for Anomaly {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Anomaly::Hijack => write!(f, "hijack"),
			Anomaly::WildcardCaching => write!(f, "wildcard-caching"),
			Anomaly::Censorship => write!(f, "censorship"),
			Anomaly::Timeout => write!(f, "timeout"),
			Anomaly::Malformed => write!(f, "malformed"),
			Anomaly::DuplicateOf(addr) => write!(f, "duplicate of {}", addr),
		}
	}
}

/// Lifecycle state of a candidate.
///
/// Unreachable, duplicate, and failed candidates are terminal with respect
/// to benchmarking; no further timing work is done on them.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum HealthStatus {
	#[default]
	Untested,
	Unreachable,
	Healthy,
	Warning(Anomaly),
	Failed(Anomaly),
}

impl HealthStatus {
	/// Healthy and warned candidates proceed to the timing benchmark.
	pub fn is_benchmarkable(&self) -> bool {
		matches!(self, HealthStatus::Healthy | HealthStatus::Warning(_))
	}
}

impl fmt::Display for HealthStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			HealthStatus::Untested => write!(f, "untested"),
			HealthStatus::Unreachable => write!(f, "unreachable"),
			HealthStatus::Healthy => write!(f, "healthy"),
			HealthStatus::Warning(a) => write!(f, "warning ({})", a),
			HealthStatus::Failed(a) => write!(f, "failed ({})", a),
		}
	}
}

/// One candidate nameserver. Identity is the resolved socket address.
#[derive(Debug, Clone)]
pub struct NameServerCandidate {
	pub addr: SocketAddr,
	pub label: Option<String>,
	pub origin: Origin,
	pub status: HealthStatus,
}

impl NameServerCandidate {
	pub fn new(addr: SocketAddr, label: Option<String>, origin: Origin) -> Self {
		Self {
			addr,
			label,
			origin,
			status: HealthStatus::Untested,
		}
	}

	/// Label for display, falling back to the bare IP.
	pub fn display_label(&self) -> String {
		self.label.clone().unwrap_or_else(|| self.addr.ip().to_string())
	}
}

/// Parse a candidate address string.
///
/// Supports formats:
///   "1.1.1.1"              -- IPv4, default port 53
///   "1.1.1.1:53"           -- IPv4 with explicit port
///   "2606:4700::1111"      -- bare IPv6, default port 53
///   "[2606:4700::1111]:53" -- bracketed IPv6 with port
pub fn parse_candidate(input: &str, origin: Origin) -> Result<NameServerCandidate> {
	let trimmed = input.trim();
	if trimmed.is_empty() {
		return Err(BenchError::InvalidAddress(input.to_string()));
	}

	let addr: SocketAddr = if trimmed.starts_with('[') {
		// Bracketed IPv6 with port: [::1]:53
		trimmed.parse()
			.map_err(|_| BenchError::InvalidAddress(input.to_string()))?
	} else if trimmed.contains("::") || trimmed.matches(':').count() > 1 {
		// Bare IPv6 address without port
		let ip = trimmed.parse()
			.map_err(|_| BenchError::InvalidAddress(input.to_string()))?;
		SocketAddr::new(ip, 53)
	} else if let Ok(addr) = trimmed.parse::<SocketAddr>() {
		// IPv4 with port (e.g. "8.8.8.8:5353")
		addr
	} else {
		// Plain IPv4 without port
		let ip = trimmed.parse()
			.map_err(|_| BenchError::InvalidAddress(input.to_string()))?;
		SocketAddr::new(ip, 53)
	};

	Ok(NameServerCandidate::new(addr, None, origin))
}

/// The candidate pool: raw addresses in, deduplicated reachability-screened
/// candidates out.
#[derive(Debug, Default)]
pub struct CandidatePool {
	candidates: Vec<NameServerCandidate>,
	invalid: Vec<String>,
}

impl CandidatePool {
	pub fn new() -> Self {
		Self::default()
	}

	/// Build a pool from raw address strings. Unparseable entries are
	/// dropped and retained in the invalid-input report, never fatal.
	pub fn load(raw_addresses: &[String], origin: Origin) -> Self {
		let mut pool = Self::new();
		for raw in raw_addresses {
			match parse_candidate(raw, origin) {
				Ok(candidate) => pool.candidates.push(candidate),
				Err(_) => {
					warn!(address = %raw, "dropping unparseable nameserver address");
					pool.invalid.push(raw.clone());
				}
			}
		}
		pool
	}

	/// Add an already-built candidate (builtin lists, resolv.conf entries).
	pub fn push(&mut self, candidate: NameServerCandidate) {
		self.candidates.push(candidate);
	}

	pub fn candidates(&self) -> &[NameServerCandidate] {
		&self.candidates
	}

	pub fn candidates_mut(&mut self) -> &mut [NameServerCandidate] {
		&mut self.candidates
	}

	pub fn invalid(&self) -> &[String] {
		&self.invalid
	}

	pub fn into_parts(self) -> (Vec<NameServerCandidate>, Vec<String>) {
		(self.candidates, self.invalid)
	}

	/// Merge candidates sharing a resolved address. The first-seen entry
	/// keeps its label; later entries are marked as duplicates for
	/// reporting and take no further part in the session.
	pub fn deduplicate(&mut self) {
		let mut seen: Vec<SocketAddr> = Vec::new();
		for candidate in &mut self.candidates {
			if seen.contains(&candidate.addr) {
				debug!(addr = %candidate.addr, "duplicate candidate");
				candidate.status =
					HealthStatus::Failed(Anomaly::DuplicateOf(candidate.addr));
			} else {
				seen.push(candidate.addr);
			}
		}
	}

	/// Issue one lightweight query per untested candidate, concurrently,
	/// with a short timeout. Candidates that produce no response at all are
	/// marked unreachable and excluded from the more expensive diagnostics.
	///
	/// Returns the probe results for the session's raw log.
	pub async fn probe_reachability(
		&mut self,
		backend: &Arc<dyn QueryBackend>,
		probe: &TestQuery,
		config: &SessionConfig,
	) -> Vec<QueryResult> {
		let semaphore = Arc::new(Semaphore::new(config.probe_concurrency.max(1)));
		let mut handles = Vec::new();

		for (i, candidate) in self.candidates.iter().enumerate() {
			if candidate.status != HealthStatus::Untested {
				continue;
			}
			let sem = Arc::clone(&semaphore);
			let backend = Arc::clone(backend);
			let addr = candidate.addr;
			let probe = probe.clone();
			let timeout = config.probe_timeout;

			handles.push(tokio::spawn(async move {
				let _permit = sem.acquire().await.unwrap();
				let response = backend.query(addr, &probe, timeout).await;
				(i, addr, probe, response)
			}));
		}

		let mut log = Vec::new();
		for handle in handles {
			match handle.await {
				Ok((i, addr, probe, response)) => {
					if response.outcome == QueryOutcome::Timeout {
						debug!(addr = %addr, "no response to reachability probe");
						self.candidates[i].status = HealthStatus::Unreachable;
					}
					log.push(QueryResult {
						candidate: addr,
						query: probe,
						phase: QueryPhase::Probe,
						run_index: 0,
						duration: response.duration,
						outcome: response.outcome,
						answers: response.answers,
					});
				}
				Err(e) => warn!("reachability probe task failed: {}", e),
			}
		}
		log
	}
}

/// Well-known public nameservers used when the caller supplies none.
pub fn builtin_candidates() -> Vec<NameServerCandidate> {
	let entries: [(&str, SocketAddr); 4] = [
		("Cloudflare", "1.1.1.1:53".parse().unwrap()),
		("Google", "8.8.8.8:53".parse().unwrap()),
		("Quad9", "9.9.9.9:53".parse().unwrap()),
		("OpenDNS", "208.67.222.222:53".parse().unwrap()),
	];
	entries.into_iter()
		.map(|(label, addr)| {
			NameServerCandidate::new(addr, Some(label.to_string()), Origin::Builtin)
		})
		.collect()
}

/// Read candidate addresses from a file, one per line.
///
/// Blank lines and lines starting with '#' are skipped. Unparseable lines
/// are returned separately rather than treated as errors.
pub fn read_candidate_file(path: &str) -> Result<(Vec<NameServerCandidate>, Vec<String>)> {
	let content = std::fs::read_to_string(path)?;
	let mut candidates = Vec::new();
	let mut invalid = Vec::new();
	for line in content.lines() {
		let trimmed = line.trim();
		if trimmed.is_empty() || trimmed.starts_with('#') {
			continue;
		}
		match parse_candidate(trimmed, Origin::UserSupplied) {
			Ok(c) => candidates.push(c),
			Err(_) => invalid.push(trimmed.to_string()),
		}
	}
	Ok((candidates, invalid))
}

/// Read nameservers from /etc/resolv.conf.
///
/// Returns an empty vec if the file cannot be read. Entries are tagged
/// regional, being the nearest network's assigned resolvers.
pub fn system_candidates() -> Vec<NameServerCandidate> {
	let content = match std::fs::read_to_string("/etc/resolv.conf") {
		Ok(c) => c,
		Err(_) => return Vec::new(),
	};
	let mut candidates = Vec::new();
	for line in content.lines() {
		let trimmed = line.trim();
		if !trimmed.starts_with("nameserver") {
			continue;
		}
		let parts: Vec<&str> = trimmed.split_whitespace().collect();
		if parts.len() >= 2 {
			if let Ok(mut candidate) = parse_candidate(parts[1], Origin::Regional) {
				candidate.label = Some("system".to_string());
				candidates.push(candidate);
			}
		}
	}
	candidates
}
