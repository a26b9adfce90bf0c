use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{debug, info};

use crate::backend::QueryBackend;
use crate::candidate::{Anomaly, CandidatePool, HealthStatus, NameServerCandidate};
use crate::config::SessionConfig;
use crate::dataset::QueryDataset;
use crate::dispatch::{self, Cancellation};
use crate::error::{BenchError, Result};
use crate::health;
use crate::query::QueryResult;
use crate::rank::{self, RankedEntry};
use crate::stats::{self, NameServerStats};

/// Everything a session hands to reporting consumers.
#[derive(Debug)]
pub struct SessionReport {
	/// Eligible candidates in ranked order; the first `cutoff` are selected.
	pub entries: Vec<RankedEntry>,
	pub cutoff: usize,
	/// Candidates that did not enter the ranking, with their final statuses.
	pub excluded: Vec<NameServerCandidate>,
	/// Every query result produced: probes, diagnostics, and benchmark runs.
	pub raw_log: Vec<QueryResult>,
	/// Input strings that could not be parsed as nameserver addresses.
	pub invalid: Vec<String>,
}

impl SessionReport {
	pub fn selected(&self) -> &[RankedEntry] {
		&self.entries[..self.cutoff]
	}
}

/// The aggregate root: owns the configuration, dataset, backend handle, and
/// cancellation signal for one benchmark pass, and drives the five stages
/// in sequence. Nothing survives a session; a new pool means a new session.
pub struct BenchmarkSession {
	config: SessionConfig,
	dataset: QueryDataset,
	backend: Arc<dyn QueryBackend>,
	cancel: Cancellation,
}

impl BenchmarkSession {
	pub fn new(
		config: SessionConfig,
		dataset: QueryDataset,
		backend: Arc<dyn QueryBackend>,
	) -> Self {
		Self {
			config,
			dataset,
			backend,
			cancel: Cancellation::new(),
		}
	}

	/// Use an externally owned cancellation signal instead of the
	/// session's own.
	pub fn with_cancellation(mut self, cancel: Cancellation) -> Self {
		self.cancel = cancel;
		self
	}

	/// Handle for aborting the session from elsewhere. Cancellation yields
	/// a successful partial report, never an error.
	pub fn cancellation(&self) -> Cancellation {
		self.cancel.clone()
	}

	pub fn config(&self) -> &SessionConfig {
		&self.config
	}

	/// Run the full pipeline: dedup, reachability probe, health checks,
	/// benchmark, aggregation, threshold reclassification, ranking.
	pub async fn run(&self, pool: CandidatePool) -> Result<SessionReport> {
		let timer = self.config.deadline.map(|deadline| {
			let cancel = self.cancel.clone();
			tokio::spawn(async move {
				tokio::time::sleep(deadline).await;
				debug!("session deadline reached, cancelling");
				cancel.cancel();
			})
		});

		let result = self.run_stages(pool).await;

		// A finished session must not fire a stale cancellation later
		if let Some(timer) = timer {
			timer.abort();
		}
		result
	}

	async fn run_stages(&self, mut pool: CandidatePool) -> Result<SessionReport> {
		if self.dataset.is_empty() {
			return Err(BenchError::EmptyDataset);
		}

		pool.deduplicate();

		let mut raw_log: Vec<QueryResult> = Vec::new();

		// Cheap reachability screen bounds wasted work before diagnostics
		let probe = self.dataset.queries()[0].clone();
		let probe_log = pool
			.probe_reachability(&self.backend, &probe, &self.config)
			.await;
		raw_log.extend(probe_log);

		let health_log =
			health::run_health_checks(pool.candidates_mut(), &self.backend, &self.config).await;
		raw_log.extend(health_log);

		let benchmarkable: Vec<NameServerCandidate> = pool.candidates().iter()
			.filter(|c| c.status.is_benchmarkable())
			.cloned()
			.collect();
		if benchmarkable.is_empty() {
			return Err(BenchError::NoEligibleServers);
		}
		info!(eligible = benchmarkable.len(), "health checks passed");

		let bench_log = dispatch::run_benchmark(
			&benchmarkable,
			&self.dataset,
			&self.backend,
			&self.config,
			&self.cancel,
		).await;

		let stats = stats::aggregate(&bench_log, &self.config);
		raw_log.extend(bench_log);

		let (mut candidates, invalid) = pool.into_parts();
		apply_failure_threshold(&mut candidates, &stats, &self.config);

		let ranking = rank::rank(&candidates, stats, &self.config);

		let ranked_addrs: BTreeSet<SocketAddr> = ranking.entries.iter()
			.map(|e| e.candidate.addr)
			.collect();
		let excluded: Vec<NameServerCandidate> = candidates.into_iter()
			.filter(|c| !ranked_addrs.contains(&c.addr))
			.collect();

		Ok(SessionReport {
			entries: ranking.entries,
			cutoff: ranking.cutoff,
			excluded,
			raw_log,
			invalid,
		})
	}
}

/// Reclassify benchmarked candidates whose failure rate exceeded the
/// configured threshold. They keep their statistics in the raw log but are
/// barred from selection.
fn apply_failure_threshold(
	candidates: &mut [NameServerCandidate],
	stats: &[NameServerStats],
	config: &SessionConfig,
) {
	for s in stats {
		if s.total == 0 {
			continue;
		}
		let rate = s.failures as f64 / s.total as f64;
		if rate <= config.failure_threshold {
			continue;
		}
		if let Some(candidate) = candidates.iter_mut().find(|c| c.addr == s.addr) {
			if candidate.status.is_benchmarkable() {
				// Attribute to whichever fault dominated
				let anomaly = if s.timeouts * 2 >= s.failures {
					Anomaly::Timeout
				} else {
					Anomaly::Malformed
				};
				info!(
					addr = %candidate.addr,
					failures = s.failures,
					total = s.total,
					"failure rate over threshold",
				);
				candidate.status = HealthStatus::Failed(anomaly);
			}
		}
	}
}
