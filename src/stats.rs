use std::collections::{BTreeMap, BTreeSet};
use std::net::{IpAddr, SocketAddr};

use crate::config::SessionConfig;
use crate::query::{Expectation, QueryOutcome, QueryResult, RecordKind};

/// Per-nameserver statistics reduced from the benchmark result log.
#[derive(Debug, Clone, PartialEq)]
pub struct NameServerStats {
	pub addr: SocketAddr,
	/// Best observed duration. Tie-breaker only; a single lucky response
	/// must not outrank consistent performance.
	pub min_ms: f64,
	/// Mean after dropping the slowest trim fraction of samples.
	pub trimmed_mean_ms: f64,
	/// Queries whose outcome did not satisfy their expectation.
	pub failures: usize,
	pub timeouts: usize,
	pub total: usize,
	/// Set when another candidate returned identical answers for the same
	/// query; indicates a shared upstream. Reported, not exclusionary.
	pub shared_answers: bool,
	/// Ranking score; lower is better.
	pub score: f64,
}

/// Calculate the arithmetic mean of a slice of values.
pub fn mean(values: &[f64]) -> Option<f64> {
	if values.is_empty() {
		return None;
	}
	let sum: f64 = values.iter().sum();
	Some(sum / values.len() as f64)
}

/// Mean after discarding the slowest `trim_fraction` of samples.
///
/// Dampens single-outlier skew without hiding systematic slowness: the
/// fraction is fixed, so a consistently slow server keeps most of its slow
/// samples. At least one sample is always retained.
pub fn trimmed_mean(values: &[f64], trim_fraction: f64) -> Option<f64> {
	if values.is_empty() {
		return None;
	}
	let mut sorted = values.to_vec();
	sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

	let dropped = ((sorted.len() as f64) * trim_fraction.clamp(0.0, 1.0)).floor() as usize;
	let kept = (sorted.len() - dropped).max(1);
	mean(&sorted[..kept])
}

/// Score formula: trimmed mean latency plus a per-failure penalty.
/// Lower is better.
pub fn score(trimmed_mean_ms: f64, failures: usize, penalty_weight: f64) -> f64 {
	trimmed_mean_ms + failures as f64 * penalty_weight
}

/// Whether a result counts as a failure: the outcome does not satisfy the
/// query's expected behavior.
fn is_failure(result: &QueryResult) -> bool {
	match (result.query.expect, result.outcome) {
		(Expectation::NxDomain, QueryOutcome::NxDomain) => false,
		(Expectation::NxDomain, _) => true,
		(_, QueryOutcome::Answer) => false,
		(_, _) => true,
	}
}

/// Reduce the benchmark result log into per-candidate statistics.
///
/// A pure reduction: grouping uses ordered maps and the output is sorted by
/// address, so aggregating the same log twice yields identical stats. Every
/// duration in the log is finite (timeouts carry the penalty constant), so
/// the latency figures are always computable.
pub fn aggregate(results: &[QueryResult], config: &SessionConfig) -> Vec<NameServerStats> {
	let mut groups: BTreeMap<SocketAddr, Vec<&QueryResult>> = BTreeMap::new();
	for result in results {
		groups.entry(result.candidate).or_default().push(result);
	}

	let shared = detect_shared_answers(results);

	groups.into_iter()
		.map(|(addr, entries)| {
			let samples: Vec<f64> = entries.iter()
				.map(|r| r.duration.as_secs_f64() * 1000.0)
				.collect();
			let min_ms = samples.iter().copied().fold(f64::INFINITY, f64::min);
			let trimmed = trimmed_mean(&samples, config.trim_fraction).unwrap_or(0.0);
			let failures = entries.iter().filter(|r| is_failure(r)).count();
			let timeouts = entries.iter()
				.filter(|r| r.outcome == QueryOutcome::Timeout)
				.count();

			NameServerStats {
				addr,
				min_ms,
				trimmed_mean_ms: trimmed,
				failures,
				timeouts,
				total: entries.len(),
				shared_answers: shared.contains(&addr),
				score: score(trimmed, failures, config.penalty_weight),
			}
		})
		.collect()
}

/// Find candidates that returned identical non-empty answer sets for the
/// same (query, run) as another candidate.
fn detect_shared_answers(results: &[QueryResult]) -> BTreeSet<SocketAddr> {
	type QueryKey = (String, RecordKind, u32);
	let mut by_query: BTreeMap<QueryKey, Vec<(SocketAddr, Vec<IpAddr>)>> = BTreeMap::new();

	for result in results {
		if result.outcome != QueryOutcome::Answer || result.answers.is_empty() {
			continue;
		}
		let key = (result.query.hostname.clone(), result.query.record, result.run_index);
		let mut answers = result.answers.clone();
		answers.sort();
		by_query.entry(key).or_default().push((result.candidate, answers));
	}

	let mut shared = BTreeSet::new();
	for entries in by_query.values() {
		for i in 0..entries.len() {
			for j in (i + 1)..entries.len() {
				let (addr_a, answers_a) = &entries[i];
				let (addr_b, answers_b) = &entries[j];
				if addr_a != addr_b && answers_a == answers_b {
					shared.insert(*addr_a);
					shared.insert(*addr_b);
				}
			}
		}
	}
	shared
}
