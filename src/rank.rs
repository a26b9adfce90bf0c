use std::collections::BTreeMap;
use std::net::SocketAddr;

use crate::candidate::{HealthStatus, NameServerCandidate};
use crate::config::SessionConfig;
use crate::stats::NameServerStats;

/// One ranked candidate with its statistics and selection flag.
#[derive(Debug, Clone)]
pub struct RankedEntry {
	pub candidate: NameServerCandidate,
	pub stats: NameServerStats,
	pub selected: bool,
}

/// The ordered ranking plus the selection boundary, so consumers can render
/// "selected" versus "also tested".
#[derive(Debug, Clone)]
pub struct Ranking {
	pub entries: Vec<RankedEntry>,
	pub cutoff: usize,
}

impl Ranking {
	pub fn selected(&self) -> &[RankedEntry] {
		&self.entries[..self.cutoff]
	}
}

/// Order eligible candidates and select the top N.
///
/// Failed candidates never enter the ranking, regardless of raw latency;
/// warned (wildcard-caching) candidates are excluded only in strict mode.
/// Sort order: score ascending, then minimum duration, then failure count,
/// then address, so the ranking is fully deterministic.
pub fn rank(
	candidates: &[NameServerCandidate],
	stats: Vec<NameServerStats>,
	config: &SessionConfig,
) -> Ranking {
	let by_addr: BTreeMap<SocketAddr, &NameServerCandidate> = candidates.iter()
		.map(|c| (c.addr, c))
		.collect();

	let mut entries: Vec<RankedEntry> = stats.into_iter()
		.filter_map(|stats| {
			let candidate = *by_addr.get(&stats.addr)?;
			match &candidate.status {
				HealthStatus::Failed(_) => None,
				HealthStatus::Warning(_) if config.strict => None,
				_ => Some(RankedEntry {
					candidate: candidate.clone(),
					stats,
					selected: false,
				}),
			}
		})
		.collect();

	entries.sort_by(|a, b| {
		a.stats.score.partial_cmp(&b.stats.score)
			.unwrap_or(std::cmp::Ordering::Equal)
			.then_with(|| {
				a.stats.min_ms.partial_cmp(&b.stats.min_ms)
					.unwrap_or(std::cmp::Ordering::Equal)
			})
			.then_with(|| a.stats.failures.cmp(&b.stats.failures))
			.then_with(|| a.candidate.addr.cmp(&b.candidate.addr))
	});

	let cutoff = config.top_n.min(entries.len());
	for entry in entries.iter_mut().take(cutoff) {
		entry.selected = true;
	}

	Ranking { entries, cutoff }
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::candidate::{Anomaly, Origin};

	fn candidate(addr: &str, status: HealthStatus) -> NameServerCandidate {
		let mut c = NameServerCandidate::new(
			addr.parse().unwrap(),
			None,
			Origin::UserSupplied,
		);
		c.status = status;
		c
	}

	fn stats(addr: &str, score: f64, min_ms: f64, failures: usize) -> NameServerStats {
		NameServerStats {
			addr: addr.parse().unwrap(),
			min_ms,
			trimmed_mean_ms: score,
			failures,
			timeouts: 0,
			total: 10,
			shared_answers: false,
			score,
		}
	}

	#[test]
	fn test_rank_orders_by_score() {
		let candidates = vec![
			candidate("1.1.1.1:53", HealthStatus::Healthy),
			candidate("8.8.8.8:53", HealthStatus::Healthy),
			candidate("9.9.9.9:53", HealthStatus::Healthy),
		];
		let stats = vec![
			stats("1.1.1.1:53", 30.0, 25.0, 0),
			stats("8.8.8.8:53", 10.0, 8.0, 0),
			stats("9.9.9.9:53", 20.0, 15.0, 0),
		];
		let config = SessionConfig { top_n: 2, ..SessionConfig::default() };
		let ranking = rank(&candidates, stats, &config);

		let order: Vec<String> = ranking.entries.iter()
			.map(|e| e.candidate.addr.to_string())
			.collect();
		assert_eq!(order, vec!["8.8.8.8:53", "9.9.9.9:53", "1.1.1.1:53"]);
		assert_eq!(ranking.cutoff, 2);
		assert!(ranking.entries[0].selected);
		assert!(ranking.entries[1].selected);
		assert!(!ranking.entries[2].selected);
	}

	#[test]
	fn test_failed_excluded_despite_best_score() {
		let candidates = vec![
			candidate("1.1.1.1:53", HealthStatus::Failed(Anomaly::Hijack)),
			candidate("8.8.8.8:53", HealthStatus::Healthy),
		];
		let stats = vec![
			stats("1.1.1.1:53", 1.0, 1.0, 0),
			stats("8.8.8.8:53", 50.0, 40.0, 0),
		];
		let ranking = rank(&candidates, stats, &SessionConfig::default());

		assert_eq!(ranking.entries.len(), 1);
		assert_eq!(ranking.entries[0].candidate.addr.to_string(), "8.8.8.8:53");
	}

	#[test]
	fn test_warning_kept_unless_strict() {
		let candidates = vec![
			candidate("1.1.1.1:53", HealthStatus::Warning(Anomaly::WildcardCaching)),
		];
		let stats_vec = vec![stats("1.1.1.1:53", 10.0, 8.0, 0)];

		let lenient = SessionConfig::default();
		assert_eq!(rank(&candidates, stats_vec.clone(), &lenient).entries.len(), 1);

		let strict = SessionConfig { strict: true, ..SessionConfig::default() };
		assert!(rank(&candidates, stats_vec, &strict).entries.is_empty());
	}

	#[test]
	fn test_tie_breaking_full_chain() {
		// Equal scores: min duration decides; equal again: failures; then address
		let candidates = vec![
			candidate("8.8.8.8:53", HealthStatus::Healthy),
			candidate("1.1.1.1:53", HealthStatus::Healthy),
			candidate("9.9.9.9:53", HealthStatus::Healthy),
		];
		let stats = vec![
			stats("8.8.8.8:53", 20.0, 5.0, 1),
			stats("1.1.1.1:53", 20.0, 5.0, 1),
			stats("9.9.9.9:53", 20.0, 4.0, 2),
		];
		let ranking = rank(&candidates, stats, &SessionConfig::default());

		let order: Vec<String> = ranking.entries.iter()
			.map(|e| e.candidate.addr.to_string())
			.collect();
		// 9.9.9.9 has the lowest min; 1.1.1.1 beats 8.8.8.8 on address
		assert_eq!(order, vec!["9.9.9.9:53", "1.1.1.1:53", "8.8.8.8:53"]);
	}

	#[test]
	fn test_top_n_larger_than_pool() {
		let candidates = vec![candidate("1.1.1.1:53", HealthStatus::Healthy)];
		let stats_vec = vec![stats("1.1.1.1:53", 10.0, 8.0, 0)];
		let config = SessionConfig { top_n: 10, ..SessionConfig::default() };
		let ranking = rank(&candidates, stats_vec, &config);
		assert_eq!(ranking.cutoff, 1);
		assert_eq!(ranking.selected().len(), 1);
	}
}
