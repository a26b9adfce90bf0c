use std::time::Duration;

/// Tunable parameters for one benchmark session.
///
/// Every component receives this explicitly; no configuration lives in
/// process-wide state. The scoring constants (`trim_fraction`,
/// `penalty_weight`, `failure_threshold`) are heuristics and deliberately
/// configurable rather than hard-coded.
#[derive(Debug, Clone)]
pub struct SessionConfig {
	/// Number of benchmark runs; each run replays the full dataset.
	pub runs: u32,
	/// Maximum concurrently benchmarked (candidate, run) units.
	pub concurrency: usize,
	/// Deadline for a single benchmark query.
	pub query_timeout: Duration,
	/// Finite duration recorded for a timed-out query. Keeps statistics
	/// computable; timeouts are data points, not retried.
	pub timeout_penalty: Duration,
	/// Deadline for the initial reachability probe.
	pub probe_timeout: Duration,
	/// Concurrency limit for reachability probing.
	pub probe_concurrency: usize,
	/// Deadline for a single health-check query.
	pub health_timeout: Duration,
	/// Retries after a health-check timeout before the check counts as failed.
	pub health_retries: u32,
	/// Concurrency limit for the health-check battery.
	pub health_concurrency: usize,
	/// Fraction of the slowest samples dropped from the trimmed mean.
	pub trim_fraction: f64,
	/// Score penalty, in milliseconds, added per failed query.
	pub penalty_weight: f64,
	/// Benchmark failure rate above which a candidate is marked failed.
	pub failure_threshold: f64,
	/// Number of top-ranked candidates to select.
	pub top_n: usize,
	/// Exclude wildcard-caching (warned) candidates from the ranking.
	pub strict: bool,
	/// Optional wall-clock budget after which the session cancels itself.
	pub deadline: Option<Duration>,
}

impl Default for SessionConfig {
	fn default() -> Self {
		Self {
			runs: 3,
			concurrency: 40,
			query_timeout: Duration::from_millis(1500),
			timeout_penalty: Duration::from_millis(2000),
			probe_timeout: Duration::from_millis(500),
			probe_concurrency: 32,
			health_timeout: Duration::from_millis(2000),
			health_retries: 1,
			health_concurrency: 16,
			trim_fraction: 0.1,
			penalty_weight: 1000.0,
			failure_threshold: 0.5,
			top_n: 3,
			strict: false,
			deadline: None,
		}
	}
}
