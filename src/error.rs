use thiserror::Error;

/// Result alias used throughout the engine.
pub type Result<T> = std::result::Result<T, BenchError>;

/// Errors the engine can surface to a caller.
///
/// Per-query and per-candidate faults are never represented here; they are
/// recorded as data (`QueryOutcome` / `HealthStatus`) so that a misbehaving
/// nameserver cannot abort a session. Only conditions that leave the session
/// with nothing meaningful to do become errors.
#[derive(Debug, Error)]
pub enum BenchError {
	/// A candidate address string could not be parsed.
	#[error("invalid nameserver address '{0}'")]
	InvalidAddress(String),

	/// Every candidate ended unreachable, duplicated, or failed diagnostics.
	#[error("no eligible nameservers: every candidate was unreachable or failed health checks")]
	NoEligibleServers,

	/// The benchmark dataset contains no queries.
	#[error("empty query dataset")]
	EmptyDataset,

	/// A query backend could not be constructed.
	#[error("backend setup failed: {0}")]
	Backend(String),

	/// File I/O while loading candidate or hostname lists.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
}
