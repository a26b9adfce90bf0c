use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::backend::QueryBackend;
use crate::candidate::NameServerCandidate;
use crate::config::SessionConfig;
use crate::dataset::QueryDataset;
use crate::query::{QueryOutcome, QueryPhase, QueryResult};

/// Cooperative cancellation signal threaded through a session.
///
/// Cancelling stops the dispatch of new (candidate, run) units; units
/// already claimed by a worker finish normally, so a cancelled session
/// still yields a valid, smaller-than-requested result log.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
	flag: Arc<AtomicBool>,
}

impl Cancellation {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn cancel(&self) {
		self.flag.store(true, Ordering::SeqCst);
	}

	pub fn is_cancelled(&self) -> bool {
		self.flag.load(Ordering::SeqCst)
	}
}

/// Run the timing benchmark across all benchmarkable candidates.
///
/// Runs execute in order. Within a run, one task per candidate is gated by
/// a semaphore of the configured width; each task replays the run's query
/// sequence strictly sequentially so a candidate's timing trace is never
/// interleaved with its own other queries. Every candidate in the same run
/// receives the identical ordered sequence.
///
/// Timeouts are recorded with the configured penalty duration and are not
/// retried; they are data points.
pub async fn run_benchmark(
	candidates: &[NameServerCandidate],
	dataset: &QueryDataset,
	backend: &Arc<dyn QueryBackend>,
	config: &SessionConfig,
	cancel: &Cancellation,
) -> Vec<QueryResult> {
	let semaphore = Arc::new(Semaphore::new(config.concurrency.max(1)));
	let mut log: Vec<QueryResult> = Vec::new();

	let benchmarkable: Vec<&NameServerCandidate> = candidates.iter()
		.filter(|c| c.status.is_benchmarkable())
		.collect();
	info!(
		candidates = benchmarkable.len(),
		queries = dataset.len() * benchmarkable.len() * config.runs as usize,
		runs = config.runs,
		"starting benchmark",
	);

	for run in 0..config.runs {
		if cancel.is_cancelled() {
			debug!(run, "cancelled before run start");
			break;
		}
		let sequence = dataset.run_sequence(run);

		let mut handles = Vec::new();
		for candidate in &benchmarkable {
			let sem = Arc::clone(&semaphore);
			let backend = Arc::clone(backend);
			let cancel = cancel.clone();
			let sequence = sequence.clone();
			let addr = candidate.addr;
			let timeout = config.query_timeout;
			let penalty = config.timeout_penalty;

			handles.push(tokio::spawn(async move {
				let _permit = sem.acquire().await.unwrap();
				// Claimed after cancellation: drop the unit undone
				if cancel.is_cancelled() {
					return Vec::new();
				}
				let mut results = Vec::with_capacity(sequence.len());
				for query in &sequence {
					let response = backend.query(addr, query, timeout).await;
					let duration = if response.outcome == QueryOutcome::Timeout {
						penalty
					} else {
						response.duration
					};
					results.push(QueryResult {
						candidate: addr,
						query: query.clone(),
						phase: QueryPhase::Benchmark,
						run_index: run,
						duration,
						outcome: response.outcome,
						answers: response.answers,
					});
				}
				results
			}));
		}

		for handle in handles {
			match handle.await {
				Ok(mut results) => log.append(&mut results),
				Err(e) => warn!("benchmark task failed: {}", e),
			}
		}
	}

	log
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_cancellation_flag() {
		let cancel = Cancellation::new();
		assert!(!cancel.is_cancelled());
		let clone = cancel.clone();
		clone.cancel();
		// Clones share the flag
		assert!(cancel.is_cancelled());
	}
}
