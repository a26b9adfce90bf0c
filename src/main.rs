mod cli;
mod output;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use nsbench::{
	candidate, dataset, BenchmarkSession, CandidatePool, DohBackend, DotBackend,
	QueryBackend, QueryDataset, SessionConfig, UdpBackend,
};

use crate::cli::{Cli, Transport};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
		.init();

	let cli = Cli::parse();

	// Collect candidates from all sources
	let mut pool = CandidatePool::load(&cli.nameservers, nsbench::Origin::UserSupplied);

	if let Some(path) = &cli.nameserver_file {
		let (candidates, invalid) = candidate::read_candidate_file(path)?;
		for c in candidates {
			pool.push(c);
		}
		for raw in invalid {
			eprintln!("Warning: skipping invalid address '{}'", raw);
		}
	}

	if cli.system {
		for c in candidate::system_candidates() {
			pool.push(c);
		}
	}

	// Fall back to the builtin list if no candidates were supplied
	if pool.candidates().is_empty() {
		for c in candidate::builtin_candidates() {
			pool.push(c);
		}
	}

	let hostnames = match &cli.hostnames {
		Some(path) => dataset::read_hostname_file(path)?,
		None => dataset::default_hostnames(),
	};
	let dataset = QueryDataset::from_hostnames(&hostnames);

	let config = SessionConfig {
		runs: cli.runs,
		concurrency: cli.concurrency,
		query_timeout: Duration::from_millis(cli.timeout),
		health_timeout: Duration::from_millis(cli.health_timeout),
		trim_fraction: cli.trim,
		penalty_weight: cli.penalty,
		top_n: cli.top,
		strict: cli.strict,
		deadline: cli.deadline.map(Duration::from_secs),
		..SessionConfig::default()
	};

	let backend: Arc<dyn QueryBackend> = match cli.transport {
		Transport::Udp => Arc::new(UdpBackend),
		Transport::Dot => Arc::new(DotBackend::new()),
		Transport::Doh => Arc::new(DohBackend::new()?),
	};

	output::print_config_summary(pool.candidates().len(), hostnames.len(), &config);

	let session = BenchmarkSession::new(config, dataset, backend);
	let report = session.run(pool).await?;

	output::print_report(&report);

	if let Some(path) = &cli.output {
		output::write_raw_log_csv(path, &report)?;
	}

	Ok(())
}
