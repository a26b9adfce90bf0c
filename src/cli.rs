use clap::{Parser, ValueEnum};

/// Which resolver backend to benchmark with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Transport {
	Udp,
	Dot,
	Doh,
}

/// DNS nameserver benchmark and selection tool
#[derive(Parser, Debug)]
#[command(name = "nsbench")]
#[command(about = "Benchmark candidate DNS nameservers and select the fastest healthy subset")]
pub struct Cli {
	/// Nameserver address (repeatable, e.g. 1.1.1.1 or 1.1.1.1:53)
	#[arg(short = 'r', long = "nameserver")]
	pub nameservers: Vec<String>,

	/// File containing nameserver addresses (one per line)
	#[arg(short = 'f', long = "nameserver-file")]
	pub nameserver_file: Option<String>,

	/// Include nameservers from /etc/resolv.conf
	#[arg(long = "system")]
	pub system: bool,

	/// File containing benchmark hostnames (one per line)
	#[arg(long = "hostnames")]
	pub hostnames: Option<String>,

	/// Resolver transport to benchmark
	#[arg(long = "transport", value_enum, default_value = "udp")]
	pub transport: Transport,

	/// Number of benchmark runs
	#[arg(short = 'n', long = "runs", default_value = "3")]
	pub runs: u32,

	/// Per-query timeout in milliseconds
	#[arg(short = 't', long = "timeout", default_value = "1500")]
	pub timeout: u64,

	/// Maximum concurrently benchmarked (candidate, run) units
	#[arg(short = 'c', long = "concurrency", default_value = "40")]
	pub concurrency: usize,

	/// Health-check timeout in milliseconds
	#[arg(long = "health-timeout", default_value = "2000")]
	pub health_timeout: u64,

	/// Number of top nameservers to select
	#[arg(long = "top", default_value = "3")]
	pub top: usize,

	/// Fraction of slowest samples dropped from the trimmed mean
	#[arg(long = "trim", default_value = "0.1")]
	pub trim: f64,

	/// Score penalty in milliseconds per failed query
	#[arg(long = "penalty", default_value = "1000")]
	pub penalty: f64,

	/// Exclude wildcard-caching nameservers from the ranking
	#[arg(long = "strict")]
	pub strict: bool,

	/// Abort after this many seconds, keeping partial results
	#[arg(long = "deadline")]
	pub deadline: Option<u64>,

	/// Write the raw per-query result log to this CSV file
	#[arg(short = 'o', long = "output")]
	pub output: Option<String>,
}
