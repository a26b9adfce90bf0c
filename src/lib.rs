//! Benchmarking engine for pools of candidate DNS nameservers.
//!
//! The pipeline: a [`candidate::CandidatePool`] is deduplicated and screened
//! for reachability, the [`health`] battery flags hijacking, wildcard
//! caching, and censorship, the [`dispatch`] worker pool runs the timing
//! benchmark under bounded concurrency, [`stats`] reduces the raw result
//! log, and [`rank`] orders and selects the best-performing healthy subset.
//! [`session::BenchmarkSession`] drives the stages in sequence and threads a
//! cancellation signal through them.
//!
//! Network access goes through the [`backend::QueryBackend`] capability
//! trait, with plain UDP, DNS-over-TLS, and DNS-over-HTTPS implementations.

pub mod backend;
pub mod candidate;
pub mod config;
pub mod dataset;
pub mod dispatch;
pub mod error;
pub mod health;
pub mod query;
pub mod rank;
pub mod session;
pub mod stats;

pub use backend::{DohBackend, DotBackend, QueryBackend, UdpBackend};
pub use candidate::{Anomaly, CandidatePool, HealthStatus, NameServerCandidate, Origin};
pub use config::SessionConfig;
pub use dataset::QueryDataset;
pub use dispatch::Cancellation;
pub use error::{BenchError, Result};
pub use query::{
	Expectation, QueryOutcome, QueryPhase, QueryResult, RecordKind, TestQuery, WireResponse,
};
pub use rank::{RankedEntry, Ranking};
pub use session::{BenchmarkSession, SessionReport};
pub use stats::NameServerStats;
