use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use hickory_proto::op::{Message, MessageType, Query, ResponseCode};
use hickory_proto::rr::{Name, RData, RecordType};

/// DNS record kind the engine queries for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RecordKind {
	A,
	Aaaa,
}

impl fmt::Display for RecordKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			RecordKind::A => write!(f, "A"),
			RecordKind::Aaaa => write!(f, "AAAA"),
		}
	}
}

/// What a well-behaved resolver is expected to do with a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expectation {
	/// A normal answer is expected (benchmark and probe queries).
	NormalAnswer,
	/// The name is reserved or random; NXDOMAIN is the honest response.
	NxDomain,
	/// The answer must fall inside a known address range.
	KnownAnswer,
}

/// One query from the test dataset or the diagnostic battery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestQuery {
	pub hostname: String,
	pub record: RecordKind,
	pub expect: Expectation,
}

impl TestQuery {
	/// Ordinary A-record benchmark query.
	pub fn normal(hostname: impl Into<String>) -> Self {
		Self {
			hostname: hostname.into(),
			record: RecordKind::A,
			expect: Expectation::NormalAnswer,
		}
	}
}

/// Classified outcome of a single query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOutcome {
	Answer,
	NxDomain,
	ServFail,
	Refused,
	Timeout,
	Malformed,
}

impl fmt::Display for QueryOutcome {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			QueryOutcome::Answer => "answer",
			QueryOutcome::NxDomain => "nxdomain",
			QueryOutcome::ServFail => "servfail",
			QueryOutcome::Refused => "refused",
			QueryOutcome::Timeout => "timeout",
			QueryOutcome::Malformed => "malformed",
		};
		write!(f, "{}", s)
	}
}

/// What a backend hands back for one query: outcome, measured duration,
/// and the address records from the answer section.
#[derive(Debug, Clone)]
pub struct WireResponse {
	pub outcome: QueryOutcome,
	pub duration: Duration,
	pub answers: Vec<IpAddr>,
}

impl WireResponse {
	pub fn timeout(duration: Duration) -> Self {
		Self {
			outcome: QueryOutcome::Timeout,
			duration,
			answers: Vec::new(),
		}
	}

	pub fn malformed(duration: Duration) -> Self {
		Self {
			outcome: QueryOutcome::Malformed,
			duration,
			answers: Vec::new(),
		}
	}
}

/// Which stage of the session produced a raw-log entry.
///
/// The reachability probe reuses the dataset's first query, so without this
/// tag a probe entry would be indistinguishable from the candidate's first
/// run-zero benchmark entry when reassembling the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryPhase {
	Probe,
	Health,
	Benchmark,
}

impl fmt::Display for QueryPhase {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			QueryPhase::Probe => "probe",
			QueryPhase::Health => "health",
			QueryPhase::Benchmark => "benchmark",
		};
		write!(f, "{}", s)
	}
}

/// One entry of the session's raw result log.
#[derive(Debug, Clone)]
pub struct QueryResult {
	pub candidate: SocketAddr,
	pub query: TestQuery,
	pub phase: QueryPhase,
	/// Benchmark run this entry belongs to; probe and health entries carry 0.
	pub run_index: u32,
	/// Always finite; timed-out queries carry the configured penalty value.
	pub duration: Duration,
	pub outcome: QueryOutcome,
	pub answers: Vec<IpAddr>,
}

/// Map a DNS response code onto an outcome classification.
pub(crate) fn outcome_for(rcode: ResponseCode) -> QueryOutcome {
	match rcode {
		ResponseCode::NoError => QueryOutcome::Answer,
		ResponseCode::NXDomain => QueryOutcome::NxDomain,
		ResponseCode::ServFail => QueryOutcome::ServFail,
		ResponseCode::Refused => QueryOutcome::Refused,
		// Anything else is not interpretable as a benchmark data point
		_ => QueryOutcome::Malformed,
	}
}

/// Why a received datagram could not be accepted as the response.
#[derive(Debug)]
pub(crate) enum ParseFailure {
	/// Transaction ID does not match; likely a stray datagram, worth another recv.
	TxidMismatch,
	/// The message itself cannot be interpreted.
	Malformed,
}

/// Address records and response code extracted from a parsed message.
#[derive(Debug)]
pub(crate) struct ParsedAnswer {
	pub rcode: ResponseCode,
	pub answers: Vec<IpAddr>,
}

/// Build a DNS query message, returning the serialized bytes.
pub(crate) fn build_query(
	hostname: &str,
	record: RecordKind,
	txid: u16,
) -> Result<Vec<u8>, String> {
	let name = Name::from_ascii(hostname)
		.map_err(|e| format!("invalid hostname '{}': {}", hostname, e))?;

	let record_type = match record {
		RecordKind::A => RecordType::A,
		RecordKind::Aaaa => RecordType::AAAA,
	};

	let mut message = Message::new();
	message.set_id(txid);
	message.set_recursion_desired(true);
	message.add_query(Query::query(name, record_type));

	message.to_vec()
		.map_err(|e| format!("failed to serialize query: {}", e))
}

/// Parse a DNS response, validating the transaction ID and collecting
/// address records from the answer section.
pub(crate) fn parse_response(
	bytes: &[u8],
	expected_txid: u16,
) -> Result<ParsedAnswer, ParseFailure> {
	let message = Message::from_vec(bytes).map_err(|_| ParseFailure::Malformed)?;

	if message.id() != expected_txid {
		return Err(ParseFailure::TxidMismatch);
	}
	if message.message_type() != MessageType::Response {
		return Err(ParseFailure::Malformed);
	}

	let answers = message.answers().iter()
		.filter_map(|r| match r.data() {
			RData::A(a) => Some(IpAddr::V4(a.0)),
			RData::AAAA(aaaa) => Some(IpAddr::V6(aaaa.0)),
			_ => None,
		})
		.collect();

	Ok(ParsedAnswer {
		rcode: message.response_code(),
		answers,
	})
}
