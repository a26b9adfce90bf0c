use crate::error::Result;
use crate::query::TestQuery;

/// Ordered reference hostname dataset for the timing benchmark.
#[derive(Debug, Clone)]
pub struct QueryDataset {
	queries: Vec<TestQuery>,
}

impl QueryDataset {
	pub fn new(queries: Vec<TestQuery>) -> Self {
		Self { queries }
	}

	/// Build a dataset of ordinary A-record queries from hostnames.
	pub fn from_hostnames(hostnames: &[String]) -> Self {
		Self::new(hostnames.iter().map(TestQuery::normal).collect())
	}

	pub fn len(&self) -> usize {
		self.queries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.queries.is_empty()
	}

	pub fn queries(&self) -> &[TestQuery] {
		&self.queries
	}

	/// The deterministic query sequence for one run: the dataset rotated by
	/// the run index. Every candidate in the same run therefore receives an
	/// identical ordered sequence, and successive runs shift which queries
	/// land first.
	pub fn run_sequence(&self, run: u32) -> Vec<TestQuery> {
		if self.queries.is_empty() {
			return Vec::new();
		}
		let start = (run as usize) % self.queries.len();
		let mut sequence = Vec::with_capacity(self.queries.len());
		sequence.extend_from_slice(&self.queries[start..]);
		sequence.extend_from_slice(&self.queries[..start]);
		sequence
	}
}

/// Popular hostnames likely to be cached by most resolvers.
pub fn default_hostnames() -> Vec<String> {
	vec![
		"google.com",
		"youtube.com",
		"facebook.com",
		"amazon.com",
		"wikipedia.org",
		"twitter.com",
		"reddit.com",
		"netflix.com",
		"microsoft.com",
		"apple.com",
	].into_iter().map(String::from).collect()
}

/// Read hostnames from a file, one per line.
///
/// Blank lines and lines starting with '#' are skipped.
pub fn read_hostname_file(path: &str) -> Result<Vec<String>> {
	let content = std::fs::read_to_string(path)?;
	let hostnames: Vec<String> = content.lines()
		.map(|line| line.trim().to_string())
		.filter(|line| !line.is_empty() && !line.starts_with('#'))
		.collect();
	Ok(hostnames)
}
