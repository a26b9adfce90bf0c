use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};

use anyhow::Result;

use nsbench::{SessionConfig, SessionReport};

/// Print a summary of the session configuration before running.
pub fn print_config_summary(candidate_count: usize, hostname_count: usize, config: &SessionConfig) {
	println!("DNS Nameserver Benchmark");
	println!("========================");
	println!("Candidates:     {}", candidate_count);
	println!("Hostnames:      {}", hostname_count);
	println!("Runs:           {}", config.runs);
	println!("Timeout:        {} ms", config.query_timeout.as_millis());
	println!("Concurrency:    {}", config.concurrency);
	println!("Top N:          {}", config.top_n);
	if config.strict {
		println!("Mode:           strict");
	}
	println!();
}

/// Print the ranked results as a formatted table, followed by the
/// candidates that were excluded before or during ranking.
pub fn print_report(report: &SessionReport) {
	let mut table = Table::new();
	table.load_preset(UTF8_FULL);
	table.set_content_arrangement(ContentArrangement::Dynamic);
	table.set_header(vec![
		"Rank", "Nameserver", "Status", "Score",
		"Trimmed mean", "Min", "Failures", "Selected",
	]);

	for (i, entry) in report.entries.iter().enumerate() {
		let s = &entry.stats;
		table.add_row(vec![
			format!("{}", i + 1),
			format!("{} ({})", entry.candidate.display_label(), entry.candidate.addr),
			format!("{}", entry.candidate.status),
			format!("{:.1}", s.score),
			format!("{:.1} ms", s.trimmed_mean_ms),
			format!("{:.1} ms", s.min_ms),
			format!("{}/{}", s.failures, s.total),
			if entry.selected { "yes".to_string() } else { "".to_string() },
		]);
	}
	println!("{table}");

	if !report.excluded.is_empty() {
		println!("\nExcluded:");
		for candidate in &report.excluded {
			println!("  {} ({}): {}", candidate.display_label(), candidate.addr, candidate.status);
		}
	}
	if !report.invalid.is_empty() {
		println!("\nInvalid addresses (dropped):");
		for raw in &report.invalid {
			println!("  {}", raw);
		}
	}
}

/// Write the raw per-query result log to a CSV file for auditing.
pub fn write_raw_log_csv(path: &str, report: &SessionReport) -> Result<()> {
	let mut writer = csv::Writer::from_path(path)?;
	writer.write_record([
		"candidate", "hostname", "record", "phase", "run", "duration_ms", "outcome", "answers",
	])?;

	for r in &report.raw_log {
		let answers = r.answers.iter()
			.map(|ip| ip.to_string())
			.collect::<Vec<_>>()
			.join(" ");
		writer.write_record([
			r.candidate.to_string(),
			r.query.hostname.clone(),
			r.query.record.to_string(),
			r.phase.to_string(),
			r.run_index.to_string(),
			format!("{:.2}", r.duration.as_secs_f64() * 1000.0),
			r.outcome.to_string(),
			answers,
		])?;
	}
	writer.flush()?;
	println!("Raw result log written to {}", path);
	Ok(())
}
