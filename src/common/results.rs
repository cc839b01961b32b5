//! Row-oriented result file shared with the plotting and analysis scripts.
//!
//! One comma-separated line per scenario and policy, preceded by a `#` header
//! the first time the file is written. Field order and the underscore-joined
//! SF histogram are a stable contract.

use anyhow::Context;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use crate::common::config::SimulationConfig;
use crate::simulation::metrics::RunStatistics;
use crate::simulation::network::ScenarioType;

pub const RESULT_HEADER: &str =
    "#seed, collType, nodes, rate, size, sent, coll, lost, lostErr, noAck, ackLost, time, DER1, DER2, Energy, Fair, SFs, Type";

const FIELD_COUNT: usize = 18;

/// Error type for result lines that cannot be read back.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultParseError {
    FieldCount(usize),
    InvalidField { name: &'static str, value: String },
}

impl std::fmt::Display for ResultParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResultParseError::FieldCount(n) => write!(f, "Expected {} fields, found {}", FIELD_COUNT, n),
            ResultParseError::InvalidField { name, value } => write!(f, "Invalid value for {}: '{}'", name, value),
        }
    }
}

impl std::error::Error for ResultParseError {}

/// One line of the result file.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRecord {
    pub seed: u64,
    pub collision_model: u8,
    pub nodes: usize,
    pub send_rate: f64,
    pub payload_size: u32,
    pub sent: u64,
    pub collisions: u64,
    pub lost: u64,
    pub lost_error: u64,
    pub no_ack: u64,
    pub ack_lost: u64,
    pub sim_time: f64,
    pub der1: f64,
    pub der2: f64,
    pub energy: f64,
    pub fairness: f64,
    pub sf_histogram: [usize; 6],
    pub scenario: String,
}

impl ResultRecord {
    pub fn from_run(config: &SimulationConfig, stats: &RunStatistics, scenario: ScenarioType) -> Self {
        let params = &config.simulation_params;
        Self {
            seed: params.rnd_seed,
            collision_model: params.full_collision_model.code(),
            nodes: stats.nodes,
            send_rate: params.avg_send_time,
            payload_size: params.data_size,
            sent: stats.sent,
            collisions: stats.counters.collisions,
            lost: stats.counters.lost,
            lost_error: stats.counters.lost_error,
            no_ack: stats.counters.no_ack,
            ack_lost: stats.counters.ack_lost,
            sim_time: stats.sim_time,
            der1: stats.der1,
            der2: stats.der2,
            energy: stats.energy,
            fairness: stats.fairness,
            sf_histogram: stats.sf_histogram,
            scenario: scenario.label().to_string(),
        }
    }

    /// Parse a data line written by `Display`.
    pub fn parse(line: &str) -> Result<Self, ResultParseError> {
        let fields: Vec<&str> = line.trim().split(',').map(str::trim).collect();
        if fields.len() != FIELD_COUNT {
            return Err(ResultParseError::FieldCount(fields.len()));
        }

        Ok(Self {
            seed: parse_field(fields[0], "seed")?,
            collision_model: parse_field(fields[1], "collType")?,
            nodes: parse_field(fields[2], "nodes")?,
            send_rate: parse_field(fields[3], "rate")?,
            payload_size: parse_field(fields[4], "size")?,
            sent: parse_field(fields[5], "sent")?,
            collisions: parse_field(fields[6], "coll")?,
            lost: parse_field(fields[7], "lost")?,
            lost_error: parse_field(fields[8], "lostErr")?,
            no_ack: parse_field(fields[9], "noAck")?,
            ack_lost: parse_field(fields[10], "ackLost")?,
            sim_time: parse_field(fields[11], "time")?,
            der1: parse_field(fields[12], "DER1")?,
            der2: parse_field(fields[13], "DER2")?,
            energy: parse_field(fields[14], "Energy")?,
            fairness: parse_field(fields[15], "Fair")?,
            sf_histogram: parse_sf_histogram(fields[16])?,
            scenario: fields[17].to_string(),
        })
    }
}

impl std::fmt::Display for ResultRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let line = format!(
            "{}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {:.4}, {:.4}, {:.4}, {:.4}, {}, {}",
            self.seed,
            self.collision_model,
            self.nodes,
            self.send_rate,
            self.payload_size,
            self.sent,
            self.collisions,
            self.lost,
            self.lost_error,
            self.no_ack,
            self.ack_lost,
            self.sim_time,
            self.der1,
            self.der2,
            self.energy,
            self.fairness,
            format_sf_histogram(&self.sf_histogram),
            self.scenario
        );
        f.write_str(&sanitize(&line))
    }
}

/// SF7..SF12 node counts joined by underscores.
pub fn format_sf_histogram(histogram: &[usize; 6]) -> String {
    histogram.iter().map(|c| c.to_string()).collect::<Vec<_>>().join("_")
}

pub fn parse_sf_histogram(field: &str) -> Result<[usize; 6], ResultParseError> {
    let invalid = || ResultParseError::InvalidField {
        name: "SFs",
        value: field.to_string(),
    };

    let mut histogram = [0usize; 6];
    let mut parts = field.trim().split('_');
    for slot in histogram.iter_mut() {
        *slot = parts.next().and_then(|p| p.parse().ok()).ok_or_else(invalid)?;
    }
    if parts.next().is_some() {
        return Err(invalid());
    }
    Ok(histogram)
}

/// Append a record, writing the header first when the file does not exist yet.
///
/// Missing parent directories are created.
pub fn append_record(path: &Path, record: &ResultRecord) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let write_header = !path.is_file();
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open result file: {}", path.display()))?;

    if write_header {
        writeln!(file, "{}", RESULT_HEADER)?;
    }
    writeln!(file, "{}", record).with_context(|| format!("Failed to write result file: {}", path.display()))?;
    log::info!("Results saved to {}", path.display());
    Ok(())
}

/// Read every data line of a result file, skipping the header.
pub fn read_results(path: &Path) -> anyhow::Result<Vec<ResultRecord>> {
    let contents = fs::read_to_string(path).with_context(|| format!("Failed to read result file: {}", path.display()))?;
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty() && !line.starts_with('#'))
        .map(|(i, line)| {
            ResultRecord::parse(line).with_context(|| format!("{}:{}: malformed result line", path.display(), i + 1))
        })
        .collect()
}

/// Remove a previous result file so the next append starts with a header.
pub fn reset_results(path: &Path) -> anyhow::Result<()> {
    if path.exists() {
        fs::remove_file(path).with_context(|| format!("Failed to remove old result file: {}", path.display()))?;
        log::debug!("Removed previous result file {}", path.display());
    }
    Ok(())
}

fn parse_field<T: std::str::FromStr>(value: &str, name: &'static str) -> Result<T, ResultParseError> {
    value.parse().map_err(|_| ResultParseError::InvalidField {
        name,
        value: value.to_string(),
    })
}

/// Keep only characters the analysis scripts accept in a result line.
fn sanitize(line: &str) -> String {
    line.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '#' | ' ' | '.' | ',' | '"' | '_'))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::config::tests::sample_config;
    use crate::simulation::metrics::GlobalCounters;

    fn record() -> ResultRecord {
        ResultRecord {
            seed: 42,
            collision_model: 2,
            nodes: 10,
            send_rate: 1000.0,
            payload_size: 20,
            sent: 12,
            collisions: 2,
            lost: 1,
            lost_error: 0,
            no_ack: 1,
            ack_lost: 0,
            sim_time: 86400.0,
            der1: 8.0 / 12.0,
            der2: 8.0 / 12.0,
            energy: 1.23456,
            fairness: 0.9,
            sf_histogram: [3, 2, 1, 0, 4, 0],
            scenario: "BASE".to_string(),
        }
    }

    #[test]
    fn formats_contract_line() {
        assert_eq!(
            record().to_string(),
            "42, 2, 10, 1000, 20, 12, 2, 1, 0, 1, 0, 86400, 0.6667, 0.6667, 1.2346, 0.9000, 3_2_1_0_4_0, BASE"
        );
        assert_eq!(RESULT_HEADER.split(',').count(), FIELD_COUNT);
    }

    #[test]
    fn sf_histogram_survives_a_written_line() {
        let original = record();
        let parsed = ResultRecord::parse(&original.to_string()).unwrap();
        assert_eq!(parsed.sf_histogram, original.sf_histogram);
        assert_eq!(parsed.sent, original.sent);
        assert_eq!(parsed.scenario, "BASE");
        assert!((parsed.der1 - 0.6667).abs() < 1e-12);
    }

    #[test]
    fn malformed_histograms_are_rejected() {
        assert!(parse_sf_histogram("1_2_3_4_5").is_err());
        assert!(parse_sf_histogram("1_2_3_4_5_6_7").is_err());
        assert!(parse_sf_histogram("1_2_x_4_5_6").is_err());
        assert_eq!(parse_sf_histogram("0_0_0_0_0_10").unwrap(), [0, 0, 0, 0, 0, 10]);
        assert_eq!(ResultRecord::parse("1, 2, 3"), Err(ResultParseError::FieldCount(3)));
    }

    #[test]
    fn header_is_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("results.dat");

        append_record(&path, &record()).unwrap();
        let mut modified = record();
        modified.scenario = "MODIFIED".to_string();
        append_record(&path, &modified).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], RESULT_HEADER);
        assert!(lines[1].ends_with("BASE"));
        assert!(lines[2].ends_with("MODIFIED"));
    }

    #[test]
    fn written_file_reads_back_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.dat");
        append_record(&path, &record()).unwrap();
        let mut modified = record();
        modified.scenario = "MODIFIED".to_string();
        modified.sf_histogram = [10, 0, 0, 0, 0, 0];
        append_record(&path, &modified).unwrap();

        let records = read_results(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].scenario, "BASE");
        assert_eq!(records[1].sf_histogram, [10, 0, 0, 0, 0, 0]);

        fs::write(&path, format!("{}\n1, 2, 3\n", RESULT_HEADER)).unwrap();
        let err = read_results(&path).unwrap_err();
        assert!(format!("{:#}", err).contains(":2: malformed result line"));
    }

    #[test]
    fn reset_removes_previous_results() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.dat");
        reset_results(&path).unwrap();
        append_record(&path, &record()).unwrap();
        reset_results(&path).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn record_from_run_statistics() {
        let config = sample_config();
        let stats = RunStatistics {
            nodes: 10,
            sent: 5,
            counters: GlobalCounters {
                received: 4,
                no_ack: 1,
                ..GlobalCounters::default()
            },
            sim_time: 86400.0,
            der1: 0.8,
            der2: 0.8,
            energy: 0.5,
            fairness: 1.0,
            throughput: 0.01,
            sf_histogram: [10, 0, 0, 0, 0, 0],
        };
        let record = ResultRecord::from_run(&config, &stats, ScenarioType::Modified);
        assert_eq!(record.seed, 42);
        assert_eq!(record.collision_model, 2);
        assert_eq!(record.no_ack, 1);
        assert!(record.to_string().ends_with("10_0_0_0_0_0, MODIFIED"));
    }
}
