//! Experiment configuration loading and validation.
//!
//! The configuration is a structured key/value document with upper-case section
//! and field names. JSON is the default format; files ending in `.toml` are
//! parsed as TOML instead. Optional sections fall back to the built-in radio
//! constants.

use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use super::radio_tables::RadioTables;
use crate::simulation::signal_calculations::PathLossParameters;
use crate::simulation::types::CollisionModel;

/// Error type for configuration loading failures.
#[derive(Debug)]
pub enum ConfigLoadError {
    FileReadError(String),
    ParseError(String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigLoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigLoadError::FileReadError(msg) => write!(f, "Failed to read file: {}", msg),
            ConfigLoadError::ParseError(msg) => write!(f, "Failed to parse configuration: {}", msg),
            ConfigLoadError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigLoadError {}

/// Root structure of an experiment configuration file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct SimulationConfig {
    /// Node counts to simulate, in order.
    pub node_scenarios: Vec<usize>,
    pub simulation_params: SimulationParams,
    pub experiment_control: ExperimentControl,
    pub adr_plus_plus: AdrConfig,
    /// Optional override of the receiver sensitivity/isolation tables.
    #[serde(default)]
    pub radio_tables: RadioTables,
    /// Optional override of the propagation model constants.
    #[serde(default)]
    pub path_loss_parameters: PathLossParameters,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct SimulationParams {
    /// Node count for a single run; replaced per scenario by the experiment driver.
    pub nr_nodes: usize,
    /// Mean inter-send interval in seconds.
    pub avg_send_time: f64,
    /// Application payload bytes per packet, for every spreading factor.
    pub data_size: u32,
    pub rnd_seed: u64,
    pub full_collision_model: CollisionModel,
    /// Initial per-node payload buffer in bytes. Defaults to `DATA_SIZE`.
    #[serde(default)]
    pub buffer_size: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ExperimentControl {
    /// Maximum number of packets the base station can demodulate at once.
    pub max_bs_receives: usize,
    /// Simulated duration limit in seconds.
    pub simulation_time: f64,
    /// Row-oriented result file that records are appended to.
    pub output_filename: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AdrConfig {
    pub enabled: bool,
    /// Controller period in seconds.
    pub adr_check_interval: f64,
    /// Success ratio (0..1) separating reward from penalty.
    pub efficiency_threshold: f64,
}

impl SimulationParams {
    /// Initial node buffer in bytes.
    pub fn initial_buffer(&self) -> f64 {
        self.buffer_size.unwrap_or(self.data_size as f64)
    }
}

/// Load, parse and validate a configuration file.
///
/// # Parameters
///
/// * `path` - Path to a `.json` or `.toml` configuration file
///
/// # Returns
///
/// The validated configuration or a `ConfigLoadError` describing the first problem found.
pub fn load_config(path: &Path) -> Result<SimulationConfig, ConfigLoadError> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))
        .map_err(|e| ConfigLoadError::FileReadError(e.to_string()))?;

    let is_toml = path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let config = parse_config(&data, is_toml)?;

    validate_config(&config).map_err(ConfigLoadError::ValidationError)?;

    Ok(config)
}

fn parse_config(data: &str, is_toml: bool) -> Result<SimulationConfig, ConfigLoadError> {
    if is_toml {
        toml::from_str(data)
            .context("Invalid TOML format")
            .map_err(|e| ConfigLoadError::ParseError(format!("{:#}", e)))
    } else {
        serde_json::from_str(data)
            .context("Invalid JSON format")
            .map_err(|e| ConfigLoadError::ParseError(format!("{:#}", e)))
    }
}

/// Validate a parsed configuration.
///
/// Checks that every numeric parameter is usable by the engine: positive
/// durations, a non-empty scenario list, a threshold inside 0..1, a non-zero
/// base-station capacity and sane propagation constants.
pub fn validate_config(config: &SimulationConfig) -> Result<(), String> {
    if config.node_scenarios.is_empty() {
        return Err("NODE_SCENARIOS must contain at least one node count".to_string());
    }
    if let Some(idx) = config.node_scenarios.iter().position(|&n| n == 0) {
        return Err(format!("NODE_SCENARIOS[{}] must be a positive node count", idx));
    }

    let params = &config.simulation_params;
    if params.nr_nodes == 0 {
        return Err("SIMULATION_PARAMS.NR_NODES must be positive".to_string());
    }
    if !(params.avg_send_time.is_finite() && params.avg_send_time > 0.0) {
        return Err(format!("SIMULATION_PARAMS.AVG_SEND_TIME {} must be positive", params.avg_send_time));
    }
    if params.data_size == 0 {
        return Err("SIMULATION_PARAMS.DATA_SIZE must be at least 1 byte".to_string());
    }
    if let Some(buffer) = params.buffer_size {
        if !(buffer.is_finite() && buffer > 0.0) {
            return Err(format!("SIMULATION_PARAMS.BUFFER_SIZE {} must be positive", buffer));
        }
    }

    let control = &config.experiment_control;
    if control.max_bs_receives == 0 {
        return Err("EXPERIMENT_CONTROL.MAX_BS_RECEIVES must be at least 1".to_string());
    }
    if !(control.simulation_time.is_finite() && control.simulation_time > 0.0) {
        return Err(format!("EXPERIMENT_CONTROL.SIMULATION_TIME {} must be positive", control.simulation_time));
    }
    if control.output_filename.as_os_str().is_empty() {
        return Err("EXPERIMENT_CONTROL.OUTPUT_FILENAME must not be empty".to_string());
    }

    let adr = &config.adr_plus_plus;
    if !(adr.adr_check_interval.is_finite() && adr.adr_check_interval > 0.0) {
        return Err(format!("ADR_PLUS_PLUS.ADR_CHECK_INTERVAL {} must be positive", adr.adr_check_interval));
    }
    if !(0.0..=1.0).contains(&adr.efficiency_threshold) {
        return Err(format!(
            "ADR_PLUS_PLUS.EFFICIENCY_THRESHOLD {} must be within 0..1",
            adr.efficiency_threshold
        ));
    }

    let path_loss = &config.path_loss_parameters;
    if path_loss.path_loss_exponent <= 0.0 {
        return Err("Invalid PATH_LOSS_EXPONENT, must be positive".to_string());
    }
    if path_loss.shadowing_sigma < 0.0 {
        return Err("Invalid SHADOWING_SIGMA, must be non-negative".to_string());
    }
    if path_loss.reference_distance <= 0.0 {
        return Err("Invalid REFERENCE_DISTANCE, must be positive".to_string());
    }

    config.radio_tables.validate()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;

    pub(crate) const SAMPLE_JSON: &str = r#"{
        "NODE_SCENARIOS": [10, 50],
        "SIMULATION_PARAMS": {
            "NR_NODES": 10,
            "AVG_SEND_TIME": 1000,
            "DATA_SIZE": 20,
            "RND_SEED": 42,
            "FULL_COLLISION_MODEL": 2
        },
        "EXPERIMENT_CONTROL": {
            "MAX_BS_RECEIVES": 8,
            "SIMULATION_TIME": 86400,
            "OUTPUT_FILENAME": "results/simulation_results.dat"
        },
        "ADR_PLUS_PLUS": {
            "ENABLED": true,
            "ADR_CHECK_INTERVAL": 3600,
            "EFFICIENCY_THRESHOLD": 0.8
        }
    }"#;

    pub(crate) fn sample_config() -> SimulationConfig {
        parse_config(SAMPLE_JSON, false).unwrap()
    }

    #[test]
    fn parses_json_configuration() {
        let config = sample_config();
        assert_eq!(config.node_scenarios, vec![10, 50]);
        assert_eq!(config.simulation_params.full_collision_model, CollisionModel::CaptureNonOrthogonal);
        assert_eq!(config.simulation_params.initial_buffer(), 20.0);
        assert_eq!(config.experiment_control.max_bs_receives, 8);
        assert!(config.adr_plus_plus.enabled);
        assert_eq!(config.radio_tables, RadioTables::default());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn parses_toml_configuration() {
        let toml = r#"
            NODE_SCENARIOS = [5]

            [SIMULATION_PARAMS]
            NR_NODES = 5
            AVG_SEND_TIME = 500.0
            DATA_SIZE = 10
            RND_SEED = 1
            FULL_COLLISION_MODEL = 0
            BUFFER_SIZE = 100.0

            [EXPERIMENT_CONTROL]
            MAX_BS_RECEIVES = 4
            SIMULATION_TIME = 3600.0
            OUTPUT_FILENAME = "out.dat"

            [ADR_PLUS_PLUS]
            ENABLED = false
            ADR_CHECK_INTERVAL = 600.0
            EFFICIENCY_THRESHOLD = 0.7
        "#;
        let config = parse_config(toml, true).unwrap();
        assert_eq!(config.simulation_params.full_collision_model, CollisionModel::Simplified);
        assert_eq!(config.simulation_params.initial_buffer(), 100.0);
        assert!(!config.adr_plus_plus.enabled);
    }

    #[test]
    fn rejects_unknown_collision_model() {
        let json = SAMPLE_JSON.replace("\"FULL_COLLISION_MODEL\": 2", "\"FULL_COLLISION_MODEL\": 7");
        assert!(matches!(parse_config(&json, false), Err(ConfigLoadError::ParseError(_))));
    }

    #[test]
    fn rejects_missing_required_section() {
        let json = r#"{ "NODE_SCENARIOS": [1] }"#;
        assert!(matches!(parse_config(json, false), Err(ConfigLoadError::ParseError(_))));
    }

    #[test]
    fn validation_catches_bad_values() {
        let mut config = sample_config();
        config.experiment_control.max_bs_receives = 0;
        assert!(validate_config(&config).unwrap_err().contains("MAX_BS_RECEIVES"));

        let mut config = sample_config();
        config.adr_plus_plus.efficiency_threshold = 1.5;
        assert!(validate_config(&config).unwrap_err().contains("EFFICIENCY_THRESHOLD"));

        let mut config = sample_config();
        config.node_scenarios = vec![3, 0];
        assert!(validate_config(&config).unwrap_err().contains("NODE_SCENARIOS[1]"));
    }

    #[test]
    fn load_config_reads_file_and_reports_missing_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        file.write_all(SAMPLE_JSON.as_bytes()).unwrap();
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.simulation_params.rnd_seed, 42);

        let missing = load_config(Path::new("/definitely/not/here.json"));
        assert!(matches!(missing, Err(ConfigLoadError::FileReadError(_))));
    }
}
