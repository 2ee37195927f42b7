use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::constants::{DEFAULT_GATE_NS, START_EVENT_NUMBER};
use super::error::ConfigError;
use super::event_builder::{BuilderSettings, InvalidRecordPolicy, OpeningPolicy};

const DEFAULT_TRACKER_MAP_NAME: &str = "mapping_tracker.csv";
const DEFAULT_CALO_MAP_NAME: &str = "mapping_calo.csv";
const HIT_FILE_EXTENSION: &str = "hits";

/// Format of the files events are written to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Yaml,
    Hdf5,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Yaml => "yaml",
            Self::Hdf5 => "h5",
        }
    }
}

/// Structure representing the application configuration. Contains pathing, run and event
/// building information.
/// Configs are seralizable and deserializable to YAML using serde and serde_yaml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub hit_path: PathBuf,
    pub output_path: PathBuf,
    #[serde(default)]
    pub tracker_map_path: Option<PathBuf>,
    #[serde(default)]
    pub calo_map_path: Option<PathBuf>,
    pub first_run_number: i32,
    pub last_run_number: i32,
    pub n_threads: i32,
    #[serde(default)]
    pub first_event_number: u64,
    pub gate_ns: f64,
    #[serde(default)]
    pub calo_gate_ns: Option<f64>,
    #[serde(default)]
    pub opening_policy: Option<OpeningPolicy>,
    #[serde(default)]
    pub invalid_records: InvalidRecordPolicy,
    #[serde(default)]
    pub require_calo_threshold: bool,
    #[serde(default)]
    pub min_calo_hits: usize,
    #[serde(default)]
    pub min_tracker_hits: usize,
    #[serde(default)]
    pub max_events: Option<u64>,
    #[serde(default)]
    pub output_format: OutputFormat,
}

impl Default for Config {
    /// Generate a new Config object. Paths will be invalid and the opening policy unset
    fn default() -> Self {
        Self {
            hit_path: PathBuf::from("None"),
            output_path: PathBuf::from("None"),
            tracker_map_path: None,
            calo_map_path: None,
            first_run_number: 0,
            last_run_number: 0,
            n_threads: 1,
            first_event_number: START_EVENT_NUMBER,
            gate_ns: DEFAULT_GATE_NS,
            calo_gate_ns: None,
            opening_policy: None,
            invalid_records: InvalidRecordPolicy::Abort,
            require_calo_threshold: false,
            min_calo_hits: 0,
            min_tracker_hits: 0,
            max_events: None,
            output_format: OutputFormat::Yaml,
        }
    }
}

impl Config {
    /// Read the configuration in a YAML file
    /// Returns a Config if successful
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;

        Ok(serde_yaml::from_str::<Self>(&yaml_str)?)
    }

    /// Write the configuration to a YAML file
    pub fn write_config_file(&self, config_path: &Path) -> Result<(), ConfigError> {
        std::fs::write(config_path, serde_yaml::to_string(self)?)?;
        Ok(())
    }

    /// Check everything that can be checked before touching any data
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.opening_policy.is_none() {
            return Err(ConfigError::MissingOpeningPolicy);
        }
        if !self.is_n_threads_valid() {
            return Err(ConfigError::InvalidThreads(self.n_threads));
        }
        if !(self.gate_ns.is_finite() && self.gate_ns > 0.0) {
            return Err(ConfigError::InvalidGate(self.gate_ns));
        }
        if let Some(gate) = self.calo_gate_ns {
            if !(gate.is_finite() && gate > 0.0) {
                return Err(ConfigError::InvalidGate(gate));
            }
        }
        if self.output_format == OutputFormat::Hdf5 && !cfg!(feature = "hdf5") {
            return Err(ConfigError::Hdf5Unavailable);
        }
        Ok(())
    }

    /// The EventBuilder settings described by this config
    pub fn builder_settings(&self) -> Result<BuilderSettings, ConfigError> {
        let opening_policy = self
            .opening_policy
            .ok_or(ConfigError::MissingOpeningPolicy)?;
        Ok(BuilderSettings {
            gate_ns: self.gate_ns,
            calo_gate_ns: self.calo_gate_ns,
            opening_policy,
            require_calo_threshold: self.require_calo_threshold,
            min_calo_hits: self.min_calo_hits,
            min_tracker_hits: self.min_tracker_hits,
        })
    }

    /// Check if a specific run exists by evaluating the existance of its hit file
    pub fn does_run_exist(&self, run_number: i32) -> bool {
        self.get_hit_file(run_number).exists()
    }

    /// Get the path to the hit file of a run
    pub fn get_hit_file(&self, run_number: i32) -> PathBuf {
        self.hit_path.join(format!(
            "{}.{HIT_FILE_EXTENSION}",
            self.get_run_str(run_number)
        ))
    }

    /// Get the path to the output file of a run
    pub fn get_output_file(&self, run_number: i32) -> Result<PathBuf, ConfigError> {
        let output_file_path: PathBuf = self.output_path.join(format!(
            "{}.{}",
            self.get_run_str(run_number),
            self.output_format.extension()
        ));
        if self.output_path.exists() {
            Ok(output_file_path)
        } else {
            Err(ConfigError::BadFilePath(self.output_path.clone()))
        }
    }

    /// Get the path to the tracker channel table, by default next to the hit files
    pub fn get_tracker_map_path(&self) -> PathBuf {
        self.tracker_map_path
            .clone()
            .unwrap_or_else(|| self.hit_path.join(DEFAULT_TRACKER_MAP_NAME))
    }

    /// Get the path to the calorimeter channel table, by default next to the hit files
    pub fn get_calo_map_path(&self) -> PathBuf {
        self.calo_map_path
            .clone()
            .unwrap_or_else(|| self.hit_path.join(DEFAULT_CALO_MAP_NAME))
    }

    /// Construct the run string
    fn get_run_str(&self, run_number: i32) -> String {
        format!("run_{run_number:0>4}")
    }

    pub fn is_n_threads_valid(&self) -> bool {
        self.n_threads >= 1
    }
}
