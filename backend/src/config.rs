//! Pipeline configuration.
//!
//! Defaults are built in; a JSON file can override any subset of them and a
//! few environment variables override the file:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `FLOWMETRICS_WINDOW_MONTHS` | [`PipelineConfig::window_months`] |
//! | `FLOWMETRICS_PREWAR_CUTOFF` | [`PipelineConfig::prewar_cutoff_year`] |
//! | `FLOWMETRICS_DATA_DIR` | [`DataPaths::data_dir`] |

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, ConfigResult};

pub const ENV_WINDOW_MONTHS: &str = "FLOWMETRICS_WINDOW_MONTHS";
pub const ENV_PREWAR_CUTOFF: &str = "FLOWMETRICS_PREWAR_CUTOFF";
pub const ENV_DATA_DIR: &str = "FLOWMETRICS_DATA_DIR";

/// All tunables of a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Width of the trailing monthly window for flows, max month included
    pub window_months: u32,

    /// Latest year still treated as pre-war for the permit baseline
    pub prewar_cutoff_year: i32,

    /// Citizenship codes kept by the citizenship filter
    pub target_citizenship: Vec<String>,

    /// Unit code preferred for flow counts when the extract carries it
    pub flow_unit: String,

    /// Substring identifying per-capita GDP units
    pub gdp_unit_marker: String,

    /// Age code vocabulary for demographic bins
    pub ages: AgeVocabulary,

    /// Input and output locations
    pub paths: DataPaths,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            window_months: 6,
            prewar_cutoff_year: 2021,
            target_citizenship: vec!["UA".to_string(), "UKR".to_string()],
            flow_unit: "NR".to_string(),
            gdp_unit_marker: "HAB".to_string(),
            ages: AgeVocabulary::default(),
            paths: DataPaths::default(),
        }
    }
}

/// Age band codes of the flow extract vocabulary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgeVocabulary {
    pub child: BTreeSet<String>,
    pub elder: BTreeSet<String>,
    /// Code for observations of unknown age
    pub unknown: String,
    /// Codes of the all-ages aggregate row
    pub all_ages: BTreeSet<String>,
}

impl Default for AgeVocabulary {
    fn default() -> Self {
        Self {
            child: code_set(&["Y_LT18", "Y0-14", "Y15-17", "Y14-17", "Y_LT14"]),
            elder: code_set(&["Y_GE65", "Y65-79", "Y_GE80", "Y80-84", "Y85-89", "Y_GE90"]),
            unknown: "UNK".to_string(),
            all_ages: code_set(&["TOTAL"]),
        }
    }
}

impl AgeVocabulary {
    pub fn is_child(&self, code: &str) -> bool {
        self.child.contains(code)
    }

    pub fn is_elder(&self, code: &str) -> bool {
        self.elder.contains(code)
    }

    pub fn is_unknown(&self, code: &str) -> bool {
        self.unknown == code
    }

    pub fn is_all_ages(&self, code: &str) -> bool {
        self.all_ages.contains(code)
    }

    /// Adult band: not a child, elder, unknown or aggregate code.
    pub fn is_adult(&self, code: &str) -> bool {
        !self.is_child(code) && !self.is_elder(code) && !self.is_unknown(code) && !self.is_all_ages(code)
    }
}

fn code_set(codes: &[&str]) -> BTreeSet<String> {
    codes.iter().map(|c| c.to_string()).collect()
}

/// File locations, relative to `data_dir` unless absolute.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataPaths {
    pub data_dir: PathBuf,
    pub flows_source: PathBuf,
    pub flows_csv: PathBuf,
    pub flows_json: PathBuf,
    pub gdp_source: PathBuf,
    pub gdp_csv: PathBuf,
    pub permits_source: PathBuf,
    pub permits_agg_csv: PathBuf,
    pub permits_agg_json: PathBuf,
    pub permits_metrics_csv: PathBuf,
    pub permits_metrics_json: PathBuf,
    pub factors_csv: PathBuf,
    pub support_workbook: PathBuf,
    pub country_summary_csv: PathBuf,
}

impl Default for DataPaths {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            flows_source: PathBuf::from("migr_asytpsm_linear_2_0.csv"),
            flows_csv: PathBuf::from("flows_ua_agg.csv"),
            flows_json: PathBuf::from("flows_ua_agg.json"),
            gdp_source: PathBuf::from("sdg_08_10_linear_2_0.csv"),
            gdp_csv: PathBuf::from("gdp_pc_clean.csv"),
            permits_source: PathBuf::from("migr_resvalid__custom_18711207_linear_2_0.csv"),
            permits_agg_csv: PathBuf::from("respermits_ua_agg.csv"),
            permits_agg_json: PathBuf::from("respermits_ua_agg.json"),
            permits_metrics_csv: PathBuf::from("respermits_ua_metrics.csv"),
            permits_metrics_json: PathBuf::from("respermits_ua_metrics.json"),
            factors_csv: PathBuf::from("country_factors.csv"),
            support_workbook: PathBuf::from("ukraine_support_tracker.xlsx"),
            country_summary_csv: PathBuf::from("country_summary_clean.csv"),
        }
    }
}

impl DataPaths {
    /// Resolve a configured path against the data directory.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_dir.join(path)
        }
    }
}

impl PipelineConfig {
    /// Load defaults, then the optional JSON file, then environment overrides.
    pub fn load(file: Option<&Path>) -> ConfigResult<Self> {
        let mut config = match file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON config file; absent keys keep their defaults.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Apply overrides from a variable lookup (the process environment in `load`).
    pub fn apply_env<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_WINDOW_MONTHS) {
            self.window_months = parse_env(ENV_WINDOW_MONTHS, &value)?;
        }
        if let Some(value) = lookup(ENV_PREWAR_CUTOFF) {
            self.prewar_cutoff_year = parse_env(ENV_PREWAR_CUTOFF, &value)?;
        }
        if let Some(value) = lookup(ENV_DATA_DIR) {
            self.paths.data_dir = PathBuf::from(value);
        }
        Ok(())
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.window_months == 0 {
            return Err(ConfigError::Invalid {
                field: "window_months".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.target_citizenship.is_empty() {
            return Err(ConfigError::Invalid {
                field: "target_citizenship".to_string(),
                message: "at least one citizenship code is required".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(var: &str, value: &str) -> ConfigResult<T> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        var: var.to_string(),
        value: value.to_string(),
    })
}
