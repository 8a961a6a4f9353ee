//! Pipeline configuration.
//!
//! The analysis is driven by a single JSON document. Paths and column
//! selection are required; sampling and MCMC settings carry defaults
//! matching a standard production run.

use crate::table::ColumnSelection;
use filix_core::{FilixError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Configuration for a full analysis run.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Newick tree file.
    pub tree_path: PathBuf,
    /// CSV trait table.
    pub trait_path: PathBuf,
    /// Directory receiving chain traces; created if absent.
    pub output_dir: PathBuf,
    /// Columns of the trait table holding species names and trait scores.
    pub state_columns: ColumnSelection,
    /// Per-state sampling fractions, each in `(0, 1]`.
    #[serde(default = "default_sampling_fractions")]
    pub sampling_fractions: [f64; 4],
    /// Steps of the window-calibration run.
    #[serde(default = "default_calibration_steps")]
    pub calibration_steps: usize,
    /// Steps per production chain.
    #[serde(default = "default_production_steps")]
    pub production_steps: usize,
    /// Number of independent chains.
    #[serde(default = "default_chain_count")]
    pub chain_count: usize,
    /// Retained samples at steps below this are discarded from summaries.
    #[serde(default = "default_burn_in")]
    pub burn_in: usize,
    /// Every n-th step is retained.
    #[serde(default = "default_retention_interval")]
    pub retention_interval: usize,
    /// One seed per chain; the first also seeds calibration.
    #[serde(default = "default_random_seeds")]
    pub random_seeds: Vec<u64>,
}

fn default_sampling_fractions() -> [f64; 4] {
    [1.0; 4]
}

fn default_calibration_steps() -> usize {
    100
}

fn default_production_steps() -> usize {
    10_000
}

fn default_chain_count() -> usize {
    4
}

fn default_burn_in() -> usize {
    1_000
}

fn default_retention_interval() -> usize {
    5
}

fn default_random_seeds() -> Vec<u64> {
    vec![1, 2, 3, 4]
}

impl PipelineConfig {
    /// Parses a configuration from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| FilixError::Parse(format!("config: {}", e)))
    }

    /// Reads and parses a JSON configuration file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            FilixError::Io(std::io::Error::new(
                e.kind(),
                format!("{}: {}", path.display(), e),
            ))
        })?;
        serde_json::from_str(&text)
            .map_err(|e| FilixError::Parse(format!("{}: {}", path.display(), e)))
    }

    /// Checks field ranges and cross-field consistency.
    pub fn validate(&self) -> Result<()> {
        self.state_columns.validate()?;
        for (i, &f) in self.sampling_fractions.iter().enumerate() {
            if !(f > 0.0 && f <= 1.0) {
                return Err(FilixError::InvalidInput(format!(
                    "config: sampling fraction for state {} must be in (0, 1], got {}",
                    i + 1,
                    f
                )));
            }
        }
        if self.calibration_steps < 2 {
            return Err(FilixError::InvalidInput(
                "config: calibration_steps must be at least 2".into(),
            ));
        }
        if self.production_steps == 0 {
            return Err(FilixError::InvalidInput(
                "config: production_steps must be positive".into(),
            ));
        }
        if self.chain_count == 0 {
            return Err(FilixError::InvalidInput(
                "config: chain_count must be positive".into(),
            ));
        }
        if self.retention_interval == 0 {
            return Err(FilixError::InvalidInput(
                "config: retention_interval must be positive".into(),
            ));
        }
        if self.burn_in >= self.production_steps {
            return Err(FilixError::InvalidInput(format!(
                "config: burn_in ({}) must be below production_steps ({})",
                self.burn_in, self.production_steps
            )));
        }
        if self.random_seeds.len() < self.chain_count {
            return Err(FilixError::InvalidInput(format!(
                "config: {} random seeds for {} chains",
                self.random_seeds.len(),
                self.chain_count
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MINIMAL: &str = r#"{
        "tree_path": "data/ferns.nwk",
        "trait_path": "data/traits.csv",
        "output_dir": "out",
        "state_columns": { "species": 0, "trait_a": 1, "trait_b": 2 }
    }"#;

    #[test]
    fn minimal_config_gets_defaults() {
        let config = PipelineConfig::from_json_str(MINIMAL).unwrap();
        assert_eq!(config.sampling_fractions, [1.0; 4]);
        assert_eq!(config.calibration_steps, 100);
        assert_eq!(config.production_steps, 10_000);
        assert_eq!(config.chain_count, 4);
        assert_eq!(config.burn_in, 1_000);
        assert_eq!(config.retention_interval, 5);
        assert_eq!(config.random_seeds, vec![1, 2, 3, 4]);
        config.validate().unwrap();
    }

    #[test]
    fn explicit_fields_override_defaults() {
        let config = PipelineConfig::from_json_str(
            r#"{
                "tree_path": "t.nwk",
                "trait_path": "t.csv",
                "output_dir": "out",
                "state_columns": { "species": 0, "trait_a": 2, "trait_b": 3 },
                "sampling_fractions": [0.5, 0.5, 0.9, 1.0],
                "chain_count": 2,
                "random_seeds": [7, 11]
            }"#,
        )
        .unwrap();
        assert_eq!(config.chain_count, 2);
        assert_eq!(config.random_seeds, vec![7, 11]);
        assert!((config.sampling_fractions[0] - 0.5).abs() < 1e-12);
        config.validate().unwrap();
    }

    #[test]
    fn unknown_field_is_rejected() {
        let err = PipelineConfig::from_json_str(
            r#"{
                "tree_path": "t.nwk",
                "trait_path": "t.csv",
                "output_dir": "out",
                "state_columns": { "species": 0, "trait_a": 1, "trait_b": 2 },
                "nchains": 4
            }"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("nchains"), "got: {}", err);
    }

    #[test]
    fn validate_rejects_bad_fraction() {
        let mut config = PipelineConfig::from_json_str(MINIMAL).unwrap();
        config.sampling_fractions[2] = 0.0;
        assert!(config.validate().is_err());
        config.sampling_fractions[2] = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_short_seed_list() {
        let mut config = PipelineConfig::from_json_str(MINIMAL).unwrap();
        config.random_seeds = vec![1, 2];
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_burn_in_past_production() {
        let mut config = PipelineConfig::from_json_str(MINIMAL).unwrap();
        config.burn_in = config.production_steps;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_counts() {
        let mut config = PipelineConfig::from_json_str(MINIMAL).unwrap();
        config.chain_count = 0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::from_json_str(MINIMAL).unwrap();
        config.retention_interval = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn reads_config_from_file() {
        let mut tmp = NamedTempFile::with_suffix(".json").unwrap();
        write!(tmp, "{}", MINIMAL).unwrap();
        tmp.flush().unwrap();
        let config = PipelineConfig::from_json_file(tmp.path()).unwrap();
        assert_eq!(config.tree_path, PathBuf::from("data/ferns.nwk"));
    }

    #[test]
    fn file_errors_carry_the_path() {
        let err = PipelineConfig::from_json_file(Path::new("/no/such/config.json")).unwrap_err();
        assert!(err.to_string().contains("/no/such/config.json"));
    }
}
