//! Run configuration.
//!
//! [`PlannerConfig`] is read from and written to JSON. Every field has a
//! default, so a config file only needs the values it changes.

use serde::{Serialize, Deserialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::acquisition::RewardMode;
use crate::error::{PlumeError, Result};
use crate::gp::DEFAULT_CONDITION_THRESHOLD;
use crate::kernel::KernelKind;
use crate::types::{Extent, Pose};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub extent: Extent,
    pub start: Pose,
    pub kernel: String,
    pub lengthscale: f64,
    pub variance: f64,
    pub noise: f64,
    pub frontier_size: usize,
    pub horizon_length: f64,
    pub sample_step: f64,
    pub reward_mode: RewardMode,
    /// Divide scores by path cost
    pub use_cost: bool,
    /// Score only the terminal point of each path
    pub goal_only: bool,
    pub nonmyopic: bool,
    pub computation_budget: usize,
    pub rollout_length: usize,
    pub kernel_file: Option<PathBuf>,
    pub learn_params: bool,
    pub seed: u64,
    pub epochs: usize,
    pub incremental: bool,
    pub condition_threshold: f64,
    /// Grid resolution used for predicted-max search and error metrics
    pub grid_resolution: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        PlannerConfig {
            extent: Extent::default(),
            start: Pose::default(),
            kernel: "rbf".to_string(),
            lengthscale: 10.0,
            variance: 100.0,
            noise: 0.05,
            frontier_size: 6,
            horizon_length: 5.0,
            sample_step: 0.5,
            reward_mode: RewardMode::Mean,
            use_cost: false,
            goal_only: false,
            nonmyopic: false,
            computation_budget: 10,
            rollout_length: 5,
            kernel_file: None,
            learn_params: false,
            seed: 0,
            epochs: 150,
            incremental: true,
            condition_threshold: DEFAULT_CONDITION_THRESHOLD,
            grid_resolution: 30,
        }
    }
}

impl PlannerConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(PlumeError::NotFound(format!("config file {}", path.display())));
        }
        let text = fs::read_to_string(path)?;
        let config: PlannerConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        KernelKind::from_name(&self.kernel)?;
        if !(self.lengthscale > 0.0) {
            return Err(invalid("lengthscale", format!("must be positive, got {}", self.lengthscale)));
        }
        if !(self.variance > 0.0) {
            return Err(invalid("variance", format!("must be positive, got {}", self.variance)));
        }
        if !(self.noise >= 0.0) {
            return Err(invalid("noise", format!("must be non-negative, got {}", self.noise)));
        }
        if self.extent.is_empty() {
            return Err(invalid("extent", format!("{:?} has no area", self.extent)));
        }
        if self.frontier_size == 0 {
            return Err(invalid("frontier_size", "must be at least 1".to_string()));
        }
        if !(self.sample_step > 0.0) {
            return Err(invalid("sample_step", format!("must be positive, got {}", self.sample_step)));
        }
        if !(self.horizon_length >= self.sample_step) {
            return Err(invalid(
                "horizon_length",
                format!("{} is shorter than one sample step", self.horizon_length),
            ));
        }
        if self.grid_resolution < 2 {
            return Err(invalid("grid_resolution", "must be at least 2".to_string()));
        }
        if self.nonmyopic && (self.computation_budget == 0 || self.rollout_length == 0) {
            return Err(invalid(
                "computation_budget",
                "lookahead needs a positive budget and rollout length".to_string(),
            ));
        }
        Ok(())
    }
}

fn invalid(name: &str, reason: String) -> PlumeError {
    PlumeError::configuration(name.to_string(), reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_are_valid() {
        let config = PlannerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.frontier_size, 6);
        assert_eq!(config.reward_mode, RewardMode::Mean);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.json");
        fs::write(&path, r#"{"epochs": 12, "reward_mode": "info_gain"}"#).unwrap();

        let config = PlannerConfig::load(&path).unwrap();
        assert_eq!(config.epochs, 12);
        assert_eq!(config.reward_mode, RewardMode::InfoGain);
        assert_eq!(config.lengthscale, 10.0);
    }

    #[test]
    fn test_heuristic_modes_load_by_name() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("naive.json");
        fs::write(&path, r#"{"reward_mode": "naive"}"#).unwrap();
        assert_eq!(PlannerConfig::load(&path).unwrap().reward_mode, RewardMode::naive());

        fs::write(&path, r#"{"reward_mode": "naive_value"}"#).unwrap();
        assert_eq!(PlannerConfig::load(&path).unwrap().reward_mode, RewardMode::naive_value());

        fs::write(&path, r#"{"reward_mode": "hotspot_info"}"#).unwrap();
        assert!(PlannerConfig::load(&path).is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.json");
        let config = PlannerConfig { reward_mode: RewardMode::naive(), seed: 9, ..Default::default() };
        config.save(&path).unwrap();
        assert_eq!(PlannerConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_missing_file_and_bad_values() {
        assert!(matches!(
            PlannerConfig::load("/nonexistent/plume.json"),
            Err(PlumeError::NotFound(_))
        ));
        let bad = PlannerConfig { noise: -1.0, ..Default::default() };
        assert!(matches!(bad.validate(), Err(PlumeError::Configuration { .. })));
        let bad = PlannerConfig { frontier_size: 0, ..Default::default() };
        assert!(bad.validate().is_err());
        let bad = PlannerConfig { kernel: "matern".to_string(), ..Default::default() };
        assert!(matches!(bad.validate(), Err(PlumeError::Configuration { .. })));
    }
}
