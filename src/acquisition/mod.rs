//! # Acquisition Module
//!
//! Scoring rules that tell the planner how valuable it is to sample along a
//! candidate path. The set of supported rules is closed: [`RewardMode`]
//! selects one for the whole run and fixes which [`AcquisitionParams`] shape
//! it consumes.
//!
//! ## Available Components
//!
//! - [`Acquisition`] trait: `score(epoch, points, model, params)`
//! - [`RewardMode`]: the run-wide choice of scoring rule
//! - [`MaxBeliefSampler`]: draws beliefs about the field maximum for the
//!   entropy-search and hotspot heuristics

pub mod functions;
pub mod max_belief;

use ndarray::ArrayView2;
use serde::{Serialize, Deserialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{PlumeError, Result};
use crate::gp::OnlineGp;
use crate::types::Point;

pub use functions::{
    ExpectedImprovement, InformationGain, MaxValueEntropySearch, NaiveHotspot,
    NaiveHotspotValue, UpperConfidenceBound,
};
pub use max_belief::{GridMaxSampler, MaxBeliefSampler};

/// Sampled belief about the location and value of the field maximum
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MaxBelief {
    pub max_values: Vec<f64>,
    pub max_locations: Vec<Point>,
    pub target: Option<Point>,
}

impl MaxBelief {
    /// Largest sampled maximum, if any
    pub fn best(&self) -> Option<(Point, f64)> {
        self.max_values
            .iter()
            .zip(self.max_locations.iter())
            .fold(None, |best: Option<(Point, f64)>, (&v, &loc)| match best {
                Some((_, b)) if b >= v => best,
                _ => Some((loc, v)),
            })
    }
}

/// Per-candidate parameter bundle; its shape depends on the reward mode
#[derive(Clone, Debug, PartialEq)]
pub enum AcquisitionParams {
    None,
    MaxBelief(MaxBelief),
    RunningBest(Vec<f64>),
    Heuristic { belief: MaxBelief, radius: f64 },
}

/// A scoring rule over a set of sample points
pub trait Acquisition {
    /// Score sampling at `points` (`N x 2`) given the current model
    fn score(
        &self,
        epoch: usize,
        points: ArrayView2<f64>,
        model: &OnlineGp,
        params: &AcquisitionParams,
    ) -> Result<f64>;

    fn name(&self) -> &'static str;
}

/// Acquisition function and auxiliary parameters active for a whole run
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "RewardModeRepr")]
pub enum RewardMode {
    /// Upper confidence bound on the posterior mean
    Mean,
    /// Entropy reduction of the sampled points
    InfoGain,
    /// Expected improvement over the running best
    ExpImprove,
    /// Max-value entropy search
    Mes,
    /// Count of samples near a sampled maximum
    Naive { sample_num: usize, radius: f64 },
    /// Posterior mean of samples near a sampled maximum
    NaiveValue { sample_num: usize, radius: f64 },
}

/// Accepted config forms: a bare mode name, or a heuristic mode with
/// explicit parameters
#[derive(Deserialize)]
#[serde(untagged)]
enum RewardModeRepr {
    Name(String),
    Heuristic(HeuristicMode),
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
enum HeuristicMode {
    Naive { sample_num: usize, radius: f64 },
    NaiveValue { sample_num: usize, radius: f64 },
}

impl TryFrom<RewardModeRepr> for RewardMode {
    type Error = PlumeError;

    fn try_from(repr: RewardModeRepr) -> Result<Self> {
        match repr {
            RewardModeRepr::Name(name) => name.parse(),
            RewardModeRepr::Heuristic(HeuristicMode::Naive { sample_num, radius }) => {
                Ok(RewardMode::Naive { sample_num, radius })
            }
            RewardModeRepr::Heuristic(HeuristicMode::NaiveValue { sample_num, radius }) => {
                Ok(RewardMode::NaiveValue { sample_num, radius })
            }
        }
    }
}

/// Number of maximum samples drawn for max-value entropy search
pub const MES_MAX_SAMPLES: usize = 3;

impl RewardMode {
    pub fn naive() -> Self {
        RewardMode::Naive { sample_num: 3, radius: 1.5 }
    }

    pub fn naive_value() -> Self {
        RewardMode::NaiveValue { sample_num: 3, radius: 3.0 }
    }

    /// Whether a belief about the field maximum must be sampled each epoch
    pub fn requires_max_belief(&self) -> bool {
        matches!(
            self,
            RewardMode::Mes | RewardMode::Naive { .. } | RewardMode::NaiveValue { .. }
        )
    }

    /// Number of maximum samples to draw, if this mode uses them
    pub fn belief_samples(&self) -> Option<usize> {
        match self {
            RewardMode::Mes => Some(MES_MAX_SAMPLES),
            RewardMode::Naive { sample_num, .. } | RewardMode::NaiveValue { sample_num, .. } => {
                Some(*sample_num)
            }
            _ => None,
        }
    }

    /// The scoring rule implementing this mode
    pub fn acquisition(&self) -> Box<dyn Acquisition> {
        match self {
            RewardMode::Mean => Box::new(UpperConfidenceBound::default()),
            RewardMode::InfoGain => Box::new(InformationGain),
            RewardMode::ExpImprove => Box::new(ExpectedImprovement),
            RewardMode::Mes => Box::new(MaxValueEntropySearch),
            RewardMode::Naive { .. } => Box::new(NaiveHotspot),
            RewardMode::NaiveValue { .. } => Box::new(NaiveHotspotValue),
        }
    }

    /// Assemble the parameter bundle this mode's scoring rule expects
    pub fn params(&self, belief: Option<&MaxBelief>, running_best: &[f64]) -> Result<AcquisitionParams> {
        let need_belief = || {
            belief.cloned().ok_or_else(|| {
                PlumeError::configuration(
                    "reward_mode".to_string(),
                    format!("{} requires a sampled max belief", self),
                )
            })
        };
        Ok(match self {
            RewardMode::Mean | RewardMode::InfoGain => AcquisitionParams::None,
            RewardMode::ExpImprove => AcquisitionParams::RunningBest(running_best.to_vec()),
            RewardMode::Mes => AcquisitionParams::MaxBelief(need_belief()?),
            RewardMode::Naive { radius, .. } | RewardMode::NaiveValue { radius, .. } => {
                AcquisitionParams::Heuristic { belief: need_belief()?, radius: *radius }
            }
        })
    }
}

impl Default for RewardMode {
    fn default() -> Self {
        RewardMode::Mean
    }
}

impl fmt::Display for RewardMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RewardMode::Mean => "mean",
            RewardMode::InfoGain => "info_gain",
            RewardMode::ExpImprove => "exp_improve",
            RewardMode::Mes => "mes",
            RewardMode::Naive { .. } => "naive",
            RewardMode::NaiveValue { .. } => "naive_value",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for RewardMode {
    type Err = PlumeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mean" => Ok(RewardMode::Mean),
            "info_gain" => Ok(RewardMode::InfoGain),
            "exp_improve" => Ok(RewardMode::ExpImprove),
            "mes" => Ok(RewardMode::Mes),
            "naive" => Ok(RewardMode::naive()),
            "naive_value" => Ok(RewardMode::naive_value()),
            other => Err(PlumeError::configuration(
                "reward_mode".to_string(),
                format!(
                    "unsupported reward function '{}'; expected one of mean, info_gain, exp_improve, mes, naive, naive_value",
                    other
                ),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trips_names() {
        for name in ["mean", "info_gain", "exp_improve", "mes", "naive", "naive_value"] {
            let mode: RewardMode = name.parse().unwrap();
            assert_eq!(mode.to_string(), name);
        }
        assert!("hotspot".parse::<RewardMode>().is_err());
    }

    #[test]
    fn test_belief_requirements() {
        assert!(!RewardMode::Mean.requires_max_belief());
        assert!(RewardMode::Mes.requires_max_belief());
        assert_eq!(RewardMode::naive().belief_samples(), Some(3));
        assert_eq!(RewardMode::ExpImprove.belief_samples(), None);
    }

    #[test]
    fn test_params_shape_per_mode() {
        let belief = MaxBelief {
            max_values: vec![2.0],
            max_locations: vec![[1.0, 1.0]],
            target: Some([1.0, 1.0]),
        };
        assert_eq!(RewardMode::Mean.params(None, &[]).unwrap(), AcquisitionParams::None);
        assert_eq!(
            RewardMode::ExpImprove.params(None, &[1.5]).unwrap(),
            AcquisitionParams::RunningBest(vec![1.5])
        );
        assert!(RewardMode::Mes.params(None, &[]).is_err());
        match RewardMode::naive_value().params(Some(&belief), &[]).unwrap() {
            AcquisitionParams::Heuristic { radius, belief: b } => {
                assert_eq!(radius, 3.0);
                assert_eq!(b, belief);
            }
            other => panic!("unexpected params {:?}", other),
        }
    }

    #[test]
    fn test_deserialize_names_and_parameter_forms() {
        let mode: RewardMode = serde_json::from_str(r#""naive""#).unwrap();
        assert_eq!(mode, RewardMode::naive());
        let mode: RewardMode = serde_json::from_str(r#""naive_value""#).unwrap();
        assert_eq!(mode, RewardMode::naive_value());
        let mode: RewardMode =
            serde_json::from_str(r#"{"naive": {"sample_num": 5, "radius": 2.0}}"#).unwrap();
        assert_eq!(mode, RewardMode::Naive { sample_num: 5, radius: 2.0 });

        let saved = serde_json::to_string(&RewardMode::naive_value()).unwrap();
        let back: RewardMode = serde_json::from_str(&saved).unwrap();
        assert_eq!(back, RewardMode::naive_value());

        assert!(serde_json::from_str::<RewardMode>(r#""hotspot""#).is_err());
    }

    #[test]
    fn test_belief_best() {
        let belief = MaxBelief {
            max_values: vec![1.0, 3.0, 2.0],
            max_locations: vec![[0.0, 0.0], [1.0, 1.0], [2.0, 2.0]],
            target: None,
        };
        assert_eq!(belief.best(), Some(([1.0, 1.0], 3.0)));
        assert_eq!(MaxBelief::default().best(), None);
    }
}
