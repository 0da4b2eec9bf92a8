use ndarray::{Array1, Array2};

use crate::acquisition::{MaxBeliefSampler, RewardMode};
use crate::config::PlannerConfig;
use crate::error::{PlumeError, Result};
use crate::field::FieldOracle;
use crate::kernel::HyperparameterOptimizer;
use crate::paths::PathSource;
use crate::planner::{LookaheadPlanner, Planner, RolloutPlanner};
use crate::types::{Extent, Pose};

/// Builder for constructing planners with a fluent API
pub struct PlannerBuilder {
    config: PlannerConfig,
    field: Option<Box<dyn FieldOracle>>,
    paths: Option<Box<dyn PathSource>>,
    belief_sampler: Option<Box<dyn MaxBeliefSampler>>,
    lookahead: Option<Box<dyn LookaheadPlanner>>,
    optimizer: Option<Box<dyn HyperparameterOptimizer>>,
    prior: Option<(Array2<f64>, Array1<f64>)>,
}

impl PlannerBuilder {
    pub fn new() -> Self {
        PlannerBuilder::from_config(PlannerConfig::default())
    }

    /// Start from an existing configuration
    pub fn from_config(config: PlannerConfig) -> Self {
        PlannerBuilder {
            config,
            field: None,
            paths: None,
            belief_sampler: None,
            lookahead: None,
            optimizer: None,
            prior: None,
        }
    }

    pub fn with_extent(mut self, extent: Extent) -> Self {
        self.config.extent = extent;
        self
    }

    pub fn with_start(mut self, pose: Pose) -> Self {
        self.config.start = pose;
        self
    }

    /// Set lengthscale, variance and noise of the kernel
    pub fn with_kernel(mut self, lengthscale: f64, variance: f64, noise: f64) -> Self {
        self.config.lengthscale = lengthscale;
        self.config.variance = variance;
        self.config.noise = noise;
        self
    }

    pub fn with_reward_mode(mut self, mode: RewardMode) -> Self {
        self.config.reward_mode = mode;
        self
    }

    pub fn with_cost(mut self, use_cost: bool) -> Self {
        self.config.use_cost = use_cost;
        self
    }

    pub fn with_goal_only(mut self, goal_only: bool) -> Self {
        self.config.goal_only = goal_only;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    pub fn with_incremental(mut self, incremental: bool) -> Self {
        self.config.incremental = incremental;
        self
    }

    /// Enable rollout lookahead with the given budget and rollout length
    pub fn with_rollouts(mut self, budget: usize, rollout_length: usize) -> Self {
        self.config.nonmyopic = true;
        self.config.computation_budget = budget;
        self.config.rollout_length = rollout_length;
        self
    }

    pub fn with_field(mut self, field: Box<dyn FieldOracle>) -> Self {
        self.field = Some(field);
        self
    }

    /// Replace the default ray-fan path generator
    pub fn with_path_source(mut self, paths: Box<dyn PathSource>) -> Self {
        self.paths = Some(paths);
        self
    }

    pub fn with_belief_sampler(mut self, sampler: Box<dyn MaxBeliefSampler>) -> Self {
        self.belief_sampler = Some(sampler);
        self
    }

    /// Use a custom lookahead planner; implies nonmyopic planning
    pub fn with_lookahead(mut self, lookahead: Box<dyn LookaheadPlanner>) -> Self {
        self.config.nonmyopic = true;
        self.lookahead = Some(lookahead);
        self
    }

    pub fn with_optimizer(mut self, optimizer: Box<dyn HyperparameterOptimizer>) -> Self {
        self.optimizer = Some(optimizer);
        self
    }

    /// Observations to fold into the model before the first epoch
    pub fn with_prior_data(mut self, inputs: Array2<f64>, values: Array1<f64>) -> Self {
        self.prior = Some((inputs, values));
        self
    }

    /// Build the planner
    pub fn build(self) -> Result<Planner> {
        let field = self.field.ok_or_else(|| {
            PlumeError::configuration("field", "a field oracle must be provided")
        })?;

        let nonmyopic = self.config.nonmyopic;
        let (budget, rollout_length) = (self.config.computation_budget, self.config.rollout_length);
        let mut planner = Planner::new(self.config, field)?;

        if let Some(paths) = self.paths {
            planner.set_path_source(paths);
        }
        if let Some(sampler) = self.belief_sampler {
            planner.set_belief_sampler(sampler);
        }
        if let Some(optimizer) = self.optimizer {
            planner.set_optimizer(optimizer);
        }
        match self.lookahead {
            Some(lookahead) => planner.set_lookahead(Some(lookahead)),
            None if nonmyopic => {
                planner.set_lookahead(Some(Box::new(RolloutPlanner::new(budget, rollout_length))))
            }
            None => planner.set_lookahead(None),
        }
        if let Some((inputs, values)) = self.prior {
            planner.add_prior_data(&inputs, &values)?;
        }
        Ok(planner)
    }
}

impl Default for PlannerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
