//! # Planner Module
//!
//! The sequential decision loop. Every epoch the [`Planner`] asks its
//! [`PathSource`] for candidates, scores them with the run's acquisition
//! function (or hands the choice to a [`LookaheadPlanner`]), samples the
//! field along the winner and folds the samples into its [`OnlineGp`].
//!
//! ```text
//! AwaitingDecision -> Scoring -> Selected -> Sampling -> Updated -> AwaitingDecision
//!                        \
//!                         +-> Done (horizon exhausted or no valid candidate)
//! ```

pub mod lookahead;

use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeMap;

use crate::acquisition::{
    Acquisition, AcquisitionParams, GridMaxSampler, MaxBelief, MaxBeliefSampler, RewardMode,
};
use crate::config::PlannerConfig;
use crate::error::{PlumeError, Result};
use crate::field::FieldOracle;
use crate::gp::{OnlineGp, UpdateStrategy};
use crate::kernel::{GridSearchOptimizer, HyperparameterOptimizer, RbfKernel};
use crate::metrics::{evaluate_epoch, EpochInputs, EpochRecord, RunLog};
use crate::paths::{PathSource, RayFanPaths};
use crate::types::{
    euclidean, points_to_array, GeometricPath, PathId, PathSet, Point, Pose, DOMAIN_DIM,
};

pub use lookahead::{LookaheadContext, LookaheadPlanner, RolloutPlanner};

/// Cost used when cost normalization is off or a path reports zero cost
pub const FALLBACK_COST: f64 = 100.0;

/// Where the loop is within the current epoch
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EpochPhase {
    AwaitingDecision,
    Scoring,
    Selected,
    Sampling,
    Updated,
    Done,
}

/// Result of a single [`Planner::step`]
#[derive(Clone, Debug, PartialEq)]
pub enum EpochOutcome {
    Advanced(EpochRecord),
    Done,
}

/// The chosen path together with everything that was considered
#[derive(Clone, Debug)]
pub struct Selection {
    pub path_id: PathId,
    pub sampling_path: Vec<Point>,
    pub geometric_path: GeometricPath,
    pub value: f64,
    pub all_paths: PathSet,
    pub all_values: BTreeMap<PathId, f64>,
    pub max_locations: Vec<Point>,
    pub max_value: Vec<f64>,
}

impl Selection {
    /// Pick the highest-valued candidate out of `all_values`, breaking ties
    /// uniformly at random.
    pub fn choose(
        all_paths: PathSet,
        all_values: BTreeMap<PathId, f64>,
        belief: Option<&MaxBelief>,
        epoch: usize,
        rng: &mut StdRng,
    ) -> Result<Self> {
        let path_id = break_ties(&all_values, rng).ok_or(PlumeError::NoValidCandidate { epoch })?;
        let sampling_path = all_paths.sampling.get(&path_id).cloned().unwrap_or_default();
        let geometric_path = all_paths.geometric.get(&path_id).cloned().unwrap_or_default();
        let value = all_values.get(&path_id).copied().unwrap_or(f64::NAN);
        let (max_locations, max_value) = match belief {
            Some(b) => (b.max_locations.clone(), b.max_values.clone()),
            None => (Vec::new(), Vec::new()),
        };
        Ok(Selection {
            path_id,
            sampling_path,
            geometric_path,
            value,
            all_paths,
            all_values,
            max_locations,
            max_value,
        })
    }
}

/// Id of the maximum value; ties are resolved uniformly at random
pub fn break_ties(values: &BTreeMap<PathId, f64>, rng: &mut StdRng) -> Option<PathId> {
    let best = values.values().copied().fold(f64::NEG_INFINITY, f64::max);
    let tied: Vec<PathId> = values
        .iter()
        .filter(|(_, &v)| v == best)
        .map(|(&id, _)| id)
        .collect();
    tied.choose(rng).copied()
}

/// How a candidate's acquisition value is turned into its score
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScoringPolicy {
    pub use_cost: bool,
    pub goal_only: bool,
}

impl ScoringPolicy {
    pub fn cost(&self, source: &dyn PathSource, path: &GeometricPath) -> f64 {
        if !self.use_cost {
            return FALLBACK_COST;
        }
        let cost = source.path_cost(path);
        if cost == 0.0 || !cost.is_finite() {
            FALLBACK_COST
        } else {
            cost
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn score(
        &self,
        acquisition: &dyn Acquisition,
        epoch: usize,
        points: &[Point],
        path: &GeometricPath,
        source: &dyn PathSource,
        model: &OnlineGp,
        params: &AcquisitionParams,
    ) -> Result<f64> {
        let poi: &[Point] = if self.goal_only {
            points.last().map(std::slice::from_ref).unwrap_or(&[])
        } else {
            points
        };
        if poi.is_empty() {
            return Err(PlumeError::shape("at least one sample point", "an empty path"));
        }
        let reward = acquisition.score(epoch, points_to_array(poi).view(), model, params)?;
        if self.use_cost {
            Ok(reward / self.cost(source, path))
        } else {
            Ok(reward)
        }
    }
}

/// Single-agent informative path planner
pub struct Planner {
    config: PlannerConfig,
    model: OnlineGp,
    field: Box<dyn FieldOracle>,
    paths: Box<dyn PathSource>,
    acquisition: Box<dyn Acquisition>,
    belief_sampler: Box<dyn MaxBeliefSampler>,
    lookahead: Option<Box<dyn LookaheadPlanner>>,
    optimizer: Box<dyn HyperparameterOptimizer>,
    reward_mode: RewardMode,
    policy: ScoringPolicy,
    strategy: UpdateStrategy,
    pose: Pose,
    trajectory: Vec<GeometricPath>,
    current_max: f64,
    current_max_loc: Option<Point>,
    distance: f64,
    horizon: usize,
    phase: EpochPhase,
    rng: StdRng,
}

impl Planner {
    /// Build a planner from a validated configuration and a field to sample
    pub fn new(config: PlannerConfig, field: Box<dyn FieldOracle>) -> Result<Self> {
        config.validate()?;
        let kernel = RbfKernel::from_kind(
            &config.kernel,
            DOMAIN_DIM,
            config.lengthscale,
            config.variance,
            config.noise,
        )?;
        let mut model = OnlineGp::new(kernel).with_condition_threshold(config.condition_threshold);
        if let (Some(path), false) = (&config.kernel_file, config.learn_params) {
            model.load_kernel(path)?;
        }

        let paths = RayFanPaths::new(
            config.frontier_size,
            config.horizon_length,
            config.sample_step,
            config.extent,
        )?;
        let lookahead: Option<Box<dyn LookaheadPlanner>> = if config.nonmyopic {
            Some(Box::new(RolloutPlanner::new(config.computation_budget, config.rollout_length)))
        } else {
            None
        };

        Ok(Planner {
            model,
            field,
            paths: Box::new(paths),
            acquisition: config.reward_mode.acquisition(),
            belief_sampler: Box::new(GridMaxSampler::new(config.extent, config.grid_resolution)),
            lookahead,
            optimizer: Box::new(GridSearchOptimizer::default()),
            reward_mode: config.reward_mode,
            policy: ScoringPolicy { use_cost: config.use_cost, goal_only: config.goal_only },
            strategy: if config.incremental { UpdateStrategy::Incremental } else { UpdateStrategy::Batch },
            pose: config.start,
            trajectory: Vec::new(),
            current_max: f64::NEG_INFINITY,
            current_max_loc: None,
            distance: 0.0,
            horizon: config.epochs,
            phase: EpochPhase::AwaitingDecision,
            rng: StdRng::seed_from_u64(config.seed),
            config,
        })
    }

    pub(crate) fn set_path_source(&mut self, paths: Box<dyn PathSource>) {
        self.paths = paths;
    }

    pub(crate) fn set_belief_sampler(&mut self, sampler: Box<dyn MaxBeliefSampler>) {
        self.belief_sampler = sampler;
    }

    pub(crate) fn set_lookahead(&mut self, lookahead: Option<Box<dyn LookaheadPlanner>>) {
        self.lookahead = lookahead;
    }

    pub(crate) fn set_optimizer(&mut self, optimizer: Box<dyn HyperparameterOptimizer>) {
        self.optimizer = optimizer;
    }

    /// Seed the model with observations gathered before the run
    pub fn add_prior_data(&mut self, inputs: &Array2<f64>, values: &Array1<f64>) -> Result<()> {
        self.model.incorporate(inputs.view(), values.view(), self.strategy)?;
        for (x, &z) in inputs.outer_iter().zip(values.iter()) {
            self.observe_best([x[0], x[1]], z);
        }
        Ok(())
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn model(&self) -> &OnlineGp {
        &self.model
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    pub fn trajectory(&self) -> &[GeometricPath] {
        &self.trajectory
    }

    /// Best observed value, `-inf` before the first observation
    pub fn current_max(&self) -> f64 {
        self.current_max
    }

    pub fn current_max_loc(&self) -> Option<Point> {
        self.current_max_loc
    }

    pub fn distance(&self) -> f64 {
        self.distance
    }

    pub fn phase(&self) -> EpochPhase {
        self.phase
    }

    pub fn reward_mode(&self) -> RewardMode {
        self.reward_mode
    }

    fn running_best(&self) -> Vec<f64> {
        if self.current_max.is_finite() {
            vec![self.current_max]
        } else {
            Vec::new()
        }
    }

    fn sample_belief(&mut self, epoch: usize) -> Result<Option<MaxBelief>> {
        if !self.reward_mode.requires_max_belief() {
            return Ok(None);
        }
        let belief = self
            .belief_sampler
            .sample_max_belief(&self.model, epoch, &self.reward_mode, &mut self.rng)?;
        Ok(Some(belief))
    }

    /// Decide which path to take at `epoch`.
    ///
    /// Fails with [`PlumeError::NoValidCandidate`] when there is nothing to
    /// choose from or every candidate fails to score.
    pub fn choose_trajectory(&mut self, epoch: usize) -> Result<Selection> {
        self.phase = EpochPhase::Scoring;
        let belief = self.sample_belief(epoch)?;
        let params = self.reward_mode.params(belief.as_ref(), &self.running_best())?;

        if let Some(lookahead) = self.lookahead.as_mut() {
            let ctx = LookaheadContext {
                model: &self.model,
                pose: self.pose,
                paths: self.paths.as_ref(),
                acquisition: self.acquisition.as_ref(),
                reward_mode: self.reward_mode,
                params: &params,
                belief: belief.as_ref(),
                policy: self.policy,
                rng: &mut self.rng,
            };
            return lookahead.choose_trajectory(epoch, ctx);
        }

        let all_paths = self.paths.path_set(&self.pose);
        let mut all_values = BTreeMap::new();
        for (&id, points) in &all_paths.sampling {
            let Some(path) = all_paths.geometric.get(&id) else {
                continue;
            };
            let scored = self.policy.score(
                self.acquisition.as_ref(),
                epoch,
                points,
                path,
                self.paths.as_ref(),
                &self.model,
                &params,
            );
            match scored {
                Ok(value) if value.is_finite() => {
                    tracing::debug!(epoch, path = id, value, "scored candidate");
                    all_values.insert(id, value);
                }
                Ok(value) => tracing::debug!(epoch, path = id, value, "discarding non-finite score"),
                Err(e @ PlumeError::NumericalInstability(_)) => return Err(e),
                Err(e) => tracing::debug!(epoch, path = id, error = %e, "candidate failed to score"),
            }
        }

        Selection::choose(all_paths, all_values, belief.as_ref(), epoch, &mut self.rng)
    }

    /// Sample the field at `points` and fold the results into the model.
    ///
    /// Returns the sampled values.
    pub fn collect_observations(&mut self, points: &[Point]) -> Result<Vec<f64>> {
        if points.is_empty() {
            return Ok(Vec::new());
        }
        let values = self.field.sample(points);
        let inputs = points_to_array(points);
        self.model
            .incorporate(inputs.view(), Array1::from(values.clone()).view(), self.strategy)?;
        for (p, &z) in points.iter().zip(values.iter()) {
            self.observe_best(*p, z);
        }
        Ok(values)
    }

    fn observe_best(&mut self, p: Point, z: f64) {
        if z > self.current_max {
            self.current_max = z;
            self.current_max_loc = Some(p);
        }
    }

    /// Run one full epoch.
    ///
    /// An empty or all-failing candidate set ends the run with
    /// [`EpochOutcome::Done`]; every other error is returned.
    pub fn step(&mut self, epoch: usize) -> Result<EpochOutcome> {
        if self.phase == EpochPhase::Done {
            return Ok(EpochOutcome::Done);
        }
        self.phase = EpochPhase::AwaitingDecision;

        let predicted_max = self.model.predict_max(&self.config.extent, self.config.grid_resolution)?;
        tracing::info!(
            epoch,
            x = self.pose.x,
            y = self.pose.y,
            current_max = self.current_max,
            predicted_max = predicted_max.1,
            "planning epoch"
        );

        let selection = match self.choose_trajectory(epoch) {
            Ok(selection) => selection,
            Err(e) if e.is_recoverable() => {
                tracing::warn!(epoch, error = %e, "stopping early");
                self.phase = EpochPhase::Done;
                return Ok(EpochOutcome::Done);
            }
            Err(e) => return Err(e),
        };
        self.phase = EpochPhase::Selected;
        tracing::debug!(epoch, path = selection.path_id, value = selection.value, "selected path");

        let mut start = self.pose.position();
        let mut travelled = 0.0;
        for waypoint in &selection.geometric_path.waypoints {
            let next = waypoint.position();
            travelled += euclidean(&start, &next);
            start = next;
        }

        let record = evaluate_epoch(&EpochInputs {
            time: self.trajectory.len(),
            model: &self.model,
            selection: &selection,
            oracle: self.field.as_ref(),
            extent: &self.config.extent,
            grid_resolution: self.config.grid_resolution,
            predicted_max,
            current_max_val: self.current_max,
            current_max_loc: self.current_max_loc,
            pose: self.pose,
            distance: self.distance + travelled,
        })?;

        self.phase = EpochPhase::Sampling;
        self.collect_observations(&selection.sampling_path)?;
        if self.config.learn_params && (epoch as f64) < self.horizon as f64 / 3.0 {
            let kernel_file = self.config.kernel_file.clone();
            self.model.train_kernel(self.optimizer.as_ref(), kernel_file.as_deref())?;
        }

        if let Some(end) = selection.geometric_path.end() {
            self.pose = *end;
        } else if let Some(last) = selection.sampling_path.last() {
            self.pose = Pose::new(last[0], last[1], self.pose.heading);
        }
        self.distance += travelled;
        self.trajectory.push(selection.geometric_path);
        self.phase = EpochPhase::Updated;
        Ok(EpochOutcome::Advanced(record))
    }

    /// Run up to `epochs` epochs, appending one row per completed epoch to
    /// `log`. Returns the number of completed epochs.
    pub fn run(&mut self, epochs: usize, log: &mut RunLog) -> Result<usize> {
        self.horizon = epochs;
        let mut completed = 0;
        for epoch in 0..epochs {
            match self.step(epoch)? {
                EpochOutcome::Advanced(record) => {
                    log.append(record)?;
                    completed += 1;
                }
                EpochOutcome::Done => break,
            }
        }
        self.phase = EpochPhase::Done;
        tracing::info!(
            completed,
            distance = self.distance,
            current_max = self.current_max,
            "run finished"
        );
        Ok(completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_break_ties_prefers_strict_maximum() {
        let mut rng = StdRng::seed_from_u64(0);
        let values: BTreeMap<PathId, f64> = [(0, 1.0), (1, 3.0), (2, 2.0)].into_iter().collect();
        for _ in 0..10 {
            assert_eq!(break_ties(&values, &mut rng), Some(1));
        }
        assert_eq!(break_ties(&BTreeMap::new(), &mut rng), None);
    }

    #[test]
    fn test_cost_falls_back_when_disabled_or_zero() {
        let source = RayFanPaths::new(1, 1.0, 0.5, Default::default()).unwrap();
        let still = GeometricPath::new(vec![Pose::default(), Pose::default()]);
        let moving = GeometricPath::new(vec![Pose::default(), Pose::new(3.0, 4.0, 0.0)]);

        let off = ScoringPolicy { use_cost: false, goal_only: false };
        assert_eq!(off.cost(&source, &moving), FALLBACK_COST);

        let on = ScoringPolicy { use_cost: true, goal_only: false };
        assert_eq!(on.cost(&source, &still), FALLBACK_COST);
        assert!((on.cost(&source, &moving) - 5.0).abs() < 1e-12);
    }
}
