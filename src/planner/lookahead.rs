//! Nonmyopic path selection.
//!
//! A [`LookaheadPlanner`] replaces the one-step scoring of the decision loop.
//! It sees the same model, path source and acquisition function but must
//! never write to the real model: simulated observations go into a private
//! clone.

use rand::rngs::StdRng;
use rand::seq::IteratorRandom;
use std::collections::BTreeMap;

use super::{ScoringPolicy, Selection};
use crate::acquisition::{Acquisition, AcquisitionParams, MaxBelief, RewardMode};
use crate::error::{PlumeError, Result};
use crate::gp::OnlineGp;
use crate::paths::PathSource;
use crate::types::{points_to_array, GeometricPath, Point, Pose};

/// Everything a lookahead planner may use to make one decision
pub struct LookaheadContext<'a> {
    pub model: &'a OnlineGp,
    pub pose: Pose,
    pub paths: &'a dyn PathSource,
    pub acquisition: &'a dyn Acquisition,
    pub reward_mode: RewardMode,
    pub params: &'a AcquisitionParams,
    pub belief: Option<&'a MaxBelief>,
    pub policy: ScoringPolicy,
    pub rng: &'a mut StdRng,
}

pub trait LookaheadPlanner {
    fn choose_trajectory(&mut self, epoch: usize, ctx: LookaheadContext<'_>) -> Result<Selection>;
}

/// Monte Carlo rollouts from every first-step candidate.
///
/// Each rollout follows uniformly random paths for `rollout_length` steps in
/// total, feeding the posterior mean back in as pseudo-observations. A
/// rollout that draws an unscoreable path ends there with the return so far.
/// A candidate's value is its immediate score plus the mean rollout return.
#[derive(Clone, Debug)]
pub struct RolloutPlanner {
    budget: usize,
    rollout_length: usize,
}

impl RolloutPlanner {
    pub fn new(budget: usize, rollout_length: usize) -> Self {
        RolloutPlanner { budget: budget.max(1), rollout_length: rollout_length.max(1) }
    }

    /// Model with the posterior mean at `points` added as observations
    fn fantasize(model: &OnlineGp, points: &[Point]) -> Result<OnlineGp> {
        let mut imagined = model.clone();
        let inputs = points_to_array(points);
        let (mean, _) = imagined.predict(inputs.view(), false)?;
        imagined.add_data(inputs.view(), mean.view())?;
        Ok(imagined)
    }

    fn rollout(
        &self,
        ctx: &mut LookaheadContext<'_>,
        epoch: usize,
        model: &OnlineGp,
        start: Pose,
    ) -> Result<f64> {
        let mut model = model.clone();
        let mut pose = start;
        let mut total = 0.0;

        for depth in 1..self.rollout_length {
            let set = ctx.paths.path_set(&pose);
            let Some(id) = set.sampling.keys().copied().choose(&mut *ctx.rng) else {
                break;
            };
            let (Some(points), Some(path)) = (set.sampling.get(&id), set.geometric.get(&id)) else {
                break;
            };
            let reward = match ctx.policy.score(
                ctx.acquisition,
                epoch + depth,
                points,
                path,
                ctx.paths,
                &model,
                ctx.params,
            ) {
                Ok(value) if value.is_finite() => value,
                Ok(_) => break,
                Err(e @ PlumeError::NumericalInstability(_)) => return Err(e),
                Err(e) => {
                    tracing::debug!(epoch, depth, path = id, error = %e, "rollout ended on unscoreable path");
                    break;
                }
            };
            total += reward;

            model = Self::fantasize(&model, points)?;
            pose = next_pose(path, points, pose);
        }
        Ok(total)
    }
}

fn next_pose(path: &GeometricPath, points: &[Point], current: Pose) -> Pose {
    match (path.end(), points.last()) {
        (Some(end), _) => *end,
        (None, Some(p)) => Pose::new(p[0], p[1], current.heading),
        (None, None) => current,
    }
}

impl LookaheadPlanner for RolloutPlanner {
    fn choose_trajectory(&mut self, epoch: usize, mut ctx: LookaheadContext<'_>) -> Result<Selection> {
        let all_paths = ctx.paths.path_set(&ctx.pose);
        let mut all_values = BTreeMap::new();

        for (&id, points) in &all_paths.sampling {
            let Some(path) = all_paths.geometric.get(&id) else {
                continue;
            };
            let immediate = match ctx.policy.score(
                ctx.acquisition,
                epoch,
                points,
                path,
                ctx.paths,
                ctx.model,
                ctx.params,
            ) {
                Ok(value) if value.is_finite() => value,
                Ok(_) => continue,
                Err(e @ PlumeError::NumericalInstability(_)) => return Err(e),
                Err(e) => {
                    tracing::debug!(epoch, path = id, error = %e, "candidate failed to score");
                    continue;
                }
            };

            let after_first = Self::fantasize(ctx.model, points)?;
            let start = next_pose(path, points, ctx.pose);
            let mut future = 0.0;
            for _ in 0..self.budget {
                future += self.rollout(&mut ctx, epoch, &after_first, start)?;
            }
            let value = immediate + future / self.budget as f64;
            tracing::debug!(epoch, path = id, immediate, value, "rollout value");
            all_values.insert(id, value);
        }

        let belief = ctx.belief;
        Selection::choose(all_paths, all_values, belief, epoch, ctx.rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::UpperConfidenceBound;
    use crate::kernel::RbfKernel;
    use crate::paths::RayFanPaths;
    use crate::types::{Extent, PathSet};
    use ndarray::{array, ArrayView2};
    use rand::SeedableRng;

    /// Scoring rule whose factorization always fails
    struct Unstable;

    impl Acquisition for Unstable {
        fn score(&self, _: usize, _: ArrayView2<f64>, _: &OnlineGp, _: &AcquisitionParams) -> Result<f64> {
            Err(PlumeError::NumericalInstability("matrix is not positive definite".into()))
        }

        fn name(&self) -> &'static str {
            "unstable"
        }
    }

    /// One short ray along +x and one candidate with no sample points
    struct HalfEmptyPaths;

    impl PathSource for HalfEmptyPaths {
        fn path_set(&self, pose: &Pose) -> PathSet {
            let ahead = Pose::new(pose.x + 0.5, pose.y, 0.0);
            let mut set = PathSet::new();
            set.insert(0, vec![ahead.position()], GeometricPath::new(vec![*pose, ahead]));
            set.insert(1, Vec::new(), GeometricPath::new(vec![*pose]));
            set
        }
    }

    fn fitted_model() -> OnlineGp {
        let mut model = OnlineGp::new(RbfKernel::new(2.0, 10.0, 0.1).unwrap());
        model.add_data(array![[0.0, 0.0]].view(), array![1.0].view()).unwrap();
        model
    }

    #[test]
    fn test_instability_is_not_swallowed() {
        let model = fitted_model();
        let paths = RayFanPaths::new(3, 2.0, 1.0, Extent::default()).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let ctx = LookaheadContext {
            model: &model,
            pose: Pose::default(),
            paths: &paths,
            acquisition: &Unstable,
            reward_mode: RewardMode::Mean,
            params: &AcquisitionParams::None,
            belief: None,
            policy: ScoringPolicy::default(),
            rng: &mut rng,
        };
        let result = RolloutPlanner::new(2, 2).choose_trajectory(0, ctx);
        assert!(matches!(result, Err(PlumeError::NumericalInstability(_))));
    }

    #[test]
    fn test_unscoreable_paths_are_skipped() {
        let model = fitted_model();
        let ucb = UpperConfidenceBound::default();
        for seed in 0..5 {
            let mut rng = StdRng::seed_from_u64(seed);
            let ctx = LookaheadContext {
                model: &model,
                pose: Pose::default(),
                paths: &HalfEmptyPaths,
                acquisition: &ucb,
                reward_mode: RewardMode::Mean,
                params: &AcquisitionParams::None,
                belief: None,
                policy: ScoringPolicy::default(),
                rng: &mut rng,
            };
            let selection = RolloutPlanner::new(8, 4).choose_trajectory(0, ctx).unwrap();
            assert_eq!(selection.path_id, 0);
            assert_eq!(selection.all_values.len(), 1);
            assert!(selection.all_values[&0].is_finite());
        }
    }

    #[test]
    fn test_rollouts_leave_real_model_untouched() {
        let mut model = OnlineGp::new(RbfKernel::new(2.0, 10.0, 0.1).unwrap());
        model.add_data(array![[0.0, 0.0]].view(), array![1.0].view()).unwrap();
        let before = model.len();

        let paths = RayFanPaths::new(3, 2.0, 1.0, Extent::default()).unwrap();
        let ucb = UpperConfidenceBound::default();
        let mut rng = StdRng::seed_from_u64(3);
        let ctx = LookaheadContext {
            model: &model,
            pose: Pose::default(),
            paths: &paths,
            acquisition: &ucb,
            reward_mode: RewardMode::Mean,
            params: &AcquisitionParams::None,
            belief: None,
            policy: ScoringPolicy::default(),
            rng: &mut rng,
        };

        let mut planner = RolloutPlanner::new(4, 3);
        let selection = planner.choose_trajectory(0, ctx).unwrap();
        assert_eq!(model.len(), before);
        assert_eq!(selection.all_values.len(), 3);
        assert!(selection.all_values.values().all(|v| v.is_finite()));
        assert_eq!(selection.sampling_path.len(), 2);
    }
}
