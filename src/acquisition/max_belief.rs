use rand::rngs::StdRng;

use super::{MaxBelief, RewardMode};
use crate::error::Result;
use crate::gp::OnlineGp;
use crate::types::{points_to_array, Extent};

/// Draws a belief about where the field maximum lies and how large it is
pub trait MaxBeliefSampler {
    fn sample_max_belief(
        &self,
        model: &OnlineGp,
        epoch: usize,
        mode: &RewardMode,
        rng: &mut StdRng,
    ) -> Result<MaxBelief>;
}

/// Samples joint posterior realizations on a regular grid over the extent
/// and records each realization's maximum.
#[derive(Clone, Debug)]
pub struct GridMaxSampler {
    pub extent: Extent,
    pub resolution: usize,
}

impl GridMaxSampler {
    pub fn new(extent: Extent, resolution: usize) -> Self {
        GridMaxSampler { extent, resolution: resolution.max(2) }
    }
}

impl MaxBeliefSampler for GridMaxSampler {
    fn sample_max_belief(
        &self,
        model: &OnlineGp,
        epoch: usize,
        mode: &RewardMode,
        rng: &mut StdRng,
    ) -> Result<MaxBelief> {
        let count = mode.belief_samples().unwrap_or(1);
        let grid = self.extent.grid(self.resolution, self.resolution);
        let query = points_to_array(&grid);
        let samples = model.sample_predictive(query.view(), count, true, rng)?;

        let mut belief = MaxBelief::default();
        for row in samples.outer_iter() {
            let (idx, value) = row
                .iter()
                .copied()
                .enumerate()
                .fold((0, f64::NEG_INFINITY), |best, (i, v)| if v > best.1 { (i, v) } else { best });
            belief.max_values.push(value);
            belief.max_locations.push(grid[idx]);
        }
        belief.target = belief.best().map(|(loc, _)| loc);

        tracing::debug!(
            epoch,
            samples = count,
            best = ?belief.best(),
            "sampled max belief"
        );
        Ok(belief)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::RbfKernel;
    use ndarray::array;
    use rand::SeedableRng;

    #[test]
    fn test_belief_concentrates_near_observed_peak() {
        let kernel = RbfKernel::new(2.0, 100.0, 0.01).unwrap();
        let mut gp = OnlineGp::new(kernel);
        gp.add_data(
            array![[5.0, 5.0], [-5.0, -5.0], [5.0, -5.0], [-5.0, 5.0], [0.0, 0.0]].view(),
            array![60.0, -20.0, -20.0, -20.0, 0.0].view(),
        )
        .unwrap();

        let sampler = GridMaxSampler::new(Extent::default(), 9);
        let mut rng = StdRng::seed_from_u64(7);
        let belief = sampler
            .sample_max_belief(&gp, 0, &RewardMode::Mes, &mut rng)
            .unwrap();

        assert_eq!(belief.max_values.len(), 3);
        assert_eq!(belief.max_locations.len(), 3);
        let target = belief.target.unwrap();
        assert!((target[0] - 5.0).abs() <= 5.0 && (target[1] - 5.0).abs() <= 5.0);
    }

    #[test]
    fn test_empty_model_samples_prior() {
        let gp = OnlineGp::new(RbfKernel::new(10.0, 100.0, 0.05).unwrap());
        let sampler = GridMaxSampler::new(Extent::default(), 5);
        let mut rng = StdRng::seed_from_u64(1);
        let belief = sampler
            .sample_max_belief(&gp, 0, &RewardMode::naive(), &mut rng)
            .unwrap();
        assert_eq!(belief.max_values.len(), 3);
        assert!(belief.max_values.iter().all(|v| v.is_finite()));
    }
}
